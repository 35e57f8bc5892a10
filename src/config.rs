use std::env;

pub const SCALE_KEY: &str = "scale";
pub const IMAGE_URL_KEY: &str = "image_url";
pub const HANDLER_KEY: &str = "_HANDLER";

// Which response adapter the bootstrap binary serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandlerKind {
    #[default]
    Proxy,
    Direct,
}

impl HandlerKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "proxy" => Some(HandlerKind::Proxy),
            "direct" => Some(HandlerKind::Direct),
            _ => None,
        }
    }
}

// Raw environment values, captured once at cold start. Parsing happens in
// the loader so that a bad value becomes an initialization failure.
#[derive(Debug, Clone, Default)]
pub struct HarnessConfig {
    pub scale: Option<String>,
    pub image_url: Option<String>,
    pub handler: HandlerKind,
}

impl HarnessConfig {
    pub fn from_env() -> Self {
        let handler = match env::var(HANDLER_KEY) {
            Ok(name) => HandlerKind::from_name(&name).unwrap_or_else(|| {
                tracing::warn!(handler = %name, "Unknown handler, serving proxy responses");
                HandlerKind::Proxy
            }),
            Err(_) => HandlerKind::Proxy,
        };

        HarnessConfig {
            scale: env::var(SCALE_KEY).ok(),
            image_url: env::var(IMAGE_URL_KEY).ok(),
            handler,
        }
    }
}
