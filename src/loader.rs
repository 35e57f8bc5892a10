//! Cold-start loading of the reference image.
//!
//! [`initialize`] runs once before the runtime starts polling for
//! invocations. It never returns an error: any failure is logged and turned
//! into the permanent failure flag of the returned [`ProcessState`].

use std::path::PathBuf;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::Url;

use crate::config::HarnessConfig;
use crate::error::{InitError, InitResult};
use crate::state::{ProcessState, ReferenceImage, ScaleConfig};

/// Bytes read from a source together with the length it declared up front.
#[derive(Debug, Clone)]
pub struct FetchedPayload {
    pub declared_len: Option<u64>,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait PayloadSource: Send + Sync {
    async fn fetch(&self) -> InitResult<FetchedPayload>;
}

pub struct HttpSource {
    client: reqwest::Client,
    url: Url,
}

impl HttpSource {
    pub fn new(url: Url) -> Self {
        HttpSource {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl PayloadSource for HttpSource {
    async fn fetch(&self) -> InitResult<FetchedPayload> {
        let mut response = self
            .client
            .get(self.url.clone())
            .send()
            .await?
            .error_for_status()?;

        let declared_len = response.content_length();
        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            bytes.extend_from_slice(&chunk);
        }

        Ok(FetchedPayload {
            declared_len,
            bytes,
        })
    }
}

pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileSource { path: path.into() }
    }
}

#[async_trait]
impl PayloadSource for FileSource {
    async fn fetch(&self) -> InitResult<FetchedPayload> {
        let declared_len = tokio::fs::metadata(&self.path).await?.len();
        let bytes = tokio::fs::read(&self.path).await?;
        Ok(FetchedPayload {
            declared_len: Some(declared_len),
            bytes,
        })
    }
}

pub enum ImageSource {
    Http(HttpSource),
    File(FileSource),
}

impl ImageSource {
    pub fn from_url(raw: &str) -> InitResult<Self> {
        let url = Url::parse(raw.trim()).map_err(|e| InitError::BadUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "http" | "https" => Ok(ImageSource::Http(HttpSource::new(url))),
            "file" => {
                let path = url.to_file_path().map_err(|()| InitError::BadUrl {
                    url: raw.to_string(),
                    reason: "not a local file path".to_string(),
                })?;
                Ok(ImageSource::File(FileSource::new(path)))
            }
            other => Err(InitError::UnsupportedScheme(other.to_string())),
        }
    }
}

#[async_trait]
impl PayloadSource for ImageSource {
    async fn fetch(&self) -> InitResult<FetchedPayload> {
        match self {
            ImageSource::Http(source) => source.fetch().await,
            ImageSource::File(source) => source.fetch().await,
        }
    }
}

pub async fn load_reference<S: PayloadSource + ?Sized>(source: &S) -> InitResult<ReferenceImage> {
    let payload = source.fetch().await?;
    ReferenceImage::from_payload(payload)
}

/// Runs the cold-start load from environment configuration.
pub async fn initialize(config: &HarnessConfig) -> ProcessState {
    let started = Instant::now();
    let loaded = async {
        // Scale first: a bad value fails before any network traffic
        let scale = ScaleConfig::parse(config.scale.as_deref())?;
        let url = config
            .image_url
            .as_deref()
            .ok_or(InitError::MissingImageUrl)?;
        let source = ImageSource::from_url(url)?;
        let image = load_reference(&source).await?;
        Ok::<_, InitError>((image, scale))
    }
    .await;

    settle(loaded, started)
}

/// Same as [`initialize`] with an explicit payload source.
pub async fn initialize_from<S: PayloadSource + ?Sized>(
    raw_scale: Option<&str>,
    source: &S,
) -> ProcessState {
    let started = Instant::now();
    let loaded = async {
        let scale = ScaleConfig::parse(raw_scale)?;
        let image = load_reference(source).await?;
        Ok::<_, InitError>((image, scale))
    }
    .await;

    settle(loaded, started)
}

fn settle(loaded: InitResult<(ReferenceImage, ScaleConfig)>, started: Instant) -> ProcessState {
    let state = ProcessState::new();
    let init_ms = started.elapsed().as_millis() as u64;

    match loaded {
        Ok((image, scale)) => {
            let (width, height) = image.dimensions();
            tracing::info!(
                bytes = image.raw_bytes().len(),
                width,
                height,
                scale = scale.factor(),
                init_ms,
                "Reference image loaded"
            );
            state.publish(image, scale);
        }
        Err(err) => {
            tracing::error!(error = %err, init_ms, "Initialization failed, process will exit on next invocation");
            state.mark_failed();
        }
    }

    state
}
