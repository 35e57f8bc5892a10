//! Process-wide state published by the cold-start loader.
//!
//! A [`ProcessState`] is built once at cold start and then shared read-only
//! with every invocation. The reference image and scale are published at
//! most once, and the failure flag can only ever go from `false` to `true`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use image::{DynamicImage, GenericImageView};

use crate::error::{InitError, InitResult};
use crate::loader::FetchedPayload;
use crate::workload::WorkloadRunner;

/// Uniform scale factor applied on both axes.
///
/// Only parseability is checked. `NaN`, infinities and extreme values are
/// accepted here and fail later inside the timed transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleConfig(f64);

impl ScaleConfig {
    pub fn new(factor: f64) -> Self {
        ScaleConfig(factor)
    }

    pub fn parse(raw: Option<&str>) -> InitResult<Self> {
        let raw = raw.ok_or_else(|| InitError::BadScale("scale is not set".to_string()))?;
        raw.trim()
            .parse::<f64>()
            .map(ScaleConfig)
            .map_err(|e| InitError::BadScale(format!("{raw:?}: {e}")))
    }

    pub fn factor(self) -> f64 {
        self.0
    }
}

/// The cached payload: raw bytes exactly as downloaded plus their decoded bitmap.
#[derive(Debug)]
pub struct ReferenceImage {
    raw_bytes: Box<[u8]>,
    bitmap: DynamicImage,
}

impl ReferenceImage {
    /// Validates the byte count against the declared length, then decodes.
    ///
    /// Decoding works from the in-memory buffer only; nothing is cached on disk.
    pub fn from_payload(payload: FetchedPayload) -> InitResult<Self> {
        let declared = payload
            .declared_len
            .ok_or(InitError::MissingContentLength)?;
        let actual = payload.bytes.len() as u64;
        if actual != declared {
            return Err(InitError::SizeMismatch { declared, actual });
        }

        let bitmap = image::load_from_memory(&payload.bytes)?;
        Ok(ReferenceImage {
            raw_bytes: payload.bytes.into_boxed_slice(),
            bitmap,
        })
    }

    #[cfg(test)]
    pub(crate) fn from_parts(raw_bytes: Vec<u8>, bitmap: DynamicImage) -> Self {
        ReferenceImage {
            raw_bytes: raw_bytes.into_boxed_slice(),
            bitmap,
        }
    }

    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw_bytes
    }

    pub fn bitmap(&self) -> &DynamicImage {
        &self.bitmap
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.bitmap.dimensions()
    }
}

#[derive(Debug)]
struct Published {
    image: ReferenceImage,
    scale: ScaleConfig,
}

#[derive(Debug, Default)]
pub struct ProcessState {
    failed: AtomicBool,
    published: OnceLock<Published>,
}

impl ProcessState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes the loaded image and scale. Returns `false` (and publishes
    /// nothing) if the state already failed or was already published.
    pub fn publish(&self, image: ReferenceImage, scale: ScaleConfig) -> bool {
        if self.is_failed() {
            return false;
        }
        self.published.set(Published { image, scale }).is_ok()
    }

    // One-way: there is no way to clear the flag.
    pub fn mark_failed(&self) {
        self.failed.store(true, Ordering::SeqCst);
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn is_initialized(&self) -> bool {
        self.is_failed() || self.published.get().is_some()
    }

    pub fn image(&self) -> Option<&ReferenceImage> {
        self.published.get().map(|p| &p.image)
    }

    pub fn scale(&self) -> Option<ScaleConfig> {
        self.published.get().map(|p| p.scale)
    }

    /// A runner over the published payload, or `None` if this process must
    /// not serve invocations (initialization failed or never completed).
    pub fn runner(&self) -> Option<WorkloadRunner<'_>> {
        if self.is_failed() {
            return None;
        }
        self.published
            .get()
            .map(|p| WorkloadRunner::new(&p.image, p.scale))
    }
}
