//! Error types for the cold-start loader and the timed workload.

use std::collections::TryReserveError;
use thiserror::Error;

/// Failures during the one-time load of the reference image.
///
/// None of these reach an invocation caller. The loader logs them and
/// marks the process state as permanently failed.
#[derive(Error, Debug)]
pub enum InitError {
    #[error("bad scale config: {0}")]
    BadScale(String),

    #[error("missing image_url configuration")]
    MissingImageUrl,

    #[error("invalid image_url {url:?}: {reason}")]
    BadUrl { url: String, reason: String },

    #[error("unsupported image_url scheme {0:?}")]
    UnsupportedScheme(String),

    #[error("failed to fetch reference image: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("failed to read reference image: {0}")]
    Io(#[from] std::io::Error),

    #[error("reference image source did not declare a content length")]
    MissingContentLength,

    #[error("size mismatch: downloaded {actual} bytes but content length is {declared}")]
    SizeMismatch { declared: u64, actual: u64 },

    #[error("failed to decode reference image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Failures raised inside the timed region of one invocation.
#[derive(Error, Debug)]
pub enum WorkloadError {
    #[error("non-invertible transform for scale factor {factor}")]
    NonInvertible { factor: f64 },

    #[error("transformed {axis} ({value}) is less than or equal to 0")]
    EmptyBounds { axis: &'static str, value: f64 },

    #[error("transformed {axis} ({value}) does not fit a bitmap dimension")]
    DimensionOverflow { axis: &'static str, value: f64 },

    #[error("destination bitmap {width}x{height} overflows addressable memory")]
    BitmapTooLarge { width: u32, height: u32 },

    #[error("unable to allocate {bytes} bytes for the destination bitmap")]
    AllocationFailed {
        bytes: usize,
        #[source]
        source: TryReserveError,
    },

    #[error("reference bitmap has a pixel layout the resizer does not support")]
    UnsupportedPixelLayout,

    #[error("destination bitmap rejected: {0}")]
    ImageBuffer(#[from] fast_image_resize::ImageBufferError),

    #[error("bilinear resize failed: {0}")]
    Resize(#[from] fast_image_resize::ResizeError),
}

impl WorkloadError {
    /// Variant name, used as the type line of an error descriptor.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkloadError::NonInvertible { .. } => "NonInvertible",
            WorkloadError::EmptyBounds { .. } => "EmptyBounds",
            WorkloadError::DimensionOverflow { .. } => "DimensionOverflow",
            WorkloadError::BitmapTooLarge { .. } => "BitmapTooLarge",
            WorkloadError::AllocationFailed { .. } => "AllocationFailed",
            WorkloadError::UnsupportedPixelLayout => "UnsupportedPixelLayout",
            WorkloadError::ImageBuffer(_) => "ImageBuffer",
            WorkloadError::Resize(_) => "Resize",
        }
    }
}

pub type InitResult<T> = Result<T, InitError>;

pub type WorkloadResult<T> = Result<T, WorkloadError>;
