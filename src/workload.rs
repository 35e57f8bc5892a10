//! The timed unit of work executed by every invocation.
//!
//! Each run copies the cached raw bytes into a fresh buffer (standing in for
//! receiving the payload without network jitter), scales the cached bitmap
//! with bilinear filtering, then copies the raw bytes again. The second copy
//! is redundant but belongs to the measured workload, so it stays.

use std::any::Any;
use std::error::Error as _;
use std::hint::black_box;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use fast_image_resize::images::Image;
use fast_image_resize::{FilterType, IntoImageView, ResizeAlg, ResizeOptions, Resizer};
use image::DynamicImage;

use crate::error::{WorkloadError, WorkloadResult};
use crate::state::{ReferenceImage, ScaleConfig};

pub const LINE_SEPARATOR: &str = "\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationOutcome {
    Success { elapsed_nanos: u64 },
    Failure { descriptor: String },
}

impl InvocationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, InvocationOutcome::Success { .. })
    }
}

/// Uniform scale on both axes.
#[derive(Debug, Clone, Copy)]
pub struct ScaleTransform {
    factor: f64,
}

impl ScaleTransform {
    pub fn uniform(factor: f64) -> WorkloadResult<Self> {
        if !factor.is_finite() || factor == 0.0 {
            return Err(WorkloadError::NonInvertible { factor });
        }
        Ok(ScaleTransform { factor })
    }

    // Destination bounds are the ceiling of the scaled source bounds
    pub fn target_size(&self, width: u32, height: u32) -> WorkloadResult<(u32, u32)> {
        Ok((
            scaled_axis("width", width, self.factor)?,
            scaled_axis("height", height, self.factor)?,
        ))
    }

    pub fn apply(&self, src: &DynamicImage) -> WorkloadResult<Image<'static>> {
        let (width, height) = self.target_size(src.width(), src.height())?;
        let pixel_type = src
            .pixel_type()
            .ok_or(WorkloadError::UnsupportedPixelLayout)?;

        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(pixel_type.size()))
            .ok_or(WorkloadError::BitmapTooLarge { width, height })?;

        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(len)
            .map_err(|source| WorkloadError::AllocationFailed { bytes: len, source })?;
        buffer.resize(len, 0);

        let mut dst = Image::from_vec_u8(width, height, buffer, pixel_type)?;
        let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear));
        Resizer::new().resize(src, &mut dst, &options)?;
        Ok(dst)
    }
}

fn scaled_axis(axis: &'static str, len: u32, factor: f64) -> WorkloadResult<u32> {
    let value = (f64::from(len) * factor).ceil();
    if value.is_nan() || value <= 0.0 {
        return Err(WorkloadError::EmptyBounds { axis, value });
    }
    if value > f64::from(u32::MAX) {
        return Err(WorkloadError::DimensionOverflow { axis, value });
    }
    Ok(value as u32)
}

pub struct WorkloadRunner<'a> {
    image: &'a ReferenceImage,
    scale: ScaleConfig,
}

impl<'a> WorkloadRunner<'a> {
    pub fn new(image: &'a ReferenceImage, scale: ScaleConfig) -> Self {
        WorkloadRunner { image, scale }
    }

    /// Runs the workload once. Errors and panics both come back as
    /// `Failure`; the elapsed time is only reported on success.
    pub fn run(&self) -> InvocationOutcome {
        let before = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.timed_region()));
        let elapsed = before.elapsed();

        match result {
            Ok(Ok(())) => InvocationOutcome::Success {
                elapsed_nanos: u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX),
            },
            Ok(Err(err)) => {
                tracing::error!(kind = err.kind(), error = %err, "Workload failed");
                InvocationOutcome::Failure {
                    descriptor: describe_error(&err),
                }
            }
            Err(payload) => {
                let descriptor = describe_panic(payload.as_ref());
                tracing::error!(descriptor = %descriptor, "Workload panicked");
                InvocationOutcome::Failure { descriptor }
            }
        }
    }

    fn timed_region(&self) -> WorkloadResult<()> {
        let cached = self.image.raw_bytes();
        let mut received = simulate_download(cached);

        let transform = ScaleTransform::uniform(self.scale.factor())?;
        let scaled = transform.apply(self.image.bitmap())?;
        black_box(scaled.buffer());
        drop(scaled);

        copy_bytes(&mut received, cached);
        black_box(&received);
        Ok(())
    }
}

// Fresh allocation plus an element-wise copy, never an alias of the cache
fn simulate_download(cached: &[u8]) -> Vec<u8> {
    let mut received = vec![0u8; cached.len()];
    copy_bytes(&mut received, cached);
    received
}

fn copy_bytes(dst: &mut [u8], src: &[u8]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d = *s;
    }
}

/// Three lines: `<type>: <message>`, the cause (or `null`), the message.
pub fn describe_error(err: &WorkloadError) -> String {
    let cause = err
        .source()
        .map(|source| source.to_string())
        .unwrap_or_else(|| "null".to_string());

    [
        format!("WorkloadError::{}: {}", err.kind(), err),
        cause,
        err.to_string(),
    ]
    .join(LINE_SEPARATOR)
}

pub fn describe_panic(payload: &(dyn Any + Send)) -> String {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "null".to_string());

    [format!("panic: {message}"), "null".to_string(), message].join(LINE_SEPARATOR)
}
