//! Error types for the benchmarking harness.
//!
//! Every provisioning, pipeline and readback operation returns a
//! [`Result`] so the runner can decide whether a failure aborts the whole
//! sweep or only the variant that produced it.

use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BenchError>;

#[derive(Error, Debug)]
pub enum BenchError {
    /// No adapter could be found for any enabled backend.
    #[error("unable to find a suitable GPU adapter")]
    NoAdapter,

    #[error("selected adapter does not support compute shaders")]
    ComputeUnsupported,

    #[error("failed to create GPU device: {0}")]
    DeviceRequest(String),

    #[error("kernel source not found: {}", path.display())]
    KernelNotFound { path: PathBuf },

    #[error("failed to read kernel source {}: {source}", path.display())]
    KernelRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The compute program did not build against the fixed 4-slot layout.
    #[error("kernel `{kernel}` failed to build: {message}")]
    KernelBuildFailed { kernel: String, message: String },

    /// Host and shader disagree on the byte size of a bound resource.
    #[error("resource size mismatch for {what}: {message}")]
    ResourceSizeMismatch { what: &'static str, message: String },

    #[error("invalid grid: {0}")]
    InvalidGrid(String),

    #[error("{requested} timestamp queries requested, the device allows at most {max}")]
    TooManyQueries { requested: u32, max: u32 },

    #[error("timestamp profiler covers {profiled} passes, the batch records {iterations}")]
    ProfilerMismatch { profiled: u32, iterations: u32 },

    #[error("command batch was already submitted")]
    BatchAlreadySubmitted,

    #[error("buffer mapping failed: {0}")]
    BufferMap(#[from] wgpu::BufferAsyncError),

    #[error("device poll failed: {0}")]
    Poll(#[from] wgpu::PollError),

    #[error("buffer mapping callback was dropped before completion")]
    MapChannelClosed,

    #[error("failed to read benchmark plan {}: {source}", path.display())]
    PlanIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid benchmark plan: {0}")]
    Plan(#[from] toml::de::Error),
}

impl BenchError {
    /// Whether this error invalidates the whole run rather than a single
    /// variant. Device initialization and device-level failures are never
    /// isolated.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BenchError::NoAdapter
                | BenchError::ComputeUnsupported
                | BenchError::DeviceRequest(_)
                | BenchError::Poll(_)
                | BenchError::PlanIo { .. }
                | BenchError::Plan(_)
        )
    }
}
