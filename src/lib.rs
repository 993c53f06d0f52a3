//! A benchmarking harness for iterative relaxation kernels on the GPU
//! using [wgpu](https://github.com/gfx-rs/wgpu).
//!
//! A run uploads a terrain cost field, builds a compute pipeline for each
//! kernel variant, and drives a fixed number of dependent dispatches that
//! ping-pong between two distance fields inside one command batch.  When
//! the device supports timestamp queries every pass is timed on the GPU
//! and the ticks are converted into per-iteration statistics.  The API is
//! synchronous and blocking: each batch is waited on before its results
//! are read back.
//!
//! Kernels bind either linear storage buffers or `r32float` storage
//! textures ([`BindingScheme`]); both expose the same four slots and the
//! same uniform record ([`RelaxUniforms`]).

pub mod buffer;
pub mod context;
pub mod cpu;
pub mod error;
pub mod extract;
pub mod grid;
pub mod pipeline;
pub mod resources;
pub mod runner;
pub mod schedule;
pub mod timing;
pub mod uniforms;
pub mod variant;

// Re-export the most common types at the crate root so that users can
// simply `use wgpu_relax_bench::*;`.
pub use buffer::GpuBuffer;
pub use context::{DeviceFeatures, GpuContext};
pub use error::{BenchError, Result};
pub use grid::{Cell, CostField, DistanceField};
pub use pipeline::{BindingSets, KernelRef, RelaxPipeline};
pub use resources::{BindingScheme, PingPongSlot, Resources, SharedInputs};
pub use runner::{run_plan, run_variant, RunReport, VariantOutcome, VariantReport};
pub use schedule::IterationScheduler;
pub use timing::{PassTimings, TimestampProfiler};
pub use uniforms::RelaxUniforms;
pub use variant::{BenchmarkPlan, OnError, VariantConfig};
