//! The benchmark sweep: one result per variant of a plan.
//!
//! The cost field and uniform record are uploaded once per run and shared
//! by every variant.  Each variant gets a fresh ping/pong pair, its own
//! pipeline and binding sets, one timed batch and a readback of the
//! authoritative field.  Failures
//! are isolated per variant unless the plan asks to abort, and errors that
//! invalidate the device always stop the sweep.

use std::path::Path;

use log::{error, info};

use crate::error::{BenchError, Result};
use crate::extract::extract;
use crate::grid::DistanceField;
use crate::pipeline::{BindingSets, RelaxPipeline};
use crate::resources::{BindingScheme, PingPongSlot, SharedInputs};
use crate::schedule::IterationScheduler;
use crate::timing::{PassTimings, TimestampProfiler};
use crate::variant::{BenchmarkPlan, OnError, VariantConfig};
use crate::GpuContext;

/// Result of one successfully completed variant.
#[derive(Debug, Clone)]
pub struct VariantReport {
    pub name: String,
    pub kernel: String,
    pub scheme: BindingScheme,
    pub iterations: u32,
    pub output: PingPongSlot,
    pub field: DistanceField,
    pub visited: usize,
    /// `None` when the device has no timestamp support.
    pub timings: Option<PassTimings>,
}

#[derive(Debug)]
pub enum VariantOutcome {
    Completed(VariantReport),
    Failed { name: String, error: BenchError },
}

impl VariantOutcome {
    pub fn name(&self) -> &str {
        match self {
            VariantOutcome::Completed(report) => &report.name,
            VariantOutcome::Failed { name, .. } => name,
        }
    }

    pub fn report(&self) -> Option<&VariantReport> {
        match self {
            VariantOutcome::Completed(report) => Some(report),
            VariantOutcome::Failed { .. } => None,
        }
    }
}

/// In-memory report of a whole sweep, in plan order.
#[derive(Debug)]
pub struct RunReport {
    pub grid_size: u32,
    pub outcomes: Vec<VariantOutcome>,
}

impl RunReport {
    pub fn completed(&self) -> impl Iterator<Item = &VariantReport> {
        self.outcomes.iter().filter_map(VariantOutcome::report)
    }

    pub fn failures(&self) -> usize {
        self.outcomes.len() - self.completed().count()
    }
}

/// Run a single variant end to end against the run's shared inputs.
pub fn run_variant(
    context: &GpuContext,
    shared: &mut SharedInputs<'_>,
    variant: &VariantConfig,
    base_dir: Option<&Path>,
) -> Result<VariantReport> {
    info!(
        "=== {} === kernel {}, {} bindings, {} iterations",
        variant.name, variant.kernel, variant.scheme, variant.iterations
    );
    let source = variant.kernel.load(base_dir)?;
    let pipeline = RelaxPipeline::build(context, &source, variant.scheme)?;
    let resources = shared.resources(context, variant.scheme)?;
    let bindings = BindingSets::new(context, &pipeline, &resources)?;
    let profiler = TimestampProfiler::new(context, variant.iterations)?;

    let mut scheduler = IterationScheduler::new(context, &pipeline, &bindings, resources.size);
    let batch = scheduler.run(variant.iterations, profiler.as_ref())?;

    let timings = match &profiler {
        Some(profiler) => Some(profiler.collect(context)?),
        None if context.features.timestamp_query => Some(PassTimings::from_ticks(&[], context.timestamp_period())),
        None => None,
    };
    match &timings {
        Some(t) => info!(
            "average per iteration: {:.4} ms, total GPU time: {:.4} ms",
            t.mean_ms(),
            t.total_ms()
        ),
        None => info!("timing unavailable"),
    }

    let extraction = extract(context, &resources, batch.output)?;
    info!(
        "finished {} iterations, filled cells: {}/{}",
        batch.iterations,
        extraction.visited,
        extraction.field.cell_count()
    );

    Ok(VariantReport {
        name: variant.name.clone(),
        kernel: source.name,
        scheme: variant.scheme,
        iterations: batch.iterations,
        output: extraction.output,
        field: extraction.field,
        visited: extraction.visited,
        timings,
    })
}

/// Run every variant of `plan` in order.
///
/// Returns `Err` only for failures that end the sweep: device-level errors,
/// and any variant error when the plan says `on_error = "abort"`.
pub fn run_plan(context: &GpuContext, plan: &BenchmarkPlan) -> Result<RunReport> {
    let terrain = plan.build_terrain()?;
    let mut shared = SharedInputs::new(context, &terrain, &plan.uniforms())?;
    let mut outcomes = Vec::with_capacity(plan.variants.len());

    for variant in &plan.variants {
        match run_variant(context, &mut shared, variant, plan.base_dir.as_deref()) {
            Ok(report) => outcomes.push(VariantOutcome::Completed(report)),
            Err(e) if e.is_fatal() || plan.on_error == OnError::Abort => {
                error!("variant `{}` failed, aborting run: {e}", variant.name);
                return Err(e);
            }
            Err(e) => {
                error!("variant `{}` failed, skipping: {e}", variant.name);
                outcomes.push(VariantOutcome::Failed {
                    name: variant.name.clone(),
                    error: e,
                });
            }
        }
    }

    Ok(RunReport {
        grid_size: plan.grid_size,
        outcomes,
    })
}
