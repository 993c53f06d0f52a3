//! Ping-pong iteration scheduling.
//!
//! All `N` passes of a run are recorded into one command encoder and
//! submitted as a single batch.  Pass `i + 1` reads what pass `i` wrote;
//! the queue executes passes of one submission in recorded order, and that
//! ordering is the only synchronization between them.  A backend without
//! in-order execution on a single queue would need a barrier between every
//! pair of passes.

use crate::error::{BenchError, Result};
use crate::pipeline::{BindingSets, RelaxPipeline, WORKGROUP_EDGE};
use crate::resources::PingPongSlot;
use crate::timing::TimestampProfiler;
use crate::GpuContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Recording,
    Submitted,
    Complete,
}

/// Workgroups per grid dimension for the fixed 8×8 local size.
pub fn dispatch_size(grid_size: u32) -> (u32, u32) {
    let groups = grid_size.div_ceil(WORKGROUP_EDGE);
    (groups, groups)
}

/// Field read by pass `pass`: even passes read ping, odd passes read pong.
pub fn read_slot(pass: u32) -> PingPongSlot {
    if pass % 2 == 0 {
        PingPongSlot::Ping
    } else {
        PingPongSlot::Pong
    }
}

/// Field holding the result after `iterations` passes.  Pass 0 writes
/// pong, so an odd count ends on pong and an even count (zero included)
/// on ping.
pub fn authoritative_output(iterations: u32) -> PingPongSlot {
    read_slot(iterations)
}

/// Timestamp writes index the query set by pass, so a profiler must cover
/// exactly the passes being recorded.
fn check_profiler(profiled: Option<u32>, iterations: u32) -> Result<()> {
    match profiled {
        Some(profiled) if profiled != iterations => Err(BenchError::ProfilerMismatch { profiled, iterations }),
        _ => Ok(()),
    }
}

/// Outcome of a completed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletedBatch {
    pub iterations: u32,
    pub output: PingPongSlot,
}

/// Records and submits one batch of ping-pong passes.
pub struct IterationScheduler<'a> {
    context: &'a GpuContext,
    pipeline: &'a RelaxPipeline,
    bindings: &'a BindingSets,
    grid_size: u32,
    state: SchedulerState,
}

impl<'a> IterationScheduler<'a> {
    pub fn new(
        context: &'a GpuContext,
        pipeline: &'a RelaxPipeline,
        bindings: &'a BindingSets,
        grid_size: u32,
    ) -> Self {
        Self {
            context,
            pipeline,
            bindings,
            grid_size,
            state: SchedulerState::Idle,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Record `iterations` passes, submit them as one batch and block until
    /// the queue reports completion.  When `profiler` is given each pass is
    /// wrapped in timestamp writes and the queries are resolved at the end
    /// of the same batch.
    ///
    /// A scheduler submits exactly once; further calls fail.
    pub fn run(&mut self, iterations: u32, profiler: Option<&TimestampProfiler>) -> Result<CompletedBatch> {
        if self.state != SchedulerState::Idle {
            return Err(BenchError::BatchAlreadySubmitted);
        }
        check_profiler(profiler.map(TimestampProfiler::passes), iterations)?;

        self.state = SchedulerState::Recording;
        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("relax_batch") });
        let (groups_x, groups_y) = dispatch_size(self.grid_size);
        for pass in 0..iterations {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("relax_pass"),
                timestamp_writes: profiler.map(|p| p.pass_writes(pass)),
            });
            cpass.set_pipeline(&self.pipeline.pipeline);
            cpass.set_bind_group(0, self.bindings.get(read_slot(pass)), &[]);
            cpass.dispatch_workgroups(groups_x, groups_y, 1);
        }
        if let Some(profiler) = profiler {
            profiler.resolve(&mut encoder);
        }
        let output = authoritative_output(iterations);
        log::debug!(
            "recorded {iterations} passes of {groups_x}x{groups_y} workgroups, output in {output:?}"
        );

        let index = self.context.queue.submit([encoder.finish()]);
        self.state = SchedulerState::Submitted;
        self.context
            .device
            .poll(wgpu::PollType::WaitForSubmissionIndex(index))?;
        self.state = SchedulerState::Complete;

        Ok(CompletedBatch { iterations, output })
    }
}
