//! Per-pass GPU timing through hardware timestamp queries.
//!
//! Pass `i` writes its start tick into query `2i` and its end tick into
//! query `2i + 1` as part of the pass descriptor.  After the last pass every
//! query is resolved on its own into a 256-byte slot of the resolve buffer,
//! since resolve destination offsets must be 256-byte aligned.  Only the
//! first 8 bytes of each slot carry data.
//!
//! When the device has no timestamp support the profiler is simply not
//! created and passes run uninstrumented.

use wgpu::{BufferAddress, BufferUsages, CommandEncoder};

use crate::buffer::{read_mapped, staging_buffer};
use crate::error::{BenchError, Result};
use crate::GpuContext;

/// Distance between consecutive resolved queries in the resolve buffer.
pub const SLOT_STRIDE: BufferAddress = wgpu::QUERY_RESOLVE_BUFFER_ALIGNMENT;
const TICK_BYTES: usize = wgpu::QUERY_SIZE as usize;

/// Query indices `(begin, end)` written by pass `pass`.
pub fn pass_queries(pass: u32) -> (u32, u32) {
    (2 * pass, 2 * pass + 1)
}

/// Byte offset of `query`'s slot in the resolve buffer.
pub fn slot_offset(query: u32) -> BufferAddress {
    query as BufferAddress * SLOT_STRIDE
}

/// Resolve operations for `query_count` queries, as `(query, offset)`:
/// one query per operation, each into its own slot.
pub fn resolve_plan(query_count: u32) -> impl Iterator<Item = (u32, BufferAddress)> {
    (0..query_count).map(|query| (query, slot_offset(query)))
}

/// Pull one tick out of the head of each slot.
pub fn ticks_from_slots(bytes: &[u8], count: usize) -> Vec<u64> {
    bytes
        .chunks(SLOT_STRIDE as usize)
        .take(count)
        .map(|slot| {
            let mut tick = [0u8; TICK_BYTES];
            tick.copy_from_slice(&slot[..TICK_BYTES]);
            u64::from_le_bytes(tick)
        })
        .collect()
}

/// Timestamp query resources for one batch of `passes` passes.
pub struct TimestampProfiler {
    query_set: wgpu::QuerySet,
    resolve_buffer: wgpu::Buffer,
    readback_buffer: wgpu::Buffer,
    passes: u32,
}

impl TimestampProfiler {
    /// Returns `Ok(None)` when the device has no timestamp support or there
    /// are no passes to time.
    pub fn new(context: &GpuContext, passes: u32) -> Result<Option<Self>> {
        if !context.features.timestamp_query {
            log::warn!("timestamp queries not supported on this adapter; timing unavailable");
            return Ok(None);
        }
        if passes == 0 {
            return Ok(None);
        }
        let query_count = passes
            .checked_mul(2)
            .filter(|count| *count <= wgpu::QUERY_SET_MAX_QUERIES)
            .ok_or(BenchError::TooManyQueries {
                requested: passes.saturating_mul(2),
                max: wgpu::QUERY_SET_MAX_QUERIES,
            })?;

        let query_set = context.device.create_query_set(&wgpu::QuerySetDescriptor {
            label: Some("pass_timestamps"),
            ty: wgpu::QueryType::Timestamp,
            count: query_count,
        });
        let resolve_size = slot_offset(query_count);
        let resolve_buffer = context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("timestamp_resolve"),
            size: resolve_size,
            usage: BufferUsages::QUERY_RESOLVE | BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let readback_buffer = staging_buffer(context, "timestamp_readback", resolve_size);

        Ok(Some(Self {
            query_set,
            resolve_buffer,
            readback_buffer,
            passes,
        }))
    }

    pub fn passes(&self) -> u32 {
        self.passes
    }

    pub fn query_count(&self) -> u32 {
        self.passes * 2
    }

    /// Begin/end writes for pass `pass`, attached to its descriptor.
    pub fn pass_writes(&self, pass: u32) -> wgpu::ComputePassTimestampWrites<'_> {
        let (begin, end) = pass_queries(pass);
        wgpu::ComputePassTimestampWrites {
            query_set: &self.query_set,
            beginning_of_pass_write_index: Some(begin),
            end_of_pass_write_index: Some(end),
        }
    }

    /// Resolve each query into its own aligned slot.  Recorded after the
    /// last pass of the batch.
    pub fn resolve(&self, encoder: &mut CommandEncoder) {
        for (query, offset) in resolve_plan(self.query_count()) {
            encoder.resolve_query_set(&self.query_set, query..query + 1, &self.resolve_buffer, offset);
        }
    }

    /// Copy the resolved slots to the host in a one-shot batch, wait for it,
    /// and return one tick per query.  Call after the timed batch completed.
    pub fn read_ticks(&self, context: &GpuContext) -> Result<Vec<u64>> {
        let mut encoder = context.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("timestamp_copy_encoder"),
        });
        encoder.copy_buffer_to_buffer(
            &self.resolve_buffer,
            0,
            &self.readback_buffer,
            0,
            slot_offset(self.query_count()),
        );
        let index = context.queue.submit([encoder.finish()]);
        context.device.poll(wgpu::PollType::WaitForSubmissionIndex(index))?;

        let count = self.query_count() as usize;
        read_mapped(context, &self.readback_buffer, |bytes| ticks_from_slots(bytes, count))
    }

    /// Read back and calibrate this batch's timings.
    pub fn collect(&self, context: &GpuContext) -> Result<PassTimings> {
        let ticks = self.read_ticks(context)?;
        Ok(PassTimings::from_ticks(&ticks, context.timestamp_period()))
    }
}

/// Calibrated per-pass durations of one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct PassTimings {
    /// Nanoseconds per tick used for the conversion.
    pub period_ns: f64,
    /// Duration of each pass in recorded order, in nanoseconds.
    pub per_pass_ns: Vec<f64>,
}

impl PassTimings {
    /// `ticks` holds interleaved `(begin, end)` pairs.  An end tick earlier
    /// than its begin tick counts as a zero-length pass.
    pub fn from_ticks(ticks: &[u64], period_ns: f64) -> Self {
        let per_pass_ns = ticks
            .chunks_exact(2)
            .map(|pair| pair[1].saturating_sub(pair[0]) as f64 * period_ns)
            .collect();
        Self { period_ns, per_pass_ns }
    }

    pub fn passes(&self) -> usize {
        self.per_pass_ns.len()
    }

    /// Mean over the strictly positive durations.  Zero-length passes are
    /// clock granularity artifacts and are left out; with none left the
    /// mean is zero.
    pub fn mean_ns(&self) -> f64 {
        let (sum, n) = self
            .per_pass_ns
            .iter()
            .filter(|d| **d > 0.0)
            .fold((0.0, 0usize), |(sum, n), d| (sum + d, n + 1));
        if n == 0 {
            0.0
        } else {
            sum / n as f64
        }
    }

    /// Sum over every pass, zero-length ones included.
    pub fn total_ns(&self) -> f64 {
        self.per_pass_ns.iter().sum()
    }

    pub fn mean_ms(&self) -> f64 {
        self.mean_ns() * 1e-6
    }

    pub fn total_ms(&self) -> f64 {
        self.total_ns() * 1e-6
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_query_gets_an_aligned_slot() {
        let passes = 5u32;
        let offsets: Vec<_> = (0..2 * passes).map(slot_offset).collect();
        assert_eq!(offsets.len(), 10);
        for (i, offset) in offsets.iter().enumerate() {
            assert_eq!(*offset, 256 * i as u64);
            assert_eq!(offset % wgpu::QUERY_RESOLVE_BUFFER_ALIGNMENT, 0);
        }
        assert_eq!(pass_queries(0), (0, 1));
        assert_eq!(pass_queries(4), (8, 9));
    }

    #[test]
    fn each_pass_resolves_two_slots() {
        let passes = 3u32;
        let plan: Vec<_> = resolve_plan(2 * passes).collect();
        assert_eq!(
            plan,
            [(0, 0), (1, 256), (2, 512), (3, 768), (4, 1024), (5, 1280)]
        );
        // begin and end queries of every pass land in the plan
        for pass in 0..passes {
            let (begin, end) = pass_queries(pass);
            assert_eq!(plan[begin as usize], (begin, 256 * begin as u64));
            assert_eq!(plan[end as usize], (end, 256 * end as u64));
        }
        assert_eq!(resolve_plan(0).count(), 0);
        // the resolve buffer is exactly as long as the last slot's end
        let last = plan.last().map(|(_, offset)| offset + SLOT_STRIDE);
        assert_eq!(last, Some(slot_offset(2 * passes)));
    }

    #[test]
    fn reads_one_tick_per_slot() {
        let ticks = [10u64, 25, 40, 41];
        let mut bytes = vec![0xFFu8; ticks.len() * SLOT_STRIDE as usize];
        for (i, tick) in ticks.iter().enumerate() {
            let at = slot_offset(i as u32) as usize;
            bytes[at..at + 8].copy_from_slice(&tick.to_le_bytes());
        }
        assert_eq!(ticks_from_slots(&bytes, ticks.len()), ticks);
    }

    #[test]
    fn zero_durations_skip_the_mean_but_not_the_total() {
        // passes of 10, 0, 30 ticks at 2 ns per tick
        let ticks = [100, 110, 200, 200, 300, 330];
        let timings = PassTimings::from_ticks(&ticks, 2.0);
        assert_eq!(timings.per_pass_ns, vec![20.0, 0.0, 60.0]);
        assert_eq!(timings.mean_ns(), 40.0);
        assert_eq!(timings.total_ns(), 80.0);
        assert!((timings.total_ms() - 80.0e-6).abs() < 1e-12);
    }

    #[test]
    fn backwards_ticks_count_as_zero() {
        let timings = PassTimings::from_ticks(&[500, 400, 0, 1_000_000], 1.0);
        assert_eq!(timings.per_pass_ns, vec![0.0, 1_000_000.0]);
        assert_eq!(timings.mean_ms(), 1.0);
    }

    #[test]
    fn empty_batch_has_zero_statistics() {
        let timings = PassTimings::from_ticks(&[], 1.0);
        assert_eq!(timings.passes(), 0);
        assert_eq!(timings.mean_ns(), 0.0);
        assert_eq!(timings.total_ns(), 0.0);
    }
}
