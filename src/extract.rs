//! Readback of the final distance field.

use crate::error::Result;
use crate::grid::DistanceField;
use crate::resources::{readback, PingPongSlot, Resources};
use crate::GpuContext;

/// The authoritative distance field of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub output: PingPongSlot,
    pub field: DistanceField,
    /// Cells with a value above zero.
    pub visited: usize,
}

/// Read back the field the scheduler named as authoritative.  Only call
/// once the batch that wrote it has completed.
pub fn extract(context: &GpuContext, resources: &Resources, output: PingPongSlot) -> Result<Extraction> {
    let field = readback(context, resources.distance(output), resources.size)?;
    let visited = field.visited_count();
    Ok(Extraction { output, field, visited })
}
