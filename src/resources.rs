//! Device-side resources for one benchmark variant.
//!
//! The provisioner uploads the cost field and the uniform record once per
//! run and creates a freshly seeded ping/pong pair of distance fields for
//! every variant, either as
//! linear storage buffers or as `r32float` storage textures.  It also owns
//! the readback path that turns a device resource back into a host
//! [`DistanceField`].

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use wgpu::util::DeviceExt;
use wgpu::{BindingResource, BufferUsages, TextureFormat, TextureUsages};

use crate::buffer::{read_mapped, staging_buffer, GpuBuffer};
use crate::error::{BenchError, Result};
use crate::grid::{CostField, DistanceField};
use crate::uniforms::RelaxUniforms;
use crate::GpuContext;

/// Texel format of every texture-backed field.
pub const FIELD_FORMAT: TextureFormat = TextureFormat::R32Float;
const TEXEL_BYTES: u32 = 4;

/// How the cost and distance fields are exposed to the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingScheme {
    /// Linear storage buffers.
    Buffer,
    /// 2D storage textures.
    Texture,
}

impl std::fmt::Display for BindingScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindingScheme::Buffer => f.write_str("buffer"),
            BindingScheme::Texture => f.write_str("texture"),
        }
    }
}

/// One of the two distance fields of a ping/pong pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingPongSlot {
    Ping,
    Pong,
}

impl PingPongSlot {
    pub fn other(self) -> Self {
        match self {
            PingPongSlot::Ping => PingPongSlot::Pong,
            PingPongSlot::Pong => PingPongSlot::Ping,
        }
    }
}

/// A square grid of `f32` living on the device.
pub enum FieldResource {
    Buffer(GpuBuffer<f32>),
    Texture {
        texture: wgpu::Texture,
        view: wgpu::TextureView,
    },
}

impl FieldResource {
    pub fn binding(&self) -> BindingResource<'_> {
        match self {
            FieldResource::Buffer(buffer) => buffer.buffer.as_entire_binding(),
            FieldResource::Texture { view, .. } => BindingResource::TextureView(view),
        }
    }

    fn upload(
        context: &GpuContext,
        scheme: BindingScheme,
        label: &str,
        size: u32,
        values: &[f32],
        readable: bool,
    ) -> Self {
        match scheme {
            BindingScheme::Buffer => {
                let extra = if readable { BufferUsages::COPY_SRC } else { BufferUsages::empty() };
                FieldResource::Buffer(GpuBuffer::from_slice(context, label, values, extra))
            }
            BindingScheme::Texture => {
                let mut usage = TextureUsages::COPY_DST | TextureUsages::STORAGE_BINDING;
                if readable {
                    usage |= TextureUsages::COPY_SRC;
                }
                let texture = context.device.create_texture(&wgpu::TextureDescriptor {
                    label: Some(label),
                    size: extent(size),
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: FIELD_FORMAT,
                    usage,
                    view_formats: &[],
                });
                context.queue.write_texture(
                    wgpu::TexelCopyTextureInfo {
                        texture: &texture,
                        mip_level: 0,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    bytemuck::cast_slice(values),
                    wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(size * TEXEL_BYTES),
                        rows_per_image: Some(size),
                    },
                    extent(size),
                );
                let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
                FieldResource::Texture { texture, view }
            }
        }
    }
}

fn extent(size: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: size,
        height: size,
        depth_or_array_layers: 1,
    }
}

/// The two distance fields exchanged between consecutive passes.
pub struct PingPong {
    pub ping: FieldResource,
    pub pong: FieldResource,
}

impl PingPong {
    /// Both fields start from the same seed.
    pub fn seeded(context: &GpuContext, scheme: BindingScheme, size: u32, seed: &[f32]) -> Result<Self> {
        Self::with_seeds(context, scheme, size, seed, seed)
    }

    /// Seed ping and pong independently.
    pub fn with_seeds(
        context: &GpuContext,
        scheme: BindingScheme,
        size: u32,
        ping: &[f32],
        pong: &[f32],
    ) -> Result<Self> {
        check_field_len("distance ping", size, ping.len())?;
        check_field_len("distance pong", size, pong.len())?;
        check_device_limits(context, scheme, size)?;
        Ok(Self {
            ping: FieldResource::upload(context, scheme, "distance_ping", size, ping, true),
            pong: FieldResource::upload(context, scheme, "distance_pong", size, pong, true),
        })
    }

    pub fn get(&self, slot: PingPongSlot) -> &FieldResource {
        match slot {
            PingPongSlot::Ping => &self.ping,
            PingPongSlot::Pong => &self.pong,
        }
    }
}

/// Inputs shared by every variant of a run.
///
/// The uniform record is uploaded when the set is created.  The cost field
/// is uploaded at most once per binding scheme, on the first variant that
/// asks for it, and never written again.
pub struct SharedInputs<'a> {
    terrain: &'a CostField,
    uniforms: Arc<wgpu::Buffer>,
    costs: HashMap<BindingScheme, Arc<FieldResource>>,
}

impl<'a> SharedInputs<'a> {
    pub fn new(context: &GpuContext, terrain: &'a CostField, uniforms: &RelaxUniforms) -> Result<Self> {
        check_field_len("cost field", terrain.size(), terrain.cell_count())?;
        let uniforms = context.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("relax_uniforms"),
            contents: &uniforms.to_bytes(),
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        });
        Ok(Self {
            terrain,
            uniforms: Arc::new(uniforms),
            costs: HashMap::new(),
        })
    }

    pub fn terrain(&self) -> &CostField {
        self.terrain
    }

    /// The cost field in `scheme`'s form, uploading it on first use.
    pub fn cost(&mut self, context: &GpuContext, scheme: BindingScheme) -> Result<Arc<FieldResource>> {
        if let Some(cost) = self.costs.get(&scheme) {
            return Ok(Arc::clone(cost));
        }
        let size = self.terrain.size();
        check_device_limits(context, scheme, size)?;
        let cost = Arc::new(FieldResource::upload(
            context,
            scheme,
            "cost_field",
            size,
            self.terrain.costs(),
            false,
        ));
        log::debug!("uploaded {scheme} cost field for a {size}x{size} grid");
        self.costs.insert(scheme, Arc::clone(&cost));
        Ok(cost)
    }

    /// Resources for one variant: the shared cost field and uniforms plus a
    /// freshly seeded ping/pong pair.
    pub fn resources(&mut self, context: &GpuContext, scheme: BindingScheme) -> Result<Resources> {
        let cost = self.cost(context, scheme)?;
        let size = self.terrain.size();
        let distances = PingPong::seeded(context, scheme, size, &self.terrain.distance_seed())?;
        Ok(Resources {
            scheme,
            size,
            cost,
            uniforms: Arc::clone(&self.uniforms),
            distances,
        })
    }
}

/// Everything a variant binds: cost field, uniforms and the distance pair.
pub struct Resources {
    pub scheme: BindingScheme,
    pub size: u32,
    pub cost: Arc<FieldResource>,
    pub uniforms: Arc<wgpu::Buffer>,
    pub distances: PingPong,
}

impl Resources {
    /// Upload `terrain` and `uniforms` for a single variant and create a
    /// freshly seeded ping/pong pair in `scheme`.  Runs over several
    /// variants share their uploads through [`SharedInputs`] instead.
    pub fn provision(
        context: &GpuContext,
        scheme: BindingScheme,
        terrain: &CostField,
        uniforms: &RelaxUniforms,
    ) -> Result<Self> {
        SharedInputs::new(context, terrain, uniforms)?.resources(context, scheme)
    }

    pub fn distance(&self, slot: PingPongSlot) -> &FieldResource {
        self.distances.get(slot)
    }
}

fn check_field_len(what: &'static str, size: u32, len: usize) -> Result<()> {
    let expected = size as usize * size as usize;
    if len != expected {
        return Err(BenchError::ResourceSizeMismatch {
            what,
            message: format!("expected {expected} cells, got {len}"),
        });
    }
    Ok(())
}

fn check_device_limits(context: &GpuContext, scheme: BindingScheme, size: u32) -> Result<()> {
    check_grid_limits(&context.device.limits(), scheme, size)
}

/// Reject grids the device cannot hold as one field of `scheme`.
pub(crate) fn check_grid_limits(limits: &wgpu::Limits, scheme: BindingScheme, size: u32) -> Result<()> {
    match scheme {
        BindingScheme::Texture if size > limits.max_texture_dimension_2d => Err(BenchError::InvalidGrid(format!(
            "{size}x{size} exceeds the device texture limit of {}",
            limits.max_texture_dimension_2d
        ))),
        BindingScheme::Buffer => {
            let bytes = size as u64 * size as u64 * TEXEL_BYTES as u64;
            let max = u64::from(limits.max_storage_buffer_binding_size).min(limits.max_buffer_size);
            if bytes > max {
                Err(BenchError::InvalidGrid(format!(
                    "{bytes} byte field exceeds the device storage binding limit of {max}"
                )))
            } else {
                Ok(())
            }
        }
        _ => Ok(()),
    }
}

/// Row pitch for texture-to-buffer copies, padded to the copy alignment.
pub(crate) fn padded_row_bytes(size: u32) -> u32 {
    let unpadded = size * TEXEL_BYTES;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Drop the per-row padding of a texture readback.
pub(crate) fn strip_row_padding(size: u32, padded_row: u32, bytes: &[u8]) -> Vec<f32> {
    let row = (size * TEXEL_BYTES) as usize;
    let mut out = Vec::with_capacity(size as usize * size as usize);
    for chunk in bytes.chunks(padded_row as usize).take(size as usize) {
        out.extend(
            chunk[..row]
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        );
    }
    out
}

/// Copy a device field into a staging buffer, block on the map and return
/// the values as a `size × size` host field.
pub fn readback(context: &GpuContext, resource: &FieldResource, size: u32) -> Result<DistanceField> {
    let values = match resource {
        FieldResource::Buffer(buffer) => GpuBuffer::<f32>::readback_blocking(context, &buffer.buffer, buffer.len)?,
        FieldResource::Texture { texture, .. } => {
            let padded_row = padded_row_bytes(size);
            let staging = staging_buffer(context, "texture_readback_staging", padded_row as u64 * size as u64);
            let mut encoder = context.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("texture_readback_encoder"),
            });
            encoder.copy_texture_to_buffer(
                wgpu::TexelCopyTextureInfo {
                    texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::TexelCopyBufferInfo {
                    buffer: &staging,
                    layout: wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(padded_row),
                        rows_per_image: Some(size),
                    },
                },
                extent(size),
            );
            context.queue.submit([encoder.finish()]);
            read_mapped(context, &staging, |bytes| strip_row_padding(size, padded_row, bytes))?
        }
    };
    check_field_len("distance readback", size, values.len())?;
    Ok(DistanceField::new(size, values))
}
