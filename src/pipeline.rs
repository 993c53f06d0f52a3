//! Compute pipelines for interchangeable relaxation kernels.
//!
//! Every kernel binds the same four slots in group 0:
//!
//! | slot | buffer scheme                 | texture scheme                  |
//! |------|-------------------------------|---------------------------------|
//! | 0    | cost, read-only storage       | cost, read-only `r32float`      |
//! | 1    | distance in, read-only storage| distance in, read-only `r32float` |
//! | 2    | distance out, read-write      | distance out, write-only `r32float` |
//! | 3    | uniform config                | uniform config                  |
//!
//! The entry point is always `main` with an 8×8 workgroup.  Both binding
//! sets used by the ping-pong loop are created once, before any pass is
//! recorded.

use std::borrow::Cow;
use std::num::NonZeroU64;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use wgpu::{BindGroup, BindGroupLayout, ComputePipeline, ShaderModuleDescriptor, ShaderSource};

use crate::error::{BenchError, Result};
use crate::resources::{BindingScheme, PingPongSlot, Resources, FIELD_FORMAT};
use crate::uniforms::UNIFORM_FIELDS_SIZE;
use crate::GpuContext;

pub const KERNEL_ENTRY_POINT: &str = "main";
/// Local workgroup edge length every kernel is compiled with.
pub const WORKGROUP_EDGE: u32 = 8;

const BUILTIN_PREFIX: &str = "builtin:";

/// Kernels compiled into the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKernel {
    RelaxBuffer,
    RelaxTexture,
}

impl BuiltinKernel {
    pub fn id(self) -> &'static str {
        match self {
            BuiltinKernel::RelaxBuffer => "relax-buffer",
            BuiltinKernel::RelaxTexture => "relax-texture",
        }
    }

    pub fn wgsl(self) -> &'static str {
        match self {
            BuiltinKernel::RelaxBuffer => include_str!("../shaders/relax_buffer.wgsl"),
            BuiltinKernel::RelaxTexture => include_str!("../shaders/relax_texture.wgsl"),
        }
    }

    /// The shipped kernel written against `scheme`'s layout.
    pub fn for_scheme(scheme: BindingScheme) -> Self {
        match scheme {
            BindingScheme::Buffer => BuiltinKernel::RelaxBuffer,
            BindingScheme::Texture => BuiltinKernel::RelaxTexture,
        }
    }

    fn from_id(id: &str) -> Option<Self> {
        [BuiltinKernel::RelaxBuffer, BuiltinKernel::RelaxTexture]
            .into_iter()
            .find(|k| k.id() == id)
    }
}

/// Where a kernel's WGSL comes from: `builtin:<id>` or a file path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum KernelRef {
    Builtin(BuiltinKernel),
    Path(PathBuf),
}

impl TryFrom<String> for KernelRef {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.strip_prefix(BUILTIN_PREFIX) {
            Some(id) => BuiltinKernel::from_id(id)
                .map(KernelRef::Builtin)
                .ok_or_else(|| format!("unknown builtin kernel `{id}`")),
            None => Ok(KernelRef::Path(PathBuf::from(value))),
        }
    }
}

impl From<KernelRef> for String {
    fn from(value: KernelRef) -> Self {
        value.to_string()
    }
}

impl std::fmt::Display for KernelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KernelRef::Builtin(kernel) => write!(f, "{BUILTIN_PREFIX}{}", kernel.id()),
            KernelRef::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// WGSL source ready to compile.
#[derive(Debug, Clone)]
pub struct KernelSource {
    pub name: String,
    pub wgsl: Cow<'static, str>,
}

impl KernelRef {
    /// Load the kernel source.  Paths are tried as given first, then
    /// relative to `base_dir` (normally the plan file's directory).
    pub fn load(&self, base_dir: Option<&Path>) -> Result<KernelSource> {
        match self {
            KernelRef::Builtin(kernel) => Ok(KernelSource {
                name: self.to_string(),
                wgsl: Cow::Borrowed(kernel.wgsl()),
            }),
            KernelRef::Path(path) => {
                let resolved = resolve_kernel_path(path, base_dir)?;
                let wgsl = std::fs::read_to_string(&resolved).map_err(|source| BenchError::KernelRead {
                    path: resolved.clone(),
                    source,
                })?;
                Ok(KernelSource {
                    name: resolved.display().to_string(),
                    wgsl: Cow::Owned(wgsl),
                })
            }
        }
    }
}

fn resolve_kernel_path(path: &Path, base_dir: Option<&Path>) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if let Some(base) = base_dir {
        let candidate = base.join(path);
        if candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(BenchError::KernelNotFound { path: path.to_path_buf() })
}

fn storage_buffer_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn storage_texture_entry(binding: u32, access: wgpu::StorageTextureAccess) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access,
            format: FIELD_FORMAT,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        count: None,
    }
}

/// The fixed 4-slot layout for `scheme`.
pub fn layout_entries(scheme: BindingScheme) -> [wgpu::BindGroupLayoutEntry; 4] {
    let uniform = wgpu::BindGroupLayoutEntry {
        binding: 3,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: NonZeroU64::new(UNIFORM_FIELDS_SIZE as u64),
        },
        count: None,
    };
    match scheme {
        BindingScheme::Buffer => [
            storage_buffer_entry(0, true),
            storage_buffer_entry(1, true),
            storage_buffer_entry(2, false),
            uniform,
        ],
        BindingScheme::Texture => [
            storage_texture_entry(0, wgpu::StorageTextureAccess::ReadOnly),
            storage_texture_entry(1, wgpu::StorageTextureAccess::ReadOnly),
            storage_texture_entry(2, wgpu::StorageTextureAccess::WriteOnly),
            uniform,
        ],
    }
}

/// A compute pipeline built against the fixed layout of one scheme.
pub struct RelaxPipeline {
    pub name: String,
    pub scheme: BindingScheme,
    pub pipeline: ComputePipeline,
    pub bind_group_layout: BindGroupLayout,
}

impl RelaxPipeline {
    pub fn build(context: &GpuContext, kernel: &KernelSource, scheme: BindingScheme) -> Result<Self> {
        let device = &context.device;
        let ((bind_group_layout, pipeline), error) = context.validation_scope(|| {
            let module = device.create_shader_module(ShaderModuleDescriptor {
                label: Some(&kernel.name),
                source: ShaderSource::Wgsl(kernel.wgsl.clone()),
            });
            let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("relax_bind_group_layout"),
                entries: &layout_entries(scheme),
            });
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("relax_pipeline_layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });
            let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(&kernel.name),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: Some(KERNEL_ENTRY_POINT),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            });
            (bind_group_layout, pipeline)
        });
        if let Some(error) = error {
            return Err(classify_build_error(&kernel.name, error));
        }
        log::debug!("built {scheme} pipeline for {}", kernel.name);
        Ok(Self {
            name: kernel.name.clone(),
            scheme,
            pipeline,
            bind_group_layout,
        })
    }
}

fn classify_build_error(kernel: &str, error: wgpu::Error) -> BenchError {
    let message = error.to_string();
    // wgpu names the layout field when the shader's uniform struct is
    // larger than the bound record; the text may sit on a nested source.
    let mut names_binding_size = message.contains("min_binding_size");
    let mut source = std::error::Error::source(&error);
    while let Some(cause) = source {
        names_binding_size |= cause.to_string().contains("min_binding_size");
        source = cause.source();
    }
    if names_binding_size {
        BenchError::ResourceSizeMismatch {
            what: "uniform config",
            message,
        }
    } else {
        BenchError::KernelBuildFailed {
            kernel: kernel.to_string(),
            message,
        }
    }
}

/// The two precomputed binding sets of the ping-pong loop.
pub struct BindingSets {
    /// Reads ping, writes pong.
    pub a: BindGroup,
    /// Reads pong, writes ping.
    pub b: BindGroup,
}

impl BindingSets {
    pub fn new(context: &GpuContext, pipeline: &RelaxPipeline, resources: &Resources) -> Result<Self> {
        if pipeline.scheme != resources.scheme {
            return Err(BenchError::KernelBuildFailed {
                kernel: pipeline.name.clone(),
                message: format!(
                    "pipeline built for {} bindings, resources are {}",
                    pipeline.scheme, resources.scheme
                ),
            });
        }
        let ((a, b), error) = context.validation_scope(|| {
            (
                Self::bind(context, pipeline, resources, PingPongSlot::Ping, "relax_bindings_a"),
                Self::bind(context, pipeline, resources, PingPongSlot::Pong, "relax_bindings_b"),
            )
        });
        if let Some(error) = error {
            return Err(BenchError::ResourceSizeMismatch {
                what: "binding set",
                message: error.to_string(),
            });
        }
        Ok(Self { a, b })
    }

    fn bind(
        context: &GpuContext,
        pipeline: &RelaxPipeline,
        resources: &Resources,
        read: PingPongSlot,
        label: &str,
    ) -> BindGroup {
        context.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &pipeline.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: resources.cost.binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: resources.distance(read).binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: resources.distance(read.other()).binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: resources.uniforms.as_entire_binding(),
                },
            ],
        })
    }

    pub fn get(&self, read: PingPongSlot) -> &BindGroup {
        match read {
            PingPongSlot::Ping => &self.a,
            PingPongSlot::Pong => &self.b,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_refs_parse_builtins_and_paths() {
        let builtin = KernelRef::try_from("builtin:relax-texture".to_string()).unwrap();
        assert_eq!(builtin, KernelRef::Builtin(BuiltinKernel::RelaxTexture));
        assert_eq!(builtin.to_string(), "builtin:relax-texture");

        let path = KernelRef::try_from("shaders/tiled.wgsl".to_string()).unwrap();
        assert_eq!(path, KernelRef::Path(PathBuf::from("shaders/tiled.wgsl")));

        assert!(KernelRef::try_from("builtin:nope".to_string()).is_err());
    }

    #[test]
    fn missing_kernel_is_reported() {
        let kernel = KernelRef::Path(PathBuf::from("definitely/not/here.wgsl"));
        let err = kernel.load(Some(Path::new("also/not/here"))).unwrap_err();
        assert!(matches!(err, BenchError::KernelNotFound { .. }));
    }

    #[test]
    fn kernel_path_falls_back_to_base_dir() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR"));
        let kernel = KernelRef::Path(PathBuf::from("shaders/relax_buffer.wgsl"));
        let source = kernel.load(Some(dir)).unwrap();
        assert!(source.wgsl.contains("fn main"));
    }

    fn validation_error(description: &str, cause: &str) -> wgpu::Error {
        wgpu::Error::Validation {
            source: Box::new(std::io::Error::other(cause.to_string())),
            description: description.to_string(),
        }
    }

    const WRONG_BUFFER_SIZE: &str = "Buffer structure size 48, added to one element of an unbound array, \
        if it's the last field, ended up greater than the given `min_binding_size`, which is 28";

    #[test]
    fn oversized_uniform_is_a_size_mismatch() {
        let description = format!(
            "Validation Error\n\nCaused by:\n  In Device::create_compute_pipeline\n    \
             Shader global ResourceBinding {{ group: 0, binding: 3 }} is not available in the pipeline layout\n      \
             {WRONG_BUFFER_SIZE}\n"
        );
        let err = classify_build_error("relax", validation_error(&description, "create_compute_pipeline"));
        assert!(matches!(
            err,
            BenchError::ResourceSizeMismatch {
                what: "uniform config",
                ..
            }
        ));

        // the size text only on the source chain
        let err = classify_build_error("relax", validation_error("Validation Error", WRONG_BUFFER_SIZE));
        assert!(matches!(err, BenchError::ResourceSizeMismatch { .. }));
    }

    #[test]
    fn other_validation_errors_are_build_failures() {
        let err = classify_build_error(
            "relax",
            validation_error(
                "Validation Error\n\nCaused by:\n  Shader global ResourceBinding { group: 0, binding: 1 } \
                 is not available in the pipeline layout\n    Storage class Storage doesn't match the shader",
                "binding type mismatch",
            ),
        );
        match err {
            BenchError::KernelBuildFailed { kernel, message } => {
                assert_eq!(kernel, "relax");
                assert!(message.contains("Storage class"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn builtin_sources_declare_the_fixed_workgroup() {
        for kernel in [BuiltinKernel::RelaxBuffer, BuiltinKernel::RelaxTexture] {
            assert!(kernel.wgsl().contains("@workgroup_size(8, 8)"));
        }
    }

    #[test]
    fn layouts_share_slot_roles() {
        let buffer = layout_entries(BindingScheme::Buffer);
        assert!(matches!(
            buffer[1].ty,
            wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                ..
            }
        ));
        assert!(matches!(
            buffer[2].ty,
            wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: false },
                ..
            }
        ));

        let texture = layout_entries(BindingScheme::Texture);
        assert!(matches!(
            texture[0].ty,
            wgpu::BindingType::StorageTexture {
                access: wgpu::StorageTextureAccess::ReadOnly,
                ..
            }
        ));
        assert!(matches!(
            texture[2].ty,
            wgpu::BindingType::StorageTexture {
                access: wgpu::StorageTextureAccess::WriteOnly,
                ..
            }
        ));
        for entries in [buffer, texture] {
            assert_eq!(entries.map(|e| e.binding), [0, 1, 2, 3]);
            assert!(matches!(
                entries[3].ty,
                wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    ..
                }
            ));
        }
    }
}
