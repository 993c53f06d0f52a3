//! GPU context initialization.
//!
//! This module provides a thin wrapper around wgpu's instance, adapter,
//! device and queue objects together with the feature flags that were
//! negotiated for the run.  A single [`GpuContext`] is created up front
//! and passed by reference into every component; nothing in the crate
//! keeps device state in a global.  The `new_blocking` constructor hides
//! the asynchronous nature of requesting an adapter and device by using
//! the [`pollster`] crate.

use log::info;
use wgpu::{Adapter, Device, Instance, Queue};

use crate::error::{BenchError, Result};

/// Capabilities negotiated with the adapter when the device was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFeatures {
    /// Hardware timestamp queries inside compute passes are available.
    pub timestamp_query: bool,
    /// Adapter-specific texture format capabilities were enabled.  Some
    /// backends need this for read-only `r32float` storage textures.
    pub adapter_texture_formats: bool,
}

impl DeviceFeatures {
    fn negotiate(available: wgpu::Features) -> (Self, wgpu::Features) {
        let mut required = wgpu::Features::empty();
        let timestamp_query = available.contains(wgpu::Features::TIMESTAMP_QUERY);
        if timestamp_query {
            required |= wgpu::Features::TIMESTAMP_QUERY;
        }
        let adapter_texture_formats =
            available.contains(wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES);
        if adapter_texture_formats {
            required |= wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES;
        }
        (
            Self {
                timestamp_query,
                adapter_texture_formats,
            },
            required,
        )
    }
}

/// A GPU context encapsulates all state needed to submit compute work.
///
/// The context holds on to the `Instance`, `Adapter`, `Device` and
/// `Queue`.  Creating a context picks the default high performance
/// adapter on the system.  If no adapter is available or it does not
/// support compute shaders, an error is returned and the run cannot
/// continue.
pub struct GpuContext {
    pub instance: Instance,
    /// The physical device selected for computation.
    pub adapter: Adapter,
    /// Logical device used to create resources and command encoders.
    pub device: Device,
    /// Command submission queue.  All passes of a benchmark batch go
    /// through this single queue, which executes them in recorded order.
    pub queue: Queue,
    pub features: DeviceFeatures,
}

impl GpuContext {
    /// Create a new GPU context synchronously.
    ///
    /// This function will block the current thread while waiting for
    /// the asynchronous adapter and device requests to finish.
    pub fn new_blocking() -> Result<Self> {
        pollster::block_on(Self::new_async())
    }

    /// Create a new GPU context asynchronously.
    pub async fn new_async() -> Result<Self> {
        let instance = Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| BenchError::NoAdapter)?;
        // Downlevel devices may not support compute on all backends;
        // abort early if unsupported.
        let capabilities = adapter.get_downlevel_capabilities();
        if !capabilities.flags.contains(wgpu::DownlevelFlags::COMPUTE_SHADERS) {
            return Err(BenchError::ComputeUnsupported);
        }

        let (features, required_features) = DeviceFeatures::negotiate(adapter.features());
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("relax_bench_device"),
                required_features,
                required_limits: adapter.limits(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| BenchError::DeviceRequest(e.to_string()))?;

        let adapter_info = adapter.get_info();
        info!(
            "adapter: {} ({:?}, {:?})",
            adapter_info.name, adapter_info.device_type, adapter_info.backend
        );
        info!("timestamp queries: {}", features.timestamp_query);
        info!(
            "max texture edge: {}, max storage binding: {} bytes",
            device.limits().max_texture_dimension_2d,
            device.limits().max_storage_buffer_binding_size
        );

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            features,
        })
    }

    /// Run `f` inside a validation error scope and return whatever
    /// validation error the device reported for the work it did.
    ///
    /// Without a scope, wgpu routes validation errors to the uncaptured
    /// error handler, which panics.
    pub fn validation_scope<T>(&self, f: impl FnOnce() -> T) -> (T, Option<wgpu::Error>) {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let out = f();
        let error = pollster::block_on(self.device.pop_error_scope());
        (out, error)
    }

    /// Nanoseconds per timestamp tick as reported by the queue.
    ///
    /// Falls back to `1.0` when the queue reports a non-finite or
    /// non-positive period, in which case resolved ticks are taken to be
    /// nanoseconds already.
    pub fn timestamp_period(&self) -> f64 {
        calibrated_period(self.queue.get_timestamp_period())
    }
}

pub(crate) fn calibrated_period(reported: f32) -> f64 {
    if reported.is_finite() && reported > 0.0 {
        reported as f64
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiates_only_available_features() {
        let (features, required) = DeviceFeatures::negotiate(wgpu::Features::TIMESTAMP_QUERY);
        assert!(features.timestamp_query);
        assert!(!features.adapter_texture_formats);
        assert_eq!(required, wgpu::Features::TIMESTAMP_QUERY);

        let (features, required) = DeviceFeatures::negotiate(wgpu::Features::empty());
        assert!(!features.timestamp_query);
        assert!(required.is_empty());
    }

    #[test]
    fn period_falls_back_to_nanoseconds() {
        assert_eq!(calibrated_period(0.0), 1.0);
        assert_eq!(calibrated_period(-2.0), 1.0);
        assert_eq!(calibrated_period(f32::NAN), 1.0);
        assert_eq!(calibrated_period(83.333), 83.333f32 as f64);
    }
}
