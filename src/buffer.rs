//! Typed GPU buffers and host readback utilities.
//!
//! This module defines a [`GpuBuffer`] wrapper around [`wgpu::Buffer`]
//! that tracks the number of typed elements stored in the buffer and
//! provides convenience methods for uploading and downloading data.
//! Host reads go through [`read_mapped`], which holds the mapping for the
//! duration of a closure and unmaps on every exit path.

use std::marker::PhantomData;

use bytemuck::{cast_slice, Pod};
use wgpu::{Buffer, BufferAddress, BufferDescriptor, BufferUsages};

use crate::error::{BenchError, Result};
use crate::GpuContext;

/// A typed GPU buffer.
///
/// The length records how many elements of type `T` are stored in the
/// buffer; the size in bytes is `len * size_of::<T>()`.
pub struct GpuBuffer<T: Pod> {
    pub buffer: Buffer,
    pub len: usize,
    _marker: PhantomData<T>,
}

impl<T: Pod> GpuBuffer<T> {
    /// Create a storage buffer holding a copy of `data`.
    ///
    /// The buffer has usage `STORAGE | COPY_DST` plus whatever is passed
    /// in `usage`.  Contents are written via the queue, so `MAP_WRITE` is
    /// not required.
    pub fn from_slice(context: &GpuContext, label: &str, data: &[T], usage: BufferUsages) -> Self {
        let bytes: &[u8] = cast_slice(data);
        let buffer = context.device.create_buffer(&BufferDescriptor {
            label: Some(label),
            size: bytes.len() as u64,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST | usage,
            mapped_at_creation: false,
        });
        context.queue.write_buffer(&buffer, 0, bytes);
        Self {
            buffer,
            len: data.len(),
            _marker: PhantomData,
        }
    }

    /// Create a download buffer sized to hold `len` elements.  It has
    /// usage `COPY_DST | MAP_READ` and cannot be bound to a shader.
    pub fn new_download(context: &GpuContext, label: &str, len: usize) -> Self {
        let buffer = staging_buffer(context, label, (len * std::mem::size_of::<T>()) as u64);
        Self {
            buffer,
            len,
            _marker: PhantomData,
        }
    }

    pub fn size_bytes(&self) -> BufferAddress {
        (self.len * std::mem::size_of::<T>()) as BufferAddress
    }

    /// Read the contents of a `MAP_READ` buffer back to the CPU.
    ///
    /// Blocks until the device has finished all outstanding work and the
    /// mapping is ready.  The buffer is unmapped before returning.
    pub fn read_to_vec(&self, context: &GpuContext) -> Result<Vec<T>> {
        read_mapped(context, &self.buffer, |bytes| {
            let values: &[T] = cast_slice(bytes);
            values[..self.len].to_vec()
        })
    }

    /// Copy the first `len` elements of `source` into a fresh staging
    /// buffer and read them back.  `source` must carry `COPY_SRC`.
    pub fn readback_blocking(context: &GpuContext, source: &Buffer, len: usize) -> Result<Vec<T>> {
        let download = Self::new_download(context, "readback_staging", len);
        let mut encoder = context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("readback_encoder") });
        encoder.copy_buffer_to_buffer(source, 0, &download.buffer, 0, download.size_bytes());
        context.queue.submit([encoder.finish()]);
        download.read_to_vec(context)
    }
}

/// Create a host-mappable staging buffer of `size` bytes.
pub fn staging_buffer(context: &GpuContext, label: &str, size: BufferAddress) -> Buffer {
    context.device.create_buffer(&BufferDescriptor {
        label: Some(label),
        size,
        usage: BufferUsages::COPY_DST | BufferUsages::MAP_READ,
        mapped_at_creation: false,
    })
}

/// Unmaps its buffer when dropped, unless the map request failed and
/// there is nothing to release.
struct MapGuard<'a> {
    buffer: &'a Buffer,
    armed: bool,
}

impl Drop for MapGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.buffer.unmap();
        }
    }
}

/// Map `buffer` for reading, block until the mapping is ready, and hand
/// the mapped bytes to `read`.
///
/// The mapping is released on every exit path: after `read` returns, when
/// polling the device fails while the request is still pending, and while
/// unwinding out of `read`.
pub fn read_mapped<R>(context: &GpuContext, buffer: &Buffer, read: impl FnOnce(&[u8]) -> R) -> Result<R> {
    let slice = buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    let mut guard = MapGuard { buffer, armed: true };

    context.device.poll(wgpu::PollType::Wait)?;
    match rx.recv() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            guard.armed = false;
            return Err(BenchError::BufferMap(e));
        }
        Err(_) => return Err(BenchError::MapChannelClosed),
    }

    let view = slice.get_mapped_range();
    let out = read(&view[..]);
    drop(view);
    drop(guard);
    Ok(out)
}
