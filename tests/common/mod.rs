use wgpu_relax_bench::GpuContext;

/// A device context, or `None` on machines without a usable adapter so
/// GPU tests pass vacuously on headless CI.
pub fn gpu_context() -> Option<GpuContext> {
    let _ = env_logger::builder().is_test(true).try_init();
    match GpuContext::new_blocking() {
        Ok(context) => Some(context),
        Err(e) => {
            eprintln!("skipping GPU test: {e}");
            None
        }
    }
}
