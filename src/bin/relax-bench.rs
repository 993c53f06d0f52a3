//! Command line front end: run a benchmark plan and print the report.
//!
//! ```text
//! relax-bench --plan plans/tiled.toml --iterations 370
//! RUST_LOG=info relax-bench --grid-size 512
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use wgpu_relax_bench::{run_plan, BenchmarkPlan, GpuContext, OnError, RunReport, VariantOutcome};

#[derive(Parser, Debug)]
#[command(name = "relax-bench", about = "Time ping-pong relaxation kernels on the GPU")]
struct Args {
    /// TOML plan listing the variants to run.  Without it the two shipped
    /// kernels are run.
    #[arg(long)]
    plan: Option<PathBuf>,

    /// Override the plan's grid edge length.
    #[arg(long)]
    grid_size: Option<u32>,

    /// Override every variant's iteration count.
    #[arg(long)]
    iterations: Option<u32>,

    /// Stop at the first failing variant.
    #[arg(long, conflicts_with = "keep_going")]
    abort_on_error: bool,

    /// Record failing variants and continue.
    #[arg(long)]
    keep_going: bool,
}

fn load_plan(args: &Args) -> wgpu_relax_bench::Result<BenchmarkPlan> {
    let mut plan = match &args.plan {
        Some(path) => BenchmarkPlan::from_file(path)?,
        None => BenchmarkPlan::default(),
    };
    if let Some(size) = args.grid_size {
        plan.grid_size = size;
        plan.goal = None;
    }
    if let Some(iterations) = args.iterations {
        plan = plan.with_iterations(iterations);
    }
    if args.abort_on_error {
        plan.on_error = OnError::Abort;
    } else if args.keep_going {
        plan.on_error = OnError::Skip;
    }
    Ok(plan)
}

fn print_report(report: &RunReport) {
    let cells = report.grid_size as usize * report.grid_size as usize;
    println!(
        "{:<32} {:>8} {:>10} {:>14} {:>14} {:>18}",
        "variant", "scheme", "iters", "mean ms/iter", "total GPU ms", "filled cells"
    );
    for outcome in &report.outcomes {
        match outcome {
            VariantOutcome::Completed(r) => {
                let (mean, total) = match &r.timings {
                    Some(t) => (format!("{:.4}", t.mean_ms()), format!("{:.4}", t.total_ms())),
                    None => ("n/a".to_string(), "n/a".to_string()),
                };
                println!(
                    "{:<32} {:>8} {:>10} {:>14} {:>14} {:>18}",
                    r.name,
                    r.scheme.to_string(),
                    r.iterations,
                    mean,
                    total,
                    format!("{}/{}", r.visited, cells)
                );
            }
            VariantOutcome::Failed { name, error } => {
                println!("{name:<32} FAILED: {error}");
            }
        }
    }
    if report.completed().any(|r| r.timings.is_none()) {
        println!("\ntimestamp queries not supported on this adapter; timing unavailable");
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let plan = match load_plan(&args) {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let context = match GpuContext::new_blocking() {
        Ok(context) => context,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run_plan(&context, &plan) {
        Ok(report) => {
            print_report(&report);
            if report.failures() > 0 {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
