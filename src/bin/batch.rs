use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use erpbatch::batch::{registry_resolver, run_batch};
use erpbatch::exclusion::{ExclusionResolver, FailFast, InteractivePrompt};
use erpbatch::logging::init_tracing;
use erpbatch::{OutputFormat, Paradigm, PipelineConfig};

#[derive(Parser)]
#[command(name = "erp-batch", about = "Batch ERP preprocessing over a paradigm's behavioural logs")]
struct Args {
    #[arg(long, value_enum)]
    paradigm: Paradigm,

    /// TOML file overriding the paradigm defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Fail participants missing from the exclusion registry instead of prompting
    #[arg(long)]
    non_interactive: bool,

    /// Output format (default: from config, `mat`)
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = init_tracing(args.quiet, args.verbose) {
        eprintln!("{e:#}");
        return ExitCode::FAILURE;
    }
    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(kind = %erpbatch::classify(&e), "{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<bool> {
    let mut cfg = PipelineConfig::load(args.paradigm, args.config.as_deref())?;
    if let Some(format) = args.format {
        cfg.export.format = format;
    }

    let fallback: Box<dyn ExclusionResolver> = if args.non_interactive {
        Box::new(FailFast)
    } else {
        Box::new(InteractivePrompt::stdio())
    };
    let mut resolver = registry_resolver(&cfg.paths.registry, fallback)?;
    let writer = cfg.export.format.writer();

    let report = run_batch(&cfg, &mut resolver, writer.as_ref())?;

    println!(
        "{}: {} processed, {} skipped, {} failed",
        cfg.paradigm,
        report.processed.len(),
        report.skipped.len(),
        report.failed.len()
    );
    for f in &report.failed {
        println!("  FAILED {} [{}] {}", f.stem, f.kind, f.message);
    }
    Ok(report.is_success())
}
