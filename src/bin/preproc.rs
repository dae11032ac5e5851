use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use erpbatch::exclusion::FixedExclusions;
use erpbatch::export::{export_epochs, OutputTarget};
use erpbatch::logging::init_tracing;
use erpbatch::{process_recording, BehavioralLog, ExclusionSet, OutputFormat, Paradigm, PipelineConfig};

#[derive(Parser)]
#[command(name = "erp-preproc", about = "Preprocess one participant with a fixed ICA exclusion list")]
struct Args {
    #[arg(long, value_enum)]
    paradigm: Paradigm,

    /// Behavioural CSV for this participant
    #[arg(long)]
    behavior: PathBuf,

    /// BDF recording
    #[arg(long)]
    eeg: PathBuf,

    /// Output file; per-condition paradigms write one file per condition
    /// next to it, suffixed with the condition name
    #[arg(long)]
    output: PathBuf,

    /// ICA components to remove (comma-separated)
    #[arg(long, value_delimiter = ',', default_value = "8")]
    exclude: Vec<usize>,

    /// TOML file overriding the paradigm defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output format (default: inferred from the extension, else `mat`)
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.quiet, args.verbose)?;

    let cfg = PipelineConfig::load(args.paradigm, args.config.as_deref())?;
    let format = args.format.unwrap_or_else(|| {
        match args.output.extension().and_then(|e| e.to_str()) {
            Some("safetensors") => OutputFormat::Safetensors,
            _ => cfg.export.format,
        }
    });

    let log = BehavioralLog::load(&args.behavior)?;
    let rec = erpbatch::bdf::read_recording(&args.eeg, &cfg.channels.status, cfg.channels.status_mask)?;
    let id = args
        .eeg
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .context("--eeg has no file name")?;

    let mut resolver = FixedExclusions(args.exclude.iter().copied().collect::<ExclusionSet>());
    let out = process_recording(rec, &log, &id, &cfg, &mut resolver)?;
    let s = out.epochs.summary();
    println!(
        "{id}: {} trials, {} retained, {} rejected, {} missing",
        s.total(),
        s.retained,
        s.rejected,
        s.missing()
    );

    let targets = output_targets_for(&args.output, &cfg);
    let written = export_epochs(&out.epochs, &targets, format.writer().as_ref())?;
    for path in written {
        println!("Written → {}", path.display());
    }
    Ok(())
}

/// `--output` as given for combined exports; `<stem>_<Condition>.<ext>`
/// siblings for per-condition exports.
fn output_targets_for(output: &std::path::Path, cfg: &PipelineConfig) -> Vec<OutputTarget> {
    match cfg.export.layout {
        erpbatch::ExportLayout::Combined => vec![OutputTarget { path: output.to_path_buf(), condition: None }],
        erpbatch::ExportLayout::PerCondition => {
            let stem = output.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
            let ext = output.extension().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| "mat".into());
            cfg.trials
                .conditions
                .iter()
                .map(|r| OutputTarget {
                    path: output.with_file_name(format!("{stem}_{}.{ext}", r.export_name)),
                    condition: Some(r.clone()),
                })
                .collect()
        }
    }
}
