//! Directory-scan batch driver.
//!
//! One job per behavioural CSV in `paths.behavior_dir`, processed in file-name
//! order.  A job whose outputs all exist is skipped, so an interrupted batch
//! resumes where it stopped.  A failing job is logged and recorded; the batch
//! moves on to the next participant.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::behavior::BehavioralLog;
use crate::config::PipelineConfig;
use crate::epoch::EpochSummary;
use crate::error::{classify, ErrorKind};
use crate::exclusion::{ExclusionRegistry, ExclusionResolver, RegistryResolver};
use crate::export::{export_epochs, output_targets, OutputTarget, TensorWriter};
use crate::process_recording;

/// One participant: behavioural log, recording, and the files to produce.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub stem: String,
    pub behavior: PathBuf,
    pub recording: PathBuf,
    pub outputs: Vec<OutputTarget>,
}

impl BatchJob {
    /// Every output already exists.
    pub fn is_complete(&self) -> bool {
        self.outputs.iter().all(|t| t.path.is_file())
    }
}

/// Jobs for every `*.csv` in the behaviour directory, sorted by file name.
pub fn discover_jobs(cfg: &PipelineConfig, writer: &dyn TensorWriter) -> Result<Vec<BatchJob>> {
    let dir = &cfg.paths.behavior_dir;
    let mut csvs: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("listing behavioural logs in {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|x| x.eq_ignore_ascii_case("csv")))
        .collect();
    csvs.sort();

    let jobs = csvs
        .into_iter()
        .filter_map(|behavior| {
            let stem = behavior.file_stem()?.to_string_lossy().into_owned();
            Some(BatchJob {
                recording: cfg.paths.eeg_dir.join(format!("{stem}.bdf")),
                outputs: output_targets(
                    &cfg.paths.output_dir,
                    &stem,
                    cfg.export.layout,
                    &cfg.trials.conditions,
                    writer.extension(),
                ),
                behavior,
                stem,
            })
        })
        .collect();
    Ok(jobs)
}

/// Load, process and export one participant.
pub fn run_job<R>(
    job: &BatchJob,
    cfg: &PipelineConfig,
    resolver: &mut R,
    writer: &dyn TensorWriter,
) -> Result<(EpochSummary, Vec<PathBuf>)>
where
    R: ExclusionResolver + ?Sized,
{
    let log = BehavioralLog::load(&job.behavior)?;
    let rec = crate::bdf::read_recording(&job.recording, &cfg.channels.status, cfg.channels.status_mask)?;
    let out = process_recording(rec, &log, &job.stem, cfg, resolver)?;
    let written = export_epochs(&out.epochs, &job.outputs, writer)?;
    Ok((out.epochs.summary(), written))
}

/// A participant that did not produce outputs.
#[derive(Debug, Clone)]
pub struct FailedJob {
    pub stem: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Outcome of a whole batch.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub processed: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<FailedJob>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Run every job that is not yet complete.
pub fn run_batch<R>(cfg: &PipelineConfig, resolver: &mut R, writer: &dyn TensorWriter) -> Result<BatchReport>
where
    R: ExclusionResolver + ?Sized,
{
    let jobs = discover_jobs(cfg, writer)?;
    tracing::info!(
        paradigm = %cfg.paradigm,
        jobs = jobs.len(),
        dir = %cfg.paths.behavior_dir.display(),
        "starting batch"
    );

    let mut report = BatchReport::default();
    for job in &jobs {
        let _span = tracing::info_span!("participant", stem = %job.stem).entered();
        if job.is_complete() {
            tracing::info!("outputs exist, skipping");
            report.skipped.push(job.stem.clone());
            continue;
        }
        match run_job(job, cfg, resolver, writer) {
            Ok((summary, written)) => {
                tracing::info!(
                    retained = summary.retained,
                    rejected = summary.rejected,
                    missing = summary.missing(),
                    files = written.len(),
                    "participant done"
                );
                report.processed.push(job.stem.clone());
            }
            Err(e) => {
                let kind = classify(&e);
                let message = format!("{e:#}");
                tracing::error!(%kind, error = %message, "participant failed");
                report.failed.push(FailedJob { stem: job.stem.clone(), kind, message });
            }
        }
    }

    tracing::info!(
        processed = report.processed.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "batch finished"
    );
    Ok(report)
}

/// Registry lookup in front of `fallback`, persisting what the fallback returns.
pub fn registry_resolver<F: ExclusionResolver>(path: &Path, fallback: F) -> Result<RegistryResolver<F>> {
    let registry = ExclusionRegistry::load(path)
        .with_context(|| format!("loading exclusion registry {}", path.display()))?;
    tracing::info!(path = %path.display(), entries = registry.len(), "loaded exclusion registry");
    Ok(RegistryResolver::new(registry, fallback))
}
