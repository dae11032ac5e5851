//! Per-channel trial matrices and their on-disk formats.
//!
//! An [`ExportTensor`] holds, for every channel, a `(samples × trials)`
//! matrix in which non-retained trials are NaN columns, plus the
//! behavioural row index and condition code of each column and the epoch
//! time axis.  [`TensorWriter`] implementations serialize it; both writers
//! go through [`write_atomic`] so a file only appears once it is complete.
pub mod mat;
pub mod safetensors;

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use ndarray::{s, Array1, Array2};
use serde::{Deserialize, Serialize};

pub use mat::MatWriter;
pub use safetensors::SafetensorsWriter;

use crate::epoch::Epochs;
use crate::error::{PipelineError, Result};
use crate::labeling::ConditionRule;

/// Names every export carries next to the channel matrices.
pub const RESERVED_NAMES: [&str; 3] = ["trial_index", "condition_code", "times"];

/// Channel matrices keyed by name, in recording order.
#[derive(Debug, Clone)]
pub struct ExportTensor {
    channels: Vec<(String, Array2<f64>)>,
    trial_index: Vec<usize>,
    condition_code: Vec<u8>,
    times: Array1<f64>,
}

impl ExportTensor {
    /// Every matrix must be `(times.len(), trial_index.len())`.  Channel
    /// names must be unique and distinct from [`RESERVED_NAMES`].
    pub fn new(
        channels: Vec<(String, Array2<f64>)>,
        trial_index: Vec<usize>,
        condition_code: Vec<u8>,
        times: Array1<f64>,
    ) -> Result<Self> {
        let expected = vec![times.len(), trial_index.len()];
        if condition_code.len() != trial_index.len() {
            return Err(PipelineError::ShapeMismatch {
                name: "condition_code".into(),
                expected: vec![trial_index.len()],
                got: vec![condition_code.len()],
            });
        }
        let mut seen = std::collections::HashSet::new();
        for (name, m) in &channels {
            if RESERVED_NAMES.contains(&name.as_str()) || !seen.insert(name.as_str()) {
                return Err(PipelineError::Malformed {
                    what: "export tensor".into(),
                    reason: format!("channel name '{name}' is duplicated or reserved"),
                });
            }
            if m.shape() != expected.as_slice() {
                return Err(PipelineError::ShapeMismatch {
                    name: name.clone(),
                    expected,
                    got: m.shape().to_vec(),
                });
            }
        }
        Ok(Self { channels, trial_index, condition_code, times })
    }

    /// Transpose `[N, C, S]` epochs into one `(S × N)` matrix per channel.
    pub fn from_epochs(epochs: &Epochs) -> Result<Self> {
        let channels = epochs
            .ch_names
            .iter()
            .enumerate()
            .map(|(c, name)| (name.clone(), epochs.data.slice(s![.., c, ..]).t().to_owned()))
            .collect();
        Self::new(
            channels,
            epochs.trial_index.clone(),
            epochs.codes.clone(),
            epochs.times.clone(),
        )
    }

    pub fn get(&self, name: &str) -> Option<&Array2<f64>> {
        self.channels.iter().find(|(n, _)| n == name).map(|(_, m)| m)
    }

    pub fn channels(&self) -> impl Iterator<Item = (&str, &Array2<f64>)> {
        self.channels.iter().map(|(n, m)| (n.as_str(), m))
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn n_trials(&self) -> usize {
        self.trial_index.len()
    }

    pub fn n_samples(&self) -> usize {
        self.times.len()
    }

    pub fn trial_index(&self) -> &[usize] {
        &self.trial_index
    }

    pub fn condition_code(&self) -> &[u8] {
        &self.condition_code
    }

    pub fn times(&self) -> &Array1<f64> {
        &self.times
    }
}

/// Serializes one tensor to one file.
pub trait TensorWriter {
    /// File extension without the dot.
    fn extension(&self) -> &'static str;

    fn write(&self, tensor: &ExportTensor, path: &Path) -> anyhow::Result<()>;
}

/// Output file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// MATLAB level-5 `.mat`.
    #[default]
    Mat,
    Safetensors,
}

impl OutputFormat {
    pub fn writer(self) -> Box<dyn TensorWriter> {
        match self {
            OutputFormat::Mat => Box::new(MatWriter),
            OutputFormat::Safetensors => Box::new(SafetensorsWriter),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Mat => "mat",
            OutputFormat::Safetensors => "safetensors",
        }
    }
}

/// One file for all trials, or one file per condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExportLayout {
    #[default]
    Combined,
    PerCondition,
}

/// A file to produce and the condition it holds (`None` for all trials).
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTarget {
    pub path: PathBuf,
    pub condition: Option<ConditionRule>,
}

/// Where a participant's outputs go.
///
/// Combined: `<dir>/<stem>.<ext>`.
/// Per condition: `<dir>/<Condition>/<stem>_<Condition>.<ext>`.
pub fn output_targets(
    output_dir: &Path,
    stem: &str,
    layout: ExportLayout,
    rules: &[ConditionRule],
    extension: &str,
) -> Vec<OutputTarget> {
    match layout {
        ExportLayout::Combined => vec![OutputTarget {
            path: output_dir.join(format!("{stem}.{extension}")),
            condition: None,
        }],
        ExportLayout::PerCondition => rules
            .iter()
            .map(|r| OutputTarget {
                path: output_dir
                    .join(&r.export_name)
                    .join(format!("{stem}_{}.{extension}", r.export_name)),
                condition: Some(r.clone()),
            })
            .collect(),
    }
}

/// Write every target for one participant; returns the written paths.
pub fn export_epochs(
    epochs: &Epochs,
    targets: &[OutputTarget],
    writer: &dyn TensorWriter,
) -> anyhow::Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(targets.len());
    for target in targets {
        let tensor = match &target.condition {
            None => ExportTensor::from_epochs(epochs)?,
            Some(rule) => ExportTensor::from_epochs(&epochs.select_condition(rule.code))?,
        };
        if let Some(dir) = target.path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating output directory {}", dir.display()))?;
        }
        writer
            .write(&tensor, &target.path)
            .with_context(|| format!("writing {}", target.path.display()))?;
        tracing::info!(
            path = %target.path.display(),
            channels = tensor.channels.len(),
            trials = tensor.n_trials(),
            "wrote epochs"
        );
        written.push(target.path.clone());
    }
    Ok(written)
}

/// Write through a temp file in the destination directory, then rename.
pub(crate) fn write_atomic<F>(path: &Path, fill: F) -> anyhow::Result<()>
where
    F: FnOnce(&mut std::io::BufWriter<&mut std::fs::File>) -> anyhow::Result<()>,
{
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temporary file in {}", dir.display()))?;
    {
        let mut w = std::io::BufWriter::new(tmp.as_file_mut());
        fill(&mut w)?;
        w.flush()?;
    }
    tmp.persist(path)
        .with_context(|| format!("renaming into {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epoch::TrialStatus;
    use crate::labeling::Criterion;
    use ndarray::{array, Array3};

    fn epochs() -> Epochs {
        let mut data = Array3::from_shape_fn((3, 2, 4), |(n, c, s)| (n * 100 + c * 10 + s) as f64);
        data.slice_mut(s![1, .., ..]).fill(f64::NAN);
        Epochs {
            data,
            status: vec![TrialStatus::Retained, TrialStatus::OutOfBounds, TrialStatus::Retained],
            codes: vec![1, 2, 1],
            trial_index: vec![32, 33, 34],
            ch_names: vec!["Fz".into(), "Cz".into()],
            times: array![-0.1, 0.0, 0.1, 0.2],
        }
    }

    #[test]
    fn channel_matrices_are_samples_by_trials() {
        let t = ExportTensor::from_epochs(&epochs()).unwrap();
        let cz = t.get("Cz").unwrap();
        assert_eq!(cz.dim(), (4, 3));
        assert_eq!(cz[[2, 0]], 12.0);
        assert_eq!(cz[[3, 2]], 213.0);
        assert!(cz.column(1).iter().all(|v| v.is_nan()));
        assert_eq!(t.channel_names(), vec!["Fz", "Cz"]);
    }

    #[test]
    fn mismatched_matrix_rejected() {
        let err = ExportTensor::new(
            vec![("Fz".into(), Array2::zeros((3, 2)))],
            vec![0, 1],
            vec![1, 1],
            array![0.0, 0.1],
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::ShapeMismatch { .. }));
    }

    #[test]
    fn per_condition_paths() {
        let rules = vec![
            ConditionRule::new(1, "Go/smoking", "Go_smoking", vec![Criterion::new("Stimulus", "Go")]),
            ConditionRule::new(2, "NoGo/smoking", "Nogo_smoking", vec![Criterion::new("Stimulus", "NoGo")]),
        ];
        let t = output_targets(Path::new("out"), "p01", ExportLayout::PerCondition, &rules, "mat");
        assert_eq!(t[0].path, Path::new("out/Go_smoking/p01_Go_smoking.mat"));
        assert_eq!(t[1].path, Path::new("out/Nogo_smoking/p01_Nogo_smoking.mat"));

        let c = output_targets(Path::new("out"), "p01", ExportLayout::Combined, &rules, "safetensors");
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].path, Path::new("out/p01.safetensors"));
    }

    #[test]
    fn condition_split_partitions_trials() {
        let ep = epochs();
        let ones = ExportTensor::from_epochs(&ep.select_condition(1)).unwrap();
        let twos = ExportTensor::from_epochs(&ep.select_condition(2)).unwrap();
        assert_eq!(ones.trial_index(), &[32, 34]);
        assert_eq!(twos.trial_index(), &[33]);
        assert_eq!(ones.n_trials() + twos.n_trials(), ep.n_trials());
    }

    #[test]
    fn atomic_write_leaves_no_file_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.bin");
        let res = write_atomic(&path, |w| {
            w.write_all(b"partial")?;
            anyhow::bail!("boom")
        });
        assert!(res.is_err());
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
