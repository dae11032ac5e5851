//! Pipeline configuration.
//!
//! [`PipelineConfig`] holds every tunable parameter of a participant run.
//! [`PipelineConfig::for_paradigm`] returns the settings each study was
//! analysed with; [`PipelineConfig::load`] layers overrides on top:
//!
//! 1. paradigm defaults
//! 2. an optional TOML file
//! 3. `ERPBATCH_*` environment variables, `__` separating nested keys
//!    (`ERPBATCH_ICA__DECIM=2` → `ica.decim`)
use std::ops::Range;
use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::behavior::DEFAULT_RESPONSE_COLUMN;
use crate::bdf::DEFAULT_STATUS_MASK;
use crate::epoch::{EpochWindow, Rejection};
use crate::error::{PipelineError, Result};
use crate::export::{ExportLayout, OutputFormat};
use crate::labeling::{ConditionRule, Criterion};
use crate::markers::{TruncationPolicy, DEFAULT_STEP};

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "ERPBATCH_";

/// The three studies this pipeline processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Paradigm {
    /// Flanker task; epochs re-anchored to the response.
    #[default]
    Eriksen,
    #[value(name = "gonogo")]
    #[serde(rename = "gonogo")]
    GoNoGo,
    /// Go/NoGo with smoking and neutral cues.
    #[value(name = "smoking-gonogo")]
    #[serde(rename = "smoking-gonogo")]
    SmokingGoNoGo,
}

impl std::fmt::Display for Paradigm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Paradigm::Eriksen => "eriksen",
            Paradigm::GoNoGo => "gonogo",
            Paradigm::SmokingGoNoGo => "smoking-gonogo",
        })
    }
}

/// Channel names and types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// BioSemi trigger channel.
    pub status: String,
    /// Trigger bits kept from each status word.
    pub status_mask: u32,
    /// Electrodes typed EOG: kept for ICA, excluded from nothing.
    pub eog: Vec<String>,
    /// Auxiliary electrodes typed misc: excluded from ICA and epochs.
    pub misc: Vec<String>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            status: "Status".into(),
            status_mask: DEFAULT_STATUS_MASK,
            eog: vec!["EXG1".into()],
            misc: (2..=8).map(|i| format!("EXG{i}")).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerConfig {
    /// Status difference `s[i] − s[i+1]` marking an onset.
    pub step: f64,
    pub truncation: TruncationPolicy,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self { step: DEFAULT_STEP, truncation: TruncationPolicy::KeepFirst }
    }
}

/// Zero-phase FIR band-pass.
///
/// At the defaults and 1024 Hz the design has 22 529 taps (the 0.15 Hz
/// lower edge sets the transition band).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub l_freq: f64,
    pub h_freq: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self { l_freq: 0.15, h_freq: 30.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IcaConfig {
    /// `None`: one component per selected channel.
    pub n_components: Option<usize>,
    /// Fit on every `decim`-th sample.
    pub decim: usize,
    pub random_state: u64,
    pub max_iter: usize,
    pub tol: f64,
}

impl Default for IcaConfig {
    fn default() -> Self {
        Self { n_components: None, decim: 3, random_state: 23, max_iter: 200, tol: 1e-4 }
    }
}

/// Trial bookkeeping for one paradigm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialConfig {
    /// Onsets kept from the status channel; also the behavioural row count.
    pub expected_trials: usize,
    pub conditions: Vec<ConditionRule>,
    /// Trials that are epoched; `None` means all of them.
    pub analysis_range: Option<Range<usize>>,
    /// Shift each onset by the trial's response latency.
    pub realign_to_response: bool,
    pub response_column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochConfig {
    pub window: EpochWindow,
    pub reject: Option<Rejection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    pub layout: ExportLayout,
    pub format: OutputFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathConfig {
    /// Behavioural CSVs; one participant per file.
    pub behavior_dir: PathBuf,
    /// `<stem>.bdf` recordings matching the behavioural file stems.
    pub eeg_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Component exclusion registry CSV.
    pub registry: PathBuf,
}

/// Configuration for one paradigm's pipeline.
///
/// All fields are `pub` so overrides can use struct-update syntax:
///
/// ```
/// use erpbatch::{Paradigm, PipelineConfig};
///
/// let base = PipelineConfig::for_paradigm(Paradigm::GoNoGo);
/// let cfg = PipelineConfig {
///     sfreq: 2048.0,
///     ..base
/// };
/// assert_eq!(cfg.trials.expected_trials, 420);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Set by the caller, never read from files or the environment.
    #[serde(skip)]
    pub paradigm: Paradigm,
    /// Sampling rate every recording must have, in Hz.
    pub sfreq: f64,
    pub channels: ChannelConfig,
    pub markers: MarkerConfig,
    pub filter: FilterConfig,
    pub ica: IcaConfig,
    pub trials: TrialConfig,
    pub epoch: EpochConfig,
    pub export: ExportConfig,
    pub paths: PathConfig,
}

fn rule(code: u8, name: &str, export_name: &str, when: &[(&str, &str)]) -> ConditionRule {
    ConditionRule::new(
        code,
        name,
        export_name,
        when.iter().map(|(c, v)| Criterion::new(c, v)).collect(),
    )
}

impl PipelineConfig {
    /// Settings the study was analysed with.
    ///
    /// | paradigm        | trials | analysed  | anchor   | reject  | export        |
    /// |-----------------|--------|-----------|----------|---------|---------------|
    /// | Eriksen         | 420    | all       | response | 100 µV  | combined      |
    /// | Go/NoGo         | 420    | all       | stimulus | none    | combined      |
    /// | smoking Go/NoGo | 208    | 32..208   | stimulus | 100 µV  | per condition |
    pub fn for_paradigm(paradigm: Paradigm) -> Self {
        let (trials, reject, layout, paths) = match paradigm {
            Paradigm::Eriksen => (
                TrialConfig {
                    expected_trials: 420,
                    conditions: vec![
                        rule(1, "correct", "correct", &[("correct", "1")]),
                        rule(2, "incorrect", "incorrect", &[("correct", "0")]),
                    ],
                    analysis_range: None,
                    realign_to_response: true,
                    response_column: DEFAULT_RESPONSE_COLUMN.into(),
                },
                Some(Rejection::absolute(100e-6)),
                ExportLayout::Combined,
                paths("Eriksen", "Rdata/Eriksen", "Eriksen.csv"),
            ),
            Paradigm::GoNoGo => (
                TrialConfig {
                    expected_trials: 420,
                    conditions: vec![
                        rule(1, "Go", "Go", &[("Stim_type", "Go")]),
                        rule(2, "NoGo", "NoGo", &[("Stim_type", "NoGo")]),
                    ],
                    analysis_range: None,
                    realign_to_response: false,
                    response_column: DEFAULT_RESPONSE_COLUMN.into(),
                },
                None,
                ExportLayout::Combined,
                paths("Go-NoGo", "Rdata/Go-NoGo", "GoNoGo.csv"),
            ),
            Paradigm::SmokingGoNoGo => (
                TrialConfig {
                    expected_trials: 208,
                    conditions: vec![
                        rule(1, "Go/smoking", "Go_smoking", &[("Stimulus", "Go"), ("Cue_type", "smoking")]),
                        rule(2, "Go/neutral", "Go_neutral", &[("Stimulus", "Go"), ("Cue_type", "neutral")]),
                        rule(3, "NoGo/smoking", "Nogo_smoking", &[("Stimulus", "NoGo"), ("Cue_type", "smoking")]),
                        rule(4, "NoGo/neutral", "Nogo_neutral", &[("Stimulus", "NoGo"), ("Cue_type", "neutral")]),
                    ],
                    analysis_range: Some(32..208),
                    realign_to_response: false,
                    response_column: DEFAULT_RESPONSE_COLUMN.into(),
                },
                Some(Rejection::absolute(100e-6)),
                ExportLayout::PerCondition,
                paths("Smoking-nogo", "Kieron_data", "Smokingnogo.csv"),
            ),
        };

        Self {
            paradigm,
            sfreq: 1024.0,
            channels: ChannelConfig::default(),
            markers: MarkerConfig::default(),
            filter: FilterConfig::default(),
            ica: IcaConfig::default(),
            trials,
            epoch: EpochConfig { window: EpochWindow::default(), reject },
            export: ExportConfig { layout, format: OutputFormat::Mat },
            paths,
        }
    }

    /// Paradigm defaults → TOML file (if given) → `ERPBATCH_*` environment.
    pub fn figment(paradigm: Paradigm, file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::for_paradigm(paradigm)));
        if let Some(path) = file {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load and validate.
    pub fn load(paradigm: Paradigm, file: Option<&Path>) -> Result<Self> {
        if let Some(path) = file {
            if !path.is_file() {
                return Err(PipelineError::invalid_config(
                    "config",
                    format!("{} does not exist", path.display()),
                ));
            }
        }
        let mut cfg: Self = Self::figment(paradigm, file).extract().map_err(|e| {
            let field = if e.path.is_empty() { "config".to_string() } else { e.path.join(".") };
            PipelineError::InvalidConfig { field, reason: e.kind.to_string() }
        })?;
        cfg.paradigm = paradigm;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Trials that are epoched and exported.
    pub fn analysis_range(&self) -> Range<usize> {
        self.trials.analysis_range.clone().unwrap_or(0..self.trials.expected_trials)
    }

    /// Check internal consistency before any data is touched.
    pub fn validate(&self) -> Result<()> {
        fn bad(field: &str, reason: impl Into<String>) -> PipelineError {
            PipelineError::invalid_config(field, reason)
        }
        if !(self.sfreq > 0.0) {
            return Err(bad("sfreq", format!("{} Hz is not positive", self.sfreq)));
        }
        if self.channels.status_mask == 0 {
            return Err(bad("channels.status_mask", "mask keeps no trigger bits"));
        }

        let nyq = self.sfreq / 2.0;
        let FilterConfig { l_freq, h_freq } = self.filter;
        if !(l_freq > 0.0 && l_freq < h_freq && h_freq < nyq) {
            return Err(bad(
                "filter",
                format!("need 0 < l_freq < h_freq < {nyq} Hz, got {l_freq}..{h_freq}"),
            ));
        }

        if self.ica.decim == 0 {
            return Err(bad("ica.decim", "must be at least 1"));
        }
        if self.ica.n_components == Some(0) {
            return Err(bad("ica.n_components", "must be at least 1"));
        }
        if self.ica.max_iter == 0 || !(self.ica.tol > 0.0) {
            return Err(bad("ica", "max_iter and tol must be positive"));
        }

        let t = &self.trials;
        if t.expected_trials == 0 {
            return Err(bad("trials.expected_trials", "must be at least 1"));
        }
        if let Some(r) = &t.analysis_range {
            if r.start >= r.end || r.end > t.expected_trials {
                return Err(bad(
                    "trials.analysis_range",
                    format!("{r:?} is not a non-empty range within 0..{}", t.expected_trials),
                ));
            }
        }
        if t.conditions.is_empty() {
            return Err(bad("trials.conditions", "no condition rules"));
        }
        let mut seen = std::collections::BTreeSet::new();
        for c in &t.conditions {
            if c.code == crate::labeling::UNLABELED || !seen.insert(c.code) {
                return Err(bad(
                    "trials.conditions",
                    format!("condition '{}' needs a unique non-zero code, got {}", c.name, c.code),
                ));
            }
            if c.export_name.is_empty() {
                return Err(bad("trials.conditions", format!("condition '{}' has no export name", c.name)));
            }
        }
        if t.realign_to_response && t.response_column.trim().is_empty() {
            return Err(bad("trials.response_column", "required when realigning to the response"));
        }

        let w = &self.epoch.window;
        if !(w.tmin < w.tmax) {
            return Err(bad("epoch.window", format!("tmin {} must precede tmax {}", w.tmin, w.tmax)));
        }
        w.baseline_range(self.sfreq)?;
        if let Some(r) = &self.epoch.reject {
            if !(r.threshold > 0.0) {
                return Err(bad("epoch.reject.threshold", "must be positive"));
            }
        }
        Ok(())
    }
}

fn paths(dir: &str, output: &str, registry: &str) -> PathConfig {
    PathConfig {
        behavior_dir: Path::new("Raw_data/Behavioural").join(dir),
        eeg_dir: Path::new("Raw_data/EEG").join(dir),
        output_dir: PathBuf::from(output),
        registry: PathBuf::from(registry),
    }
}
