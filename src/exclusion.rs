//! ICA component exclusions: the flat index set, the per-paradigm registry
//! file, and the strategies that decide a recording's exclusions.
//!
//! Registry layout (one row per recording, append-only):
//!
//! ```text
//! filename,Exclude0,Exclude1,Exclude2,Exclude3,Exclude4,Exclude5,ExcludeX
//! 1001-eriksen,0,3,,,,,
//! ```
//!
//! Reading stops at the first empty `Exclude*` cell of a row.
use std::collections::BTreeSet;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};

/// Exclusion columns written for every row (the last one is named `ExcludeX`).
const MIN_EXCLUDE_COLUMNS: usize = 7;

// ── ExclusionSet ─────────────────────────────────────────────────────────────

/// Flat, ordered set of component indices to remove.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet(BTreeSet<usize>);

impl ExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, index: usize) -> bool {
        self.0.insert(index)
    }

    pub fn contains(&self, index: usize) -> bool {
        self.0.contains(&index)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    /// Every index must name one of `n_components` fitted components.
    pub fn validate(&self, n_components: usize) -> Result<()> {
        match self.0.iter().find(|&&i| i >= n_components) {
            Some(&index) => Err(PipelineError::ExclusionOutOfRange { index, n_components }),
            None => Ok(()),
        }
    }
}

impl FromIterator<usize> for ExclusionSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ── ExclusionRegistry ───────────────────────────────────────────────────────

/// Per-paradigm record of which components were removed for each recording.
#[derive(Debug, Clone)]
pub struct ExclusionRegistry {
    path: PathBuf,
    rows: Vec<(String, Vec<usize>)>,
}

impl ExclusionRegistry {
    /// Load the registry at `path`; a missing file is an empty registry.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no exclusion registry yet; starting empty");
            return Ok(Self { path: path.to_path_buf(), rows: vec![] });
        }
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)?;
        let mut rows = Vec::new();
        for (line, record) in rdr.records().enumerate() {
            let record = record?;
            let mut fields = record.iter();
            let Some(name) = fields.next().filter(|n| !n.is_empty()) else {
                continue;
            };
            let mut indices = Vec::new();
            for cell in fields.take_while(|c| !c.is_empty()) {
                let value: f64 = cell.parse().map_err(|_| PipelineError::Malformed {
                    what: format!("exclusion registry {}", path.display()),
                    reason: format!("row {}: '{cell}' is not a component index", line + 1),
                })?;
                if value < 0.0 || value.fract() != 0.0 {
                    return Err(PipelineError::Malformed {
                        what: format!("exclusion registry {}", path.display()),
                        reason: format!("row {}: '{cell}' is not a component index", line + 1),
                    });
                }
                indices.push(value as usize);
            }
            rows.push((name.to_string(), indices));
        }
        tracing::debug!(path = %path.display(), rows = rows.len(), "loaded exclusion registry");
        Ok(Self { path: path.to_path_buf(), rows })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Exclusions recorded for `recording`, if any.
    ///
    /// When a name appears more than once the first row wins.
    pub fn lookup(&self, recording: &str) -> Option<ExclusionSet> {
        self.rows
            .iter()
            .find(|(name, _)| name == recording)
            .map(|(_, idx)| idx.iter().copied().collect())
    }

    /// Append a row and persist the whole registry atomically.
    ///
    /// On failure neither the file nor the in-memory registry changes.
    pub fn append(&mut self, recording: &str, set: &ExclusionSet) -> Result<()> {
        self.rows.push((recording.to_string(), set.iter().collect()));
        if let Err(e) = self.persist() {
            self.rows.pop();
            return Err(e);
        }
        tracing::info!(recording, components = ?set.iter().collect::<Vec<_>>(), "recorded exclusions");
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        let width = self
            .rows
            .iter()
            .map(|(_, v)| v.len())
            .max()
            .unwrap_or(0)
            .max(MIN_EXCLUDE_COLUMNS);
        let mut header = vec!["filename".to_string()];
        header.extend((0..width - 1).map(|i| format!("Exclude{i}")));
        header.push("ExcludeX".to_string());

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;
        let tmp = tempfile::NamedTempFile::new_in(&dir)?;
        {
            let mut w = csv::Writer::from_writer(tmp.as_file());
            w.write_record(&header)?;
            for (name, idx) in &self.rows {
                let mut rec = vec![name.clone()];
                rec.extend(idx.iter().map(|i| i.to_string()));
                rec.resize(width + 1, String::new());
                w.write_record(&rec)?;
            }
            w.flush()?;
        }
        tmp.persist(&self.path).map_err(|e| PipelineError::Io(e.error))?;
        Ok(())
    }
}

// ── Resolution strategies ───────────────────────────────────────────────────

/// Decides which components to remove from a recording.
pub trait ExclusionResolver {
    fn resolve(&mut self, recording: &str, n_components: usize) -> Result<ExclusionSet>;
}

impl<T: ExclusionResolver + ?Sized> ExclusionResolver for Box<T> {
    fn resolve(&mut self, recording: &str, n_components: usize) -> Result<ExclusionSet> {
        (**self).resolve(recording, n_components)
    }
}

/// The same exclusions for every recording (single-file runs).
#[derive(Debug, Clone)]
pub struct FixedExclusions(pub ExclusionSet);

impl ExclusionResolver for FixedExclusions {
    fn resolve(&mut self, _recording: &str, n_components: usize) -> Result<ExclusionSet> {
        self.0.validate(n_components)?;
        Ok(self.0.clone())
    }
}

/// Refuses to guess: used for unattended batch runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailFast;

impl ExclusionResolver for FailFast {
    fn resolve(&mut self, recording: &str, _n_components: usize) -> Result<ExclusionSet> {
        Err(PipelineError::MissingExclusions { recording: recording.to_string() })
    }
}

/// Asks an operator for component indices, one per line.
///
/// A blank line, `done`, `q` or end of input finishes the list.  Entries that
/// are not indices, or that name a component beyond the model, are refused
/// and asked again.
pub struct InteractivePrompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> InteractivePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl InteractivePrompt<std::io::StdinLock<'static>, std::io::Stderr> {
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stderr())
    }
}

impl<R: BufRead, W: Write> ExclusionResolver for InteractivePrompt<R, W> {
    fn resolve(&mut self, recording: &str, n_components: usize) -> Result<ExclusionSet> {
        tracing::info!(recording, n_components, "waiting for operator to choose ICA components");
        writeln!(
            self.output,
            "{recording}: enter components to exclude (0..{n_components}), blank line to finish"
        )?;
        let mut set = ExclusionSet::new();
        loop {
            write!(self.output, "Type single component to exclude: ")?;
            self.output.flush()?;
            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                break;
            }
            let entry = line.trim();
            if entry.is_empty() || entry.eq_ignore_ascii_case("done") || entry.eq_ignore_ascii_case("q") {
                break;
            }
            match entry.parse::<usize>() {
                Ok(i) if i < n_components => {
                    set.insert(i);
                }
                Ok(i) => writeln!(self.output, "component {i} out of range (0..{n_components})")?,
                Err(_) => writeln!(self.output, "'{entry}' is not a component index")?,
            }
        }
        Ok(set)
    }
}

/// Looks exclusions up in the registry; on a miss asks `fallback` and records
/// the answer so the recording is never asked about again.
pub struct RegistryResolver<F> {
    registry: ExclusionRegistry,
    fallback: F,
}

impl<F: ExclusionResolver> RegistryResolver<F> {
    pub fn new(registry: ExclusionRegistry, fallback: F) -> Self {
        Self { registry, fallback }
    }

    pub fn registry(&self) -> &ExclusionRegistry {
        &self.registry
    }
}

impl<F: ExclusionResolver> ExclusionResolver for RegistryResolver<F> {
    fn resolve(&mut self, recording: &str, n_components: usize) -> Result<ExclusionSet> {
        if let Some(set) = self.registry.lookup(recording) {
            set.validate(n_components)?;
            tracing::info!(recording, components = ?set.iter().collect::<Vec<_>>(), "exclusions from registry");
            return Ok(set);
        }
        let set = self.fallback.resolve(recording, n_components)?;
        set.validate(n_components)?;
        self.registry.append(recording, &set)?;
        Ok(set)
    }
}
