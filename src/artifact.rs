//! Ocular artifact removal stage.
//!
//! Fit a decomposition on the analysis channels, ask the injected
//! [`ExclusionResolver`] which components are artifacts, and subtract them.
use ndarray::s;

use crate::error::{PipelineError, Result};
use crate::exclusion::{ExclusionResolver, ExclusionSet};
use crate::ica::{Decomposer, IcaModel};
use crate::recording::ContinuousRecording;

/// What artifact removal did to one recording.
#[derive(Debug, Clone)]
pub struct ArtifactReport {
    pub n_components: usize,
    pub excluded: ExclusionSet,
    pub n_iter: usize,
    pub converged: bool,
}

pub struct ArtifactRemover<'a, D: ?Sized, R: ?Sized> {
    pub decomposer: &'a D,
    pub resolver: &'a mut R,
    /// Fit on every `decim`-th sample.
    pub decim: usize,
}

impl<'a, D, R> ArtifactRemover<'a, D, R>
where
    D: Decomposer + ?Sized,
    R: ExclusionResolver + ?Sized,
{
    pub fn new(decomposer: &'a D, resolver: &'a mut R, decim: usize) -> Self {
        Self { decomposer, resolver, decim }
    }

    /// Fit on `rows` only (decimated).
    pub fn fit(&self, rec: &ContinuousRecording, rows: &[usize]) -> Result<IcaModel> {
        if self.decim == 0 {
            return Err(PipelineError::invalid_config("ica.decim", "must be at least 1"));
        }
        let picked = rec.select_rows(rows);
        let step = self.decim as isize;
        let model = self.decomposer.fit(picked.slice(s![.., ..;step]))?;
        tracing::info!(
            channels = rows.len(),
            samples = picked.ncols().div_ceil(self.decim),
            components = model.n_components(),
            n_iter = model.n_iter,
            "fitted ICA"
        );
        Ok(model)
    }

    /// Fit, resolve exclusions for `recording_id`, and clean `rows` of `rec`.
    ///
    /// Any failure returns before the recording is modified.
    pub fn run(
        &mut self,
        mut rec: ContinuousRecording,
        rows: &[usize],
        recording_id: &str,
    ) -> Result<(ContinuousRecording, ArtifactReport)> {
        let model = self.fit(&rec, rows)?;
        let excluded = self.resolver.resolve(recording_id, model.n_components())?;
        excluded.validate(model.n_components())?;

        let mut block = rec.select_rows(rows);
        model.apply(&mut block, &excluded)?;
        rec.assign_rows(rows, &block)?;
        tracing::info!(
            recording = recording_id,
            excluded = ?excluded.iter().collect::<Vec<_>>(),
            "removed artifact components"
        );

        let report = ArtifactReport {
            n_components: model.n_components(),
            excluded,
            n_iter: model.n_iter,
            converged: model.converged,
        };
        Ok((rec, report))
    }
}
