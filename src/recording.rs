//! Continuous multi-channel recording.
//!
//! A [`ContinuousRecording`] is owned by exactly one pipeline run.  Stages
//! take it by value and hand it back transformed, so the order of
//! re-reference → filter → artifact removal is visible at the call site and
//! no stage can observe another stage's half-finished state.
use ndarray::{Array2, ArrayView1};

use crate::error::{PipelineError, Result};

/// Signal type of a channel, mirroring MNE's channel kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Eeg,
    Eog,
    /// Auxiliary electrode not used for analysis.
    Misc,
    /// Trigger / status channel.
    Stim,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub name: String,
    pub kind: ChannelKind,
}

impl Channel {
    pub fn new(name: impl Into<String>, kind: ChannelKind) -> Self {
        Self { name: name.into(), kind }
    }
}

#[derive(Debug, Clone)]
pub struct ContinuousRecording {
    /// `[C, T]`; volts for electrodes, raw trigger values for the stim channel.
    pub data: Array2<f64>,
    pub sfreq: f64,
    pub channels: Vec<Channel>,
}

impl ContinuousRecording {
    pub fn new(data: Array2<f64>, sfreq: f64, channels: Vec<Channel>) -> Result<Self> {
        if data.nrows() != channels.len() {
            return Err(PipelineError::ShapeMismatch {
                name: "recording".into(),
                expected: vec![channels.len(), data.ncols()],
                got: data.shape().to_vec(),
            });
        }
        if !(sfreq > 0.0) {
            return Err(PipelineError::invalid_config("sfreq", format!("{sfreq} Hz")));
        }
        Ok(Self { data, sfreq, channels })
    }

    #[inline]
    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }

    #[inline]
    pub fn n_times(&self) -> usize {
        self.data.ncols()
    }

    pub fn duration_secs(&self) -> f64 {
        self.n_times() as f64 / self.sfreq
    }

    pub fn ch_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name.clone()).collect()
    }

    pub fn channel_index(&self, name: &str) -> Result<usize> {
        self.channels
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| PipelineError::UnknownChannel { name: name.to_string() })
    }

    /// Re-type the named channels (MNE's `set_channel_types`).
    pub fn set_channel_kind(&mut self, name: &str, kind: ChannelKind) -> Result<()> {
        let idx = self.channel_index(name)?;
        self.channels[idx].kind = kind;
        Ok(())
    }

    /// Row indices of all channels whose kind is in `kinds`, in recording order,
    /// skipping any whose name appears in `exclude`.
    pub fn pick(&self, kinds: &[ChannelKind], exclude: &[String]) -> Vec<usize> {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, c)| kinds.contains(&c.kind) && !exclude.iter().any(|e| e == &c.name))
            .map(|(i, _)| i)
            .collect()
    }

    /// Every electrode row: all channels except the stim channel(s).
    pub fn electrode_rows(&self) -> Vec<usize> {
        self.pick(&[ChannelKind::Eeg, ChannelKind::Eog, ChannelKind::Misc], &[])
    }

    /// The first stim-kind channel.
    pub fn status(&self) -> Result<ArrayView1<'_, f64>> {
        let idx = self
            .channels
            .iter()
            .position(|c| c.kind == ChannelKind::Stim)
            .ok_or_else(|| PipelineError::UnknownChannel { name: "<status>".into() })?;
        Ok(self.data.row(idx))
    }

    /// Copy the listed rows into a new `[rows.len(), T]` array.
    pub fn select_rows(&self, rows: &[usize]) -> Array2<f64> {
        Array2::from_shape_fn((rows.len(), self.n_times()), |(r, t)| self.data[[rows[r], t]])
    }

    /// Write `block` (`[rows.len(), T]`) back into the listed rows.
    pub fn assign_rows(&mut self, rows: &[usize], block: &Array2<f64>) -> Result<()> {
        if block.dim() != (rows.len(), self.n_times()) {
            return Err(PipelineError::ShapeMismatch {
                name: "channel block".into(),
                expected: vec![rows.len(), self.n_times()],
                got: block.shape().to_vec(),
            });
        }
        for (r, &row) in rows.iter().enumerate() {
            self.data.row_mut(row).assign(&block.row(r));
        }
        Ok(())
    }
}
