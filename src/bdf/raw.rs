//! BDF data reader.
//!
//! # Calibration
//! ```text
//! volts[ch, t] = ((dig − dmin) × (pmax − pmin) / (dmax − dmin) + pmin) × unit_scale
//! ```
//! The status channel is not calibrated: its 24-bit words are kept as
//! unsigned trigger values masked to the configured trigger bits, which is
//! what marker reconstruction expects.
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use ndarray::Array2;

use super::header::{read_header, BdfHeader, BYTES_PER_SAMPLE};
use crate::recording::{Channel, ChannelKind, ContinuousRecording};

/// Low 16 bits carry the trigger code on BioSemi systems.
pub const DEFAULT_STATUS_MASK: u32 = 0xFFFF;

/// An opened BDF file; data is read on demand.
#[derive(Debug, Clone)]
pub struct RawBdf {
    pub header: BdfHeader,
    pub path: PathBuf,
    /// Complete data records present in the file.
    pub n_records: usize,
}

impl RawBdf {
    pub fn sfreq(&self) -> Result<f64> {
        self.header.sfreq()
    }

    /// Samples per channel.
    pub fn n_times(&self) -> usize {
        self.n_records * self.header.signals.first().map_or(0, |s| s.samples_per_record)
    }

    pub fn ch_names(&self) -> Vec<String> {
        self.header.signals.iter().map(|s| s.label.clone()).collect()
    }

    /// Read every record into `[n_signals, n_times]`.
    ///
    /// Rows named `stim_channel` hold masked trigger words; every other row
    /// is calibrated to volts.
    pub fn read_all_data(&self, stim_channel: &str, status_mask: u32) -> Result<Array2<f64>> {
        let ns = self.header.n_signals();
        let spr = self.header.signals.first().map_or(0, |s| s.samples_per_record);
        let n_t = self.n_times();
        let cal: Vec<(f64, f64)> = self
            .header
            .signals
            .iter()
            .map(|s| (s.gain() * s.unit_scale(), s.offset() * s.unit_scale()))
            .collect();
        let is_stim: Vec<bool> = self.header.signals.iter().map(|s| s.label == stim_channel).collect();

        let file = File::open(&self.path).with_context(|| format!("open {}", self.path.display()))?;
        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(self.header.header_bytes as u64))?;

        let mut out = Array2::<f64>::zeros((ns, n_t));
        let mut record = vec![0u8; self.header.record_bytes()];
        for r in 0..self.n_records {
            reader
                .read_exact(&mut record)
                .with_context(|| format!("reading data record {r} of {}", self.path.display()))?;
            let t0 = r * spr;
            for ch in 0..ns {
                let base = ch * spr * BYTES_PER_SAMPLE;
                let (gain, offset) = cal[ch];
                for k in 0..spr {
                    let b = &record[base + k * BYTES_PER_SAMPLE..base + (k + 1) * BYTES_PER_SAMPLE];
                    out[[ch, t0 + k]] = if is_stim[ch] {
                        (u24(b) & status_mask) as f64
                    } else {
                        i24(b) as f64 * gain + offset
                    };
                }
            }
        }
        Ok(out)
    }

    /// Read the file as a [`ContinuousRecording`].
    ///
    /// Every channel is typed EEG except `stim_channel`, which is Stim.
    /// Retyping EOG and auxiliary electrodes is the caller's job.
    pub fn into_recording(self, stim_channel: &str, status_mask: u32) -> Result<ContinuousRecording> {
        if !self.header.signals.iter().any(|s| s.label == stim_channel) {
            return Err(crate::PipelineError::UnknownChannel { name: stim_channel.to_string() }.into());
        }
        let data = self.read_all_data(stim_channel, status_mask)?;
        let channels = self
            .header
            .signals
            .iter()
            .map(|s| {
                let kind = if s.label == stim_channel { ChannelKind::Stim } else { ChannelKind::Eeg };
                Channel::new(s.label.clone(), kind)
            })
            .collect();
        Ok(ContinuousRecording::new(data, self.sfreq()?, channels)?)
    }
}

/// Little-endian signed 24-bit.
#[inline]
fn i24(b: &[u8]) -> i32 {
    let sign = if b[2] & 0x80 != 0 { 0xFF } else { 0x00 };
    i32::from_le_bytes([b[0], b[1], b[2], sign])
}

/// Little-endian unsigned 24-bit.
#[inline]
fn u24(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], 0])
}

/// Open a BDF file and parse its header without reading samples.
pub fn open_raw<P: AsRef<Path>>(path: P) -> Result<RawBdf> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let file_len = file.metadata()?.len() as usize;
    let mut reader = BufReader::new(file);
    let header = read_header(&mut reader).with_context(|| format!("parsing {}", path.display()))?;

    let record_bytes = header.record_bytes();
    if record_bytes == 0 {
        bail!("{}: data records are empty", path.display());
    }
    let available = file_len.saturating_sub(header.header_bytes) / record_bytes;
    let n_records = match header.n_records {
        Some(n) if n <= available => n,
        Some(n) => {
            tracing::warn!(
                path = %path.display(),
                declared = n,
                available,
                "BDF file is shorter than its header declares; reading complete records only"
            );
            available
        }
        None => available,
    };

    tracing::debug!(
        path = %path.display(),
        signals = header.n_signals(),
        records = n_records,
        "opened BDF"
    );
    Ok(RawBdf { header, path: path.to_path_buf(), n_records })
}

/// `open_raw(path)?.into_recording(stim_channel, status_mask)`.
pub fn read_recording<P: AsRef<Path>>(path: P, stim_channel: &str, status_mask: u32) -> Result<ContinuousRecording> {
    let rec = open_raw(path)?.into_recording(stim_channel, status_mask)?;
    tracing::info!(
        channels = rec.n_channels(),
        samples = rec.n_times(),
        sfreq = rec.sfreq,
        "loaded recording"
    );
    Ok(rec)
}
