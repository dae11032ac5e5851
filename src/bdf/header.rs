//! BDF header parsing.
//!
//! BDF is EDF with 24-bit samples.  The header is ASCII: a 256-byte fixed
//! part followed by 256 bytes per signal, laid out field-by-field across
//! signals (all labels, then all transducers, …).
use std::io::Read;

use anyhow::{bail, Context, Result};

/// Bytes in the fixed part of the header.
pub const FIXED_HEADER_LEN: usize = 256;
/// Header bytes per signal.
pub const SIGNAL_HEADER_LEN: usize = 256;
/// Bytes per stored sample.
pub const BYTES_PER_SAMPLE: usize = 3;

/// Per-signal header fields.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalHeader {
    pub label: String,
    pub transducer: String,
    pub physical_dim: String,
    pub physical_min: f64,
    pub physical_max: f64,
    pub digital_min: f64,
    pub digital_max: f64,
    pub prefilter: String,
    pub samples_per_record: usize,
}

impl SignalHeader {
    /// Digital → physical gain: `(pmax − pmin) / (dmax − dmin)`.
    pub fn gain(&self) -> f64 {
        (self.physical_max - self.physical_min) / (self.digital_max - self.digital_min)
    }

    pub fn offset(&self) -> f64 {
        self.physical_min - self.gain() * self.digital_min
    }

    /// Factor from the declared physical unit to volts (1 when unknown).
    pub fn unit_scale(&self) -> f64 {
        match self.physical_dim.trim() {
            "uV" | "µV" | "μV" => 1e-6,
            "mV" => 1e-3,
            "nV" => 1e-9,
            _ => 1.0,
        }
    }
}

/// File-level header.
#[derive(Debug, Clone, PartialEq)]
pub struct BdfHeader {
    pub patient: String,
    pub recording: String,
    pub start_date: String,
    pub start_time: String,
    pub header_bytes: usize,
    pub reserved: String,
    /// `None` when the header says `-1` (unknown, infer from file size).
    pub n_records: Option<usize>,
    /// Seconds per data record.
    pub record_duration: f64,
    pub signals: Vec<SignalHeader>,
}

impl BdfHeader {
    pub fn n_signals(&self) -> usize {
        self.signals.len()
    }

    /// Bytes in one data record across all signals.
    pub fn record_bytes(&self) -> usize {
        self.signals.iter().map(|s| s.samples_per_record).sum::<usize>() * BYTES_PER_SAMPLE
    }

    /// Common sampling rate; errors when signals differ.
    pub fn sfreq(&self) -> Result<f64> {
        let first = self.signals.first().context("BDF file has no signals")?;
        if let Some(odd) = self
            .signals
            .iter()
            .find(|s| s.samples_per_record != first.samples_per_record)
        {
            bail!(
                "mixed sampling rates: '{}' has {} samples/record, '{}' has {}",
                first.label,
                first.samples_per_record,
                odd.label,
                odd.samples_per_record
            );
        }
        if !(self.record_duration > 0.0) {
            bail!("record duration {} s is not positive", self.record_duration);
        }
        Ok(first.samples_per_record as f64 / self.record_duration)
    }
}

fn field(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf).trim().to_string()
}

fn number<T: std::str::FromStr>(buf: &[u8], what: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let s = field(buf);
    s.parse::<T>()
        .with_context(|| format!("BDF header field '{what}' is not a number: {s:?}"))
}

/// Read and parse the full header; leaves `r` positioned at the first record.
pub fn read_header<R: Read>(r: &mut R) -> Result<BdfHeader> {
    let mut fixed = [0u8; FIXED_HEADER_LEN];
    r.read_exact(&mut fixed).context("reading BDF fixed header")?;
    if fixed[0] != 0xFF || &fixed[1..8] != b"BIOSEMI" {
        bail!("not a BDF file (missing 0xFF BIOSEMI signature)");
    }

    let header_bytes: usize = number(&fixed[184..192], "header bytes")?;
    let n_records: i64 = number(&fixed[236..244], "number of records")?;
    let record_duration: f64 = number(&fixed[244..252], "record duration")?;
    let ns: usize = number(&fixed[252..256], "number of signals")?;
    if header_bytes != FIXED_HEADER_LEN + ns * SIGNAL_HEADER_LEN {
        bail!(
            "header size {header_bytes} does not match {ns} signals ({} expected)",
            FIXED_HEADER_LEN + ns * SIGNAL_HEADER_LEN
        );
    }

    let mut sig = vec![0u8; ns * SIGNAL_HEADER_LEN];
    r.read_exact(&mut sig).context("reading BDF signal headers")?;

    // (field width) in file order; each field is stored for all signals.
    let widths = [16, 80, 8, 8, 8, 8, 8, 80, 8, 32];
    let mut cols: Vec<Vec<&[u8]>> = Vec::with_capacity(widths.len());
    let mut off = 0;
    for w in widths {
        cols.push((0..ns).map(|i| &sig[off + i * w..off + (i + 1) * w]).collect());
        off += ns * w;
    }

    let mut signals = Vec::with_capacity(ns);
    for i in 0..ns {
        let label = field(cols[0][i]);
        let s = SignalHeader {
            transducer: field(cols[1][i]),
            physical_dim: field(cols[2][i]),
            physical_min: number(cols[3][i], "physical minimum")?,
            physical_max: number(cols[4][i], "physical maximum")?,
            digital_min: number(cols[5][i], "digital minimum")?,
            digital_max: number(cols[6][i], "digital maximum")?,
            prefilter: field(cols[7][i]),
            samples_per_record: number(cols[8][i], "samples per record")?,
            label,
        };
        if s.digital_max == s.digital_min {
            bail!("signal '{}' has an empty digital range", s.label);
        }
        signals.push(s);
    }

    Ok(BdfHeader {
        patient: field(&fixed[8..88]),
        recording: field(&fixed[88..168]),
        start_date: field(&fixed[168..176]),
        start_time: field(&fixed[176..184]),
        header_bytes,
        reserved: field(&fixed[192..236]),
        n_records: usize::try_from(n_records).ok(),
        record_duration,
        signals,
    })
}
