//! BioSemi BDF (24-bit EDF) reader.
//!
//! # Quick start
//! ```no_run
//! use erpbatch::bdf::read_recording;
//!
//! let rec = read_recording("Raw_data/EEG/Eriksen/p01.bdf", "Status", 0xFFFF).unwrap();
//! println!("{} channels @ {} Hz", rec.n_channels(), rec.sfreq);
//! ```
pub mod header;
pub mod raw;

pub use header::{read_header, BdfHeader, SignalHeader};
pub use raw::{open_raw, read_recording, RawBdf, DEFAULT_STATUS_MASK};
