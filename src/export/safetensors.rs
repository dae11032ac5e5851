//! Safetensors export.
//!
//! Layout: one `F64` tensor `[S, N]` per channel, `trial_index` as `I64 [N]`,
//! `condition_code` as `U8 [N]`, `times` as `F64 [S]`.
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use ndarray::Array2;

use super::{write_atomic, ExportTensor, TensorWriter};

/// Accumulates tensors and writes them in one safetensors file.
#[derive(Default)]
pub struct StBuilder {
    entries: Vec<(String, Vec<u8>, &'static str, Vec<usize>)>,
}

impl StBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_f64(&mut self, name: &str, data: &[f64], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "F64", shape.to_vec()));
    }

    /// Row-major, as safetensors expects.
    pub fn add_f64_arr2(&mut self, name: &str, arr: &Array2<f64>) {
        let data: Vec<f64> = arr.iter().copied().collect();
        self.add_f64(name, &data, &[arr.nrows(), arr.ncols()]);
    }

    pub fn add_i64(&mut self, name: &str, data: &[i64], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "I64", shape.to_vec()));
    }

    pub fn add_u8(&mut self, name: &str, data: &[u8], shape: &[usize]) {
        self.entries.push((name.to_string(), data.to_vec(), "U8", shape.to_vec()));
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        let mut header_map = serde_json::Map::new();
        let mut offset: usize = 0;
        for (name, data, dtype, shape) in &self.entries {
            header_map.insert(
                name.clone(),
                serde_json::json!({
                    "dtype": dtype,
                    "shape": shape,
                    "data_offsets": [offset, offset + data.len()],
                }),
            );
            offset += data.len();
        }
        let hdr_bytes = serde_json::to_vec(&header_map)?;
        let pad = (8 - hdr_bytes.len() % 8) % 8;
        let padded: Vec<u8> = hdr_bytes
            .into_iter()
            .chain(std::iter::repeat(b' ').take(pad))
            .collect();
        w.write_all(&(padded.len() as u64).to_le_bytes())?;
        w.write_all(&padded)?;
        for (_, data, _, _) in &self.entries {
            w.write_all(data)?;
        }
        Ok(())
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        write_atomic(path, |w| self.write_to(w))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SafetensorsWriter;

impl TensorWriter for SafetensorsWriter {
    fn extension(&self) -> &'static str {
        "safetensors"
    }

    fn write(&self, tensor: &ExportTensor, path: &Path) -> Result<()> {
        let mut b = StBuilder::new();
        for (name, m) in tensor.channels() {
            b.add_f64_arr2(name, m);
        }
        let n = tensor.n_trials();
        let idx: Vec<i64> = tensor.trial_index().iter().map(|&i| i as i64).collect();
        b.add_i64("trial_index", &idx, &[n]);
        b.add_u8("condition_code", tensor.condition_code(), &[n]);
        let times: Vec<f64> = tensor.times().to_vec();
        b.add_f64("times", &times, &[times.len()]);
        b.write(path)
    }
}

/// Header of a safetensors file plus the byte offset where data begins.
pub fn parse_header(bytes: &[u8]) -> Result<(HashMap<String, serde_json::Value>, usize)> {
    if bytes.len() < 8 {
        bail!("safetensors file too small");
    }
    let mut len = [0u8; 8];
    len.copy_from_slice(&bytes[..8]);
    let n = u64::from_le_bytes(len) as usize;
    let raw = bytes.get(8..8 + n).context("safetensors header runs past end of file")?;
    let header: HashMap<String, serde_json::Value> =
        serde_json::from_slice(raw).context("failed to parse safetensors header")?;
    Ok((header, 8 + n))
}

/// Read an `F64` tensor as `(shape, values)`.
pub fn read_f64_tensor(bytes: &[u8], name: &str) -> Result<(Vec<usize>, Vec<f64>)> {
    let (header, data_start) = parse_header(bytes)?;
    let entry = header.get(name).with_context(|| format!("missing '{name}' tensor"))?;
    if entry["dtype"] != "F64" {
        bail!("tensor '{name}' is {}, not F64", entry["dtype"]);
    }
    let shape = entry["shape"]
        .as_array()
        .context("tensor shape is not an array")?
        .iter()
        .map(|v| v.as_u64().map(|d| d as usize).context("bad shape entry"))
        .collect::<Result<Vec<_>>>()?;
    let offsets = entry["data_offsets"].as_array().context("missing data_offsets")?;
    let s = offsets.first().and_then(|v| v.as_u64()).context("bad data_offsets")? as usize;
    let e = offsets.get(1).and_then(|v| v.as_u64()).context("bad data_offsets")? as usize;
    let raw = bytes
        .get(data_start + s..data_start + e)
        .context("tensor data runs past end of file")?;
    let values = raw
        .chunks_exact(8)
        .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
        .collect();
    Ok((shape, values))
}
