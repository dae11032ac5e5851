//! MATLAB level-5 MAT-file writer.
//!
//! Only what the exports need: uncompressed real double matrices, little
//! endian, one top-level variable per channel plus `trial_index`,
//! `condition_code` and `times` column vectors.  Readable by MATLAB,
//! `scipy.io.loadmat` and R's `R.matlab::readMat`.
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use ndarray::Array2;

use super::{write_atomic, ExportTensor, TensorWriter, RESERVED_NAMES};

const MI_INT8: u32 = 1;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_DOUBLE: u32 = 9;
const MI_MATRIX: u32 = 14;
const MX_DOUBLE_CLASS: u32 = 6;

/// MATLAB identifiers: letter first, `[A-Za-z0-9_]`, at most 63 chars.
const MAX_NAME_LEN: usize = 63;

#[derive(Debug, Clone, Copy, Default)]
pub struct MatWriter;

impl TensorWriter for MatWriter {
    fn extension(&self) -> &'static str {
        "mat"
    }

    fn write(&self, tensor: &ExportTensor, path: &Path) -> anyhow::Result<()> {
        let names = variable_names(tensor)?;
        write_atomic(path, |w| {
            w.write_all(&file_header())?;
            for ((_, m), name) in tensor.channels().zip(&names) {
                write_matrix(w, name, m.nrows(), m.ncols(), m.t().iter().copied())?;
            }
            let n = tensor.n_trials();
            write_matrix(w, "trial_index", n, 1, tensor.trial_index().iter().map(|&i| i as f64))?;
            write_matrix(w, "condition_code", n, 1, tensor.condition_code().iter().map(|&c| c as f64))?;
            let s = tensor.n_samples();
            write_matrix(w, "times", s, 1, tensor.times().iter().copied())?;
            Ok(())
        })
    }
}

/// 116 bytes of text, 8 bytes subsystem offset, version, endian indicator.
fn file_header() -> [u8; 128] {
    let mut h = [b' '; 128];
    let text = format!(
        "MATLAB 5.0 MAT-file, Platform: {}, Created by: erpbatch {}",
        std::env::consts::OS,
        env!("CARGO_PKG_VERSION")
    );
    let n = text.len().min(116);
    h[..n].copy_from_slice(&text.as_bytes()[..n]);
    h[116..124].fill(0);
    h[124..126].copy_from_slice(&0x0100u16.to_le_bytes());
    h[126..128].copy_from_slice(b"IM");
    h
}

/// Identifier for each channel, refusing names that collide once sanitized.
fn variable_names(tensor: &ExportTensor) -> anyhow::Result<Vec<String>> {
    let mut owner: HashMap<String, &str> = RESERVED_NAMES.iter().map(|&n| (n.to_string(), n)).collect();
    let mut names = Vec::new();
    for (channel, _) in tensor.channels() {
        let var = variable_name(channel);
        if let Some(prev) = owner.insert(var.clone(), channel) {
            anyhow::bail!("channels '{prev}' and '{channel}' both map to MAT variable '{var}'");
        }
        names.push(var);
    }
    Ok(names)
}

pub(crate) fn variable_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if !out.starts_with(|c: char| c.is_ascii_alphabetic()) {
        out.insert(0, 'x');
    }
    out.truncate(MAX_NAME_LEN);
    out
}

fn padded(len: usize) -> usize {
    len.div_ceil(8) * 8
}

fn write_tag<W: Write>(w: &mut W, ty: u32, len: usize) -> std::io::Result<()> {
    w.write_all(&ty.to_le_bytes())?;
    w.write_all(&(len as u32).to_le_bytes())
}

fn write_padding<W: Write>(w: &mut W, len: usize) -> std::io::Result<()> {
    const ZEROS: [u8; 8] = [0; 8];
    w.write_all(&ZEROS[..padded(len) - len])
}

/// `values` in column-major order.
fn write_matrix<W, I>(w: &mut W, name: &str, rows: usize, cols: usize, values: I) -> anyhow::Result<()>
where
    W: Write,
    I: Iterator<Item = f64>,
{
    let n_values = rows * cols;
    let body = (8 + 8) // array flags
        + (8 + 8) // dimensions, two int32
        + (8 + padded(name.len()))
        + (8 + n_values * 8);
    anyhow::ensure!(body <= u32::MAX as usize, "variable '{name}' exceeds the MAT v5 element size limit");

    write_tag(w, MI_MATRIX, body)?;

    write_tag(w, MI_UINT32, 8)?;
    w.write_all(&MX_DOUBLE_CLASS.to_le_bytes())?;
    w.write_all(&0u32.to_le_bytes())?;

    write_tag(w, MI_INT32, 8)?;
    w.write_all(&(rows as i32).to_le_bytes())?;
    w.write_all(&(cols as i32).to_le_bytes())?;

    write_tag(w, MI_INT8, name.len())?;
    w.write_all(name.as_bytes())?;
    write_padding(w, name.len())?;

    write_tag(w, MI_DOUBLE, n_values * 8)?;
    let mut written = 0;
    for v in values {
        w.write_all(&v.to_le_bytes())?;
        written += 1;
    }
    anyhow::ensure!(written == n_values, "variable '{name}': wrote {written} of {n_values} values");
    Ok(())
}

/// Minimal reader for files produced by [`MatWriter`]: `(name, matrix)` in
/// file order.
pub fn read_mat(path: &Path) -> anyhow::Result<Vec<(String, Array2<f64>)>> {
    use anyhow::{bail, Context};

    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    if bytes.len() < 128 || &bytes[126..128] != b"IM" {
        bail!("{} is not a little-endian MAT v5 file", path.display());
    }
    let u32_at = |off: usize| -> anyhow::Result<u32> {
        let b = bytes.get(off..off + 4).context("truncated MAT element")?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    };

    let mut out = Vec::new();
    let mut pos = 128;
    while pos < bytes.len() {
        let (ty, len) = (u32_at(pos)?, u32_at(pos + 4)? as usize);
        if ty != MI_MATRIX {
            bail!("unsupported element type {ty} at byte {pos}");
        }
        let mut p = pos + 8 + 16; // skip array flags
        let rows = u32_at(p + 8)? as usize;
        let cols = u32_at(p + 12)? as usize;
        p += 16;
        let name_len = u32_at(p + 4)? as usize;
        let name_bytes = bytes.get(p + 8..p + 8 + name_len).context("truncated name")?;
        let name = String::from_utf8(name_bytes.to_vec())?;
        p += 8 + padded(name_len);
        let data_len = u32_at(p + 4)? as usize;
        let raw = bytes.get(p + 8..p + 8 + data_len).context("truncated data")?;
        let values: Vec<f64> = raw
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .collect();
        // Stored column-major.
        let m = Array2::from_shape_vec((cols, rows), values)?.reversed_axes();
        out.push((name, m));
        pos += 8 + len;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn names_are_valid_identifiers() {
        assert_eq!(variable_name("Fp1"), "Fp1");
        assert_eq!(variable_name("EXG-1"), "EXG_1");
        assert_eq!(variable_name("1st"), "x1st");
        assert_eq!(variable_name(&"a".repeat(80)).len(), 63);
    }

    #[test]
    fn header_layout() {
        let h = file_header();
        assert!(h.starts_with(b"MATLAB 5.0 MAT-file"));
        assert_eq!(&h[124..128], &[0x00, 0x01, b'I', b'M']);
    }

    #[test]
    fn elements_are_8_byte_aligned() {
        let mut buf = Vec::new();
        write_matrix(&mut buf, "Cz", 2, 3, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0].into_iter()).unwrap();
        assert_eq!(buf.len() % 8, 0);
        // miMATRIX tag + flags(16) + dims(16) + name(8 + 8) + data(8 + 48)
        assert_eq!(buf.len(), 8 + 16 + 16 + 16 + 56);
    }

    #[test]
    fn written_file_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.mat");
        let fz = array![[1.0, f64::NAN], [2.0, f64::NAN], [3.0, f64::NAN]];
        let t = ExportTensor::new(
            vec![("Fz".into(), fz)],
            vec![4, 5],
            vec![1, 2],
            array![0.0, 0.5, 1.0],
        )
        .unwrap();
        MatWriter.write(&t, &path).unwrap();

        let vars = read_mat(&path).unwrap();
        let names: Vec<&str> = vars.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["Fz", "trial_index", "condition_code", "times"]);
        let fz = &vars[0].1;
        assert_eq!(fz.dim(), (3, 2));
        assert_eq!(fz[[2, 0]], 3.0);
        assert!(fz[[0, 1]].is_nan());
        assert_eq!(vars[1].1.column(0).to_vec(), vec![4.0, 5.0]);
    }

    #[test]
    fn sanitized_collisions_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let tensor = |names: [&str; 2]| {
            ExportTensor::new(
                names.iter().map(|n| (n.to_string(), Array2::zeros((3, 2)))).collect(),
                vec![0, 1],
                vec![1, 1],
                array![0.0, 0.5, 1.0],
            )
            .unwrap()
        };

        let path = dir.path().join("a.mat");
        let err = MatWriter.write(&tensor(["EXG-1", "EXG_1"]), &path).unwrap_err();
        assert!(err.to_string().contains("EXG_1"), "{err}");
        assert!(!path.exists());

        let path = dir.path().join("b.mat");
        assert!(MatWriter.write(&tensor(["Cz", "times!"]), &path).is_ok());
        let path = dir.path().join("c.mat");
        assert!(MatWriter.write(&tensor(["Cz", "trial-index"]), &path).is_err());
        assert!(!path.exists());
    }
}
