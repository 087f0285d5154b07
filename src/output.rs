//! Dense matrix persistence.
//!
//! The format follows the file extension: `.bin` files hold a `MBEM` header, the row and
//! column counts as little-endian `u32` and the entries as row-major little-endian `f64`.
//! Any other extension is a text file with one whitespace-separated row per line.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use itertools::Itertools;
use ndarray::Array2;

use crate::error::MatrixIoError;

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn text_and_binary_files_reload() {
        let dir = tempfile::tempdir().unwrap();
        let matrix = array![[1.0, -2.5e-12, 3.0], [0.1, 0.2, 1e300]];
        for name in ["m.txt", "m.bin"] {
            let path = dir.path().join(name);
            save_matrix(&path, &matrix).unwrap();
            assert_eq!(load_matrix(&path).unwrap(), matrix);
        }
    }

    #[test]
    fn empty_matrix_keeps_its_shape_in_binary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.bin");
        let matrix = Array2::<f64>::zeros((0, 4));
        save_matrix(&path, &matrix).unwrap();
        assert_eq!(load_matrix(&path).unwrap().dim(), (0, 4));
    }

    #[test]
    fn ragged_text_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ragged.txt");
        std::fs::write(&path, "1 2 3\n4 5\n").unwrap();
        assert!(matches!(
            load_matrix(&path),
            Err(MatrixIoError::Format { .. })
        ));
    }

    #[test]
    fn truncated_binary_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.bin");
        let mut bytes = b"MBEM".to_vec();
        bytes.extend(2u32.to_le_bytes());
        bytes.extend(2u32.to_le_bytes());
        bytes.extend(1.0f64.to_le_bytes());
        std::fs::write(&path, bytes).unwrap();
        assert!(load_matrix(&path).is_err());
    }
}

const MAGIC: &[u8; 4] = b"MBEM";

fn is_binary(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "bin")
}

/// Writes `matrix` to `path`, in binary when the extension is `.bin`.
pub fn save_matrix(path: &Path, matrix: &Array2<f64>) -> Result<(), MatrixIoError> {
    let io = |source| MatrixIoError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(io)?;
    let mut writer = BufWriter::new(file);

    if is_binary(path) {
        let dim = |n: usize| {
            u32::try_from(n).map_err(|_| MatrixIoError::Format {
                path: path.to_path_buf(),
                message: format!("dimension {} does not fit the binary header", n),
            })
        };
        writer.write_all(MAGIC).map_err(io)?;
        writer.write_all(&dim(matrix.nrows())?.to_le_bytes()).map_err(io)?;
        writer.write_all(&dim(matrix.ncols())?.to_le_bytes()).map_err(io)?;
        for value in matrix.iter() {
            writer.write_all(&value.to_le_bytes()).map_err(io)?;
        }
    } else {
        for row in matrix.rows() {
            writeln!(writer, "{}", row.iter().map(|v| format!("{:e}", v)).join(" ")).map_err(io)?;
        }
    }
    writer.flush().map_err(io)?;
    log::debug!("saved {}x{} matrix to {}", matrix.nrows(), matrix.ncols(), path.display());
    Ok(())
}

/// Reads a matrix written by [`save_matrix`], or any whitespace-separated text table.
pub fn load_matrix(path: &Path) -> Result<Array2<f64>, MatrixIoError> {
    let io = |source| MatrixIoError::Io {
        path: path.to_path_buf(),
        source,
    };
    let format = |message: String| MatrixIoError::Format {
        path: path.to_path_buf(),
        message,
    };
    let file = File::open(path).map_err(io)?;
    let mut reader = BufReader::new(file);

    if is_binary(path) {
        let mut header = [0u8; 12];
        reader.read_exact(&mut header).map_err(io)?;
        if &header[..4] != MAGIC {
            return Err(format(format!(
                "bad magic {:?}",
                String::from_utf8_lossy(&header[..4])
            )));
        }
        let nrows = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
        let ncols = u32::from_le_bytes([header[8], header[9], header[10], header[11]]) as usize;
        let mut bytes = Vec::with_capacity(nrows * ncols * 8);
        reader.read_to_end(&mut bytes).map_err(io)?;
        if bytes.len() != nrows * ncols * 8 {
            return Err(format(format!(
                "expected {} entries, found {} bytes",
                nrows * ncols,
                bytes.len()
            )));
        }
        let data = bytes
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .collect();
        return Array2::from_shape_vec((nrows, ncols), data).map_err(|e| format(e.to_string()));
    }

    let mut data = Vec::new();
    let mut ncols = None;
    let mut nrows = 0;
    for (number, line) in reader.lines().enumerate() {
        let line = line.map_err(io)?;
        if line.trim().is_empty() {
            continue;
        }
        let row = line
            .split_whitespace()
            .map(|token| {
                token
                    .parse::<f64>()
                    .map_err(|e| format(format!("line {}: {}: {}", number + 1, token, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        match ncols {
            None => ncols = Some(row.len()),
            Some(n) if n != row.len() => {
                return Err(format(format!(
                    "line {} has {} values, expected {}",
                    number + 1,
                    row.len(),
                    n
                )))
            }
            _ => {}
        }
        data.extend(row);
        nrows += 1;
    }
    Array2::from_shape_vec((nrows, ncols.unwrap_or(0)), data).map_err(|e| format(e.to_string()))
}
