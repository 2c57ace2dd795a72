//! Minimal NIfTI header reader.
//!
//! Only the image geometry is needed to pick template resolutions and to turn
//! a total readout time into an echo spacing, so voxel data is never read.
//! Supports NIfTI-1 and NIfTI-2, either byte order, plain or gzip-compressed.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;

use crate::error::{HcpError, Result};

const NIFTI1_HEADER_SIZE: usize = 348;
const NIFTI2_HEADER_SIZE: usize = 540;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NiftiHeader {
    /// 1 or 2.
    pub version: u8,
    /// Image dimensions, `dim[1..=ndim]`.
    shape: Vec<usize>,
    /// Voxel sizes, `pixdim[1..=ndim]`.
    zooms: Vec<f64>,
}

impl NiftiHeader {
    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let reader: Box<dyn Read> = if is_gzip(path) {
            Box::new(GzDecoder::new(BufReader::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };
        let bytes = read_header_bytes(reader, path)?;
        Self::parse(&bytes, path)
    }

    pub fn parse(bytes: &[u8], path: &Path) -> Result<Self> {
        if bytes.len() < NIFTI1_HEADER_SIZE {
            return Err(invalid(path, format!("header is only {} bytes", bytes.len())));
        }
        let size_le = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let size_be = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);

        let (version, endian) = match (size_le, size_be) {
            (348, _) => (1, Endian::Little),
            (_, 348) => (1, Endian::Big),
            (540, _) => (2, Endian::Little),
            (_, 540) => (2, Endian::Big),
            _ => {
                return Err(invalid(
                    path,
                    format!("unrecognised sizeof_hdr {size_le}"),
                ))
            }
        };

        let (dims, pixdims) = if version == 1 {
            let dims: Vec<i64> = (0..8)
                .map(|i| i64::from(read_i16(bytes, 40 + i * 2, endian)))
                .collect();
            let pixdims: Vec<f64> = (0..8)
                .map(|i| f64::from(read_f32(bytes, 76 + i * 4, endian)))
                .collect();
            (dims, pixdims)
        } else {
            if bytes.len() < NIFTI2_HEADER_SIZE {
                return Err(invalid(path, "truncated NIfTI-2 header".to_string()));
            }
            let dims: Vec<i64> = (0..8).map(|i| read_i64(bytes, 16 + i * 8, endian)).collect();
            let pixdims: Vec<f64> = (0..8).map(|i| read_f64(bytes, 104 + i * 8, endian)).collect();
            (dims, pixdims)
        };

        let ndim = dims[0];
        if !(1..=7).contains(&ndim) {
            return Err(invalid(path, format!("dim[0] out of range: {ndim}")));
        }
        let ndim = ndim as usize;
        let shape = dims[1..=ndim]
            .iter()
            .map(|&d| usize::try_from(d).map_err(|_| invalid(path, format!("negative dimension {d}"))))
            .collect::<Result<Vec<_>>>()?;
        let zooms = pixdims[1..=ndim].iter().map(|z| z.abs()).collect();

        Ok(Self {
            version,
            shape,
            zooms,
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn zooms(&self) -> &[f64] {
        &self.zooms
    }

    /// Smallest voxel edge over the three spatial axes.
    pub fn min_spatial_zoom(&self) -> f64 {
        self.zooms()
            .iter()
            .take(3)
            .copied()
            .fold(f64::INFINITY, f64::min)
    }

    pub fn dim(&self, axis: usize) -> Option<usize> {
        self.shape.get(axis).copied()
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

fn read_header_bytes(reader: impl Read, path: &Path) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(NIFTI2_HEADER_SIZE);
    reader
        .take(NIFTI2_HEADER_SIZE as u64)
        .read_to_end(&mut buf)
        .map_err(|e| invalid(path, format!("failed to read header: {e}")))?;
    Ok(buf)
}

fn invalid(path: &Path, reason: String) -> HcpError {
    HcpError::InvalidNifti {
        path: PathBuf::from(path),
        reason,
    }
}

fn read_i16(bytes: &[u8], offset: usize, endian: Endian) -> i16 {
    let raw = [bytes[offset], bytes[offset + 1]];
    match endian {
        Endian::Little => i16::from_le_bytes(raw),
        Endian::Big => i16::from_be_bytes(raw),
    }
}

fn read_f32(bytes: &[u8], offset: usize, endian: Endian) -> f32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[offset..offset + 4]);
    match endian {
        Endian::Little => f32::from_le_bytes(raw),
        Endian::Big => f32::from_be_bytes(raw),
    }
}

fn read_i64(bytes: &[u8], offset: usize, endian: Endian) -> i64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[offset..offset + 8]);
    match endian {
        Endian::Little => i64::from_le_bytes(raw),
        Endian::Big => i64::from_be_bytes(raw),
    }
}

fn read_f64(bytes: &[u8], offset: usize, endian: Endian) -> f64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[offset..offset + 8]);
    match endian {
        Endian::Little => f64::from_le_bytes(raw),
        Endian::Big => f64::from_be_bytes(raw),
    }
}
