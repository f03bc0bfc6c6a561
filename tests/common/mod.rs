//! Writes a small fMRIPrep derivatives tree for the integration tests.

use ndarray::{Array, Array4};
use std::fs;
use std::path::{Path, PathBuf};

use neuroconnectivity::{write_nifti, Affine, BidsLayout, NiftiDatatype};

pub const NUM_TIMEPOINTS: usize = 30;
pub const NUM_REGIONS: usize = 4;
const SHAPE: (usize, usize, usize) = (4, 4, 2);


pub fn affine() -> Affine {
    Affine::from_rows([2.0, 0.0, 0.0, -4.0], [0.0, 2.0, 0.0, -4.0], [0.0, 0.0, 2.0, 0.0])
}


/// Label of a voxel: four regions of 2x2x2 voxels.
fn label(x: usize, y: usize) -> usize {
    1 + x / 2 + 2 * (y / 2)
}


/// Deterministic noise in [-0.5, 0.5).
fn noise(seed: usize) -> f32 {
    let v = (seed as u64).wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    ((v >> 33) % 1000) as f32 / 1000.0 - 0.5
}


fn region_signal(region: usize, t: usize, seed: usize) -> f32 {
    let t = t as f32;
    let shared = (t * 0.3).sin();
    let own = match region {
        1 => (t * 0.7).cos(),
        2 => (t * 1.3 + 0.4).sin(),
        3 => -(t * 0.45).sin(),
        _ => (t * 0.9 + 1.0).cos(),
    };
    100.0 + 5.0 * shared + 3.0 * own + noise(seed * 7919 + region * 131 + t as usize)
}


pub fn write_atlas(path: &Path) {
    let (nx, ny, nz) = SHAPE;
    let labels: Array4<f32> = Array::from_shape_fn((nx, ny, nz, 1), |(x, y, _, _)| label(x, y) as f32);
    write_nifti(path, &labels, &affine(), NiftiDatatype::Int16).unwrap();
}


pub fn write_scan(path: &Path, seed: usize) {
    let (nx, ny, nz) = SHAPE;
    let data: Array4<f32> = Array::from_shape_fn((nx, ny, nz, NUM_TIMEPOINTS), |(x, y, z, t)| {
        let voxel = x + nx * (y + ny * z);
        region_signal(label(x, y), t, seed) + 0.2 * noise(seed * 104729 + voxel * 31 + t)
    });
    write_nifti(path, &data, &affine(), NiftiDatatype::Float32).unwrap();
}


/// A confounds TSV with drift regressors, the global signal and columns the default strategy ignores.
pub fn write_confounds(path: &Path, seed: usize, with_global_signal: bool) {
    let mut header = vec!["csf", "white_matter", "trans_x", "trans_x_derivative1", "cosine00", "cosine01"];
    if with_global_signal {
        header.push("global_signal");
    }
    let mut lines = vec![header.join("\t")];
    let n = NUM_TIMEPOINTS as f64;
    for t in 0..NUM_TIMEPOINTS {
        let tf = t as f64;
        let derivative = if t == 0 { String::from("n/a") } else { format!("{}", noise(seed + t) as f64 * 0.01) };
        let mut row = vec![
            format!("{}", 50.0 + noise(seed * 3 + t) as f64),
            format!("{}", 70.0 + noise(seed * 5 + t) as f64),
            format!("{}", noise(seed * 11 + t) as f64 * 0.1),
            derivative,
            format!("{}", (std::f64::consts::PI * (tf + 0.5) / n).cos() * 0.2),
            format!("{}", (2.0 * std::f64::consts::PI * (tf + 0.5) / n).cos() * 0.2),
        ];
        if with_global_signal {
            row.push(format!("{}", 100.0 + 5.0 * (tf * 0.3).sin()));
        }
        lines.push(row.join("\t"));
    }
    fs::write(path, lines.join("\n") + "\n").unwrap();
}


/// Write the scan, and optionally its confounds, for one subject/session and return the scan path.
pub fn add_session(layout: &BidsLayout, subject: &str, session: &str, confounds: bool) -> PathBuf {
    let dir = layout.func_dir(subject, session);
    fs::create_dir_all(&dir).unwrap();
    let seed: usize = subject.parse::<usize>().unwrap() * 10 + session.parse::<usize>().unwrap();
    let scan = dir.join(layout.scan_filename(subject, session));
    write_scan(&scan, seed);
    if confounds {
        write_confounds(&dir.join(layout.confounds_filename(subject, session)), seed, true);
    }
    scan
}
