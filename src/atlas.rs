//! Brain atlases given as volumetric label images.
//!
//! A label image assigns each voxel to exactly one brain region, identified by a positive integer
//! label. Label 0 is background. The default atlas of this crate is the BASC multiscale 2015
//! parcellation at resolution 64, which is resolved from a local nilearn-style data directory and
//! downloaded into it on first use.

use log::info;
use ndarray::{Array3, Axis};
use sha2::{Digest, Sha256};

use std::collections::BTreeSet;
use std::env;
use std::fmt;
use std::fs;
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};

use crate::affine::Affine;
use crate::error::{ConnectomeError, Result};
use crate::nifti::read_nifti;

/// The resolutions (number of regions) at which the BASC multiscale atlas is published.
pub const BASC_RESOLUTIONS: [u32; 9] = [7, 12, 20, 36, 64, 122, 197, 325, 444];

/// The archive holding all BASC multiscale 2015 maps, as fetched by nilearn.
pub const BASC_URL: &str = "https://ndownloader.figshare.com/files/1861819";

/// The directory below the data directory the BASC archive is unpacked into.
pub const BASC_DATASET_DIR: &str = "basc_multiscale_2015";


/// A volumetric label atlas.
#[derive(Debug, Clone, PartialEq)]
pub struct Atlas {
    pub labels_img: Array3<i32>,
    pub affine: Affine,
    pub source: Option<PathBuf>,
    labels: Vec<i32>,
    digest: String,
}

impl Atlas {

    /// Create an atlas from a label volume and its voxel-to-world transform.
    pub fn new(labels_img: Array3<i32>, affine: Affine) -> Result<Atlas> {
        let labels: Vec<i32> = labels_img
            .iter()
            .filter(|&&l| l != 0)
            .copied()
            .collect::<BTreeSet<i32>>()
            .into_iter()
            .collect();
        if labels.is_empty() {
            return Err(ConnectomeError::EmptyAtlas);
        }

        let mut hasher = Sha256::new();
        let (nx, ny, nz) = labels_img.dim();
        for d in [nx, ny, nz].iter() {
            hasher.update((*d as u64).to_le_bytes());
        }
        for v in affine.rows.iter().flatten() {
            hasher.update(v.to_le_bytes());
        }
        for l in labels_img.iter() {
            hasher.update(l.to_le_bytes());
        }
        let digest = format!("{:x}", hasher.finalize());

        Ok(Atlas { labels_img, affine, source: None, labels, digest })
    }


    /// Read an atlas from a 3D NIfTI label image. Voxel values are rounded to the nearest integer label.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// let atlas = neuroconnectivity::Atlas::from_file("/path/to/template_cambridge_basc_multiscale_sym_scale064.nii.gz").unwrap();
    /// println!("Atlas has {} regions.", atlas.num_regions());
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Atlas> {
        let img = read_nifti(&path)?;
        let (_, _, _, nt) = img.shape();
        if nt != 1 {
            return Err(ConnectomeError::DimensionMismatch(format!("atlas must be a 3D label image, found {} volumes", nt)));
        }
        let labels_img = img.data.index_axis(Axis(3), 0).mapv(|v| v.round() as i32);
        let mut atlas = Atlas::new(labels_img, img.affine())?;
        atlas.source = Some(path.as_ref().to_path_buf());
        Ok(atlas)
    }


    /// The sorted, non-background region labels.
    pub fn labels(&self) -> &[i32] {
        &self.labels
    }


    pub fn num_regions(&self) -> usize {
        self.labels.len()
    }


    /// The column index of the region with the given label in extracted time series, if the label is part of the atlas.
    pub fn region_index(&self, label: i32) -> Option<usize> {
        self.labels.binary_search(&label).ok()
    }


    /// A hex SHA-256 digest over the label volume and affine, used to key cached time series.
    pub fn digest(&self) -> &str {
        &self.digest
    }


    /// Resample the label volume onto another voxel grid with nearest-neighbour interpolation.
    ///
    /// Each target voxel is mapped to world space with `affine`, then into the atlas voxel grid. Target
    /// voxels that fall outside the atlas field of view are assigned to the background.
    pub fn resample_to(&self, shape: (usize, usize, usize), affine: &Affine) -> Result<Array3<i32>> {
        if shape == self.labels_img.dim() && affine.approx_eq(&self.affine, 1e-6) {
            return Ok(self.labels_img.clone());
        }

        let target_to_atlas = self.affine.inverse()?.compose(affine);
        let (ax, ay, az) = self.labels_img.dim();
        let lookup = |c: f64, len: usize| -> Option<usize> {
            let idx = c.round();
            if idx >= 0.0 && (idx as usize) < len { Some(idx as usize) } else { None }
        };

        let resampled = Array3::from_shape_fn(shape, |(i, j, k)| {
            let a = target_to_atlas.apply([i as f64, j as f64, k as f64]);
            match (lookup(a[0], ax), lookup(a[1], ay), lookup(a[2], az)) {
                (Some(x), Some(y), Some(z)) => self.labels_img[[x, y, z]],
                _ => 0,
            }
        });
        Ok(resampled)
    }
}

impl fmt::Display for Atlas {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (nx, ny, nz) = self.labels_img.dim();
        write!(f, "Label atlas with {} regions on a {}x{}x{} voxel grid.", self.num_regions(), nx, ny, nz)
    }
}


/// The two flavours of the BASC atlas: symmetric across hemispheres, or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BascVersion {
    Sym,
    Asym,
}

impl BascVersion {
    fn tag(&self) -> &'static str {
        match self {
            BascVersion::Sym => "sym",
            BascVersion::Asym => "asym",
        }
    }
}


/// The Bootstrap Analysis of Stable Clusters (BASC) multiscale atlas, 2015 release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BascAtlas {
    pub resolution: u32,
    pub version: BascVersion,
}

impl Default for BascAtlas {
    fn default() -> BascAtlas {
        BascAtlas { resolution: 64, version: BascVersion::Sym }
    }
}

impl BascAtlas {

    pub fn new(resolution: u32, version: BascVersion) -> Result<BascAtlas> {
        if !BASC_RESOLUTIONS.contains(&resolution) {
            return Err(ConnectomeError::InvalidAtlasResolution(resolution));
        }
        Ok(BascAtlas { resolution, version })
    }

    /// The path of the atlas map relative to the data directory, as laid out by nilearn's fetcher.
    pub fn relative_path(&self) -> PathBuf {
        let v = self.version.tag();
        PathBuf::from(BASC_DATASET_DIR)
            .join(format!("template_cambridge_basc_multiscale_nii_{}", v))
            .join(format!("template_cambridge_basc_multiscale_{}_scale{:03}.nii.gz", v, self.resolution))
    }
}


/// Where the atlas label image comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum AtlasSource {
    /// The BASC atlas at a given resolution, looked up in the data directory.
    Basc(BascAtlas),
    /// An explicit label image file.
    File(PathBuf),
}

impl Default for AtlasSource {
    fn default() -> AtlasSource {
        AtlasSource::Basc(BascAtlas::default())
    }
}

impl AtlasSource {

    /// Determine the atlas file path and check that it exists.
    ///
    /// If `download` is set and the BASC atlas is not in the data directory yet, it is fetched first.
    /// Explicit atlas files are never downloaded.
    pub fn locate(&self, data_dir: Option<&Path>, download: bool) -> Result<PathBuf> {
        let path = match self {
            AtlasSource::File(path) => path.clone(),
            AtlasSource::Basc(basc) => {
                let data_dir = resolve_data_dir(data_dir)?;
                let path = data_dir.join(basc.relative_path());
                if download && !path.is_file() {
                    fetch_basc(&data_dir)?;
                }
                path
            },
        };
        if !path.is_file() {
            return Err(ConnectomeError::AtlasNotFound(path));
        }
        Ok(path)
    }

    /// Locate and read the atlas.
    pub fn load(&self, data_dir: Option<&Path>, download: bool) -> Result<Atlas> {
        Atlas::from_file(self.locate(data_dir, download)?)
    }
}


/// Download the BASC multiscale archive and unpack it into `<data_dir>/basc_multiscale_2015`.
///
/// Returns the dataset directory.
pub fn fetch_basc(data_dir: &Path) -> Result<PathBuf> {
    let dataset_dir = data_dir.join(BASC_DATASET_DIR);
    info!("Downloading the BASC atlas from {} to {}", BASC_URL, dataset_dir.display());
    let archive = reqwest::blocking::get(BASC_URL)?.error_for_status()?.bytes()?;
    info!("Downloaded {} bytes", archive.len());
    unpack_basc_archive(Cursor::new(archive), &dataset_dir)?;
    Ok(dataset_dir)
}


/// Unpack a BASC zip archive into the dataset directory, keeping its internal directory structure.
pub fn unpack_basc_archive<R>(reader: R, dataset_dir: &Path) -> Result<()>
where
    R: Read + Seek,
{
    fs::create_dir_all(dataset_dir)?;
    let mut archive = zip::ZipArchive::new(reader)?;
    archive.extract(dataset_dir)?;
    Ok(())
}


/// Determine the atlas data directory: the explicit one if given, else the first entry of the
/// `NILEARN_DATA` environment variable, else `nilearn_data` in the user's home directory.
pub fn resolve_data_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir.to_path_buf());
    }
    if let Some(value) = env::var_os("NILEARN_DATA") {
        if let Some(first) = env::split_paths(&value).next() {
            if !first.as_os_str().is_empty() {
                return Ok(first);
            }
        }
    }
    dirs::home_dir()
        .map(|home| home.join("nilearn_data"))
        .ok_or(ConnectomeError::NoDataDir)
}
