//! Extraction of region time series from 4D functional images using a label atlas.

use log::{debug, warn};
use ndarray::Array2;
use sha2::{Digest, Sha256};

use std::path::{Path, PathBuf};

use crate::atlas::Atlas;
use crate::cache::TimeSeriesCache;
use crate::confounds::Confounds;
use crate::error::Result;
use crate::nifti::{read_nifti, NiftiImage};
use crate::signal::{clean, CleanOptions, Standardize};
use crate::util::hash_file_identity;

pub const DEFAULT_CACHE_DIR: &str = "connectome_cache";


/// Settings of a [`LabelsMasker`].
#[derive(Debug, Clone, PartialEq)]
pub struct MaskerOptions {
    pub standardize: Standardize,
    pub standardize_confounds: Standardize,
    /// Directory for cached time series, caching is disabled if `None`.
    pub cache_dir: Option<PathBuf>,
}

impl Default for MaskerOptions {
    fn default() -> MaskerOptions {
        MaskerOptions {
            standardize: Standardize::ZscoreSample,
            standardize_confounds: Standardize::ZscoreSample,
            cache_dir: Some(PathBuf::from(DEFAULT_CACHE_DIR)),
        }
    }
}


/// Reduces a 4D image to one mean time series per atlas region, and removes confounds from them.
///
/// The columns of the extracted (timepoints x regions) matrix follow the ascending order of the atlas labels.
#[derive(Debug, Clone)]
pub struct LabelsMasker {
    atlas: Atlas,
    options: MaskerOptions,
    cache: Option<TimeSeriesCache>,
}

impl LabelsMasker {

    pub fn new(atlas: Atlas, options: MaskerOptions) -> LabelsMasker {
        let cache = options.cache_dir.as_ref().map(TimeSeriesCache::new);
        LabelsMasker { atlas, options, cache }
    }


    pub fn atlas(&self) -> &Atlas {
        &self.atlas
    }


    pub fn options(&self) -> &MaskerOptions {
        &self.options
    }


    /// Extract the cleaned region time series from the image file.
    ///
    /// If caching is enabled, a previous result for the same image file, atlas, options and confounds is
    /// returned unchanged instead of reading the image again.
    pub fn fit_transform<P: AsRef<Path>>(&self, scan_path: P, confounds: Option<&Confounds>) -> Result<Array2<f64>> {
        let scan_path = scan_path.as_ref();
        let cached = match &self.cache {
            Some(cache) => Some((cache, self.cache_key(scan_path, confounds)?)),
            None => None,
        };

        if let Some((cache, key)) = &cached {
            match cache.load(key) {
                Ok(Some(time_series)) => {
                    debug!("Using cached time series for {}", scan_path.display());
                    return Ok(time_series);
                },
                Ok(None) => {},
                Err(e) => warn!("{}, recomputing", e),
            }
        }

        let img = read_nifti(scan_path)?;
        debug!("Read {} from {}", img, scan_path.display());
        let time_series = self.transform_image(&img, confounds.map(|c| &c.values))?;

        if let Some((cache, key)) = &cached {
            if let Err(e) = cache.store(key, &time_series) {
                warn!("Could not cache time series for {}: {}", scan_path.display(), e);
            }
        }
        Ok(time_series)
    }


    /// Extract the region means from an image in memory and clean them.
    pub fn transform_image(&self, img: &NiftiImage, confounds: Option<&Array2<f64>>) -> Result<Array2<f64>> {
        let mut signals = self.region_signals(img)?;
        let opts = CleanOptions {
            standardize: self.options.standardize,
            standardize_confounds: self.options.standardize_confounds,
        };
        clean(&mut signals, confounds, &opts)?;
        Ok(signals)
    }


    /// The raw mean signal of each region at each timepoint.
    ///
    /// The atlas is resampled onto the image grid first. Regions without any voxel on that grid get a signal of 0.
    pub fn region_signals(&self, img: &NiftiImage) -> Result<Array2<f64>> {
        let (nx, ny, nz, nt) = img.shape();
        let labels = self.atlas.resample_to((nx, ny, nz), &img.affine())?;
        let num_regions = self.atlas.num_regions();

        let mut voxels: Vec<(usize, usize, usize, usize)> = Vec::new();
        let mut counts = vec![0usize; num_regions];
        for ((x, y, z), &label) in labels.indexed_iter() {
            if let Some(region) = self.atlas.region_index(label) {
                voxels.push((x, y, z, region));
                counts[region] += 1;
            }
        }
        // Visit voxels in the storage order of the image data.
        voxels.sort_by_key(|&(x, y, z, _)| (z, y, x));

        for (region, count) in counts.iter().enumerate() {
            if *count == 0 {
                warn!("Atlas region with label {} has no voxels on the image grid, its signal is set to 0", self.atlas.labels()[region]);
            }
        }

        let mut signals = Array2::<f64>::zeros((nt, num_regions));
        for t in 0..nt {
            let mut row = signals.row_mut(t);
            for &(x, y, z, region) in voxels.iter() {
                row[region] += img.data[[x, y, z, t]] as f64;
            }
            for (region, count) in counts.iter().enumerate() {
                if *count > 0 {
                    row[region] /= *count as f64;
                }
            }
        }
        Ok(signals)
    }


    /// The key under which the time series for the scan and confounds are cached.
    pub fn cache_key(&self, scan_path: &Path, confounds: Option<&Confounds>) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(b"labels-masker-v1");
        hash_file_identity(&mut hasher, scan_path)?;
        hasher.update(self.atlas.digest().as_bytes());
        hasher.update(format!("{:?}/{:?}", self.options.standardize, self.options.standardize_confounds).as_bytes());
        match confounds {
            Some(c) => {
                hasher.update((c.values.nrows() as u64).to_le_bytes());
                hasher.update((c.values.ncols() as u64).to_le_bytes());
                for v in c.values.iter() {
                    hasher.update(v.to_le_bytes());
                }
            },
            None => hasher.update(b"no-confounds"),
        }
        Ok(format!("{:x}", hasher.finalize()))
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::affine::Affine;
    use crate::nifti::{write_nifti, NiftiDatatype};
    use approx::assert_abs_diff_eq;
    use ndarray::{Array, Array3, Array4};
    use tempfile::tempdir;

    /// Two regions split along x.
    fn atlas() -> Atlas {
        let labels: Array3<i32> = Array::from_shape_fn((4, 2, 2), |(x, _, _)| if x < 2 { 1 } else { 2 });
        Atlas::new(labels, Affine::default()).unwrap()
    }

    fn image(nt: usize) -> NiftiImage {
        let data: Array4<f32> = Array::from_shape_fn((4, 2, 2, nt), |(x, y, _, t)| {
            let base = if x < 2 { (t as f32 * 0.5).sin() } else { (t as f32 * 0.9).cos() };
            base * 10.0 + y as f32
        });
        let mut header = crate::nifti::NiftiHeader::default();
        header.dim = [4, 4, 2, 2, nt as i16, 1, 1, 1];
        NiftiImage { header, data }
    }

    fn no_cache() -> MaskerOptions {
        MaskerOptions { cache_dir: None, ..MaskerOptions::default() }
    }

    #[test]
    fn region_signals_are_voxel_means() {
        let masker = LabelsMasker::new(atlas(), no_cache());
        let img = image(5);
        let signals = masker.region_signals(&img).unwrap();
        assert_eq!((5, 2), signals.dim());
        for t in 0..5 {
            let expected = (t as f64 * 0.5).sin() as f32 as f64;
            assert_abs_diff_eq!(expected * 10.0 + 0.5, signals[[t, 0]], epsilon = 1e-5);
        }
    }

    #[test]
    fn regions_outside_the_image_get_a_zero_signal() {
        let labels: Array3<i32> = Array::from_shape_fn((6, 2, 2), |(x, _, _)| if x < 4 { 1 } else { 7 });
        let masker = LabelsMasker::new(Atlas::new(labels, Affine::default()).unwrap(), no_cache());
        let signals = masker.region_signals(&image(3)).unwrap();
        assert_eq!((3, 2), signals.dim());
        assert!(signals.column(1).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn transformed_signals_are_standardized() {
        let masker = LabelsMasker::new(atlas(), no_cache());
        let ts = masker.transform_image(&image(20), None).unwrap();
        for col in ts.axis_iter(ndarray::Axis(1)) {
            assert_abs_diff_eq!(0.0, col.sum(), epsilon = 1e-9);
            assert_abs_diff_eq!(19.0, col.iter().map(|v| v * v).sum::<f64>(), epsilon = 1e-9);
        }
    }

    #[test]
    fn cached_results_are_reused() {
        let dir = tempdir().unwrap();
        let scan = dir.path().join("bold.nii.gz");
        let img = image(12);
        write_nifti(&scan, &img.data, &Affine::default(), NiftiDatatype::Float32).unwrap();

        let opts = MaskerOptions { cache_dir: Some(dir.path().join("cache")), ..MaskerOptions::default() };
        let masker = LabelsMasker::new(atlas(), opts);
        let first = masker.fit_transform(&scan, None).unwrap();

        let key = masker.cache_key(&scan, None).unwrap();
        let cache = TimeSeriesCache::new(dir.path().join("cache"));
        assert_eq!(Some(first.clone()), cache.load(&key).unwrap());

        let second = masker.fit_transform(&scan, None).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn the_cache_key_depends_on_the_confounds() {
        let dir = tempdir().unwrap();
        let scan = dir.path().join("bold.nii");
        write_nifti(&scan, &image(4).data, &Affine::default(), NiftiDatatype::Float32).unwrap();
        let masker = LabelsMasker::new(atlas(), MaskerOptions::default());

        let confounds = Confounds { names: vec![String::from("global_signal")], values: Array2::zeros((4, 1)) };
        let mut other = confounds.clone();
        other.values[[2, 0]] = 1.0;

        let a = masker.cache_key(&scan, Some(&confounds)).unwrap();
        let b = masker.cache_key(&scan, Some(&other)).unwrap();
        assert_ne!(a, b);
        assert_eq!(a, masker.cache_key(&scan, Some(&confounds)).unwrap());
    }
}
