//! Locating fMRIPrep derivatives on disk.
//!
//! fMRIPrep writes its outputs in a BIDS derivatives layout:
//! `<root>/sub-<SSS>/ses-<SS>/func/sub-<SSS>_ses-<SS>_task-<task>_run-<run>_space-<space>_desc-preproc_bold.nii.gz`,
//! with the confounds in a sibling `*_desc-confounds_timeseries.tsv` file.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use crate::error::{ConnectomeError, Result};

pub const PREPROC_BOLD_SUFFIX: &str = "_desc-preproc_bold.nii.gz";
pub const CONFOUNDS_SUFFIX: &str = "_desc-confounds_timeseries.tsv";


/// Format a numeric subject identifier the way the study names its directories, e.g., `7` becomes `007`.
pub fn subject_label(number: u32) -> String {
    format!("{:03}", number)
}


/// The path of the confounds TSV belonging to a preprocessed BOLD image.
///
/// The entities after the run (`_space-...`, `_desc-preproc_bold`) are replaced by the confounds suffix,
/// e.g., `sub-001_ses-01_task-rest_run-01_space-MNI152NLin2009cAsym_desc-preproc_bold.nii.gz` becomes
/// `sub-001_ses-01_task-rest_run-01_desc-confounds_timeseries.tsv` in the same directory.
pub fn confounds_path_for_scan(scan: &Path) -> PathBuf {
    let name = scan.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let stem = if let Some(idx) = name.find("_space-") {
        &name[..idx]
    } else if let Some(idx) = name.find("_desc-") {
        &name[..idx]
    } else {
        name.trim_end_matches(".gz").trim_end_matches(".nii")
    };
    scan.with_file_name(format!("{}{}", stem, CONFOUNDS_SUFFIX))
}


/// The input files for one subject/session pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanFiles {
    pub scan: PathBuf,
    pub confounds: PathBuf,
}


/// Naming convention of the fMRIPrep derivatives directory.
#[derive(Debug, Clone, PartialEq)]
pub struct BidsLayout {
    pub root: PathBuf,
    pub task: String,
    pub run: String,
    pub space: String,
}

impl BidsLayout {

    /// A layout for resting state run 01 in MNI152NLin2009cAsym space below `root`.
    pub fn new<P: AsRef<Path>>(root: P) -> BidsLayout {
        BidsLayout {
            root: root.as_ref().to_path_buf(),
            task: String::from("rest"),
            run: String::from("01"),
            space: String::from("MNI152NLin2009cAsym"),
        }
    }


    pub fn subject_dir(&self, subject: &str) -> PathBuf {
        self.root.join(format!("sub-{}", subject))
    }


    pub fn func_dir(&self, subject: &str, session: &str) -> PathBuf {
        self.subject_dir(subject).join(format!("ses-{}", session)).join("func")
    }


    pub fn scan_filename(&self, subject: &str, session: &str) -> String {
        format!(
            "sub-{}_ses-{}_task-{}_run-{}_space-{}{}",
            subject, session, self.task, self.run, self.space, PREPROC_BOLD_SUFFIX
        )
    }


    /// The confounds file name, derived from the scan file name with [`confounds_path_for_scan`].
    pub fn confounds_filename(&self, subject: &str, session: &str) -> String {
        let scan = self.scan_filename(subject, session);
        confounds_path_for_scan(Path::new(&scan)).to_string_lossy().into_owned()
    }


    /// Build both input paths for a subject/session and check that the files exist.
    ///
    /// The scan is checked first, so a pair without any data reports [`ConnectomeError::MissingScan`].
    pub fn resolve(&self, subject: &str, session: &str) -> Result<ScanFiles> {
        let dir = self.func_dir(subject, session);
        let scan = dir.join(self.scan_filename(subject, session));
        if !scan.is_file() {
            return Err(ConnectomeError::MissingScan(scan));
        }
        let confounds = dir.join(self.confounds_filename(subject, session));
        if !confounds.is_file() {
            return Err(ConnectomeError::MissingConfounds(confounds));
        }
        Ok(ScanFiles { scan, confounds })
    }


    /// The labels of all subjects in the numeric range that have a directory below the root, in ascending order.
    pub fn available_subjects(&self, numbers: RangeInclusive<u32>) -> Vec<String> {
        numbers
            .map(subject_label)
            .filter(|s| self.subject_dir(s).is_dir())
            .collect()
    }
}
