//! Functional connectivity matrices from preprocessed resting-state fMRI.
//!
//! The crate reads fMRIPrep derivatives, reduces each 4D BOLD scan to the mean time series of the
//! regions of a brain atlas, removes confound signals from them and computes a region-by-region
//! correlation matrix per subject and session.
//!
//! Most users will only need [`Pipeline`] and [`PipelineConfig`], the lower-level building blocks
//! like [`read_nifti`], [`LabelsMasker`] and [`ConnectivityMeasure`] can also be used on their own.

pub mod affine;
pub mod atlas;
pub mod cache;
pub mod config;
pub mod confounds;
pub mod connectivity;
pub mod error;
pub mod layout;
pub mod masker;
pub mod nifti;
pub mod pipeline;
pub mod signal;
pub mod traits;
pub mod util;

pub use affine::Affine;
pub use atlas::{fetch_basc, unpack_basc_archive, Atlas, AtlasSource, BascAtlas, BascVersion};
pub use cache::TimeSeriesCache;
pub use config::PipelineConfig;
pub use confounds::{load_confounds, load_confounds_file, Component, ConfoundStrategy, Confounds, ConfoundsTable, Level};
pub use connectivity::{ConnectivityKind, ConnectivityMeasure, EmpiricalCovariance, Estimator, LedoitWolf};
pub use error::{ConnectomeError, Result};
pub use layout::{BidsLayout, ScanFiles};
pub use masker::{LabelsMasker, MaskerOptions};
pub use crate::nifti::{read_nifti, write_nifti, write_nifti_ordered, NiftiDatatype, NiftiHeader, NiftiImage};
pub use pipeline::{read_matrix_csv, write_matrix_csv, BatchSummary, Pipeline, SkippedPair, WrittenMatrix};
pub use signal::{clean, CleanOptions, Standardize};
pub use traits::CovarianceEstimator;
