//! The batch driver: one correlation matrix per subject and session.
//!
//! Each subject/session pair is processed independently. A pair that cannot be processed, e.g., because
//! its scan is missing, is logged and skipped, and the batch continues with the next pair.

use csv::{ReaderBuilder, WriterBuilder};
use log::{error, info, warn};
use ndarray::Array2;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::atlas::Atlas;
use crate::config::PipelineConfig;
use crate::confounds::{load_confounds_file, ConfoundStrategy, Confounds};
use crate::connectivity::ConnectivityMeasure;
use crate::error::{ConnectomeError, Result};
use crate::layout::BidsLayout;
use crate::masker::LabelsMasker;


/// A correlation matrix that was computed and written.
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenMatrix {
    pub subject: String,
    pub session: String,
    pub path: PathBuf,
}

/// A subject/session pair that was skipped, with the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedPair {
    pub subject: String,
    pub session: String,
    pub reason: String,
}

/// The outcome of a batch run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchSummary {
    pub written: Vec<WrittenMatrix>,
    pub skipped: Vec<SkippedPair>,
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Wrote {} correlation matrices, skipped {} subject/session pairs.", self.written.len(), self.skipped.len())
    }
}


/// Computes connectivity matrices for all subjects and sessions of a dataset.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    layout: BidsLayout,
    masker: LabelsMasker,
    measure: ConnectivityMeasure,
}

impl Pipeline {

    /// Set up the pipeline. The atlas is loaded once here and shared by all subjects.
    pub fn new(config: PipelineConfig) -> Result<Pipeline> {
        let atlas = config.atlas.load(config.atlas_data_dir.as_deref(), config.atlas_download)?;
        info!("Loaded {}", atlas);
        Ok(Pipeline::with_atlas(config, atlas))
    }


    /// Set up the pipeline with an atlas that is already in memory. The atlas source of the config is ignored.
    pub fn with_atlas(config: PipelineConfig, atlas: Atlas) -> Pipeline {
        let layout = config.layout();
        let masker = LabelsMasker::new(atlas, config.masker.clone());
        let measure = config.connectivity;
        Pipeline { config, layout, masker, measure }
    }


    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }


    /// The CSV file the matrix of the given subject/session is written to.
    pub fn output_path(&self, subject: &str, session: &str) -> PathBuf {
        self.config.output_dir.join(format!("sub-{}_ses-{}_correlation_matrix.csv", subject, session))
    }


    /// Compute the connectivity matrix of one subject/session pair.
    pub fn process(&self, subject: &str, session: &str) -> Result<Array2<f64>> {
        let files = self.layout.resolve(subject, session)?;
        let confounds = load_confounds_logged(&files.confounds, &self.config.confounds)
            .ok_or_else(|| ConnectomeError::ConfoundsUnavailable(subject.to_string(), session.to_string()))?;
        let time_series = self.masker.fit_transform(&files.scan, Some(&confounds))?;
        self.measure.fit_transform(&time_series)
    }


    /// Process all available subjects and configured sessions, writing one CSV file per pair.
    ///
    /// Only errors that affect the whole batch, like a failure to create the output directory, are returned.
    pub fn run(&self) -> Result<BatchSummary> {
        fs::create_dir_all(&self.config.output_dir)?;
        let subjects = self.layout.available_subjects(self.config.subjects());
        info!("Found {} subjects in {}", subjects.len(), self.layout.root.display());

        let mut summary = BatchSummary::default();
        for subject in subjects.iter() {
            for session in self.config.sessions.iter() {
                let result = self.process(subject, session).and_then(|matrix| {
                    let path = self.output_path(subject, session);
                    write_matrix_csv(&path, &matrix)?;
                    Ok(path)
                });
                match result {
                    Ok(path) => {
                        info!("Wrote {}", path.display());
                        summary.written.push(WrittenMatrix { subject: subject.clone(), session: session.clone(), path });
                    },
                    Err(e) => {
                        warn!("Error processing subject {}, session {}: {}", subject, session, e);
                        summary.skipped.push(SkippedPair { subject: subject.clone(), session: session.clone(), reason: e.to_string() });
                    },
                }
            }
        }
        info!("{}", summary);
        Ok(summary)
    }
}


/// Load a confounds file. Failures are logged and turned into `None`.
fn load_confounds_logged(path: &Path, strategy: &ConfoundStrategy) -> Option<Confounds> {
    match load_confounds_file(path, strategy) {
        Ok(confounds) => Some(confounds),
        Err(e) => {
            error!("Error: {}", e);
            None
        },
    }
}


/// Write a matrix as comma-separated values without header row or index column, one matrix row per line.
///
/// Values use the shortest representation that reads back to the same f64.
pub fn write_matrix_csv<P: AsRef<Path>>(path: P, matrix: &Array2<f64>) -> Result<()> {
    let mut wtr = WriterBuilder::new().has_headers(false).from_path(path)?;
    for row in matrix.outer_iter() {
        wtr.write_record(row.iter().map(|v| format!("{:?}", v)))?;
    }
    wtr.flush()?;
    Ok(())
}


/// Read a headerless, comma-separated numeric matrix as written by [`write_matrix_csv`].
pub fn read_matrix_csv<P: AsRef<Path>>(path: P) -> Result<Array2<f64>> {
    let mut rdr = ReaderBuilder::new().has_headers(false).flexible(false).from_path(path)?;
    let mut values: Vec<f64> = Vec::new();
    let mut rows = 0;
    for result in rdr.records() {
        let record = result?;
        for (col, cell) in record.iter().enumerate() {
            let v = cell.trim().parse::<f64>()
                .map_err(|_| ConnectomeError::InvalidMatrixValue(rows, col, cell.to_string()))?;
            values.push(v);
        }
        rows += 1;
    }
    let cols = if rows == 0 { 0 } else { values.len() / rows };
    Array2::from_shape_vec((rows, cols), values).map_err(|e| ConnectomeError::DimensionMismatch(e.to_string()))
}
