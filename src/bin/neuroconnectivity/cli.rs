use clap::Parser;
use std::path::PathBuf;

use neuroconnectivity::config::{DEFAULT_DATA_DIR, DEFAULT_FIRST_SUBJECT, DEFAULT_LAST_SUBJECT, DEFAULT_OUTPUT_DIR};
use neuroconnectivity::masker::DEFAULT_CACHE_DIR;
use neuroconnectivity::{AtlasSource, BascAtlas, BascVersion, ConnectivityKind, Estimator, PipelineConfig, Result};

#[derive(Parser, Debug)]
#[command(
    name = "neuroconnectivity",
    version,
    about = "Compute functional connectivity matrices from fMRIPrep derivatives",
    long_about = "Extract atlas region time series from preprocessed resting-state BOLD scans, remove confounds\n\
                  and write one correlation matrix CSV file per subject and session.\n\
                  Running without options processes subjects 1 to 155, sessions 01 to 03, with the BASC 64 atlas."
)]
pub struct Cli {
    /// fMRIPrep derivatives directory containing the sub-NNN directories
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Directory the correlation matrix CSV files are written to
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// Label atlas NIfTI file to use instead of the BASC atlas
    #[arg(long, conflicts_with = "atlas_resolution")]
    pub atlas: Option<PathBuf>,

    /// Number of regions of the BASC atlas (7, 12, 20, 36, 64, 122, 197, 325 or 444)
    #[arg(long, default_value_t = 64)]
    pub atlas_resolution: u32,

    /// Use the asymmetric version of the BASC atlas
    #[arg(long)]
    pub asym: bool,

    /// Data directory holding the BASC atlas. Defaults to $NILEARN_DATA or ~/nilearn_data
    #[arg(long)]
    pub atlas_data_dir: Option<PathBuf>,

    /// Fail instead of downloading the BASC atlas when it is missing from the data directory
    #[arg(long)]
    pub no_download: bool,

    /// Directory for cached region time series
    #[arg(long, default_value = DEFAULT_CACHE_DIR)]
    pub cache_dir: PathBuf,

    /// Do not read or write cached region time series
    #[arg(long)]
    pub no_cache: bool,

    /// First subject number to process
    #[arg(long, default_value_t = DEFAULT_FIRST_SUBJECT)]
    pub first_subject: u32,

    /// Last subject number to process
    #[arg(long, default_value_t = DEFAULT_LAST_SUBJECT)]
    pub last_subject: u32,

    /// Session labels to process
    #[arg(long, default_values_t = vec!["01".to_string(), "02".to_string(), "03".to_string()], num_args = 1.., value_delimiter = ',')]
    pub sessions: Vec<String>,

    /// Connectivity kind (correlation, partial_correlation, covariance, precision)
    #[arg(long, default_value = "correlation")]
    pub kind: ConnectivityKind,

    /// Covariance estimator (ledoit_wolf, empirical)
    #[arg(long, default_value = "ledoit_wolf")]
    pub estimator: Estimator,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {

    /// Build the pipeline configuration, starting from the defaults.
    pub fn into_config(self) -> Result<PipelineConfig> {
        let defaults = PipelineConfig::default();
        let atlas = match self.atlas {
            Some(path) => AtlasSource::File(path),
            None => {
                let version = if self.asym { BascVersion::Asym } else { BascVersion::Sym };
                AtlasSource::Basc(BascAtlas::new(self.atlas_resolution, version)?)
            },
        };

        let mut masker = defaults.masker.clone();
        masker.cache_dir = if self.no_cache { None } else { Some(self.cache_dir) };

        let mut connectivity = defaults.connectivity;
        connectivity.kind = self.kind;
        connectivity.estimator = self.estimator;

        Ok(PipelineConfig {
            data_dir: self.data_dir,
            output_dir: self.output_dir,
            first_subject: self.first_subject,
            last_subject: self.last_subject,
            sessions: self.sessions,
            atlas,
            atlas_data_dir: self.atlas_data_dir,
            atlas_download: !self.no_download,
            masker,
            connectivity,
            ..defaults
        })
    }
}
