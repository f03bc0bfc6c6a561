//! Configuration of a connectivity batch run.
//!
//! The defaults reproduce the study setup: fMRIPrep derivatives of subjects 1 to 155 with three
//! sessions each, parcellated with the BASC atlas at resolution 64.

use std::ops::RangeInclusive;
use std::path::PathBuf;

use crate::atlas::AtlasSource;
use crate::confounds::ConfoundStrategy;
use crate::connectivity::ConnectivityMeasure;
use crate::layout::BidsLayout;
use crate::masker::MaskerOptions;

pub const DEFAULT_DATA_DIR: &str = "/Volume/SubhaWork/fmriprep/";
pub const DEFAULT_OUTPUT_DIR: &str = "/Volume/SubhaWork/fmriprep/correlation_matrix_output";
pub const DEFAULT_SESSIONS: [&str; 3] = ["01", "02", "03"];
pub const DEFAULT_FIRST_SUBJECT: u32 = 1;
pub const DEFAULT_LAST_SUBJECT: u32 = 155;


/// All settings of a [`crate::Pipeline`].
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// The fMRIPrep derivatives directory containing the `sub-*` directories.
    pub data_dir: PathBuf,
    /// Where the correlation matrix CSV files are written. Created if needed.
    pub output_dir: PathBuf,
    pub first_subject: u32,
    pub last_subject: u32,
    pub sessions: Vec<String>,
    pub task: String,
    pub run: String,
    pub space: String,
    pub atlas: AtlasSource,
    /// Data directory to look up named atlases in. See [`crate::atlas::resolve_data_dir`] for the fallbacks.
    pub atlas_data_dir: Option<PathBuf>,
    /// Download the BASC atlas into the data directory if it is not there yet.
    pub atlas_download: bool,
    pub confounds: ConfoundStrategy,
    pub masker: MaskerOptions,
    pub connectivity: ConnectivityMeasure,
}

impl Default for PipelineConfig {
    fn default() -> PipelineConfig {
        let layout = BidsLayout::new(DEFAULT_DATA_DIR);
        PipelineConfig {
            data_dir: layout.root,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            first_subject: DEFAULT_FIRST_SUBJECT,
            last_subject: DEFAULT_LAST_SUBJECT,
            sessions: DEFAULT_SESSIONS.iter().map(|s| s.to_string()).collect(),
            task: layout.task,
            run: layout.run,
            space: layout.space,
            atlas: AtlasSource::default(),
            atlas_data_dir: None,
            atlas_download: true,
            confounds: ConfoundStrategy::default(),
            masker: MaskerOptions::default(),
            connectivity: ConnectivityMeasure::default(),
        }
    }
}

impl PipelineConfig {

    /// The numeric subject identifiers to look for.
    pub fn subjects(&self) -> RangeInclusive<u32> {
        self.first_subject..=self.last_subject
    }

    /// The file naming convention of the input data.
    pub fn layout(&self) -> BidsLayout {
        BidsLayout {
            root: self.data_dir.clone(),
            task: self.task.clone(),
            run: self.run.clone(),
            space: self.space.clone(),
        }
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::atlas::BascAtlas;
    use crate::confounds::{Component, Level};

    #[test]
    fn the_defaults_match_the_study_setup() {
        let config = PipelineConfig::default();
        assert_eq!(PathBuf::from("/Volume/SubhaWork/fmriprep/"), config.data_dir);
        assert_eq!(1..=155, config.subjects());
        assert_eq!(vec!["01", "02", "03"], config.sessions);
        assert_eq!(AtlasSource::Basc(BascAtlas::default()), config.atlas);
        assert_eq!(64, BascAtlas::default().resolution);
        assert!(config.atlas_download);
        assert_eq!(vec![Component::HighPass, Component::GlobalSignal], config.confounds.components);
        assert_eq!(Level::Full, config.confounds.motion);
        assert!(config.confounds.demean);
        assert!(config.masker.cache_dir.is_some());
    }

    #[test]
    fn the_layout_uses_the_configured_entities() {
        let config = PipelineConfig { task: String::from("movie"), ..PipelineConfig::default() };
        let layout = config.layout();
        assert!(layout.scan_filename("001", "01").contains("_task-movie_"));
        assert_eq!(config.data_dir, layout.root);
    }
}
