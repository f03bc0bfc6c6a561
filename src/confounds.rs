//! Loading of nuisance regressors from fMRIPrep confounds files.
//!
//! fMRIPrep writes one tab-separated `*_desc-confounds_timeseries.tsv` file per functional run. It
//! has one column per candidate regressor and one row per volume. Missing values, typically the
//! first row of temporal derivatives, are written as `n/a`. A [`ConfoundStrategy`] selects a subset
//! of the columns following fMRIPrep's naming conventions.

use csv::ReaderBuilder;
use log::debug;
use ndarray::Array2;

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;

use crate::error::{ConnectomeError, Result};
use crate::layout::confounds_path_for_scan;


/// The raw content of a confounds TSV file.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfoundsTable {
    pub names: Vec<String>,
    pub columns: Vec<Vec<f64>>,
}

impl ConfoundsTable {

    /// Read a confounds table from a TSV file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<ConfoundsTable> {
        let file = BufReader::new(File::open(path)?);
        ConfoundsTable::from_reader(file)
    }


    /// Read a confounds table from a tab-separated stream with a header line. `n/a` and empty cells become NaN.
    pub fn from_reader<S>(input: S) -> Result<ConfoundsTable>
    where
        S: Read,
    {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(b'\t')
            .flexible(false)
            .from_reader(input);

        let names: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
        let mut columns: Vec<Vec<f64>> = vec![Vec::new(); names.len()];

        for (row, result) in rdr.records().enumerate() {
            let record = result?;
            for (col, cell) in record.iter().enumerate() {
                let cell = cell.trim();
                let value = if cell.is_empty() || cell == "n/a" {
                    f64::NAN
                } else {
                    cell.parse::<f64>().map_err(|_| ConnectomeError::InvalidConfoundValue(names[col].clone(), row, cell.to_string()))?
                };
                columns[col].push(value);
            }
        }
        Ok(ConfoundsTable { names, columns })
    }


    pub fn num_rows(&self) -> usize {
        self.columns.first().map(|c| c.len()).unwrap_or(0)
    }


    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.names.iter().position(|n| n == name).map(|idx| self.columns[idx].as_slice())
    }
}


/// A group of confounds that can be part of a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    /// Discrete cosine basis regressors for high-pass filtering.
    HighPass,
    /// The 6 rigid body head motion parameters.
    Motion,
    /// Mean white matter and cerebrospinal fluid signals.
    WmCsf,
    /// Mean signal over the whole brain.
    GlobalSignal,
}

impl FromStr for Component {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "high_pass" => Ok(Component::HighPass),
            "motion" => Ok(Component::Motion),
            "wm_csf" => Ok(Component::WmCsf),
            "global_signal" => Ok(Component::GlobalSignal),
            _ => Err(format!("unknown confound component '{}', expected one of high_pass, motion, wm_csf, global_signal", s)),
        }
    }
}


/// How many expansions of a base regressor to include.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// The regressor itself.
    Basic,
    /// The regressor and its square.
    Power2,
    /// The regressor and its temporal derivative.
    Derivatives,
    /// The regressor, its derivative, and the squares of both.
    Full,
}

impl Level {

    /// The fMRIPrep column names for the given base regressor at this level.
    pub fn expand(&self, base: &str) -> Vec<String> {
        let mut names = vec![base.to_string()];
        match self {
            Level::Basic => {},
            Level::Power2 => names.push(format!("{}_power2", base)),
            Level::Derivatives => names.push(format!("{}_derivative1", base)),
            Level::Full => {
                names.push(format!("{}_derivative1", base));
                names.push(format!("{}_power2", base));
                names.push(format!("{}_derivative1_power2", base));
            },
        }
        names
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "basic" => Ok(Level::Basic),
            "power2" => Ok(Level::Power2),
            "derivatives" => Ok(Level::Derivatives),
            "full" => Ok(Level::Full),
            _ => Err(format!("unknown level '{}', expected one of basic, power2, derivatives, full", s)),
        }
    }
}

pub const MOTION_PARAMETERS: [&str; 6] = ["trans_x", "trans_y", "trans_z", "rot_x", "rot_y", "rot_z"];
pub const WM_CSF_PARAMETERS: [&str; 2] = ["csf", "white_matter"];
pub const GLOBAL_SIGNAL_PARAMETER: &str = "global_signal";
pub const HIGH_PASS_PREFIX: &str = "cosine";


/// A denoising strategy: which confound components to use, at which level, and whether to demean them.
///
/// The levels only matter for components that are part of the strategy, e.g., the `motion` level is
/// ignored unless `components` contains [`Component::Motion`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConfoundStrategy {
    pub components: Vec<Component>,
    pub motion: Level,
    pub wm_csf: Level,
    pub global_signal: Level,
    pub demean: bool,
}

impl Default for ConfoundStrategy {
    fn default() -> ConfoundStrategy {
        ConfoundStrategy {
            components: vec![Component::HighPass, Component::GlobalSignal],
            motion: Level::Full,
            wm_csf: Level::Basic,
            global_signal: Level::Basic,
            demean: true,
        }
    }
}

impl ConfoundStrategy {

    /// The names of the table columns selected by this strategy, in strategy order.
    pub fn select_columns(&self, table: &ConfoundsTable) -> Result<Vec<String>> {
        let mut selected: Vec<String> = Vec::new();
        for component in self.components.iter() {
            let wanted: Vec<String> = match component {
                Component::HighPass => table.names.iter().filter(|n| n.starts_with(HIGH_PASS_PREFIX)).cloned().collect(),
                Component::Motion => MOTION_PARAMETERS.iter().flat_map(|b| self.motion.expand(b)).collect(),
                Component::WmCsf => WM_CSF_PARAMETERS.iter().flat_map(|b| self.wm_csf.expand(b)).collect(),
                Component::GlobalSignal => self.global_signal.expand(GLOBAL_SIGNAL_PARAMETER),
            };
            for name in wanted {
                if table.column(&name).is_none() {
                    return Err(ConnectomeError::MissingConfoundColumn(name));
                }
                if !selected.contains(&name) {
                    selected.push(name);
                }
            }
        }
        Ok(selected)
    }


    /// Apply the strategy to a confounds table.
    pub fn apply(&self, table: &ConfoundsTable) -> Result<Confounds> {
        let names = self.select_columns(table)?;
        let num_rows = table.num_rows();
        let mut values = Array2::<f64>::zeros((num_rows, names.len()));

        for (col, name) in names.iter().enumerate() {
            let raw = table.column(name).ok_or_else(|| ConnectomeError::MissingConfoundColumn(name.clone()))?;
            let filled = fill_missing(raw);
            let offset = if self.demean && !filled.is_empty() {
                filled.iter().sum::<f64>() / filled.len() as f64
            } else {
                0.0
            };
            for (row, v) in filled.iter().enumerate() {
                values[[row, col]] = v - offset;
            }
        }
        debug!("Selected {} confounds: {}", names.len(), names.join(", "));
        Ok(Confounds { names, values })
    }
}


/// Replace missing values with the next present value of the column.
///
/// fMRIPrep leaves the first row of derivative columns empty, so it receives the value of the second row.
/// Trailing missing values take the last present value, columns without any value become zero.
fn fill_missing(raw: &[f64]) -> Vec<f64> {
    let mut filled = raw.to_vec();
    let mut next: Option<f64> = None;
    for v in filled.iter_mut().rev() {
        if v.is_finite() {
            next = Some(*v);
        } else if let Some(n) = next {
            *v = n;
        }
    }
    let mut previous = 0.0;
    for v in filled.iter_mut() {
        if v.is_finite() {
            previous = *v;
        } else {
            *v = previous;
        }
    }
    filled
}


/// The selected nuisance regressors for a scan, one column per regressor and one row per volume.
#[derive(Debug, Clone, PartialEq)]
pub struct Confounds {
    pub names: Vec<String>,
    pub values: Array2<f64>,
}

impl Confounds {

    pub fn num_timepoints(&self) -> usize {
        self.values.nrows()
    }

    pub fn num_regressors(&self) -> usize {
        self.values.ncols()
    }
}

impl fmt::Display for Confounds {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} confounds over {} timepoints.", self.num_regressors(), self.num_timepoints())
    }
}


/// Read the confounds file that belongs to a preprocessed functional image and apply the strategy.
///
/// The confounds file is expected next to the image, named according to the fMRIPrep convention.
///
/// # Examples
///
/// ```no_run
/// use neuroconnectivity::{load_confounds, ConfoundStrategy};
/// let confounds = load_confounds("/path/to/sub-001_ses-01_task-rest_run-01_space-MNI152NLin2009cAsym_desc-preproc_bold.nii.gz", &ConfoundStrategy::default()).unwrap();
/// println!("{}", confounds);
/// ```
pub fn load_confounds<P: AsRef<Path>>(scan_path: P, strategy: &ConfoundStrategy) -> Result<Confounds> {
    load_confounds_file(confounds_path_for_scan(scan_path.as_ref()), strategy)
}


/// Read the given confounds file and apply the strategy.
pub fn load_confounds_file<P: AsRef<Path>>(path: P, strategy: &ConfoundStrategy) -> Result<Confounds> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(ConnectomeError::MissingConfounds(path.to_path_buf()));
    }
    let table = ConfoundsTable::from_file(path)?;
    strategy.apply(&table)
}
