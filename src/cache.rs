//! An on-disk cache for extracted region time series.
//!
//! Extracting time series means reading a large 4D image, so results are cached by a key that
//! identifies all inputs of the extraction. Entries are stored in a small binary format:
//! the magic bytes `NCTS`, a u32 format version, u64 row and column counts, then the values
//! as row-major f64. All numbers are little endian.

use byteordered::ByteOrdered;
use log::debug;
use ndarray::Array2;

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{ConnectomeError, Result};

pub const CACHE_MAGIC: [u8; 4] = *b"NCTS";
pub const CACHE_FORMAT_VERSION: u32 = 1;
const CACHE_HEADER_SIZE: u64 = 4 + 4 + 8 + 8;


/// A directory of cached time series matrices, one file per key.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesCache {
    dir: PathBuf,
}

impl TimeSeriesCache {

    pub fn new<P: AsRef<Path>>(dir: P) -> TimeSeriesCache {
        TimeSeriesCache { dir: dir.as_ref().to_path_buf() }
    }


    pub fn dir(&self) -> &Path {
        &self.dir
    }


    /// The file that holds the entry for `key`.
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.ts", key))
    }


    /// Load the entry for `key`, or `None` if there is no such entry.
    pub fn load(&self, key: &str) -> Result<Option<Array2<f64>>> {
        let path = self.entry_path(key);
        if !path.is_file() {
            return Ok(None);
        }
        let file_len = fs::metadata(&path)?.len();
        let mut input = ByteOrdered::le(BufReader::new(File::open(&path)?));

        if file_len < CACHE_HEADER_SIZE {
            return Err(ConnectomeError::InvalidCacheEntry(path));
        }
        let mut magic = [0u8; 4];
        input.read_exact(&mut magic)?;
        let version = input.read_u32()?;
        let rows = input.read_u64()?;
        let cols = input.read_u64()?;
        let expected_len = rows
            .checked_mul(cols)
            .and_then(|n| n.checked_mul(8))
            .and_then(|n| n.checked_add(CACHE_HEADER_SIZE));
        if magic != CACHE_MAGIC || version != CACHE_FORMAT_VERSION || expected_len != Some(file_len) {
            return Err(ConnectomeError::InvalidCacheEntry(path));
        }

        let count = (rows * cols) as usize;
        let mut values: Vec<f64> = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(input.read_f64()?);
        }
        let matrix = Array2::from_shape_vec((rows as usize, cols as usize), values)
            .map_err(|_| ConnectomeError::InvalidCacheEntry(path.clone()))?;
        debug!("Loaded cached time series {}", path.display());
        Ok(Some(matrix))
    }


    /// Store `matrix` as the entry for `key`, replacing any existing entry.
    ///
    /// The entry is written to a temporary file first and then renamed into place.
    pub fn store(&self, key: &str, matrix: &Array2<f64>) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.entry_path(key);
        let tmp_path = self.dir.join(format!("{}.ts.tmp{}", key, std::process::id()));

        {
            let mut output = ByteOrdered::le(BufWriter::new(File::create(&tmp_path)?));
            output.write_all(&CACHE_MAGIC)?;
            output.write_u32(CACHE_FORMAT_VERSION)?;
            output.write_u64(matrix.nrows() as u64)?;
            output.write_u64(matrix.ncols() as u64)?;
            for row in matrix.outer_iter() {
                for v in row.iter() {
                    output.write_f64(*v)?;
                }
            }
            output.flush()?;
        }
        fs::rename(&tmp_path, &path)?;
        debug!("Stored time series in cache {}", path.display());
        Ok(())
    }
}
