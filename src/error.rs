use quick_error::quick_error;
use std::io::Error as IOError;
use std::path::PathBuf;

quick_error! {
    /// Error type for all error variants originated by this crate.
    #[derive(Debug)]
    pub enum ConnectomeError {
        /// The functional image for a subject/session is not on disk.
        MissingScan(path: PathBuf) {
            display("The functional MRI data file '{}' was not found", path.display())
        }

        /// The fMRIPrep confounds TSV for a subject/session is not on disk.
        MissingConfounds(path: PathBuf) {
            display("The corresponding confound file '{}' was not found", path.display())
        }

        MissingConfoundColumn(column: String) {
            display("The confound column '{}' is required by the strategy but not present in the confounds file", column)
        }

        InvalidConfoundValue(column: String, row: usize, value: String) {
            display("Invalid value '{}' in confound column '{}', row {}", value, column, row)
        }

        InvalidMatrixValue(row: usize, column: usize, value: String) {
            display("Invalid matrix value '{}' in row {}, column {}", value, row, column)
        }

        /// Confound loading failed earlier and the pair cannot be denoised.
        ConfoundsUnavailable(subject: String, session: String) {
            display("No confounds available for subject {}, session {}", subject, session)
        }

        /// Invalid NIfTI file: wrong header size or magic.
        InvalidNiftiFormat(reason: String) {
            display("Invalid NIfTI file: {}", reason)
        }

        UnsupportedNiftiFormat(reason: String) {
            display("Unsupported NIfTI file: {}", reason)
        }

        UnsupportedNiftiDatatype(code: i16) {
            display("Unsupported NIfTI datatype code {}", code)
        }

        DimensionMismatch(what: String) {
            display("Dimension mismatch: {}", what)
        }

        InsufficientTimepoints(found: usize) {
            display("At least 2 timepoints are required, found {}", found)
        }

        SingularMatrix {
            display("Matrix is singular and cannot be inverted")
        }

        AtlasNotFound(path: PathBuf) {
            display("Atlas file '{}' not found. Enable the download, fetch the atlas into the data directory or pass an explicit atlas file", path.display())
        }

        InvalidAtlasResolution(resolution: u32) {
            display("Invalid BASC atlas resolution {}, expected one of 7, 12, 20, 36, 64, 122, 197, 325, 444", resolution)
        }

        EmptyAtlas {
            display("Atlas does not contain any non-background label")
        }

        InvalidCacheEntry(path: PathBuf) {
            display("Corrupt time series cache entry '{}'", path.display())
        }

        NoDataDir {
            display("Could not determine a data directory for atlases, no home directory found")
        }

        /// Header or voxel decoding error from the NIfTI reader
        Nifti(err: ::nifti::NiftiError) {
            from()
            source(err)
            display("NIfTI error: {}", err)
        }

        /// Atlas download error
        Http(err: reqwest::Error) {
            from()
            source(err)
            display("HTTP error: {}", err)
        }

        /// Atlas archive unpacking error
        Zip(err: zip::result::ZipError) {
            from()
            source(err)
            display("ZIP archive error: {}", err)
        }

        /// CSV/TSV parsing or writing error
        Csv(err: csv::Error) {
            from()
            source(err)
            display("CSV error: {}", err)
        }

        /// I/O Error
        Io(err: IOError) {
            from()
            source(err)
            display("I/O error: {}", err)
        }
    }
}

/// Alias type for results originated from this crate.
pub type Result<T> = ::std::result::Result<T, ConnectomeError>;
