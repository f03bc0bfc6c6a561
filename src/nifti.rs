//! Functions for managing brain volumes in NIfTI-1 files.
//!
//! Both uncompressed `.nii` and gzipped `.nii.gz` single-file images are supported. This is the
//! format fMRIPrep writes its preprocessed BOLD series in, and the format brain atlases like BASC
//! are distributed in.
//!
//! Header and voxel decoding (endianness, datatypes, scaling) is done by the `nifti` crate. This module
//! checks the format first and bounds the voxel read by the bytes the file actually holds, so that a
//! corrupt header results in an error instead of a huge allocation.

use ::nifti::{InMemNiftiVolume, IntoNdArray};
use byteordered::{ByteOrdered, Endianness};
use flate2::bufread::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::Array4;

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::fmt;

use crate::affine::Affine;
use crate::error::{ConnectomeError, Result};
use crate::util::{is_gz_file, write_fixed_length_string};

pub const NIFTI1_HEADER_SIZE: i32 = 348;
pub const NIFTI2_HEADER_SIZE: i32 = 540;
pub const NIFTI1_SINGLE_FILE_MAGIC: &str = "n+1";
pub const NIFTI1_PAIR_MAGIC: &str = "ni1";
pub const NIFTI1_DEFAULT_VOX_OFFSET: f32 = 352.0; // Header plus the 4 byte extension flag.
const MAGIC_OFFSET: usize = 344;

/// The voxel data types we can read. The discriminants are the NIfTI datatype codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NiftiDatatype {
    Uint8 = 2,
    Int16 = 4,
    Int32 = 8,
    Float32 = 16,
    Float64 = 64,
    Int8 = 256,
    Uint16 = 512,
    Uint32 = 768,
    Int64 = 1024,
    Uint64 = 1280,
}

impl NiftiDatatype {

    pub fn from_code(code: i16) -> Result<NiftiDatatype> {
        match code {
            2 => Ok(NiftiDatatype::Uint8),
            4 => Ok(NiftiDatatype::Int16),
            8 => Ok(NiftiDatatype::Int32),
            16 => Ok(NiftiDatatype::Float32),
            64 => Ok(NiftiDatatype::Float64),
            256 => Ok(NiftiDatatype::Int8),
            512 => Ok(NiftiDatatype::Uint16),
            768 => Ok(NiftiDatatype::Uint32),
            1024 => Ok(NiftiDatatype::Int64),
            1280 => Ok(NiftiDatatype::Uint64),
            _ => Err(ConnectomeError::UnsupportedNiftiDatatype(code)),
        }
    }

    pub fn code(&self) -> i16 {
        *self as i16
    }

    pub fn bitpix(&self) -> i16 {
        match self {
            NiftiDatatype::Uint8 | NiftiDatatype::Int8 => 8,
            NiftiDatatype::Int16 | NiftiDatatype::Uint16 => 16,
            NiftiDatatype::Int32 | NiftiDatatype::Uint32 | NiftiDatatype::Float32 => 32,
            NiftiDatatype::Float64 | NiftiDatatype::Int64 | NiftiDatatype::Uint64 => 64,
        }
    }
}


/// The header fields of a single-file NIfTI-1 image that matter for its voxel data and spatial orientation.
#[derive(Debug, Clone, PartialEq)]
pub struct NiftiHeader {
    pub dim: [i16; 8],
    pub datatype: i16,
    pub bitpix: i16,
    pub pixdim: [f32; 8],
    pub vox_offset: f32,
    pub scl_slope: f32,
    pub scl_inter: f32,
    pub xyzt_units: u8,
    pub qform_code: i16,
    pub sform_code: i16,
    pub quatern_b: f32,
    pub quatern_c: f32,
    pub quatern_d: f32,
    pub qoffset_x: f32,
    pub qoffset_y: f32,
    pub qoffset_z: f32,
    pub srow_x: [f32; 4],
    pub srow_y: [f32; 4],
    pub srow_z: [f32; 4],
    pub magic: String,
}


impl Default for NiftiHeader {
    fn default() -> NiftiHeader {
        NiftiHeader {
            dim: [3, 1, 1, 1, 1, 1, 1, 1],
            datatype: NiftiDatatype::Float32.code(),
            bitpix: 32,
            pixdim: [1.0; 8],
            vox_offset: NIFTI1_DEFAULT_VOX_OFFSET,
            scl_slope: 1.0,
            scl_inter: 0.0,
            xyzt_units: 10, // mm and seconds
            qform_code: 0,
            sform_code: 0,
            quatern_b: 0.0,
            quatern_c: 0.0,
            quatern_d: 0.0,
            qoffset_x: 0.0,
            qoffset_y: 0.0,
            qoffset_z: 0.0,
            srow_x: [1.0, 0.0, 0.0, 0.0],
            srow_y: [0.0, 1.0, 0.0, 0.0],
            srow_z: [0.0, 0.0, 1.0, 0.0],
            magic: String::from(NIFTI1_SINGLE_FILE_MAGIC),
        }
    }
}


impl NiftiHeader {

    /// Read a NIfTI-1 header from a file.
    /// If the file's name ends with ".gz", the file is assumed to need GZip decoding.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<NiftiHeader> {
        let gz = is_gz_file(&path);
        let mut file = BufReader::new(File::open(path)?);
        if gz {
            NiftiHeader::from_reader(&mut MultiGzDecoder::new(file))
        } else {
            NiftiHeader::from_reader(&mut file)
        }
    }


    /// Read a NIfTI-1 header from the given byte stream.
    /// It is assumed that the input is currently at the start of the header. Exactly 348 bytes are consumed.
    pub fn from_reader<S>(input: &mut S) -> Result<NiftiHeader>
    where
        S: Read,
    {
        Ok(read_header(input)?.0)
    }


    fn from_decoded(decoded: &::nifti::NiftiHeader, magic: String) -> NiftiHeader {
        let mut hdr = NiftiHeader::default();
        for (dst, src) in hdr.dim.iter_mut().zip(decoded.dim.iter()) { *dst = *src as i16; }
        for (dst, src) in hdr.pixdim.iter_mut().zip(decoded.pixdim.iter()) { *dst = *src as f32; }
        for (dst, src) in hdr.srow_x.iter_mut().zip(decoded.srow_x.iter()) { *dst = *src as f32; }
        for (dst, src) in hdr.srow_y.iter_mut().zip(decoded.srow_y.iter()) { *dst = *src as f32; }
        for (dst, src) in hdr.srow_z.iter_mut().zip(decoded.srow_z.iter()) { *dst = *src as f32; }
        hdr.datatype = decoded.datatype as i16;
        hdr.bitpix = decoded.bitpix as i16;
        hdr.vox_offset = decoded.vox_offset as f32;
        hdr.scl_slope = decoded.scl_slope as f32;
        hdr.scl_inter = decoded.scl_inter as f32;
        hdr.xyzt_units = decoded.xyzt_units as u8;
        hdr.qform_code = decoded.qform_code as i16;
        hdr.sform_code = decoded.sform_code as i16;
        hdr.quatern_b = decoded.quatern_b as f32;
        hdr.quatern_c = decoded.quatern_c as f32;
        hdr.quatern_d = decoded.quatern_d as f32;
        hdr.qoffset_x = decoded.quatern_x as f32;
        hdr.qoffset_y = decoded.quatern_y as f32;
        hdr.qoffset_z = decoded.quatern_z as f32;
        hdr.magic = magic;
        hdr
    }


    /// The image shape as (x, y, z, t). Images with less than 4 dimensions get length 1 for the missing ones.
    ///
    /// Dimensions beyond the 4th must have length 1, we do not support 5D data.
    pub fn shape(&self) -> Result<(usize, usize, usize, usize)> {
        let ndim = self.dim[0] as usize;
        let mut shape = [1usize; 7];
        for (idx, len) in shape.iter_mut().enumerate().take(ndim) {
            let d = self.dim[idx + 1];
            if d < 1 {
                return Err(ConnectomeError::InvalidNiftiFormat(format!("dimension {} has length {}", idx + 1, d)));
            }
            *len = d as usize;
        }
        if shape[4..].iter().any(|&d| d != 1) {
            return Err(ConnectomeError::UnsupportedNiftiFormat(String::from("images with more than 4 dimensions are not supported")));
        }
        Ok((shape[0], shape[1], shape[2], shape[3]))
    }


    /// The number of voxels over all dimensions.
    pub fn num_voxels(&self) -> Result<usize> {
        let (nx, ny, nz, nt) = self.shape()?;
        [ny, nz, nt]
            .iter()
            .try_fold(nx, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| ConnectomeError::InvalidNiftiFormat(String::from("image dimensions overflow")))
    }


    /// The size of the voxel data in bytes, as declared by the dimensions and the datatype.
    pub fn data_size(&self) -> Result<usize> {
        let bytes_per_voxel = (NiftiDatatype::from_code(self.datatype)?.bitpix() / 8) as usize;
        self.num_voxels()?
            .checked_mul(bytes_per_voxel)
            .ok_or_else(|| ConnectomeError::InvalidNiftiFormat(String::from("image dimensions overflow")))
    }


    /// The voxel-to-world transform.
    ///
    /// The sform is preferred if its code is set, then the quaternion-based qform, and finally a plain
    /// scaling by the voxel sizes as in ANALYZE 7.5 files.
    pub fn affine(&self) -> Affine {
        if self.sform_code > 0 {
            let row = |r: &[f32; 4]| [r[0] as f64, r[1] as f64, r[2] as f64, r[3] as f64];
            return Affine::from_rows(row(&self.srow_x), row(&self.srow_y), row(&self.srow_z));
        }
        if self.qform_code > 0 {
            return self.qform_affine();
        }
        Affine::diagonal([self.pixdim[1] as f64, self.pixdim[2] as f64, self.pixdim[3] as f64])
    }


    /// Compute the affine from the quaternion parameters, the voxel sizes and the qfac stored in pixdim[0].
    fn qform_affine(&self) -> Affine {
        let b = self.quatern_b as f64;
        let c = self.quatern_c as f64;
        let d = self.quatern_d as f64;
        let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();

        let qfac = if self.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        let dx = self.pixdim[1] as f64;
        let dy = self.pixdim[2] as f64;
        let dz = self.pixdim[3] as f64 * qfac;

        let r = [
            [a * a + b * b - c * c - d * d, 2.0 * (b * c - a * d), 2.0 * (b * d + a * c)],
            [2.0 * (b * c + a * d), a * a + c * c - b * b - d * d, 2.0 * (c * d - a * b)],
            [2.0 * (b * d - a * c), 2.0 * (c * d + a * b), a * a + d * d - c * c - b * b],
        ];
        Affine::from_rows(
            [r[0][0] * dx, r[0][1] * dy, r[0][2] * dz, self.qoffset_x as f64],
            [r[1][0] * dx, r[1][1] * dy, r[1][2] * dz, self.qoffset_y as f64],
            [r[2][0] * dx, r[2][1] * dy, r[2][2] * dz, self.qoffset_z as f64],
        )
    }


    /// The repetition time, i.e., the spacing along the 4th dimension, in seconds.
    pub fn repetition_time(&self) -> f32 {
        match self.xyzt_units & 0x38 {
            16 => self.pixdim[4] / 1000.0, // msec
            24 => self.pixdim[4] / 1_000_000.0, // usec
            _ => self.pixdim[4],
        }
    }
}


/// Read the 348 header bytes, check size and magic, then decode them.
///
/// Returns both our header and the decoded one, which is needed to interpret the voxel data.
fn read_header<S>(input: &mut S) -> Result<(NiftiHeader, ::nifti::NiftiHeader)>
where
    S: Read,
{
    let mut raw = [0u8; NIFTI1_HEADER_SIZE as usize];
    input.read_exact(&mut raw[..4])?;

    let size_bytes = [raw[0], raw[1], raw[2], raw[3]];
    let (le_size, be_size) = (i32::from_le_bytes(size_bytes), i32::from_be_bytes(size_bytes));
    if le_size == NIFTI2_HEADER_SIZE || be_size == NIFTI2_HEADER_SIZE {
        return Err(ConnectomeError::UnsupportedNiftiFormat(String::from("NIfTI-2 headers are not supported")));
    }
    if le_size != NIFTI1_HEADER_SIZE && be_size != NIFTI1_HEADER_SIZE {
        return Err(ConnectomeError::InvalidNiftiFormat(String::from("sizeof_hdr is not 348")));
    }
    input.read_exact(&mut raw[4..])?;

    let magic: String = raw[MAGIC_OFFSET..]
        .iter()
        .take_while(|&&b| b != 0)
        .map(|&b| b as char)
        .collect();
    if magic == NIFTI1_PAIR_MAGIC {
        return Err(ConnectomeError::UnsupportedNiftiFormat(String::from("hdr/img file pairs are not supported")));
    }
    if magic != NIFTI1_SINGLE_FILE_MAGIC {
        return Err(ConnectomeError::InvalidNiftiFormat(format!("unexpected magic '{}'", magic)));
    }

    let decoded = ::nifti::NiftiHeader::from_reader(&raw[..])?;
    let hdr = NiftiHeader::from_decoded(&decoded, magic);
    if hdr.dim[0] < 1 || hdr.dim[0] > 7 {
        return Err(ConnectomeError::InvalidNiftiFormat(format!("invalid number of dimensions {}", hdr.dim[0])));
    }
    Ok((hdr, decoded))
}


/// Models a NIfTI-1 image: header plus voxel data.
///
/// The voxel data is stored in the order of the NIfTI dimensions, i.e., it is indexed as `data[[x, y, z, t]]`.
/// Values are converted to f32 and the header's scaling (`scl_slope`, `scl_inter`) is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct NiftiImage {
    pub header: NiftiHeader,
    pub data: Array4<f32>,
}


impl NiftiImage {

    /// Read a NIfTI-1 image from a file.
    /// If the file's name ends with ".gz", the file is assumed to need GZip decoding.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<NiftiImage> {
        let gz = is_gz_file(&path);
        let file = BufReader::new(File::open(path)?);
        if gz {
            NiftiImage::from_reader(MultiGzDecoder::new(file))
        } else {
            NiftiImage::from_reader(file)
        }
    }


    /// Read a NIfTI-1 image from the given byte stream, which must be at the start of the header.
    pub fn from_reader<S>(mut input: S) -> Result<NiftiImage>
    where
        S: Read,
    {
        let (hdr, decoded) = read_header(&mut input)?;
        let (nx, ny, nz, nt) = hdr.shape()?;
        let data_size = hdr.data_size()?;

        // Skip the extensions up to the data start. We read instead of seeking, as we cannot seek in a GZ stream.
        let vox_offset = hdr.vox_offset.max(NIFTI1_HEADER_SIZE as f32) as u64;
        let to_skip = vox_offset - NIFTI1_HEADER_SIZE as u64;
        let skipped = io::copy(&mut (&mut input).take(to_skip), &mut io::sink())?;
        if skipped != to_skip {
            return Err(ConnectomeError::InvalidNiftiFormat(String::from("file ends before vox_offset")));
        }

        // The buffer grows with the bytes actually read, the header dimensions are not trusted for allocation.
        let mut raw: Vec<u8> = Vec::new();
        (&mut input).take(data_size as u64).read_to_end(&mut raw)?;
        if raw.len() != data_size {
            return Err(ConnectomeError::InvalidNiftiFormat(format!(
                "file holds {} bytes of voxel data, the header declares {}", raw.len(), data_size
            )));
        }

        let volume = InMemNiftiVolume::from_raw_data(&decoded, raw)?;
        let values = volume.into_ndarray::<f32>()?;
        let data = Array4::from_shape_vec((nx, ny, nz, nt), values.iter().cloned().collect())
            .map_err(|e| ConnectomeError::DimensionMismatch(e.to_string()))?;

        Ok(NiftiImage { header: hdr, data })
    }


    /// The image shape as (x, y, z, t).
    pub fn shape(&self) -> (usize, usize, usize, usize) {
        self.data.dim()
    }


    pub fn affine(&self) -> Affine {
        self.header.affine()
    }
}


impl fmt::Display for NiftiImage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (nx, ny, nz, nt) = self.shape();
        write!(f, "NIfTI image with {}x{}x{} voxels and {} volumes.", nx, ny, nz, nt)
    }
}


/// Read a NIfTI-1 image from a `.nii` or `.nii.gz` file.
///
/// # Examples
///
/// ```no_run
/// let img = neuroconnectivity::read_nifti("/path/to/sub-001_ses-01_task-rest_run-01_space-MNI152NLin2009cAsym_desc-preproc_bold.nii.gz").unwrap();
/// let (nx, ny, nz, nt) = img.shape();
/// println!("{} volumes of {}x{}x{} voxels", nt, nx, ny, nz);
/// ```
pub fn read_nifti<P: AsRef<Path>>(path: P) -> Result<NiftiImage> {
    NiftiImage::from_file(path)
}


/// Write a single-file NIfTI-1 image, gzipped if the file name ends with ".gz".
///
/// The affine is stored as the sform (code 1, scanner coordinates), the qform is left unset. Only
/// `Float32`, `Float64`, `Int16` and `Uint8` output is supported, integer types round the values.
pub fn write_nifti<P: AsRef<Path>>(path: P, data: &Array4<f32>, affine: &Affine, datatype: NiftiDatatype) -> Result<()> {
    let gz = is_gz_file(&path);
    let mut file = BufWriter::new(File::create(path)?);
    if gz {
        let mut encoder = GzEncoder::new(file, Compression::default());
        write_nifti_to(&mut encoder, data, affine, datatype)?;
        encoder.finish()?.flush()?;
    } else {
        write_nifti_to(&mut file, data, affine, datatype)?;
        file.flush()?;
    }
    Ok(())
}


/// Write a little endian NIfTI-1 image (header, empty extension flag, voxel data) to the given stream.
pub fn write_nifti_to<W>(output: &mut W, data: &Array4<f32>, affine: &Affine, datatype: NiftiDatatype) -> Result<()>
where
    W: Write,
{
    write_nifti_ordered(output, data, affine, datatype, Endianness::Little)
}


/// Write a NIfTI-1 image with the given byte order to the stream.
pub fn write_nifti_ordered<W>(output: &mut W, data: &Array4<f32>, affine: &Affine, datatype: NiftiDatatype, endianness: Endianness) -> Result<()>
where
    W: Write,
{
    match datatype {
        NiftiDatatype::Float32 | NiftiDatatype::Float64 | NiftiDatatype::Int16 | NiftiDatatype::Uint8 => {},
        other => return Err(ConnectomeError::UnsupportedNiftiDatatype(other.code())),
    }

    let (nx, ny, nz, nt) = data.dim();
    let ndim: i16 = if nt > 1 { 4 } else { 3 };
    let voxel_sizes = affine.voxel_sizes();

    let mut output = ByteOrdered::runtime(output, endianness);
    output.write_i32(NIFTI1_HEADER_SIZE)?;
    output.write_all(&[0u8; 36])?; // legacy ANALYZE fields
    for d in [ndim, nx as i16, ny as i16, nz as i16, nt as i16, 1, 1, 1].iter() {
        output.write_i16(*d)?;
    }
    for _ in 0..3 { output.write_f32(0.0)?; } // intent_p1..3
    output.write_i16(0)?; // intent_code
    output.write_i16(datatype.code())?;
    output.write_i16(datatype.bitpix())?;
    output.write_i16(0)?; // slice_start
    let pixdim = [1.0, voxel_sizes[0] as f32, voxel_sizes[1] as f32, voxel_sizes[2] as f32, 1.0, 0.0, 0.0, 0.0];
    for p in pixdim.iter() { output.write_f32(*p)?; }
    output.write_f32(NIFTI1_DEFAULT_VOX_OFFSET)?;
    output.write_f32(1.0)?; // scl_slope
    output.write_f32(0.0)?; // scl_inter
    output.write_i16(0)?; // slice_end
    output.write_u8(0)?; // slice_code
    output.write_u8(10)?; // xyzt_units: mm, sec
    for _ in 0..4 { output.write_f32(0.0)?; }
    for _ in 0..2 { output.write_i32(0)?; }
    write_fixed_length_string(&mut output, "neuroconnectivity", 80)?;
    write_fixed_length_string(&mut output, "", 24)?;
    output.write_i16(0)?; // qform_code
    output.write_i16(1)?; // sform_code
    for _ in 0..6 { output.write_f32(0.0)?; } // quatern_b..qoffset_z
    for row in affine.rows.iter().take(3) {
        for v in row.iter() {
            output.write_f32(*v as f32)?;
        }
    }
    write_fixed_length_string(&mut output, "", 16)?;
    write_fixed_length_string(&mut output, NIFTI1_SINGLE_FILE_MAGIC, 4)?;
    output.write_all(&[0u8; 4])?; // no extensions

    for t in 0..nt {
        for z in 0..nz {
            for y in 0..ny {
                for x in 0..nx {
                    let v = data[[x, y, z, t]];
                    match datatype {
                        NiftiDatatype::Uint8 => output.write_u8(v.round() as u8)?,
                        NiftiDatatype::Int16 => output.write_i16(v.round() as i16)?,
                        NiftiDatatype::Float64 => output.write_f64(v as f64)?,
                        _ => output.write_f32(v)?,
                    }
                }
            }
        }
    }
    Ok(())
}


#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn demo_volume(nt: usize) -> Array4<f32> {
        Array::from_shape_fn((3, 4, 5, nt), |(x, y, z, t)| (x + 10 * y + 100 * z) as f32 + 0.5 * t as f32)
    }

    fn demo_affine() -> Affine {
        Affine::from_rows(
            [-2.0, 0.0, 0.0, 90.0],
            [0.0, 2.0, 0.0, -126.0],
            [0.0, 0.0, 2.0, -72.0],
        )
    }

    fn demo_bytes(nt: usize, datatype: NiftiDatatype) -> Vec<u8> {
        let mut bytes: Vec<u8> = Vec::new();
        write_nifti_to(&mut bytes, &demo_volume(nt), &demo_affine(), datatype).unwrap();
        bytes
    }

    #[test]
    fn a_written_gz_image_can_be_read_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bold.nii.gz");
        let data = demo_volume(6);
        write_nifti(&path, &data, &demo_affine(), NiftiDatatype::Float32).unwrap();

        let img = read_nifti(&path).unwrap();
        assert_eq!((3, 4, 5, 6), img.shape());
        assert_eq!(4, img.header.dim[0]);
        assert_eq!("n+1", img.header.magic);
        assert_eq!(data, img.data);
        assert!(img.affine().approx_eq(&demo_affine(), 1e-6));
    }

    #[test]
    fn a_written_uncompressed_3d_image_can_be_read_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("atlas.nii");
        let data = demo_volume(1);
        write_nifti(&path, &data, &demo_affine(), NiftiDatatype::Int16).unwrap();

        let hdr = NiftiHeader::from_file(&path).unwrap();
        assert_eq!(3, hdr.dim[0]);
        assert_eq!(NiftiDatatype::Int16.code(), hdr.datatype);
        assert_eq!((3, 4, 5, 1), hdr.shape().unwrap());
        assert_eq!(60, hdr.num_voxels().unwrap());
        assert_eq!(120, hdr.data_size().unwrap());

        let img = read_nifti(&path).unwrap();
        assert_eq!(321.0, img.data[[1, 2, 3, 0]]);
        assert_eq!(data.mapv(|v| v.round()), img.data);
    }

    #[test]
    fn big_endian_images_are_detected_and_decoded() {
        let data = demo_volume(2);
        let mut bytes: Vec<u8> = Vec::new();
        write_nifti_ordered(&mut bytes, &data, &demo_affine(), NiftiDatatype::Float32, Endianness::Big).unwrap();
        assert_eq!(&NIFTI1_HEADER_SIZE.to_be_bytes(), &bytes[0..4]);

        let img = NiftiImage::from_reader(Cursor::new(bytes)).unwrap();
        assert_eq!((3, 4, 5, 2), img.shape());
        assert_eq!(data, img.data);
        assert!(img.affine().approx_eq(&demo_affine(), 1e-6));
    }

    #[test]
    fn uint8_and_float64_voxels_are_converted() {
        let img = NiftiImage::from_reader(Cursor::new(demo_bytes(1, NiftiDatatype::Uint8))).unwrap();
        assert_eq!(NiftiDatatype::Uint8.code(), img.header.datatype);
        assert_eq!(8, img.header.bitpix);
        assert_eq!(12.0, img.data[[2, 1, 0, 0]]);

        let img = NiftiImage::from_reader(Cursor::new(demo_bytes(2, NiftiDatatype::Float64))).unwrap();
        assert_eq!(NiftiDatatype::Float64.code(), img.header.datatype);
        assert_eq!(demo_volume(2), img.data);
    }

    #[test]
    fn extensions_before_vox_offset_are_skipped() {
        let plain = demo_bytes(2, NiftiDatatype::Float32);
        let mut bytes: Vec<u8> = plain[..348].to_vec();
        bytes[108..112].copy_from_slice(&368.0f32.to_le_bytes()); // vox_offset
        bytes.extend_from_slice(&[1, 0, 0, 0]); // extension flag
        bytes.extend_from_slice(&16i32.to_le_bytes()); // esize
        bytes.extend_from_slice(&6i32.to_le_bytes()); // ecode: comment
        bytes.extend_from_slice(b"comment\0");
        bytes.extend_from_slice(&plain[352..]);

        let img = NiftiImage::from_reader(Cursor::new(bytes)).unwrap();
        assert_eq!(368.0, img.header.vox_offset);
        assert_eq!(demo_volume(2), img.data);
    }

    #[test]
    fn the_qform_quaternion_is_converted_to_an_affine() {
        // 180 degree rotation about z, i.e., b = c = 0, d = 1: x and y flip.
        let mut hdr = NiftiHeader::default();
        hdr.qform_code = 1;
        hdr.sform_code = 0;
        hdr.pixdim = [1.0, 2.0, 3.0, 4.0, 1.0, 0.0, 0.0, 0.0];
        hdr.quatern_d = 1.0;
        hdr.qoffset_x = 10.0;
        hdr.qoffset_y = 20.0;
        hdr.qoffset_z = 30.0;

        let expected = Affine::from_rows(
            [-2.0, 0.0, 0.0, 10.0],
            [0.0, -3.0, 0.0, 20.0],
            [0.0, 0.0, 4.0, 30.0],
        );
        assert!(hdr.affine().approx_eq(&expected, 1e-9));

        hdr.pixdim[0] = -1.0;
        assert_abs_diff_eq!(-4.0, hdr.affine().rows[2][2], epsilon = 1e-9);
    }

    #[test]
    fn without_sform_and_qform_the_voxel_sizes_are_used() {
        let mut hdr = NiftiHeader::default();
        hdr.pixdim = [1.0, 2.5, 2.5, 3.0, 2.0, 0.0, 0.0, 0.0];
        assert!(hdr.affine().approx_eq(&Affine::diagonal([2.5, 2.5, 3.0]), 1e-9));
        assert_abs_diff_eq!(2.0, hdr.repetition_time());
    }

    #[test]
    fn scaling_is_applied_to_the_voxel_values() {
        let mut bytes = demo_bytes(1, NiftiDatatype::Float32);
        // scl_slope at byte 112, scl_inter at byte 116
        bytes[112..116].copy_from_slice(&2.0f32.to_le_bytes());
        bytes[116..120].copy_from_slice(&1.0f32.to_le_bytes());

        let img = NiftiImage::from_reader(Cursor::new(bytes)).unwrap();
        assert_eq!(2.0 * 112.0 + 1.0, img.data[[2, 1, 1, 0]]);
    }

    #[test]
    fn files_with_wrong_header_size_are_rejected() {
        let bytes = vec![0u8; 400];
        let result = NiftiHeader::from_reader(&mut Cursor::new(bytes));
        assert!(matches!(result, Err(ConnectomeError::InvalidNiftiFormat(_))));
    }

    #[test]
    fn nifti2_headers_are_rejected() {
        let mut bytes = demo_bytes(1, NiftiDatatype::Float32);
        bytes[0..4].copy_from_slice(&NIFTI2_HEADER_SIZE.to_le_bytes());
        let result = NiftiImage::from_reader(Cursor::new(bytes));
        assert!(matches!(result, Err(ConnectomeError::UnsupportedNiftiFormat(_))));
    }

    #[test]
    fn file_pairs_are_rejected() {
        let mut bytes = demo_bytes(1, NiftiDatatype::Float32);
        bytes[344..348].copy_from_slice(b"ni1\0");
        let result = NiftiImage::from_reader(Cursor::new(bytes));
        assert!(matches!(result, Err(ConnectomeError::UnsupportedNiftiFormat(_))));
    }

    #[test]
    fn truncated_data_is_an_error() {
        let mut bytes = demo_bytes(2, NiftiDatatype::Float32);
        bytes.truncate(bytes.len() - 8);
        assert!(matches!(NiftiImage::from_reader(Cursor::new(bytes)), Err(ConnectomeError::InvalidNiftiFormat(_))));
    }

    #[test]
    fn huge_dimensions_in_a_small_file_are_an_error() {
        let mut bytes = demo_bytes(1, NiftiDatatype::Float32);
        bytes.truncate(356);
        bytes[40..42].copy_from_slice(&4i16.to_le_bytes());
        for offset in [42usize, 44, 46, 48].iter() {
            bytes[*offset..*offset + 2].copy_from_slice(&30000i16.to_le_bytes());
        }
        let result = NiftiImage::from_reader(Cursor::new(bytes));
        assert!(matches!(result, Err(ConnectomeError::InvalidNiftiFormat(_))));
    }
}
