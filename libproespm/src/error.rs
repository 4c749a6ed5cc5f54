use std::path::PathBuf;
use thiserror::Error;

use super::worker_status::WorkerStatus;

#[derive(Debug, Error)]
pub enum FileinfoError {
    #[error("Path {0:?} has no usable file name")]
    BadPath(PathBuf),
}

#[derive(Debug, Error)]
pub enum SniffError {
    #[error("Could not read file for sniffing: {0}")]
    IOError(#[from] std::io::Error),
    #[error("File {0:?} is neither UTF-8, UTF-16 nor Latin-1 text")]
    BadEncoding(PathBuf),
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error("Could not parse value {value:?} in table row {row}")]
    BadNumber { row: usize, value: String },
    #[error("Table row {row} has {found} columns; expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Table column {column} requested but only {available} columns exist")]
    MissingColumn { column: usize, available: usize },
    #[error("Table contains no data rows")]
    Empty,
    #[error("Could not read table: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Error)]
pub enum SpmImageError {
    #[error("Image of shape {0}x{1} has no pixels")]
    EmptyImage(usize, usize),
    #[error("Cannot shape {0} values into a {1}x{2} image")]
    BadShape(usize, usize, usize),
    #[error("Image shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

#[derive(Debug, Error)]
pub enum MulError {
    #[error("Mul file failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Mul frame at offset {offset} has invalid block size {size}")]
    BadFrameSize { offset: u64, size: i16 },
    #[error("Mul frame has invalid resolution {0}x{1}")]
    BadResolution(i16, i16),
    #[error("Mul frame at offset {offset} needs {needed} bytes but only {available} remain")]
    Truncated {
        offset: u64,
        needed: u64,
        available: u64,
    },
    #[error("No frames found in {0:?}")]
    NoFrames(PathBuf),
    #[error("Mul frame has bad image: {0}")]
    Image(#[from] SpmImageError),
    #[error("Mul file has bad path: {0}")]
    Fileinfo(#[from] FileinfoError),
}

#[derive(Debug, Error)]
pub enum MatrixError {
    #[error("Matrix file failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("File {0:?} does not carry the ONTMATRX magic")]
    BadMagic(PathBuf),
    #[error("Malformed Matrix block {ident} at offset {offset}")]
    BadBlock { ident: String, offset: u64 },
    #[error("Matrix string ending at offset {0} is not UTF-16")]
    BadString(u64),
    #[error("Unknown Matrix parameter value type {0}")]
    UnknownValueType(u32),
    #[error("Matrix parameter file {0:?} is missing")]
    MissingParameterFile(PathBuf),
    #[error("Matrix parameter {0} is missing")]
    MissingParameter(String),
    #[error("Matrix scan {0} was aborted before any trace was recorded")]
    NoTraces(String),
    #[error("Matrix scan has bad image: {0}")]
    Image(#[from] SpmImageError),
    #[error("Matrix file has bad path: {0}")]
    Fileinfo(#[from] FileinfoError),
}

#[derive(Debug, Error)]
pub enum Sm4Error {
    #[error("SM4 file failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Unexpected SM4 signature {0:?}")]
    BadSignature(String),
    #[error("SM4 string ending at offset {0} is not UTF-16")]
    BadString(u64),
    #[error("SM4 object {0} is missing")]
    MissingObject(&'static str),
    #[error("SM4 object {id} at offset {offset} is malformed")]
    BadObject { id: i32, offset: u64 },
    #[error("SM4 page has invalid resolution {0}x{1}")]
    BadResolution(i32, i32),
    #[error("No forward topography page in {0:?}")]
    NoForward(PathBuf),
    #[error("SM4 page shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("SM4 page has bad image: {0}")]
    Image(#[from] SpmImageError),
    #[error("SM4 file has bad path: {0}")]
    Fileinfo(#[from] FileinfoError),
}

#[derive(Debug, Error)]
pub enum SxmError {
    #[error("SXM file failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("SXM header end marker is missing")]
    MissingHeaderEnd,
    #[error("SXM data marker is missing")]
    MissingDataMarker,
    #[error("SXM header key {0} is missing")]
    MissingKey(String),
    #[error("SXM header key {key} has bad value {value:?}")]
    BadValue { key: String, value: String },
    #[error("SXM date {0:?} could not be parsed")]
    BadDate(String),
    #[error("SXM channel {0} is missing")]
    MissingChannel(String),
    #[error("SXM data needs {needed} bytes but only {available} exist")]
    Truncated { needed: usize, available: usize },
    #[error("SXM scan has bad image: {0}")]
    Image(#[from] SpmImageError),
    #[error("SXM file has bad path: {0}")]
    Fileinfo(#[from] FileinfoError),
}

#[derive(Debug, Error)]
pub enum NidError {
    #[error("NID file failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("NID header has no DataSet-Info section")]
    NoDataSetInfo,
    #[error("NID header key {0} is missing")]
    MissingKey(String),
    #[error("NID header key {key} has bad value {value:?}")]
    BadValue { key: String, value: String },
    #[error("NID channel {0} is missing")]
    MissingChannel(&'static str),
    #[error("NID channel has inconsistent shape {points}x{lines}")]
    ChannelMismatch { points: usize, lines: usize },
    #[error("NID channel has unsupported bit depth {0}")]
    BadSaveBits(usize),
    #[error("NID data needs {needed} bytes but only {available} exist")]
    Truncated { needed: usize, available: usize },
    #[error("NID date {0:?} could not be parsed")]
    BadDate(String),
    #[error("NID scan has bad image: {0}")]
    Image(#[from] SpmImageError),
    #[error("NID file has bad path: {0}")]
    Fileinfo(#[from] FileinfoError),
}

#[derive(Debug, Error)]
pub enum VamasError {
    #[error("VAMAS file ended at line {line} while reading {field}")]
    UnexpectedEof { line: usize, field: &'static str },
    #[error("VAMAS line {line} has bad {field} value {value:?}")]
    BadNumber {
        line: usize,
        field: &'static str,
        value: String,
    },
    #[error("Bad VAMAS format: {0}")]
    BadFormat(String),
    #[error("Unsupported VAMAS scan mode {0}")]
    UnsupportedScanMode(String),
    #[error("Unsupported VAMAS block inclusion list {0}")]
    UnsupportedInclusionList(i64),
    #[error("{ordinates} VAMAS ordinates cannot be split over {variables} variables")]
    BadOrdinateCount { ordinates: usize, variables: usize },
}

#[derive(Debug, Error)]
pub enum AesError {
    #[error("AES file failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("AES header ended at line {line} while reading {field}")]
    HeaderEnded { line: usize, field: &'static str },
    #[error("AES header line {line} has bad {field} value {value:?}")]
    BadHeaderValue {
        line: usize,
        field: &'static str,
        value: String,
    },
    #[error("AES data line {line} could not be parsed: {value:?}")]
    BadRow { line: usize, value: String },
    #[error("AES file has {found} data rows; expected {expected}")]
    MissingRows { expected: usize, found: usize },
    #[error("VAMAS file {0:?} has no blocks")]
    NoBlocks(PathBuf),
    #[error("AES VAMAS error: {0}")]
    Vamas(#[from] VamasError),
    #[error("AES file could not be read: {0}")]
    Sniff(#[from] SniffError),
    #[error("AES file has bad path: {0}")]
    Fileinfo(#[from] FileinfoError),
}

#[derive(Debug, Error)]
pub enum XpsError {
    #[error("XPS file failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("XPS file ended inside region {region}")]
    UnexpectedEof { region: usize },
    #[error("XPS region {region} lacks key {key}")]
    MissingKey { region: usize, key: &'static str },
    #[error("XPS key {key} has bad value {value:?}")]
    BadValue { key: &'static str, value: String },
    #[error("XPS data line {line} could not be parsed: {value:?}")]
    BadRow { line: usize, value: String },
    #[error("XPS region has invalid energy step {0}")]
    BadStep(f64),
    #[error("XPS file could not be read: {0}")]
    Sniff(#[from] SniffError),
    #[error("XPS file has bad path: {0}")]
    Fileinfo(#[from] FileinfoError),
}

#[derive(Debug, Error)]
pub enum Ec4Error {
    #[error("EC4 file failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("EC4 header value {key} is not a number: {value:?}")]
    BadValue { key: &'static str, value: String },
    #[error("EC4 data table error: {0}")]
    Table(#[from] TableError),
    #[error("EC4 file could not be read: {0}")]
    Sniff(#[from] SniffError),
    #[error("EC4 file has bad path: {0}")]
    Fileinfo(#[from] FileinfoError),
}

#[derive(Debug, Error)]
pub enum LabviewError {
    #[error("LabView file failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("LabView data table error: {0}")]
    Table(#[from] TableError),
    #[error("LabView data has only {0} rows")]
    TooShort(usize),
    #[error("First voltage step is zero; the sweep direction is unknown")]
    ZeroInitialStep,
    #[error("LabView data spans no time")]
    ZeroDuration,
    #[error("LabView file could not be read: {0}")]
    Sniff(#[from] SniffError),
    #[error("LabView file has bad path: {0}")]
    Fileinfo(#[from] FileinfoError),
}

#[derive(Debug, Error)]
pub enum PalmSensError {
    #[error("PalmSens file failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("PalmSens {kind} export has {found} columns; expected {expected}")]
    MissingColumns {
        kind: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("PalmSens data table error: {0}")]
    Table(#[from] TableError),
    #[error("PalmSens file could not be read: {0}")]
    Sniff(#[from] SniffError),
    #[error("PalmSens file has bad path: {0}")]
    Fileinfo(#[from] FileinfoError),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("PSSession file failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("PSSession JSON is malformed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("PSSession contains no measurements")]
    NoMeasurements,
    #[error("PSSession measurement title {0:?} is not a known technique")]
    UnknownTitle(String),
    #[error("PSSession timestamp {0} is out of range")]
    BadTimestamp(i64),
    #[error("PSSession data array {index} requested but only {available} exist")]
    MissingArray { index: usize, available: usize },
    #[error("PSSession file could not be read: {0}")]
    Sniff(#[from] SniffError),
    #[error("PSSession file has bad path: {0}")]
    Fileinfo(#[from] FileinfoError),
}

#[derive(Debug, Error)]
pub enum QcmbError {
    #[error("QCMB file failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("QCMB data table error: {0}")]
    Table(#[from] TableError),
    #[error("QCMB file could not be read: {0}")]
    Sniff(#[from] SniffError),
    #[error("QCMB file has bad path: {0}")]
    Fileinfo(#[from] FileinfoError),
}

#[derive(Debug, Error)]
pub enum TpdError {
    #[error("TPD file failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("TPD file has no header line")]
    EmptyHeader,
    #[error("TPD file has no {0} channel")]
    MissingChannel(&'static str),
    #[error("TPD data table error: {0}")]
    Table(#[from] TableError),
    #[error("TPD file could not be read: {0}")]
    Sniff(#[from] SniffError),
    #[error("TPD file has bad path: {0}")]
    Fileinfo(#[from] FileinfoError),
}

#[derive(Debug, Error)]
pub enum ImageFileError {
    #[error("Image file failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Image file has bad path: {0}")]
    Fileinfo(#[from] FileinfoError),
    #[error("Image could not be decoded: {0}")]
    Image(#[from] image::ImageError),
}

/// Failure of any format decoder
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("{0}")]
    Mul(#[from] MulError),
    #[error("{0}")]
    Matrix(#[from] MatrixError),
    #[error("{0}")]
    Sm4(#[from] Sm4Error),
    #[error("{0}")]
    Sxm(#[from] SxmError),
    #[error("{0}")]
    Nid(#[from] NidError),
    #[error("{0}")]
    Aes(#[from] AesError),
    #[error("{0}")]
    Xps(#[from] XpsError),
    #[error("{0}")]
    Ec4(#[from] Ec4Error),
    #[error("{0}")]
    Labview(#[from] LabviewError),
    #[error("{0}")]
    PalmSens(#[from] PalmSensError),
    #[error("{0}")]
    Session(#[from] SessionError),
    #[error("{0}")]
    Qcmb(#[from] QcmbError),
    #[error("{0}")]
    Tpd(#[from] TpdError),
    #[error("{0}")]
    Image(#[from] ImageFileError),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Failed to decode {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },
    #[error("EC4 continuation file {0:?} has no preceding primary file")]
    OrphanContinuation(PathBuf),
    #[error("Dispatch failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Dispatch could not sniff file: {0}")]
    Sniff(#[from] SniffError),
    #[error("Dispatch found bad path: {0}")]
    Fileinfo(#[from] FileinfoError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Path {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Could not parse config YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Unknown colormap {0:?}")]
    BadColormap(String),
    #[error("Invalid colour range ({0}, {1}); bounds must satisfy 0 <= start < end <= 100")]
    BadColorrange(f64, f64),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Rendering failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Could not write image: {0}")]
    Image(#[from] image::ImageError),
    #[error("Rendering configuration is invalid: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum LabjournalError {
    #[error("Labjournal failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Could not parse labjournal CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("Labjournal {0:?} has no ID column")]
    MissingIdColumn(PathBuf),
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Report failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Could not serialize plot data: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed at dispatch: {0}")]
    Dispatch(#[from] DispatchError),
    #[error("Processor failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Processor failed at rendering: {0}")]
    Render(#[from] RenderError),
    #[error("Processor failed due to bad configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Processor failed to read labjournal: {0}")]
    Labjournal(#[from] LabjournalError),
    #[error("Processor failed to write report: {0}")]
    Report(#[from] ReportError),
    #[error("Processor failed to send status to the shell: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
}
