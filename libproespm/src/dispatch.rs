//! Maps files onto decoders.
//!
//! Most extensions determine their format directly. `.txt` and `.csv` are shared by
//! several instruments and are resolved by looking for a marker at a fixed line, in a
//! fixed priority order. EC4 cyclic voltammetry spans several files: the one whose stem
//! ends in `1` is the primary and the following files are folded into it.
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use human_bytes::human_bytes;

use super::constants::ALLOWED_FILE_TYPES;
use super::ec::ec4::Ec4;
use super::ec::labview::{CaLabview, CvLabview, FftLabview};
use super::ec::palmsens::{PalmSensCsv, PalmSensKind};
use super::ec::pssession::PalmSensSession;
use super::error::{DecodeError, DispatchError, MatrixError};
use super::fileinfo::Fileinfo;
use super::measurement::{ErrorRecord, Measurement};
use super::misc::image_file::ImageFile;
use super::misc::qcmb::Qcmb;
use super::misc::tpd::Tpd;
use super::sniff::Sniffer;
use super::spectroscopy::aes::AesStaib;
use super::spectroscopy::xps_eis::read_xps_eis;
use super::spm::matrix::StmMatrix;
use super::spm::mul::{read_flm, read_mul};
use super::spm::nid::SpmNid;
use super::spm::sm4::StmSm4;
use super::spm::sxm::StmSxm;
use super::timestamp::file_mtime;

/// PalmSens techniques in the order their markers are tested
const PALMSENS_PRIORITY: [PalmSensKind; 5] = [
    PalmSensKind::Cp,
    PalmSensKind::Ca,
    PalmSensKind::Cv,
    PalmSensKind::Lsv,
    PalmSensKind::Eis,
];

/// Every format the dispatcher can recognize
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Mul,
    Flm,
    Matrix,
    Sm4,
    Sxm,
    Nid,
    Aes,
    XpsEis,
    Ec4,
    CvLabview,
    CaLabview,
    FftLabview,
    PalmSens(PalmSensKind),
    Session,
    Qcmb,
    Tpd,
    Image,
}

impl Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mul => write!(f, "Aarhus MUL"),
            Self::Flm => write!(f, "Aarhus FLM"),
            Self::Matrix => write!(f, "Omicron Matrix"),
            Self::Sm4 => write!(f, "RHK SM4"),
            Self::Sxm => write!(f, "Nanonis SXM"),
            Self::Nid => write!(f, "Nanosurf NID"),
            Self::Aes => write!(f, "Staib AES"),
            Self::XpsEis => write!(f, "Omicron XPS EIS"),
            Self::Ec4 => write!(f, "EC4"),
            Self::CvLabview => write!(f, "LabView CV"),
            Self::CaLabview => write!(f, "LabView CA"),
            Self::FftLabview => write!(f, "LabView FFT"),
            Self::PalmSens(kind) => write!(f, "PalmSens {kind}"),
            Self::Session => write!(f, "PalmSens session"),
            Self::Qcmb => write!(f, "QCM-B"),
            Self::Tpd => write!(f, "TPD"),
            Self::Image => write!(f, "image"),
        }
    }
}

/// Resolve `.csv` content. First match wins
fn classify_csv(sniffer: &Sniffer) -> Option<FileKind> {
    if sniffer.line_contains(1, "Scan rate") {
        return Some(FileKind::CvLabview);
    }
    if sniffer.line_contains(1, "Freq_Hz") {
        return Some(FileKind::FftLabview);
    }
    for kind in PALMSENS_PRIORITY {
        if sniffer.line_contains(kind.marker_line(), kind.title()) {
            return Some(FileKind::PalmSens(kind));
        }
    }
    // A PalmSens export of a technique we do not read
    if sniffer.line_contains(1, "Date and time") || sniffer.line_contains(4, "Date and time") {
        return None;
    }
    Some(FileKind::CaLabview)
}

fn classify_txt(sniffer: &Sniffer) -> Option<FileKind> {
    if sniffer.line_contains(1, "Region") {
        Some(FileKind::XpsEis)
    } else if sniffer.line_contains(1, "EC4 File") {
        Some(FileKind::Ec4)
    } else {
        None
    }
}

/// Determine the format of a file, or None if no decoder handles it
pub fn classify(path: &Path) -> Result<Option<FileKind>, DispatchError> {
    let fileinfo = Fileinfo::new(path)?;
    let kind = match fileinfo.extension.as_str() {
        ".mul" => Some(FileKind::Mul),
        ".flm" => Some(FileKind::Flm),
        ".z_mtrx" => Some(FileKind::Matrix),
        ".sm4" => Some(FileKind::Sm4),
        ".sxm" => Some(FileKind::Sxm),
        ".nid" => Some(FileKind::Nid),
        ".vms" | ".dat" => Some(FileKind::Aes),
        ".log" => Some(FileKind::Qcmb),
        ".lvm" => Some(FileKind::Tpd),
        ".pssession" => Some(FileKind::Session),
        ".png" | ".jpg" | ".jpeg" => Some(FileKind::Image),
        ".txt" => classify_txt(&Sniffer::open(path)?),
        ".csv" => classify_csv(&Sniffer::open(path)?),
        _ => None,
    };
    Ok(kind)
}

/// Decode one file into its measurement records.
///
/// An aborted Matrix scan becomes an error record instead of failing.
pub fn decode(path: &Path, kind: FileKind) -> Result<Vec<Measurement>, DecodeError> {
    let measurements = match kind {
        FileKind::Mul => read_mul(path)?.into_iter().map(Measurement::Mul).collect(),
        FileKind::Flm => read_flm(path)?.into_iter().map(Measurement::Flm).collect(),
        FileKind::Matrix => match StmMatrix::read(path) {
            Ok(scan) => vec![Measurement::Matrix(scan)],
            Err(e @ MatrixError::NoTraces(_)) => {
                spdlog::warn!("{e}; keeping a placeholder record");
                let fileinfo = Fileinfo::new(path).map_err(MatrixError::from)?;
                let timestamp = file_mtime(path).map_err(MatrixError::from)?;
                vec![Measurement::Error(ErrorRecord::new(
                    fileinfo,
                    timestamp,
                    e.to_string(),
                ))]
            }
            Err(e) => return Err(e.into()),
        },
        FileKind::Sm4 => vec![Measurement::Sm4(StmSm4::read(path)?)],
        FileKind::Sxm => vec![Measurement::Sxm(StmSxm::read(path)?)],
        FileKind::Nid => vec![Measurement::Nid(SpmNid::read(path)?)],
        FileKind::Aes => vec![Measurement::Aes(AesStaib::read(path)?)],
        FileKind::XpsEis => read_xps_eis(path)?
            .into_iter()
            .map(Measurement::Xps)
            .collect(),
        FileKind::Ec4 => vec![Measurement::Ec4(Ec4::read(path)?)],
        FileKind::CvLabview => vec![Measurement::CvLabview(CvLabview::read(path)?)],
        FileKind::CaLabview => vec![Measurement::CaLabview(CaLabview::read(path)?)],
        FileKind::FftLabview => vec![Measurement::FftLabview(FftLabview::read(path)?)],
        FileKind::PalmSens(kind) => vec![Measurement::PalmSens(PalmSensCsv::read(path, kind)?)],
        FileKind::Session => vec![Measurement::Session(PalmSensSession::read(path)?)],
        FileKind::Qcmb => vec![Measurement::Qcmb(Qcmb::read(path)?)],
        FileKind::Tpd => vec![Measurement::Tpd(Tpd::read(path)?)],
        FileKind::Image => vec![Measurement::Image(ImageFile::read(path)?)],
    };
    Ok(measurements)
}

fn is_allowed(path: &Path) -> bool {
    match Fileinfo::new(path) {
        Ok(info) => ALLOWED_FILE_TYPES.contains(&info.extension.as_str()),
        Err(_) => false,
    }
}

/// Creation time where the platform records it, modification time otherwise
fn creation_time(path: &Path) -> Result<SystemTime, std::io::Error> {
    let meta = path.metadata()?;
    meta.created().or_else(|_| meta.modified())
}

/// Collect the eligible files of a data directory and of its direct subdirectories,
/// ordered by creation time. Ties are broken by path.
pub fn import_files(data_path: &Path) -> Result<Vec<PathBuf>, DispatchError> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    for item in data_path.read_dir()? {
        let item_path = item?.path();
        if item_path.is_dir() {
            for sub_item in item_path.read_dir()? {
                let sub_path = sub_item?.path();
                if sub_path.is_file() {
                    candidates.push(sub_path);
                }
            }
        } else {
            candidates.push(item_path);
        }
    }

    let mut files = Vec::new();
    for path in candidates.into_iter().filter(|p| is_allowed(p)) {
        files.push((creation_time(&path)?, path));
    }
    files.sort();

    Ok(files.into_iter().map(|(_, path)| path).collect())
}

/// Stateful dispatch over an ordered file sequence.
///
/// Holds the measurements decoded so far and the position of the last EC4 primary so
/// continuation files can be merged into it.
#[derive(Debug, Default)]
pub struct Dispatcher {
    measurements: Vec<Measurement>,
    ec4_primary: Option<usize>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify and decode a file.
    ///
    /// Returns None for unsupported files, otherwise the number of records added (zero
    /// when the file continued an EC4 primary).
    pub fn dispatch(&mut self, path: &Path) -> Result<Option<usize>, DispatchError> {
        let fileinfo = Fileinfo::new(path)?;
        let kind = match classify(path)? {
            Some(kind) => kind,
            None => {
                spdlog::info!("Unsupported file {}, skipping", fileinfo.basename);
                return Ok(None);
            }
        };
        spdlog::info!(
            "Detected {kind} file {} ({})",
            fileinfo.basename,
            human_bytes(fileinfo.size() as f64)
        );

        // Continuations must follow their primary; check before paying for the decode
        let is_continuation = kind == FileKind::Ec4 && !Ec4::is_primary(&fileinfo);
        if is_continuation && self.ec4_primary.is_none() {
            return Err(DispatchError::OrphanContinuation(path.to_path_buf()));
        }

        let decoded = decode(path, kind).map_err(|source| DispatchError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

        if is_continuation {
            let primary = self.ec4_primary.and_then(|idx| self.measurements.get_mut(idx));
            if let Some(Measurement::Ec4(primary)) = primary {
                for measurement in decoded {
                    if let Measurement::Ec4(continuation) = measurement {
                        primary.push_cv_data(continuation);
                    }
                }
                return Ok(Some(0));
            }
            return Err(DispatchError::OrphanContinuation(path.to_path_buf()));
        }

        if kind == FileKind::Ec4 {
            self.ec4_primary = Some(self.measurements.len());
        }
        let added = decoded.len();
        self.measurements.extend(decoded);
        Ok(Some(added))
    }

    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    pub fn into_measurements(self) -> Vec<Measurement> {
        self.measurements
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ec::ec4::tests::ec4_text;
    use crate::ec::labview::tests::cv_text;
    use crate::ec::palmsens::tests::palmsens_text;
    use crate::spectroscopy::xps_eis::tests::eis_text;
    use crate::spm::matrix::tests::data_bytes;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_csv_priority() {
        let dir = tempfile::tempdir().unwrap();
        let cv = write(dir.path(), "cv.csv", &cv_text(1));
        assert_eq!(classify(&cv).unwrap(), Some(FileKind::CvLabview));

        let fft = write(dir.path(), "fft.csv", "Freq_Hz\tAmp\n1\t2\n");
        assert_eq!(classify(&fft).unwrap(), Some(FileKind::FftLabview));

        for kind in PalmSensKind::ALL {
            let path = write(dir.path(), "ps.csv", &palmsens_text(kind));
            assert_eq!(classify(&path).unwrap(), Some(FileKind::PalmSens(kind)));
        }

        let ca = write(dir.path(), "ca.csv", "Time\tU_WE\tI_WE\n0\t0.1\t1e-6\n");
        assert_eq!(classify(&ca).unwrap(), Some(FileKind::CaLabview));

        let unknown = write(
            dir.path(),
            "unknown.csv",
            "Date and time:,2024-01-01 10:00:00\nx\ny\nMystery technique\n",
        );
        assert_eq!(classify(&unknown).unwrap(), None);
    }

    #[test]
    fn test_txt_markers() {
        let dir = tempfile::tempdir().unwrap();
        let xps = write(dir.path(), "survey.txt", &eis_text());
        assert_eq!(classify(&xps).unwrap(), Some(FileKind::XpsEis));
        let ec4 = write(dir.path(), "CV_01.txt", &ec4_text(0.0));
        assert_eq!(classify(&ec4).unwrap(), Some(FileKind::Ec4));
        let notes = write(dir.path(), "notes.txt", "remember the tip\n");
        assert_eq!(classify(&notes).unwrap(), None);
    }

    #[test]
    fn test_unsupported_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "readme.md", "# hi");
        let mut dispatcher = Dispatcher::new();
        assert_eq!(dispatcher.dispatch(&path).unwrap(), None);
        assert!(dispatcher.measurements().is_empty());
    }

    #[test]
    fn test_ec4_continuation_merge() {
        let dir = tempfile::tempdir().unwrap();
        let first = write(dir.path(), "CV_01.txt", &ec4_text(0.0));
        let second = write(dir.path(), "CV_02.txt", &ec4_text(0.5));

        let mut dispatcher = Dispatcher::new();
        assert_eq!(dispatcher.dispatch(&first).unwrap(), Some(1));
        assert_eq!(dispatcher.dispatch(&second).unwrap(), Some(0));
        let measurements = dispatcher.into_measurements();
        assert_eq!(measurements.len(), 1);
        match &measurements[0] {
            Measurement::Ec4(ec4) => assert_eq!(ec4.data.len(), 2),
            _ => panic!(),
        }
    }

    #[test]
    fn test_ec4_orphan_continuation() {
        let dir = tempfile::tempdir().unwrap();
        let first = write(dir.path(), "CV_01.txt", &ec4_text(0.0));
        let second = write(dir.path(), "CV_02.txt", &ec4_text(0.5));

        let mut dispatcher = Dispatcher::new();
        assert!(matches!(
            dispatcher.dispatch(&second),
            Err(DispatchError::OrphanContinuation(_))
        ));
        assert_eq!(dispatcher.dispatch(&first).unwrap(), Some(1));
    }

    #[test]
    fn test_matrix_without_traces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aborted--2_1.Z_mtrx");
        std::fs::write(&path, data_bytes(&[], 0)).unwrap();

        let mut dispatcher = Dispatcher::new();
        assert_eq!(dispatcher.dispatch(&path).unwrap(), Some(1));
        let record = &dispatcher.measurements()[0];
        assert_eq!(record.ident(), "ERROR");
        assert_eq!(record.id(), "aborted--2_1");
        assert_eq!(record.timestamp(), file_mtime(&path).unwrap());
    }

    #[test]
    fn test_decode_failure_is_typed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "broken.sxm", "not a nanonis file");
        let mut dispatcher = Dispatcher::new();
        match dispatcher.dispatch(&path) {
            Err(DispatchError::Decode { path: failed, source }) => {
                assert_eq!(failed, path);
                assert!(matches!(source, DecodeError::Sxm(_)));
            }
            _ => panic!(),
        }
    }

    #[test]
    fn test_import_one_level_deep() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("day2");
        let deep = sub.join("deeper");
        std::fs::create_dir_all(&deep).unwrap();

        write(dir.path(), "a.SXM", "");
        write(dir.path(), "b.xyz", "");
        write(&sub, "c.csv", "");
        write(&deep, "d.csv", "");

        let files = import_files(dir.path()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(files.len(), 2);
        assert!(names.contains(&"a.SXM".to_string()));
        assert!(names.contains(&"c.csv".to_string()));
    }
}
