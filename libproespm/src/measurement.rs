use time::PrimitiveDateTime;

use super::config::Config;
use super::ec::ec4::Ec4;
use super::ec::labview::{CaLabview, CvLabview, FftLabview};
use super::ec::palmsens::PalmSensCsv;
use super::ec::pssession::PalmSensSession;
use super::error::RenderError;
use super::fileinfo::Fileinfo;
use super::labjournal::Metadata;
use super::misc::image_file::ImageFile;
use super::misc::qcmb::Qcmb;
use super::misc::tpd::Tpd;
use super::plot::SeriesPlot;
use super::render::PlotRenderer;
use super::spectroscopy::aes::AesStaib;
use super::spectroscopy::xps_eis::XpsScan;
use super::spm::matrix::StmMatrix;
use super::spm::mul::{FlmFrame, MulImage};
use super::spm::nid::SpmNid;
use super::spm::sm4::StmSm4;
use super::spm::sxm::StmSxm;
use super::spm_image::SpmImage;

/// Identity shared by every decoded record.
///
/// `id` and `timestamp` are fixed at decode time. `slide_num` and `labjournal` are
/// filled in later by the process loop and the labjournal lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordInfo {
    pub fileinfo: Fileinfo,
    id: String,
    timestamp: PrimitiveDateTime,
    pub slide_num: Option<usize>,
    pub labjournal: Option<Metadata>,
}

impl RecordInfo {
    pub fn new(fileinfo: Fileinfo, id: String, timestamp: PrimitiveDateTime) -> Self {
        Self {
            fileinfo,
            id,
            timestamp,
            slide_num: None,
            labjournal: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn timestamp(&self) -> PrimitiveDateTime {
        self.timestamp
    }
}

/// Behaviour common to all measurement records
pub trait Record {
    fn info(&self) -> &RecordInfo;
    fn info_mut(&mut self) -> &mut RecordInfo;
    /// Short tag naming the format, used in logs and the report
    fn ident(&self) -> &'static str;
    /// Run the deferred corrections and hand the results to the renderer.
    ///
    /// Image corrections mutate the channels in place, so call this exactly once.
    fn process(
        &mut self,
        config: &Config,
        renderer: &mut dyn PlotRenderer,
    ) -> Result<(), RenderError>;
}

/// Stand-in for a file whose decoder hit a known, recoverable anomaly
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord {
    pub info: RecordInfo,
    pub reason: String,
}

impl ErrorRecord {
    pub fn new(fileinfo: Fileinfo, timestamp: PrimitiveDateTime, reason: String) -> Self {
        let id = fileinfo.filename.clone();
        Self {
            info: RecordInfo::new(fileinfo, id, timestamp),
            reason,
        }
    }
}

impl Record for ErrorRecord {
    fn info(&self) -> &RecordInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut RecordInfo {
        &mut self.info
    }

    fn ident(&self) -> &'static str {
        "ERROR"
    }

    fn process(
        &mut self,
        _config: &Config,
        _renderer: &mut dyn PlotRenderer,
    ) -> Result<(), RenderError> {
        Ok(())
    }
}

/// Every kind of record the dispatcher can produce
#[derive(Debug, Clone, PartialEq)]
pub enum Measurement {
    Mul(MulImage),
    Flm(FlmFrame),
    Matrix(StmMatrix),
    Sm4(StmSm4),
    Sxm(StmSxm),
    Nid(SpmNid),
    Aes(AesStaib),
    Xps(XpsScan),
    Ec4(Ec4),
    CvLabview(CvLabview),
    CaLabview(CaLabview),
    FftLabview(FftLabview),
    PalmSens(PalmSensCsv),
    Session(PalmSensSession),
    Qcmb(Qcmb),
    Tpd(Tpd),
    Image(ImageFile),
    Error(ErrorRecord),
}

impl Measurement {
    pub fn as_record(&self) -> &dyn Record {
        match self {
            Self::Mul(m) => m,
            Self::Flm(m) => m,
            Self::Matrix(m) => m,
            Self::Sm4(m) => m,
            Self::Sxm(m) => m,
            Self::Nid(m) => m,
            Self::Aes(m) => m,
            Self::Xps(m) => m,
            Self::Ec4(m) => m,
            Self::CvLabview(m) => m,
            Self::CaLabview(m) => m,
            Self::FftLabview(m) => m,
            Self::PalmSens(m) => m,
            Self::Session(m) => m,
            Self::Qcmb(m) => m,
            Self::Tpd(m) => m,
            Self::Image(m) => m,
            Self::Error(m) => m,
        }
    }

    pub fn as_record_mut(&mut self) -> &mut dyn Record {
        match self {
            Self::Mul(m) => m,
            Self::Flm(m) => m,
            Self::Matrix(m) => m,
            Self::Sm4(m) => m,
            Self::Sxm(m) => m,
            Self::Nid(m) => m,
            Self::Aes(m) => m,
            Self::Xps(m) => m,
            Self::Ec4(m) => m,
            Self::CvLabview(m) => m,
            Self::CaLabview(m) => m,
            Self::FftLabview(m) => m,
            Self::PalmSens(m) => m,
            Self::Session(m) => m,
            Self::Qcmb(m) => m,
            Self::Tpd(m) => m,
            Self::Image(m) => m,
            Self::Error(m) => m,
        }
    }

    pub fn info(&self) -> &RecordInfo {
        self.as_record().info()
    }

    pub fn id(&self) -> &str {
        self.info().id()
    }

    pub fn timestamp(&self) -> PrimitiveDateTime {
        self.info().timestamp()
    }

    pub fn ident(&self) -> &'static str {
        self.as_record().ident()
    }

    /// Records shown as a slide in the report gallery
    pub fn is_slide(&self) -> bool {
        matches!(
            self,
            Self::Mul(_)
                | Self::Matrix(_)
                | Self::Sm4(_)
                | Self::Sxm(_)
                | Self::Nid(_)
                | Self::Image(_)
        )
    }

    pub fn set_slide_num(&mut self, slide_num: usize) {
        self.as_record_mut().info_mut().slide_num = Some(slide_num);
    }

    pub fn set_labjournal(&mut self, metadata: Option<Metadata>) {
        self.as_record_mut().info_mut().labjournal = metadata;
    }

    pub fn process(
        &mut self,
        config: &Config,
        renderer: &mut dyn PlotRenderer,
    ) -> Result<(), RenderError> {
        self.as_record_mut().process(config, renderer)
    }

    /// Renderer handles of everything drawn for this record, forward channel first
    pub fn rendered_handles(&self) -> Vec<&str> {
        let (first, backward) = match self {
            Self::Mul(m) => (&m.img.rendered, None),
            Self::Matrix(m) => (&m.img_fw.rendered, m.img_bw.as_ref()),
            Self::Sm4(m) => (&m.img_fw.rendered, m.img_bw.as_ref()),
            Self::Sxm(m) => (&m.img_fw.rendered, m.img_bw.as_ref()),
            Self::Nid(m) => (&m.img_fw.rendered, m.img_bw.as_ref()),
            Self::Image(m) => (&m.handle, None),
            _ => return vec![],
        };
        let mut handles: Vec<&str> = first.as_deref().into_iter().collect();
        handles.extend(backward.and_then(|img: &SpmImage| img.rendered.as_deref()));
        handles
    }

    /// Series plots prepared by `process`
    pub fn series_plots(&self) -> Vec<&SeriesPlot> {
        match self {
            Self::Aes(m) => m.plot.iter().collect(),
            Self::Xps(m) => m.plot.iter().collect(),
            Self::Ec4(m) => m.plot.iter().collect(),
            Self::CvLabview(m) => m.plot.iter().collect(),
            Self::CaLabview(m) => m.plot.iter().collect(),
            Self::FftLabview(m) => m.plot.iter().collect(),
            Self::PalmSens(m) => m.plot.iter().collect(),
            Self::Session(m) => m.plot.iter().collect(),
            Self::Qcmb(m) => m.plot.iter().collect(),
            Self::Tpd(m) => m.plot.iter().collect(),
            Self::Sm4(m) => m.ec_plots.iter().collect(),
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use time::macros::datetime;

    #[test]
    fn test_error_record() {
        let info = Fileinfo::new(Path::new("/d/aborted--2_1.Z_mtrx")).unwrap();
        let mut record = Measurement::Error(ErrorRecord::new(
            info,
            datetime!(2021-01-01 12:00),
            "no traces".to_string(),
        ));
        assert_eq!(record.id(), "aborted--2_1");
        assert_eq!(record.ident(), "ERROR");
        assert!(!record.is_slide());
        record.set_labjournal(Some(vec![("Sample".to_string(), "Au(111)".to_string())]));
        assert_eq!(
            record.info().labjournal.as_ref().map(|m| m.len()),
            Some(1)
        );
    }

    #[test]
    fn test_annotations_keep_identity() {
        let info = Fileinfo::new(Path::new("/d/run/scan_7.sxm")).unwrap();
        let mut record = Measurement::Error(ErrorRecord::new(
            info,
            datetime!(2021-01-01 12:00),
            String::new(),
        ));
        record.set_slide_num(4);
        record.set_labjournal(None);
        record.as_record_mut().info_mut().slide_num = Some(5);

        let info = record.info();
        assert_eq!(info.id(), "scan_7");
        assert_eq!(info.timestamp(), datetime!(2021-01-01 12:00));
        assert_eq!(info.slide_num, Some(5));
        assert_eq!(record.id(), info.id());
    }
}
