//! Quartz crystal microbalance logs (`.log`).
//!
//! Two header lines, then `time, rate, thickness` rows and a closing footer line.

use std::path::Path;

use time::PrimitiveDateTime;

use crate::config::Config;
use crate::constants::{QCMB_FOOTER_ROWS, QCMB_HEADER_ROWS};
use crate::error::{QcmbError, RenderError};
use crate::fileinfo::Fileinfo;
use crate::measurement::{Record, RecordInfo};
use crate::plot::SeriesPlot;
use crate::render::PlotRenderer;
use crate::sniff::read_text_file;
use crate::table::Table;
use crate::timestamp::file_mtime;

#[derive(Debug, Clone, PartialEq)]
pub struct Qcmb {
    pub info: RecordInfo,
    /// s
    pub time: Vec<f64>,
    /// Å/s
    pub rate: Vec<f64>,
    /// Å
    pub thickness: Vec<f64>,
    pub plot: Option<SeriesPlot>,
}

impl Qcmb {
    pub fn parse(text: &str, fileinfo: Fileinfo, timestamp: PrimitiveDateTime) -> Result<Self, QcmbError> {
        let table = Table::from_delimited(text, b',', QCMB_HEADER_ROWS, QCMB_FOOTER_ROWS)?;
        let id = fileinfo.filename.clone();
        Ok(Self {
            info: RecordInfo::new(fileinfo, id, timestamp),
            time: table.column(0)?,
            rate: table.column(1)?,
            thickness: table.column(2)?,
            plot: None,
        })
    }

    pub fn read(path: &Path) -> Result<Self, QcmbError> {
        Self::parse(&read_text_file(path)?, Fileinfo::new(path)?, file_mtime(path)?)
    }

    /// Final deposited thickness
    pub fn final_thickness(&self) -> Option<f64> {
        self.thickness.iter().rev().copied().find(|v| v.is_finite())
    }

    pub fn series_plot(&self) -> SeriesPlot {
        let mut plot = SeriesPlot::new("Time / s", "Rate / A/s").with_secondary_axis("Thickness / A");
        plot.push("Rate", self.time.clone(), self.rate.clone())
            .push_secondary("Thickness", self.time.clone(), self.thickness.clone());
        plot
    }
}

impl Record for Qcmb {
    fn info(&self) -> &RecordInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut RecordInfo {
        &mut self.info
    }

    fn ident(&self) -> &'static str {
        "QCMB"
    }

    fn process(
        &mut self,
        _config: &Config,
        _renderer: &mut dyn PlotRenderer,
    ) -> Result<(), RenderError> {
        self.plot = Some(self.series_plot());
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use time::macros::datetime;

    pub(crate) const QCMB_LOG: &str = "QCM-B Log\nTime, Rate, Thickness\n\
        0, 0.10, 0.0\n\
        1, 0.12, 0.1\n\
        2, 0.11, 0.2\n\
        Log closed\n";

    #[test]
    fn test_parse() {
        let info = Fileinfo::new(Path::new("/d/Au_deposition.log")).unwrap();
        let qcmb = Qcmb::parse(QCMB_LOG, info, datetime!(2022-01-01 0:00)).unwrap();
        assert_eq!(qcmb.time, vec![0.0, 1.0, 2.0]);
        assert_eq!(qcmb.rate[1], 0.12);
        assert_eq!(qcmb.final_thickness(), Some(0.2));
        assert_eq!(qcmb.series_plot().series.len(), 2);
    }

    #[test]
    fn test_missing_thickness() {
        let info = Fileinfo::new(Path::new("x.log")).unwrap();
        assert!(matches!(
            Qcmb::parse("a\nb\n0, 1\n1, 2\nend\n", info, datetime!(2022-01-01 0:00)),
            Err(QcmbError::Table(_))
        ));
    }
}
