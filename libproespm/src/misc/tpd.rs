//! Temperature programmed desorption recorded by LabView (`.lvm`).
//!
//! The first line names the columns (`ti_...`, `Te_...`, one per mass, `Q...` for
//! integrated charges which are dropped), followed by whitespace separated rows.

use std::path::Path;

use time::PrimitiveDateTime;

use crate::config::Config;
use crate::error::{RenderError, TpdError};
use crate::fileinfo::Fileinfo;
use crate::measurement::{Record, RecordInfo};
use crate::plot::SeriesPlot;
use crate::render::PlotRenderer;
use crate::sniff::read_text_file;
use crate::table::Table;
use crate::timestamp::file_mtime;

const TIME_CHANNEL: &str = "Time";
const TEMPERATURE_CHANNEL: &str = "Temperature";

#[derive(Debug, Clone, PartialEq)]
pub struct Tpd {
    pub info: RecordInfo,
    /// s
    pub time: Vec<f64>,
    /// °C
    pub temperature: Vec<f64>,
    /// Ion currents by mass label, in file order
    pub channels: Vec<(String, Vec<f64>)>,
    pub plot: Option<SeriesPlot>,
}

fn channel_name(entry: &str) -> String {
    entry
        .split('_')
        .next()
        .unwrap_or(entry)
        .replace("ti", TIME_CHANNEL)
        .replace("Te", TEMPERATURE_CHANNEL)
}

impl Tpd {
    pub fn parse(text: &str, fileinfo: Fileinfo, timestamp: PrimitiveDateTime) -> Result<Self, TpdError> {
        let header = text.lines().next().ok_or(TpdError::EmptyHeader)?;
        let table = Table::from_whitespace(text, 1, 0)?;

        let mut time = None;
        let mut temperature = None;
        let mut channels = vec![];
        for (idx, entry) in header.split_whitespace().enumerate() {
            if entry.contains('Q') {
                continue;
            }
            let values = table.column(idx)?;
            match channel_name(entry).as_str() {
                TIME_CHANNEL => time = Some(values),
                TEMPERATURE_CHANNEL => temperature = Some(values),
                name => channels.push((name.to_string(), values)),
            }
        }

        let id = fileinfo.filename.clone();
        Ok(Self {
            info: RecordInfo::new(fileinfo, id, timestamp),
            time: time.ok_or(TpdError::MissingChannel(TIME_CHANNEL))?,
            temperature: temperature.ok_or(TpdError::MissingChannel(TEMPERATURE_CHANNEL))?,
            channels,
            plot: None,
        })
    }

    pub fn read(path: &Path) -> Result<Self, TpdError> {
        Self::parse(&read_text_file(path)?, Fileinfo::new(path)?, file_mtime(path)?)
    }

    /// Temperature at the maximum ion current of a channel
    pub fn peak_temperature(&self, channel: &str) -> Option<f64> {
        let (_, values) = self.channels.iter().find(|(name, _)| name == channel)?;
        let (idx, _) = values
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_finite())
            .max_by(|a, b| a.1.total_cmp(b.1))?;
        self.temperature.get(idx).copied()
    }

    pub fn series_plot(&self) -> SeriesPlot {
        let mut plot =
            SeriesPlot::new("Time / s", "Ion Current / A").with_secondary_axis("Temperature / °C");
        for (name, values) in &self.channels {
            plot.push(name, self.time.clone(), values.clone());
        }
        plot.push_secondary("T", self.time.clone(), self.temperature.clone());
        plot
    }
}

impl Record for Tpd {
    fn info(&self) -> &RecordInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut RecordInfo {
        &mut self.info
    }

    fn ident(&self) -> &'static str {
        "TPD"
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

    pub(crate) const TPD_LVM: &str = "ti_s\tTe_C\tm28_A\tQ28_C\tm44_A\n\
        0\t25\t1e-10\t0\t2e-11\n\
        1\t30\t5e-10\t1\t4e-11\n\
        2\t35\t2e-10\t2\t1e-11\n";

    #[test]
    fn test_channels() {
        let info = Fileinfo::new(Path::new("/d/co_tpd.lvm")).unwrap();
        let tpd = Tpd::parse(TPD_LVM, info, datetime!(2022-01-01 0:00)).unwrap();
        assert_eq!(tpd.time, vec![0.0, 1.0, 2.0]);
        assert_eq!(tpd.temperature, vec![25.0, 30.0, 35.0]);
        let names: Vec<&str> = tpd.channels.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["m28", "m44"]);
        assert_eq!(tpd.channels[1].1, vec![2e-11, 4e-11, 1e-11]);
        assert_eq!(tpd.peak_temperature("m28"), Some(30.0));
        assert_eq!(tpd.peak_temperature("m2"), None);

        let plot = tpd.series_plot();
        assert_eq!(plot.series.len(), 3);
        assert!(plot.series[2].secondary);
    }

    #[test]
    fn test_missing_temperature() {
        let info = Fileinfo::new(Path::new("x.lvm")).unwrap();
        assert!(matches!(
            Tpd::parse("ti_s\tm28_A\n0\t1\n", info, datetime!(2022-01-01 0:00)),
            Err(TpdError::MissingChannel("Temperature"))
        ));
    }
}
