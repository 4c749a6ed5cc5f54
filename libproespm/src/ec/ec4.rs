//! Nordic Electrochemistry EC4 text exports.
//!
//! A 96 line header with `key value` pairs precedes whitespace separated columns of
//! time, potential and current. Cyclic voltammograms are written one cycle per file
//! (`CV_01.txt`, `CV_02.txt`, ...); the file whose stem ends in `1` is the primary and
//! later files are merged into it.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use time::PrimitiveDateTime;

use super::capture;
use crate::config::Config;
use crate::constants::EC4_HEADER_ROWS;
use crate::error::{Ec4Error, RenderError};
use crate::fileinfo::Fileinfo;
use crate::measurement::{Record, RecordInfo};
use crate::plot::SeriesPlot;
use crate::render::PlotRenderer;
use crate::sniff::read_text_file;
use crate::table::Table;
use crate::timestamp::{file_mtime, parse_datetime};

static DATETIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"dateTime[ \t]+([\d :-]+)").unwrap());
static U_START: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Start(\s+[\d.-]+)").unwrap());
static U_1: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"V1(\s+[\d.-]+)").unwrap());
static U_2: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"V2(\s+[\d.-]+)").unwrap());
static RATE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Rate(\s+[\d.-]+)").unwrap());

/// Data of one EC4 file
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Ec4Cycle {
    /// s
    pub time: Vec<f64>,
    /// V vs. reference
    pub voltage: Vec<f64>,
    /// A
    pub current: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ec4 {
    pub info: RecordInfo,
    pub u_start: Option<f64>,
    pub u_1: Option<f64>,
    pub u_2: Option<f64>,
    /// V/s
    pub rate: Option<f64>,
    /// Primary file first, then every merged continuation
    pub data: Vec<Ec4Cycle>,
    pub plot: Option<SeriesPlot>,
}

fn header_value(regex: &Regex, key: &'static str, text: &str) -> Result<Option<f64>, Ec4Error> {
    capture(regex, text)
        .map(|value| {
            value.parse::<f64>().map_err(|_| Ec4Error::BadValue {
                key,
                value: value.to_string(),
            })
        })
        .transpose()
}

impl Ec4 {
    pub fn parse(
        text: &str,
        fileinfo: Fileinfo,
        fallback: PrimitiveDateTime,
    ) -> Result<Self, Ec4Error> {
        let timestamp = match capture(&DATETIME, text).and_then(parse_datetime) {
            Some(stamp) => stamp,
            None => {
                spdlog::warn!(
                    "No acquisition date in {:?}, using file modification time",
                    fileinfo.filepath
                );
                fallback
            }
        };

        let table = Table::from_whitespace(text, EC4_HEADER_ROWS, 0)?;
        let cycle = Ec4Cycle {
            time: table.column(0)?,
            voltage: table.column(1)?,
            current: table.column(2)?,
        };

        let id = fileinfo.filename.clone();
        Ok(Self {
            info: RecordInfo::new(fileinfo, id, timestamp),
            u_start: header_value(&U_START, "Start", text)?,
            u_1: header_value(&U_1, "V1", text)?,
            u_2: header_value(&U_2, "V2", text)?,
            rate: header_value(&RATE, "Rate", text)?,
            data: vec![cycle],
            plot: None,
        })
    }

    pub fn read(path: &Path) -> Result<Self, Ec4Error> {
        let fileinfo = Fileinfo::new(path)?;
        let text = read_text_file(path)?;
        Self::parse(&text, fileinfo, file_mtime(path)?)
    }

    /// Primary files end their stem with `1`, everything else continues the last primary
    pub fn is_primary(fileinfo: &Fileinfo) -> bool {
        fileinfo.filename.ends_with('1')
    }

    /// Append the cycles of a continuation file
    pub fn push_cv_data(&mut self, other: Ec4) {
        self.data.extend(other.data);
    }

    pub fn series_plot(&self) -> SeriesPlot {
        let mut plot = SeriesPlot::new("U vs. ref [V]", "I [A]");
        for (idx, cycle) in self.data.iter().enumerate() {
            plot.push(
                &format!("Cycle {}", idx + 1),
                cycle.voltage.clone(),
                cycle.current.clone(),
            );
        }
        plot
    }
}

impl Record for Ec4 {
    fn info(&self) -> &RecordInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut RecordInfo {
        &mut self.info
    }

    fn ident(&self) -> &'static str {
        "EC4"
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

    pub(crate) fn ec4_text(offset: f64) -> String {
        let mut lines = vec![
            "EC4 File".to_string(),
            "dateTime\t2023-02-01 14:05:00".to_string(),
            "Start\t0.1".to_string(),
            "V1\t1.2".to_string(),
            "V2\t-0.3".to_string(),
            "Rate\t0.05".to_string(),
        ];
        while lines.len() < EC4_HEADER_ROWS {
            lines.push(format!("Param{}\tx", lines.len()));
        }
        for i in 0..4 {
            lines.push(format!(
                "{}\t{}\t{}",
                i as f64 * 0.5,
                offset + i as f64 * 0.1,
                i as f64 * 1e-6
            ));
        }
        lines.join("\n")
    }

    #[test]
    fn test_parse_header_and_data() {
        let info = Fileinfo::new(Path::new("/d/CV_01.txt")).unwrap();
        let ec4 = Ec4::parse(&ec4_text(0.0), info, datetime!(2000-01-01 0:00)).unwrap();
        assert_eq!(ec4.info.timestamp(), datetime!(2023-02-01 14:05:00));
        assert_eq!(ec4.u_start, Some(0.1));
        assert_eq!(ec4.u_1, Some(1.2));
        assert_eq!(ec4.u_2, Some(-0.3));
        assert_eq!(ec4.rate, Some(0.05));
        assert_eq!(ec4.data.len(), 1);
        assert_eq!(ec4.data[0].time, vec![0.0, 0.5, 1.0, 1.5]);
    }

    #[test]
    fn test_merge_continuation() {
        let primary_info = Fileinfo::new(Path::new("CV_01.txt")).unwrap();
        let next_info = Fileinfo::new(Path::new("CV_02.txt")).unwrap();
        assert!(Ec4::is_primary(&primary_info));
        assert!(!Ec4::is_primary(&next_info));

        let fallback = datetime!(2000-01-01 0:00);
        let mut primary = Ec4::parse(&ec4_text(0.0), primary_info, fallback).unwrap();
        let next = Ec4::parse(&ec4_text(1.0), next_info, fallback).unwrap();
        primary.push_cv_data(next);
        assert_eq!(primary.data.len(), 2);
        assert_eq!(primary.data[1].voltage[0], 1.0);

        let plot = primary.series_plot();
        assert_eq!(plot.series[1].label, "Cycle 2");
    }

    #[test]
    fn test_missing_current_column() {
        let text = ec4_text(0.0)
            .lines()
            .map(|line| line.rsplit_once('\t').map(|(head, _)| head).unwrap_or(line))
            .collect::<Vec<_>>()
            .join("\n");
        let info = Fileinfo::new(Path::new("CV_11.txt")).unwrap();
        assert!(matches!(
            Ec4::parse(&text, info, datetime!(2000-01-01 0:00)),
            Err(Ec4Error::Table(_))
        ));
    }
}
