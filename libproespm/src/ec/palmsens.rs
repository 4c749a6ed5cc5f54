//! PalmSens CSV exports.
//!
//! PSTrace writes UTF-16 comma separated files with a six line preamble. The measurement
//! technique is named on line 4 (line 2 for impedance), the date on a
//! `Date and time[ measurement]:,` line, and the last line is a footer.

use std::fmt::Display;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use time::PrimitiveDateTime;

use super::{capture, finite_pairs};
use crate::config::Config;
use crate::constants::{PALMSENS_FOOTER_ROWS, PALMSENS_HEADER_ROWS};
use crate::error::{PalmSensError, RenderError};
use crate::fileinfo::Fileinfo;
use crate::measurement::{Record, RecordInfo};
use crate::plot::SeriesPlot;
use crate::render::PlotRenderer;
use crate::sniff::read_text_file;
use crate::table::Table;
use crate::timestamp::{file_mtime, parse_datetime};

static DATETIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Date and time(?: measurement)?:,([\d :-]+)").unwrap()
});

/// Techniques PSTrace can export, named by their title
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PalmSensKind {
    Eis,
    Lsv,
    Cv,
    Ca,
    Cp,
}

impl PalmSensKind {
    pub const ALL: [PalmSensKind; 5] = [Self::Eis, Self::Lsv, Self::Cv, Self::Ca, Self::Cp];

    pub fn title(&self) -> &'static str {
        match self {
            Self::Eis => "Impedance Spectroscopy",
            Self::Lsv => "Linear Sweep Voltammetry",
            Self::Cv => "Cyclic Voltammetry",
            Self::Ca => "Chronoamperometry",
            Self::Cp => "Chronopotentiometry",
        }
    }

    pub fn from_title(title: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.title() == title.trim())
    }

    /// Line of a CSV export that names the technique
    pub fn marker_line(&self) -> usize {
        match self {
            Self::Eis => 2,
            _ => 4,
        }
    }

    /// Columns a CSV export must provide
    fn csv_columns(&self) -> usize {
        match self {
            Self::Eis => 6,
            _ => 2,
        }
    }
}

impl Display for PalmSensKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.title())
    }
}

/// Technique specific plot of `(x, y)` columns shared by CSV and session files.
///
/// For CSV exports CV cycles are column pairs; session files prefix each cycle with a
/// time column, see [`crate::ec::pssession`].
pub(crate) fn plot_columns(
    kind: PalmSensKind,
    columns: &[Vec<f64>],
    cycle_start: usize,
    cycle_stride: usize,
) -> SeriesPlot {
    let column = |idx: usize| columns.get(idx).cloned().unwrap_or_default();
    match kind {
        PalmSensKind::Eis => {
            let mut plot = SeriesPlot::new("Z' [Ohm]", "Z'' [Ohm]");
            let (x, y) = finite_pairs(&column(0), &column(1));
            plot.push("Z", x, y);
            plot
        }
        PalmSensKind::Cv => {
            let mut plot = SeriesPlot::new("E [V]", "I [µA]");
            let mut idx = cycle_start;
            let mut cycle = 1;
            while idx + 1 < columns.len() {
                let (x, y) = finite_pairs(&columns[idx], &columns[idx + 1]);
                plot.push(&format!("Cycle {cycle}"), x, y);
                idx += cycle_stride;
                cycle += 1;
            }
            plot
        }
        PalmSensKind::Lsv => {
            let mut plot = SeriesPlot::new("E [V]", "I [µA]");
            let (x, y) = finite_pairs(&column(0), &column(1));
            plot.push("I", x, y);
            plot
        }
        PalmSensKind::Ca => {
            let mut plot = SeriesPlot::new("t [s]", "I [µA]");
            let (x, y) = finite_pairs(&column(0), &column(1));
            plot.push("I", x, y);
            plot
        }
        PalmSensKind::Cp => {
            let mut plot = SeriesPlot::new("t [s]", "E [V]");
            let (x, y) = finite_pairs(&column(0), &column(1));
            plot.push("E", x, y);
            plot
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PalmSensCsv {
    pub info: RecordInfo,
    pub kind: PalmSensKind,
    /// Raw columns in file order, empty cells are NaN
    pub columns: Vec<Vec<f64>>,
    pub plot: Option<SeriesPlot>,
}

impl PalmSensCsv {
    pub fn parse(
        text: &str,
        kind: PalmSensKind,
        fileinfo: Fileinfo,
        fallback: PrimitiveDateTime,
    ) -> Result<Self, PalmSensError> {
        let timestamp = match capture(&DATETIME, text).and_then(parse_datetime) {
            Some(stamp) => stamp,
            None => {
                spdlog::warn!(
                    "No measurement date in {:?}, using file modification time",
                    fileinfo.filepath
                );
                fallback
            }
        };

        let table = Table::from_delimited(text, b',', PALMSENS_HEADER_ROWS, PALMSENS_FOOTER_ROWS)?;
        if table.n_columns() < kind.csv_columns() {
            return Err(PalmSensError::MissingColumns {
                kind: kind.title(),
                expected: kind.csv_columns(),
                found: table.n_columns(),
            });
        }

        let id = fileinfo.filename.clone();
        Ok(Self {
            info: RecordInfo::new(fileinfo, id, timestamp),
            kind,
            columns: table.columns(),
            plot: None,
        })
    }

    pub fn read(path: &Path, kind: PalmSensKind) -> Result<Self, PalmSensError> {
        let fileinfo = Fileinfo::new(path)?;
        let text = read_text_file(path)?;
        Self::parse(&text, kind, fileinfo, file_mtime(path)?)
    }

    pub fn series_plot(&self) -> SeriesPlot {
        match self.kind {
            // Z' and Z'' are the fifth and sixth column
            PalmSensKind::Eis => {
                plot_columns(self.kind, self.columns.get(4..).unwrap_or(&[]), 0, 2)
            }
            _ => plot_columns(self.kind, &self.columns, 0, 2),
        }
    }
}

impl Record for PalmSensCsv {
    fn info(&self) -> &RecordInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut RecordInfo {
        &mut self.info
    }

    fn ident(&self) -> &'static str {
        match self.kind {
            PalmSensKind::Eis => "EIS_PALMSENS",
            PalmSensKind::Lsv => "LSV_PALMSENS",
            PalmSensKind::Cv => "CV_PALMSENS",
            PalmSensKind::Ca => "CA_PALMSENS",
            PalmSensKind::Cp => "CP_PALMSENS",
        }
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
