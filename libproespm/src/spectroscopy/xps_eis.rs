//! XPS regions exported as text by the Omicron EIS software.
//!
//! Each region starts with two pairs of tab separated `keys` / `values` lines and a column
//! header, followed by `floor(|Start - End| / Step) + 1` data rows. The file holds as many
//! regions as it contains `Region` markers.

use std::path::Path;

use fxhash::FxHashMap;
use time::PrimitiveDateTime;

use crate::config::Config;
use crate::error::{RenderError, XpsError};
use crate::fileinfo::Fileinfo;
use crate::measurement::{Record, RecordInfo};
use crate::plot::SeriesPlot;
use crate::render::PlotRenderer;
use crate::sniff::read_text_file;
use crate::timestamp::file_mtime;

const REGION_MARKER: &str = "Region";

#[derive(Debug, Clone, PartialEq)]
pub struct XpsScan {
    pub info: RecordInfo,
    pub region: usize,
    /// eV
    pub start: f64,
    pub end: f64,
    pub step: f64,
    pub sweeps: usize,
    /// s
    pub dwell: f64,
    /// Pass energy, eV
    pub e_pass: f64,
    pub binding_energy: Vec<f64>,
    pub intensity: Vec<f64>,
    pub plot: Option<SeriesPlot>,
}

fn split_tabs(line: &str) -> impl Iterator<Item = &str> {
    line.split('\t').map(str::trim)
}

struct RegionHeader {
    entries: FxHashMap<String, String>,
    region: usize,
}

impl RegionHeader {
    fn value<T: std::str::FromStr>(&self, key: &'static str) -> Result<T, XpsError> {
        let value = self.entries.get(key).ok_or(XpsError::MissingKey {
            region: self.region,
            key,
        })?;
        value.parse::<T>().map_err(|_| XpsError::BadValue {
            key,
            value: value.clone(),
        })
    }
}

/// Decode every region of an EIS export
pub fn parse_regions(
    text: &str,
    fileinfo: &Fileinfo,
    timestamp: PrimitiveDateTime,
) -> Result<Vec<XpsScan>, XpsError> {
    let n_regions = text.matches(REGION_MARKER).count();
    let mut lines = text.lines().enumerate();
    let mut next_line = |region: usize| {
        lines
            .next()
            .ok_or(XpsError::UnexpectedEof { region })
    };

    let mut scans = Vec::with_capacity(n_regions);
    for idx in 0..n_regions {
        let mut header = RegionHeader {
            entries: FxHashMap::default(),
            region: idx + 1,
        };
        for _ in 0..2 {
            let (_, keys) = next_line(idx + 1)?;
            let (_, values) = next_line(idx + 1)?;
            header.entries.extend(
                split_tabs(keys)
                    .zip(split_tabs(values))
                    .map(|(k, v)| (k.to_string(), v.to_string())),
            );
        }
        next_line(idx + 1)?;

        let start: f64 = header.value("Start")?;
        let end: f64 = header.value("End")?;
        let step: f64 = header.value("Step")?;
        if !(step.is_finite() && step > 0.0) {
            return Err(XpsError::BadStep(step));
        }
        let n_rows = ((start - end).abs() / step).floor() as usize + 1;

        let mut binding_energy = Vec::with_capacity(n_rows);
        let mut intensity = Vec::with_capacity(n_rows);
        for _ in 0..n_rows {
            let (line_idx, line) = next_line(idx + 1)?;
            let row = split_tabs(line)
                .filter(|cell| !cell.is_empty())
                .map(str::parse::<f64>)
                .collect::<Result<Vec<f64>, _>>()
                .map_err(|_| XpsError::BadRow {
                    line: line_idx + 1,
                    value: line.to_string(),
                })?;
            if row.len() < 2 {
                return Err(XpsError::BadRow {
                    line: line_idx + 1,
                    value: line.to_string(),
                });
            }
            binding_energy.push(row[0]);
            intensity.push(row[1]);
        }

        let region: usize = header.value("Region")?;
        scans.push(XpsScan {
            info: RecordInfo::new(
                fileinfo.clone(),
                format!("{}_{}", fileinfo.filename, region),
                timestamp,
            ),
            region,
            start,
            end,
            step,
            sweeps: header.value("Sweeps")?,
            dwell: header.value("Dwell")?,
            e_pass: header.value("CAE/CRR")?,
            binding_energy,
            intensity,
            plot: None,
        });
    }
    Ok(scans)
}

/// Regions of an EIS export. The format has no acquisition date, the modification time is used.
pub fn read_xps_eis(path: &Path) -> Result<Vec<XpsScan>, XpsError> {
    let fileinfo = Fileinfo::new(path)?;
    let text = read_text_file(path)?;
    parse_regions(&text, &fileinfo, file_mtime(path)?)
}

impl XpsScan {
    pub fn series_plot(&self) -> SeriesPlot {
        let mut plot = SeriesPlot::new("E_b / eV", "Intensity / arb. units");
        plot.push(
            self.info.id(),
            self.binding_energy.clone(),
            self.intensity.clone(),
        );
        plot
    }
}

impl Record for XpsScan {
    fn info(&self) -> &RecordInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut RecordInfo {
        &mut self.info
    }

    fn ident(&self) -> &'static str {
        "XPS"
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
