//! PalmSens `.pssession` files.
//!
//! A UTF-16 JSON document followed by a stray trailing character. Only the first
//! measurement is read. Its `Title` names the technique, which decides how the generic
//! `DataSet.Values` arrays map to columns:
//!
//! * impedance: arrays 4 and 5 are Z' and Z''
//! * cyclic voltammetry: every array, grouped as (time, potential, current) per cycle
//! * LSV, CA, CP: arrays 0..4 are time, potential, current and charge

use std::path::Path;

use serde::Deserialize;

use super::palmsens::{plot_columns, PalmSensKind};
use crate::config::Config;
use crate::error::{RenderError, SessionError};
use crate::fileinfo::Fileinfo;
use crate::measurement::{Record, RecordInfo};
use crate::plot::SeriesPlot;
use crate::render::PlotRenderer;
use crate::sniff::read_text_file;
use crate::timestamp::from_dotnet_ticks;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SessionFile {
    measurements: Vec<SessionMeasurement>,
    #[serde(default)]
    method_for_measurement: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SessionMeasurement {
    title: String,
    time_stamp: i64,
    data_set: DataSet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DataSet {
    values: Vec<DataArray>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DataArray {
    data_values: Vec<DataValue>,
}

#[derive(Debug, Deserialize)]
struct DataValue {
    #[serde(rename = "V")]
    v: Option<f64>,
}

impl DataArray {
    fn values(&self) -> Vec<f64> {
        self.data_values
            .iter()
            .map(|value| value.v.unwrap_or(f64::NAN))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PalmSensSession {
    pub info: RecordInfo,
    pub kind: PalmSensKind,
    /// Method script the instrument ran
    pub method: Option<String>,
    pub columns: Vec<Vec<f64>>,
    pub plot: Option<SeriesPlot>,
}

fn select(arrays: &[DataArray], indices: &[usize]) -> Result<Vec<Vec<f64>>, SessionError> {
    indices
        .iter()
        .map(|&idx| {
            arrays
                .get(idx)
                .map(DataArray::values)
                .ok_or(SessionError::MissingArray {
                    index: idx,
                    available: arrays.len(),
                })
        })
        .collect()
}

impl PalmSensSession {
    pub fn parse(text: &str, fileinfo: Fileinfo) -> Result<Self, SessionError> {
        let json = text.trim_end_matches(|c: char| c != '}');
        let session: SessionFile = serde_json::from_str(json)?;
        let measurement = session
            .measurements
            .into_iter()
            .next()
            .ok_or(SessionError::NoMeasurements)?;

        let kind = PalmSensKind::from_title(&measurement.title)
            .ok_or_else(|| SessionError::UnknownTitle(measurement.title.clone()))?;
        let timestamp = from_dotnet_ticks(measurement.time_stamp)
            .ok_or(SessionError::BadTimestamp(measurement.time_stamp))?;

        let arrays = &measurement.data_set.values;
        let columns = match kind {
            PalmSensKind::Eis => select(arrays, &[4, 5])?,
            PalmSensKind::Cv => arrays.iter().map(DataArray::values).collect(),
            PalmSensKind::Lsv | PalmSensKind::Ca | PalmSensKind::Cp => {
                select(arrays, &[0, 1, 2, 3])?
            }
        };

        let id = fileinfo.filename.clone();
        Ok(Self {
            info: RecordInfo::new(fileinfo, id, timestamp),
            kind,
            method: session.method_for_measurement,
            columns,
            plot: None,
        })
    }

    pub fn read(path: &Path) -> Result<Self, SessionError> {
        Self::parse(&read_text_file(path)?, Fileinfo::new(path)?)
    }

    pub fn series_plot(&self) -> SeriesPlot {
        let column = |idx: usize| self.columns.get(idx).cloned().unwrap_or_default();
        match self.kind {
            PalmSensKind::Eis => plot_columns(self.kind, &self.columns, 0, 2),
            PalmSensKind::Cv => plot_columns(self.kind, &self.columns, 1, 3),
            PalmSensKind::Lsv => {
                plot_columns(self.kind, self.columns.get(1..).unwrap_or(&[]), 0, 2)
            }
            PalmSensKind::Cp => plot_columns(self.kind, &self.columns, 0, 2),
            PalmSensKind::Ca => {
                let mut plot = SeriesPlot::new("t [s]", "I [µA]").with_secondary_axis("U [V]");
                plot.push("I", column(0), column(2))
                    .push_secondary("U", column(0), column(1));
                plot
            }
        }
    }
}

impl Record for PalmSensSession {
    fn info(&self) -> &RecordInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut RecordInfo {
        &mut self.info
    }

    fn ident(&self) -> &'static str {
        "PS_SESSION"
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

    fn array(values: &[f64]) -> String {
        let values: Vec<String> = values.iter().map(|v| format!("{{\"V\": {v}}}")).collect();
        format!("{{\"DataValues\": [{}]}}", values.join(", "))
    }

    pub(crate) fn session_json(title: &str, arrays: usize) -> String {
        let arrays: Vec<String> = (0..arrays)
            .map(|i| array(&[i as f64, i as f64 + 0.5]))
            .collect();
        // 2020-01-01 00:00:00
        format!(
            "{{\"Type\": \"PalmSens.DataFiles.SessionFile\", \
             \"MethodForMeasurement\": \"#method\", \
             \"Measurements\": [{{\"Title\": \"{title}\", \"TimeStamp\": 637134336000000000, \
             \"DataSet\": {{\"Type\": \"PalmSens.Data.DataSet\", \"Values\": [{}]}}}}]}}\u{feff}",
            arrays.join(", ")
        )
    }

    #[test]
    fn test_eis_session() {
        let info = Fileinfo::new(Path::new("/d/eis.pssession")).unwrap();
        let session =
            PalmSensSession::parse(&session_json("Impedance Spectroscopy", 6), info).unwrap();
        assert_eq!(session.kind, PalmSensKind::Eis);
        assert_eq!(session.info.timestamp(), datetime!(2020-01-01 0:00));
        assert_eq!(session.method.as_deref(), Some("#method"));
        assert_eq!(session.columns, vec![vec![4.0, 4.5], vec![5.0, 5.5]]);
    }

    #[test]
    fn test_cv_session_cycles() {
        let info = Fileinfo::new(Path::new("cv.pssession")).unwrap();
        let session = PalmSensSession::parse(&session_json("Cyclic Voltammetry", 7), info).unwrap();
        assert_eq!(session.columns.len(), 7);
        let plot = session.series_plot();
        // (1, 2) and (4, 5)
        assert_eq!(plot.series.len(), 2);
        assert_eq!(plot.series[1].x, vec![4.0, 4.5]);
    }

    #[test]
    fn test_ca_session_secondary_axis() {
        let info = Fileinfo::new(Path::new("ca.pssession")).unwrap();
        let session = PalmSensSession::parse(&session_json("Chronoamperometry", 4), info).unwrap();
        let plot = session.series_plot();
        assert_eq!(plot.series[0].y, vec![2.0, 2.5]);
        assert!(plot.series[1].secondary);
    }

    #[test]
    fn test_session_errors() {
        let info = Fileinfo::new(Path::new("x.pssession")).unwrap();
        assert!(matches!(
            PalmSensSession::parse(&session_json("Impedance Spectroscopy", 3), info.clone()),
            Err(SessionError::MissingArray { index: 4, available: 3 })
        ));
        assert!(matches!(
            PalmSensSession::parse(&session_json("Open Circuit", 1), info.clone()),
            Err(SessionError::UnknownTitle(_))
        ));
        assert!(matches!(
            PalmSensSession::parse("{\"Measurements\": []}", info),
            Err(SessionError::NoMeasurements)
        ));
    }
}
