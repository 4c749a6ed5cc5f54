//! Exports of the in-house LabView potentiostat software.
//!
//! All three flavours are whitespace separated tables with one header line, written with
//! whatever line endings the acquisition PC used. None carries a date, so the file
//! modification time is the timestamp.

use std::path::Path;

use time::PrimitiveDateTime;

use super::Cycle;
use crate::config::Config;
use crate::constants::{CV_CYCLE_TOLERANCE, LABVIEW_HEADER_ROWS};
use crate::error::{LabviewError, RenderError};
use crate::fileinfo::Fileinfo;
use crate::measurement::{Record, RecordInfo};
use crate::plot::SeriesPlot;
use crate::render::PlotRenderer;
use crate::sniff::read_text_file;
use crate::table::Table;
use crate::timestamp::file_mtime;

fn read_table(text: &str) -> Result<Table, LabviewError> {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    Ok(Table::from_whitespace(&text, LABVIEW_HEADER_ROWS, 0)?)
}

fn direction(step: f64) -> i8 {
    if step > 0.0 {
        1
    } else if step < 0.0 {
        -1
    } else {
        0
    }
}

/// Split a continuous voltammogram into cycles.
///
/// A cycle starts whenever the potential crosses back through its first value while
/// moving in the initial scan direction. `tol` widens the crossing level to absorb noise.
/// The trailing segment is kept, so a single sweep is one cycle; a crossing on the very
/// last sample does not open a new cycle.
pub fn split_cycles(voltage: &[f64], current: &[f64], tol: f64) -> Result<Vec<Cycle>, LabviewError> {
    let n = voltage.len().min(current.len());
    if n < 2 {
        return Err(LabviewError::TooShort(n));
    }
    let d0 = direction(voltage[1] - voltage[0]);
    if d0 == 0 {
        return Err(LabviewError::ZeroInitialStep);
    }

    let x0 = voltage[0];
    let mut starts = vec![0];
    for i in 1..n - 1 {
        let d = direction(voltage[i] - voltage[i - 1]);
        // Only steps in the initial direction can close a cycle
        if d != d0 {
            continue;
        }
        let crossed = if d0 > 0 {
            voltage[i - 1] < x0 - tol && voltage[i] >= x0 - tol
        } else {
            voltage[i - 1] > x0 + tol && voltage[i] <= x0 + tol
        };
        if crossed {
            starts.push(i);
        }
    }
    starts.push(n);

    Ok(starts
        .windows(2)
        .map(|w| Cycle {
            voltage: voltage[w[0]..w[1]].to_vec(),
            current: current[w[0]..w[1]].to_vec(),
        })
        .collect())
}

/// Cyclic voltammogram
#[derive(Debug, Clone, PartialEq)]
pub struct CvLabview {
    pub info: RecordInfo,
    pub time: Vec<f64>,
    pub voltage: Vec<f64>,
    pub current: Vec<f64>,
    pub u_start: f64,
    /// First vertex potential
    pub u_1: f64,
    /// Second vertex potential
    pub u_2: f64,
    /// V/s
    pub rate: f64,
    pub cycles: Vec<Cycle>,
    pub plot: Option<SeriesPlot>,
}

impl CvLabview {
    pub fn parse(text: &str, fileinfo: Fileinfo, timestamp: PrimitiveDateTime) -> Result<Self, LabviewError> {
        let table = read_table(text)?;
        if table.n_rows() < 2 {
            return Err(LabviewError::TooShort(table.n_rows()));
        }
        let time = table.column(0)?;
        let voltage = table.column(1)?;
        let current = table.column(2)?;

        let u_start = voltage[0];
        let max = voltage.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = voltage.iter().copied().fold(f64::INFINITY, f64::min);
        // Scans starting upwards reach the lower vertex second
        let (u_1, u_2) = if voltage[0] < voltage[1] { (min, max) } else { (max, min) };

        let total_time = time[time.len() - 1];
        if total_time <= 0.0 {
            return Err(LabviewError::ZeroDuration);
        }
        let rate = 2.0 * (u_1.abs() + u_2.abs()) / total_time;

        let tol = CV_CYCLE_TOLERANCE * (u_1 - u_2).abs();
        let cycles = split_cycles(&voltage, &current, tol)?;

        let id = fileinfo.filename.clone();
        Ok(Self {
            info: RecordInfo::new(fileinfo, id, timestamp),
            time,
            voltage,
            current,
            u_start,
            u_1,
            u_2,
            rate,
            cycles,
            plot: None,
        })
    }

    pub fn read(path: &Path) -> Result<Self, LabviewError> {
        Self::parse(&read_text_file(path)?, Fileinfo::new(path)?, file_mtime(path)?)
    }

    pub fn series_plot(&self) -> SeriesPlot {
        let mut plot = SeriesPlot::new("U vs. ref [V]", "I [A]");
        for (idx, cycle) in self.cycles.iter().enumerate() {
            plot.push(
                &format!("Cycle {}", idx + 1),
                cycle.voltage.clone(),
                cycle.current.clone(),
            );
        }
        plot
    }
}

/// Chronoamperometry
#[derive(Debug, Clone, PartialEq)]
pub struct CaLabview {
    pub info: RecordInfo,
    pub time: Vec<f64>,
    pub voltage: Vec<f64>,
    pub current: Vec<f64>,
    pub plot: Option<SeriesPlot>,
}

impl CaLabview {
    pub fn parse(text: &str, fileinfo: Fileinfo, timestamp: PrimitiveDateTime) -> Result<Self, LabviewError> {
        let table = read_table(text)?;
        let id = fileinfo.filename.clone();
        Ok(Self {
            info: RecordInfo::new(fileinfo, id, timestamp),
            time: table.column(0)?,
            voltage: table.column(1)?,
            current: table.column(2)?,
            plot: None,
        })
    }

    pub fn read(path: &Path) -> Result<Self, LabviewError> {
        Self::parse(&read_text_file(path)?, Fileinfo::new(path)?, file_mtime(path)?)
    }

    pub fn series_plot(&self) -> SeriesPlot {
        let mut plot = SeriesPlot::new("Time [s]", "I_WE [A]").with_secondary_axis("U_WE [V]");
        plot.push("I_WE", self.time.clone(), self.current.clone())
            .push_secondary("U_WE", self.time.clone(), self.voltage.clone());
        plot
    }
}

/// Frequency spectrum of the current noise
#[derive(Debug, Clone, PartialEq)]
pub struct FftLabview {
    pub info: RecordInfo,
    /// Hz
    pub frequency: Vec<f64>,
    pub amplitude: Vec<f64>,
    pub plot: Option<SeriesPlot>,
}

impl FftLabview {
    pub fn parse(text: &str, fileinfo: Fileinfo, timestamp: PrimitiveDateTime) -> Result<Self, LabviewError> {
        let table = read_table(text)?;
        let id = fileinfo.filename.clone();
        Ok(Self {
            info: RecordInfo::new(fileinfo, id, timestamp),
            frequency: table.column(0)?,
            amplitude: table.column(1)?,
            plot: None,
        })
    }

    pub fn read(path: &Path) -> Result<Self, LabviewError> {
        Self::parse(&read_text_file(path)?, Fileinfo::new(path)?, file_mtime(path)?)
    }

    pub fn series_plot(&self) -> SeriesPlot {
        let mut plot = SeriesPlot::new("Frequency [Hz]", "Amplitude");
        plot.push(self.info.id(), self.frequency.clone(), self.amplitude.clone());
        plot
    }
}

macro_rules! series_record {
    ($record:ty, $ident:literal) => {
        impl Record for $record {
            fn info(&self) -> &RecordInfo {
                &self.info
            }

            fn info_mut(&mut self) -> &mut RecordInfo {
                &mut self.info
            }

            fn ident(&self) -> &'static str {
                $ident
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
    };
}

series_record!(CvLabview, "CV_LABVIEW");
series_record!(CaLabview, "CA_LABVIEW");
series_record!(FftLabview, "FFT_LABVIEW");

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use time::macros::datetime;

    /// Triangle between -1 V and 1 V starting upwards at 0 V, 40 samples per cycle
    fn triangle(cycles: usize) -> Vec<f64> {
        (0..=cycles * 40)
            .map(|i| {
                let p = (i % 40) as i64;
                let v = if p <= 10 {
                    p
                } else if p <= 30 {
                    20 - p
                } else {
                    p - 40
                };
                v as f64 / 10.0
            })
            .collect()
    }

    pub(crate) fn cv_text(cycles: usize) -> String {
        let mut text = String::from("Time\tU_WE\tI_WE\tScan rate\r\n");
        for (i, v) in triangle(cycles).iter().enumerate() {
            text.push_str(&format!("{}\t{}\t{}\r\n", (i + 1) as f64 * 0.1, v, v * 1e-6));
        }
        text
    }

    #[test]
    fn test_split_three_cycles() {
        let x = triangle(3);
        let y = vec![0.0; x.len()];
        let cycles = split_cycles(&x, &y, CV_CYCLE_TOLERANCE * 2.0).unwrap();
        assert_eq!(cycles.len(), 3);
        let joined: Vec<f64> = cycles.iter().flat_map(|c| c.voltage.clone()).collect();
        assert_eq!(joined, x);
    }

    #[test]
    fn test_single_sweep_is_one_cycle() {
        let x: Vec<f64> = (0..20).map(|i| 1.0 - i as f64 * 0.1).collect();
        let cycles = split_cycles(&x, &x, 0.0).unwrap();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].voltage.len(), 20);
    }

    #[test]
    fn test_split_errors() {
        assert!(matches!(
            split_cycles(&[1.0], &[1.0], 0.0),
            Err(LabviewError::TooShort(1))
        ));
        assert!(matches!(
            split_cycles(&[1.0, 1.0, 2.0], &[0.0; 3], 0.0),
            Err(LabviewError::ZeroInitialStep)
        ));
    }

    #[test]
    fn test_cv_parameters() {
        let info = Fileinfo::new(Path::new("/d/cv_pt.csv")).unwrap();
        let cv = CvLabview::parse(&cv_text(2), info, datetime!(2023-01-01 0:00)).unwrap();
        assert_eq!(cv.u_start, 0.0);
        assert_eq!((cv.u_1, cv.u_2), (-1.0, 1.0));
        // 2 * (1 + 1) V over 8.1 s
        assert!((cv.rate - 4.0 / 8.1).abs() < 1e-9);
        assert_eq!(cv.cycles.len(), 2);
        assert_eq!(cv.series_plot().series.len(), 2);
    }

    #[test]
    fn test_ca_and_fft() {
        let info = Fileinfo::new(Path::new("ca.csv")).unwrap();
        let ca = CaLabview::parse("t\tU\tI\r0\t0.5\t1e-6\r1\t0.5\t2e-6\r", info, datetime!(2023-01-01 0:00))
            .unwrap();
        assert_eq!(ca.current, vec![1e-6, 2e-6]);
        assert_eq!(ca.series_plot().y2_label.as_deref(), Some("U_WE [V]"));

        let info = Fileinfo::new(Path::new("fft.csv")).unwrap();
        let fft = FftLabview::parse("Freq_Hz\tAmp\n10\t0.1\n20\t0.2\n", info, datetime!(2023-01-01 0:00))
            .unwrap();
        assert_eq!(fft.frequency, vec![10.0, 20.0]);
        assert!(matches!(
            CaLabview::parse("t U\n1 2\n", Fileinfo::new(Path::new("x.csv")).unwrap(), datetime!(2023-01-01 0:00)),
            Err(LabviewError::Table(_))
        ));
    }
}
