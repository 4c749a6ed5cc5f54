//! Auger spectra from the Staib DESA analyser.
//!
//! The analyser exports either its own `.dat` text format or a single block VAMAS file.
//! Both end up as the same record.

use std::path::Path;

use time::PrimitiveDateTime;

use super::vamas::Vamas;
use crate::config::Config;
use crate::error::{AesError, RenderError};
use crate::fileinfo::Fileinfo;
use crate::measurement::{Record, RecordInfo};
use crate::plot::SeriesPlot;
use crate::render::PlotRenderer;
use crate::sniff::read_text_file;
use crate::timestamp::{file_mtime, parse_datetime};

/// Energy column of `.dat` files is written in meV
const DAT_ENERGY_DIVISOR: f64 = 1000.0;
/// The acquisition date follows its label after a run of four blanks
const DAT_DATE_SEPARATOR: &str = "    ";

#[derive(Debug, Clone, PartialEq)]
pub struct AesStaib {
    pub info: RecordInfo,
    pub mode: String,
    /// ms
    pub dwell_time: f64,
    pub scan_num: usize,
    /// eV
    pub e_start: f64,
    pub e_stop: f64,
    pub step_width: f64,
    /// ms
    pub retrace_time: Option<f64>,
    pub res_mode: Option<String>,
    pub resolution: Option<f64>,
    pub energy: Vec<f64>,
    pub intensity: Vec<f64>,
    pub plot: Option<SeriesPlot>,
}

/// Walks the fixed `.dat` header one `label: value` line at a time
struct DatHeader<'a, I: Iterator<Item = &'a str>> {
    lines: I,
    line: usize,
}

impl<'a, I: Iterator<Item = &'a str>> DatHeader<'a, I> {
    fn raw(&mut self, field: &'static str) -> Result<&'a str, AesError> {
        self.line += 1;
        self.lines.next().ok_or(AesError::HeaderEnded {
            line: self.line,
            field,
        })
    }

    fn text(&mut self, field: &'static str) -> Result<String, AesError> {
        let line = self.raw(field)?;
        Ok(line.rsplit(':').next().unwrap_or(line).trim().to_string())
    }

    fn parse<T: std::str::FromStr>(&mut self, field: &'static str) -> Result<T, AesError> {
        let value = self.text(field)?;
        value.parse::<T>().map_err(|_| AesError::BadHeaderValue {
            line: self.line,
            field,
            value,
        })
    }
}

impl AesStaib {
    pub fn parse_dat(
        text: &str,
        fileinfo: Fileinfo,
        fallback: PrimitiveDateTime,
    ) -> Result<Self, AesError> {
        let mut header = DatHeader {
            lines: text.lines(),
            line: 0,
        };
        header.text("version")?;
        header.text("spectrum type")?;
        header.text("technique")?;
        header.text("source label")?;
        header.parse::<f64>("source energy")?;
        let mode = header.text("mode")?;
        header.parse::<usize>("channels")?;
        header.parse::<usize>("samples")?;
        let e_start = header.parse::<f64>("energy start")?;
        let e_stop = header.parse::<f64>("energy stop")?;
        let step_width = header.parse::<f64>("step width")?;
        let res_mode = header.text("resolution mode")?;
        let resolution = header.parse::<f64>("resolution")?;
        let data_points = header.parse::<usize>("data points")?;
        let scan_num = header.parse::<usize>("scans")?;
        let dwell_time = header.parse::<f64>("dwell time")?;
        let retrace_time = header.parse::<f64>("retrace time")?;
        header.text("description length")?;

        let date_line = header.raw("date")?;
        let date_text = date_line.rsplit(DAT_DATE_SEPARATOR).next().unwrap_or(date_line);
        let timestamp = match parse_datetime(date_text) {
            Some(stamp) => stamp,
            None => {
                spdlog::warn!(
                    "Unreadable date {:?} in {:?}, using file modification time",
                    date_text.trim(),
                    fileinfo.filepath
                );
                fallback
            }
        };

        for _ in 0..4 {
            header.text("reserved")?;
        }
        header.raw("data header")?;

        let first_row = header.line + 1;
        let mut energy = Vec::with_capacity(data_points);
        let mut intensity = Vec::with_capacity(data_points);
        for (offset, line) in header.lines.take(data_points).enumerate() {
            let mut cells = line.split_whitespace().map(str::parse::<f64>);
            match (cells.next(), cells.next()) {
                (Some(Ok(e)), Some(Ok(i))) => {
                    energy.push(e / DAT_ENERGY_DIVISOR);
                    intensity.push(i);
                }
                _ => {
                    return Err(AesError::BadRow {
                        line: first_row + offset,
                        value: line.to_string(),
                    })
                }
            }
        }
        if energy.len() != data_points {
            return Err(AesError::MissingRows {
                expected: data_points,
                found: energy.len(),
            });
        }

        let id = fileinfo.filename.clone();
        Ok(Self {
            info: RecordInfo::new(fileinfo, id, timestamp),
            mode,
            dwell_time,
            scan_num,
            e_start,
            e_stop,
            step_width,
            retrace_time: Some(retrace_time),
            res_mode: Some(res_mode),
            resolution: Some(resolution),
            energy,
            intensity,
            plot: None,
        })
    }

    pub fn parse_vms(
        text: &str,
        fileinfo: Fileinfo,
        fallback: PrimitiveDateTime,
    ) -> Result<Self, AesError> {
        let vms = Vamas::parse(text)?;
        // The DESA software writes exactly one block
        let block = vms
            .blocks
            .into_iter()
            .next()
            .ok_or_else(|| AesError::NoBlocks(fileinfo.filepath.clone()))?;

        let energy = block.x_values();
        let e_stop = block.x_step * energy.len() as f64 + block.x_start - block.x_step;
        let retrace_time = block
            .additional_param("BKSrettime")
            .and_then(|v| v.parse::<f64>().ok());
        let res_mode = block.additional_param("BKSresomode").map(str::to_string);
        let resolution = block
            .additional_param("BKSresol")
            .and_then(|v| v.parse::<f64>().ok());
        let timestamp = block.timestamp.unwrap_or_else(|| {
            spdlog::warn!(
                "Invalid block date in {:?}, using file modification time",
                fileinfo.filepath
            );
            fallback
        });
        let intensity = block
            .corresponding_variables
            .into_iter()
            .next()
            .map(|v| v.y_values)
            .unwrap_or_default();

        let id = fileinfo.filename.clone();
        Ok(Self {
            info: RecordInfo::new(fileinfo, id, timestamp),
            mode: block.signal_mode,
            dwell_time: block.signal_collection_time,
            scan_num: block.num_scans,
            e_start: block.x_start,
            e_stop,
            step_width: block.x_step,
            retrace_time,
            res_mode,
            resolution,
            energy,
            intensity,
            plot: None,
        })
    }

    /// Decode a `.dat` or `.vms` file depending on its extension
    pub fn read(path: &Path) -> Result<Self, AesError> {
        let fileinfo = Fileinfo::new(path)?;
        let text = read_text_file(path)?;
        let fallback = file_mtime(path)?;
        if fileinfo.extension == ".vms" {
            Self::parse_vms(&text, fileinfo, fallback)
        } else {
            Self::parse_dat(&text, fileinfo, fallback)
        }
    }

    pub fn series_plot(&self) -> SeriesPlot {
        let mut plot = SeriesPlot::new("E / eV", "dN / dE [arb. units]");
        plot.push(self.info.id(), self.energy.clone(), self.intensity.clone());
        plot
    }
}

impl Record for AesStaib {
    fn info(&self) -> &RecordInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut RecordInfo {
        &mut self.info
    }

    fn ident(&self) -> &'static str {
        "AES"
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
    use crate::spectroscopy::vamas::tests::staib_vms;
    use time::macros::datetime;

    pub(crate) fn dat_text(rows: usize) -> String {
        let mut text = String::from(
            "Version: 1.2\n\
             Spectrum Type: AES\n\
             Technique: AES diff\n\
             Source Label: e-\n\
             Source Energy: 3000\n\
             Mode: LockIn\n\
             Channels: 1\n\
             Samples: 1\n\
             E-Start: 30\n\
             E-Stop: 570\n\
             Step: 1\n\
             Resolution Mode: dE/E\n\
             Resolution: 0.5\n",
        );
        text.push_str(&format!("Data Points: {rows}\n"));
        text.push_str(
            "Scans: 3\n\
             Dwell Time: 100\n\
             Retrace Time: 200\n\
             Description Length: 0\n\
             Date/Time:    Sun Mar 14 09:26:53 2021\n\
             Reserved: 0\n\
             Reserved: 0\n\
             Reserved: 0\n\
             Reserved: 0\n\
             Energy [mV]\tIntensity\n",
        );
        for i in 0..rows {
            text.push_str(&format!("{}\t{}\n", 30_000 + i * 1000, i as f64 * 0.5));
        }
        text
    }

    fn fallback() -> PrimitiveDateTime {
        datetime!(2000-01-01 0:00)
    }

    #[test]
    fn test_dat() {
        let info = Fileinfo::new(Path::new("/d/Cu_aes.dat")).unwrap();
        let aes = AesStaib::parse_dat(&dat_text(5), info, fallback()).unwrap();
        assert_eq!(aes.mode, "LockIn");
        assert_eq!(aes.e_start.round(), 30.0);
        assert_eq!(aes.e_stop.round(), 570.0);
        assert_eq!(aes.scan_num, 3);
        assert_eq!(aes.dwell_time, 100.0);
        assert_eq!(aes.retrace_time, Some(200.0));
        assert_eq!(aes.res_mode.as_deref(), Some("dE/E"));
        assert_eq!(aes.info.timestamp(), datetime!(2021-03-14 9:26:53));
        assert_eq!(aes.energy, vec![30.0, 31.0, 32.0, 33.0, 34.0]);
        assert_eq!(aes.intensity[4], 2.0);
        assert_eq!(aes.info.id(), "Cu_aes");
    }

    #[test]
    fn test_dat_misaligned_header() {
        let text = dat_text(2).replace("Channels: 1", "Channels: one");
        let info = Fileinfo::new(Path::new("bad.dat")).unwrap();
        match AesStaib::parse_dat(&text, info, fallback()) {
            Err(AesError::BadHeaderValue { line, field, .. }) => {
                assert_eq!(line, 7);
                assert_eq!(field, "channels");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_dat_short_data() {
        let text = dat_text(3).replace("Data Points: 3", "Data Points: 4");
        let info = Fileinfo::new(Path::new("short.dat")).unwrap();
        assert!(matches!(
            AesStaib::parse_dat(&text, info, fallback()),
            Err(AesError::MissingRows {
                expected: 4,
                found: 3
            })
        ));
    }

    #[test]
    fn test_dat_bad_date_uses_fallback() {
        let text = dat_text(1).replace("Sun Mar 14 09:26:53 2021", "yesterday");
        let info = Fileinfo::new(Path::new("d.dat")).unwrap();
        let aes = AesStaib::parse_dat(&text, info, fallback()).unwrap();
        assert_eq!(aes.info.timestamp(), fallback());
    }

    #[test]
    fn test_vms() {
        let info = Fileinfo::new(Path::new("/d/Cu_aes.vms")).unwrap();
        let aes = AesStaib::parse_vms(&staib_vms(&[1.0, 2.0, 3.0]), info, fallback()).unwrap();
        assert_eq!(aes.mode, "LockIn");
        assert_eq!(aes.e_start, 30.0);
        assert_eq!(aes.e_stop, 34.0);
        assert_eq!(aes.step_width, 2.0);
        assert_eq!(aes.energy, vec![30.0, 32.0, 34.0]);
        assert_eq!(aes.retrace_time, Some(100.0));
        assert_eq!(aes.resolution, Some(0.5));
        assert_eq!(aes.res_mode.as_deref(), Some("1"));
        assert_eq!(aes.info.timestamp(), datetime!(2021-03-14 9:26:53));
    }

    #[test]
    fn test_read_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spectrum.dat");
        std::fs::write(&path, dat_text(2)).unwrap();
        let aes = AesStaib::read(&path).unwrap();
        assert_eq!(aes.energy.len(), 2);
        assert_eq!(aes.series_plot().series[0].label, "spectrum");
    }
}
