//! Nanonis `.sxm` scans.
//!
//! An ASCII header of `:KEY:` lines, each followed by its value lines, runs up to
//! `:SCANIT_END:`. The binary part starts after the `0x1A 0x04` marker and holds big
//! endian `f32` frames of `yres x xres`, one per channel and direction in `DATA_INFO`
//! order (forward before backward).

use std::path::Path;

use byteorder::{BigEndian, ByteOrder};
use fxhash::FxHashMap;
use time::PrimitiveDateTime;

use crate::config::Config;
use crate::constants::{AMPERE_TO_NA, METERS_TO_NM, SECONDS_TO_MS, SXM_DATA_MARKER, SXM_HEADER_END};
use crate::error::{RenderError, SxmError};
use crate::fileinfo::Fileinfo;
use crate::measurement::{Record, RecordInfo};
use crate::render::PlotRenderer;
use crate::spm_image::SpmImage;
use crate::timestamp::parse_date_and_time;

const TOPOGRAPHY_CHANNEL: &str = "Z";

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SxmHeader {
    entries: FxHashMap<String, String>,
}

impl SxmHeader {
    pub fn parse(text: &str) -> Self {
        let mut entries = FxHashMap::default();
        let mut key: Option<String> = None;
        let mut value: Vec<&str> = vec![];
        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.len() > 1 && trimmed.starts_with(':') && trimmed.ends_with(':') {
                if let Some(k) = key.take() {
                    entries.insert(k, value.join("\n"));
                }
                key = Some(trimmed.trim_matches(':').to_string());
                value.clear();
            } else if key.is_some() {
                value.push(line.trim_end());
            }
        }
        if let Some(k) = key {
            entries.insert(k, value.join("\n"));
        }
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Result<&str, SxmError> {
        self.entries
            .get(key)
            .map(|v| v.trim())
            .ok_or_else(|| SxmError::MissingKey(key.to_string()))
    }

    /// Whitespace separated floats of a value
    pub fn floats(&self, key: &str) -> Result<Vec<f64>, SxmError> {
        let value = self.get(key)?;
        value
            .split_whitespace()
            .map(|v| {
                v.parse::<f64>().map_err(|_| SxmError::BadValue {
                    key: key.to_string(),
                    value: value.to_string(),
                })
            })
            .collect()
    }

    pub fn float(&self, key: &str) -> Result<f64, SxmError> {
        self.floats(key)?.first().copied().ok_or_else(|| SxmError::BadValue {
            key: key.to_string(),
            value: String::new(),
        })
    }

    /// Value laid out as a tab separated table with a header row
    pub fn table(&self, key: &str) -> Result<Vec<FxHashMap<String, String>>, SxmError> {
        let value = self.get(key)?;
        let mut lines = value.lines().map(str::trim).filter(|l| !l.is_empty());
        let columns: Vec<&str> = lines
            .next()
            .map(|head| head.split('\t').map(str::trim).collect())
            .unwrap_or_default();
        Ok(lines
            .map(|line| {
                columns
                    .iter()
                    .zip(line.split('\t').map(str::trim))
                    .map(|(c, v)| (c.to_string(), v.to_string()))
                    .collect()
            })
            .collect())
    }
}

/// A channel listed in `DATA_INFO`
#[derive(Debug, Clone, PartialEq)]
pub struct SxmChannel {
    pub name: String,
    pub unit: String,
    pub both_directions: bool,
}

fn channels(header: &SxmHeader) -> Result<Vec<SxmChannel>, SxmError> {
    Ok(header
        .table("DATA_INFO")?
        .into_iter()
        .filter_map(|row| {
            Some(SxmChannel {
                name: row.get("Name")?.clone(),
                unit: row.get("Unit").cloned().unwrap_or_default(),
                both_directions: row.get("Direction").is_some_and(|d| d == "both"),
            })
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq)]
pub struct StmSxm {
    pub info: RecordInfo,
    /// nA
    pub current: f64,
    /// V
    pub bias: f64,
    /// nm
    pub xsize: f64,
    pub ysize: f64,
    pub xoffset: f64,
    pub yoffset: f64,
    pub xres: usize,
    pub yres: usize,
    /// deg
    pub rotation: f64,
    /// ms
    pub line_time: f64,
    /// s
    pub speed: f64,
    pub img_fw: SpmImage,
    pub img_bw: Option<SpmImage>,
}

impl StmSxm {
    pub fn parse(buffer: &[u8], fileinfo: Fileinfo) -> Result<Self, SxmError> {
        let end = find(buffer, SXM_HEADER_END.as_bytes()).ok_or(SxmError::MissingHeaderEnd)?;
        let text: String = buffer[..end].iter().map(|b| *b as char).collect();
        let header = SxmHeader::parse(&text);

        let marker = find(&buffer[end..], &SXM_DATA_MARKER).ok_or(SxmError::MissingDataMarker)?;
        let data = &buffer[end + marker + SXM_DATA_MARKER.len()..];

        let pixels = header.floats("SCAN_PIXELS")?;
        let range = header.floats("SCAN_RANGE")?;
        let offset = header.floats("SCAN_OFFSET")?;
        let (xres, yres) = match pixels.as_slice() {
            [x, y, ..] if *x >= 1.0 && *y >= 1.0 => (*x as usize, *y as usize),
            _ => {
                return Err(SxmError::BadValue {
                    key: "SCAN_PIXELS".to_string(),
                    value: header.get("SCAN_PIXELS")?.to_string(),
                })
            }
        };
        let pair = |values: &[f64], key: &str| -> Result<(f64, f64), SxmError> {
            match values {
                [a, b, ..] => Ok((*a, *b)),
                _ => Err(SxmError::BadValue {
                    key: key.to_string(),
                    value: format!("{values:?}"),
                }),
            }
        };
        let (xsize, ysize) = pair(&range, "SCAN_RANGE")?;
        let (xoffset, yoffset) = pair(&offset, "SCAN_OFFSET")?;

        let setpoint = header
            .table("Z-CONTROLLER")?
            .first()
            .and_then(|row| row.get("Setpoint").cloned())
            .ok_or_else(|| SxmError::MissingKey("Z-CONTROLLER Setpoint".to_string()))?;
        let current = setpoint
            .split_whitespace()
            .next()
            .and_then(|v| v.parse::<f64>().ok())
            .ok_or_else(|| SxmError::BadValue {
                key: "Setpoint".to_string(),
                value: setpoint.clone(),
            })?;

        let date = header.get("REC_DATE")?;
        let time = header.get("REC_TIME")?;
        let timestamp: PrimitiveDateTime = parse_date_and_time(date, time)
            .ok_or_else(|| SxmError::BadDate(format!("{date} {time}")))?;

        // Locate the topography frames
        let frame_len = xres * yres;
        let mut frame_idx = 0;
        let mut found = None;
        for channel in channels(&header)? {
            if channel.name == TOPOGRAPHY_CHANNEL {
                found = Some((frame_idx, channel.both_directions));
                break;
            }
            frame_idx += if channel.both_directions { 2 } else { 1 };
        }
        let (frame_idx, both) =
            found.ok_or_else(|| SxmError::MissingChannel(TOPOGRAPHY_CHANNEL.to_string()))?;
        let read_frame = |idx: usize| -> Result<Vec<f64>, SxmError> {
            let start = idx * frame_len * 4;
            let stop = start + frame_len * 4;
            if stop > data.len() {
                return Err(SxmError::Truncated {
                    needed: stop,
                    available: data.len(),
                });
            }
            Ok(data[start..stop]
                .chunks_exact(4)
                .map(|c| BigEndian::read_f32(c) as f64 * METERS_TO_NM)
                .collect())
        };

        let xsize = xsize * METERS_TO_NM;
        let mut img_fw = SpmImage::from_vec(read_frame(frame_idx)?, yres, xres, xsize)?;
        img_fw.flip_vertical();
        let img_bw = if both {
            let mut img = SpmImage::from_vec(read_frame(frame_idx + 1)?, yres, xres, xsize)?;
            img.flip_vertical().flip_horizontal();
            Some(img)
        } else {
            None
        };

        let line_time = header.float("SCAN_TIME")? * SECONDS_TO_MS;
        let id = fileinfo.filename.clone();
        Ok(Self {
            info: RecordInfo::new(fileinfo, id, timestamp),
            current: current * AMPERE_TO_NA,
            bias: header.float("BIAS")?,
            xsize,
            ysize: ysize * METERS_TO_NM,
            xoffset: xoffset * METERS_TO_NM,
            yoffset: yoffset * METERS_TO_NM,
            xres,
            yres,
            rotation: header.float("SCAN_ANGLE").unwrap_or(0.0),
            line_time,
            speed: line_time * yres as f64 / SECONDS_TO_MS,
            img_fw,
            img_bw,
        })
    }

    pub fn read(path: &Path) -> Result<Self, SxmError> {
        Self::parse(&std::fs::read(path)?, Fileinfo::new(path)?)
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

impl Record for StmSxm {
    fn info(&self) -> &RecordInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut RecordInfo {
        &mut self.info
    }

    fn ident(&self) -> &'static str {
        "SXM"
    }

    fn process(
        &mut self,
        config: &Config,
        renderer: &mut dyn PlotRenderer,
    ) -> Result<(), RenderError> {
        let id = self.info.id().to_string();
        self.img_fw
            .corr_plane()
            .corr_lines_median()
            .corr_plane()
            .corr_lines_median()
            .render(renderer, config, &format!("{id}_fw"))?;
        if let Some(img) = self.img_bw.as_mut() {
            img.corr_plane()
                .corr_lines_median()
                .corr_plane()
                .corr_lines_median()
                .render(renderer, config, &format!("{id}_bw"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use time::macros::datetime;

    pub(crate) fn sxm_bytes() -> Vec<u8> {
        let header = ":NANONIS_VERSION:\n2\n\
            :REC_DATE:\n14.03.2021\n\
            :REC_TIME:\n09:26:53\n\
            :SCAN_PIXELS:\n       3       2\n\
            :SCAN_TIME:\n1.200E-1 1.200E-1\n\
            :SCAN_RANGE:\n           1.500000E-8           1.000000E-8\n\
            :SCAN_OFFSET:\n1.000000E-9 -2.000000E-9\n\
            :SCAN_ANGLE:\n3.000E+1\n\
            :BIAS:\n5.000E-1\n\
            :Z-CONTROLLER:\n\tName\ton\tSetpoint\tP-gain\n\tlog Current\t1\t1.000E-10 A\t1.0E-12 m\n\
            :DATA_INFO:\n\tChannel\tName\tUnit\tDirection\tCalibration\tOffset\n\
            \t0\tCurrent\tA\tforward\t1E+0\t0E+0\n\
            \t14\tZ\tm\tboth\t1E-9\t0E+0\n\n\
            :SCANIT_END:\n\n\n";
        let mut out = header.as_bytes().to_vec();
        out.extend_from_slice(&SXM_DATA_MARKER);
        // Current (forward only), Z forward, Z backward
        for frame in 0..3 {
            for i in 0..6 {
                out.write_f32::<BigEndian>((frame * 10 + i) as f32 * 1e-9).unwrap();
            }
        }
        out
    }

    #[test]
    fn test_header_parse() {
        let header = SxmHeader::parse(":A:\n1 2\n:B:\n\tx\ty\n\t3\t4\n");
        assert_eq!(header.floats("A").unwrap(), vec![1.0, 2.0]);
        assert_eq!(header.table("B").unwrap()[0].get("y").map(String::as_str), Some("4"));
        assert!(matches!(header.get("C"), Err(SxmError::MissingKey(_))));
    }

    #[test]
    fn test_decode_scan() {
        let info = Fileinfo::new(Path::new("/d/Pt111_001.sxm")).unwrap();
        let scan = StmSxm::parse(&sxm_bytes(), info).unwrap();
        assert_eq!(scan.info.timestamp(), datetime!(2021-03-14 9:26:53));
        assert_eq!((scan.xres, scan.yres), (3, 2));
        assert!((scan.xsize - 15.0).abs() < 1e-6);
        assert!((scan.img_fw.pixel_pitch() - 5.0).abs() < 1e-6);
        assert!((scan.current - 0.1).abs() < 1e-9);
        assert_eq!(scan.bias, 0.5);
        assert!((scan.line_time - 120.0).abs() < 1e-9);
        assert!((scan.speed - 0.24).abs() < 1e-9);
        assert_eq!(scan.rotation, 30.0);

        // Z forward is the second frame: values 10..16, rows flipped
        let fw = &scan.img_fw.img;
        assert!((fw[[0, 0]] - 13.0).abs() < 1e-4);
        assert!((fw[[1, 2]] - 12.0).abs() < 1e-4);
        // Backward flipped along both axes
        let bw = &scan.img_bw.as_ref().unwrap().img;
        assert!((bw[[0, 0]] - 25.0).abs() < 1e-4);
        assert!((bw[[1, 2]] - 20.0).abs() < 1e-4);
    }

    #[test]
    fn test_truncated_data() {
        let mut bytes = sxm_bytes();
        bytes.truncate(bytes.len() - 30);
        let info = Fileinfo::new(Path::new("cut.sxm")).unwrap();
        assert!(matches!(
            StmSxm::parse(&bytes, info),
            Err(SxmError::Truncated { .. })
        ));
    }
}
