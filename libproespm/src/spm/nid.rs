//! Nanosurf `.nid` files.
//!
//! The text part is a list of `[Section]` blocks separated by blank lines (`\r\n\r\n`).
//! The first block lists the channels (`...Ch<n>=<section>`), `[DataSet-Info]` holds the
//! scan parameters and every channel section has its geometry. The binary channel data
//! fills the end of the file: `xres * yres` little endian integers of `SaveBits` width
//! per channel, channels back to back in listing order.

use std::path::Path;
use std::sync::LazyLock;

use byteorder::{ByteOrder, LittleEndian};
use fxhash::FxHashMap;
use regex::Regex;

use crate::config::Config;
use crate::constants::{METERS_TO_NM, MICROMETERS_TO_NM, NID_BLOCK_SEPARATOR, NID_LINE_SEPARATOR};
use crate::error::{NidError, RenderError};
use crate::fileinfo::Fileinfo;
use crate::measurement::{Record, RecordInfo};
use crate::render::PlotRenderer;
use crate::spm_image::SpmImage;
use crate::timestamp::parse_date_and_time;

static FLOAT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?([0-9]*[.])?[0-9]+([eE][+-]?[0-9]+)?").unwrap());
static UNITS_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[a-zA-Zµ°%]+").unwrap());

const TOPOGRAPHY_NAMES: [&str; 2] = ["Z-Axis", "Topography"];
const FRAME_FORWARD: &str = "Scan forward";
const FRAME_BACKWARD: &str = "Scan backward";

type Section = FxHashMap<String, String>;

/// A number with its unit, e.g. `5µm`
#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    pub value: f64,
    pub unit: String,
}

impl Quantity {
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let number = FLOAT_REGEX.find(text)?;
        let value = number.as_str().parse().ok()?;
        let unit = UNITS_REGEX
            .find(&text[number.end()..])
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        Some(Self { value, unit })
    }

    /// Lengths in µm are converted to nm
    pub fn nanometers(&self) -> f64 {
        if self.unit == "µm" || self.unit == "um" {
            self.value * MICROMETERS_TO_NM
        } else {
            self.value
        }
    }
}

fn parse_section(block: &str) -> Section {
    block
        .split(NID_LINE_SEPARATOR)
        .skip(1)
        .filter(|line| !line.starts_with('-'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

fn get<'a>(section: &'a Section, key: &str) -> Result<&'a str, NidError> {
    section
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| NidError::MissingKey(key.to_string()))
}

fn quantity(section: &Section, key: &str) -> Result<Quantity, NidError> {
    let text = get(section, key)?;
    Quantity::parse(text).ok_or_else(|| NidError::BadValue {
        key: key.to_string(),
        value: text.to_string(),
    })
}

/// Geometry and calibration of one channel section
#[derive(Debug, Clone, PartialEq)]
pub struct NidChannel {
    pub frame: String,
    pub dim2_name: String,
    pub points: usize,
    pub lines: usize,
    pub save_bits: usize,
    pub dim2_min: Option<f64>,
    pub dim2_range: Option<f64>,
    pub dim2_unit: String,
}

impl NidChannel {
    fn from_section(section: &Section) -> Result<Self, NidError> {
        let int = |key: &str| -> Result<usize, NidError> {
            let text = get(section, key)?;
            text.parse().map_err(|_| NidError::BadValue {
                key: key.to_string(),
                value: text.to_string(),
            })
        };
        let float = |key: &str| section.get(key).and_then(|v| v.parse::<f64>().ok());
        Ok(Self {
            frame: get(section, "Frame").unwrap_or_default().to_string(),
            dim2_name: get(section, "Dim2Name").unwrap_or_default().to_string(),
            points: int("Points")?,
            lines: int("Lines")?,
            save_bits: int("SaveBits")?,
            dim2_min: float("Dim2Min"),
            dim2_range: float("Dim2Range"),
            dim2_unit: section.get("Dim2Unit").cloned().unwrap_or_default(),
        })
    }

    fn is_topography(&self) -> bool {
        TOPOGRAPHY_NAMES.contains(&self.dim2_name.as_str())
    }

    /// Raw integer to physical value. Without calibration keys the raw value is kept.
    fn scale(&self, raw: f64) -> f64 {
        match (self.dim2_min, self.dim2_range) {
            (Some(min), Some(range)) => {
                let full = 2f64.powi(self.save_bits as i32);
                let value = min + (raw + full / 2.0) / full * range;
                if self.dim2_unit == "m" {
                    value * METERS_TO_NM
                } else {
                    value
                }
            }
            _ => raw,
        }
    }
}

/// Extra parameters present for force microscopy modes
#[derive(Debug, Clone, PartialEq)]
pub struct ForceSettings {
    pub cantilever: String,
    pub amp_ctrl_mode: String,
    pub excitation_amp: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpmNid {
    pub info: RecordInfo,
    pub op_mode: String,
    pub force: Option<ForceSettings>,
    /// nm
    pub xsize: f64,
    pub ysize: f64,
    pub xoffset: f64,
    pub yoffset: f64,
    pub scan_dir_up_down: String,
    /// deg
    pub rotation: f64,
    /// ms
    pub line_time: f64,
    /// s
    pub scan_duration: f64,
    /// V
    pub bias: f64,
    /// Tunnelling current, or force setpoint in % for AFM modes
    pub current: f64,
    pub p_gain: f64,
    pub i_gain: f64,
    pub xres: usize,
    pub yres: usize,
    pub img_fw: SpmImage,
    pub img_bw: Option<SpmImage>,
}

impl SpmNid {
    pub fn parse(content: &[u8], fileinfo: Fileinfo) -> Result<Self, NidError> {
        let blocks: Vec<String> = split_blocks(content)
            .into_iter()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect();
        let first = blocks.first().ok_or(NidError::NoDataSetInfo)?;

        let channel_names: Vec<String> = first
            .split(NID_LINE_SEPARATOR)
            .filter(|line| line.contains("Ch"))
            .filter_map(|line| line.split_once('=').map(|(_, v)| v.trim().to_string()))
            .collect();

        let meta = blocks
            .iter()
            .find(|b| b.starts_with("[DataSet-Info"))
            .map(|b| parse_section(b))
            .ok_or(NidError::NoDataSetInfo)?;

        // Channel sections appear in listing order
        let mut channels = vec![];
        let mut next = channel_names.iter();
        let mut wanted = next.next();
        for block in blocks.iter() {
            let Some(name) = wanted else { break };
            if block.starts_with(&format!("[{name}]")) {
                channels.push(NidChannel::from_section(&parse_section(block))?);
                wanted = next.next();
            }
        }
        let reference = channels.first().ok_or(NidError::MissingChannel("any"))?;
        let (xres, yres, save_bits) = (reference.points, reference.lines, reference.save_bits);
        if xres == 0 || yres == 0 {
            return Err(NidError::ChannelMismatch { points: xres, lines: yres });
        }
        for channel in channels.iter() {
            if channel.points != xres || channel.lines != yres || channel.save_bits != save_bits {
                return Err(NidError::ChannelMismatch {
                    points: channel.points,
                    lines: channel.lines,
                });
            }
        }
        if save_bits != 16 && save_bits != 32 {
            return Err(NidError::BadSaveBits(save_bits));
        }

        let sizes = xres
            .checked_mul(yres)
            .and_then(|pixels| pixels.checked_mul(save_bits / 8))
            .and_then(|bytes| bytes.checked_mul(channels.len()).map(|needed| (bytes, needed)));
        let Some((bytes_per_channel, needed)) = sizes else {
            return Err(NidError::Truncated {
                needed: usize::MAX,
                available: content.len(),
            });
        };
        if needed > content.len() {
            return Err(NidError::Truncated {
                needed,
                available: content.len(),
            });
        }
        let data = &content[content.len() - needed..];

        let op_mode = get(&meta, "Op. mode")?.to_string();
        let force = if op_mode == "Dynamic Force" || op_mode == "Static Force" {
            Some(ForceSettings {
                cantilever: get(&meta, "Cantilever type")?.to_string(),
                amp_ctrl_mode: get(&meta, "Ampl. Ctrl. mode")?.to_string(),
                excitation_amp: quantity(&meta, "Excitation ampl.").ok().map(|q| q.value),
            })
        } else {
            None
        };

        let xsize = quantity(&meta, "Image size")?.nanometers();
        let line_time = quantity(&meta, "Time/Line")?.value;
        let lines = quantity(&meta, "Lines")?.value;

        let channel_image = |frame: &str| -> Result<Option<SpmImage>, NidError> {
            let Some(idx) = channels
                .iter()
                .position(|c| c.is_topography() && c.frame == frame)
            else {
                return Ok(None);
            };
            let chunk = &data[idx * bytes_per_channel..(idx + 1) * bytes_per_channel];
            let pixels: Vec<f64> = if save_bits == 16 {
                chunk
                    .chunks_exact(2)
                    .map(|c| channels[idx].scale(LittleEndian::read_i16(c) as f64))
                    .collect()
            } else {
                chunk
                    .chunks_exact(4)
                    .map(|c| channels[idx].scale(LittleEndian::read_i32(c) as f64))
                    .collect()
            };
            let mut img = SpmImage::from_vec(pixels, yres, xres, xsize)?;
            img.flip_vertical();
            Ok(Some(img))
        };
        let img_fw = channel_image(FRAME_FORWARD)?.ok_or(NidError::MissingChannel(FRAME_FORWARD))?;
        let img_bw = channel_image(FRAME_BACKWARD)?;

        let date = get(&meta, "Date")?;
        let time = get(&meta, "Time")?;
        let timestamp = parse_date_and_time(date, time)
            .ok_or_else(|| NidError::BadDate(format!("{date} {time}")))?;
        let id = fileinfo.filename.clone();

        Ok(Self {
            info: RecordInfo::new(fileinfo, id, timestamp),
            op_mode,
            force,
            xsize,
            ysize: xsize,
            xoffset: quantity(&meta, "X-Pos")?.nanometers(),
            yoffset: quantity(&meta, "Y-Pos")?.nanometers(),
            scan_dir_up_down: get(&meta, "Scan direction")?.to_string(),
            rotation: quantity(&meta, "Rotation")?.value,
            line_time,
            scan_duration: line_time * 2.0 * lines / 1000.0,
            bias: quantity(&meta, "Tip voltage")?.value,
            current: quantity(&meta, "Setpoint")?.value,
            p_gain: quantity(&meta, "P-Gain")?.value,
            i_gain: quantity(&meta, "I-Gain")?.value,
            xres,
            yres,
            img_fw,
            img_bw,
        })
    }

    pub fn read(path: &Path) -> Result<Self, NidError> {
        Self::parse(&std::fs::read(path)?, Fileinfo::new(path)?)
    }
}

fn split_blocks(content: &[u8]) -> Vec<&[u8]> {
    let mut blocks = vec![];
    let mut rest = content;
    while let Some(pos) = rest
        .windows(NID_BLOCK_SEPARATOR.len())
        .position(|w| w == NID_BLOCK_SEPARATOR)
    {
        blocks.push(&rest[..pos]);
        rest = &rest[pos + NID_BLOCK_SEPARATOR.len()..];
    }
    blocks.push(rest);
    blocks
}

impl Record for SpmNid {
    fn info(&self) -> &RecordInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut RecordInfo {
        &mut self.info
    }

    fn ident(&self) -> &'static str {
        "NID"
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

    pub(crate) fn nid_bytes(direction: &str, calibrated: bool) -> Vec<u8> {
        let calibration = if calibrated {
            "\r\nDim2Min=-1e-9\r\nDim2Range=2e-9\r\nDim2Unit=m"
        } else {
            ""
        };
        let text = format!(
            "[DataSet]\r\nVersion=2\r\nGr0-Ch0=DataSet-0:1\r\nGr0-Ch1=DataSet-0:2\r\nGr0-Ch2=DataSet-0:3\r\n\r\n\
             [DataSet-Info]\r\n-- Settings --\r\nOp. mode=STM\r\nImage size=0.02µm\r\n\
             Scan direction={direction}\r\nX-Pos=1.5µm\r\nY-Pos=-200nm\r\nRotation=15°\r\n\
             Time/Line=500ms\r\nLines=2\r\nDate=2021-03-14\r\nTime=09:26:53\r\nTip voltage=-0.6V\r\n\
             Setpoint=1.2nA\r\nP-Gain=1000\r\nI-Gain=1500\r\n\r\n\
             [DataSet-0:1]\r\nFrame=Scan forward\r\nPoints=3\r\nLines=2\r\nSaveBits=16\r\nDim2Name=Z-Axis{calibration}\r\n\r\n\
             [DataSet-0:2]\r\nFrame=Scan backward\r\nPoints=3\r\nLines=2\r\nSaveBits=16\r\nDim2Name=Z-Axis{calibration}\r\n\r\n\
             [DataSet-0:3]\r\nFrame=Scan forward\r\nPoints=3\r\nLines=2\r\nSaveBits=16\r\nDim2Name=Tip Current\r\n\r\n#!"
        );
        let mut out = text.into_bytes();
        for channel in 0..3i16 {
            for i in 0..6i16 {
                out.write_i16::<LittleEndian>(channel * 100 + i).unwrap();
            }
        }
        out
    }

    #[test]
    fn test_quantity() {
        let q = Quantity::parse("0.02µm").unwrap();
        assert_eq!(q.unit, "µm");
        assert!((q.nanometers() - 20.0).abs() < 1e-9);
        assert_eq!(Quantity::parse("-200nm").unwrap().nanometers(), -200.0);
        assert_eq!(Quantity::parse("1.5e3 V").unwrap().value, 1500.0);
        assert!(Quantity::parse("n/a").is_none());
    }

    #[test]
    fn test_decode_scan() {
        let info = Fileinfo::new(Path::new("afm.nid")).unwrap();
        let scan = SpmNid::parse(&nid_bytes("Up", false), info).unwrap();
        assert_eq!(scan.info.timestamp(), datetime!(2021-03-14 9:26:53));
        assert_eq!(scan.op_mode, "STM");
        assert!(scan.force.is_none());
        assert!((scan.xsize - 20.0).abs() < 1e-9);
        assert!((scan.xoffset - 1500.0).abs() < 1e-9);
        assert_eq!(scan.yoffset, -200.0);
        assert_eq!(scan.rotation, 15.0);
        assert_eq!(scan.line_time, 500.0);
        assert_eq!(scan.scan_duration, 2.0);
        assert_eq!(scan.bias, -0.6);
        assert_eq!(scan.current, 1.2);
        assert_eq!((scan.xres, scan.yres), (3, 2));

        // Raw values, rows flipped
        assert_eq!(scan.img_fw.img[[0, 0]], 3.0);
        assert_eq!(scan.img_bw.as_ref().unwrap().img[[1, 2]], 102.0);
    }

    #[test]
    fn test_flip_is_unconditional() {
        let up = SpmNid::parse(&nid_bytes("Up", false), Fileinfo::new(Path::new("a.nid")).unwrap())
            .unwrap();
        let down =
            SpmNid::parse(&nid_bytes("Down", false), Fileinfo::new(Path::new("b.nid")).unwrap())
                .unwrap();
        assert_eq!(up.img_fw.img, down.img_fw.img);
        assert_eq!(down.img_fw.img[[1, 0]], 0.0);
    }

    #[test]
    fn test_calibrated_heights() {
        let scan =
            SpmNid::parse(&nid_bytes("Up", true), Fileinfo::new(Path::new("c.nid")).unwrap()).unwrap();
        // -1 nm + (raw + 32768) / 65536 * 2 nm
        let expected = -1.0 + (3.0 + 32768.0) / 65536.0 * 2.0;
        assert!((scan.img_fw.img[[0, 0]] - expected).abs() < 1e-9);
    }

    #[test]
    fn test_truncated() {
        let mut bytes = nid_bytes("Up", false);
        bytes.truncate(20);
        assert!(SpmNid::parse(&bytes, Fileinfo::new(Path::new("d.nid")).unwrap()).is_err());
    }

    #[test]
    fn test_oversized_header() {
        let bytes = nid_bytes("Up", false);
        let split = bytes.windows(2).position(|w| w == b"#!").unwrap();
        let header = String::from_utf8(bytes[..split].to_vec())
            .unwrap()
            .replace("Points=3", &format!("Points={}", usize::MAX / 2));
        let mut corrupt = header.into_bytes();
        corrupt.extend_from_slice(&bytes[split..]);
        assert!(matches!(
            SpmNid::parse(&corrupt, Fileinfo::new(Path::new("e.nid")).unwrap()),
            Err(NidError::Truncated { needed: usize::MAX, .. })
        ));
    }
}
