//! Omicron MATRIX `.Z_mtrx` topography files.
//!
//! A scan is split over two files. The data file holds the raw samples; the session
//! parameter file `<prefix>_0001.mtrx` (prefix is the data file name up to `--`) holds
//! the experiment parameters as they were when the scan was taken.
//!
//! Both files share one container layout:
//!
//! ```text
//! file   := "ONTMATRX0101" block*
//! block  := ident[4] (ASCII, stored reversed) len:u32 content[len]
//! string := n:u32 utf16le[n]
//! value  := type:u32 payload    1 u32 | 2 i32 | 3 f64 | 4 string
//! ```
//!
//! Parameter file blocks: `EEPA` (initial values, `count:u32` elements of
//! `name, nparams:u32, (param, unit, value)*`), `PMOD` (`stamp:u64, element, param,
//! unit, value`) and `BREF` (`filename`, a data file written at this point of the
//! session). Data file: `BKLT` (`stamp:u64` then nested blocks), `DESC`
//! (`intended:u32, captured:u32`) and `DATA` (`i32` samples).

use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt};
use fxhash::FxHashMap;
use time::{OffsetDateTime, PrimitiveDateTime};

use crate::config::Config;
use crate::constants::{AMPERE_TO_NA, MATRIX_MAGIC, METERS_TO_NM, SECONDS_TO_MS, VOLT_TO_MV};
use crate::error::{MatrixError, RenderError};
use crate::fileinfo::Fileinfo;
use crate::measurement::{Record, RecordInfo};
use crate::render::PlotRenderer;
use crate::spm_image::SpmImage;
use crate::timestamp::file_mtime;

const CURRENT_KEY: &str = "Regulator.Setpoint_1";
const BIAS_KEY: &str = "GapVoltageControl.Voltage";
const RASTER_TIME_KEY: &str = "XYScanner.Raster_Time";
const POINTS_KEY: &str = "XYScanner.Points";
const LINES_KEY: &str = "XYScanner.Lines";
const WIDTH_KEY: &str = "XYScanner.Width";
const HEIGHT_KEY: &str = "XYScanner.Height";
const X_OFFSET_KEY: &str = "XYScanner.X_Offset";
const Y_OFFSET_KEY: &str = "XYScanner.Y_Offset";
const ANGLE_KEY: &str = "XYScanner.Angle";
const RETRACE_KEY: &str = "XYScanner.Retrace";
const Z_FACTOR_KEY: &str = "Z_Transfer.Factor";
const Z_OFFSET_KEY: &str = "Z_Transfer.Offset";

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    UInt(u32),
    Int(i32),
    Float(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::UInt(v) => Some(*v as f64),
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

pub type Parameters = FxHashMap<String, ParamValue>;

fn read_ident(cursor: &mut Cursor<&[u8]>) -> Result<String, MatrixError> {
    let mut raw = [0u8; 4];
    cursor.read_exact(&mut raw)?;
    raw.reverse();
    Ok(raw.iter().map(|b| *b as char).collect())
}

fn read_string(cursor: &mut Cursor<&[u8]>) -> Result<String, MatrixError> {
    let len = cursor.read_u32::<LittleEndian>()? as usize;
    let mut units = vec![0u16; len];
    cursor.read_u16_into::<LittleEndian>(&mut units)?;
    String::from_utf16(&units).map_err(|_| MatrixError::BadString(cursor.position()))
}

fn read_value(cursor: &mut Cursor<&[u8]>) -> Result<ParamValue, MatrixError> {
    match cursor.read_u32::<LittleEndian>()? {
        1 => Ok(ParamValue::UInt(cursor.read_u32::<LittleEndian>()?)),
        2 => Ok(ParamValue::Int(cursor.read_i32::<LittleEndian>()?)),
        3 => Ok(ParamValue::Float(cursor.read_f64::<LittleEndian>()?)),
        4 => Ok(ParamValue::Text(read_string(cursor)?)),
        other => Err(MatrixError::UnknownValueType(other)),
    }
}

fn check_magic(cursor: &mut Cursor<&[u8]>, path: &Path) -> Result<(), MatrixError> {
    let mut magic = [0u8; 12];
    cursor.read_exact(&mut magic)?;
    if &magic != MATRIX_MAGIC {
        return Err(MatrixError::BadMagic(path.to_path_buf()));
    }
    Ok(())
}

/// Walk the parameter file and return the parameter set valid for `data_file`
pub fn parse_parameters(
    buffer: &[u8],
    path: &Path,
    data_file: &str,
) -> Result<Parameters, MatrixError> {
    let mut cursor = Cursor::new(buffer);
    check_magic(&mut cursor, path)?;

    let mut params = Parameters::default();
    let end = buffer.len() as u64;
    while cursor.position() < end {
        let ident = read_ident(&mut cursor)?;
        let len = cursor.read_u32::<LittleEndian>()? as u64;
        let next = cursor.position() + len;
        match ident.as_str() {
            "EEPA" => {
                let elements = cursor.read_u32::<LittleEndian>()?;
                for _ in 0..elements {
                    let element = read_string(&mut cursor)?;
                    let count = cursor.read_u32::<LittleEndian>()?;
                    for _ in 0..count {
                        let name = read_string(&mut cursor)?;
                        let _unit = read_string(&mut cursor)?;
                        let value = read_value(&mut cursor)?;
                        params.insert(format!("{element}.{name}"), value);
                    }
                }
            }
            "PMOD" => {
                let _stamp = cursor.read_u64::<LittleEndian>()?;
                let element = read_string(&mut cursor)?;
                let name = read_string(&mut cursor)?;
                let _unit = read_string(&mut cursor)?;
                let value = read_value(&mut cursor)?;
                params.insert(format!("{element}.{name}"), value);
            }
            "BREF" => {
                let file = read_string(&mut cursor)?;
                if file == data_file {
                    return Ok(params);
                }
            }
            _ => {}
        }
        if cursor.position() > next {
            return Err(MatrixError::BadBlock { ident, offset: next });
        }
        cursor.seek(SeekFrom::Start(next))?;
    }
    // Data file never referenced: the final parameter state is the best estimate
    spdlog::warn!("No bricklet reference to {} in {:?}", data_file, path);
    Ok(params)
}

/// Raw content of a data file
#[derive(Debug, Clone, PartialEq)]
pub struct Bricklet {
    pub stamp: u64,
    pub intended: u32,
    pub data: Vec<i32>,
}

fn parse_blocks(
    cursor: &mut Cursor<&[u8]>,
    end: u64,
    bricklet: &mut Bricklet,
) -> Result<(), MatrixError> {
    while cursor.position() < end {
        let ident = read_ident(cursor)?;
        let len = cursor.read_u32::<LittleEndian>()? as u64;
        let next = cursor.position() + len;
        if next > end {
            return Err(MatrixError::BadBlock { ident, offset: cursor.position() });
        }
        match ident.as_str() {
            "BKLT" => {
                bricklet.stamp = cursor.read_u64::<LittleEndian>()?;
                parse_blocks(cursor, next, bricklet)?;
            }
            "DESC" => {
                bricklet.intended = cursor.read_u32::<LittleEndian>()?;
                let captured = cursor.read_u32::<LittleEndian>()?;
                bricklet.data.reserve(captured as usize);
            }
            "DATA" => {
                let mut data = vec![0i32; (len / 4) as usize];
                cursor.read_i32_into::<LittleEndian>(&mut data)?;
                bricklet.data = data;
            }
            _ => {}
        }
        cursor.seek(SeekFrom::Start(next))?;
    }
    Ok(())
}

pub fn parse_bricklet(buffer: &[u8], path: &Path) -> Result<Bricklet, MatrixError> {
    let mut cursor = Cursor::new(buffer);
    check_magic(&mut cursor, path)?;
    let mut bricklet = Bricklet {
        stamp: 0,
        intended: 0,
        data: vec![],
    };
    parse_blocks(&mut cursor, buffer.len() as u64, &mut bricklet)?;
    Ok(bricklet)
}

/// Session parameter file belonging to a data file
pub fn parameter_file(data_path: &Path) -> Result<PathBuf, MatrixError> {
    let stem = data_path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| MatrixError::MissingParameterFile(data_path.to_path_buf()))?;
    let prefix = stem.split("--").next().unwrap_or(stem);
    Ok(data_path.with_file_name(format!("{prefix}_0001.mtrx")))
}

#[derive(Debug, Clone, PartialEq)]
pub struct StmMatrix {
    pub info: RecordInfo,
    pub xres: usize,
    pub yres: usize,
    /// nm
    pub xsize: f64,
    pub ysize: f64,
    pub xoffset: f64,
    pub yoffset: f64,
    /// deg
    pub rotation: f64,
    /// nA
    pub current: f64,
    /// mV
    pub bias: f64,
    /// s per pixel
    pub raster_time: f64,
    /// ms
    pub line_time: f64,
    /// s
    pub scan_duration: f64,
    pub img_fw: SpmImage,
    pub img_bw: Option<SpmImage>,
}

fn required(params: &Parameters, key: &str) -> Result<f64, MatrixError> {
    params
        .get(key)
        .and_then(ParamValue::as_f64)
        .ok_or_else(|| MatrixError::MissingParameter(key.to_string()))
}

fn optional(params: &Parameters, key: &str, default: f64) -> f64 {
    params.get(key).and_then(ParamValue::as_f64).unwrap_or(default)
}

impl StmMatrix {
    pub fn from_parts(
        fileinfo: Fileinfo,
        params: &Parameters,
        bricklet: &Bricklet,
        fallback: PrimitiveDateTime,
    ) -> Result<Self, MatrixError> {
        if bricklet.data.is_empty() {
            return Err(MatrixError::NoTraces(fileinfo.filename.clone()));
        }

        let xres = required(params, POINTS_KEY)? as usize;
        let yres = required(params, LINES_KEY)? as usize;
        if xres == 0 || yres == 0 {
            return Err(MatrixError::MissingParameter(POINTS_KEY.to_string()));
        }
        let retrace = optional(params, RETRACE_KEY, 1.0) != 0.0;
        let xsize = required(params, WIDTH_KEY)? * METERS_TO_NM;
        let ysize = required(params, HEIGHT_KEY)? * METERS_TO_NM;
        let raster_time = required(params, RASTER_TIME_KEY)?;
        let line_time = raster_time * xres as f64 * SECONDS_TO_MS;

        let (factor, offset) = match (params.get(Z_FACTOR_KEY), params.get(Z_OFFSET_KEY)) {
            (Some(f), Some(o)) => (f.as_f64().unwrap_or(1.0), o.as_f64().unwrap_or(0.0)),
            _ => {
                spdlog::warn!(
                    "{} has no Z transfer function, using raw values",
                    fileinfo.basename
                );
                (1.0, 0.0)
            }
        };
        let factor = if factor == 0.0 { 1.0 } else { factor };

        // One line holds the trace, then the retrace running back
        let per_line = if retrace { 2 * xres } else { xres };
        let sample = |idx: usize| -> f64 {
            let raw = bricklet.data.get(idx).copied().unwrap_or(0);
            (raw as f64 - offset) / factor * METERS_TO_NM
        };
        let mut forward = Vec::with_capacity(xres * yres);
        let mut backward = Vec::with_capacity(if retrace { xres * yres } else { 0 });
        for line in 0..yres {
            let start = line * per_line;
            forward.extend((0..xres).map(|col| sample(start + col)));
            if retrace {
                backward.extend((0..xres).rev().map(|col| sample(start + xres + col)));
            }
        }
        if bricklet.data.len() < per_line * yres {
            spdlog::info!(
                "{}: scan incomplete, {} of {} points captured",
                fileinfo.basename,
                bricklet.data.len(),
                per_line * yres
            );
        }

        let mut img_fw = SpmImage::from_vec(forward, yres, xres, xsize)?;
        img_fw.flip_vertical();
        let img_bw = if retrace {
            let mut img = SpmImage::from_vec(backward, yres, xres, xsize)?;
            img.flip_vertical();
            Some(img)
        } else {
            None
        };

        let timestamp = OffsetDateTime::from_unix_timestamp(bricklet.stamp as i64)
            .ok()
            .filter(|_| bricklet.stamp > 0)
            .map(|utc| PrimitiveDateTime::new(utc.date(), utc.time()))
            .unwrap_or(fallback);
        let id = fileinfo.filename.clone();

        Ok(Self {
            info: RecordInfo::new(fileinfo, id, timestamp),
            xres,
            yres,
            xsize,
            ysize,
            xoffset: optional(params, X_OFFSET_KEY, 0.0) * METERS_TO_NM,
            yoffset: optional(params, Y_OFFSET_KEY, 0.0) * METERS_TO_NM,
            rotation: optional(params, ANGLE_KEY, 0.0),
            current: required(params, CURRENT_KEY)? * AMPERE_TO_NA,
            bias: required(params, BIAS_KEY)? * VOLT_TO_MV,
            raster_time,
            line_time,
            scan_duration: line_time * yres as f64 / SECONDS_TO_MS,
            img_fw,
            img_bw,
        })
    }

    pub fn read(path: &Path) -> Result<Self, MatrixError> {
        let fileinfo = Fileinfo::new(path)?;
        let bricklet = parse_bricklet(&std::fs::read(path)?, path)?;
        if bricklet.data.is_empty() {
            return Err(MatrixError::NoTraces(fileinfo.filename));
        }

        let param_path = parameter_file(path)?;
        if !param_path.exists() {
            return Err(MatrixError::MissingParameterFile(param_path));
        }
        let params = parse_parameters(&std::fs::read(&param_path)?, &param_path, &fileinfo.basename)?;
        Self::from_parts(fileinfo, &params, &bricklet, file_mtime(path)?)
    }
}

impl Record for StmMatrix {
    fn info(&self) -> &RecordInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut RecordInfo {
        &mut self.info
    }

    fn ident(&self) -> &'static str {
        "MTRX"
    }

    fn process(
        &mut self,
        config: &Config,
        renderer: &mut dyn PlotRenderer,
    ) -> Result<(), RenderError> {
        let id = self.info.id().to_string();
        self.img_fw
            .corr_plane()
            .corr_lines()
            .render(renderer, config, &format!("{id}_fw"))?;
        if let Some(img) = self.img_bw.as_mut() {
            img.corr_plane()
                .corr_lines()
                .render(renderer, config, &format!("{id}_bw"))?;
        }
        Ok(())
    }
}
