//! RHK `.sm4` files.
//!
//! Layout (all little endian):
//!
//! ```text
//! header_size:u16  signature:utf16[18]  page_count:i32  object_count:i32
//! object_field_size:i32  reserved:i32[2]  object[object_count]
//! object := id:i32 offset:i32 size:i32
//! ```
//!
//! Object 1 is the page index header (`page_count, object_count, reserved[2],
//! object*`) which points at object 2, the page index array. Each page index entry is
//! `guid[16] data_type:i32 source_type:i32 object_count:i32 minor_version:i32 object*`
//! and references the page header (object 3) and the page data (object 4).
//!
//! A page header starts with `field_size:u16 string_count:u16`, the fixed fields read
//! by [`PageHeader::read`], its own object list at `field_size` and then
//! `string_count` strings of `n:u16 utf16[n]`.

use std::io::{Cursor, Seek, SeekFrom};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use ndarray::{Array2, Axis};
use time::{Date, Month, PrimitiveDateTime, Time};

use crate::config::Config;
use crate::constants::{
    AMPERE_TO_NA, METERS_TO_NM, SECONDS_TO_MS, SM4_PAGE_DATA_IMAGE, SM4_PAGE_TYPE_TOPOGRAPHIC,
    SM4_PLAIN_PAGE_COUNT, SM4_SCAN_LEFT, SM4_SCAN_RIGHT, SM4_SIGNATURE, SM4_SIGNATURE_CHARS,
};
use crate::error::{RenderError, Sm4Error};
use crate::fileinfo::Fileinfo;
use crate::measurement::{Record, RecordInfo};
use crate::plot::SeriesPlot;
use crate::render::PlotRenderer;
use crate::spm_image::SpmImage;
use crate::timestamp::file_mtime;

const OBJECT_PAGE_INDEX_HEADER: i32 = 1;
const OBJECT_PAGE_INDEX_ARRAY: i32 = 2;
const OBJECT_PAGE_HEADER: i32 = 3;
const OBJECT_PAGE_DATA: i32 = 4;

const STRING_LABEL: usize = 0;
const STRING_DATE: usize = 5;
const STRING_TIME: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Object {
    id: i32,
    offset: u64,
    size: u64,
}

fn read_objects(cursor: &mut Cursor<&[u8]>, count: i32) -> Result<Vec<Object>, Sm4Error> {
    (0..count.max(0))
        .map(|_| {
            Ok(Object {
                id: cursor.read_i32::<LittleEndian>()?,
                offset: cursor.read_i32::<LittleEndian>()?.max(0) as u64,
                size: cursor.read_i32::<LittleEndian>()?.max(0) as u64,
            })
        })
        .collect()
}

fn find_object(objects: &[Object], id: i32, name: &'static str) -> Result<Object, Sm4Error> {
    objects
        .iter()
        .find(|obj| obj.id == id)
        .copied()
        .ok_or(Sm4Error::MissingObject(name))
}

fn read_utf16(cursor: &mut Cursor<&[u8]>, len: usize) -> Result<String, Sm4Error> {
    let mut units = vec![0u16; len];
    cursor.read_u16_into::<LittleEndian>(&mut units)?;
    String::from_utf16(&units).map_err(|_| Sm4Error::BadString(cursor.position()))
}

/// Fixed part of a page header
#[derive(Debug, Clone, PartialEq)]
pub struct PageHeader {
    pub page_type: i32,
    pub xres: usize,
    pub yres: usize,
    pub scan_dir: i32,
    pub data_size: i32,
    pub x_scale: f64,
    pub y_scale: f64,
    pub z_scale: f64,
    pub x_offset: f64,
    pub y_offset: f64,
    pub z_offset: f64,
    pub period: f64,
    pub bias: f64,
    pub current: f64,
    pub angle: f64,
    pub strings: Vec<String>,
}

impl PageHeader {
    fn read(cursor: &mut Cursor<&[u8]>, start: u64) -> Result<Self, Sm4Error> {
        cursor.seek(SeekFrom::Start(start))?;
        let field_size = cursor.read_u16::<LittleEndian>()? as u64;
        let string_count = cursor.read_u16::<LittleEndian>()? as usize;

        let mut ints = [0i32; 13];
        cursor.read_i32_into::<LittleEndian>(&mut ints)?;
        let mut floats = [0f32; 11];
        cursor.read_f32_into::<LittleEndian>(&mut floats)?;
        let mut tail = [0i32; 4];
        cursor.read_i32_into::<LittleEndian>(&mut tail)?;

        // ints: page_type, data_sub_source, line_type, x_corner, y_corner, xres, yres,
        // image_type, scan_dir, group_id, data_size, min_z, max_z
        let xres = ints[5];
        let yres = ints[6];
        if xres <= 0 || yres <= 0 {
            return Err(Sm4Error::BadResolution(xres, yres));
        }

        cursor.seek(SeekFrom::Start(start + field_size))?;
        let _objects = read_objects(cursor, tail[3])?;
        let strings = (0..string_count)
            .map(|_| {
                let len = cursor.read_u16::<LittleEndian>()? as usize;
                read_utf16(cursor, len)
            })
            .collect::<Result<Vec<String>, Sm4Error>>()?;

        Ok(Self {
            page_type: ints[0],
            xres: xres as usize,
            yres: yres as usize,
            scan_dir: ints[8],
            data_size: ints[10],
            x_scale: floats[0] as f64,
            y_scale: floats[1] as f64,
            z_scale: floats[2] as f64,
            x_offset: floats[4] as f64,
            y_offset: floats[5] as f64,
            z_offset: floats[6] as f64,
            period: floats[7] as f64,
            bias: floats[8] as f64,
            current: floats[9] as f64,
            angle: floats[10] as f64,
            strings,
        })
    }

    fn string(&self, idx: usize) -> &str {
        self.strings.get(idx).map(String::as_str).unwrap_or("")
    }

    pub fn label(&self) -> &str {
        self.string(STRING_LABEL)
    }

    /// Header date is `MM/DD/YY`, time `HH:MM:SS`
    pub fn timestamp(&self) -> Option<PrimitiveDateTime> {
        let date: Vec<u16> = self
            .string(STRING_DATE)
            .split('/')
            .map(|p| p.trim().parse().ok())
            .collect::<Option<Vec<u16>>>()?;
        let time: Vec<u8> = self
            .string(STRING_TIME)
            .split(':')
            .map(|p| p.trim().parse().ok())
            .collect::<Option<Vec<u8>>>()?;
        let (&[month, day, year], &[hour, minute, second]) = (date.as_slice(), time.as_slice())
        else {
            return None;
        };
        let year = if year < 100 { 2000 + year as i32 } else { year as i32 };
        let date = Date::from_calendar_date(year, Month::try_from(month as u8).ok()?, day as u8).ok()?;
        Some(PrimitiveDateTime::new(date, Time::from_hms(hour, minute, second).ok()?))
    }
}

/// One page (channel) of an SM4 file with its data in physical units
#[derive(Debug, Clone, PartialEq)]
pub struct Sm4Page {
    pub data_type: i32,
    pub header: PageHeader,
    pub data: Array2<f64>,
}

impl Sm4Page {
    pub fn is_topography(&self) -> bool {
        self.data_type == SM4_PAGE_DATA_IMAGE && self.header.page_type == SM4_PAGE_TYPE_TOPOGRAPHIC
    }
}

pub fn parse_pages(buffer: &[u8]) -> Result<Vec<Sm4Page>, Sm4Error> {
    let mut cursor = Cursor::new(buffer);
    let _header_size = cursor.read_u16::<LittleEndian>()?;
    let signature = read_utf16(&mut cursor, SM4_SIGNATURE_CHARS)?;
    let signature = signature.trim_end_matches(['\0', ' ']).to_string();
    if signature != SM4_SIGNATURE {
        return Err(Sm4Error::BadSignature(signature));
    }
    let _page_count = cursor.read_i32::<LittleEndian>()?;
    let object_count = cursor.read_i32::<LittleEndian>()?;
    let _field_size = cursor.read_i32::<LittleEndian>()?;
    cursor.seek(SeekFrom::Current(8))?;
    let objects = read_objects(&mut cursor, object_count)?;

    let index_header = find_object(&objects, OBJECT_PAGE_INDEX_HEADER, "page index header")?;
    cursor.seek(SeekFrom::Start(index_header.offset))?;
    let page_count = cursor.read_i32::<LittleEndian>()?;
    let index_objects = cursor.read_i32::<LittleEndian>()?;
    cursor.seek(SeekFrom::Current(8))?;
    let index_objects = read_objects(&mut cursor, index_objects)?;
    let index_array = find_object(&index_objects, OBJECT_PAGE_INDEX_ARRAY, "page index array")?;

    cursor.seek(SeekFrom::Start(index_array.offset))?;
    let mut entries = vec![];
    for _ in 0..page_count.max(0) {
        cursor.seek(SeekFrom::Current(16))?;
        let data_type = cursor.read_i32::<LittleEndian>()?;
        let _source_type = cursor.read_i32::<LittleEndian>()?;
        let count = cursor.read_i32::<LittleEndian>()?;
        let _minor_version = cursor.read_i32::<LittleEndian>()?;
        entries.push((data_type, read_objects(&mut cursor, count)?));
    }

    let mut pages = Vec::with_capacity(entries.len());
    for (data_type, page_objects) in entries {
        let header_obj = find_object(&page_objects, OBJECT_PAGE_HEADER, "page header")?;
        let data_obj = find_object(&page_objects, OBJECT_PAGE_DATA, "page data")?;
        let header = PageHeader::read(&mut cursor, header_obj.offset)?;

        let points = header.xres * header.yres;
        if data_obj.size < (points * 4) as u64 {
            return Err(Sm4Error::BadObject {
                id: OBJECT_PAGE_DATA,
                offset: data_obj.offset,
            });
        }
        cursor.seek(SeekFrom::Start(data_obj.offset))?;
        let mut raw = vec![0i32; points];
        cursor.read_i32_into::<LittleEndian>(&mut raw)?;
        let values: Vec<f64> = raw
            .iter()
            .map(|v| *v as f64 * header.z_scale + header.z_offset)
            .collect();
        let data = Array2::from_shape_vec((header.yres, header.xres), values)?;
        pages.push(Sm4Page {
            data_type,
            header,
            data,
        });
    }
    Ok(pages)
}

/// Line averaged electrochemistry channels of an EC-STM scan
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EcTraces {
    /// Working electrode potential, V
    pub e_cell: Option<Vec<f64>>,
    /// Tunnelling voltage, V
    pub u_tun: Option<Vec<f64>>,
    /// Cell current
    pub i_cell: Option<Vec<f64>>,
}

fn first_labelled<'a>(pages: &'a [Sm4Page], labels: &[&str]) -> Option<&'a Sm4Page> {
    pages
        .iter()
        .find(|page| labels.iter().any(|l| page.header.label().contains(l)))
}

fn average(data: &Array2<f64>, axis: usize) -> Option<Vec<f64>> {
    data.mean_axis(Axis(axis)).map(|avg| avg.to_vec())
}

impl EcTraces {
    fn from_pages(pages: &[Sm4Page]) -> Self {
        Self {
            e_cell: first_labelled(pages, &["VEC", "E_WE"]).and_then(|p| average(&p.data, 0)),
            u_tun: first_labelled(pages, &["U_Tun", "Utun"]).and_then(|p| average(&p.data, 0)),
            i_cell: first_labelled(pages, &["I_WE", "IEC"]).and_then(|p| average(&p.data, 1)),
        }
    }

    pub fn plots(&self) -> Vec<SeriesPlot> {
        let pixels = |n: usize| (1..=n).map(|i| i as f64).collect::<Vec<f64>>();
        let mut plots = vec![];
        if let Some(e_cell) = &self.e_cell {
            let mut plot = SeriesPlot::new("y pixel", "U line-averaged");
            plot.push("E_WE [V]", pixels(e_cell.len()), e_cell.clone());
            if let Some(u_tun) = &self.u_tun {
                plot.push("U_b [V]", pixels(u_tun.len()), u_tun.clone());
            }
            plots.push(plot);
        }
        if let Some(i_cell) = &self.i_cell {
            let mut plot = SeriesPlot::new("y pixel", "I_WE line-averaged [V]");
            plot.push("I_WE", pixels(i_cell.len()), i_cell.clone());
            plots.push(plot);
        }
        plots
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StmSm4 {
    pub info: RecordInfo,
    /// nA
    pub current: f64,
    /// V
    pub bias: f64,
    /// nm
    pub xoffset: f64,
    pub yoffset: f64,
    pub xres: usize,
    pub yres: usize,
    /// deg
    pub tilt: f64,
    /// nm
    pub xsize: f64,
    pub ysize: f64,
    /// Frame time, s
    pub speed: f64,
    /// ms
    pub line_time: f64,
    pub img_fw: SpmImage,
    pub img_bw: Option<SpmImage>,
    pub ec: Option<EcTraces>,
    pub ec_plots: Vec<SeriesPlot>,
}

impl StmSm4 {
    pub fn from_pages(
        fileinfo: Fileinfo,
        pages: &[Sm4Page],
        fallback: PrimitiveDateTime,
    ) -> Result<Self, Sm4Error> {
        let topography = |dir: i32| {
            pages
                .iter()
                .find(|page| page.is_topography() && page.header.scan_dir == dir)
        };
        let fw = topography(SM4_SCAN_RIGHT)
            .ok_or_else(|| Sm4Error::NoForward(fileinfo.filepath.clone()))?;
        let head = &fw.header;

        let xsize = head.x_scale.abs() * head.xres as f64 * METERS_TO_NM;
        let img_fw = SpmImage::new(fw.data.mapv(|v| v * METERS_TO_NM), xsize)?;
        let img_bw = topography(SM4_SCAN_LEFT)
            .map(|bw| SpmImage::new(bw.data.mapv(|v| v * METERS_TO_NM), xsize))
            .transpose()?;

        let ec = (pages.len() > SM4_PLAIN_PAGE_COUNT).then(|| EcTraces::from_pages(pages));
        let id = fileinfo.filename.clone();

        Ok(Self {
            info: RecordInfo::new(fileinfo, id, head.timestamp().unwrap_or(fallback)),
            current: head.current * AMPERE_TO_NA,
            bias: head.bias,
            xoffset: head.x_offset * METERS_TO_NM,
            yoffset: head.y_offset * METERS_TO_NM,
            xres: head.xres,
            yres: head.yres,
            tilt: head.angle,
            xsize,
            ysize: head.y_scale.abs() * head.yres as f64 * METERS_TO_NM,
            speed: head.period * (head.xres * head.yres) as f64,
            line_time: head.period * head.xres as f64 * SECONDS_TO_MS,
            img_fw,
            img_bw,
            ec,
            ec_plots: vec![],
        })
    }

    pub fn read(path: &Path) -> Result<Self, Sm4Error> {
        let fileinfo = Fileinfo::new(path)?;
        let pages = parse_pages(&std::fs::read(path)?)?;
        Self::from_pages(fileinfo, &pages, file_mtime(path)?)
    }
}

impl Record for StmSm4 {
    fn info(&self) -> &RecordInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut RecordInfo {
        &mut self.info
    }

    fn ident(&self) -> &'static str {
        "SM4"
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
        if let Some(ec) = &self.ec {
            self.ec_plots = ec.plots();
        }
        Ok(())
    }
}
