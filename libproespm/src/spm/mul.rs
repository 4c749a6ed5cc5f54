//! Aarhus STM `.mul` and `.flm` files.
//!
//! The file is a sequence of 128 byte blocks. An optional three block directory sits in
//! front when the second header word reads 3. Every frame starts with a 64 word `i16`
//! header (its `size` field counts the blocks taken by the whole frame), followed by the
//! `xres * yres` pixel words and any point scans.

use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use time::{Date, Month, PrimitiveDateTime, Time};

use super::read_latin1;
use crate::config::Config;
use crate::constants::{
    MUL_ANGSTROM_PER_NM, MUL_BIAS_DIVISOR, MUL_BLOCK_SIZE, MUL_DIRECTORY_BLOCKS,
    MUL_HEIGHT_DIVISOR, MUL_HEIGHT_FACTOR, MUL_PERCENT, MUL_POINTSCAN_HEADER_WORDS,
    SECONDS_TO_MS,
};
use crate::error::{MulError, RenderError};
use crate::fileinfo::Fileinfo;
use crate::measurement::{Record, RecordInfo};
use crate::render::PlotRenderer;
use crate::spm_image::SpmImage;
use crate::timestamp::file_mtime;

/// A point spectrum recorded inside a frame
#[derive(Debug, Clone, PartialEq)]
pub struct PointScan {
    pub kind: i16,
    pub time4scan: i16,
    pub minv: i16,
    pub maxv: i16,
    pub xpos: i16,
    pub ypos: i16,
    pub dz: i16,
    pub delay: i16,
    pub version: i16,
    pub indendelay: i16,
    pub xposend: i16,
    pub yposend: i16,
    pub vt_fw: i16,
    pub it_fw: i16,
    pub vt_bw: i16,
    pub it_bw: i16,
    pub lscan: i16,
    pub data: Vec<i16>,
}

/// One frame of a MUL or FLM file, already converted to physical units
#[derive(Debug, Clone, PartialEq)]
pub struct MulImage {
    pub info: RecordInfo,
    pub img_num: i16,
    /// Frame length in 128 byte blocks
    pub size: i16,
    pub xres: usize,
    pub yres: usize,
    pub zres: i16,
    /// nm
    pub xsize: f64,
    pub ysize: f64,
    pub xoffset: f64,
    pub yoffset: f64,
    pub zscale: i16,
    /// deg
    pub tilt: i16,
    /// Frame acquisition time in s
    pub speed: f64,
    /// ms
    pub line_time: f64,
    /// mV
    pub bias: f64,
    /// nA
    pub current: f64,
    pub sample: String,
    pub title: String,
    pub postpr: i16,
    pub postd1: i16,
    pub mode: i16,
    pub currfac: i16,
    pub unitnr: i16,
    pub version: i16,
    pub gain: i16,
    pub pointscans: Vec<PointScan>,
    pub img: SpmImage,
}

/// Frame metadata needed to assemble an FLM movie downstream
#[derive(Debug, Clone, PartialEq)]
pub struct MovieFrame {
    pub index: usize,
    /// Sum of the scan durations up to and including this frame, in s
    pub elapsed: f64,
    pub size_text: String,
}

/// One FLM frame. Frames are corrected but never rendered individually.
#[derive(Debug, Clone, PartialEq)]
pub struct FlmFrame {
    pub image: MulImage,
    pub movie: MovieFrame,
}

struct FrameHeader {
    img_num: i16,
    size: i16,
    xres: i16,
    yres: i16,
    zres: i16,
    date: [i16; 6],
    xsize: i16,
    ysize: i16,
    xoffset: i16,
    yoffset: i16,
    zscale: i16,
    tilt: i16,
    speed: i16,
    bias: i16,
    current: i16,
    sample: String,
    title: String,
    postpr: i16,
    postd1: i16,
    mode: i16,
    currfac: i16,
    num_pointscans: i16,
    unitnr: i16,
    version: i16,
    gain: i16,
}

impl FrameHeader {
    fn read(cursor: &mut Cursor<&[u8]>) -> Result<Self, MulError> {
        let mut words = [0i16; 20];
        cursor.read_i16_into::<LittleEndian>(&mut words)?;
        let sample = read_latin1(cursor, 21)?;
        let title = read_latin1(cursor, 21)?;
        let mut tail = [0i16; 7];
        cursor.read_i16_into::<LittleEndian>(&mut tail)?;
        let mut spare = [0i16; 12];
        cursor.read_i16_into::<LittleEndian>(&mut spare)?;
        let gain = cursor.read_i16::<LittleEndian>()?;
        let mut spare = [0i16; 3];
        cursor.read_i16_into::<LittleEndian>(&mut spare)?;

        Ok(Self {
            img_num: words[0],
            size: words[1],
            xres: words[2],
            yres: words[3],
            zres: words[4],
            date: [words[5], words[6], words[7], words[8], words[9], words[10]],
            xsize: words[11],
            ysize: words[12],
            xoffset: words[13],
            yoffset: words[14],
            zscale: words[15],
            tilt: words[16],
            speed: words[17],
            bias: words[18],
            current: words[19],
            sample,
            title,
            postpr: tail[0],
            postd1: tail[1],
            mode: tail[2],
            currfac: tail[3],
            num_pointscans: tail[4],
            unitnr: tail[5],
            version: tail[6],
            gain,
        })
    }

    fn timestamp(&self) -> Option<PrimitiveDateTime> {
        let [year, month, day, hour, minute, second] = self.date;
        let year = match year {
            0..=69 => year as i32 + 2000,
            70..=99 => year as i32 + 1900,
            _ => year as i32,
        };
        let month = Month::try_from(u8::try_from(month).ok()?).ok()?;
        let date = Date::from_calendar_date(year, month, u8::try_from(day).ok()?).ok()?;
        let time = Time::from_hms(
            u8::try_from(hour).ok()?,
            u8::try_from(minute).ok()?,
            u8::try_from(second).ok()?,
        )
        .ok()?;
        Some(PrimitiveDateTime::new(date, time))
    }
}

fn read_pointscan(cursor: &mut Cursor<&[u8]>) -> Result<PointScan, MulError> {
    let mut words = [0i16; MUL_POINTSCAN_HEADER_WORDS as usize];
    cursor.read_i16_into::<LittleEndian>(&mut words)?;
    cursor.seek(SeekFrom::Current(
        (MUL_BLOCK_SIZE - MUL_POINTSCAN_HEADER_WORDS * 2) as i64,
    ))?;
    let ps_size = words[0].max(0) as usize;
    let mut data = vec![0i16; ps_size];
    cursor.read_i16_into::<LittleEndian>(&mut data)?;
    Ok(PointScan {
        kind: words[1],
        time4scan: words[2],
        minv: words[3],
        maxv: words[4],
        xpos: words[5],
        ypos: words[6],
        dz: words[7],
        delay: words[8],
        version: words[9],
        indendelay: words[10],
        xposend: words[11],
        yposend: words[12],
        vt_fw: words[13],
        it_fw: words[14],
        vt_bw: words[15],
        it_bw: words[16],
        lscan: words[17],
        data,
    })
}

/// Decode every frame of a MUL/FLM buffer
pub fn parse_frames(
    buffer: &[u8],
    fileinfo: &Fileinfo,
    fallback: PrimitiveDateTime,
) -> Result<Vec<MulImage>, MulError> {
    let filesize = buffer.len() as u64;
    let mut cursor = Cursor::new(buffer);
    let _nr = cursor.read_i16::<LittleEndian>()?;
    let adr = cursor.read_i32::<LittleEndian>()?;

    let mut block_counter: u64 = 0;
    if adr == MUL_DIRECTORY_BLOCKS {
        block_counter += MUL_DIRECTORY_BLOCKS as u64;
    }

    let mut frames = vec![];
    while block_counter * MUL_BLOCK_SIZE < filesize {
        let offset = block_counter * MUL_BLOCK_SIZE;
        cursor.seek(SeekFrom::Start(offset))?;
        let header = FrameHeader::read(&mut cursor)?;

        if header.size <= 0 {
            return Err(MulError::BadFrameSize { offset, size: header.size });
        }
        if header.xres <= 0 || header.yres <= 0 {
            return Err(MulError::BadResolution(header.xres, header.yres));
        }
        let xres = header.xres as usize;
        let yres = header.yres as usize;

        let needed = (xres * yres * 2) as u64;
        let available = filesize.saturating_sub(cursor.position());
        if needed > available {
            return Err(MulError::Truncated { offset, needed, available });
        }
        let mut raw = vec![0i16; xres * yres];
        cursor.read_i16_into::<LittleEndian>(&mut raw)?;

        let height_scale = MUL_HEIGHT_FACTOR * header.zscale as f64 / MUL_HEIGHT_DIVISOR;
        let pixels: Vec<f64> = raw.iter().map(|v| *v as f64 * height_scale).collect();
        let xsize = header.xsize as f64 / MUL_ANGSTROM_PER_NM;
        let mut img = SpmImage::from_vec(pixels, yres, xres, xsize)?;
        // Scans start in the lower left corner
        img.flip_vertical();

        let pointscans = (0..header.num_pointscans.max(0))
            .map(|_| read_pointscan(&mut cursor))
            .collect::<Result<Vec<PointScan>, MulError>>()?;

        let speed = header.speed as f64 * MUL_PERCENT;
        let id = format!("{}_{}", fileinfo.filename, header.img_num);
        let timestamp = header.timestamp().unwrap_or(fallback);

        frames.push(MulImage {
            info: RecordInfo::new(fileinfo.clone(), id, timestamp),
            img_num: header.img_num,
            size: header.size,
            xres,
            yres,
            zres: header.zres,
            xsize,
            ysize: header.ysize as f64 / MUL_ANGSTROM_PER_NM,
            xoffset: header.xoffset as f64 / MUL_ANGSTROM_PER_NM,
            yoffset: header.yoffset as f64 / MUL_ANGSTROM_PER_NM,
            zscale: header.zscale,
            tilt: header.tilt,
            speed,
            line_time: speed / yres as f64 * SECONDS_TO_MS,
            bias: -(header.bias as f64) / MUL_BIAS_DIVISOR,
            current: header.current as f64 * header.currfac as f64 * MUL_PERCENT,
            sample: header.sample,
            title: header.title,
            postpr: header.postpr,
            postd1: header.postd1,
            mode: header.mode,
            currfac: header.currfac,
            unitnr: header.unitnr,
            version: header.version,
            gain: header.gain,
            pointscans,
            img,
        });

        block_counter += header.size as u64;
    }

    if frames.is_empty() {
        return Err(MulError::NoFrames(fileinfo.filepath.clone()));
    }
    Ok(frames)
}

/// Read all frames of a `.mul` file
pub fn read_mul(path: &Path) -> Result<Vec<MulImage>, MulError> {
    let fileinfo = Fileinfo::new(path)?;
    let mut buffer = vec![];
    std::fs::File::open(path)?.read_to_end(&mut buffer)?;
    parse_frames(&buffer, &fileinfo, file_mtime(path)?)
}

/// Read all frames of a `.flm` movie and attach the per-frame movie metadata
pub fn read_flm(path: &Path) -> Result<Vec<FlmFrame>, MulError> {
    let mut elapsed = 0.0;
    Ok(read_mul(path)?
        .into_iter()
        .enumerate()
        .map(|(index, image)| {
            elapsed += image.speed;
            let movie = MovieFrame {
                index,
                elapsed,
                size_text: format!("{:.0}nm x {:.0}nm", image.xsize, image.ysize),
            };
            FlmFrame { image, movie }
        })
        .collect())
}

impl Record for MulImage {
    fn info(&self) -> &RecordInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut RecordInfo {
        &mut self.info
    }

    fn ident(&self) -> &'static str {
        "MUL"
    }

    fn process(
        &mut self,
        config: &Config,
        renderer: &mut dyn PlotRenderer,
    ) -> Result<(), RenderError> {
        let name = self.info.id().to_string();
        self.img
            .corr_plane()
            .corr_lines_median()
            .corr_plane()
            .corr_lines_median()
            .render(renderer, config, &name)?;
        Ok(())
    }
}

impl Record for FlmFrame {
    fn info(&self) -> &RecordInfo {
        &self.image.info
    }

    fn info_mut(&mut self) -> &mut RecordInfo {
        &mut self.image.info
    }

    fn ident(&self) -> &'static str {
        "FLM"
    }

    fn process(&mut self, _: &Config, _: &mut dyn PlotRenderer) -> Result<(), RenderError> {
        self.image.img.corr_plane().corr_lines_median();
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use time::macros::datetime;

    pub(crate) struct FrameSpec {
        pub img_num: i16,
        pub xres: i16,
        pub yres: i16,
        pub xsize: i16,
        pub xoffset: i16,
        pub zscale: i16,
        pub speed: i16,
        pub bias: i16,
        pub current: i16,
        pub currfac: i16,
        pub pointscans: i16,
    }

    pub(crate) fn default_frame() -> FrameSpec {
        FrameSpec {
            img_num: 1,
            xres: 4,
            yres: 512,
            xsize: 1000,
            xoffset: -6732,
            zscale: 2,
            speed: 7732,
            bias: -727,
            current: 23,
            currfac: 1,
            pointscans: 0,
        }
    }

    pub(crate) fn write_frame(out: &mut Vec<u8>, frame: &FrameSpec, pixel: impl Fn(usize, usize) -> i16) {
        let start = out.len();
        let data_bytes = frame.xres as usize * frame.yres as usize * 2;
        let ps_bytes = frame.pointscans as usize * (MUL_BLOCK_SIZE as usize + 4);
        let total = MUL_BLOCK_SIZE as usize + data_bytes + ps_bytes;
        let blocks = total.div_ceil(MUL_BLOCK_SIZE as usize) as i16;

        let words: [i16; 20] = [
            frame.img_num,
            blocks,
            frame.xres,
            frame.yres,
            8,
            2021,
            3,
            14,
            9,
            26,
            53,
            frame.xsize,
            frame.xsize,
            frame.xoffset,
            0,
            frame.zscale,
            0,
            frame.speed,
            frame.bias,
            frame.current,
        ];
        for w in words {
            out.write_i16::<LittleEndian>(w).unwrap();
        }
        let mut sample = b"Pt(111)".to_vec();
        sample.resize(21, 0);
        out.extend_from_slice(&sample);
        out.extend_from_slice(&[b' '; 21]);
        for w in [0, 0, 1, frame.currfac, frame.pointscans, 0, 2] {
            out.write_i16::<LittleEndian>(w).unwrap();
        }
        out.extend_from_slice(&[0u8; 24]);
        out.write_i16::<LittleEndian>(10).unwrap();
        out.extend_from_slice(&[0u8; 6]);
        assert_eq!(out.len() - start, MUL_BLOCK_SIZE as usize);

        for row in 0..frame.yres as usize {
            for col in 0..frame.xres as usize {
                out.write_i16::<LittleEndian>(pixel(row, col)).unwrap();
            }
        }
        for _ in 0..frame.pointscans {
            out.write_i16::<LittleEndian>(2).unwrap();
            out.extend_from_slice(&[0u8; MUL_BLOCK_SIZE as usize - 2]);
            out.write_i16::<LittleEndian>(5).unwrap();
            out.write_i16::<LittleEndian>(6).unwrap();
        }
        out.resize(start + blocks as usize * MUL_BLOCK_SIZE as usize, 0);
    }

    pub(crate) fn mul_bytes(frames: &[FrameSpec], directory: bool) -> Vec<u8> {
        let mut out = vec![];
        out.write_i16::<LittleEndian>(frames.len() as i16).unwrap();
        out.write_i32::<LittleEndian>(if directory { 3 } else { 0 }).unwrap();
        if directory {
            out.resize(3 * MUL_BLOCK_SIZE as usize, 0);
        } else {
            out.clear();
        }
        for frame in frames {
            write_frame(&mut out, frame, |row, _| row as i16);
        }
        out
    }

    fn info() -> Fileinfo {
        Fileinfo::new(Path::new("/data/20210314.mul")).unwrap()
    }

    #[test]
    fn test_header_conversions() {
        let buffer = mul_bytes(&[default_frame()], true);
        let frames = parse_frames(&buffer, &info(), datetime!(2000-01-01 0:00)).unwrap();
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.info.id(), "20210314_1");
        assert!((frame.current - 0.23).abs() < 1e-9);
        assert_eq!((frame.bias * 10.0).round() / 10.0, 221.9);
        assert_eq!(frame.xsize, 100.0);
        assert!((frame.speed - 77.32).abs() < 1e-9);
        assert_eq!((frame.line_time * 100.0).round() / 100.0, 151.02);
        assert!((frame.xoffset + 673.2).abs() < 1e-9);
        assert_eq!(frame.sample, "Pt(111)");
        assert_eq!(frame.gain, 10);
        assert_eq!(frame.info.timestamp(), datetime!(2021-03-14 9:26:53));
        assert!((frame.img.pixel_pitch() - 25.0).abs() < 1e-12);
    }

    #[test]
    fn test_height_scale_and_flip() {
        let buffer = mul_bytes(&[default_frame()], true);
        let frames = parse_frames(&buffer, &info(), datetime!(2000-01-01 0:00)).unwrap();
        let img = &frames[0].img.img;
        assert_eq!(img.dim(), (512, 4));
        // Raw rows count up; the flipped array counts down
        let scale = -0.1 / 1.36 * 2.0 / 2000.0;
        assert!((img[[0, 0]] - 511.0 * scale).abs() < 1e-12);
        assert_eq!(img[[511, 3]], 0.0);
    }

    #[test]
    fn test_multiple_frames_and_pointscans() {
        let mut second = default_frame();
        second.img_num = 2;
        second.yres = 3;
        second.pointscans = 1;
        let buffer = mul_bytes(&[default_frame(), second], false);
        let frames = parse_frames(&buffer, &info(), datetime!(2000-01-01 0:00)).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].info.id(), "20210314_2");
        assert_eq!(frames[1].pointscans.len(), 1);
        assert_eq!(frames[1].pointscans[0].data, vec![5, 6]);
    }

    #[test]
    fn test_truncated_frame() {
        let mut buffer = mul_bytes(&[default_frame()], true);
        buffer.truncate(3 * 128 + 128 + 10);
        assert!(matches!(
            parse_frames(&buffer, &info(), datetime!(2000-01-01 0:00)),
            Err(MulError::Truncated { .. })
        ));
    }

    #[test]
    fn test_flm_movie_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("movie.flm");
        let mut second = default_frame();
        second.img_num = 2;
        std::fs::write(&path, mul_bytes(&[default_frame(), second], true)).unwrap();
        let frames = read_flm(&path).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].movie.index, 1);
        assert!((frames[1].movie.elapsed - 2.0 * 77.32).abs() < 1e-9);
        assert_eq!(frames[0].movie.size_text, "100nm x 100nm");
    }
}
