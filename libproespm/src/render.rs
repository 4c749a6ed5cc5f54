//! The boundary to the plot renderer.
//!
//! The pipeline only needs a handle it can put into the report. `PngRenderer` writes
//! colour-mapped PNGs (with a scale bar) into the report's assets directory and returns
//! their path relative to the report. Every call gets its own file: names that collide
//! after sanitizing get a `_2`, `_3`, ... suffix.

use std::path::{Path, PathBuf};

use fxhash::FxHashSet;
use image::{Rgb, RgbImage};

use super::colormap::Colormap;
use super::error::RenderError;
use super::spm_image::{ContrastWindow, SpmImage};

pub trait PlotRenderer {
    /// Turn a corrected channel into an embeddable asset and return its handle
    fn render_image(
        &mut self,
        name: &str,
        image: &SpmImage,
        colormap: Colormap,
        window: ContrastWindow,
    ) -> Result<String, RenderError>;

    /// Make an existing image file available to the report
    fn embed_file(&mut self, name: &str, path: &Path) -> Result<String, RenderError>;
}

/// Largest 1-2-5 length not exceeding a fifth of the scan width
pub fn scalebar_length(width: f64) -> f64 {
    if !(width > 0.0) || !width.is_finite() {
        return 0.0;
    }
    let target = width / 5.0;
    let decade = 10f64.powf(target.log10().floor());
    [5.0, 2.0, 1.0]
        .into_iter()
        .map(|m| m * decade)
        .find(|len| *len <= target * (1.0 + 1e-9))
        .unwrap_or(decade)
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Colour-map a channel. A degenerate window yields a single colour.
pub fn colorize(image: &SpmImage, colormap: Colormap, window: ContrastWindow) -> RgbImage {
    let (rows, cols) = image.img.dim();
    let degenerate = window.is_degenerate();
    let mut buffer = RgbImage::new(cols as u32, rows as u32);
    for ((row, col), value) in image.img.indexed_iter() {
        let t = if degenerate { 0.5 } else { window.normalize(*value) };
        buffer.put_pixel(col as u32, row as u32, Rgb(colormap.rgb(t)));
    }
    buffer
}

/// Draw a white scale bar in the lower left corner
pub fn draw_scalebar(buffer: &mut RgbImage, pixel_pitch: f64, length: f64) {
    let (width, height) = buffer.dimensions();
    if width < 16 || height < 16 || !(pixel_pitch > 0.0) || !(length > 0.0) {
        return;
    }
    let bar = ((length / pixel_pitch).round() as u32).min(width);
    let thickness = (height / 50).max(1);
    let margin = (width / 30).max(1);
    let top = height.saturating_sub(margin + thickness);
    for y in top..(top + thickness).min(height) {
        for x in margin..(margin + bar).min(width) {
            buffer.put_pixel(x, y, Rgb([255, 255, 255]));
        }
    }
}

#[derive(Debug, Clone)]
pub struct PngRenderer {
    assets_dir: PathBuf,
    link_prefix: String,
    claimed: FxHashSet<String>,
}

impl PngRenderer {
    pub fn new(assets_dir: &Path) -> Result<Self, RenderError> {
        std::fs::create_dir_all(assets_dir)?;
        let link_prefix = assets_dir
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        Ok(Self {
            assets_dir: assets_dir.to_path_buf(),
            link_prefix,
            claimed: FxHashSet::default(),
        })
    }

    /// Reserve a file name in the assets directory that no earlier call has used
    fn claim(&mut self, name: &str, extension: &str) -> String {
        let stem = sanitize(name);
        let mut file = format!("{stem}.{extension}");
        let mut suffix = 1;
        while !self.claimed.insert(file.clone()) {
            suffix += 1;
            file = format!("{stem}_{suffix}.{extension}");
        }
        file
    }

    fn handle(&self, file: &str) -> String {
        if self.link_prefix.is_empty() {
            file.to_string()
        } else {
            format!("{}/{}", self.link_prefix, file)
        }
    }
}

impl PlotRenderer for PngRenderer {
    fn render_image(
        &mut self,
        name: &str,
        image: &SpmImage,
        colormap: Colormap,
        window: ContrastWindow,
    ) -> Result<String, RenderError> {
        let mut buffer = colorize(image, colormap, window);
        draw_scalebar(
            &mut buffer,
            image.pixel_pitch(),
            scalebar_length(image.xsize),
        );
        let file = self.claim(name, "png");
        buffer.save(self.assets_dir.join(&file))?;
        Ok(self.handle(&file))
    }

    fn embed_file(&mut self, name: &str, path: &Path) -> Result<String, RenderError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        let file = self.claim(name, &extension);
        std::fs::copy(path, self.assets_dir.join(&file))?;
        Ok(self.handle(&file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_scalebar_length() {
        assert_eq!(scalebar_length(100.0), 20.0);
        assert_eq!(scalebar_length(20.0), 2.0);
        assert_eq!(scalebar_length(30.0), 5.0);
        assert!((scalebar_length(0.7) - 0.1).abs() < 1e-12);
        assert_eq!(scalebar_length(0.0), 0.0);
    }

    #[test]
    fn test_constant_image_single_colour() {
        let image = SpmImage::new(Array2::from_elem((8, 8), 3.0), 10.0).unwrap();
        let window = image.contrast_window((0.1, 99.9));
        let buffer = colorize(&image, Colormap::Gray, window);
        let first = *buffer.get_pixel(0, 0);
        assert!(buffer.pixels().all(|p| *p == first));
    }

    #[test]
    fn test_png_written() {
        let dir = tempfile::tempdir().unwrap();
        let assets = dir.path().join("report_files");
        let mut renderer = PngRenderer::new(&assets).unwrap();
        let img = Array2::from_shape_fn((32, 32), |(r, c)| (r * c) as f64);
        let image = SpmImage::new(img, 50.0).unwrap();
        let window = image.contrast_window((0.1, 99.9));
        let handle = renderer
            .render_image("scan 01/fw", &image, Colormap::Inferno, window)
            .unwrap();
        assert_eq!(handle, "report_files/scan_01_fw.png");
        let written = image::open(assets.join("scan_01_fw.png")).unwrap();
        assert_eq!(written.width(), 32);
    }

    #[test]
    fn test_embed_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("photo.PNG");
        RgbImage::new(2, 2).save_with_format(&source, image::ImageFormat::Png).unwrap();
        let mut renderer = PngRenderer::new(&dir.path().join("out_files")).unwrap();
        let handle = renderer.embed_file("photo", &source).unwrap();
        assert_eq!(handle, "out_files/photo.png");
        assert!(dir.path().join("out_files/photo.png").exists());
    }

    #[test]
    fn test_colliding_names_get_own_files() {
        let dir = tempfile::tempdir().unwrap();
        let assets = dir.path().join("out_files");
        let mut renderer = PngRenderer::new(&assets).unwrap();
        let small = SpmImage::new(Array2::from_elem((4, 4), 1.0), 10.0).unwrap();
        let large = SpmImage::new(Array2::from_elem((9, 9), 1.0), 10.0).unwrap();

        let first = renderer
            .render_image("scan 01", &small, Colormap::Gray, small.contrast_window((0.1, 99.9)))
            .unwrap();
        let second = renderer
            .render_image("scan_01", &large, Colormap::Gray, large.contrast_window((0.1, 99.9)))
            .unwrap();
        let third = renderer
            .render_image("scan_01", &small, Colormap::Gray, small.contrast_window((0.1, 99.9)))
            .unwrap();

        assert_eq!(first, "out_files/scan_01.png");
        assert_eq!(second, "out_files/scan_01_2.png");
        assert_eq!(third, "out_files/scan_01_3.png");
        assert_eq!(image::open(assets.join("scan_01.png")).unwrap().width(), 4);
        assert_eq!(image::open(assets.join("scan_01_2.png")).unwrap().width(), 9);
    }
}
