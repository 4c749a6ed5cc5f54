//! Photographs and screenshots that are shown as they are.

use std::path::Path;

use time::PrimitiveDateTime;

use crate::config::Config;
use crate::error::{ImageFileError, RenderError};
use crate::fileinfo::Fileinfo;
use crate::measurement::{Record, RecordInfo};
use crate::render::PlotRenderer;
use crate::timestamp::file_mtime;

#[derive(Debug, Clone, PartialEq)]
pub struct ImageFile {
    pub info: RecordInfo,
    pub width: u32,
    pub height: u32,
    pub handle: Option<String>,
}

impl ImageFile {
    pub fn new(fileinfo: Fileinfo, timestamp: PrimitiveDateTime) -> Result<Self, ImageFileError> {
        let (width, height) = image::ImageReader::open(&fileinfo.filepath)?
            .with_guessed_format()?
            .into_dimensions()?;
        let id = fileinfo.filename.clone();
        Ok(Self {
            info: RecordInfo::new(fileinfo, id, timestamp),
            width,
            height,
            handle: None,
        })
    }

    pub fn read(path: &Path) -> Result<Self, ImageFileError> {
        Self::new(Fileinfo::new(path)?, file_mtime(path)?)
    }
}

impl Record for ImageFile {
    fn info(&self) -> &RecordInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut RecordInfo {
        &mut self.info
    }

    fn ident(&self) -> &'static str {
        "IMAGE"
    }

    fn process(
        &mut self,
        _config: &Config,
        renderer: &mut dyn PlotRenderer,
    ) -> Result<(), RenderError> {
        let handle = renderer.embed_file(self.info.id(), &self.info.fileinfo.filepath)?;
        self.handle = Some(handle);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::render::PngRenderer;

    pub(crate) fn write_png(path: &Path) {
        image::RgbImage::from_pixel(4, 3, image::Rgb([10, 20, 30]))
            .save_with_format(path, image::ImageFormat::Png)
            .unwrap();
    }

    #[test]
    fn test_embed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Sample Photo.PNG");
        write_png(&path);

        let mut record = ImageFile::read(&path).unwrap();
        assert_eq!((record.width, record.height), (4, 3));
        assert_eq!(record.info.id(), "Sample Photo");

        let mut renderer = PngRenderer::new(&dir.path().join("report_files")).unwrap();
        record.process(&Config::default(), &mut renderer).unwrap();
        let handle = record.handle.unwrap();
        assert!(handle.ends_with(".png"));
        assert!(dir.path().join(&handle).exists());
    }

    #[test]
    fn test_not_an_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.jpg");
        std::fs::write(&path, b"not a jpeg").unwrap();
        assert!(matches!(
            ImageFile::read(&path),
            Err(ImageFileError::Image(_))
        ));
    }
}
