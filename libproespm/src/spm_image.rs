//! One scanning-probe channel and its background corrections.
//!
//! Corrections mutate the pixel array in place and return `&mut Self` so they can be
//! chained. The order of a chain matters: `corr_plane().corr_lines_median()` is not the
//! same as `corr_lines_median().corr_plane()`. Every record calls its chain exactly once.

use ndarray::{s, Array2, ArrayView1, Axis};

use super::config::Config;
use super::error::{RenderError, SpmImageError};
use super::render::PlotRenderer;

/// Least-squares plane `z = offset + slope_x * column + slope_y * row`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneCoefficients {
    pub offset: f64,
    pub slope_x: f64,
    pub slope_y: f64,
}

/// Colour-scale bounds taken from percentiles of the pixel distribution
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContrastWindow {
    pub vmin: f64,
    pub vmax: f64,
}

impl ContrastWindow {
    /// A window with no extent maps every pixel to one colour
    pub fn is_degenerate(&self) -> bool {
        !(self.vmax > self.vmin)
    }

    /// Position of `value` inside the window, clamped to [0, 1]
    pub fn normalize(&self, value: f64) -> f64 {
        if self.is_degenerate() || !value.is_finite() {
            return 0.0;
        }
        ((value - self.vmin) / (self.vmax - self.vmin)).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpmImage {
    /// Pixel data, rows x columns, physical height units (nm)
    pub img: Array2<f64>,
    /// Physical width of the x axis in nm
    pub xsize: f64,
    pub window: Option<ContrastWindow>,
    /// Opaque handle returned by the renderer
    pub rendered: Option<String>,
}

impl SpmImage {
    pub fn new(img: Array2<f64>, xsize: f64) -> Result<Self, SpmImageError> {
        let (rows, cols) = img.dim();
        if rows == 0 || cols == 0 {
            return Err(SpmImageError::EmptyImage(rows, cols));
        }
        Ok(Self {
            img,
            xsize,
            window: None,
            rendered: None,
        })
    }

    /// Build from row-major samples
    pub fn from_vec(
        data: Vec<f64>,
        rows: usize,
        cols: usize,
        xsize: f64,
    ) -> Result<Self, SpmImageError> {
        if data.len() != rows * cols {
            return Err(SpmImageError::BadShape(data.len(), rows, cols));
        }
        let img = Array2::from_shape_vec((rows, cols), data)?;
        Self::new(img, xsize)
    }

    pub fn rows(&self) -> usize {
        self.img.nrows()
    }

    pub fn cols(&self) -> usize {
        self.img.ncols()
    }

    /// Physical size of one pixel along x
    pub fn pixel_pitch(&self) -> f64 {
        self.xsize / self.cols() as f64
    }

    /// Reverse the row order (top-bottom mirror)
    pub fn flip_vertical(&mut self) -> &mut Self {
        self.img = self.img.slice(s![..;-1, ..]).to_owned();
        self
    }

    /// Reverse the column order (left-right mirror)
    pub fn flip_horizontal(&mut self) -> &mut Self {
        self.img = self.img.slice(s![.., ..;-1]).to_owned();
        self
    }

    /// Shift the data so that its minimum is zero
    pub fn fix_zero(&mut self) -> &mut Self {
        let min = self.img.iter().copied().fold(f64::INFINITY, f64::min);
        if min.is_finite() {
            self.img.mapv_inplace(|v| v - min);
        }
        self
    }

    /// Fit `z = a + b*x + c*y` over every pixel.
    ///
    /// On a complete grid the centred x and y columns of the design matrix are
    /// orthogonal, so the normal equations decouple into one ratio per slope. A
    /// direction with a single pixel has no variance; its slope is set to zero, which is
    /// the minimum-norm least-squares solution for the rank deficient system.
    pub fn plane_coefficients(&self) -> PlaneCoefficients {
        let (rows, cols) = self.img.dim();
        let n = (rows * cols) as f64;
        let x_mean = (cols as f64 - 1.0) / 2.0;
        let y_mean = (rows as f64 - 1.0) / 2.0;

        let mut z_sum = 0.0;
        let mut xz = 0.0;
        let mut yz = 0.0;
        for ((row, col), &z) in self.img.indexed_iter() {
            z_sum += z;
            xz += (col as f64 - x_mean) * z;
            yz += (row as f64 - y_mean) * z;
        }
        let z_mean = z_sum / n;

        // Sum of squared centred indices 0..len, times the count along the other axis
        let centred_squares = |len: usize, mean: f64| -> f64 {
            (0..len).map(|i| (i as f64 - mean).powi(2)).sum::<f64>()
        };
        let x_var = centred_squares(cols, x_mean) * rows as f64;
        let y_var = centred_squares(rows, y_mean) * cols as f64;

        let slope_x = if x_var > 0.0 { xz / x_var } else { 0.0 };
        let slope_y = if y_var > 0.0 { yz / y_var } else { 0.0 };

        PlaneCoefficients {
            offset: z_mean - slope_x * x_mean - slope_y * y_mean,
            slope_x,
            slope_y,
        }
    }

    /// Subtract the least-squares background plane
    pub fn corr_plane(&mut self) -> &mut Self {
        let plane = self.plane_coefficients();
        for ((row, col), z) in self.img.indexed_iter_mut() {
            *z -= plane.offset + plane.slope_x * col as f64 + plane.slope_y * row as f64;
        }
        self
    }

    /// Subtract each row's mean
    pub fn corr_lines(&mut self) -> &mut Self {
        for mut line in self.img.axis_iter_mut(Axis(0)) {
            if let Some(mean) = line.mean() {
                line.mapv_inplace(|v| v - mean);
            }
        }
        self
    }

    /// Subtract each row's median
    pub fn corr_lines_median(&mut self) -> &mut Self {
        for mut line in self.img.axis_iter_mut(Axis(0)) {
            let median = median(line.view());
            line.mapv_inplace(|v| v - median);
        }
        self
    }

    /// Percentile `q` (0..=100) with linear interpolation between ranks. NaN pixels are ignored.
    pub fn percentile(&self, q: f64) -> f64 {
        let mut values: Vec<f64> = self.img.iter().copied().filter(|v| !v.is_nan()).collect();
        if values.is_empty() {
            return f64::NAN;
        }
        values.sort_by(f64::total_cmp);
        let rank = (q.clamp(0.0, 100.0) / 100.0) * (values.len() - 1) as f64;
        let lower = rank.floor() as usize;
        let upper = rank.ceil() as usize;
        values[lower] + (values[upper] - values[lower]) * (rank - lower as f64)
    }

    pub fn contrast_window(&self, colorrange: (f64, f64)) -> ContrastWindow {
        ContrastWindow {
            vmin: self.percentile(colorrange.0),
            vmax: self.percentile(colorrange.1),
        }
    }

    /// Hand the corrected array to the renderer and keep the returned handle
    pub fn render(
        &mut self,
        renderer: &mut dyn PlotRenderer,
        config: &Config,
        name: &str,
    ) -> Result<&mut Self, RenderError> {
        let window = self.contrast_window(config.colorrange);
        let colormap = config.colormap()?;
        let handle = renderer.render_image(name, self, colormap, window)?;
        self.window = Some(window);
        self.rendered = Some(handle);
        Ok(self)
    }
}

/// Median of a line, averaging the two central values for even lengths
pub fn median(line: ArrayView1<f64>) -> f64 {
    let mut values: Vec<f64> = line.iter().copied().collect();
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    const TOL: f64 = 1e-9;

    fn tilted(rows: usize, cols: usize) -> SpmImage {
        let img = Array2::from_shape_fn((rows, cols), |(r, c)| {
            3.0 + 0.5 * c as f64 - 0.25 * r as f64 + if (r + c) % 3 == 0 { 0.1 } else { 0.0 }
        });
        SpmImage::new(img, 20.0).unwrap()
    }

    #[test]
    fn test_empty_rejected() {
        assert!(matches!(
            SpmImage::new(Array2::zeros((0, 4)), 1.0),
            Err(SpmImageError::EmptyImage(0, 4))
        ));
        assert!(matches!(
            SpmImage::from_vec(vec![1.0; 5], 2, 3, 1.0),
            Err(SpmImageError::BadShape(5, 2, 3))
        ));
    }

    #[test]
    fn test_exact_plane_removed() {
        let img = Array2::from_shape_fn((4, 5), |(r, c)| 1.5 + 2.0 * c as f64 - 0.5 * r as f64);
        let mut image = SpmImage::new(img, 10.0).unwrap();
        let plane = image.plane_coefficients();
        assert!((plane.offset - 1.5).abs() < TOL);
        assert!((plane.slope_x - 2.0).abs() < TOL);
        assert!((plane.slope_y + 0.5).abs() < TOL);
        image.corr_plane();
        assert!(image.img.iter().all(|v| v.abs() < TOL));
    }

    #[test]
    fn test_plane_twice_is_stable() {
        let mut image = tilted(8, 6);
        image.corr_plane();
        let first = image.img.clone();
        let plane = image.plane_coefficients();
        assert!(plane.offset.abs() < TOL);
        assert!(plane.slope_x.abs() < TOL);
        assert!(plane.slope_y.abs() < TOL);
        image.corr_plane();
        for (a, b) in first.iter().zip(image.img.iter()) {
            assert!((a - b).abs() < TOL);
        }
    }

    #[test]
    fn test_rank_deficient_plane() {
        let mut line = SpmImage::new(array![[1.0, 2.0, 3.0, 4.0]], 4.0).unwrap();
        let plane = line.plane_coefficients();
        assert_eq!(plane.slope_y, 0.0);
        assert!((plane.slope_x - 1.0).abs() < TOL);
        line.corr_plane();
        assert!(line.img.iter().all(|v| v.abs() < TOL));

        let mut pixel = SpmImage::new(array![[7.0]], 1.0).unwrap();
        pixel.corr_plane();
        assert_eq!(pixel.img[[0, 0]], 0.0);
    }

    #[test]
    fn test_line_mean_zero() {
        let mut image = tilted(5, 7);
        image.corr_lines();
        for row in image.img.axis_iter(Axis(0)) {
            assert!(row.mean().unwrap().abs() < TOL);
        }
        assert_eq!(image.img.dim(), (5, 7));
    }

    #[test]
    fn test_line_median_zero() {
        let mut image =
            SpmImage::new(array![[1.0, 100.0, 2.0, 3.0], [5.0, 5.0, 6.0, -50.0]], 1.0).unwrap();
        image.corr_lines_median();
        for row in image.img.axis_iter(Axis(0)) {
            assert!(median(row).abs() < TOL);
        }
        assert_eq!(image.img[[0, 1]], 97.5);
    }

    #[test]
    fn test_chain_preserves_shape() {
        let mut image = tilted(3, 9);
        image
            .corr_plane()
            .corr_lines_median()
            .corr_plane()
            .corr_lines_median();
        assert_eq!(image.img.dim(), (3, 9));
    }

    #[test]
    fn test_flips() {
        let mut image = SpmImage::new(array![[1.0, 2.0], [3.0, 4.0]], 1.0).unwrap();
        image.flip_vertical();
        assert_eq!(image.img, array![[3.0, 4.0], [1.0, 2.0]]);
        image.flip_horizontal();
        assert_eq!(image.img, array![[4.0, 3.0], [2.0, 1.0]]);
    }

    #[test]
    fn test_fix_zero() {
        let mut image = SpmImage::new(array![[-2.0, 1.0], [0.0, 3.0]], 1.0).unwrap();
        image.fix_zero();
        assert_eq!(image.img, array![[0.0, 3.0], [2.0, 5.0]]);
    }

    #[test]
    fn test_percentile_interpolates() {
        let image = SpmImage::new(array![[1.0, 2.0, 3.0, 4.0, 5.0]], 1.0).unwrap();
        assert_eq!(image.percentile(0.0), 1.0);
        assert_eq!(image.percentile(100.0), 5.0);
        assert!((image.percentile(50.0) - 3.0).abs() < TOL);
        assert!((image.percentile(10.0) - 1.4).abs() < TOL);
    }

    #[test]
    fn test_percentile_ignores_spike() {
        let mut img = Array2::from_elem((10, 10), 1.0);
        img[[0, 0]] = 1e6;
        for (i, v) in img.iter_mut().enumerate().skip(1) {
            *v = i as f64 / 100.0;
        }
        let image = SpmImage::new(img, 1.0).unwrap();
        let window = image.contrast_window((1.0, 98.0));
        assert!(window.vmax < 1.0);
    }

    #[test]
    fn test_constant_image_window() {
        let image = SpmImage::new(Array2::from_elem((4, 4), 2.5), 1.0).unwrap();
        let window = image.contrast_window((0.1, 99.9));
        assert!(window.is_degenerate());
        assert_eq!(window.normalize(2.5), 0.0);
    }

    #[test]
    fn test_pixel_pitch() {
        let image = SpmImage::new(Array2::zeros((256, 256)), 20.0).unwrap();
        assert!((image.pixel_pitch() - 0.078125).abs() < 1e-12);
    }
}
