use serde::Serialize;

/// One named (x, y) trace
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub label: String,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    /// Drawn against the secondary y axis
    pub secondary: bool,
}

/// Plot description of a 1D measurement, handed to an external plotting sink
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SeriesPlot {
    pub x_label: String,
    pub y_label: String,
    pub y2_label: Option<String>,
    pub series: Vec<Series>,
}

impl SeriesPlot {
    pub fn new(x_label: &str, y_label: &str) -> Self {
        Self {
            x_label: x_label.to_string(),
            y_label: y_label.to_string(),
            y2_label: None,
            series: vec![],
        }
    }

    pub fn with_secondary_axis(mut self, label: &str) -> Self {
        self.y2_label = Some(label.to_string());
        self
    }

    pub fn push(&mut self, label: &str, x: Vec<f64>, y: Vec<f64>) -> &mut Self {
        self.series.push(Series {
            label: label.to_string(),
            x,
            y,
            secondary: false,
        });
        self
    }

    pub fn push_secondary(&mut self, label: &str, x: Vec<f64>, y: Vec<f64>) -> &mut Self {
        self.series.push(Series {
            label: label.to_string(),
            x,
            y,
            secondary: true,
        });
        self
    }

    /// Finite (min, max) of the primary y values
    pub fn y_bounds(&self) -> Option<(f64, f64)> {
        self.series
            .iter()
            .filter(|s| !s.secondary)
            .flat_map(|s| s.y.iter().copied())
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    pub fn n_points(&self) -> usize {
        self.series.iter().map(|s| s.x.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_skip_secondary() {
        let mut plot = SeriesPlot::new("t [s]", "I [A]").with_secondary_axis("U [V]");
        plot.push("I", vec![0.0, 1.0], vec![-1.0, 2.0])
            .push_secondary("U", vec![0.0, 1.0], vec![100.0, 200.0]);
        assert_eq!(plot.y_bounds(), Some((-1.0, 2.0)));
        assert_eq!(plot.n_points(), 4);
        assert_eq!(SeriesPlot::new("x", "y").y_bounds(), None);
    }
}
