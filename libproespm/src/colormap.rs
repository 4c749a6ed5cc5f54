use std::fmt::Display;
use std::str::FromStr;

use super::error::ConfigError;

type Stop = (f64, [u8; 3]);

const INFERNO: [Stop; 9] = [
    (0.0, [0, 0, 4]),
    (0.125, [31, 12, 72]),
    (0.25, [85, 15, 109]),
    (0.375, [136, 34, 106]),
    (0.5, [186, 54, 85]),
    (0.625, [227, 89, 51]),
    (0.75, [249, 140, 10]),
    (0.875, [249, 201, 50]),
    (1.0, [252, 255, 164]),
];

const VIRIDIS: [Stop; 9] = [
    (0.0, [68, 1, 84]),
    (0.125, [71, 44, 122]),
    (0.25, [59, 81, 139]),
    (0.375, [44, 113, 142]),
    (0.5, [33, 144, 141]),
    (0.625, [39, 173, 129]),
    (0.75, [92, 200, 99]),
    (0.875, [170, 220, 50]),
    (1.0, [253, 231, 37]),
];

const MAGMA: [Stop; 9] = [
    (0.0, [0, 0, 4]),
    (0.125, [28, 16, 68]),
    (0.25, [79, 18, 123]),
    (0.375, [129, 37, 129]),
    (0.5, [181, 54, 122]),
    (0.625, [229, 80, 100]),
    (0.75, [251, 135, 97]),
    (0.875, [254, 194, 135]),
    (1.0, [252, 253, 191]),
];

const GRAY: [Stop; 2] = [(0.0, [0, 0, 0]), (1.0, [255, 255, 255])];

const HOT: [Stop; 4] = [
    (0.0, [0, 0, 0]),
    (0.365, [255, 0, 0]),
    (0.746, [255, 255, 0]),
    (1.0, [255, 255, 255]),
];

const AFMHOT: [Stop; 4] = [
    (0.0, [0, 0, 0]),
    (0.5, [255, 128, 0]),
    (0.75, [255, 255, 128]),
    (1.0, [255, 255, 255]),
];

/// The installed colour scales
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Colormap {
    Gray,
    #[default]
    Inferno,
    Viridis,
    Magma,
    Hot,
    Afmhot,
}

impl Colormap {
    pub const ALL: [Colormap; 6] = [
        Colormap::Gray,
        Colormap::Inferno,
        Colormap::Viridis,
        Colormap::Magma,
        Colormap::Hot,
        Colormap::Afmhot,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Gray => "gray",
            Self::Inferno => "inferno",
            Self::Viridis => "viridis",
            Self::Magma => "magma",
            Self::Hot => "hot",
            Self::Afmhot => "afmhot",
        }
    }

    fn stops(&self) -> &'static [Stop] {
        match self {
            Self::Gray => &GRAY,
            Self::Inferno => &INFERNO,
            Self::Viridis => &VIRIDIS,
            Self::Magma => &MAGMA,
            Self::Hot => &HOT,
            Self::Afmhot => &AFMHOT,
        }
    }

    /// Colour at position `t` in [0, 1], linearly interpolated between stops
    pub fn rgb(&self, t: f64) -> [u8; 3] {
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
        let stops = self.stops();
        for pair in stops.windows(2) {
            let (t0, c0) = pair[0];
            let (t1, c1) = pair[1];
            if t <= t1 {
                let f = if t1 > t0 { (t - t0) / (t1 - t0) } else { 0.0 };
                let mut out = [0u8; 3];
                for (o, (a, b)) in out.iter_mut().zip(c0.iter().zip(c1.iter())) {
                    *o = (*a as f64 + (*b as f64 - *a as f64) * f).round() as u8;
                }
                return out;
            }
        }
        stops[stops.len() - 1].1
    }
}

impl FromStr for Colormap {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Colormap::ALL
            .into_iter()
            .find(|map| map.name() == s.trim().to_lowercase())
            .ok_or_else(|| ConfigError::BadColormap(s.to_string()))
    }
}

impl Display for Colormap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
