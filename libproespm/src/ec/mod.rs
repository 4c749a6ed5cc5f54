//! Electrochemistry exports: Nordic EC4, in-house LabView and PalmSens.

use regex::Regex;

pub mod ec4;
pub mod labview;
pub mod palmsens;
pub mod pssession;

/// First capture group of `regex` in `text`, trimmed
pub(crate) fn capture<'t>(regex: &Regex, text: &'t str) -> Option<&'t str> {
    regex
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

/// One sweep of a cyclic voltammogram
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Cycle {
    pub voltage: Vec<f64>,
    pub current: Vec<f64>,
}

/// Pairs where both values are finite
pub(crate) fn finite_pairs(x: &[f64], y: &[f64]) -> (Vec<f64>, Vec<f64>) {
    x.iter()
        .zip(y.iter())
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(a, b)| (*a, *b))
        .unzip()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_and_pairs() {
        let regex = Regex::new(r"Rate(\s+[\d.-]+)").unwrap();
        assert_eq!(capture(&regex, "Scan Rate   0.05\n"), Some("0.05"));
        assert_eq!(capture(&regex, "nothing"), None);

        let (x, y) = finite_pairs(&[1.0, f64::NAN, 3.0], &[4.0, 5.0, f64::NAN]);
        assert_eq!((x, y), (vec![1.0], vec![4.0]));
    }
}
