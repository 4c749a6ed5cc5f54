//! Content sniffing for extensions shared by several formats.
//!
//! Instrument software writes either UTF-8 or UTF-16 text. Decoding tries UTF-8 first
//! and falls back to UTF-16 (BOM-directed, little endian without a BOM).

use std::path::Path;

use super::error::SniffError;

/// Decode raw bytes as UTF-8, falling back to UTF-16
pub fn decode_text(bytes: &[u8]) -> Option<String> {
    let utf8 = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    match std::str::from_utf8(utf8) {
        // BOM-less UTF-16 ASCII is valid UTF-8 full of NULs
        Ok(text) if text.contains('\0') => {
            decode_utf16(bytes).or_else(|| Some(text.to_string()))
        }
        Ok(text) => Some(text.to_string()),
        Err(_) => decode_utf16(bytes),
    }
}

fn decode_utf16(bytes: &[u8]) -> Option<String> {
    let (body, big_endian) = match bytes {
        [0xFF, 0xFE, rest @ ..] => (rest, false),
        [0xFE, 0xFF, rest @ ..] => (rest, true),
        _ => (bytes, false),
    };
    if body.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| {
            if big_endian {
                u16::from_be_bytes([pair[0], pair[1]])
            } else {
                u16::from_le_bytes([pair[0], pair[1]])
            }
        })
        .collect();
    String::from_utf16(&units).ok()
}

/// Read a whole text file with the encoding fallback
pub fn read_text_file(path: &Path) -> Result<String, SniffError> {
    let bytes = std::fs::read(path)?;
    decode_text(&bytes).ok_or_else(|| SniffError::BadEncoding(path.to_path_buf()))
}

/// Decoded lines of one file, so several markers can be tested without rereading it
#[derive(Debug, Clone)]
pub struct Sniffer {
    lines: Vec<String>,
}

impl Sniffer {
    pub fn open(path: &Path) -> Result<Self, SniffError> {
        let text = read_text_file(path)?;
        Ok(Self::from_text(&text))
    }

    pub fn from_text(text: &str) -> Self {
        Self {
            lines: text.lines().map(str::to_string).collect(),
        }
    }

    /// Does the 1-indexed `line` contain `marker`? A missing line never matches.
    pub fn line_contains(&self, line: usize, marker: &str) -> bool {
        line.checked_sub(1)
            .and_then(|idx| self.lines.get(idx))
            .is_some_and(|text| text.contains(marker))
    }
}

/// One-shot marker check on a file
pub fn line_contains(path: &Path, line: usize, marker: &str) -> Result<bool, SniffError> {
    Ok(Sniffer::open(path)?.line_contains(line, marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16le_with_bom(text: &str) -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn test_utf8_lines() {
        let sniffer = Sniffer::from_text("EC4 File\r\nsecond\nthird");
        assert!(sniffer.line_contains(1, "EC4 File"));
        assert!(sniffer.line_contains(2, "second"));
        assert!(!sniffer.line_contains(2, "EC4"));
        assert!(!sniffer.line_contains(0, "EC4"));
        assert!(!sniffer.line_contains(10, "third"));
    }

    #[test]
    fn test_utf16_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ps.csv");
        std::fs::write(
            &path,
            utf16le_with_bom("a\nb\nc\nMethod: Chronoamperometry\n"),
        )
        .unwrap();
        assert!(line_contains(&path, 4, "Chronoamperometry").unwrap());
        assert!(!line_contains(&path, 1, "Chronoamperometry").unwrap());
    }

    #[test]
    fn test_utf16_big_endian() {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in "Région".encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        assert_eq!(decode_text(&bytes).as_deref(), Some("Région"));
    }

    #[test]
    fn test_utf16_without_bom() {
        let bytes: Vec<u8> = "Region\tA"
            .encode_utf16()
            .flat_map(|unit| unit.to_le_bytes())
            .collect();
        assert_eq!(decode_text(&bytes).as_deref(), Some("Region\tA"));
    }

    #[test]
    fn test_undecodable() {
        assert_eq!(decode_text(&[0xFF, 0xFE, 0x00]), None);
    }
}
