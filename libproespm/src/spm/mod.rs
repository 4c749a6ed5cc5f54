//! Binary scanning-probe formats.
//!
//! Every decoder converts lateral sizes to nm, heights to nm, bias to mV and current
//! to nA, and flips its channels so that row 0 is the top of the scan.

use std::io::Read;

pub mod matrix;
pub mod mul;
pub mod nid;
pub mod sm4;
pub mod sxm;

/// Read a fixed width single-byte string, dropping NUL padding and surrounding blanks
pub(crate) fn read_latin1<R: Read>(reader: &mut R, len: usize) -> Result<String, std::io::Error> {
    let mut raw = vec![0u8; len];
    reader.read_exact(&mut raw)?;
    let text: String = raw
        .iter()
        .take_while(|b| **b != 0)
        .map(|b| *b as char)
        .collect();
    Ok(text.trim().to_string())
}
