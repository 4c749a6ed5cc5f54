//! Auxiliary lab records: deposition monitor logs, desorption spectra and plain images.

pub mod image_file;
pub mod qcmb;
pub mod tpd;
