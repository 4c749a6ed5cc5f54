//! Electron spectroscopy text formats.

pub mod aes;
pub mod vamas;
pub mod xps_eis;
