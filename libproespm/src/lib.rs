//! # proespm
//!
//! proespm turns a directory of raw instrument output into a single static HTML report.
//! It reads scanning probe microscopy images, electron spectroscopy, electrochemistry and
//! deposition logs, applies background corrections to the images and lists every
//! measurement in order of acquisition.
//!
//! ## Supported formats
//!
//! | Extension | Instrument |
//! |-----------|------------|
//! | `.mul`, `.flm` | Aarhus STM images and movies |
//! | `.Z_mtrx` | Omicron Matrix STM (needs the `_0001.mtrx` parameter file) |
//! | `.sm4` | RHK SM4, including EC-STM potential and current traces |
//! | `.sxm` | Nanonis STM |
//! | `.nid` | Nanosurf AFM |
//! | `.dat`, `.vms` | Staib AES |
//! | `.txt` | Omicron XPS EIS export (`Region` on line 1) and EC4 (`EC4 File` on line 1) |
//! | `.csv` | LabView CV, CA and FFT, PalmSens CSV exports |
//! | `.pssession` | PalmSens sessions |
//! | `.log` | QCM-B deposition logs |
//! | `.lvm` | LabView TPD |
//! | `.png`, `.jpg`, `.jpeg` | Photographs, copied into the report |
//!
//! Files are taken from the data directory and from its direct subdirectories, ordered by
//! creation time. EC4 voltammetry split over several files is merged into the file whose
//! name ends in `1`; such a file must come first.
//!
//! ## Configuration
//!
//! The CLI accepts a YAML configuration file; command line arguments override it.
//!
//! ```yml
//! data_path: /path/to/data
//! output_path: null
//! colormap: inferno
//! colorrange:
//! - 0.1
//! - 99.9
//! labjournal_path: null
//! report_name: null
//! ```
//!
//! If `output_path` is null the report is written next to the data directory as
//! `<directory>_report.html`, with rendered images in `<directory>_files/` and a log file
//! `<directory>.log`.
//!
//! ## Labjournal
//!
//! A CSV file with an `ID` column. A measurement whose id is the start of an ID cell gets
//! the other columns of that row shown in the report.
pub mod colormap;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod ec;
pub mod error;
pub mod fileinfo;
pub mod labjournal;
pub mod measurement;
pub mod misc;
pub mod plot;
pub mod process;
pub mod render;
pub mod report;
pub mod sniff;
pub mod spectroscopy;
pub mod spm;
pub mod spm_image;
pub mod table;
pub mod timestamp;
pub mod worker_status;
