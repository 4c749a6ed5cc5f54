/// File extensions (lowercase, with dot) eligible for import
pub const ALLOWED_FILE_TYPES: [&str; 16] = [
    ".mul",
    ".z_mtrx",
    ".sm4",
    ".sxm",
    ".nid",
    ".flm",
    ".vms",
    ".txt",
    ".log",
    ".dat",
    ".csv",
    ".png",
    ".jpg",
    ".jpeg",
    ".lvm",
    ".pssession",
];

// Aarhus MUL/FLM
pub const MUL_BLOCK_SIZE: u64 = 128;
pub const MUL_DIRECTORY_BLOCKS: i32 = 3;
pub const MUL_POINTSCAN_HEADER_WORDS: u64 = 18;
/// Raw height -> nm is `MUL_HEIGHT_FACTOR * zscale / MUL_HEIGHT_DIVISOR`
pub const MUL_HEIGHT_FACTOR: f64 = -0.1 / 1.36;
pub const MUL_HEIGHT_DIVISOR: f64 = 2000.0;
/// Lateral sizes and offsets are stored in Angstrom
pub const MUL_ANGSTROM_PER_NM: f64 = 10.0;
pub const MUL_BIAS_DIVISOR: f64 = 3.2768;
pub const MUL_PERCENT: f64 = 0.01;

// Omicron Matrix
pub const MATRIX_MAGIC: &[u8; 12] = b"ONTMATRX0101";
pub const METERS_TO_NM: f64 = 1e9;
pub const AMPERE_TO_NA: f64 = 1e9;
pub const VOLT_TO_MV: f64 = 1e3;
pub const SECONDS_TO_MS: f64 = 1e3;

// RHK SM4
pub const SM4_SIGNATURE: &str = "STiMage 005.006 1";
pub const SM4_SIGNATURE_CHARS: usize = 18;
pub const SM4_PAGE_TYPE_TOPOGRAPHIC: i32 = 1;
pub const SM4_PAGE_DATA_IMAGE: i32 = 0;
pub const SM4_SCAN_RIGHT: i32 = 0;
pub const SM4_SCAN_LEFT: i32 = 1;
/// Files with more pages than the four topography/current channels carry EC-STM data
pub const SM4_PLAIN_PAGE_COUNT: usize = 4;

// Nanonis SXM
pub const SXM_HEADER_END: &str = ":SCANIT_END:";
pub const SXM_DATA_MARKER: [u8; 2] = [0x1a, 0x04];

// Nanosurf NID
pub const NID_BLOCK_SEPARATOR: &[u8] = b"\r\n\r\n";
pub const NID_LINE_SEPARATOR: &str = "\r\n";
pub const MICROMETERS_TO_NM: f64 = 1000.0;

// Electrochemistry
pub const EC4_HEADER_ROWS: usize = 96;
pub const LABVIEW_HEADER_ROWS: usize = 1;
pub const PALMSENS_HEADER_ROWS: usize = 6;
pub const PALMSENS_FOOTER_ROWS: usize = 1;
/// Fraction of the total potential span tolerated as noise around the cycle start
pub const CV_CYCLE_TOLERANCE: f64 = 0.002;
/// .NET ticks are 100 ns
pub const DOTNET_TICK_NANOS: i64 = 100;

// QCM-B
pub const QCMB_HEADER_ROWS: usize = 2;
pub const QCMB_FOOTER_ROWS: usize = 1;

// Report defaults
pub const DEFAULT_COLORMAP: &str = "inferno";
pub const DEFAULT_COLORRANGE: (f64, f64) = (0.1, 99.9);
pub const REPORT_SUFFIX: &str = "_report.html";
pub const ASSETS_SUFFIX: &str = "_files";
