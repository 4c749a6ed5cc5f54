//! Reader for ISO 14976 (VAMAS) surface analysis transfer files.
//!
//! A VAMAS file is a strict sequence of lines: an experiment header, then one record per
//! block. Which optional lines appear depends on the experiment mode, the scan mode and the
//! block technique, so the reader walks the lines in order and consults those switches.
//! Only files with an empty parameter inclusion list (every block field present) and
//! regular scans are supported, which covers what acquisition software writes in practice.

use time::{Date, Month, PrimitiveDateTime, Time};

use crate::error::VamasError;

const END_OF_EXPERIMENT: &str = "end of experiment";

/// Experiment modes that carry per-block analysis positions
const MAPPING_MODES: [&str; 2] = ["MAP", "MAPDP"];
/// Experiment modes that declare a number of spectral regions
const REGION_MODES: [&str; 4] = ["MAP", "MAPDP", "NORM", "SDP"];
/// Experiment modes with a field of view
const FIELD_OF_VIEW_MODES: [&str; 5] = ["MAP", "MAPDP", "MAPSV", "MAPSVDP", "SEM"];
/// Experiment modes with linescan coordinates
const LINESCAN_MODES: [&str; 3] = ["MAPSV", "MAPSVDP", "SEM"];
/// Experiment modes recorded while sputtering
const SPUTTER_MODES: [&str; 4] = ["MAPDP", "MAPSVDP", "SDP", "SDPSV"];
/// Techniques that record the sputtering ion
const ION_TECHNIQUES: [&str; 7] = [
    "FABMS",
    "FABMS energy spec",
    "ISS",
    "SIMS",
    "SIMS energy spec",
    "SNMS",
    "SNMS energy spec",
];
/// Techniques that record the sputtering source in depth profiles
const SPUTTER_SOURCE_TECHNIQUES: [&str; 7] =
    ["AES diff", "AES dir", "EDX", "ELS", "UPS", "XPS", "XRF"];

#[derive(Debug, Clone, PartialEq)]
pub struct VamasHeader {
    pub institution: String,
    pub instrument: String,
    pub operator: String,
    pub experiment: String,
    pub comment: Vec<String>,
    pub experiment_mode: String,
    pub scan_mode: String,
    pub experimental_variables: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdditionalParam {
    pub label: String,
    pub units: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorrespondingVariable {
    pub label: String,
    pub units: String,
    pub y_values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VamasBlock {
    pub block_id: String,
    pub sample_id: String,
    pub timestamp: Option<PrimitiveDateTime>,
    pub comment: Vec<String>,
    pub technique: String,
    pub source_label: String,
    pub source_energy: f64,
    pub analyser_mode: String,
    pub pass_energy: f64,
    pub species: String,
    pub transition: String,
    pub x_label: String,
    pub x_units: String,
    pub x_start: f64,
    pub x_step: f64,
    pub signal_mode: String,
    pub signal_collection_time: f64,
    pub num_scans: usize,
    pub additional_params: Vec<AdditionalParam>,
    pub corresponding_variables: Vec<CorrespondingVariable>,
}

impl VamasBlock {
    /// Number of points per corresponding variable
    pub fn num_points(&self) -> usize {
        self.corresponding_variables
            .first()
            .map(|v| v.y_values.len())
            .unwrap_or(0)
    }

    /// Abscissa values of the regular scan
    pub fn x_values(&self) -> Vec<f64> {
        (0..self.num_points())
            .map(|i| self.x_start + i as f64 * self.x_step)
            .collect()
    }

    /// Value of an additional numerical parameter by label
    pub fn additional_param(&self, label: &str) -> Option<&str> {
        self.additional_params
            .iter()
            .find(|p| p.label == label)
            .map(|p| p.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vamas {
    pub header: VamasHeader,
    pub blocks: Vec<VamasBlock>,
}

/// Line cursor that remembers its position for error messages
struct LineReader<'a> {
    lines: std::str::Lines<'a>,
    line: usize,
}

impl<'a> LineReader<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines(),
            line: 0,
        }
    }

    fn next_str(&mut self, field: &'static str) -> Result<&'a str, VamasError> {
        self.line += 1;
        self.lines
            .next()
            .map(str::trim)
            .ok_or(VamasError::UnexpectedEof {
                line: self.line,
                field,
            })
    }

    fn next_string(&mut self, field: &'static str) -> Result<String, VamasError> {
        Ok(self.next_str(field)?.to_string())
    }

    fn next_f64(&mut self, field: &'static str) -> Result<f64, VamasError> {
        let value = self.next_str(field)?;
        value.parse::<f64>().map_err(|_| VamasError::BadNumber {
            line: self.line,
            field,
            value: value.to_string(),
        })
    }

    fn next_i64(&mut self, field: &'static str) -> Result<i64, VamasError> {
        let value = self.next_str(field)?;
        value.parse::<i64>().map_err(|_| VamasError::BadNumber {
            line: self.line,
            field,
            value: value.to_string(),
        })
    }

    fn next_count(&mut self, field: &'static str) -> Result<usize, VamasError> {
        let line = self.line + 1;
        let value = self.next_i64(field)?;
        usize::try_from(value).map_err(|_| VamasError::BadNumber {
            line,
            field,
            value: value.to_string(),
        })
    }

    fn skip(&mut self, count: usize, field: &'static str) -> Result<(), VamasError> {
        for _ in 0..count {
            self.next_str(field)?;
        }
        Ok(())
    }

    fn next_lines(&mut self, count: usize, field: &'static str) -> Result<Vec<String>, VamasError> {
        (0..count).map(|_| self.next_string(field)).collect()
    }
}

impl Vamas {
    pub fn parse(text: &str) -> Result<Self, VamasError> {
        let mut reader = LineReader::new(text);

        let format = reader.next_str("format identifier")?;
        if !format.starts_with("VAMAS") {
            return Err(VamasError::BadFormat(format.to_string()));
        }
        let institution = reader.next_string("institution")?;
        let instrument = reader.next_string("instrument model")?;
        let operator = reader.next_string("operator")?;
        let experiment = reader.next_string("experiment")?;
        let n_comment = reader.next_count("number of comment lines")?;
        let comment = reader.next_lines(n_comment, "comment")?;
        let experiment_mode = reader.next_string("experiment mode")?;
        let scan_mode = reader.next_string("scan mode")?;
        if scan_mode != "REGULAR" {
            return Err(VamasError::UnsupportedScanMode(scan_mode));
        }

        if REGION_MODES.contains(&experiment_mode.as_str()) {
            reader.next_count("number of spectral regions")?;
        }
        if MAPPING_MODES.contains(&experiment_mode.as_str()) {
            reader.skip(3, "analysis positions")?;
        }

        let n_variables = reader.next_count("number of experimental variables")?;
        let mut experimental_variables = Vec::with_capacity(n_variables);
        for _ in 0..n_variables {
            let label = reader.next_string("experimental variable label")?;
            let units = reader.next_string("experimental variable units")?;
            experimental_variables.push((label, units));
        }

        let inclusion = reader.next_i64("parameter inclusion list")?;
        if inclusion != 0 {
            return Err(VamasError::UnsupportedInclusionList(inclusion));
        }
        let n_manual = reader.next_count("number of manually entered items")?;
        reader.skip(n_manual, "manually entered item")?;
        let n_future_experiment = reader.next_count("future experiment entries")?;
        let n_future_block = reader.next_count("future block entries")?;
        reader.skip(n_future_experiment, "future experiment entry")?;

        let n_blocks = reader.next_count("number of blocks")?;
        let header = VamasHeader {
            institution,
            instrument,
            operator,
            experiment,
            comment,
            experiment_mode,
            scan_mode,
            experimental_variables,
        };

        let mut blocks = Vec::with_capacity(n_blocks);
        for _ in 0..n_blocks {
            blocks.push(parse_block(&mut reader, &header, n_future_block)?);
        }

        match reader.next_str("end of experiment") {
            Ok(line) if line.eq_ignore_ascii_case(END_OF_EXPERIMENT) => (),
            Ok(line) => spdlog::warn!("Unexpected trailer in VAMAS file: {}", line),
            Err(_) => spdlog::warn!("VAMAS file has no end of experiment marker"),
        }

        Ok(Self { header, blocks })
    }
}

fn parse_block(
    reader: &mut LineReader<'_>,
    header: &VamasHeader,
    n_future_block: usize,
) -> Result<VamasBlock, VamasError> {
    let mode = header.experiment_mode.as_str();

    let block_id = reader.next_string("block identifier")?;
    let sample_id = reader.next_string("sample identifier")?;
    let year = reader.next_i64("year")?;
    let month = reader.next_i64("month")?;
    let day = reader.next_i64("day")?;
    let hour = reader.next_i64("hours")?;
    let minute = reader.next_i64("minutes")?;
    let second = reader.next_i64("seconds")?;
    reader.next_str("GMT offset")?;
    let timestamp = block_timestamp(year, month, day, hour, minute, second);

    let n_comment = reader.next_count("number of block comment lines")?;
    let comment = reader.next_lines(n_comment, "block comment")?;
    let technique = reader.next_string("technique")?;
    if MAPPING_MODES.contains(&mode) {
        reader.skip(2, "analysis position")?;
    }
    reader.skip(header.experimental_variables.len(), "experimental variable value")?;
    let source_label = reader.next_string("analysis source label")?;
    if SPUTTER_MODES.contains(&mode) || ION_TECHNIQUES.contains(&technique.as_str()) {
        reader.skip(3, "sputtering ion")?;
    }
    let source_energy = reader.next_f64("analysis source characteristic energy")?;
    reader.skip(3, "analysis source strength and beam width")?;
    if FIELD_OF_VIEW_MODES.contains(&mode) {
        reader.skip(2, "field of view")?;
    }
    if LINESCAN_MODES.contains(&mode) {
        reader.skip(6, "linescan coordinates")?;
    }
    reader.skip(2, "analysis source angles")?;
    let analyser_mode = reader.next_string("analyser mode")?;
    let pass_energy = reader.next_f64("analyser pass energy")?;
    if technique == "AES diff" {
        reader.next_str("differential width")?;
    }
    reader.skip(3, "magnification, work function and target bias")?;
    reader.skip(2, "analysis width")?;
    reader.skip(2, "analyser take off angles")?;
    let species = reader.next_string("species label")?;
    let transition = reader.next_string("transition label")?;
    reader.next_str("charge of detected particle")?;

    let x_label = reader.next_string("abscissa label")?;
    let x_units = reader.next_string("abscissa units")?;
    let x_start = reader.next_f64("abscissa start")?;
    let x_step = reader.next_f64("abscissa increment")?;

    let n_corresponding = reader.next_count("number of corresponding variables")?;
    let mut labels = Vec::with_capacity(n_corresponding);
    for _ in 0..n_corresponding {
        let label = reader.next_string("corresponding variable label")?;
        let units = reader.next_string("corresponding variable units")?;
        labels.push((label, units));
    }

    let signal_mode = reader.next_string("signal mode")?;
    let signal_collection_time = reader.next_f64("signal collection time")?;
    let num_scans = reader.next_count("number of scans")?;
    reader.next_str("signal time correction")?;
    if SPUTTER_MODES.contains(&mode) && SPUTTER_SOURCE_TECHNIQUES.contains(&technique.as_str()) {
        reader.skip(7, "sputtering source")?;
    }
    reader.skip(3, "sample orientation")?;

    let n_additional = reader.next_count("number of additional parameters")?;
    let mut additional_params = Vec::with_capacity(n_additional);
    for _ in 0..n_additional {
        additional_params.push(AdditionalParam {
            label: reader.next_string("additional parameter label")?,
            units: reader.next_string("additional parameter units")?,
            value: reader.next_string("additional parameter value")?,
        });
    }
    reader.skip(n_future_block, "future block entry")?;

    let n_ordinates = reader.next_count("number of ordinate values")?;
    reader.skip(2 * n_corresponding, "ordinate range")?;
    if n_corresponding == 0 || n_ordinates % n_corresponding != 0 {
        return Err(VamasError::BadOrdinateCount {
            ordinates: n_ordinates,
            variables: n_corresponding,
        });
    }
    let mut corresponding_variables: Vec<CorrespondingVariable> = labels
        .into_iter()
        .map(|(label, units)| CorrespondingVariable {
            label,
            units,
            y_values: Vec::with_capacity(n_ordinates / n_corresponding),
        })
        .collect();
    // Ordinates are interleaved, one value per variable for each abscissa point
    for idx in 0..n_ordinates {
        let value = reader.next_f64("ordinate value")?;
        corresponding_variables[idx % n_corresponding]
            .y_values
            .push(value);
    }

    Ok(VamasBlock {
        block_id,
        sample_id,
        timestamp,
        comment,
        technique,
        source_label,
        source_energy,
        analyser_mode,
        pass_energy,
        species,
        transition,
        x_label,
        x_units,
        x_start,
        x_step,
        signal_mode,
        signal_collection_time,
        num_scans,
        additional_params,
        corresponding_variables,
    })
}

fn block_timestamp(
    year: i64,
    month: i64,
    day: i64,
    hour: i64,
    minute: i64,
    second: i64,
) -> Option<PrimitiveDateTime> {
    let month = Month::try_from(u8::try_from(month).ok()?).ok()?;
    let date = Date::from_calendar_date(i32::try_from(year).ok()?, month, u8::try_from(day).ok()?).ok()?;
    let time = Time::from_hms(
        u8::try_from(hour).ok()?,
        u8::try_from(minute).ok()?,
        u8::try_from(second).ok()?,
    )
    .ok()?;
    Some(PrimitiveDateTime::new(date, time))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use time::macros::datetime;

    /// Single block AES file as written by the Staib DESA software
    pub(crate) fn staib_vms(values: &[f64]) -> String {
        let mut lines: Vec<String> = vec![
            "VAMAS Surface Chemical Analysis Standard Data Transfer Format 1988 May 4",
            "Institute",
            "DESA 150",
            "operator",
            "experiment",
            "1",
            "exported",
            "NORM",
            "REGULAR",
            "1",
            "1",
            "Exp Variable",
            "d",
            "0",
            "0",
            "0",
            "0",
            "1",
            "block",
            "sample",
            "2021",
            "3",
            "14",
            "9",
            "26",
            "53",
            "0",
            "0",
            "AES diff",
            "0",
            "e-",
            "3000",
            "1.0",
            "0",
            "0",
            "0",
            "0",
            "FAT",
            "1.0",
            "2.0",
            "1.0",
            "0",
            "0",
            "0",
            "0",
            "0",
            "0",
            "Cu",
            "LMM",
            "-1",
            "Kinetic Energy",
            "eV",
            "30",
            "2",
            "1",
            "counts",
            "d",
            "LockIn",
            "0.1",
            "5",
            "0",
            "0",
            "0",
            "0",
            "3",
            "BKSrettime",
            "ms",
            "100",
            "BKSresomode",
            "d",
            "1",
            "BKSresol",
            "%",
            "0.5",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();
        lines.push(values.len().to_string());
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        lines.push(min.to_string());
        lines.push(max.to_string());
        lines.extend(values.iter().map(f64::to_string));
        lines.push("end of experiment".to_string());
        lines.join("\r\n")
    }

    #[test]
    fn test_single_block() {
        let vms = Vamas::parse(&staib_vms(&[1.0, 2.0, 3.0, 4.0])).unwrap();
        assert_eq!(vms.header.experiment_mode, "NORM");
        assert_eq!(vms.blocks.len(), 1);
        let block = &vms.blocks[0];
        assert_eq!(block.timestamp, Some(datetime!(2021-03-14 9:26:53)));
        assert_eq!(block.technique, "AES diff");
        assert_eq!(block.signal_mode, "LockIn");
        assert_eq!(block.num_scans, 5);
        assert_eq!(block.x_values(), vec![30.0, 32.0, 34.0, 36.0]);
        assert_eq!(block.corresponding_variables[0].y_values, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(block.additional_param("BKSresol"), Some("0.5"));
        assert_eq!(block.additional_param("missing"), None);
    }

    #[test]
    fn test_truncated_block() {
        let text = staib_vms(&[1.0, 2.0]);
        let cut: Vec<&str> = text.lines().take(40).collect();
        assert!(matches!(
            Vamas::parse(&cut.join("\n")),
            Err(VamasError::UnexpectedEof { line: 41, .. })
        ));
    }

    #[test]
    fn test_rejects_other_formats() {
        assert!(matches!(
            Vamas::parse("Not vamas\n"),
            Err(VamasError::BadFormat(_))
        ));
        let irregular = staib_vms(&[1.0]).replace("REGULAR", "IRREGULAR");
        assert!(matches!(
            Vamas::parse(&irregular),
            Err(VamasError::UnsupportedScanMode(_))
        ));
    }
}
