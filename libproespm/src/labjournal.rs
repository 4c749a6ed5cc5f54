//! Experiment metadata keyed by measurement id.
//!
//! The journal is a CSV export with a header row. One column is named `ID`; a measurement
//! matches the first row whose ID cell starts with the measurement id. All other non-empty
//! cells of that row are attached to the measurement, in column order.
use std::path::Path;

use super::error::LabjournalError;
use super::measurement::Measurement;

const ID_COLUMN: &str = "ID";

/// Ordered (column, value) pairs of one journal row
pub type Metadata = Vec<(String, String)>;

pub trait Labjournal {
    /// Metadata for a measurement id. No match is not an error
    fn extract_metadata_for_id(&self, id: &str) -> Option<Metadata>;
}

#[derive(Debug, Clone, Default)]
pub struct CsvLabjournal {
    headers: Vec<String>,
    id_column: usize,
    rows: Vec<Vec<String>>,
}

impl CsvLabjournal {
    pub fn new(path: &Path) -> Result<Self, LabjournalError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_reader(contents.as_bytes(), path)
    }

    fn from_reader<R: std::io::Read>(reader: R, path: &Path) -> Result<Self, LabjournalError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = reader.headers()?.iter().map(String::from).collect();
        let id_column = headers
            .iter()
            .position(|h| h == ID_COLUMN)
            .ok_or_else(|| LabjournalError::MissingIdColumn(path.to_path_buf()))?;

        let mut rows = vec![];
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(String::from).collect());
        }

        Ok(Self {
            headers,
            id_column,
            rows,
        })
    }

    pub fn n_entries(&self) -> usize {
        self.rows.len()
    }
}

impl Labjournal for CsvLabjournal {
    fn extract_metadata_for_id(&self, id: &str) -> Option<Metadata> {
        let row = self.rows.iter().find(|row| {
            row.get(self.id_column)
                .is_some_and(|cell| !cell.is_empty() && cell.starts_with(id))
        })?;

        Some(
            self.headers
                .iter()
                .zip(row.iter())
                .enumerate()
                .filter(|(idx, (_, value))| *idx != self.id_column && !value.is_empty())
                .map(|(_, (header, value))| (header.clone(), value.clone()))
                .collect(),
        )
    }
}

/// Attach journal metadata to every measurement, returning the number of matches
pub fn attach_labjournal(measurements: &mut [Measurement], journal: &dyn Labjournal) -> usize {
    let mut matched = 0;
    for measurement in measurements.iter_mut() {
        let metadata = journal.extract_metadata_for_id(measurement.id());
        if metadata.is_some() {
            matched += 1;
        }
        measurement.set_labjournal(metadata);
    }
    spdlog::info!(
        "Labjournal matched {matched} of {} measurements",
        measurements.len()
    );
    matched
}
