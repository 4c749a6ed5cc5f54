//! Numeric text tables.
//!
//! Two flavours cover the electrochemistry and logger formats: whitespace separated
//! columns (strict, every row must have the same width) and delimited columns read with
//! the `csv` crate where empty or missing cells become NaN.

use super::error::TableError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub rows: Vec<Vec<f64>>,
}

fn parse_cell(cell: &str, row: usize) -> Result<f64, TableError> {
    cell.trim()
        .parse::<f64>()
        .map_err(|_| TableError::BadNumber {
            row,
            value: cell.to_string(),
        })
}

impl Table {
    /// Whitespace separated table. `skip_header` counts raw lines, blank and `#` lines are ignored.
    pub fn from_whitespace(
        text: &str,
        skip_header: usize,
        skip_footer: usize,
    ) -> Result<Self, TableError> {
        let lines: Vec<(usize, &str)> = text
            .lines()
            .enumerate()
            .skip(skip_header)
            .filter(|(_, line)| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with('#')
            })
            .collect();
        let keep = lines.len().saturating_sub(skip_footer);

        let mut rows: Vec<Vec<f64>> = Vec::with_capacity(keep);
        for (idx, line) in lines.into_iter().take(keep) {
            let row = line
                .split_whitespace()
                .map(|cell| parse_cell(cell, idx + 1))
                .collect::<Result<Vec<f64>, TableError>>()?;
            if let Some(first) = rows.first() {
                if first.len() != row.len() {
                    return Err(TableError::RaggedRow {
                        row: idx + 1,
                        expected: first.len(),
                        found: row.len(),
                    });
                }
            }
            rows.push(row);
        }

        if rows.is_empty() {
            return Err(TableError::Empty);
        }
        Ok(Self { rows })
    }

    /// Delimited table. Cells are trimmed; empty cells and short rows are padded with NaN.
    pub fn from_delimited(
        text: &str,
        delimiter: u8,
        skip_header: usize,
        skip_footer: usize,
    ) -> Result<Self, TableError> {
        let body: Vec<&str> = text
            .lines()
            .skip(skip_header)
            .filter(|line| !line.trim().is_empty())
            .collect();
        let keep = body.len().saturating_sub(skip_footer);
        let body = body[..keep].join("\n");

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .trim(csv::Trim::All)
            .from_reader(body.as_bytes());

        let mut rows: Vec<Vec<f64>> = Vec::with_capacity(keep);
        for (idx, record) in reader.records().enumerate() {
            let record = record?;
            let row = record
                .iter()
                .map(|cell| {
                    if cell.is_empty() {
                        Ok(f64::NAN)
                    } else {
                        parse_cell(cell, skip_header + idx + 1)
                    }
                })
                .collect::<Result<Vec<f64>, TableError>>()?;
            rows.push(row);
        }

        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        if width == 0 {
            return Err(TableError::Empty);
        }
        for row in rows.iter_mut() {
            row.resize(width, f64::NAN);
        }
        Ok(Self { rows })
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_columns(&self) -> usize {
        self.rows.first().map(Vec::len).unwrap_or(0)
    }

    pub fn column(&self, idx: usize) -> Result<Vec<f64>, TableError> {
        if idx >= self.n_columns() {
            return Err(TableError::MissingColumn {
                column: idx,
                available: self.n_columns(),
            });
        }
        Ok(self.rows.iter().map(|row| row[idx]).collect())
    }

    /// Column with NaN cells removed
    pub fn column_finite(&self, idx: usize) -> Result<Vec<f64>, TableError> {
        Ok(self
            .column(idx)?
            .into_iter()
            .filter(|v| !v.is_nan())
            .collect())
    }

    /// All columns, transposed
    pub fn columns(&self) -> Vec<Vec<f64>> {
        (0..self.n_columns())
            .map(|idx| self.rows.iter().map(|row| row[idx]).collect())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace() {
        let text = "t U I\n0 0.1 1e-6\n\n1\t0.2  2e-6\n# comment\n2 0.3 3e-6\n";
        let table = Table::from_whitespace(text, 1, 0).unwrap();
        assert_eq!(table.n_rows(), 3);
        assert_eq!(table.n_columns(), 3);
        assert_eq!(table.column(1).unwrap(), vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_whitespace_footer_and_errors() {
        let table = Table::from_whitespace("1 2\n3 4\nend 5", 0, 1).unwrap();
        assert_eq!(table.n_rows(), 2);
        match Table::from_whitespace("1 2\n3", 0, 0) {
            Err(TableError::RaggedRow { row, .. }) => assert_eq!(row, 2),
            _ => panic!(),
        }
        match Table::from_whitespace("1 x", 0, 0) {
            Err(TableError::BadNumber { value, .. }) => assert_eq!(value, "x"),
            _ => panic!(),
        }
        assert!(matches!(
            Table::from_whitespace("header only", 1, 0),
            Err(TableError::Empty)
        ));
    }

    #[test]
    fn test_delimited_padding() {
        let text = "h1\nh2\n1, 2, 3\n4,,6\n7, 8\nfooter";
        let table = Table::from_delimited(text, b',', 2, 1).unwrap();
        assert_eq!(table.n_rows(), 3);
        assert_eq!(table.n_columns(), 3);
        assert!(table.column(1).unwrap()[1].is_nan());
        assert!(table.column(2).unwrap()[2].is_nan());
        assert_eq!(table.column_finite(2).unwrap(), vec![3.0, 6.0]);
        assert!(table.column(3).is_err());
    }

    #[test]
    fn test_delimited_quoted_fields() {
        let table = Table::from_delimited("\"1\",\"2.5\"\n3,4\n", b',', 0, 0).unwrap();
        assert_eq!(table.column(1).unwrap(), vec![2.5, 4.0]);
        // Text after a closing quote stays in the cell and is not a number
        assert!(Table::from_delimited("1,\"2\"x\n", b',', 0, 0).is_err());
    }

    #[test]
    fn test_reader_error_converts() {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(&b"1,\xff\n"[..]);
        let err = match reader.records().next() {
            Some(Err(e)) => TableError::from(e),
            other => panic!("expected a reader error, got {other:?}"),
        };
        assert!(matches!(err, TableError::Csv(_)));
        assert!(err.to_string().starts_with("Could not read table"));
    }
}
