use std::{
    fs::read_to_string,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::error::ReportError;

/// One parsed benchmark csv: the first column is the independent variable
/// (array length), every further column one measured algorithm.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    source: PathBuf,
    headers: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl Dataset {
    pub fn read(path: impl AsRef<Path>) -> Result<Self, ReportError> {
        let path = path.as_ref();
        let text = read_to_string(path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => ReportError::NotFound {
                path: path.to_path_buf(),
            },
            _ => ReportError::Io(err),
        })?;
        let dataset = Self::parse(&text, path)?;
        debug!(
            "Parsed {} ({} columns, {} rows)",
            path.display(),
            dataset.headers.len(),
            dataset.row_count()
        );
        Ok(dataset)
    }

    /// Parses csv text. `source` is only used for error messages.
    pub fn parse(text: &str, source: impl Into<PathBuf>) -> Result<Self, ReportError> {
        let source = source.into();
        let mut lines = text.lines();
        let header = lines
            .next()
            .ok_or_else(|| ReportError::format(&source, 1, None, "Missing header"))?;
        let headers = header
            .split(',')
            .map(|h| h.trim().to_owned())
            .collect::<Vec<_>>();
        if headers.len() < 2 {
            return Err(ReportError::format(
                &source,
                1,
                None,
                format!("Expected at least 2 columns, got {}", headers.len()),
            ));
        }
        if let Some(pos) = headers.iter().position(|h| h.is_empty()) {
            return Err(ReportError::format(
                &source,
                1,
                Some(pos + 1),
                "Empty column name",
            ));
        }

        let mut columns = vec![Vec::new(); headers.len()];
        for (idx, line) in lines.enumerate() {
            let line_no = idx + 2;
            if line.trim().is_empty() {
                return Err(ReportError::format(&source, line_no, None, "Blank line"));
            }
            let fields = line.split(',').collect::<Vec<_>>();
            if fields.len() != headers.len() {
                return Err(ReportError::format(
                    &source,
                    line_no,
                    None,
                    format!("Expected {} fields, got {}", headers.len(), fields.len()),
                ));
            }
            for (col, field) in fields.iter().enumerate() {
                let value = field.trim().parse::<f64>().map_err(|_| {
                    ReportError::format(
                        &source,
                        line_no,
                        Some(col + 1),
                        format!("Not a number: \"{}\"", field.trim()),
                    )
                })?;
                if !value.is_finite() {
                    return Err(ReportError::format(
                        &source,
                        line_no,
                        Some(col + 1),
                        format!("Not a finite number: \"{}\"", field.trim()),
                    ));
                }
                columns[col].push(value);
            }
        }

        if let Some(row) = columns[0].windows(2).position(|w| !(w[0] <= w[1])) {
            return Err(ReportError::format(
                &source,
                row + 3,
                Some(1),
                format!("Column \"{}\" must not decrease", headers[0]),
            ));
        }

        Ok(Dataset {
            source,
            headers,
            columns,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn columns(&self) -> &[Vec<f64>] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.columns[0].len()
    }

    /// The independent variable
    pub fn x(&self) -> &[f64] {
        &self.columns[0]
    }

    /// Every measured column with its header, in file order
    pub fn measured(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.headers[1..]
            .iter()
            .zip(&self.columns[1..])
            .map(|(h, c)| (h.as_str(), c.as_slice()))
    }

    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<(), ReportError> {
        let mut writer = csv::WriterBuilder::new()
            .quote_style(csv::QuoteStyle::Never)
            .from_writer(writer);
        let to_io = |err: csv::Error| ReportError::Io(io::Error::other(err));
        writer.write_record(&self.headers).map_err(to_io)?;
        for row in 0..self.row_count() {
            writer
                .write_record(self.columns.iter().map(|c| c[row].to_string()))
                .map_err(to_io)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn to_csv_string(&self) -> Result<String, ReportError> {
        let mut out = Vec::new();
        self.write_csv(&mut out)?;
        String::from_utf8(out).map_err(|err| ReportError::Io(io::Error::other(err)))
    }
}
