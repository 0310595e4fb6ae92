use std::io::{self, Write};

use serde::Serialize;

use crate::arxiv::LatexTable;
use crate::catalog::{CatalogTable, Value};
use crate::error::GaldynError;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print<T: Serialize>(value: &T) -> Result<(), GaldynError> {
        let mut stdout = io::stdout().lock();
        Self::write(value, &mut stdout)
    }

    pub fn write<T: Serialize, W: Write>(value: &T, writer: &mut W) -> Result<(), GaldynError> {
        serde_json::to_writer_pretty(&mut *writer, value)
            .map_err(|err| GaldynError::Output(err.to_string()))?;
        writer
            .write_all(b"\n")
            .map_err(|err| GaldynError::Output(err.to_string()))
    }
}

impl crate::app::ProgressSink for JsonOutput {
    fn event(&self, _event: crate::app::ProgressEvent) {}
}

pub struct CsvOutput;

impl CsvOutput {
    pub fn write_catalog<W: Write>(table: &CatalogTable, writer: W) -> Result<(), GaldynError> {
        Self::write_rows(
            table.columns().iter().copied(),
            table.rows().iter().map(|row| row.cells()),
            writer,
        )
    }

    pub fn write_latex<W: Write>(table: &LatexTable, writer: W) -> Result<(), GaldynError> {
        Self::write_rows(
            table.columns().iter().map(String::as_str),
            table.rows().iter().map(Vec::as_slice),
            writer,
        )
    }

    fn write_rows<'a, W: Write>(
        header: impl Iterator<Item = &'a str>,
        rows: impl Iterator<Item = &'a [Value]>,
        writer: W,
    ) -> Result<(), GaldynError> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(header)
            .map_err(|err| GaldynError::Output(err.to_string()))?;
        for row in rows {
            csv.write_record(row.iter().map(cell_text))
                .map_err(|err| GaldynError::Output(err.to_string()))?;
        }
        csv.flush().map_err(|err| GaldynError::Output(err.to_string()))
    }
}

/// NaN is written as an empty cell.
fn cell_text(value: &Value) -> String {
    match value {
        Value::Text(text) => text.clone(),
        Value::Number(number) if number.is_nan() => String::new(),
        Value::Number(number) => number.to_string(),
        Value::Flag(flag) => flag.to_string(),
    }
}
