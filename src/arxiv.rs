use std::collections::HashMap;
use std::fs;
use std::str::FromStr;
use std::sync::LazyLock;

use camino::Utf8Path;
use clap::ValueEnum;
use regex::Regex;
use serde::Serialize;
use serde::ser::{SerializeMap, SerializeSeq, Serializer};

use crate::catalog::Value;
use crate::domain::{Eprint, SourceLocator, TransportKind};
use crate::error::GaldynError;

pub const ARXIV_EPRINT_URL: &str = "https://arxiv.org/e-print/";

const DEFAULT_NA_VALUES: &[&str] = &["", "NaN", "nan", "NA", "N/A", "n/a", "NULL", "null"];

static NON_DECIMAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\d.-]+").unwrap());

pub fn source_locator(eprint: &Eprint) -> SourceLocator {
    SourceLocator::new(
        format!("{ARXIV_EPRINT_URL}{}", eprint.as_str()),
        TransportKind::Curl,
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Converter {
    /// Drop everything except digits, `.` and `-`.
    NonDecimal,
    /// Take `X` out of `\multicolumn{n}{align}{X}`.
    Multicolumn,
}

impl Converter {
    pub fn apply(self, cell: &str) -> String {
        match self {
            Converter::NonDecimal => NON_DECIMAL.replace_all(cell, "").into_owned(),
            Converter::Multicolumn => cell
                .split('{')
                .nth(3)
                .and_then(|group| group.split('}').next())
                .unwrap_or(cell)
                .to_string(),
        }
    }
}

/// `column=converter`, as given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnConverter {
    pub column: String,
    pub converter: Converter,
}

impl FromStr for ColumnConverter {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (column, kind) = value
            .split_once('=')
            .ok_or_else(|| format!("expected column=converter, got {value:?}"))?;
        let converter = <Converter as ValueEnum>::from_str(kind.trim(), true)?;
        Ok(Self {
            column: column.trim().to_string(),
            converter,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct TableOptions {
    /// Column names; positional indices (`"0"`, `"1"`, ...) when absent.
    pub names: Option<Vec<String>>,
    pub skip_header: usize,
    pub skip_footer: usize,
    /// Extra cell values that mean "no data".
    pub na_values: Vec<String>,
    pub converters: Vec<ColumnConverter>,
}

/// A LaTeX `tabular` body split on `&`.
#[derive(Debug, Clone, PartialEq)]
pub struct LatexTable {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl LatexTable {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.columns.iter().position(|name| name == column)?;
        self.rows.get(row)?.get(index)
    }
}

impl Serialize for LatexTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        struct Row<'a>(&'a [String], &'a [Value]);

        impl Serialize for Row<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let mut map = serializer.serialize_map(Some(self.0.len()))?;
                for (column, value) in self.0.iter().zip(self.1) {
                    map.serialize_entry(column, value)?;
                }
                map.end()
            }
        }

        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for row in &self.rows {
            seq.serialize_element(&Row(&self.columns, row))?;
        }
        seq.end()
    }
}

pub fn read_latex_table(path: &Utf8Path, options: &TableOptions) -> Result<LatexTable, GaldynError> {
    let content = fs::read_to_string(path.as_std_path()).map_err(|err| GaldynError::TableRead {
        path: path.to_string(),
        message: err.to_string(),
    })?;
    parse_latex_table(&content, options).map_err(|message| GaldynError::TableRead {
        path: path.to_string(),
        message,
    })
}

pub fn parse_latex_table(content: &str, options: &TableOptions) -> Result<LatexTable, String> {
    let lines = content.lines().collect::<Vec<_>>();
    let end = lines.len().saturating_sub(options.skip_footer);
    let start = options.skip_header.min(end);
    let body = lines[start..end].join("\n");

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'&')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(body.as_bytes());

    let mut raw_rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| err.to_string())?;
        raw_rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }

    let columns = match &options.names {
        Some(names) => names.clone(),
        None => {
            let width = raw_rows.iter().map(Vec::len).max().unwrap_or(0);
            (0..width).map(|idx| idx.to_string()).collect()
        }
    };

    let converters = options
        .converters
        .iter()
        .map(|entry| {
            columns
                .iter()
                .position(|name| *name == entry.column)
                .map(|idx| (idx, entry.converter))
                .ok_or_else(|| format!("converter for unknown column {:?}", entry.column))
        })
        .collect::<Result<HashMap<_, _>, String>>()?;

    let mut rows = Vec::with_capacity(raw_rows.len());
    for (row_no, raw) in raw_rows.into_iter().enumerate() {
        if raw.len() > columns.len() {
            return Err(format!(
                "row {} has {} fields but only {} columns are named",
                row_no + 1,
                raw.len(),
                columns.len()
            ));
        }
        let mut row = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            let cell = match raw.get(idx) {
                Some(cell) => match converters.get(&idx) {
                    Some(converter) => converter.apply(cell),
                    None => cell.clone(),
                },
                None => String::new(),
            };
            row.push(coerce_cell(cell.trim(), &options.na_values));
        }
        rows.push(row);
    }

    Ok(LatexTable { columns, rows })
}

fn coerce_cell(cell: &str, na_values: &[String]) -> Value {
    if DEFAULT_NA_VALUES.contains(&cell) || na_values.iter().any(|na| na == cell) {
        return Value::Number(f64::NAN);
    }
    match cell.parse::<f64>() {
        Ok(value) => Value::Number(value),
        Err(_) => Value::Text(cell.to_string()),
    }
}
