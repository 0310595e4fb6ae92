//! Fixed-width parser for the Harris (1996, 2010 edition) catalog of Milky
//! Way globular clusters.
//!
//! The file holds three blocks of rows that all start with the cluster ID:
//! positions (primary), photometry (secondary) and kinematics/structure
//! (tertiary). Fields sit at fixed character columns, so every block is
//! described by a table of [`FieldSpec`]s instead of slicing code. The
//! primary block defines row identity and any malformed number in it is an
//! error; numbers in the other blocks fall back to NaN.

use std::collections::HashMap;
use std::fmt::Display;
use std::ops::Range;
use std::str::FromStr;

use serde::Serialize;
use serde::ser::{SerializeMap, SerializeSeq, Serializer};

use crate::error::GaldynError;

/// Stored for an empty primary-section name and for rows that never appear
/// in the secondary section's spectral-type column.
pub const MISSING_TEXT: &str = "---";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    /// Trimmed text, kept verbatim.
    Text,
    /// Parsed as a float, NaN when it does not parse.
    FloatOrMissing,
    /// True when the character at `start` equals the marker.
    Flag(char),
}

/// A half-open character range `[start, end)`; `end = None` runs to the end
/// of the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Columns {
    pub start: usize,
    pub end: Option<usize>,
}

impl Columns {
    pub const fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    pub const fn to_end(start: usize) -> Self {
        Self { start, end: None }
    }

    pub fn slice<'a>(&self, line: &'a str) -> &'a str {
        let byte_at = |col: usize| {
            line.char_indices()
                .nth(col)
                .map(|(idx, _)| idx)
                .unwrap_or(line.len())
        };
        let from = byte_at(self.start);
        let to = self.end.map_or(line.len(), byte_at).max(from);
        &line[from..to]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub columns: Columns,
    pub coercion: Coercion,
}

const fn float(name: &'static str, start: usize, end: usize) -> FieldSpec {
    FieldSpec {
        name,
        columns: Columns::new(start, end),
        coercion: Coercion::FloatOrMissing,
    }
}

/// Layout of the block that defines row identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimarySpec {
    pub id: Columns,
    pub name: Columns,
    /// Right ascension as `hh mm ss.s`.
    pub ra: Columns,
    /// Declination as `[+-]dd mm ss`; the sign is read from the first column.
    pub dec: Columns,
    /// Whitespace-separated numbers after the coordinates, assigned in order.
    pub trailing_from: usize,
    pub trailing: &'static [&'static str],
}

/// Layout of a block joined onto the primary rows by ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionSpec {
    pub label: &'static str,
    pub id: Columns,
    pub fields: &'static [FieldSpec],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogFormat {
    pub primary_lines: Range<usize>,
    pub secondary_lines: Range<usize>,
    pub tertiary_lines: Range<usize>,
    pub primary: PrimarySpec,
    pub secondary: SectionSpec,
    pub tertiary: SectionSpec,
}

const HARRIS_ID: Columns = Columns::new(0, 10);

const HARRIS_SECONDARY_FIELDS: &[FieldSpec] = &[
    float("[Fe/H]", 13, 18),
    float("wt", 19, 21),
    float("E(B-V)", 24, 28),
    float("V_HB", 29, 34),
    float("(m-M)V", 35, 40),
    float("V_t", 42, 46),
    float("M_V,t", 48, 53),
    float("U-B", 56, 60),
    float("B-V", 62, 66),
    float("V-R", 68, 72),
    float("V-I", 74, 78),
    FieldSpec {
        name: "spt",
        columns: Columns::new(80, 82),
        coercion: Coercion::Text,
    },
    FieldSpec {
        name: "ellip",
        columns: Columns::to_end(86),
        coercion: Coercion::FloatOrMissing,
    },
];

const HARRIS_TERTIARY_FIELDS: &[FieldSpec] = &[
    float("v_r", 13, 19),
    float("v_r_unc", 21, 25),
    float("v_LSR", 27, 33),
    float("sig_v", 37, 41),
    float("sig_v_unc", 43, 47),
    float("c", 50, 54),
    float("r_c", 59, 64),
    float("r_h", 66, 70),
    float("mu_V", 73, 78),
    float("rho_0", 80, 85),
    float("lg(tc)", 88, 91),
    float("lg(th)", 93, 98),
    FieldSpec {
        name: "core_collapsed",
        columns: Columns::new(56, 57),
        coercion: Coercion::Flag('c'),
    },
];

/// The 2010 edition of `mwgc.dat`.
pub const HARRIS_2010: CatalogFormat = CatalogFormat {
    primary_lines: 72..229,
    secondary_lines: 252..409,
    tertiary_lines: 433..590,
    primary: PrimarySpec {
        id: HARRIS_ID,
        name: Columns::new(10, 25),
        ra: Columns::new(25, 36),
        dec: Columns::new(38, 49),
        trailing_from: 49,
        trailing: &["L", "B", "R_Sun", "R_gc", "X", "Y", "Z"],
    },
    secondary: SectionSpec {
        label: "secondary",
        id: HARRIS_ID,
        fields: HARRIS_SECONDARY_FIELDS,
    },
    tertiary: SectionSpec {
        label: "tertiary",
        id: HARRIS_ID,
        fields: HARRIS_TERTIARY_FIELDS,
    },
};

const PRIMARY_FIXED_COLUMNS: [&str; 4] = ["ID", "Name", "RA", "DEC"];

impl CatalogFormat {
    /// Same field layout, different block boundaries.
    pub fn with_line_ranges(
        &self,
        primary: Range<usize>,
        secondary: Range<usize>,
        tertiary: Range<usize>,
    ) -> Self {
        Self {
            primary_lines: primary,
            secondary_lines: secondary,
            tertiary_lines: tertiary,
            ..self.clone()
        }
    }

    /// Every output column in order, with the value a row holds before any
    /// block fills it in.
    fn schema(&self) -> (Vec<&'static str>, Vec<Value>) {
        let mut names = Vec::new();
        let mut missing = Vec::new();
        for name in PRIMARY_FIXED_COLUMNS {
            names.push(name);
            missing.push(match name {
                "ID" | "Name" => Value::Text(MISSING_TEXT.to_string()),
                _ => Value::Number(f64::NAN),
            });
        }
        for name in self.primary.trailing {
            names.push(*name);
            missing.push(Value::Number(f64::NAN));
        }
        for spec in self.secondary.fields.iter().chain(self.tertiary.fields) {
            names.push(spec.name);
            missing.push(match spec.coercion {
                Coercion::Text => Value::Text(MISSING_TEXT.to_string()),
                Coercion::FloatOrMissing => Value::Number(f64::NAN),
                Coercion::Flag(_) => Value::Flag(false),
            });
        }
        (names, missing)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Text(String),
    Number(f64),
    Flag(bool),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Flag(value) => Some(*value),
            _ => None,
        }
    }

    /// True for the NaN sentinel.
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Number(value) if value.is_nan())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogRow {
    id: String,
    cells: Vec<Value>,
}

impl CatalogRow {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn cells(&self) -> &[Value] {
        &self.cells
    }
}

/// One row per primary-section line, every column present.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogTable {
    columns: Vec<&'static str>,
    rows: Vec<CatalogRow>,
}

impl CatalogTable {
    pub fn columns(&self) -> &[&'static str] {
        &self.columns
    }

    pub fn rows(&self) -> &[CatalogRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| *column == name)
    }

    pub fn row(&self, id: &str) -> Option<&CatalogRow> {
        self.rows.iter().find(|row| row.id == id)
    }

    pub fn value(&self, id: &str, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.row(id)?.cells.get(index)
    }

    pub fn number(&self, id: &str, column: &str) -> Option<f64> {
        self.value(id, column)?.as_f64()
    }
}

struct RowView<'a> {
    columns: &'a [&'static str],
    row: &'a CatalogRow,
}

impl Serialize for RowView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in self.columns.iter().zip(&self.row.cells) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

impl Serialize for CatalogTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for row in &self.rows {
            seq.serialize_element(&RowView {
                columns: &self.columns,
                row,
            })?;
        }
        seq.end()
    }
}

/// `15·h + m/4 + s/240`
pub fn hms_to_degrees(hours: f64, minutes: f64, seconds: f64) -> f64 {
    hours * 15.0 + minutes / 4.0 + seconds / 240.0
}

/// `sign·(|d| + m/60 + s/3600)`; the sign is passed separately so `-00`
/// declinations keep it.
pub fn dms_to_degrees(negative: bool, degrees: f64, minutes: f64, seconds: f64) -> f64 {
    let sign = if negative { -1.0 } else { 1.0 };
    sign * (degrees.abs() + minutes / 60.0 + seconds / 3600.0)
}

pub fn assemble<S: AsRef<str>>(lines: &[S]) -> Result<CatalogTable, GaldynError> {
    assemble_with_format(lines, &HARRIS_2010)
}

pub fn assemble_with_format<S: AsRef<str>>(
    lines: &[S],
    format: &CatalogFormat,
) -> Result<CatalogTable, GaldynError> {
    let (columns, missing) = format.schema();

    let mut rows = Vec::new();
    let mut index = HashMap::new();
    for (line_no, line) in section(lines, &format.primary_lines) {
        let row = parse_primary(&format.primary, line, line_no, &missing)?;
        index.entry(row.id.clone()).or_insert(rows.len());
        rows.push(row);
    }

    let secondary_base = PRIMARY_FIXED_COLUMNS.len() + format.primary.trailing.len();
    let tertiary_base = secondary_base + format.secondary.fields.len();
    join_section(
        &mut rows,
        &index,
        section(lines, &format.secondary_lines),
        &format.secondary,
        secondary_base,
    )?;
    join_section(
        &mut rows,
        &index,
        section(lines, &format.tertiary_lines),
        &format.tertiary,
        tertiary_base,
    )?;

    Ok(CatalogTable { columns, rows })
}

/// Lines of one block paired with their 1-based line numbers. Ranges past
/// the end of the input are clipped.
fn section<'a, S: AsRef<str>>(
    lines: &'a [S],
    range: &Range<usize>,
) -> impl Iterator<Item = (usize, &'a str)> + 'a {
    let start = range.start.min(lines.len());
    let end = range.end.clamp(start, lines.len());
    lines[start..end]
        .iter()
        .enumerate()
        .map(move |(offset, line)| (start + offset + 1, line.as_ref()))
}

fn parse_primary(
    spec: &PrimarySpec,
    line: &str,
    line_no: usize,
    missing: &[Value],
) -> Result<CatalogRow, GaldynError> {
    let mut cells = missing.to_vec();

    let id = spec.id.slice(line).trim().to_string();
    let name = match spec.name.slice(line).trim() {
        "" => MISSING_TEXT.to_string(),
        name => name.to_string(),
    };

    let ra_field = spec.ra.slice(line);
    let mut ra = ra_field.split_whitespace();
    let hours: i32 = primary_token(ra.next(), "RA", line_no)?;
    let minutes: i32 = primary_token(ra.next(), "RA", line_no)?;
    let seconds: f64 = primary_token(ra.next(), "RA", line_no)?;

    let dec_field = spec.dec.slice(line);
    let negative = dec_field.starts_with('-');
    let mut dec = dec_field.split_whitespace();
    let degrees: i32 = primary_token(dec.next(), "DEC", line_no)?;
    let arcmin: i32 = primary_token(dec.next(), "DEC", line_no)?;
    let arcsec: f64 = primary_token(dec.next(), "DEC", line_no)?;

    cells[0] = Value::Text(id.clone());
    cells[1] = Value::Text(name);
    cells[2] = Value::Number(hms_to_degrees(
        f64::from(hours),
        f64::from(minutes),
        seconds,
    ));
    cells[3] = Value::Number(dms_to_degrees(
        negative,
        f64::from(degrees),
        f64::from(arcmin),
        arcsec,
    ));

    let trailing = Columns::to_end(spec.trailing_from).slice(line);
    for (offset, (token, field)) in trailing
        .split_whitespace()
        .zip(spec.trailing.iter())
        .enumerate()
    {
        let value: f64 = primary_token(Some(token), *field, line_no)?;
        cells[PRIMARY_FIXED_COLUMNS.len() + offset] = Value::Number(value);
    }

    Ok(CatalogRow { id, cells })
}

fn primary_token<T>(token: Option<&str>, field: &'static str, line: usize) -> Result<T, GaldynError>
where
    T: FromStr,
    T::Err: Display,
{
    let token = token.ok_or_else(|| GaldynError::MalformedPrimaryField {
        line,
        field,
        value: String::new(),
        message: "missing value".to_string(),
    })?;
    token
        .parse()
        .map_err(|err: T::Err| GaldynError::MalformedPrimaryField {
            line,
            field,
            value: token.to_string(),
            message: err.to_string(),
        })
}

fn join_section<'a>(
    rows: &mut [CatalogRow],
    index: &HashMap<String, usize>,
    lines: impl Iterator<Item = (usize, &'a str)>,
    spec: &SectionSpec,
    base: usize,
) -> Result<(), GaldynError> {
    for (line_no, line) in lines {
        let id = spec.id.slice(line).trim();
        let row = index.get(id).ok_or_else(|| GaldynError::Lookup {
            section: spec.label,
            line: line_no,
            id: id.to_string(),
        })?;
        let cells = &mut rows[*row].cells;
        for (offset, field) in spec.fields.iter().enumerate() {
            cells[base + offset] = coerce(field, line);
        }
    }
    Ok(())
}

fn coerce(field: &FieldSpec, line: &str) -> Value {
    match field.coercion {
        Coercion::Text => Value::Text(field.columns.slice(line).trim().to_string()),
        Coercion::FloatOrMissing => Value::Number(
            field
                .columns
                .slice(line)
                .trim()
                .parse()
                .unwrap_or(f64::NAN),
        ),
        Coercion::Flag(marker) => {
            Value::Flag(line.chars().nth(field.columns.start) == Some(marker))
        }
    }
}
