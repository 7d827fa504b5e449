//! Tabular input records submitted for eligibility scoring.
//!
//! Both entry points end up here: a single JSON object becomes a one-row
//! table, a CSV upload becomes an N-row table. Columns are typed once when the
//! table is built, the same way a dataframe library would infer dtypes: a
//! column is numeric only if every non-empty cell parses as a number.

use serde_json::{Map, Number, Value};
use std::collections::HashSet;
use std::io::{Read, Write};
use thiserror::Error;

/// Cell spellings treated as missing values when reading CSV uploads.
const MISSING_MARKERS: &[&str] = &[
    "", "#N/A", "N/A", "NA", "n/a", "NaN", "nan", "-NaN", "-nan", "NULL", "null", "None", "<NA>",
];

/// Errors raised while turning a request payload into a [`Table`].
#[derive(Debug, Error)]
pub enum TableError {
    #[error("Request body must be a JSON object of field name to value")]
    NotAnObject,

    #[error("Unsupported value for field '{0}': nested arrays and objects are not allowed")]
    UnsupportedValue(String),

    #[error("CSV upload has no header row")]
    MissingHeader,

    #[error("Failed to parse CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Column '{column}' has {got} values, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        got: usize,
    },
}

/// Values of a single column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Numeric(Vec<Option<f64>>),
    Categorical(Vec<Option<String>>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Numeric(values) => values.len(),
            ColumnValues::Categorical(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_categorical(&self) -> bool {
        matches!(self, ColumnValues::Categorical(_))
    }

    /// True when every cell is missing.
    pub fn is_all_missing(&self) -> bool {
        match self {
            ColumnValues::Numeric(values) => values.iter().all(Option::is_none),
            ColumnValues::Categorical(values) => values.iter().all(Option::is_none),
        }
    }

    /// Cell rendered as text, `None` when missing.
    pub fn text(&self, row: usize) -> Option<String> {
        match self {
            ColumnValues::Numeric(values) => values[row].map(format_number),
            ColumnValues::Categorical(values) => values[row].clone(),
        }
    }

    fn json(&self, row: usize) -> Value {
        match self {
            ColumnValues::Numeric(values) => values[row].map(number_to_json).unwrap_or(Value::Null),
            ColumnValues::Categorical(values) => values[row]
                .as_ref()
                .map(|s| Value::String(s.clone()))
                .unwrap_or(Value::Null),
        }
    }
}

/// A named column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: ColumnValues,
}

impl Column {
    pub fn numeric(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            values: ColumnValues::Numeric(values),
        }
    }

    pub fn categorical(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            values: ColumnValues::Categorical(values),
        }
    }
}

/// Ordered set of equally long columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<Column>,
    rows: usize,
}

impl Table {
    /// Create an empty table with a fixed row count.
    pub fn with_rows(rows: usize) -> Self {
        Self {
            columns: Vec::new(),
            rows,
        }
    }

    /// Build a table from columns, checking they all have the same length.
    pub fn from_columns(columns: Vec<Column>) -> Result<Self, TableError> {
        let rows = columns.first().map(|c| c.values.len()).unwrap_or(0);
        let mut table = Self::with_rows(rows);
        for column in columns {
            table.set_column(column)?;
        }
        Ok(table)
    }

    /// Build a one-row table from a JSON object.
    ///
    /// Strings are categorical, numbers numeric and booleans become 1/0.
    /// A `null` field is kept as an empty categorical column: it carries no
    /// category and therefore contributes nothing after encoding.
    pub fn from_json_record(record: &Value) -> Result<Self, TableError> {
        let object = record.as_object().ok_or(TableError::NotAnObject)?;
        let mut table = Self::with_rows(1);

        for (name, value) in object {
            let column = match value {
                Value::Number(n) => Column::numeric(name.clone(), vec![n.as_f64()]),
                Value::Bool(b) => Column::numeric(name.clone(), vec![Some(if *b { 1.0 } else { 0.0 })]),
                Value::String(s) => Column::categorical(name.clone(), vec![Some(s.clone())]),
                Value::Null => Column::categorical(name.clone(), vec![None]),
                Value::Array(_) | Value::Object(_) => {
                    return Err(TableError::UnsupportedValue(name.clone()))
                }
            };
            table.set_column(column)?;
        }

        Ok(table)
    }

    /// Parse a CSV document with a header row.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, TableError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        if headers.is_empty() {
            return Err(TableError::MissingHeader);
        }
        let names = dedup_headers(headers.iter());

        let mut raw: Vec<Vec<Option<String>>> = vec![Vec::new(); names.len()];
        for record in csv_reader.records() {
            let record = record?;
            for (idx, cell) in record.iter().enumerate() {
                let cell = if MISSING_MARKERS.contains(&cell.trim()) {
                    None
                } else {
                    Some(cell.to_string())
                };
                raw[idx].push(cell);
            }
        }

        let rows = raw.first().map(Vec::len).unwrap_or(0);
        let mut table = Self::with_rows(rows);
        for (name, cells) in names.into_iter().zip(raw) {
            table.set_column(infer_column(name, cells))?;
        }

        Ok(table)
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Remove a column, returning it if it existed.
    pub fn remove_column(&mut self, name: &str) -> Option<Column> {
        let idx = self.columns.iter().position(|c| c.name == name)?;
        Some(self.columns.remove(idx))
    }

    /// Replace a column in place, or append it when the name is new.
    pub fn set_column(&mut self, column: Column) -> Result<(), TableError> {
        if column.values.len() != self.rows {
            return Err(TableError::LengthMismatch {
                column: column.name,
                expected: self.rows,
                got: column.values.len(),
            });
        }

        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
        Ok(())
    }

    /// Drop every column whose cells are all missing. Returns the dropped names.
    pub fn drop_empty_columns(&mut self) -> Vec<String> {
        let rows = self.rows;
        let (empty, kept): (Vec<Column>, Vec<Column>) = std::mem::take(&mut self.columns)
            .into_iter()
            .partition(|c| rows > 0 && c.values.is_all_missing());
        self.columns = kept;
        empty.into_iter().map(|c| c.name).collect()
    }

    /// Rows as JSON objects, keys in column order.
    pub fn to_records(&self) -> Vec<Map<String, Value>> {
        (0..self.rows)
            .map(|row| {
                self.columns
                    .iter()
                    .map(|c| (c.name.clone(), c.values.json(row)))
                    .collect()
            })
            .collect()
    }

    /// Write the table as CSV, optionally preceded by a header row.
    pub fn write_csv<W: Write>(&self, writer: W, include_header: bool) -> csv::Result<()> {
        let mut csv_writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);

        if include_header {
            csv_writer.write_record(self.columns.iter().map(|c| c.name.as_str()))?;
        }
        for row in 0..self.rows {
            csv_writer.write_record(
                self.columns
                    .iter()
                    .map(|c| c.values.text(row).unwrap_or_default()),
            )?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}

/// Render a number the way it was most likely written: integral values
/// without a fractional part.
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

fn number_to_json(value: f64) -> Value {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        Value::Number(Number::from(value as i64))
    } else {
        Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
    }
}

/// Numeric when every present cell parses as a finite number.
fn infer_column(name: String, cells: Vec<Option<String>>) -> Column {
    let parsed: Option<Vec<Option<f64>>> = cells
        .iter()
        .map(|cell| match cell {
            None => Some(None),
            Some(text) => text
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Some),
        })
        .collect();

    match parsed {
        Some(values) => Column::numeric(name, values),
        None => Column::categorical(name, cells),
    }
}

/// Repeated header names get a `.N` suffix so every column stays addressable.
fn dedup_headers<'a>(headers: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    headers
        .map(|header| {
            let mut name = header.to_string();
            let mut suffix = 1;
            while !seen.insert(name.clone()) {
                name = format!("{}.{}", header, suffix);
                suffix += 1;
            }
            name
        })
        .collect()
}
