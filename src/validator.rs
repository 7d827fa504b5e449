//! Range checks on selected numeric fields before inference.
//!
//! Only fields present under the configured names are checked. Trips are
//! checked before earnings and the first violated field rejects the request.

use crate::types::record::format_number;
use crate::types::{ColumnValues, Table};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Field names and inclusive bounds.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct FieldBounds {
    pub trips_field: String,
    pub min_trips: f64,
    pub max_trips: f64,
    pub earnings_field: String,
    pub min_earnings: f64,
    pub max_earnings: f64,
}

impl Default for FieldBounds {
    fn default() -> Self {
        Self {
            trips_field: "Number of Trips".to_string(),
            min_trips: 0.0,
            max_trips: 1000.0,
            earnings_field: "Earnings".to_string(),
            min_earnings: 0.0,
            max_earnings: 100_000.0,
        }
    }
}

/// A rejected request.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("Invalid number of trips: {value}. Must be between {min} and {max}.")]
    Trips { value: String, min: String, max: String },

    #[error("Invalid earnings: {value}. Must be between {min} and {max}.")]
    Earnings { value: String, min: String, max: String },

    #[error("Invalid number of trips in rows: {0:?}")]
    TripsRows(Vec<usize>),

    #[error("Invalid earnings in rows: {0:?}")]
    EarningsRows(Vec<usize>),
}

#[derive(Clone, Copy)]
enum Field {
    Trips,
    Earnings,
}

/// Validates single records and uploaded tables against [`FieldBounds`].
#[derive(Debug, Clone, Default)]
pub struct InputValidator {
    bounds: FieldBounds,
}

impl InputValidator {
    pub fn new(bounds: FieldBounds) -> Self {
        Self { bounds }
    }

    /// Validate a single JSON record, reporting the first violation.
    ///
    /// `null` values count as absent; non-numeric values are violations.
    pub fn validate_record(&self, record: &Value) -> Result<(), ValidationError> {
        for field in [Field::Trips, Field::Earnings] {
            let (name, min, max) = self.field(field);
            let value = match record.get(name) {
                None | Some(Value::Null) => continue,
                Some(value) => value,
            };

            let numeric = match value {
                Value::Number(n) => n.as_f64(),
                Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
                _ => None,
            };
            if numeric.map_or(true, |v| v < min || v > max) {
                let shown = match (numeric, value) {
                    (Some(v), _) => format_number(v),
                    (None, Value::String(s)) => s.clone(),
                    (None, other) => other.to_string(),
                };
                return Err(self.single_error(field, shown));
            }
        }
        Ok(())
    }

    /// Validate every row of a table, reporting offending row indices of the
    /// first violated field.
    pub fn validate_table(&self, table: &Table) -> Result<(), ValidationError> {
        for field in [Field::Trips, Field::Earnings] {
            let (name, min, max) = self.field(field);
            let Some(column) = table.column(name) else { continue };

            let out_of_range = |v: f64| v < min || v > max;
            let rows: Vec<usize> = match &column.values {
                ColumnValues::Numeric(values) => values
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| v.map_or(false, out_of_range))
                    .map(|(row, _)| row)
                    .collect(),
                ColumnValues::Categorical(values) => values
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| {
                        v.as_deref().map_or(false, |text| {
                            text.trim().parse::<f64>().map_or(true, out_of_range)
                        })
                    })
                    .map(|(row, _)| row)
                    .collect(),
            };

            if !rows.is_empty() {
                return Err(match field {
                    Field::Trips => ValidationError::TripsRows(rows),
                    Field::Earnings => ValidationError::EarningsRows(rows),
                });
            }
        }
        Ok(())
    }

    fn field(&self, field: Field) -> (&str, f64, f64) {
        match field {
            Field::Trips => (&self.bounds.trips_field, self.bounds.min_trips, self.bounds.max_trips),
            Field::Earnings => (
                &self.bounds.earnings_field,
                self.bounds.min_earnings,
                self.bounds.max_earnings,
            ),
        }
    }

    fn single_error(&self, field: Field, value: String) -> ValidationError {
        let (_, min, max) = self.field(field);
        let (min, max) = (format_number(min), format_number(max));
        match field {
            Field::Trips => ValidationError::Trips { value, min, max },
            Field::Earnings => ValidationError::Earnings { value, min, max },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validator() -> InputValidator {
        InputValidator::default()
    }

    #[test]
    fn test_trips_bounds() {
        let v = validator();
        assert!(v.validate_record(&json!({"Number of Trips": 0})).is_ok());
        assert!(v.validate_record(&json!({"Number of Trips": 1000})).is_ok());

        let err = v.validate_record(&json!({"Number of Trips": -1})).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid number of trips: -1. Must be between 0 and 1000."
        );
        assert!(v.validate_record(&json!({"Number of Trips": 1001})).is_err());
    }

    #[test]
    fn test_earnings_bounds() {
        let err = validator()
            .validate_record(&json!({"Earnings": 100000.5}))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid earnings: 100000.5. Must be between 0 and 100000."
        );
    }

    #[test]
    fn test_trips_reported_before_earnings() {
        let err = validator()
            .validate_record(&json!({"Earnings": -5, "Number of Trips": 5000}))
            .unwrap_err();
        assert!(matches!(err, ValidationError::Trips { .. }));
    }

    #[test]
    fn test_absent_and_null_fields_pass() {
        let v = validator();
        assert!(v.validate_record(&json!({"Partner Type": "Driver"})).is_ok());
        assert!(v.validate_record(&json!({"Number of Trips": null})).is_ok());
    }

    #[test]
    fn test_non_numeric_value_rejected() {
        let err = validator()
            .validate_record(&json!({"Number of Trips": "lots"}))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid number of trips: lots. Must be between 0 and 1000."
        );
    }

    #[test]
    fn test_table_reports_rows() {
        let csv = "Number of Trips,Earnings\n10,500\n-3,200000\n1001,\n";
        let table = Table::from_csv_reader(csv.as_bytes()).unwrap();

        let err = validator().validate_table(&table).unwrap_err();
        assert_eq!(err, ValidationError::TripsRows(vec![1, 2]));
        assert_eq!(err.to_string(), "Invalid number of trips in rows: [1, 2]");
    }

    #[test]
    fn test_table_earnings_rows() {
        let csv = "Number of Trips,Earnings\n10,500\n20,200000\n";
        let table = Table::from_csv_reader(csv.as_bytes()).unwrap();

        assert_eq!(
            validator().validate_table(&table).unwrap_err().to_string(),
            "Invalid earnings in rows: [1]"
        );
    }

    #[test]
    fn test_custom_field_names() {
        let v = InputValidator::new(FieldBounds {
            trips_field: "Order/Trip Volume".to_string(),
            ..FieldBounds::default()
        });
        assert!(v.validate_record(&json!({"Order/Trip Volume": 1200})).is_err());
        assert!(v.validate_record(&json!({"Number of Trips": 1200})).is_ok());
    }
}
