//! Feature alignment for eligibility model inference.
//!
//! The model was fit against a frozen, ordered list of columns produced by
//! one-hot encoding the partner dataset with the first category of every
//! categorical column dropped. Every request has to be brought into exactly
//! that shape before it reaches the model: encode categoricals, add the
//! training columns the request lacks (as 0), drop the ones the model never
//! saw, and reorder.
//!
//! Two encoding strategies exist. `PerRequest` re-fits the one-hot encoding on
//! each request using only the categories the request contains, which is how
//! the service has always behaved: a single-row request can never switch on a
//! non-baseline indicator, because with one observed category that category
//! is the one dropped. `TrainingManifest` encodes every value against the
//! indicator columns recorded in the manifest instead, so a lone `Merchant`
//! row does set `Partner Type_Merchant`.

use crate::types::{Column, ColumnValues, Table, TableError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;
use tracing::debug;

/// How categorical columns are expanded into indicator columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodingStrategy {
    /// Drop-first one-hot encoding fitted on the request itself.
    #[default]
    PerRequest,
    /// Indicator columns looked up in the training manifest.
    TrainingManifest,
}

/// Errors raised while aligning input to the training schema.
#[derive(Debug, Error)]
pub enum AlignmentError {
    #[error("Missing value for feature '{column}' in row {row}")]
    MissingValue { column: String, row: usize },

    #[error("Training column manifest is empty")]
    EmptyManifest,

    #[error("Training column manifest lists '{0}' more than once")]
    DuplicateManifestColumn(String),

    #[error(transparent)]
    Table(#[from] TableError),
}

/// Ordered feature columns the model was trained on.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingManifest {
    columns: Vec<String>,
    lookup: HashSet<String>,
}

impl TrainingManifest {
    pub fn new(columns: Vec<String>) -> Result<Self, AlignmentError> {
        if columns.is_empty() {
            return Err(AlignmentError::EmptyManifest);
        }

        let mut lookup = HashSet::with_capacity(columns.len());
        for column in &columns {
            if !lookup.insert(column.clone()) {
                return Err(AlignmentError::DuplicateManifestColumn(column.clone()));
            }
        }

        Ok(Self { columns, lookup })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.lookup.contains(column)
    }
}

/// Dense row-major feature matrix ready for the model.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f32>,
}

impl FeatureMatrix {
    pub fn row(&self, idx: usize) -> &[f32] {
        &self.data[idx * self.cols..(idx + 1) * self.cols]
    }
}

/// Aligns input tables to the training column manifest.
pub struct FeatureAligner {
    manifest: TrainingManifest,
    strategy: EncodingStrategy,
}

impl FeatureAligner {
    pub fn new(manifest: TrainingManifest, strategy: EncodingStrategy) -> Self {
        Self { manifest, strategy }
    }

    pub fn strategy(&self) -> EncodingStrategy {
        self.strategy
    }

    /// Number of features the model expects.
    pub fn feature_count(&self) -> usize {
        self.manifest.len()
    }

    /// Bring `table` into the exact training schema.
    ///
    /// The result holds one numeric column per manifest entry, in manifest
    /// order, with no missing cells. Training columns the input lacks are 0.
    pub fn align(&self, table: &Table) -> Result<Table, AlignmentError> {
        let rows = table.row_count();
        let mut present: HashMap<String, Vec<Option<f64>>> = HashMap::new();

        for column in table.columns() {
            match &column.values {
                ColumnValues::Numeric(values) => {
                    present.insert(column.name.clone(), values.clone());
                }
                ColumnValues::Categorical(values) => {
                    let indicators = match self.strategy {
                        EncodingStrategy::PerRequest => encode_drop_first(&column.name, values),
                        EncodingStrategy::TrainingManifest => {
                            self.encode_with_manifest(&column.name, values)
                        }
                    };
                    present.extend(indicators);
                }
            }
        }

        let extra = present
            .keys()
            .filter(|name| !self.manifest.contains(name))
            .count();
        let mut missing = 0usize;

        let mut aligned = Vec::with_capacity(self.manifest.len());
        for name in self.manifest.columns() {
            let values = match present.remove(name) {
                Some(values) => {
                    if let Some(row) = values.iter().position(Option::is_none) {
                        return Err(AlignmentError::MissingValue {
                            column: name.clone(),
                            row,
                        });
                    }
                    values
                }
                None => {
                    missing += 1;
                    vec![Some(0.0); rows]
                }
            };
            aligned.push(Column::numeric(name.clone(), values));
        }

        debug!(
            rows = rows,
            features = self.manifest.len(),
            missing = missing,
            extra = extra,
            strategy = ?self.strategy,
            "Aligned input to training schema"
        );

        Ok(Table::from_columns(aligned)?)
    }

    /// Align and flatten into a row-major matrix.
    pub fn align_to_matrix(&self, table: &Table) -> Result<FeatureMatrix, AlignmentError> {
        let aligned = self.align(table)?;
        Ok(to_matrix(&aligned))
    }

    /// Set `{column}_{value}` to 1 wherever that indicator exists in the manifest.
    fn encode_with_manifest(
        &self,
        column: &str,
        values: &[Option<String>],
    ) -> Vec<(String, Vec<Option<f64>>)> {
        let mut indicators: HashMap<String, Vec<Option<f64>>> = HashMap::new();

        for (row, value) in values.iter().enumerate() {
            let Some(value) = value else { continue };
            let name = indicator_name(column, value);
            if self.manifest.contains(&name) {
                indicators
                    .entry(name)
                    .or_insert_with(|| vec![Some(0.0); values.len()])[row] = Some(1.0);
            }
        }

        indicators.into_iter().collect()
    }
}

/// Drop-first one-hot encoding over the categories present in `values`.
///
/// Categories are sorted before the first one is dropped. Missing cells get 0
/// in every indicator.
fn encode_drop_first(column: &str, values: &[Option<String>]) -> Vec<(String, Vec<Option<f64>>)> {
    let categories: BTreeSet<&str> = values.iter().flatten().map(String::as_str).collect();

    categories
        .into_iter()
        .skip(1)
        .map(|category| {
            let indicator = values
                .iter()
                .map(|v| Some(if v.as_deref() == Some(category) { 1.0 } else { 0.0 }))
                .collect();
            (indicator_name(column, category), indicator)
        })
        .collect()
}

fn indicator_name(column: &str, category: &str) -> String {
    format!("{}_{}", column, category)
}

fn to_matrix(aligned: &Table) -> FeatureMatrix {
    let rows = aligned.row_count();
    let cols = aligned.column_count();
    let mut data = Vec::with_capacity(rows * cols);

    for row in 0..rows {
        for column in aligned.columns() {
            let value = match &column.values {
                ColumnValues::Numeric(values) => values[row].unwrap_or(0.0),
                ColumnValues::Categorical(_) => 0.0,
            };
            data.push(value as f32);
        }
    }

    FeatureMatrix { rows, cols, data }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest() -> TrainingManifest {
        TrainingManifest::new(vec![
            "Earnings (Value)".to_string(),
            "Time on Platform (Months)".to_string(),
            "Partner Type_Merchant".to_string(),
            "Earnings (Stability Type)_Stable".to_string(),
            "Earnings (Stability Type)_Variable".to_string(),
        ])
        .unwrap()
    }

    fn aligner(strategy: EncodingStrategy) -> FeatureAligner {
        FeatureAligner::new(manifest(), strategy)
    }

    fn numeric(table: &Table, name: &str) -> Vec<Option<f64>> {
        match &table.column(name).unwrap().values {
            ColumnValues::Numeric(values) => values.clone(),
            ColumnValues::Categorical(_) => panic!("{} is categorical", name),
        }
    }

    #[test]
    fn test_missing_columns_filled_in_training_order() {
        let table = Table::from_json_record(&json!({"Time on Platform (Months)": 12})).unwrap();
        let aligned = aligner(EncodingStrategy::PerRequest).align(&table).unwrap();

        assert_eq!(aligned.column_names(), manifest().columns().iter().map(String::as_str).collect::<Vec<_>>());
        assert_eq!(numeric(&aligned, "Time on Platform (Months)"), vec![Some(12.0)]);
        assert_eq!(numeric(&aligned, "Earnings (Value)"), vec![Some(0.0)]);
        assert_eq!(numeric(&aligned, "Partner Type_Merchant"), vec![Some(0.0)]);
    }

    #[test]
    fn test_extra_columns_dropped() {
        let table = Table::from_json_record(&json!({
            "Earnings (Value)": 1500,
            "Partner ID": "00042",
            "Favourite Colour": "blue"
        }))
        .unwrap();
        let aligned = aligner(EncodingStrategy::PerRequest).align(&table).unwrap();

        assert_eq!(aligned.column_count(), 5);
        assert!(!aligned.contains("Partner ID"));
        assert!(!aligned.contains("Favourite Colour"));
    }

    #[test]
    fn test_align_is_idempotent() {
        let csv = "Earnings (Value),Time on Platform (Months),Partner Type\n\
                   1500,12,Driver\n\
                   900,30,Merchant\n";
        let table = Table::from_csv_reader(csv.as_bytes()).unwrap();
        let aligner = aligner(EncodingStrategy::PerRequest);

        let once = aligner.align(&table).unwrap();
        let twice = aligner.align(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_per_request_drop_first_in_batch() {
        let csv = "Partner Type,Earnings (Stability Type)\n\
                   Driver,Seasonal\n\
                   Merchant,Stable\n\
                   Driver,Variable\n";
        let table = Table::from_csv_reader(csv.as_bytes()).unwrap();
        let aligned = aligner(EncodingStrategy::PerRequest).align(&table).unwrap();

        assert_eq!(
            numeric(&aligned, "Partner Type_Merchant"),
            vec![Some(0.0), Some(1.0), Some(0.0)]
        );
        assert_eq!(
            numeric(&aligned, "Earnings (Stability Type)_Stable"),
            vec![Some(0.0), Some(1.0), Some(0.0)]
        );
        assert_eq!(
            numeric(&aligned, "Earnings (Stability Type)_Variable"),
            vec![Some(0.0), Some(0.0), Some(1.0)]
        );
    }

    #[test]
    fn test_per_request_single_row_never_sets_indicator() {
        let table = Table::from_json_record(&json!({"Partner Type": "Merchant"})).unwrap();
        let aligned = aligner(EncodingStrategy::PerRequest).align(&table).unwrap();

        assert_eq!(numeric(&aligned, "Partner Type_Merchant"), vec![Some(0.0)]);
    }

    #[test]
    fn test_training_manifest_single_row_sets_indicator() {
        let table = Table::from_json_record(&json!({
            "Partner Type": "Merchant",
            "Earnings (Stability Type)": "Seasonal"
        }))
        .unwrap();
        let aligned = aligner(EncodingStrategy::TrainingManifest).align(&table).unwrap();

        assert_eq!(numeric(&aligned, "Partner Type_Merchant"), vec![Some(1.0)]);
        // Seasonal is the dropped baseline category
        assert_eq!(numeric(&aligned, "Earnings (Stability Type)_Stable"), vec![Some(0.0)]);
        assert_eq!(numeric(&aligned, "Earnings (Stability Type)_Variable"), vec![Some(0.0)]);
    }

    #[test]
    fn test_missing_numeric_value_rejected() {
        let table = Table::from_csv_reader("Earnings (Value),x\n1500,1\n,2\n".as_bytes()).unwrap();
        let err = aligner(EncodingStrategy::PerRequest).align(&table).unwrap_err();

        assert!(matches!(
            err,
            AlignmentError::MissingValue { ref column, row: 1 } if column == "Earnings (Value)"
        ));
    }

    #[test]
    fn test_matrix_layout() {
        let table = Table::from_json_record(&json!({
            "Earnings (Value)": 1500,
            "Time on Platform (Months)": 12
        }))
        .unwrap();
        let matrix = aligner(EncodingStrategy::PerRequest)
            .align_to_matrix(&table)
            .unwrap();

        assert_eq!(matrix.rows, 1);
        assert_eq!(matrix.cols, 5);
        assert_eq!(matrix.row(0), &[1500.0, 12.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_manifest_rejects_duplicates() {
        assert!(matches!(
            TrainingManifest::new(vec!["a".into(), "a".into()]),
            Err(AlignmentError::DuplicateManifestColumn(ref c)) if c == "a"
        ));
        assert!(matches!(
            TrainingManifest::new(vec![]),
            Err(AlignmentError::EmptyManifest)
        ));
    }
}
