//! Type definitions for the eligibility service

pub mod prediction;
pub mod record;

pub use prediction::{Eligibility, EvaluationMetrics};
pub use record::{Column, ColumnValues, Table, TableError};
