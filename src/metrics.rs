//! Metrics.
//!
//! Metrics are evaluation helpers (they do not participate in backprop). They are
//! computed per model by [`crate::MultiConfusionMatrix`] and collected into a
//! [`MetricsReport`], one row per model.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Supported classification metrics.
pub enum Metric {
    /// Fraction of correctly classified samples.
    OverallAccuracy,
    /// Multiclass Matthews correlation coefficient.
    MatthewsCorrCoef,
}

impl Metric {
    /// Report column order.
    pub const ALL: [Metric; 2] = [Metric::OverallAccuracy, Metric::MatthewsCorrCoef];

    pub fn name(self) -> &'static str {
        match self {
            Metric::OverallAccuracy => "overall_acc",
            Metric::MatthewsCorrCoef => "matthews_corrcoef",
        }
    }

    /// Column name in a report, e.g. `train_overall_acc` for prefix `train_`.
    pub fn column(self, prefix: Option<&str>) -> String {
        format!("{}{}", prefix.unwrap_or(""), self.name())
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One model's metric values, in report column order.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub model_id: usize,
    pub values: Vec<f64>,
}

/// Per-model metrics table.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsReport {
    columns: Vec<String>,
    rows: Vec<ReportRow>,
}

impl MetricsReport {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub(crate) fn push_row(&mut self, model_id: usize, values: Vec<f64>) {
        debug_assert_eq!(values.len(), self.columns.len());
        self.rows.push(ReportRow { model_id, values });
    }

    #[inline]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[inline]
    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value of `column` for the row keyed by `model_id`.
    pub fn get(&self, model_id: usize, column: &str) -> Option<f64> {
        let col = self.columns.iter().position(|c| c == column)?;
        self.rows
            .iter()
            .find(|r| r.model_id == model_id)
            .map(|r| r.values[col])
    }

    /// All values of `column`, in row order.
    pub fn column_values(&self, column: &str) -> Option<Vec<f64>> {
        let col = self.columns.iter().position(|c| c == column)?;
        Some(self.rows.iter().map(|r| r.values[col]).collect())
    }
}

impl fmt::Display for MetricsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "model_id")?;
        for c in &self.columns {
            write!(f, "\t{c}")?;
        }
        for row in &self.rows {
            write!(f, "\n{}", row.model_id)?;
            for v in &row.values {
                write!(f, "\t{v:.6}")?;
            }
        }
        Ok(())
    }
}
