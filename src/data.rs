//! Contiguous dataset helpers.
//!
//! Every batched call in this crate takes a row-major feature matrix. `Inputs` and
//! `Dataset` provide validated storage for features and integer class labels.

use crate::{Error, Result};

/// A batch of input samples (X).
///
/// Stored as a contiguous buffer with row-major layout:
/// - `inputs.len() == len * input_dim`
#[derive(Debug, Clone, PartialEq)]
pub struct Inputs {
    inputs: Vec<f32>,
    len: usize,
    input_dim: usize,
}

impl Inputs {
    /// Build inputs from a flat buffer with shape `(len, input_dim)`.
    pub fn from_flat(inputs: Vec<f32>, input_dim: usize) -> Result<Self> {
        if input_dim == 0 {
            return Err(Error::InvalidData("input_dim must be > 0".to_owned()));
        }
        if !inputs.len().is_multiple_of(input_dim) {
            return Err(Error::InvalidData(format!(
                "inputs length {} is not divisible by input_dim {}",
                inputs.len(),
                input_dim
            )));
        }

        let len = inputs.len() / input_dim;

        Ok(Self {
            inputs,
            len,
            input_dim,
        })
    }

    /// Build inputs from per-sample rows.
    ///
    /// This is a convenience constructor (it copies into contiguous storage).
    pub fn from_rows(inputs: &[Vec<f32>]) -> Result<Self> {
        if inputs.is_empty() {
            return Err(Error::InvalidData("inputs must not be empty".to_owned()));
        }

        let input_dim = inputs[0].len();
        if input_dim == 0 {
            return Err(Error::InvalidData("input_dim must be > 0".to_owned()));
        }

        for (i, row) in inputs.iter().enumerate() {
            if row.len() != input_dim {
                return Err(Error::InvalidData(format!(
                    "input row {i} has len {}, expected {input_dim}",
                    row.len()
                )));
            }
        }

        Ok(Self {
            inputs: inputs.concat(),
            len: inputs.len(),
            input_dim,
        })
    }

    #[inline]
    /// Returns the number of samples.
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    /// Returns true if there are no samples.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    /// Returns the per-sample input dimension.
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    #[inline]
    /// Returns the whole `(len, input_dim)` buffer.
    pub fn as_slice(&self) -> &[f32] {
        &self.inputs
    }

    #[inline]
    /// Returns the `idx`-th input row (shape: `(input_dim,)`).
    ///
    /// Panics if `idx >= len`.
    pub fn input(&self, idx: usize) -> &[f32] {
        let start = idx * self.input_dim;
        &self.inputs[start..start + self.input_dim]
    }

    /// Copy rows `range` into a new batch.
    ///
    /// Panics if the range is out of bounds.
    pub fn slice(&self, range: std::ops::Range<usize>) -> Inputs {
        Inputs {
            inputs: self.inputs[range.start * self.input_dim..range.end * self.input_dim].to_vec(),
            len: range.len(),
            input_dim: self.input_dim,
        }
    }
}

/// A labelled classification dataset: inputs (X) and class ids (y).
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    inputs: Inputs,
    labels: Vec<usize>,
    num_classes: usize,
}

impl Dataset {
    /// Build a dataset from a flat `(len, input_dim)` buffer and one label per row.
    ///
    /// Every label must be `< num_classes`.
    pub fn from_flat(
        inputs: Vec<f32>,
        labels: Vec<usize>,
        input_dim: usize,
        num_classes: usize,
    ) -> Result<Self> {
        let inputs = Inputs::from_flat(inputs, input_dim)?;
        Self::new(inputs, labels, num_classes)
    }

    /// Build a dataset from validated inputs and labels.
    pub fn new(inputs: Inputs, labels: Vec<usize>, num_classes: usize) -> Result<Self> {
        if num_classes == 0 {
            return Err(Error::InvalidData("num_classes must be > 0".to_owned()));
        }
        if labels.len() != inputs.len() {
            return Err(Error::InvalidData(format!(
                "labels length {} does not match number of samples {}",
                labels.len(),
                inputs.len()
            )));
        }
        if let Some((i, &y)) = labels.iter().enumerate().find(|(_, y)| **y >= num_classes) {
            return Err(Error::InvalidData(format!(
                "label {y} at row {i} is out of range for {num_classes} classes"
            )));
        }

        Ok(Self {
            inputs,
            labels,
            num_classes,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.inputs.input_dim()
    }

    #[inline]
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    #[inline]
    /// Returns a view of the inputs (X).
    pub fn inputs(&self) -> &Inputs {
        &self.inputs
    }

    #[inline]
    /// Returns the class labels (y).
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inputs_from_flat_validates_shapes() {
        assert!(Inputs::from_flat(vec![0.0, 1.0, 2.0, 3.0], 2).is_ok());
        assert!(Inputs::from_flat(vec![0.0, 1.0, 2.0], 2).is_err());
        assert!(Inputs::from_flat(vec![], 0).is_err());
    }

    #[test]
    fn inputs_from_rows_and_slice() {
        let x = Inputs::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]).unwrap();
        assert_eq!(x.len(), 3);
        assert_eq!(x.input(1), &[3.0, 4.0]);

        let tail = x.slice(1..3);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail.as_slice(), &[3.0, 4.0, 5.0, 6.0]);

        assert!(Inputs::from_rows(&[vec![1.0], vec![1.0, 2.0]]).is_err());
    }

    #[test]
    fn dataset_validates_labels() {
        assert!(Dataset::from_flat(vec![0.0, 1.0, 2.0, 3.0], vec![0, 1], 2, 2).is_ok());
        assert!(Dataset::from_flat(vec![0.0, 1.0, 2.0, 3.0], vec![0], 2, 2).is_err());
        assert!(Dataset::from_flat(vec![0.0, 1.0, 2.0, 3.0], vec![0, 2], 2, 2).is_err());
    }
}
