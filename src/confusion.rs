//! Confusion matrices for many models at once.
//!
//! [`MultiConfusionMatrix`] keeps one `n_classes x n_classes` count matrix per model
//! (rows are ground truth, columns are predictions). All models are scored against the
//! same targets, so a batch of predictions of shape `(batch, n_models)` updates every
//! matrix in one call. Counts accumulate across calls until [`MultiConfusionMatrix::reset`].

use std::borrow::Cow;

use log::debug;

use crate::metrics::{Metric, MetricsReport};
use crate::{Error, Predictions, Result};

/// MCC reported when the coefficient is undefined (a model predicts one class only, or
/// all targets are the same class).
pub const DEFAULT_MCC_SENTINEL: f64 = 1e-9;

/// Predictions accepted by [`MultiConfusionMatrix::update`].
#[derive(Debug, Clone, Copy)]
pub enum ClassPredictions<'a> {
    /// Predicted class ids, row-major `(batch, n_models)`.
    Indices(&'a [usize]),
    /// Per-class scores `(batch, n_models, n_classes)`; the arg-max is the prediction.
    Scores(&'a Predictions),
}

/// One-vs-rest counts of a single class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClassCounts {
    pub true_positives: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
    pub true_negatives: u64,
}

/// Metrics of every model, indexed by position.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiMetrics {
    /// Samples seen by each model.
    pub total_samples: u64,
    pub overall_acc: Vec<f64>,
    pub matthews_corrcoef: Vec<f64>,
    /// `class_counts[m][c]` holds the counts of class `c` for model `m`.
    pub class_counts: Vec<Vec<ClassCounts>>,
}

impl MultiMetrics {
    #[inline]
    pub fn num_models(&self) -> usize {
        self.overall_acc.len()
    }

    /// Values of `metric`, one per model.
    pub fn values(&self, metric: Metric) -> &[f64] {
        match metric {
            Metric::OverallAccuracy => &self.overall_acc,
            Metric::MatthewsCorrCoef => &self.matthews_corrcoef,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultiConfusionMatrix {
    n_models: usize,
    n_classes: usize,
    model_ids: Option<Vec<usize>>,
    mcc_sentinel: f64,
    /// Row-major `(n_models, n_classes, n_classes)`.
    counts: Vec<u64>,
}

impl MultiConfusionMatrix {
    pub fn new(n_models: usize, n_classes: usize) -> Result<Self> {
        if n_models == 0 || n_classes == 0 {
            return Err(Error::InvalidConfig(format!(
                "n_models and n_classes must be > 0, got {n_models} and {n_classes}"
            )));
        }
        Ok(Self {
            n_models,
            n_classes,
            model_ids: None,
            mcc_sentinel: DEFAULT_MCC_SENTINEL,
            counts: vec![0; n_models * n_classes * n_classes],
        })
    }

    /// Key report rows by these ids instead of by position.
    pub fn with_model_ids(mut self, model_ids: Vec<usize>) -> Result<Self> {
        if model_ids.len() != self.n_models {
            return Err(Error::InvalidShape(format!(
                "model_ids length {} does not match n_models {}",
                model_ids.len(),
                self.n_models
            )));
        }
        self.model_ids = Some(model_ids);
        Ok(self)
    }

    /// Value reported for an undefined MCC.
    pub fn with_mcc_sentinel(mut self, sentinel: f64) -> Self {
        self.mcc_sentinel = sentinel;
        self
    }

    #[inline]
    pub fn n_models(&self) -> usize {
        self.n_models
    }

    #[inline]
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    #[inline]
    pub fn model_ids(&self) -> Option<&[usize]> {
        self.model_ids.as_deref()
    }

    #[inline]
    pub fn mcc_sentinel(&self) -> f64 {
        self.mcc_sentinel
    }

    /// Raw counts, row-major `(n_models, n_classes, n_classes)`.
    #[inline]
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Count matrix of one model, row-major `(n_classes, n_classes)`.
    pub fn model_counts(&self, model: usize) -> Result<&[u64]> {
        if model >= self.n_models {
            return Err(Error::InvalidModelId {
                model_id: model,
                num_models: self.n_models,
            });
        }
        let size = self.n_classes * self.n_classes;
        Ok(&self.counts[model * size..(model + 1) * size])
    }

    /// Number of samples accumulated so far.
    pub fn total_samples(&self) -> u64 {
        self.counts[..self.n_classes * self.n_classes].iter().sum()
    }

    pub fn reset(&mut self) {
        self.counts.fill(0);
    }

    /// Add one batch. `cm[m, targets[b], predictions[b, m]] += 1` for every sample and
    /// model.
    ///
    /// Everything is validated first: on error no count changes.
    pub fn update(&mut self, predictions: ClassPredictions<'_>, targets: &[usize]) -> Result<()> {
        let batch = targets.len();
        let predicted: Cow<'_, [usize]> = match predictions {
            ClassPredictions::Indices(indices) => {
                if indices.len() != batch * self.n_models {
                    return Err(Error::InvalidShape(format!(
                        "predictions length {} does not match batch {batch} * n_models {}",
                        indices.len(),
                        self.n_models
                    )));
                }
                Cow::Borrowed(indices)
            }
            ClassPredictions::Scores(scores) => {
                if scores.batch_size() != batch
                    || scores.num_models() != self.n_models
                    || scores.out_features() != self.n_classes
                {
                    return Err(Error::InvalidShape(format!(
                        "scores shape ({}, {}, {}) does not match ({batch}, {}, {})",
                        scores.batch_size(),
                        scores.num_models(),
                        scores.out_features(),
                        self.n_models,
                        self.n_classes
                    )));
                }
                Cow::Owned(scores.argmax())
            }
        };

        if let Some(t) = targets.iter().find(|&&t| t >= self.n_classes) {
            return Err(Error::InvalidData(format!(
                "target class {t} is out of range for {} classes",
                self.n_classes
            )));
        }
        if let Some(p) = predicted.iter().find(|&&p| p >= self.n_classes) {
            return Err(Error::InvalidData(format!(
                "predicted class {p} is out of range for {} classes",
                self.n_classes
            )));
        }

        let (n_models, n_classes) = (self.n_models, self.n_classes);
        for (row, &t) in predicted.chunks_exact(n_models).zip(targets) {
            for (m, &p) in row.iter().enumerate() {
                self.counts[(m * n_classes + t) * n_classes + p] += 1;
            }
        }

        debug!("confusion matrix: added {batch} samples for {n_models} models");
        Ok(())
    }

    /// Accuracy, MCC and per-class counts of every model.
    ///
    /// With no samples yet, accuracy is 0 and MCC is the sentinel.
    pub fn compute_metrics(&self) -> MultiMetrics {
        let k = self.n_classes;
        let mut overall_acc = Vec::with_capacity(self.n_models);
        let mut matthews_corrcoef = Vec::with_capacity(self.n_models);
        let mut class_counts = Vec::with_capacity(self.n_models);

        for cm in self.counts.chunks_exact(k * k) {
            let total: u64 = cm.iter().sum();
            let t_sum: Vec<u64> = cm.chunks_exact(k).map(|row| row.iter().sum()).collect();
            let p_sum: Vec<u64> = (0..k).map(|c| (0..k).map(|r| cm[r * k + c]).sum()).collect();
            let tp: Vec<u64> = (0..k).map(|c| cm[c * k + c]).collect();
            let n_correct: u64 = tp.iter().sum();

            class_counts.push(
                (0..k)
                    .map(|c| {
                        let false_negatives = t_sum[c] - tp[c];
                        let false_positives = p_sum[c] - tp[c];
                        ClassCounts {
                            true_positives: tp[c],
                            false_positives,
                            false_negatives,
                            true_negatives: total - tp[c] - false_positives - false_negatives,
                        }
                    })
                    .collect(),
            );

            if total == 0 {
                overall_acc.push(0.0);
                matthews_corrcoef.push(self.mcc_sentinel);
                continue;
            }

            let total_f = total as f64;
            overall_acc.push(n_correct as f64 / total_f);

            let dot = |a: &[u64], b: &[u64]| -> f64 {
                a.iter().zip(b).map(|(&x, &y)| x as f64 * y as f64).sum()
            };
            let cov_ytyp = n_correct as f64 * total_f - dot(&t_sum, &p_sum);
            let cov_ypyp = total_f * total_f - dot(&p_sum, &p_sum);
            let cov_ytyt = total_f * total_f - dot(&t_sum, &t_sum);
            let denom = cov_ytyt * cov_ypyp;
            matthews_corrcoef.push(if denom == 0.0 {
                self.mcc_sentinel
            } else {
                cov_ytyp / denom.sqrt()
            });
        }

        MultiMetrics {
            total_samples: self.total_samples(),
            overall_acc,
            matthews_corrcoef,
            class_counts,
        }
    }

    /// Metrics as a table with columns `{prefix}overall_acc` and
    /// `{prefix}matthews_corrcoef`.
    ///
    /// Rows are keyed by the attached model ids, or by position otherwise.
    pub fn to_report(&self, prefix: Option<&str>) -> MetricsReport {
        let metrics = self.compute_metrics();
        let mut report =
            MetricsReport::new(Metric::ALL.iter().map(|m| m.column(prefix)).collect());
        for m in 0..self.n_models {
            let model_id = self.model_ids.as_ref().map_or(m, |ids| ids[m]);
            let values = Metric::ALL.iter().map(|&k| metrics.values(k)[m]).collect();
            report.push_row(model_id, values);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_empty_dims() {
        assert!(matches!(
            MultiConfusionMatrix::new(0, 2),
            Err(Error::InvalidConfig(_))
        ));
        assert!(MultiConfusionMatrix::new(2, 0).is_err());
    }

    #[test]
    fn with_model_ids_checks_length() {
        let cm = MultiConfusionMatrix::new(3, 2).unwrap();
        assert!(matches!(
            cm.clone().with_model_ids(vec![1, 2]),
            Err(Error::InvalidShape(_))
        ));
        assert_eq!(
            cm.with_model_ids(vec![4, 5, 6]).unwrap().model_ids(),
            Some(&[4, 5, 6][..])
        );
    }

    #[test]
    fn failed_update_leaves_counts_untouched() {
        let mut cm = MultiConfusionMatrix::new(2, 2).unwrap();
        cm.update(ClassPredictions::Indices(&[0, 1, 1, 1]), &[0, 1])
            .unwrap();
        let before = cm.clone();

        // second sample predicts class 2
        assert!(matches!(
            cm.update(ClassPredictions::Indices(&[0, 1, 2, 1]), &[0, 1]),
            Err(Error::InvalidData(_))
        ));
        assert!(matches!(
            cm.update(ClassPredictions::Indices(&[0, 1, 1, 1]), &[0, 3]),
            Err(Error::InvalidData(_))
        ));
        assert!(matches!(
            cm.update(ClassPredictions::Indices(&[0, 1, 1]), &[0, 1]),
            Err(Error::InvalidShape(_))
        ));
        assert_eq!(cm, before);
    }

    #[test]
    fn scores_use_first_maximum() {
        let mut cm = MultiConfusionMatrix::new(2, 3).unwrap();
        // one sample, two models
        let scores =
            Predictions::from_flat(vec![0.1, 0.7, 0.2, 0.5, 0.5, 0.0], 1, 2, 3).unwrap();
        cm.update(ClassPredictions::Scores(&scores), &[1]).unwrap();
        assert_eq!(cm.model_counts(0).unwrap(), &[0, 0, 0, 0, 1, 0, 0, 0, 0]);
        assert_eq!(cm.model_counts(1).unwrap(), &[0, 0, 0, 1, 0, 0, 0, 0, 0]);

        let wrong = Predictions::from_flat(vec![0.0; 4], 1, 2, 2).unwrap();
        assert!(cm.update(ClassPredictions::Scores(&wrong), &[1]).is_err());
    }

    #[test]
    fn degenerate_mcc_uses_sentinel() {
        let mut cm = MultiConfusionMatrix::new(2, 2).unwrap();
        // model 0 always predicts 0, model 1 is perfect
        cm.update(ClassPredictions::Indices(&[0, 0, 0, 1, 0, 1]), &[0, 1, 1])
            .unwrap();
        let metrics = cm.compute_metrics();
        assert_eq!(metrics.matthews_corrcoef[0], DEFAULT_MCC_SENTINEL);
        assert!((metrics.matthews_corrcoef[1] - 1.0).abs() < 1e-12);

        let custom = cm.with_mcc_sentinel(0.0).compute_metrics();
        assert_eq!(custom.matthews_corrcoef[0], 0.0);
    }

    #[test]
    fn empty_matrix_has_zero_accuracy() {
        let cm = MultiConfusionMatrix::new(2, 2).unwrap();
        let metrics = cm.compute_metrics();
        assert_eq!(metrics.total_samples, 0);
        assert_eq!(metrics.overall_acc, vec![0.0, 0.0]);
        assert_eq!(
            metrics.matthews_corrcoef,
            vec![DEFAULT_MCC_SENTINEL, DEFAULT_MCC_SENTINEL]
        );
    }

    #[test]
    fn reset_clears_counts() {
        let mut cm = MultiConfusionMatrix::new(1, 2).unwrap();
        cm.update(ClassPredictions::Indices(&[1, 0]), &[1, 1]).unwrap();
        assert_eq!(cm.total_samples(), 2);
        cm.reset();
        assert_eq!(cm.total_samples(), 0);
        assert!(cm.counts().iter().all(|&c| c == 0));
    }

    #[test]
    fn report_rows_follow_model_ids() {
        let mut cm = MultiConfusionMatrix::new(2, 2)
            .unwrap()
            .with_model_ids(vec![10, 20])
            .unwrap();
        cm.update(ClassPredictions::Indices(&[0, 1, 1, 1]), &[0, 1])
            .unwrap();
        let report = cm.to_report(Some("test_"));
        assert_eq!(
            report.columns(),
            &["test_overall_acc".to_owned(), "test_matthews_corrcoef".to_owned()]
        );
        assert_eq!(report.get(10, "test_overall_acc"), Some(1.0));
        assert_eq!(report.get(20, "test_overall_acc"), Some(0.5));

        let positional = MultiConfusionMatrix::new(2, 2).unwrap().to_report(None);
        assert_eq!(
            positional.rows().iter().map(|r| r.model_id).collect::<Vec<_>>(),
            vec![0, 1]
        );
    }
}
