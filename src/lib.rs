//! Train many small MLPs at once.
//!
//! `parallel-mlp` packs a whole search space of single-hidden-layer networks (every
//! combination of hidden width, activation function and repetition) into one set of
//! dense buffers and trains them with a single batched forward/backward pass. Any
//! candidate can be extracted into a standalone [`Mlp`], and [`MultiConfusionMatrix`]
//! scores all candidates on the same data in one pass.
//!
//! # Pieces
//!
//! - [`ArchitectureConfig`] + [`build_model_ids`]: lay the search space out as index arrays.
//! - [`ParallelMlp`] (usually built with [`ParallelMlpBuilder`]): the engine.
//! - [`ParallelTrainer`]: one optimizer step over every model.
//! - [`MultiConfusionMatrix`] -> [`MetricsReport`]: per-model accuracy and MCC.
//!
//! # Panics vs `Result`
//!
//! This crate exposes two layers of API:
//!
//! - Low-level hot path (panics on misuse):
//!   - [`mlp::Mlp::forward_batch`], [`mlp::Mlp::backward_batch`]
//!   - [`parallel::ParallelMlp::backward`]
//!     Shape mismatches are treated as programmer error and will panic via `assert!`.
//!
//! - High-level convenience APIs (shape-checked):
//!   - [`ParallelMlp::forward`], [`ParallelMlp::calculate_loss`], [`ParallelMlp::extract_mlp`]
//!   - [`ParallelTrainer::step`], [`MultiConfusionMatrix::update`]
//!     These validate inputs and return [`Result`].
//!
//! # Data layout and shapes
//!
//! - Scalars are `f32`; confusion counts are `u64`.
//! - [`Inputs`] store samples contiguously in row-major layout, `(batch, in_features)`.
//! - [`Predictions`] are row-major `(batch, num_models, out_features)`.
//! - Layer weights are row-major with shape `(out_dim, in_dim)`.
//!
//! # MSRV
//!
//! This crate's minimum supported Rust version (MSRV) is specified in `Cargo.toml`.

//! # Quick start
//!
//! ```rust
//! use parallel_mlp::{
//!     Activation, ArchitectureConfig, ClassPredictions, Dataset, MultiConfusionMatrix,
//!     Optimizer, ParallelMlpBuilder, ParallelTrainer, TrainConfig,
//! };
//!
//! # fn main() -> parallel_mlp::Result<()> {
//! let data = Dataset::from_flat(
//!     vec![0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0],
//!     vec![0, 1, 1, 0],
//!     2,
//!     2,
//! )?;
//!
//! let mut engine = ParallelMlpBuilder::new(2, 2)?
//!     .architecture(ArchitectureConfig {
//!         repetitions: 2,
//!         activations: vec![Activation::Tanh, Activation::ReLU],
//!         min_neurons: 2,
//!         max_neurons: 8,
//!         step: 2,
//!     })
//!     .build_with_seed(0)?;
//!
//! let mut trainer = ParallelTrainer::new(
//!     &engine,
//!     TrainConfig {
//!         lr: 0.05,
//!         optimizer: Optimizer::ADAM,
//!         ..TrainConfig::default()
//!     },
//! )?;
//! for _ in 0..50 {
//!     let _per_model_loss = trainer.step(&mut engine, data.inputs(), data.labels())?;
//! }
//!
//! let mut cm = MultiConfusionMatrix::new(engine.num_models(), 2)?
//!     .with_model_ids(engine.output_model_id().to_vec())?;
//! let predictions = engine.forward(data.inputs())?;
//! cm.update(ClassPredictions::Scores(&predictions), data.labels())?;
//! let report = cm.to_report(Some("train_"));
//! assert_eq!(report.len(), engine.num_models());
//!
//! let best = engine.extract_mlp(0)?;
//! assert_eq!(best.input_dim(), 2);
//! # Ok(())
//! # }
//! ```

pub mod activation;
pub mod builder;
pub mod confusion;
pub mod data;
pub mod error;
pub mod layer;
pub mod loss;
pub(crate) mod matmul;
pub mod metrics;
pub mod mlp;
pub mod model_ids;
pub mod optim;
pub mod parallel;
pub mod predictions;
pub mod train;

#[cfg(feature = "serde")]
pub mod serde_model;

pub use activation::Activation;
pub use builder::ParallelMlpBuilder;
pub use confusion::{
    ClassCounts, ClassPredictions, DEFAULT_MCC_SENTINEL, MultiConfusionMatrix, MultiMetrics,
};
pub use data::{Dataset, Inputs};
pub use error::{Error, Result};
pub use layer::{Init, Layer};
pub use loss::{Loss, LossFn, Reduction};
pub use metrics::{Metric, MetricsReport, ReportRow};
pub use mlp::{BatchScratch, Mlp};
pub use model_ids::{ArchitectureConfig, ModelIds, build_model_ids};
pub use optim::{Gradients, Optimizer, OptimizerState, Parameters};
pub use parallel::{ParallelMlp, ParallelMlpConfig, ParallelScratch};
pub use predictions::Predictions;
pub use train::{MlpTrainer, ParallelTrainer, TrainConfig};
