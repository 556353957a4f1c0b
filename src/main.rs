use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use parallel_mlp::{
    Activation, ArchitectureConfig, Dataset, Loss, LossFn, Metric, MultiConfusionMatrix,
    Optimizer, ParallelMlpBuilder, ParallelTrainer, Reduction, Result, TrainConfig,
};

const NUM_CLASSES: usize = 3;
const SAMPLES_PER_CLASS: usize = 40;
const EPOCHS: usize = 50;
const BATCH_SIZE: usize = 30;

/// Three noisy blobs around the vertices of a triangle.
fn blobs(rng: &mut StdRng) -> Result<Dataset> {
    let centers = [[0.0_f32, 1.0], [-0.9, -0.5], [0.9, -0.5]];
    let mut inputs = Vec::with_capacity(NUM_CLASSES * SAMPLES_PER_CLASS * 2);
    let mut labels = Vec::with_capacity(NUM_CLASSES * SAMPLES_PER_CLASS);
    for i in 0..SAMPLES_PER_CLASS * NUM_CLASSES {
        let class = i % NUM_CLASSES;
        let [cx, cy] = centers[class];
        inputs.push(cx + rng.gen_range(-0.6..0.6));
        inputs.push(cy + rng.gen_range(-0.6..0.6));
        labels.push(class);
    }
    Dataset::from_flat(inputs, labels, 2, NUM_CLASSES)
}

fn main() -> Result<()> {
    env_logger::init();

    let mut rng = StdRng::seed_from_u64(0);
    let train = blobs(&mut rng)?;
    let valid = blobs(&mut rng)?;

    let mut engine = ParallelMlpBuilder::new(2, NUM_CLASSES)?
        .architecture(ArchitectureConfig {
            repetitions: 2,
            activations: vec![Activation::Identity, Activation::Tanh, Activation::ReLU],
            min_neurons: 1,
            max_neurons: 9,
            step: 2,
        })
        .build_with_rng(&mut rng)?;
    println!("{engine}: {} models", engine.num_models());

    let mut trainer = ParallelTrainer::new(
        &engine,
        TrainConfig {
            lr: 0.02,
            optimizer: Optimizer::ADAM,
            ..TrainConfig::default()
        },
    )?;
    let mean_over_models = LossFn::new(Loss::CrossEntropy, Reduction::Mean);
    for epoch in 0..EPOCHS {
        let mut last = Vec::new();
        for start in (0..train.len()).step_by(BATCH_SIZE) {
            let rows = start..(start + BATCH_SIZE).min(train.len());
            let inputs = train.inputs().slice(rows.clone());
            last = trainer
                .step(&mut engine, &inputs, &train.labels()[rows])?
                .to_vec();
        }
        if epoch % 10 == 0 {
            let mean = mean_over_models.reduce(last)[0];
            info!("epoch {epoch}: mean loss over models {mean:.4}");
        }
    }

    let mut cm = MultiConfusionMatrix::new(engine.num_models(), NUM_CLASSES)?
        .with_model_ids(engine.output_model_id().to_vec())?;
    engine.evaluate(&valid, &mut cm)?;
    let report = cm.to_report(Some("valid_"));
    println!("{report}");

    let mcc = cm.compute_metrics();
    let (best, best_mcc) = mcc
        .values(Metric::MatthewsCorrCoef)
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |acc, (m, v)| if v > acc.1 { (m, v) } else { acc });
    let model = engine.extract_mlp(best)?;
    println!(
        "best model {best}: {} hidden neurons, {}, architecture {}, mcc {best_mcc:.4}",
        model.hidden_dim(),
        model.activation(),
        engine.architecture_id(best)?
    );

    Ok(())
}
