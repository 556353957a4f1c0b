use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use parallel_mlp::{
    Activation, ArchitectureConfig, Inputs, Loss, Mlp, MlpTrainer, Optimizer, ParallelMlp,
    ParallelMlpBuilder, ParallelTrainer, TrainConfig,
};

const IN_FEATURES: usize = 5;
const OUT_FEATURES: usize = 3;
const BATCH: usize = 32;

fn architecture() -> ArchitectureConfig {
    ArchitectureConfig {
        repetitions: 3,
        activations: vec![Activation::LEAKY_RELU, Activation::Sigmoid],
        min_neurons: 1,
        max_neurons: 3,
        step: 1,
    }
}

fn engine(seed: u64) -> ParallelMlp {
    ParallelMlpBuilder::new(IN_FEATURES, OUT_FEATURES)
        .unwrap()
        .architecture(architecture())
        .build_with_seed(seed)
        .unwrap()
}

fn batch(seed: u64) -> (Inputs, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let x = (0..BATCH * IN_FEATURES)
        .map(|_| rng.gen_range(-1.0_f32..1.0))
        .collect();
    let y = (0..BATCH).map(|_| rng.gen_range(0..OUT_FEATURES)).collect();
    (Inputs::from_flat(x, IN_FEATURES).unwrap(), y)
}

fn max_abs_diff(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f32::max)
}

fn train_config() -> TrainConfig {
    TrainConfig {
        lr: 0.01,
        optimizer: Optimizer::ADAM,
        loss: Loss::CrossEntropy,
    }
}

#[test]
fn layout_of_repeated_search_space() {
    let engine = engine(0);
    assert_eq!(engine.num_models(), 18);
    assert_eq!(engine.total_hidden_neurons(), 36);
    assert_eq!(engine.activations_split(), 18);

    let expected_arch: Vec<usize> = (0..3).flat_map(|_| 0..6).collect();
    assert_eq!(engine.output_architecture_id(), expected_arch.as_slice());

    for m in 0..engine.num_models() {
        let expected = if m < 9 {
            Activation::LEAKY_RELU
        } else {
            Activation::Sigmoid
        };
        assert_eq!(engine.model_activation(m).unwrap(), expected, "model {m}");
        assert_eq!(engine.model_num_neurons(m).unwrap(), m % 3 + 1);
    }
}

#[test]
fn forward_matches_every_extracted_model() {
    let engine = engine(1);
    let (x, _) = batch(2);
    let predictions = engine.forward(&x).unwrap();

    for &m in engine.unique_model_ids() {
        let single = engine.extract_mlp(m).unwrap();
        assert_eq!(single.activation(), engine.model_activation(m).unwrap());
        let out = single.predict(&x).unwrap();
        let diff = max_abs_diff(&out, &predictions.model(m));
        assert!(diff < 1e-5, "model {m}: max diff {diff}");
    }
}

#[test]
fn parallel_training_matches_individual_training() {
    let mut engine = engine(3);
    let (x, y) = batch(4);

    let mut singles: Vec<Mlp> = engine
        .unique_model_ids()
        .iter()
        .map(|&m| engine.extract_mlp(m).unwrap())
        .collect();
    let mut single_trainers: Vec<MlpTrainer> = singles
        .iter()
        .map(|mlp| MlpTrainer::new(mlp, train_config()).unwrap())
        .collect();
    let mut trainer = ParallelTrainer::new(&engine, train_config()).unwrap();

    for step in 0..20 {
        let parallel_losses = trainer.step(&mut engine, &x, &y).unwrap();
        for (m, (mlp, t)) in singles.iter_mut().zip(&mut single_trainers).enumerate() {
            let loss = t.step(mlp, &x, &y).unwrap();
            let diff = (parallel_losses[m] - loss).abs();
            assert!(
                diff <= 1e-4 + 1e-3 * loss.abs(),
                "step {step} model {m}: {} vs {loss}",
                parallel_losses[m]
            );
        }
    }

    for (m, single) in singles.iter().enumerate() {
        let extracted = engine.extract_mlp(m).unwrap();
        assert_eq!(extracted.activation(), single.activation());
        for (a, b) in [
            (extracted.hidden_layer(), single.hidden_layer()),
            (extracted.output_layer(), single.output_layer()),
        ] {
            assert!(max_abs_diff(a.weights(), b.weights()) < 1e-3, "model {m}");
            assert!(max_abs_diff(a.biases(), b.biases()) < 1e-3, "model {m}");
        }
    }
}

#[test]
fn extracted_model_is_independent_of_later_updates() {
    let mut engine = engine(5);
    let (x, y) = batch(6);

    let extracted = engine.extract_mlp(4).unwrap();
    let snapshot = extracted.clone();

    let mut trainer = ParallelTrainer::new(&engine, train_config()).unwrap();
    trainer.step(&mut engine, &x, &y).unwrap();
    let mut rng = StdRng::seed_from_u64(7);
    engine.reset_parameters(Some(&[4][..]), &mut rng).unwrap();

    assert_eq!(extracted, snapshot);
    assert_ne!(engine.extract_mlp(4).unwrap(), snapshot);
}
