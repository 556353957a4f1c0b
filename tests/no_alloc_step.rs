use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;

use parallel_mlp::{
    Activation, ArchitectureConfig, Inputs, Loss, LossFn, Optimizer, ParallelMlp,
    ParallelMlpBuilder, ParallelTrainer, TrainConfig,
};

// Counted per thread: the test harness runs tests concurrently.
thread_local! {
    static ALLOC_EVENTS: Cell<usize> = const { Cell::new(0) };
}

struct CountingAlloc;

impl CountingAlloc {
    fn record() {
        let _ = ALLOC_EVENTS.try_with(|n| n.set(n.get() + 1));
    }

    fn reset(&self) {
        ALLOC_EVENTS.with(|n| n.set(0));
    }

    fn alloc_events(&self) -> usize {
        ALLOC_EVENTS.with(Cell::get)
    }
}

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        Self::record();
        unsafe { System.alloc(layout) }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        Self::record();
        unsafe { System.alloc_zeroed(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        Self::record();
        unsafe { System.realloc(ptr, layout, new_size) }
    }
}

#[global_allocator]
static ALLOC: CountingAlloc = CountingAlloc;

const IN_FEATURES: usize = 16;
const OUT_FEATURES: usize = 4;
const BATCH: usize = 32;

fn engine() -> ParallelMlp {
    ParallelMlpBuilder::new(IN_FEATURES, OUT_FEATURES)
        .unwrap()
        .architecture(ArchitectureConfig {
            repetitions: 2,
            activations: vec![Activation::Tanh, Activation::ReLU],
            min_neurons: 2,
            max_neurons: 16,
            step: 2,
        })
        .build_with_seed(0)
        .unwrap()
}

fn batch() -> (Inputs, Vec<usize>) {
    let inputs = Inputs::from_flat(vec![0.1_f32; BATCH * IN_FEATURES], IN_FEATURES).unwrap();
    let targets = (0..BATCH).map(|i| i % OUT_FEATURES).collect();
    (inputs, targets)
}

#[test]
fn forward_and_backward_reuse_scratch_buffers() {
    if cfg!(feature = "matrixmultiply") {
        // The `matrixmultiply` backend may allocate internal scratch buffers.
        return;
    }

    let engine = engine();
    let (inputs, targets) = batch();

    let mut scratch = engine.scratch();
    let mut grads = engine.gradients();
    let predictions = engine.forward_train(&inputs, &mut scratch).unwrap().clone();
    let (_, d_predictions) = engine
        .loss_gradient(
            LossFn::unreduced(Loss::CrossEntropy),
            &predictions,
            &targets,
            None,
        )
        .unwrap();
    engine.backward(&mut scratch, &d_predictions, &mut grads);

    let mut run = |steps: usize| {
        ALLOC.reset();
        for _ in 0..steps {
            engine.forward_train(&inputs, &mut scratch).unwrap();
            engine.backward(&mut scratch, &d_predictions, &mut grads);
        }
        ALLOC.alloc_events()
    };

    let few = run(1);
    let many = run(50);
    assert_eq!(
        few, many,
        "expected allocation event count to be independent of steps"
    );
}

#[test]
fn trainer_step_does_not_allocate_per_step() {
    if cfg!(feature = "matrixmultiply") {
        return;
    }

    let mut engine = engine();
    let (inputs, targets) = batch();
    let mut trainer = ParallelTrainer::new(
        &engine,
        TrainConfig {
            lr: 1e-2,
            optimizer: Optimizer::ADAM,
            loss: Loss::CrossEntropy,
        },
    )
    .unwrap();
    let weights = vec![1.0_f32; engine.num_models()];

    // Warm up so every trainer buffer has its final size.
    trainer.step(&mut engine, &inputs, &targets).unwrap();

    let mut run = |steps: usize| {
        ALLOC.reset();
        for _ in 0..steps {
            trainer.step(&mut engine, &inputs, &targets).unwrap();
            trainer
                .step_weighted(&mut engine, &inputs, &targets, Some(&weights))
                .unwrap();
        }
        ALLOC.alloc_events()
    };

    let few = run(1);
    let many = run(50);
    assert_eq!(
        few, many,
        "expected allocation event count to be independent of steps"
    );
}
