mod common;

use std::{sync::Arc, thread};

use common::{engine, engine_config, f16_tensor_op_gemm, f32_gemm, init_logging};
use tilesmith::{
    CompilationFailure, DataType, Engine, EngineError,
    backends::{
        Device, TemplateInstantiationError,
        host::{HostDevice, HostTemplateLibrary},
    },
    descriptor::{LayoutCombination, TileShape},
    validator::ConfigurationError,
};

fn counted_engine() -> (Engine, Arc<HostTemplateLibrary>) {
    init_logging();
    let config = engine_config(80);
    let device: Arc<dyn Device> = Arc::new(HostDevice::new(config.device.clone()));
    let library = Arc::new(HostTemplateLibrary::new());
    let engine = Engine::with_collaborators(config, device, library.clone()).unwrap();
    (engine, library)
}

#[test]
fn repeated_builds_share_one_kernel() {
    let (engine, library) = counted_engine();
    let descriptor = f32_gemm(LayoutCombination::NTN);

    let first = engine.build(&descriptor).unwrap();
    let second = engine.build(&descriptor.clone()).unwrap();

    assert!(first.same_kernel(&second));
    assert_eq!(first.key(), &descriptor.specialization_key());
    assert_eq!(first.descriptor(), &descriptor);
    assert_eq!(engine.cache().compilations(), 1);
    assert_eq!(engine.cache().hits(), 1);
    assert_eq!(library.instantiations(), 1);
}

#[test]
fn distinct_descriptors_compile_separately() {
    let engine = engine(80);
    let nnn = engine.build(&f32_gemm(LayoutCombination::NNN)).unwrap();
    let ttt = engine.build(&f32_gemm(LayoutCombination::TTT)).unwrap();

    assert!(!nnn.same_kernel(&ttt));
    assert_ne!(nnn.key(), ttt.key());
    assert_eq!(engine.cache().len(), 2);
    assert_eq!(engine.cache().keys().len(), 2);
}

#[test]
fn concurrent_requests_compile_once() {
    let (engine, library) = counted_engine();
    let descriptor = f32_gemm(LayoutCombination::TNT);

    let handles: Vec<_> = thread::scope(|scope| {
        let workers: Vec<_> = (0..8).map(|_| scope.spawn(|| engine.build(&descriptor).unwrap())).collect();
        workers.into_iter().map(|worker| worker.join().unwrap()).collect()
    });

    assert!(handles.windows(2).all(|pair| pair[0].same_kernel(&pair[1])));
    assert_eq!(engine.cache().compilations(), 1);
    assert_eq!(engine.cache().hits(), 7);
    assert_eq!(library.instantiations(), 1);
}

#[test]
fn compilation_failures_are_memoized() {
    let (engine, library) = counted_engine();
    // Validates, but the host library has no f16 accumulator.
    let descriptor = f16_tensor_op_gemm(DataType::F16);

    let first = engine.build(&descriptor).unwrap_err();
    let second = engine.build(&descriptor).unwrap_err();

    assert_eq!(first, second);
    let error = match first {
        EngineError::Compilation(error) => error,
        other => panic!("expected a compilation error, got {other:?}"),
    };
    assert_eq!(error.key, descriptor.specialization_key());
    assert_eq!(
        error.reason,
        CompilationFailure::Instantiation(TemplateInstantiationError::UnsupportedElement {
            parameter: "ElementAccumulator",
            element: DataType::F16,
        })
    );
    assert_eq!(engine.cache().compilations(), 1);
    assert_eq!(library.instantiations(), 0);
    assert!(matches!(engine.cache().get(&error.key), Some(Err(_))));
}

#[test]
fn invalid_descriptors_never_reach_the_cache() {
    let engine = engine(80);
    let mut descriptor = f32_gemm(LayoutCombination::NNN);
    descriptor.tile.threadblock_shape = TileShape::new(64, 63, 8);

    let error = engine.build(&descriptor).unwrap_err();
    assert!(matches!(error, EngineError::Configuration(ConfigurationError::TileNotDivisible { .. })));
    assert!(engine.cache().is_empty());
    assert_eq!(engine.cache().compilations(), 0);
}

#[test]
fn handles_outlive_a_cleared_cache() {
    let engine = engine(80);
    let descriptor = f32_gemm(LayoutCombination::NNN);
    let handle = engine.build(&descriptor).unwrap();

    engine.cache().clear();
    assert!(engine.cache().get(handle.key()).is_none());
    assert_eq!(handle.kernel().descriptor(), &descriptor);

    let rebuilt = engine.build(&descriptor).unwrap();
    assert!(!rebuilt.same_kernel(&handle));
    assert_eq!(engine.cache().compilations(), 2);
}
