#[cfg(test)]
#[macro_use]
extern crate is_close;

pub mod allocator;

pub mod array;

pub mod backends;

pub mod compile_cache;
pub use compile_cache::{CompilationError, CompilationFailure, CompileCache, CompiledKernelHandle};

pub mod config;
pub use config::{ConfigError, EngineConfig};

pub mod data_type;
pub use data_type::{ArrayElement, DataType};

pub mod descriptor;
pub mod emitter;

pub mod engine;
pub use engine::Engine;

pub mod error;
pub use error::EngineError;

pub mod testbed;
pub mod validator;
