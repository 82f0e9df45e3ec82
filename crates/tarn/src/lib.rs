/*! Unified interface for the Tarn language.
 *
 * Single import for everything: parsing source text, compiling to Cranelift
 * IR and executing the result in process.
 */

pub use tarn_core as core;
pub use tarn_syntax as syntax;

pub use tarn_core::{
    CompileError, CompiledFunction, CompiledModule, Engine, ModuleCompiler, RuntimeValue, Type,
};

pub use tarn_syntax::{parse_program, ParseError};

use thiserror::Error;

/// Any failure between source text and a runnable module.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// Parses and compiles a complete source text.
pub fn compile(source: &str) -> Result<CompiledModule, Error> {
    let program = parse_program(source)?;
    Ok(ModuleCompiler::new()?.compile(&program)?)
}

/// Compiles a source text and runs its `main` function.
pub fn run_source(source: &str) -> Result<RuntimeValue, Error> {
    let compiled = compile(source)?;
    let engine = Engine::new(compiled)?;
    Ok(engine.run_main()?)
}
