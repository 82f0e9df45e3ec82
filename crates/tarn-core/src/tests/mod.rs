/*! Test coverage for the compilation pipeline.
 *
 * Most tests drive whole programs through parse → compile → JIT and assert
 * on the values `main` returns, because the interesting invariants (numeric
 * promotion, const enforcement, branch merging) only show up end to end.
 * Typed compile errors are asserted by variant and payload.
 */

mod control_flow_tests;
mod engine_tests;
mod lowering_tests;

use crate::{CompileError, CompiledModule, Engine, ModuleCompiler, Result, RuntimeValue};

fn compile(source: &str) -> Result<CompiledModule> {
    let program = tarn_syntax::parse_program(source).expect("test source should parse");
    ModuleCompiler::new()?.compile(&program)
}

fn compile_error(source: &str) -> CompileError {
    match compile(source) {
        Ok(_) => panic!("compilation unexpectedly succeeded"),
        Err(err) => err,
    }
}

fn engine(source: &str) -> Engine {
    let compiled = compile(source).expect("test source should compile");
    Engine::new(compiled).expect("finalization should succeed")
}

fn run_main(source: &str) -> RuntimeValue {
    engine(source).run_main().expect("main should run")
}
