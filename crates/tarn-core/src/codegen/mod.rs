/*! Lower the Tarn AST to Cranelift for compilation.
 *
 * The AST keeps the language's surface shape; execution needs SSA-form IR.
 * This module bridges the gap: a compilation context carries scopes and
 * registries, the lowerer walks expressions and statements emitting
 * instructions, and the module compiler drives the two-phase
 * declare-then-define flow over a whole program.
 */

pub mod context;
pub mod lower;
pub mod module;

pub use context::Context;
pub use lower::FunctionLowerer;
pub use module::ModuleCompiler;
