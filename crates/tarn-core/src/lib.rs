/*! Type system, Cranelift lowering and JIT engine for the Tarn language.
 *
 * Tarn is a small statically typed, expression-oriented language. This crate
 * takes the AST produced by `tarn-syntax` and lowers it to Cranelift IR,
 * enforcing the numeric promotion, const-correctness and lvalue/rvalue rules
 * along the way, then executes the result in process through a JIT module.
 */

pub mod codegen;
pub mod engine;
pub mod types;
pub mod values;

pub use codegen::context::Context;
pub use codegen::module::{CompiledModule, ModuleCompiler};
pub use engine::{CompiledFunction, Engine, RuntimeValue};
pub use types::{FunctionType, IntKind, RealKind, StructField, StructType, Type};
pub use values::{Operand, Value, ValueRef};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Illegal cast from `{from}` to `{to}`")]
    IllegalCast { from: Type, to: Type },

    #[error("Type mismatch: expected `{expected}`, found `{found}`")]
    TypeMismatch { expected: Type, found: Type },

    #[error("Cannot assign to a const location of type `{0}`")]
    AssignToConst(Type),

    #[error("Invalid assignment target of type `{0}`")]
    InvalidAssignmentTarget(Type),

    #[error("Type `{base}` has no member `{name}`")]
    UnknownMember { base: Type, name: String },

    #[error("Expected a member name after `.`")]
    ExpectedMemberName,

    #[error("Unresolved symbol `{0}`")]
    UnresolvedSymbol(String),

    #[error("Unknown type `{0}`")]
    UnknownType(String),

    #[error("Unknown function `{0}`")]
    UnknownFunction(String),

    #[error("Function `{name}` takes {expected} argument(s), {found} given")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("Missing field `{field}` in literal of `{name}`")]
    MissingField { name: String, field: String },

    #[error("Cannot form a reference to reference type `{0}`")]
    ReferenceToReference(Type),

    #[error("Cannot form a pointer to reference type `{0}`")]
    PointerToReference(Type),

    #[error("Operator `{op}` is not defined for type `{ty}`")]
    UnsupportedOperand { op: &'static str, ty: Type },

    #[error("Type `{0}` has no size")]
    UnsizedType(Type),

    #[error("Cannot allocate storage for a value of type `{0}`")]
    UnstorableType(Type),

    #[error("Function `{func}` cannot take or return `{ty}` by value")]
    InvalidSignature { func: String, ty: Type },

    #[error("Cannot marshal a value of type `{0}` across the JIT boundary")]
    UnsupportedArgument(Type),

    #[error("Cranelift error: {0}")]
    Cranelift(String),
}

pub type Result<T> = std::result::Result<T, CompileError>;

#[cfg(test)]
mod tests;
