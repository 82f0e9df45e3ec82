//! In-process execution of compiled modules.
//!
//! [`Engine::new`] finalizes a [`CompiledModule`] into executable memory;
//! failure here is fatal for the module, there is no degraded mode. Function
//! handles borrow the engine, so the borrow checker rules out calling into
//! memory that [`Engine::dispose`] (or a plain drop) has already released.
//!
//! Marshalling is deliberately narrow: zero or one primitive scalar in, one
//! primitive scalar (or nothing) out. Structs and references never cross the
//! boundary.

use std::fmt;
use std::marker::PhantomData;

use cranelift_jit::JITModule;
use indexmap::IndexMap;
use std::rc::Rc;
use tracing::debug;

use crate::codegen::context::FunctionInfo;
use crate::codegen::module::CompiledModule;
use crate::types::{FunctionType, IntKind, RealKind, Type};
use crate::{CompileError, Result};

/// A value passed into or out of a JIT-compiled function.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuntimeValue {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Unit,
}

impl RuntimeValue {
    /// The default language type carrying this representation. Used for
    /// error messages; the true type lives in the function signature.
    pub fn canonical_type(&self) -> Type {
        match self {
            RuntimeValue::I8(_) => Type::BYTE,
            RuntimeValue::I16(_) => Type::SHORT,
            RuntimeValue::I32(_) => Type::INT,
            RuntimeValue::I64(_) => Type::LONG,
            RuntimeValue::F32(_) => Type::FLOAT,
            RuntimeValue::F64(_) => Type::DOUBLE,
            RuntimeValue::Unit => Type::Unit,
        }
    }

    /// Renders the value as the given language type would print it:
    /// Booleans as `true`/`false`, `Char` as the character, unsigned
    /// integers reinterpreted from their signed carrier.
    pub fn display_as(&self, ty: &Type) -> String {
        match (self, ty) {
            (RuntimeValue::I8(x), Type::Bool) => (*x != 0).to_string(),
            (RuntimeValue::I16(x), Type::Int(IntKind::Char)) => {
                let unit = *x as u16;
                match char::from_u32(u32::from(unit)) {
                    Some(c) => c.to_string(),
                    None => unit.to_string(),
                }
            }
            (RuntimeValue::I8(x), Type::Int(kind)) if !kind.is_signed() => (*x as u8).to_string(),
            (RuntimeValue::I16(x), Type::Int(kind)) if !kind.is_signed() => {
                (*x as u16).to_string()
            }
            (RuntimeValue::I32(x), Type::Int(kind)) if !kind.is_signed() => {
                (*x as u32).to_string()
            }
            (RuntimeValue::I64(x), Type::Int(kind)) if !kind.is_signed() => {
                (*x as u64).to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl fmt::Display for RuntimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeValue::I8(x) => write!(f, "{x}"),
            RuntimeValue::I16(x) => write!(f, "{x}"),
            RuntimeValue::I32(x) => write!(f, "{x}"),
            RuntimeValue::I64(x) => write!(f, "{x}"),
            RuntimeValue::F32(x) => write!(f, "{x}"),
            RuntimeValue::F64(x) => write!(f, "{x}"),
            RuntimeValue::Unit => write!(f, "()"),
        }
    }
}

/// A resolved, callable function. Borrows the engine that owns its code.
#[derive(Debug)]
pub struct CompiledFunction<'e> {
    name: String,
    ptr: *const u8,
    signature: Rc<FunctionType>,
    _engine: PhantomData<&'e Engine>,
}

impl CompiledFunction<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &FunctionType {
        &self.signature
    }
}

pub struct Engine {
    // Only `None` mid-drop; every public path sees `Some`.
    module: Option<JITModule>,
    functions: IndexMap<String, FunctionInfo>,
}

impl Engine {
    /// Finalizes the module into executable memory. An error here means the
    /// module cannot be run at all.
    pub fn new(compiled: CompiledModule) -> Result<Self> {
        let CompiledModule {
            mut module,
            functions,
            ..
        } = compiled;
        module
            .finalize_definitions()
            .map_err(|e| CompileError::Cranelift(e.to_string()))?;
        debug!(functions = functions.len(), "finalized module");
        Ok(Self {
            module: Some(module),
            functions,
        })
    }

    pub fn find_function(&self, name: &str) -> Result<CompiledFunction<'_>> {
        let info = self
            .functions
            .get(name)
            .ok_or_else(|| CompileError::UnknownFunction(name.to_string()))?;
        let module = self
            .module
            .as_ref()
            .ok_or_else(|| CompileError::Cranelift("module already disposed".to_string()))?;
        Ok(CompiledFunction {
            name: name.to_string(),
            ptr: module.get_finalized_function(info.id),
            signature: info.signature.clone(),
            _engine: PhantomData,
        })
    }

    /// Calls a zero-argument function.
    pub fn run(&self, function: &CompiledFunction<'_>) -> Result<RuntimeValue> {
        self.invoke(function, None)
    }

    /// Calls a one-argument function.
    pub fn run_with(
        &self,
        function: &CompiledFunction<'_>,
        arg: RuntimeValue,
    ) -> Result<RuntimeValue> {
        self.invoke(function, Some(arg))
    }

    /// Resolves and calls `main` with no arguments.
    pub fn run_main(&self) -> Result<RuntimeValue> {
        let main = self.find_function("main")?;
        self.invoke(&main, None)
    }

    fn invoke(
        &self,
        function: &CompiledFunction<'_>,
        arg: Option<RuntimeValue>,
    ) -> Result<RuntimeValue> {
        let signature = &function.signature;
        match (signature.params.as_slice(), arg) {
            ([], None) => call0(function.ptr, &signature.return_type),
            ([param], Some(value)) => call1(function.ptr, param, value, &signature.return_type),
            (params, arg) => Err(CompileError::ArityMismatch {
                name: function.name.clone(),
                expected: params.len(),
                found: usize::from(arg.is_some()),
            }),
        }
    }

    /// Releases the executable memory now. Dropping the engine does the same
    /// thing; this form just makes the release point explicit.
    pub fn dispose(self) {}
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Some(module) = self.module.take() {
            // SAFETY: function handles borrow the engine, so none of their
            // code pointers can outlive this call.
            unsafe { module.free_memory() };
        }
    }
}

/// The register class a type occupies across the call boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AbiKind {
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Unit,
}

fn abi_kind(ty: &Type) -> Result<AbiKind> {
    Ok(match ty {
        Type::Unit => AbiKind::Unit,
        Type::Bool => AbiKind::I8,
        Type::Int(kind) => match kind.bits() {
            8 => AbiKind::I8,
            16 => AbiKind::I16,
            32 => AbiKind::I32,
            _ => AbiKind::I64,
        },
        Type::Real(RealKind::Float) => AbiKind::F32,
        Type::Real(RealKind::Double) => AbiKind::F64,
        other => return Err(CompileError::UnsupportedArgument(other.clone())),
    })
}

/// Transmutes `$ptr` to an `extern "C"` signature selected by the return
/// kind and performs the call.
macro_rules! call_typed {
    ($ptr:expr, $ret:expr, ($($arg:expr),*), ($($aty:ty),*)) => {{
        // SAFETY: the pointer comes from `get_finalized_function` for a
        // function whose declared parameter and return types were checked
        // against this exact transmuted signature.
        match $ret {
            AbiKind::Unit => {
                let f: extern "C" fn($($aty),*) = unsafe { std::mem::transmute($ptr) };
                f($($arg),*);
                RuntimeValue::Unit
            }
            AbiKind::I8 => {
                let f: extern "C" fn($($aty),*) -> i8 = unsafe { std::mem::transmute($ptr) };
                RuntimeValue::I8(f($($arg),*))
            }
            AbiKind::I16 => {
                let f: extern "C" fn($($aty),*) -> i16 = unsafe { std::mem::transmute($ptr) };
                RuntimeValue::I16(f($($arg),*))
            }
            AbiKind::I32 => {
                let f: extern "C" fn($($aty),*) -> i32 = unsafe { std::mem::transmute($ptr) };
                RuntimeValue::I32(f($($arg),*))
            }
            AbiKind::I64 => {
                let f: extern "C" fn($($aty),*) -> i64 = unsafe { std::mem::transmute($ptr) };
                RuntimeValue::I64(f($($arg),*))
            }
            AbiKind::F32 => {
                let f: extern "C" fn($($aty),*) -> f32 = unsafe { std::mem::transmute($ptr) };
                RuntimeValue::F32(f($($arg),*))
            }
            AbiKind::F64 => {
                let f: extern "C" fn($($aty),*) -> f64 = unsafe { std::mem::transmute($ptr) };
                RuntimeValue::F64(f($($arg),*))
            }
        }
    }};
}

fn call0(ptr: *const u8, return_type: &Type) -> Result<RuntimeValue> {
    let ret = abi_kind(return_type)?;
    Ok(call_typed!(ptr, ret, (), ()))
}

fn call1(
    ptr: *const u8,
    param: &Type,
    arg: RuntimeValue,
    return_type: &Type,
) -> Result<RuntimeValue> {
    let param_kind = abi_kind(param)?;
    if param_kind == AbiKind::Unit {
        return Err(CompileError::UnsupportedArgument(param.clone()));
    }
    let ret = abi_kind(return_type)?;
    match (param_kind, arg) {
        (AbiKind::I8, RuntimeValue::I8(x)) => Ok(call_typed!(ptr, ret, (x), (i8))),
        (AbiKind::I16, RuntimeValue::I16(x)) => Ok(call_typed!(ptr, ret, (x), (i16))),
        (AbiKind::I32, RuntimeValue::I32(x)) => Ok(call_typed!(ptr, ret, (x), (i32))),
        (AbiKind::I64, RuntimeValue::I64(x)) => Ok(call_typed!(ptr, ret, (x), (i64))),
        (AbiKind::F32, RuntimeValue::F32(x)) => Ok(call_typed!(ptr, ret, (x), (f32))),
        (AbiKind::F64, RuntimeValue::F64(x)) => Ok(call_typed!(ptr, ret, (x), (f64))),
        (_, value) => Err(CompileError::TypeMismatch {
            expected: param.clone(),
            found: value.canonical_type(),
        }),
    }
}
