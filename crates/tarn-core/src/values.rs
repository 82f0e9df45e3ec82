//! Values and storage handles.
//!
//! Every lowered expression produces an [`Operand`]: either a computed
//! [`Value`] or an addressable [`ValueRef`] (a place). Places remember their
//! declared type and constness; reading through one loads the declared type,
//! writing through one refuses const storage and type-mismatched stores.
//! Implicit casts are the caller's job, the storage layer never converts.

use std::rc::Rc;

use cranelift::prelude::{InstBuilder, MemFlags};
use cranelift_codegen::ir;
use cranelift_codegen::ir::immediates::Offset32;
use cranelift_codegen::isa::TargetFrontendConfig;
use cranelift_frontend::FunctionBuilder;

use crate::types::Type;
use crate::{CompileError, Result};

/// A computed value. `Unit` and `Nothing` carry no IR handle; a struct-typed
/// value's handle is the address of its backing storage, since Cranelift has
/// no aggregate SSA values.
#[derive(Debug, Clone)]
pub struct Value {
    pub ir: Option<ir::Value>,
    pub ty: Type,
}

impl Value {
    pub fn new(ir: ir::Value, ty: Type) -> Self {
        Self { ir: Some(ir), ty }
    }

    pub fn unit() -> Self {
        Self {
            ir: None,
            ty: Type::Unit,
        }
    }

    pub fn nothing() -> Self {
        Self {
            ir: None,
            ty: Type::Nothing,
        }
    }
}

/// A storage handle: an address, the stored (declared) type and whether the
/// storage is const. The stored type is never itself a reference; declaration
/// sites enforce that before building a handle.
#[derive(Debug, Clone)]
pub struct ValueRef {
    pub addr: ir::Value,
    pub ty: Type,
    pub is_const: bool,
}

impl ValueRef {
    pub fn new(addr: ir::Value, ty: Type, is_const: bool) -> Self {
        Self { addr, ty, is_const }
    }

    /// The handle's type when it appears as an expression: a reference to the
    /// stored type, const iff the storage is.
    pub fn reference_type(&self) -> Type {
        Type::Reference {
            inner: Rc::new(self.ty.clone()),
            is_const: self.is_const,
        }
    }

    /// Loads the stored value. Struct storage is not copied; the result is a
    /// struct value backed by this same address.
    pub fn get(
        &self,
        builder: &mut FunctionBuilder,
        config: TargetFrontendConfig,
    ) -> Result<Value> {
        load_typed(builder, config, self.addr, &self.ty)
    }

    /// Stores `value`. Fails on const storage and on any type difference;
    /// callers insert implicit casts before calling.
    pub fn set(
        &self,
        builder: &mut FunctionBuilder,
        config: TargetFrontendConfig,
        value: &Value,
    ) -> Result<()> {
        if self.is_const {
            return Err(CompileError::AssignToConst(self.ty.clone()));
        }
        if value.ty != self.ty {
            return Err(CompileError::TypeMismatch {
                expected: self.ty.clone(),
                found: value.ty.clone(),
            });
        }
        match (&self.ty, value.ir) {
            (Type::Struct(def), Some(src)) => {
                let ptr_bytes = config.pointer_type().bytes();
                let size = def
                    .size_bytes(ptr_bytes)
                    .ok_or_else(|| CompileError::UnsizedType(self.ty.clone()))?;
                let align = def
                    .align_bytes(ptr_bytes)
                    .ok_or_else(|| CompileError::UnsizedType(self.ty.clone()))?
                    as u8;
                // Source and destination may alias (`p = p`), so the copy
                // must tolerate overlap.
                builder.emit_small_memory_copy(
                    config,
                    self.addr,
                    src,
                    size as u64,
                    align,
                    align,
                    false,
                    MemFlags::trusted(),
                );
                Ok(())
            }
            (_, Some(ir_value)) => {
                builder
                    .ins()
                    .store(MemFlags::trusted(), ir_value, self.addr, Offset32::new(0));
                Ok(())
            }
            (_, None) => Err(CompileError::UnstorableType(self.ty.clone())),
        }
    }
}

/// What lowering an expression yields: a computed value or a place.
#[derive(Debug, Clone)]
pub enum Operand {
    Value(Value),
    Place(ValueRef),
}

impl Operand {
    /// The operand's effective type: places appear as references to their
    /// stored type.
    pub fn ty(&self) -> Type {
        match self {
            Operand::Value(v) => v.ty.clone(),
            Operand::Place(r) => r.reference_type(),
        }
    }

    pub fn as_place(&self) -> Option<&ValueRef> {
        match self {
            Operand::Place(r) => Some(r),
            Operand::Value(_) => None,
        }
    }

    /// Strips one level of indirection: loads through a place or through a
    /// reference-typed value; plain values pass through unchanged. Operators
    /// apply this to both sides before looking at types.
    pub fn dereference(
        &self,
        builder: &mut FunctionBuilder,
        config: TargetFrontendConfig,
    ) -> Result<Value> {
        match self {
            Operand::Place(r) => r.get(builder, config),
            Operand::Value(v) => match (&v.ty, v.ir) {
                (Type::Reference { inner, .. }, Some(addr)) => {
                    load_typed(builder, config, addr, inner)
                }
                _ => Ok(v.clone()),
            },
        }
    }
}

fn load_typed(
    builder: &mut FunctionBuilder,
    config: TargetFrontendConfig,
    addr: ir::Value,
    ty: &Type,
) -> Result<Value> {
    match ty {
        Type::Struct(_) => Ok(Value::new(addr, ty.clone())),
        _ => {
            let clif = ty
                .to_cranelift(config.pointer_type())
                .ok_or_else(|| CompileError::UnstorableType(ty.clone()))?;
            let loaded = builder
                .ins()
                .load(clif, MemFlags::trusted(), addr, Offset32::new(0));
            Ok(Value::new(loaded, ty.clone()))
        }
    }
}
