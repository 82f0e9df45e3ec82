//! The module compiler: drives a whole program through registration,
//! declaration and definition.
//!
//! Compilation is three passes over the item list. Structs are registered
//! first so function signatures can mention them, then every function is
//! declared so bodies can call forward, then each body is lowered and
//! defined. The pretty-printed IR of every function is captured before
//! definition so it can be shown without recompiling.

use std::rc::Rc;

use cranelift::prelude::{settings, AbiParam, Configurable};
use cranelift_codegen::ir::{self, UserFuncName};
use cranelift_codegen::Context as ClifContext;
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{default_libcall_names, Linkage, Module};
use indexmap::IndexMap;
use tarn_syntax::ast::{self, Item, Program};
use tracing::debug;

use crate::codegen::context::{Context, FunctionInfo};
use crate::codegen::lower::FunctionLowerer;
use crate::types::{FunctionType, StructField, StructType, Type};
use crate::{CompileError, Result};

pub struct ModuleCompiler {
    module: JITModule,
    cx: Context,
}

/// A fully defined but not yet finalized module, plus the language-level
/// signatures of everything in it. Feed it to [`crate::Engine::new`] to make
/// it runnable.
pub struct CompiledModule {
    pub(crate) module: JITModule,
    pub(crate) functions: IndexMap<String, FunctionInfo>,
    pub(crate) clif: Vec<(String, String)>,
}

impl CompiledModule {
    /// The pretty-printed backend IR of each function, in declaration order.
    pub fn display_ir(&self) -> impl Iterator<Item = (&str, &str)> {
        self.clif
            .iter()
            .map(|(name, text)| (name.as_str(), text.as_str()))
    }

    pub fn signature(&self, name: &str) -> Option<&Rc<FunctionType>> {
        self.functions.get(name).map(|info| &info.signature)
    }
}

impl ModuleCompiler {
    /// Builds a JIT module for the host machine.
    pub fn new() -> Result<Self> {
        let mut flag_builder = settings::builder();
        flag_builder
            .set("use_colocated_libcalls", "false")
            .map_err(cranelift_error)?;
        flag_builder.set("is_pic", "false").map_err(cranelift_error)?;
        flag_builder.set("opt_level", "speed").map_err(cranelift_error)?;
        let isa_builder = cranelift_native::builder()
            .map_err(|msg| CompileError::Cranelift(msg.to_string()))?;
        let isa = isa_builder
            .finish(settings::Flags::new(flag_builder))
            .map_err(cranelift_error)?;

        let jit_builder = JITBuilder::with_isa(isa, default_libcall_names());
        let module = JITModule::new(jit_builder);
        let ptr_type = module.target_config().pointer_type();
        Ok(Self {
            module,
            cx: Context::new(ptr_type),
        })
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub fn compile(mut self, program: &Program) -> Result<CompiledModule> {
        for item in &program.items {
            if let Item::Struct(def) = item {
                self.register_struct(def)?;
            }
        }
        for item in &program.items {
            if let Item::Function(function) = item {
                self.declare_function(function)?;
            }
        }

        let mut fb_ctx = FunctionBuilderContext::new();
        let mut clif = Vec::new();
        for item in &program.items {
            if let Item::Function(function) = item {
                let text = self.define_function(function, &mut fb_ctx)?;
                clif.push((function.name.clone(), text));
            }
        }

        Ok(CompiledModule {
            module: self.module,
            functions: self.cx.into_functions(),
            clif,
        })
    }

    /// Resolves a struct's fields and enters its layout into the context.
    /// Structs only see names declared before them, so a struct cannot
    /// contain itself.
    fn register_struct(&mut self, def: &ast::StructDef) -> Result<()> {
        let mut fields = Vec::with_capacity(def.fields.len());
        for field in &def.fields {
            let ty = self.cx.resolve_type(&field.ty)?;
            if matches!(ty, Type::Reference { .. }) {
                return Err(CompileError::UnstorableType(ty));
            }
            if ty.size_bytes(self.cx.ptr_bytes()).is_none() {
                return Err(CompileError::UnsizedType(ty));
            }
            fields.push(StructField {
                name: field.name.clone(),
                ty,
            });
        }
        self.cx.register_struct(StructType {
            name: def.name.clone(),
            fields,
        });
        debug!(name = %def.name, "registered struct");
        Ok(())
    }

    fn declare_function(&mut self, function: &ast::Function) -> Result<()> {
        let signature = self.language_signature(function)?;

        let mut sig = self.module.make_signature();
        for param in &signature.params {
            let clif = param
                .to_cranelift(self.cx.ptr_type)
                .ok_or_else(|| CompileError::InvalidSignature {
                    func: function.name.clone(),
                    ty: param.clone(),
                })?;
            sig.params.push(AbiParam::new(clif));
        }
        if signature.return_type != Type::Unit {
            let clif = signature
                .return_type
                .to_cranelift(self.cx.ptr_type)
                .ok_or_else(|| CompileError::InvalidSignature {
                    func: function.name.clone(),
                    ty: signature.return_type.clone(),
                })?;
            sig.returns.push(AbiParam::new(clif));
        }

        let id = self
            .module
            .declare_function(&function.name, Linkage::Export, &sig)
            .map_err(cranelift_error)?;
        self.cx
            .declare_function(function.name.clone(), id, Rc::new(signature));
        debug!(function = %function.name, "declared function");
        Ok(())
    }

    /// The language-level signature, with the ABI restriction applied:
    /// parameters and returns travel by register, so only primitives,
    /// references and pointers are allowed (plus `Unit` as a return).
    fn language_signature(&self, function: &ast::Function) -> Result<FunctionType> {
        let return_type = match &function.return_type {
            Some(expr) => self.cx.resolve_type(expr)?,
            None => Type::Unit,
        };
        if return_type != Type::Unit && !abi_scalar(&return_type) {
            return Err(CompileError::InvalidSignature {
                func: function.name.clone(),
                ty: return_type,
            });
        }
        let mut params = Vec::with_capacity(function.params.len());
        for param in &function.params {
            let ty = self.cx.resolve_type(&param.ty)?;
            if !abi_scalar(&ty) {
                return Err(CompileError::InvalidSignature {
                    func: function.name.clone(),
                    ty,
                });
            }
            params.push(ty);
        }
        Ok(FunctionType {
            return_type,
            params,
        })
    }

    fn define_function(
        &mut self,
        function: &ast::Function,
        fb_ctx: &mut FunctionBuilderContext,
    ) -> Result<String> {
        let info = self.cx.function(&function.name)?.clone();
        let sig = self
            .module
            .declarations()
            .get_function_decl(info.id)
            .signature
            .clone();
        let mut func =
            ir::Function::with_name_signature(UserFuncName::user(0, info.id.as_u32()), sig);

        {
            let mut builder = FunctionBuilder::new(&mut func, fb_ctx);
            let return_type = info.signature.return_type.clone();
            let mut lowerer =
                FunctionLowerer::new(&mut self.cx, &mut builder, &mut self.module, return_type);
            lowerer.lower_function(function)?;
            builder.seal_all_blocks();
            builder.finalize();
        }

        let text = func.display().to_string();
        let mut clif_cx = ClifContext::for_function(func);
        self.module
            .define_function(info.id, &mut clif_cx)
            .map_err(cranelift_error)?;
        debug!(function = %function.name, "defined function");
        Ok(text)
    }
}

fn abi_scalar(ty: &Type) -> bool {
    matches!(
        ty,
        Type::Bool | Type::Int(_) | Type::Real(_) | Type::Reference { .. } | Type::Pointer { .. }
    )
}

fn cranelift_error(err: impl std::fmt::Display) -> CompileError {
    CompileError::Cranelift(err.to_string())
}
