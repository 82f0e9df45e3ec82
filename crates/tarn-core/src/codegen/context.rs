//! The compilation context threaded through lowering.
//!
//! The context is an explicit argument everywhere; nothing in the compiler is
//! global state. It owns the named-type registry (built-ins plus declared
//! structs), the function registry populated by the declaration pass, the
//! stack of lexical scopes, and a counter that names anonymous temporaries
//! in trace output.

use std::collections::HashMap;
use std::rc::Rc;

use cranelift_codegen::ir;
use cranelift_module::FuncId;
use indexmap::IndexMap;
use tarn_syntax::ast::TypeExpr;

use crate::types::{FunctionType, StructType, Type};
use crate::values::ValueRef;
use crate::{CompileError, Result};

/// A function known to the module: its backend id and language signature.
#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub id: FuncId,
    pub signature: Rc<FunctionType>,
}

#[derive(Debug, Default)]
struct Scope {
    symbols: HashMap<String, ValueRef>,
}

pub struct Context {
    structs: IndexMap<String, Type>,
    functions: IndexMap<String, FunctionInfo>,
    scope_stack: Vec<Scope>,
    next_temp: u32,
    pub ptr_type: ir::Type,
}

impl Context {
    pub fn new(ptr_type: ir::Type) -> Self {
        Self {
            structs: IndexMap::new(),
            functions: IndexMap::new(),
            scope_stack: Vec::new(),
            next_temp: 0,
            ptr_type,
        }
    }

    pub fn ptr_bytes(&self) -> u32 {
        self.ptr_type.bytes()
    }

    // =========================================
    // Named types
    // =========================================

    pub fn register_struct(&mut self, def: StructType) -> Type {
        let name = def.name.clone();
        let ty = Type::Struct(Rc::new(def));
        self.structs.insert(name, ty.clone());
        ty
    }

    pub fn struct_type(&self, name: &str) -> Option<&Type> {
        self.structs.get(name)
    }

    /// Resolves a surface type expression against built-ins and registered
    /// structs. Reference/pointer layers go through the fallible type
    /// constructors, so `&&Int` style nesting fails here.
    pub fn resolve_type(&self, expr: &TypeExpr) -> Result<Type> {
        match expr {
            TypeExpr::Named(name) => Type::primitive_from_name(name)
                .or_else(|| self.structs.get(name.as_str()).cloned())
                .ok_or_else(|| CompileError::UnknownType(name.clone())),
            TypeExpr::Reference { inner, is_const } => {
                self.resolve_type(inner)?.reference(*is_const)
            }
            TypeExpr::Pointer { inner, is_const } => self.resolve_type(inner)?.pointer(*is_const),
        }
    }

    // =========================================
    // Functions
    // =========================================

    pub fn declare_function(&mut self, name: String, id: FuncId, signature: Rc<FunctionType>) {
        self.functions.insert(name, FunctionInfo { id, signature });
    }

    pub fn function(&self, name: &str) -> Result<&FunctionInfo> {
        self.functions
            .get(name)
            .ok_or_else(|| CompileError::UnknownFunction(name.to_string()))
    }

    pub fn functions(&self) -> impl Iterator<Item = (&String, &FunctionInfo)> {
        self.functions.iter()
    }

    pub fn into_functions(self) -> IndexMap<String, FunctionInfo> {
        self.functions
    }

    // =========================================
    // Scopes
    // =========================================

    pub fn push_scope(&mut self) {
        self.scope_stack.push(Scope::default());
    }

    pub fn pop_scope(&mut self) {
        self.scope_stack.pop();
    }

    pub fn add_symbol(&mut self, name: String, value: ValueRef) {
        if let Some(scope) = self.scope_stack.last_mut() {
            scope.symbols.insert(name, value);
        }
    }

    pub fn lookup_symbol(&self, name: &str) -> Result<ValueRef> {
        for scope in self.scope_stack.iter().rev() {
            if let Some(symbol) = scope.symbols.get(name) {
                return Ok(symbol.clone());
            }
        }
        Err(CompileError::UnresolvedSymbol(name.to_string()))
    }

    /// Names an anonymous temporary for trace output. Temporaries are never
    /// entered into a scope, so they cannot shadow user bindings.
    pub fn fresh_temp(&mut self, hint: &str) -> String {
        let n = self.next_temp;
        self.next_temp += 1;
        format!("{}.{}", hint, n)
    }
}
