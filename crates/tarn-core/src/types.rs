//! The Tarn type catalog.
//!
//! Types are immutable values compared structurally; the primitive variants
//! are fieldless and the composite ones share their payloads through `Rc`,
//! so cloning a type is always cheap. Subtyping is minimal: `Nothing` is the
//! bottom type, every type is a subtype of itself, and the only non-trivial
//! rules are function covariance and const covariance on references and
//! pointers. Numeric promotion is not subtyping; it is performed by the
//! lowering layer through explicit cast instructions.

use cranelift::codegen::ir::types as clif_types;
use std::fmt;
use std::rc::Rc;

use crate::{CompileError, Result};

/// The nine integer types, `Char` included: `Char` is a 16-bit signed code
/// unit, not a Unicode scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntKind {
    Char,
    Byte,
    UByte,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
}

impl IntKind {
    pub fn bits(self) -> u8 {
        match self {
            IntKind::Byte | IntKind::UByte => 8,
            IntKind::Char | IntKind::Short | IntKind::UShort => 16,
            IntKind::Int | IntKind::UInt => 32,
            IntKind::Long | IntKind::ULong => 64,
        }
    }

    pub fn is_signed(self) -> bool {
        match self {
            IntKind::Char | IntKind::Byte | IntKind::Short | IntKind::Int | IntKind::Long => true,
            IntKind::UByte | IntKind::UShort | IntKind::UInt | IntKind::ULong => false,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            IntKind::Char => "Char",
            IntKind::Byte => "Byte",
            IntKind::UByte => "UByte",
            IntKind::Short => "Short",
            IntKind::UShort => "UShort",
            IntKind::Int => "Int",
            IntKind::UInt => "UInt",
            IntKind::Long => "Long",
            IntKind::ULong => "ULong",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RealKind {
    Float,
    Double,
}

impl RealKind {
    pub fn bits(self) -> u8 {
        match self {
            RealKind::Float => 32,
            RealKind::Double => 64,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RealKind::Float => "Float",
            RealKind::Double => "Double",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Any,
    Nothing,
    Unit,
    Bool,
    Int(IntKind),
    Real(RealKind),
    Function(Rc<FunctionType>),
    Reference { inner: Rc<Type>, is_const: bool },
    Pointer { inner: Rc<Type>, is_const: bool },
    Struct(Rc<StructType>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionType {
    pub return_type: Type,
    pub params: Vec<Type>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructType {
    pub name: String,
    pub fields: Vec<StructField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructField {
    pub name: String,
    pub ty: Type,
}

impl Type {
    pub const CHAR: Type = Type::Int(IntKind::Char);
    pub const BYTE: Type = Type::Int(IntKind::Byte);
    pub const UBYTE: Type = Type::Int(IntKind::UByte);
    pub const SHORT: Type = Type::Int(IntKind::Short);
    pub const USHORT: Type = Type::Int(IntKind::UShort);
    pub const INT: Type = Type::Int(IntKind::Int);
    pub const UINT: Type = Type::Int(IntKind::UInt);
    pub const LONG: Type = Type::Int(IntKind::Long);
    pub const ULONG: Type = Type::Int(IntKind::ULong);
    pub const FLOAT: Type = Type::Real(RealKind::Float);
    pub const DOUBLE: Type = Type::Real(RealKind::Double);

    /// Primitive in the promotion sense: Boolean, integers and reals. `Unit`,
    /// `Nothing` and `Any` do not participate in operand unification.
    pub fn is_primitive(&self) -> bool {
        matches!(self, Type::Bool | Type::Int(_) | Type::Real(_))
    }

    pub fn int_kind(&self) -> Option<IntKind> {
        match self {
            Type::Int(kind) => Some(*kind),
            _ => None,
        }
    }

    pub fn is_subtype_of(&self, other: &Type) -> bool {
        if self == other || matches!(self, Type::Nothing) {
            return true;
        }
        match (self, other) {
            (Type::Function(a), Type::Function(b)) => {
                // Covariant return, exact parameter list.
                a.params == b.params && a.return_type.is_subtype_of(&b.return_type)
            }
            (
                Type::Reference {
                    inner: a,
                    is_const: a_const,
                },
                Type::Reference {
                    inner: b,
                    is_const: b_const,
                },
            )
            | (
                Type::Pointer {
                    inner: a,
                    is_const: a_const,
                },
                Type::Pointer {
                    inner: b,
                    is_const: b_const,
                },
            ) => {
                // A non-const handle may stand in where a const one is
                // expected, never the other way around.
                a_const <= b_const && a.is_subtype_of(b)
            }
            _ => false,
        }
    }

    /// Builds `&T` / `&const T`. A reference never wraps another reference.
    pub fn reference(&self, is_const: bool) -> Result<Type> {
        if matches!(self, Type::Reference { .. }) {
            return Err(CompileError::ReferenceToReference(self.clone()));
        }
        Ok(Type::Reference {
            inner: Rc::new(self.clone()),
            is_const,
        })
    }

    /// Builds `*T` / `*const T`. Pointers to pointers are fine; pointers to
    /// references are not.
    pub fn pointer(&self, is_const: bool) -> Result<Type> {
        if matches!(self, Type::Reference { .. }) {
            return Err(CompileError::PointerToReference(self.clone()));
        }
        Ok(Type::Pointer {
            inner: Rc::new(self.clone()),
            is_const,
        })
    }

    pub fn function(return_type: Type, params: Vec<Type>) -> Type {
        Type::Function(Rc::new(FunctionType {
            return_type,
            params,
        }))
    }

    /// The scalar CLIF type carrying values of this type, if there is one.
    /// Struct values have no scalar form; they live in memory and are passed
    /// around by address.
    pub fn to_cranelift(&self, ptr: clif_types::Type) -> Option<clif_types::Type> {
        match self {
            Type::Bool => Some(clif_types::I8),
            Type::Int(kind) => Some(match kind.bits() {
                8 => clif_types::I8,
                16 => clif_types::I16,
                32 => clif_types::I32,
                _ => clif_types::I64,
            }),
            Type::Real(RealKind::Float) => Some(clif_types::F32),
            Type::Real(RealKind::Double) => Some(clif_types::F64),
            Type::Reference { .. } | Type::Pointer { .. } | Type::Function(_) => Some(ptr),
            Type::Any | Type::Nothing | Type::Unit | Type::Struct(_) => None,
        }
    }

    pub fn size_bytes(&self, ptr_bytes: u32) -> Option<u32> {
        match self {
            Type::Bool => Some(1),
            Type::Int(kind) => Some(kind.bits() as u32 / 8),
            Type::Real(kind) => Some(kind.bits() as u32 / 8),
            Type::Reference { .. } | Type::Pointer { .. } => Some(ptr_bytes),
            Type::Struct(def) => def.size_bytes(ptr_bytes),
            Type::Any | Type::Nothing | Type::Unit | Type::Function(_) => None,
        }
    }

    /// Natural alignment: scalars align to their size, structs to their
    /// widest field.
    pub fn align_bytes(&self, ptr_bytes: u32) -> Option<u32> {
        match self {
            Type::Struct(def) => def.align_bytes(ptr_bytes),
            _ => self.size_bytes(ptr_bytes),
        }
    }

    /// The built-in named types. Struct names are resolved separately against
    /// the compilation context's registry.
    pub fn primitive_from_name(name: &str) -> Option<Type> {
        match name {
            "Any" => Some(Type::Any),
            "Nothing" => Some(Type::Nothing),
            "Unit" => Some(Type::Unit),
            "Boolean" => Some(Type::Bool),
            "Char" => Some(Type::Int(IntKind::Char)),
            "Byte" => Some(Type::Int(IntKind::Byte)),
            "UByte" => Some(Type::Int(IntKind::UByte)),
            "Short" => Some(Type::Int(IntKind::Short)),
            "UShort" => Some(Type::Int(IntKind::UShort)),
            "Int" => Some(Type::Int(IntKind::Int)),
            "UInt" => Some(Type::Int(IntKind::UInt)),
            "Long" => Some(Type::Int(IntKind::Long)),
            "ULong" => Some(Type::Int(IntKind::ULong)),
            "Float" => Some(Type::Real(RealKind::Float)),
            "Double" => Some(Type::Real(RealKind::Double)),
            _ => None,
        }
    }
}

impl StructType {
    /// Looks a field up by name, returning its index and definition.
    pub fn field(&self, name: &str) -> Option<(usize, &StructField)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, f)| f.name == name)
    }

    /// Byte offset of the field at `index` under natural alignment.
    pub fn field_offset(&self, index: usize, ptr_bytes: u32) -> Option<u32> {
        let mut offset = 0u32;
        for (i, field) in self.fields.iter().enumerate() {
            let align = field.ty.align_bytes(ptr_bytes)?;
            offset = align_to(offset, align);
            if i == index {
                return Some(offset);
            }
            offset += field.ty.size_bytes(ptr_bytes)?;
        }
        None
    }

    pub fn size_bytes(&self, ptr_bytes: u32) -> Option<u32> {
        let mut offset = 0u32;
        let mut max_align = 1u32;
        for field in &self.fields {
            let align = field.ty.align_bytes(ptr_bytes)?;
            offset = align_to(offset, align) + field.ty.size_bytes(ptr_bytes)?;
            max_align = max_align.max(align);
        }
        Some(align_to(offset, max_align))
    }

    pub fn align_bytes(&self, ptr_bytes: u32) -> Option<u32> {
        let mut max_align = 1u32;
        for field in &self.fields {
            max_align = max_align.max(field.ty.align_bytes(ptr_bytes)?);
        }
        Some(max_align)
    }
}

fn align_to(offset: u32, align: u32) -> u32 {
    (offset + align - 1) / align * align
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Any => write!(f, "Any"),
            Type::Nothing => write!(f, "Nothing"),
            Type::Unit => write!(f, "Unit"),
            Type::Bool => write!(f, "Boolean"),
            Type::Int(kind) => write!(f, "{}", kind.name()),
            Type::Real(kind) => write!(f, "{}", kind.name()),
            Type::Function(func) => {
                write!(f, "(")?;
                for (i, param) in func.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", param)?;
                }
                write!(f, ") -> {}", func.return_type)
            }
            Type::Reference { inner, is_const } => {
                if *is_const {
                    write!(f, "&const ({})", inner)
                } else {
                    write!(f, "&({})", inner)
                }
            }
            Type::Pointer { inner, is_const } => {
                if *is_const {
                    write!(f, "*const ({})", inner)
                } else {
                    write!(f, "*({})", inner)
                }
            }
            Type::Struct(def) => write!(f, "{}", def.name),
        }
    }
}
