//! AST produced by the parser.
//!
//! The tree is deliberately close to the surface syntax: member access keeps
//! its right-hand side as a full expression (the compiler, not the parser,
//! rejects non-name members), and assignment targets are arbitrary
//! expressions validated during lowering. Everything serializes so the CLI
//! can dump parsed programs as JSON.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Program {
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, Serialize)]
pub enum Item {
    Function(Function),
    Struct(StructDef),
}

#[derive(Debug, Clone, Serialize)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    /// `None` means the function returns `Unit`.
    pub return_type: Option<TypeExpr>,
    /// Always an [`Expr::Block`]; its value becomes the implicit return.
    pub body: Expr,
}

#[derive(Debug, Clone, Serialize)]
pub struct Param {
    pub name: String,
    pub ty: TypeExpr,
}

#[derive(Debug, Clone, Serialize)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Field {
    pub name: String,
    pub ty: TypeExpr,
}

/// A type as written in source. Resolution against the type catalog happens
/// in `tarn-core`, so unknown names survive parsing.
#[derive(Debug, Clone, Serialize)]
pub enum TypeExpr {
    Named(String),
    Reference { inner: Box<TypeExpr>, is_const: bool },
    Pointer { inner: Box<TypeExpr>, is_const: bool },
}

#[derive(Debug, Clone, Serialize)]
pub enum Stmt {
    Val {
        name: String,
        ty: Option<TypeExpr>,
        init: Expr,
    },
    Var {
        name: String,
        ty: Option<TypeExpr>,
        init: Option<Expr>,
    },
    Return(Option<Expr>),
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Expr,
        cond: Expr,
    },
    Expr(Expr),
}

#[derive(Debug, Clone, Serialize)]
pub enum Expr {
    Int(i32),
    UInt(u32),
    Long(i64),
    ULong(u64),
    Double(f64),
    Bool(bool),
    Char(u16),
    Name(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `op` is `None` for plain `=`, or the underlying arithmetic operator
    /// for compound forms such as `+=`.
    Assign {
        op: Option<BinaryOp>,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Member {
        base: Box<Expr>,
        member: Box<Expr>,
    },
    Cast {
        expr: Box<Expr>,
        ty: TypeExpr,
    },
    Call {
        callee: String,
        args: Vec<Expr>,
    },
    StructLiteral {
        name: String,
        inits: Vec<FieldInit>,
    },
    SizeOf(TypeExpr),
    If {
        cond: Box<Expr>,
        then_body: Box<Stmt>,
        else_body: Option<Box<Stmt>>,
    },
    Block(Vec<Stmt>),
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldInit {
    pub name: String,
    pub value: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    /// Source spelling, used in error messages.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    Neg,
    BitNot,
    Not,
    PreInc,
    PreDec,
    Deref,
    AddrOf,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::BitNot => "~",
            UnaryOp::Not => "!",
            UnaryOp::PreInc => "++",
            UnaryOp::PreDec => "--",
            UnaryOp::Deref => "*",
            UnaryOp::AddrOf => "&",
        }
    }
}
