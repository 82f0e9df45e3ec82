//! Expression and statement lowering.
//!
//! One [`FunctionLowerer`] exists per function body. Every expression lowers
//! to an [`Operand`]; operators dereference both sides first, unify the
//! operand types (wider width wins, unsigned wins a width tie, reals beat
//! integers), insert implicit casts and then emit the instruction selected
//! by the common type's signedness.
//!
//! Control flow merges values through a temporary stack slot: each branch
//! stores exactly once before jumping to the merge block, which loads the
//! slot. Cranelift requires a block to be filled before moving on, so the
//! store lands at the end of whatever block a branch body finished in.
//! `&&` and `||` evaluate both operands; there is no short circuit.

use cranelift::prelude::{FloatCC, InstBuilder, IntCC, MemFlags, StackSlotData, StackSlotKind};
use cranelift_codegen::ir::{self, immediates::Offset32};
use cranelift_frontend::FunctionBuilder;
use cranelift_jit::JITModule;
use cranelift_module::Module;
use tarn_syntax::ast::{self, BinaryOp, Expr, Stmt, UnaryOp};
use tracing::trace;

use crate::codegen::context::Context;
use crate::types::{RealKind, StructType, Type};
use crate::values::{Operand, Value, ValueRef};
use crate::{CompileError, Result};

pub struct FunctionLowerer<'a, 'b> {
    pub cx: &'a mut Context,
    pub builder: &'a mut FunctionBuilder<'b>,
    pub module: &'a mut JITModule,
    return_type: Type,
}

impl<'a, 'b> FunctionLowerer<'a, 'b> {
    pub fn new(
        cx: &'a mut Context,
        builder: &'a mut FunctionBuilder<'b>,
        module: &'a mut JITModule,
        return_type: Type,
    ) -> Self {
        Self {
            cx,
            builder,
            module,
            return_type,
        }
    }

    fn ptr_type(&self) -> ir::Type {
        self.cx.ptr_type
    }

    /// Lowers a whole function: entry block, parameter spills, body, and the
    /// implicit return of the body's value.
    #[tracing::instrument(level = "debug", skip_all, fields(function = %function.name))]
    pub fn lower_function(&mut self, function: &ast::Function) -> Result<()> {
        let entry = self.builder.create_block();
        self.builder.append_block_params_for_function_params(entry);
        self.builder.switch_to_block(entry);
        let param_values: Vec<ir::Value> = self.builder.block_params(entry).to_vec();

        self.cx.push_scope();
        for (param, ir_value) in function.params.iter().zip(param_values) {
            let ty = self.cx.resolve_type(&param.ty)?;
            match ty {
                // A reference parameter is already an address; bind it as the
                // place it points at instead of spilling it.
                Type::Reference { inner, is_const } => {
                    let handle = ValueRef::new(ir_value, inner.as_ref().clone(), is_const);
                    self.cx.add_symbol(param.name.clone(), handle);
                }
                // Everything else spills; parameters are immutable bindings.
                _ => {
                    self.declare_variable(&param.name, Value::new(ir_value, ty), true)?;
                }
            }
        }

        let result = self.lower_expr(&function.body)?;
        self.emit_epilogue(result)?;
        self.cx.pop_scope();
        Ok(())
    }

    fn emit_epilogue(&mut self, result: Operand) -> Result<()> {
        let return_type = self.return_type.clone();
        if return_type == Type::Unit {
            self.builder.ins().return_(&[]);
            return Ok(());
        }
        let out = self.returnable_value(result, &return_type)?;
        match out.ir {
            Some(v) => {
                self.builder.ins().return_(&[v]);
                Ok(())
            }
            None => Err(CompileError::UnstorableType(out.ty)),
        }
    }

    /// Shapes an operand into the value a `return_type`-returning function
    /// hands back: reference returns take the place's address, everything
    /// else is dereferenced and cast. A `Nothing` result means every path
    /// already returned; the unreachable block still has to be well-formed,
    /// so it gets a placeholder.
    fn returnable_value(&mut self, result: Operand, return_type: &Type) -> Result<Value> {
        let value = if matches!(return_type, Type::Reference { .. }) {
            reference_value(result)
        } else {
            self.dereference(result)?
        };
        if value.ty == Type::Nothing {
            self.undef_value(return_type)
        } else {
            self.implicit_cast(value, return_type)
        }
    }

    // =========================================
    // Statements
    // =========================================

    fn lower_statement(&mut self, stmt: &Stmt) -> Result<Operand> {
        match stmt {
            Stmt::Expr(expr) => self.lower_expr(expr),
            Stmt::Val { name, ty, init } => {
                self.lower_declaration(name, ty.as_ref(), Some(init), true)
            }
            Stmt::Var { name, ty, init } => {
                self.lower_declaration(name, ty.as_ref(), init.as_ref(), false)
            }
            Stmt::Return(expr) => self.lower_return(expr.as_ref()),
            Stmt::While { cond, body } => self.lower_while(cond, body),
            Stmt::DoWhile { body, cond } => self.lower_do_while(body, cond),
        }
    }

    fn lower_declaration(
        &mut self,
        name: &str,
        annotation: Option<&ast::TypeExpr>,
        init: Option<&Expr>,
        is_const: bool,
    ) -> Result<Operand> {
        let declared = match annotation {
            Some(type_expr) => Some(self.cx.resolve_type(type_expr)?),
            None => None,
        };
        let value = match init {
            Some(expr) => {
                let v = self.lower_value(expr)?;
                match &declared {
                    Some(ty) => self.implicit_cast(v, ty)?,
                    None => v,
                }
            }
            None => {
                // `var x: T` without an initializer starts out zeroed. The
                // parser guarantees an annotation is present here.
                let ty = declared
                    .clone()
                    .ok_or(CompileError::UnstorableType(Type::Unit))?;
                self.undef_value(&ty)?
            }
        };
        self.declare_variable(name, value, is_const)?;
        Ok(Operand::Value(Value::unit()))
    }

    fn lower_return(&mut self, expr: Option<&Expr>) -> Result<Operand> {
        let return_type = self.return_type.clone();
        if return_type == Type::Unit {
            if let Some(e) = expr {
                let value = self.lower_value(e)?;
                if !matches!(value.ty, Type::Unit | Type::Nothing) {
                    return Err(CompileError::IllegalCast {
                        from: value.ty,
                        to: Type::Unit,
                    });
                }
            }
            self.builder.ins().return_(&[]);
        } else {
            let operand = match expr {
                Some(e) => self.lower_expr(e)?,
                None => Operand::Value(Value::unit()),
            };
            let out = self.returnable_value(operand, &return_type)?;
            match out.ir {
                Some(v) => {
                    self.builder.ins().return_(&[v]);
                }
                None => return Err(CompileError::UnstorableType(out.ty)),
            }
        }
        // Anything after a return is unreachable; keep lowering into a fresh
        // block so the builder always sits in an open one.
        let dead = self.builder.create_block();
        self.builder.switch_to_block(dead);
        Ok(Operand::Value(Value::nothing()))
    }

    fn lower_while(&mut self, cond: &Expr, body: &Stmt) -> Result<Operand> {
        let header = self.builder.create_block();
        let body_block = self.builder.create_block();
        let exit = self.builder.create_block();

        self.builder.ins().jump(header, &[]);
        self.builder.switch_to_block(header);
        let cond_value = self.lower_value(cond)?;
        let cond_ir = self.require_bool(cond_value)?;
        self.builder.ins().brif(cond_ir, body_block, &[], exit, &[]);

        self.builder.switch_to_block(body_block);
        self.lower_statement(body)?;
        self.builder.ins().jump(header, &[]);

        self.builder.switch_to_block(exit);
        Ok(Operand::Value(Value::unit()))
    }

    fn lower_do_while(&mut self, body: &Expr, cond: &Expr) -> Result<Operand> {
        let body_block = self.builder.create_block();
        let exit = self.builder.create_block();

        self.builder.ins().jump(body_block, &[]);
        self.builder.switch_to_block(body_block);
        self.lower_expr(body)?;
        let cond_value = self.lower_value(cond)?;
        let cond_ir = self.require_bool(cond_value)?;
        self.builder.ins().brif(cond_ir, body_block, &[], exit, &[]);

        self.builder.switch_to_block(exit);
        Ok(Operand::Value(Value::unit()))
    }

    // =========================================
    // Expressions
    // =========================================

    pub fn lower_expr(&mut self, expr: &Expr) -> Result<Operand> {
        match expr {
            Expr::Int(v) => Ok(self.const_int(ir::types::I32, i64::from(*v), Type::INT)),
            // Unsigned literals travel as the sign-extended bit pattern;
            // `iconst` rejects immediates outside the type's signed range.
            Expr::UInt(v) => Ok(self.const_int(ir::types::I32, i64::from(*v as i32), Type::UINT)),
            Expr::Long(v) => Ok(self.const_int(ir::types::I64, *v, Type::LONG)),
            Expr::ULong(v) => Ok(self.const_int(ir::types::I64, *v as i64, Type::ULONG)),
            Expr::Double(v) => {
                let ir_value = self.builder.ins().f64const(*v);
                Ok(Operand::Value(Value::new(ir_value, Type::DOUBLE)))
            }
            Expr::Bool(b) => Ok(self.const_int(ir::types::I8, i64::from(*b), Type::Bool)),
            Expr::Char(c) => Ok(self.const_int(ir::types::I16, i64::from(*c as i16), Type::CHAR)),
            Expr::Name(name) => Ok(Operand::Place(self.cx.lookup_symbol(name)?)),
            Expr::Unary { op, operand } => self.lower_unary(*op, operand),
            Expr::Binary { op, lhs, rhs } => self.lower_binary(*op, lhs, rhs),
            Expr::Assign { op, target, value } => self.lower_assign(*op, target, value),
            Expr::Member { base, member } => self.lower_member(base, member),
            Expr::Cast { expr, ty } => self.lower_cast(expr, ty),
            Expr::Call { callee, args } => self.lower_call(callee, args),
            Expr::StructLiteral { name, inits } => self.lower_struct_literal(name, inits),
            Expr::SizeOf(type_expr) => self.lower_sizeof(type_expr),
            Expr::If {
                cond,
                then_body,
                else_body,
            } => self.lower_if(cond, then_body, else_body.as_deref()),
            Expr::Block(stmts) => self.lower_block(stmts),
        }
    }

    fn lower_block(&mut self, stmts: &[Stmt]) -> Result<Operand> {
        self.cx.push_scope();
        let mut result = Operand::Value(Value::unit());
        for stmt in stmts {
            result = self.lower_statement(stmt)?;
        }
        self.cx.pop_scope();
        Ok(result)
    }

    fn lower_unary(&mut self, op: UnaryOp, operand: &Expr) -> Result<Operand> {
        match op {
            UnaryOp::Neg => {
                let v = self.lower_value(operand)?;
                let out = match (&v.ty, v.ir) {
                    (Type::Int(_), Some(x)) => self.builder.ins().ineg(x),
                    (Type::Real(_), Some(x)) => self.builder.ins().fneg(x),
                    _ => {
                        return Err(CompileError::UnsupportedOperand {
                            op: op.symbol(),
                            ty: v.ty,
                        })
                    }
                };
                Ok(Operand::Value(Value::new(out, v.ty)))
            }
            UnaryOp::BitNot => {
                let v = self.lower_value(operand)?;
                match (&v.ty, v.ir) {
                    (Type::Int(_), Some(x)) => {
                        let out = self.builder.ins().bnot(x);
                        Ok(Operand::Value(Value::new(out, v.ty)))
                    }
                    _ => Err(CompileError::UnsupportedOperand {
                        op: op.symbol(),
                        ty: v.ty,
                    }),
                }
            }
            UnaryOp::Not => {
                let v = self.lower_value(operand)?;
                match (&v.ty, v.ir) {
                    (Type::Bool, Some(x)) => {
                        // Booleans are canonical 0/1 in an i8; flip the low
                        // bit rather than all of them.
                        let out = self.builder.ins().bxor_imm(x, 1);
                        Ok(Operand::Value(Value::new(out, Type::Bool)))
                    }
                    _ => Err(CompileError::UnsupportedOperand {
                        op: op.symbol(),
                        ty: v.ty,
                    }),
                }
            }
            UnaryOp::PreInc | UnaryOp::PreDec => {
                let target = self.lower_expr(operand)?;
                let place = match target.as_place() {
                    Some(r) => r.clone(),
                    None => return Err(CompileError::InvalidAssignmentTarget(target.ty())),
                };
                if place.ty.int_kind().is_none() {
                    return Err(CompileError::UnsupportedOperand {
                        op: op.symbol(),
                        ty: place.ty,
                    });
                }
                let current = self.read_place(&place)?;
                let current_ir = match current.ir {
                    Some(x) => x,
                    None => return Err(CompileError::UnstorableType(current.ty)),
                };
                let step = if op == UnaryOp::PreInc { 1 } else { -1 };
                let next = self.builder.ins().iadd_imm(current_ir, step);
                self.write_place(&place, &Value::new(next, place.ty.clone()))?;
                Ok(Operand::Place(place))
            }
            UnaryOp::Deref => {
                let v = self.lower_value(operand)?;
                match (&v.ty, v.ir) {
                    (Type::Pointer { inner, is_const }, Some(addr)) => Ok(Operand::Place(
                        ValueRef::new(addr, inner.as_ref().clone(), *is_const),
                    )),
                    _ => Err(CompileError::UnsupportedOperand {
                        op: op.symbol(),
                        ty: v.ty,
                    }),
                }
            }
            UnaryOp::AddrOf => {
                let target = self.lower_expr(operand)?;
                match target.as_place() {
                    Some(place) => {
                        let ty = place.ty.pointer(place.is_const)?;
                        Ok(Operand::Value(Value::new(place.addr, ty)))
                    }
                    None => Err(CompileError::UnsupportedOperand {
                        op: op.symbol(),
                        ty: target.ty(),
                    }),
                }
            }
        }
    }

    fn lower_binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Result<Operand> {
        // Both sides are always evaluated, `&&`/`||` included.
        let lv = self.lower_value(lhs)?;
        let rv = self.lower_value(rhs)?;
        let out = self.apply_binary(op, lv, rv)?;
        Ok(Operand::Value(out))
    }

    /// Unifies, casts and emits one binary operator over two already
    /// dereferenced values. Shared with compound assignment.
    fn apply_binary(&mut self, op: BinaryOp, lv: Value, rv: Value) -> Result<Value> {
        let common = unify(op.symbol(), &lv.ty, &rv.ty)?;
        let a = self.implicit_cast(lv, &common)?;
        let b = self.implicit_cast(rv, &common)?;
        let (a, b) = match (a.ir, b.ir) {
            (Some(a), Some(b)) => (a, b),
            _ => return Err(CompileError::UnstorableType(common)),
        };

        use BinaryOp::*;
        match op {
            Eq | Ne | Lt | Le | Gt | Ge => {
                let out = match &common {
                    Type::Int(kind) => {
                        let cc = int_condition(op, kind.is_signed());
                        self.builder.ins().icmp(cc, a, b)
                    }
                    // Boolean comparisons use the unsigned predicates.
                    Type::Bool => self.builder.ins().icmp(int_condition(op, false), a, b),
                    Type::Real(_) => self.builder.ins().fcmp(float_condition(op), a, b),
                    _ => {
                        return Err(CompileError::UnsupportedOperand {
                            op: op.symbol(),
                            ty: common,
                        })
                    }
                };
                Ok(Value::new(out, Type::Bool))
            }
            _ => {
                let out = match &common {
                    Type::Int(kind) => {
                        let signed = kind.is_signed();
                        match op {
                            Add => self.builder.ins().iadd(a, b),
                            Sub => self.builder.ins().isub(a, b),
                            Mul => self.builder.ins().imul(a, b),
                            Div if signed => self.builder.ins().sdiv(a, b),
                            Div => self.builder.ins().udiv(a, b),
                            Rem if signed => self.builder.ins().srem(a, b),
                            Rem => self.builder.ins().urem(a, b),
                            Shl => self.builder.ins().ishl(a, b),
                            Shr if signed => self.builder.ins().sshr(a, b),
                            Shr => self.builder.ins().ushr(a, b),
                            BitAnd => self.builder.ins().band(a, b),
                            BitOr => self.builder.ins().bor(a, b),
                            BitXor => self.builder.ins().bxor(a, b),
                            And | Or => {
                                return Err(CompileError::UnsupportedOperand {
                                    op: op.symbol(),
                                    ty: common,
                                })
                            }
                            _ => unreachable!("comparisons handled above"),
                        }
                    }
                    Type::Real(_) => match op {
                        Add => self.builder.ins().fadd(a, b),
                        Sub => self.builder.ins().fsub(a, b),
                        Mul => self.builder.ins().fmul(a, b),
                        Div => self.builder.ins().fdiv(a, b),
                        Rem => {
                            // No float remainder instruction; compute
                            // a - trunc(a / b) * b.
                            let q = self.builder.ins().fdiv(a, b);
                            let t = self.builder.ins().trunc(q);
                            let m = self.builder.ins().fmul(t, b);
                            self.builder.ins().fsub(a, m)
                        }
                        _ => {
                            return Err(CompileError::UnsupportedOperand {
                                op: op.symbol(),
                                ty: common,
                            })
                        }
                    },
                    Type::Bool => match op {
                        And => self.builder.ins().band(a, b),
                        Or => self.builder.ins().bor(a, b),
                        _ => {
                            return Err(CompileError::UnsupportedOperand {
                                op: op.symbol(),
                                ty: common,
                            })
                        }
                    },
                    _ => {
                        return Err(CompileError::UnsupportedOperand {
                            op: op.symbol(),
                            ty: common,
                        })
                    }
                };
                Ok(Value::new(out, common))
            }
        }
    }

    fn lower_assign(
        &mut self,
        op: Option<BinaryOp>,
        target: &Expr,
        value: &Expr,
    ) -> Result<Operand> {
        // The target is lowered before the value, and only once; errors in
        // the value expression surface before the target checks do.
        let lhs = self.lower_expr(target)?;
        let rv = self.lower_value(value)?;
        let place = match lhs.as_place() {
            Some(r) => r.clone(),
            None => return Err(CompileError::InvalidAssignmentTarget(lhs.ty())),
        };
        if place.is_const {
            return Err(CompileError::AssignToConst(place.ty));
        }

        match op {
            None => {
                let out = self.implicit_cast(rv, &place.ty)?;
                self.write_place(&place, &out)?;
            }
            Some(bin_op) => {
                // Compound forms read through the handle, apply the operator
                // and store the raw result; a result wider than the storage
                // is a type mismatch, not an implicit narrowing.
                let current = self.read_place(&place)?;
                let out = self.apply_binary(bin_op, current, rv)?;
                self.write_place(&place, &out)?;
            }
        }
        Ok(Operand::Place(place))
    }

    fn lower_member(&mut self, base: &Expr, member: &Expr) -> Result<Operand> {
        let name = match member {
            Expr::Name(n) => n.clone(),
            _ => return Err(CompileError::ExpectedMemberName),
        };
        let base_operand = self.lower_expr(base)?;

        match &base_operand {
            Operand::Place(r) => match &r.ty {
                Type::Struct(def) => {
                    let (addr, field_ty) = self.field_address(def, r.addr, &name, &r.ty)?;
                    Ok(Operand::Place(ValueRef::new(addr, field_ty, r.is_const)))
                }
                Type::Pointer { inner, is_const } if matches!(inner.as_ref(), Type::Struct(_)) => {
                    let pointer = self.read_place(r)?;
                    self.member_through_pointer(&pointer, &name, *is_const)
                }
                _ => Err(CompileError::UnknownMember {
                    base: r.reference_type(),
                    name,
                }),
            },
            Operand::Value(v) => match &v.ty {
                Type::Struct(def) => {
                    // A struct rvalue is already backed by storage; the field
                    // is read in place and handed out as a const reference.
                    let base_addr = match v.ir {
                        Some(a) => a,
                        None => return Err(CompileError::UnstorableType(v.ty.clone())),
                    };
                    let (addr, field_ty) = self.field_address(def, base_addr, &name, &v.ty)?;
                    let ty = field_ty.reference(true)?;
                    Ok(Operand::Value(Value::new(addr, ty)))
                }
                Type::Reference { inner, is_const } => match inner.as_ref() {
                    Type::Struct(def) => {
                        let base_addr = match v.ir {
                            Some(a) => a,
                            None => return Err(CompileError::UnstorableType(v.ty.clone())),
                        };
                        let (addr, field_ty) = self.field_address(def, base_addr, &name, inner)?;
                        Ok(Operand::Place(ValueRef::new(addr, field_ty, *is_const)))
                    }
                    _ => Err(CompileError::UnknownMember {
                        base: v.ty.clone(),
                        name,
                    }),
                },
                Type::Pointer { inner, is_const } if matches!(inner.as_ref(), Type::Struct(_)) => {
                    self.member_through_pointer(v, &name, *is_const)
                }
                _ => Err(CompileError::UnknownMember {
                    base: v.ty.clone(),
                    name,
                }),
            },
        }
    }

    fn member_through_pointer(
        &mut self,
        pointer: &Value,
        name: &str,
        is_const: bool,
    ) -> Result<Operand> {
        let Type::Pointer { inner, .. } = &pointer.ty else {
            return Err(CompileError::UnknownMember {
                base: pointer.ty.clone(),
                name: name.to_string(),
            });
        };
        let Type::Struct(def) = inner.as_ref() else {
            return Err(CompileError::UnknownMember {
                base: pointer.ty.clone(),
                name: name.to_string(),
            });
        };
        let base_addr = match pointer.ir {
            Some(a) => a,
            None => return Err(CompileError::UnstorableType(pointer.ty.clone())),
        };
        let def = def.clone();
        let pointee = inner.as_ref().clone();
        let (addr, field_ty) = self.field_address(&def, base_addr, name, &pointee)?;
        Ok(Operand::Place(ValueRef::new(addr, field_ty, is_const)))
    }

    /// Resolves a field by name against a struct layout and materializes its
    /// address off `base`. Returns the address and the field's type.
    fn field_address(
        &mut self,
        def: &StructType,
        base: ir::Value,
        name: &str,
        base_ty: &Type,
    ) -> Result<(ir::Value, Type)> {
        let (index, field) = def.field(name).ok_or_else(|| CompileError::UnknownMember {
            base: base_ty.clone(),
            name: name.to_string(),
        })?;
        let field_ty = field.ty.clone();
        let offset = def
            .field_offset(index, self.cx.ptr_bytes())
            .ok_or_else(|| CompileError::UnsizedType(field_ty.clone()))?;
        let addr = if offset == 0 {
            base
        } else {
            self.builder.ins().iadd_imm(base, i64::from(offset))
        };
        Ok((addr, field_ty))
    }

    fn lower_cast(&mut self, expr: &Expr, type_expr: &ast::TypeExpr) -> Result<Operand> {
        let to = self.cx.resolve_type(type_expr)?;
        let v = self.lower_value(expr)?;
        let out = self.cast_value(v, &to, true)?;
        Ok(Operand::Value(out))
    }

    fn lower_call(&mut self, callee: &str, args: &[Expr]) -> Result<Operand> {
        let info = self.cx.function(callee)?.clone();
        if args.len() != info.signature.params.len() {
            return Err(CompileError::ArityMismatch {
                name: callee.to_string(),
                expected: info.signature.params.len(),
                found: args.len(),
            });
        }

        let mut arg_values = Vec::with_capacity(args.len());
        for (arg, param_ty) in args.iter().zip(info.signature.params.iter()) {
            let operand = self.lower_expr(arg)?;
            // A reference parameter receives the argument place's address;
            // everything else travels by value.
            let v = if matches!(param_ty, Type::Reference { .. }) {
                reference_value(operand)
            } else {
                self.dereference(operand)?
            };
            let v = self.implicit_cast(v, param_ty)?;
            match v.ir {
                Some(x) => arg_values.push(x),
                None => return Err(CompileError::UnstorableType(v.ty)),
            }
        }

        let func_ref = self.module.declare_func_in_func(info.id, self.builder.func);
        let call = self.builder.ins().call(func_ref, &arg_values);
        match info.signature.return_type.clone() {
            Type::Unit => Ok(Operand::Value(Value::unit())),
            // A returned reference is a live place; assignment through it
            // works like any other.
            Type::Reference { inner, is_const } => {
                let result = self.builder.inst_results(call)[0];
                Ok(Operand::Place(ValueRef::new(
                    result,
                    inner.as_ref().clone(),
                    is_const,
                )))
            }
            return_type => {
                let result = self.builder.inst_results(call)[0];
                Ok(Operand::Value(Value::new(result, return_type)))
            }
        }
    }

    fn lower_struct_literal(&mut self, name: &str, inits: &[ast::FieldInit]) -> Result<Operand> {
        let ty = self
            .cx
            .struct_type(name)
            .cloned()
            .ok_or_else(|| CompileError::UnknownType(name.to_string()))?;
        let Type::Struct(def) = ty.clone() else {
            return Err(CompileError::UnknownType(name.to_string()));
        };

        let label = self.cx.fresh_temp("struct_lit");
        let base = self.alloc_storage(&ty, &label)?;
        let mut seen = vec![false; def.fields.len()];
        for init in inits {
            let (index, _) = def.field(&init.name).ok_or_else(|| {
                CompileError::UnknownMember {
                    base: ty.clone(),
                    name: init.name.clone(),
                }
            })?;
            seen[index] = true;
            let (addr, field_ty) = self.field_address(&def, base, &init.name, &ty)?;
            let v = self.lower_value(&init.value)?;
            let v = self.implicit_cast(v, &field_ty)?;
            self.write_place(&ValueRef::new(addr, field_ty, false), &v)?;
        }
        if let Some(index) = seen.iter().position(|present| !present) {
            return Err(CompileError::MissingField {
                name: name.to_string(),
                field: def.fields[index].name.clone(),
            });
        }

        Ok(Operand::Value(Value::new(base, ty)))
    }

    fn lower_sizeof(&mut self, type_expr: &ast::TypeExpr) -> Result<Operand> {
        let ty = self.cx.resolve_type(type_expr)?;
        let size = ty
            .size_bytes(self.cx.ptr_bytes())
            .ok_or(CompileError::UnsizedType(ty))?;
        Ok(self.const_int(ir::types::I64, i64::from(size), Type::ULONG))
    }

    fn lower_if(
        &mut self,
        cond: &Expr,
        then_body: &Stmt,
        else_body: Option<&Stmt>,
    ) -> Result<Operand> {
        let cond_value = self.lower_value(cond)?;
        let cond_ir = self.require_bool(cond_value)?;

        let Some(else_body) = else_body else {
            // Without an else the conditional only evaluates its condition;
            // the then block is an empty fall-through and the expression's
            // type is Nothing.
            let then_block = self.builder.create_block();
            let merge = self.builder.create_block();
            self.builder.ins().brif(cond_ir, then_block, &[], merge, &[]);
            self.builder.switch_to_block(then_block);
            self.builder.ins().jump(merge, &[]);
            self.builder.switch_to_block(merge);
            return Ok(Operand::Value(Value::nothing()));
        };

        let then_block = self.builder.create_block();
        let else_block = self.builder.create_block();
        let final_block = self.builder.create_block();
        self.builder
            .ins()
            .brif(cond_ir, then_block, &[], else_block, &[]);

        // Then branch: lower the body, then store its value (if it has a
        // carrier) into the merge slot at whatever block the body ended in.
        self.builder.switch_to_block(then_block);
        let then_operand = self.lower_statement(then_body)?;
        let then_value = self.dereference(then_operand)?;
        let slot = match (self.carrier_type(&then_value.ty), then_value.ir) {
            (Some(carrier), Some(ir_value)) => {
                let slot = self.builder.create_sized_stack_slot(StackSlotData::new(
                    StackSlotKind::ExplicitSlot,
                    carrier.bytes(),
                    carrier.bytes().trailing_zeros() as u8,
                ));
                trace!(slot = %self.cx.fresh_temp("if_result"), "allocated merge slot");
                let ptr_ty = self.ptr_type();
                let addr = self
                    .builder
                    .ins()
                    .stack_addr(ptr_ty, slot, Offset32::new(0));
                self.builder
                    .ins()
                    .store(MemFlags::trusted(), ir_value, addr, Offset32::new(0));
                Some((slot, carrier))
            }
            _ => None,
        };
        self.builder.ins().jump(final_block, &[]);

        // Else branch.
        self.builder.switch_to_block(else_block);
        let else_operand = self.lower_statement(else_body)?;
        let else_value = self.dereference(else_operand)?;
        let merged = then_value.ty == else_value.ty;
        if merged {
            if let (Some((slot, _)), Some(ir_value)) = (slot, else_value.ir) {
                let ptr_ty = self.ptr_type();
                let addr = self
                    .builder
                    .ins()
                    .stack_addr(ptr_ty, slot, Offset32::new(0));
                self.builder
                    .ins()
                    .store(MemFlags::trusted(), ir_value, addr, Offset32::new(0));
            }
        }
        self.builder.ins().jump(final_block, &[]);

        self.builder.switch_to_block(final_block);
        if merged {
            match slot {
                Some((slot, carrier)) => {
                    let ptr_ty = self.ptr_type();
                    let addr = self
                        .builder
                        .ins()
                        .stack_addr(ptr_ty, slot, Offset32::new(0));
                    let loaded =
                        self.builder
                            .ins()
                            .load(carrier, MemFlags::trusted(), addr, Offset32::new(0));
                    Ok(Operand::Value(Value::new(loaded, then_value.ty)))
                }
                // Both branches are Unit (or both diverged); there is nothing
                // to merge but the type still lines up.
                None => Ok(Operand::Value(Value {
                    ir: None,
                    ty: then_value.ty,
                })),
            }
        } else {
            Ok(Operand::Value(Value::nothing()))
        }
    }

    // =========================================
    // Casts
    // =========================================

    fn implicit_cast(&mut self, value: Value, to: &Type) -> Result<Value> {
        self.cast_value(value, to, false)
    }

    /// The numeric conversion matrix. Only an exactly equal type passes
    /// unconverted; in particular there is no implicit constness adjustment
    /// on references or pointers. The explicit flag additionally admits the
    /// narrowing conversions reachable through `as`.
    fn cast_value(&mut self, value: Value, to: &Type, explicit: bool) -> Result<Value> {
        if value.ty == *to {
            return Ok(value);
        }
        let illegal = || CompileError::IllegalCast {
            from: value.ty.clone(),
            to: to.clone(),
        };
        let x = match value.ir {
            Some(x) => x,
            None => return Err(illegal()),
        };
        let to_clif = match to.to_cranelift(self.ptr_type()) {
            Some(t) => t,
            None => return Err(illegal()),
        };

        let out = match (&value.ty, to) {
            (Type::Int(from), Type::Int(target)) => {
                if target.bits() > from.bits() {
                    if target.is_signed() {
                        self.builder.ins().sextend(to_clif, x)
                    } else {
                        self.builder.ins().uextend(to_clif, x)
                    }
                } else if target.bits() < from.bits() {
                    if !explicit {
                        return Err(illegal());
                    }
                    self.builder.ins().ireduce(to_clif, x)
                } else {
                    // Same width, different signedness: the bits carry over.
                    x
                }
            }
            (Type::Int(from), Type::Real(_)) => {
                if from.is_signed() {
                    self.builder.ins().fcvt_from_sint(to_clif, x)
                } else {
                    self.builder.ins().fcvt_from_uint(to_clif, x)
                }
            }
            (Type::Real(_), Type::Int(target)) => {
                if target.is_signed() {
                    self.builder.ins().fcvt_to_sint(to_clif, x)
                } else {
                    self.builder.ins().fcvt_to_uint(to_clif, x)
                }
            }
            (Type::Real(from), Type::Real(target)) => {
                if target.bits() > from.bits() {
                    self.builder.ins().fpromote(to_clif, x)
                } else if explicit {
                    self.builder.ins().fdemote(to_clif, x)
                } else {
                    return Err(illegal());
                }
            }
            _ => return Err(illegal()),
        };
        Ok(Value::new(out, to.clone()))
    }

    // =========================================
    // Storage
    // =========================================

    /// Allocates a stack slot sized for `ty` and returns its address.
    fn alloc_storage(&mut self, ty: &Type, label: &str) -> Result<ir::Value> {
        let ptr_bytes = self.cx.ptr_bytes();
        let size = ty
            .size_bytes(ptr_bytes)
            .ok_or_else(|| CompileError::UnstorableType(ty.clone()))?;
        let align = ty.align_bytes(ptr_bytes).unwrap_or(1);
        let slot = self.builder.create_sized_stack_slot(StackSlotData::new(
            StackSlotKind::ExplicitSlot,
            size,
            align.trailing_zeros() as u8,
        ));
        trace!(slot = %label, size, "allocated stack slot");
        let ptr_ty = self.ptr_type();
        Ok(self
            .builder
            .ins()
            .stack_addr(ptr_ty, slot, Offset32::new(0)))
    }

    /// Binds `name` to fresh storage holding `value`. The initial store goes
    /// through a non-const view so that `val` bindings can still be
    /// initialized.
    pub fn declare_variable(
        &mut self,
        name: &str,
        value: Value,
        is_const: bool,
    ) -> Result<ValueRef> {
        if matches!(value.ty, Type::Reference { .. }) {
            return Err(CompileError::UnstorableType(value.ty));
        }
        let addr = self.alloc_storage(&value.ty, name)?;
        self.write_place(&ValueRef::new(addr, value.ty.clone(), false), &value)?;
        let handle = ValueRef::new(addr, value.ty, is_const);
        self.cx.add_symbol(name.to_string(), handle.clone());
        Ok(handle)
    }

    /// A zero-initialized placeholder of the given type, used for `var`
    /// declarations without an initializer and for unreachable epilogues.
    fn undef_value(&mut self, ty: &Type) -> Result<Value> {
        match ty {
            Type::Bool | Type::Int(_) | Type::Reference { .. } | Type::Pointer { .. } => {
                let clif = ty
                    .to_cranelift(self.ptr_type())
                    .ok_or_else(|| CompileError::UnstorableType(ty.clone()))?;
                Ok(Value::new(self.builder.ins().iconst(clif, 0), ty.clone()))
            }
            Type::Real(RealKind::Float) => {
                Ok(Value::new(self.builder.ins().f32const(0.0f32), ty.clone()))
            }
            Type::Real(RealKind::Double) => {
                Ok(Value::new(self.builder.ins().f64const(0.0f64), ty.clone()))
            }
            Type::Struct(def) => {
                let ptr_bytes = self.cx.ptr_bytes();
                let size = def
                    .size_bytes(ptr_bytes)
                    .ok_or_else(|| CompileError::UnsizedType(ty.clone()))?;
                let align = def.align_bytes(ptr_bytes).unwrap_or(1) as u8;
                let label = self.cx.fresh_temp("zeroed");
                let base = self.alloc_storage(ty, &label)?;
                let config = self.module.target_config();
                self.builder.emit_small_memset(
                    config,
                    base,
                    0,
                    u64::from(size),
                    align,
                    MemFlags::trusted(),
                );
                Ok(Value::new(base, ty.clone()))
            }
            _ => Err(CompileError::UnstorableType(ty.clone())),
        }
    }

    // =========================================
    // Small helpers
    // =========================================

    /// Lowers an expression and dereferences the result down to a value.
    fn lower_value(&mut self, expr: &Expr) -> Result<Value> {
        let operand = self.lower_expr(expr)?;
        self.dereference(operand)
    }

    fn dereference(&mut self, operand: Operand) -> Result<Value> {
        let config = self.module.target_config();
        operand.dereference(self.builder, config)
    }

    fn read_place(&mut self, place: &ValueRef) -> Result<Value> {
        let config = self.module.target_config();
        place.get(self.builder, config)
    }

    fn write_place(&mut self, place: &ValueRef, value: &Value) -> Result<()> {
        let config = self.module.target_config();
        place.set(self.builder, config, value)
    }

    fn const_int(&mut self, clif: ir::Type, bits: i64, ty: Type) -> Operand {
        let ir_value = self.builder.ins().iconst(clif, bits);
        Operand::Value(Value::new(ir_value, ty))
    }

    fn require_bool(&self, value: Value) -> Result<ir::Value> {
        match (&value.ty, value.ir) {
            (Type::Bool, Some(x)) => Ok(x),
            _ => Err(CompileError::TypeMismatch {
                expected: Type::Bool,
                found: value.ty,
            }),
        }
    }

    /// The scalar type that carries a value of `ty` in a register: its CLIF
    /// type for scalars, the pointer type for structs (which travel by
    /// address), nothing for Unit and Nothing.
    fn carrier_type(&self, ty: &Type) -> Option<ir::Type> {
        match ty {
            Type::Struct(_) => Some(self.ptr_type()),
            _ => ty.to_cranelift(self.ptr_type()),
        }
    }
}

/// The operand as a first-class reference value: a place contributes its
/// address and reference type, a computed value passes through as-is (and
/// fails the following cast unless it already is a reference).
fn reference_value(operand: Operand) -> Value {
    match operand {
        Operand::Place(r) => Value::new(r.addr, r.reference_type()),
        Operand::Value(v) => v,
    }
}

/// The common type of two operands: reals dominate integers, the wider real
/// wins, Boolean only unifies with Boolean, and integers take the wider
/// width with unsigned winning a width tie (left side first).
fn unify(op: &'static str, a: &Type, b: &Type) -> Result<Type> {
    match (a, b) {
        (Type::Bool, Type::Bool) => Ok(Type::Bool),
        (Type::Bool, other) | (other, Type::Bool) if other.is_primitive() => {
            Err(CompileError::TypeMismatch {
                expected: Type::Bool,
                found: other.clone(),
            })
        }
        (Type::Real(x), Type::Real(y)) => {
            Ok(Type::Real(if x.bits() >= y.bits() { *x } else { *y }))
        }
        (Type::Real(r), Type::Int(_)) | (Type::Int(_), Type::Real(r)) => Ok(Type::Real(*r)),
        (Type::Int(x), Type::Int(y)) => {
            let kind = if x.bits() > y.bits() {
                *x
            } else if y.bits() > x.bits() {
                *y
            } else if !x.is_signed() {
                *x
            } else {
                *y
            };
            Ok(Type::Int(kind))
        }
        _ => {
            let ty = if a.is_primitive() { b } else { a };
            Err(CompileError::UnsupportedOperand {
                op,
                ty: ty.clone(),
            })
        }
    }
}

fn int_condition(op: BinaryOp, signed: bool) -> IntCC {
    match (op, signed) {
        (BinaryOp::Eq, _) => IntCC::Equal,
        (BinaryOp::Ne, _) => IntCC::NotEqual,
        (BinaryOp::Lt, true) => IntCC::SignedLessThan,
        (BinaryOp::Lt, false) => IntCC::UnsignedLessThan,
        (BinaryOp::Le, true) => IntCC::SignedLessThanOrEqual,
        (BinaryOp::Le, false) => IntCC::UnsignedLessThanOrEqual,
        (BinaryOp::Gt, true) => IntCC::SignedGreaterThan,
        (BinaryOp::Gt, false) => IntCC::UnsignedGreaterThan,
        (BinaryOp::Ge, true) => IntCC::SignedGreaterThanOrEqual,
        (BinaryOp::Ge, false) => IntCC::UnsignedGreaterThanOrEqual,
        _ => unreachable!("not a comparison operator"),
    }
}

fn float_condition(op: BinaryOp) -> FloatCC {
    // Ordered predicates throughout: comparisons with NaN are false.
    match op {
        BinaryOp::Eq => FloatCC::Equal,
        BinaryOp::Ne => FloatCC::OrderedNotEqual,
        BinaryOp::Lt => FloatCC::LessThan,
        BinaryOp::Le => FloatCC::LessThanOrEqual,
        BinaryOp::Gt => FloatCC::GreaterThan,
        BinaryOp::Ge => FloatCC::GreaterThanOrEqual,
        _ => unreachable!("not a comparison operator"),
    }
}
