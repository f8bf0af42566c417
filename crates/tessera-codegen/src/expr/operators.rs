//! Binary, prefix and postfix operators.
//!
//! Operators on primitives compile to typed instructions after both operands
//! are widened to a common type. Operators the front end resolved to a
//! function (`compareTo`, `plus`, `contains`, `inc`, ...) compile as calls
//! on the left operand.
//!
//! Boolean operators and comparisons do not compute anything when compiled:
//! they describe a [`Condition`] so that `if (a < b && c)` branches directly
//! instead of materializing booleans.

use tessera_core::{CodegenError, MachineType, Result, TypeHash, well_known};
use tessera_tree::{
    BinaryExpr, BinaryOp, Expr, Literal, PostfixExpr, PostfixOp, UnaryExpr, UnaryOp,
};

use super::{CallSite, ExprCompiler};
use crate::bytecode::{MemberRef, OpCode};
use crate::value::coerce::{self, promoted};
use crate::value::{CompareOp, Composite, Condition, LazyValue};

/// Runtime helper concatenating the string forms of two values.
pub(super) fn string_plus() -> MemberRef {
    let name = "stringPlus";
    MemberRef::new(
        well_known::RUNTIME,
        name,
        TypeHash::from_method(
            well_known::RUNTIME,
            name,
            &[well_known::ANY, well_known::ANY],
        ),
    )
}

fn site_of(binary: &BinaryExpr<'_>) -> CallSite {
    CallSite {
        node: binary.id,
        span: binary.span,
    }
}

fn is_null_literal(compiler: &ExprCompiler<'_, '_>, expr: Expr<'_>) -> bool {
    match expr {
        Expr::Literal(lit) => matches!(lit.value, Literal::Null),
        _ => matches!(compiler.bindings().constant(expr.id()), Some(Literal::Null)),
    }
}

fn compare_op(op: BinaryOp) -> Option<CompareOp> {
    match op {
        BinaryOp::Eq => Some(CompareOp::Eq),
        BinaryOp::NotEq => Some(CompareOp::Ne),
        BinaryOp::Identity => Some(CompareOp::Identical),
        BinaryOp::NotIdentity => Some(CompareOp::NotIdentical),
        BinaryOp::Lt => Some(CompareOp::Lt),
        BinaryOp::Le => Some(CompareOp::Le),
        BinaryOp::Gt => Some(CompareOp::Gt),
        BinaryOp::Ge => Some(CompareOp::Ge),
        _ => None,
    }
}

/// Whether `ty` takes part in numeric widening.
fn is_numeric(ty: MachineType) -> bool {
    ty.is_primitive() && ty != MachineType::BOOL
}

/// Compile a binary operator.
pub fn compile_binary<'ast>(
    compiler: &mut ExprCompiler<'_, 'ast>,
    binary: &'ast BinaryExpr<'ast>,
) -> Result<LazyValue<'ast>> {
    match binary.op {
        BinaryOp::And => {
            let left = compiler.lazy(binary.left)?;
            let right = compiler.lazy(binary.right)?;
            Ok(LazyValue::condition(Condition::And(left, right)))
        }
        BinaryOp::Or => {
            let left = compiler.lazy(binary.left)?;
            let right = compiler.lazy(binary.right)?;
            Ok(LazyValue::condition(Condition::Or(left, right)))
        }
        op if op.is_equality() => compile_equality(compiler, binary),
        op if op.is_comparison() => compile_comparison(compiler, binary),
        op if op.is_arithmetic() => compile_arithmetic(compiler, binary),
        BinaryOp::Elvis => compile_elvis(compiler, binary),
        BinaryOp::In | BinaryOp::NotIn => compile_in(compiler, binary),
        BinaryOp::RangeTo => {
            let ty = compiler.type_of(Expr::Binary(binary))?;
            compile_operator_call(compiler, binary, ty)?.ok_or_else(|| {
                CodegenError::unsupported("range outside of a loop or `in` check", binary.span)
            })
        }
        op => Err(CodegenError::internal(format!("unclassified operator {op:?}"))),
    }
}

/// `left.op(right)` when the front end resolved the operator to a function.
fn compile_operator_call<'ast>(
    compiler: &mut ExprCompiler<'_, 'ast>,
    binary: &'ast BinaryExpr<'ast>,
    ty: MachineType,
) -> Result<Option<LazyValue<'ast>>> {
    let Some(resolved) = compiler.bindings().call(binary.id) else {
        return Ok(None);
    };
    let receiver = compiler.lazy(binary.left)?;
    let argument = compiler.lazy(binary.right)?;
    compiler
        .compile_resolved_call(site_of(binary), resolved, Some(receiver), vec![argument], ty)
        .map(Some)
}

fn compile_equality<'ast>(
    compiler: &mut ExprCompiler<'_, 'ast>,
    binary: &'ast BinaryExpr<'ast>,
) -> Result<LazyValue<'ast>> {
    let negated = matches!(binary.op, BinaryOp::NotEq | BinaryOp::NotIdentity);

    let null_side = if is_null_literal(compiler, binary.right) {
        Some(binary.left)
    } else if is_null_literal(compiler, binary.left) {
        Some(binary.right)
    } else {
        None
    };
    if let Some(checked) = null_side {
        let value = compiler.lazy(checked)?;
        return Ok(LazyValue::condition(Condition::NullCheck {
            value,
            is_null: !negated,
        }));
    }

    let left_type = compiler.type_of(binary.left)?;
    let right_type = compiler.type_of(binary.right)?;
    let identity = matches!(binary.op, BinaryOp::Identity | BinaryOp::NotIdentity);
    let (op, operand) = if left_type.is_primitive() && right_type.is_primitive() {
        let operand = if left_type == right_type {
            left_type
        } else {
            promoted(left_type, right_type)
        };
        (CompareOp::Eq, operand)
    } else if identity {
        (CompareOp::Identical, MachineType::ANY)
    } else {
        (CompareOp::Eq, MachineType::ANY)
    };
    let op = if negated { op.negate() } else { op };

    let left = compiler.lazy(binary.left)?;
    let right = compiler.lazy(binary.right)?;
    Ok(LazyValue::condition(Condition::Compare {
        op,
        operand,
        left,
        right,
    }))
}

fn compile_comparison<'ast>(
    compiler: &mut ExprCompiler<'_, 'ast>,
    binary: &'ast BinaryExpr<'ast>,
) -> Result<LazyValue<'ast>> {
    let op = compare_op(binary.op)
        .ok_or_else(|| CodegenError::internal(format!("{:?} is not a comparison", binary.op)))?;

    // `a < b` on objects is `a.compareTo(b) < 0`.
    if let Some(order) = compile_operator_call(compiler, binary, MachineType::INT)? {
        return Ok(LazyValue::condition(Condition::Compare {
            op,
            operand: MachineType::INT,
            left: order,
            right: LazyValue::constant(Literal::Int(0), MachineType::INT),
        }));
    }

    let left_type = compiler.type_of(binary.left)?;
    let right_type = compiler.type_of(binary.right)?;
    if !is_numeric(left_type) || !is_numeric(right_type) {
        return Err(CodegenError::unsupported(
            format!("ordering comparison of {left_type:?} and {right_type:?}"),
            binary.span,
        ));
    }
    let left = compiler.lazy(binary.left)?;
    let right = compiler.lazy(binary.right)?;
    Ok(LazyValue::condition(Condition::Compare {
        op,
        operand: promoted(left_type, right_type),
        left,
        right,
    }))
}

fn compile_arithmetic<'ast>(
    compiler: &mut ExprCompiler<'_, 'ast>,
    binary: &'ast BinaryExpr<'ast>,
) -> Result<LazyValue<'ast>> {
    let ty = compiler.type_of(Expr::Binary(binary))?;
    if let Some(value) = compile_operator_call(compiler, binary, ty)? {
        return Ok(value);
    }

    let left_type = compiler.type_of(binary.left)?;
    let right_type = compiler.type_of(binary.right)?;
    if binary.op == BinaryOp::Add
        && (ty == MachineType::STRING || left_type == MachineType::STRING)
    {
        compiler.compile_into(binary.left, MachineType::ANY)?;
        compiler.compile_into(binary.right, MachineType::ANY)?;
        compiler.sink.emit_call(OpCode::CallStatic, string_plus(), 2);
        return Ok(LazyValue::OnStack(MachineType::STRING));
    }

    if !is_numeric(left_type) || !is_numeric(right_type) {
        return Err(CodegenError::unsupported(
            format!("{:?} on {left_type:?} and {right_type:?}", binary.op),
            binary.span,
        ));
    }
    let operand = promoted(left_type, right_type);
    let code = coerce::arithmetic_op(binary.op, operand.stack_kind())
        .ok_or_else(|| CodegenError::internal(format!("no instruction for {:?}", binary.op)))?;
    compiler.compile_into(binary.left, operand)?;
    compiler.compile_into(binary.right, operand)?;
    compiler.sink.emit(code);
    Ok(LazyValue::OnStack(operand))
}

/// `left ?: right`: `left` unless it is null.
fn compile_elvis<'ast>(
    compiler: &mut ExprCompiler<'_, 'ast>,
    binary: &'ast BinaryExpr<'ast>,
) -> Result<LazyValue<'ast>> {
    let left_type = compiler.type_of(binary.left)?;
    if left_type.is_primitive() {
        return compiler.compile_value(binary.left);
    }
    let ty = compiler.type_of(Expr::Binary(binary))?;

    let is_null = compiler.sink.new_label();
    let end = compiler.sink.new_label();
    compiler.compile_into(binary.left, left_type)?;
    compiler.sink.emit(OpCode::Dup);
    compiler.sink.emit_jump(OpCode::JumpIfNull, is_null);
    compiler.coerce(left_type, ty);
    compiler.sink.emit_jump(OpCode::Jump, end);
    compiler.sink.mark(is_null);
    compiler.sink.emit(OpCode::Pop);
    compiler.compile_into(binary.right, ty)?;
    compiler.sink.mark(end);
    Ok(LazyValue::on_stack(ty))
}

/// `left in right` / `left !in right`.
fn compile_in<'ast>(
    compiler: &mut ExprCompiler<'_, 'ast>,
    binary: &'ast BinaryExpr<'ast>,
) -> Result<LazyValue<'ast>> {
    let negated = binary.op == BinaryOp::NotIn;
    let result = match literal_range(compiler, binary.right)? {
        Some((low, high)) => compile_in_bounds(compiler, binary.left, low, high)?,
        None => {
            let Some(resolved) = compiler.bindings().call(binary.id) else {
                return Err(CodegenError::unsupported(
                    "`in` without a resolved `contains`",
                    binary.span,
                ));
            };
            let receiver = compiler.lazy(binary.right)?;
            let element = compiler.lazy(binary.left)?;
            compiler.compile_resolved_call(
                site_of(binary),
                resolved,
                Some(receiver),
                vec![element],
                MachineType::BOOL,
            )?
        }
    };
    Ok(if negated {
        LazyValue::condition(Condition::Not(result))
    } else {
        result
    })
}

/// Bounds of a `low..high` literal over numbers not resolved to a function.
pub(crate) fn literal_range<'ast>(
    compiler: &ExprCompiler<'_, 'ast>,
    expr: Expr<'ast>,
) -> Result<Option<(Expr<'ast>, Expr<'ast>)>> {
    let Expr::Binary(range) = expr else {
        return Ok(None);
    };
    if range.op != BinaryOp::RangeTo || compiler.bindings().call(range.id).is_some() {
        return Ok(None);
    }
    let numeric = is_numeric(compiler.type_of(range.left)?) && is_numeric(compiler.type_of(range.right)?);
    Ok(numeric.then_some((range.left, range.right)))
}

/// `low <= value && value <= high`, with `value` evaluated once.
fn compile_in_bounds<'ast>(
    compiler: &mut ExprCompiler<'_, 'ast>,
    value: Expr<'ast>,
    low: Expr<'ast>,
    high: Expr<'ast>,
) -> Result<LazyValue<'ast>> {
    let value_type = compiler.type_of(value)?;
    if !is_numeric(value_type) {
        return Err(CodegenError::unsupported(
            format!("{value_type:?} checked against a numeric range"),
            value.span(),
        ));
    }
    let operand = promoted(
        value_type,
        promoted(compiler.type_of(low)?, compiler.type_of(high)?),
    );

    let slot = compiler.ctx.frame.enter_temp(operand);
    compiler.compile_into(value, operand)?;
    compiler.sink.emit_set_local(slot);
    let subject = LazyValue::local(slot, operand);
    let low = compiler.lazy(low)?;
    let high = compiler.lazy(high)?;
    let check = Condition::And(
        LazyValue::condition(Condition::Compare {
            op: CompareOp::Le,
            operand,
            left: low,
            right: subject.clone(),
        }),
        LazyValue::condition(Condition::Compare {
            op: CompareOp::Le,
            operand,
            left: subject,
            right: high,
        }),
    );
    // The temporary dies here, so the check is materialized right away.
    compiler.put(&LazyValue::condition(check), MachineType::BOOL)?;
    compiler.ctx.frame.leave_temp(operand)?;
    Ok(LazyValue::OnStack(MachineType::BOOL))
}

/// Compile a prefix operator.
pub fn compile_unary<'ast>(
    compiler: &mut ExprCompiler<'_, 'ast>,
    unary: &'ast UnaryExpr<'ast>,
) -> Result<LazyValue<'ast>> {
    let site = CallSite {
        node: unary.id,
        span: unary.span,
    };
    let ty = compiler.type_of(Expr::Unary(unary))?;
    match unary.op {
        UnaryOp::Not => {
            let operand = compiler.lazy(unary.operand)?;
            Ok(LazyValue::condition(Condition::Not(operand)))
        }
        UnaryOp::Neg => {
            if let Some(resolved) = compiler.bindings().call(unary.id) {
                let receiver = compiler.lazy(unary.operand)?;
                return compiler.compile_resolved_call(site, resolved, Some(receiver), Vec::new(), ty);
            }
            if let Expr::Literal(lit) = unary.operand {
                match lit.value {
                    Literal::Int(v) => return Ok(LazyValue::constant(Literal::Int(-v), ty)),
                    Literal::Float(v) => return Ok(LazyValue::constant(Literal::Float(-v), ty)),
                    _ => {}
                }
            }
            let operand_type = compiler.type_of(unary.operand)?;
            if !is_numeric(operand_type) {
                return Err(CodegenError::unsupported(
                    format!("negation of {operand_type:?}"),
                    unary.span,
                ));
            }
            let operand = promoted(operand_type, operand_type);
            let code = coerce::negate_op(operand.stack_kind())
                .ok_or_else(|| CodegenError::internal("no negation instruction"))?;
            compiler.compile_into(unary.operand, operand)?;
            compiler.sink.emit(code);
            Ok(LazyValue::OnStack(operand))
        }
        UnaryOp::PreInc => compiler.compile_increment(site, unary.operand, 1, true, ty),
        UnaryOp::PreDec => compiler.compile_increment(site, unary.operand, -1, true, ty),
    }
}

/// Compile a postfix operator.
pub fn compile_postfix<'ast>(
    compiler: &mut ExprCompiler<'_, 'ast>,
    postfix: &'ast PostfixExpr<'ast>,
) -> Result<LazyValue<'ast>> {
    let site = CallSite {
        node: postfix.id,
        span: postfix.span,
    };
    let ty = compiler.type_of(Expr::Postfix(postfix))?;
    match postfix.op {
        PostfixOp::PostInc => compiler.compile_increment(site, postfix.operand, 1, false, ty),
        PostfixOp::PostDec => compiler.compile_increment(site, postfix.operand, -1, false, ty),
        PostfixOp::NotNull => {
            let operand_type = compiler.type_of(postfix.operand)?;
            if operand_type.is_primitive() {
                return compiler.compile_value(postfix.operand);
            }
            let checked = compiler.sink.new_label();
            compiler.compile_into(postfix.operand, operand_type)?;
            compiler.sink.emit(OpCode::Dup);
            compiler.sink.emit_jump(OpCode::JumpIfNotNull, checked);
            compiler
                .sink
                .emit_type_op(OpCode::ThrowNew, well_known::NULL_POINTER_EXCEPTION);
            compiler.sink.mark(checked);
            Ok(LazyValue::OnStack(operand_type))
        }
    }
}

impl<'a, 'ast> ExprCompiler<'a, 'ast> {
    /// Copy the top of stack below the `depth` values under it.
    pub(crate) fn dup_under(&mut self, depth: usize) -> Result<()> {
        if depth == 0 {
            self.sink.emit(OpCode::Dup);
            return Ok(());
        }
        let depth = u8::try_from(depth)
            .map_err(|_| CodegenError::internal("value too deep to duplicate under"))?;
        self.sink.emit_byte(OpCode::DupUnder, depth);
        Ok(())
    }

    /// `++x`, `x++`, `--x`, `x--` on any assignable location.
    ///
    /// The location's receiver parts are evaluated once. The result is the
    /// new value for prefix forms and the old one for postfix forms.
    fn compile_increment(
        &mut self,
        site: CallSite,
        operand: Expr<'ast>,
        delta: i8,
        prefix: bool,
        ty: MachineType,
    ) -> Result<LazyValue<'ast>> {
        let target = self.compile_value(operand)?;
        if !target.is_assignable() {
            return Err(CodegenError::InvalidStore {
                span: operand.span(),
            });
        }
        if let LazyValue::Composite(c) = &target
            && matches!(**c, Composite::SafeFallback { .. })
        {
            return Err(CodegenError::unsupported("increment through a safe call", site.span));
        }
        let value_type = target.ty();
        let resolved = self.bindings().call(site.node);

        if let LazyValue::Local { slot, ty: local_type } = target
            && local_type == MachineType::INT
            && resolved.is_none()
            && let Ok(slot8) = u8::try_from(slot)
        {
            if prefix {
                self.sink.emit_byte_pair(OpCode::IncLocal, slot8, delta as u8);
                return Ok(LazyValue::local(slot, local_type));
            }
            if !ty.is_void() {
                self.sink.emit_get_local(slot);
            }
            self.sink.emit_byte_pair(OpCode::IncLocal, slot8, delta as u8);
            return Ok(LazyValue::on_stack(if ty.is_void() {
                MachineType::Void
            } else {
                local_type
            }));
        }

        let target = target.for_read_then_write();
        let keep = !ty.is_void();
        self.put(&target, value_type)?;
        let depth = self.receiver_size(&target);
        if keep && !prefix {
            self.dup_under(depth)?;
        }
        match resolved {
            Some(call) => {
                self.compile_resolved_call(
                    site,
                    call,
                    Some(LazyValue::OnStack(value_type)),
                    Vec::new(),
                    value_type,
                )?;
            }
            None => {
                if !is_numeric(value_type) {
                    return Err(CodegenError::unsupported(
                        format!("increment of {value_type:?}"),
                        site.span,
                    ));
                }
                let operand = promoted(value_type, value_type);
                let code = coerce::arithmetic_op(BinaryOp::Add, operand.stack_kind())
                    .ok_or_else(|| CodegenError::internal("no addition instruction"))?;
                self.coerce(value_type, operand);
                self.put(&LazyValue::constant(Literal::Int(i64::from(delta)), operand), operand)?;
                self.sink.emit(code);
                self.coerce(operand, value_type);
            }
        }
        if keep && prefix {
            self.dup_under(depth)?;
        }
        self.store(&target, &LazyValue::OnStack(value_type))?;
        Ok(if keep {
            LazyValue::OnStack(value_type)
        } else {
            LazyValue::None
        })
    }
}

#[cfg(test)]
mod tests {
    use bumpalo::Bump;
    use tessera_core::MachineType;
    use tessera_tree::{BinaryOp, PostfixOp, TreeBuilder, UnaryOp};

    use crate::bytecode::OpCode;
    use crate::test_utils::compile_body;

    #[test]
    fn mixed_arithmetic_widens_to_long() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let f = b.function("f", &[("a", MachineType::INT), ("b", MachineType::LONG)], MachineType::LONG);
        let params = b.params(f);
        let a = b.name(params[0]);
        let c = b.name(params[1]);
        let sum = b.binary(BinaryOp::Add, a, c, MachineType::LONG);
        let body = b.ret(Some(sum));
        let bindings = b.finish();

        let compiled = compile_body(&bindings, f, body).unwrap();
        compiled.chunk.assert_opcodes(&[
            OpCode::GetLocal,
            OpCode::I32toI64,
            OpCode::GetLocal,
            OpCode::AddI64,
            OpCode::Return,
        ]);
    }

    #[test]
    fn string_concatenation_calls_the_runtime() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let f = b.function("f", &[("n", MachineType::INT)], MachineType::STRING);
        let n = b.params(f)[0];
        let prefix = b.string("n = ");
        let read = b.name(n);
        let concat = b.binary(BinaryOp::Add, prefix, read, MachineType::STRING);
        let body = b.ret(Some(concat));
        let bindings = b.finish();

        let compiled = compile_body(&bindings, f, body).unwrap();
        compiled.chunk.assert_opcodes(&[
            OpCode::Constant,
            OpCode::GetLocal,
            OpCode::Box,
            OpCode::CallStatic,
            OpCode::Return,
        ]);
    }

    #[test]
    fn comparisons_materialize_through_branches() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let f = b.function("f", &[("a", MachineType::INT)], MachineType::BOOL);
        let a = b.params(f)[0];
        let read = b.name(a);
        let ten = b.int(10);
        let less = b.compare(BinaryOp::Lt, read, ten);
        let body = b.ret(Some(less));
        let bindings = b.finish();

        let compiled = compile_body(&bindings, f, body).unwrap();
        compiled.chunk.assert_opcodes(&[
            OpCode::GetLocal,
            OpCode::Constant,
            OpCode::LtI32,
            OpCode::Return,
        ]);
    }

    #[test]
    fn short_circuit_and_jumps_over_the_right_operand() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let f = b.function("f", &[("a", MachineType::BOOL), ("b", MachineType::BOOL)], MachineType::BOOL);
        let params = b.params(f);
        let left = b.name(params[0]);
        let right = b.name(params[1]);
        let both = b.compare(BinaryOp::And, left, right);
        let body = b.ret(Some(both));
        let bindings = b.finish();

        let compiled = compile_body(&bindings, f, body).unwrap();
        compiled.chunk.assert_opcodes(&[
            OpCode::GetLocal,
            OpCode::JumpIfFalse,
            OpCode::GetLocal,
            OpCode::JumpIfFalse,
            OpCode::PushTrue,
            OpCode::Jump,
            OpCode::PushFalse,
            OpCode::Return,
        ]);
    }

    #[test]
    fn equality_with_null_is_a_null_check() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let f = b.function("f", &[("s", MachineType::STRING)], MachineType::BOOL);
        let s = b.params(f)[0];
        let read = b.name(s);
        let null = b.null(MachineType::STRING);
        let check = b.compare(BinaryOp::NotEq, read, null);
        let body = b.ret(Some(check));
        let bindings = b.finish();

        let compiled = compile_body(&bindings, f, body).unwrap();
        compiled.chunk.assert_opcodes(&[
            OpCode::GetLocal,
            OpCode::PushNull,
            OpCode::EqRef,
            OpCode::Not,
            OpCode::Return,
        ]);
    }

    #[test]
    fn elvis_falls_back_on_null() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let f = b.function("f", &[("s", MachineType::STRING)], MachineType::STRING);
        let s = b.params(f)[0];
        let read = b.name(s);
        let fallback = b.string("none");
        let elvis = b.binary(BinaryOp::Elvis, read, fallback, MachineType::STRING);
        let body = b.ret(Some(elvis));
        let bindings = b.finish();

        let compiled = compile_body(&bindings, f, body).unwrap();
        compiled.chunk.assert_opcodes(&[
            OpCode::GetLocal,
            OpCode::Dup,
            OpCode::JumpIfNull,
            OpCode::Jump,
            OpCode::Pop,
            OpCode::Constant,
            OpCode::Return,
        ]);
    }

    #[test]
    fn in_literal_range_checks_both_bounds() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let f = b.function("f", &[("x", MachineType::INT)], MachineType::BOOL);
        let x = b.params(f)[0];
        let read = b.name(x);
        let one = b.int(1);
        let ten = b.int(10);
        let range = b.range_to(one, ten);
        let check = b.compare(BinaryOp::In, read, range);
        let body = b.ret(Some(check));
        let bindings = b.finish();

        let compiled = compile_body(&bindings, f, body).unwrap();
        compiled.chunk.assert_contains_opcodes(&[
            OpCode::GetLocal,
            OpCode::SetLocal,
            OpCode::PushOne,
            OpCode::GetLocal,
            OpCode::LeI32,
            OpCode::JumpIfFalse,
            OpCode::GetLocal,
            OpCode::Constant,
            OpCode::LeI32,
            OpCode::JumpIfFalse,
            OpCode::Return,
        ]);
        assert_eq!(compiled.max_locals, 2);
    }

    #[test]
    fn int_local_increment_uses_inc_local() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let f = b.function("f", &[("i", MachineType::INT)], MachineType::INT);
        let i = b.params(f)[0];
        let read = b.name(i);
        let inc = b.unary(UnaryOp::PreInc, read, MachineType::INT);
        let body = b.ret(Some(inc));
        let bindings = b.finish();

        let compiled = compile_body(&bindings, f, body).unwrap();
        compiled.chunk.assert_opcodes(&[OpCode::IncLocal, OpCode::GetLocal, OpCode::Return]);
    }

    #[test]
    fn postfix_increment_of_a_field_keeps_the_old_value() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let counter = b.class("Counter");
        let count = b.field(counter, "count", MachineType::INT);
        let next = b.method(counter, "next", &[], MachineType::INT);
        let read = b.name(count);
        let inc = b.postfix(PostfixOp::PostInc, read, MachineType::INT);
        let body = b.ret(Some(inc));
        let bindings = b.finish();

        let compiled = compile_body(&bindings, next, body).unwrap();
        compiled.chunk.assert_opcodes(&[
            OpCode::GetLocal,
            OpCode::Dup,
            OpCode::GetField,
            OpCode::DupUnder,
            OpCode::PushOne,
            OpCode::AddI32,
            OpCode::SetField,
            OpCode::Return,
        ]);
    }

    #[test]
    fn not_null_assertion_throws_on_null() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let f = b.function("f", &[("s", MachineType::STRING)], MachineType::STRING);
        let s = b.params(f)[0];
        let read = b.name(s);
        let asserted = b.postfix(PostfixOp::NotNull, read, MachineType::STRING);
        let body = b.ret(Some(asserted));
        let bindings = b.finish();

        let compiled = compile_body(&bindings, f, body).unwrap();
        compiled.chunk.assert_opcodes(&[
            OpCode::GetLocal,
            OpCode::Dup,
            OpCode::JumpIfNotNull,
            OpCode::ThrowNew,
            OpCode::Return,
        ]);
    }
}
