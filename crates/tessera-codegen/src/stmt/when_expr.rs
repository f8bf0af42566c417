//! `when` dispatch.
//!
//! Entries are tested in order; the conditions of one entry are or-ed:
//!
//! ```text
//!             subject → temp
//! entry_0:    <cond a> JumpIfTrue body_0
//!             <cond b> JumpIfFalse entry_1
//! body_0:     <body> Jump end
//! entry_1:    ...
//!             <else body> | ThrowNew NoWhenBranchMatched
//! end:
//! ```

use tessera_core::{CodegenError, MachineType, Result, well_known};
use tessera_tree::{Expr, WhenCondition, WhenConditionKind, WhenExpr};
use tracing::trace;

use crate::bytecode::OpCode;
use crate::expr::{CallSite, ExprCompiler, checked_type, literal_range};
use crate::value::coerce::{coerce, promoted};
use crate::value::{CompareOp, Condition, LazyValue, Operation};

/// Slot and type of the evaluated subject.
#[derive(Debug, Clone, Copy)]
struct Subject {
    slot: u16,
    ty: MachineType,
}

impl Subject {
    fn value<'ast>(self) -> LazyValue<'ast> {
        LazyValue::local(self.slot, self.ty)
    }
}

fn is_null_literal(expr: Expr<'_>) -> bool {
    matches!(expr, Expr::Literal(literal) if literal.value.is_null())
}

impl<'a, 'ast> ExprCompiler<'a, 'ast> {
    pub(crate) fn compile_when(
        &mut self,
        node: &'ast WhenExpr<'ast>,
        ty: MachineType,
    ) -> Result<LazyValue<'ast>> {
        let exhaustive = self.bindings().is_exhaustive(node.id);
        trace!(entries = node.entries.len(), exhaustive, "when");

        let subject = match node.subject {
            Some(expr) => {
                let subject_type = self.type_of(expr)?;
                let slot = self.ctx.frame.enter_temp(subject_type);
                self.compile_into(expr, subject_type)?;
                self.sink.emit_set_local(slot);
                Some(Subject {
                    slot,
                    ty: subject_type,
                })
            }
            None => None,
        };

        let end = self.sink.new_label();
        let mut has_else = false;
        for entry in node.entries {
            let Some((last, init)) = entry.conditions.split_last() else {
                self.ctx.reset_line();
                self.compile_when_body(entry.body, ty)?;
                has_else = true;
                break;
            };
            let body = self.sink.new_label();
            let next = self.sink.new_label();
            for condition in init {
                let check = self.when_condition(condition, subject)?;
                self.cond_jump(&check, body, false)?;
            }
            let check = self.when_condition(last, subject)?;
            self.cond_jump(&check, next, true)?;
            self.sink.mark(body);
            self.compile_when_body(entry.body, ty)?;
            self.sink.emit_jump(OpCode::Jump, end);
            self.sink.mark(next);
        }

        if !has_else && !ty.is_void() {
            if ty == MachineType::UNIT && !exhaustive {
                self.sink.emit(OpCode::PushUnit);
            } else {
                // Reached only when the front end's exhaustiveness was wrong
                // or a subclass appeared after compilation.
                self.sink
                    .emit_type_op(OpCode::ThrowNew, well_known::NO_WHEN_BRANCH_MATCHED);
            }
        }
        self.sink.mark(end);

        if let Some(subject) = subject {
            self.ctx.frame.leave_temp(subject.ty)?;
        }
        Ok(if ty.is_void() {
            LazyValue::None
        } else {
            LazyValue::OnStack(ty)
        })
    }

    fn compile_when_body(&mut self, body: Expr<'ast>, ty: MachineType) -> Result<()> {
        if ty.is_void() {
            self.compile_statement(body)
        } else {
            self.compile_branch(Some(body), ty)
        }
    }

    /// Boolean value of one `when` condition.
    fn when_condition(
        &mut self,
        condition: &'ast WhenCondition<'ast>,
        subject: Option<Subject>,
    ) -> Result<LazyValue<'ast>> {
        match (condition.kind, subject) {
            (WhenConditionKind::Expression(expr), None) => self.lazy(expr),
            (WhenConditionKind::Expression(expr), Some(subject)) => {
                if is_null_literal(expr) {
                    return Ok(LazyValue::condition(Condition::NullCheck {
                        value: subject.value(),
                        is_null: true,
                    }));
                }
                let value_type = self.type_of(expr)?;
                let operand = if subject.ty.is_primitive() && value_type.is_primitive() {
                    promoted(subject.ty, value_type)
                } else {
                    MachineType::ANY
                };
                Ok(LazyValue::condition(Condition::Compare {
                    op: CompareOp::Eq,
                    operand,
                    left: subject.value(),
                    right: self.lazy(expr)?,
                }))
            }
            (WhenConditionKind::Is { negated }, Some(subject)) => {
                let tested = checked_type(self.type_operand(condition.id, condition.span)?).type_hash();
                let check = LazyValue::Operation(Operation::new(MachineType::BOOL, move |sink| {
                    sink.emit_get_local(subject.slot);
                    coerce(subject.ty, MachineType::ANY, sink);
                    sink.emit_type_op(OpCode::InstanceOf, tested);
                }));
                Ok(negate_if(check, negated))
            }
            (WhenConditionKind::In { range, negated }, Some(subject)) => {
                let check = match literal_range(self, range)? {
                    Some((low, high)) => {
                        if !subject.ty.is_primitive() || subject.ty == MachineType::BOOL {
                            return Err(CodegenError::unsupported(
                                format!("{:?} subject checked against a numeric range", subject.ty),
                                condition.span,
                            ));
                        }
                        let operand = promoted(
                            subject.ty,
                            promoted(self.type_of(low)?, self.type_of(high)?),
                        );
                        LazyValue::condition(Condition::And(
                            LazyValue::condition(Condition::Compare {
                                op: CompareOp::Le,
                                operand,
                                left: self.lazy(low)?,
                                right: subject.value(),
                            }),
                            LazyValue::condition(Condition::Compare {
                                op: CompareOp::Le,
                                operand,
                                left: subject.value(),
                                right: self.lazy(high)?,
                            }),
                        ))
                    }
                    None => {
                        let Some(resolved) = self.bindings().call(condition.id) else {
                            return Err(CodegenError::unsupported(
                                "`in` without a resolved `contains`",
                                condition.span,
                            ));
                        };
                        let site = CallSite {
                            node: condition.id,
                            span: condition.span,
                        };
                        let receiver = self.lazy(range)?;
                        self.compile_resolved_call(
                            site,
                            resolved,
                            Some(receiver),
                            vec![subject.value()],
                            MachineType::BOOL,
                        )?
                    }
                };
                Ok(negate_if(check, negated))
            }
            (_, None) => Err(CodegenError::unsupported(
                "type or range condition in a `when` without subject",
                condition.span,
            )),
        }
    }
}

fn negate_if(value: LazyValue<'_>, negated: bool) -> LazyValue<'_> {
    if negated {
        LazyValue::condition(Condition::Not(value))
    } else {
        value
    }
}
