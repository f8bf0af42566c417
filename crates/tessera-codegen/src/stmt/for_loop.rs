//! `for` loops.
//!
//! Every strategy runs the same skeleton and fills in its own steps:
//!
//! ```text
//!             <before>                 evaluate the range into temporaries
//!             <empty check>            JumpIf.. exit
//! body:       <pre-condition>          JumpIfFalse exit
//!             param = <element>
//!             <body>
//! next:       <post-condition>         JumpIfTrue exit
//!             <increment>
//!             Jump body
//! exit:
//! ```
//!
//! Integer intervals and progressions stop on equality with the last
//! element before incrementing, so a bound at the type's limit does not
//! overflow into an endless loop.

use tessera_core::{CodegenError, MachineType, Result, Span, TypeHash, well_known};
use tessera_tree::{BinaryOp, DeclId, Expr, ForExpr, Literal, LoopRange};
use tracing::trace;

use crate::bytecode::{MemberRef, OpCode};
use crate::emit::Label;
use crate::expr::{ExprCompiler, argc, literal_range, missing};
use crate::value::coerce::{arithmetic_op, promoted};
use crate::value::{CompareOp, Condition, LazyValue, Operation};

const PROGRESSION_FINAL_ELEMENT: &str = "progressionFinalElement";

/// Loop state kept in temporaries for the duration of the loop.
#[derive(Debug, Clone, Copy)]
enum Strategy {
    /// Index walk over the array in `array`.
    Array {
        array: u16,
        index: u16,
        element: MachineType,
    },
    /// `current..last`, both inclusive.
    Interval {
        current: u16,
        last: u16,
        operand: MachineType,
    },
    /// `first..last step step`, stopping at the precomputed final element.
    Progression {
        current: u16,
        last: u16,
        step: u16,
        final_element: u16,
        operand: MachineType,
    },
    /// `hasNext()` / `next()` on the iterator in `iterator`.
    Iterator {
        iterator: u16,
        has_next: DeclId,
        next: DeclId,
    },
}

impl Strategy {
    fn name(&self) -> &'static str {
        match self {
            Strategy::Array { .. } => "array",
            Strategy::Interval { operand, .. } if operand.is_floating() => "floating interval",
            Strategy::Interval { .. } => "interval",
            Strategy::Progression { .. } => "progression",
            Strategy::Iterator { .. } => "iterator",
        }
    }
}

/// Numeric type the loop counts in.
fn loop_operand(param: MachineType, bounds: MachineType) -> MachineType {
    if param.is_primitive() && param != MachineType::BOOL {
        param
    } else {
        bounds
    }
}

fn compare<'ast>(op: CompareOp, operand: MachineType, left: LazyValue<'ast>, right: LazyValue<'ast>) -> LazyValue<'ast> {
    LazyValue::condition(Condition::Compare {
        op,
        operand,
        left,
        right,
    })
}

impl<'a, 'ast> ExprCompiler<'a, 'ast> {
    pub(crate) fn compile_for(&mut self, node: &'ast ForExpr<'ast>) -> Result<LazyValue<'ast>> {
        let decl = self.reference(node.id, node.span)?;
        let param = self.variable_info(decl, node.span)?.ty;
        let loop_mark = self.ctx.frame.mark();

        let strategy = self.before_loop(node, param)?;
        trace!(strategy = strategy.name(), label = node.label, "for loop");

        let exit = self.sink.new_label();
        let next = self.sink.new_label();
        self.check_empty(&strategy, exit)?;
        let body_start = self.sink.here();
        self.check_pre_condition(&strategy, exit, node.span)?;

        let scope = self.open_scope();
        let local = self.enter_local(decl, node.span)?;
        self.put_receiver(&local)?;
        let produced = self.load_element(&strategy, node.span)?;
        self.coerce(produced, param);
        self.store_to_receiver(&local)?;
        self.scope_local(decl, node.span)?;
        let body = self.compile_loop_body(node.label, exit, next, |c| c.compile_statement(node.body));
        self.close_scope(scope)?;
        body?;

        self.sink.mark(next);
        self.check_post_condition(&strategy, exit)?;
        self.increment(&strategy)?;
        self.sink.emit_jump(OpCode::Jump, body_start);
        self.sink.mark(exit);
        self.ctx.frame.drop_to(loop_mark)?;
        Ok(LazyValue::None)
    }

    /// Pick the strategy and evaluate the range once.
    fn before_loop(&mut self, node: &'ast ForExpr<'ast>, param: MachineType) -> Result<Strategy> {
        let range_type = self.type_of(node.range)?;
        if let Some(element) = range_type.element() {
            let array = self.store_temp(node.range, range_type)?;
            let index = self.ctx.frame.enter_temp(MachineType::INT);
            self.sink.emit_int(0);
            self.sink.emit_set_local(index);
            return Ok(Strategy::Array {
                array,
                index,
                element,
            });
        }

        if let Some((first, last)) = literal_range(self, node.range)? {
            let bounds = promoted(self.type_of(first)?, self.type_of(last)?);
            let operand = loop_operand(param, bounds);
            let current = self.store_temp(first, operand)?;
            let last = self.store_temp(last, operand)?;
            return Ok(Strategy::Interval {
                current,
                last,
                operand,
            });
        }

        match self.bindings().loop_range(node.id) {
            Some(LoopRange::Range { first, last }) => {
                let holder = self.store_temp(node.range, range_type)?;
                let bounds = self.function_info(first, node.span)?.return_type;
                let operand = loop_operand(param, bounds);
                let current = self.range_getter(holder, first, operand, node.span)?;
                let last = self.range_getter(holder, last, operand, node.span)?;
                Ok(Strategy::Interval {
                    current,
                    last,
                    operand,
                })
            }
            Some(LoopRange::Progression { first, last, step }) => {
                let holder = self.store_temp(node.range, range_type)?;
                let bounds = self.function_info(first, node.span)?.return_type;
                let operand = loop_operand(param, bounds);
                if !(operand.is_int_like() || operand == MachineType::LONG) {
                    return Err(CodegenError::unsupported(
                        format!("progression over {operand:?}"),
                        node.range.span(),
                    ));
                }
                let current = self.range_getter(holder, first, operand, node.span)?;
                let last = self.range_getter(holder, last, operand, node.span)?;
                let step = self.range_getter(holder, step, operand, node.span)?;
                let final_element = self.progression_final_element(current, last, step, operand)?;
                Ok(Strategy::Progression {
                    current,
                    last,
                    step,
                    final_element,
                    operand,
                })
            }
            Some(LoopRange::Iterator {
                iterator,
                has_next,
                next,
            }) => {
                self.compile_into(node.range, range_type)?;
                let iterator_type = self.call_on_pushed_receiver(iterator, node.span)?;
                let iterator = self.ctx.frame.enter_temp(iterator_type);
                self.sink.emit_set_local(iterator);
                Ok(Strategy::Iterator {
                    iterator,
                    has_next,
                    next,
                })
            }
            None => Err(missing("for-loop range protocol", node.id, node.span)),
        }
    }

    /// Evaluate `expr` as `ty` into a fresh temporary.
    fn store_temp(&mut self, expr: Expr<'ast>, ty: MachineType) -> Result<u16> {
        let slot = self.ctx.frame.enter_temp(ty);
        self.compile_into(expr, ty)?;
        self.sink.emit_set_local(slot);
        Ok(slot)
    }

    /// Read one bound of the range held in `holder` into a fresh temporary.
    fn range_getter(&mut self, holder: u16, getter: DeclId, operand: MachineType, span: Span) -> Result<u16> {
        self.sink.emit_get_local(holder);
        let produced = self.call_on_pushed_receiver(getter, span)?;
        self.coerce(produced, operand);
        let slot = self.ctx.frame.enter_temp(operand);
        self.sink.emit_set_local(slot);
        Ok(slot)
    }

    fn progression_final_element(
        &mut self,
        current: u16,
        last: u16,
        step: u16,
        operand: MachineType,
    ) -> Result<u16> {
        let hash = operand.type_hash();
        let method = MemberRef::new(
            well_known::RUNTIME,
            PROGRESSION_FINAL_ELEMENT,
            TypeHash::from_method(well_known::RUNTIME, PROGRESSION_FINAL_ELEMENT, &[hash, hash, hash]),
        );
        for slot in [current, last, step] {
            self.sink.emit_get_local(slot);
        }
        self.sink.emit_call(OpCode::CallStatic, method, argc(3)?);
        let slot = self.ctx.frame.enter_temp(operand);
        self.sink.emit_set_local(slot);
        Ok(slot)
    }

    /// Skip the loop when integer bounds are already past each other.
    fn check_empty(&mut self, strategy: &Strategy, exit: Label) -> Result<()> {
        match *strategy {
            Strategy::Interval {
                current,
                last,
                operand,
            } if !operand.is_floating() => {
                let past = compare(
                    CompareOp::Gt,
                    operand,
                    LazyValue::local(current, operand),
                    LazyValue::local(last, operand),
                );
                self.cond_jump(&past, exit, false)
            }
            Strategy::Progression {
                current,
                last,
                step,
                operand,
                ..
            } => {
                let descending = self.sink.new_label();
                let checked = self.sink.new_label();
                let ascending = compare(
                    CompareOp::Gt,
                    operand,
                    LazyValue::local(step, operand),
                    LazyValue::constant(Literal::Int(0), MachineType::INT),
                );
                self.cond_jump(&ascending, descending, true)?;
                let past = compare(
                    CompareOp::Gt,
                    operand,
                    LazyValue::local(current, operand),
                    LazyValue::local(last, operand),
                );
                self.cond_jump(&past, exit, false)?;
                self.sink.emit_jump(OpCode::Jump, checked);
                self.sink.mark(descending);
                let past = compare(
                    CompareOp::Lt,
                    operand,
                    LazyValue::local(current, operand),
                    LazyValue::local(last, operand),
                );
                self.cond_jump(&past, exit, false)?;
                self.sink.mark(checked);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn check_pre_condition(&mut self, strategy: &Strategy, exit: Label, span: Span) -> Result<()> {
        match *strategy {
            Strategy::Array { array, index, .. } => {
                let length = LazyValue::Operation(Operation::new(MachineType::INT, move |sink| {
                    sink.emit_get_local(array);
                    sink.emit(OpCode::ArrayLength);
                }));
                let inside = compare(
                    CompareOp::Lt,
                    MachineType::INT,
                    LazyValue::local(index, MachineType::INT),
                    length,
                );
                self.cond_jump(&inside, exit, true)
            }
            Strategy::Interval {
                current,
                last,
                operand,
            } if operand.is_floating() => {
                let inside = compare(
                    CompareOp::Le,
                    operand,
                    LazyValue::local(current, operand),
                    LazyValue::local(last, operand),
                );
                self.cond_jump(&inside, exit, true)
            }
            Strategy::Iterator {
                iterator, has_next, ..
            } => {
                self.sink.emit_get_local(iterator);
                let produced = self.call_on_pushed_receiver(has_next, span)?;
                self.coerce(produced, MachineType::BOOL);
                self.cond_jump(&LazyValue::OnStack(MachineType::BOOL), exit, true)
            }
            _ => Ok(()),
        }
    }

    /// Push the current element, returning its type.
    fn load_element(&mut self, strategy: &Strategy, span: Span) -> Result<MachineType> {
        match *strategy {
            Strategy::Array {
                array,
                index,
                element,
            } => {
                self.sink.emit_get_local(array);
                self.sink.emit_get_local(index);
                self.sink.emit(OpCode::ArrayLoad);
                Ok(element)
            }
            Strategy::Interval {
                current, operand, ..
            }
            | Strategy::Progression {
                current, operand, ..
            } => {
                self.sink.emit_get_local(current);
                Ok(operand)
            }
            Strategy::Iterator { iterator, next, .. } => {
                self.sink.emit_get_local(iterator);
                self.call_on_pushed_receiver(next, span)
            }
        }
    }

    fn check_post_condition(&mut self, strategy: &Strategy, exit: Label) -> Result<()> {
        let (current, last, operand) = match *strategy {
            Strategy::Interval {
                current,
                last,
                operand,
            } if !operand.is_floating() => (current, last, operand),
            Strategy::Progression {
                current,
                final_element,
                operand,
                ..
            } => (current, final_element, operand),
            _ => return Ok(()),
        };
        let done = compare(
            CompareOp::Eq,
            operand,
            LazyValue::local(current, operand),
            LazyValue::local(last, operand),
        );
        self.cond_jump(&done, exit, false)
    }

    fn increment(&mut self, strategy: &Strategy) -> Result<()> {
        match *strategy {
            Strategy::Array { index, .. } => {
                self.add_one(index, MachineType::INT);
                Ok(())
            }
            Strategy::Interval {
                current, operand, ..
            } => {
                self.add_one(current, operand);
                Ok(())
            }
            Strategy::Progression {
                current,
                step,
                operand,
                ..
            } => {
                self.sink.emit_get_local(current);
                self.sink.emit_get_local(step);
                self.emit_add(operand)?;
                self.sink.emit_set_local(current);
                Ok(())
            }
            Strategy::Iterator { .. } => Ok(()),
        }
    }

    fn add_one(&mut self, slot: u16, operand: MachineType) {
        if operand.is_int_like() {
            if let Ok(slot) = u8::try_from(slot) {
                self.sink.emit_byte_pair(OpCode::IncLocal, slot, 1);
                return;
            }
        }
        self.sink.emit_get_local(slot);
        self.sink.emit_int(1);
        self.coerce(MachineType::INT, operand);
        // Every numeric stack kind has an addition.
        if let Some(op) = arithmetic_op(BinaryOp::Add, operand.stack_kind()) {
            self.sink.emit(op);
        }
        self.sink.emit_set_local(slot);
    }

    fn emit_add(&mut self, operand: MachineType) -> Result<()> {
        let op = arithmetic_op(BinaryOp::Add, operand.stack_kind())
            .ok_or_else(|| CodegenError::internal(format!("no addition on {operand:?}")))?;
        self.sink.emit(op);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bumpalo::Bump;
    use tessera_core::MachineType;
    use tessera_tree::{AssignOp, LoopRange, TreeBuilder};

    use crate::bytecode::OpCode;
    use crate::test_utils::compile_body;

    #[test]
    fn literal_interval_stops_on_the_last_element() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let f = b.function("f", &[], MachineType::INT);
        let sum = b.variable("sum", MachineType::INT);
        let i = b.variable("i", MachineType::INT);
        let zero = b.int(0);
        let declare = b.val(sum, zero);
        let one = b.int(1);
        let three = b.int(3);
        let range = b.range_to(one, three);
        let target = b.name(sum);
        let read = b.name(i);
        let add = b.assign_op(AssignOp::AddAssign, target, read);
        let looped = b.for_loop(None, i, range, add);
        let result = b.name(sum);
        let done = b.ret(Some(result));
        let body = b.block(&[declare, looped, done]);
        let bindings = b.finish();

        let compiled = compile_body(&bindings, f, body).unwrap();
        compiled.chunk.assert_opcodes(&[
            OpCode::PushZero,
            OpCode::SetLocal,
            // before: current and last
            OpCode::PushOne,
            OpCode::SetLocal,
            OpCode::Constant,
            OpCode::SetLocal,
            // empty check
            OpCode::GetLocal,
            OpCode::GetLocal,
            OpCode::GtI32,
            OpCode::JumpIfTrue,
            // i = current
            OpCode::GetLocal,
            OpCode::SetLocal,
            // sum += i
            OpCode::GetLocal,
            OpCode::GetLocal,
            OpCode::AddI32,
            OpCode::SetLocal,
            // post-condition, increment, back edge
            OpCode::GetLocal,
            OpCode::GetLocal,
            OpCode::EqI32,
            OpCode::JumpIfTrue,
            OpCode::IncLocal,
            OpCode::Jump,
            OpCode::GetLocal,
            OpCode::Return,
        ]);
        assert_eq!(compiled.chunk.jump_target(15), Some(43));
        assert_eq!(compiled.chunk.jump_target(34), Some(43));
        assert_eq!(compiled.chunk.jump_target(40), Some(18));
        assert_eq!(compiled.max_locals, 4);
    }

    #[test]
    fn arrays_are_walked_by_index() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let consume = b.function("consume", &[("x", MachineType::INT)], MachineType::Void);
        let f = b.function("f", &[("values", MachineType::array_of(MachineType::INT))], MachineType::Void);
        let values = b.params(f)[0];
        let x = b.variable("x", MachineType::INT);
        let array = b.name(values);
        let read = b.name(x);
        let call = b.call(consume, &[read]);
        let looped = b.for_loop(None, x, array, call);
        let body = b.block(&[looped]);
        let bindings = b.finish();

        let compiled = compile_body(&bindings, f, body).unwrap();
        compiled.chunk.assert_contains_opcodes(&[
            OpCode::PushZero,
            OpCode::SetLocal,
            OpCode::GetLocal,
            OpCode::GetLocal,
            OpCode::ArrayLength,
            OpCode::LtI32,
            OpCode::JumpIfFalse,
            OpCode::ArrayLoad,
            OpCode::CallStatic,
            OpCode::IncLocal,
            OpCode::Jump,
        ]);
        assert_eq!(compiled.chunk.count_opcode(OpCode::EqI32), 0);
    }

    #[test]
    fn iterators_pull_until_has_next_fails() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let list = b.class("List");
        let cursor = b.class("Cursor");
        let iterator = b.method(list, "iterator", &[], MachineType::Object(cursor));
        let has_next = b.method(cursor, "hasNext", &[], MachineType::BOOL);
        let next = b.method(cursor, "next", &[], MachineType::ANY);
        let consume = b.function("consume", &[("x", MachineType::ANY)], MachineType::Void);
        let f = b.function("f", &[("items", MachineType::Object(list))], MachineType::Void);
        let items = b.params(f)[0];
        let x = b.variable("x", MachineType::ANY);
        let source = b.name(items);
        let read = b.name(x);
        let call = b.call(consume, &[read]);
        let looped = b.for_loop(None, x, source, call);
        b.bindings_mut().set_loop_range(
            looped.id(),
            LoopRange::Iterator {
                iterator,
                has_next,
                next,
            },
        );
        let body = b.block(&[looped]);
        let bindings = b.finish();

        let compiled = compile_body(&bindings, f, body).unwrap();
        compiled.chunk.assert_opcodes(&[
            OpCode::GetLocal,
            OpCode::CallVirtual,
            OpCode::SetLocal,
            OpCode::GetLocal,
            OpCode::CallVirtual,
            OpCode::JumpIfFalse,
            OpCode::GetLocal,
            OpCode::CallVirtual,
            OpCode::SetLocal,
            OpCode::GetLocal,
            OpCode::CallStatic,
            OpCode::Jump,
            OpCode::ReturnVoid,
        ]);
    }

    #[test]
    fn progressions_compute_their_final_element() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let progression = b.class("IntProgression");
        let first = b.method(progression, "first", &[], MachineType::INT);
        let last = b.method(progression, "last", &[], MachineType::INT);
        let step = b.method(progression, "step", &[], MachineType::INT);
        let f = b.function("f", &[("p", MachineType::Object(progression))], MachineType::Void);
        let p = b.params(f)[0];
        let i = b.variable("i", MachineType::INT);
        let source = b.name(p);
        let loop_body = b.block(&[]);
        let looped = b.for_loop(None, i, source, loop_body);
        b.bindings_mut()
            .set_loop_range(looped.id(), LoopRange::Progression { first, last, step });
        let body = b.block(&[looped]);
        let bindings = b.finish();

        let compiled = compile_body(&bindings, f, body).unwrap();
        assert_eq!(compiled.chunk.count_opcode(OpCode::CallVirtual), 3);
        // progressionFinalElement(first, last, step)
        assert_eq!(compiled.chunk.count_opcode(OpCode::CallStatic), 1);
        // Direction test, then one bound check per direction.
        compiled.chunk.assert_contains_opcodes(&[
            OpCode::CallStatic,
            OpCode::GtI32,
            OpCode::JumpIfFalse,
            OpCode::GtI32,
            OpCode::JumpIfTrue,
            OpCode::Jump,
            OpCode::LtI32,
            OpCode::JumpIfTrue,
            OpCode::EqI32,
            OpCode::JumpIfTrue,
            OpCode::AddI32,
            OpCode::Jump,
        ]);
    }

    #[test]
    fn missing_range_protocol_is_reported() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let things = b.class("Things");
        let f = b.function("f", &[("t", MachineType::Object(things))], MachineType::Void);
        let t = b.params(f)[0];
        let x = b.variable("x", MachineType::ANY);
        let source = b.name(t);
        let loop_body = b.block(&[]);
        let looped = b.for_loop(None, x, source, loop_body);
        let body = b.block(&[looped]);
        let bindings = b.finish();

        let err = compile_body(&bindings, f, body).unwrap_err();
        assert!(err.to_string().contains("for-loop range protocol"));
    }
}
