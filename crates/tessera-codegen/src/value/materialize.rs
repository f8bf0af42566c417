//! Putting, storing and branching on lazy values.

use tessera_core::{CodegenError, MachineType, PrimitiveKind, Result, StackKind};
use tessera_tree::Literal;

use super::coerce::{self, compare_op};
use super::{Accessor, CompareOp, Composite, Condition, LazyValue};
use crate::bytecode::{Constant, OpCode};
use crate::emit::Label;
use crate::expr::ExprCompiler;

impl<'a, 'ast> ExprCompiler<'a, 'ast> {
    /// Emit a conversion of the top of stack.
    pub(crate) fn coerce(&mut self, from: MachineType, to: MachineType) {
        coerce::coerce(from, to, &mut *self.sink);
    }

    /// Leave `value` on the stack as `ty` (nothing at all when `ty` is void).
    pub(crate) fn put(&mut self, value: &LazyValue<'ast>, ty: MachineType) -> Result<()> {
        match value {
            LazyValue::None => self.coerce(MachineType::Void, ty),
            LazyValue::OnStack(from) => self.coerce(*from, ty),
            LazyValue::Constant(literal, own) => self.put_constant(literal, *own, ty),
            LazyValue::Operation(op) => {
                op.emit(&mut *self.sink);
                self.coerce(op.ty, ty);
            }
            LazyValue::Deferred { expr, .. } => {
                let value = self.compile_value(*expr)?;
                self.put(&value, ty)?;
            }
            LazyValue::Condition(condition) => self.put_condition(condition, ty)?,
            LazyValue::Composite(composite) => self.put_composite(composite, ty)?,
            storage => {
                self.put_receiver(storage)?;
                self.load_from_receiver(storage)?;
                self.coerce(storage.ty(), ty);
            }
        }
        Ok(())
    }

    fn put_constant(&mut self, literal: &Literal, own: MachineType, ty: MachineType) {
        if ty.is_void() {
            return;
        }
        match literal {
            Literal::Null if ty.is_primitive() => coerce::push_default(ty, &mut *self.sink),
            Literal::Null => self.sink.emit(OpCode::PushNull),
            Literal::Bool(value) => {
                self.sink.emit_bool(*value);
                self.coerce(MachineType::BOOL, ty);
            }
            Literal::String(value) => {
                self.sink.emit_string(value);
                self.coerce(MachineType::STRING, ty);
            }
            Literal::Char(c) => {
                let kind = ty.primitive().unwrap_or(PrimitiveKind::Char);
                self.push_number(&Literal::Int(*c as u32 as i64), kind);
                self.coerce(MachineType::Primitive(kind), ty);
            }
            Literal::Int(_) | Literal::Float(_) => {
                let fallback = match literal {
                    Literal::Float(_) => PrimitiveKind::Double,
                    _ => PrimitiveKind::Int,
                };
                let kind = ty.primitive().or(own.primitive()).unwrap_or(fallback);
                self.push_number(literal, kind);
                self.coerce(MachineType::Primitive(kind), ty);
            }
        }
    }

    /// Push a numeric literal directly in the representation of `kind`.
    fn push_number(&mut self, literal: &Literal, kind: PrimitiveKind) {
        let (int, float) = match literal {
            Literal::Int(value) => (*value, *value as f64),
            Literal::Float(value) => (value.0 as i64, value.0),
            _ => (0, 0.0),
        };
        match kind.stack_kind() {
            StackKind::F32 => self.sink.emit_f32(float as f32),
            StackKind::F64 => self.sink.emit_f64(float),
            StackKind::I64 => self.sink.emit_constant(Constant::Int(int)),
            _ if kind == PrimitiveKind::Bool => self.sink.emit_bool(int != 0),
            _ => self.sink.emit_int(int),
        }
    }

    fn put_condition(&mut self, condition: &Condition<'ast>, ty: MachineType) -> Result<()> {
        match condition {
            Condition::Compare {
                op,
                operand,
                left,
                right,
            } => {
                self.put(left, *operand)?;
                self.put(right, *operand)?;
                self.emit_compare(*op, *operand)?;
            }
            Condition::Not(inner) => {
                self.put(inner, MachineType::BOOL)?;
                self.sink.emit(OpCode::Not);
            }
            Condition::NullCheck { value, is_null } => {
                let checked = value.ty();
                if checked.is_primitive() {
                    self.put(value, MachineType::Void)?;
                    self.sink.emit_bool(!is_null);
                } else {
                    self.put(value, checked)?;
                    self.sink.emit(OpCode::PushNull);
                    self.sink.emit(OpCode::EqRef);
                    if !is_null {
                        self.sink.emit(OpCode::Not);
                    }
                }
            }
            Condition::And(..) | Condition::Or(..) => {
                let if_false = self.sink.new_label();
                let end = self.sink.new_label();
                self.cond_jump_condition(condition, if_false, true)?;
                self.sink.emit(OpCode::PushTrue);
                self.sink.emit_jump(OpCode::Jump, end);
                self.sink.mark(if_false);
                self.sink.emit(OpCode::PushFalse);
                self.sink.mark(end);
            }
        }
        self.coerce(MachineType::BOOL, ty);
        Ok(())
    }

    /// Emit the comparison of the two values on top of the stack.
    pub(crate) fn emit_compare(&mut self, op: CompareOp, operand: MachineType) -> Result<()> {
        if let Some(code) = compare_op(op, operand.stack_kind()) {
            self.sink.emit(code);
            return Ok(());
        }
        match op {
            CompareOp::Eq => self.sink.emit(OpCode::Equals),
            CompareOp::Ne => {
                self.sink.emit(OpCode::Equals);
                self.sink.emit(OpCode::Not);
            }
            CompareOp::Identical => self.sink.emit(OpCode::EqRef),
            CompareOp::NotIdentical => {
                self.sink.emit(OpCode::EqRef);
                self.sink.emit(OpCode::Not);
            }
            _ => {
                return Err(CodegenError::internal(format!(
                    "ordering comparison {op:?} on {operand:?}"
                )));
            }
        }
        Ok(())
    }

    fn put_composite(&mut self, composite: &Composite<'ast>, ty: MachineType) -> Result<()> {
        match composite {
            Composite::ReadModifyWrite(inner) => {
                self.put_receiver(inner)?;
                self.dup_receiver(inner)?;
                self.load_from_receiver(inner)?;
                self.coerce(inner.ty(), ty);
            }
            Composite::SafeReceiver { receiver, if_null } => {
                let own = receiver.ty();
                self.put(receiver, own)?;
                self.sink.emit(OpCode::Dup);
                self.sink.emit_jump(OpCode::JumpIfNull, *if_null);
                self.coerce(own, ty);
            }
            Composite::SafeFallback { inner, if_null } => {
                let boxed = composite.ty();
                let produced = if ty.is_void() {
                    MachineType::Void
                } else if ty.is_primitive() {
                    boxed
                } else {
                    ty
                };
                let end = self.sink.new_label();
                self.put(inner, produced)?;
                self.sink.emit_jump(OpCode::Jump, end);
                // The null receiver doubles as the null result.
                self.sink.mark(*if_null);
                if produced.is_void() {
                    self.sink.emit(OpCode::Pop);
                }
                self.sink.mark(end);
                self.coerce(produced, ty);
            }
        }
        Ok(())
    }

    /// Number of stack values the location of `value` is addressed by.
    pub(crate) fn receiver_size(&self, value: &LazyValue<'ast>) -> usize {
        match value {
            LazyValue::SharedLocal { .. } => 1,
            LazyValue::Field(f) if f.is_static => usize::from(f.shared),
            LazyValue::Field(_) => 1,
            LazyValue::ArrayElement(_) => 2,
            LazyValue::Property(p) => usize::from(!p.is_static) + p.args.len(),
            LazyValue::Composite(c) => match &**c {
                Composite::ReadModifyWrite(inner) | Composite::SafeFallback { inner, .. } => {
                    self.receiver_size(inner)
                }
                Composite::SafeReceiver { .. } => 0,
            },
            _ => 0,
        }
    }

    /// Duplicate the receiver parts of `value` already on the stack.
    pub(crate) fn dup_receiver(&mut self, value: &LazyValue<'ast>) -> Result<()> {
        match self.receiver_size(value) {
            0 => {}
            1 => self.sink.emit(OpCode::Dup),
            n => {
                let n = u8::try_from(n)
                    .map_err(|_| CodegenError::internal("receiver too wide to duplicate"))?;
                self.sink.emit_byte(OpCode::DupN, n);
            }
        }
        Ok(())
    }

    /// Push whatever addresses the location of `value`.
    pub(crate) fn put_receiver(&mut self, value: &LazyValue<'ast>) -> Result<()> {
        match value {
            LazyValue::Local { .. } => {}
            LazyValue::SharedLocal { slot, .. } => self.sink.emit_get_local(*slot),
            LazyValue::Field(f) => {
                if !f.is_static {
                    let receiver_type = f.receiver.ty();
                    self.put(&f.receiver, receiver_type)?;
                }
                if f.shared {
                    let op = if f.is_static { OpCode::GetStatic } else { OpCode::GetField };
                    self.sink.emit_field_op(op, f.field.clone());
                }
            }
            LazyValue::ArrayElement(e) => {
                let array_type = e.array.ty();
                self.put(&e.array, array_type)?;
                self.put(&e.index, MachineType::INT)?;
            }
            LazyValue::Property(p) => {
                if !p.is_static {
                    let receiver_type = p.receiver.ty();
                    self.put(&p.receiver, receiver_type)?;
                }
                let params = accessor_params(p.getter.as_ref().or(p.setter.as_ref()));
                for (i, arg) in p.args.iter().enumerate() {
                    let ty = params.get(i).copied().unwrap_or_else(|| arg.ty());
                    self.put(arg, ty)?;
                }
            }
            LazyValue::Composite(c) => match &**c {
                Composite::ReadModifyWrite(inner) | Composite::SafeFallback { inner, .. } => {
                    self.put_receiver(inner)?
                }
                Composite::SafeReceiver { .. } => {
                    return Err(CodegenError::internal("safe receiver has no location"));
                }
            },
            other => {
                return Err(CodegenError::internal(format!(
                    "{other:?} has no storage location"
                )));
            }
        }
        Ok(())
    }

    /// Replace the receiver parts on the stack by the current value.
    pub(crate) fn load_from_receiver(&mut self, value: &LazyValue<'ast>) -> Result<()> {
        match value {
            LazyValue::Local { slot, .. } => self.sink.emit_get_local(*slot),
            LazyValue::SharedLocal { .. } => self.sink.emit(OpCode::GetRef),
            LazyValue::Field(f) if f.shared => self.sink.emit(OpCode::GetRef),
            LazyValue::Field(f) => {
                let op = if f.is_static { OpCode::GetStatic } else { OpCode::GetField };
                self.sink.emit_field_op(op, f.field.clone());
            }
            LazyValue::ArrayElement(_) => self.sink.emit(OpCode::ArrayLoad),
            LazyValue::Property(p) => match (&p.getter, &p.backing_field) {
                (Some(getter), _) => {
                    self.emit_accessor_call(getter, p.args.len())?;
                    self.coerce(getter.return_type, p.ty);
                }
                (None, Some(field)) => {
                    let op = if p.is_static { OpCode::GetStatic } else { OpCode::GetField };
                    self.sink.emit_field_op(op, field.clone());
                }
                (None, None) => {
                    return Err(CodegenError::internal("property has no getter or backing field"));
                }
            },
            LazyValue::Composite(c) => match &**c {
                Composite::ReadModifyWrite(inner) | Composite::SafeFallback { inner, .. } => {
                    self.load_from_receiver(inner)?
                }
                Composite::SafeReceiver { .. } => {
                    return Err(CodegenError::internal("safe receiver has no location"));
                }
            },
            other => {
                return Err(CodegenError::internal(format!(
                    "{other:?} has no storage location"
                )));
            }
        }
        Ok(())
    }

    /// Consume the receiver parts and a new value from the stack, storing it.
    pub(crate) fn store_to_receiver(&mut self, value: &LazyValue<'ast>) -> Result<()> {
        match value {
            LazyValue::Local { slot, .. } => self.sink.emit_set_local(*slot),
            LazyValue::SharedLocal { .. } => self.sink.emit(OpCode::SetRef),
            LazyValue::Field(f) if f.shared => self.sink.emit(OpCode::SetRef),
            LazyValue::Field(f) => {
                let op = if f.is_static { OpCode::SetStatic } else { OpCode::SetField };
                self.sink.emit_field_op(op, f.field.clone());
            }
            LazyValue::ArrayElement(_) => self.sink.emit(OpCode::ArrayStore),
            LazyValue::Property(p) => match (&p.setter, &p.backing_field) {
                (Some(setter), _) => {
                    self.emit_accessor_call(setter, p.args.len() + 1)?;
                    if !setter.return_type.is_void() {
                        self.sink.emit(OpCode::Pop);
                    }
                }
                (None, Some(field)) => {
                    let op = if p.is_static { OpCode::SetStatic } else { OpCode::SetField };
                    self.sink.emit_field_op(op, field.clone());
                }
                (None, None) => {
                    return Err(CodegenError::internal("property has no setter or backing field"));
                }
            },
            LazyValue::Composite(c) => match &**c {
                Composite::ReadModifyWrite(inner) => self.store_to_receiver(inner)?,
                // Its null path has to be marked; only `store` does that.
                Composite::SafeFallback { .. } => {
                    return Err(CodegenError::internal(
                        "safe call target stored without its null path",
                    ));
                }
                Composite::SafeReceiver { .. } => {
                    return Err(CodegenError::internal("safe receiver has no location"));
                }
            },
            other => {
                return Err(CodegenError::internal(format!(
                    "{other:?} has no storage location"
                )));
            }
        }
        Ok(())
    }

    fn emit_accessor_call(&mut self, accessor: &Accessor, argc: usize) -> Result<()> {
        let argc = u8::try_from(argc)
            .map_err(|_| CodegenError::internal("accessor call with more than 255 arguments"))?;
        self.sink.emit_call(accessor.op, accessor.method.clone(), argc);
        Ok(())
    }

    /// Type a stored value is put as before it is written to `target`.
    pub(crate) fn store_type(target: &LazyValue<'ast>) -> MachineType {
        match target {
            LazyValue::Property(p) => p
                .setter
                .as_ref()
                .and_then(|s| s.params.last().copied())
                .unwrap_or(p.ty),
            LazyValue::Composite(c) => match &**c {
                Composite::ReadModifyWrite(inner) | Composite::SafeFallback { inner, .. } => {
                    Self::store_type(inner)
                }
                Composite::SafeReceiver { receiver, .. } => receiver.ty(),
            },
            other => other.ty(),
        }
    }

    /// Write `value` into the location of `target`.
    ///
    /// A read-modify-write target must have been put already: its receiver
    /// parts are still on the stack.
    pub(crate) fn store(&mut self, target: &LazyValue<'ast>, value: &LazyValue<'ast>) -> Result<()> {
        let ty = Self::store_type(target);
        match target {
            LazyValue::Composite(c) => match &**c {
                Composite::ReadModifyWrite(inner) => {
                    self.put(value, ty)?;
                    self.store_to_receiver(inner)
                }
                Composite::SafeFallback { inner, if_null } => {
                    let end = self.sink.new_label();
                    self.store(inner, value)?;
                    self.sink.emit_jump(OpCode::Jump, end);
                    self.sink.mark(*if_null);
                    self.sink.emit(OpCode::Pop);
                    self.sink.mark(end);
                    Ok(())
                }
                Composite::SafeReceiver { .. } => {
                    Err(CodegenError::internal("cannot store into a safe receiver"))
                }
            },
            _ => {
                self.put_receiver(target)?;
                self.put(value, ty)?;
                self.store_to_receiver(target)
            }
        }
    }

    /// Jump to `label` when `value` is false (`jump_if_false`) or true.
    pub(crate) fn cond_jump(
        &mut self,
        value: &LazyValue<'ast>,
        label: Label,
        jump_if_false: bool,
    ) -> Result<()> {
        match value {
            LazyValue::Constant(Literal::Bool(b), _) => {
                if *b != jump_if_false {
                    self.sink.emit_jump(OpCode::Jump, label);
                }
                Ok(())
            }
            LazyValue::Deferred { expr, .. } => {
                let value = self.compile_value(*expr)?;
                self.cond_jump(&value, label, jump_if_false)
            }
            LazyValue::Condition(condition) => {
                self.cond_jump_condition(condition, label, jump_if_false)
            }
            other => {
                self.put(other, MachineType::BOOL)?;
                let op = if jump_if_false { OpCode::JumpIfFalse } else { OpCode::JumpIfTrue };
                self.sink.emit_jump(op, label);
                Ok(())
            }
        }
    }

    fn cond_jump_condition(
        &mut self,
        condition: &Condition<'ast>,
        label: Label,
        jump_if_false: bool,
    ) -> Result<()> {
        match condition {
            Condition::And(left, right) => {
                if jump_if_false {
                    self.cond_jump(left, label, true)?;
                    self.cond_jump(right, label, true)?;
                } else {
                    let skip = self.sink.new_label();
                    self.cond_jump(left, skip, true)?;
                    self.cond_jump(right, label, false)?;
                    self.sink.mark(skip);
                }
            }
            Condition::Or(left, right) => {
                if jump_if_false {
                    let skip = self.sink.new_label();
                    self.cond_jump(left, skip, false)?;
                    self.cond_jump(right, label, true)?;
                    self.sink.mark(skip);
                } else {
                    self.cond_jump(left, label, false)?;
                    self.cond_jump(right, label, false)?;
                }
            }
            Condition::Not(inner) => self.cond_jump(inner, label, !jump_if_false)?,
            Condition::Compare {
                op,
                operand,
                left,
                right,
            } => {
                self.put(left, *operand)?;
                self.put(right, *operand)?;
                self.emit_compare(*op, *operand)?;
                let op = if jump_if_false { OpCode::JumpIfFalse } else { OpCode::JumpIfTrue };
                self.sink.emit_jump(op, label);
            }
            Condition::NullCheck { value, is_null } => {
                let checked = value.ty();
                if checked.is_primitive() {
                    self.put(value, MachineType::Void)?;
                    if !is_null != jump_if_false {
                        self.sink.emit_jump(OpCode::Jump, label);
                    }
                } else {
                    self.put(value, checked)?;
                    let op = if *is_null != jump_if_false {
                        OpCode::JumpIfNull
                    } else {
                        OpCode::JumpIfNotNull
                    };
                    self.sink.emit_jump(op, label);
                }
            }
        }
        Ok(())
    }
}

fn accessor_params(accessor: Option<&Accessor>) -> Vec<MachineType> {
    accessor.map(|a| a.params.clone()).unwrap_or_default()
}
