//! A small stack machine for executing compiled modules in tests.
//!
//! Values are untyped: every integer family shares [`Value::Int`] and both
//! float widths share [`Value::Float`]. 32-bit operations wrap to `i32`.
//! Exceptions and non-local return signals unwind through
//! [`VmError::Thrown`]; every other error is fatal.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Once;

use rustc_hash::FxHashMap;
use tessera::prelude::*;
use tessera_core::well_known;
use thiserror::Error;

/// Maximum nesting of calls.
const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Unit,
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Object(Rc<Object>),
    Array(Rc<RefCell<Vec<Value>>>),
    Cell(Rc<RefCell<Value>>),
    /// Unwinding payload of `NonLocalReturn`.
    Signal(Rc<Signal>),
}

impl Value {
    pub fn int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn object(&self) -> Option<&Rc<Object>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn array(values: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(values)))
    }

    /// Structural equality, as `Equals` compares.
    fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) | (Value::Unit, Value::Unit) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            _ => self.same(other),
        }
    }

    /// Reference identity, as `EqRef` compares.
    fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) | (Value::Unit, Value::Unit) => true,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Cell(a), Value::Cell(b)) => Rc::ptr_eq(a, b),
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b),
            (Value::Int(a), Value::Int(b)) => a == b,
            _ => false,
        }
    }
}

#[derive(Debug)]
pub struct Object {
    pub class: TypeHash,
    fields: RefCell<FxHashMap<TypeHash, Value>>,
}

impl Object {
    pub fn new(class: TypeHash) -> Rc<Self> {
        Rc::new(Self {
            class,
            fields: RefCell::new(FxHashMap::default()),
        })
    }

    pub fn field(&self, hash: TypeHash) -> Value {
        self.fields.borrow().get(&hash).cloned().unwrap_or(Value::Null)
    }

    pub fn set_field(&self, hash: TypeHash, value: Value) {
        self.fields.borrow_mut().insert(hash, value);
    }
}

#[derive(Debug)]
pub struct Signal {
    pub token: TypeHash,
    pub value: Value,
}

#[derive(Debug, Error)]
pub enum VmError {
    #[error("uncaught {0:?}")]
    Thrown(Value),
    #[error("no function `{0}`")]
    UnknownFunction(String),
    #[error("at {offset}: {message}")]
    Invalid { offset: usize, message: String },
    #[error("call stack overflow")]
    StackOverflow,
}

impl VmError {
    /// The thrown exception object, if this is an uncaught exception.
    pub fn exception(&self) -> Option<&Rc<Object>> {
        match self {
            VmError::Thrown(Value::Object(o)) => Some(o),
            _ => None,
        }
    }
}

type VmResult<T> = std::result::Result<T, VmError>;

/// Host function: returns a value, nothing for void, or a thrown value.
pub type HostFn = Rc<dyn Fn(&[Value]) -> std::result::Result<Option<Value>, Value>>;

fn invalid(offset: usize, message: impl Into<String>) -> VmError {
    VmError::Invalid {
        offset,
        message: message.into(),
    }
}

/// Throw a fresh instance of a runtime exception class.
fn raise<T>(class: TypeHash) -> VmResult<T> {
    Err(VmError::Thrown(Value::Object(Object::new(class))))
}

enum Flow {
    Next,
    Jump(usize),
    Return(Option<Value>),
}

pub struct Vm<'m> {
    module: &'m CompiledModule,
    hosts: FxHashMap<String, HostFn>,
    statics: FxHashMap<TypeHash, Value>,
    depth: usize,
}

impl<'m> Vm<'m> {
    pub fn new(module: &'m CompiledModule) -> Self {
        Self {
            module,
            hosts: FxHashMap::default(),
            statics: FxHashMap::default(),
            depth: 0,
        }
    }

    /// Register a host function, looked up by name when no compiled
    /// function matches a call.
    pub fn host(
        &mut self,
        name: &str,
        function: impl Fn(&[Value]) -> std::result::Result<Option<Value>, Value> + 'static,
    ) {
        self.hosts.insert(name.to_string(), Rc::new(function));
    }

    /// Run the compiled top-level function `name`.
    pub fn call(&mut self, name: &str, args: Vec<Value>) -> VmResult<Value> {
        let module = self.module;
        let function = module
            .function_named(name)
            .ok_or_else(|| VmError::UnknownFunction(name.to_string()))?;
        Ok(self.run(function, None, args)?.unwrap_or(Value::Unit))
    }

    fn run(
        &mut self,
        function: &'m CompiledFunction,
        this: Option<Value>,
        args: Vec<Value>,
    ) -> VmResult<Option<Value>> {
        if self.depth >= MAX_DEPTH {
            return Err(VmError::StackOverflow);
        }
        self.depth += 1;
        let result = self.execute(function, this, args);
        self.depth -= 1;
        result
    }

    fn execute(
        &mut self,
        function: &'m CompiledFunction,
        this: Option<Value>,
        args: Vec<Value>,
    ) -> VmResult<Option<Value>> {
        let chunk = &function.chunk;
        let mut locals = vec![Value::Null; usize::from(function.max_locals)];
        let mut slot = 0usize;
        if function.has_this {
            set_local(&mut locals, 0, this.unwrap_or(Value::Null));
            slot = 1;
        }
        for (ty, arg) in function.params.iter().zip(args) {
            set_local(&mut locals, slot, arg);
            slot += usize::from(ty.slot_width());
        }

        let mut stack = Vec::new();
        let mut pc = 0;
        loop {
            let at = pc;
            let op = chunk
                .read_op(at)
                .ok_or_else(|| invalid(at, "no instruction"))?;
            pc = at + 1 + op.operand_size();
            match self.step(chunk, op, at, &mut stack, &mut locals) {
                Ok(Flow::Next) => {}
                Ok(Flow::Jump(target)) => pc = target,
                Ok(Flow::Return(value)) => return Ok(value),
                Err(VmError::Thrown(thrown)) => match self.find_handler(chunk, at, &thrown) {
                    Some((handler, pushed)) => {
                        stack.clear();
                        stack.push(pushed);
                        pc = handler;
                    }
                    None => return Err(VmError::Thrown(thrown)),
                },
                Err(other) => return Err(other),
            }
        }
    }

    /// First table entry covering `at` that accepts `thrown`, with the
    /// value the handler starts with.
    fn find_handler(&self, chunk: &BytecodeChunk, at: usize, thrown: &Value) -> Option<(usize, Value)> {
        chunk.handlers().iter().filter(|h| h.covers(at)).find_map(|h| {
            match (h.catch, thrown) {
                (CatchType::Any, _) => Some((h.handler, thrown.clone())),
                (CatchType::Class(class), Value::Object(object))
                    if self.is_instance(object.class, class) =>
                {
                    Some((h.handler, thrown.clone()))
                }
                (CatchType::NonLocalReturn(token), Value::Signal(signal)) if signal.token == token => {
                    Some((h.handler, signal.value.clone()))
                }
                _ => None,
            }
        })
    }

    fn is_instance(&self, class: TypeHash, wanted: TypeHash) -> bool {
        if wanted == well_known::ANY || wanted == well_known::THROWABLE {
            return true;
        }
        let mut current = Some(class);
        for _ in 0..MAX_DEPTH {
            match current {
                Some(c) if c == wanted => return true,
                Some(c) => current = self.module.closure(c).and_then(|closure| closure.superclass),
                None => return false,
            }
        }
        false
    }

    fn value_is(&self, value: &Value, wanted: TypeHash) -> bool {
        let boxed = |kinds: &[PrimitiveKind]| kinds.iter().any(|k| k.boxed_type() == wanted);
        match value {
            Value::Null | Value::Signal(_) => false,
            _ if wanted == well_known::ANY => true,
            Value::Object(o) => self.is_instance(o.class, wanted),
            Value::Int(_) => boxed(&[
                PrimitiveKind::Bool,
                PrimitiveKind::Byte,
                PrimitiveKind::Short,
                PrimitiveKind::Char,
                PrimitiveKind::Int,
                PrimitiveKind::Long,
            ]),
            Value::Float(_) => boxed(&[PrimitiveKind::Float, PrimitiveKind::Double]),
            Value::Str(_) => wanted == well_known::STRING,
            Value::Unit => wanted == well_known::UNIT,
            Value::Array(_) | Value::Cell(_) => false,
        }
    }

    fn step(
        &mut self,
        chunk: &'m BytecodeChunk,
        op: OpCode,
        at: usize,
        stack: &mut Vec<Value>,
        locals: &mut Vec<Value>,
    ) -> VmResult<Flow> {
        let byte = |offset: usize| chunk.read_byte(at + offset).ok_or_else(|| invalid(at, "truncated operand"));
        let wide = || chunk.read_u16(at + 1).ok_or_else(|| invalid(at, "truncated operand"));
        let constant = |index: u16| {
            chunk
                .constants()
                .get(u32::from(index))
                .ok_or_else(|| invalid(at, format!("no constant {index}")))
        };
        let type_operand = || match constant(wide()?)? {
            Constant::TypeHash(hash) => Ok(*hash),
            other => Err(invalid(at, format!("expected a type, found {other:?}"))),
        };

        match op {
            OpCode::Constant => stack.push(load_constant(constant(u16::from(byte(1)?))?, at)?),
            OpCode::ConstantWide => stack.push(load_constant(constant(wide()?)?, at)?),
            OpCode::PushNull => stack.push(Value::Null),
            OpCode::PushTrue | OpCode::PushOne => stack.push(Value::Int(1)),
            OpCode::PushFalse | OpCode::PushZero => stack.push(Value::Int(0)),
            OpCode::PushUnit => stack.push(Value::Unit),

            OpCode::Pop => {
                pop(stack, at)?;
            }
            OpCode::Dup => {
                let top = peek(stack, at)?.clone();
                stack.push(top);
            }
            OpCode::DupN => {
                let n = usize::from(byte(1)?);
                let from = stack.len().checked_sub(n).ok_or_else(|| invalid(at, "stack underflow"))?;
                let copies = stack[from..].to_vec();
                stack.extend(copies);
            }
            OpCode::DupUnder => {
                let n = usize::from(byte(1)?);
                let top = peek(stack, at)?.clone();
                let index = stack
                    .len()
                    .checked_sub(n + 1)
                    .ok_or_else(|| invalid(at, "stack underflow"))?;
                stack.insert(index, top);
            }
            OpCode::Swap => {
                let b = pop(stack, at)?;
                let a = pop(stack, at)?;
                stack.push(b);
                stack.push(a);
            }
            OpCode::Nop => {}

            OpCode::GetLocal => stack.push(get_local(locals, usize::from(byte(1)?))),
            OpCode::SetLocal => {
                let value = pop(stack, at)?;
                set_local(locals, usize::from(byte(1)?), value);
            }
            OpCode::GetLocalWide => stack.push(get_local(locals, usize::from(wide()?))),
            OpCode::SetLocalWide => {
                let value = pop(stack, at)?;
                set_local(locals, usize::from(wide()?), value);
            }
            OpCode::IncLocal => {
                let slot = usize::from(byte(1)?);
                let delta = byte(2)? as i8;
                let current = int(&get_local(locals, slot), at)?;
                set_local(locals, slot, Value::Int(i64::from((current as i32).wrapping_add(i32::from(delta)))));
            }

            OpCode::NewRef => stack.push(Value::Cell(Rc::new(RefCell::new(Value::Null)))),
            OpCode::GetRef => match pop(stack, at)? {
                Value::Cell(cell) => stack.push(cell.borrow().clone()),
                other => return Err(invalid(at, format!("GetRef on {other:?}"))),
            },
            OpCode::SetRef => {
                let value = pop(stack, at)?;
                match pop(stack, at)? {
                    Value::Cell(cell) => *cell.borrow_mut() = value,
                    other => return Err(invalid(at, format!("SetRef on {other:?}"))),
                }
            }

            OpCode::GetField | OpCode::SetField | OpCode::GetStatic | OpCode::SetStatic => {
                let Constant::Field(field) = constant(wide()?)? else {
                    return Err(invalid(at, "expected a field reference"));
                };
                match op {
                    OpCode::GetField => {
                        let object = pop(stack, at)?;
                        stack.push(self.object_of(&object, at)?.field(field.hash));
                    }
                    OpCode::SetField => {
                        let value = pop(stack, at)?;
                        let object = pop(stack, at)?;
                        self.object_of(&object, at)?.set_field(field.hash, value);
                    }
                    OpCode::GetStatic => {
                        stack.push(self.statics.get(&field.hash).cloned().unwrap_or(Value::Null));
                    }
                    _ => {
                        let value = pop(stack, at)?;
                        self.statics.insert(field.hash, value);
                    }
                }
            }

            OpCode::NewArray => {
                let Constant::Type(element) = constant(wide()?)? else {
                    return Err(invalid(at, "expected an element type"));
                };
                let length = int(&pop(stack, at)?, at)?;
                let length = usize::try_from(length).map_err(|_| invalid(at, "negative array length"))?;
                stack.push(Value::array(vec![default_value(*element); length]));
            }
            OpCode::ArrayLoad => {
                let index = int(&pop(stack, at)?, at)?;
                let array = array_of(pop(stack, at)?, at)?;
                let element = usize::try_from(index).ok().and_then(|i| array.borrow().get(i).cloned());
                match element {
                    Some(value) => stack.push(value),
                    None => return raise(TypeHash::from_name("tessera.IndexOutOfBoundsException")),
                }
            }
            OpCode::ArrayStore => {
                let value = pop(stack, at)?;
                let index = int(&pop(stack, at)?, at)?;
                let array = array_of(pop(stack, at)?, at)?;
                let mut elements = array.borrow_mut();
                match usize::try_from(index).ok().and_then(|i| elements.get_mut(i)) {
                    Some(slot) => *slot = value,
                    None => return raise(TypeHash::from_name("tessera.IndexOutOfBoundsException")),
                }
            }
            OpCode::ArrayLength => {
                let array = array_of(pop(stack, at)?, at)?;
                let length = array.borrow().len() as i64;
                stack.push(Value::Int(length));
            }

            OpCode::AddI32 => int_op(stack, at, |a, b| Ok(i64::from((a as i32).wrapping_add(b as i32))))?,
            OpCode::SubI32 => int_op(stack, at, |a, b| Ok(i64::from((a as i32).wrapping_sub(b as i32))))?,
            OpCode::MulI32 => int_op(stack, at, |a, b| Ok(i64::from((a as i32).wrapping_mul(b as i32))))?,
            OpCode::DivI32 => int_op(stack, at, |a, b| {
                (a as i32).checked_div(b as i32).map(i64::from).ok_or(())
            })?,
            OpCode::ModI32 => int_op(stack, at, |a, b| {
                (a as i32).checked_rem(b as i32).map(i64::from).ok_or(())
            })?,
            OpCode::AddI64 => int_op(stack, at, |a, b| Ok(a.wrapping_add(b)))?,
            OpCode::SubI64 => int_op(stack, at, |a, b| Ok(a.wrapping_sub(b)))?,
            OpCode::MulI64 => int_op(stack, at, |a, b| Ok(a.wrapping_mul(b)))?,
            OpCode::DivI64 => int_op(stack, at, |a, b| a.checked_div(b).ok_or(()))?,
            OpCode::ModI64 => int_op(stack, at, |a, b| a.checked_rem(b).ok_or(()))?,
            OpCode::NegI32 => {
                let a = int(&pop(stack, at)?, at)?;
                stack.push(Value::Int(i64::from((a as i32).wrapping_neg())));
            }
            OpCode::NegI64 => {
                let a = int(&pop(stack, at)?, at)?;
                stack.push(Value::Int(a.wrapping_neg()));
            }
            OpCode::AddF32 => float_op(stack, at, true, |a, b| a + b)?,
            OpCode::SubF32 => float_op(stack, at, true, |a, b| a - b)?,
            OpCode::MulF32 => float_op(stack, at, true, |a, b| a * b)?,
            OpCode::DivF32 => float_op(stack, at, true, |a, b| a / b)?,
            OpCode::ModF32 => float_op(stack, at, true, |a, b| a % b)?,
            OpCode::AddF64 => float_op(stack, at, false, |a, b| a + b)?,
            OpCode::SubF64 => float_op(stack, at, false, |a, b| a - b)?,
            OpCode::MulF64 => float_op(stack, at, false, |a, b| a * b)?,
            OpCode::DivF64 => float_op(stack, at, false, |a, b| a / b)?,
            OpCode::ModF64 => float_op(stack, at, false, |a, b| a % b)?,
            OpCode::NegF32 | OpCode::NegF64 => {
                let a = float(&pop(stack, at)?, at)?;
                stack.push(Value::Float(-a));
            }

            OpCode::I32toI64 => {}
            OpCode::I64toI32 => convert_int(stack, at, |v| i64::from(v as i32))?,
            OpCode::I32toI8 => convert_int(stack, at, |v| i64::from(v as i8))?,
            OpCode::I32toI16 => convert_int(stack, at, |v| i64::from(v as i16))?,
            OpCode::I32toU16 => convert_int(stack, at, |v| i64::from(v as u16))?,
            OpCode::I32toF32 | OpCode::I64toF32 => {
                let v = int(&pop(stack, at)?, at)?;
                stack.push(Value::Float(f64::from(v as f32)));
            }
            OpCode::I32toF64 | OpCode::I64toF64 => {
                let v = int(&pop(stack, at)?, at)?;
                stack.push(Value::Float(v as f64));
            }
            OpCode::F32toI32 | OpCode::F64toI32 => {
                let v = float(&pop(stack, at)?, at)?;
                stack.push(Value::Int(i64::from(v as i32)));
            }
            OpCode::F32toI64 | OpCode::F64toI64 => {
                let v = float(&pop(stack, at)?, at)?;
                stack.push(Value::Int(v as i64));
            }
            OpCode::F32toF64 => {}
            OpCode::F64toF32 => {
                let v = float(&pop(stack, at)?, at)?;
                stack.push(Value::Float(f64::from(v as f32)));
            }

            OpCode::EqI32 => int_compare(stack, at, true, |o| o.is_eq())?,
            OpCode::NeI32 => int_compare(stack, at, true, |o| o.is_ne())?,
            OpCode::LtI32 => int_compare(stack, at, true, |o| o.is_lt())?,
            OpCode::LeI32 => int_compare(stack, at, true, |o| o.is_le())?,
            OpCode::GtI32 => int_compare(stack, at, true, |o| o.is_gt())?,
            OpCode::GeI32 => int_compare(stack, at, true, |o| o.is_ge())?,
            OpCode::EqI64 => int_compare(stack, at, false, |o| o.is_eq())?,
            OpCode::NeI64 => int_compare(stack, at, false, |o| o.is_ne())?,
            OpCode::LtI64 => int_compare(stack, at, false, |o| o.is_lt())?,
            OpCode::LeI64 => int_compare(stack, at, false, |o| o.is_le())?,
            OpCode::GtI64 => int_compare(stack, at, false, |o| o.is_gt())?,
            OpCode::GeI64 => int_compare(stack, at, false, |o| o.is_ge())?,
            OpCode::EqF32 | OpCode::EqF64 => float_compare(stack, at, |a, b| a == b)?,
            OpCode::NeF32 | OpCode::NeF64 => float_compare(stack, at, |a, b| a != b)?,
            OpCode::LtF32 | OpCode::LtF64 => float_compare(stack, at, |a, b| a < b)?,
            OpCode::LeF32 | OpCode::LeF64 => float_compare(stack, at, |a, b| a <= b)?,
            OpCode::GtF32 | OpCode::GtF64 => float_compare(stack, at, |a, b| a > b)?,
            OpCode::GeF32 | OpCode::GeF64 => float_compare(stack, at, |a, b| a >= b)?,
            OpCode::Equals => {
                let b = pop(stack, at)?;
                let a = pop(stack, at)?;
                stack.push(Value::Int(i64::from(a.equals(&b))));
            }
            OpCode::EqRef => {
                let b = pop(stack, at)?;
                let a = pop(stack, at)?;
                stack.push(Value::Int(i64::from(a.same(&b))));
            }
            OpCode::Not => {
                let v = int(&pop(stack, at)?, at)?;
                stack.push(Value::Int(i64::from(v == 0)));
            }

            OpCode::Jump
            | OpCode::JumpIfFalse
            | OpCode::JumpIfTrue
            | OpCode::JumpIfNull
            | OpCode::JumpIfNotNull => {
                let target = chunk
                    .jump_target(at)
                    .ok_or_else(|| invalid(at, "bad jump"))?;
                let taken = match op {
                    OpCode::Jump => true,
                    OpCode::JumpIfFalse => int(&pop(stack, at)?, at)? == 0,
                    OpCode::JumpIfTrue => int(&pop(stack, at)?, at)? != 0,
                    OpCode::JumpIfNull => matches!(pop(stack, at)?, Value::Null),
                    _ => !matches!(pop(stack, at)?, Value::Null),
                };
                if taken {
                    return Ok(Flow::Jump(target));
                }
            }

            OpCode::CallStatic | OpCode::CallVirtual | OpCode::CallSpecial | OpCode::CallInline => {
                let Constant::Method(method) = constant(wide()?)? else {
                    return Err(invalid(at, "expected a method reference"));
                };
                let argc = usize::from(byte(3)?);
                let from = stack
                    .len()
                    .checked_sub(argc)
                    .ok_or_else(|| invalid(at, "stack underflow"))?;
                let args = stack.split_off(from);
                let result = match op {
                    OpCode::CallStatic | OpCode::CallInline => self.call_static(method, args)?,
                    _ => {
                        let receiver = pop(stack, at)?;
                        self.call_on(method, receiver, args, at)?
                    }
                };
                if let Some(value) = result {
                    stack.push(value);
                }
            }
            OpCode::New => stack.push(Value::Object(Object::new(type_operand()?))),

            OpCode::InstanceOf => {
                let tested = type_operand()?;
                let value = pop(stack, at)?;
                stack.push(Value::Int(i64::from(self.value_is(&value, tested))));
            }
            OpCode::CheckCast => {
                let tested = type_operand()?;
                let value = peek(stack, at)?;
                if !matches!(value, Value::Null) && !self.value_is(value, tested) {
                    return raise(well_known::CLASS_CAST_EXCEPTION);
                }
            }
            OpCode::Box => {}
            OpCode::Unbox => {
                if matches!(peek(stack, at)?, Value::Null) {
                    return raise(well_known::NULL_POINTER_EXCEPTION);
                }
            }

            OpCode::Throw => return Err(VmError::Thrown(pop(stack, at)?)),
            OpCode::ThrowNew => return raise(type_operand()?),
            OpCode::Return => return Ok(Flow::Return(Some(pop(stack, at)?))),
            OpCode::ReturnVoid => return Ok(Flow::Return(None)),
            OpCode::NonLocalReturn => {
                let token = type_operand()?;
                let value = pop(stack, at)?;
                return Err(VmError::Thrown(Value::Signal(Rc::new(Signal { token, value }))));
            }

            OpCode::NewSpreadBuilder => stack.push(Value::array(Vec::new())),
            OpCode::SpreadAdd => {
                let value = pop(stack, at)?;
                array_of(peek(stack, at)?.clone(), at)?.borrow_mut().push(value);
            }
            OpCode::SpreadAddAll => {
                let source = array_of(pop(stack, at)?, at)?;
                let builder = array_of(peek(stack, at)?.clone(), at)?;
                let elements = source.borrow().clone();
                builder.borrow_mut().extend(elements);
            }
            // The builder already is an array.
            OpCode::SpreadToArray => {}
        }
        Ok(Flow::Next)
    }

    /// `CallStatic` and `CallInline`: the receiver, if any, is the first
    /// argument.
    fn call_static(&mut self, method: &MemberRef, mut args: Vec<Value>) -> VmResult<Option<Value>> {
        let module = self.module;
        if let Some(function) = module.function(method.hash) {
            let this = if function.has_this && !args.is_empty() {
                Some(args.remove(0))
            } else {
                None
            };
            return self.run(function, this, args);
        }
        self.call_host(&method.name, &args)
    }

    fn call_on(
        &mut self,
        method: &MemberRef,
        receiver: Value,
        args: Vec<Value>,
        at: usize,
    ) -> VmResult<Option<Value>> {
        let module = self.module;
        let class = receiver.object().map(|o| o.class);

        if let Some(closure) = class.and_then(|c| module.closure(c)) {
            if &*method.name == "<init>" {
                let object = self.object_of(&receiver, at)?;
                for (field, value) in closure.constructor.iter().zip(args) {
                    object.set_field(field.member_ref().hash, value);
                }
                return Ok(None);
            }
            if &*method.name == "invoke" {
                return self.invoke_closure(closure, receiver, args, at);
            }
            if let Some(function) = closure.method(method.hash) {
                return self.run(function, Some(receiver), args);
            }
        }
        if let Some(function) = module.function(method.hash) {
            return self.run(function, Some(receiver), args);
        }
        if &*method.name == "<init>" {
            return Ok(None);
        }
        let mut all = Vec::with_capacity(args.len() + 1);
        all.push(receiver);
        all.extend(args);
        self.call_host(&method.name, &all)
    }

    fn invoke_closure(
        &mut self,
        closure: &'m ClosureClass,
        receiver: Value,
        args: Vec<Value>,
        at: usize,
    ) -> VmResult<Option<Value>> {
        match &closure.strategy {
            ClosureStrategy::FunctionBody | ClosureStrategy::SamWrapper { .. } => {
                let invoke = closure
                    .invoke
                    .as_ref()
                    .ok_or_else(|| invalid(at, "closure class without a body"))?;
                self.run(invoke, Some(receiver), args)
            }
            ClosureStrategy::FunctionReference { target, .. } => self.call_static(target, args),
            ClosureStrategy::PropertyReference { getter, field, is_static } => {
                if let Some(getter) = getter {
                    return self.call_static(getter, args);
                }
                let Some(field) = field else {
                    return Err(invalid(at, "property reference without getter or field"));
                };
                if *is_static {
                    return Ok(Some(self.statics.get(&field.hash).cloned().unwrap_or(Value::Null)));
                }
                let owner = args.first().ok_or_else(|| invalid(at, "missing property receiver"))?;
                Ok(Some(self.object_of(owner, at)?.field(field.hash)))
            }
            ClosureStrategy::ObjectLiteral => Err(invalid(at, "object literal has no invoke")),
        }
    }

    fn call_host(&mut self, name: &str, args: &[Value]) -> VmResult<Option<Value>> {
        let host = self
            .hosts
            .get(name)
            .cloned()
            .ok_or_else(|| VmError::UnknownFunction(name.to_string()))?;
        host(args).map_err(VmError::Thrown)
    }

    fn object_of<'v>(&self, value: &'v Value, at: usize) -> VmResult<&'v Rc<Object>> {
        match value {
            Value::Object(object) => Ok(object),
            Value::Null => raise(well_known::NULL_POINTER_EXCEPTION),
            other => Err(invalid(at, format!("expected an object, found {other:?}"))),
        }
    }
}

fn get_local(locals: &[Value], slot: usize) -> Value {
    locals.get(slot).cloned().unwrap_or(Value::Null)
}

fn set_local(locals: &mut Vec<Value>, slot: usize, value: Value) {
    if slot >= locals.len() {
        locals.resize(slot + 1, Value::Null);
    }
    locals[slot] = value;
}

fn pop(stack: &mut Vec<Value>, at: usize) -> VmResult<Value> {
    stack.pop().ok_or_else(|| invalid(at, "stack underflow"))
}

fn peek(stack: &[Value], at: usize) -> VmResult<&Value> {
    stack.last().ok_or_else(|| invalid(at, "stack underflow"))
}

fn int(value: &Value, at: usize) -> VmResult<i64> {
    value
        .int()
        .ok_or_else(|| invalid(at, format!("expected an integer, found {value:?}")))
}

fn float(value: &Value, at: usize) -> VmResult<f64> {
    match value {
        Value::Float(v) => Ok(*v),
        other => Err(invalid(at, format!("expected a float, found {other:?}"))),
    }
}

fn array_of(value: Value, at: usize) -> VmResult<Rc<RefCell<Vec<Value>>>> {
    match value {
        Value::Array(array) => Ok(array),
        Value::Null => raise(well_known::NULL_POINTER_EXCEPTION),
        other => Err(invalid(at, format!("expected an array, found {other:?}"))),
    }
}

fn load_constant(constant: &Constant, at: usize) -> VmResult<Value> {
    match constant {
        Constant::Int(v) => Ok(Value::Int(*v)),
        Constant::Float32(v) => Ok(Value::Float(f64::from(v.0))),
        Constant::Float64(v) => Ok(Value::Float(v.0)),
        Constant::String(s) => Ok(Value::Str(Rc::from(&**s))),
        other => Err(invalid(at, format!("{other:?} is not a loadable constant"))),
    }
}

fn default_value(ty: MachineType) -> Value {
    match ty {
        MachineType::Primitive(_) if ty.is_floating() => Value::Float(0.0),
        MachineType::Primitive(_) => Value::Int(0),
        _ => Value::Null,
    }
}

fn int_op(
    stack: &mut Vec<Value>,
    at: usize,
    op: impl FnOnce(i64, i64) -> std::result::Result<i64, ()>,
) -> VmResult<()> {
    let b = int(&pop(stack, at)?, at)?;
    let a = int(&pop(stack, at)?, at)?;
    match op(a, b) {
        Ok(v) => {
            stack.push(Value::Int(v));
            Ok(())
        }
        Err(()) => raise(TypeHash::from_name("tessera.ArithmeticException")),
    }
}

fn float_op(stack: &mut Vec<Value>, at: usize, narrow: bool, op: impl FnOnce(f64, f64) -> f64) -> VmResult<()> {
    let b = float(&pop(stack, at)?, at)?;
    let a = float(&pop(stack, at)?, at)?;
    let v = op(a, b);
    stack.push(Value::Float(if narrow { f64::from(v as f32) } else { v }));
    Ok(())
}

fn convert_int(stack: &mut Vec<Value>, at: usize, op: impl FnOnce(i64) -> i64) -> VmResult<()> {
    let v = int(&pop(stack, at)?, at)?;
    stack.push(Value::Int(op(v)));
    Ok(())
}

fn int_compare(
    stack: &mut Vec<Value>,
    at: usize,
    narrow: bool,
    test: impl FnOnce(std::cmp::Ordering) -> bool,
) -> VmResult<()> {
    let b = int(&pop(stack, at)?, at)?;
    let a = int(&pop(stack, at)?, at)?;
    let ordering = if narrow {
        (a as i32).cmp(&(b as i32))
    } else {
        a.cmp(&b)
    };
    stack.push(Value::Int(i64::from(test(ordering))));
    Ok(())
}

fn float_compare(stack: &mut Vec<Value>, at: usize, test: impl FnOnce(f64, f64) -> bool) -> VmResult<()> {
    let b = float(&pop(stack, at)?, at)?;
    let a = float(&pop(stack, at)?, at)?;
    stack.push(Value::Int(i64::from(test(a, b))));
    Ok(())
}

static INIT: Once = Once::new();

/// Route `tracing` output to the test harness. Filter with `RUST_LOG`.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
