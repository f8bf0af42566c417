//! Instruction emission.
//!
//! Code generation writes through the [`InstructionSink`] trait: raw
//! instructions, symbolic [`Label`]s, exception table entries and local
//! variable ranges. [`BytecodeEmitter`] is the sink that assembles a
//! [`BytecodeChunk`].
//!
//! ```
//! use tessera_codegen::bytecode::OpCode;
//! use tessera_codegen::emit::{BytecodeEmitter, InstructionSink};
//!
//! let mut emitter = BytecodeEmitter::new();
//! let done = emitter.new_label();
//! emitter.set_line(1);
//! emitter.emit(OpCode::PushTrue);
//! emitter.emit_jump(OpCode::JumpIfTrue, done);
//! emitter.emit_int(42);
//! emitter.emit(OpCode::Pop);
//! emitter.mark(done);
//! emitter.emit(OpCode::ReturnVoid);
//!
//! let chunk = emitter.finish().unwrap();
//! assert_eq!(chunk.jump_target(1), Some(chunk.len() - 1));
//! ```

mod labels;

use tessera_core::{MachineType, PrimitiveKind, Result, TypeHash};
use tracing::{debug, trace};

use crate::bytecode::{
    BytecodeChunk, CatchType, Constant, ExceptionHandler, LocalVariable, MemberRef, OpCode,
};
pub use labels::{Label, LabelTable};

/// Destination of generated instructions.
///
/// Required methods cover raw emission, labels and tables; the provided
/// helpers pick compact encodings for common cases.
pub trait InstructionSink {
    /// Source line for subsequent instructions.
    fn set_line(&mut self, line: u32);

    fn emit(&mut self, op: OpCode);

    /// Emit opcode with 8-bit operand.
    fn emit_byte(&mut self, op: OpCode, operand: u8);

    /// Emit opcode with two 8-bit operands.
    fn emit_byte_pair(&mut self, op: OpCode, first: u8, second: u8);

    /// Emit opcode with 16-bit operand.
    fn emit_u16(&mut self, op: OpCode, operand: u16);

    /// Emit opcode with a 16-bit operand followed by an 8-bit one.
    fn emit_u16_byte(&mut self, op: OpCode, first: u16, second: u8);

    /// Intern a constant, returning its pool index.
    fn add_constant(&mut self, constant: Constant) -> u16;

    /// Emit a branch to `target`.
    fn emit_jump(&mut self, op: OpCode, target: Label);

    fn new_label(&mut self) -> Label;

    /// Bind `label` to the current position.
    fn mark(&mut self, label: Label);

    /// Register a handler for the code between `start` and `end`.
    ///
    /// Entries registered first take precedence at run time.
    fn add_exception_entry(&mut self, start: Label, end: Label, handler: Label, catch: CatchType);

    fn add_local_variable(&mut self, name: &str, ty: MachineType, start: Label, end: Label, slot: u16);

    fn current_offset(&self) -> usize;

    // ==========================================================================
    // Constants
    // ==========================================================================

    /// Emit a constant load, narrow or wide depending on the pool index.
    fn emit_constant(&mut self, constant: Constant) {
        let index = self.add_constant(constant);
        if index < 256 {
            self.emit_byte(OpCode::Constant, index as u8);
        } else {
            self.emit_u16(OpCode::ConstantWide, index);
        }
    }

    /// Emit an integer constant.
    ///
    /// Optimizes common cases: 0 uses `PushZero`, 1 uses `PushOne`.
    fn emit_int(&mut self, value: i64) {
        match value {
            0 => self.emit(OpCode::PushZero),
            1 => self.emit(OpCode::PushOne),
            _ => self.emit_constant(Constant::Int(value)),
        }
    }

    fn emit_f32(&mut self, value: f32) {
        self.emit_constant(Constant::Float32(value.into()));
    }

    fn emit_f64(&mut self, value: f64) {
        self.emit_constant(Constant::Float64(value.into()));
    }

    fn emit_string(&mut self, value: &str) {
        self.emit_constant(Constant::String(value.into()));
    }

    fn emit_bool(&mut self, value: bool) {
        self.emit(if value {
            OpCode::PushTrue
        } else {
            OpCode::PushFalse
        });
    }

    /// Emit an instruction whose operand is a pool index.
    fn emit_with_constant(&mut self, op: OpCode, constant: Constant) {
        let index = self.add_constant(constant);
        self.emit_u16(op, index);
    }

    fn emit_type_op(&mut self, op: OpCode, ty: TypeHash) {
        self.emit_with_constant(op, Constant::TypeHash(ty));
    }

    // ==========================================================================
    // Locals
    // ==========================================================================

    fn emit_get_local(&mut self, slot: u16) {
        if slot < 256 {
            self.emit_byte(OpCode::GetLocal, slot as u8);
        } else {
            self.emit_u16(OpCode::GetLocalWide, slot);
        }
    }

    fn emit_set_local(&mut self, slot: u16) {
        if slot < 256 {
            self.emit_byte(OpCode::SetLocal, slot as u8);
        } else {
            self.emit_u16(OpCode::SetLocalWide, slot);
        }
    }

    // ==========================================================================
    // Members and Calls
    // ==========================================================================

    fn emit_field_op(&mut self, op: OpCode, field: MemberRef) {
        self.emit_with_constant(op, Constant::Field(field));
    }

    /// Emit a call; `argc` excludes the receiver.
    fn emit_call(&mut self, op: OpCode, method: MemberRef, argc: u8) {
        let index = self.add_constant(Constant::Method(method));
        self.emit_u16_byte(op, index, argc);
    }

    fn emit_box(&mut self, kind: PrimitiveKind) {
        self.emit_byte(OpCode::Box, kind as u8);
    }

    fn emit_unbox(&mut self, kind: PrimitiveKind) {
        self.emit_byte(OpCode::Unbox, kind as u8);
    }

    /// Create a label bound to the current position.
    fn here(&mut self) -> Label {
        let label = self.new_label();
        self.mark(label);
        label
    }
}

#[derive(Debug)]
struct PendingHandler {
    start: Label,
    end: Label,
    handler: Label,
    catch: CatchType,
}

#[derive(Debug)]
struct PendingLocal {
    name: String,
    ty: MachineType,
    start: Label,
    end: Label,
    slot: u16,
}

/// Emits bytecode for a single function.
pub struct BytecodeEmitter {
    chunk: BytecodeChunk,
    labels: LabelTable,
    handlers: Vec<PendingHandler>,
    locals: Vec<PendingLocal>,
    current_line: u32,
    pool_overflow: bool,
}

impl BytecodeEmitter {
    pub fn new() -> Self {
        Self {
            chunk: BytecodeChunk::new(),
            labels: LabelTable::new(),
            handlers: Vec::new(),
            locals: Vec::new(),
            current_line: 0,
            pool_overflow: false,
        }
    }

    pub fn current_line(&self) -> u32 {
        self.current_line
    }

    /// Code emitted so far, before jump patching.
    pub fn chunk(&self) -> &BytecodeChunk {
        &self.chunk
    }

    /// Patch jumps, resolve tables and return the finished chunk.
    ///
    /// Fails if a referenced label was never marked, a label was marked
    /// twice, a jump does not fit its operand, or the constant pool grew
    /// past 16-bit indices. Handler ranges that cover no code are dropped.
    pub fn finish(mut self) -> Result<BytecodeChunk> {
        if self.pool_overflow {
            return Err(tessera_core::CodegenError::internal(
                "constant pool exceeds 65536 entries",
            ));
        }

        for (offset, relative) in self.labels.patches()? {
            self.chunk.patch_u16(offset, relative as u16);
        }

        for pending in std::mem::take(&mut self.handlers) {
            let start = self.labels.resolve(pending.start)?;
            let end = self.labels.resolve(pending.end)?;
            let handler = self.labels.resolve(pending.handler)?;
            if start >= end {
                trace!(start, end, "dropping empty handler range");
                continue;
            }
            self.chunk.add_handler(ExceptionHandler {
                start,
                end,
                handler,
                catch: pending.catch,
            });
        }

        for pending in std::mem::take(&mut self.locals) {
            let start = self.labels.resolve(pending.start)?;
            let end = self.labels.resolve(pending.end)?;
            if start > end {
                continue;
            }
            self.chunk.add_local(LocalVariable {
                name: pending.name,
                descriptor: pending.ty.descriptor(),
                start,
                end,
                slot: pending.slot,
            });
        }

        debug!(
            bytes = self.chunk.len(),
            constants = self.chunk.constants().len(),
            handlers = self.chunk.handlers().len(),
            "finished chunk"
        );
        Ok(self.chunk)
    }
}

impl Default for BytecodeEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl InstructionSink for BytecodeEmitter {
    fn set_line(&mut self, line: u32) {
        self.current_line = line;
    }

    fn emit(&mut self, op: OpCode) {
        self.chunk.write_op(op, self.current_line);
    }

    fn emit_byte(&mut self, op: OpCode, operand: u8) {
        self.chunk.write_op(op, self.current_line);
        self.chunk.write_byte(operand, self.current_line);
    }

    fn emit_byte_pair(&mut self, op: OpCode, first: u8, second: u8) {
        self.chunk.write_op(op, self.current_line);
        self.chunk.write_byte(first, self.current_line);
        self.chunk.write_byte(second, self.current_line);
    }

    fn emit_u16(&mut self, op: OpCode, operand: u16) {
        self.chunk.write_op(op, self.current_line);
        self.chunk.write_u16(operand, self.current_line);
    }

    fn emit_u16_byte(&mut self, op: OpCode, first: u16, second: u8) {
        self.chunk.write_op(op, self.current_line);
        self.chunk.write_u16(first, self.current_line);
        self.chunk.write_byte(second, self.current_line);
    }

    fn add_constant(&mut self, constant: Constant) -> u16 {
        let index = self.chunk.constants_mut().add(constant);
        u16::try_from(index).unwrap_or_else(|_| {
            self.pool_overflow = true;
            u16::MAX
        })
    }

    fn emit_jump(&mut self, op: OpCode, target: Label) {
        self.chunk.write_op(op, self.current_line);
        let operand = self.chunk.current_offset();
        self.chunk.write_u16(0xFFFF, self.current_line);
        self.labels.add_fixup(operand, target);
    }

    fn new_label(&mut self) -> Label {
        self.labels.new_label()
    }

    fn mark(&mut self, label: Label) {
        self.labels.mark(label, self.chunk.current_offset());
    }

    fn add_exception_entry(&mut self, start: Label, end: Label, handler: Label, catch: CatchType) {
        self.handlers.push(PendingHandler {
            start,
            end,
            handler,
            catch,
        });
    }

    fn add_local_variable(&mut self, name: &str, ty: MachineType, start: Label, end: Label, slot: u16) {
        self.locals.push(PendingLocal {
            name: name.to_string(),
            ty,
            start,
            end,
            slot,
        });
    }

    fn current_offset(&self) -> usize {
        self.chunk.current_offset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_int_optimizations() {
        let mut emitter = BytecodeEmitter::new();
        emitter.emit_int(0);
        emitter.emit_int(1);
        emitter.emit_int(42);

        let chunk = emitter.finish().unwrap();
        chunk.assert_opcodes(&[OpCode::PushZero, OpCode::PushOne, OpCode::Constant]);
    }

    #[test]
    fn wide_locals() {
        let mut emitter = BytecodeEmitter::new();
        emitter.emit_get_local(3);
        emitter.emit_set_local(300);

        let chunk = emitter.finish().unwrap();
        chunk.assert_opcodes(&[OpCode::GetLocal, OpCode::SetLocalWide]);
        assert_eq!(chunk.read_u16(3), Some(300));
    }

    #[test]
    fn backward_jump() {
        let mut emitter = BytecodeEmitter::new();
        let top = emitter.here();
        emitter.emit(OpCode::Nop);
        emitter.emit_jump(OpCode::Jump, top);

        let chunk = emitter.finish().unwrap();
        assert_eq!(chunk.jump_target(1), Some(0));
    }

    #[test]
    fn unmarked_label_fails_finish() {
        let mut emitter = BytecodeEmitter::new();
        let nowhere = emitter.new_label();
        emitter.emit_jump(OpCode::Jump, nowhere);
        assert!(emitter.finish().is_err());
    }

    #[test]
    fn empty_handler_ranges_are_dropped() {
        let mut emitter = BytecodeEmitter::new();
        let start = emitter.here();
        let end = emitter.here();
        emitter.emit(OpCode::Nop);
        let covered_end = emitter.here();
        let handler = emitter.here();
        emitter.emit(OpCode::Throw);
        emitter.add_exception_entry(start, end, handler, CatchType::Any);
        emitter.add_exception_entry(start, covered_end, handler, CatchType::Any);

        let chunk = emitter.finish().unwrap();
        assert_eq!(chunk.handlers().len(), 1);
        assert_eq!(chunk.handlers()[0].end, 1);
    }

    #[test]
    fn local_variable_ranges_resolve() {
        let mut emitter = BytecodeEmitter::new();
        let start = emitter.here();
        emitter.emit(OpCode::PushZero);
        emitter.emit_set_local(1);
        let end = emitter.here();
        emitter.add_local_variable("i", MachineType::INT, start, end, 1);

        let chunk = emitter.finish().unwrap();
        assert_eq!(
            chunk.locals(),
            &[LocalVariable {
                name: "i".to_string(),
                descriptor: "I".to_string(),
                start: 0,
                end: 3,
                slot: 1,
            }]
        );
    }

    #[test]
    fn calls_carry_method_and_argc() {
        let mut emitter = BytecodeEmitter::new();
        let method = MemberRef::new(TypeHash::EMPTY, "f", TypeHash::from_function("f", &[]));
        emitter.emit_call(OpCode::CallStatic, method.clone(), 2);

        let chunk = emitter.finish().unwrap();
        assert_eq!(chunk.constant_operand(0), Some(&Constant::Method(method)));
        assert_eq!(chunk.read_byte(3), Some(2));
    }
}
