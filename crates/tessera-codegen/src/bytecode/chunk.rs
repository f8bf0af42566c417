//! Bytecode chunk for compiled functions.
//!
//! A `BytecodeChunk` holds the finished code of one function together with
//! everything the machine and debuggers need to run it:
//!
//! ```text
//! BytecodeChunk
//! ├── code        - instruction bytes
//! ├── lines       - source line per code byte
//! ├── line_table  - (offset, line) at every line change
//! ├── constants   - this function's constant pool
//! ├── handlers    - exception table, innermost entries first
//! └── locals      - local variable debug ranges
//! ```

use std::fmt::Write as _;

use tessera_core::TypeHash;

use super::{Constant, ConstantPool, OpCode};

/// What an exception table entry intercepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatchType {
    /// Every throwable and every non-local return signal.
    Any,
    /// Throwables that are instances of the type.
    Class(TypeHash),
    /// The non-local return signal carrying this label token.
    NonLocalReturn(TypeHash),
}

/// One exception table entry over the half-open range `start..end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionHandler {
    pub start: usize,
    pub end: usize,
    pub handler: usize,
    pub catch: CatchType,
}

impl ExceptionHandler {
    pub fn covers(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }
}

/// Debug range of a named local.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariable {
    pub name: String,
    pub descriptor: String,
    pub start: usize,
    pub end: usize,
    pub slot: u16,
}

/// Compiled bytecode of a single function.
#[derive(Debug, Clone, Default)]
pub struct BytecodeChunk {
    code: Vec<u8>,
    lines: Vec<u32>,
    line_table: Vec<(usize, u32)>,
    constants: ConstantPool,
    handlers: Vec<ExceptionHandler>,
    locals: Vec<LocalVariable>,
}

impl BytecodeChunk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write an opcode.
    pub fn write_op(&mut self, op: OpCode, line: u32) {
        if line != 0 && self.line_table.last().map(|&(_, l)| l) != Some(line) {
            self.line_table.push((self.code.len(), line));
        }
        self.code.push(op as u8);
        self.lines.push(line);
    }

    /// Write a byte operand.
    pub fn write_byte(&mut self, byte: u8, line: u32) {
        self.code.push(byte);
        self.lines.push(line);
    }

    /// Write a 16-bit operand (big-endian).
    pub fn write_u16(&mut self, value: u16, line: u32) {
        self.code.push((value >> 8) as u8);
        self.lines.push(line);
        self.code.push(value as u8);
        self.lines.push(line);
    }

    /// Overwrite a 16-bit operand in place.
    pub fn patch_u16(&mut self, offset: usize, value: u16) {
        self.code[offset] = (value >> 8) as u8;
        self.code[offset + 1] = value as u8;
    }

    /// Get current code offset (for jump patching).
    pub fn current_offset(&self) -> usize {
        self.code.len()
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn lines(&self) -> &[u32] {
        &self.lines
    }

    pub fn line_at(&self, offset: usize) -> Option<u32> {
        self.lines.get(offset).copied()
    }

    /// `(offset, line)` pairs, one per line change.
    pub fn line_table(&self) -> &[(usize, u32)] {
        &self.line_table
    }

    pub fn constants(&self) -> &ConstantPool {
        &self.constants
    }

    pub fn constants_mut(&mut self) -> &mut ConstantPool {
        &mut self.constants
    }

    pub fn handlers(&self) -> &[ExceptionHandler] {
        &self.handlers
    }

    pub fn add_handler(&mut self, handler: ExceptionHandler) {
        self.handlers.push(handler);
    }

    pub fn locals(&self) -> &[LocalVariable] {
        &self.locals
    }

    pub fn add_local(&mut self, local: LocalVariable) {
        self.locals.push(local);
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn read_byte(&self, offset: usize) -> Option<u8> {
        self.code.get(offset).copied()
    }

    /// Read a u16 at the given offset (big-endian).
    pub fn read_u16(&self, offset: usize) -> Option<u16> {
        if offset + 1 < self.code.len() {
            Some(((self.code[offset] as u16) << 8) | (self.code[offset + 1] as u16))
        } else {
            None
        }
    }

    pub fn read_i16(&self, offset: usize) -> Option<i16> {
        self.read_u16(offset).map(|v| v as i16)
    }

    pub fn read_op(&self, offset: usize) -> Option<OpCode> {
        self.code.get(offset).and_then(|&b| OpCode::from_u8(b))
    }

    /// Absolute target of the jump instruction at `offset`.
    pub fn jump_target(&self, offset: usize) -> Option<usize> {
        let op = self.read_op(offset)?;
        if !op.is_jump() {
            return None;
        }
        let relative = self.read_i16(offset + 1)? as isize;
        usize::try_from(offset as isize + 3 + relative).ok()
    }

    /// Constant referenced by the u16 operand of the instruction at `offset`.
    pub fn constant_operand(&self, offset: usize) -> Option<&Constant> {
        let op = self.read_op(offset)?;
        let index = match op {
            OpCode::Constant => self.read_byte(offset + 1)? as u32,
            OpCode::GetLocalWide | OpCode::SetLocalWide | OpCode::IncLocal => {
                return None;
            }
            _ if op.operand_size() >= 2 && !op.is_jump() => self.read_u16(offset + 1)? as u32,
            _ => return None,
        };
        self.constants.get(index)
    }

    /// Offsets of every instruction, in order.
    pub fn instruction_offsets(&self) -> Vec<usize> {
        let mut offsets = Vec::new();
        let mut offset = 0;
        while offset < self.code.len() {
            offsets.push(offset);
            offset += match self.read_op(offset) {
                Some(op) => 1 + op.operand_size(),
                None => 1,
            };
        }
        offsets
    }

    /// Extract all opcodes from the chunk, skipping operands.
    pub fn opcodes(&self) -> Vec<OpCode> {
        self.instruction_offsets()
            .into_iter()
            .filter_map(|offset| self.read_op(offset))
            .collect()
    }

    /// Number of occurrences of `op`.
    pub fn count_opcode(&self, op: OpCode) -> usize {
        self.opcodes().into_iter().filter(|o| *o == op).count()
    }

    /// Human readable listing, one instruction per line.
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        for offset in self.instruction_offsets() {
            let Some(op) = self.read_op(offset) else {
                let _ = writeln!(out, "{offset:04} ???");
                continue;
            };
            let _ = write!(out, "{offset:04} {}", op.name());
            if op.is_jump() {
                if let Some(target) = self.jump_target(offset) {
                    let _ = write!(out, " -> {target:04}");
                }
            } else if let Some(constant) = self.constant_operand(offset) {
                let _ = write!(out, " {constant:?}");
            } else {
                for i in 0..op.operand_size() {
                    if let Some(byte) = self.read_byte(offset + 1 + i) {
                        let _ = write!(out, " {byte}");
                    }
                }
            }
            out.push('\n');
        }
        for h in &self.handlers {
            let _ = writeln!(
                out,
                "handler {:04}..{:04} -> {:04} {:?}",
                h.start, h.end, h.handler, h.catch
            );
        }
        out
    }

    /// Check if this chunk contains exactly the given opcode sequence.
    ///
    /// This ignores operand values, only checking the opcodes themselves.
    #[track_caller]
    pub fn assert_opcodes(&self, expected: &[OpCode]) {
        let actual = self.opcodes();
        assert_eq!(
            actual,
            expected,
            "Bytecode mismatch.\nExpected: {:?}\nActual:   {:?}",
            expected.iter().map(|op| op.name()).collect::<Vec<_>>(),
            actual.iter().map(|op| op.name()).collect::<Vec<_>>(),
        );
    }

    /// Check if this chunk contains the given opcodes (in order, but not necessarily contiguous).
    #[track_caller]
    pub fn assert_contains_opcodes(&self, expected: &[OpCode]) {
        let actual = self.opcodes();
        let mut expected_iter = expected.iter().peekable();

        for op in &actual {
            if expected_iter.peek() == Some(&op) {
                expected_iter.next();
            }
        }

        if expected_iter.peek().is_some() {
            let remaining: Vec<_> = expected_iter.map(|op| op.name()).collect();
            panic!(
                "Missing opcodes in sequence.\nExpected to find: {:?}\nActual bytecode:  {:?}",
                remaining,
                actual.iter().map(|op| op.name()).collect::<Vec<_>>(),
            );
        }
    }
}
