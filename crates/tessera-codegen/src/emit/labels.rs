//! Symbolic jump targets.
//!
//! Labels are created before their position is known, referenced by any
//! number of jumps and table entries, and marked exactly once. Jump operands
//! are patched when the emitter finishes.

use tessera_core::{CodegenError, Result};

/// A position in the code that may not be known yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub(crate) u32);

impl Label {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// A jump operand waiting for its label.
#[derive(Debug, Clone, Copy)]
struct Fixup {
    operand_offset: usize,
    label: Label,
}

/// Positions of all labels of one function plus the jumps still to patch.
#[derive(Debug, Default)]
pub struct LabelTable {
    positions: Vec<Option<usize>>,
    fixups: Vec<Fixup>,
    errors: Vec<String>,
}

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_label(&mut self) -> Label {
        let label = Label(self.positions.len() as u32);
        self.positions.push(None);
        label
    }

    pub fn mark(&mut self, label: Label, offset: usize) {
        match self.positions.get_mut(label.0 as usize) {
            Some(slot @ None) => *slot = Some(offset),
            Some(Some(_)) => self.errors.push(format!("label L{} marked twice", label.0)),
            None => self.errors.push(format!("label L{} was never created", label.0)),
        }
    }

    pub fn position(&self, label: Label) -> Option<usize> {
        self.positions.get(label.0 as usize).copied().flatten()
    }

    pub fn is_marked(&self, label: Label) -> bool {
        self.position(label).is_some()
    }

    /// Resolve a label that must be marked by now.
    pub fn resolve(&self, label: Label) -> Result<usize> {
        self.position(label)
            .ok_or_else(|| CodegenError::internal(format!("label L{} was never marked", label.0)))
    }

    pub fn add_fixup(&mut self, operand_offset: usize, label: Label) {
        self.fixups.push(Fixup {
            operand_offset,
            label,
        });
    }

    /// Relative i16 offsets for every recorded jump, as `(operand_offset, value)`.
    ///
    /// Offsets are measured from the end of the two operand bytes.
    pub fn patches(&self) -> Result<Vec<(usize, i16)>> {
        if let Some(first) = self.errors.first() {
            return Err(CodegenError::internal(first.clone()));
        }
        self.fixups
            .iter()
            .map(|fixup| {
                let target = self.resolve(fixup.label)? as isize;
                let relative = target - (fixup.operand_offset as isize + 2);
                i16::try_from(relative).map(|r| (fixup.operand_offset, r)).map_err(|_| {
                    CodegenError::internal(format!(
                        "jump to L{} spans {relative} bytes, beyond the i16 range",
                        fixup.label.0
                    ))
                })
            })
            .collect()
    }
}
