//! Local slot allocation for one function frame.
//!
//! Declarations and anonymous temporaries take consecutive slots and are
//! released in strict LIFO order. `Long` and `Double` values take two slots.
//!
//! ```text
//! slot 0      this / closure instance (when present)
//! slot 1..    parameters, in declaration order
//! slot n..    locals and temporaries, growing and shrinking with blocks
//! ```

use rustc_hash::FxHashMap;
use tessera_core::{CodegenError, MachineType, Result};
use tessera_tree::DeclId;

/// Where a declaration lives in the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalSlot {
    pub slot: u16,
    pub ty: MachineType,
    /// The slot holds a shared cell wrapping the value.
    pub shared: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    Declaration(DeclId),
    Temporary { slot: u16, width: u16 },
}

/// Position in the frame to return to with [`FrameMap::drop_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameMark {
    depth: usize,
    size: u16,
}

/// Maps declarations and temporaries of a function to local slots.
#[derive(Debug, Default)]
pub struct FrameMap {
    slots: FxHashMap<DeclId, LocalSlot>,
    entries: Vec<Entry>,
    current_size: u16,
    max_size: u16,
}

impl FrameMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve slots for a declaration and return the first one.
    pub fn enter(&mut self, decl: DeclId, ty: MachineType, shared: bool) -> u16 {
        // Shared variables hold a single reference to their cell.
        let width = if shared { 1 } else { ty.slot_width().max(1) };
        let slot = self.grow(width);
        self.slots.insert(decl, LocalSlot { slot, ty, shared });
        self.entries.push(Entry::Declaration(decl));
        slot
    }

    /// Release a declaration, which must be the most recent entry.
    pub fn leave(&mut self, decl: DeclId) -> Result<LocalSlot> {
        match self.entries.last() {
            Some(Entry::Declaration(top)) if *top == decl => {}
            other => {
                return Err(CodegenError::internal(format!(
                    "frame: leaving {decl:?} but the innermost entry is {other:?}"
                )));
            }
        }
        self.entries.pop();
        let local = self
            .slots
            .remove(&decl)
            .ok_or_else(|| CodegenError::internal(format!("frame: {decl:?} has no slot")))?;
        self.current_size = local.slot;
        Ok(local)
    }

    /// Reserve anonymous slots for a value of `ty`.
    pub fn enter_temp(&mut self, ty: MachineType) -> u16 {
        let width = ty.slot_width().max(1);
        let slot = self.grow(width);
        self.entries.push(Entry::Temporary { slot, width });
        slot
    }

    /// Release the most recent temporary, which must have the width of `ty`.
    pub fn leave_temp(&mut self, ty: MachineType) -> Result<()> {
        let width = ty.slot_width().max(1);
        match self.entries.last() {
            Some(Entry::Temporary { slot, width: w }) if *w == width => {
                self.current_size = *slot;
                self.entries.pop();
                Ok(())
            }
            other => Err(CodegenError::internal(format!(
                "frame: releasing a {width}-slot temporary but the innermost entry is {other:?}"
            ))),
        }
    }

    pub fn lookup(&self, decl: DeclId) -> Option<LocalSlot> {
        self.slots.get(&decl).copied()
    }

    pub fn mark(&self) -> FrameMark {
        FrameMark {
            depth: self.entries.len(),
            size: self.current_size,
        }
    }

    /// Release everything entered after `mark`.
    pub fn drop_to(&mut self, mark: FrameMark) -> Result<()> {
        if self.entries.len() < mark.depth {
            return Err(CodegenError::internal(
                "frame: mark is deeper than the current frame",
            ));
        }
        for entry in self.entries.drain(mark.depth..) {
            if let Entry::Declaration(decl) = entry {
                self.slots.remove(&decl);
            }
        }
        self.current_size = mark.size;
        Ok(())
    }

    pub fn current_size(&self) -> u16 {
        self.current_size
    }

    /// Largest frame size reached so far.
    pub fn max_size(&self) -> u16 {
        self.max_size
    }

    fn grow(&mut self, width: u16) -> u16 {
        let slot = self.current_size;
        self.current_size += width;
        self.max_size = self.max_size.max(self.current_size);
        slot
    }
}
