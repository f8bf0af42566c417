//! Stack of constructs that `break`, `continue` and `return` must cross.
//!
//! ```text
//! top ─► Try(#2)      finally replayed when jumping out of the try
//!        Loop(inner@)  target of break/continue
//!        Try(#1)
//!        Loop(outer@)
//! ```
//!
//! Every `finally` replayed by a jump is recorded as a gap on each try the
//! jump leaves, so their exception table entries exclude the replayed code.

use tessera_tree::TryExpr;

use crate::emit::Label;

#[derive(Debug, Clone)]
pub struct LoopBlock<'ast> {
    pub label: Option<&'ast str>,
    pub break_label: Label,
    pub continue_label: Label,
}

/// A `try` whose body or catch clauses are being compiled.
#[derive(Debug, Clone)]
pub struct TryBlock<'ast> {
    pub try_expr: &'ast TryExpr<'ast>,
    /// Start/end pairs of code emitted inside the try that it must not
    /// protect, in emission order.
    pub gaps: Vec<Label>,
}

impl<'ast> TryBlock<'ast> {
    pub fn new(try_expr: &'ast TryExpr<'ast>) -> Self {
        Self {
            try_expr,
            gaps: Vec::new(),
        }
    }

    pub fn has_finally(&self) -> bool {
        self.try_expr.finally.is_some()
    }

    /// Number of gap labels recorded so far.
    pub fn gap_mark(&self) -> usize {
        self.gaps.len()
    }

    /// Protected ranges of `start..end` with the gaps recorded since `mark`
    /// cut out, as `[start, gap0_start, gap0_end, ..., end]` read pairwise.
    pub fn ranges(&self, start: Label, end: Label, mark: usize) -> Vec<(Label, Label)> {
        let mut labels = Vec::with_capacity(self.gaps.len() - mark + 2);
        labels.push(start);
        labels.extend(self.gaps[mark..].iter().copied());
        labels.push(end);
        labels.chunks_exact(2).map(|pair| (pair[0], pair[1])).collect()
    }
}

#[derive(Debug, Clone)]
pub enum BlockElement<'ast> {
    Loop(LoopBlock<'ast>),
    Try(TryBlock<'ast>),
}

#[derive(Debug, Default)]
pub struct BlockStack<'ast> {
    elements: Vec<BlockElement<'ast>>,
}

impl<'ast> BlockStack<'ast> {
    pub fn new() -> Self {
        Self {
            elements: Vec::new(),
        }
    }

    pub fn push(&mut self, element: BlockElement<'ast>) {
        self.elements.push(element);
    }

    pub fn pop(&mut self) -> Option<BlockElement<'ast>> {
        self.elements.pop()
    }

    pub fn top(&self) -> Option<&BlockElement<'ast>> {
        self.elements.last()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Whether any enclosing `try` has a `finally` to replay.
    pub fn has_finally(&self) -> bool {
        self.elements
            .iter()
            .any(|e| matches!(e, BlockElement::Try(t) if t.has_finally()))
    }

    /// Record a gap on every enclosing `try`.
    pub fn add_gap(&mut self, start: Label, end: Label) {
        for element in &mut self.elements {
            if let BlockElement::Try(block) = element {
                block.gaps.extend([start, end]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tessera_tree::Expr;

    use super::*;
    use crate::emit::LabelTable;

    #[test]
    fn ranges_interleave_gaps() {
        let arena = bumpalo::Bump::new();
        let mut b = tessera_tree::TreeBuilder::new(&arena);
        let body = b.int(1);
        let Expr::Try(try_expr) = b.try_catch(body, &[], None, tessera_core::MachineType::INT) else {
            unreachable!()
        };

        let mut labels = LabelTable::new();
        let start = labels.new_label();
        let end = labels.new_label();
        let g0 = labels.new_label();
        let g1 = labels.new_label();

        let mut block = TryBlock::new(try_expr);
        assert_eq!(block.ranges(start, end, 0), vec![(start, end)]);
        block.gaps.extend([g0, g1]);
        assert_eq!(block.ranges(start, end, 0), vec![(start, g0), (g1, end)]);
        assert_eq!(block.ranges(start, end, 2), vec![(start, end)]);
        assert!(!block.has_finally());
    }

    #[test]
    fn finally_detection() {
        let mut labels = LabelTable::new();
        let mut stack = BlockStack::new();
        stack.push(BlockElement::Loop(LoopBlock {
            label: None,
            break_label: labels.new_label(),
            continue_label: labels.new_label(),
        }));
        assert!(!stack.has_finally());
        assert_eq!(stack.len(), 1);
    }
}
