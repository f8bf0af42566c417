//! Per-function compilation state and the chain of enclosing scopes.
//!
//! A [`FunctionContext`] bundles everything one function body compilation
//! mutates: the frame map, the block stack, open block scopes and the line
//! cache. Closures are compiled with a fresh context whose [`ScopeRecord`]
//! links to the enclosing one, so implicit receivers and non-local return
//! targets are found by walking an explicit list:
//!
//! ```text
//! closure { return@outer 1 }   Closure(label: None, inlined)
//!        │ parent
//!        ▼
//! lambda outer@{ ... }         Closure(label: "outer", inlined)   ◄── target
//!        │ parent
//!        ▼
//! fun run()                    Function(label: "run")
//! ```

use std::cell::Cell;
use std::rc::Rc;

use tessera_core::{CodegenError, MachineType, Result, Span, TypeHash};
use tessera_tree::{Bindings, DeclId, FunctionInfo, LambdaKind};

use crate::blocks::BlockStack;
use crate::emit::Label;
use crate::frame::FrameMap;
use crate::options::CodegenOptions;
use crate::policy::CallPolicy;

/// Read-only inputs shared by every function compiled in one session.
#[derive(Clone, Copy)]
pub struct Session<'a> {
    pub bindings: &'a Bindings,
    pub options: &'a CodegenOptions,
    pub policy: &'a dyn CallPolicy,
}

/// Upper bound on scope chain walks.
pub const MAX_SCOPE_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Named function, method or constructor.
    Function,
    /// Body of a generated closure class.
    Closure {
        class: TypeHash,
        lambda: LambdaKind,
        /// Passed to an inline function, so returns may leave it.
        inlined: bool,
    },
}

/// One link of the enclosing-scope chain.
#[derive(Debug)]
pub struct ScopeRecord {
    pub kind: ScopeKind,
    pub function: DeclId,
    /// Label that `return@label` uses to target this scope.
    pub label: Option<String>,
    pub return_type: MachineType,
    /// Token carried by non-local returns targeting this scope.
    pub token: TypeHash,
    pub parent: Option<Rc<ScopeRecord>>,
    nlr_targeted: Cell<bool>,
}

impl ScopeRecord {
    pub fn function(function: DeclId, info: &FunctionInfo) -> Rc<Self> {
        Rc::new(Self {
            kind: ScopeKind::Function,
            function,
            label: Some(info.name.clone()),
            return_type: info.return_type,
            token: TypeHash::return_label(info.hash()),
            parent: None,
            nlr_targeted: Cell::new(false),
        })
    }

    pub fn closure(
        function: DeclId,
        info: &FunctionInfo,
        kind: ScopeKind,
        label: Option<&str>,
        parent: Rc<ScopeRecord>,
    ) -> Rc<Self> {
        Rc::new(Self {
            kind,
            function,
            label: label.map(str::to_string),
            return_type: info.return_type,
            token: TypeHash::return_label(info.hash()),
            parent: Some(parent),
            nlr_targeted: Cell::new(false),
        })
    }

    /// Closure class whose instance occupies slot 0.
    pub fn closure_class(&self) -> Option<TypeHash> {
        match self.kind {
            ScopeKind::Closure { class, .. } => Some(class),
            ScopeKind::Function => None,
        }
    }

    fn is_lambda_literal(&self) -> bool {
        matches!(
            self.kind,
            ScopeKind::Closure {
                lambda: LambdaKind::Literal,
                ..
            }
        )
    }

    /// Record that a non-local return targets this scope.
    pub fn mark_targeted(&self) {
        self.nlr_targeted.set(true);
    }

    /// Whether the epilogue must catch non-local returns carrying our token.
    pub fn is_targeted(&self) -> bool {
        self.nlr_targeted.get()
    }
}

/// Where a `return` transfers control.
#[derive(Debug, Clone)]
pub enum ReturnTarget {
    Local,
    NonLocal(Rc<ScopeRecord>),
}

/// Resolve the target of `return` or `return@label` issued in `scope`.
///
/// Unlabeled returns in lambda literals leave to the nearest enclosing
/// function; anonymous functions and named functions return locally.
/// Every scope left on the way must be a closure inlined into its parent.
pub fn resolve_return(
    scope: &Rc<ScopeRecord>,
    label: Option<&str>,
    inline_enabled: bool,
    span: Span,
) -> Result<ReturnTarget> {
    let is_target = |record: &ScopeRecord| match label {
        None => !record.is_lambda_literal(),
        Some(label) => record.label.as_deref() == Some(label),
    };
    if is_target(scope) {
        return Ok(ReturnTarget::Local);
    }
    if !has_ancestor(scope, &is_target) {
        return Err(CodegenError::UnresolvedLabel {
            what: format!("return@{}", label.unwrap_or_default()),
            span,
        });
    }

    let mut crossed = Rc::clone(scope);
    for _ in 0..MAX_SCOPE_DEPTH {
        match crossed.kind {
            ScopeKind::Closure { inlined: true, .. } if inline_enabled => {}
            ScopeKind::Closure { inlined: true, .. } => {
                return Err(CodegenError::NonLocalReturnWithoutInlining { span });
            }
            _ => {
                return Err(CodegenError::NonLocalReturnAcrossClosure {
                    label: label.unwrap_or_default().to_string(),
                    span,
                });
            }
        }
        let Some(parent) = crossed.parent.clone() else {
            return Err(CodegenError::UnresolvedLabel {
                what: format!("return@{}", label.unwrap_or_default()),
                span,
            });
        };
        if is_target(&parent) {
            return Ok(ReturnTarget::NonLocal(parent));
        }
        crossed = parent;
    }
    Err(CodegenError::internal(format!(
        "scope chain deeper than {MAX_SCOPE_DEPTH} while resolving a return"
    )))
}

fn has_ancestor(scope: &ScopeRecord, is_target: &impl Fn(&ScopeRecord) -> bool) -> bool {
    let mut current = scope.parent.as_deref();
    for _ in 0..MAX_SCOPE_DEPTH {
        match current {
            Some(record) if is_target(record) => return true,
            Some(record) => current = record.parent.as_deref(),
            None => return false,
        }
    }
    false
}

/// A local declared in an open block scope.
#[derive(Debug, Clone)]
pub struct ScopedLocal {
    pub decl: DeclId,
    pub name: String,
    pub ty: MachineType,
    pub slot: u16,
    pub shared: bool,
    pub start: Label,
}

/// Mutable state of one function body compilation.
#[derive(Debug)]
pub struct FunctionContext<'ast> {
    pub frame: FrameMap,
    pub blocks: BlockStack<'ast>,
    pub scope: Rc<ScopeRecord>,
    /// Class of the instance in slot 0.
    pub this_type: Option<TypeHash>,
    /// Slot and type of the extension receiver.
    pub receiver: Option<(u16, MachineType)>,
    /// Slots receiving the arguments, in parameter order.
    pub param_slots: Vec<(u16, MachineType)>,
    /// Start of the body, target of tail-recursive calls.
    pub start_label: Option<Label>,
    /// Locals of the open block scopes, innermost last.
    pub scopes: Vec<Vec<ScopedLocal>>,
    last_line: u32,
}

impl<'ast> FunctionContext<'ast> {
    pub fn new(scope: Rc<ScopeRecord>, this_type: Option<TypeHash>) -> Self {
        Self {
            frame: FrameMap::new(),
            blocks: BlockStack::new(),
            scope,
            this_type,
            receiver: None,
            param_slots: Vec::new(),
            start_label: None,
            scopes: vec![Vec::new()],
            last_line: 0,
        }
    }

    pub fn return_type(&self) -> MachineType {
        self.scope.return_type
    }

    pub fn function(&self) -> DeclId {
        self.scope.function
    }

    /// Whether `line` differs from the last marked one; records it if so.
    pub fn take_line(&mut self, line: u32) -> bool {
        if line == 0 || line == self.last_line {
            return false;
        }
        self.last_line = line;
        true
    }

    /// Forget the cached line, so the next statement marks its own.
    pub fn reset_line(&mut self) {
        self.last_line = 0;
    }
}
