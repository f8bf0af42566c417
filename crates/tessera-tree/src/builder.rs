//! Programmatic construction of resolved trees.
//!
//! [`TreeBuilder`] allocates nodes in a `bumpalo` arena and records the
//! matching resolution data as it goes, so embedders without a front end
//! (and the test suites) can assemble well-formed input for the code
//! generator in a few lines.
//!
//! ```
//! use bumpalo::Bump;
//! use tessera_core::MachineType;
//! use tessera_tree::{BinaryOp, TreeBuilder};
//!
//! let arena = Bump::new();
//! let mut b = TreeBuilder::new(&arena);
//! let x = b.variable("x", MachineType::INT);
//! let one = b.int(1);
//! let decl = b.val(x, one);
//! let read = b.name(x);
//! let two = b.int(2);
//! let sum = b.binary(BinaryOp::Add, read, two, MachineType::INT);
//! let body = b.block(&[decl, sum]);
//! assert_eq!(b.bindings().type_of(body.id()), Some(MachineType::INT));
//! ```

use bumpalo::Bump;
use tessera_core::{MachineType, Span, TypeHash};

use crate::{
    AssignExpr, AssignOp, BinaryExpr, BinaryOp, Bindings, BlockExpr, CallExpr, CallableRefExpr,
    CaptureDescriptor, CastExpr, CatchClause, ClassInfo, ClosureInfo, ClosureKind, DeclId,
    Declaration, Expr, FieldInfo, ForExpr, FunctionFlags, FunctionInfo, IfExpr, IndexExpr,
    IsExpr, JumpExpr, LambdaExpr, LambdaKind, Literal, LiteralExpr, LocalFunction,
    LocalFunctionExpr, MultiDeclEntry, MultiDeclExpr, NameExpr, NodeId, ObjectLiteralExpr,
    ObjectMember, ParamInfo, PostfixExpr, PostfixOp, PropertyInfo, QualifiedExpr,
    ResolvedArgument, ResolvedCall, ReturnExpr, StringTemplateExpr, TemplateEntry, ThisExpr,
    ThisTarget, ThrowExpr, TryExpr, UnaryExpr, UnaryOp, VarDeclExpr, VariableInfo, WhenCondition,
    WhenConditionKind, WhenEntry, WhenExpr, WhileExpr,
};

/// Condition of a `when` entry, as accepted by [`TreeBuilder::when`].
#[derive(Debug, Clone, Copy)]
pub enum ConditionSpec<'ast> {
    /// Equality with the subject, or a boolean without subject.
    Value(Expr<'ast>),
    /// `is T` (or `!is T` when negated).
    Is(MachineType, bool),
    /// `in range` (or `!in range` when negated).
    In(Expr<'ast>, bool),
}

/// Builds tree nodes together with their [`Bindings`].
pub struct TreeBuilder<'ast> {
    arena: &'ast Bump,
    bindings: Bindings,
    next_node: u32,
    line: u32,
}

impl<'ast> TreeBuilder<'ast> {
    pub fn new(arena: &'ast Bump) -> Self {
        Self {
            arena,
            bindings: Bindings::new(),
            next_node: 0,
            line: 1,
        }
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    pub fn bindings_mut(&mut self) -> &mut Bindings {
        &mut self.bindings
    }

    pub fn finish(self) -> Bindings {
        self.bindings
    }

    /// Source line given to nodes created from now on.
    pub fn set_line(&mut self, line: u32) {
        self.line = line;
    }

    fn node(&mut self) -> (NodeId, Span) {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        (id, Span::new(self.line, 1, 1))
    }

    fn label(&self, label: Option<&str>) -> Option<&'ast str> {
        label.map(|l| &*self.arena.alloc_str(l))
    }

    fn typed(&mut self, expr: Expr<'ast>, ty: MachineType) -> Expr<'ast> {
        self.bindings.set_type(expr.id(), ty);
        expr
    }

    // ==========================================================================
    // Declarations
    // ==========================================================================

    pub fn variable(&mut self, name: &str, ty: MachineType) -> DeclId {
        self.bindings.declare(Declaration::Variable(VariableInfo {
            name: name.to_string(),
            ty,
            shared: false,
        }))
    }

    /// A variable captured and mutated by closures.
    pub fn shared_variable(&mut self, name: &str, ty: MachineType) -> DeclId {
        self.bindings.declare(Declaration::Variable(VariableInfo {
            name: name.to_string(),
            ty,
            shared: true,
        }))
    }

    pub fn class(&mut self, name: &str) -> TypeHash {
        let hash = TypeHash::from_name(name);
        self.bindings.declare(Declaration::Class(ClassInfo {
            hash,
            name: name.to_string(),
            outer: None,
        }));
        hash
    }

    /// Inner class holding its enclosing instance in `this$0`.
    pub fn inner_class(&mut self, name: &str, outer: TypeHash) -> TypeHash {
        let hash = TypeHash::from_name(name);
        self.bindings.declare(Declaration::Class(ClassInfo {
            hash,
            name: name.to_string(),
            outer: Some((outer, "this$0".to_string())),
        }));
        hash
    }

    pub fn field(&mut self, owner: TypeHash, name: &str, ty: MachineType) -> DeclId {
        self.bindings.declare(Declaration::Field(FieldInfo {
            owner,
            name: name.to_string(),
            ty,
            is_static: false,
        }))
    }

    pub fn static_field(&mut self, owner: TypeHash, name: &str, ty: MachineType) -> DeclId {
        self.bindings.declare(Declaration::Field(FieldInfo {
            owner,
            name: name.to_string(),
            ty,
            is_static: true,
        }))
    }

    pub fn property(&mut self, info: PropertyInfo) -> DeclId {
        self.bindings.declare(Declaration::Property(info))
    }

    /// Top-level function with the given parameters.
    pub fn function(
        &mut self,
        name: &str,
        params: &[(&str, MachineType)],
        return_type: MachineType,
    ) -> DeclId {
        let info = FunctionInfo::new(name, return_type);
        self.function_with(info, params)
    }

    /// Instance method of `owner`.
    pub fn method(
        &mut self,
        owner: TypeHash,
        name: &str,
        params: &[(&str, MachineType)],
        return_type: MachineType,
    ) -> DeclId {
        let mut info = FunctionInfo::new(name, return_type);
        info.owner = Some(owner);
        info.flags = FunctionFlags::empty();
        self.function_with(info, params)
    }

    /// Constructor of `owner`.
    pub fn constructor(&mut self, owner: TypeHash, params: &[(&str, MachineType)]) -> DeclId {
        let mut info = FunctionInfo::new("<init>", MachineType::Void);
        info.owner = Some(owner);
        info.flags = FunctionFlags::CONSTRUCTOR;
        self.function_with(info, params)
    }

    /// Declare `info` with freshly declared parameter variables.
    pub fn function_with(&mut self, mut info: FunctionInfo, params: &[(&str, MachineType)]) -> DeclId {
        for (name, ty) in params {
            let decl = self.variable(name, *ty);
            info.params.push(ParamInfo {
                decl,
                name: name.to_string(),
                ty: *ty,
                has_default: false,
                vararg: false,
            });
        }
        self.bindings.declare(Declaration::Function(info))
    }

    /// Edit a declared function in place.
    pub fn update_function(&mut self, function: DeclId, edit: impl FnOnce(&mut FunctionInfo)) {
        if let Some(info) = self.bindings.function_mut(function) {
            edit(info);
        }
    }

    /// Parameter variables of a function, in order.
    pub fn params(&self, function: DeclId) -> Vec<DeclId> {
        self.bindings
            .function(function)
            .map(|f| f.params.iter().map(|p| p.decl).collect())
            .unwrap_or_default()
    }

    fn declared_type(&self, decl: DeclId) -> MachineType {
        match self.bindings.declaration(decl) {
            Some(Declaration::Variable(v)) => v.ty,
            Some(Declaration::Field(f)) => f.ty,
            Some(Declaration::Property(p)) => p.ty,
            Some(Declaration::Function(f)) => f.return_type,
            Some(Declaration::Class(c)) => MachineType::Object(c.hash),
            None => MachineType::Void,
        }
    }

    // ==========================================================================
    // Leaves
    // ==========================================================================

    pub fn literal(&mut self, value: Literal, ty: MachineType) -> Expr<'ast> {
        let (id, span) = self.node();
        let expr = Expr::Literal(self.arena.alloc(LiteralExpr { id, value, span }));
        self.typed(expr, ty)
    }

    pub fn int(&mut self, value: i32) -> Expr<'ast> {
        self.literal(Literal::Int(value as i64), MachineType::INT)
    }

    pub fn long(&mut self, value: i64) -> Expr<'ast> {
        self.literal(Literal::Int(value), MachineType::LONG)
    }

    pub fn float(&mut self, value: f32) -> Expr<'ast> {
        self.literal(Literal::float(value as f64), MachineType::FLOAT)
    }

    pub fn double(&mut self, value: f64) -> Expr<'ast> {
        self.literal(Literal::float(value), MachineType::DOUBLE)
    }

    pub fn boolean(&mut self, value: bool) -> Expr<'ast> {
        self.literal(Literal::Bool(value), MachineType::BOOL)
    }

    pub fn char(&mut self, value: char) -> Expr<'ast> {
        self.literal(Literal::Char(value), MachineType::CHAR)
    }

    pub fn string(&mut self, value: &str) -> Expr<'ast> {
        self.literal(Literal::string(value), MachineType::STRING)
    }

    pub fn null(&mut self, ty: MachineType) -> Expr<'ast> {
        self.literal(Literal::Null, ty)
    }

    /// Reference to a variable, field or property.
    pub fn name(&mut self, decl: DeclId) -> Expr<'ast> {
        let (id, span) = self.node();
        let name = self
            .bindings
            .declaration(decl)
            .map(|d| &*self.arena.alloc_str(d.name()))
            .unwrap_or("");
        let expr = Expr::Name(self.arena.alloc(NameExpr { id, name, span }));
        self.bindings.set_reference(id, decl);
        let ty = self.declared_type(decl);
        self.typed(expr, ty)
    }

    /// `this` of `class`, possibly an enclosing instance.
    pub fn this(&mut self, class: TypeHash) -> Expr<'ast> {
        let (id, span) = self.node();
        let expr = Expr::This(self.arena.alloc(ThisExpr { id, label: None, span }));
        self.bindings.set_this_target(id, ThisTarget::Class(class));
        self.typed(expr, MachineType::Object(class))
    }

    /// The extension receiver of the enclosing extension function.
    pub fn receiver(&mut self, ty: MachineType) -> Expr<'ast> {
        let (id, span) = self.node();
        let expr = Expr::This(self.arena.alloc(ThisExpr { id, label: None, span }));
        self.bindings.set_this_target(id, ThisTarget::ExtensionReceiver);
        self.typed(expr, ty)
    }

    // ==========================================================================
    // Blocks and declarations
    // ==========================================================================

    /// Block typed by its last statement (void when empty or ending in a declaration).
    pub fn block(&mut self, statements: &[Expr<'ast>]) -> Expr<'ast> {
        let ty = match statements.last() {
            Some(Expr::VarDecl(_)) | None => MachineType::Void,
            Some(last) => self.bindings.type_of(last.id()).unwrap_or(MachineType::Void),
        };
        self.block_of(statements, ty)
    }

    pub fn block_of(&mut self, statements: &[Expr<'ast>], ty: MachineType) -> Expr<'ast> {
        let (id, span) = self.node();
        let statements = self.arena.alloc_slice_copy(statements);
        let expr = Expr::Block(self.arena.alloc(BlockExpr { id, statements, span }));
        self.typed(expr, ty)
    }

    /// Declaration of `decl` with an initializer.
    pub fn val(&mut self, decl: DeclId, initializer: Expr<'ast>) -> Expr<'ast> {
        self.declare_local(decl, Some(initializer))
    }

    pub fn declare_local(&mut self, decl: DeclId, initializer: Option<Expr<'ast>>) -> Expr<'ast> {
        let (id, span) = self.node();
        let name = self
            .bindings
            .declaration(decl)
            .map(|d| &*self.arena.alloc_str(d.name()))
            .unwrap_or("");
        let expr = Expr::VarDecl(self.arena.alloc(VarDeclExpr {
            id,
            name,
            initializer,
            span,
        }));
        self.bindings.set_reference(id, decl);
        self.typed(expr, MachineType::Void)
    }

    // ==========================================================================
    // Control flow
    // ==========================================================================

    pub fn if_expr(
        &mut self,
        condition: Expr<'ast>,
        then_branch: Option<Expr<'ast>>,
        else_branch: Option<Expr<'ast>>,
        ty: MachineType,
    ) -> Expr<'ast> {
        let (id, span) = self.node();
        let expr = Expr::If(self.arena.alloc(IfExpr {
            id,
            condition,
            then_branch,
            else_branch,
            span,
        }));
        self.typed(expr, ty)
    }

    pub fn if_then(&mut self, condition: Expr<'ast>, then_branch: Expr<'ast>) -> Expr<'ast> {
        self.if_expr(condition, Some(then_branch), None, MachineType::Void)
    }

    pub fn if_else(
        &mut self,
        condition: Expr<'ast>,
        then_branch: Expr<'ast>,
        else_branch: Expr<'ast>,
        ty: MachineType,
    ) -> Expr<'ast> {
        self.if_expr(condition, Some(then_branch), Some(else_branch), ty)
    }

    pub fn while_loop(&mut self, label: Option<&str>, condition: Expr<'ast>, body: Expr<'ast>) -> Expr<'ast> {
        let (id, span) = self.node();
        let label = self.label(label);
        let node = self.arena.alloc(WhileExpr {
            id,
            label,
            condition,
            body,
            span,
        });
        self.typed(Expr::While(node), MachineType::Void)
    }

    pub fn do_while(&mut self, label: Option<&str>, body: Expr<'ast>, condition: Expr<'ast>) -> Expr<'ast> {
        let (id, span) = self.node();
        let label = self.label(label);
        let node = self.arena.alloc(WhileExpr {
            id,
            label,
            condition,
            body,
            span,
        });
        self.typed(Expr::DoWhile(node), MachineType::Void)
    }

    pub fn for_loop(
        &mut self,
        label: Option<&str>,
        parameter: DeclId,
        range: Expr<'ast>,
        body: Expr<'ast>,
    ) -> Expr<'ast> {
        let (id, span) = self.node();
        let label = self.label(label);
        let name = self
            .bindings
            .declaration(parameter)
            .map(|d| &*self.arena.alloc_str(d.name()))
            .unwrap_or("");
        let node = self.arena.alloc(ForExpr {
            id,
            label,
            parameter: name,
            range,
            body,
            span,
        });
        self.bindings.set_reference(id, parameter);
        self.typed(Expr::For(node), MachineType::Void)
    }

    /// `from..to`
    pub fn range_to(&mut self, from: Expr<'ast>, to: Expr<'ast>) -> Expr<'ast> {
        self.binary(BinaryOp::RangeTo, from, to, MachineType::ANY)
    }

    pub fn break_loop(&mut self, label: Option<&str>) -> Expr<'ast> {
        let (id, span) = self.node();
        let label = self.label(label);
        let node = self.arena.alloc(JumpExpr { id, label, span });
        self.typed(Expr::Break(node), MachineType::Void)
    }

    pub fn continue_loop(&mut self, label: Option<&str>) -> Expr<'ast> {
        let (id, span) = self.node();
        let label = self.label(label);
        let node = self.arena.alloc(JumpExpr { id, label, span });
        self.typed(Expr::Continue(node), MachineType::Void)
    }

    pub fn ret(&mut self, value: Option<Expr<'ast>>) -> Expr<'ast> {
        self.ret_at(None, value)
    }

    pub fn ret_at(&mut self, label: Option<&str>, value: Option<Expr<'ast>>) -> Expr<'ast> {
        let (id, span) = self.node();
        let label = self.label(label);
        let node = self.arena.alloc(ReturnExpr { id, label, value, span });
        self.typed(Expr::Return(node), MachineType::Void)
    }

    pub fn throw(&mut self, value: Expr<'ast>) -> Expr<'ast> {
        let (id, span) = self.node();
        let node = self.arena.alloc(ThrowExpr { id, value, span });
        self.typed(Expr::Throw(node), MachineType::Void)
    }

    /// `try` with `(parameter, body)` catch clauses.
    pub fn try_catch(
        &mut self,
        body: Expr<'ast>,
        catches: &[(DeclId, Expr<'ast>)],
        finally: Option<Expr<'ast>>,
        ty: MachineType,
    ) -> Expr<'ast> {
        let mut clauses = Vec::with_capacity(catches.len());
        for (parameter, clause_body) in catches {
            let (id, span) = self.node();
            let name = self
                .bindings
                .declaration(*parameter)
                .map(|d| &*self.arena.alloc_str(d.name()))
                .unwrap_or("");
            self.bindings.set_reference(id, *parameter);
            clauses.push(CatchClause {
                id,
                parameter: name,
                body: *clause_body,
                span,
            });
        }
        let (id, span) = self.node();
        let catches = self.arena.alloc_slice_copy(&clauses);
        let node = self.arena.alloc(TryExpr {
            id,
            body,
            catches,
            finally,
            span,
        });
        self.typed(Expr::Try(node), ty)
    }

    /// `when`; entries with no conditions are `else` branches.
    pub fn when(
        &mut self,
        subject: Option<Expr<'ast>>,
        entries: &[(&[ConditionSpec<'ast>], Expr<'ast>)],
        ty: MachineType,
    ) -> Expr<'ast> {
        let mut built = Vec::with_capacity(entries.len());
        for (conditions, body) in entries {
            let mut conds = Vec::with_capacity(conditions.len());
            for condition in conditions.iter() {
                let (id, span) = self.node();
                let kind = match *condition {
                    ConditionSpec::Value(expr) => WhenConditionKind::Expression(expr),
                    ConditionSpec::Is(tested, negated) => {
                        self.bindings.set_type_operand(id, tested);
                        WhenConditionKind::Is { negated }
                    }
                    ConditionSpec::In(range, negated) => WhenConditionKind::In { range, negated },
                };
                conds.push(WhenCondition { id, kind, span });
            }
            let span = Span::new(self.line, 1, 1);
            built.push(WhenEntry {
                conditions: self.arena.alloc_slice_copy(&conds),
                body: *body,
                span,
            });
        }
        let (id, span) = self.node();
        let entries = self.arena.alloc_slice_copy(&built);
        let node = self.arena.alloc(WhenExpr {
            id,
            subject,
            entries,
            span,
        });
        self.typed(Expr::When(node), ty)
    }

    // ==========================================================================
    // Operators
    // ==========================================================================

    pub fn binary(&mut self, op: BinaryOp, left: Expr<'ast>, right: Expr<'ast>, ty: MachineType) -> Expr<'ast> {
        let (id, span) = self.node();
        let node = self.arena.alloc(BinaryExpr {
            id,
            op,
            left,
            right,
            span,
        });
        self.typed(Expr::Binary(node), ty)
    }

    /// Comparison, equality, `&&`, `||` or `in`, typed as boolean.
    pub fn compare(&mut self, op: BinaryOp, left: Expr<'ast>, right: Expr<'ast>) -> Expr<'ast> {
        self.binary(op, left, right, MachineType::BOOL)
    }

    pub fn unary(&mut self, op: UnaryOp, operand: Expr<'ast>, ty: MachineType) -> Expr<'ast> {
        let (id, span) = self.node();
        let node = self.arena.alloc(UnaryExpr { id, op, operand, span });
        self.typed(Expr::Unary(node), ty)
    }

    pub fn not(&mut self, operand: Expr<'ast>) -> Expr<'ast> {
        self.unary(UnaryOp::Not, operand, MachineType::BOOL)
    }

    pub fn postfix(&mut self, op: PostfixOp, operand: Expr<'ast>, ty: MachineType) -> Expr<'ast> {
        let (id, span) = self.node();
        let node = self.arena.alloc(PostfixExpr { id, op, operand, span });
        self.typed(Expr::Postfix(node), ty)
    }

    pub fn assign(&mut self, target: Expr<'ast>, value: Expr<'ast>) -> Expr<'ast> {
        self.assign_op(AssignOp::Assign, target, value)
    }

    pub fn assign_op(&mut self, op: AssignOp, target: Expr<'ast>, value: Expr<'ast>) -> Expr<'ast> {
        let (id, span) = self.node();
        let node = self.arena.alloc(AssignExpr {
            id,
            op,
            target,
            value,
            span,
        });
        self.typed(Expr::Assign(node), MachineType::Void)
    }

    pub fn is_type(&mut self, operand: Expr<'ast>, tested: MachineType, negated: bool) -> Expr<'ast> {
        let (id, span) = self.node();
        let node = self.arena.alloc(IsExpr {
            id,
            operand,
            negated,
            span,
        });
        self.bindings.set_type_operand(id, tested);
        self.typed(Expr::Is(node), MachineType::BOOL)
    }

    pub fn cast(&mut self, operand: Expr<'ast>, target: MachineType, safe: bool) -> Expr<'ast> {
        let (id, span) = self.node();
        let node = self.arena.alloc(CastExpr {
            id,
            operand,
            safe,
            span,
        });
        self.bindings.set_type_operand(id, target);
        self.typed(Expr::Cast(node), target)
    }

    // ==========================================================================
    // Calls and member access
    // ==========================================================================

    /// Call binding each argument to the parameter at the same position.
    pub fn call(&mut self, function: DeclId, args: &[Expr<'ast>]) -> Expr<'ast> {
        let arguments = (0..args.len()).map(ResolvedArgument::Expression).collect();
        self.call_resolved(function, args, arguments, false)
    }

    pub fn call_resolved(
        &mut self,
        function: DeclId,
        args: &[Expr<'ast>],
        arguments: Vec<ResolvedArgument>,
        is_super: bool,
    ) -> Expr<'ast> {
        let (id, span) = self.node();
        let (callee, ty) = match self.bindings.function(function) {
            Some(info) => {
                let ty = match info.owner {
                    Some(owner) if info.is_constructor() => MachineType::Object(owner),
                    _ => info.return_type,
                };
                (&*self.arena.alloc_str(&info.name), ty)
            }
            None => ("", MachineType::Void),
        };
        let args = self.arena.alloc_slice_copy(args);
        let node = self.arena.alloc(CallExpr {
            id,
            callee,
            args,
            span,
        });
        self.bindings.set_call(
            id,
            ResolvedCall {
                callee: function,
                arguments,
                is_super,
            },
        );
        self.typed(Expr::Call(node), ty)
    }

    /// `receiver.selector`, typed like the selector.
    pub fn member(&mut self, receiver: Expr<'ast>, selector: Expr<'ast>) -> Expr<'ast> {
        self.qualified(receiver, selector, false)
    }

    /// `receiver?.selector`.
    pub fn safe_member(&mut self, receiver: Expr<'ast>, selector: Expr<'ast>) -> Expr<'ast> {
        self.qualified(receiver, selector, true)
    }

    fn qualified(&mut self, receiver: Expr<'ast>, selector: Expr<'ast>, safe: bool) -> Expr<'ast> {
        let (id, span) = self.node();
        let node = self.arena.alloc(QualifiedExpr {
            id,
            receiver,
            selector,
            safe,
            span,
        });
        let ty = self.bindings.type_of(selector.id()).unwrap_or(MachineType::Void);
        let ty = match ty {
            MachineType::Primitive(kind) if safe => MachineType::Object(kind.boxed_type()),
            other => other,
        };
        self.typed(Expr::Qualified(node), ty)
    }

    pub fn index(&mut self, receiver: Expr<'ast>, indices: &[Expr<'ast>], ty: MachineType) -> Expr<'ast> {
        let (id, span) = self.node();
        let indices = self.arena.alloc_slice_copy(indices);
        let node = self.arena.alloc(IndexExpr {
            id,
            receiver,
            indices,
            span,
        });
        self.typed(Expr::Index(node), ty)
    }

    /// Lambda literal compiled into closure class `class`.
    pub fn lambda(
        &mut self,
        function: DeclId,
        body: Expr<'ast>,
        class: TypeHash,
        captures: CaptureDescriptor,
        inlined: bool,
    ) -> Expr<'ast> {
        self.lambda_with(function, body, class, captures, inlined, None, LambdaKind::Literal)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn lambda_with(
        &mut self,
        function: DeclId,
        body: Expr<'ast>,
        class: TypeHash,
        captures: CaptureDescriptor,
        inlined: bool,
        label: Option<&str>,
        kind: LambdaKind,
    ) -> Expr<'ast> {
        let (id, span) = self.node();
        let label = self.label(label);
        let node = self.arena.alloc(LambdaExpr {
            id,
            label,
            kind,
            body,
            span,
        });
        self.bindings.set_closure(
            id,
            ClosureInfo {
                class,
                kind: ClosureKind::Lambda {
                    function,
                    inlined,
                    sam_interface: None,
                },
            },
        );
        self.bindings.set_captures(class, captures);
        self.typed(Expr::Lambda(node), MachineType::Object(class))
    }

    /// `::target` for a function or property, in closure class `class`.
    pub fn callable_ref(&mut self, kind: ClosureKind, class: TypeHash) -> Expr<'ast> {
        let (id, span) = self.node();
        let target = match &kind {
            ClosureKind::FunctionReference { target } => Some(*target),
            ClosureKind::PropertyReference { property } => Some(*property),
            ClosureKind::Lambda { .. } | ClosureKind::ObjectLiteral => None,
        };
        let name = target
            .and_then(|t| self.bindings.declaration(t))
            .map(|d| &*self.arena.alloc_str(d.name()))
            .unwrap_or("");
        let node = self.arena.alloc(CallableRefExpr { id, name, span });
        self.bindings.set_closure(id, ClosureInfo { class, kind });
        self.bindings.set_captures(class, CaptureDescriptor::default());
        self.typed(Expr::CallableRef(node), MachineType::Object(class))
    }

    // ==========================================================================
    // Templates, destructuring and local declarations
    // ==========================================================================

    /// Literal text piece of a string template.
    pub fn text(&self, text: &str) -> TemplateEntry<'ast> {
        TemplateEntry::Text(self.arena.alloc_str(text))
    }

    pub fn template(&mut self, entries: &[TemplateEntry<'ast>]) -> Expr<'ast> {
        let (id, span) = self.node();
        let entries = self.arena.alloc_slice_copy(entries);
        let node = self.arena.alloc(StringTemplateExpr { id, entries, span });
        self.typed(Expr::StringTemplate(node), MachineType::STRING)
    }

    /// `val (a, b, ...) = initializer`. Each pair is a declared variable and
    /// the `componentN` function producing it.
    pub fn multi_decl(&mut self, components: &[(DeclId, DeclId)], initializer: Expr<'ast>) -> Expr<'ast> {
        let mut entries = Vec::with_capacity(components.len());
        for &(variable, component) in components {
            let (id, span) = self.node();
            let name = self
                .bindings
                .declaration(variable)
                .map(|d| &*self.arena.alloc_str(d.name()))
                .unwrap_or("");
            self.bindings.set_reference(id, variable);
            self.bindings.set_call(
                id,
                ResolvedCall {
                    callee: component,
                    arguments: Vec::new(),
                    is_super: false,
                },
            );
            entries.push(MultiDeclEntry { id, name, span });
        }
        let (id, span) = self.node();
        let entries = self.arena.alloc_slice_copy(&entries);
        let node = self.arena.alloc(MultiDeclExpr {
            id,
            entries,
            initializer,
            span,
        });
        self.typed(Expr::MultiDecl(node), MachineType::Void)
    }

    /// Object literal compiled into class `class`.
    ///
    /// `super_call` is the superclass constructor with its arguments, bound
    /// positionally; `members` pairs each member function with its body.
    pub fn object_literal(
        &mut self,
        class: TypeHash,
        captures: CaptureDescriptor,
        super_call: Option<(DeclId, &[Expr<'ast>])>,
        members: &[(DeclId, Expr<'ast>)],
    ) -> Expr<'ast> {
        let mut nodes = Vec::with_capacity(members.len());
        for &(function, body) in members {
            let (id, span) = self.node();
            self.bindings.set_reference(id, function);
            nodes.push(ObjectMember { id, body, span });
        }
        let (id, span) = self.node();
        let super_args: &[Expr<'ast>] = match super_call {
            Some((constructor, args)) => {
                self.bindings.set_call(
                    id,
                    ResolvedCall {
                        callee: constructor,
                        arguments: (0..args.len()).map(ResolvedArgument::Expression).collect(),
                        is_super: true,
                    },
                );
                self.arena.alloc_slice_copy(args)
            }
            None => &[],
        };
        let members = self.arena.alloc_slice_copy(&nodes);
        let node = self.arena.alloc(ObjectLiteralExpr {
            id,
            super_args,
            members,
            span,
        });
        self.bindings.set_closure(
            id,
            ClosureInfo {
                class,
                kind: ClosureKind::ObjectLiteral,
            },
        );
        self.bindings.set_captures(class, captures);
        self.typed(Expr::ObjectLiteral(node), MachineType::Object(class))
    }

    /// Local function `function`, compiled into closure class `class` and
    /// held in `variable`.
    pub fn local_function(
        &mut self,
        function: DeclId,
        variable: DeclId,
        body: Expr<'ast>,
        class: TypeHash,
        captures: CaptureDescriptor,
    ) -> Expr<'ast> {
        let (id, span) = self.node();
        let name = self
            .bindings
            .function(function)
            .map(|f| &*self.arena.alloc_str(&f.name))
            .unwrap_or("");
        let node = self.arena.alloc(LocalFunctionExpr {
            id,
            name,
            body,
            span,
        });
        self.bindings.set_reference(id, variable);
        self.bindings.set_closure(
            id,
            ClosureInfo {
                class,
                kind: ClosureKind::Lambda {
                    function,
                    inlined: false,
                    sam_interface: None,
                },
            },
        );
        self.bindings.set_captures(class, captures);
        self.bindings
            .set_local_function(function, LocalFunction { class, variable });
        self.typed(Expr::LocalFunction(node), MachineType::Void)
    }
}
