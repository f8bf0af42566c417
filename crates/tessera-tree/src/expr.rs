//! Expression nodes of the resolved tree.
//!
//! The language is expression oriented: blocks, conditionals, `when`, `try`
//! and loops are all expressions, and a block's statements are expressions
//! evaluated for effect. Nodes are allocated in a `bumpalo` arena and refer to
//! their children by `&'ast` reference, so [`Expr`] itself is a small `Copy`
//! value.
//!
//! Nodes carry syntax only. Declarations, types, resolved calls and captures
//! live in [`crate::Bindings`], keyed by each node's [`NodeId`].

use tessera_core::Span;

use crate::{Literal, NodeId};

/// An expression.
#[derive(Debug, Clone, Copy)]
pub enum Expr<'ast> {
    /// Literal value
    Literal(&'ast LiteralExpr),
    /// Reference to a variable, field or property
    Name(&'ast NameExpr<'ast>),
    /// `this` or `this@Label`
    This(&'ast ThisExpr<'ast>),
    /// `{ ... }`, valued by its last statement
    Block(&'ast BlockExpr<'ast>),
    /// `val x = ...` / `var x = ...`
    VarDecl(&'ast VarDeclExpr<'ast>),
    /// `if (c) a else b`
    If(&'ast IfExpr<'ast>),
    /// `while (c) body`
    While(&'ast WhileExpr<'ast>),
    /// `do body while (c)`
    DoWhile(&'ast WhileExpr<'ast>),
    /// `for (x in range) body`
    For(&'ast ForExpr<'ast>),
    /// `break` / `break@label`
    Break(&'ast JumpExpr<'ast>),
    /// `continue` / `continue@label`
    Continue(&'ast JumpExpr<'ast>),
    /// `return` / `return@label value`
    Return(&'ast ReturnExpr<'ast>),
    /// `throw value`
    Throw(&'ast ThrowExpr<'ast>),
    /// `try { } catch (e: T) { } finally { }`
    Try(&'ast TryExpr<'ast>),
    /// `when (subject) { ... }`
    When(&'ast WhenExpr<'ast>),
    /// Binary operation
    Binary(&'ast BinaryExpr<'ast>),
    /// Prefix operation
    Unary(&'ast UnaryExpr<'ast>),
    /// Postfix operation
    Postfix(&'ast PostfixExpr<'ast>),
    /// Plain or compound assignment
    Assign(&'ast AssignExpr<'ast>),
    /// `f(args)`
    Call(&'ast CallExpr<'ast>),
    /// `receiver.selector` / `receiver?.selector`
    Qualified(&'ast QualifiedExpr<'ast>),
    /// `receiver[indices]`
    Index(&'ast IndexExpr<'ast>),
    /// `{ params -> body }` or `fun(params) { body }`
    Lambda(&'ast LambdaExpr<'ast>),
    /// `::name`
    CallableRef(&'ast CallableRefExpr<'ast>),
    /// `x is T` / `x !is T`
    Is(&'ast IsExpr<'ast>),
    /// `x as T` / `x as? T`
    Cast(&'ast CastExpr<'ast>),
    /// `"text ${expr} text"`
    StringTemplate(&'ast StringTemplateExpr<'ast>),
    /// `val (a, b) = initializer`
    MultiDecl(&'ast MultiDeclExpr<'ast>),
    /// `object : Base(args) { members }`
    ObjectLiteral(&'ast ObjectLiteralExpr<'ast>),
    /// `fun name(params) { body }` declared inside a body
    LocalFunction(&'ast LocalFunctionExpr<'ast>),
}

impl<'ast> Expr<'ast> {
    pub fn id(&self) -> NodeId {
        match self {
            Self::Literal(e) => e.id,
            Self::Name(e) => e.id,
            Self::This(e) => e.id,
            Self::Block(e) => e.id,
            Self::VarDecl(e) => e.id,
            Self::If(e) => e.id,
            Self::While(e) | Self::DoWhile(e) => e.id,
            Self::For(e) => e.id,
            Self::Break(e) | Self::Continue(e) => e.id,
            Self::Return(e) => e.id,
            Self::Throw(e) => e.id,
            Self::Try(e) => e.id,
            Self::When(e) => e.id,
            Self::Binary(e) => e.id,
            Self::Unary(e) => e.id,
            Self::Postfix(e) => e.id,
            Self::Assign(e) => e.id,
            Self::Call(e) => e.id,
            Self::Qualified(e) => e.id,
            Self::Index(e) => e.id,
            Self::Lambda(e) => e.id,
            Self::CallableRef(e) => e.id,
            Self::Is(e) => e.id,
            Self::Cast(e) => e.id,
            Self::StringTemplate(e) => e.id,
            Self::MultiDecl(e) => e.id,
            Self::ObjectLiteral(e) => e.id,
            Self::LocalFunction(e) => e.id,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Self::Literal(e) => e.span,
            Self::Name(e) => e.span,
            Self::This(e) => e.span,
            Self::Block(e) => e.span,
            Self::VarDecl(e) => e.span,
            Self::If(e) => e.span,
            Self::While(e) | Self::DoWhile(e) => e.span,
            Self::For(e) => e.span,
            Self::Break(e) | Self::Continue(e) => e.span,
            Self::Return(e) => e.span,
            Self::Throw(e) => e.span,
            Self::Try(e) => e.span,
            Self::When(e) => e.span,
            Self::Binary(e) => e.span,
            Self::Unary(e) => e.span,
            Self::Postfix(e) => e.span,
            Self::Assign(e) => e.span,
            Self::Call(e) => e.span,
            Self::Qualified(e) => e.span,
            Self::Index(e) => e.span,
            Self::Lambda(e) => e.span,
            Self::CallableRef(e) => e.span,
            Self::Is(e) => e.span,
            Self::Cast(e) => e.span,
            Self::StringTemplate(e) => e.span,
            Self::MultiDecl(e) => e.span,
            Self::ObjectLiteral(e) => e.span,
            Self::LocalFunction(e) => e.span,
        }
    }

    /// Short node kind name, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Literal(_) => "literal",
            Self::Name(_) => "name",
            Self::This(_) => "this",
            Self::Block(_) => "block",
            Self::VarDecl(_) => "variable declaration",
            Self::If(_) => "if",
            Self::While(_) => "while",
            Self::DoWhile(_) => "do-while",
            Self::For(_) => "for",
            Self::Break(_) => "break",
            Self::Continue(_) => "continue",
            Self::Return(_) => "return",
            Self::Throw(_) => "throw",
            Self::Try(_) => "try",
            Self::When(_) => "when",
            Self::Binary(_) => "binary operation",
            Self::Unary(_) => "unary operation",
            Self::Postfix(_) => "postfix operation",
            Self::Assign(_) => "assignment",
            Self::Call(_) => "call",
            Self::Qualified(_) => "qualified access",
            Self::Index(_) => "index",
            Self::Lambda(_) => "lambda",
            Self::CallableRef(_) => "callable reference",
            Self::Is(_) => "is",
            Self::Cast(_) => "cast",
            Self::StringTemplate(_) => "string template",
            Self::MultiDecl(_) => "multi-declaration",
            Self::ObjectLiteral(_) => "object literal",
            Self::LocalFunction(_) => "local function",
        }
    }

    /// Whether this expression is absent for code generation purposes:
    /// an empty block, or a block holding only empty blocks.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Block(block) => block.statements.iter().all(|s| s.is_empty()),
            _ => false,
        }
    }
}

/// A literal value.
#[derive(Debug, Clone, PartialEq)]
pub struct LiteralExpr {
    pub id: NodeId,
    pub value: Literal,
    pub span: Span,
}

/// A simple name.
#[derive(Debug, Clone, Copy)]
pub struct NameExpr<'ast> {
    pub id: NodeId,
    pub name: &'ast str,
    pub span: Span,
}

/// `this`, optionally qualified with a label.
#[derive(Debug, Clone, Copy)]
pub struct ThisExpr<'ast> {
    pub id: NodeId,
    pub label: Option<&'ast str>,
    pub span: Span,
}

/// A block of statements.
#[derive(Debug, Clone, Copy)]
pub struct BlockExpr<'ast> {
    pub id: NodeId,
    pub statements: &'ast [Expr<'ast>],
    pub span: Span,
}

/// Local variable declaration. The declared variable is the node's reference.
#[derive(Debug, Clone, Copy)]
pub struct VarDeclExpr<'ast> {
    pub id: NodeId,
    pub name: &'ast str,
    pub initializer: Option<Expr<'ast>>,
    pub span: Span,
}

/// Conditional. Either branch may be absent.
#[derive(Debug, Clone, Copy)]
pub struct IfExpr<'ast> {
    pub id: NodeId,
    pub condition: Expr<'ast>,
    pub then_branch: Option<Expr<'ast>>,
    pub else_branch: Option<Expr<'ast>>,
    pub span: Span,
}

/// `while` and `do-while` loops.
#[derive(Debug, Clone, Copy)]
pub struct WhileExpr<'ast> {
    pub id: NodeId,
    pub label: Option<&'ast str>,
    pub condition: Expr<'ast>,
    pub body: Expr<'ast>,
    pub span: Span,
}

/// `for` loop. The loop parameter is the node's reference.
#[derive(Debug, Clone, Copy)]
pub struct ForExpr<'ast> {
    pub id: NodeId,
    pub label: Option<&'ast str>,
    pub parameter: &'ast str,
    pub range: Expr<'ast>,
    pub body: Expr<'ast>,
    pub span: Span,
}

/// `break` or `continue`.
#[derive(Debug, Clone, Copy)]
pub struct JumpExpr<'ast> {
    pub id: NodeId,
    pub label: Option<&'ast str>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy)]
pub struct ReturnExpr<'ast> {
    pub id: NodeId,
    pub label: Option<&'ast str>,
    pub value: Option<Expr<'ast>>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy)]
pub struct ThrowExpr<'ast> {
    pub id: NodeId,
    pub value: Expr<'ast>,
    pub span: Span,
}

/// `try` with any number of catch clauses and an optional finally block.
#[derive(Debug, Clone, Copy)]
pub struct TryExpr<'ast> {
    pub id: NodeId,
    pub body: Expr<'ast>,
    pub catches: &'ast [CatchClause<'ast>],
    pub finally: Option<Expr<'ast>>,
    pub span: Span,
}

/// One catch clause. The exception parameter is the clause's reference.
#[derive(Debug, Clone, Copy)]
pub struct CatchClause<'ast> {
    pub id: NodeId,
    pub parameter: &'ast str,
    pub body: Expr<'ast>,
    pub span: Span,
}

/// Multi-way dispatch.
#[derive(Debug, Clone, Copy)]
pub struct WhenExpr<'ast> {
    pub id: NodeId,
    pub subject: Option<Expr<'ast>>,
    pub entries: &'ast [WhenEntry<'ast>],
    pub span: Span,
}

/// One `when` branch. An entry without conditions is the `else` branch.
#[derive(Debug, Clone, Copy)]
pub struct WhenEntry<'ast> {
    pub conditions: &'ast [WhenCondition<'ast>],
    pub body: Expr<'ast>,
    pub span: Span,
}

impl WhenEntry<'_> {
    pub fn is_else(&self) -> bool {
        self.conditions.is_empty()
    }
}

/// One comma-separated condition of a `when` entry.
#[derive(Debug, Clone, Copy)]
pub struct WhenCondition<'ast> {
    pub id: NodeId,
    pub kind: WhenConditionKind<'ast>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy)]
pub enum WhenConditionKind<'ast> {
    /// Equality with the subject, or a boolean condition without subject.
    Expression(Expr<'ast>),
    /// `is T` / `!is T`; the tested type is the condition's type operand.
    Is { negated: bool },
    /// `in range` / `!in range`.
    In { range: Expr<'ast>, negated: bool },
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    /// `&&`
    And,
    /// `||`
    Or,
    /// `==`
    Eq,
    /// `!=`
    NotEq,
    /// `===`
    Identity,
    /// `!==`
    NotIdentity,
    Lt,
    Le,
    Gt,
    Ge,
    /// `?:`
    Elvis,
    /// `..`
    RangeTo,
    In,
    NotIn,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(self, BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge)
    }

    pub fn is_equality(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::Identity | BinaryOp::NotIdentity
        )
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BinaryExpr<'ast> {
    pub id: NodeId,
    pub op: BinaryOp,
    pub left: Expr<'ast>,
    pub right: Expr<'ast>,
    pub span: Span,
}

/// Prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
    PreInc,
    PreDec,
}

#[derive(Debug, Clone, Copy)]
pub struct UnaryExpr<'ast> {
    pub id: NodeId,
    pub op: UnaryOp,
    pub operand: Expr<'ast>,
    pub span: Span,
}

/// Postfix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostfixOp {
    PostInc,
    PostDec,
    /// `!!`
    NotNull,
}

#[derive(Debug, Clone, Copy)]
pub struct PostfixExpr<'ast> {
    pub id: NodeId,
    pub op: PostfixOp,
    pub operand: Expr<'ast>,
    pub span: Span,
}

/// Assignment operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    RemAssign,
}

impl AssignOp {
    /// The arithmetic operator of a compound assignment.
    pub fn binary_op(self) -> Option<BinaryOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::AddAssign => Some(BinaryOp::Add),
            AssignOp::SubAssign => Some(BinaryOp::Sub),
            AssignOp::MulAssign => Some(BinaryOp::Mul),
            AssignOp::DivAssign => Some(BinaryOp::Div),
            AssignOp::RemAssign => Some(BinaryOp::Rem),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AssignExpr<'ast> {
    pub id: NodeId,
    pub op: AssignOp,
    pub target: Expr<'ast>,
    pub value: Expr<'ast>,
    pub span: Span,
}

/// A call. The callee and the argument mapping are in the resolved call
/// recorded for this node.
#[derive(Debug, Clone, Copy)]
pub struct CallExpr<'ast> {
    pub id: NodeId,
    pub callee: &'ast str,
    pub args: &'ast [Expr<'ast>],
    pub span: Span,
}

/// Member access. `selector` is a [`Expr::Name`] or [`Expr::Call`].
#[derive(Debug, Clone, Copy)]
pub struct QualifiedExpr<'ast> {
    pub id: NodeId,
    pub receiver: Expr<'ast>,
    pub selector: Expr<'ast>,
    pub safe: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Copy)]
pub struct IndexExpr<'ast> {
    pub id: NodeId,
    pub receiver: Expr<'ast>,
    pub indices: &'ast [Expr<'ast>],
    pub span: Span,
}

/// Lambda literals get unlabeled returns redirected to the enclosing named
/// function; anonymous functions return from themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LambdaKind {
    Literal,
    AnonymousFunction,
}

#[derive(Debug, Clone, Copy)]
pub struct LambdaExpr<'ast> {
    pub id: NodeId,
    pub label: Option<&'ast str>,
    pub kind: LambdaKind,
    pub body: Expr<'ast>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy)]
pub struct CallableRefExpr<'ast> {
    pub id: NodeId,
    pub name: &'ast str,
    pub span: Span,
}

/// Type test. The tested type is the node's type operand.
#[derive(Debug, Clone, Copy)]
pub struct IsExpr<'ast> {
    pub id: NodeId,
    pub operand: Expr<'ast>,
    pub negated: bool,
    pub span: Span,
}

/// Cast. The target type is the node's type operand.
#[derive(Debug, Clone, Copy)]
pub struct CastExpr<'ast> {
    pub id: NodeId,
    pub operand: Expr<'ast>,
    pub safe: bool,
    pub span: Span,
}

/// One piece of a string template.
#[derive(Debug, Clone, Copy)]
pub enum TemplateEntry<'ast> {
    /// Literal text, escapes already resolved.
    Text(&'ast str),
    /// `$name` or `${expr}`
    Expression(Expr<'ast>),
}

#[derive(Debug, Clone, Copy)]
pub struct StringTemplateExpr<'ast> {
    pub id: NodeId,
    pub entries: &'ast [TemplateEntry<'ast>],
    pub span: Span,
}

/// One variable of a multi-declaration. The declared variable is the
/// entry's reference and its `componentN` call is the entry's resolved call.
#[derive(Debug, Clone, Copy)]
pub struct MultiDeclEntry<'ast> {
    pub id: NodeId,
    pub name: &'ast str,
    pub span: Span,
}

#[derive(Debug, Clone, Copy)]
pub struct MultiDeclExpr<'ast> {
    pub id: NodeId,
    pub entries: &'ast [MultiDeclEntry<'ast>],
    pub initializer: Expr<'ast>,
    pub span: Span,
}

/// A member function of an object literal; the function is its reference.
#[derive(Debug, Clone, Copy)]
pub struct ObjectMember<'ast> {
    pub id: NodeId,
    pub body: Expr<'ast>,
    pub span: Span,
}

/// Anonymous class instance. Its class is the node's closure; a superclass
/// constructor call, if any, is the node's resolved call over `super_args`.
#[derive(Debug, Clone, Copy)]
pub struct ObjectLiteralExpr<'ast> {
    pub id: NodeId,
    pub super_args: &'ast [Expr<'ast>],
    pub members: &'ast [ObjectMember<'ast>],
    pub span: Span,
}

/// Local named function. It compiles to a closure like a lambda; the
/// variable holding the closure is the node's reference.
#[derive(Debug, Clone, Copy)]
pub struct LocalFunctionExpr<'ast> {
    pub id: NodeId,
    pub name: &'ast str,
    pub body: Expr<'ast>,
    pub span: Span,
}
