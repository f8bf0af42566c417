//! The resolved tree consumed by the tessera code generator.
//!
//! A front end hands the generator two things: an arena-allocated [`Expr`]
//! tree per function body, and the [`Bindings`] tables that describe what the
//! front end resolved about each node (declarations, machine types, call
//! targets, closure captures, folded constants). [`TreeBuilder`] assembles
//! both together.

mod bindings;
mod builder;
mod decl;
mod expr;
mod ids;
mod literal;

pub use bindings::{
    Bindings, CaptureDescriptor, CapturedVariable, ClosureInfo, ClosureKind, IndexedAccess,
    LocalFunction, LoopRange, ResolvedArgument, ResolvedCall, ThisTarget, VarargElement,
};
pub use builder::{ConditionSpec, TreeBuilder};
pub use decl::{
    ClassInfo, Declaration, FieldInfo, FunctionFlags, FunctionInfo, ParamInfo, PropertyInfo,
    VariableInfo,
};
pub use expr::{
    AssignExpr, AssignOp, BinaryExpr, BinaryOp, BlockExpr, CallExpr, CallableRefExpr, CastExpr,
    CatchClause, Expr, ForExpr, IfExpr, IndexExpr, IsExpr, JumpExpr, LambdaExpr, LambdaKind,
    LiteralExpr, LocalFunctionExpr, MultiDeclEntry, MultiDeclExpr, NameExpr, ObjectLiteralExpr,
    ObjectMember, PostfixExpr, PostfixOp, QualifiedExpr, ReturnExpr, StringTemplateExpr,
    TemplateEntry, ThisExpr, ThrowExpr, TryExpr, UnaryExpr, UnaryOp, VarDeclExpr, WhenCondition,
    WhenConditionKind, WhenEntry, WhenExpr, WhileExpr,
};
pub use ids::{DeclId, NodeId};
pub use literal::Literal;

/// A function body to compile: the declaration and its body expression.
#[derive(Debug, Clone, Copy)]
pub struct FunctionBody<'ast> {
    pub decl: DeclId,
    pub body: Expr<'ast>,
}
