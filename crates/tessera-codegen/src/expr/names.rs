//! Names, `this` and implicit receivers.
//!
//! A name resolves to one of:
//!
//! ```text
//! local in the frame            Local / SharedLocal
//! captured by this closure      Field `$name` of the closure in slot 0
//! field                         Field on the implicit `this`
//! property                      Property on the implicit `this`
//! ```
//!
//! Implicit `this` may live several classes out: a lambda in a method of an
//! inner class reaches the outer instance through `this$0` of the closure,
//! then the outer link of the inner class.

use tessera_core::{CodegenError, MachineType, Span, TypeHash};
use tessera_tree::{
    CapturedVariable, DeclId, Declaration, FieldInfo, NameExpr, PropertyInfo, ThisExpr, ThisTarget,
};

use super::{ExprCompiler, Result, missing};
use crate::bytecode::{MemberRef, OpCode};
use crate::context::MAX_SCOPE_DEPTH;
use crate::value::{FieldValue, LazyValue, Operation, PropertyValue};

/// Field of a closure class holding its enclosing instance.
pub(crate) const CAPTURED_THIS: &str = "this$0";
/// Field of a closure class holding the enclosing extension receiver.
pub(crate) const CAPTURED_RECEIVER: &str = "receiver$0";

/// Field name of a captured variable.
pub(crate) fn captured_field_name(name: &str) -> String {
    format!("${name}")
}

/// Compile a name expression.
pub fn compile_name<'ast>(
    compiler: &mut ExprCompiler<'_, 'ast>,
    name: &'ast NameExpr<'ast>,
) -> Result<LazyValue<'ast>> {
    let decl = compiler.reference(name.id, name.span)?;
    match compiler.bindings().declaration(decl) {
        Some(Declaration::Variable(_)) => compiler.variable_value(decl, name.span),
        Some(Declaration::Field(field)) => {
            let receiver = compiler.implicit_receiver(field.is_static, field.owner, name.span)?;
            Ok(field_value(field, receiver))
        }
        Some(Declaration::Property(property)) => {
            let receiver =
                compiler.implicit_receiver(property.is_static, property.owner, name.span)?;
            compiler.property_value(property, receiver, name.span)
        }
        Some(other) => Err(CodegenError::unsupported(
            format!("`{}` used as a value", other.name()),
            name.span,
        )),
        None => Err(missing("declaration", name.id, name.span)),
    }
}

/// Compile `this` or the extension receiver.
pub fn compile_this<'ast>(
    compiler: &mut ExprCompiler<'_, 'ast>,
    this: &'ast ThisExpr<'ast>,
) -> Result<LazyValue<'ast>> {
    match compiler.bindings().this_target(this.id) {
        Some(ThisTarget::Class(class)) => compiler.this_value(class, this.span),
        Some(ThisTarget::ExtensionReceiver) => compiler.receiver_value(this.span),
        None => Err(missing("`this` target", this.id, this.span)),
    }
}

/// Value of `field` read through `receiver`.
pub(crate) fn field_value<'ast>(field: &FieldInfo, receiver: LazyValue<'ast>) -> LazyValue<'ast> {
    LazyValue::Field(Box::new(FieldValue {
        field: MemberRef::field(field.owner, &field.name),
        ty: field.ty,
        is_static: field.is_static,
        shared: false,
        receiver,
    }))
}

/// Captured variable `decl` and the closure class declaring its field.
fn find_captured(
    compiler: &ExprCompiler<'_, '_>,
    class: TypeHash,
    decl: DeclId,
) -> Option<(TypeHash, CapturedVariable)> {
    let mut current = Some(class);
    for _ in 0..MAX_SCOPE_DEPTH {
        let owner = current?;
        let captures = compiler.bindings().captures(owner)?;
        if let Some(variable) = captures.variables.iter().find(|v| v.decl == decl) {
            return Some((owner, variable.clone()));
        }
        current = captures.superclass;
    }
    None
}

impl<'a, 'ast> ExprCompiler<'a, 'ast> {
    /// Value of the variable `decl` as seen from the current body.
    pub(crate) fn variable_value(&self, decl: DeclId, span: Span) -> Result<LazyValue<'ast>> {
        if let Some(local) = self.ctx.frame.lookup(decl) {
            return Ok(if local.shared {
                LazyValue::SharedLocal {
                    slot: local.slot,
                    ty: local.ty,
                }
            } else {
                LazyValue::local(local.slot, local.ty)
            });
        }

        if let Some(class) = self.ctx.scope.closure_class()
            && let Some((owner, captured)) = find_captured(self, class, decl)
        {
            return Ok(LazyValue::Field(Box::new(FieldValue {
                field: MemberRef::field(owner, &captured_field_name(&captured.name)),
                ty: captured.ty,
                is_static: false,
                shared: captured.shared,
                receiver: LazyValue::local(0, MachineType::Object(class)),
            })));
        }

        let name = self
            .bindings()
            .variable(decl)
            .map_or_else(|| format!("#{}", decl.0), |v| v.name.clone());
        Err(CodegenError::internal(format!(
            "variable `{name}` has no slot and is not captured"
        ))
        .at(span))
    }

    /// Receiver of a member used without one: nothing for statics, else `this`.
    pub(crate) fn implicit_receiver(
        &self,
        is_static: bool,
        owner: TypeHash,
        span: Span,
    ) -> Result<LazyValue<'ast>> {
        if is_static {
            Ok(LazyValue::None)
        } else {
            self.this_value(owner, span)
        }
    }

    /// The instance of `target` reachable from the current body.
    ///
    /// Starts at slot 0 and follows captured `this$0` fields of closures and
    /// outer links of inner classes until an instance of `target` is found.
    pub(crate) fn this_value(&self, target: TypeHash, span: Span) -> Result<LazyValue<'ast>> {
        let Some(start) = self.ctx.this_type else {
            return Err(CodegenError::unsupported("`this` in a static context", span));
        };

        let mut path: Vec<MemberRef> = Vec::new();
        let mut current = start;
        for _ in 0..MAX_SCOPE_DEPTH {
            if current == target {
                if path.is_empty() {
                    return Ok(LazyValue::local(0, MachineType::Object(target)));
                }
                return Ok(LazyValue::Operation(Operation::new(
                    MachineType::Object(target),
                    move |sink| {
                        sink.emit_get_local(0);
                        for field in &path {
                            sink.emit_field_op(OpCode::GetField, field.clone());
                        }
                    },
                )));
            }

            let (field, next) = if let Some((owner, outer)) = self.captured_this(current) {
                (MemberRef::field(owner, CAPTURED_THIS), outer)
            } else if let Some((outer, name)) =
                self.bindings().class(current).and_then(|c| c.outer.as_ref())
            {
                (MemberRef::field(current, name), *outer)
            } else {
                return Err(CodegenError::unsupported(
                    format!("no enclosing instance of {target} reachable from {start}"),
                    span,
                ));
            };
            path.push(field);
            current = next;
        }
        Err(CodegenError::internal(format!(
            "enclosing instance chain deeper than {MAX_SCOPE_DEPTH}"
        )))
    }

    /// Closure class declaring the captured `this` of `class`, and its type.
    fn captured_this(&self, class: TypeHash) -> Option<(TypeHash, TypeHash)> {
        let mut current = Some(class);
        for _ in 0..MAX_SCOPE_DEPTH {
            let owner = current?;
            let captures = self.bindings().captures(owner)?;
            if let Some(outer) = captures.this {
                return Some((owner, outer));
            }
            current = captures.superclass;
        }
        None
    }

    /// The extension receiver of the current body, or of the enclosing one
    /// captured by the current closure.
    pub(crate) fn receiver_value(&self, span: Span) -> Result<LazyValue<'ast>> {
        if let Some((slot, ty)) = self.ctx.receiver {
            return Ok(LazyValue::local(slot, ty));
        }
        if let Some(class) = self.ctx.scope.closure_class() {
            let mut current = Some(class);
            for _ in 0..MAX_SCOPE_DEPTH {
                let Some(owner) = current else { break };
                let Some(captures) = self.bindings().captures(owner) else { break };
                if let Some(ty) = captures.receiver {
                    return Ok(LazyValue::Field(Box::new(FieldValue {
                        field: MemberRef::field(owner, CAPTURED_RECEIVER),
                        ty,
                        is_static: false,
                        shared: false,
                        receiver: LazyValue::local(0, MachineType::Object(class)),
                    })));
                }
                current = captures.superclass;
            }
        }
        Err(CodegenError::unsupported("extension receiver outside of an extension", span))
    }

    /// Value of `property` read and written through its accessors.
    pub(crate) fn property_value(
        &self,
        property: &PropertyInfo,
        receiver: LazyValue<'ast>,
        span: Span,
    ) -> Result<LazyValue<'ast>> {
        let getter = property
            .getter
            .map(|decl| self.accessor(decl, span))
            .transpose()?;
        let setter = property
            .setter
            .map(|decl| self.accessor(decl, span))
            .transpose()?;
        let backing_field = match property.backing_field {
            Some(decl) => {
                let field = self.bindings().field(decl).ok_or_else(|| {
                    CodegenError::MissingResolution {
                        what: "backing field",
                        node: decl.0,
                        span,
                    }
                })?;
                Some(MemberRef::field(field.owner, &field.name))
            }
            None => None,
        };
        Ok(LazyValue::Property(Box::new(PropertyValue {
            getter,
            setter,
            backing_field,
            ty: property.ty,
            is_static: property.is_static,
            receiver,
            args: Vec::new(),
        })))
    }
}
