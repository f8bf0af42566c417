//! Qualified access `a.b`, safe access `a?.b` and indexing `a[i]`.

use tessera_core::{CodegenError, MachineType, Result};
use tessera_tree::{Declaration, Expr, IndexExpr, QualifiedExpr};

use super::names::field_value;
use super::{ExprCompiler, calls, missing};
use crate::value::{ArrayElementValue, Composite, LazyValue, PropertyValue};

/// Compile `receiver.selector` or `receiver?.selector`.
pub fn compile_qualified<'ast>(
    compiler: &mut ExprCompiler<'_, 'ast>,
    qualified: &'ast QualifiedExpr<'ast>,
) -> Result<LazyValue<'ast>> {
    let receiver = compiler.lazy(qualified.receiver)?;
    if !qualified.safe {
        return compile_selector(compiler, qualified.selector, receiver);
    }

    let if_null = compiler.sink.new_label();
    let guarded = LazyValue::composite(Composite::SafeReceiver { receiver, if_null });
    let inner = compile_selector(compiler, qualified.selector, guarded)?;
    Ok(LazyValue::composite(Composite::SafeFallback { inner, if_null }))
}

/// Apply `selector` to an already described receiver.
fn compile_selector<'ast>(
    compiler: &mut ExprCompiler<'_, 'ast>,
    selector: Expr<'ast>,
    receiver: LazyValue<'ast>,
) -> Result<LazyValue<'ast>> {
    match selector {
        Expr::Name(name) => {
            let decl = compiler.reference(name.id, name.span)?;
            match compiler.bindings().declaration(decl) {
                Some(Declaration::Field(field)) if field.is_static => {
                    // Static member reached through an instance.
                    compiler.put(&receiver, MachineType::Void)?;
                    Ok(field_value(field, LazyValue::None))
                }
                Some(Declaration::Field(field)) => Ok(field_value(field, receiver)),
                Some(Declaration::Property(property)) => {
                    compiler.property_value(property, receiver, name.span)
                }
                Some(other) => Err(CodegenError::unsupported(
                    format!("member access to {}", other.name()),
                    name.span,
                )),
                None => Err(missing("member declaration", name.id, name.span)),
            }
        }
        Expr::Call(call) => calls::compile_call(compiler, call, Some(receiver)),
        other => Err(CodegenError::unsupported(
            format!("{} as a member selector", other.kind_name()),
            other.span(),
        )),
    }
}

/// Compile `receiver[indices]`.
///
/// Arrays are indexed directly; anything else goes through the resolved
/// `get`/`set` operator functions.
pub fn compile_index<'ast>(
    compiler: &mut ExprCompiler<'_, 'ast>,
    index: &'ast IndexExpr<'ast>,
) -> Result<LazyValue<'ast>> {
    let receiver_type = compiler.type_of(index.receiver)?;
    let ty = compiler.type_of(Expr::Index(index))?;
    let receiver = compiler.lazy(index.receiver)?;

    if let Some(element) = receiver_type.element() {
        let [position] = index.indices else {
            return Err(CodegenError::unsupported(
                "array access with more than one index",
                index.span,
            ));
        };
        let position = compiler.lazy(*position)?;
        return Ok(LazyValue::ArrayElement(Box::new(ArrayElementValue {
            array: receiver,
            index: position,
            ty: element,
        })));
    }

    let access = compiler
        .bindings()
        .indexed_access(index.id)
        .ok_or_else(|| missing("indexed access operators", index.id, index.span))?;
    let getter = access
        .getter
        .map(|decl| compiler.accessor(decl, index.span))
        .transpose()?;
    let setter = access
        .setter
        .map(|decl| compiler.accessor(decl, index.span))
        .transpose()?;
    let mut args = Vec::with_capacity(index.indices.len());
    for position in index.indices {
        args.push(compiler.lazy(*position)?);
    }
    Ok(LazyValue::Property(Box::new(PropertyValue {
        getter,
        setter,
        backing_field: None,
        ty,
        is_static: false,
        receiver,
        args,
    })))
}
