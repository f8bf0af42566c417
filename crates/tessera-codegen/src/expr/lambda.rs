//! Lambdas, local functions, object literals and callable references.
//!
//! All of them compile to the construction of a closure class instance. The
//! class itself is handed to the [`ClassSink`](crate::module::ClassSink)
//! together with its constructor layout:
//!
//! ```text
//! New Closure; Dup
//! <this$0>            enclosing instance, once per class chain
//! <receiver$0>        enclosing extension receiver, once per class level
//! <$x> <$y> ...       captured variables; shared ones pass their cell
//! <super args>        object literals only
//! CallSpecial Closure.<init>
//! ```
//!
//! A local function is a lambda stored in a local variable; calls to it
//! invoke that variable. Object literal members become methods of the class.

use tessera_core::{CodegenError, MachineType, Result, Span, TypeHash};
use tessera_tree::{
    CallableRefExpr, ClosureKind, DeclId, Expr, FunctionInfo, LambdaExpr, LambdaKind,
    LocalFunctionExpr, ObjectLiteralExpr,
};
use tracing::debug;

use super::calls::{argc, function_ref};
use super::names::{CAPTURED_RECEIVER, CAPTURED_THIS, captured_field_name};
use super::{ExprCompiler, missing};
use crate::bytecode::{MemberRef, OpCode};
use crate::context::{MAX_SCOPE_DEPTH, ScopeKind, ScopeRecord};
use crate::function::{FunctionSignature, compile_function};
use crate::module::{
    ClosureClass, ClosureField, ClosureStrategy, CompiledFunction, SuperCall, constructor_ref,
};
use crate::value::LazyValue;

/// Where a constructor argument of a closure comes from.
#[derive(Debug, Clone, Copy)]
enum CaptureSource {
    This(TypeHash),
    Receiver,
    Variable { decl: DeclId, shared: bool },
}

/// Reference to the `invoke` of closure `class` running `info`.
pub(crate) fn invoke_ref(class: TypeHash, info: &FunctionInfo) -> MemberRef {
    let params: Vec<TypeHash> = info
        .extension_receiver
        .iter()
        .copied()
        .chain(info.params.iter().map(|p| p.ty))
        .map(MachineType::type_hash)
        .collect();
    MemberRef::new(class, "invoke", TypeHash::from_method(class, "invoke", &params))
}

/// Compile a lambda literal or anonymous function.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn compile_lambda<'ast>(
    compiler: &mut ExprCompiler<'_, 'ast>,
    lambda: &'ast LambdaExpr<'ast>,
) -> Result<LazyValue<'ast>> {
    let closure = compiler
        .bindings()
        .closure(lambda.id)
        .ok_or_else(|| missing("closure class", lambda.id, lambda.span))?;
    let ClosureKind::Lambda {
        function,
        inlined,
        sam_interface,
    } = &closure.kind
    else {
        return Err(CodegenError::internal("lambda bound to a callable reference").at(lambda.span));
    };
    let class = closure.class;
    let kind = ScopeKind::Closure {
        class,
        lambda: lambda.kind,
        inlined: *inlined,
    };
    let strategy = match sam_interface {
        Some(interface) => ClosureStrategy::SamWrapper {
            interface: *interface,
        },
        None => ClosureStrategy::FunctionBody,
    };
    let body = ClosureBody {
        function: *function,
        kind,
        label: lambda.label,
        body: lambda.body,
    };
    compile_closure(compiler, class, body, strategy, lambda.span)
}

/// Compile a local named function and store its closure in its variable.
pub fn compile_local_function<'ast>(
    compiler: &mut ExprCompiler<'_, 'ast>,
    local: &'ast LocalFunctionExpr<'ast>,
) -> Result<LazyValue<'ast>> {
    let closure = compiler
        .bindings()
        .closure(local.id)
        .ok_or_else(|| missing("closure class", local.id, local.span))?;
    let ClosureKind::Lambda { function, .. } = &closure.kind else {
        return Err(CodegenError::internal("local function without a body").at(local.span));
    };
    let class = closure.class;
    let variable = compiler.reference(local.id, local.span)?;

    let holder = compiler.enter_local(variable, local.span)?;
    compiler.put_receiver(&holder)?;
    let body = ClosureBody {
        function: *function,
        kind: ScopeKind::Closure {
            class,
            lambda: LambdaKind::AnonymousFunction,
            inlined: false,
        },
        label: Some(local.name),
        body: local.body,
    };
    let value = compile_closure(compiler, class, body, ClosureStrategy::FunctionBody, local.span)?;
    compiler.put(&value, ExprCompiler::store_type(&holder))?;
    compiler.store_to_receiver(&holder)?;
    compiler.scope_local(variable, local.span)?;
    Ok(LazyValue::None)
}

/// Compile an object literal: its member functions, then its construction.
pub fn compile_object_literal<'ast>(
    compiler: &mut ExprCompiler<'_, 'ast>,
    object: &'ast ObjectLiteralExpr<'ast>,
) -> Result<LazyValue<'ast>> {
    let closure = compiler
        .bindings()
        .closure(object.id)
        .ok_or_else(|| missing("closure class", object.id, object.span))?;
    if closure.kind != ClosureKind::ObjectLiteral {
        return Err(CodegenError::internal("object literal bound to a function body").at(object.span));
    }
    let class = closure.class;

    let mut methods = Vec::with_capacity(object.members.len());
    for member in object.members {
        let function = compiler.reference(member.id, member.span)?;
        let info = compiler.function_info(function, member.span)?;
        let body = ClosureBody {
            function,
            kind: ScopeKind::Closure {
                class,
                lambda: LambdaKind::AnonymousFunction,
                inlined: false,
            },
            label: Some(info.name.as_str()),
            body: member.body,
        };
        let signature = (info.name.clone(), info.hash());
        methods.push(compile_closure_body(compiler, class, body, signature)?);
    }

    let fields = push_constructor_prefix(compiler, class, object.span)?;
    let super_call = match compiler.bindings().call(object.id) {
        Some(resolved) => {
            let info = compiler.function_info(resolved.callee, object.span)?;
            let mut args = Vec::with_capacity(object.super_args.len());
            for arg in object.super_args {
                args.push(compiler.lazy(*arg)?);
            }
            if compiler.push_arguments(resolved, info, &args)?.is_some() {
                return Err(CodegenError::unsupported(
                    "default arguments in an object literal's superclass call",
                    object.span,
                ));
            }
            Some(SuperCall {
                constructor: function_ref(info),
                params: info.params.iter().map(|p| p.ty).collect(),
            })
        }
        None => None,
    };
    let super_params = super_call.as_ref().map_or(&[][..], |s| s.params.as_slice());
    let count = argc(fields.len() + super_params.len())?;
    compiler.sink.emit_call(
        OpCode::CallSpecial,
        constructor_ref(class, &fields, super_params),
        count,
    );

    let superclass = match &super_call {
        Some(call) => Some(call.constructor.owner),
        None => compiler.bindings().captures(class).and_then(|c| c.superclass),
    };
    debug!(%class, captured = fields.len(), members = methods.len(), "object literal class");
    compiler.classes.define_closure(ClosureClass {
        class,
        superclass,
        strategy: ClosureStrategy::ObjectLiteral,
        constructor: fields,
        super_call,
        invoke: None,
        methods,
    })?;
    Ok(LazyValue::OnStack(MachineType::Object(class)))
}

/// A body compiled into a closure class.
struct ClosureBody<'s, 'ast> {
    function: DeclId,
    kind: ScopeKind,
    label: Option<&'s str>,
    body: Expr<'ast>,
}

/// Compile `body` as the `invoke` of `class`, then construct the closure.
fn compile_closure<'ast>(
    compiler: &mut ExprCompiler<'_, 'ast>,
    class: TypeHash,
    body: ClosureBody<'_, 'ast>,
    strategy: ClosureStrategy,
    span: Span,
) -> Result<LazyValue<'ast>> {
    let info = compiler.function_info(body.function, span)?;
    let invoke_hash = invoke_ref(class, info).hash;
    let invoke = compile_closure_body(compiler, class, body, ("invoke".to_string(), invoke_hash))?;

    let fields = push_constructor_prefix(compiler, class, span)?;
    let count = argc(fields.len())?;
    compiler
        .sink
        .emit_call(OpCode::CallSpecial, constructor_ref(class, &fields, &[]), count);

    let superclass = compiler.bindings().captures(class).and_then(|c| c.superclass);
    debug!(%class, captured = fields.len(), ?strategy, "closure class");
    compiler.classes.define_closure(ClosureClass {
        class,
        superclass,
        strategy,
        constructor: fields,
        super_call: None,
        invoke: Some(invoke),
        methods: Vec::new(),
    })?;
    Ok(LazyValue::OnStack(MachineType::Object(class)))
}

/// Compile one function of closure `class` under `(name, hash)`.
fn compile_closure_body(
    compiler: &mut ExprCompiler<'_, '_>,
    class: TypeHash,
    body: ClosureBody<'_, '_>,
    (name, hash): (String, TypeHash),
) -> Result<CompiledFunction> {
    let info = compiler.function_info(body.function, body.body.span())?;
    let scope = ScopeRecord::closure(body.function, info, body.kind, body.label, compiler.ctx.scope.clone());
    let signature = FunctionSignature {
        decl: body.function,
        info,
        name,
        owner: Some(class),
        hash,
        this_type: Some(class),
        scope,
    };
    compile_function(compiler.session(), &mut *compiler.classes, signature, body.body)
}

/// Emit `New`, `Dup` and the captured values of `class`; returns the
/// constructor fields they initialize.
fn push_constructor_prefix(
    compiler: &mut ExprCompiler<'_, '_>,
    class: TypeHash,
    span: Span,
) -> Result<Vec<ClosureField>> {
    let layout = capture_layout(compiler, class, span)?;
    compiler.sink.emit_type_op(OpCode::New, class);
    compiler.sink.emit(OpCode::Dup);
    for (field, source) in &layout {
        push_capture(compiler, field, *source, span)?;
    }
    Ok(layout.into_iter().map(|(field, _)| field).collect())
}

/// Constructor fields of `class` and their sources, walking generated
/// superclasses so every inherited capture is initialized too.
fn capture_layout(
    compiler: &ExprCompiler<'_, '_>,
    class: TypeHash,
    span: Span,
) -> Result<Vec<(ClosureField, CaptureSource)>> {
    let mut layout = Vec::new();
    let mut has_this = false;
    let mut current = Some(class);
    for _ in 0..MAX_SCOPE_DEPTH {
        let Some(owner) = current else {
            return Ok(layout);
        };
        let Some(captures) = compiler.bindings().captures(owner) else {
            return Ok(layout);
        };
        if let Some(outer) = captures.this
            && !has_this
        {
            has_this = true;
            layout.push((
                ClosureField {
                    owner,
                    name: CAPTURED_THIS.to_string(),
                    ty: MachineType::Object(outer),
                },
                CaptureSource::This(outer),
            ));
        }
        // Each level initializes its own receiver field.
        if let Some(ty) = captures.receiver {
            layout.push((
                ClosureField {
                    owner,
                    name: CAPTURED_RECEIVER.to_string(),
                    ty,
                },
                CaptureSource::Receiver,
            ));
        }
        for variable in &captures.variables {
            let ty = if variable.shared { MachineType::REF } else { variable.ty };
            layout.push((
                ClosureField {
                    owner,
                    name: captured_field_name(&variable.name),
                    ty,
                },
                CaptureSource::Variable {
                    decl: variable.decl,
                    shared: variable.shared,
                },
            ));
        }
        current = captures.superclass;
    }
    Err(CodegenError::internal(format!(
        "closure superclass chain deeper than {MAX_SCOPE_DEPTH}"
    ))
    .at(span))
}

/// Push one constructor argument of a closure.
fn push_capture<'ast>(
    compiler: &mut ExprCompiler<'_, 'ast>,
    field: &ClosureField,
    source: CaptureSource,
    span: Span,
) -> Result<()> {
    match source {
        CaptureSource::This(outer) => {
            let value = compiler.this_value(outer, span)?;
            compiler.put(&value, field.ty)
        }
        CaptureSource::Receiver => {
            let value = compiler.receiver_value(span)?;
            compiler.put(&value, field.ty)
        }
        // The closure shares the cell, not a copy of the value.
        CaptureSource::Variable { decl, shared: true } => {
            let value = compiler.variable_value(decl, span)?;
            compiler.put_receiver(&value)
        }
        CaptureSource::Variable { decl, shared: false } => {
            let value = compiler.variable_value(decl, span)?;
            compiler.put(&value, field.ty)
        }
    }
}

/// Compile `::function` or `::property`.
pub fn compile_callable_ref<'ast>(
    compiler: &mut ExprCompiler<'_, 'ast>,
    reference: &'ast CallableRefExpr<'ast>,
) -> Result<LazyValue<'ast>> {
    let closure = compiler
        .bindings()
        .closure(reference.id)
        .ok_or_else(|| missing("closure class", reference.id, reference.span))?;
    let class = closure.class;
    let strategy = match &closure.kind {
        ClosureKind::FunctionReference { target } => {
            let info = compiler.function_info(*target, reference.span)?;
            ClosureStrategy::FunctionReference {
                target: function_ref(info),
                dispatch: info.has_dispatch_receiver(),
            }
        }
        ClosureKind::PropertyReference { property } => {
            let info = compiler.bindings().property(*property).ok_or_else(|| {
                CodegenError::MissingResolution {
                    what: "property declaration",
                    node: property.0,
                    span: reference.span,
                }
            })?;
            let getter = match info.getter {
                Some(decl) => Some(function_ref(compiler.function_info(decl, reference.span)?)),
                None => None,
            };
            let field = match info.backing_field.and_then(|d| compiler.bindings().field(d)) {
                Some(field) => Some(MemberRef::field(field.owner, &field.name)),
                None => None,
            };
            if getter.is_none() && field.is_none() {
                return Err(CodegenError::unsupported(
                    format!("reference to `{}` without getter or backing field", info.name),
                    reference.span,
                ));
            }
            ClosureStrategy::PropertyReference {
                getter,
                field,
                is_static: info.is_static,
            }
        }
        ClosureKind::Lambda { .. } | ClosureKind::ObjectLiteral => {
            return Err(CodegenError::internal("callable reference bound to a closure body")
                .at(reference.span));
        }
    };

    compiler.sink.emit_type_op(OpCode::New, class);
    compiler.sink.emit(OpCode::Dup);
    compiler
        .sink
        .emit_call(OpCode::CallSpecial, constructor_ref(class, &[], &[]), 0);
    debug!(%class, name = reference.name, "callable reference class");
    compiler.classes.define_closure(ClosureClass {
        class,
        superclass: None,
        strategy,
        constructor: Vec::new(),
        super_call: None,
        invoke: None,
        methods: Vec::new(),
    })?;
    Ok(LazyValue::OnStack(MachineType::Object(class)))
}
