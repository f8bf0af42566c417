//! Call compilation.
//!
//! A resolved call goes through these steps:
//!
//! ```text
//! intrinsic?        fixed instruction pattern, no invocation
//! tail self call?   store arguments into parameter slots, jump to start
//! receiver          New + Dup for constructors, `this` or the explicit
//!                   receiver for methods, extension receiver
//! arguments         one per declared parameter: expression, default
//!                   placeholder or variadic array
//! invoke            the callee, or its `$default` stub with the masks
//! ```

use tessera_core::{CodegenError, MachineType, Result, Span, TypeHash};
use tessera_tree::{
    CallExpr, DeclId, Expr, FunctionFlags, FunctionInfo, LocalFunction, NodeId, ResolvedArgument,
    ResolvedCall, VarargElement,
};
use tracing::trace;

use super::lambda::invoke_ref;
use super::{ExprCompiler, missing};
use crate::bytecode::{Constant, MemberRef, OpCode};
use crate::policy::Intrinsic;
use crate::value::coerce;
use crate::value::{Accessor, LazyValue};

/// Node and span a call is compiled for.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CallSite {
    pub node: NodeId,
    pub span: Span,
}

/// Compile a call expression, with `receiver` from an enclosing `a.f()`.
pub fn compile_call<'ast>(
    compiler: &mut ExprCompiler<'_, 'ast>,
    call: &'ast CallExpr<'ast>,
    receiver: Option<LazyValue<'ast>>,
) -> Result<LazyValue<'ast>> {
    let resolved = compiler
        .bindings()
        .call(call.id)
        .ok_or_else(|| missing("call target", call.id, call.span))?;
    let ty = compiler.type_of(Expr::Call(call))?;
    let mut args = Vec::with_capacity(call.args.len());
    for arg in call.args {
        args.push(compiler.lazy(*arg)?);
    }
    let site = CallSite {
        node: call.id,
        span: call.span,
    };
    if let Some(local) = compiler.bindings().local_function(resolved.callee) {
        return compiler.compile_local_call(site, resolved, local, args, ty);
    }
    compiler.compile_resolved_call(site, resolved, receiver, args, ty)
}

/// Invocation instruction for a call to `info`.
pub(crate) fn call_op(info: &FunctionInfo, is_super: bool) -> OpCode {
    if info.is_constructor() || is_super {
        OpCode::CallSpecial
    } else if !info.has_dispatch_receiver() {
        OpCode::CallStatic
    } else if info
        .flags
        .intersects(FunctionFlags::FINAL | FunctionFlags::PRIVATE)
    {
        OpCode::CallSpecial
    } else {
        OpCode::CallVirtual
    }
}

/// Reference call sites use for `info`.
pub(crate) fn function_ref(info: &FunctionInfo) -> MemberRef {
    MemberRef::new(
        info.owner.unwrap_or(TypeHash::EMPTY),
        info.name.as_str(),
        info.hash(),
    )
}

pub(crate) fn argc(count: usize) -> Result<u8> {
    u8::try_from(count)
        .map_err(|_| CodegenError::internal(format!("call with {count} arguments exceeds 255")))
}

impl<'a, 'ast> ExprCompiler<'a, 'ast> {
    /// Compile a call whose target and argument mapping are resolved.
    ///
    /// `args` are the call's source arguments in source order, indexed by
    /// the resolved mapping; `ty` is the type the call expression has.
    pub(crate) fn compile_resolved_call(
        &mut self,
        site: CallSite,
        resolved: &'a ResolvedCall,
        receiver: Option<LazyValue<'ast>>,
        args: Vec<LazyValue<'ast>>,
        ty: MachineType,
    ) -> Result<LazyValue<'ast>> {
        let info = self.function_info(resolved.callee, site.span)?;
        if resolved.arguments.len() != info.params.len() {
            return Err(CodegenError::internal(format!(
                "call to `{}` maps {} arguments onto {} parameters",
                info.name,
                resolved.arguments.len(),
                info.params.len()
            )));
        }

        if let Some(intrinsic) = self.policy().intrinsic(info) {
            trace!(function = %info.name, ?intrinsic, "intrinsic call");
            let produced = self.compile_intrinsic(intrinsic, site, resolved, info, receiver, &args)?;
            return Ok(self.call_result(produced, ty));
        }

        let inline = !info.is_constructor() && self.policy().should_inline(info, self.options());
        if self.is_tail_self_call(site, resolved, info, inline) {
            return self.compile_tail_call(site, resolved, info, receiver, &args);
        }

        // Values pushed for the callee besides its dispatch receiver.
        let mut pushed = 0usize;
        let mut dispatch = false;
        if info.is_constructor() {
            let owner = info
                .owner
                .ok_or_else(|| CodegenError::internal("constructor without an owner"))?;
            self.sink.emit_type_op(OpCode::New, owner);
            self.sink.emit(OpCode::Dup);
            dispatch = true;
            if let Some(outer) = info.outer_instance {
                let instance = match receiver {
                    Some(value) => value,
                    None => self.this_value(outer, site.span)?,
                };
                self.put(&instance, MachineType::Object(outer))?;
                pushed += 1;
            }
        } else if info.has_dispatch_receiver() {
            let owner = info
                .owner
                .ok_or_else(|| CodegenError::internal("method without an owner"))?;
            match info.extension_receiver {
                // Member extension: `this` dispatches, the receiver is an argument.
                Some(extension) => {
                    let instance = self.this_value(owner, site.span)?;
                    self.put(&instance, MachineType::Object(owner))?;
                    let value = match receiver {
                        Some(value) => value,
                        None => self.receiver_value(site.span)?,
                    };
                    self.put(&value, extension)?;
                    pushed += 1;
                }
                None => {
                    let instance = match receiver {
                        Some(value) => value,
                        None => self.this_value(owner, site.span)?,
                    };
                    self.put(&instance, MachineType::Object(owner))?;
                }
            }
            dispatch = true;
        } else if let Some(extension) = info.extension_receiver {
            let value = match receiver {
                Some(value) => value,
                None => self.receiver_value(site.span)?,
            };
            self.put(&value, extension)?;
            pushed += 1;
        } else if let Some(value) = receiver {
            // Static member reached through an instance: evaluated, then dropped.
            self.put(&value, MachineType::Void)?;
        }

        let masks = self.push_arguments(resolved, info, &args)?;
        pushed += info.params.len();

        let (op, method, count) = match masks {
            Some(masks) => {
                for mask in &masks {
                    self.sink.emit_int(i64::from(*mask as i32));
                }
                self.sink.emit(OpCode::PushNull);
                pushed += masks.len() + 1;
                let stub = MemberRef::new(
                    info.owner.unwrap_or(TypeHash::EMPTY),
                    format!("{}$default", info.name),
                    info.default_stub_hash(),
                );
                if info.is_constructor() {
                    (OpCode::CallSpecial, stub, pushed)
                } else {
                    (OpCode::CallStatic, stub, pushed + usize::from(dispatch))
                }
            }
            None if inline => (OpCode::CallInline, function_ref(info), pushed + usize::from(dispatch)),
            None => {
                let op = call_op(info, resolved.is_super);
                let count = match op {
                    OpCode::CallStatic => pushed + usize::from(dispatch),
                    _ => pushed,
                };
                (op, function_ref(info), count)
            }
        };
        self.sink.emit_call(op, method, argc(count)?);

        let produced = match info.owner {
            Some(owner) if info.is_constructor() => MachineType::Object(owner),
            _ => info.return_type,
        };
        Ok(self.call_result(produced, ty))
    }

    /// Call a local named function through the closure holding it.
    fn compile_local_call(
        &mut self,
        site: CallSite,
        resolved: &'a ResolvedCall,
        local: LocalFunction,
        args: Vec<LazyValue<'ast>>,
        ty: MachineType,
    ) -> Result<LazyValue<'ast>> {
        let info = self.function_info(resolved.callee, site.span)?;
        if self.is_tail_self_call(site, resolved, info, false) {
            return self.compile_tail_call(site, resolved, info, None, &args);
        }
        let class = MachineType::Object(local.class);
        // Inside its own body the closure is the instance in slot 0.
        let closure = if self.ctx.scope.closure_class() == Some(local.class) {
            LazyValue::local(0, class)
        } else {
            self.variable_value(local.variable, site.span)?
        };
        self.put(&closure, class)?;
        if self.push_arguments(resolved, info, &args)?.is_some() {
            return Err(CodegenError::unsupported(
                format!("default arguments of local function `{}`", info.name),
                site.span,
            ));
        }
        trace!(function = %info.name, "local function call");
        self.sink.emit_call(
            OpCode::CallVirtual,
            invoke_ref(local.class, info),
            argc(info.params.len())?,
        );
        Ok(self.call_result(info.return_type, ty))
    }

    /// Describe the value a call left on the stack.
    fn call_result(&mut self, produced: MachineType, ty: MachineType) -> LazyValue<'ast> {
        if ty.is_void() || produced == ty {
            return LazyValue::on_stack(produced);
        }
        self.coerce(produced, ty);
        LazyValue::on_stack(ty)
    }

    /// Push one value per declared parameter.
    ///
    /// Returns the default masks when any parameter takes its default: bit
    /// `i % 32` of mask `i / 32` is set for parameter `i`.
    pub(crate) fn push_arguments(
        &mut self,
        resolved: &ResolvedCall,
        info: &FunctionInfo,
        args: &[LazyValue<'ast>],
    ) -> Result<Option<Vec<u32>>> {
        let mut masks: Option<Vec<u32>> = None;
        for (index, (param, argument)) in info.params.iter().zip(&resolved.arguments).enumerate() {
            match argument {
                ResolvedArgument::Expression(i) => {
                    let value = source_argument(args, *i)?;
                    self.put(value, param.ty)?;
                }
                ResolvedArgument::Default => {
                    self.put(&LazyValue::None, param.ty)?;
                    let masks =
                        masks.get_or_insert_with(|| vec![0; info.params.len().div_ceil(32)]);
                    masks[index / 32] |= 1 << (index % 32);
                }
                ResolvedArgument::Vararg(elements) => self.push_vararg(elements, args, param.ty)?,
            }
        }
        Ok(masks)
    }

    /// Build the array passed to a variadic parameter of type `array_type`.
    fn push_vararg(
        &mut self,
        elements: &[VarargElement],
        args: &[LazyValue<'ast>],
        array_type: MachineType,
    ) -> Result<()> {
        let element = array_type.element().unwrap_or(MachineType::ANY);
        match elements {
            [] => {
                self.sink.emit(OpCode::PushZero);
                self.sink.emit_with_constant(OpCode::NewArray, Constant::Type(element));
            }
            [only] if only.spread => {
                let value = source_argument(args, only.argument)?;
                self.put(value, array_type)?;
            }
            _ if elements.iter().all(|e| !e.spread) => {
                self.sink.emit_int(elements.len() as i64);
                self.sink.emit_with_constant(OpCode::NewArray, Constant::Type(element));
                for (index, e) in elements.iter().enumerate() {
                    self.sink.emit(OpCode::Dup);
                    self.sink.emit_int(index as i64);
                    let value = source_argument(args, e.argument)?;
                    self.put(value, element)?;
                    self.sink.emit(OpCode::ArrayStore);
                }
            }
            _ => {
                // Size hint only; the builder grows as needed.
                let hint = u8::try_from(elements.len()).unwrap_or(u8::MAX);
                self.sink.emit_byte(OpCode::NewSpreadBuilder, hint);
                for e in elements {
                    let value = source_argument(args, e.argument)?;
                    if e.spread {
                        self.put(value, array_type)?;
                        self.sink.emit(OpCode::SpreadAddAll);
                    } else {
                        self.put(value, element)?;
                        self.sink.emit(OpCode::SpreadAdd);
                    }
                }
                self.sink.emit_with_constant(OpCode::SpreadToArray, Constant::Type(element));
            }
        }
        Ok(())
    }

    // =========================================================================
    // Tail recursion
    // =========================================================================

    fn is_tail_self_call(
        &self,
        site: CallSite,
        resolved: &ResolvedCall,
        info: &FunctionInfo,
        inline: bool,
    ) -> bool {
        self.bindings().is_tail_call(site.node)
            && resolved.callee == self.ctx.function()
            && info.flags.contains(FunctionFlags::TAILREC)
            && !inline
            && !self.ctx.blocks.has_finally()
    }

    /// Reassign the parameters and jump back to the start of the body.
    fn compile_tail_call(
        &mut self,
        site: CallSite,
        resolved: &ResolvedCall,
        info: &FunctionInfo,
        receiver: Option<LazyValue<'ast>>,
        args: &[LazyValue<'ast>],
    ) -> Result<LazyValue<'ast>> {
        if resolved
            .arguments
            .iter()
            .any(|a| matches!(a, ResolvedArgument::Default))
        {
            return Err(CodegenError::unsupported(
                "tail-recursive call relying on default arguments",
                site.span,
            ));
        }
        let start = self
            .ctx
            .start_label
            .ok_or_else(|| CodegenError::internal("tail call outside of a function body"))?;

        // The extension receiver is a parameter too and may change.
        let receiver_slot = match (info.extension_receiver, self.ctx.receiver) {
            (Some(_), Some((slot, ty))) => {
                let value = match receiver {
                    Some(value) => value,
                    None => LazyValue::local(slot, ty),
                };
                self.put(&value, ty)?;
                Some(slot)
            }
            _ => {
                if let Some(value) = receiver {
                    self.put(&value, MachineType::Void)?;
                }
                None
            }
        };

        self.push_arguments(resolved, info, args)?;
        let slots: Vec<u16> = self.ctx.param_slots.iter().map(|(slot, _)| *slot).collect();
        for slot in slots.into_iter().rev() {
            self.sink.emit_set_local(slot);
        }
        if let Some(slot) = receiver_slot {
            self.sink.emit_set_local(slot);
        }
        self.sink.emit_jump(OpCode::Jump, start);
        trace!(function = %info.name, "tail call compiled to a jump");
        Ok(LazyValue::None)
    }

    // =========================================================================
    // Intrinsics
    // =========================================================================

    /// Emit `intrinsic` in place of a call; returns the type it produced.
    fn compile_intrinsic(
        &mut self,
        intrinsic: Intrinsic,
        site: CallSite,
        resolved: &ResolvedCall,
        info: &FunctionInfo,
        receiver: Option<LazyValue<'ast>>,
        args: &[LazyValue<'ast>],
    ) -> Result<MachineType> {
        let argument = |index: usize| match resolved.arguments.get(index) {
            Some(ResolvedArgument::Expression(i)) => source_argument(args, *i),
            _ => Err(CodegenError::internal(format!(
                "intrinsic `{}` needs argument {index}",
                info.name
            ))),
        };
        let subject = match receiver {
            Some(value) => Some(value),
            None if info.extension_receiver.is_some() => Some(self.receiver_value(site.span)?),
            None => match info.owner {
                Some(owner) if info.has_dispatch_receiver() => {
                    Some(self.this_value(owner, site.span)?)
                }
                _ => None,
            },
        };
        let subject = |what: &str| {
            subject.clone().ok_or_else(|| {
                CodegenError::unsupported(format!("{what} without a receiver"), site.span)
            })
        };

        let produced = match intrinsic {
            Intrinsic::ArrayLength => {
                let array = subject("array length")?;
                self.put(&array, array.ty())?;
                self.sink.emit(OpCode::ArrayLength);
                MachineType::INT
            }
            Intrinsic::ArrayGet => {
                let array = subject("array read")?;
                let array_type = array.ty();
                self.put(&array, array_type)?;
                self.put(argument(0)?, MachineType::INT)?;
                self.sink.emit(OpCode::ArrayLoad);
                array_type.element().unwrap_or(info.return_type)
            }
            Intrinsic::ArraySet => {
                let array = subject("array write")?;
                let array_type = array.ty();
                let element = array_type.element().unwrap_or(MachineType::ANY);
                self.put(&array, array_type)?;
                self.put(argument(0)?, MachineType::INT)?;
                self.put(argument(1)?, element)?;
                self.sink.emit(OpCode::ArrayStore);
                MachineType::Void
            }
            Intrinsic::ArrayOf => {
                let (Some(ResolvedArgument::Vararg(elements)), Some(param)) =
                    (resolved.arguments.first(), info.params.first())
                else {
                    return Err(CodegenError::internal(format!(
                        "`{}` has no variadic parameter",
                        info.name
                    )));
                };
                self.push_vararg(elements, args, param.ty)?;
                param.ty
            }
            Intrinsic::Convert => {
                let value = subject("conversion")?;
                let from = value.ty();
                self.put(&value, from)?;
                self.coerce(from, info.return_type);
                info.return_type
            }
            Intrinsic::Arithmetic(op) => {
                let operand = coerce::promoted(info.return_type, info.return_type);
                let code = coerce::arithmetic_op(op, operand.stack_kind()).ok_or_else(|| {
                    CodegenError::unsupported(
                        format!("arithmetic intrinsic on {:?}", info.return_type),
                        site.span,
                    )
                })?;
                self.put(&subject("arithmetic")?, operand)?;
                self.put(argument(0)?, operand)?;
                self.sink.emit(code);
                self.coerce(operand, info.return_type);
                info.return_type
            }
            Intrinsic::Negate => {
                let operand = coerce::promoted(info.return_type, info.return_type);
                let code = coerce::negate_op(operand.stack_kind()).ok_or_else(|| {
                    CodegenError::unsupported(
                        format!("negation intrinsic on {:?}", info.return_type),
                        site.span,
                    )
                })?;
                self.put(&subject("negation")?, operand)?;
                self.sink.emit(code);
                self.coerce(operand, info.return_type);
                info.return_type
            }
            Intrinsic::Not => {
                self.put(&subject("negation")?, MachineType::BOOL)?;
                self.sink.emit(OpCode::Not);
                MachineType::BOOL
            }
            Intrinsic::IdentityEquals => {
                self.put(&subject("identity comparison")?, MachineType::ANY)?;
                self.put(argument(0)?, MachineType::ANY)?;
                self.sink.emit(OpCode::EqRef);
                MachineType::BOOL
            }
        };
        Ok(produced)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Accessor description of the function `decl`.
    pub(crate) fn accessor(&self, decl: DeclId, span: Span) -> Result<Accessor> {
        let info = self.function_info(decl, span)?;
        Ok(Accessor {
            method: function_ref(info),
            op: call_op(info, false),
            params: info.params.iter().map(|p| p.ty).collect(),
            return_type: info.return_type,
        })
    }

    /// Call the no-argument function `decl` on the receiver already pushed.
    ///
    /// Used by loops for `iterator()`, `hasNext()` and range bounds; returns
    /// the type left on the stack.
    pub(crate) fn call_on_pushed_receiver(
        &mut self,
        decl: DeclId,
        span: Span,
    ) -> Result<MachineType> {
        let info = self.function_info(decl, span)?;
        let op = call_op(info, false);
        // Extension functions take the receiver as an ordinary argument.
        let count = u8::from(!info.has_dispatch_receiver());
        self.sink.emit_call(op, function_ref(info), count);
        Ok(info.return_type)
    }
}

fn source_argument<'v, 'ast>(args: &'v [LazyValue<'ast>], index: usize) -> Result<&'v LazyValue<'ast>> {
    args.get(index).ok_or_else(|| {
        CodegenError::internal(format!(
            "argument {index} out of range for a call with {} arguments",
            args.len()
        ))
    })
}
