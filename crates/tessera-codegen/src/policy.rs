//! Pluggable call strategies: intrinsics and inlining.
//!
//! The call compiler asks a [`CallPolicy`] two questions about every callee:
//! whether a fixed instruction pattern replaces the invocation, and whether
//! the call site should be marked for inlining.

use tessera_tree::{BinaryOp, FunctionFlags, FunctionInfo};

use crate::options::CodegenOptions;

/// Fixed instruction patterns standing in for a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intrinsic {
    /// `array.size`
    ArrayLength,
    /// `array.get(i)` / `array[i]`
    ArrayGet,
    /// `array.set(i, v)`
    ArraySet,
    /// `arrayOf(...)`: the variadic argument array is the result.
    ArrayOf,
    /// `toInt()`, `toLong()` and friends: a primitive conversion of the receiver.
    Convert,
    /// `plus`, `minus`, `times`, `div`, `rem` on primitives.
    Arithmetic(BinaryOp),
    /// `unaryMinus`
    Negate,
    /// `not`
    Not,
    /// `===` spelled as a call.
    IdentityEquals,
}

impl Intrinsic {
    /// Intrinsic registered under `name` by the front end.
    pub fn from_name(name: &str) -> Option<Self> {
        let intrinsic = match name {
            "array.size" => Intrinsic::ArrayLength,
            "array.get" => Intrinsic::ArrayGet,
            "array.set" => Intrinsic::ArraySet,
            "arrayOf" => Intrinsic::ArrayOf,
            "convert" => Intrinsic::Convert,
            "plus" => Intrinsic::Arithmetic(BinaryOp::Add),
            "minus" => Intrinsic::Arithmetic(BinaryOp::Sub),
            "times" => Intrinsic::Arithmetic(BinaryOp::Mul),
            "div" => Intrinsic::Arithmetic(BinaryOp::Div),
            "rem" => Intrinsic::Arithmetic(BinaryOp::Rem),
            "unaryMinus" => Intrinsic::Negate,
            "not" => Intrinsic::Not,
            "identityEquals" => Intrinsic::IdentityEquals,
            _ => return None,
        };
        Some(intrinsic)
    }
}

/// Strategy consulted for every call site.
pub trait CallPolicy {
    /// Instruction pattern replacing calls to `function`, if any.
    fn intrinsic(&self, function: &FunctionInfo) -> Option<Intrinsic>;

    /// Whether calls to `function` are emitted as inline call sites.
    fn should_inline(&self, function: &FunctionInfo, options: &CodegenOptions) -> bool;
}

/// Policy reading the front end's intrinsic tags and `inline` modifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCallPolicy;

impl CallPolicy for DefaultCallPolicy {
    fn intrinsic(&self, function: &FunctionInfo) -> Option<Intrinsic> {
        function.intrinsic.as_deref().and_then(Intrinsic::from_name)
    }

    fn should_inline(&self, function: &FunctionInfo, options: &CodegenOptions) -> bool {
        options.inline_enabled && function.flags.contains(FunctionFlags::INLINE)
    }
}
