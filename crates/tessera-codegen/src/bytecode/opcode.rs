//! Instruction set of the tessera stack machine.
//!
//! Each opcode is one byte, followed by its operands (big-endian). Values on
//! the operand stack are untyped cells at run time; `Long` and `Double` take a
//! single stack cell but two local slots.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Bytecode operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum OpCode {
    // =========================================================================
    // Constants
    // =========================================================================
    /// Push constant from pool.
    /// Operand: u8 constant index
    Constant = 0,
    /// Push constant from pool.
    /// Operand: u16 constant index
    ConstantWide,
    PushNull,
    PushTrue,
    PushFalse,
    /// Push integer 0.
    PushZero,
    /// Push integer 1.
    PushOne,
    /// Push the unit singleton.
    PushUnit,

    // =========================================================================
    // Stack Operations
    // =========================================================================
    Pop,
    Dup,
    /// Duplicate the top N values, preserving their order.
    /// Operand: u8 count
    DupN,
    /// Copy the top value and insert the copy below the N values under it.
    /// Operand: u8 depth
    DupUnder,
    Swap,
    Nop,

    // =========================================================================
    // Local Variables
    // =========================================================================
    /// Operand: u8 slot
    GetLocal,
    /// Operand: u8 slot
    SetLocal,
    /// Operand: u16 slot
    GetLocalWide,
    /// Operand: u16 slot
    SetLocalWide,
    /// Add a constant to a 32-bit integer local in place.
    /// Operands: u8 slot, i8 delta
    IncLocal,

    // =========================================================================
    // Shared Cells
    // =========================================================================
    /// Push a fresh cell holding null.
    NewRef,
    /// Pop a cell, push its content.
    GetRef,
    /// Pop a value and a cell, store the value into the cell.
    SetRef,

    // =========================================================================
    // Fields
    // =========================================================================
    /// Pop an object, push one of its fields.
    /// Operand: u16 constant index (field reference)
    GetField,
    /// Pop a value and an object, store the field.
    /// Operand: u16 constant index (field reference)
    SetField,
    /// Operand: u16 constant index (field reference)
    GetStatic,
    /// Operand: u16 constant index (field reference)
    SetStatic,

    // =========================================================================
    // Arrays
    // =========================================================================
    /// Pop a length, push a zero-filled array.
    /// Operand: u16 constant index (element type)
    NewArray,
    /// Pop index and array, push the element.
    ArrayLoad,
    /// Pop value, index and array, store the element.
    ArrayStore,
    ArrayLength,

    // =========================================================================
    // Arithmetic
    // =========================================================================
    AddI32,
    SubI32,
    MulI32,
    DivI32,
    ModI32,
    NegI32,
    AddI64,
    SubI64,
    MulI64,
    DivI64,
    ModI64,
    NegI64,
    AddF32,
    SubF32,
    MulF32,
    DivF32,
    ModF32,
    NegF32,
    AddF64,
    SubF64,
    MulF64,
    DivF64,
    ModF64,
    NegF64,

    // =========================================================================
    // Conversions
    // =========================================================================
    I32toI64,
    I32toF32,
    I32toF64,
    I64toI32,
    I64toF32,
    I64toF64,
    F32toI32,
    F32toI64,
    F32toF64,
    F64toI32,
    F64toI64,
    F64toF32,
    /// Truncate to a signed byte.
    I32toI8,
    /// Truncate to a signed short.
    I32toI16,
    /// Truncate to an unsigned 16-bit char.
    I32toU16,

    // =========================================================================
    // Comparisons (push a boolean)
    // =========================================================================
    EqI32,
    NeI32,
    LtI32,
    LeI32,
    GtI32,
    GeI32,
    EqI64,
    NeI64,
    LtI64,
    LeI64,
    GtI64,
    GeI64,
    EqF32,
    NeF32,
    LtF32,
    LeF32,
    GtF32,
    GeF32,
    EqF64,
    NeF64,
    LtF64,
    LeF64,
    GtF64,
    GeF64,
    /// Null-safe structural equality of two references.
    Equals,
    /// Reference identity.
    EqRef,
    /// Boolean negation.
    Not,

    // =========================================================================
    // Branches (targets are i16 offsets relative to the end of the operand)
    // =========================================================================
    /// Operand: i16 offset
    Jump,
    /// Pop a boolean, branch if false.
    /// Operand: i16 offset
    JumpIfFalse,
    /// Pop a boolean, branch if true.
    /// Operand: i16 offset
    JumpIfTrue,
    /// Pop a reference, branch if null.
    /// Operand: i16 offset
    JumpIfNull,
    /// Pop a reference, branch if not null.
    /// Operand: i16 offset
    JumpIfNotNull,

    // =========================================================================
    // Invocation and Construction
    // =========================================================================
    /// Call a function without dispatch receiver.
    /// Operands: u16 constant index (method reference), u8 argument count
    CallStatic,
    /// Call through the receiver's class.
    /// Operands: u16 constant index (method reference), u8 argument count (excluding receiver)
    CallVirtual,
    /// Call exactly the named method on a receiver (constructors, super, private).
    /// Operands: u16 constant index (method reference), u8 argument count (excluding receiver)
    CallSpecial,
    /// Call site the inliner substitutes with the callee's body.
    /// Operands: u16 constant index (method reference), u8 argument count (including any receiver)
    CallInline,
    /// Push an uninitialized instance.
    /// Operand: u16 constant index (type hash)
    New,

    // =========================================================================
    // Type Operations
    // =========================================================================
    /// Pop a reference, push whether it is a non-null instance of the type.
    /// Operand: u16 constant index (type)
    InstanceOf,
    /// Throw a class cast exception unless the top is null or an instance of the type.
    /// Operand: u16 constant index (type)
    CheckCast,
    /// Box a primitive.
    /// Operand: u8 primitive kind
    Box,
    /// Unbox a reference, throwing on null.
    /// Operand: u8 primitive kind
    Unbox,

    // =========================================================================
    // Exceptions and Returns
    // =========================================================================
    /// Pop a throwable and throw it.
    Throw,
    /// Construct and throw an exception of the given type.
    /// Operand: u16 constant index (type hash)
    ThrowNew,
    /// Pop the return value and return.
    Return,
    ReturnVoid,
    /// Pop the return value and unwind to the function owning the label.
    /// Operand: u16 constant index (label token)
    NonLocalReturn,

    // =========================================================================
    // Variadic Arguments
    // =========================================================================
    /// Push an empty spread builder.
    /// Operand: u8 expected source count
    NewSpreadBuilder,
    /// Pop a value, append it to the builder below.
    SpreadAdd,
    /// Pop an array, append its elements to the builder below.
    SpreadAddAll,
    /// Pop the builder, push its contents as an array.
    /// Operand: u16 constant index (element type)
    SpreadToArray,
}

impl OpCode {
    /// Decode an opcode byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::try_from(value).ok()
    }

    /// Operand bytes following the opcode.
    pub fn operand_size(&self) -> usize {
        match self {
            OpCode::Constant
            | OpCode::DupN
            | OpCode::DupUnder
            | OpCode::GetLocal
            | OpCode::SetLocal
            | OpCode::Box
            | OpCode::Unbox
            | OpCode::NewSpreadBuilder => 1,

            OpCode::ConstantWide
            | OpCode::GetLocalWide
            | OpCode::SetLocalWide
            | OpCode::IncLocal
            | OpCode::GetField
            | OpCode::SetField
            | OpCode::GetStatic
            | OpCode::SetStatic
            | OpCode::NewArray
            | OpCode::Jump
            | OpCode::JumpIfFalse
            | OpCode::JumpIfTrue
            | OpCode::JumpIfNull
            | OpCode::JumpIfNotNull
            | OpCode::New
            | OpCode::InstanceOf
            | OpCode::CheckCast
            | OpCode::ThrowNew
            | OpCode::NonLocalReturn
            | OpCode::SpreadToArray => 2,

            OpCode::CallStatic | OpCode::CallVirtual | OpCode::CallSpecial | OpCode::CallInline => 3,

            _ => 0,
        }
    }

    pub fn is_jump(&self) -> bool {
        matches!(
            self,
            OpCode::Jump
                | OpCode::JumpIfFalse
                | OpCode::JumpIfTrue
                | OpCode::JumpIfNull
                | OpCode::JumpIfNotNull
        )
    }

    /// Whether control never falls through to the next instruction.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            OpCode::Jump
                | OpCode::Throw
                | OpCode::ThrowNew
                | OpCode::Return
                | OpCode::ReturnVoid
                | OpCode::NonLocalReturn
        )
    }

    /// Mnemonic, for disassembly and test failure messages.
    pub fn name(&self) -> &'static str {
        match self {
            OpCode::Constant => "CONST",
            OpCode::ConstantWide => "CONST_W",
            OpCode::PushNull => "PUSH_NULL",
            OpCode::PushTrue => "PUSH_TRUE",
            OpCode::PushFalse => "PUSH_FALSE",
            OpCode::PushZero => "PUSH_0",
            OpCode::PushOne => "PUSH_1",
            OpCode::PushUnit => "PUSH_UNIT",
            OpCode::Pop => "POP",
            OpCode::Dup => "DUP",
            OpCode::DupN => "DUP_N",
            OpCode::DupUnder => "DUP_UNDER",
            OpCode::Swap => "SWAP",
            OpCode::Nop => "NOP",
            OpCode::GetLocal => "GET_LOCAL",
            OpCode::SetLocal => "SET_LOCAL",
            OpCode::GetLocalWide => "GET_LOCAL_W",
            OpCode::SetLocalWide => "SET_LOCAL_W",
            OpCode::IncLocal => "INC_LOCAL",
            OpCode::NewRef => "NEW_REF",
            OpCode::GetRef => "GET_REF",
            OpCode::SetRef => "SET_REF",
            OpCode::GetField => "GET_FIELD",
            OpCode::SetField => "SET_FIELD",
            OpCode::GetStatic => "GET_STATIC",
            OpCode::SetStatic => "SET_STATIC",
            OpCode::NewArray => "NEW_ARRAY",
            OpCode::ArrayLoad => "ARRAY_LOAD",
            OpCode::ArrayStore => "ARRAY_STORE",
            OpCode::ArrayLength => "ARRAY_LENGTH",
            OpCode::AddI32 => "ADD_I32",
            OpCode::SubI32 => "SUB_I32",
            OpCode::MulI32 => "MUL_I32",
            OpCode::DivI32 => "DIV_I32",
            OpCode::ModI32 => "MOD_I32",
            OpCode::NegI32 => "NEG_I32",
            OpCode::AddI64 => "ADD_I64",
            OpCode::SubI64 => "SUB_I64",
            OpCode::MulI64 => "MUL_I64",
            OpCode::DivI64 => "DIV_I64",
            OpCode::ModI64 => "MOD_I64",
            OpCode::NegI64 => "NEG_I64",
            OpCode::AddF32 => "ADD_F32",
            OpCode::SubF32 => "SUB_F32",
            OpCode::MulF32 => "MUL_F32",
            OpCode::DivF32 => "DIV_F32",
            OpCode::ModF32 => "MOD_F32",
            OpCode::NegF32 => "NEG_F32",
            OpCode::AddF64 => "ADD_F64",
            OpCode::SubF64 => "SUB_F64",
            OpCode::MulF64 => "MUL_F64",
            OpCode::DivF64 => "DIV_F64",
            OpCode::ModF64 => "MOD_F64",
            OpCode::NegF64 => "NEG_F64",
            OpCode::I32toI64 => "I32_TO_I64",
            OpCode::I32toF32 => "I32_TO_F32",
            OpCode::I32toF64 => "I32_TO_F64",
            OpCode::I64toI32 => "I64_TO_I32",
            OpCode::I64toF32 => "I64_TO_F32",
            OpCode::I64toF64 => "I64_TO_F64",
            OpCode::F32toI32 => "F32_TO_I32",
            OpCode::F32toI64 => "F32_TO_I64",
            OpCode::F32toF64 => "F32_TO_F64",
            OpCode::F64toI32 => "F64_TO_I32",
            OpCode::F64toI64 => "F64_TO_I64",
            OpCode::F64toF32 => "F64_TO_F32",
            OpCode::I32toI8 => "I32_TO_I8",
            OpCode::I32toI16 => "I32_TO_I16",
            OpCode::I32toU16 => "I32_TO_U16",
            OpCode::EqI32 => "EQ_I32",
            OpCode::NeI32 => "NE_I32",
            OpCode::LtI32 => "LT_I32",
            OpCode::LeI32 => "LE_I32",
            OpCode::GtI32 => "GT_I32",
            OpCode::GeI32 => "GE_I32",
            OpCode::EqI64 => "EQ_I64",
            OpCode::NeI64 => "NE_I64",
            OpCode::LtI64 => "LT_I64",
            OpCode::LeI64 => "LE_I64",
            OpCode::GtI64 => "GT_I64",
            OpCode::GeI64 => "GE_I64",
            OpCode::EqF32 => "EQ_F32",
            OpCode::NeF32 => "NE_F32",
            OpCode::LtF32 => "LT_F32",
            OpCode::LeF32 => "LE_F32",
            OpCode::GtF32 => "GT_F32",
            OpCode::GeF32 => "GE_F32",
            OpCode::EqF64 => "EQ_F64",
            OpCode::NeF64 => "NE_F64",
            OpCode::LtF64 => "LT_F64",
            OpCode::LeF64 => "LE_F64",
            OpCode::GtF64 => "GT_F64",
            OpCode::GeF64 => "GE_F64",
            OpCode::Equals => "EQUALS",
            OpCode::EqRef => "EQ_REF",
            OpCode::Not => "NOT",
            OpCode::Jump => "JUMP",
            OpCode::JumpIfFalse => "JUMP_IF_FALSE",
            OpCode::JumpIfTrue => "JUMP_IF_TRUE",
            OpCode::JumpIfNull => "JUMP_IF_NULL",
            OpCode::JumpIfNotNull => "JUMP_IF_NOT_NULL",
            OpCode::CallStatic => "CALL_STATIC",
            OpCode::CallVirtual => "CALL_VIRTUAL",
            OpCode::CallSpecial => "CALL_SPECIAL",
            OpCode::CallInline => "CALL_INLINE",
            OpCode::New => "NEW",
            OpCode::InstanceOf => "INSTANCE_OF",
            OpCode::CheckCast => "CHECK_CAST",
            OpCode::Box => "BOX",
            OpCode::Unbox => "UNBOX",
            OpCode::Throw => "THROW",
            OpCode::ThrowNew => "THROW_NEW",
            OpCode::Return => "RETURN",
            OpCode::ReturnVoid => "RETURN_VOID",
            OpCode::NonLocalReturn => "NON_LOCAL_RETURN",
            OpCode::NewSpreadBuilder => "NEW_SPREAD_BUILDER",
            OpCode::SpreadAdd => "SPREAD_ADD",
            OpCode::SpreadAddAll => "SPREAD_ADD_ALL",
            OpCode::SpreadToArray => "SPREAD_TO_ARRAY",
        }
    }
}
