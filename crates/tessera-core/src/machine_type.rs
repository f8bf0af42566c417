//! Machine-level value representations.
//!
//! The layout stage maps every source type onto one of these. The code
//! generator only ever reasons about machine types: how many local slots a
//! value occupies, which arithmetic family applies, and when a value must be
//! boxed or unboxed to cross between primitive and reference form.

use std::fmt;

use crate::type_hash::{TypeHash, well_known};

/// Primitive value kinds.
///
/// The discriminant is the operand of `Box`/`Unbox` instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PrimitiveKind {
    Bool = 0,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
}

impl PrimitiveKind {
    pub const ALL: [PrimitiveKind; 8] = [
        PrimitiveKind::Bool,
        PrimitiveKind::Byte,
        PrimitiveKind::Short,
        PrimitiveKind::Char,
        PrimitiveKind::Int,
        PrimitiveKind::Long,
        PrimitiveKind::Float,
        PrimitiveKind::Double,
    ];

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    /// The stack family this kind computes in.
    pub fn stack_kind(self) -> StackKind {
        match self {
            PrimitiveKind::Bool
            | PrimitiveKind::Byte
            | PrimitiveKind::Short
            | PrimitiveKind::Char
            | PrimitiveKind::Int => StackKind::I32,
            PrimitiveKind::Long => StackKind::I64,
            PrimitiveKind::Float => StackKind::F32,
            PrimitiveKind::Double => StackKind::F64,
        }
    }

    /// Type of the boxed form of this primitive.
    pub fn boxed_type(self) -> TypeHash {
        match self {
            PrimitiveKind::Bool => TypeHash::from_name("tessera.Boolean"),
            PrimitiveKind::Byte => TypeHash::from_name("tessera.Byte"),
            PrimitiveKind::Short => TypeHash::from_name("tessera.Short"),
            PrimitiveKind::Char => TypeHash::from_name("tessera.Char"),
            PrimitiveKind::Int => TypeHash::from_name("tessera.Int"),
            PrimitiveKind::Long => TypeHash::from_name("tessera.Long"),
            PrimitiveKind::Float => TypeHash::from_name("tessera.Float"),
            PrimitiveKind::Double => TypeHash::from_name("tessera.Double"),
        }
    }

    fn descriptor(self) -> char {
        match self {
            PrimitiveKind::Bool => 'Z',
            PrimitiveKind::Byte => 'B',
            PrimitiveKind::Short => 'S',
            PrimitiveKind::Char => 'C',
            PrimitiveKind::Int => 'I',
            PrimitiveKind::Long => 'J',
            PrimitiveKind::Float => 'F',
            PrimitiveKind::Double => 'D',
        }
    }
}

/// Operand-stack family of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StackKind {
    Void,
    I32,
    I64,
    F32,
    F64,
    Ref,
}

/// Element type of an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Primitive(PrimitiveKind),
    Reference(TypeHash),
}

impl ElementType {
    /// The machine type of one element.
    pub fn machine(self) -> MachineType {
        match self {
            ElementType::Primitive(kind) => MachineType::Primitive(kind),
            ElementType::Reference(hash) => MachineType::Object(hash),
        }
    }
}

/// Machine representation of a value.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum MachineType {
    Void,
    Primitive(PrimitiveKind),
    Object(TypeHash),
    Array(ElementType),
}

impl MachineType {
    pub const BOOL: MachineType = MachineType::Primitive(PrimitiveKind::Bool);
    pub const BYTE: MachineType = MachineType::Primitive(PrimitiveKind::Byte);
    pub const SHORT: MachineType = MachineType::Primitive(PrimitiveKind::Short);
    pub const CHAR: MachineType = MachineType::Primitive(PrimitiveKind::Char);
    pub const INT: MachineType = MachineType::Primitive(PrimitiveKind::Int);
    pub const LONG: MachineType = MachineType::Primitive(PrimitiveKind::Long);
    pub const FLOAT: MachineType = MachineType::Primitive(PrimitiveKind::Float);
    pub const DOUBLE: MachineType = MachineType::Primitive(PrimitiveKind::Double);
    pub const ANY: MachineType = MachineType::Object(well_known::ANY);
    pub const UNIT: MachineType = MachineType::Object(well_known::UNIT);
    pub const STRING: MachineType = MachineType::Object(well_known::STRING);
    pub const THROWABLE: MachineType = MachineType::Object(well_known::THROWABLE);
    pub const REF: MachineType = MachineType::Object(well_known::REF);

    /// Array whose elements have the given machine type.
    ///
    /// Nested arrays are erased to arrays of references.
    pub fn array_of(element: MachineType) -> MachineType {
        match element {
            MachineType::Primitive(kind) => MachineType::Array(ElementType::Primitive(kind)),
            MachineType::Object(hash) => MachineType::Array(ElementType::Reference(hash)),
            MachineType::Array(_) | MachineType::Void => {
                MachineType::Array(ElementType::Reference(well_known::ANY))
            }
        }
    }

    /// Number of local slots a value of this type occupies.
    pub fn slot_width(self) -> u16 {
        match self {
            MachineType::Void => 0,
            MachineType::Primitive(PrimitiveKind::Long | PrimitiveKind::Double) => 2,
            _ => 1,
        }
    }

    pub fn is_void(self) -> bool {
        matches!(self, MachineType::Void)
    }

    pub fn is_primitive(self) -> bool {
        matches!(self, MachineType::Primitive(_))
    }

    /// Objects and arrays.
    pub fn is_reference(self) -> bool {
        matches!(self, MachineType::Object(_) | MachineType::Array(_))
    }

    pub fn primitive(self) -> Option<PrimitiveKind> {
        match self {
            MachineType::Primitive(kind) => Some(kind),
            _ => None,
        }
    }

    /// Element type, for arrays.
    pub fn element(self) -> Option<MachineType> {
        match self {
            MachineType::Array(element) => Some(element.machine()),
            _ => None,
        }
    }

    pub fn stack_kind(self) -> StackKind {
        match self {
            MachineType::Void => StackKind::Void,
            MachineType::Primitive(kind) => kind.stack_kind(),
            MachineType::Object(_) | MachineType::Array(_) => StackKind::Ref,
        }
    }

    /// Whether values of this type live in the 32-bit integer family.
    pub fn is_int_like(self) -> bool {
        self.stack_kind() == StackKind::I32
    }

    /// Whether this is a floating point primitive.
    pub fn is_floating(self) -> bool {
        matches!(self.stack_kind(), StackKind::F32 | StackKind::F64)
    }

    /// Identity used by type tests and casts.
    pub fn type_hash(self) -> TypeHash {
        match self {
            MachineType::Void => well_known::UNIT,
            MachineType::Primitive(kind) => kind.boxed_type(),
            MachineType::Object(hash) => hash,
            MachineType::Array(_) => TypeHash::from_name(&self.descriptor()),
        }
    }

    /// Debug descriptor, as used by the local variable table.
    pub fn descriptor(self) -> String {
        match self {
            MachineType::Void => "V".to_string(),
            MachineType::Primitive(kind) => kind.descriptor().to_string(),
            MachineType::Object(hash) => format!("L{hash};"),
            MachineType::Array(element) => format!("[{}", element.machine().descriptor()),
        }
    }
}

impl fmt::Debug for MachineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineType::Void => write!(f, "void"),
            MachineType::Primitive(kind) => write!(f, "{kind:?}"),
            MachineType::Object(hash) if *hash == well_known::ANY => write!(f, "Any"),
            MachineType::Object(hash) => write!(f, "Object({hash})"),
            MachineType::Array(element) => write!(f, "Array<{:?}>", element.machine()),
        }
    }
}
