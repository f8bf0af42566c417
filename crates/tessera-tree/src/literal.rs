//! Literal values, both written in source and produced by constant folding.

use ordered_float::OrderedFloat;
use tessera_core::MachineType;

/// A compile-time constant.
///
/// Integer and floating literals are stored at full width; the node's
/// resolved machine type decides how they are pushed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Literal {
    Null,
    Bool(bool),
    Char(char),
    Int(i64),
    Float(OrderedFloat<f64>),
    String(Box<str>),
}

impl Literal {
    pub fn float(value: f64) -> Self {
        Literal::Float(OrderedFloat(value))
    }

    pub fn string(value: &str) -> Self {
        Literal::String(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Literal::Null)
    }

    /// Type of the literal when nothing else is known about it.
    pub fn natural_type(&self) -> MachineType {
        match self {
            Literal::Null => MachineType::ANY,
            Literal::Bool(_) => MachineType::BOOL,
            Literal::Char(_) => MachineType::CHAR,
            Literal::Int(v) if i32::try_from(*v).is_ok() => MachineType::INT,
            Literal::Int(_) => MachineType::LONG,
            Literal::Float(_) => MachineType::DOUBLE,
            Literal::String(_) => MachineType::STRING,
        }
    }
}
