//! Constant pool of a compiled function.
//!
//! The pool stores values referenced by bytecode instructions: numeric
//! literals, strings, type identities and member references. Every compiled
//! function (closure bodies included) owns its own pool, so closure bodies can
//! be generated while the enclosing function's emitter is still open.

use ordered_float::OrderedFloat;
use rustc_hash::FxHashMap;
use tessera_core::{MachineType, TypeHash};

/// Symbolic reference to a field or method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    /// Declaring type, or [`TypeHash::EMPTY`] for top-level functions.
    pub owner: TypeHash,
    pub name: Box<str>,
    /// Identity used for lookup at run time.
    pub hash: TypeHash,
}

impl MemberRef {
    pub fn new(owner: TypeHash, name: impl Into<Box<str>>, hash: TypeHash) -> Self {
        Self {
            owner,
            name: name.into(),
            hash,
        }
    }

    /// Reference to a field, hashed from its owner and name.
    pub fn field(owner: TypeHash, name: &str) -> Self {
        Self::new(owner, name, TypeHash::from_field(owner, name))
    }
}

/// Values stored in the constant pool.
///
/// Floats are wrapped in [`OrderedFloat`] so the pool can deduplicate by
/// value (bit-identical NaNs included).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    /// Signed integer (i64 to support all int sizes).
    Int(i64),
    Float32(OrderedFloat<f32>),
    Float64(OrderedFloat<f64>),
    String(Box<str>),
    /// Type identity, for `New`, `InstanceOf`, `CheckCast` and `ThrowNew`.
    TypeHash(TypeHash),
    /// Full machine type, for array element types.
    Type(MachineType),
    Field(MemberRef),
    Method(MemberRef),
}

/// Constant pool with deduplication.
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    constants: Vec<Constant>,
    index: FxHashMap<Constant, u32>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or get existing constant, returns index.
    pub fn add(&mut self, constant: Constant) -> u32 {
        if let Some(&idx) = self.index.get(&constant) {
            return idx;
        }

        let idx = self.constants.len() as u32;
        self.constants.push(constant.clone());
        self.index.insert(constant, idx);
        idx
    }

    pub fn add_int(&mut self, value: i64) -> u32 {
        self.add(Constant::Int(value))
    }

    pub fn add_f32(&mut self, value: f32) -> u32 {
        self.add(Constant::Float32(OrderedFloat(value)))
    }

    pub fn add_f64(&mut self, value: f64) -> u32 {
        self.add(Constant::Float64(OrderedFloat(value)))
    }

    pub fn add_string(&mut self, value: &str) -> u32 {
        self.add(Constant::String(value.into()))
    }

    pub fn add_type_hash(&mut self, hash: TypeHash) -> u32 {
        self.add(Constant::TypeHash(hash))
    }

    pub fn get(&self, index: u32) -> Option<&Constant> {
        self.constants.get(index as usize)
    }

    pub fn constants(&self) -> &[Constant] {
        &self.constants
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_pool_is_empty() {
        let pool = ConstantPool::new();
        assert!(pool.is_empty());
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn add_int() {
        let mut pool = ConstantPool::new();
        let idx = pool.add_int(42);
        assert_eq!(idx, 0);
        assert_eq!(pool.get(idx), Some(&Constant::Int(42)));
    }

    #[test]
    fn deduplication() {
        let mut pool = ConstantPool::new();

        let idx1 = pool.add_int(100);
        let idx2 = pool.add_int(200);
        let idx3 = pool.add_int(100);

        assert_eq!(idx1, 0);
        assert_eq!(idx2, 1);
        assert_eq!(idx3, 0);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn float_deduplication_by_value() {
        let mut pool = ConstantPool::new();

        let idx1 = pool.add_f64(1.0);
        let idx2 = pool.add_f64(1.0);
        let idx3 = pool.add_f32(1.0);

        assert_eq!(idx1, idx2);
        assert_ne!(idx1, idx3);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn members_deduplicate_by_reference() {
        let mut pool = ConstantPool::new();
        let owner = TypeHash::from_name("Point");

        let a = pool.add(Constant::Field(MemberRef::field(owner, "x")));
        let b = pool.add(Constant::Field(MemberRef::field(owner, "y")));
        let c = pool.add(Constant::Field(MemberRef::field(owner, "x")));
        let m = pool.add(Constant::Method(MemberRef::field(owner, "x")));

        assert_eq!(a, c);
        assert_ne!(a, b);
        // Same symbol used as a method is a different constant.
        assert_ne!(a, m);
    }

    #[test]
    fn get_out_of_bounds() {
        let pool = ConstantPool::new();
        assert_eq!(pool.get(0), None);
    }
}
