//! Deterministic 64-bit identities for types, functions, fields and labels.
//!
//! Hashes are computed from qualified names with XXHash64 and a
//! domain-specific mixing constant, so a type named `Foo` and a function named
//! `Foo` never collide. Since the hashing is `const`, well-known runtime types
//! are plain constants.
//!
//! ```
//! use tessera_core::TypeHash;
//!
//! let a = TypeHash::from_name("demo.Point");
//! assert_eq!(a, TypeHash::from_name("demo.Point"));
//! let get = TypeHash::from_method(a, "getX", &[]);
//! assert_ne!(get, TypeHash::from_method(a, "getY", &[]));
//! ```

use std::fmt;
use xxhash_rust::const_xxh64::xxh64;

/// Domain-specific mixing constants for hash computation.
pub mod hash_constants {
    /// Separator constant for signature components.
    pub const SEP: u64 = 0x4bc94d6bd06053ad;

    /// Domain marker for type hashes.
    pub const TYPE: u64 = 0x2fac10b63a6cc57c;

    /// Domain marker for top-level function hashes.
    pub const FUNCTION: u64 = 0x5ea77ffbcdf5f302;

    /// Domain marker for member function hashes.
    pub const METHOD: u64 = 0x7d3c8b4a92e15f6d;

    /// Domain marker for constructor hashes.
    pub const CONSTRUCTOR: u64 = 0x9a7f3d5e2b8c4601;

    /// Domain marker for field hashes.
    pub const FIELD: u64 = 0x1a095090689d4647;

    /// Domain marker for non-local return label tokens.
    pub const RETURN_LABEL: u64 = 0x3e9f5d2a8c7b1403;

    /// Per-position parameter markers, so `(A, B)` and `(B, A)` differ.
    pub const PARAM_MARKERS: [u64; 8] = [
        0x9e3779b97f4a7c15,
        0xbf58476d1ce4e5b9,
        0x94d049bb133111eb,
        0xd6e8feb86659fd93,
        0xe7037ed1a0b428db,
        0xc6a4a7935bd1e995,
        0x8648dbbc94d49b8d,
        0xa2b48b2c69e0d657,
    ];
}

/// A deterministic 64-bit identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeHash(pub u64);

impl TypeHash {
    /// Empty/invalid hash constant.
    pub const EMPTY: TypeHash = TypeHash(0);

    /// Hash of a qualified type name.
    #[inline]
    pub const fn from_name(name: &str) -> Self {
        TypeHash(hash_constants::TYPE ^ xxh64(name.as_bytes(), 0))
    }

    /// Hash of a top-level function from its name and parameter types.
    #[inline]
    pub fn from_function(name: &str, params: &[TypeHash]) -> Self {
        Self::mix_params(hash_constants::FUNCTION ^ xxh64(name.as_bytes(), 0), params)
    }

    /// Hash of a member function of `owner`.
    #[inline]
    pub fn from_method(owner: TypeHash, name: &str, params: &[TypeHash]) -> Self {
        Self::mix_params(hash_constants::METHOD ^ owner.0 ^ xxh64(name.as_bytes(), 0), params)
    }

    /// Hash of a constructor of `owner`.
    #[inline]
    pub fn from_constructor(owner: TypeHash, params: &[TypeHash]) -> Self {
        Self::mix_params(hash_constants::CONSTRUCTOR ^ owner.0, params)
    }

    /// Hash of a field declared in `owner`.
    #[inline]
    pub fn from_field(owner: TypeHash, name: &str) -> Self {
        TypeHash(hash_constants::FIELD ^ owner.0.rotate_left(17) ^ xxh64(name.as_bytes(), 0))
    }

    /// Label token identifying the target of non-local returns into `function`.
    #[inline]
    pub fn return_label(function: TypeHash) -> Self {
        TypeHash(hash_constants::RETURN_LABEL ^ function.0.rotate_left(29))
    }

    fn mix_params(seed: u64, params: &[TypeHash]) -> Self {
        let mut hash = seed;
        for (i, param) in params.iter().enumerate() {
            let marker = hash_constants::PARAM_MARKERS
                .get(i)
                .copied()
                .unwrap_or_else(|| hash_constants::PARAM_MARKERS[0].wrapping_add(i as u64));
            hash = hash.wrapping_mul(hash_constants::SEP).wrapping_add(marker ^ param.0);
        }
        TypeHash(hash)
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeHash({:#018x})", self.0)
    }
}

impl fmt::Display for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Runtime types the generated code refers to directly.
pub mod well_known {
    use super::TypeHash;

    /// Root of the reference type hierarchy.
    pub const ANY: TypeHash = TypeHash::from_name("tessera.Any");
    /// The unit singleton's type.
    pub const UNIT: TypeHash = TypeHash::from_name("tessera.Unit");
    pub const STRING: TypeHash = TypeHash::from_name("tessera.String");
    /// Root of all throwable values.
    pub const THROWABLE: TypeHash = TypeHash::from_name("tessera.Throwable");
    pub const NULL_POINTER_EXCEPTION: TypeHash = TypeHash::from_name("tessera.NullPointerException");
    /// Raised by a value-producing `when` that matched no branch.
    pub const NO_WHEN_BRANCH_MATCHED: TypeHash = TypeHash::from_name("tessera.NoWhenBranchMatchedException");
    pub const CLASS_CAST_EXCEPTION: TypeHash = TypeHash::from_name("tessera.ClassCastException");
    /// Heap cell holding a variable shared between closures.
    pub const REF: TypeHash = TypeHash::from_name("tessera.Ref");
    /// Incremental builder used for calls mixing spread and plain vararg elements.
    pub const SPREAD_BUILDER: TypeHash = TypeHash::from_name("tessera.SpreadBuilder");
    /// Mutable buffer string templates are assembled in.
    pub const STRING_BUILDER: TypeHash = TypeHash::from_name("tessera.StringBuilder");
    /// Owner of runtime helper functions.
    pub const RUNTIME: TypeHash = TypeHash::from_name("tessera.runtime");
}
