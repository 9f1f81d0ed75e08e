//! The runtime value handle.
//!
//! A [`Value`] is the universal object reference. Small immutable values are stored inline
//! (immediates); everything else is a [`HeapId`] into the VM heap, whose entry carries the
//! class reference, payload, instance variables, singleton class and frozen flag.

use crate::{heap::HeapId, intern::Symbol};

/// Object ids of the fixed immediates.
pub const FALSE_OBJECT_ID: i64 = 0;
pub const NIL_OBJECT_ID: i64 = 8;
pub const TRUE_OBJECT_ID: i64 = 20;

/// A reference to a runtime object.
///
/// Immediates are always frozen and have no instance variables. Integers outside the
/// `i64` range live on the heap as `HeapData::BigInt` and still report `Integer` as their
/// class.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Value {
    #[default]
    Nil,
    True,
    False,
    Integer(i64),
    Float(f64),
    Symbol(Symbol),
    Ref(HeapId),
}

impl Value {
    #[inline]
    #[must_use]
    pub fn from_bool(value: bool) -> Self {
        if value { Self::True } else { Self::False }
    }

    /// Only `nil` and `false` are falsy.
    #[inline]
    #[must_use]
    pub fn truthy(self) -> bool {
        !matches!(self, Self::Nil | Self::False)
    }

    #[inline]
    #[must_use]
    pub fn is_nil(self) -> bool {
        matches!(self, Self::Nil)
    }

    #[inline]
    #[must_use]
    pub fn heap_id(self) -> Option<HeapId> {
        match self {
            Self::Ref(id) => Some(id),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_immediate(self) -> bool {
        !matches!(self, Self::Ref(_))
    }

    /// Identity comparison (`equal?`).
    ///
    /// Floats compare by bit pattern so that `NaN.equal?(NaN)` holds for the same value.
    #[must_use]
    pub fn identical(self, other: Self) -> bool {
        match (self, other) {
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            _ => self == other,
        }
    }

    /// Object id for immediates; heap values carry their id in the heap entry.
    ///
    /// Heap ids are multiples of 8 starting at 16, integers are odd, floats are `2 mod 4`
    /// and symbols are `4 mod 8`, so the id spaces never overlap.
    #[must_use]
    pub fn immediate_object_id(self) -> Option<i64> {
        match self {
            Self::False => Some(FALSE_OBJECT_ID),
            Self::Nil => Some(NIL_OBJECT_ID),
            Self::True => Some(TRUE_OBJECT_ID),
            Self::Integer(n) => Some(n.wrapping_mul(2).wrapping_add(1)),
            Self::Float(f) => Some(((f.to_bits() as i64) << 2) | 2),
            Self::Symbol(sym) => Some(((sym.index() as i64) << 8) | 0x0c),
            Self::Ref(_) => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::from_bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<HeapId> for Value {
    fn from(value: HeapId) -> Self {
        Self::Ref(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness() {
        assert!(!Value::Nil.truthy());
        assert!(!Value::False.truthy());
        assert!(Value::Integer(0).truthy());
        assert!(Value::True.truthy());
    }

    #[test]
    fn immediate_ids_do_not_collide() {
        let ids = [
            Value::False.immediate_object_id(),
            Value::Nil.immediate_object_id(),
            Value::True.immediate_object_id(),
            Value::Integer(0).immediate_object_id(),
            Value::Integer(8).immediate_object_id(),
            Value::Symbol(Symbol::from_index(0)).immediate_object_id(),
        ];
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(Value::Integer(3).immediate_object_id(), Some(7));
    }
}
