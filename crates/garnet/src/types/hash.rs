use indexmap::IndexMap;
use num_bigint::BigInt;

use crate::{
    heap::{Heap, HeapData, HeapId},
    intern::Symbol,
    value::Value,
};

/// Nesting beyond which array keys fall back to identity.
const MAX_KEY_DEPTH: usize = 32;

/// Structural key for builtin values, identity for everything else.
///
/// Integers and floats are distinct keys (`1.eql?(1.0)` is false); `0.0` and `-0.0` are the
/// same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    Nil,
    True,
    False,
    Int(i64),
    Big(BigInt),
    Float(u64),
    Symbol(Symbol),
    Str(String),
    Array(Vec<HashKey>),
    Object(HeapId),
}

impl HashKey {
    /// Computes the key for `value`. With `by_identity`, heap values key by object.
    #[must_use]
    pub fn of(heap: &Heap, value: Value, by_identity: bool) -> Self {
        Self::build(heap, value, by_identity, 0)
    }

    fn build(heap: &Heap, value: Value, by_identity: bool, depth: usize) -> Self {
        match value {
            Value::Nil => Self::Nil,
            Value::True => Self::True,
            Value::False => Self::False,
            Value::Integer(n) => Self::Int(n),
            Value::Float(f) => Self::Float(if f == 0.0 { 0 } else { f.to_bits() }),
            Value::Symbol(s) => Self::Symbol(s),
            Value::Ref(id) => {
                if by_identity || depth > MAX_KEY_DEPTH {
                    return Self::Object(id);
                }
                match &heap.get(id).data {
                    HeapData::String(s) => Self::Str(s.clone()),
                    HeapData::BigInt(b) => Self::Big(b.clone()),
                    HeapData::Array(items) => {
                        Self::Array(items.iter().map(|&v| Self::build(heap, v, false, depth + 1)).collect())
                    }
                    _ => Self::Object(id),
                }
            }
        }
    }
}

/// Insertion-ordered Hash payload.
#[derive(Debug, Clone, Default)]
pub struct RHash {
    entries: IndexMap<HashKey, (Value, Value), ahash::RandomState>,
    pub default: Value,
    pub default_proc: Option<Value>,
    pub compare_by_identity: bool,
}

impl RHash {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: IndexMap::default(),
            default: Value::Nil,
            default_proc: None,
            compare_by_identity: false,
        }
    }

    #[must_use]
    pub fn get(&self, key: &HashKey) -> Option<Value> {
        self.entries.get(key).map(|&(_, v)| v)
    }

    /// Inserts or replaces; an existing entry keeps its original key object and position.
    pub fn insert(&mut self, key: HashKey, key_value: Value, value: Value) {
        match self.entries.get_mut(&key) {
            Some(entry) => entry.1 = value,
            None => {
                self.entries.insert(key, (key_value, value));
            }
        }
    }

    pub fn remove(&mut self, key: &HashKey) -> Option<(Value, Value)> {
        self.entries.shift_remove(key)
    }

    #[must_use]
    pub fn contains(&self, key: &HashKey) -> bool {
        self.entries.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// `(key, value)` pairs in insertion order.
    pub fn pairs(&self) -> impl Iterator<Item = (Value, Value)> + '_ {
        self.entries.values().copied()
    }

    #[must_use]
    pub fn pair_vec(&self) -> Vec<(Value, Value)> {
        self.pairs().collect()
    }

    /// Entries with their precomputed keys, for copying into another hash.
    pub fn raw_entries(&self) -> impl Iterator<Item = (&HashKey, &(Value, Value))> {
        self.entries.iter()
    }
}
