use serde::{Deserialize, Serialize};

use crate::intern::Symbol;

/// Call-site flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CallFlags(u8);

impl CallFlags {
    /// The last positional argument is splatted (`f(*args)`).
    pub const SPLAT: Self = Self(1);
    /// A block argument follows the positional arguments (`f(&blk)`).
    pub const BLOCKARG: Self = Self(1 << 1);
    /// Receiverless call; private methods are visible.
    pub const FCALL: Self = Self(1 << 2);
    /// Bare identifier that may have been a local variable (`foo`).
    pub const VCALL: Self = Self(1 << 3);
    /// The trailing `kw_arg.len()` arguments are keyword values.
    pub const KWARG: Self = Self(1 << 4);

    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl std::ops::BitOr for CallFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// Describes how a call was made, independently of the method it resolves to.
///
/// `argc` counts positional values on the stack including keyword values, excluding the
/// receiver and a `BLOCKARG` value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallData {
    pub mid: Symbol,
    pub argc: u32,
    pub flags: CallFlags,
    pub kw_arg: Vec<Symbol>,
}

impl CallData {
    #[must_use]
    pub fn new(mid: Symbol, argc: u32) -> Self {
        Self {
            mid,
            argc,
            flags: CallFlags::empty(),
            kw_arg: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_flags(mut self, flags: CallFlags) -> Self {
        self.flags = self.flags | flags;
        self
    }

    /// Marks the trailing `names.len()` arguments as keyword values.
    #[must_use]
    pub fn with_keywords(mut self, names: Vec<Symbol>) -> Self {
        if !names.is_empty() {
            self.flags = self.flags | CallFlags::KWARG;
        }
        self.kw_arg = names;
        self
    }

    #[must_use]
    pub fn has_block_arg(&self) -> bool {
        self.flags.contains(CallFlags::BLOCKARG)
    }

    #[must_use]
    pub fn is_fcall(&self) -> bool {
        self.flags.contains(CallFlags::FCALL)
    }

    #[must_use]
    pub fn is_vcall(&self) -> bool {
        self.flags.contains(CallFlags::VCALL)
    }

    /// Values this call pops, receiver included.
    #[must_use]
    pub fn stack_operands(&self) -> usize {
        self.argc as usize + 1 + usize::from(self.has_block_arg())
    }

    /// The same call shape with the first positional argument removed, as seen by the
    /// method a `send`-style forwarder dispatches to.
    #[must_use]
    pub fn forwarded(&self, mid: Symbol) -> Self {
        Self {
            mid,
            argc: self.argc.saturating_sub(1),
            flags: self.flags.without(CallFlags::VCALL) | CallFlags::FCALL,
            kw_arg: self.kw_arg.clone(),
        }
    }
}
