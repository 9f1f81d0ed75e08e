//! Symbol interning.
//!
//! Every method name, instance variable, constant and `Symbol` value is represented by a
//! [`Symbol`], an index into the VM's [`Interns`] table. Ids `0..StaticSymbols::COUNT` are
//! reserved for [`StaticSymbols`] so the VM can refer to well-known names without a lookup.
//!
//! Each `Vm` owns its own `Interns`; symbol ids are never shared between VMs. Compiled
//! artifacts carry their own string pool and are remapped onto the VM table when linked.

use std::str::FromStr;

use ahash::AHashMap;
use strum::{EnumString, FromRepr, IntoStaticStr};

/// Index into an interner's storage.
///
/// Inside a linked instruction sequence a `Symbol` indexes the VM's [`Interns`]; inside an
/// unlinked artifact it indexes that artifact's own symbol pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Symbol(u32);

impl Symbol {
    /// Creates a symbol from a raw index.
    #[inline]
    #[must_use]
    pub const fn from_index(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw index value.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<StaticSymbols> for Symbol {
    #[inline]
    fn from(value: StaticSymbols) -> Self {
        Self(value as u32)
    }
}

impl PartialEq<StaticSymbols> for Symbol {
    fn eq(&self, other: &StaticSymbols) -> bool {
        self.0 == *other as u32
    }
}

/// Names the VM needs to refer to directly.
///
/// These are interned first, in declaration order, so `StaticSymbols::X as u32` is the
/// symbol id of `X` in every VM.
#[repr(u32)]
#[derive(Debug, Clone, Copy, FromRepr, EnumString, IntoStaticStr, PartialEq, Eq, Hash)]
#[strum(serialize_all = "snake_case")]
pub enum StaticSymbols {
    Initialize,
    MethodMissing,
    #[strum(serialize = "respond_to_missing?")]
    RespondToMissing,
    Inspect,
    ToS,
    ToA,
    ToStr,
    ToProc,
    Each,
    Call,
    New,
    Allocate,
    Hash,
    Message,
    Coerce,
    Inherited,
    Included,
    Extended,
    Prepended,
    #[strum(serialize = "method_added")]
    MethodAdded,
    SingletonMethodAdded,
    #[strum(serialize = "eql?")]
    Eql,
    #[strum(serialize = "+")]
    Plus,
    #[strum(serialize = "-")]
    Minus,
    #[strum(serialize = "*")]
    Mult,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "%")]
    Mod,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Ge,
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Neq,
    #[strum(serialize = "<=>")]
    Cmp,
    #[strum(serialize = "===")]
    Eqq,
    #[strum(serialize = "[]")]
    Aref,
    #[strum(serialize = "[]=")]
    Aset,
    #[strum(serialize = "<<")]
    Ltlt,
    Length,
    Size,
    #[strum(serialize = "!")]
    Not,
    #[strum(serialize = "$:")]
    LoadPath,
    #[strum(serialize = "$\"")]
    LoadedFeatures,
    #[strum(serialize = "$0")]
    ProgramName,
    #[strum(serialize = "$!")]
    ErrInfo,
    #[strum(serialize = "$stdout")]
    Stdout,
    #[strum(serialize = "$stderr")]
    Stderr,
    #[strum(serialize = "ARGV")]
    Argv,
    #[strum(serialize = "Object")]
    ObjectConst,
    #[strum(serialize = "<main>")]
    MainLabel,
}

impl StaticSymbols {
    /// Returns the static symbol matching `name`, if any.
    #[must_use]
    pub fn lookup(name: &str) -> Option<Self> {
        Self::from_str(name).ok()
    }
}

/// Per-VM symbol table.
#[derive(Debug, Clone)]
pub struct Interns {
    names: Vec<Box<str>>,
    lookup: AHashMap<Box<str>, Symbol>,
}

impl Default for Interns {
    fn default() -> Self {
        Self::new()
    }
}

impl Interns {
    /// Creates a table pre-populated with every [`StaticSymbols`] name.
    #[must_use]
    pub fn new() -> Self {
        let mut interns = Self {
            names: Vec::new(),
            lookup: AHashMap::new(),
        };
        for statik in (0..).map_while(StaticSymbols::from_repr) {
            let name: &'static str = statik.into();
            let id = interns.intern(name);
            debug_assert_eq!(id, Symbol::from(statik));
        }
        interns
    }

    /// Returns the symbol for `name`, adding it to the table if needed.
    pub fn intern(&mut self, name: &str) -> Symbol {
        if let Some(&id) = self.lookup.get(name) {
            return id;
        }
        let id = Symbol(u32::try_from(self.names.len()).expect("Interns::intern: symbol table overflow"));
        self.names.push(name.into());
        self.lookup.insert(name.into(), id);
        id
    }

    /// Returns the symbol for `name` if it has already been interned.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<Symbol> {
        self.lookup.get(name).copied()
    }

    /// Looks up the name of a symbol.
    ///
    /// # Panics
    ///
    /// Panics if the symbol was not produced by this table.
    #[inline]
    #[must_use]
    pub fn get(&self, id: Symbol) -> &str {
        self.names.get(id.index()).expect("Interns::get: unknown symbol")
    }

    /// Number of interned symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the table is empty; never true once constructed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_symbols_have_stable_ids() {
        let interns = Interns::new();
        assert_eq!(interns.get(StaticSymbols::Initialize.into()), "initialize");
        assert_eq!(interns.get(StaticSymbols::Plus.into()), "+");
        assert_eq!(interns.get(StaticSymbols::RespondToMissing.into()), "respond_to_missing?");
        assert_eq!(interns.find("<=>"), Some(Symbol::from(StaticSymbols::Cmp)));
    }

    #[test]
    fn interning_is_idempotent() {
        let mut interns = Interns::new();
        let a = interns.intern("bump");
        let b = interns.intern("bump");
        assert_eq!(a, b);
        assert_eq!(interns.get(a), "bump");
    }
}
