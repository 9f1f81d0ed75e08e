//! Payload types stored in heap entries.

pub mod hash;
pub mod module;
pub mod proc;
pub mod regexp;
pub mod string;

pub use self::{
    hash::{HashKey, RHash},
    module::{AllocKind, Class, Module},
    proc::{Binding, NativeBlockFn, Proc, ProcBody},
    regexp::RRegexp,
};
