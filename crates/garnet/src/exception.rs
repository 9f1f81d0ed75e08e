//! Error taxonomy and the propagating result type of the interpreter.
//!
//! Every frame-running routine returns [`RunResult`]. Besides real exceptions the error side
//! carries the `break` and non-local `return` signals, which unwind exactly like exceptions
//! but are only caught at the boundary that owns them.

use std::{borrow::Cow, fmt};

use strum::{Display, EnumString, FromRepr, IntoStaticStr};

use crate::{heap::HeapId, resource::ResourceError, value::Value};

pub type RunResult<T> = Result<T, RunError>;

/// Builtin exception classes, mirrored as real classes at bootstrap.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, FromRepr)]
pub enum ExcType {
    Exception,
    NoMemoryError,
    ScriptError,
    LoadError,
    NotImplementedError,
    SecurityError,
    SignalException,
    Interrupt,
    StandardError,
    ArgumentError,
    EncodingError,
    IndexError,
    KeyError,
    StopIteration,
    LocalJumpError,
    NameError,
    NoMethodError,
    RangeError,
    FloatDomainError,
    RegexpError,
    RuntimeError,
    FrozenError,
    TypeError,
    ZeroDivisionError,
    SystemStackError,
}

impl ExcType {
    /// The direct superclass in the builtin hierarchy; `None` only for `Exception`.
    #[must_use]
    pub fn parent(self) -> Option<Self> {
        Some(match self {
            Self::Exception => return None,
            Self::NoMemoryError
            | Self::ScriptError
            | Self::SecurityError
            | Self::SignalException
            | Self::StandardError
            | Self::SystemStackError => Self::Exception,
            Self::LoadError | Self::NotImplementedError => Self::ScriptError,
            Self::Interrupt => Self::SignalException,
            Self::ArgumentError
            | Self::EncodingError
            | Self::IndexError
            | Self::LocalJumpError
            | Self::NameError
            | Self::RangeError
            | Self::RegexpError
            | Self::RuntimeError
            | Self::TypeError
            | Self::ZeroDivisionError => Self::StandardError,
            Self::KeyError | Self::StopIteration => Self::IndexError,
            Self::NoMethodError => Self::NameError,
            Self::FloatDomainError => Self::RangeError,
            Self::FrozenError => Self::RuntimeError,
        })
    }

    /// Whether `self` is `other` or one of its descendants.
    #[must_use]
    pub fn is_subclass_of(self, other: Self) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind == other {
                return true;
            }
            current = kind.parent();
        }
        false
    }

    /// All kinds, parents before children.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..).map_while(Self::from_repr)
    }

    /// Builds a catchable error of this kind.
    #[must_use]
    pub fn error(self, message: impl Into<String>) -> RunError {
        RunError::Exc(Box::new(SimpleException::new(self, message.into())))
    }
}

/// An exception that has not been materialized on the heap yet.
///
/// Natives raise these without touching the heap; the VM turns them into real exception
/// objects only when a rescue handler or the host needs to see one.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleException {
    pub kind: ExcType,
    pub message: String,
    pub backtrace: Option<Vec<String>>,
}

impl SimpleException {
    #[must_use]
    pub fn new(kind: ExcType, message: String) -> Self {
        Self {
            kind,
            message,
            backtrace: None,
        }
    }
}

/// The error side of every interpreter result.
#[derive(Debug, Clone)]
pub enum RunError {
    /// A builtin exception not yet allocated on the heap.
    Exc(Box<SimpleException>),
    /// An exception object living on the heap.
    Raised(HeapId),
    /// `break` unwinding to the call site that allocated `tag`.
    Break { tag: u64, value: Value },
    /// `return` from a block unwinding to the frame with serial `target`.
    Return { target: u64, value: Value },
    /// A resource limit; skips rescue and ensure handlers.
    Resource(ResourceError),
    /// A VM invariant was violated, e.g. by a malformed instruction sequence.
    Internal(Cow<'static, str>),
}

impl RunError {
    #[must_use]
    pub fn internal(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether a rescue handler may observe this error.
    #[must_use]
    pub fn is_exception(&self) -> bool {
        matches!(self, Self::Exc(_) | Self::Raised(_))
    }

    /// Whether ensure handlers run while this error unwinds.
    #[must_use]
    pub fn runs_ensure(&self) -> bool {
        !matches!(self, Self::Resource(_) | Self::Internal(_))
    }

    #[must_use]
    pub fn type_error(message: impl Into<String>) -> Self {
        ExcType::TypeError.error(message)
    }

    #[must_use]
    pub fn argument(message: impl Into<String>) -> Self {
        ExcType::ArgumentError.error(message)
    }

    /// `wrong number of arguments (given N, expected M)`.
    ///
    /// `max` of `None` means the callee accepts a rest argument.
    #[must_use]
    pub fn arity(given: usize, min: usize, max: Option<usize>) -> Self {
        let expected = match max {
            Some(max) if max == min => format!("{min}"),
            Some(max) => format!("{min}..{max}"),
            None => format!("{min}+"),
        };
        Self::argument(format!("wrong number of arguments (given {given}, expected {expected})"))
    }

    /// Checks a native method's argument count.
    pub fn check_arity(given: usize, min: usize, max: Option<usize>) -> RunResult<()> {
        if given < min || max.is_some_and(|max| given > max) {
            Err(Self::arity(given, min, max))
        } else {
            Ok(())
        }
    }

    #[must_use]
    pub fn zero_division() -> Self {
        ExcType::ZeroDivisionError.error("divided by 0")
    }

    #[must_use]
    pub fn no_implicit_conversion(from: &str, into: &str) -> Self {
        Self::type_error(format!("no implicit conversion of {from} into {into}"))
    }

    #[must_use]
    pub fn load_error(feature: &str) -> Self {
        ExcType::LoadError.error(format!("cannot load such file -- {feature}"))
    }

    #[must_use]
    pub fn local_jump(message: &str) -> Self {
        ExcType::LocalJumpError.error(message)
    }

    #[must_use]
    pub fn not_implemented(what: &str) -> Self {
        ExcType::NotImplementedError.error(format!("{what}() function is unimplemented on this machine"))
    }
}

impl From<ResourceError> for RunError {
    fn from(err: ResourceError) -> Self {
        // Deep recursion is an ordinary Ruby exception; the remaining limits are not.
        if matches!(err, ResourceError::Recursion { .. }) {
            ExcType::SystemStackError.error("stack level too deep")
        } else {
            Self::Resource(err)
        }
    }
}

/// An uncaught exception reported to the embedding host.
#[derive(Debug, Clone, PartialEq)]
pub struct Exception {
    class_name: String,
    kind: Option<ExcType>,
    message: String,
    backtrace: Vec<String>,
}

impl Exception {
    #[must_use]
    pub fn new(class_name: String, kind: Option<ExcType>, message: String, backtrace: Vec<String>) -> Self {
        Self {
            class_name,
            kind,
            message,
            backtrace,
        }
    }

    /// Name of the exception's class, e.g. `"NoMethodError"` or a user class name.
    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// The nearest builtin kind in the exception's class chain.
    #[must_use]
    pub fn kind(&self) -> Option<ExcType> {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn backtrace(&self) -> &[String] {
        &self.backtrace
    }

    /// Whether this is `kind` or a descendant of it.
    #[must_use]
    pub fn is_a(&self, kind: ExcType) -> bool {
        self.kind.is_some_and(|own| own.is_subclass_of(kind))
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(top) = self.backtrace.first() {
            write!(f, "{top}: ")?;
        }
        write!(f, "{} ({})", self.message, self.class_name)
    }
}

impl std::error::Error for Exception {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hierarchy() {
        assert!(ExcType::NoMethodError.is_subclass_of(ExcType::NameError));
        assert!(ExcType::FrozenError.is_subclass_of(ExcType::StandardError));
        assert!(ExcType::KeyError.is_subclass_of(ExcType::IndexError));
        assert!(!ExcType::LoadError.is_subclass_of(ExcType::StandardError));
        assert!(!ExcType::StandardError.is_subclass_of(ExcType::TypeError));
    }

    #[test]
    fn parents_precede_children() {
        let order: Vec<ExcType> = ExcType::all().collect();
        for (i, kind) in order.iter().enumerate() {
            if let Some(parent) = kind.parent() {
                assert!(order[..i].contains(&parent), "{kind} listed before {parent}");
            }
        }
    }

    #[test]
    fn arity_messages() {
        let RunError::Exc(exc) = RunError::arity(1, 2, Some(2)) else {
            panic!("expected exception");
        };
        assert_eq!(exc.message, "wrong number of arguments (given 1, expected 2)");
        let RunError::Exc(exc) = RunError::arity(0, 1, None) else {
            panic!("expected exception");
        };
        assert_eq!(exc.message, "wrong number of arguments (given 0, expected 1+)");
    }
}
