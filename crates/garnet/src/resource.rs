use std::{
    fmt,
    time::{Duration, Instant},
};

/// Default maximum depth of nested calls (interpreted frames plus native calls).
///
/// Every interpreted call recurses on the host stack, so this stays well below what a
/// default 2 MiB thread stack can hold.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 256;

/// How many instructions run between two wall-clock checks.
const TIME_CHECK_INTERVAL: usize = 1024;

/// Error returned when a resource limit is exceeded during execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// Maximum number of heap allocations exceeded.
    Allocation { limit: usize, count: usize },
    /// Maximum number of executed instructions exceeded.
    Operation { limit: usize, count: usize },
    /// Maximum execution time exceeded.
    Time { limit: Duration, elapsed: Duration },
    /// Maximum call depth exceeded.
    Recursion { limit: usize, depth: usize },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allocation { limit, count } => {
                write!(f, "allocation limit exceeded: {count} heap objects, at most {limit} allowed")
            }
            Self::Operation { limit, count } => {
                write!(f, "operation limit exceeded: {count} instructions dispatched, at most {limit} allowed")
            }
            Self::Time { limit, elapsed } => write!(f, "execution timed out after {elapsed:?} (budget {limit:?})"),
            Self::Recursion { .. } => write!(f, "stack level too deep"),
        }
    }
}

impl std::error::Error for ResourceError {}

impl ResourceError {
    /// Name of the exception class reported to the host.
    #[must_use]
    pub fn class_name(&self) -> &'static str {
        match self {
            Self::Allocation { .. } => "NoMemoryError",
            Self::Operation { .. } | Self::Time { .. } => "Interrupt",
            Self::Recursion { .. } => "SystemStackError",
        }
    }
}

/// Tracks resource usage of a running VM.
///
/// The VM holds its tracker as a trait object, so every hook takes plain arguments.
pub trait ResourceTracker: fmt::Debug {
    /// Called before each heap allocation with an approximate size in bytes.
    fn on_allocate(&mut self, size: usize) -> Result<(), ResourceError>;

    /// Called before each instruction dispatch.
    fn on_instruction(&mut self) -> Result<(), ResourceError>;

    /// Called before entering a new call with the current depth (before the push).
    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError>;

    /// Total allocations seen, if this tracker records them.
    fn allocation_count(&self) -> Option<usize> {
        None
    }

    /// Total instructions seen, if this tracker records them.
    fn operation_count(&self) -> Option<usize> {
        None
    }
}

/// Tracker that only enforces the default recursion limit.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLimitTracker;

impl ResourceTracker for NoLimitTracker {
    #[inline]
    fn on_allocate(&mut self, _size: usize) -> Result<(), ResourceError> {
        Ok(())
    }

    #[inline]
    fn on_instruction(&mut self) -> Result<(), ResourceError> {
        Ok(())
    }

    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError> {
        if current_depth >= DEFAULT_MAX_RECURSION_DEPTH {
            return Err(ResourceError::Recursion {
                limit: DEFAULT_MAX_RECURSION_DEPTH,
                depth: current_depth + 1,
            });
        }
        Ok(())
    }
}

/// Configuration for [`LimitedTracker`].
///
/// All limits are optional; unset limits are not enforced (the recursion limit falls back to
/// [`DEFAULT_MAX_RECURSION_DEPTH`]).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceLimits {
    pub max_allocations: Option<usize>,
    pub max_operations: Option<usize>,
    pub max_duration: Option<Duration>,
    pub max_recursion_depth: Option<usize>,
}

impl ResourceLimits {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn max_allocations(mut self, limit: usize) -> Self {
        self.max_allocations = Some(limit);
        self
    }

    #[must_use]
    pub fn max_operations(mut self, limit: usize) -> Self {
        self.max_operations = Some(limit);
        self
    }

    #[must_use]
    pub fn max_duration(mut self, limit: Duration) -> Self {
        self.max_duration = Some(limit);
        self
    }

    #[must_use]
    pub fn max_recursion_depth(mut self, limit: usize) -> Self {
        self.max_recursion_depth = Some(limit);
        self
    }
}

/// Tracker enforcing a [`ResourceLimits`] configuration.
#[derive(Debug, Clone)]
pub struct LimitedTracker {
    limits: ResourceLimits,
    allocation_count: usize,
    operation_count: usize,
    start: Instant,
}

impl LimitedTracker {
    #[must_use]
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            limits,
            allocation_count: 0,
            operation_count: 0,
            start: Instant::now(),
        }
    }

    #[must_use]
    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }
}

impl ResourceTracker for LimitedTracker {
    fn on_allocate(&mut self, _size: usize) -> Result<(), ResourceError> {
        self.allocation_count += 1;
        if let Some(max) = self.limits.max_allocations
            && self.allocation_count > max
        {
            return Err(ResourceError::Allocation {
                limit: max,
                count: self.allocation_count,
            });
        }
        Ok(())
    }

    fn on_instruction(&mut self) -> Result<(), ResourceError> {
        self.operation_count += 1;
        if let Some(max) = self.limits.max_operations
            && self.operation_count > max
        {
            return Err(ResourceError::Operation {
                limit: max,
                count: self.operation_count,
            });
        }
        if let Some(limit) = self.limits.max_duration
            && self.operation_count % TIME_CHECK_INTERVAL == 0
        {
            let elapsed = self.start.elapsed();
            if elapsed > limit {
                return Err(ResourceError::Time { limit, elapsed });
            }
        }
        Ok(())
    }

    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError> {
        let limit = self.limits.max_recursion_depth.unwrap_or(DEFAULT_MAX_RECURSION_DEPTH);
        if current_depth >= limit {
            return Err(ResourceError::Recursion {
                limit,
                depth: current_depth + 1,
            });
        }
        Ok(())
    }

    fn allocation_count(&self) -> Option<usize> {
        Some(self.allocation_count)
    }

    fn operation_count(&self) -> Option<usize> {
        Some(self.operation_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_limit() {
        let mut tracker = LimitedTracker::new(ResourceLimits::new().max_allocations(2));
        assert!(tracker.on_allocate(8).is_ok());
        assert!(tracker.on_allocate(8).is_ok());
        assert_eq!(
            tracker.on_allocate(8),
            Err(ResourceError::Allocation { limit: 2, count: 3 })
        );
    }

    #[test]
    fn recursion_limit_defaults() {
        let tracker = NoLimitTracker;
        assert!(tracker.check_recursion_depth(DEFAULT_MAX_RECURSION_DEPTH - 1).is_ok());
        assert!(tracker.check_recursion_depth(DEFAULT_MAX_RECURSION_DEPTH).is_err());
    }
}
