//! VM execution tracing.
//!
//! The [`VmTracer`] trait defines hook points at key execution events: instruction dispatch,
//! method calls and returns, fast-path guard decisions, method cache lookups and raised
//! exceptions. Every hook defaults to a no-op, so implementations override only what they
//! care about.
//!
//! | Tracer | Purpose |
//! |--------|---------|
//! | [`NoopTracer`] | No-op (default) |
//! | [`StderrTracer`] | Human-readable execution log to stderr |
//! | [`ProfilingTracer`] | Instruction frequency, call depth and fast-path counters |
//! | [`RecordingTracer`] | Full event recording for post-mortem analysis |
//!
//! The VM owns its tracer as a `Box<dyn VmTracer>`; after a run the host gets the concrete
//! tracer back with [`Vm::tracer`](crate::Vm::tracer):
//!
//! ```ignore
//! let mut vm = Vm::new(VmOptions::new().tracer(ProfilingTracer::new()));
//! vm.run(&artifact)?;
//! println!("{}", vm.tracer::<ProfilingTracer>().unwrap().report());
//! ```

use std::{any::Any, fmt};

use ahash::AHashMap;

/// Trace event captured by [`RecordingTracer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// An instruction was dispatched.
    Instruction {
        ip: usize,
        name: &'static str,
        /// Operand stack depth relative to the frame base.
        stack_depth: usize,
    },
    /// A frame was pushed for a method, block or class body.
    Call { name: String, depth: usize },
    /// A frame was popped.
    Return { depth: usize },
    /// An `opt_*` guard was evaluated.
    FastPath { op: &'static str, hit: bool },
    /// An exception started unwinding.
    Raise { class_name: String },
}

/// Hooks called by the interpreter.
///
/// `Any` is a supertrait so a boxed tracer can be downcast back to its concrete type.
pub trait VmTracer: Any + fmt::Debug {
    /// Called before each instruction dispatch. This is the hottest hook.
    #[inline(always)]
    fn on_instruction(&mut self, _ip: usize, _name: &'static str, _stack_depth: usize, _frame_depth: usize) {}

    /// Called after a frame is pushed, with the call depth after the push.
    #[inline(always)]
    fn on_call(&mut self, _name: &str, _depth: usize) {}

    /// Called after a frame is popped, with the call depth after the pop.
    #[inline(always)]
    fn on_return(&mut self, _depth: usize) {}

    /// Called for every `opt_*` instruction: `hit` is false when the guard failed and the
    /// call went through full dispatch.
    #[inline(always)]
    fn on_fast_path(&mut self, _op: &'static str, _hit: bool) {}

    /// Called on every method lookup through the global method cache.
    #[inline(always)]
    fn on_method_cache(&mut self, _hit: bool) {}

    /// Called when an exception starts unwinding.
    #[inline(always)]
    fn on_raise(&mut self, _class_name: &str) {}
}

/// A tracer that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl VmTracer for NoopTracer {}

// ============================================================================
// StderrTracer
// ============================================================================

/// Prints a human-readable execution log to stderr.
///
/// ```text
/// 0000 putself            sp=0 cfp=1
/// 0001 send               sp=1 cfp=1
///      -> bump (cfp 2)
///      <- (cfp 1)
///      opt_lt: guard failed, sending
/// ```
#[derive(Debug, Default)]
pub struct StderrTracer {
    /// Stop logging after this many instructions; `None` is unlimited.
    limit: Option<usize>,
    count: usize,
    stopped: bool,
}

impl StderrTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tracer that goes quiet after `limit` instructions.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }
}

impl VmTracer for StderrTracer {
    #[inline]
    fn on_instruction(&mut self, ip: usize, name: &'static str, stack_depth: usize, frame_depth: usize) {
        if self.stopped {
            return;
        }
        eprintln!("{ip:04} {name:<18} sp={stack_depth} cfp={frame_depth}");
        self.count += 1;
        if let Some(limit) = self.limit
            && self.count >= limit
        {
            eprintln!("garnet: stderr trace stopped after {limit} instructions");
            self.stopped = true;
        }
    }

    fn on_call(&mut self, name: &str, depth: usize) {
        if !self.stopped {
            eprintln!("     -> {name} (cfp {depth})");
        }
    }

    fn on_return(&mut self, depth: usize) {
        if !self.stopped {
            eprintln!("     <- (cfp {depth})");
        }
    }

    fn on_fast_path(&mut self, op: &'static str, hit: bool) {
        if !self.stopped && !hit {
            eprintln!("     {op}: guard failed, sending");
        }
    }

    fn on_raise(&mut self, class_name: &str) {
        if !self.stopped {
            eprintln!("     raise {class_name}");
        }
    }
}

// ============================================================================
// ProfilingTracer
// ============================================================================

/// Collects execution statistics.
#[derive(Debug, Default)]
pub struct ProfilingTracer {
    instruction_counts: AHashMap<&'static str, u64>,
    total_instructions: u64,
    max_depth: usize,
    total_calls: u64,
    fast_path_hits: u64,
    fast_path_misses: u64,
    cache_hits: u64,
    cache_misses: u64,
    raises: u64,
}

/// Summary produced by [`ProfilingTracer::report`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilingReport {
    /// Per-instruction counts, most frequent first.
    pub instruction_counts: Vec<(&'static str, u64)>,
    pub total_instructions: u64,
    pub max_depth: usize,
    pub total_calls: u64,
    pub fast_path_hits: u64,
    pub fast_path_misses: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub raises: u64,
}

impl ProfilingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn report(&self) -> ProfilingReport {
        let mut instruction_counts: Vec<_> = self.instruction_counts.iter().map(|(&k, &v)| (k, v)).collect();
        instruction_counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        ProfilingReport {
            instruction_counts,
            total_instructions: self.total_instructions,
            max_depth: self.max_depth,
            total_calls: self.total_calls,
            fast_path_hits: self.fast_path_hits,
            fast_path_misses: self.fast_path_misses,
            cache_hits: self.cache_hits,
            cache_misses: self.cache_misses,
            raises: self.raises,
        }
    }
}

impl VmTracer for ProfilingTracer {
    #[inline]
    fn on_instruction(&mut self, _ip: usize, name: &'static str, _stack_depth: usize, _frame_depth: usize) {
        *self.instruction_counts.entry(name).or_insert(0) += 1;
        self.total_instructions += 1;
    }

    #[inline]
    fn on_call(&mut self, _name: &str, depth: usize) {
        self.total_calls += 1;
        self.max_depth = self.max_depth.max(depth);
    }

    fn on_fast_path(&mut self, _op: &'static str, hit: bool) {
        if hit {
            self.fast_path_hits += 1;
        } else {
            self.fast_path_misses += 1;
        }
    }

    fn on_method_cache(&mut self, hit: bool) {
        if hit {
            self.cache_hits += 1;
        } else {
            self.cache_misses += 1;
        }
    }

    fn on_raise(&mut self, _class_name: &str) {
        self.raises += 1;
    }
}

impl fmt::Display for ProfilingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "garnet profile: {} instructions, {} calls, deepest cfp {}",
            self.total_instructions, self.total_calls, self.max_depth
        )?;
        writeln!(
            f,
            "  opt_* guards  {} taken, {} fell back to send",
            self.fast_path_hits, self.fast_path_misses
        )?;
        writeln!(f, "  method cache  {} hits, {} misses", self.cache_hits, self.cache_misses)?;
        writeln!(f, "  exceptions    {} raised", self.raises)?;
        writeln!(f, "instructions by count:")?;
        for (name, count) in &self.instruction_counts {
            let share = (*count as f64 / self.total_instructions as f64) * 100.0;
            writeln!(f, "  {name:<20} {count:>10} {share:>5.1}%")?;
        }
        Ok(())
    }
}

// ============================================================================
// RecordingTracer
// ============================================================================

/// Keeps trace events in arrival order so tests can assert on dispatch decisions.
///
/// Each event allocates; cap long runs with [`RecordingTracer::with_limit`].
#[derive(Debug, Default)]
pub struct RecordingTracer {
    events: Vec<TraceEvent>,
    limit: Option<usize>,
    /// When false, instruction events are skipped and only calls, fast paths and raises
    /// are kept.
    instructions: bool,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            limit: None,
            instructions: true,
        }
    }

    /// Keeps the first `limit` events and drops the rest.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            events: Vec::with_capacity(limit.min(1024)),
            limit: Some(limit),
            instructions: true,
        }
    }

    /// A recorder that ignores instruction dispatch.
    #[must_use]
    pub fn without_instructions() -> Self {
        Self {
            instructions: false,
            ..Self::new()
        }
    }

    #[must_use]
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    #[must_use]
    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }

    /// Fast-path decisions recorded for `op`, in order.
    #[must_use]
    pub fn fast_path_decisions(&self, op: &str) -> Vec<bool> {
        self.events
            .iter()
            .filter_map(|event| match event {
                TraceEvent::FastPath { op: name, hit } if *name == op => Some(*hit),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    fn record(&mut self, event: TraceEvent) {
        if self.limit.is_none_or(|l| self.events.len() < l) {
            self.events.push(event);
        }
    }
}

impl VmTracer for RecordingTracer {
    #[inline]
    fn on_instruction(&mut self, ip: usize, name: &'static str, stack_depth: usize, _frame_depth: usize) {
        if self.instructions {
            self.record(TraceEvent::Instruction { ip, name, stack_depth });
        }
    }

    fn on_call(&mut self, name: &str, depth: usize) {
        self.record(TraceEvent::Call {
            name: name.to_owned(),
            depth,
        });
    }

    fn on_return(&mut self, depth: usize) {
        self.record(TraceEvent::Return { depth });
    }

    fn on_fast_path(&mut self, op: &'static str, hit: bool) {
        self.record(TraceEvent::FastPath { op, hit });
    }

    fn on_raise(&mut self, class_name: &str) {
        self.record(TraceEvent::Raise {
            class_name: class_name.to_owned(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_respects_limit() {
        let mut tracer = RecordingTracer::with_limit(2);
        tracer.on_call("a", 1);
        tracer.on_fast_path("opt_lt", true);
        tracer.on_return(0);
        assert_eq!(tracer.events().len(), 2);
        assert_eq!(tracer.fast_path_decisions("opt_lt"), vec![true]);
    }

    #[test]
    fn profiling_sorts_by_frequency() {
        let mut tracer = ProfilingTracer::new();
        for _ in 0..3 {
            tracer.on_instruction(0, "putnil", 0, 1);
        }
        tracer.on_instruction(1, "leave", 1, 1);
        let report = tracer.report();
        assert_eq!(report.instruction_counts[0], ("putnil", 3));
        assert_eq!(report.total_instructions, 4);
    }

    #[test]
    fn profile_report_lists_guards_and_instructions() {
        let mut tracer = ProfilingTracer::new();
        tracer.on_instruction(0, "opt_plus", 0, 1);
        tracer.on_fast_path("opt_plus", true);
        tracer.on_fast_path("opt_plus", false);
        tracer.on_call("inc", 2);
        let text = tracer.report().to_string();
        assert!(text.starts_with("garnet profile: 1 instructions, 1 calls, deepest cfp 2"), "{text}");
        assert!(text.contains("opt_* guards  1 taken, 1 fell back to send"), "{text}");
        assert!(text.contains("opt_plus"), "{text}");
    }
}
