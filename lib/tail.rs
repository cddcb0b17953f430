//! Bounded log tailing and event-source reconnection (spec §5
//! "Fairness/backpressure", §6 "Process-wide state").
//!
//! Both helpers exist for the same reason: a log-console or streaming
//! widget's upstream data rate has nothing to do with the frame rate the
//! rest of the runtime runs at, so they need their own small amount of
//! owned, bounded state rather than participating in reconcile/commit
//! directly. [`TailBuffer`] is the backpressure policy; [`Reconnect`] is the
//! retry policy; [`TailSource`] is the trait a host's concrete log/stream
//! adapter implements, with one process-wide default swappable for tests
//! the way the teacher's render tree keeps a single `focused_node` /
//! `hovered_node` slot rather than scattering that state across nodes
//! (`rxtui/lib/render_tree/tree.rs`).

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// A bounded FIFO of log lines that drops the oldest entry once `max` is
/// reached, never the newest, and remembers how many lines it has dropped
/// in total so a consumer can render e.g. "(12 lines dropped)".
#[derive(Debug, Clone)]
pub struct TailBuffer {
    lines: VecDeque<String>,
    max: usize,
    dropped: u64,
}

impl TailBuffer {
    pub fn new(max: usize) -> Self {
        Self { lines: VecDeque::with_capacity(max.min(1024)), max: max.max(1), dropped: 0 }
    }

    /// Appends one line, dropping the oldest buffered line if this would
    /// exceed `max`.
    pub fn push(&mut self, line: impl Into<String>) {
        if self.lines.len() >= self.max {
            self.lines.pop_front();
            self.dropped += 1;
        }
        self.lines.push_back(line.into());
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total lines dropped over this buffer's lifetime, not just since the
    /// last read.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.dropped = 0;
    }
}

/// Reconnect policy for an event-source hook: a fixed delay between
/// attempts and a cap on how many attempts to make before giving up.
/// `attempts()` is monotonic within one connection's lifetime; call
/// [`Reconnect::reset`] once a connection succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconnect {
    delay_ms: u64,
    max_attempts: u32,
    attempts: u32,
}

impl Reconnect {
    pub fn new(delay_ms: u64, max_attempts: u32) -> Self {
        Self { delay_ms, max_attempts, attempts: 0 }
    }

    /// Records one failed attempt and returns the delay to wait before the
    /// next one, or `None` if `max_attempts` has been exhausted.
    pub fn next_attempt(&mut self) -> Option<u64> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(self.delay_ms)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

/// A host-supplied source of tailed lines (a file watcher, a subprocess's
/// stdout, a log-shipping socket, ...). The core crate never implements one
/// itself — it only owns the buffering and reconnect policy above plus the
/// single swappable process-wide default a test harness can install.
pub trait TailSource {
    /// Pulls any lines currently available without blocking.
    fn poll(&mut self) -> Vec<String>;
    /// Whether the underlying source is still connected.
    fn is_connected(&self) -> bool;
}

/// A no-op source used as the crate's own baked-in default: it never
/// connects and never yields lines, so a host that forgets to install a
/// real factory gets a harmless empty log rather than a panic.
struct NullTailSource;

impl TailSource for NullTailSource {
    fn poll(&mut self) -> Vec<String> {
        Vec::new()
    }

    fn is_connected(&self) -> bool {
        false
    }
}

/// A factory that produces a fresh [`TailSource`] for one log-console
/// widget instance, keyed by whatever path/address string the widget's
/// props carry.
pub type TailSourceFactory = Rc<dyn Fn(&str) -> Box<dyn TailSource>>;

thread_local! {
    // The crate's scheduling model is single-threaded cooperative (spec
    // §5), so a thread-local cell is sufficient process-wide state; there
    // is no cross-thread handoff to design around.
    static DEFAULT_FACTORY: RefCell<Option<TailSourceFactory>> = const { RefCell::new(None) };
}

/// Installs (or, with `None`, clears) the process-wide default factory used
/// by [`default_tail_source`]. Test harnesses swap this to inject a fake
/// source without threading a factory through every widget that wants one.
pub fn set_default_tail_source_factory(factory: Option<TailSourceFactory>) {
    DEFAULT_FACTORY.with(|cell| *cell.borrow_mut() = factory);
}

/// Builds a tail source for `address` via the installed default factory, or
/// the built-in no-op source if none has been installed.
pub fn default_tail_source(address: &str) -> Box<dyn TailSource> {
    DEFAULT_FACTORY.with(|cell| match cell.borrow().as_ref() {
        Some(factory) => factory(address),
        None => Box::new(NullTailSource),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_buffer_drops_oldest_not_newest() {
        let mut buf = TailBuffer::new(3);
        buf.push("a");
        buf.push("b");
        buf.push("c");
        buf.push("d");
        assert_eq!(buf.lines().collect::<Vec<_>>(), vec!["b", "c", "d"]);
        assert_eq!(buf.dropped(), 1);
    }

    #[test]
    fn reconnect_exhausts_after_max_attempts() {
        let mut r = Reconnect::new(500, 2);
        assert_eq!(r.next_attempt(), Some(500));
        assert_eq!(r.next_attempt(), Some(500));
        assert_eq!(r.next_attempt(), None);
        assert_eq!(r.attempts(), 2);
        r.reset();
        assert_eq!(r.next_attempt(), Some(500));
    }

    #[test]
    fn default_tail_source_falls_back_to_null_source() {
        set_default_tail_source_factory(None);
        let mut src = default_tail_source("anything");
        assert!(!src.is_connected());
        assert!(src.poll().is_empty());
    }

    #[test]
    fn installed_factory_is_used_and_can_be_cleared() {
        set_default_tail_source_factory(Some(Rc::new(|addr: &str| -> Box<dyn TailSource> {
            struct Fake(String);
            impl TailSource for Fake {
                fn poll(&mut self) -> Vec<String> {
                    vec![self.0.clone()]
                }
                fn is_connected(&self) -> bool {
                    true
                }
            }
            Box::new(Fake(addr.to_string()))
        })));
        let mut src = default_tail_source("widget-1");
        assert!(src.is_connected());
        assert_eq!(src.poll(), vec!["widget-1".to_string()]);
        set_default_tail_source_factory(None);
    }
}
