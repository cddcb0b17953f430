//! Host-facing backend contract (spec §6 "External Interfaces").
//!
//! Nothing upstream of this module touches a terminal, a socket, or a
//! clock. Every side effect — writing a frame, reading input, scheduling a
//! reconnect — crosses through one `Backend` implementation the host
//! supplies. This promotes the split already visible in the teacher's
//! `lib/app` (owns the event loop) and `lib/terminal.rs` (owns crossterm
//! I/O) to a trait boundary, so a host can adapt a real terminal, a pty
//! pair in a test harness, or a remote session without this crate
//! depending on any one transport.

use std::io;

use crate::drawlist;

//--------------------------------------------------------------------------------------------------
// Capabilities
//--------------------------------------------------------------------------------------------------

/// What a concrete backend's transport actually supports. The runtime uses
/// this to pick a drawlist wire version no higher than the backend can
/// render and to decide whether router-level clipboard operations have
/// anywhere to go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caps {
    /// Highest drawlist wire version this backend can decode and paint.
    pub drawlist_version: u32,
    /// `SET_CURSOR`/`HIDE_CURSOR` is honored (v2+ per the drawlist format).
    pub cursor: bool,
    /// `DRAW_CANVAS` is honored (v4+).
    pub canvas: bool,
    /// `DRAW_IMAGE` is honored (v5+).
    pub image: bool,
    /// `SET_LINK` / OSC 8 hyperlinks are honored.
    pub link: bool,
    /// `raw_write` forwards bytes straight to the transport, used for OSC 52
    /// clipboard escapes the router issues on copy/cut.
    pub raw_write: bool,
    /// Bracketed paste is enabled, so paste bytes arrive as a single
    /// [`Event::Paste`] rather than as a burst of [`Event::Text`].
    pub bracketed_paste: bool,
}

impl Caps {
    /// Caps matching a backend that speaks every command up to `version`
    /// and supports the rest of the optional surface.
    pub fn full(version: u32) -> Self {
        Self {
            drawlist_version: version,
            cursor: version >= 2,
            canvas: version >= 4,
            image: version >= 5,
            link: true,
            raw_write: true,
            bracketed_paste: true,
        }
    }

    /// Builder caps a [`drawlist::DrawlistBuilder`] should be constructed
    /// with so it never encodes a command this backend can't paint.
    pub fn builder_caps(&self) -> drawlist::BuilderCaps {
        drawlist::BuilderCaps::default()
    }
}

impl Default for Caps {
    fn default() -> Self {
        Self::full(1)
    }
}

//--------------------------------------------------------------------------------------------------
// Event envelope (spec §4.7 / §6)
//--------------------------------------------------------------------------------------------------

bitflags::bitflags! {
    /// Modifier keys held during a key or mouse event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0001;
        const CTRL  = 0b0010;
        const ALT   = 0b0100;
        const SUPER = 0b1000;
    }
}

bitflags::bitflags! {
    /// Mouse buttons currently held down, reported alongside a
    /// [`MouseEventKind`] on every [`Event::Mouse`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct MouseButtons: u8 {
        const LEFT   = 0b001;
        const RIGHT  = 0b010;
        const MIDDLE = 0b100;
    }
}

/// A single mouse button, used by press/release/drag event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// What changed about the pointer on a [`Event::Mouse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseEventKind {
    Down(MouseButton),
    Up(MouseButton),
    Drag(MouseButton),
    Move,
    Wheel,
}

/// Named, non-printable keys. Printable input arrives as [`Event::Text`]
/// instead; `Key::Char` exists only for key combinations (e.g. Ctrl+A) that
/// a host's transport reports as a key rather than text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Char(char),
    Enter,
    Escape,
    Tab,
    Backspace,
    Delete,
    Insert,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    F(u8),
}

/// Whether a key event is the initial press, a held-key repeat, or release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAction {
    Down,
    Repeat,
    Up,
}

/// One input or lifecycle event, as delivered by [`Backend::poll_events`].
/// Each batch is this crate's analogue of the teacher's `crossterm::event`
/// stream, normalized so the router never depends on a terminal crate.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Key { time_ms: u64, key: Key, mods: Modifiers, action: KeyAction },
    Text { time_ms: u64, codepoint: char },
    Paste { time_ms: u64, text: String },
    Mouse {
        time_ms: u64,
        x: u16,
        y: u16,
        kind: MouseEventKind,
        buttons: MouseButtons,
        mods: Modifiers,
        wheel_x: i32,
        wheel_y: i32,
    },
    Resize { time_ms: u64, cols: u16, rows: u16 },
    /// Opaque payload round-tripped through [`Backend::post_user_event`],
    /// used to wake the event loop for an out-of-band completion (an async
    /// validator, a tail-source reconnect) without polling it.
    User(Vec<u8>),
}

/// One poll's worth of events, oldest first.
pub type EventBatch = Vec<Event>;

//--------------------------------------------------------------------------------------------------
// Diagnostics (spec §7)
//--------------------------------------------------------------------------------------------------

/// Severity of a [`Diagnostic`] raised outside the fatal `CoreError` path —
/// recoverable encoder limits, swallowed user-code panics, backend I/O
/// hiccups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticSeverity {
    Warn,
    Error,
}

/// A structured diagnostic routed through the backend rather than returned,
/// for conditions the caller can't usefully `?`-propagate (spec §7: "a
/// structured error via the backend's diagnostic sink").
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: DiagnosticSeverity,
    pub message: String,
}

impl Diagnostic {
    pub fn warn(message: impl Into<String>) -> Self {
        Self { severity: DiagnosticSeverity::Warn, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { severity: DiagnosticSeverity::Error, message: message.into() }
    }
}

//--------------------------------------------------------------------------------------------------
// Backend trait
//--------------------------------------------------------------------------------------------------

/// The host-supplied transport. Implementors own raw mode, the alternate
/// screen, the input thread or poll loop, and whatever clock drives
/// `time_ms` — none of which this crate touches directly.
pub trait Backend {
    /// Enters the backend's active state (raw mode, alternate screen,
    /// bracketed paste, input thread) and returns once ready to accept
    /// frames.
    fn start(&mut self) -> io::Result<()>;

    /// Leaves the active state, restoring whatever `start` changed.
    /// Must be safe to call again after an earlier `stop` (idempotent).
    fn stop(&mut self) -> io::Result<()>;

    /// Releases any resources `start` acquired that `stop` alone wouldn't
    /// (background threads, file descriptors). Called once, after a final
    /// `stop`, as the runtime shuts down.
    fn dispose(&mut self);

    /// Submits one encoded drawlist frame (spec §6's drawlist wire format)
    /// for the backend to paint.
    fn request_frame(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Drains whatever events have arrived since the last call, oldest
    /// first. Must not block; an idle backend returns an empty batch.
    fn poll_events(&mut self) -> EventBatch;

    /// Queues an opaque payload to surface as [`Event::User`] on a future
    /// `poll_events` call, waking a blocked event loop if the backend's
    /// transport needs one.
    fn post_user_event(&mut self, payload: Vec<u8>);

    /// Reports what this backend's transport can paint and accept.
    fn caps(&self) -> Caps;

    /// Forwards `bytes` straight to the underlying transport, used for the
    /// OSC 52 clipboard escape the router issues on copy/cut. The default
    /// implementation fails closed; only implement this when
    /// [`Caps::raw_write`] is `true`.
    fn raw_write(&mut self, _bytes: &[u8]) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "backend does not support raw_write"))
    }

    /// Routes a diagnostic that has nowhere else to go. The default
    /// forwards to `tracing` so a host gets structured logging without
    /// wiring anything up; override to surface diagnostics in a status
    /// bar or a host-owned log sink instead.
    fn report_diagnostic(&self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            DiagnosticSeverity::Warn => tracing::warn!(message = %diagnostic.message, "fluxterm diagnostic"),
            DiagnosticSeverity::Error => tracing::error!(message = %diagnostic.message, "fluxterm diagnostic"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct MockBackend {
        frames: RefCell<Vec<Vec<u8>>>,
        queued: RefCell<EventBatch>,
    }

    impl Backend for MockBackend {
        fn start(&mut self) -> io::Result<()> {
            Ok(())
        }
        fn stop(&mut self) -> io::Result<()> {
            Ok(())
        }
        fn dispose(&mut self) {}
        fn request_frame(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.frames.borrow_mut().push(bytes.to_vec());
            Ok(())
        }
        fn poll_events(&mut self) -> EventBatch {
            std::mem::take(&mut *self.queued.borrow_mut())
        }
        fn post_user_event(&mut self, payload: Vec<u8>) {
            self.queued.borrow_mut().push(Event::User(payload));
        }
        fn caps(&self) -> Caps {
            Caps::full(3)
        }
    }

    #[test]
    fn default_raw_write_fails_closed() {
        let mut backend = MockBackend::default();
        assert!(backend.raw_write(b"\x1b]52;c;...\x07").is_err());
    }

    #[test]
    fn post_user_event_round_trips_through_poll_events() {
        let mut backend = MockBackend::default();
        backend.post_user_event(vec![1, 2, 3]);
        let batch = backend.poll_events();
        assert_eq!(batch, vec![Event::User(vec![1, 2, 3])]);
        assert!(backend.poll_events().is_empty());
    }

    #[test]
    fn caps_full_gates_on_version() {
        let caps = Caps::full(3);
        assert!(caps.cursor);
        assert!(!caps.canvas);
        assert!(!caps.image);
    }

    #[test]
    fn default_report_diagnostic_does_not_panic() {
        let backend = MockBackend::default();
        backend.report_diagnostic(Diagnostic::warn("slow tail source reconnect"));
        backend.report_diagnostic(Diagnostic::error("drawlist exceeded cap"));
    }
}
