//! The buffered driver.
//!
//! The core drivers hand the resumption problem to the caller: a
//! [`Resume`](crate::Resume) wants the pending tail of the previous chunk
//! glued to the new bytes. This driver owns a [`Buffer`] that does the
//! gluing, so callers just [`feed`](State::feed) chunks as they arrive and a
//! [`Feed::Eof`] once the input ends.
//!
//! Whatever the parser commits is reclaimed from the buffer before the next
//! resumption, so memory stays bounded by the distance between commits, not
//! by the input size.

use crate::buffer::{Buffer, Unconsumed};
use crate::engine::{self, More, Parser, Resume};
use crate::error::ParseFailure;
use crate::input::Source;

/// Logging macros - no-op when the logging feature is disabled
#[cfg(not(feature = "logging"))]
macro_rules! log_debug {
    ($($arg:tt)*) => {};
}

/// Logging macros - use the log crate when the logging feature is enabled
#[cfg(feature = "logging")]
macro_rules! log_debug {
    ($($arg:tt)*) => { log::debug!($($arg)*) };
}

/// Default initial buffer capacity in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// One step of input for [`State::feed`].
#[derive(Debug, Clone)]
pub enum Feed {
    /// The next chunk of input.
    Chunk(Vec<u8>),
    /// No more input will arrive.
    Eof,
}

impl From<&str> for Feed {
    fn from(s: &str) -> Self {
        Feed::Chunk(s.as_bytes().to_vec())
    }
}

impl From<&[u8]> for Feed {
    fn from(bytes: &[u8]) -> Self {
        Feed::Chunk(bytes.to_vec())
    }
}

impl From<Vec<u8>> for Feed {
    fn from(bytes: Vec<u8>) -> Self {
        Feed::Chunk(bytes)
    }
}

/// A buffered parse in progress or finished.
///
/// Terminal states keep the unconsumed tail: feeding further chunks into a
/// terminal state extends that tail, so a driver looping over a stream can
/// keep pushing data without checking first.
pub enum State<A> {
    /// The parse is suspended; feed it a chunk or [`Feed::Eof`].
    Partial(Buffering<A>),
    /// The parse succeeded, leaving `Unconsumed` input behind.
    Done(Unconsumed, A),
    /// The parse failed at some point, leaving the rest unconsumed.
    Fail(Unconsumed, Vec<String>, String),
}

impl<A: std::fmt::Debug> std::fmt::Debug for State<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            State::Partial(_) => f.write_str("Partial(..)"),
            State::Done(tail, value) => f.debug_tuple("Done").field(tail).field(value).finish(),
            State::Fail(tail, marks, message) => f
                .debug_tuple("Fail")
                .field(tail)
                .field(marks)
                .field(message)
                .finish(),
        }
    }
}

/// The suspended half of a buffered parse: the buffer plus the engine's
/// resumption, with the committed prefix not yet reclaimed.
pub struct Buffering<A> {
    buffer: Buffer,
    reclaimable: usize,
    resume: Resume<A>,
}

/// Runs `p` with an empty initial input and the default buffer size.
pub fn parse<A: 'static>(p: &Parser<A>) -> State<A> {
    parse_with(p, DEFAULT_BUFFER_SIZE, &[])
}

/// Runs `p` against `input` with a buffer pre-sized to
/// `max(initial_buffer_size, input.len())`.
///
/// Panics if `initial_buffer_size` is zero; that is a configuration error,
/// not a parse failure.
pub fn parse_with<A: 'static>(p: &Parser<A>, initial_buffer_size: usize, input: &[u8]) -> State<A> {
    assert!(
        initial_buffer_size >= 1,
        "initial buffer size must be at least one byte"
    );
    let mut buffer = Buffer::with_capacity(initial_buffer_size.max(input.len()));
    buffer.feed(input);
    log_debug!("buffered parse: {} initial bytes", input.len());
    let state = engine::parse(p, Source::from(buffer.view()));
    wrap(buffer, state)
}

fn wrap<A: 'static>(mut buffer: Buffer, state: engine::State<A>) -> State<A> {
    match state {
        engine::State::Partial { consumed, resume } => State::Partial(Buffering {
            buffer,
            reclaimable: consumed,
            resume,
        }),
        engine::State::Done { consumed, value } => {
            log_debug!("buffered parse done: {} bytes consumed", consumed);
            buffer.consume(consumed);
            State::Done(buffer.unconsumed(), value)
        }
        engine::State::Fail {
            consumed,
            marks,
            message,
        } => {
            log_debug!("buffered parse failed: {}", message);
            buffer.consume(consumed);
            State::Fail(buffer.unconsumed(), marks, message)
        }
    }
}

impl<A: 'static> State<A> {
    /// Advances the parse with the next chunk or with end-of-input.
    ///
    /// Feeding a chunk into a terminal state extends its unconsumed tail;
    /// feeding `Eof` into a terminal state is a no-op.
    pub fn feed(self, input: impl Into<Feed>) -> State<A> {
        match (self, input.into()) {
            (State::Partial(buffering), input) => buffering.advance(input),
            (State::Done(mut tail, value), Feed::Chunk(bytes)) => {
                tail.extend(&bytes);
                State::Done(tail, value)
            }
            (State::Fail(mut tail, marks, message), Feed::Chunk(bytes)) => {
                tail.extend(&bytes);
                State::Fail(tail, marks, message)
            }
            (done, Feed::Eof) => done,
        }
    }

    /// The parsed value, if the parse succeeded.
    pub fn to_option(self) -> Option<A> {
        match self {
            State::Done(_, value) => Some(value),
            _ => None,
        }
    }

    /// The parsed value or the failure; a parse still awaiting input becomes
    /// the `"incomplete input"` failure.
    pub fn to_result(self) -> Result<A, ParseFailure> {
        match self {
            State::Done(_, value) => Ok(value),
            State::Fail(_, marks, message) => Err(ParseFailure::new(marks, message)),
            State::Partial(_) => Err(ParseFailure::incomplete()),
        }
    }

    /// The unconsumed tail of a finished parse.
    pub fn to_unconsumed(&self) -> Option<&Unconsumed> {
        match self {
            State::Done(tail, _) => Some(tail),
            State::Fail(tail, _, _) => Some(tail),
            State::Partial(_) => None,
        }
    }
}

impl<A: 'static> Buffering<A> {
    fn advance(mut self, input: Feed) -> State<A> {
        // The committed prefix reported at suspension is dead; reclaim it
        // before presenting the buffer again.
        self.buffer.consume(self.reclaimable);
        match input {
            Feed::Chunk(bytes) => {
                log_debug!("buffered feed: {} bytes", bytes.len());
                self.buffer.feed(&bytes);
                let state = self
                    .resume
                    .resume(Source::from(self.buffer.view()), More::Incomplete);
                wrap(self.buffer, state)
            }
            Feed::Eof => {
                log_debug!("buffered feed: eof");
                let mut state = self
                    .resume
                    .resume(Source::from(self.buffer.view()), More::Complete);
                // A choice entered before the suspension can retry its right
                // branch under the flag it saw on entry, which prompts once
                // more; keep answering Complete until the engine settles.
                loop {
                    match state {
                        engine::State::Partial { consumed, resume } => {
                            self.buffer.consume(consumed);
                            state = resume.resume(Source::from(self.buffer.view()), More::Complete);
                        }
                        terminal => return wrap(self.buffer, terminal),
                    }
                }
            }
        }
    }
}
