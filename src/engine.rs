//! The suspend/resume evaluation engine.
//!
//! A [`Parser`] is a shared closure from `(window, position, more-flag)` to a
//! [`Step`]: either a terminal outcome carrying the window onward, or a
//! suspension whose resumption closure rebuilds a window from the next chunk
//! and re-enters the interrupted operation at the same absolute position.
//! Combinators lift suspensions transparently by wrapping the resumption, so
//! a parser paused ten layers deep picks up exactly where the data ran out.
//!
//! Suspension closures never capture a window: a window is a per-chunk
//! object. They capture the commit mark, the count of bytes still pending,
//! and the parsers needed to continue.

use std::fmt;
use std::rc::Rc;

use crate::error::ParseFailure;
use crate::input::{Source, Window};

/// Whether more input may still arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum More {
    /// No further input will ever arrive.
    Complete,
    /// More input may arrive; a starved primitive suspends instead of
    /// failing.
    Incomplete,
}

/// Internal evaluation step. Terminal variants thread the window by value so
/// downstream combinators can keep reading; [`Step::Partial`] reports how
/// many bytes of the current chunk are committed (safe for the driver to
/// reclaim) and how to continue.
pub(crate) enum Step<A> {
    Done(Window, usize, More, A),
    Fail(Window, usize, More, Vec<String>, String),
    Partial {
        consumed: usize,
        resume: Box<dyn FnOnce(Source, More) -> Step<A>>,
    },
}

impl<A> Step<A> {
    /// A failure with no marks and a canonical primitive message.
    pub(crate) fn fail(window: Window, pos: usize, more: More, message: &str) -> Step<A> {
        Step::Fail(window, pos, more, Vec::new(), message.to_string())
    }
}

/// A composable parser producing values of type `A`.
///
/// Parsers are plain values: cloning is a reference-count bump, and one
/// parser may be run any number of times, including from inside itself via
/// [`fix`](crate::combinator::fix). They are built from the primitives and
/// combinators in [`combinator`](crate::combinator) and run with
/// [`parse`]/[`parse_only`] or the [`buffered`](crate::buffered) driver.
pub struct Parser<A> {
    run: Rc<dyn Fn(Window, usize, More) -> Step<A>>,
}

impl<A> Clone for Parser<A> {
    fn clone(&self) -> Self {
        Parser {
            run: Rc::clone(&self.run),
        }
    }
}

impl<A: 'static> Parser<A> {
    pub(crate) fn from_fn(f: impl Fn(Window, usize, More) -> Step<A> + 'static) -> Self {
        Parser { run: Rc::new(f) }
    }

    #[inline]
    pub(crate) fn step(&self, window: Window, pos: usize, more: More) -> Step<A> {
        (self.run)(window, pos, more)
    }
}

/// Suspends the current operation, reporting the committed prefix of the
/// current chunk, and packages the resumption protocol:
///
/// - a resumed chunk shorter than the bytes still pending means the driver
///   dropped uncommitted input, which is fatal;
/// - if new bytes arrived, `k` runs with `grew = true` on a window anchored
///   at the previous commit mark, at the same absolute position;
/// - if none arrived and the flag is now [`More::Complete`], `k` runs with
///   `grew = false`;
/// - otherwise the engine prompts again.
pub(crate) fn prompt<A: 'static>(
    window: Window,
    pos: usize,
    k: Box<dyn FnOnce(Window, usize, More, bool) -> Step<A>>,
) -> Step<A> {
    let committed = window.committed();
    let pending = window.uncommitted();
    let consumed = window.consumed();
    Step::Partial {
        consumed,
        resume: Box::new(move |source, more| {
            assert!(
                source.len() >= pending,
                "resumed with less input than was left pending"
            );
            let window = Window::new(committed, source);
            if window.uncommitted() > pending {
                k(window, pos, more, true)
            } else if more == More::Complete {
                k(window, pos, more, false)
            } else {
                prompt(window, pos, k)
            }
        }),
    }
}

/// Runs `k` once `n` bytes are available at `pos`, suspending as often as
/// needed to get them; fails with `message` when the input is complete and
/// still too short.
pub(crate) fn ensure<A: 'static>(
    n: usize,
    message: &'static str,
    window: Window,
    pos: usize,
    more: More,
    k: Box<dyn FnOnce(Window, usize, More) -> Step<A>>,
) -> Step<A> {
    if pos + n <= window.end() {
        k(window, pos, more)
    } else if more == More::Complete {
        Step::fail(window, pos, more, message)
    } else {
        prompt(
            window,
            pos,
            Box::new(move |window, pos, more, grew| {
                if grew {
                    ensure(n, message, window, pos, more, k)
                } else {
                    Step::fail(window, pos, more, message)
                }
            }),
        )
    }
}

/// Counts bytes satisfying `pred` from `pos` onward, prompting for more
/// input whenever the scan runs off the end of an incomplete chunk. The
/// position is not advanced; `k` receives the total count and decides what
/// to do with it.
pub(crate) fn scan<A: 'static>(
    pred: Rc<dyn Fn(u8) -> bool>,
    acc: usize,
    window: Window,
    pos: usize,
    more: More,
    k: Box<dyn FnOnce(Window, usize, More, usize) -> Step<A>>,
) -> Step<A> {
    let matched = acc + window.count_while(pos + acc, &|b| pred(b));
    if pos + matched < window.end() || more == More::Complete {
        k(window, pos, more, matched)
    } else {
        prompt(
            window,
            pos,
            Box::new(move |window, pos, more, grew| {
                if grew {
                    scan(pred, matched, window, pos, more, k)
                } else {
                    k(window, pos, more, matched)
                }
            }),
        )
    }
}

/// Outcome of running a parser against (a prefix of) the input.
///
/// `consumed` counts bytes relative to the current chunk: for the terminal
/// variants it is the prefix the parse consumed, for [`State::Partial`] it
/// is the committed prefix the driver is free to reclaim before resuming.
pub enum State<A> {
    /// The parser suspended awaiting more input.
    Partial {
        /// Committed bytes of the current chunk; safe to drop.
        consumed: usize,
        /// Resumption handle; see [`Resume`].
        resume: Resume<A>,
    },
    /// The parser succeeded.
    Done {
        /// Bytes of the current chunk consumed by the parse.
        consumed: usize,
        /// The parsed value.
        value: A,
    },
    /// The parser failed.
    Fail {
        /// Bytes of the current chunk consumed before the failure position.
        consumed: usize,
        /// Named contexts, outermost first.
        marks: Vec<String>,
        /// The primitive cause.
        message: String,
    },
}

impl<A: fmt::Debug> fmt::Debug for State<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Partial { consumed, .. } => f
                .debug_struct("Partial")
                .field("consumed", consumed)
                .finish_non_exhaustive(),
            State::Done { consumed, value } => f
                .debug_struct("Done")
                .field("consumed", consumed)
                .field("value", value)
                .finish(),
            State::Fail {
                consumed,
                marks,
                message,
            } => f
                .debug_struct("Fail")
                .field("consumed", consumed)
                .field("marks", marks)
                .field("message", message)
                .finish(),
        }
    }
}

/// One-shot resumption of a suspended parse.
///
/// The next chunk must start where the reclaimable prefix ended: it is the
/// still-pending bytes of the previous chunk followed by whatever newly
/// arrived. Feeding a shorter chunk panics; that means the driver dropped
/// uncommitted input.
pub struct Resume<A>(Box<dyn FnOnce(Source, More) -> State<A>>);

impl<A> fmt::Debug for Resume<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Resume(..)")
    }
}

impl<A> Resume<A> {
    /// Continues the parse with the next chunk.
    pub fn resume(self, input: impl Into<Source>, more: More) -> State<A> {
        (self.0)(input.into(), more)
    }
}

fn to_state<A: 'static>(step: Step<A>) -> State<A> {
    match step {
        Step::Done(window, pos, _, value) => State::Done {
            consumed: pos - window.start(),
            value,
        },
        Step::Fail(window, pos, _, marks, message) => State::Fail {
            consumed: pos - window.start(),
            marks,
            message,
        },
        Step::Partial { consumed, resume } => State::Partial {
            consumed,
            resume: Resume(Box::new(move |source, more| to_state(resume(source, more)))),
        },
    }
}

/// Runs `p` against `input` with the more-flag [`More::Incomplete`], so a
/// parser that runs out of bytes suspends rather than fails.
pub fn parse<A: 'static>(p: &Parser<A>, input: impl Into<Source>) -> State<A> {
    let window = Window::new(0, input.into());
    to_state(p.step(window, 0, More::Incomplete))
}

/// Runs `p` against the whole of `input` and projects the outcome.
///
/// The more-flag is [`More::Complete`] throughout, so the parser can never
/// suspend.
pub fn parse_only<A: 'static>(
    p: &Parser<A>,
    input: impl Into<Source>,
) -> Result<A, ParseFailure> {
    let window = Window::new(0, input.into());
    match to_state(p.step(window, 0, More::Complete)) {
        State::Done { value, .. } => Ok(value),
        State::Fail { marks, message, .. } => Err(ParseFailure::new(marks, message)),
        State::Partial { .. } => unreachable!("parser suspended on complete input"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combinator::{string, take};

    #[test]
    fn test_parse_suspends_on_starved_input() {
        let p = take(4);
        let state = parse(&p, "ab");
        let resume = match state {
            State::Partial { consumed, resume } => {
                assert_eq!(consumed, 0);
                resume
            }
            _ => panic!("expected a suspension"),
        };
        match resume.resume("abcd", More::Incomplete) {
            State::Done { consumed, value } => {
                assert_eq!(consumed, 4);
                assert_eq!(value, b"abcd".to_vec());
            }
            _ => panic!("expected completion"),
        }
    }

    #[test]
    fn test_resume_without_new_bytes_prompts_again() {
        let p = string("abc");
        let state = parse(&p, "ab");
        let State::Partial { resume, .. } = state else {
            panic!("expected a suspension");
        };
        // Same bytes again: no progress is possible, so the engine asks once
        // more instead of re-entering the primitive.
        let State::Partial { resume, .. } = resume.resume("ab", More::Incomplete) else {
            panic!("expected another suspension");
        };
        match resume.resume("abc", More::Complete) {
            State::Done { value, .. } => assert_eq!(value, b"abc".to_vec()),
            _ => panic!("expected completion"),
        }
    }

    #[test]
    #[should_panic(expected = "less input than was left pending")]
    fn test_resume_with_shrunk_input_is_fatal() {
        let State::Partial { resume, .. } = parse(&take(4), "abc") else {
            panic!("expected a suspension");
        };
        let _ = resume.resume("a", More::Incomplete);
    }

    #[test]
    fn test_parse_only_never_suspends() {
        assert!(parse_only(&take(4), "ab").is_err());
        assert_eq!(parse_only(&take(2), "ab").unwrap(), b"ab".to_vec());
    }
}
