//! The public combinator algebra.
//!
//! Primitives read bytes through the engine's `ensure`/`scan` helpers, so
//! every one of them suspends cleanly at a chunk boundary and resumes at the
//! same absolute position. Sequencing combinators chain on success, biased
//! choice rewinds to the entry position unless a [`commit`] raised the
//! low-water mark past it, and [`label`](Parser::label) pushes a named
//! context onto failures passing through.
//!
//! Repetition combinators are iterative at the step level: parsing a million
//! items with [`many`] uses constant stack, and the recursion that remains is
//! bounded by grammar nesting (via [`fix`]), not input length.

use std::rc::Rc;

use once_cell::unsync::OnceCell;

use crate::engine::{ensure, prompt, scan, More, Parser, Step};
use crate::input::Window;

// ============================================================================
// Sequencing
// ============================================================================

impl<A: 'static> Parser<A> {
    /// Monadic bind: runs `self`, then runs the parser `f` builds from its
    /// value.
    pub fn and_then<B, F>(self, f: F) -> Parser<B>
    where
        B: 'static,
        F: Fn(A) -> Parser<B> + 'static,
    {
        let f: Rc<dyn Fn(A) -> Parser<B>> = Rc::new(f);
        Parser::from_fn(move |window, pos, more| {
            bind_step(self.step(window, pos, more), Rc::clone(&f))
        })
    }

    /// Applies `f` to the parsed value.
    pub fn map<B, F>(self, f: F) -> Parser<B>
    where
        B: 'static,
        F: Fn(A) -> B + 'static,
    {
        let f: Rc<dyn Fn(A) -> B> = Rc::new(f);
        Parser::from_fn(move |window, pos, more| {
            map_step(self.step(window, pos, more), Rc::clone(&f))
        })
    }

    /// Runs `self`, discards its value, and runs `q`.
    pub fn with<B: 'static>(self, q: Parser<B>) -> Parser<B> {
        self.and_then(move |_| q.clone())
    }

    /// Runs `self`, then `q`, keeping the first value.
    pub fn skip<B: 'static>(self, q: Parser<B>) -> Parser<A> {
        Parser::from_fn(move |window, pos, more| {
            skip_step(self.step(window, pos, more), q.clone())
        })
    }

    /// Biased choice: if `self` fails without having committed past the
    /// entry position, runs `q` from that position instead.
    pub fn or(self, q: Parser<A>) -> Parser<A> {
        Parser::from_fn(move |window, pos, more| {
            alt_step(self.step(window, pos, more), q.clone(), pos, more)
        })
    }

    /// Names the surrounding context: failures passing through gain `mark`
    /// at the front of their context trail.
    pub fn label(self, mark: impl Into<String>) -> Parser<A> {
        let mark = mark.into();
        Parser::from_fn(move |window, pos, more| {
            mark_step(self.step(window, pos, more), mark.clone())
        })
    }
}

impl<A: 'static> std::ops::BitOr for Parser<A> {
    type Output = Parser<A>;

    /// `p | q` is [`Parser::or`].
    fn bitor(self, rhs: Parser<A>) -> Parser<A> {
        self.or(rhs)
    }
}

fn bind_step<A: 'static, B: 'static>(step: Step<A>, f: Rc<dyn Fn(A) -> Parser<B>>) -> Step<B> {
    match step {
        Step::Done(window, pos, more, value) => f(value).step(window, pos, more),
        Step::Fail(window, pos, more, marks, message) => {
            Step::Fail(window, pos, more, marks, message)
        }
        Step::Partial { consumed, resume } => Step::Partial {
            consumed,
            resume: Box::new(move |source, more| bind_step(resume(source, more), f)),
        },
    }
}

fn map_step<A: 'static, B: 'static>(step: Step<A>, f: Rc<dyn Fn(A) -> B>) -> Step<B> {
    match step {
        Step::Done(window, pos, more, value) => Step::Done(window, pos, more, f(value)),
        Step::Fail(window, pos, more, marks, message) => {
            Step::Fail(window, pos, more, marks, message)
        }
        Step::Partial { consumed, resume } => Step::Partial {
            consumed,
            resume: Box::new(move |source, more| map_step(resume(source, more), f)),
        },
    }
}

fn skip_step<A: 'static, B: 'static>(step: Step<A>, q: Parser<B>) -> Step<A> {
    match step {
        Step::Done(window, pos, more, value) => keep_step(q.step(window, pos, more), value),
        Step::Fail(window, pos, more, marks, message) => {
            Step::Fail(window, pos, more, marks, message)
        }
        Step::Partial { consumed, resume } => Step::Partial {
            consumed,
            resume: Box::new(move |source, more| skip_step(resume(source, more), q)),
        },
    }
}

fn keep_step<A: 'static, B: 'static>(step: Step<B>, value: A) -> Step<A> {
    match step {
        Step::Done(window, pos, more, _) => Step::Done(window, pos, more, value),
        Step::Fail(window, pos, more, marks, message) => {
            Step::Fail(window, pos, more, marks, message)
        }
        Step::Partial { consumed, resume } => Step::Partial {
            consumed,
            resume: Box::new(move |source, more| keep_step(resume(source, more), value)),
        },
    }
}

fn alt_step<A: 'static>(step: Step<A>, q: Parser<A>, start: usize, entry: More) -> Step<A> {
    match step {
        Step::Done(window, pos, more, value) => Step::Done(window, pos, more, value),
        Step::Fail(window, pos, more, marks, message) => {
            if start < window.committed() {
                // A commit fired inside the left branch; rewinding past the
                // low-water mark is forbidden.
                Step::Fail(window, pos, more, marks, message)
            } else {
                q.step(window, start, entry)
            }
        }
        Step::Partial { consumed, resume } => Step::Partial {
            consumed,
            resume: Box::new(move |source, more| alt_step(resume(source, more), q, start, entry)),
        },
    }
}

fn mark_step<A: 'static>(step: Step<A>, mark: String) -> Step<A> {
    match step {
        Step::Done(window, pos, more, value) => Step::Done(window, pos, more, value),
        Step::Fail(window, pos, more, mut marks, message) => {
            marks.insert(0, mark);
            Step::Fail(window, pos, more, marks, message)
        }
        Step::Partial { consumed, resume } => Step::Partial {
            consumed,
            resume: Box::new(move |source, more| mark_step(resume(source, more), mark)),
        },
    }
}

/// Always succeeds with a clone of `v`, consuming nothing.
pub fn value<A: Clone + 'static>(v: A) -> Parser<A> {
    Parser::from_fn(move |window, pos, more| Step::Done(window, pos, more, v.clone()))
}

/// Always fails with `message`, consuming nothing.
pub fn fail<A: 'static>(message: impl Into<String>) -> Parser<A> {
    let message = message.into();
    Parser::from_fn(move |window, pos, more| {
        Step::Fail(window, pos, more, Vec::new(), message.clone())
    })
}

/// Applies `f` to the value of `p`; the function-first spelling of
/// [`Parser::map`].
pub fn lift<A, B, F>(f: F, p: Parser<A>) -> Parser<B>
where
    A: 'static,
    B: 'static,
    F: Fn(A) -> B + 'static,
{
    p.map(f)
}

/// Runs `pa` then `pb` and combines their values with `f`.
pub fn lift2<A, B, C, F>(f: F, pa: Parser<A>, pb: Parser<B>) -> Parser<C>
where
    A: 'static,
    B: 'static,
    C: 'static,
    F: Fn(A, B) -> C + 'static,
{
    let f: Rc<dyn Fn(A, B) -> C> = Rc::new(f);
    Parser::from_fn(move |window, pos, more| {
        lift2_first(pa.step(window, pos, more), pb.clone(), Rc::clone(&f))
    })
}

fn lift2_first<A: 'static, B: 'static, C: 'static>(
    step: Step<A>,
    pb: Parser<B>,
    f: Rc<dyn Fn(A, B) -> C>,
) -> Step<C> {
    match step {
        Step::Done(window, pos, more, a) => lift2_second(pb.step(window, pos, more), a, f),
        Step::Fail(window, pos, more, marks, message) => {
            Step::Fail(window, pos, more, marks, message)
        }
        Step::Partial { consumed, resume } => Step::Partial {
            consumed,
            resume: Box::new(move |source, more| lift2_first(resume(source, more), pb, f)),
        },
    }
}

fn lift2_second<A: 'static, B: 'static, C: 'static>(
    step: Step<B>,
    a: A,
    f: Rc<dyn Fn(A, B) -> C>,
) -> Step<C> {
    match step {
        Step::Done(window, pos, more, b) => Step::Done(window, pos, more, f(a, b)),
        Step::Fail(window, pos, more, marks, message) => {
            Step::Fail(window, pos, more, marks, message)
        }
        Step::Partial { consumed, resume } => Step::Partial {
            consumed,
            resume: Box::new(move |source, more| lift2_second(resume(source, more), a, f)),
        },
    }
}

/// Runs three parsers in sequence and combines their values with `f`.
pub fn lift3<A, B, C, D, F>(f: F, pa: Parser<A>, pb: Parser<B>, pc: Parser<C>) -> Parser<D>
where
    A: 'static,
    B: 'static,
    C: 'static,
    D: 'static,
    F: Fn(A, B, C) -> D + 'static,
{
    lift2(move |(a, b), c| f(a, b, c), lift2(|a, b| (a, b), pa, pb), pc)
}

/// Runs four parsers in sequence and combines their values with `f`.
pub fn lift4<A, B, C, D, E, F>(
    f: F,
    pa: Parser<A>,
    pb: Parser<B>,
    pc: Parser<C>,
    pd: Parser<D>,
) -> Parser<E>
where
    A: 'static,
    B: 'static,
    C: 'static,
    D: 'static,
    E: 'static,
    F: Fn(A, B, C, D) -> E + 'static,
{
    lift2(
        move |((a, b), c), d| f(a, b, c, d),
        lift2(|ab, c| (ab, c), lift2(|a, b| (a, b), pa, pb), pc),
        pd,
    )
}

// ============================================================================
// Primitives
// ============================================================================

/// The next byte without consuming it, or `None` at the definite end of
/// input. Never fails.
pub fn peek_byte() -> Parser<Option<u8>> {
    Parser::from_fn(|window, pos, more| peek_byte_step(window, pos, more))
}

fn peek_byte_step(window: Window, pos: usize, more: More) -> Step<Option<u8>> {
    if pos < window.end() {
        let b = window.get(pos);
        Step::Done(window, pos, more, Some(b))
    } else if more == More::Complete {
        Step::Done(window, pos, more, None)
    } else {
        prompt(
            window,
            pos,
            Box::new(|window, pos, more, grew| {
                if grew {
                    peek_byte_step(window, pos, more)
                } else {
                    Step::Done(window, pos, more, None)
                }
            }),
        )
    }
}

/// The next byte without consuming it; fails at end of input.
pub fn peek_byte_fail() -> Parser<u8> {
    Parser::from_fn(|window, pos, more| {
        ensure(
            1,
            "peek_byte_fail",
            window,
            pos,
            more,
            Box::new(|window, pos, more| {
                let b = window.get(pos);
                Step::Done(window, pos, more, b)
            }),
        )
    })
}

/// The next `n` bytes without consuming them.
pub fn peek_bytes(n: usize) -> Parser<Vec<u8>> {
    Parser::from_fn(move |window, pos, more| {
        ensure(
            n,
            "not enough input",
            window,
            pos,
            more,
            Box::new(move |window, pos, more| {
                let bytes = window.substring(pos, n);
                Step::Done(window, pos, more, bytes)
            }),
        )
    })
}

/// Any single byte.
pub fn any_byte() -> Parser<u8> {
    Parser::from_fn(|window, pos, more| {
        ensure(
            1,
            "not enough input",
            window,
            pos,
            more,
            Box::new(|window, pos, more| {
                let b = window.get(pos);
                Step::Done(window, pos + 1, more, b)
            }),
        )
    })
}

/// A byte for which `pred` holds.
pub fn satisfy(pred: impl Fn(u8) -> bool + 'static) -> Parser<u8> {
    let pred = Rc::new(pred);
    Parser::from_fn(move |window, pos, more| {
        let pred = Rc::clone(&pred);
        ensure(
            1,
            "not enough input",
            window,
            pos,
            more,
            Box::new(move |window, pos, more| {
                let b = window.get(pos);
                if pred(b) {
                    Step::Done(window, pos + 1, more, b)
                } else {
                    Step::fail(window, pos, more, "satisfy")
                }
            }),
        )
    })
}

/// Consumes a byte for which `pred` holds, discarding it.
pub fn skip(pred: impl Fn(u8) -> bool + 'static) -> Parser<()> {
    let pred = Rc::new(pred);
    Parser::from_fn(move |window, pos, more| {
        let pred = Rc::clone(&pred);
        ensure(
            1,
            "not enough input",
            window,
            pos,
            more,
            Box::new(move |window, pos, more| {
                if pred(window.get(pos)) {
                    Step::Done(window, pos + 1, more, ())
                } else {
                    Step::fail(window, pos, more, "skip")
                }
            }),
        )
    })
}

/// Exactly the byte `expected`.
pub fn byte(expected: u8) -> Parser<u8> {
    Parser::from_fn(move |window, pos, more| {
        ensure(
            1,
            "not enough input",
            window,
            pos,
            more,
            Box::new(move |window, pos, more| {
                let b = window.get(pos);
                if b == expected {
                    Step::Done(window, pos + 1, more, b)
                } else {
                    let message = format!("'{}'", expected.escape_ascii());
                    Step::Fail(window, pos, more, Vec::new(), message)
                }
            }),
        )
    })
}

/// Any byte other than `rejected`.
pub fn not_byte(rejected: u8) -> Parser<u8> {
    Parser::from_fn(move |window, pos, more| {
        ensure(
            1,
            "not enough input",
            window,
            pos,
            more,
            Box::new(move |window, pos, more| {
                let b = window.get(pos);
                if b != rejected {
                    Step::Done(window, pos + 1, more, b)
                } else {
                    let message = format!("not '{}'", rejected.escape_ascii());
                    Step::Fail(window, pos, more, Vec::new(), message)
                }
            }),
        )
    })
}

/// Exactly the byte sequence `expected`, returning the matched bytes.
pub fn string(expected: impl AsRef<[u8]>) -> Parser<Vec<u8>> {
    let expected: Rc<[u8]> = Rc::from(expected.as_ref());
    Parser::from_fn(move |window, pos, more| {
        let expected = Rc::clone(&expected);
        let n = expected.len();
        ensure(
            n,
            "not enough input",
            window,
            pos,
            more,
            Box::new(move |window, pos, more| {
                if window.slice(pos, n) == &expected[..] {
                    let matched = window.substring(pos, n);
                    Step::Done(window, pos + n, more, matched)
                } else {
                    Step::fail(window, pos, more, "string")
                }
            }),
        )
    })
}

/// `expected` up to ASCII case, returning the input's own spelling.
pub fn string_ci(expected: impl AsRef<[u8]>) -> Parser<Vec<u8>> {
    let expected: Rc<[u8]> = Rc::from(expected.as_ref());
    Parser::from_fn(move |window, pos, more| {
        let expected = Rc::clone(&expected);
        let n = expected.len();
        ensure(
            n,
            "not enough input",
            window,
            pos,
            more,
            Box::new(move |window, pos, more| {
                if window.slice(pos, n).eq_ignore_ascii_case(&expected) {
                    let matched = window.substring(pos, n);
                    Step::Done(window, pos + n, more, matched)
                } else {
                    Step::fail(window, pos, more, "string_ci")
                }
            }),
        )
    })
}

/// Exactly `n` bytes.
pub fn take(n: usize) -> Parser<Vec<u8>> {
    Parser::from_fn(move |window, pos, more| {
        ensure(
            n,
            "not enough input",
            window,
            pos,
            more,
            Box::new(move |window, pos, more| {
                let bytes = window.substring(pos, n);
                Step::Done(window, pos + n, more, bytes)
            }),
        )
    })
}

/// Exactly `N` bytes as a fixed-size array. Backs the endian readers.
pub(crate) fn take_array<const N: usize>() -> Parser<[u8; N]> {
    Parser::from_fn(move |window, pos, more| {
        ensure(
            N,
            "not enough input",
            window,
            pos,
            more,
            Box::new(move |window, pos, more| {
                let mut out = [0u8; N];
                out.copy_from_slice(window.slice(pos, N));
                Step::Done(window, pos + N, more, out)
            }),
        )
    })
}

/// The longest (possibly empty) prefix of bytes satisfying `pred`. Never
/// fails.
pub fn take_while(pred: impl Fn(u8) -> bool + 'static) -> Parser<Vec<u8>> {
    let pred: Rc<dyn Fn(u8) -> bool> = Rc::new(pred);
    Parser::from_fn(move |window, pos, more| {
        scan(
            Rc::clone(&pred),
            0,
            window,
            pos,
            more,
            Box::new(|window, pos, more, n| {
                let bytes = window.substring(pos, n);
                Step::Done(window, pos + n, more, bytes)
            }),
        )
    })
}

/// Like [`take_while`] but the prefix must be non-empty.
pub fn take_while1(pred: impl Fn(u8) -> bool + 'static) -> Parser<Vec<u8>> {
    let pred: Rc<dyn Fn(u8) -> bool> = Rc::new(pred);
    Parser::from_fn(move |window, pos, more| {
        scan(
            Rc::clone(&pred),
            0,
            window,
            pos,
            more,
            Box::new(|window, pos, more, n| {
                if n == 0 {
                    Step::fail(window, pos, more, "take_while1")
                } else {
                    let bytes = window.substring(pos, n);
                    Step::Done(window, pos + n, more, bytes)
                }
            }),
        )
    })
}

/// Bytes up to (not including) the first one satisfying `pred`.
pub fn take_till(pred: impl Fn(u8) -> bool + 'static) -> Parser<Vec<u8>> {
    take_while(move |b| !pred(b))
}

/// Consumes the longest prefix satisfying `pred`, discarding it.
pub fn skip_while(pred: impl Fn(u8) -> bool + 'static) -> Parser<()> {
    let pred: Rc<dyn Fn(u8) -> bool> = Rc::new(pred);
    Parser::from_fn(move |window, pos, more| {
        scan(
            Rc::clone(&pred),
            0,
            window,
            pos,
            more,
            Box::new(|window, pos, more, n| Step::Done(window, pos + n, more, ())),
        )
    })
}

/// Everything up to the definite end of input.
pub fn take_rest() -> Parser<Vec<u8>> {
    take_while(|_| true)
}

/// Skips `n` bytes.
pub fn advance(n: usize) -> Parser<()> {
    Parser::from_fn(move |window, pos, more| {
        ensure(
            n,
            "not enough input",
            window,
            pos,
            more,
            Box::new(move |window, pos, more| Step::Done(window, pos + n, more, ())),
        )
    })
}

/// Succeeds only when every byte has been consumed and no more will arrive.
pub fn end_of_input() -> Parser<()> {
    Parser::from_fn(|window, pos, more| end_of_input_step(window, pos, more))
}

fn end_of_input_step(window: Window, pos: usize, more: More) -> Step<()> {
    if pos < window.end() {
        Step::fail(window, pos, more, "end_of_input")
    } else if more == More::Complete {
        Step::Done(window, pos, more, ())
    } else {
        // Bytes arriving after the prompt mean we were not at the end after
        // all; no new bytes under a complete flag means we were.
        prompt(
            window,
            pos,
            Box::new(|window, pos, more, grew| {
                if grew {
                    Step::fail(window, pos, more, "end_of_input")
                } else {
                    Step::Done(window, pos, more, ())
                }
            }),
        )
    }
}

/// A line feed, or a carriage return followed by a line feed.
pub fn end_of_line() -> Parser<()> {
    (byte(b'\n').map(|_| ()))
        .or(string("\r\n").map(|_| ()))
        .label("end_of_line")
}

/// Raises the commit low-water mark to the current position.
///
/// No enclosing choice can rewind past a committed position, which is what
/// lets a driver reclaim everything below it. Long-running parsers should
/// commit periodically; between commits, all input since the last commit
/// stays pinned in memory.
pub fn commit() -> Parser<()> {
    Parser::from_fn(|mut window, pos, more| {
        window.commit(pos);
        Step::Done(window, pos, more, ())
    })
}

/// The current absolute position.
pub fn pos() -> Parser<usize> {
    Parser::from_fn(|window, at, more| Step::Done(window, at, more, at))
}

/// How many bytes are currently available without suspending.
pub fn available() -> Parser<usize> {
    Parser::from_fn(|window, pos, more| {
        let n = window.end() - pos;
        Step::Done(window, pos, more, n)
    })
}

// ============================================================================
// Choice
// ============================================================================

/// Tries each parser in order at the same position.
pub fn choice<A: 'static>(parsers: Vec<Parser<A>>) -> Parser<A> {
    parsers
        .into_iter()
        .rev()
        .fold(fail("no more choices"), |rest, p| p.or(rest))
}

/// Runs `p`, yielding `default` if it fails without committing.
pub fn option<A: Clone + 'static>(default: A, p: Parser<A>) -> Parser<A> {
    p.or(value(default))
}

// ============================================================================
// Repetition
// ============================================================================

/// `p` zero or more times, until it fails without committing.
///
/// A `p` that succeeds without consuming input will repeat forever. No
/// implicit commit is inserted; call [`commit`] inside long repetitions to
/// bound memory.
pub fn many<A: 'static>(p: Parser<A>) -> Parser<Vec<A>> {
    Parser::from_fn(move |window, pos, more| many_run(p.clone(), Vec::new(), window, pos, more))
}

fn many_run<A: 'static>(
    p: Parser<A>,
    mut acc: Vec<A>,
    mut window: Window,
    mut pos: usize,
    mut more: More,
) -> Step<Vec<A>> {
    loop {
        let start = pos;
        match p.step(window, pos, more) {
            Step::Done(w, np, nm, item) => {
                acc.push(item);
                window = w;
                pos = np;
                more = nm;
            }
            Step::Fail(w, fp, fm, marks, message) => {
                return if start < w.committed() {
                    Step::Fail(w, fp, fm, marks, message)
                } else {
                    Step::Done(w, start, more, acc)
                };
            }
            Step::Partial { consumed, resume } => {
                return Step::Partial {
                    consumed,
                    resume: Box::new(move |source, m| {
                        many_finish(p, acc, start, more, resume(source, m))
                    }),
                };
            }
        }
    }
}

fn many_finish<A: 'static>(
    p: Parser<A>,
    mut acc: Vec<A>,
    start: usize,
    entry: More,
    step: Step<A>,
) -> Step<Vec<A>> {
    match step {
        Step::Done(w, np, nm, item) => {
            acc.push(item);
            many_run(p, acc, w, np, nm)
        }
        Step::Fail(w, fp, fm, marks, message) => {
            if start < w.committed() {
                Step::Fail(w, fp, fm, marks, message)
            } else {
                Step::Done(w, start, entry, acc)
            }
        }
        Step::Partial { consumed, resume } => Step::Partial {
            consumed,
            resume: Box::new(move |source, m| {
                many_finish(p, acc, start, entry, resume(source, m))
            }),
        },
    }
}

/// `p` one or more times.
pub fn many1<A: 'static>(p: Parser<A>) -> Parser<Vec<A>> {
    lift2(
        |first, mut rest: Vec<A>| {
            rest.insert(0, first);
            rest
        },
        p.clone(),
        many(p),
    )
}

/// `p` repeatedly until `end` matches; yields the collected `p` values.
pub fn many_till<A: 'static, B: 'static>(p: Parser<A>, end: Parser<B>) -> Parser<Vec<A>> {
    Parser::from_fn(move |window, pos, more| {
        till_run(p.clone(), end.clone(), Vec::new(), window, pos, more)
    })
}

fn till_run<A: 'static, B: 'static>(
    p: Parser<A>,
    end: Parser<B>,
    mut acc: Vec<A>,
    mut window: Window,
    mut pos: usize,
    mut more: More,
) -> Step<Vec<A>> {
    loop {
        let start = pos;
        match end.step(window, pos, more) {
            Step::Done(w, np, nm, _) => return Step::Done(w, np, nm, acc),
            Step::Fail(w, fp, fm, marks, message) => {
                if start < w.committed() {
                    return Step::Fail(w, fp, fm, marks, message);
                }
                match p.step(w, start, more) {
                    Step::Done(w2, np, nm, item) => {
                        acc.push(item);
                        window = w2;
                        pos = np;
                        more = nm;
                    }
                    Step::Fail(w2, fp2, fm2, marks2, message2) => {
                        return Step::Fail(w2, fp2, fm2, marks2, message2);
                    }
                    Step::Partial { consumed, resume } => {
                        return Step::Partial {
                            consumed,
                            resume: Box::new(move |source, m| {
                                till_item(p, end, acc, resume(source, m))
                            }),
                        };
                    }
                }
            }
            Step::Partial { consumed, resume } => {
                return Step::Partial {
                    consumed,
                    resume: Box::new(move |source, m| {
                        till_end(p, end, acc, start, more, resume(source, m))
                    }),
                };
            }
        }
    }
}

fn till_end<A: 'static, B: 'static>(
    p: Parser<A>,
    end: Parser<B>,
    acc: Vec<A>,
    start: usize,
    entry: More,
    step: Step<B>,
) -> Step<Vec<A>> {
    match step {
        Step::Done(w, np, nm, _) => Step::Done(w, np, nm, acc),
        Step::Fail(w, fp, fm, marks, message) => {
            if start < w.committed() {
                Step::Fail(w, fp, fm, marks, message)
            } else {
                let step = p.step(w, start, entry);
                till_item(p, end, acc, step)
            }
        }
        Step::Partial { consumed, resume } => Step::Partial {
            consumed,
            resume: Box::new(move |source, m| {
                till_end(p, end, acc, start, entry, resume(source, m))
            }),
        },
    }
}

fn till_item<A: 'static, B: 'static>(
    p: Parser<A>,
    end: Parser<B>,
    mut acc: Vec<A>,
    step: Step<A>,
) -> Step<Vec<A>> {
    match step {
        Step::Done(w, np, nm, item) => {
            acc.push(item);
            till_run(p, end, acc, w, np, nm)
        }
        Step::Fail(w, fp, fm, marks, message) => Step::Fail(w, fp, fm, marks, message),
        Step::Partial { consumed, resume } => Step::Partial {
            consumed,
            resume: Box::new(move |source, m| till_item(p, end, acc, resume(source, m))),
        },
    }
}

/// One or more `p` separated by `sep`.
pub fn sep_by1<A: 'static, S: 'static>(p: Parser<A>, sep: Parser<S>) -> Parser<Vec<A>> {
    Parser::from_fn(move |window, pos, more| {
        let step = p.step(window, pos, more);
        sep_head(p.clone(), sep.clone(), step)
    })
}

/// Zero or more `p` separated by `sep`.
pub fn sep_by<A: 'static, S: 'static>(p: Parser<A>, sep: Parser<S>) -> Parser<Vec<A>> {
    sep_by1(p, sep).or(Parser::from_fn(|window, pos, more| {
        Step::Done(window, pos, more, Vec::new())
    }))
}

fn sep_head<A: 'static, S: 'static>(p: Parser<A>, sep: Parser<S>, step: Step<A>) -> Step<Vec<A>> {
    match step {
        Step::Done(w, np, nm, first) => sep_loop(p, sep, vec![first], w, np, nm),
        Step::Fail(w, fp, fm, marks, message) => Step::Fail(w, fp, fm, marks, message),
        Step::Partial { consumed, resume } => Step::Partial {
            consumed,
            resume: Box::new(move |source, m| sep_head(p, sep, resume(source, m))),
        },
    }
}

fn sep_loop<A: 'static, S: 'static>(
    p: Parser<A>,
    sep: Parser<S>,
    mut acc: Vec<A>,
    mut window: Window,
    mut pos: usize,
    mut more: More,
) -> Step<Vec<A>> {
    loop {
        // The separator and the following item rewind as one unit.
        let start = pos;
        match sep.step(window, pos, more) {
            Step::Done(w, np, nm, _) => match p.step(w, np, nm) {
                Step::Done(w2, np2, nm2, item) => {
                    acc.push(item);
                    window = w2;
                    pos = np2;
                    more = nm2;
                }
                Step::Fail(w2, fp, fm, marks, message) => {
                    return if start < w2.committed() {
                        Step::Fail(w2, fp, fm, marks, message)
                    } else {
                        Step::Done(w2, start, more, acc)
                    };
                }
                Step::Partial { consumed, resume } => {
                    return Step::Partial {
                        consumed,
                        resume: Box::new(move |source, m| {
                            sep_item(p, sep, acc, start, more, resume(source, m))
                        }),
                    };
                }
            },
            Step::Fail(w, fp, fm, marks, message) => {
                return if start < w.committed() {
                    Step::Fail(w, fp, fm, marks, message)
                } else {
                    Step::Done(w, start, more, acc)
                };
            }
            Step::Partial { consumed, resume } => {
                return Step::Partial {
                    consumed,
                    resume: Box::new(move |source, m| {
                        sep_tail(p, sep, acc, start, more, resume(source, m))
                    }),
                };
            }
        }
    }
}

fn sep_tail<A: 'static, S: 'static>(
    p: Parser<A>,
    sep: Parser<S>,
    acc: Vec<A>,
    start: usize,
    entry: More,
    step: Step<S>,
) -> Step<Vec<A>> {
    match step {
        Step::Done(w, np, nm, _) => {
            let step = p.step(w, np, nm);
            sep_item(p, sep, acc, start, entry, step)
        }
        Step::Fail(w, fp, fm, marks, message) => {
            if start < w.committed() {
                Step::Fail(w, fp, fm, marks, message)
            } else {
                Step::Done(w, start, entry, acc)
            }
        }
        Step::Partial { consumed, resume } => Step::Partial {
            consumed,
            resume: Box::new(move |source, m| {
                sep_tail(p, sep, acc, start, entry, resume(source, m))
            }),
        },
    }
}

fn sep_item<A: 'static, S: 'static>(
    p: Parser<A>,
    sep: Parser<S>,
    mut acc: Vec<A>,
    start: usize,
    entry: More,
    step: Step<A>,
) -> Step<Vec<A>> {
    match step {
        Step::Done(w, np, nm, item) => {
            acc.push(item);
            sep_loop(p, sep, acc, w, np, nm)
        }
        Step::Fail(w, fp, fm, marks, message) => {
            if start < w.committed() {
                Step::Fail(w, fp, fm, marks, message)
            } else {
                Step::Done(w, start, entry, acc)
            }
        }
        Step::Partial { consumed, resume } => Step::Partial {
            consumed,
            resume: Box::new(move |source, m| {
                sep_item(p, sep, acc, start, entry, resume(source, m))
            }),
        },
    }
}

/// `p` exactly `n` times. Any failure propagates; there is no rewinding
/// between iterations.
pub fn count<A: 'static>(n: usize, p: Parser<A>) -> Parser<Vec<A>> {
    Parser::from_fn(move |window, pos, more| {
        count_run(p.clone(), n, Vec::with_capacity(n), window, pos, more)
    })
}

fn count_run<A: 'static>(
    p: Parser<A>,
    mut remaining: usize,
    mut acc: Vec<A>,
    mut window: Window,
    mut pos: usize,
    mut more: More,
) -> Step<Vec<A>> {
    while remaining > 0 {
        match p.step(window, pos, more) {
            Step::Done(w, np, nm, item) => {
                acc.push(item);
                window = w;
                pos = np;
                more = nm;
                remaining -= 1;
            }
            Step::Fail(w, fp, fm, marks, message) => {
                return Step::Fail(w, fp, fm, marks, message);
            }
            Step::Partial { consumed, resume } => {
                return Step::Partial {
                    consumed,
                    resume: Box::new(move |source, m| {
                        count_finish(p, remaining, acc, resume(source, m))
                    }),
                };
            }
        }
    }
    Step::Done(window, pos, more, acc)
}

fn count_finish<A: 'static>(
    p: Parser<A>,
    remaining: usize,
    mut acc: Vec<A>,
    step: Step<A>,
) -> Step<Vec<A>> {
    match step {
        Step::Done(w, np, nm, item) => {
            acc.push(item);
            count_run(p, remaining - 1, acc, w, np, nm)
        }
        Step::Fail(w, fp, fm, marks, message) => Step::Fail(w, fp, fm, marks, message),
        Step::Partial { consumed, resume } => Step::Partial {
            consumed,
            resume: Box::new(move |source, m| count_finish(p, remaining, acc, resume(source, m))),
        },
    }
}

/// Runs each parser in order, collecting all values.
pub fn list<A: 'static>(parsers: Vec<Parser<A>>) -> Parser<Vec<A>> {
    let parsers = Rc::new(parsers);
    Parser::from_fn(move |window, pos, more| {
        list_run(Rc::clone(&parsers), 0, Vec::new(), window, pos, more)
    })
}

fn list_run<A: 'static>(
    parsers: Rc<Vec<Parser<A>>>,
    mut index: usize,
    mut acc: Vec<A>,
    mut window: Window,
    mut pos: usize,
    mut more: More,
) -> Step<Vec<A>> {
    while index < parsers.len() {
        match parsers[index].step(window, pos, more) {
            Step::Done(w, np, nm, item) => {
                acc.push(item);
                window = w;
                pos = np;
                more = nm;
                index += 1;
            }
            Step::Fail(w, fp, fm, marks, message) => {
                return Step::Fail(w, fp, fm, marks, message);
            }
            Step::Partial { consumed, resume } => {
                return Step::Partial {
                    consumed,
                    resume: Box::new(move |source, m| {
                        list_finish(parsers, index, acc, resume(source, m))
                    }),
                };
            }
        }
    }
    Step::Done(window, pos, more, acc)
}

fn list_finish<A: 'static>(
    parsers: Rc<Vec<Parser<A>>>,
    index: usize,
    mut acc: Vec<A>,
    step: Step<A>,
) -> Step<Vec<A>> {
    match step {
        Step::Done(w, np, nm, item) => {
            acc.push(item);
            list_run(parsers, index + 1, acc, w, np, nm)
        }
        Step::Fail(w, fp, fm, marks, message) => Step::Fail(w, fp, fm, marks, message),
        Step::Partial { consumed, resume } => Step::Partial {
            consumed,
            resume: Box::new(move |source, m| list_finish(parsers, index, acc, resume(source, m))),
        },
    }
}

/// `p` zero or more times, discarding the values.
pub fn skip_many<A: 'static>(p: Parser<A>) -> Parser<()> {
    Parser::from_fn(move |window, pos, more| skip_run(p.clone(), window, pos, more))
}

fn skip_run<A: 'static>(
    p: Parser<A>,
    mut window: Window,
    mut pos: usize,
    mut more: More,
) -> Step<()> {
    loop {
        let start = pos;
        match p.step(window, pos, more) {
            Step::Done(w, np, nm, _) => {
                window = w;
                pos = np;
                more = nm;
            }
            Step::Fail(w, fp, fm, marks, message) => {
                return if start < w.committed() {
                    Step::Fail(w, fp, fm, marks, message)
                } else {
                    Step::Done(w, start, more, ())
                };
            }
            Step::Partial { consumed, resume } => {
                return Step::Partial {
                    consumed,
                    resume: Box::new(move |source, m| {
                        skip_finish(p, start, more, resume(source, m))
                    }),
                };
            }
        }
    }
}

fn skip_finish<A: 'static>(p: Parser<A>, start: usize, entry: More, step: Step<A>) -> Step<()> {
    match step {
        Step::Done(w, np, nm, _) => skip_run(p, w, np, nm),
        Step::Fail(w, fp, fm, marks, message) => {
            if start < w.committed() {
                Step::Fail(w, fp, fm, marks, message)
            } else {
                Step::Done(w, start, entry, ())
            }
        }
        Step::Partial { consumed, resume } => Step::Partial {
            consumed,
            resume: Box::new(move |source, m| skip_finish(p, start, entry, resume(source, m))),
        },
    }
}

/// `p` one or more times, discarding the values.
pub fn skip_many1<A: 'static>(p: Parser<A>) -> Parser<()> {
    p.clone().with(skip_many(p))
}

// ============================================================================
// Recursion
// ============================================================================

/// Ties the knot for a recursive grammar: `f` receives the parser being
/// defined and must return its definition.
///
/// The returned parser holds a reference cycle and therefore lives for the
/// rest of the program; build recursive grammars once, not per input.
///
/// ```
/// use morsel::{byte, fix, parse_only};
///
/// // Balanced parentheses around a single 'x'.
/// let p = fix(|nested| {
///     byte(b'(').with(nested).skip(byte(b')')).or(byte(b'x').map(|_| ()))
/// });
/// assert!(parse_only(&p, "((x))").is_ok());
/// assert!(parse_only(&p, "((x)").is_err());
/// ```
pub fn fix<A: 'static>(f: impl FnOnce(Parser<A>) -> Parser<A>) -> Parser<A> {
    let cell: Rc<OnceCell<Parser<A>>> = Rc::new(OnceCell::new());
    let knot = {
        let cell = Rc::clone(&cell);
        Parser::from_fn(move |window, pos, more| {
            let p = cell
                .get()
                .expect("recursive parser invoked before it was tied");
            p.step(window, pos, more)
        })
    };
    let parser = f(knot);
    let _ = cell.set(parser.clone());
    parser
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::parse_only;

    fn ok<A: 'static>(p: &Parser<A>, input: &str) -> A {
        match parse_only(p, input) {
            Ok(v) => v,
            Err(e) => panic!("expected success on {:?}, got {}", input, e),
        }
    }

    fn err<A: 'static>(p: &Parser<A>, input: &str) -> String {
        match parse_only(p, input) {
            Ok(_) => panic!("expected failure on {:?}", input),
            Err(e) => e.to_string(),
        }
    }

    #[test]
    fn test_byte_and_satisfy() {
        assert_eq!(ok(&byte(b'a'), "a"), b'a');
        assert_eq!(err(&byte(b'b'), "a"), "'b'");
        assert_eq!(ok(&satisfy(|b| b.is_ascii_digit()), "7x"), b'7');
        assert_eq!(err(&satisfy(|b| b.is_ascii_digit()), "x"), "satisfy");
        assert_eq!(ok(&not_byte(b','), "x"), b'x');
        assert_eq!(err(&not_byte(b','), ","), "not ','");
    }

    #[test]
    fn test_peek_does_not_advance() {
        let p = peek_byte_fail().and_then(|b| byte(b));
        assert_eq!(ok(&p, "q"), b'q');
        assert_eq!(err(&peek_byte_fail(), ""), "peek_byte_fail");
        assert_eq!(ok(&peek_byte(), ""), None);
        assert_eq!(ok(&peek_byte(), "a"), Some(b'a'));
        assert_eq!(ok(&peek_bytes(2).skip(string("ab")), "ab"), b"ab".to_vec());
    }

    #[test]
    fn test_string_and_case_folding() {
        assert_eq!(ok(&string("abc"), "abcd"), b"abc".to_vec());
        assert_eq!(err(&string("abc"), "abd"), "string");
        assert_eq!(ok(&string_ci("AbC"), "aBc"), b"aBc".to_vec());
        assert_eq!(err(&string_ci("abc"), "abd"), "string_ci");
    }

    #[test]
    fn test_take_family() {
        assert_eq!(ok(&take(3), "abcd"), b"abc".to_vec());
        assert_eq!(err(&take(3), "ab"), "not enough input");
        let digits = take_while(|b| b.is_ascii_digit());
        assert_eq!(ok(&digits, "12ab"), b"12".to_vec());
        assert_eq!(ok(&digits, "ab"), Vec::<u8>::new());
        assert_eq!(ok(&take_till(|b| b == b','), "ab,c"), b"ab".to_vec());
        assert_eq!(ok(&take_rest(), "tail"), b"tail".to_vec());
        assert_eq!(ok(&skip_while(|b| b == b' ').with(any_byte()), "   x"), b'x');
        assert_eq!(ok(&advance(2).with(any_byte()), "abc"), b'c');
    }

    #[test]
    fn test_choice_is_biased() {
        let p = string("foo").or(string("foobar"));
        assert_eq!(ok(&p, "foobar"), b"foo".to_vec());
        let q = choice(vec![string("a"), string("b"), string("c")]);
        assert_eq!(ok(&q, "c"), b"c".to_vec());
        assert_eq!(err(&choice::<u8>(vec![]), "x"), "no more choices");
        assert_eq!(ok(&option(b'z', byte(b'a')), "q"), b'z');
    }

    #[test]
    fn test_bitor_operator() {
        let p = string("left") | string("right");
        assert_eq!(ok(&p, "right"), b"right".to_vec());
    }

    #[test]
    fn test_label_prepends_outermost_first() {
        let p = byte(b'x').label("inner").label("outer");
        assert_eq!(err(&p, "y"), "outer > inner: 'x'");
    }

    #[test]
    fn test_commit_disables_rewind() {
        let p = string("ab")
            .with(commit())
            .with(string("cd"))
            .or(string("abce"));
        assert_eq!(err(&p, "abce"), "string");
        let q = string("ab").with(string("cd")).or(string("abce"));
        assert_eq!(ok(&q, "abce"), b"abce".to_vec());
    }

    #[test]
    fn test_repetition() {
        let p = many(byte(b'a'));
        assert_eq!(ok(&p, "aaab").len(), 3);
        assert_eq!(ok(&p, "b").len(), 0);
        assert_eq!(err(&many1(byte(b'a')), "b"), "'a'");
        assert_eq!(ok(&count(2, any_byte()), "xy"), vec![b'x', b'y']);
        assert_eq!(err(&count(3, any_byte()), "xy"), "not enough input");
        assert_eq!(
            ok(&list(vec![byte(b'a'), byte(b'b')]), "ab"),
            vec![b'a', b'b']
        );
        assert_eq!(ok(&skip_many(byte(b'a')).with(byte(b'b')), "aaab"), b'b');
        assert_eq!(err(&skip_many1(byte(b'a')), "b"), "'a'");
    }

    #[test]
    fn test_many_till() {
        let p = many_till(any_byte(), byte(b';'));
        assert_eq!(ok(&p, "ab;"), vec![b'a', b'b']);
        assert_eq!(ok(&p, ";"), Vec::<u8>::new());
        assert_eq!(err(&p, "ab"), "not enough input");
    }

    #[test]
    fn test_sep_by() {
        let p = sep_by(take_while1(|b| b != b','), byte(b','));
        assert_eq!(
            ok(&p, "a,bb,ccc"),
            vec![b"a".to_vec(), b"bb".to_vec(), b"ccc".to_vec()]
        );
        assert_eq!(ok(&p, ""), Vec::<Vec<u8>>::new());
        // A trailing separator belongs to the unconsumed tail.
        let q = p.skip(string(",")).skip(end_of_input());
        assert_eq!(ok(&q, "a,b,").len(), 2);
    }

    #[test]
    fn test_lift_n() {
        let pair = lift2(|a, b| (a, b), any_byte(), any_byte());
        assert_eq!(ok(&pair, "xy"), (b'x', b'y'));
        let triple = lift3(|a, b, c| [a, b, c], any_byte(), any_byte(), any_byte());
        assert_eq!(ok(&triple, "xyz"), [b'x', b'y', b'z']);
        let quad = lift4(
            |a, b, c, d| vec![a, b, c, d],
            any_byte(),
            any_byte(),
            any_byte(),
            any_byte(),
        );
        assert_eq!(ok(&quad, "wxyz"), b"wxyz".to_vec());
    }

    #[test]
    fn test_end_of_line() {
        ok(&end_of_line(), "\n");
        ok(&end_of_line(), "\r\n");
        assert_eq!(err(&end_of_line(), "\r"), "end_of_line: not enough input");
        assert_eq!(err(&end_of_line(), "xy"), "end_of_line: string");
    }

    #[test]
    fn test_pos_and_available() {
        let p = take(2).with(pos());
        assert_eq!(ok(&p, "abcd"), 2);
        let q = take(1).with(available());
        assert_eq!(ok(&q, "abcd"), 3);
    }

    #[test]
    fn test_fix_recursive_grammar() {
        let nested = fix(|inner| {
            byte(b'(')
                .with(inner)
                .skip(byte(b')'))
                .map(|n: usize| n + 1)
                .or(value(0usize))
        });
        assert_eq!(ok(&nested, "((()))"), 3);
        assert_eq!(ok(&nested, ""), 0);
    }
}
