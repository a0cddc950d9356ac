//! Morsel - Incremental Streaming Parser Combinators
//!
//! This is a byte-oriented parser combinator library for input that arrives
//! in chunks. It provides:
//! - A suspend/resume engine: a parser that runs out of bytes pauses
//!   mid-grammar and continues when the caller supplies more
//! - Backtracking with an explicit commit point that bounds how far
//!   alternatives may rewind and lets drivers reclaim memory
//! - A combinator algebra: primitives, sequencing, biased choice, named
//!   contexts, repetition, and a fixpoint for recursive grammars
//! - A buffered driver that glues chunks together so resumption is a single
//!   `feed` call
//! - Endian-aware fixed-width numeric readers
//!
//! ## Quick Start
//!
//! ```rust
//! use morsel::{byte, parse_only, sep_by, take_while1};
//!
//! let word = take_while1(|b| b != b',');
//! let words = sep_by(word, byte(b','));
//!
//! let parsed = parse_only(&words, "a,bb,ccc").unwrap();
//! assert_eq!(parsed, vec![b"a".to_vec(), b"bb".to_vec(), b"ccc".to_vec()]);
//! ```
//!
//! ## Streaming
//!
//! ```rust
//! use morsel::{buffered, string};
//!
//! let p = string("ab");
//! let state = buffered::parse(&p).feed("a").feed("b").feed(buffered::Feed::Eof);
//! assert_eq!(state.to_result().unwrap(), b"ab".to_vec());
//! ```
//!
//! ## Feature Flags
//!
//! - `logging` - Enable driver debug logging using the `log` crate

// Lint configuration for production quality
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(clippy::all)]
#![allow(clippy::redundant_closure)]

// ============================================================================
// Module Declarations
// ============================================================================

pub mod buffer;
pub mod buffered;
pub mod combinator;
pub mod endian;
pub mod error;

mod engine;
mod input;

// ============================================================================
// Core Types
// ============================================================================

pub use engine::{parse, parse_only, More, Parser, Resume, State};
pub use input::Source;

// ============================================================================
// Error Handling
// ============================================================================

pub use error::ParseFailure;

// ============================================================================
// Combinators
// ============================================================================

pub use combinator::{
    advance, any_byte, available, byte, choice, commit, count, end_of_input, end_of_line, fail,
    fix, lift, lift2, lift3, lift4, list, many, many1, many_till, not_byte, option, peek_byte,
    peek_byte_fail, peek_bytes, pos, satisfy, sep_by, sep_by1, skip, skip_many, skip_many1,
    skip_while, string, string_ci, take, take_rest, take_till, take_while, take_while1, value,
};

// ============================================================================
// Buffering
// ============================================================================

pub use buffer::{Buffer, Unconsumed};
