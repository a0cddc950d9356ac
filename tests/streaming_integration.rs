//! Integration tests for the buffered driver.
//!
//! These cover chunk-by-chunk feeding, end-of-input handling, commit-driven
//! buffer reclamation, unconsumed-tail reporting, and the projections.

use assert_matches::assert_matches;
use morsel::buffered::{self, Feed};
use morsel::{
    byte, commit, end_of_input, many, sep_by, skip_many, string, take_while1, Parser,
};

fn feed_all<A: 'static>(p: &Parser<A>, chunks: &[&str]) -> buffered::State<A> {
    let mut state = buffered::parse(p);
    for chunk in chunks {
        state = state.feed(*chunk);
    }
    state.feed(Feed::Eof)
}

// ============================================================================
// Basic chunked runs
// ============================================================================

#[test]
fn test_string_across_two_chunks() {
    let p = string("ab");
    let state = feed_all(&p, &["a", "b"]);
    let (tail, value) = assert_matches!(state, buffered::State::Done(tail, value) => (tail, value));
    assert_eq!(value, b"ab".to_vec());
    assert_eq!(tail.len, 0);
}

#[test]
fn test_value_split_at_every_boundary() {
    let input = "alpha,beta,gamma";
    let word = take_while1(|b| b != b',');
    let p = sep_by(word, byte(b','));
    let expected = vec![b"alpha".to_vec(), b"beta".to_vec(), b"gamma".to_vec()];

    for cut in 0..=input.len() {
        let (left, right) = input.split_at(cut);
        let state = feed_all(&p, &[left, right]);
        assert_eq!(
            state.to_result().unwrap(),
            expected,
            "differs when split at {}",
            cut
        );
    }
}

#[test]
fn test_eof_without_any_input() {
    let p = many(byte(b'a')).skip(end_of_input());
    let state = buffered::parse(&p).feed(Feed::Eof);
    assert_eq!(state.to_result().unwrap(), Vec::<u8>::new());
}

#[test]
fn test_initial_input_is_used() {
    let p = string("hello");
    let state = buffered::parse_with(&p, 8, b"hello world").feed(Feed::Eof);
    let tail = state.to_unconsumed().expect("terminal state").clone();
    assert_eq!(tail.bytes(), b" world");
}

// ============================================================================
// Commit and reclamation
// ============================================================================

#[test]
fn test_commit_prevents_cross_chunk_backtracking() {
    let p = string("ab")
        .with(commit())
        .with(string("cd"))
        .or(string("abce"));
    let state = feed_all(&p, &["a", "b", "c", "e"]);
    let (tail, marks, message) =
        assert_matches!(state, buffered::State::Fail(tail, marks, message) => (tail, marks, message));
    assert!(marks.is_empty());
    assert_eq!(message, "string");
    assert_eq!(tail.bytes(), b"ce");
}

#[test]
fn test_long_run_with_periodic_commits() {
    // Records separated by ';', committing after each one.
    let record = take_while1(|b| b != b';').skip(byte(b';')).skip(commit());
    let p = skip_many(record).skip(end_of_input());

    let mut state = buffered::parse(&p);
    for _ in 0..100 {
        state = state.feed("abcdefgh;");
    }
    let state = state.feed(Feed::Eof);
    assert!(state.to_result().is_ok());
}

// ============================================================================
// Terminal states and projections
// ============================================================================

#[test]
fn test_late_chunks_extend_the_unconsumed_tail() {
    let p = byte(b'x');
    let state = feed_all(&p, &["xy"]).feed("z").feed("!");
    let tail = state.to_unconsumed().expect("terminal state").clone();
    assert_eq!(tail.bytes(), b"yz!");
}

#[test]
fn test_eof_on_terminal_state_is_noop() {
    let p = byte(b'x');
    let state = feed_all(&p, &["x"]).feed(Feed::Eof).feed(Feed::Eof);
    assert_eq!(state.to_option(), Some(b'x'));
}

#[test]
fn test_partial_projects_to_incomplete() {
    let p = string("never finished");
    let state = buffered::parse(&p).feed("never");
    assert!(state.to_unconsumed().is_none());
    let err = state.to_result().unwrap_err();
    assert_eq!(err.to_string(), "incomplete input");
}

#[test]
fn test_failure_marks_survive_the_driver() {
    let p = take_while1(|b: u8| b.is_ascii_digit()).label("number");
    let state = feed_all(&p, &["x"]);
    let err = state.to_result().unwrap_err();
    assert_eq!(err.to_string(), "number: take_while1");
}

// ============================================================================
// Choice re-entry after suspension
// ============================================================================

#[test]
fn test_alternative_retries_after_eof() {
    // The first branch suspends mid-match; on Eof the second branch must
    // still get its turn at the entry position.
    let p = string("abc").or(string("ab"));
    let state = feed_all(&p, &["ab"]);
    assert_eq!(state.to_result().unwrap(), b"ab".to_vec());
}

#[test]
fn test_sep_by_trailing_separator_stays_unconsumed() {
    let word = take_while1(|b| b != b',');
    let p = sep_by(word, byte(b','));
    let state = feed_all(&p, &["a,b", ","]);
    let tail = state.to_unconsumed().expect("terminal state").clone();
    assert_eq!(tail.bytes(), b",");
    assert_eq!(state.to_result().unwrap().len(), 2);
}
