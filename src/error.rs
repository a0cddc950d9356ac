//! The parse failure type and its rendering.

use std::fmt;

/// A structured parse failure: the stack of named contexts the failure
/// bubbled through (outermost first) and the primitive cause.
///
/// Rendered as the marks joined with `" > "`, then `": "`, then the message:
///
/// ```
/// use morsel::ParseFailure;
///
/// let failure = ParseFailure::new(
///     vec!["object".into(), "key".into()],
///     "take_while1".into(),
/// );
/// assert_eq!(failure.to_string(), "object > key: take_while1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    /// Context marks, outermost first.
    pub marks: Vec<String>,
    /// The primitive cause.
    pub message: String,
}

impl ParseFailure {
    /// Creates a failure from its parts.
    pub fn new(marks: Vec<String>, message: String) -> Self {
        ParseFailure { marks, message }
    }

    pub(crate) fn incomplete() -> Self {
        ParseFailure::new(Vec::new(), "incomplete input".to_string())
    }
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.marks.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.marks.join(" > "), self.message)
        }
    }
}

impl std::error::Error for ParseFailure {}
