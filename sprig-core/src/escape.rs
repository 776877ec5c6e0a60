//! Shell-style quoting for rendering argument vectors.

use std::borrow::Cow;

use itertools::Itertools;

/// Quotes the given string so that a POSIX shell would parse it back as a
/// single word, returning it unmodified when no quoting is required.
pub(crate) fn quote_if_needed(s: &str) -> Cow<'_, str> {
    if s.is_empty() {
        return "''".into();
    }

    if !s.chars().any(needs_quoting) {
        return s.into();
    }

    // Single-quote the whole word; an embedded single quote terminates the
    // quoted span, emits an escaped quote, and reopens it.
    let mut output = String::with_capacity(s.len() + 2);
    output.push('\'');
    for c in s.chars() {
        if c == '\'' {
            output.push_str("'\\''");
        } else {
            output.push(c);
        }
    }
    output.push('\'');

    output.into()
}

/// Renders an argument vector as a single shell-quoted line.
pub(crate) fn render_arguments(arguments: &[String]) -> String {
    arguments
        .iter()
        .map(|arg| quote_if_needed(arg))
        .join(" ")
}

fn needs_quoting(c: char) -> bool {
    !matches!(
        c,
        'a'..='z'
            | 'A'..='Z'
            | '0'..='9'
            | '-'
            | '_'
            | '/'
            | ':'
            | '@'
            | '.'
            | '+'
            | '='
            | ','
    )
}
