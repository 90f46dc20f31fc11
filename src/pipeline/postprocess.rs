//! Post-processing of one page of OCR markdown before assembly.
//!
//! The page text is the provider's output and is kept as returned: code
//! fences, blank lines, image references such as `![img-0.jpeg](img-0.jpeg)`
//! and leading or trailing whitespace all survive. The one rule applied is
//! line-ending normalisation, so a page that arrives with `\r\n` or bare
//! `\r` breaks does not mix line endings with the `\n` used by
//! [`super::assemble`] around it.

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

static RE_LINE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r\n?").unwrap());

/// Normalise CRLF and lone CR line breaks to LF. Everything else is untouched.
pub fn clean_page(input: &str) -> Cow<'_, str> {
    RE_LINE_BREAK.replace_all(input, "\n")
}
