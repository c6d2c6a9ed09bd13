//! Delimiter-based field splitting
//!
//! The protocol nests three levels of positional fields inside one line:
//! `||` at the top level, `&` inside a command payload and `|` for lists
//! inside a subfield. All levels go through the same splitter.

/// Separates the command, token and data fields of a frame
pub const FRAME_DELIMITER: &str = "||";

/// Separates positional values inside a command payload
pub const SUBFIELD_DELIMITER: &str = "&";

/// Separates list items inside a subfield (e.g. group member ids)
pub const LIST_DELIMITER: &str = "|";

/// Terminates every frame
pub const TERMINATOR: &str = "\r\n";

/// Split `subject` on every non-overlapping occurrence of `delimiter`.
///
/// An empty subject yields no fields. Otherwise `k` delimiter occurrences
/// yield exactly `k + 1` fields, keeping empty fields at the edges and
/// between adjacent delimiters.
pub fn split_fields(subject: &str, delimiter: &str) -> Vec<String> {
    if subject.is_empty() {
        return Vec::new();
    }
    if delimiter.is_empty() {
        return vec![subject.to_owned()];
    }
    subject.split(delimiter).map(str::to_owned).collect()
}

/// Split into at most `limit` fields; the last field keeps the unsplit rest.
pub fn split_fields_n(subject: &str, delimiter: &str, limit: usize) -> Vec<String> {
    if subject.is_empty() || limit == 0 {
        return Vec::new();
    }
    if delimiter.is_empty() {
        return vec![subject.to_owned()];
    }
    subject.splitn(limit, delimiter).map(str::to_owned).collect()
}

/// Join fields with `delimiter`, the inverse of [`split_fields`].
pub fn join_fields<I, S>(fields: I, delimiter: &str) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            out.push_str(delimiter);
        }
        out.push_str(field.as_ref());
    }
    out
}
