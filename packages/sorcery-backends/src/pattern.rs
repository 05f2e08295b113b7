//! Literal text extracted from regular expressions to narrow scans.

/// Longest literal prefix every match of an anchored pattern starts with.
///
/// # Returns
/// `None` when the pattern is not anchored or uses alternation.
pub(crate) fn literal_prefix(pattern: &str) -> Option<String> {
    let rest = pattern.strip_prefix('^')?;
    if rest.contains('|') {
        return None;
    }

    let mut prefix = String::new();
    let mut chars = rest.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) if !escaped.is_ascii_alphanumeric() => prefix.push(escaped),
                _ => break,
            },
            // optional repetition makes the previous character optional too
            '*' | '?' | '{' => {
                prefix.pop();
                break;
            }
            '.' | '+' | '(' | ')' | '[' | ']' | '}' | '^' | '$' => break,
            _ => prefix.push(c),
        }
    }
    Some(prefix)
}

/// Literal text every match of `pattern` contains.
///
/// Anchored patterns yield their literal prefix. Unanchored patterns yield
/// the literal run they open with, which a match contains somewhere.
pub(crate) fn literal_run(pattern: &str) -> Option<String> {
    if pattern.starts_with('^') {
        literal_prefix(pattern)
    } else {
        literal_prefix(&format!("^{}", pattern))
    }
}
