//! Line oriented parser for structured text configuration.

use super::{Category, ConfError, ConfFile};

/// Parses configuration text.
///
/// # Arguments
/// * `text` - File contents
///
/// # Returns
/// `Ok(ConfFile)` with sections in file order, `Err(ConfError)` on the first
/// malformed line.
pub fn parse(text: &str) -> Result<ConfFile, ConfError> {
    let mut file = ConfFile::default();
    let mut current: Option<Category> = None;

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = strip_comment(raw);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with('[') {
            if let Some(done) = current.take() {
                file.push(done);
            }
            current = Some(parse_header(&file, line, line_no)?);
            continue;
        }

        let Some(category) = current.as_mut() else {
            return Err(ConfError::NoSection { line: line_no });
        };

        let (key, value) = split_assignment(line).ok_or_else(|| ConfError::BadLine {
            line: line_no,
            text: line.to_string(),
        })?;
        category.variables_mut().push(key, value);
    }

    if let Some(done) = current.take() {
        file.push(done);
    }

    Ok(file)
}

/// Removes a trailing `;` comment, honouring `\;` escapes.
fn strip_comment(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&';') => {
                out.push(';');
                chars.next();
            }
            ';' => break,
            _ => out.push(c),
        }
    }
    out
}

fn split_assignment(line: &str) -> Option<(String, String)> {
    let eq = line.find('=')?;
    let key = line[..eq].trim();
    let rest = &line[eq + 1..];
    // `key => value` is accepted as a synonym
    let value = rest.strip_prefix('>').unwrap_or(rest).trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), value.to_string()))
}

fn parse_header(file: &ConfFile, line: &str, line_no: usize) -> Result<Category, ConfError> {
    let bad = || ConfError::BadHeader {
        line: line_no,
        text: line.to_string(),
    };

    let close = line.find(']').ok_or_else(bad)?;
    let name = line[1..close].trim();
    let rest = line[close + 1..].trim();

    let mut template = false;
    let mut parents = Vec::new();
    if !rest.is_empty() {
        let inner = rest
            .strip_prefix('(')
            .and_then(|r| r.strip_suffix(')'))
            .ok_or_else(bad)?;
        for option in inner.split(',').map(str::trim).filter(|o| !o.is_empty()) {
            if option == "!" {
                template = true;
            } else {
                parents.push(option);
            }
        }
    }

    let mut category = Category::new(name.to_string(), template);
    for parent in parents {
        let base = file
            .categories()
            .iter()
            .rev()
            .find(|c| c.name() == parent)
            .ok_or_else(|| ConfError::UnknownTemplate {
                line: line_no,
                template: parent.to_string(),
            })?;
        for (key, value) in base.variables().iter() {
            category.variables_mut().push(key, value);
        }
    }

    Ok(category)
}
