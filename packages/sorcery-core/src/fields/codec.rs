//! Codec preference sets.

use std::fmt;

use super::FieldError;

/// Codec names understood by codec fields, in default preference order.
pub const KNOWN_CODECS: &[&str] = &[
    "ulaw", "alaw", "gsm", "g722", "g726", "g729", "ilbc", "speex", "opus", "slin", "slin16",
    "h264", "vp8",
];

/// Ordered, duplicate free list of codecs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodecPreferences {
    codecs: Vec<String>,
}

impl CodecPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a comma separated update.
    ///
    /// With `allow` set, names are added and `!name` removed; otherwise the
    /// meaning is inverted. `all` stands for every known codec. Nothing is
    /// changed when any name is unknown.
    pub fn update(&mut self, allow: bool, value: &str) -> Result<(), FieldError> {
        let mut next = self.codecs.clone();
        for token in value.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let (negated, name) = match token.strip_prefix('!') {
                Some(rest) => (true, rest.trim()),
                None => (false, token),
            };
            let add = allow != negated;
            let name = name.to_ascii_lowercase();

            if name == "all" {
                if add {
                    for codec in KNOWN_CODECS {
                        if !next.iter().any(|c| c == codec) {
                            next.push((*codec).to_string());
                        }
                    }
                } else {
                    next.clear();
                }
                continue;
            }

            if !KNOWN_CODECS.contains(&name.as_str()) {
                return Err(FieldError::UnknownCodec(name));
            }
            if add {
                if !next.contains(&name) {
                    next.push(name);
                }
            } else {
                next.retain(|c| *c != name);
            }
        }
        self.codecs = next;
        Ok(())
    }

    pub fn codecs(&self) -> &[String] {
        &self.codecs
    }

    pub fn contains(&self, name: &str) -> bool {
        self.codecs.iter().any(|c| c.eq_ignore_ascii_case(name))
    }
}

/// Renders a self-contained update: applying it to any set reproduces
/// this one.
impl fmt::Display for CodecPreferences {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("!all")?;
        for codec in &self.codecs {
            write!(f, ",{}", codec)?;
        }
        Ok(())
    }
}
