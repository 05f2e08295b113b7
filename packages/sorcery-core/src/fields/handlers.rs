//! Built-in text conversions for field kinds.

use std::fmt::Display;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use super::{FieldError, Range};

/// Port requirements for socket address fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PortPolicy {
    /// Port may be present or absent.
    #[default]
    Optional,
    /// A non-zero port must be given.
    Require,
    /// No port may be given.
    Forbid,
}

const TRUE_WORDS: &[&str] = &["yes", "true", "y", "t", "1", "on"];
const FALSE_WORDS: &[&str] = &["no", "false", "n", "f", "0", "off"];

/// Parses the usual configuration spellings of a boolean.
pub fn parse_bool(value: &str) -> Result<bool, FieldError> {
    let trimmed = value.trim();
    if TRUE_WORDS.iter().any(|w| w.eq_ignore_ascii_case(trimmed)) {
        Ok(true)
    } else if FALSE_WORDS.iter().any(|w| w.eq_ignore_ascii_case(trimmed)) {
        Ok(false)
    } else {
        Err(FieldError::InvalidBool(value.to_string()))
    }
}

pub(crate) fn format_yesno(value: bool) -> String {
    if value { "yes" } else { "no" }.to_string()
}

pub(crate) fn parse_i32(value: &str) -> Result<i32, FieldError> {
    value
        .trim()
        .parse::<i32>()
        .map_err(|_| FieldError::InvalidInteger(value.to_string()))
}

pub(crate) fn parse_u32(value: &str) -> Result<u32, FieldError> {
    value
        .trim()
        .parse::<u32>()
        .map_err(|_| FieldError::InvalidInteger(value.to_string()))
}

pub(crate) fn parse_f64(value: &str) -> Result<f64, FieldError> {
    let parsed = value
        .trim()
        .parse::<f64>()
        .map_err(|_| FieldError::InvalidDouble(value.to_string()))?;
    if parsed.is_finite() {
        Ok(parsed)
    } else {
        Err(FieldError::InvalidDouble(value.to_string()))
    }
}

/// Checks `value` against `range`, clamping instead of failing when asked.
pub(crate) fn check_range<N>(
    field: &str,
    value: N,
    range: Option<&Range<N>>,
    clamp: bool,
) -> Result<N, FieldError>
where
    N: PartialOrd + Copy + Display,
{
    let Some(range) = range else {
        return Ok(value);
    };
    if value >= range.min && value <= range.max {
        return Ok(value);
    }
    if clamp {
        let clamped = if value < range.min {
            range.min
        } else {
            range.max
        };
        tracing::warn!(
            "Value {} for field '{}' outside {}..={}, clamped to {}",
            value,
            field,
            range.min,
            range.max,
            clamped
        );
        return Ok(clamped);
    }
    Err(FieldError::OutOfRange {
        value: value.to_string(),
        min: range.min.to_string(),
        max: range.max.to_string(),
    })
}

/// Parses a socket address. An empty value clears the address; a bare IP
/// address yields port 0.
pub(crate) fn parse_sockaddr(
    value: &str,
    policy: PortPolicy,
) -> Result<Option<SocketAddr>, FieldError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let invalid = |reason: &str| FieldError::InvalidAddress {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let (addr, has_port) = if let Ok(addr) = SocketAddr::from_str(trimmed) {
        (addr, true)
    } else {
        let bare = trimmed
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .unwrap_or(trimmed);
        let ip = IpAddr::from_str(bare).map_err(|e| invalid(&e.to_string()))?;
        (SocketAddr::new(ip, 0), false)
    };

    match policy {
        PortPolicy::Require if !has_port || addr.port() == 0 => Err(invalid("port required")),
        PortPolicy::Forbid if has_port => Err(invalid("port not allowed")),
        _ => Ok(Some(addr)),
    }
}

pub(crate) fn format_sockaddr(addr: Option<&SocketAddr>) -> String {
    match addr {
        None => String::new(),
        Some(addr) if addr.port() == 0 => addr.ip().to_string(),
        Some(addr) => addr.to_string(),
    }
}

pub(crate) fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
