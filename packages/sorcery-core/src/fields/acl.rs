//! Permit/deny access control lists.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use super::FieldError;

/// Outcome of an access rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclSense {
    Permit,
    Deny,
}

impl AclSense {
    pub fn as_str(&self) -> &'static str {
        match self {
            AclSense::Permit => "permit",
            AclSense::Deny => "deny",
        }
    }
}

/// One network rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclRule {
    pub sense: AclSense,
    pub network: IpAddr,
    pub prefix: u8,
}

impl AclRule {
    /// Parses `addr`, `addr/prefix` or `addr/netmask`.
    pub fn parse(sense: AclSense, value: &str) -> Result<Self, FieldError> {
        let invalid = || FieldError::InvalidAcl(value.to_string());
        let value = value.trim();
        let (addr, mask) = match value.split_once('/') {
            Some((addr, mask)) => (addr, Some(mask)),
            None => (value, None),
        };
        let addr = IpAddr::from_str(addr.trim()).map_err(|_| invalid())?;
        let max = if addr.is_ipv4() { 32 } else { 128 };

        let prefix = match mask.map(str::trim) {
            None => max,
            Some(mask) => match mask.parse::<u8>() {
                Ok(p) if p <= max => p,
                Ok(_) => return Err(invalid()),
                Err(_) => netmask_prefix(mask, &addr).ok_or_else(invalid)?,
            },
        };

        Ok(Self {
            sense,
            network: mask_addr(&addr, prefix),
            prefix,
        })
    }

    /// Whether `addr` falls inside this rule's network.
    pub fn contains(&self, addr: &IpAddr) -> bool {
        match (self.network, addr) {
            (IpAddr::V4(_), IpAddr::V4(_)) | (IpAddr::V6(_), IpAddr::V6(_)) => {
                mask_addr(addr, self.prefix) == self.network
            }
            _ => false,
        }
    }
}

impl fmt::Display for AclRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

fn netmask_prefix(mask: &str, addr: &IpAddr) -> Option<u8> {
    let mask = IpAddr::from_str(mask).ok()?;
    let bits: u128 = match (mask, addr) {
        (IpAddr::V4(m), IpAddr::V4(_)) => u128::from(u32::from(m)) << 96,
        (IpAddr::V6(m), IpAddr::V6(_)) => u128::from(m),
        _ => return None,
    };
    let ones = bits.leading_ones();
    // contiguous masks only
    if bits.checked_shl(ones).unwrap_or(0) != 0 {
        return None;
    }
    let ones = if addr.is_ipv4() { ones.min(32) } else { ones };
    u8::try_from(ones).ok()
}

fn mask_addr(addr: &IpAddr, prefix: u8) -> IpAddr {
    match addr {
        IpAddr::V4(v4) => {
            let bits = u32::from(*v4);
            let mask = if prefix == 0 {
                0
            } else {
                u32::MAX << (32 - u32::from(prefix))
            };
            IpAddr::V4((bits & mask).into())
        }
        IpAddr::V6(v6) => {
            let bits = u128::from(*v6);
            let mask = if prefix == 0 {
                0
            } else {
                u128::MAX << (128 - u32::from(prefix))
            };
            IpAddr::V6((bits & mask).into())
        }
    }
}

/// Ordered list of permit/deny rules. The last matching rule decides;
/// addresses no rule matches are permitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessList {
    rules: Vec<AclRule>,
}

impl AccessList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the rules of a comma separated value.
    pub fn append(&mut self, sense: AclSense, value: &str) -> Result<(), FieldError> {
        let parsed = value
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| AclRule::parse(sense, v))
            .collect::<Result<Vec<_>, _>>()?;
        self.rules.extend(parsed);
        Ok(())
    }

    /// Decides access for `addr`.
    pub fn check(&self, addr: &IpAddr) -> AclSense {
        self.rules
            .iter()
            .rev()
            .find(|rule| rule.contains(addr))
            .map(|rule| rule.sense)
            .unwrap_or(AclSense::Permit)
    }

    pub fn rules(&self) -> &[AclRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
