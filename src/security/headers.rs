//! Header passthrough filtering.
//!
//! # Responsibilities
//! - Hold the allow-list of inbound headers that may reach upstreams
//! - Copy only allow-listed headers onto outbound requests
//!
//! # Design Decisions
//! - Empty allow-list by default: nothing is forwarded unless configured
//! - Matching is case-insensitive (header names are normalised to lowercase)
//! - Nothing is synthesized or renamed; every value of a matching header is kept

use axum::http::header::{HeaderMap, HeaderName, InvalidHeaderName};

/// Case-insensitive set of header names allowed through to upstreams.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassthroughHeaders {
    names: Vec<HeaderName>,
}

impl PassthroughHeaders {
    /// Build the allow-list from configured names. Duplicates collapse.
    pub fn from_names<I, S>(names: I) -> Result<Self, InvalidHeaderName>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parsed = names
            .into_iter()
            .map(|n| HeaderName::from_bytes(n.as_ref().trim().as_bytes()))
            .collect::<Result<Vec<_>, _>>()?;
        parsed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        parsed.dedup();
        Ok(Self { names: parsed })
    }

    pub fn allows(&self, name: &HeaderName) -> bool {
        self.names.contains(name)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeaderName> {
        self.names.iter()
    }
}

/// Headers from `inbound` whose names are allow-listed, all others dropped.
pub fn apply(inbound: &HeaderMap, allow: &PassthroughHeaders) -> HeaderMap {
    let mut outbound = HeaderMap::new();
    for name in allow.iter() {
        for value in inbound.get_all(name) {
            outbound.append(name.clone(), value.clone());
        }
    }
    outbound
}
