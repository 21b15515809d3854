use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Ordered list of TCP ports.
///
/// Parses from a comma separated string (`10080,10081`) so the same value can
/// come from a CLI flag, an environment variable, or a configuration file
/// array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PortList(Vec<u16>);

impl PortList {
    /// Ports in configured order.
    #[must_use]
    pub fn as_slice(&self) -> &[u16] {
        &self.0
    }

    /// Number of ports.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true when no ports are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u16>> for PortList {
    fn from(ports: Vec<u16>) -> Self {
        Self(ports)
    }
}

impl fmt::Display for PortList {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for port in &self.0 {
            if !first {
                formatter.write_str(",")?;
            }
            write!(formatter, "{port}")?;
            first = false;
        }
        Ok(())
    }
}

/// Errors encountered while parsing a [`PortList`] from text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PortListParseError {
    /// No ports were given.
    #[error("port list is empty")]
    Empty,
    /// An entry was not a port number.
    #[error("invalid port '{entry}': {source}")]
    Invalid {
        /// Offending entry.
        entry: String,
        /// Integer parse failure.
        #[source]
        source: ParseIntError,
    },
    /// Port zero cannot be connected to.
    #[error("port 0 is not a usable port")]
    Zero,
}

impl FromStr for PortList {
    type Err = PortListParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut ports = Vec::new();
        for entry in input.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
            let port = entry
                .parse::<u16>()
                .map_err(|source| PortListParseError::Invalid {
                    entry: entry.to_owned(),
                    source,
                })?;
            if port == 0 {
                return Err(PortListParseError::Zero);
            }
            ports.push(port);
        }
        if ports.is_empty() {
            return Err(PortListParseError::Empty);
        }
        Ok(Self(ports))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PortListRepr {
    List(Vec<u16>),
    Single(u16),
    Text(String),
}

impl<'de> Deserialize<'de> for PortList {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match PortListRepr::deserialize(deserializer)? {
            PortListRepr::List(ports) => Ok(Self(ports)),
            PortListRepr::Single(port) => Ok(Self(vec![port])),
            PortListRepr::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}
