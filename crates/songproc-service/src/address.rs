//! String binding addresses of the form `protseq:[network_address][[endpoint]]`.
//!
//! With no network address and the well-known endpoint the composed form is
//! `ncalrpc:[2d4dc2f9-ce90-4080-8a00-1cb819086970]`.

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, ServiceError};

const RESERVED: &[char] = &['@', ':', '[', ']', '\\'];

/// A composed binding address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingAddress {
    protocol_sequence: String,
    network_address: Option<String>,
    endpoint: String,
}

impl BindingAddress {
    /// Validate the parts and build an address from them.
    pub fn compose(
        protocol_sequence: &str,
        network_address: Option<&str>,
        endpoint: &str,
    ) -> Result<Self> {
        if protocol_sequence.is_empty()
            || !protocol_sequence
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ServiceError::InvalidAddress(format!(
                "bad protocol sequence '{protocol_sequence}'"
            )));
        }
        if let Some(addr) = network_address {
            check_component("network address", addr)?;
        }
        if endpoint.is_empty() {
            return Err(ServiceError::InvalidAddress("empty endpoint".to_string()));
        }
        check_component("endpoint", endpoint)?;

        Ok(Self {
            protocol_sequence: protocol_sequence.to_string(),
            network_address: network_address
                .filter(|addr| !addr.is_empty())
                .map(str::to_string),
            endpoint: endpoint.to_string(),
        })
    }

    pub fn protocol_sequence(&self) -> &str {
        &self.protocol_sequence
    }

    pub fn network_address(&self) -> Option<&str> {
        self.network_address.as_deref()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn check_component(what: &str, value: &str) -> Result<()> {
    if let Some(bad) = value
        .chars()
        .find(|c| RESERVED.contains(c) || c.is_control())
    {
        return Err(ServiceError::InvalidAddress(format!(
            "{what} contains reserved character {bad:?}"
        )));
    }
    Ok(())
}

impl fmt::Display for BindingAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}[{}]",
            self.protocol_sequence,
            self.network_address.as_deref().unwrap_or_default(),
            self.endpoint
        )
    }
}

impl FromStr for BindingAddress {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = || ServiceError::InvalidAddress(format!("malformed binding '{s}'"));

        let (protocol_sequence, rest) = s.split_once(':').ok_or_else(malformed)?;
        let (network_address, rest) = rest.split_once('[').ok_or_else(malformed)?;
        let endpoint = rest.strip_suffix(']').ok_or_else(malformed)?;

        let network_address = Some(network_address).filter(|addr| !addr.is_empty());
        Self::compose(protocol_sequence, network_address, endpoint)
    }
}
