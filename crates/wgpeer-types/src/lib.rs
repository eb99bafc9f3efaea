// Copyright (C) 2025 Joseph Sacchini
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU Affero General Public License as published by the Free
// Software Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more
// details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! wgpeer-types: Shared data model for the wgpeer tool.
//!
//! This crate contains the peer record and the validation rules that apply
//! to values entering the peer store from the command line.

#![warn(missing_docs)]

use std::fmt;

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A WireGuard peer permitted to connect through the managed interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    /// Unique identifier, also the name of the peer's storage directory.
    pub name: String,
    /// Human-readable label (e.g. "Alice A").
    pub full_name: String,
    /// Tunnel address assigned to the peer, substituted for `<IP>`.
    pub address: String,
    /// WireGuard public key, substituted for `<PublicKey>`. Not validated.
    pub public_key: String,
}

/// Validation failures for peer values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeerError {
    /// The peer name was empty.
    #[error("peer name must not be empty")]
    EmptyName,

    /// The peer name cannot be used as a directory name.
    #[error("peer name is not a safe directory name: {0:?}")]
    UnsafeName(String),

    /// An item of the tunnel address list is neither an IP address nor a CIDR block.
    #[error("invalid tunnel address: {0:?}")]
    InvalidAddress(String),
}

impl Peer {
    /// Build a peer from its four fields.
    pub fn new(
        name: impl Into<String>,
        full_name: impl Into<String>,
        address: impl Into<String>,
        public_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            full_name: full_name.into(),
            address: address.into(),
            public_key: public_key.into(),
        }
    }

    /// Check that the peer's name is usable as its storage directory.
    pub fn validate(&self) -> Result<(), PeerError> {
        validate_name(&self.name)
    }
}

/// Reject names that are empty or would escape the peer directory.
pub fn validate_name(name: &str) -> Result<(), PeerError> {
    if name.is_empty() {
        return Err(PeerError::EmptyName);
    }
    if name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(PeerError::UnsafeName(name.to_string()));
    }
    Ok(())
}

/// Accept an `AllowedIPs` value: comma-separated IP addresses or CIDR blocks.
pub fn validate_address(address: &str) -> Result<(), PeerError> {
    let valid = address
        .split(',')
        .map(str::trim)
        .all(|item| item.parse::<IpNetwork>().is_ok());
    if valid {
        Ok(())
    } else {
        Err(PeerError::InvalidAddress(address.to_string()))
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "User: {}", self.name)?;
        writeln!(f, " -- Full name: {}", self.full_name)?;
        writeln!(f, " -- IP:        {}", self.address)?;
        writeln!(f, " -- Key:       {}", self.public_key)
    }
}
