//! Board identity and session sequencing types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A 6-byte hardware (MAC) address
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// All-zero address
    pub const ZERO: MacAddress = MacAddress([0; 6]);
    /// Link-layer broadcast address
    pub const BROADCAST: MacAddress = MacAddress([0xFF; 6]);

    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Build an address from the first six bytes of `bytes`
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let octets: [u8; 6] = bytes.get(..6)?.try_into().ok()?;
        Some(Self(octets))
    }

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            a, b, c, d, e, g
        )
    }
}

impl fmt::Debug for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddress({})", self)
    }
}

/// Error parsing a textual hardware address
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid hardware address '{0}'")]
pub struct ParseMacError(pub String);

impl FromStr for MacAddress {
    type Err = ParseMacError;

    /// Accepts `aa:bb:cc:dd:ee:ff`, `aa-bb-cc-dd-ee-ff` or `aabbccddeeff`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s
            .trim()
            .chars()
            .filter(|c| *c != ':' && *c != '-')
            .collect();

        let bytes = hex::decode(&compact).map_err(|_| ParseMacError(s.to_string()))?;
        Self::from_slice(&bytes)
            .filter(|_| bytes.len() == 6)
            .ok_or_else(|| ParseMacError(s.to_string()))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = ParseMacError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.to_string()
    }
}

/// Identity of a board, as announced during discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardIdentity {
    /// Hardware address the board announced from
    pub mac: MacAddress,
    /// Board model (e.g. "RB750Gr3")
    pub model: String,
    /// CPU architecture (e.g. "mmips", "arm64")
    pub arch: String,
}

impl BoardIdentity {
    pub fn new(mac: MacAddress, model: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            mac,
            model: model.into(),
            arch: arch.into(),
        }
    }
}

impl fmt::Display for BoardIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.mac, self.model, self.arch)
    }
}

/// Sequencing counters carried in every frame of a session.
///
/// `sent` advances once per transmitted frame. Whenever a response frame is
/// accepted the whole pair is replaced by the value the board sent back, so
/// the board stays the authority on sequencing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SessionState {
    pub sent: u16,
    pub received: u16,
}

impl SessionState {
    pub const fn new(sent: u16, received: u16) -> Self {
        Self { sent, received }
    }

    /// State to stamp on the next outgoing frame
    #[must_use]
    pub fn advance(self) -> Self {
        Self {
            sent: self.sent.wrapping_add(1),
            ..self
        }
    }

    /// Big-endian wire form: `sent ‖ received`
    pub fn to_wire(self) -> [u8; 4] {
        let [s0, s1] = self.sent.to_be_bytes();
        let [r0, r1] = self.received.to_be_bytes();
        [s0, s1, r0, r1]
    }

    pub fn from_wire(raw: [u8; 4]) -> Self {
        Self {
            sent: u16::from_be_bytes([raw[0], raw[1]]),
            received: u16::from_be_bytes([raw[2], raw[3]]),
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.sent, self.received)
    }
}
