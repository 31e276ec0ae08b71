use std::fmt;

use serde::{Deserialize, Serialize};

/// Hardware type for Ethernet (RFC 1700).
pub const HTYPE_ETHER: u16 = 1;

/// Source of a hardware address is unknown.
pub const HWADDR_SOURCE_UNKNOWN: u32 = 0;

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    for (idx, b) in bytes.iter().enumerate() {
        if idx > 0 {
            f.write_str(":")?;
        }
        write!(f, "{b:02x}")?;
    }
    Ok(())
}

/// Link-layer address of a client together with its hardware type and the
/// mechanism it was learned through.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HwAddr {
    pub bytes: Vec<u8>,
    pub htype: u16,
    #[serde(default)]
    pub source: u32,
}

impl HwAddr {
    pub fn new(bytes: impl Into<Vec<u8>>, htype: u16) -> Self {
        Self {
            bytes: bytes.into(),
            htype,
            source: HWADDR_SOURCE_UNKNOWN,
        }
    }

    pub fn ethernet(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(bytes, HTYPE_ETHER)
    }

    pub fn with_source(mut self, source: u32) -> Self {
        self.source = source;
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Display for HwAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hwtype={} ", self.htype)?;
        write_hex(f, &self.bytes)
    }
}

/// DHCPv4 client identifier (option 61).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub Vec<u8>);

impl ClientId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

/// DHCPv6 DHCP Unique Identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Duid(pub Vec<u8>);

impl Duid {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Duid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_render_as_colon_hex() {
        let hw = HwAddr::ethernet(vec![0x00, 0x1a, 0x2b, 0x3c, 0x4d, 0x5e]);
        assert_eq!(hw.to_string(), "hwtype=1 00:1a:2b:3c:4d:5e");
        assert_eq!(ClientId::new(vec![1, 2, 255]).to_string(), "01:02:ff");
        assert_eq!(Duid::new(Vec::new()).to_string(), "");
    }

    #[test]
    fn hwaddr_source_defaults_to_unknown() {
        let hw = HwAddr::new(vec![1, 2, 3], 6);
        assert_eq!(hw.source, HWADDR_SOURCE_UNKNOWN);
        assert_eq!(hw.with_source(4).source, 4);
    }
}
