//! Backend server and virtual service models.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// A 48-bit link-layer identity (Ethernet MAC address).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// The broadcast address `ff:ff:ff:ff:ff:ff`.
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);

    /// Create a MAC address from its six octets.
    pub const fn new(a: u8, b: u8, c: u8, d: u8, e: u8, f: u8) -> Self {
        Self([a, b, c, d, e, f])
    }

    /// Raw octets.
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// Error returned when a string is not a valid `aa:bb:cc:dd:ee:ff` MAC.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid MAC address '{0}'")]
pub struct ParseMacError(pub String);

impl FromStr for MacAddr {
    type Err = ParseMacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(|c| c == ':' || c == '-');

        for octet in octets.iter_mut() {
            let part = parts.next().ok_or_else(|| ParseMacError(s.to_string()))?;
            if part.len() != 2 {
                return Err(ParseMacError(s.to_string()));
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| ParseMacError(s.to_string()))?;
        }

        if parts.next().is_some() {
            return Err(ParseMacError(s.to_string()));
        }

        Ok(Self(octets))
    }
}

impl Serialize for MacAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// A unique identifier for a backend server (its position in the static table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BackendId(pub u32);

/// Represents a single upstream backend server.
///
/// Membership is fixed at startup; live counters for a backend are owned by
/// the statistics store and keyed by [`BackendServer::address`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BackendServer {
    /// The unique ID of the backend
    pub id: BackendId,
    /// The network address of the backend
    pub address: Ipv4Addr,
    /// The link identity of the backend
    pub mac: MacAddr,
    /// The switch port leading to the backend
    pub port: u16,
}

impl BackendServer {
    /// Create a new backend entry.
    pub fn new(id: BackendId, address: Ipv4Addr, mac: MacAddr, port: u16) -> Self {
        Self {
            id,
            address,
            mac,
            port,
        }
    }
}

impl fmt::Display for BackendServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (MAC: {}, Port: {})", self.address, self.mac, self.port)
    }
}

/// The externally advertised endpoint all clients address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualService {
    /// Virtual IP address.
    pub address: Ipv4Addr,
    /// Link identity answered for the virtual IP.
    pub mac: MacAddr,
}

impl VirtualService {
    /// Create the virtual service descriptor.
    pub fn new(address: Ipv4Addr, mac: MacAddr) -> Self {
        Self { address, mac }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_roundtrip_display() {
        let mac: MacAddr = "00:00:00:00:00:FF".parse().unwrap();
        assert_eq!(mac, MacAddr::new(0, 0, 0, 0, 0, 0xff));
        assert_eq!(mac.to_string(), "00:00:00:00:00:ff");
    }

    #[test]
    fn test_mac_accepts_dashes() {
        let mac: MacAddr = "0a-1b-2c-3d-4e-5f".parse().unwrap();
        assert_eq!(mac.octets(), [0x0a, 0x1b, 0x2c, 0x3d, 0x4e, 0x5f]);
    }

    #[test]
    fn test_mac_rejects_garbage() {
        assert!("00:00:00:00:00".parse::<MacAddr>().is_err());
        assert!("00:00:00:00:00:00:00".parse::<MacAddr>().is_err());
        assert!("zz:00:00:00:00:00".parse::<MacAddr>().is_err());
        assert!("000:00:00:00:00:0".parse::<MacAddr>().is_err());
    }

    #[test]
    fn test_mac_serde_as_string() {
        let mac = MacAddr::new(0, 0, 0, 0, 0, 2);
        let json = serde_json::to_string(&mac).unwrap();
        assert_eq!(json, "\"00:00:00:00:00:02\"");
        let back: MacAddr = serde_json::from_str(&json).unwrap();
        assert_eq!(back, mac);
    }

    #[test]
    fn test_backend_display() {
        let backend = BackendServer::new(
            BackendId(0),
            Ipv4Addr::new(10, 0, 0, 1),
            MacAddr::new(0, 0, 0, 0, 0, 1),
            1,
        );
        assert_eq!(backend.to_string(), "10.0.0.1 (MAC: 00:00:00:00:00:01, Port: 1)");
    }
}
