//! IPv4 CIDR arithmetic for cluster network division.
//!
//! The allocator carves a cluster network into equally sized per-node
//! subnets, so this type only needs parsing, canonicalization, containment
//! checks and prefix widening/narrowing. All math is on the `u32` form of
//! the address.

use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from CIDR parsing and division.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CidrError {
    /// The string is not in `a.b.c.d/len` form.
    #[error("invalid CIDR notation: {0}")]
    Invalid(String),

    /// The prefix length is outside 0..=32.
    #[error("invalid prefix length: /{0}")]
    PrefixLength(u8),

    /// Division would push the prefix past 32 bits.
    #[error("cannot divide /{prefix} network by {extra} additional bits")]
    Division { prefix: u8, extra: u8 },
}

/// An IPv4 network in CIDR notation, stored in canonical form
/// (host bits zeroed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    addr: Ipv4Addr,
    prefix_len: u8,
}

fn mask(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix_len))
    }
}

impl Cidr {
    /// Build a CIDR, zeroing any host bits in `addr`.
    pub fn new(addr: Ipv4Addr, prefix_len: u8) -> Result<Self, CidrError> {
        if prefix_len > 32 {
            return Err(CidrError::PrefixLength(prefix_len));
        }
        let network = u32::from(addr) & mask(prefix_len);
        Ok(Self {
            addr: Ipv4Addr::from(network),
            prefix_len,
        })
    }

    /// The network address.
    pub fn network(&self) -> Ipv4Addr {
        self.addr
    }

    /// The prefix length.
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// The conventional gateway for the subnet: the network address with the
    /// last octet set to 1.
    pub fn gateway(&self) -> Ipv4Addr {
        let o = self.addr.octets();
        Ipv4Addr::new(o[0], o[1], o[2], 1)
    }

    /// True if `other` lies entirely within this network.
    pub fn contains(&self, other: &Cidr) -> bool {
        other.prefix_len >= self.prefix_len
            && (u32::from(other.addr) & mask(self.prefix_len)) == u32::from(self.addr)
    }

    /// Divide this network into `2^extra_bits` subnets of prefix
    /// `prefix_len + extra_bits`, in address order.
    pub fn divide(&self, extra_bits: u8) -> Result<Vec<Cidr>, CidrError> {
        let new_prefix = self.prefix_len.checked_add(extra_bits).filter(|p| *p <= 32);
        let Some(new_prefix) = new_prefix else {
            return Err(CidrError::Division {
                prefix: self.prefix_len,
                extra: extra_bits,
            });
        };

        let step = 1u64 << (32 - new_prefix);
        let count = 1u64 << extra_bits;
        let base = u64::from(u32::from(self.addr));

        let mut subnets = Vec::with_capacity(count as usize);
        for i in 0..count {
            let addr = Ipv4Addr::from((base + i * step) as u32);
            subnets.push(Cidr {
                addr,
                prefix_len: new_prefix,
            });
        }
        Ok(subnets)
    }

    /// Reconstruct the enclosing network by widening the prefix by
    /// `widen_bits`. This is the inverse of [`Cidr::divide`] for any of the
    /// subnets it produced.
    pub fn parent(&self, widen_bits: u8) -> Result<Cidr, CidrError> {
        let Some(new_prefix) = self.prefix_len.checked_sub(widen_bits) else {
            return Err(CidrError::PrefixLength(self.prefix_len));
        };
        Cidr::new(self.addr, new_prefix)
    }
}

impl FromStr for Cidr {
    type Err = CidrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| CidrError::Invalid(s.to_string()))?;
        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|_| CidrError::Invalid(s.to_string()))?;
        let prefix_len: u8 = prefix
            .parse()
            .map_err(|_| CidrError::Invalid(s.to_string()))?;
        Cidr::new(addr, prefix_len)
    }
}

impl std::fmt::Display for Cidr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

impl Serialize for Cidr {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Cidr {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
