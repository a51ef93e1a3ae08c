//! Typed router records
//!
//! Raw [`Element`] records are converted into these structs as soon as they
//! leave a session. Each `from_element` returns `None` for a record that is
//! missing a required attribute; callers skip such records.

use crate::device::Element;
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Adjacency state that counts as a topology fact
pub const OSPF_STATE_FULL: &str = "Full";

/// `/system/resource` record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemResource {
    /// Software version string, e.g. "7.12.1 (stable)"
    pub version: String,

    /// Hardware model
    pub board_name: Option<String>,
}

impl SystemResource {
    pub fn from_element(el: &Element) -> Option<Self> {
        Some(Self {
            version: el.get("version")?.trim().to_string(),
            board_name: el.get("board-name").map(str::to_string),
        })
    }
}

/// `/interface/ethernet` record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthernetInterface {
    /// Configured name, e.g. "sfp-sfpplus2"
    pub name: String,

    /// Factory name of the port
    pub default_name: Option<String>,

    pub mac_address: Option<String>,

    pub disabled: bool,
}

impl EthernetInterface {
    pub fn from_element(el: &Element) -> Option<Self> {
        Some(Self {
            name: el.get("name")?.to_string(),
            default_name: el.get("default-name").map(str::to_string),
            mac_address: el.get("mac-address").map(str::to_string),
            disabled: el.flag("disabled"),
        })
    }
}

/// `/interface/vlan` record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VlanInterface {
    /// Name of the VLAN sub-interface
    pub name: String,

    /// 802.1Q tag
    pub vlan_id: u16,

    /// Interface the VLAN is stacked on (physical or another VLAN)
    pub interface: String,

    pub disabled: bool,
}

impl VlanInterface {
    pub fn from_element(el: &Element) -> Option<Self> {
        Some(Self {
            name: el.get("name")?.to_string(),
            vlan_id: el.get("vlan-id")?.trim().parse().ok()?,
            interface: el.get("interface")?.to_string(),
            disabled: el.flag("disabled"),
        })
    }
}

/// `/routing/ospf/neighbor` record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OspfNeighbor {
    /// Neighbor's OSPF router id
    pub router_id: Option<Ipv4Addr>,

    /// Neighbor's address on the shared segment
    pub address: Ipv4Addr,

    /// Adjacency state ("Full", "2-Way", "ExStart", ...)
    pub state: String,

    /// Local interface (RouterOS 6 only)
    pub interface: Option<String>,
}

impl OspfNeighbor {
    pub fn from_element(el: &Element) -> Option<Self> {
        Some(Self {
            router_id: el.get("router-id").and_then(|s| Ipv4Addr::from_str(s.trim()).ok()),
            address: Ipv4Addr::from_str(el.get("address")?.trim()).ok()?,
            state: el.get("state")?.to_string(),
            interface: el.get("interface").map(str::to_string),
        })
    }

    /// True once the adjacency is fully synchronized
    pub fn is_full(&self) -> bool {
        self.state.eq_ignore_ascii_case(OSPF_STATE_FULL)
    }

    /// Address the crawl should visit next
    pub fn crawl_address(&self) -> Ipv4Addr {
        self.router_id.unwrap_or(self.address)
    }
}

/// `/ip/address` record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpAddressEntry {
    /// Interface address with prefix, e.g. 10.0.0.1/30
    pub address: Ipv4Net,

    /// Interface the address is bound to
    pub interface: String,

    pub dynamic: bool,

    pub disabled: bool,
}

impl IpAddressEntry {
    pub fn from_element(el: &Element) -> Option<Self> {
        Some(Self {
            address: Ipv4Net::from_str(el.get("address")?.trim()).ok()?,
            interface: el.get("interface")?.to_string(),
            dynamic: el.flag("dynamic"),
            disabled: el.flag("disabled"),
        })
    }

    /// Network the address belongs to (host bits cleared)
    pub fn network(&self) -> Ipv4Net {
        self.address.trunc()
    }

    /// Static and enabled addresses are the only ones used for resolution
    pub fn is_usable(&self) -> bool {
        !self.dynamic && !self.disabled
    }

    /// Network start through broadcast, inclusive
    pub fn contains(&self, peer: Ipv4Addr) -> bool {
        self.network().contains(&peer)
    }
}

/// `/ppp/active` record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PppSession {
    /// Subscriber login
    pub name: String,

    /// Address assigned to the subscriber
    pub address: Ipv4Addr,

    /// pppoe, l2tp, ...
    pub service: Option<String>,
}

impl PppSession {
    pub fn from_element(el: &Element) -> Option<Self> {
        let name = el.get("name")?.trim();
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            address: Ipv4Addr::from_str(el.get("address")?.trim()).ok()?,
            service: el.get("service").map(str::to_string),
        })
    }
}
