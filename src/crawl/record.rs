//! Transient per-router crawl output

use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

/// One OSPF neighbor after interface/VLAN resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedNeighbor {
    /// Neighbor's router id (next crawl target)
    pub router_id: Ipv4Addr,

    /// Neighbor's address on the shared segment
    pub peer: Ipv4Addr,

    /// Base (non-VLAN) interface carrying the segment; empty if unresolved
    pub interface: String,

    /// First VLAN tag seen while unwinding
    pub vlan_id: Option<u16>,

    /// Local network containing the peer
    pub network: Option<Ipv4Net>,
}

impl ResolvedNeighbor {
    /// True if a local subnet matched the peer address
    pub fn is_resolved(&self) -> bool {
        self.network.is_some() && !self.interface.is_empty()
    }
}

/// A subscriber session seen on the router
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerSession {
    pub name: String,
    pub address: Ipv4Addr,
}

/// Everything one Router Worker learned about one router
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryRecord {
    /// Address the router was crawled at
    pub router: Ipv4Addr,

    pub neighbors: Vec<ResolvedNeighbor>,

    pub customers: Vec<CustomerSession>,

    /// Element trees that could not be fetched
    pub failed_fetches: Vec<&'static str>,
}

impl DiscoveryRecord {
    pub fn new(router: Ipv4Addr) -> Self {
        Self {
            router,
            neighbors: Vec::new(),
            customers: Vec::new(),
            failed_fetches: Vec::new(),
        }
    }

    /// Addresses of neighboring routers to add to the frontier
    pub fn neighbor_addresses(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.neighbors.iter().map(|n| n.router_id)
    }

    /// True if any element tree fetch failed
    pub fn is_partial(&self) -> bool {
        !self.failed_fetches.is_empty()
    }
}
