//! Neighbor resolution
//!
//! Maps each fully adjacent OSPF neighbor to the local segment it was seen
//! on: the address entry whose subnet holds the peer address, the base
//! interface under any VLAN stacking, and the first VLAN tag on the way down.
//!
//! ```text
//!   peer 10.0.0.2
//!        │ subnet match
//!        ▼
//!   10.0.0.1/30 on "vlan165-dude"
//!        │ VLAN table: vlan165-dude -> sfp-sfpplus2 (tag 165)
//!        ▼
//!   base "sfp-sfpplus2", vlan 165, network 10.0.0.0/30
//! ```
//!
//! Pure and deterministic. Unwinding is bounded by the number of VLAN
//! entries, so inconsistent or cyclic VLAN tables still terminate.

use crate::crawl::collector::RawTopology;
use crate::crawl::record::ResolvedNeighbor;
use crate::device::{IpAddressEntry, OspfNeighbor, VlanInterface};
use std::collections::HashMap;
use tracing::trace;

/// Result of unwinding an interface through the VLAN table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseInterface {
    pub name: String,
    pub vlan_id: Option<u16>,
}

/// Resolve every Full neighbor of one router
pub fn resolve_neighbors(topology: &RawTopology) -> Vec<ResolvedNeighbor> {
    let vlans = vlan_index(&topology.vlans);

    topology
        .neighbors
        .iter()
        .filter(|n| n.is_full())
        .map(|n| resolve_one(n, &topology.addresses, &vlans))
        .collect()
}

fn resolve_one(
    neighbor: &OspfNeighbor,
    addresses: &[IpAddressEntry],
    vlans: &HashMap<&str, &VlanInterface>,
) -> ResolvedNeighbor {
    let mut resolved = ResolvedNeighbor {
        router_id: neighbor.crawl_address(),
        peer: neighbor.address,
        interface: String::new(),
        vlan_id: None,
        network: None,
    };

    let Some(entry) = matching_address(addresses, neighbor) else {
        trace!(peer = %neighbor.address, "No local subnet holds peer");
        return resolved;
    };

    let base = unwind(&entry.interface, vlans);
    resolved.interface = base.name;
    resolved.vlan_id = base.vlan_id;
    resolved.network = Some(entry.network());
    resolved
}

/// First usable address entry whose subnet holds the peer
///
/// Overlapping subnets resolve to whichever entry the router listed first.
pub fn matching_address<'a>(
    addresses: &'a [IpAddressEntry],
    neighbor: &OspfNeighbor,
) -> Option<&'a IpAddressEntry> {
    addresses
        .iter()
        .filter(|a| a.is_usable())
        .find(|a| a.contains(neighbor.address))
}

/// Index VLAN entries by name; the first definition of a name wins
pub fn vlan_index(vlans: &[VlanInterface]) -> HashMap<&str, &VlanInterface> {
    let mut index = HashMap::with_capacity(vlans.len());
    for vlan in vlans {
        index.entry(vlan.name.as_str()).or_insert(vlan);
    }
    index
}

/// Follow VLAN sub-interfaces down to the base interface
///
/// Takes at most `vlans.len()` steps. The first VLAN tag encountered is kept.
pub fn unwind(interface: &str, vlans: &HashMap<&str, &VlanInterface>) -> BaseInterface {
    let mut name = interface;
    let mut vlan_id = None;

    for _ in 0..vlans.len() {
        let Some(vlan) = vlans.get(name) else {
            break;
        };
        vlan_id.get_or_insert(vlan.vlan_id);
        name = vlan.interface.as_str();
    }

    BaseInterface {
        name: name.to_string(),
        vlan_id,
    }
}
