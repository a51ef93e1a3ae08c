//! Version-dispatched topology collection
//!
//! The device major version is read once per router and mapped to a
//! [`VersionTag`]. Each tag selects a [`CollectorProfile`] (element paths and
//! property lists) and a collect function. RouterOS 6 and 7 differ mostly in
//! the OSPF neighbor table: v6 names the local interface, v7 names the area.
//!
//! Every element tree fetch is independent. A failed fetch leaves that part
//! of the [`RawTopology`] empty and is noted in `failed_fetches`.

use crate::device::{
    Element, EthernetInterface, IpAddressEntry, OspfNeighbor, PppSession, Session, SystemResource,
    VlanInterface,
};
use crate::error::RouterError;
use regex::Regex;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::LazyLock;
use tracing::{debug, warn};

pub const PATH_SYSTEM_RESOURCE: &str = "/system/resource";
pub const PATH_ETHERNET: &str = "/interface/ethernet";
pub const PATH_VLAN: &str = "/interface/vlan";
pub const PATH_OSPF_NEIGHBOR: &str = "/routing/ospf/neighbor";
pub const PATH_IP_ADDRESS: &str = "/ip/address";
pub const PATH_PPP_ACTIVE: &str = "/ppp/active";

/// Leading major version number, e.g. "7" in "7.12.1 (stable)"
static MAJOR_VERSION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\.").expect("Invalid version regex"));

/// Known device software families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VersionTag {
    RouterOs6,
    RouterOs7,
}

impl VersionTag {
    /// Classify a version string by its leading major number
    pub fn classify(version: &str) -> Option<Self> {
        let caps = MAJOR_VERSION_REGEX.captures(version)?;
        match caps.get(1)?.as_str() {
            "6" => Some(VersionTag::RouterOs6),
            "7" => Some(VersionTag::RouterOs7),
            _ => None,
        }
    }

    /// Paths and property lists for this version
    pub fn profile(self) -> &'static CollectorProfile {
        match self {
            VersionTag::RouterOs6 => &ROUTEROS6_PROFILE,
            VersionTag::RouterOs7 => &ROUTEROS7_PROFILE,
        }
    }

    /// Collect function for this version
    pub fn collector(self) -> CollectFn {
        match self {
            VersionTag::RouterOs6 => collect_routeros6,
            VersionTag::RouterOs7 => collect_routeros7,
        }
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionTag::RouterOs6 => write!(f, "6.x"),
            VersionTag::RouterOs7 => write!(f, "7.x"),
        }
    }
}

/// Property lists requested for each element tree
#[derive(Debug)]
pub struct CollectorProfile {
    pub ethernet: &'static [&'static str],
    pub vlan: &'static [&'static str],
    pub ospf_neighbor: &'static [&'static str],
    pub ip_address: &'static [&'static str],
    pub ppp_active: &'static [&'static str],
}

pub static ROUTEROS6_PROFILE: CollectorProfile = CollectorProfile {
    ethernet: &["name", "default-name", "mac-address", "disabled"],
    vlan: &["name", "vlan-id", "interface", "disabled"],
    ospf_neighbor: &["router-id", "address", "interface", "state"],
    ip_address: &["address", "network", "interface", "dynamic", "disabled"],
    ppp_active: &["name", "address", "service"],
};

pub static ROUTEROS7_PROFILE: CollectorProfile = CollectorProfile {
    ethernet: &["name", "default-name", "mac-address", "disabled"],
    vlan: &["name", "vlan-id", "interface", "disabled"],
    ospf_neighbor: &["router-id", "address", "area", "state"],
    ip_address: &["address", "network", "interface", "dynamic", "disabled"],
    ppp_active: &["name", "address", "service"],
};

/// Typed element trees fetched from one router
#[derive(Debug, Clone, Default)]
pub struct RawTopology {
    pub ethernet: Vec<EthernetInterface>,
    pub vlans: Vec<VlanInterface>,
    pub neighbors: Vec<OspfNeighbor>,
    /// Usable (static, enabled) addresses only
    pub addresses: Vec<IpAddressEntry>,
    pub sessions: Vec<PppSession>,
    /// Paths whose fetch failed
    pub failed_fetches: Vec<&'static str>,
}

/// Version-specific collection entry point
pub type CollectFn = fn(&mut dyn Session) -> RawTopology;

/// Read the software version and classify it
pub fn detect_version(
    session: &mut dyn Session,
    address: Ipv4Addr,
) -> Result<VersionTag, RouterError> {
    let version = match session.fetch(PATH_SYSTEM_RESOURCE, &["version", "board-name"]) {
        Ok(tree) => tree.iter().find_map(SystemResource::from_element).map(|r| r.version),
        Err(e) => {
            warn!(router = %address, error = %e, "Failed to read system resource");
            None
        }
    };

    let Some(version) = version else {
        return Err(RouterError::VersionUnknown {
            address,
            version: String::from("<unavailable>"),
        });
    };

    VersionTag::classify(&version).ok_or(RouterError::VersionUnknown { address, version })
}

/// Collect with the function selected by `tag`
pub fn collect(session: &mut dyn Session, tag: VersionTag) -> RawTopology {
    (tag.collector())(session)
}

fn collect_routeros6(session: &mut dyn Session) -> RawTopology {
    collect_with(session, &ROUTEROS6_PROFILE)
}

fn collect_routeros7(session: &mut dyn Session) -> RawTopology {
    collect_with(session, &ROUTEROS7_PROFILE)
}

fn collect_with(session: &mut dyn Session, profile: &CollectorProfile) -> RawTopology {
    let mut failed = Vec::new();

    let ethernet = fetch_typed(
        session,
        PATH_ETHERNET,
        profile.ethernet,
        EthernetInterface::from_element,
        &mut failed,
    );
    let vlans = fetch_typed(
        session,
        PATH_VLAN,
        profile.vlan,
        VlanInterface::from_element,
        &mut failed,
    );
    let neighbors = fetch_typed(
        session,
        PATH_OSPF_NEIGHBOR,
        profile.ospf_neighbor,
        OspfNeighbor::from_element,
        &mut failed,
    );
    let addresses = fetch_typed(
        session,
        PATH_IP_ADDRESS,
        profile.ip_address,
        IpAddressEntry::from_element,
        &mut failed,
    )
    .into_iter()
    .filter(IpAddressEntry::is_usable)
    .collect();
    let sessions = fetch_typed(
        session,
        PATH_PPP_ACTIVE,
        profile.ppp_active,
        PppSession::from_element,
        &mut failed,
    );

    RawTopology {
        ethernet,
        vlans,
        neighbors,
        addresses,
        sessions,
        failed_fetches: failed,
    }
}

/// Fetch one tree and parse it, skipping malformed records
fn fetch_typed<T>(
    session: &mut dyn Session,
    path: &'static str,
    fields: &[&str],
    parse: fn(&Element) -> Option<T>,
    failed: &mut Vec<&'static str>,
) -> Vec<T> {
    let tree = match session.fetch(path, fields) {
        Ok(tree) => tree,
        Err(e) => {
            debug!(path, error = %e, "Fetch failed, treating as empty");
            failed.push(path);
            return Vec::new();
        }
    };

    let total = tree.len();
    let parsed: Vec<T> = tree.iter().filter_map(parse).collect();
    if parsed.len() < total {
        debug!(path, skipped = total - parsed.len(), "Skipped malformed records");
    }
    parsed
}
