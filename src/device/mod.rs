//! Router management capability
//!
//! The crawl core only needs four things from a router: connect with a
//! login/password, check the session is alive, fetch an element tree at a
//! path, and close. Those are the [`Connector`] and [`Session`] traits.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Router Worker                        │
//! │  - owns exactly one Session at a time               │
//! │  - SessionGuard closes it on every exit path        │
//! └────────────────────────┬────────────────────────────┘
//!                          │ fetch(path, fields)
//!                          ▼
//! ┌─────────────────────────────────────────────────────┐
//! │          Connector / Session (traits)                │
//! │  - ApiConnector: RouterOS API over TCP (8728)       │
//! │  - test doubles: simulated router graphs            │
//! └────────────────────────┬────────────────────────────┘
//!                          │ ElementTree (raw records)
//!                          ▼
//! ┌─────────────────────────────────────────────────────┐
//! │              types::* (typed records)                │
//! │  - parsed at the boundary, unknown keys ignored     │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod routeros;
pub mod types;

use crate::error::DeviceResult;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

pub use routeros::ApiConnector;
pub use types::{
    EthernetInterface, IpAddressEntry, OspfNeighbor, PppSession, SystemResource, VlanInterface,
};

/// One raw record of an element tree (attribute name -> value)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    attrs: BTreeMap<String, String>,
}

impl Element {
    /// Create an empty element
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style attribute insert
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.insert(key, value);
        self
    }

    /// Set an attribute
    pub fn insert(&mut self, key: &str, value: &str) {
        self.attrs.insert(key.to_string(), value.to_string());
    }

    /// Get an attribute value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    /// Boolean attribute as the router spells it ("true"/"yes")
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.get(key), Some("true") | Some("yes"))
    }

    /// Number of attributes
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    /// True if the element has no attributes
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }
}

/// Records returned for one path, in router order
pub type ElementTree = Vec<Element>;

/// A live management session with one router
///
/// Sessions are owned by a single worker thread and never shared.
pub trait Session: Send {
    /// Whether the session is still usable
    fn is_alive(&self) -> bool;

    /// Fetch all records at `path`, restricted to `fields` when non-empty
    fn fetch(&mut self, path: &str, fields: &[&str]) -> DeviceResult<ElementTree>;

    /// Close the session; calling it twice is harmless
    fn close(&mut self);
}

/// Opens management sessions
pub trait Connector: Send + Sync {
    /// Connect and log in
    fn connect(
        &self,
        address: Ipv4Addr,
        port: u16,
        login: &str,
        password: &str,
    ) -> DeviceResult<Box<dyn Session>>;
}
