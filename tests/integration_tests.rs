//! Integration tests for ospf-spider
//!
//! The crawl runs end to end against a simulated router fleet (in-process
//! Connector and Prober) and writes to an on-disk SQLite file.

use ospf_spider::config::CrawlConfig;
use ospf_spider::crawl::collector::{
    PATH_ETHERNET, PATH_IP_ADDRESS, PATH_OSPF_NEIGHBOR, PATH_PPP_ACTIVE, PATH_SYSTEM_RESOURCE,
    PATH_VLAN,
};
use ospf_spider::crawl::CrawlCoordinator;
use ospf_spider::db::{adjacent_routers, keys, load_segments, schema, SegmentRow};
use ospf_spider::device::{Connector, Element, ElementTree, Session};
use ospf_spider::error::{DeviceError, DeviceResult};
use ospf_spider::probe::Prober;
use rusqlite::Connection;
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;

/// One simulated router
#[derive(Clone)]
struct SimRouter {
    alive: bool,
    password: &'static str,
    version: &'static str,
    trees: HashMap<&'static str, ElementTree>,
    failing: HashSet<&'static str>,
}

impl SimRouter {
    fn new(password: &'static str, version: &'static str) -> Self {
        Self {
            alive: true,
            password,
            version,
            trees: HashMap::new(),
            failing: HashSet::new(),
        }
    }

    fn push(mut self, path: &'static str, el: Element) -> Self {
        self.trees.entry(path).or_default().push(el);
        self
    }

    fn neighbor(self, router_id: &str, peer: &str, state: &str) -> Self {
        self.push(
            PATH_OSPF_NEIGHBOR,
            Element::new()
                .with("router-id", router_id)
                .with("address", peer)
                .with("state", state),
        )
    }

    fn address(self, cidr: &str, interface: &str) -> Self {
        self.push(
            PATH_IP_ADDRESS,
            Element::new()
                .with("address", cidr)
                .with("interface", interface)
                .with("dynamic", "false")
                .with("disabled", "false"),
        )
    }

    fn vlan(self, name: &str, id: u16, parent: &str) -> Self {
        self.push(
            PATH_VLAN,
            Element::new()
                .with("name", name)
                .with("vlan-id", &id.to_string())
                .with("interface", parent),
        )
    }

    fn ethernet(self, name: &str) -> Self {
        self.push(PATH_ETHERNET, Element::new().with("name", name).with("default-name", name))
    }

    fn customer(self, name: &str, address: &str) -> Self {
        self.push(
            PATH_PPP_ACTIVE,
            Element::new().with("name", name).with("address", address).with("service", "pppoe"),
        )
    }

    fn failing(mut self, path: &'static str) -> Self {
        self.failing.insert(path);
        self
    }
}

/// Simulated fleet; also counts probes and login attempts per address
#[derive(Default)]
struct SimNetwork {
    routers: HashMap<Ipv4Addr, SimRouter>,
    probes: Mutex<HashMap<Ipv4Addr, usize>>,
    logins: Mutex<HashMap<Ipv4Addr, usize>>,
    stop_on: Mutex<Option<(Ipv4Addr, Arc<AtomicBool>)>>,
}

impl SimNetwork {
    fn with(mut self, address: Ipv4Addr, router: SimRouter) -> Self {
        self.routers.insert(address, router);
        self
    }

    fn probes(&self, address: Ipv4Addr) -> usize {
        self.probes.lock().unwrap().get(&address).copied().unwrap_or(0)
    }

    fn logins(&self, address: Ipv4Addr) -> usize {
        self.logins.lock().unwrap().get(&address).copied().unwrap_or(0)
    }

    /// Raise `flag` as soon as `address` is probed
    fn stop_when_probed(&self, address: Ipv4Addr, flag: Arc<AtomicBool>) {
        *self.stop_on.lock().unwrap() = Some((address, flag));
    }
}

impl Prober for SimNetwork {
    fn is_alive(&self, address: Ipv4Addr) -> bool {
        *self.probes.lock().unwrap().entry(address).or_insert(0) += 1;
        if let Some((trigger, flag)) = self.stop_on.lock().unwrap().as_ref() {
            if *trigger == address {
                flag.store(true, Ordering::SeqCst);
            }
        }
        self.routers.get(&address).is_some_and(|r| r.alive)
    }
}

impl Connector for SimNetwork {
    fn connect(
        &self,
        address: Ipv4Addr,
        port: u16,
        _login: &str,
        password: &str,
    ) -> DeviceResult<Box<dyn Session>> {
        *self.logins.lock().unwrap().entry(address).or_insert(0) += 1;
        let router = self.routers.get(&address).ok_or_else(|| DeviceError::ConnectFailed {
            address,
            port,
            reason: "connection refused".into(),
        })?;
        if router.password != password {
            return Err(DeviceError::LoginRejected {
                address,
                message: "invalid user name or password (6)".into(),
            });
        }
        Ok(Box::new(SimSession {
            router: router.clone(),
            open: true,
        }))
    }
}

struct SimSession {
    router: SimRouter,
    open: bool,
}

impl Session for SimSession {
    fn is_alive(&self) -> bool {
        self.open
    }

    fn fetch(&mut self, path: &str, _fields: &[&str]) -> DeviceResult<ElementTree> {
        if !self.open {
            return Err(DeviceError::Closed);
        }
        if path == PATH_SYSTEM_RESOURCE {
            return Ok(vec![Element::new()
                .with("version", self.router.version)
                .with("board-name", "CCR2004-1G-12S+2XS")]);
        }
        if self.router.failing.contains(path) {
            return Err(DeviceError::Trap {
                command: format!("{}/print", path),
                message: "no such command prefix".into(),
            });
        }
        Ok(self.router.trees.get(path).cloned().unwrap_or_default())
    }

    fn close(&mut self) {
        self.open = false;
    }
}

fn ip(s: &str) -> Ipv4Addr {
    s.parse().unwrap()
}

fn config(seed: &str, db_path: Option<&Path>) -> CrawlConfig {
    let passwords = vec!["first".into(), "second".into(), "third".into()];
    let mut config = CrawlConfig::new(ip(seed), passwords);
    config.database = db_path.map(Path::to_path_buf);
    config.poll_interval = Duration::from_millis(5);
    config
}

fn crawl(net: &Arc<SimNetwork>, config: CrawlConfig) -> ospf_spider::CrawlResult {
    let connector: Arc<dyn Connector> = net.clone();
    let prober: Arc<dyn Prober> = net.clone();
    CrawlCoordinator::new(config, connector, prober).run().unwrap()
}

/// Fully meshed fleet: router i is 10.255.0.i, each pair shares a /30
fn mesh(n: u8) -> SimNetwork {
    let mut routers: Vec<SimRouter> = (0..n)
        .map(|i| {
            let version = if i % 2 == 0 {
                "7.12.1 (stable)"
            } else {
                "6.49.10 (long-term)"
            };
            SimRouter::new("second", version)
        })
        .collect();

    let mut subnet = 0u8;
    for i in 0..n {
        for j in (i + 1)..n {
            let (a, b) = (i as usize, j as usize);
            let local_a = format!("10.0.{}.1/30", subnet);
            let local_b = format!("10.0.{}.2/30", subnet);
            let peer_a = format!("10.0.{}.1", subnet);
            let peer_b = format!("10.0.{}.2", subnet);
            let iface_a = format!("ether{}", j + 1);
            let iface_b = format!("ether{}", i + 1);

            routers[a] = routers[a]
                .clone()
                .address(&local_a, &iface_a)
                .neighbor(&format!("10.255.0.{}", j + 1), &peer_b, "Full");
            routers[b] = routers[b]
                .clone()
                .address(&local_b, &iface_b)
                .neighbor(&format!("10.255.0.{}", i + 1), &peer_a, "Full");
            subnet += 1;
        }
    }

    routers
        .into_iter()
        .enumerate()
        .fold(SimNetwork::default(), |net, (i, r)| {
            net.with(Ipv4Addr::new(10, 255, 0, i as u8 + 1), r)
        })
}

fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
        .unwrap()
}

#[test]
fn test_seed_router_through_vlan() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("topology.db");

    let seed = SimRouter::new("second", "7.12.1 (stable)")
        .ethernet("sfp-sfpplus2")
        .vlan("vlan165-dude", 165, "sfp-sfpplus2")
        .address("10.0.0.1/30", "vlan165-dude")
        .neighbor("10.1.0.2", "10.0.0.2", "Full");
    let net = Arc::new(SimNetwork::default().with(ip("10.1.0.1"), seed));

    let result = crawl(&net, config("10.1.0.1", Some(&db_path)));

    assert!(result.completed);
    assert_eq!(result.visited, 1);
    assert_eq!(result.failed.get("unreachable"), Some(&1));
    assert_eq!(result.scheduled, vec![ip("10.1.0.1"), ip("10.1.0.2")]);
    // Second of three candidates wins; the third is never tried
    assert_eq!(net.logins(ip("10.1.0.1")), 2);

    let conn = Connection::open(&db_path).unwrap();
    assert_eq!(count(&conn, "routers"), 1);
    assert_eq!(count(&conn, "interface_names"), 1);
    assert_eq!(count(&conn, "interfaces"), 1);

    let segments = load_segments(&conn).unwrap();
    assert_eq!(segments.len(), 1);
    let SegmentRow {
        router,
        vlan_id,
        network,
        interface,
        ..
    } = &segments[0];
    assert_eq!(*router, ip("10.1.0.1"));
    assert_eq!(*vlan_id, Some(165));
    assert_eq!(network, "10.0.0.0/30");
    assert_eq!(interface.as_deref(), Some("sfp-sfpplus2"));
}

#[test]
fn test_mesh_visits_each_router_once() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("topology.db");
    let net = Arc::new(mesh(8));

    let mut cfg = config("10.255.0.1", Some(&db_path));
    cfg.concurrency = 3;
    let result = crawl(&net, cfg);

    assert!(result.completed);
    assert!(!result.limit_reached);
    assert_eq!(result.visited, 8);
    assert_eq!(result.failed_total(), 0);
    assert_eq!(result.discovered, 8);

    let unique: HashSet<_> = result.scheduled.iter().collect();
    assert_eq!(unique.len(), result.scheduled.len());
    for i in 1..=8 {
        assert_eq!(net.probes(Ipv4Addr::new(10, 255, 0, i)), 1);
    }

    assert_eq!(result.writer.records_written, 8);
    assert_eq!(result.writer.connections, 8 * 7);

    let conn = Connection::open(&db_path).unwrap();
    assert_eq!(count(&conn, "routers"), 8);
    assert_eq!(count(&conn, "connections"), 8 * 7);
    assert_eq!(adjacent_routers(&conn, ip("10.255.0.1")).unwrap().len(), 7);
}

#[test]
fn test_unreachable_router_not_retried() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("topology.db");

    // Both reachable routers report the dead one
    let net = Arc::new(
        SimNetwork::default()
            .with(
                ip("10.1.0.1"),
                SimRouter::new("first", "7.12")
                    .address("10.0.0.1/30", "ether1")
                    .address("10.0.0.5/30", "ether2")
                    .neighbor("10.1.0.2", "10.0.0.2", "Full")
                    .neighbor("10.1.0.9", "10.0.0.6", "Full"),
            )
            .with(
                ip("10.1.0.2"),
                SimRouter::new("first", "7.12")
                    .address("10.0.0.2/30", "ether1")
                    .address("10.0.0.9/30", "ether2")
                    .neighbor("10.1.0.1", "10.0.0.1", "Full")
                    .neighbor("10.1.0.9", "10.0.0.10", "Full"),
            )
            .with(ip("10.1.0.9"), {
                let mut dead = SimRouter::new("first", "7.12");
                dead.alive = false;
                dead
            }),
    );

    let result = crawl(&net, config("10.1.0.1", Some(&db_path)));

    assert_eq!(result.visited, 2);
    assert_eq!(result.failed.get("unreachable"), Some(&1));
    assert_eq!(net.probes(ip("10.1.0.9")), 1);
    assert_eq!(net.logins(ip("10.1.0.9")), 0);
}

#[test]
fn test_dropped_routers_by_kind() {
    let net = Arc::new(
        SimNetwork::default()
            .with(
                ip("10.1.0.1"),
                SimRouter::new("first", "7.12")
                    .address("10.0.0.1/29", "bridge-core")
                    .neighbor("10.1.0.2", "10.0.0.2", "Full")
                    .neighbor("10.1.0.3", "10.0.0.3", "Full")
                    .neighbor("10.1.0.4", "10.0.0.4", "Init"),
            )
            .with(ip("10.1.0.2"), SimRouter::new("not-in-list", "7.12"))
            .with(ip("10.1.0.3"), SimRouter::new("first", "5.26")),
    );

    let dir = tempdir().unwrap();
    let db_path = dir.path().join("topology.db");
    let result = crawl(&net, config("10.1.0.1", Some(&db_path)));

    assert_eq!(result.visited, 1);
    assert_eq!(result.failed.get("auth_exhausted"), Some(&1));
    assert_eq!(result.failed.get("version_unknown"), Some(&1));
    // Non-Full adjacency never enters the frontier
    assert!(!result.scheduled.contains(&ip("10.1.0.4")));
    assert_eq!(net.logins(ip("10.1.0.2")), 3);
}

#[test]
fn test_partial_collection_still_persisted() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("topology.db");

    let net = Arc::new(
        SimNetwork::default().with(
            ip("10.1.0.1"),
            SimRouter::new("first", "6.48.6")
                .address("10.0.0.1/30", "ether1")
                .neighbor("10.1.0.2", "10.0.0.2", "Full")
                .customer("jan.kowalski", "100.64.1.17")
                .customer("anna.nowak", "100.64.1.18")
                .failing(PATH_OSPF_NEIGHBOR),
        ),
    );

    let result = crawl(&net, config("10.1.0.1", Some(&db_path)));

    assert_eq!(result.visited, 1);
    assert_eq!(result.scheduled, vec![ip("10.1.0.1")]);
    assert_eq!(result.writer.customers, 2);
    assert_eq!(result.writer.partial_records, 1);

    let conn = Connection::open(&db_path).unwrap();
    assert_eq!(count(&conn, "routers"), 1);
    assert_eq!(count(&conn, "customers"), 2);
    assert_eq!(count(&conn, "connections"), 0);
}

#[test]
fn test_rerun_is_idempotent() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("topology.db");
    let net = Arc::new(mesh(4));

    let first = crawl(&net, config("10.255.0.1", Some(&db_path)));
    let second = crawl(&net, config("10.255.0.1", Some(&db_path)));
    assert_eq!(first.writer.connections, second.writer.connections);

    let conn = Connection::open(&db_path).unwrap();
    assert_eq!(count(&conn, "routers"), 4);
    assert_eq!(count(&conn, "connections"), 4 * 3);
    assert_eq!(count(&conn, "interfaces"), 4 * 3);
    assert_eq!(count(&conn, "crawl_runs"), 2);

    let stale: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM connections
             WHERE last_seen < (SELECT MAX(started_at) FROM crawl_runs)",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(stale, 0);
}

#[test]
fn test_storage_unavailable_crawl_continues() {
    let net = Arc::new(mesh(3));

    let result = crawl(&net, config("10.255.0.1", None));

    assert!(result.completed);
    assert_eq!(result.visited, 3);
    assert!(!result.persisted());
    assert_eq!(result.writer.records_written, 0);
    assert_eq!(result.writer.records_dropped, 3);
}

#[test]
fn test_stop_flag_before_start() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("topology.db");
    let net = Arc::new(mesh(3));

    let connector: Arc<dyn Connector> = net.clone();
    let prober: Arc<dyn Prober> = net.clone();
    let cfg = config("10.255.0.1", Some(&db_path));
    let coordinator = CrawlCoordinator::new(cfg, connector, prober);
    coordinator.shutdown_flag().store(true, Ordering::SeqCst);

    let result = coordinator.run().unwrap();
    assert!(!result.completed);
    assert!(result.scheduled.is_empty());

    let conn = Connection::open(&db_path).unwrap();
    assert_eq!(
        schema::get_spider_info(&conn, keys::STATUS).unwrap(),
        Some("interrupted".to_string())
    );
}

#[test]
fn test_stop_flag_while_running() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("topology.db");
    let net = Arc::new(mesh(4));

    let mut cfg = config("10.255.0.1", Some(&db_path));
    cfg.concurrency = 1;
    let connector: Arc<dyn Connector> = net.clone();
    let prober: Arc<dyn Prober> = net.clone();
    let coordinator = CrawlCoordinator::new(cfg, connector, prober);
    net.stop_when_probed(ip("10.255.0.2"), coordinator.shutdown_flag());

    let result = coordinator.run().unwrap();

    assert!(!result.completed);
    assert!(!result.limit_reached);
    // The seed's neighbors were queued, but nothing started after the flag
    assert_eq!(result.scheduled, vec![ip("10.255.0.1"), ip("10.255.0.2")]);
    assert_eq!(result.discovered, 4);
    assert_eq!(net.probes(ip("10.255.0.3")), 0);
    assert_eq!(net.probes(ip("10.255.0.4")), 0);
    assert_eq!(result.visited, 1);
    assert_eq!(result.failed.get("cancelled"), Some(&1));
    assert_eq!(result.writer.records_written, 1);

    let conn = Connection::open(&db_path).unwrap();
    let routers: Vec<u32> = conn
        .prepare("SELECT address FROM routers")
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(routers, vec![u32::from(ip("10.255.0.1"))]);
    assert_eq!(count(&conn, "connections"), 3);

    let status: String = conn
        .query_row("SELECT status FROM crawl_runs", [], |row| row.get(0))
        .unwrap();
    assert_eq!(status, "interrupted");
}

#[test]
fn test_router_limit() {
    let net = Arc::new(mesh(6));
    let mut cfg = config("10.255.0.1", None);
    cfg.concurrency = 2;
    cfg.max_routers = Some(3);

    let result = crawl(&net, cfg);

    assert!(result.limit_reached);
    assert!(result.completed);
    // Workers still in flight at the limit are drained, not abandoned
    assert!(result.visited >= 3);
    assert!(result.scheduled.len() >= 3 && result.scheduled.len() <= 4);
    assert_eq!(result.visited as usize, result.scheduled.len());
}

#[test]
fn test_run_with_progress_reports() {
    let net = Arc::new(mesh(4));
    let connector: Arc<dyn Connector> = net.clone();
    let prober: Arc<dyn Prober> = net.clone();
    let coordinator = CrawlCoordinator::new(config("10.255.0.1", None), connector, prober);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let result = coordinator
        .run_with_progress(move |p| sink.lock().unwrap().push(p.concurrency))
        .unwrap();

    assert_eq!(result.visited, 4);
    assert!(!seen.lock().unwrap().is_empty());
    assert_eq!(coordinator.progress(Duration::ZERO).visited, 4);
}
