//! Upserts of discovery records into the topology tables
//!
//! Every [`DiscoveryRecord`] is written in its own transaction. The router
//! row is upserted first so dependent rows can reference it. All rows touched
//! in one run carry the same `last_seen` run timestamp.

use crate::crawl::record::{DiscoveryRecord, ResolvedNeighbor};
use crate::error::DbResult;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::net::Ipv4Addr;

/// Rows touched by one record
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PersistCounts {
    pub connections: u64,
    pub interfaces: u64,
    pub customers: u64,
    /// Neighbors with no resolved network (nothing to store)
    pub unresolved: u64,
}

fn addr_to_db(addr: Ipv4Addr) -> i64 {
    i64::from(u32::from(addr))
}

fn addr_from_db(value: i64) -> Ipv4Addr {
    Ipv4Addr::from(value as u32)
}

/// Write one record and commit
pub fn persist_record(
    conn: &Connection,
    record: &DiscoveryRecord,
    run_ts: i64,
) -> DbResult<PersistCounts> {
    let tx = conn.unchecked_transaction()?;
    let mut counts = PersistCounts::default();

    let router_id = upsert_router(&tx, record.router, run_ts)?;

    for neighbor in &record.neighbors {
        if neighbor.network.is_none() {
            counts.unresolved += 1;
            continue;
        }
        let (connection_id, interface_written) = upsert_segment(&tx, router_id, neighbor, run_ts)?;
        if connection_id.is_some() {
            counts.connections += 1;
        }
        if interface_written {
            counts.interfaces += 1;
        }
    }

    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO customers (name, router_id, address, last_seen) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(name) DO UPDATE SET
                router_id = excluded.router_id,
                address = excluded.address,
                last_seen = excluded.last_seen",
        )?;
        for customer in &record.customers {
            stmt.execute(params![customer.name, router_id, addr_to_db(customer.address), run_ts])?;
            counts.customers += 1;
        }
    }

    tx.commit()?;
    Ok(counts)
}

fn upsert_router(tx: &Transaction<'_>, address: Ipv4Addr, run_ts: i64) -> DbResult<i64> {
    tx.prepare_cached(
        "INSERT INTO routers (address, last_seen) VALUES (?1, ?2)
         ON CONFLICT(address) DO UPDATE SET last_seen = excluded.last_seen",
    )?
    .execute(params![addr_to_db(address), run_ts])?;

    let id = tx
        .prepare_cached("SELECT id FROM routers WHERE address = ?1")?
        .query_row(params![addr_to_db(address)], |row| row.get(0))?;
    Ok(id)
}

/// Upsert the connection for one neighbor and link its base interface
fn upsert_segment(
    tx: &Transaction<'_>,
    router_id: i64,
    neighbor: &ResolvedNeighbor,
    run_ts: i64,
) -> DbResult<(Option<i64>, bool)> {
    let Some(network) = neighbor.network else {
        return Ok((None, false));
    };
    let network = network.to_string();
    let vlan_id = neighbor.vlan_id.map(i64::from);

    let name_id = if neighbor.interface.is_empty() {
        None
    } else {
        Some(interface_name_id(tx, &neighbor.interface)?)
    };

    // `IS` so an untagged segment matches its NULL vlan_id
    let existing: Option<i64> = tx
        .prepare_cached(
            "SELECT id FROM connections WHERE router_id = ?1 AND vlan_id IS ?2 AND network = ?3",
        )?
        .query_row(params![router_id, vlan_id, network], |row| row.get(0))
        .optional()?;

    let connection_id = match existing {
        Some(id) => {
            tx.prepare_cached("UPDATE connections SET last_seen = ?1 WHERE id = ?2")?
                .execute(params![run_ts, id])?;
            id
        }
        None => {
            tx.prepare_cached(
                "INSERT INTO connections (router_id, vlan_id, network, last_seen)
                 VALUES (?1, ?2, ?3, ?4)",
            )?
            .execute(params![router_id, vlan_id, network, run_ts])?;
            tx.last_insert_rowid()
        }
    };

    let Some(name_id) = name_id else {
        return Ok((Some(connection_id), false));
    };

    tx.prepare_cached(
        "INSERT INTO interfaces (connection_id, name_id, last_seen) VALUES (?1, ?2, ?3)
         ON CONFLICT(connection_id, name_id) DO UPDATE SET last_seen = excluded.last_seen",
    )?
    .execute(params![connection_id, name_id, run_ts])?;

    Ok((Some(connection_id), true))
}

fn interface_name_id(tx: &Transaction<'_>, name: &str) -> DbResult<i64> {
    tx.prepare_cached("INSERT OR IGNORE INTO interface_names (name) VALUES (?1)")?
        .execute(params![name])?;
    let id = tx
        .prepare_cached("SELECT id FROM interface_names WHERE name = ?1")?
        .query_row(params![name], |row| row.get(0))?;
    Ok(id)
}

/// Counters stored on the run marker
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunTotals {
    pub records_written: u64,
    pub routers: u64,
    pub connections: u64,
    pub customers: u64,
}

/// Insert the run marker and return its id
pub fn begin_run(conn: &Connection, started_at: i64) -> DbResult<i64> {
    conn.execute(
        "INSERT INTO crawl_runs (started_at, status) VALUES (?1, 'running')",
        params![started_at],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Close the run marker with its final status and counters
pub fn finish_run(
    conn: &Connection,
    run_id: i64,
    finished_at: i64,
    status: &str,
    totals: &RunTotals,
) -> DbResult<()> {
    conn.execute(
        "UPDATE crawl_runs SET finished_at = ?1, status = ?2, records_written = ?3,
            routers = ?4, connections = ?5, customers = ?6
         WHERE id = ?7",
        params![
            finished_at,
            status,
            totals.records_written as i64,
            totals.routers as i64,
            totals.connections as i64,
            totals.customers as i64,
            run_id,
        ],
    )?;
    Ok(())
}

/// A stored segment with its base interface, for reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRow {
    pub router: Ipv4Addr,
    pub vlan_id: Option<u16>,
    pub network: String,
    pub interface: Option<String>,
    pub last_seen: i64,
}

/// All stored segments ordered by router, network, VLAN
pub fn load_segments(conn: &Connection) -> DbResult<Vec<SegmentRow>> {
    let mut stmt = conn.prepare(
        "SELECT r.address, c.vlan_id, c.network, n.name, c.last_seen
         FROM connections c
         JOIN routers r ON r.id = c.router_id
         LEFT JOIN interfaces i ON i.connection_id = c.id
         LEFT JOIN interface_names n ON n.id = i.name_id
         ORDER BY r.address, c.network, c.vlan_id",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(SegmentRow {
            router: addr_from_db(row.get(0)?),
            vlan_id: row.get::<_, Option<i64>>(1)?.map(|v| v as u16),
            network: row.get(2)?,
            interface: row.get(3)?,
            last_seen: row.get(4)?,
        })
    })?;

    Ok(rows.collect::<Result<_, _>>()?)
}

/// Routers that share a network with `router`, with the shared network
pub fn adjacent_routers(conn: &Connection, router: Ipv4Addr) -> DbResult<Vec<(Ipv4Addr, String)>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT r2.address, c2.network
         FROM routers r1
         JOIN connections c1 ON c1.router_id = r1.id
         JOIN connections c2 ON c2.network = c1.network AND c2.router_id <> c1.router_id
         JOIN routers r2 ON r2.id = c2.router_id
         WHERE r1.address = ?1
         ORDER BY r2.address",
    )?;

    let rows = stmt.query_map(params![addr_to_db(router)], |row| {
        Ok((addr_from_db(row.get(0)?), row.get(1)?))
    })?;

    Ok(rows.collect::<Result<_, _>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::record::CustomerSession;
    use crate::db::schema::create_database;

    fn db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_database(&conn).unwrap();
        conn
    }

    fn record(router: Ipv4Addr, vlan: Option<u16>, network: &str, iface: &str) -> DiscoveryRecord {
        let mut rec = DiscoveryRecord::new(router);
        rec.neighbors.push(ResolvedNeighbor {
            router_id: Ipv4Addr::new(10, 1, 0, 9),
            peer: Ipv4Addr::new(10, 0, 68, 226),
            interface: iface.into(),
            vlan_id: vlan,
            network: Some(network.parse().unwrap()),
        });
        rec
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_reprocessing_record_is_idempotent() {
        let conn = db();
        let rec = record(Ipv4Addr::new(10, 0, 0, 1), Some(154), "10.0.68.224/30", "ether9");

        persist_record(&conn, &rec, 1_000).unwrap();
        persist_record(&conn, &rec, 2_000).unwrap();

        assert_eq!(count(&conn, "routers"), 1);
        assert_eq!(count(&conn, "connections"), 1);
        assert_eq!(count(&conn, "interfaces"), 1);
        assert_eq!(count(&conn, "interface_names"), 1);

        let segments = load_segments(&conn).unwrap();
        assert_eq!(
            segments,
            vec![SegmentRow {
                router: Ipv4Addr::new(10, 0, 0, 1),
                vlan_id: Some(154),
                network: "10.0.68.224/30".into(),
                interface: Some("ether9".into()),
                last_seen: 2_000,
            }]
        );
    }

    #[test]
    fn test_untagged_segment_is_idempotent() {
        let conn = db();
        let rec = record(Ipv4Addr::new(10, 0, 0, 1), None, "10.0.0.0/30", "ether1");

        persist_record(&conn, &rec, 1).unwrap();
        persist_record(&conn, &rec, 2).unwrap();
        assert_eq!(count(&conn, "connections"), 1);
    }

    #[test]
    fn test_vlan_distinguishes_segments() {
        let conn = db();
        let router = Ipv4Addr::new(10, 0, 0, 1);
        persist_record(&conn, &record(router, Some(154), "10.0.68.224/30", "ether9"), 1).unwrap();
        persist_record(&conn, &record(router, Some(155), "10.0.68.224/30", "ether9"), 1).unwrap();

        assert_eq!(count(&conn, "connections"), 2);
        assert_eq!(count(&conn, "interface_names"), 1);
    }

    #[test]
    fn test_unresolved_neighbor_skipped() {
        let conn = db();
        let mut rec = DiscoveryRecord::new(Ipv4Addr::new(10, 0, 0, 1));
        rec.neighbors.push(ResolvedNeighbor {
            router_id: Ipv4Addr::new(10, 1, 0, 2),
            peer: Ipv4Addr::new(172, 16, 0, 2),
            interface: String::new(),
            vlan_id: None,
            network: None,
        });

        let counts = persist_record(&conn, &rec, 1).unwrap();
        assert_eq!(counts.unresolved, 1);
        assert_eq!(count(&conn, "routers"), 1);
        assert_eq!(count(&conn, "connections"), 0);
    }

    #[test]
    fn test_customer_overwritten_by_name() {
        let conn = db();
        let mut rec = DiscoveryRecord::new(Ipv4Addr::new(10, 0, 0, 1));
        rec.customers.push(CustomerSession {
            name: "jan.kowalski".into(),
            address: Ipv4Addr::new(100, 64, 1, 17),
        });
        persist_record(&conn, &rec, 1).unwrap();

        let mut moved = DiscoveryRecord::new(Ipv4Addr::new(10, 0, 0, 2));
        moved.customers.push(CustomerSession {
            name: "jan.kowalski".into(),
            address: Ipv4Addr::new(100, 64, 2, 5),
        });
        persist_record(&conn, &moved, 2).unwrap();

        assert_eq!(count(&conn, "customers"), 1);
        let (router, address): (i64, i64) = conn
            .query_row(
                "SELECT r.address, c.address FROM customers c JOIN routers r ON r.id = c.router_id",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(addr_from_db(router), Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(addr_from_db(address), Ipv4Addr::new(100, 64, 2, 5));
    }

    #[test]
    fn test_adjacent_routers_share_network() {
        let conn = db();
        let a = Ipv4Addr::new(10, 0, 0, 1);
        let b = Ipv4Addr::new(10, 0, 0, 2);
        persist_record(&conn, &record(a, None, "10.0.0.0/30", "ether1"), 1).unwrap();
        persist_record(&conn, &record(b, None, "10.0.0.0/30", "sfp1"), 1).unwrap();

        assert_eq!(adjacent_routers(&conn, a).unwrap(), vec![(b, "10.0.0.0/30".to_string())]);
    }

    #[test]
    fn test_run_marker() {
        let conn = db();
        let id = begin_run(&conn, 100).unwrap();
        let totals = RunTotals {
            records_written: 3,
            routers: 3,
            connections: 4,
            customers: 0,
        };
        finish_run(&conn, id, 160, "completed", &totals).unwrap();

        let (status, finished, conns): (String, i64, i64) = conn
            .query_row(
                "SELECT status, finished_at, connections FROM crawl_runs WHERE id = ?1",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(status, "completed");
        assert_eq!(finished, 160);
        assert_eq!(conns, 4);
    }
}
