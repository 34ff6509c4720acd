//! Single-slot mailbox: one payload per (connection, sender).
//!
//! Depositing again from the same sender overwrites the slot, read or not.
//! Withdrawing never changes the slot; clearing marks it fetched and drops
//! the content so the row only says "nothing new".

use beam_types::models::{AccountId, ConnectionId, ConnectionStatus};
use rusqlite::{Connection, TransactionBehavior};
use tracing::debug;

use crate::error::{DbError, DbResult, OptionalExt};
use crate::models::{ConnectionRow, Probe};
use crate::pairing::get_connection;
use crate::Database;

impl Database {
    /// Store `content` for the sender's peer. Returns the peer's account id
    /// so the caller can nudge it.
    pub fn deposit(&self, sender: AccountId, content: &[u8]) -> DbResult<AccountId> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let connection = get_connection(&tx, sender)?;
            if connection.status != ConnectionStatus::Live {
                return Err(DbError::Conflict("connection is not live"));
            }

            tx.execute(
                "INSERT INTO payloads (connection_id, sender_id, fetched, fetched_at, content)
                 VALUES (?1, ?2, 0, NULL, ?3)
                 ON CONFLICT (connection_id, sender_id) DO UPDATE SET
                     created_at = datetime('now'),
                     fetched    = 0,
                     fetched_at = NULL,
                     content    = excluded.content",
                rusqlite::params![connection.id, sender, content],
            )?;
            tx.commit()?;

            let peer = connection.peer_of(sender);
            debug!(
                "Account {} deposited {} bytes for {} on connection {}",
                sender,
                content.len(),
                peer,
                connection.id
            );
            Ok(peer)
        })
    }

    /// Read what the fetcher's peer left. Does not mark it fetched.
    pub fn withdraw(&self, fetcher: AccountId) -> DbResult<Vec<u8>> {
        self.with_conn(|conn| {
            // One read transaction so the connection and the slot come from
            // the same snapshot.
            let tx = conn.unchecked_transaction()?;
            let connection = get_connection(&tx, fetcher)?;

            let (fetched, content): (bool, Option<Vec<u8>>) =
                inbound_slot(&tx, &connection, fetcher, "fetched, content", |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })?;
            if fetched {
                return Err(DbError::AlreadyFetched);
            }
            content.ok_or(DbError::AlreadyFetched)
        })
    }

    /// Acknowledge the peer's payload: mark it fetched and drop the bytes.
    /// Clearing an already-cleared slot succeeds.
    pub fn clear(&self, fetcher: AccountId) -> DbResult<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let connection = get_connection(&tx, fetcher)?;

            let fetched: bool =
                inbound_slot(&tx, &connection, fetcher, "fetched", |row| row.get(0))?;
            if fetched {
                return Ok(());
            }

            tx.execute(
                "UPDATE payloads SET fetched = 1, fetched_at = datetime('now'), content = NULL
                 WHERE connection_id = ?1 AND sender_id = ?2",
                [connection.id, connection.peer_of(fetcher)],
            )?;
            tx.commit()?;

            debug!("Account {} cleared payload on connection {}", fetcher, connection.id);
            Ok(())
        })
    }

    pub fn probe(&self, connection_id: ConnectionId, account: AccountId) -> DbResult<Probe> {
        self.with_conn(|conn| probe(conn, connection_id, account))
    }
}

/// Which sides of the connection have an unread payload, from `account`'s
/// point of view. Pure read.
pub fn probe(conn: &Connection, connection_id: ConnectionId, account: AccountId) -> DbResult<Probe> {
    let mut stmt = conn.prepare(
        "SELECT sender_id FROM payloads WHERE connection_id = ?1 AND fetched = 0 LIMIT 2",
    )?;
    let senders = stmt
        .query_map([connection_id], |row| row.get::<_, AccountId>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut probe = Probe::default();
    for sender in senders {
        if sender == account {
            probe.peer_has_unread = true;
        } else {
            probe.self_has_unread = true;
        }
    }
    Ok(probe)
}

/// Look up the slot the peer filled for `account`.
fn inbound_slot<T, F>(
    conn: &Connection,
    connection: &ConnectionRow,
    account: AccountId,
    columns: &str,
    map: F,
) -> DbResult<T>
where
    F: FnOnce(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
{
    conn.query_row(
        &format!(
            "SELECT {} FROM payloads WHERE connection_id = ?1 AND sender_id = ?2",
            columns
        ),
        [connection.id, connection.peer_of(account)],
        map,
    )
    .optional()?
    .ok_or(DbError::NotFound("payload"))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two accounts with a live connection between them.
    fn live_pair() -> (Database, AccountId, AccountId, ConnectionId) {
        let db = Database::open_in_memory().unwrap();
        let a = db.create_account(&mut rand::rng()).unwrap().id;
        let b = db.create_account(&mut rand::rng()).unwrap().id;
        db.request_link(a, b).unwrap();
        let conn = db.accept_link(b, a).unwrap();
        (db, a, b, conn.id)
    }

    fn payload_rows(db: &Database, connection_id: ConnectionId) -> i64 {
        db.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM payloads WHERE connection_id = ?1",
                [connection_id],
                |r| r.get(0),
            )?)
        })
        .unwrap()
    }

    #[test]
    fn empty_mailbox_probes_false() {
        let (db, a, b, cid) = live_pair();
        assert_eq!(db.probe(cid, a).unwrap(), Probe::default());
        assert_eq!(db.probe(cid, b).unwrap(), Probe::default());
    }

    #[test]
    fn deposit_is_visible_from_both_sides() {
        let (db, a, b, cid) = live_pair();

        let peer = db.deposit(a, b"photo").unwrap();
        assert_eq!(peer, b);

        let from_a = db.probe(cid, a).unwrap();
        assert!(!from_a.self_has_unread);
        assert!(from_a.peer_has_unread);

        let from_b = db.probe(cid, b).unwrap();
        assert!(from_b.self_has_unread);
        assert!(!from_b.peer_has_unread);
    }

    #[test]
    fn deposits_both_ways_probe_true_true() {
        let (db, a, b, cid) = live_pair();
        db.deposit(a, b"one").unwrap();
        db.deposit(b, b"two").unwrap();

        let expected = Probe {
            self_has_unread: true,
            peer_has_unread: true,
        };
        assert_eq!(db.probe(cid, a).unwrap(), expected);
        assert_eq!(db.probe(cid, b).unwrap(), expected);
    }

    #[test]
    fn withdraw_returns_peer_bytes_only() {
        let (db, a, b, _) = live_pair();
        db.deposit(a, b"from a").unwrap();

        assert_eq!(db.withdraw(b).unwrap(), b"from a");
        // A cannot read its own deposit.
        assert!(db.withdraw(a).unwrap_err().is_not_found());
    }

    #[test]
    fn withdraw_is_repeatable_until_cleared() {
        let (db, a, b, _) = live_pair();
        db.deposit(a, b"bytes").unwrap();

        assert_eq!(db.withdraw(b).unwrap(), b"bytes");
        assert_eq!(db.withdraw(b).unwrap(), b"bytes");

        db.clear(b).unwrap();
        assert!(matches!(db.withdraw(b).unwrap_err(), DbError::AlreadyFetched));
    }

    #[test]
    fn clear_resets_peer_flag() {
        let (db, a, b, cid) = live_pair();
        db.deposit(a, b"x").unwrap();
        db.withdraw(b).unwrap();
        db.clear(b).unwrap();

        assert!(!db.probe(cid, a).unwrap().peer_has_unread);
        assert!(!db.probe(cid, b).unwrap().self_has_unread);

        // Content is gone, the row stays as a fetched marker.
        let content: Option<Vec<u8>> = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT content FROM payloads WHERE connection_id = ?1 AND sender_id = ?2",
                    [cid, a],
                    |r| r.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(content, None);
    }

    #[test]
    fn clear_twice_is_noop() {
        let (db, a, b, _) = live_pair();
        db.deposit(a, b"x").unwrap();
        db.clear(b).unwrap();
        db.clear(b).unwrap();
    }

    #[test]
    fn clear_without_payload_is_not_found() {
        let (db, _, b, _) = live_pair();
        assert!(db.clear(b).unwrap_err().is_not_found());
    }

    #[test]
    fn new_deposit_overwrites_slot() {
        let (db, a, b, cid) = live_pair();
        db.deposit(a, b"first").unwrap();
        db.clear(b).unwrap();
        db.deposit(a, b"second").unwrap();
        db.deposit(a, b"third").unwrap();

        assert_eq!(payload_rows(&db, cid), 1);
        assert!(db.probe(cid, b).unwrap().self_has_unread);
        assert_eq!(db.withdraw(b).unwrap(), b"third");
    }

    #[test]
    fn deposit_requires_live_connection() {
        let db = Database::open_in_memory().unwrap();
        let a = db.create_account(&mut rand::rng()).unwrap().id;
        let b = db.create_account(&mut rand::rng()).unwrap().id;

        assert!(db.deposit(a, b"x").unwrap_err().is_not_found());

        db.request_link(a, b).unwrap();
        assert!(matches!(db.deposit(a, b"x").unwrap_err(), DbError::Conflict(_)));
    }

    #[test]
    fn teardown_removes_payloads() {
        let (db, a, b, cid) = live_pair();
        db.deposit(a, b"a").unwrap();
        db.deposit(b, b"b").unwrap();
        assert_eq!(payload_rows(&db, cid), 2);

        db.unlink_all(a).unwrap();
        assert_eq!(payload_rows(&db, cid), 0);
    }

    #[test]
    fn repairing_elsewhere_removes_payloads() {
        let (db, a, b, cid) = live_pair();
        let c = db.create_account(&mut rand::rng()).unwrap().id;
        db.deposit(b, b"for a").unwrap();

        db.request_link(a, c).unwrap();

        assert_eq!(payload_rows(&db, cid), 0);
        assert!(db.withdraw(a).unwrap_err().is_not_found());
    }

    #[test]
    fn accepting_someone_else_removes_payloads() {
        let (db, a, b, cid) = live_pair();
        let c = db.create_account(&mut rand::rng()).unwrap().id;
        db.deposit(a, b"for b").unwrap();
        db.deposit(b, b"for a").unwrap();

        db.request_link(c, a).unwrap();
        // The request alone leaves the live pair and its mailbox alone.
        assert_eq!(payload_rows(&db, cid), 2);

        let fresh = db.accept_link(a, c).unwrap();
        assert_eq!(payload_rows(&db, cid), 0);
        assert_eq!(payload_rows(&db, fresh.id), 0);
        assert!(db.withdraw(b).unwrap_err().is_not_found());
        assert!(db.withdraw(a).unwrap_err().is_not_found());
    }

    #[test]
    fn directions_do_not_interfere() {
        let (db, a, b, cid) = live_pair();
        db.deposit(a, b"a->b").unwrap();
        db.deposit(b, b"b->a").unwrap();

        db.clear(b).unwrap();

        assert_eq!(db.withdraw(a).unwrap(), b"b->a");
        let from_a = db.probe(cid, a).unwrap();
        assert!(from_a.self_has_unread);
        assert!(!from_a.peer_has_unread);
    }
}
