//! Pairing state machine: none → pending → live.
//!
//! An account owns at most one relationship at a time (a live connection, or
//! a pending request it sent) and can hold at most one incoming request on
//! top of that. The incoming request stays out of the way until the account
//! accepts it, at which point everything else involving either party goes.
//!
//! Every transition runs in a single immediate transaction on the writer.
//! Payload rows reference their connection with `ON DELETE CASCADE`, so a
//! deleted connection takes its mailbox with it in the same transaction.

use beam_types::models::{AccountId, ConnectionId, ConnectionStatus};
use rusqlite::{Connection, Row, TransactionBehavior};
use tracing::{debug, info};

use crate::error::{DbError, DbResult, OptionalExt};
use crate::models::ConnectionRow;
use crate::Database;

const CONNECTION_COLUMNS: &str = "id, initiator_id, invitee_id, status, created_at";

impl Database {
    pub fn get_connection(&self, account: AccountId) -> DbResult<ConnectionRow> {
        self.with_conn(|conn| get_connection(conn, account))
    }

    /// Start a pairing request from `initiator` to `invitee`.
    ///
    /// The initiator leaves whatever it was in. The invitee keeps its current
    /// relationship; an earlier request addressed to the invitee is replaced.
    pub fn request_link(&self, initiator: AccountId, invitee: AccountId) -> DbResult<ConnectionRow> {
        if initiator == invitee {
            return Err(DbError::Conflict("cannot link an account to itself"));
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let vacated = unlink_all(&tx, initiator, None)?;
            let superseded = tx.execute(
                "DELETE FROM connections WHERE invitee_id = ?1 AND status = 'pending'",
                [invitee],
            )?;

            tx.execute(
                "INSERT INTO connections (initiator_id, invitee_id, status) VALUES (?1, ?2, ?3)",
                rusqlite::params![initiator, invitee, ConnectionStatus::Pending.as_str()],
            )?;
            let row = connection_by_id(&tx, tx.last_insert_rowid())?;

            tx.commit()?;

            debug!(
                "Link requested {} -> {} (connection {}, vacated {}, superseded {})",
                initiator, invitee, row.id, vacated, superseded
            );
            Ok(row)
        })
    }

    /// Accept the pending request `peer` sent to `acceptor`.
    ///
    /// On success the live connection is the only row left that references
    /// either party.
    pub fn accept_link(&self, acceptor: AccountId, peer: AccountId) -> DbResult<ConnectionRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let mut row = tx
                .query_row(
                    &format!(
                        "SELECT {} FROM connections WHERE invitee_id = ?1 AND initiator_id = ?2",
                        CONNECTION_COLUMNS
                    ),
                    [acceptor, peer],
                    map_connection,
                )
                .optional()?
                .ok_or(DbError::NotFound("pending request"))?;

            if row.status != ConnectionStatus::Pending {
                return Err(DbError::Conflict("connection is already live"));
            }

            tx.execute(
                "UPDATE connections SET status = ?1 WHERE id = ?2",
                rusqlite::params![ConnectionStatus::Live.as_str(), row.id],
            )?;
            row.status = ConnectionStatus::Live;

            let dropped = unlink_all(&tx, acceptor, Some(row.id))? + unlink_all(&tx, peer, Some(row.id))?;

            tx.commit()?;

            info!(
                "Connection {} live between {} and {} (dropped {} stale)",
                row.id, peer, acceptor, dropped
            );
            Ok(row)
        })
    }

    /// Turn down the pending request `peer` sent to `invitee`.
    pub fn reject_link(&self, invitee: AccountId, peer: AccountId) -> DbResult<()> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute(
                "DELETE FROM connections
                 WHERE invitee_id = ?1 AND initiator_id = ?2 AND status = 'pending'",
                [invitee, peer],
            )?;
            if deleted == 0 {
                return Err(DbError::NotFound("pending request"));
            }
            debug!("Link request {} -> {} rejected", peer, invitee);
            Ok(())
        })
    }

    /// Leave every connection. No-op when there are none.
    pub fn unlink_all(&self, account: AccountId) -> DbResult<usize> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let deleted = unlink_all(&tx, account, None)?;
            tx.commit()?;
            if deleted > 0 {
                debug!("Account {} left {} connection(s)", account, deleted);
            }
            Ok(deleted)
        })
    }
}

/// Resolve the connection that represents `account`'s current state.
///
/// Preference: a live connection, then the request `account` sent, then the
/// most recent request `account` received.
pub fn get_connection(conn: &Connection, account: AccountId) -> DbResult<ConnectionRow> {
    conn.query_row(
        &format!(
            "SELECT {} FROM connections
             WHERE initiator_id = ?1 OR invitee_id = ?1
             ORDER BY CASE
                 WHEN status = 'live' THEN 0
                 WHEN initiator_id = ?1 THEN 1
                 ELSE 2
             END, id DESC
             LIMIT 1",
            CONNECTION_COLUMNS
        ),
        [account],
        map_connection,
    )
    .optional()?
    .ok_or(DbError::NotFound("connection"))
}

/// Delete every connection involving `account`, except `keep`.
pub fn unlink_all(conn: &Connection, account: AccountId, keep: Option<ConnectionId>) -> DbResult<usize> {
    let deleted = match keep {
        Some(keep) => conn.execute(
            "DELETE FROM connections WHERE (initiator_id = ?1 OR invitee_id = ?1) AND id != ?2",
            [account, keep],
        )?,
        None => conn.execute(
            "DELETE FROM connections WHERE initiator_id = ?1 OR invitee_id = ?1",
            [account],
        )?,
    };
    Ok(deleted)
}

fn connection_by_id(conn: &Connection, id: ConnectionId) -> DbResult<ConnectionRow> {
    conn.query_row(
        &format!("SELECT {} FROM connections WHERE id = ?1", CONNECTION_COLUMNS),
        [id],
        map_connection,
    )
    .optional()?
    .ok_or(DbError::NotFound("connection"))
}

fn map_connection(row: &Row<'_>) -> rusqlite::Result<ConnectionRow> {
    let status: String = row.get(3)?;
    let status = ConnectionStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown connection status '{}'", status).into(),
        )
    })?;

    Ok(ConnectionRow {
        id: row.get(0)?,
        initiator_id: row.get(1)?,
        invitee_id: row.get(2)?,
        status,
        created_at: row.get(4)?,
    })
}
