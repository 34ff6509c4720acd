//! Client-visible state: pairing status plus the two unread flags.

use beam_db::models::{ConnectionRow, Probe};
use beam_db::{Database, DbResult, mailbox, pairing};
use beam_types::models::{AccountId, ConnectionStatus, LinkStatus, Snapshot};

/// Current snapshot for `account`. No relationship is a normal answer, not an
/// error.
pub fn snapshot(db: &Database, account: AccountId) -> DbResult<Snapshot> {
    db.with_conn(|conn| {
        // Connection and mailbox from one read snapshot.
        let tx = conn.unchecked_transaction()?;

        let connection = match pairing::get_connection(&tx, account) {
            Ok(connection) => connection,
            Err(e) if e.is_not_found() => return Ok(Snapshot::unlinked()),
            Err(e) => return Err(e),
        };
        let probe = mailbox::probe(&tx, connection.id, account)?;

        Ok(describe(&connection, account, probe))
    })
}

/// Translate a raw connection row into what `account` should see.
///
/// The invitee is the one being waited on: for them the request is
/// `pendingWithMe`, for the initiator it is `pendingWithPeer`.
pub fn describe(connection: &ConnectionRow, account: AccountId, probe: Probe) -> Snapshot {
    let status = match connection.status {
        ConnectionStatus::Live => LinkStatus::Connected,
        ConnectionStatus::Pending if connection.invitee_id == account => LinkStatus::PendingWithMe,
        ConnectionStatus::Pending => LinkStatus::PendingWithPeer,
    };

    Snapshot {
        peer_id: connection.peer_of(account),
        status,
        should_fetch: probe.self_has_unread,
        should_peer_fetch: probe.peer_has_unread,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: ConnectionStatus) -> ConnectionRow {
        ConnectionRow {
            id: 1,
            initiator_id: 10,
            invitee_id: 20,
            status,
            created_at: "2024-01-01 00:00:00".into(),
        }
    }

    #[test]
    fn pending_reads_differently_per_side() {
        let pending = row(ConnectionStatus::Pending);

        let initiator = describe(&pending, 10, Probe::default());
        assert_eq!(initiator.status, LinkStatus::PendingWithPeer);
        assert_eq!(initiator.peer_id, 20);

        let invitee = describe(&pending, 20, Probe::default());
        assert_eq!(invitee.status, LinkStatus::PendingWithMe);
        assert_eq!(invitee.peer_id, 10);
    }

    #[test]
    fn live_is_connected_for_both() {
        let live = row(ConnectionStatus::Live);
        assert_eq!(describe(&live, 10, Probe::default()).status, LinkStatus::Connected);
        assert_eq!(describe(&live, 20, Probe::default()).status, LinkStatus::Connected);
    }

    #[test]
    fn probe_flags_carry_over() {
        let probe = Probe {
            self_has_unread: true,
            peer_has_unread: false,
        };
        let snap = describe(&row(ConnectionStatus::Live), 10, probe);
        assert!(snap.should_fetch);
        assert!(!snap.should_peer_fetch);
    }

    #[test]
    fn snapshot_without_connection_is_unlinked() {
        let db = Database::open_in_memory().unwrap();
        let a = db.create_account(&mut rand::rng()).unwrap();
        assert_eq!(snapshot(&db, a.id).unwrap(), Snapshot::unlinked());
    }

    #[test]
    fn snapshot_reads_mailbox() {
        let db = Database::open_in_memory().unwrap();
        let a = db.create_account(&mut rand::rng()).unwrap().id;
        let b = db.create_account(&mut rand::rng()).unwrap().id;
        db.request_link(a, b).unwrap();
        db.accept_link(b, a).unwrap();
        db.deposit(b, b"hello").unwrap();

        let snap = snapshot(&db, a).unwrap();
        assert_eq!(
            snap,
            Snapshot {
                peer_id: b,
                status: LinkStatus::Connected,
                should_fetch: true,
                should_peer_fetch: false,
            }
        );
    }
}
