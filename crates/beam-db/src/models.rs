//! Row types as they come out of SQLite. The wire shapes live in beam-types.

use beam_types::models::{AccountId, ConnectionId, ConnectionStatus};

#[derive(Debug, Clone)]
pub struct AccountRow {
    pub id: AccountId,
    pub connect_code: String,
    pub push_token: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRow {
    pub id: ConnectionId,
    pub initiator_id: AccountId,
    pub invitee_id: AccountId,
    pub status: ConnectionStatus,
    pub created_at: String,
}

impl ConnectionRow {
    /// The other party. `account` must be one of the two ends.
    pub fn peer_of(&self, account: AccountId) -> AccountId {
        if self.initiator_id == account {
            self.invitee_id
        } else {
            self.initiator_id
        }
    }
}

/// Result of registering a new account. `auth_key` is the only copy of the
/// credential; the store keeps its digest.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub id: AccountId,
    pub connect_code: String,
    pub auth_key: String,
}

/// Unread flags for one side of a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Probe {
    /// The peer deposited something the caller has not cleared.
    pub self_has_unread: bool,
    /// The caller deposited something the peer has not cleared.
    pub peer_has_unread: bool,
}
