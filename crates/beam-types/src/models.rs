use serde::{Deserialize, Serialize};

/// Account ids are SQLite rowids. They start at 1, so 0 never names an account.
pub type AccountId = i64;

pub type ConnectionId = i64;

/// Stored state of a connection row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Pending,
    Live,
}

impl ConnectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Live => "live",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "live" => Some(Self::Live),
            _ => None,
        }
    }
}

/// Pairing status as seen by one side of a connection.
///
/// The stored row only knows initiator and invitee. Who is waiting on whom
/// depends on which party is asking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkStatus {
    #[default]
    #[serde(rename = "")]
    Unlinked,
    /// Somebody asked to pair with the caller; the caller has to accept.
    #[serde(rename = "pendingWithMe")]
    PendingWithMe,
    /// The caller asked to pair; the peer has not accepted yet.
    #[serde(rename = "pendingWithPeer")]
    PendingWithPeer,
    #[serde(rename = "connected")]
    Connected,
}

/// Point-in-time view of an account's pairing and mailbox state.
///
/// `peer_id` is 0 when there is no relationship.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub peer_id: AccountId,
    pub status: LinkStatus,
    pub should_fetch: bool,
    pub should_peer_fetch: bool,
}

impl Snapshot {
    pub fn unlinked() -> Self {
        Self::default()
    }
}
