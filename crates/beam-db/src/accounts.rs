use beam_types::models::AccountId;
use rand::Rng;
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use uuid::Builder;

use crate::code::ConnectCode;
use crate::error::{DbError, DbResult, OptionalExt, is_constraint_violation};
use crate::models::{AccountRow, NewAccount};
use crate::Database;

/// Attempts before giving up on finding an unused connect code.
const MAX_CODE_ATTEMPTS: usize = 8;

impl Database {
    /// Register a new account with a random auth key and connect code.
    pub fn create_account<R: Rng>(&self, rng: &mut R) -> DbResult<NewAccount> {
        self.with_conn_mut(|conn| {
            for attempt in 1..=MAX_CODE_ATTEMPTS {
                let auth_key = Builder::from_random_bytes(rng.random()).into_uuid().to_string();
                let code = ConnectCode::generate(rng);

                match conn.execute(
                    "INSERT INTO accounts (key_hash, connect_code) VALUES (?1, ?2)",
                    (hash_key(&auth_key), code.as_str()),
                ) {
                    Ok(_) => {
                        let id = conn.last_insert_rowid();
                        debug!("Created account {} with code {}", id, code);
                        return Ok(NewAccount {
                            id,
                            connect_code: code.into_string(),
                            auth_key,
                        });
                    }
                    Err(e) if is_constraint_violation(&e) => {
                        warn!("Connect code collision on attempt {}", attempt);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Err(DbError::Conflict("no free connect code"))
        })
    }

    pub fn account_by_auth_key(&self, auth_key: &str) -> DbResult<AccountRow> {
        let key_hash = hash_key(auth_key);
        self.with_conn(|conn| {
            query_account(conn, "key_hash = ?1", &key_hash)?.ok_or(DbError::NotFound("account"))
        })
    }

    /// Exact, case-sensitive match.
    pub fn account_by_connect_code(&self, code: &ConnectCode) -> DbResult<AccountRow> {
        self.with_conn(|conn| {
            query_account(conn, "connect_code = ?1", &code.as_str())?
                .ok_or(DbError::NotFound("account"))
        })
    }

    pub fn account_by_id(&self, id: AccountId) -> DbResult<AccountRow> {
        self.with_conn(|conn| {
            query_account(conn, "id = ?1", &id)?.ok_or(DbError::NotFound("account"))
        })
    }

    /// Replace the push token. `None` or an empty token clears it.
    pub fn set_push_token(&self, id: AccountId, token: Option<&str>) -> DbResult<()> {
        let token = token.filter(|t| !t.is_empty());
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE accounts SET push_token = ?1 WHERE id = ?2",
                rusqlite::params![token, id],
            )?;
            if changed == 0 {
                return Err(DbError::NotFound("account"));
            }
            Ok(())
        })
    }
}

/// Auth keys are stored as hex SHA-256 digests.
fn hash_key(auth_key: &str) -> String {
    hex::encode(Sha256::digest(auth_key.as_bytes()))
}

fn query_account(
    conn: &Connection,
    predicate: &str,
    value: &dyn rusqlite::ToSql,
) -> DbResult<Option<AccountRow>> {
    let sql = format!(
        "SELECT id, connect_code, push_token, created_at FROM accounts WHERE {}",
        predicate
    );
    let mut stmt = conn.prepare(&sql)?;

    stmt.query_row([value], |row| {
        Ok(AccountRow {
            id: row.get(0)?,
            connect_code: row.get(1)?,
            push_token: row.get(2)?,
            created_at: row.get(3)?,
        })
    })
    .optional()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn register_then_resolve_by_key_and_code() {
        let db = Database::open_in_memory().unwrap();
        let acct = db.create_account(&mut rand::rng()).unwrap();

        assert!(acct.id > 0);
        let by_key = db.account_by_auth_key(&acct.auth_key).unwrap();
        assert_eq!(by_key.id, acct.id);

        let code = ConnectCode::parse(&acct.connect_code).unwrap();
        let by_code = db.account_by_connect_code(&code).unwrap();
        assert_eq!(by_code.id, acct.id);
    }

    #[test]
    fn unknown_key_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        db.create_account(&mut rand::rng()).unwrap();

        let err = db.account_by_auth_key("not-a-key").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn raw_key_is_not_stored() {
        let db = Database::open_in_memory().unwrap();
        let acct = db.create_account(&mut rand::rng()).unwrap();

        let stored: String = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT key_hash FROM accounts WHERE id = ?1", [acct.id], |r| {
                    r.get(0)
                })?)
            })
            .unwrap();
        assert_ne!(stored, acct.auth_key);
        assert_eq!(stored.len(), 64);
    }

    #[test]
    fn code_collision_retries_with_a_new_code() {
        let db = Database::open_in_memory().unwrap();

        // Two generators on the same seed produce the same first key and
        // code; the second registration has to move on to its next draw.
        let first = db.create_account(&mut StdRng::seed_from_u64(9)).unwrap();
        let second = db.create_account(&mut StdRng::seed_from_u64(9)).unwrap();

        assert_ne!(first.connect_code, second.connect_code);
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn push_token_set_and_cleared() {
        let db = Database::open_in_memory().unwrap();
        let acct = db.create_account(&mut rand::rng()).unwrap();
        assert_eq!(db.account_by_id(acct.id).unwrap().push_token, None);

        db.set_push_token(acct.id, Some("abc123")).unwrap();
        assert_eq!(
            db.account_by_id(acct.id).unwrap().push_token.as_deref(),
            Some("abc123")
        );

        db.set_push_token(acct.id, Some("")).unwrap();
        assert_eq!(db.account_by_id(acct.id).unwrap().push_token, None);
    }

    #[test]
    fn push_token_for_missing_account() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.set_push_token(42, Some("tok")).unwrap_err().is_not_found());
    }
}
