//! SQLite-based storage implementation

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};

use super::{
    BearerToken, ClientMetadata, Credential, EmailVerification, ExternalLink, PasswordReset,
    PendingConnection, PendingRegistration, Purpose, RoleFlags, Session, SessionId, SessionStore,
    StoreResult, User, UserId, UserStore,
};
use crate::error::BrokerError;
use crate::provider::Provider;

/// Current schema version
const SCHEMA_VERSION: i32 = 1;

/// SQLite-based store implementing both UserStore and SessionStore
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn internal(e: rusqlite::Error) -> BrokerError {
    BrokerError::Internal(e.to_string())
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation)
}

fn millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn provider_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Provider> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn roles_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<RoleFlags> {
    Ok(RoleFlags {
        admin: row.get(idx)?,
        plugin_author: row.get(idx + 1)?,
        event_author: row.get(idx + 2)?,
    })
}

const USER_COLUMNS: &str = "id, email, first_name, last_name, verified_email, changing_email, \
     admin, plugin_author, event_author, newsletter, created_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId(row.get(0)?),
        email: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        verified_email: row.get(4)?,
        changing_email: row.get(5)?,
        roles: roles_at(row, 6)?,
        newsletter: row.get(9)?,
        created_at: from_millis(row.get(10)?),
    })
}

fn credential_from_row(row: &Row<'_>) -> rusqlite::Result<Credential> {
    Ok(Credential {
        email: row.get(0)?,
        password_hash: row.get(1)?,
        user_id: UserId(row.get(2)?),
    })
}

fn link_from_row(row: &Row<'_>) -> rusqlite::Result<ExternalLink> {
    Ok(ExternalLink {
        provider: provider_at(row, 0)?,
        external_id: row.get(1)?,
        user_id: UserId(row.get(2)?),
    })
}

const SESSION_COLUMNS: &str =
    "id, user_id, last_used, ip, os, browser, is_mobile, admin, plugin_author, event_author";

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: SessionId(row.get(0)?),
        user_id: UserId(row.get(1)?),
        last_used: from_millis(row.get(2)?),
        client: ClientMetadata {
            ip: row.get(3)?,
            os: row.get(4)?,
            browser: row.get(5)?,
            is_mobile: row.get(6)?,
        },
        roles: roles_at(row, 7)?,
    })
}

fn token_from_row(row: &Row<'_>) -> rusqlite::Result<BearerToken> {
    Ok(BearerToken {
        token: row.get(0)?,
        user_id: UserId(row.get(1)?),
        expires_at: from_millis(row.get(2)?),
    })
}

impl SqliteStore {
    /// Open or create a SQLite database at the given path
    pub fn open(path: &str) -> Result<Self, BrokerError> {
        let conn = Connection::open(path).map_err(internal)?;
        Self::migrate(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Fresh private in-memory database (for testing purposes)
    pub fn open_in_memory() -> Result<Self, BrokerError> {
        let conn = Connection::open_in_memory().map_err(internal)?;
        Self::migrate(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| BrokerError::Internal("database lock poisoned".to_string()))
    }

    /// Run database migrations
    fn migrate(conn: &Connection) -> Result<(), BrokerError> {
        let current_version = Self::get_schema_version(conn)?;

        if current_version < SCHEMA_VERSION {
            tracing::info!(
                current = current_version,
                target = SCHEMA_VERSION,
                "Running database migrations"
            );

            if current_version < 1 {
                Self::migrate_v1(conn)?;
            }

            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )
            .map_err(internal)?;

            tracing::info!("Database migrations complete");
        }

        Ok(())
    }

    /// Get current schema version (0 if no schema exists)
    fn get_schema_version(conn: &Connection) -> Result<i32, BrokerError> {
        let table_exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
                [],
                |row| row.get(0),
            )
            .map_err(internal)?;

        if !table_exists {
            return Ok(0);
        }

        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get::<_, Option<i32>>(0).map(|v| v.unwrap_or(0))
        })
        .map_err(internal)
    }

    /// Migration to version 1: initial schema
    fn migrate_v1(conn: &Connection) -> Result<(), BrokerError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                verified_email INTEGER NOT NULL DEFAULT 0,
                changing_email TEXT,
                admin INTEGER NOT NULL DEFAULT 0,
                plugin_author INTEGER NOT NULL DEFAULT 0,
                event_author INTEGER NOT NULL DEFAULT 0,
                newsletter INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            );

            -- Password logins, one per user
            CREATE TABLE IF NOT EXISTS credentials (
                email TEXT PRIMARY KEY,
                password_hash TEXT NOT NULL,
                user_id TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS external_links (
                provider TEXT NOT NULL,
                external_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                PRIMARY KEY (provider, external_id),
                UNIQUE (provider, user_id)
            );

            CREATE TABLE IF NOT EXISTS pending_connections (
                state TEXT PRIMARY KEY,
                provider TEXT NOT NULL,
                purpose TEXT NOT NULL,
                merge_token TEXT,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS pending_registrations (
                key TEXT PRIMARY KEY,
                provider TEXT NOT NULL,
                external_id TEXT NOT NULL,
                email TEXT NOT NULL,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS password_resets (
                user_id TEXT PRIMARY KEY,
                id TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS email_verifications (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                last_used INTEGER NOT NULL,
                ip TEXT NOT NULL,
                os TEXT NOT NULL,
                browser TEXT NOT NULL,
                is_mobile INTEGER NOT NULL DEFAULT 0,
                admin INTEGER NOT NULL DEFAULT 0,
                plugin_author INTEGER NOT NULL DEFAULT 0,
                event_author INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_last_used ON sessions(last_used);

            CREATE TABLE IF NOT EXISTS login_tokens (
                token TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS merge_tokens (
                token TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );
            "#,
        )
        .map_err(internal)?;

        Ok(())
    }

    fn delete_keys(&self, table: &str, column: &str, keys: &[String]) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; keys.len()].join(", ");
        let sql = format!("DELETE FROM {} WHERE {} IN ({})", table, column, placeholders);
        let conn = self.lock()?;
        let deleted = conn
            .execute(&sql, params_from_iter(keys.iter()))
            .map_err(internal)?;
        Ok(deleted as u64)
    }

    fn expired_tokens(&self, table: &str, cutoff: DateTime<Utc>) -> StoreResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("SELECT token FROM {} WHERE expires_at < ?1", table))
            .map_err(internal)?;
        let tokens = stmt
            .query_map(params![millis(cutoff)], |row| row.get(0))
            .map_err(internal)?
            .collect::<rusqlite::Result<Vec<String>>>()
            .map_err(internal)?;
        Ok(tokens)
    }

    fn insert_token(&self, table: &str, token: &BearerToken) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT INTO {} (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
                table
            ),
            params![token.token, token.user_id.0, millis(token.expires_at)],
        )
        .map_err(internal)?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn create_user(&self, user: User) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT INTO users ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                USER_COLUMNS
            ),
            params![
                user.id.0,
                user.email,
                user.first_name,
                user.last_name,
                user.verified_email,
                user.changing_email,
                user.roles.admin,
                user.roles.plugin_author,
                user.roles.event_author,
                user.newsletter,
                millis(user.created_at),
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                BrokerError::EmailInUse
            } else {
                internal(e)
            }
        })?;
        Ok(())
    }

    async fn get_user(&self, user_id: &UserId) -> StoreResult<Option<User>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            params![user_id.0],
            user_from_row,
        )
        .optional()
        .map_err(internal)
    }

    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
            params![email],
            user_from_row,
        )
        .optional()
        .map_err(internal)
    }

    async fn update_user(&self, user: &User) -> StoreResult<()> {
        let conn = self.lock()?;
        let updated = conn
            .execute(
                "UPDATE users SET email = ?2, first_name = ?3, last_name = ?4, verified_email = ?5, \
                 changing_email = ?6, admin = ?7, plugin_author = ?8, event_author = ?9, newsletter = ?10 \
                 WHERE id = ?1",
                params![
                    user.id.0,
                    user.email,
                    user.first_name,
                    user.last_name,
                    user.verified_email,
                    user.changing_email,
                    user.roles.admin,
                    user.roles.plugin_author,
                    user.roles.event_author,
                    user.newsletter,
                ],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    BrokerError::EmailInUse
                } else {
                    internal(e)
                }
            })?;
        if updated == 0 {
            return Err(BrokerError::NotFound("user"));
        }
        Ok(())
    }

    async fn create_credential(&self, credential: Credential) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO credentials (email, password_hash, user_id) VALUES (?1, ?2, ?3)",
            params![
                credential.email.to_lowercase(),
                credential.password_hash,
                credential.user_id.0
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                BrokerError::EmailInUse
            } else {
                internal(e)
            }
        })?;
        Ok(())
    }

    async fn get_credential_by_email(&self, email: &str) -> StoreResult<Option<Credential>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT email, password_hash, user_id FROM credentials WHERE email = ?1",
            params![email.to_lowercase()],
            credential_from_row,
        )
        .optional()
        .map_err(internal)
    }

    async fn get_credential_by_user(&self, user_id: &UserId) -> StoreResult<Option<Credential>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT email, password_hash, user_id FROM credentials WHERE user_id = ?1",
            params![user_id.0],
            credential_from_row,
        )
        .optional()
        .map_err(internal)
    }

    async fn update_credential(&self, credential: &Credential) -> StoreResult<()> {
        let conn = self.lock()?;
        let updated = conn
            .execute(
                "UPDATE credentials SET email = ?2, password_hash = ?3 WHERE user_id = ?1",
                params![
                    credential.user_id.0,
                    credential.email.to_lowercase(),
                    credential.password_hash
                ],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    BrokerError::EmailInUse
                } else {
                    internal(e)
                }
            })?;
        if updated == 0 {
            return Err(BrokerError::NotFound("credential"));
        }
        Ok(())
    }

    async fn delete_credential(&self, user_id: &UserId) -> StoreResult<bool> {
        let conn = self.lock()?;
        let deleted = conn
            .execute("DELETE FROM credentials WHERE user_id = ?1", params![user_id.0])
            .map_err(internal)?;
        Ok(deleted > 0)
    }

    async fn create_link(&self, link: ExternalLink) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO external_links (provider, external_id, user_id) VALUES (?1, ?2, ?3)",
            params![link.provider.as_str(), link.external_id, link.user_id.0],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                BrokerError::AlreadyLinked
            } else {
                internal(e)
            }
        })?;
        Ok(())
    }

    async fn get_link(
        &self,
        provider: Provider,
        external_id: &str,
    ) -> StoreResult<Option<ExternalLink>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT provider, external_id, user_id FROM external_links \
             WHERE provider = ?1 AND external_id = ?2",
            params![provider.as_str(), external_id],
            link_from_row,
        )
        .optional()
        .map_err(internal)
    }

    async fn get_link_for_user(
        &self,
        provider: Provider,
        user_id: &UserId,
    ) -> StoreResult<Option<ExternalLink>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT provider, external_id, user_id FROM external_links \
             WHERE provider = ?1 AND user_id = ?2",
            params![provider.as_str(), user_id.0],
            link_from_row,
        )
        .optional()
        .map_err(internal)
    }

    async fn delete_link(&self, provider: Provider, user_id: &UserId) -> StoreResult<bool> {
        let conn = self.lock()?;
        let deleted = conn
            .execute(
                "DELETE FROM external_links WHERE provider = ?1 AND user_id = ?2",
                params![provider.as_str(), user_id.0],
            )
            .map_err(internal)?;
        Ok(deleted > 0)
    }

    async fn create_connection(&self, connection: PendingConnection) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO pending_connections (state, provider, purpose, merge_token, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                connection.state,
                connection.provider.as_str(),
                connection.purpose.as_str(),
                connection.merge_token,
                millis(connection.created_at),
            ],
        )
        .map_err(internal)?;
        Ok(())
    }

    async fn take_connection(&self, state: &str) -> StoreResult<Option<PendingConnection>> {
        let conn = self.lock()?;
        conn.query_row(
            "DELETE FROM pending_connections WHERE state = ?1 \
             RETURNING state, provider, purpose, merge_token, created_at",
            params![state],
            |row| {
                let purpose: String = row.get(2)?;
                Ok(PendingConnection {
                    state: row.get(0)?,
                    provider: provider_at(row, 1)?,
                    purpose: Purpose::parse(&purpose).ok_or_else(|| {
                        rusqlite::Error::FromSqlConversionFailure(
                            2,
                            Type::Text,
                            format!("unknown purpose: {}", purpose).into(),
                        )
                    })?,
                    merge_token: row.get(3)?,
                    created_at: from_millis(row.get(4)?),
                })
            },
        )
        .optional()
        .map_err(internal)
    }

    async fn create_registration(&self, registration: PendingRegistration) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO pending_registrations \
             (key, provider, external_id, email, first_name, last_name, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                registration.key,
                registration.provider.as_str(),
                registration.external_id,
                registration.email,
                registration.first_name,
                registration.last_name,
                millis(registration.created_at),
            ],
        )
        .map_err(internal)?;
        Ok(())
    }

    async fn take_registration(&self, key: &str) -> StoreResult<Option<PendingRegistration>> {
        let conn = self.lock()?;
        conn.query_row(
            "DELETE FROM pending_registrations WHERE key = ?1 \
             RETURNING key, provider, external_id, email, first_name, last_name, created_at",
            params![key],
            |row| {
                Ok(PendingRegistration {
                    key: row.get(0)?,
                    provider: provider_at(row, 1)?,
                    external_id: row.get(2)?,
                    email: row.get(3)?,
                    first_name: row.get(4)?,
                    last_name: row.get(5)?,
                    created_at: from_millis(row.get(6)?),
                })
            },
        )
        .optional()
        .map_err(internal)
    }

    async fn put_password_reset(&self, reset: PasswordReset) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO password_resets (user_id, id, expires_at) VALUES (?1, ?2, ?3)",
            params![reset.user_id.0, reset.id, millis(reset.expires_at)],
        )
        .map_err(internal)?;
        Ok(())
    }

    async fn get_password_reset(&self, user_id: &UserId) -> StoreResult<Option<PasswordReset>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, user_id, expires_at FROM password_resets WHERE user_id = ?1",
            params![user_id.0],
            |row| {
                Ok(PasswordReset {
                    id: row.get(0)?,
                    user_id: UserId(row.get(1)?),
                    expires_at: from_millis(row.get(2)?),
                })
            },
        )
        .optional()
        .map_err(internal)
    }

    async fn take_password_reset(&self, user_id: &UserId) -> StoreResult<Option<PasswordReset>> {
        let conn = self.lock()?;
        conn.query_row(
            "DELETE FROM password_resets WHERE user_id = ?1 RETURNING id, user_id, expires_at",
            params![user_id.0],
            |row| {
                Ok(PasswordReset {
                    id: row.get(0)?,
                    user_id: UserId(row.get(1)?),
                    expires_at: from_millis(row.get(2)?),
                })
            },
        )
        .optional()
        .map_err(internal)
    }

    async fn put_email_verification(&self, verification: EmailVerification) -> StoreResult<()> {
        let conn = self.lock()?;
        // REPLACE also evicts the user's previous record through UNIQUE(user_id)
        conn.execute(
            "INSERT OR REPLACE INTO email_verifications (id, user_id, email, expires_at) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                verification.id,
                verification.user_id.0,
                verification.email,
                millis(verification.expires_at)
            ],
        )
        .map_err(internal)?;
        Ok(())
    }

    async fn take_email_verification(&self, id: &str) -> StoreResult<Option<EmailVerification>> {
        let conn = self.lock()?;
        conn.query_row(
            "DELETE FROM email_verifications WHERE id = ?1 RETURNING id, user_id, email, expires_at",
            params![id],
            |row| {
                Ok(EmailVerification {
                    id: row.get(0)?,
                    user_id: UserId(row.get(1)?),
                    email: row.get(2)?,
                    expires_at: from_millis(row.get(3)?),
                })
            },
        )
        .optional()
        .map_err(internal)
    }

    async fn purge_ephemeral(
        &self,
        connections_before: DateTime<Utc>,
        registrations_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let conn = self.lock()?;
        let mut removed = 0;
        removed += conn
            .execute(
                "DELETE FROM pending_connections WHERE created_at < ?1",
                params![millis(connections_before)],
            )
            .map_err(internal)?;
        removed += conn
            .execute(
                "DELETE FROM pending_registrations WHERE created_at < ?1",
                params![millis(registrations_before)],
            )
            .map_err(internal)?;
        removed += conn
            .execute(
                "DELETE FROM password_resets WHERE expires_at < ?1",
                params![millis(now)],
            )
            .map_err(internal)?;
        removed += conn
            .execute(
                "DELETE FROM email_verifications WHERE expires_at < ?1",
                params![millis(now)],
            )
            .map_err(internal)?;
        Ok(removed as u64)
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn create_session(&self, session: Session) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT INTO sessions ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                SESSION_COLUMNS
            ),
            params![
                session.id.0,
                session.user_id.0,
                millis(session.last_used),
                session.client.ip,
                session.client.os,
                session.client.browser,
                session.client.is_mobile,
                session.roles.admin,
                session.roles.plugin_author,
                session.roles.event_author,
            ],
        )
        .map_err(internal)?;
        Ok(())
    }

    async fn get_session(&self, session_id: &SessionId) -> StoreResult<Option<Session>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {} FROM sessions WHERE id = ?1", SESSION_COLUMNS),
            params![session_id.0],
            session_from_row,
        )
        .optional()
        .map_err(internal)
    }

    async fn update_session(&self, session: &Session) -> StoreResult<()> {
        let conn = self.lock()?;
        let updated = conn
            .execute(
                "UPDATE sessions SET last_used = ?2, ip = ?3, os = ?4, browser = ?5, is_mobile = ?6, \
                 admin = ?7, plugin_author = ?8, event_author = ?9 WHERE id = ?1",
                params![
                    session.id.0,
                    millis(session.last_used),
                    session.client.ip,
                    session.client.os,
                    session.client.browser,
                    session.client.is_mobile,
                    session.roles.admin,
                    session.roles.plugin_author,
                    session.roles.event_author,
                ],
            )
            .map_err(internal)?;
        if updated == 0 {
            return Err(BrokerError::NotFound("session"));
        }
        Ok(())
    }

    async fn delete_session(&self, session_id: &SessionId) -> StoreResult<bool> {
        let conn = self.lock()?;
        let deleted = conn
            .execute("DELETE FROM sessions WHERE id = ?1", params![session_id.0])
            .map_err(internal)?;
        Ok(deleted > 0)
    }

    async fn list_sessions(&self, user_id: &UserId) -> StoreResult<Vec<Session>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM sessions WHERE user_id = ?1 ORDER BY last_used DESC",
                SESSION_COLUMNS
            ))
            .map_err(internal)?;
        let sessions = stmt
            .query_map(params![user_id.0], session_from_row)
            .map_err(internal)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(internal)?;
        Ok(sessions)
    }

    async fn sessions_used_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<SessionId>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id FROM sessions WHERE last_used < ?1")
            .map_err(internal)?;
        let ids = stmt
            .query_map(params![millis(cutoff)], |row| Ok(SessionId(row.get(0)?)))
            .map_err(internal)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(internal)?;
        Ok(ids)
    }

    async fn delete_sessions(&self, ids: &[SessionId]) -> StoreResult<u64> {
        let keys: Vec<String> = ids.iter().map(|id| id.0.clone()).collect();
        self.delete_keys("sessions", "id", &keys)
    }

    async fn create_login_token(&self, token: BearerToken) -> StoreResult<()> {
        self.insert_token("login_tokens", &token)
    }

    async fn take_login_token(&self, token: &str) -> StoreResult<Option<BearerToken>> {
        let conn = self.lock()?;
        conn.query_row(
            "DELETE FROM login_tokens WHERE token = ?1 RETURNING token, user_id, expires_at",
            params![token],
            token_from_row,
        )
        .optional()
        .map_err(internal)
    }

    async fn login_tokens_expired_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<String>> {
        self.expired_tokens("login_tokens", cutoff)
    }

    async fn delete_login_tokens(&self, tokens: &[String]) -> StoreResult<u64> {
        self.delete_keys("login_tokens", "token", tokens)
    }

    async fn create_merge_token(&self, token: BearerToken) -> StoreResult<()> {
        self.insert_token("merge_tokens", &token)
    }

    async fn get_merge_token(&self, token: &str) -> StoreResult<Option<BearerToken>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT token, user_id, expires_at FROM merge_tokens WHERE token = ?1",
            params![token],
            token_from_row,
        )
        .optional()
        .map_err(internal)
    }

    async fn merge_tokens_expired_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<String>> {
        self.expired_tokens("merge_tokens", cutoff)
    }

    async fn delete_merge_tokens(&self, tokens: &[String]) -> StoreResult<u64> {
        self.delete_keys("merge_tokens", "token", tokens)
    }
}
