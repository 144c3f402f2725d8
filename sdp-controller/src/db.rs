//! SQLite-backed member directory.
//!
//! Wraps SQLite access via sqlx. Every operation borrows one pooled
//! connection for a single statement; nothing spans two operations.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sdp_core::{AccessRow, Credentials, MemberRecord, MemberType};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use crate::directory::{DirectoryError, MemberDirectory};

/// Member directory stored in a SQLite database.
#[derive(Clone)]
pub struct SqlDirectory {
    pool: SqlitePool,
}

impl SqlDirectory {
    /// Open or create a directory database at the given path.
    ///
    /// Runs migrations automatically to ensure schema is up to date.
    pub async fn open(path: impl AsRef<Path>, max_connections: u32) -> Result<Self, sqlx::Error> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    sqlx::Error::Configuration(
                        format!("Failed to create db directory: {}", e).into(),
                    )
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        sqlx::migrate!().run(&pool).await?;

        Ok(Self { pool })
    }

    /// Get a reference to the underlying connection pool.
    ///
    /// Provisioning tools and tests write member rows through it.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl MemberDirectory for SqlDirectory {
    async fn lookup_by_id(&self, id: &str) -> Result<MemberRecord, DirectoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, type, encrypt_key, hmac_key, last_cred_update, cred_update_due
            FROM sdpid
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        match rows.len() {
            0 => Err(DirectoryError::NotFound),
            1 => parse_member_row(&rows[0]),
            n => Err(DirectoryError::MultipleMatch(n)),
        }
    }

    async fn update_credentials(
        &self,
        id: &str,
        credentials: &Credentials,
        updated_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), DirectoryError> {
        let result = sqlx::query(
            r#"
            UPDATE sdpid SET
                encrypt_key = ?2,
                hmac_key = ?3,
                last_cred_update = ?4,
                cred_update_due = ?5
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(&credentials.encryption_key)
        .bind(&credentials.hmac_key)
        .bind(updated_at.to_rfc3339())
        .bind(expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DirectoryError::NotFound);
        }

        Ok(())
    }

    async fn access_rows(&self, gateway_id: &str) -> Result<Vec<AccessRow>, DirectoryError> {
        let rows = sqlx::query(
            r#"
            SELECT
                sdpid_service.sdpid_id AS member_id,
                service_gateway.protocol_port AS port,
                sdpid.encrypt_key AS encrypt_key,
                sdpid.hmac_key AS hmac_key
            FROM gateway
                JOIN service_gateway ON service_gateway.gateway_id = gateway.id
                JOIN sdpid_service ON sdpid_service.service_id = service_gateway.service_id
                JOIN sdpid ON sdpid.id = sdpid_service.sdpid_id
            WHERE gateway.sdpid_id = ?1
            ORDER BY sdpid_service.sdpid_id, service_gateway.id
            "#,
        )
        .bind(gateway_id)
        .fetch_all(&self.pool)
        .await?;

        let mut access = Vec::with_capacity(rows.len());
        for row in rows {
            access.push(AccessRow {
                member_id: row.try_get("member_id")?,
                port: row.try_get("port")?,
                encrypt_key: row.try_get("encrypt_key")?,
                hmac_key: row.try_get("hmac_key")?,
            });
        }

        Ok(access)
    }
}

/// Parse a database row into a MemberRecord.
fn parse_member_row(row: &SqliteRow) -> Result<MemberRecord, DirectoryError> {
    let id: String = row.try_get("id")?;

    let type_str: String = row.try_get("type")?;
    let member_type: MemberType = type_str
        .parse()
        .map_err(|e: sdp_core::UnknownMemberType| DirectoryError::Decode(e.to_string()))?;

    Ok(MemberRecord {
        id,
        member_type,
        encryption_key: row.try_get("encrypt_key")?,
        hmac_key: row.try_get("hmac_key")?,
        last_cred_update: parse_timestamp(row, "last_cred_update")?,
        cred_update_due: parse_timestamp(row, "cred_update_due")?,
    })
}

fn parse_timestamp(row: &SqliteRow, column: &str) -> Result<Option<DateTime<Utc>>, DirectoryError> {
    row.try_get::<Option<String>, _>(column)?
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| DirectoryError::Decode(format!("invalid {}: {}", column, e)))
        })
        .transpose()
}
