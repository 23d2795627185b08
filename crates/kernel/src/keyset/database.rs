//! SQLite keysets.
//!
//! Plain database keysets hold a single `keys` table. Certificate stores add
//! pending requests, issued certificates and an action log.

use super::{CertStore, IssuedCert, KeyRecord, KeyStore, LogEntry, StoredRequest};
use crate::certificate::RevocationEntry;
use crate::types::{CertAction, CertType, KeyIdType, KeysetOption};
use cryptkit_core::{CryptError, CryptResult, ErrorCode};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::path::Path;
use tracing::{debug, info};

const KEY_SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS keys (
        name TEXT PRIMARY KEY COLLATE NOCASE,
        email TEXT COLLATE NOCASE,
        key_id TEXT NOT NULL,
        record TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_keys_email ON keys(email);
"#;

const STORE_SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS cert_requests (
        key_id TEXT PRIMARY KEY,
        cert_type INTEGER NOT NULL,
        subject TEXT NOT NULL COLLATE NOCASE,
        email TEXT COLLATE NOCASE,
        data BLOB NOT NULL
    );

    CREATE TABLE IF NOT EXISTS issued_certs (
        serial BLOB PRIMARY KEY,
        subject TEXT NOT NULL COLLATE NOCASE,
        email TEXT COLLATE NOCASE,
        valid_to INTEGER NOT NULL,
        data BLOB NOT NULL,
        revoked_at INTEGER,
        reason INTEGER
    );

    CREATE TABLE IF NOT EXISTS ca_log (
        seq_no INTEGER PRIMARY KEY AUTOINCREMENT,
        action INTEGER NOT NULL,
        subject TEXT NOT NULL,
        serial BLOB,
        at INTEGER NOT NULL
    );
"#;

fn db_error(err: rusqlite::Error) -> CryptError {
    CryptError::new(ErrorCode::Read).with_detail(format!("database error: {err}"))
}

fn write_error(err: rusqlite::Error) -> CryptError {
    CryptError::new(ErrorCode::Write).with_detail(format!("database error: {err}"))
}

fn id_column(id_type: KeyIdType) -> CryptResult<&'static str> {
    match id_type {
        KeyIdType::Name => Ok("name"),
        KeyIdType::Email => Ok("email"),
        KeyIdType::None => Err(CryptError::param(2)),
    }
}

fn decode_record(json: &str) -> CryptResult<KeyRecord> {
    serde_json::from_str(json)
        .map_err(|e| CryptError::new(ErrorCode::BadData).with_detail(format!("keyset record: {e}")))
}

fn request_from_row(row: &Row<'_>) -> rusqlite::Result<(i32, StoredRequest)> {
    let cert_type: i32 = row.get(1)?;
    Ok((
        cert_type,
        StoredRequest {
            key_id: row.get(0)?,
            cert_type: CertType::None,
            subject: row.get(2)?,
            email: row.get(3)?,
            data: row.get(4)?,
        },
    ))
}

fn finish_request((raw, mut request): (i32, StoredRequest)) -> CryptResult<StoredRequest> {
    request.cert_type = CertType::from_raw(raw)
        .ok_or_else(|| CryptError::new(ErrorCode::BadData).with_detail("unknown request type"))?;
    Ok(request)
}

fn issued_from_row(row: &Row<'_>) -> rusqlite::Result<IssuedCert> {
    let serial: Vec<u8> = row.get(0)?;
    let revoked_at: Option<i64> = row.get(5)?;
    let reason: Option<i32> = row.get(6)?;
    Ok(IssuedCert {
        revoked: revoked_at.map(|revoked_at| RevocationEntry {
            serial: serial.clone(),
            revoked_at,
            reason: reason.unwrap_or(0),
        }),
        serial,
        subject: row.get(1)?,
        email: row.get(2)?,
        valid_to: row.get(3)?,
        data: row.get(4)?,
    })
}

const ISSUED_COLUMNS: &str = "serial, subject, email, valid_to, data, revoked_at, reason";

pub struct DatabaseKeyStore {
    conn: Connection,
    cert_store: bool,
}

impl DatabaseKeyStore {
    pub fn open(path: &Path, option: KeysetOption, cert_store: bool) -> CryptResult<Self> {
        let exists = path.exists();
        let flags = match option {
            KeysetOption::Create if exists => {
                return Err(CryptError::new(ErrorCode::Duplicate)
                    .with_detail(format!("{} already exists", path.display())))
            }
            KeysetOption::Create => OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
            _ if !exists => {
                return Err(CryptError::new(ErrorCode::Open)
                    .with_detail(format!("{}: keyset not found", path.display())))
            }
            KeysetOption::ReadOnly => OpenFlags::SQLITE_OPEN_READ_ONLY,
            KeysetOption::None => OpenFlags::SQLITE_OPEN_READ_WRITE,
        };
        let conn = Connection::open_with_flags(path, flags | OpenFlags::SQLITE_OPEN_NO_MUTEX)
            .map_err(|e| CryptError::new(ErrorCode::Open).with_detail(e.to_string()))?;

        if option != KeysetOption::ReadOnly {
            conn.pragma_update(None, "synchronous", "NORMAL").map_err(write_error)?;
            conn.execute_batch(KEY_SCHEMA).map_err(write_error)?;
            if cert_store {
                conn.execute_batch(STORE_SCHEMA).map_err(write_error)?;
            }
        }
        if cert_store {
            let has_store: Option<String> = conn
                .query_row(
                    "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'issued_certs'",
                    [],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db_error)?;
            if has_store.is_none() {
                return Err(CryptError::new(ErrorCode::Open).with_detail("database is not a certificate store"));
            }
        }
        info!(path = %path.display(), cert_store, "database keyset opened");
        Ok(Self { conn, cert_store })
    }
}

impl KeyStore for DatabaseKeyStore {
    fn find(&self, id_type: KeyIdType, id: &str) -> CryptResult<Option<KeyRecord>> {
        let sql = format!("SELECT record FROM keys WHERE {} = ?1", id_column(id_type)?);
        let json: Option<String> = self
            .conn
            .query_row(&sql, params![id], |row| row.get(0))
            .optional()
            .map_err(db_error)?;
        json.as_deref().map(decode_record).transpose()
    }

    fn store(&mut self, record: KeyRecord) -> CryptResult<()> {
        let json = serde_json::to_string(&record)
            .map_err(|e| CryptError::new(ErrorCode::Write).with_detail(e.to_string()))?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO keys (name, email, key_id, record) VALUES (?1, ?2, ?3, ?4)",
                params![record.name, record.email, record.key_id, json],
            )
            .map_err(write_error)?;
        debug!(entry = %record.name, "keyset entry stored");
        Ok(())
    }

    fn delete(&mut self, id_type: KeyIdType, id: &str) -> CryptResult<()> {
        let sql = format!("DELETE FROM keys WHERE {} = ?1", id_column(id_type)?);
        let removed = self.conn.execute(&sql, params![id]).map_err(write_error)?;
        if removed == 0 {
            return Err(CryptError::new(ErrorCode::NotFound));
        }
        Ok(())
    }

    fn query(&self, pattern: &str) -> CryptResult<Vec<KeyRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT record FROM keys WHERE name LIKE ?1 ORDER BY name")
            .map_err(db_error)?;
        let rows = stmt
            .query_map(params![format!("%{pattern}%")], |row| row.get::<_, String>(0))
            .map_err(db_error)?;
        let mut records = Vec::new();
        for json in rows {
            records.push(decode_record(&json.map_err(db_error)?)?);
        }
        Ok(records)
    }

    fn cert_store(&mut self) -> Option<&mut dyn CertStore> {
        if self.cert_store {
            Some(self)
        } else {
            None
        }
    }
}

impl CertStore for DatabaseKeyStore {
    fn add_request(&mut self, request: StoredRequest) -> CryptResult<()> {
        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO cert_requests (key_id, cert_type, subject, email, data)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    request.key_id,
                    request.cert_type.raw(),
                    request.subject,
                    request.email,
                    request.data
                ],
            )
            .map_err(write_error)?;
        if inserted == 0 {
            return Err(CryptError::new(ErrorCode::Duplicate));
        }
        Ok(())
    }

    fn find_request(&self, id_type: KeyIdType, id: &str) -> CryptResult<Option<StoredRequest>> {
        let column = match id_type {
            KeyIdType::Name => "subject",
            other => id_column(other)?,
        };
        let sql = format!("SELECT key_id, cert_type, subject, email, data FROM cert_requests WHERE {column} = ?1");
        self.conn
            .query_row(&sql, params![id], request_from_row)
            .optional()
            .map_err(db_error)?
            .map(finish_request)
            .transpose()
    }

    fn delete_request(&mut self, id_type: KeyIdType, id: &str) -> CryptResult<()> {
        let column = match id_type {
            KeyIdType::Name => "subject",
            other => id_column(other)?,
        };
        let sql = format!("DELETE FROM cert_requests WHERE {column} = ?1");
        let removed = self.conn.execute(&sql, params![id]).map_err(write_error)?;
        if removed == 0 {
            return Err(CryptError::new(ErrorCode::NotFound));
        }
        Ok(())
    }

    fn query_requests(&self, pattern: &str) -> CryptResult<Vec<StoredRequest>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT key_id, cert_type, subject, email, data FROM cert_requests
                 WHERE subject LIKE ?1 ORDER BY subject",
            )
            .map_err(db_error)?;
        let rows = stmt
            .query_map(params![format!("%{pattern}%")], request_from_row)
            .map_err(db_error)?;
        let mut requests = Vec::new();
        for row in rows {
            requests.push(finish_request(row.map_err(db_error)?)?);
        }
        Ok(requests)
    }

    fn add_issued(&mut self, cert: IssuedCert) -> CryptResult<()> {
        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO issued_certs (serial, subject, email, valid_to, data)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![cert.serial, cert.subject, cert.email, cert.valid_to, cert.data],
            )
            .map_err(write_error)?;
        if inserted == 0 {
            return Err(CryptError::new(ErrorCode::Duplicate));
        }
        Ok(())
    }

    fn find_issued(&self, serial: &[u8]) -> CryptResult<Option<IssuedCert>> {
        let sql = format!("SELECT {ISSUED_COLUMNS} FROM issued_certs WHERE serial = ?1");
        self.conn
            .query_row(&sql, params![serial], issued_from_row)
            .optional()
            .map_err(db_error)
    }

    fn find_issued_by_name(&self, id_type: KeyIdType, id: &str) -> CryptResult<Option<IssuedCert>> {
        let column = match id_type {
            KeyIdType::Name => "subject",
            other => id_column(other)?,
        };
        let sql = format!(
            "SELECT {ISSUED_COLUMNS} FROM issued_certs WHERE {column} = ?1 ORDER BY valid_to DESC LIMIT 1"
        );
        self.conn
            .query_row(&sql, params![id], issued_from_row)
            .optional()
            .map_err(db_error)
    }

    fn revoke(&mut self, entry: RevocationEntry) -> CryptResult<()> {
        let updated = self
            .conn
            .execute(
                "UPDATE issued_certs SET revoked_at = ?2, reason = ?3
                 WHERE serial = ?1 AND revoked_at IS NULL",
                params![entry.serial, entry.revoked_at, entry.reason],
            )
            .map_err(write_error)?;
        if updated == 0 {
            return match self.find_issued(&entry.serial)? {
                Some(_) => Err(CryptError::new(ErrorCode::Duplicate).with_detail("certificate already revoked")),
                None => Err(CryptError::new(ErrorCode::NotFound)),
            };
        }
        Ok(())
    }

    fn revoked(&self) -> CryptResult<Vec<RevocationEntry>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT serial, revoked_at, reason FROM issued_certs
                 WHERE revoked_at IS NOT NULL ORDER BY revoked_at",
            )
            .map_err(db_error)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(RevocationEntry {
                    serial: row.get(0)?,
                    revoked_at: row.get(1)?,
                    reason: row.get::<_, Option<i32>>(2)?.unwrap_or(0),
                })
            })
            .map_err(db_error)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_error)
    }

    fn expire(&mut self, now: i64) -> CryptResult<usize> {
        self.conn
            .execute("DELETE FROM issued_certs WHERE valid_to < ?1", params![now])
            .map_err(write_error)
    }

    fn purge_requests(&mut self) -> CryptResult<usize> {
        self.conn.execute("DELETE FROM cert_requests", []).map_err(write_error)
    }

    fn log(&mut self, action: CertAction, subject: &str, serial: Option<&[u8]>, at: i64) -> CryptResult<()> {
        self.conn
            .execute(
                "INSERT INTO ca_log (action, subject, serial, at) VALUES (?1, ?2, ?3, ?4)",
                params![action.raw(), subject, serial, at],
            )
            .map_err(write_error)?;
        Ok(())
    }

    fn log_entries(&self) -> CryptResult<Vec<LogEntry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT action, subject, serial, at FROM ca_log ORDER BY seq_no")
            .map_err(db_error)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(LogEntry {
                    action: row.get(0)?,
                    subject: row.get(1)?,
                    serial: row.get(2)?,
                    at: row.get(3)?,
                })
            })
            .map_err(db_error)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_error)
    }
}
