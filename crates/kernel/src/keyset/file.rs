//! Flat-file keyset: one JSON document, rewritten on every change.

use super::{KeyRecord, KeyStore};
use crate::types::KeyIdType;
use cryptkit_core::{CryptError, CryptResult, ErrorCode};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const FILE_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct KeyFile {
    version: u32,
    keys: Vec<KeyRecord>,
}

pub struct FileKeyStore {
    path: PathBuf,
    contents: KeyFile,
}

fn open_error(path: &Path, err: impl std::fmt::Display) -> CryptError {
    CryptError::new(ErrorCode::Open).with_detail(format!("{}: {err}", path.display()))
}

impl FileKeyStore {
    /// Open an existing keyset file, or create a new empty one.
    pub fn open(path: &Path, create: bool) -> CryptResult<Self> {
        if create {
            if path.exists() {
                return Err(CryptError::new(ErrorCode::Duplicate)
                    .with_detail(format!("{} already exists", path.display())));
            }
            let store = Self {
                path: path.to_path_buf(),
                contents: KeyFile {
                    version: FILE_VERSION,
                    keys: Vec::new(),
                },
            };
            store.flush()?;
            return Ok(store);
        }

        let data = fs::read(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => open_error(path, "keyset not found"),
            _ => open_error(path, e),
        })?;
        let contents: KeyFile = serde_json::from_slice(&data).map_err(|e| {
            warn!(path = %path.display(), error = %e, "unreadable keyset file");
            CryptError::new(ErrorCode::BadData).with_detail(format!("keyset file: {e}"))
        })?;
        if contents.version != FILE_VERSION {
            return Err(CryptError::new(ErrorCode::BadData)
                .with_detail(format!("unsupported keyset version {}", contents.version)));
        }
        Ok(Self {
            path: path.to_path_buf(),
            contents,
        })
    }

    fn flush(&self) -> CryptResult<()> {
        let data = serde_json::to_vec_pretty(&self.contents)
            .map_err(|e| CryptError::new(ErrorCode::Write).with_detail(e.to_string()))?;
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, data)
            .and_then(|()| fs::rename(&staging, &self.path))
            .map_err(|e| CryptError::new(ErrorCode::Write).with_detail(e.to_string()))?;
        debug!(path = %self.path.display(), entries = self.contents.keys.len(), "keyset file written");
        Ok(())
    }
}

impl KeyStore for FileKeyStore {
    fn find(&self, id_type: KeyIdType, id: &str) -> CryptResult<Option<KeyRecord>> {
        Ok(self.contents.keys.iter().find(|r| r.matches(id_type, id)).cloned())
    }

    fn store(&mut self, record: KeyRecord) -> CryptResult<()> {
        match self
            .contents
            .keys
            .iter_mut()
            .find(|r| r.name.eq_ignore_ascii_case(&record.name))
        {
            Some(slot) => *slot = record,
            None => self.contents.keys.push(record),
        }
        self.flush()
    }

    fn delete(&mut self, id_type: KeyIdType, id: &str) -> CryptResult<()> {
        let before = self.contents.keys.len();
        self.contents.keys.retain(|r| !r.matches(id_type, id));
        if self.contents.keys.len() == before {
            return Err(CryptError::new(ErrorCode::NotFound));
        }
        self.flush()
    }
}
