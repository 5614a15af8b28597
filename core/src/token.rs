//! Access/refresh token storage.
//!
//! # Design
//! The store is synchronous: every outgoing request reads it and the
//! 401 handler clears it, so operations are short critical sections behind a
//! `std::sync::RwLock`. `FileTokenStore` writes every mutation through to a
//! JSON document so a session survives a restart.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Which of the two stored tokens an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    /// Fixed persistence key.
    pub fn key(self) -> &'static str {
        match self {
            TokenKind::Access => "access_token",
            TokenKind::Refresh => "refresh_token",
        }
    }
}

/// Tokens issued together by a login or refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Key-value store for the session tokens.
pub trait TokenStore: Send + Sync {
    fn get(&self, kind: TokenKind) -> Option<String>;

    fn set(&self, kind: TokenKind, value: &str) -> Result<(), ApiError>;

    fn remove(&self, kind: TokenKind) -> Result<(), ApiError>;

    /// Remove both tokens at once.
    fn clear(&self) -> Result<(), ApiError>;

    fn access_token(&self) -> Option<String> {
        self.get(TokenKind::Access)
    }

    /// Both tokens, if both are present.
    fn pair(&self) -> Option<TokenPair> {
        Some(TokenPair {
            access_token: self.get(TokenKind::Access)?,
            refresh_token: self.get(TokenKind::Refresh)?,
        })
    }

    fn set_pair(&self, pair: &TokenPair) -> Result<(), ApiError> {
        self.set(TokenKind::Access, &pair.access_token)?;
        self.set(TokenKind::Refresh, &pair.refresh_token)
    }
}

/// Process-local token store.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<BTreeMap<TokenKind, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, kind: TokenKind) -> Option<String> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
    }

    fn set(&self, kind: TokenKind, value: &str) -> Result<(), ApiError> {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, value.to_string());
        Ok(())
    }

    fn remove(&self, kind: TokenKind) -> Result<(), ApiError> {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&kind);
        Ok(())
    }

    fn clear(&self) -> Result<(), ApiError> {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }
}

/// Token store persisted as a JSON object under the fixed keys.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    tokens: RwLock<BTreeMap<String, String>>,
}

impl FileTokenStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ApiError> {
        let path = path.into();
        let tokens = match std::fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                ApiError::Storage(format!("{} is not a token file: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(ApiError::Storage(format!("{}: {e}", path.display()))),
        };
        Ok(Self {
            path,
            tokens: RwLock::new(tokens),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update(&self, apply: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<(), ApiError> {
        let mut tokens = self.tokens.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = tokens.clone();
        apply(&mut next);
        let bytes =
            serde_json::to_vec_pretty(&next).map_err(|e| ApiError::Storage(e.to_string()))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| ApiError::Storage(format!("{}: {e}", parent.display())))?;
        }
        std::fs::write(&self.path, bytes)
            .map_err(|e| ApiError::Storage(format!("{}: {e}", self.path.display())))?;
        // memory only changes once the file has it
        *tokens = next;
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, kind: TokenKind) -> Option<String> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(kind.key())
            .cloned()
    }

    fn set(&self, kind: TokenKind, value: &str) -> Result<(), ApiError> {
        self.update(|tokens| {
            tokens.insert(kind.key().to_string(), value.to_string());
        })
    }

    fn remove(&self, kind: TokenKind) -> Result<(), ApiError> {
        self.update(|tokens| {
            tokens.remove(kind.key());
        })
    }

    fn clear(&self) -> Result<(), ApiError> {
        self.update(|tokens| {
            tokens.remove(TokenKind::Access.key());
            tokens.remove(TokenKind::Refresh.key());
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> TokenPair {
        TokenPair {
            access_token: "t1".to_string(),
            refresh_token: "r1".to_string(),
        }
    }

    #[test]
    fn memory_store_pair_lifecycle() {
        let store = MemoryTokenStore::new();
        assert!(store.pair().is_none());

        store.set_pair(&pair()).unwrap();
        assert_eq!(store.access_token().as_deref(), Some("t1"));
        assert_eq!(store.pair(), Some(pair()));

        store.remove(TokenKind::Refresh).unwrap();
        assert!(store.pair().is_none());
        assert_eq!(store.access_token().as_deref(), Some("t1"));

        store.clear().unwrap();
        assert!(store.access_token().is_none());
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session").join("tokens.json");

        let store = FileTokenStore::open(&path).unwrap();
        assert!(store.access_token().is_none());
        store.set_pair(&pair()).unwrap();
        drop(store);

        let reopened = FileTokenStore::open(&path).unwrap();
        assert_eq!(reopened.pair(), Some(pair()));

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["access_token"], "t1");
        assert_eq!(raw["refresh_token"], "r1");
    }

    #[test]
    fn file_store_clear_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");

        let store = FileTokenStore::open(&path).unwrap();
        store.set_pair(&pair()).unwrap();
        store.clear().unwrap();

        let reopened = FileTokenStore::open(&path).unwrap();
        assert!(reopened.get(TokenKind::Access).is_none());
        assert!(reopened.get(TokenKind::Refresh).is_none());
    }

    #[test]
    fn failed_write_leaves_memory_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let store = FileTokenStore::open(&path).unwrap();
        store.set(TokenKind::Refresh, "r0").unwrap();

        // a directory in place of the file makes every write fail
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        let err = store.set(TokenKind::Access, "t1").unwrap_err();
        assert!(matches!(err, ApiError::Storage(_)));
        assert!(store.access_token().is_none());

        assert!(store.clear().is_err());
        assert_eq!(store.get(TokenKind::Refresh).as_deref(), Some("r0"));
    }

    #[test]
    fn corrupt_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, "not json").unwrap();

        let err = FileTokenStore::open(&path).unwrap_err();
        assert!(matches!(err, ApiError::Storage(_)));
    }
}
