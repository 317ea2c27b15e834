use std::collections::HashMap;

use anyhow::{Context, Result};
use keyring::Entry;
use parking_lot::RwLock;

use crate::models::CredentialPair;

/// Keychain service name the tokens are filed under.
const SERVICE_NAME: &str = "stockly";

/// The two slots a credential store holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub const ALL: [TokenKind; 2] = [TokenKind::Access, TokenKind::Refresh];

    /// Storage key, shared by every backend.
    pub fn key(&self) -> &'static str {
        match self {
            TokenKind::Access => "access_token",
            TokenKind::Refresh => "refresh_token",
        }
    }
}

/// Persisted key-value storage for the access and refresh tokens.
///
/// Implementations are internally synchronized; concurrent writers follow
/// last-writer-wins.
pub trait CredentialStore: Send + Sync {
    fn get(&self, kind: TokenKind) -> Result<Option<String>>;

    fn set(&self, kind: TokenKind, value: &str) -> Result<()>;

    /// Removing a token that is not stored is not an error.
    fn remove(&self, kind: TokenKind) -> Result<()>;

    fn access_token(&self) -> Result<Option<String>> {
        self.get(TokenKind::Access)
    }

    fn refresh_token(&self) -> Result<Option<String>> {
        self.get(TokenKind::Refresh)
    }

    /// Both tokens, if both are present.
    fn pair(&self) -> Result<Option<CredentialPair>> {
        let access = self.get(TokenKind::Access)?;
        let refresh = self.get(TokenKind::Refresh)?;
        Ok(access
            .zip(refresh)
            .map(|(access, refresh)| CredentialPair::new(access, refresh)))
    }

    /// Overwrite both tokens.
    fn store_pair(&self, pair: &CredentialPair) -> Result<()> {
        self.set(TokenKind::Access, &pair.access_token)?;
        self.set(TokenKind::Refresh, &pair.refresh_token)
    }

    /// Remove both tokens. Every slot is attempted even if one fails.
    fn clear(&self) -> Result<()> {
        let access = self.remove(TokenKind::Access);
        let refresh = self.remove(TokenKind::Refresh);
        access.and(refresh)
    }
}

/// Tokens kept in the OS keychain.
pub struct KeyringCredentialStore {
    service: String,
}

impl KeyringCredentialStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    /// Use a custom keychain service name, e.g. one per API host.
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, kind: TokenKind) -> Result<Entry> {
        Entry::new(&self.service, kind.key()).context("Failed to create keyring entry")
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn get(&self, kind: TokenKind) -> Result<Option<String>> {
        match self.entry(kind)?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve token from keychain"),
        }
    }

    fn set(&self, kind: TokenKind, value: &str) -> Result<()> {
        self.entry(kind)?
            .set_password(value)
            .context("Failed to store token in keychain")
    }

    fn remove(&self, kind: TokenKind) -> Result<()> {
        match self.entry(kind)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete token from keychain"),
        }
    }
}

/// Process-local store; nothing survives a restart.
#[derive(Default)]
pub struct MemoryCredentialStore {
    tokens: RwLock<HashMap<TokenKind, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pair(pair: &CredentialPair) -> Self {
        let store = Self::new();
        {
            let mut tokens = store.tokens.write();
            tokens.insert(TokenKind::Access, pair.access_token.clone());
            tokens.insert(TokenKind::Refresh, pair.refresh_token.clone());
        }
        store
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.read().is_empty()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, kind: TokenKind) -> Result<Option<String>> {
        Ok(self.tokens.read().get(&kind).cloned())
    }

    fn set(&self, kind: TokenKind, value: &str) -> Result<()> {
        self.tokens.write().insert(kind, value.to_string());
        Ok(())
    }

    fn remove(&self, kind: TokenKind) -> Result<()> {
        self.tokens.write().remove(&kind);
        Ok(())
    }
}
