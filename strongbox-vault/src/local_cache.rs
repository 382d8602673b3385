//! Device-local cache of wrapped bundles and remembered passphrases.
//!
//! A cached bundle lets the vault come up without a network round trip. The
//! remembered passphrase is only written when the user opts in, and only ever
//! after it has unwrapped the bundle successfully.

use crate::error::{VaultError, VaultResult};
use crate::state::IdentityId;
use chrono::Utc;
use duckdb::{Connection, params};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use strongbox_crypto::WrappedBundle;
use tracing::debug;
use zeroize::Zeroizing;

/// Per-identity device storage for the vault.
///
/// Every entry is keyed by identity; operations for one identity never touch
/// another identity's entries.
pub trait LocalCache: Send + Sync {
    fn load_bundle(&self, identity: &IdentityId) -> VaultResult<Option<WrappedBundle>>;
    fn store_bundle(&self, identity: &IdentityId, bundle: &WrappedBundle) -> VaultResult<()>;
    fn remove_bundle(&self, identity: &IdentityId) -> VaultResult<()>;

    fn load_passphrase(&self, identity: &IdentityId) -> VaultResult<Option<Zeroizing<String>>>;
    fn store_passphrase(&self, identity: &IdentityId, passphrase: &str) -> VaultResult<()>;
    fn remove_passphrase(&self, identity: &IdentityId) -> VaultResult<()>;
}

// ============================================================================
// DuckDB-backed cache
// ============================================================================

/// [`LocalCache`] persisted in a DuckDB database.
pub struct DuckDbCache {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbCache {
    /// Opens (or creates) a cache database file.
    pub fn open(db_path: &Path) -> VaultResult<Self> {
        let conn = Connection::open(db_path)?;

        // Cap memory/threads; DuckDB defaults to ~80% RAM per connection
        conn.execute_batch("PRAGMA memory_limit='64MB'; PRAGMA threads=1;")?;

        Self::with_connection(conn)
    }

    /// Opens a cache that lives only as long as this value.
    pub fn open_in_memory() -> VaultResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> VaultResult<Self> {
        let cache = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        cache.ensure_tables()?;
        Ok(cache)
    }

    fn ensure_tables(&self) -> VaultResult<()> {
        let conn = self.conn.lock().map_err(|e| VaultError::Storage(e.to_string()))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS vault_bundle_cache (
                identity_id VARCHAR PRIMARY KEY,
                bundle_json VARCHAR NOT NULL,
                cached_at BIGINT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS vault_passphrase_cache (
                identity_id VARCHAR PRIMARY KEY,
                passphrase VARCHAR NOT NULL,
                cached_at BIGINT NOT NULL
            );",
        )?;
        Ok(())
    }

    fn load_column(&self, sql: &str, identity: &IdentityId) -> VaultResult<Option<String>> {
        let conn = self.conn.lock().map_err(|e| VaultError::Storage(e.to_string()))?;
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(params![identity.as_str()])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get::<_, String>(0)?)),
            None => Ok(None),
        }
    }

    fn execute(&self, sql: &str, args: &[&dyn duckdb::ToSql]) -> VaultResult<()> {
        let conn = self.conn.lock().map_err(|e| VaultError::Storage(e.to_string()))?;
        conn.execute(sql, args)?;
        Ok(())
    }
}

impl LocalCache for DuckDbCache {
    fn load_bundle(&self, identity: &IdentityId) -> VaultResult<Option<WrappedBundle>> {
        let json = self.load_column(
            "SELECT bundle_json FROM vault_bundle_cache WHERE identity_id = ?",
            identity,
        )?;
        json.map(|json| serde_json::from_str(&json).map_err(VaultError::from))
            .transpose()
    }

    fn store_bundle(&self, identity: &IdentityId, bundle: &WrappedBundle) -> VaultResult<()> {
        let json = serde_json::to_string(bundle)?;
        self.execute(
            "INSERT OR REPLACE INTO vault_bundle_cache (identity_id, bundle_json, cached_at)
             VALUES (?, ?, ?)",
            params![identity.as_str(), json, Utc::now().timestamp_millis()],
        )?;
        debug!(%identity, fingerprint = %bundle.fingerprint(), "cached vault bundle");
        Ok(())
    }

    fn remove_bundle(&self, identity: &IdentityId) -> VaultResult<()> {
        self.execute(
            "DELETE FROM vault_bundle_cache WHERE identity_id = ?",
            params![identity.as_str()],
        )
    }

    fn load_passphrase(&self, identity: &IdentityId) -> VaultResult<Option<Zeroizing<String>>> {
        let passphrase = self.load_column(
            "SELECT passphrase FROM vault_passphrase_cache WHERE identity_id = ?",
            identity,
        )?;
        Ok(passphrase.map(Zeroizing::new))
    }

    fn store_passphrase(&self, identity: &IdentityId, passphrase: &str) -> VaultResult<()> {
        self.execute(
            "INSERT OR REPLACE INTO vault_passphrase_cache (identity_id, passphrase, cached_at)
             VALUES (?, ?, ?)",
            params![identity.as_str(), passphrase, Utc::now().timestamp_millis()],
        )
    }

    fn remove_passphrase(&self, identity: &IdentityId) -> VaultResult<()> {
        self.execute(
            "DELETE FROM vault_passphrase_cache WHERE identity_id = ?",
            params![identity.as_str()],
        )
    }
}

// ============================================================================
// In-memory cache
// ============================================================================

/// [`LocalCache`] held in process memory.
#[derive(Default)]
pub struct MemoryCache {
    bundles: RwLock<HashMap<IdentityId, WrappedBundle>>,
    passphrases: RwLock<HashMap<IdentityId, Zeroizing<String>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalCache for MemoryCache {
    fn load_bundle(&self, identity: &IdentityId) -> VaultResult<Option<WrappedBundle>> {
        let bundles = self.bundles.read().unwrap_or_else(PoisonError::into_inner);
        Ok(bundles.get(identity).cloned())
    }

    fn store_bundle(&self, identity: &IdentityId, bundle: &WrappedBundle) -> VaultResult<()> {
        let mut bundles = self.bundles.write().unwrap_or_else(PoisonError::into_inner);
        bundles.insert(identity.clone(), bundle.clone());
        Ok(())
    }

    fn remove_bundle(&self, identity: &IdentityId) -> VaultResult<()> {
        let mut bundles = self.bundles.write().unwrap_or_else(PoisonError::into_inner);
        bundles.remove(identity);
        Ok(())
    }

    fn load_passphrase(&self, identity: &IdentityId) -> VaultResult<Option<Zeroizing<String>>> {
        let passphrases = self.passphrases.read().unwrap_or_else(PoisonError::into_inner);
        Ok(passphrases.get(identity).cloned())
    }

    fn store_passphrase(&self, identity: &IdentityId, passphrase: &str) -> VaultResult<()> {
        let mut passphrases = self.passphrases.write().unwrap_or_else(PoisonError::into_inner);
        passphrases.insert(identity.clone(), Zeroizing::new(passphrase.to_string()));
        Ok(())
    }

    fn remove_passphrase(&self, identity: &IdentityId) -> VaultResult<()> {
        let mut passphrases = self.passphrases.write().unwrap_or_else(PoisonError::into_inner);
        passphrases.remove(identity);
        Ok(())
    }
}
