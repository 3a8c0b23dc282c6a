//! Master-password credential vault.
//!
//! The master password is never stored: `vault_meta` keeps the KDF
//! parameters, two salts and a verifier. The derived encryption key lives in
//! memory only while the vault is unlocked. Re-keying holds the write side
//! of the unlock lock, so no cycle can read a secret mid-change.

mod crypto;

pub use crypto::{KdfParams, SealedEntry, SecretBytes, SecretKey};

use libsql::Connection;
use tokio::sync::{RwLock, RwLockReadGuard};
use zeroize::Zeroizing;

use crate::db::Store;
use crate::error::{Error, Result};
use crate::util::now_millis;

/// Vault entry holding the active backend's service key
pub const SERVICE_KEY_ENTRY: &str = "service_key";

struct VaultMeta {
    params: KdfParams,
    key_salt: Vec<u8>,
    verifier_salt: Vec<u8>,
    verifier: Vec<u8>,
}

/// Derived values of one master password
struct DerivedKeys {
    key: SecretKey,
    verifier: SecretKey,
}

pub struct Vault {
    store: Store,
    params: KdfParams,
    unlocked: RwLock<Option<SecretKey>>,
}

impl Vault {
    pub fn new(store: Store) -> Self {
        Self::with_params(store, KdfParams::default())
    }

    /// Vault creating new verifiers with the given KDF cost
    pub fn with_params(store: Store, params: KdfParams) -> Self {
        Self {
            store,
            params,
            unlocked: RwLock::new(None),
        }
    }

    /// Whether a master password has ever been set
    pub async fn is_initialized(&self) -> Result<bool> {
        let db = self.store.lock().await;
        Ok(load_meta(db.connection()).await?.is_some())
    }

    pub async fn is_unlocked(&self) -> bool {
        self.unlocked.read().await.is_some()
    }

    /// Check `input` against the stored verifier in constant time.
    ///
    /// Returns false when no master password is set. A match unlocks the
    /// vault for background cycles.
    pub async fn verify_master_password(&self, input: &str) -> Result<bool> {
        let meta = {
            let db = self.store.lock().await;
            load_meta(db.connection()).await?
        };
        let Some(meta) = meta else {
            return Ok(false);
        };

        let Some(keys) = check_password(input, &meta).await? else {
            return Ok(false);
        };
        *self.unlocked.write().await = Some(keys.key);
        Ok(true)
    }

    /// Set or change the master password.
    ///
    /// The first set needs no current password. Later sets verify `current`
    /// and re-encrypt every entry under the new key in one transaction.
    pub async fn set_master_password(&self, current: Option<&str>, new_master: &str) -> Result<()> {
        if new_master.trim().is_empty() {
            return Err(Error::Validation(
                "master password must not be empty".to_string(),
            ));
        }

        // Excludes every reader until the new key is in place
        let mut unlocked = self.unlocked.write().await;

        let existing = {
            let db = self.store.lock().await;
            load_meta(db.connection()).await?
        };
        let old_key = match &existing {
            Some(meta) => {
                let current = current.unwrap_or_default();
                let keys = check_password(current, meta).await?.ok_or_else(|| {
                    Error::Auth("current master password is incorrect".to_string())
                })?;
                Some(keys.key)
            }
            None => None,
        };

        let meta = VaultMeta {
            params: self.params,
            key_salt: crypto::random_salt().to_vec(),
            verifier_salt: crypto::random_salt().to_vec(),
            verifier: Vec::new(),
        };
        let new_keys = derive_keys(new_master, &meta).await?;
        let meta = VaultMeta {
            verifier: new_keys.verifier.as_bytes().to_vec(),
            ..meta
        };

        let db = self.store.lock().await;
        let tx = db.connection().transaction().await?;
        let entries = load_entries(&tx).await?;
        if let Some(old_key) = &old_key {
            for entry in &entries {
                let secret = crypto::open(old_key, entry)?;
                let resealed = crypto::seal(&new_keys.key, &entry.name, secret.as_bytes())?;
                write_entry(&tx, &resealed).await?;
            }
        }
        save_meta(&tx, &meta).await?;
        tx.commit().await?;

        tracing::info!(
            "Master password {}; {} vault entries re-keyed",
            if existing.is_some() { "changed" } else { "set" },
            entries.len()
        );
        *unlocked = Some(new_keys.key);
        Ok(())
    }

    /// Forget the cached key
    pub async fn lock(&self) {
        *self.unlocked.write().await = None;
    }

    /// Read access to the unlocked key, held for as long as the guard lives
    pub async fn access(&self) -> VaultAccess<'_> {
        VaultAccess {
            key: self.unlocked.read().await,
        }
    }

    /// Seal a secret under the unlocked key and store it
    pub async fn seal(&self, name: &str, secret: &str) -> Result<()> {
        let access = self.access().await;
        let entry = access.seal(name, secret)?;
        let db = self.store.lock().await;
        write_entry(db.connection(), &entry).await
    }

    /// Decrypt a stored secret with the unlocked key
    pub async fn open(&self, name: &str) -> Result<Option<SecretBytes>> {
        let access = self.access().await;
        let db = self.store.lock().await;
        access.open(db.connection(), name).await
    }
}

/// Shared borrow of the vault key; a re-key waits until every access drops
pub struct VaultAccess<'a> {
    key: RwLockReadGuard<'a, Option<SecretKey>>,
}

impl VaultAccess<'_> {
    fn key(&self) -> Result<&SecretKey> {
        self.key.as_ref().ok_or_else(|| {
            Error::Auth("vault is locked; verify the master password first".to_string())
        })
    }

    pub fn is_unlocked(&self) -> bool {
        self.key.is_some()
    }

    pub fn seal(&self, name: &str, secret: &str) -> Result<SealedEntry> {
        crypto::seal(self.key()?, name, secret.as_bytes())
    }

    pub async fn open(&self, conn: &Connection, name: &str) -> Result<Option<SecretBytes>> {
        let key = self.key()?;
        match load_entry(conn, name).await? {
            Some(entry) => Ok(Some(crypto::open(key, &entry)?)),
            None => Ok(None),
        }
    }
}

async fn derive_keys(password: &str, meta: &VaultMeta) -> Result<DerivedKeys> {
    let password = Zeroizing::new(password.to_string());
    let params = meta.params;
    let key_salt = meta.key_salt.clone();
    let verifier_salt = meta.verifier_salt.clone();

    // Argon2 is deliberately slow; keep it off the async workers
    tokio::task::spawn_blocking(move || -> Result<DerivedKeys> {
        Ok(DerivedKeys {
            key: crypto::derive_key(password.as_bytes(), &key_salt, &params)?,
            verifier: crypto::derive_key(password.as_bytes(), &verifier_salt, &params)?,
        })
    })
    .await
    .map_err(|error| Error::Crypto(format!("key derivation task failed: {error}")))?
}

/// Derived keys when `password` matches the stored verifier
async fn check_password(password: &str, meta: &VaultMeta) -> Result<Option<DerivedKeys>> {
    let keys = derive_keys(password, meta).await?;
    if keys.verifier.ct_eq(&meta.verifier) {
        Ok(Some(keys))
    } else {
        Ok(None)
    }
}

async fn load_meta(conn: &Connection) -> Result<Option<VaultMeta>> {
    let mut rows = conn
        .query(
            "SELECT kdf_params, key_salt, verifier_salt, verifier FROM vault_meta WHERE id = 1",
            (),
        )
        .await?;
    let Some(row) = rows.next().await? else {
        return Ok(None);
    };

    let params: String = row.get(0)?;
    Ok(Some(VaultMeta {
        params: serde_json::from_str(&params)?,
        key_salt: row.get(1)?,
        verifier_salt: row.get(2)?,
        verifier: row.get(3)?,
    }))
}

async fn save_meta(conn: &Connection, meta: &VaultMeta) -> Result<()> {
    conn.execute(
        "INSERT INTO vault_meta (id, kdf_params, key_salt, verifier_salt, verifier, updated_at)
         VALUES (1, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            kdf_params = excluded.kdf_params,
            key_salt = excluded.key_salt,
            verifier_salt = excluded.verifier_salt,
            verifier = excluded.verifier,
            updated_at = excluded.updated_at",
        libsql::params![
            serde_json::to_string(&meta.params)?,
            meta.key_salt.clone(),
            meta.verifier_salt.clone(),
            meta.verifier.clone(),
            now_millis()
        ],
    )
    .await?;
    Ok(())
}

fn parse_entry(row: &libsql::Row) -> Result<SealedEntry> {
    Ok(SealedEntry {
        name: row.get(0)?,
        nonce: row.get(1)?,
        ciphertext: row.get(2)?,
    })
}

async fn load_entries(conn: &Connection) -> Result<Vec<SealedEntry>> {
    let mut rows = conn
        .query("SELECT name, nonce, ciphertext FROM vault_entries ORDER BY name", ())
        .await?;
    let mut entries = Vec::new();
    while let Some(row) = rows.next().await? {
        entries.push(parse_entry(&row)?);
    }
    Ok(entries)
}

async fn load_entry(conn: &Connection, name: &str) -> Result<Option<SealedEntry>> {
    let mut rows = conn
        .query(
            "SELECT name, nonce, ciphertext FROM vault_entries WHERE name = ?",
            [name],
        )
        .await?;
    match rows.next().await? {
        Some(row) => Ok(Some(parse_entry(&row)?)),
        None => Ok(None),
    }
}

/// Insert or replace an entry; callers may pass a transaction
pub async fn write_entry(conn: &Connection, entry: &SealedEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO vault_entries (name, nonce, ciphertext, updated_at)
         VALUES (?, ?, ?, ?)
         ON CONFLICT(name) DO UPDATE SET
            nonce = excluded.nonce,
            ciphertext = excluded.ciphertext,
            updated_at = excluded.updated_at",
        libsql::params![
            entry.name.clone(),
            entry.nonce.clone(),
            entry.ciphertext.clone(),
            now_millis()
        ],
    )
    .await?;
    Ok(())
}
