//! The set of currently loaded [`Account`]s, keyed by shortname, with whole-registry lock/unlock.
//!
//! Modeled on this codebase's pattern of a single [`parking_lot::Mutex`]-guarded inner struct
//! reached only through accessor closures (`with`/`with_mut`), so no caller can hold the lock
//! across an `.await` by accident — every suspension point in the Flow Engine happens outside
//! a `with*` call.

use std::collections::HashMap;

use chacha20poly1305::aead::Aead;
use chacha20poly1305::{
    ChaCha20Poly1305,
    KeyInit,
    Nonce,
};
use parking_lot::Mutex;
use rand::RngCore;
use rand::rngs::OsRng;

use crate::account::Account;
use crate::error::{
    Error,
    Result,
};
use crate::secret::SecretBuffer;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

#[derive(Default)]
struct Inner {
    accounts: HashMap<String, Account>,
    lock_salt: Option<[u8; SALT_LEN]>,
}

impl Inner {
    fn is_locked(&self) -> bool {
        self.lock_salt.is_some()
    }
}

pub struct Registry {
    inner: Mutex<Inner>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.inner.lock().is_locked()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts `account`, atomically replacing and wiping any existing record with the same
    /// shortname.
    pub fn insert(&self, account: Account) {
        let mut guard = self.inner.lock();
        if let Some(mut old) = guard.accounts.insert(account.shortname.clone(), account) {
            old.wipe();
        }
    }

    pub fn contains(&self, shortname: &str) -> bool {
        self.inner.lock().accounts.contains_key(shortname)
    }

    pub fn with<T>(&self, shortname: &str, f: impl FnOnce(&Account) -> T) -> Option<T> {
        self.inner.lock().accounts.get(shortname).map(f)
    }

    pub fn with_mut<T>(&self, shortname: &str, f: impl FnOnce(&mut Account) -> T) -> Option<T> {
        self.inner.lock().accounts.get_mut(shortname).map(f)
    }

    /// Linear scan by `used_state`; per §4.1 the in-flight set is tiny so this isn't worth a
    /// secondary index.
    pub fn with_by_state<T>(&self, state: &str, f: impl FnOnce(&mut Account) -> T) -> Option<T> {
        let mut guard = self.inner.lock();
        guard
            .accounts
            .values_mut()
            .find(|a| a.used_state.as_deref() == Some(state))
            .map(f)
    }

    pub fn remove_by_shortname(&self, shortname: &str) -> bool {
        let mut guard = self.inner.lock();
        match guard.accounts.remove(shortname) {
            Some(mut account) => {
                account.wipe();
                true
            },
            None => false,
        }
    }

    pub fn remove_all(&self) {
        let mut guard = self.inner.lock();
        for (_, mut account) in guard.accounts.drain() {
            account.wipe();
        }
    }

    /// Removes every record with `0 < death <= now`, returning how many were evicted.
    pub fn reap(&self, now: u64) -> usize {
        let mut guard = self.inner.lock();
        let dead: Vec<String> = guard
            .accounts
            .iter()
            .filter(|(_, a)| a.is_dead(now))
            .map(|(name, _)| name.clone())
            .collect();
        let count = dead.len();
        for name in dead {
            if let Some(mut account) = guard.accounts.remove(&name) {
                account.wipe();
            }
        }
        count
    }

    /// Derives a key from `password` with a fresh random salt and replaces every secret field of
    /// every loaded account with its encrypted form. The password and the derived key are held
    /// only on this call's stack.
    pub fn lock(&self, password: &str) -> Result<()> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let key = derive_key(password, &salt)?;
        let cipher = ChaCha20Poly1305::new((&key).into());

        let mut guard = self.inner.lock();
        for account in guard.accounts.values_mut() {
            seal_account(account, &cipher);
        }
        guard.lock_salt = Some(salt);
        Ok(())
    }

    /// Re-derives the key from `password` and the salt recorded by the matching `lock()`, and
    /// decrypts every account. If any field fails to authenticate under the derived key, no
    /// account is mutated and the registry stays locked.
    pub fn unlock(&self, password: &str) -> Result<()> {
        let mut guard = self.inner.lock();
        let salt = guard.lock_salt.ok_or(Error::Internal("unlock called while not locked".into()))?;
        let key = derive_key(password, &salt)?;
        let cipher = ChaCha20Poly1305::new((&key).into());

        let mut decrypted = HashMap::with_capacity(guard.accounts.len());
        for (name, account) in guard.accounts.iter() {
            decrypted.insert(name.clone(), open_account(account, &cipher)?);
        }

        guard.accounts = decrypted;
        guard.lock_salt = None;
        Ok(())
    }
}

fn derive_key(password: &str, salt: &[u8; SALT_LEN]) -> Result<[u8; KEY_LEN]> {
    let mut key = [0u8; KEY_LEN];
    argon2::Argon2::default()
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| Error::Internal(format!("key derivation failed: {e}")))?;
    Ok(key)
}

fn seal_field(field: &mut SecretBuffer, cipher: &ChaCha20Poly1305) {
    if field.is_empty() {
        return;
    }
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(nonce, field.expose_bytes())
        .expect("chacha20poly1305 encryption is infallible for well-formed input");
    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    field.set(sealed);
}

fn open_field(field: &SecretBuffer, cipher: &ChaCha20Poly1305) -> Result<SecretBuffer> {
    if field.is_empty() {
        return Ok(SecretBuffer::default());
    }
    let bytes = field.expose_bytes();
    if bytes.len() <= NONCE_LEN {
        return Err(Error::BadPassword);
    }
    let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);
    let plaintext = cipher.decrypt(nonce, ciphertext).map_err(|_| Error::BadPassword)?;
    Ok(SecretBuffer::from(plaintext))
}

fn seal_account(account: &mut Account, cipher: &ChaCha20Poly1305) {
    seal_field(&mut account.client_secret, cipher);
    seal_field(&mut account.refresh_token, cipher);
    seal_field(&mut account.access_token, cipher);
    seal_field(&mut account.username, cipher);
    seal_field(&mut account.password, cipher);
    seal_field(&mut account.pkce_code_verifier, cipher);
    account.locked = true;
}

fn open_account(account: &Account, cipher: &ChaCha20Poly1305) -> Result<Account> {
    let mut out = account.clone();
    out.client_secret = open_field(&account.client_secret, cipher)?;
    out.refresh_token = open_field(&account.refresh_token, cipher)?;
    out.access_token = open_field(&account.access_token, cipher)?;
    out.username = open_field(&account.username, cipher)?;
    out.password = open_field(&account.password, cipher)?;
    out.pkce_code_verifier = open_field(&account.pkce_code_verifier, cipher)?;
    out.locked = false;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded_account(shortname: &str) -> Account {
        let mut a = Account::new(shortname, "https://issuer.example");
        a.refresh_token = SecretBuffer::from("R-secret");
        a.client_secret = SecretBuffer::from("cs-secret");
        a
    }

    #[test]
    fn insert_replaces_and_wipes_old_record() {
        let reg = Registry::new();
        reg.insert(loaded_account("s1"));
        reg.insert(Account::new("s1", "https://issuer.example"));
        assert_eq!(reg.len(), 1);
        assert!(reg.with("s1", |a| a.refresh_token.is_empty()).unwrap());
    }

    #[test]
    fn reap_evicts_only_expired_records() {
        let reg = Registry::new();
        let mut alive = Account::new("alive", "https://issuer.example");
        alive.death = 0;
        let mut dead = Account::new("dead", "https://issuer.example");
        dead.death = 100;
        reg.insert(alive);
        reg.insert(dead);

        let evicted = reg.reap(200);
        assert_eq!(evicted, 1);
        assert!(reg.contains("alive"));
        assert!(!reg.contains("dead"));
    }

    #[test]
    fn lock_then_unlock_with_correct_password_restores_plaintext() {
        let reg = Registry::new();
        reg.insert(loaded_account("s1"));

        reg.lock("correct horse").unwrap();
        assert!(reg.is_locked());
        assert!(reg.with("s1", |a| a.refresh_token.expose_str() != "R-secret").unwrap());

        reg.unlock("correct horse").unwrap();
        assert!(!reg.is_locked());
        assert_eq!(reg.with("s1", |a| a.refresh_token.expose_str().to_string()).unwrap(), "R-secret");
    }

    #[test]
    fn unlock_with_wrong_password_leaves_registry_locked() {
        let reg = Registry::new();
        reg.insert(loaded_account("s1"));
        reg.lock("pw").unwrap();

        let err = reg.unlock("not-pw").unwrap_err();
        assert!(matches!(err, Error::BadPassword));
        assert!(reg.is_locked());
    }

    #[test]
    fn shortname_uniqueness_across_inserts_and_removes() {
        let reg = Registry::new();
        reg.insert(Account::new("s1", "https://a.example"));
        reg.insert(Account::new("s2", "https://a.example"));
        reg.remove_by_shortname("s1");
        reg.insert(Account::new("s1", "https://b.example"));
        assert_eq!(reg.len(), 2);
    }
}
