use crate::utils::{ensure_parent_exists, hmac_sha256, hmac_sha256_verify, now, sha256};

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{read_to_string, write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "session";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    pub email: String,
    pub password_salt: String,
    pub password_hash: String,
    pub created_at: String,
    pub is_active: bool,
}

/// Registered accounts keyed by username, backed by a JSON file.
pub struct UserRegistry {
    path: PathBuf,
    users: BTreeMap<String, UserRecord>,
}

impl UserRegistry {
    pub fn load(path: &Path) -> Self {
        let users = match read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(users) => users,
                Err(err) => {
                    warn!(
                        "Malformed user registry at {}, starting empty, {err}",
                        path.display()
                    );
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        Self {
            path: path.to_path_buf(),
            users,
        }
    }

    pub fn save(&self) -> Result<()> {
        ensure_parent_exists(&self.path)?;
        let content = serde_json::to_string_pretty(&self.users)
            .with_context(|| "Failed to serialize user registry")?;
        write(&self.path, content)
            .with_context(|| format!("Failed to write user registry to {}", self.path.display()))
    }

    pub fn register(&mut self, username: &str, email: &str, password: &str) -> Result<UserRecord> {
        let username = username.trim();
        let email = email.trim();
        if username.is_empty() || password.is_empty() {
            bail!("Username and password are required");
        }
        if self.users.contains_key(username) {
            bail!("Username already exists");
        }

        let salt = random_token();
        let record = UserRecord {
            user_id: format!("user_{}", random_token()),
            email: email.to_string(),
            password_hash: hash_password(&salt, password),
            password_salt: salt,
            created_at: now(),
            is_active: true,
        };
        self.users.insert(username.to_string(), record.clone());
        self.save()?;
        Ok(record)
    }

    pub fn authenticate(&self, username: &str, password: &str) -> Option<&UserRecord> {
        let user = self.users.get(username.trim())?;
        if user.is_active && user.password_hash == hash_password(&user.password_salt, password) {
            Some(user)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.users.values().filter(|v| v.is_active).count()
    }

    pub fn user_ids(&self) -> Vec<String> {
        self.users.values().map(|v| v.user_id.clone()).collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminStats {
    pub total_users: usize,
    pub active_users: usize,
    pub total_conversations: usize,
}

/// The logged-in identity carried by a signed cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub user_id: String,
    pub username: String,
}

/// Signs the session payload so the server can stay stateless.
pub fn issue_session(secret: &str, user: &SessionUser) -> Result<String> {
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(user)?);
    let tag = URL_SAFE_NO_PAD.encode(hmac_sha256(secret.as_bytes(), &payload));
    Ok(format!("{payload}.{tag}"))
}

pub fn verify_session(secret: &str, token: &str) -> Option<SessionUser> {
    let (payload, tag) = token.split_once('.')?;
    let tag = URL_SAFE_NO_PAD.decode(tag).ok()?;
    if !hmac_sha256_verify(secret.as_bytes(), payload, &tag) {
        return None;
    }
    let data = URL_SAFE_NO_PAD.decode(payload).ok()?;
    serde_json::from_slice(&data).ok()
}

pub fn hash_password(salt: &str, password: &str) -> String {
    sha256(&format!("{salt}{password}"))
}

fn random_token() -> String {
    let id = Uuid::new_v4().simple().to_string();
    id[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn registry() -> (tempfile::TempDir, UserRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let registry = UserRegistry::load(&dir.path().join("users.json"));
        (dir, registry)
    }

    #[test]
    fn test_register_and_authenticate() {
        let (_dir, mut registry) = registry();
        let record = registry
            .register("steve", "steve@example.com", "seasons123")
            .unwrap();
        assert!(record.user_id.starts_with("user_"));
        assert_eq!(record.user_id.len(), "user_".len() + 16);

        assert!(registry.authenticate("steve", "seasons123").is_some());
        assert!(registry.authenticate("steve", "wrong").is_none());
        assert!(registry.authenticate("nobody", "seasons123").is_none());
        // whitespace around the username is ignored
        assert!(registry.authenticate("  steve ", "seasons123").is_some());
    }

    #[test]
    fn test_register_validation() {
        let (_dir, mut registry) = registry();
        registry.register("steve", "", "seasons123").unwrap();

        let err = registry
            .register("steve", "", "other")
            .unwrap_err()
            .to_string();
        assert_eq!(err, "Username already exists");

        assert!(registry.register("", "", "pw").is_err());
        assert!(registry.register("dana", "", "").is_err());
    }

    #[test]
    fn test_password_hashes_are_salted() {
        let (_dir, mut registry) = registry();
        let a = registry.register("a", "", "same-password").unwrap();
        let b = registry.register("b", "", "same-password").unwrap();
        assert_ne!(a.password_salt, b.password_salt);
        assert_ne!(a.password_hash, b.password_hash);
    }

    #[test]
    fn test_registry_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");

        let mut registry = UserRegistry::load(&path);
        let record = registry.register("steve", "s@example.com", "pw").unwrap();

        let reloaded = UserRegistry::load(&path);
        assert_eq!(reloaded.len(), 1);
        assert_eq!(
            reloaded.authenticate("steve", "pw"),
            Some(&record)
        );
        assert_eq!(reloaded.user_ids(), vec![record.user_id]);
    }

    #[test]
    fn test_session_roundtrip() {
        let user = SessionUser {
            user_id: "user_0123456789abcdef".into(),
            username: "steve".into(),
        };
        let token = issue_session("secret", &user).unwrap();
        assert_eq!(verify_session("secret", &token), Some(user.clone()));

        assert_eq!(verify_session("other-secret", &token), None);
        assert_eq!(verify_session("secret", "garbage"), None);

        let (payload, _) = token.split_once('.').unwrap();
        let forged = format!("{payload}.{}", URL_SAFE_NO_PAD.encode(b"bad-tag"));
        assert_eq!(verify_session("secret", &forged), None);
    }
}
