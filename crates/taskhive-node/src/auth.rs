use async_trait::async_trait;
use std::collections::HashMap;
use taskhive_types::UserId;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

pub const MIN_NAME_LEN: usize = 3;
pub const MIN_PASSWORD_LEN: usize = 6;
pub const RESERVED_NAME: &str = "admin";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Display name must be at least {MIN_NAME_LEN} characters long")]
    InvalidName,

    #[error("This display name is reserved")]
    ReservedName,

    #[error("Please enter a valid email address")]
    InvalidEmail,

    #[error("Password must be at least {MIN_PASSWORD_LEN} characters long")]
    WeakPassword,

    #[error("This email address is already in use by another account")]
    EmailInUse,

    #[error("This display name is already taken")]
    NameTaken,

    #[error("Session expired or unknown")]
    UnknownSession,

    #[error("Account profile error: {0}")]
    Profile(String),
}

/// Input for account creation.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Authentication collaborator. Sign-in accepts an email or a display name
/// and resolves both to the same underlying account.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_up(&self, account: NewAccount) -> Result<UserId, AuthError>;
    async fn sign_in(&self, identifier: &str, password: &str) -> Result<String, AuthError>;
    async fn sign_out(&self, token: &str);
    async fn current_user(&self, token: &str) -> Option<UserId>;
}

struct Credential {
    user_id: UserId,
    name: String,
    email: String,
    salt: [u8; 16],
    digest: [u8; 32],
}

fn digest_password(salt: &[u8; 16], password: &str) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    *hasher.finalize().as_bytes()
}

fn fresh_salt() -> [u8; 16] {
    use rand::Rng;
    rand::thread_rng().gen()
}

fn fresh_token() -> String {
    use rand::Rng;
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

/// Process-local credential and session registry.
pub struct LocalAuthProvider {
    /// Keyed by lowercased email.
    credentials: RwLock<HashMap<String, Credential>>,
    /// Lowercased display name -> lowercased email.
    names: RwLock<HashMap<String, String>>,
    /// Session token -> account.
    sessions: RwLock<HashMap<String, UserId>>,
}

impl Default for LocalAuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalAuthProvider {
    pub fn new() -> Self {
        Self {
            credentials: RwLock::new(HashMap::new()),
            names: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Stable account id derived from the email address.
    pub fn account_id(email: &str) -> UserId {
        let digest = blake3::hash(email.trim().to_lowercase().as_bytes());
        UserId::from_string(format!("u-{}", hex::encode(&digest.as_bytes()[..8])))
    }

    fn validate(account: &NewAccount) -> Result<(), AuthError> {
        let name = account.name.trim();
        if name.chars().count() < MIN_NAME_LEN {
            return Err(AuthError::InvalidName);
        }
        if name.eq_ignore_ascii_case(RESERVED_NAME) {
            return Err(AuthError::ReservedName);
        }
        let email = account.email.trim();
        if !email.contains('@') || !email.contains('.') {
            return Err(AuthError::InvalidEmail);
        }
        if account.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }
        Ok(())
    }

    async fn insert_credential(&self, account: NewAccount) -> Result<UserId, AuthError> {
        let email = account.email.trim().to_lowercase();
        let name = account.name.trim().to_string();
        let name_key = name.to_lowercase();

        let mut credentials = self.credentials.write().await;
        let mut names = self.names.write().await;
        if credentials.contains_key(&email) {
            return Err(AuthError::EmailInUse);
        }
        if names.contains_key(&name_key) {
            return Err(AuthError::NameTaken);
        }

        let user_id = Self::account_id(&email);
        let salt = fresh_salt();
        let digest = digest_password(&salt, &account.password);
        credentials.insert(
            email.clone(),
            Credential {
                user_id: user_id.clone(),
                name,
                email: email.clone(),
                salt,
                digest,
            },
        );
        names.insert(name_key, email.clone());

        info!(user_id = %user_id, email = %email, "🔐 Credential registered");
        Ok(user_id)
    }

    /// Bootstrap path: registers a credential without the public-signup
    /// validation (allows the reserved admin name).
    pub async fn seed_account(&self, account: NewAccount) -> Result<UserId, AuthError> {
        self.insert_credential(account).await
    }
}

#[async_trait]
impl AuthProvider for LocalAuthProvider {
    async fn sign_up(&self, account: NewAccount) -> Result<UserId, AuthError> {
        Self::validate(&account)?;
        self.insert_credential(account).await
    }

    async fn sign_in(&self, identifier: &str, password: &str) -> Result<String, AuthError> {
        let identifier = identifier.trim().to_lowercase();

        let credentials = self.credentials.read().await;
        let credential = if identifier.contains('@') {
            credentials.get(&identifier)
        } else {
            let names = self.names.read().await;
            match names.get(&identifier) {
                Some(email) => credentials.get(email),
                None => None,
            }
        }
        .ok_or(AuthError::InvalidCredentials)?;

        if digest_password(&credential.salt, password) != credential.digest {
            return Err(AuthError::InvalidCredentials);
        }

        let token = fresh_token();
        let user_id = credential.user_id.clone();
        drop(credentials);

        let mut sessions = self.sessions.write().await;
        sessions.insert(token.clone(), user_id.clone());

        info!(user_id = %user_id, "🔓 Signed in");
        Ok(token)
    }

    async fn sign_out(&self, token: &str) {
        let mut sessions = self.sessions.write().await;
        if let Some(user_id) = sessions.remove(token) {
            info!(user_id = %user_id, "🔒 Signed out");
        }
    }

    async fn current_user(&self, token: &str) -> Option<UserId> {
        let sessions = self.sessions.read().await;
        sessions.get(token).cloned()
    }
}
