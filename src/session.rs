// Authenticated-user session
// The user record returned by the auth endpoints is persisted under a fixed key in a small
// key-value store and mirrored in memory for readers.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::RentalApi;
use crate::error::{AppError, Operation};
use crate::forms::{LoginForm, RegistrationForm};
use crate::models::{AuthUser, ProfileUpdate};

/// Key under which the authenticated-user record is stored.
pub const USER_INFO_KEY: &str = "userInfo";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt session file: {0}")]
    Corrupt(#[from] serde_json::Error),
}

// Local key-value store for persisted client state
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), SessionError>;
    fn remove(&self, key: &str) -> Result<(), SessionError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        self.values.lock().remove(key);
        Ok(())
    }
}

/// JSON-file backed store; the whole map is rewritten on every change.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: Mutex<HashMap<String, String>>,
}

impl FileStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref().to_path_buf();
        let values = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                HashMap::new()
            } else {
                match serde_json::from_str(&content) {
                    Ok(values) => values,
                    Err(e) => {
                        // Unreadable file: start logged out
                        warn!(
                            path = %path.display(),
                            error = %e,
                            "discarding unreadable session file"
                        );
                        HashMap::new()
                    }
                }
            }
        } else {
            HashMap::new()
        };
        debug!(path = %path.display(), entries = values.len(), "opened session store");

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, values: &HashMap<String, String>) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        // The session file is only ever replaced whole
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, serde_json::to_string_pretty(values)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionError> {
        let mut values = self.values.lock();
        values.insert(key.to_string(), value.to_string());
        self.flush(&values)
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        let mut values = self.values.lock();
        if values.remove(key).is_some() {
            self.flush(&values)?;
        }
        Ok(())
    }
}

// Reads the persisted user record; an unreadable record counts as logged out
pub fn stored_user(store: &dyn SessionStore) -> Option<AuthUser> {
    let raw = store.get(USER_INFO_KEY)?;
    match serde_json::from_str(&raw) {
        Ok(user) => Some(user),
        Err(e) => {
            warn!(error = %e, "ignoring unreadable user record");
            None
        }
    }
}

/// The authenticated user, shared by every view.
///
/// Writes come only from login, register, profile update and logout; the last write wins.
pub struct AuthSession {
    store: Arc<dyn SessionStore>,
    user: RwLock<Option<AuthUser>>,
}

impl AuthSession {
    /// Restores the user from the store, if one was persisted.
    pub fn restore(store: Arc<dyn SessionStore>) -> Self {
        let user = stored_user(store.as_ref());
        if let Some(user) = &user {
            debug!(user = %user.email, "restored session");
        }
        Self {
            store,
            user: RwLock::new(user),
        }
    }

    pub fn store(&self) -> Arc<dyn SessionStore> {
        Arc::clone(&self.store)
    }

    pub fn current_user(&self) -> Option<AuthUser> {
        self.user.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.read().is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.user.read().as_ref().map_or(false, |u| u.is_admin)
    }

    // Fails with AuthRequired when nobody is logged in
    pub fn require_user(&self) -> Result<AuthUser, AppError> {
        self.current_user().ok_or(AppError::AuthRequired)
    }

    pub async fn login(&self, api: &dyn RentalApi, form: &LoginForm) -> Result<AuthUser, AppError> {
        let credentials = form.validate()?;
        let user = api
            .login(&credentials)
            .await
            .map_err(|e| AppError::api(Operation::Login, e))?;
        self.replace(user.clone());
        info!(user = %user.email, "logged in");
        Ok(user)
    }

    pub async fn register(
        &self,
        api: &dyn RentalApi,
        form: &RegistrationForm,
    ) -> Result<AuthUser, AppError> {
        let registration = form.validate()?;
        let user = api
            .register(&registration)
            .await
            .map_err(|e| AppError::api(Operation::Register, e))?;
        self.replace(user.clone());
        info!(user = %user.email, "registered");
        Ok(user)
    }

    pub async fn update_profile(
        &self,
        api: &dyn RentalApi,
        update: &ProfileUpdate,
    ) -> Result<AuthUser, AppError> {
        self.require_user()?;
        let mut user = api
            .update_profile(update)
            .await
            .map_err(|e| AppError::api(Operation::UpdateProfile, e))?;

        // Keep the old token if the backend did not issue a new one
        if user.token.is_empty() {
            if let Some(current) = self.current_user() {
                user.token = current.token;
            }
        }
        self.replace(user.clone());
        info!(user = %user.email, "profile updated");
        Ok(user)
    }

    pub fn logout(&self) {
        if let Err(e) = self.store.remove(USER_INFO_KEY) {
            warn!(error = %e, "could not remove persisted user record");
        }
        *self.user.write() = None;
        info!("logged out");
    }

    fn replace(&self, user: AuthUser) {
        match serde_json::to_string(&user) {
            Ok(raw) => {
                if let Err(e) = self.store.set(USER_INFO_KEY, &raw) {
                    // The in-memory record still updates; only persistence is lost
                    warn!(error = %e, "could not persist user record");
                }
            }
            Err(e) => warn!(error = %e, "could not serialize user record"),
        }
        *self.user.write() = Some(user);
    }
}
