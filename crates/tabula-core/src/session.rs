//! Explicit session context
//!
//! The logged-in user is held by a `Session` value that callers construct and
//! pass around. It is restored from persisted storage (rejecting expired
//! entries) and torn down on logout.

use crate::error::SessionError;
use crate::types::UserIdentity;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted session payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub user: UserIdentity,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionContext {
    #[inline]
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Where a session survives between process runs
pub trait SessionStore {
    fn load(&self) -> Result<Option<SessionContext>, SessionError>;
    fn save(&mut self, context: &SessionContext) -> Result<(), SessionError>;
    fn clear(&mut self) -> Result<(), SessionError>;
}

/// Session lifecycle owner
#[derive(Debug)]
pub struct Session<S: SessionStore> {
    store: S,
    ttl: Duration,
    current: Option<SessionContext>,
}

impl<S: SessionStore> Session<S> {
    /// Create an empty session; call `restore` or `login` next
    pub fn new(store: S, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            current: None,
        }
    }

    /// Load the persisted session, discarding it when expired
    pub fn restore(&mut self, now: DateTime<Utc>) -> Result<Option<&SessionContext>, SessionError> {
        self.current = None;
        let Some(context) = self.store.load()? else {
            return Ok(None);
        };

        if context.is_expired(now) {
            tracing::info!(email = %context.user.email, "persisted session expired");
            self.store.clear()?;
            return Ok(None);
        }

        tracing::debug!(email = %context.user.email, "session restored");
        self.current = Some(context);
        Ok(self.current.as_ref())
    }

    /// Start a new session for `user`, persisting it
    pub fn login(
        &mut self,
        user: UserIdentity,
        now: DateTime<Utc>,
    ) -> Result<&SessionContext, SessionError> {
        let context = SessionContext {
            user,
            issued_at: now,
            expires_at: now + self.ttl,
        };
        self.store.save(&context)?;
        tracing::info!(email = %context.user.email, "session started");
        let context = self.current.insert(context);
        Ok(&*context)
    }

    /// End the session and remove persisted state
    pub fn logout(&mut self) -> Result<(), SessionError> {
        if let Some(context) = self.current.take() {
            tracing::info!(email = %context.user.email, "session ended");
        }
        self.store.clear()
    }

    #[inline]
    #[must_use]
    pub fn current(&self) -> Option<&SessionContext> {
        self.current.as_ref()
    }

    /// Logged-in user, or `NotLoggedIn`
    pub fn user(&self) -> Result<&UserIdentity, SessionError> {
        self.current
            .as_ref()
            .map(|context| &context.user)
            .ok_or(SessionError::NotLoggedIn)
    }
}

/// JSON file store
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> SessionError {
        SessionError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<SessionContext>, SessionError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(self.io_error(err)),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| SessionError::Corrupt {
                path: self.path.clone(),
                source,
            })
    }

    fn save(&mut self, context: &SessionContext) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| self.io_error(err))?;
        }
        let body = serde_json::to_vec_pretty(context).map_err(|source| SessionError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body).map_err(|err| self.io_error(err))?;
        fs::rename(&tmp, &self.path).map_err(|err| self.io_error(err))
    }

    fn clear(&mut self) -> Result<(), SessionError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(self.io_error(err)),
        }
    }
}

/// In-process store, used by tests and embedded callers
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    saved: Option<SessionContext>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<SessionContext>, SessionError> {
        Ok(self.saved.clone())
    }

    fn save(&mut self, context: &SessionContext) -> Result<(), SessionError> {
        self.saved = Some(context.clone());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), SessionError> {
        self.saved = None;
        Ok(())
    }
}
