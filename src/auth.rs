//! Access token seam.
//!
//! Credential acquisition and refresh belong to the application. The engine
//! only asks for a bearer token before talking to the remote store and
//! treats `FileStorageError::Auth` as "the user must reconnect".

use std::future::Future;
use std::sync::{Arc, RwLock};

use crate::file_storage::FileStorageError;

/// Supplies a valid bearer token, or fails when re-authentication is needed.
pub trait AccessTokenProvider: Send + Sync {
    fn access_token(&self) -> impl Future<Output = Result<String, FileStorageError>> + Send;
}

impl<T: AccessTokenProvider> AccessTokenProvider for Arc<T> {
    fn access_token(&self) -> impl Future<Output = Result<String, FileStorageError>> + Send {
        (**self).access_token()
    }
}

/// Token holder the application updates whenever it signs in or refreshes.
#[derive(Debug, Default)]
pub struct SharedToken {
    token: RwLock<Option<String>>,
}

impl SharedToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    /// A holder with no token; every request fails with `Auth`
    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn set_token(&self, token: impl Into<String>) {
        if let Ok(mut guard) = self.token.write() {
            *guard = Some(token.into());
        }
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.token.write() {
            *guard = None;
        }
    }

    fn current(&self) -> Result<String, FileStorageError> {
        let guard = self
            .token
            .read()
            .map_err(|_| FileStorageError::Auth("token lock poisoned".to_string()))?;
        match guard.as_deref() {
            Some(token) if !token.is_empty() => Ok(token.to_string()),
            _ => Err(FileStorageError::Auth(
                "not signed in to cloud storage".to_string(),
            )),
        }
    }
}

impl AccessTokenProvider for SharedToken {
    async fn access_token(&self) -> Result<String, FileStorageError> {
        self.current()
    }
}
