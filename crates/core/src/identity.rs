//! Identity session capability
//!
//! The identity provider SDK is not owned by this workspace. Everything that
//! needs a token or needs to end a session goes through [`IdentitySession`],
//! which hosting applications implement on top of their provider.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

/// Errors reported by an identity provider
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    /// No token is currently available (signed out or never signed in)
    #[error("No identity token available")]
    TokenUnavailable,

    /// Non-interactive re-authentication failed
    #[error("Silent sign-in failed: {0}")]
    SilentSignInFailed(String),

    /// Sign-out could not be completed
    #[error("Sign-out failed: {0}")]
    SignOutFailed(String),

    /// Any other provider failure
    #[error("Identity provider error: {0}")]
    Provider(String),
}

/// Capability bundle supplied by the hosting application
#[async_trait]
pub trait IdentitySession: Send + Sync {
    /// Current bearer/ID token
    async fn get_token(&self) -> Result<String, IdentityError>;

    /// Attempt non-interactive re-authentication
    async fn sign_in_silently(&self) -> Result<(), IdentityError>;

    /// Terminate the session and clear local credentials
    async fn sign_out(&self) -> Result<(), IdentityError>;

    /// Whether the session is currently signed in
    fn is_signed_in(&self) -> bool;

    /// Whether the session is still being established
    fn is_loading(&self) -> bool;
}

/// Session with a fixed token; silent sign-in always succeeds
#[derive(Debug)]
pub struct StaticTokenSession {
    token: Mutex<Option<String>>,
}

impl StaticTokenSession {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }

    fn current(&self) -> Option<String> {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl IdentitySession for StaticTokenSession {
    async fn get_token(&self) -> Result<String, IdentityError> {
        self.current().ok_or(IdentityError::TokenUnavailable)
    }

    async fn sign_in_silently(&self) -> Result<(), IdentityError> {
        if self.current().is_some() {
            Ok(())
        } else {
            Err(IdentityError::SilentSignInFailed(
                "static session has been signed out".to_string(),
            ))
        }
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }

    fn is_signed_in(&self) -> bool {
        self.current().is_some()
    }

    fn is_loading(&self) -> bool {
        false
    }
}

/// Session backed by a token file
///
/// The file is read once by [`FileTokenSession::load`]. A silent sign-in
/// re-reads it, so an external process that rotates the token (a login
/// helper, a sidecar) is picked up without user interaction.
#[derive(Debug)]
pub struct FileTokenSession {
    path: PathBuf,
    token: Mutex<Option<String>>,
    loading: AtomicBool,
}

impl FileTokenSession {
    /// Create a session for `path` without reading it yet
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            token: Mutex::new(None),
            loading: AtomicBool::new(true),
        }
    }

    /// Create a session and read the token file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or holds no token
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, IdentityError> {
        let session = Self::new(path);
        session.reload().await?;
        Ok(session)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn reload(&self) -> Result<(), IdentityError> {
        self.loading.store(true, Ordering::SeqCst);
        let result = tokio::fs::read_to_string(&self.path).await;
        self.loading.store(false, Ordering::SeqCst);

        let contents = result.map_err(|e| {
            IdentityError::SilentSignInFailed(format!(
                "failed to read token file {}: {e}",
                self.path.display()
            ))
        })?;

        let token = contents.trim();
        if token.is_empty() {
            return Err(IdentityError::SilentSignInFailed(format!(
                "token file {} is empty",
                self.path.display()
            )));
        }

        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        debug!("Loaded identity token from {}", self.path.display());
        Ok(())
    }

    fn current(&self) -> Option<String> {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl IdentitySession for FileTokenSession {
    async fn get_token(&self) -> Result<String, IdentityError> {
        self.current().ok_or(IdentityError::TokenUnavailable)
    }

    async fn sign_in_silently(&self) -> Result<(), IdentityError> {
        info!("Refreshing identity token from {}", self.path.display());
        self.reload().await
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = None;
        info!("Signed out; cleared cached token");
        Ok(())
    }

    fn is_signed_in(&self) -> bool {
        self.current().is_some()
    }

    fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }
}

// Mock implementation for testing
#[cfg(any(test, feature = "tests"))]
pub mod mock {
    use super::*;
    use mockall::mock;

    mock! {
        pub IdentitySession {}

        #[async_trait]
        impl IdentitySession for IdentitySession {
            async fn get_token(&self) -> Result<String, IdentityError>;
            async fn sign_in_silently(&self) -> Result<(), IdentityError>;
            async fn sign_out(&self) -> Result<(), IdentityError>;
            fn is_signed_in(&self) -> bool;
            fn is_loading(&self) -> bool;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_static_session_sign_out_clears_token() {
        let session = StaticTokenSession::new("abc");
        assert_eq!(session.get_token().await.unwrap(), "abc");
        assert!(session.is_signed_in());

        session.sign_out().await.unwrap();
        assert!(!session.is_signed_in());
        assert_eq!(
            session.get_token().await,
            Err(IdentityError::TokenUnavailable)
        );
        assert!(session.sign_in_silently().await.is_err());
    }

    #[tokio::test]
    async fn test_file_session_reads_trimmed_token() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  token-1  ").unwrap();

        let session = FileTokenSession::load(file.path()).await.unwrap();
        assert_eq!(session.get_token().await.unwrap(), "token-1");
        assert!(session.is_signed_in());
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn test_file_session_silent_sign_in_picks_up_rotation() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "old").unwrap();
        let session = FileTokenSession::load(file.path()).await.unwrap();

        std::fs::write(file.path(), "new").unwrap();
        session.sign_in_silently().await.unwrap();
        assert_eq!(session.get_token().await.unwrap(), "new");
    }

    #[tokio::test]
    async fn test_file_session_empty_file_fails() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let result = FileTokenSession::load(file.path()).await;
        assert!(matches!(result, Err(IdentityError::SilentSignInFailed(_))));
    }

    #[tokio::test]
    async fn test_file_session_before_load_is_loading() {
        let session = FileTokenSession::new("/nonexistent/token");
        assert!(session.is_loading());
        assert!(!session.is_signed_in());
        assert!(session.sign_in_silently().await.is_err());
        assert!(!session.is_loading());
    }
}
