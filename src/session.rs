//! Session capability consumed by the orchestrator.
//!
//! The orchestration engine never performs a login itself: an injected
//! [`SessionProvider`] supplies an authenticated instance URL and session
//! token, and may be asked to drop a cached session when the remote system
//! signals expiry. Credentials are held in `secrecy::SecretString` and are
//! never logged.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::RwLock;
use url::Url;

use crate::error::StructuredError;

/// An authenticated endpoint: where to send requests and how to prove who
/// we are.
#[derive(Clone)]
pub struct Session {
    instance_url: Url,
    session_id: SecretString,
}

impl Session {
    /// Creates a session from an instance URL and session token.
    pub fn new(instance_url: Url, session_id: SecretString) -> Self {
        Self {
            instance_url,
            session_id,
        }
    }

    /// The base instance URL all request paths are joined onto.
    pub fn instance_url(&self) -> &Url {
        &self.instance_url
    }

    /// The session token value for the auth header. Only call at
    /// request-build time; never log the result.
    pub fn auth_header_value(&self) -> &str {
        self.session_id.expose_secret()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("instance_url", &self.instance_url.as_str())
            .field("session_id", &"[redacted]")
            .finish()
    }
}

/// Supplies authenticated sessions to the orchestrator.
///
/// `acquire` is called at the start of every run; `invalidate` is called by
/// the owner when the remote system has signalled that the session expired,
/// so the next `acquire` re-authenticates. Acquisition failures surface as
/// auth-kind [`StructuredError`]s and abort the run before any job is
/// created.
pub trait SessionProvider: Send + Sync {
    /// Returns a usable session for the given account.
    fn acquire<'a>(
        &'a self,
        account: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Session, StructuredError>> + Send + 'a>>;

    /// Drops any cached session for the given account.
    fn invalidate<'a>(&'a self, account: &'a str) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

/// A provider that always returns the same session.
///
/// Useful when the caller already holds a token (tests, short-lived CLI
/// invocations). `invalidate` is a no-op.
pub struct StaticSessionProvider {
    session: Session,
}

impl StaticSessionProvider {
    /// Wraps a fixed session.
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

impl SessionProvider for StaticSessionProvider {
    fn acquire<'a>(
        &'a self,
        _account: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Session, StructuredError>> + Send + 'a>> {
        let session = self.session.clone();
        Box::pin(async move { Ok(session) })
    }

    fn invalidate<'a>(&'a self, _account: &'a str) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async {})
    }
}

/// Caches sessions from an inner provider, keyed by account.
///
/// The cache is read-mostly: a run hits the read lock once; only a miss or
/// an explicit `invalidate` takes the write lock. One entry per account,
/// never shared across accounts.
pub struct CachedSessionProvider<P> {
    inner: P,
    cache: RwLock<HashMap<String, Session>>,
}

impl<P: SessionProvider> CachedSessionProvider<P> {
    /// Wraps an inner provider with a per-account cache.
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
        }
    }
}

impl<P: SessionProvider> SessionProvider for CachedSessionProvider<P> {
    fn acquire<'a>(
        &'a self,
        account: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Session, StructuredError>> + Send + 'a>> {
        Box::pin(async move {
            if let Some(session) = self.cache.read().await.get(account) {
                return Ok(session.clone());
            }

            let session = self.inner.acquire(account).await?;
            self.cache
                .write()
                .await
                .insert(account.to_string(), session.clone());
            Ok(session)
        })
    }

    fn invalidate<'a>(&'a self, account: &'a str) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            self.cache.write().await.remove(account);
            self.inner.invalidate(account).await;
        })
    }
}
