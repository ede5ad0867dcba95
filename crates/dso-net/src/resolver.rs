//! Asynchronous, cancelable hostname resolution.
//!
//! [`Resolve`] is the lookup backend; [`Resolver`] runs at most one lookup at
//! a time on the tokio runtime and tags every result with the
//! [`SessionHandle`] it was started for, so a late answer for a superseded
//! session can be recognised and dropped by the session.

use std::collections::HashMap;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::error::ResolveError;
use crate::session::{SessionEvent, SessionHandle};

/// A hostname lookup backend.
pub trait Resolve: Send + Sync + 'static {
    /// Resolve `host` to its first IPv4 address.
    fn resolve(&self, host: &str) -> impl Future<Output = Result<Ipv4Addr, ResolveError>> + Send;
}

/// Uses the operating system resolver via [`tokio::net::lookup_host`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl Resolve for SystemResolver {
    async fn resolve(&self, host: &str) -> Result<Ipv4Addr, ResolveError> {
        if let Ok(ip) = host.parse::<Ipv4Addr>() {
            return Ok(ip);
        }

        let addrs = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|e| ResolveError::TransportFailure(e.to_string()))?;

        addrs
            .filter_map(|addr| match addr {
                SocketAddr::V4(v4) => Some(*v4.ip()),
                SocketAddr::V6(_) => None,
            })
            .next()
            .ok_or_else(|| ResolveError::NotFound(host.to_string()))
    }
}

/// Answers from a fixed host table; IP literals resolve to themselves.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    hosts: HashMap<String, Ipv4Addr>,
}

impl StaticResolver {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entry.
    pub fn with_host(mut self, host: impl Into<String>, ip: Ipv4Addr) -> Self {
        self.hosts.insert(host.into(), ip);
        self
    }
}

impl Resolve for StaticResolver {
    async fn resolve(&self, host: &str) -> Result<Ipv4Addr, ResolveError> {
        if let Some(ip) = self.hosts.get(host) {
            return Ok(*ip);
        }
        match host.parse::<IpAddr>() {
            Ok(IpAddr::V4(ip)) => Ok(ip),
            _ => Err(ResolveError::NotFound(host.to_string())),
        }
    }
}

struct PendingLookup {
    handle: SessionHandle,
    task: JoinHandle<()>,
}

/// Runs lookups for the session, one at a time.
pub struct Resolver<R: Resolve> {
    backend: Arc<R>,
    pending: Option<PendingLookup>,
}

impl<R: Resolve> Resolver<R> {
    /// Wrap a lookup backend.
    pub fn new(backend: R) -> Self {
        Self {
            backend: Arc::new(backend),
            pending: None,
        }
    }

    /// Start resolving `host` for `handle`, cancelling any lookup in flight.
    ///
    /// `on_done` receives a [`SessionEvent::Resolved`] tagged with `handle`.
    /// It is not called when the lookup is cancelled before completing.
    pub fn start<F>(&mut self, handle: SessionHandle, host: String, on_done: F)
    where
        F: FnOnce(SessionEvent) + Send + 'static,
    {
        self.cancel();

        tracing::debug!("Resolving '{host}' for session {handle:?}");
        let backend = Arc::clone(&self.backend);
        let task = tokio::spawn(async move {
            let result = backend.resolve(&host).await;
            match &result {
                Ok(ip) => tracing::debug!("Resolved '{host}' to {ip}"),
                Err(e) => tracing::debug!("Resolving '{host}' failed: {e}"),
            }
            on_done(SessionEvent::Resolved { handle, result });
        });

        self.pending = Some(PendingLookup { handle, task });
    }

    /// Best-effort cancel of the outstanding lookup, if any.
    pub fn cancel(&mut self) {
        if let Some(pending) = self.pending.take()
            && !pending.task.is_finished()
        {
            tracing::trace!("Cancelling lookup for session {:?}", pending.handle);
            pending.task.abort();
        }
    }

    /// Handle of the lookup still running, if any.
    pub fn in_flight(&self) -> Option<SessionHandle> {
        self.pending
            .as_ref()
            .filter(|p| !p.task.is_finished())
            .map(|p| p.handle)
    }
}

impl<R: Resolve> Drop for Resolver<R> {
    fn drop(&mut self) {
        self.cancel();
    }
}
