//! # Probe Session
//!
//! Per-control probe state. Handles are connected lazily on first use and
//! released once the session is closed and no provider call still holds
//! them. Results (including failures) are memoized by
//! `(kind, parameters, query)` so an identical probe reaches its provider
//! at most once per control. A panicking provider yields an error, never
//! an unwind into the caller.

use crate::strategies::{ProbeError, ProbeRequest, ProviderHandle, ProviderRegistry, ResourceProvider};
use crate::types::ProbeValue;
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

/// A connected handle, released when the last holder drops it
///
/// A timed-out call keeps its own clone, so the provider never sees
/// `release` for a handle that a `fetch` is still using.
struct HandleLease {
    provider: Arc<dyn ResourceProvider>,
    handle: ProviderHandle,
}

impl Drop for HandleLease {
    fn drop(&mut self) {
        self.provider.release(Arc::clone(&self.handle));
    }
}

pub struct ProbeSession<'a> {
    registry: &'a ProviderRegistry,
    timeout: Option<Duration>,
    handles: BTreeMap<String, Arc<HandleLease>>,
    failed_connections: HashMap<String, ProbeError>,
    cache: HashMap<String, Result<ProbeValue, ProbeError>>,
    provider_calls: usize,
}

impl<'a> ProbeSession<'a> {
    pub fn new(registry: &'a ProviderRegistry, timeout: Option<Duration>) -> Self {
        Self {
            registry,
            timeout,
            handles: BTreeMap::new(),
            failed_connections: HashMap::new(),
            cache: HashMap::new(),
            provider_calls: 0,
        }
    }

    /// Fetch a probe value, memoized for the lifetime of the session
    pub fn fetch(&mut self, request: &ProbeRequest) -> Result<ProbeValue, ProbeError> {
        let fingerprint = request.fingerprint();
        if let Some(cached) = self.cache.get(&fingerprint) {
            debug!("Probe cache hit for {} '{}'", request.kind, request.query);
            return cached.clone();
        }

        let outcome = self.fetch_uncached(request);
        self.cache.insert(fingerprint, outcome.clone());
        outcome
    }

    fn fetch_uncached(&mut self, request: &ProbeRequest) -> Result<ProbeValue, ProbeError> {
        let lease = self.handle_for(request)?;
        let query = request.query.clone();
        let start = Instant::now();

        self.provider_calls += 1;
        let outcome = run_bounded(&request.kind, self.timeout, move || {
            lease.provider.fetch(&lease.handle, &query)
        });

        debug!(
            "Probe {} completed in {}ms ({})",
            request.kind,
            start.elapsed().as_millis(),
            if outcome.is_ok() { "ok" } else { "error" }
        );
        outcome
    }

    fn handle_for(
        &mut self,
        request: &ProbeRequest,
    ) -> Result<Arc<HandleLease>, ProbeError> {
        let key = request.connection_key();
        if let Some(lease) = self.handles.get(&key) {
            return Ok(Arc::clone(lease));
        }
        if let Some(error) = self.failed_connections.get(&key) {
            return Err(error.clone());
        }

        let provider = self.registry.get(&request.kind)?;
        let connect_provider = Arc::clone(&provider);
        let parameters = request.parameters.clone();
        let connected = run_bounded(&request.kind, self.timeout, move || {
            connect_provider.connect(&parameters)
        });

        match connected {
            Ok(handle) => {
                debug!("Connected {} handle", request.kind);
                let lease = Arc::new(HandleLease { provider, handle });
                self.handles.insert(key, Arc::clone(&lease));
                Ok(lease)
            }
            Err(error) => {
                warn!("Failed to connect {}: {}", request.kind, error);
                self.failed_connections.insert(key, error.clone());
                Err(error)
            }
        }
    }

    /// Number of fetches that reached a provider
    pub fn provider_calls(&self) -> usize {
        self.provider_calls
    }

    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    /// Drop the session's hold on every handle
    ///
    /// Handles not in use are released immediately; one still held by a
    /// timed-out call is released when that call returns.
    pub fn close(&mut self) {
        self.handles.clear();
    }
}

impl Drop for ProbeSession<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Run a provider call on a helper thread, bounded by `timeout`
///
/// On timeout the helper is left to finish on its own; the caller gets a
/// `Timeout` error immediately. Without a timeout the call runs inline.
fn run_bounded<T, F>(kind: &str, timeout: Option<Duration>, call: F) -> Result<T, ProbeError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ProbeError> + Send + 'static,
{
    let timeout = match timeout {
        Some(timeout) => timeout,
        None => return call_guarded(kind, call),
    };

    let (sender, receiver) = mpsc::channel();
    let helper_kind = kind.to_string();
    thread::Builder::new()
        .name(format!("probe-{}", kind))
        .spawn(move || {
            let _ = sender.send(call_guarded(&helper_kind, call));
        })
        .map_err(|e| ProbeError::unavailable(kind, format!("cannot spawn probe thread: {}", e)))?;

    match receiver.recv_timeout(timeout) {
        Ok(outcome) => outcome,
        Err(mpsc::RecvTimeoutError::Timeout) => {
            warn!("Probe {} exceeded {}ms", kind, timeout.as_millis());
            Err(ProbeError::Timeout {
                kind: kind.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(ProbeError::unavailable(
            kind,
            "probe thread terminated without a result",
        )),
    }
}

/// Run a provider call, turning a panic into a probe error
fn call_guarded<T, F>(kind: &str, call: F) -> Result<T, ProbeError>
where
    F: FnOnce() -> Result<T, ProbeError>,
{
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!("Provider {} panicked", kind);
            Err(ProbeError::unavailable(kind, "provider panicked"))
        }
    }
}
