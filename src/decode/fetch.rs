use std::collections::HashMap;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::foundation::error::{PlayerError, PlayerResult};

const READ_CHUNK: usize = 64 * 1024;
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Cooperative cancellation flag shared between a fetch and whoever may abort it.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Cloneable handle that aborts whatever fetch is currently in flight.
///
/// Safe to use from another thread while `load` blocks.
#[derive(Clone, Debug, Default)]
pub struct AbortHandle {
    current: Arc<Mutex<Option<CancelToken>>>,
}

impl AbortHandle {
    /// Cancel the in-flight fetch. Returns `false` when nothing was in flight.
    pub fn abort(&self) -> bool {
        let slot = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub(crate) fn arm(&self) -> CancelToken {
        let token = CancelToken::new();
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
        token
    }

    pub(crate) fn disarm(&self) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Retrieves a whole media resource.
pub trait MediaFetcher: Send {
    /// Fetch every byte of `url`.
    ///
    /// Fails with `Aborted` once `cancel` fires and with `Timeout` when `timeout` elapses.
    fn fetch(&self, url: &str, cancel: &CancelToken, timeout: Duration) -> PlayerResult<Vec<u8>>;
}

/// Local paths, `file://` URLs and `http(s)://` URLs.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultFetcher;

impl MediaFetcher for DefaultFetcher {
    fn fetch(&self, url: &str, cancel: &CancelToken, timeout: Duration) -> PlayerResult<Vec<u8>> {
        if cancel.is_cancelled() {
            return Err(PlayerError::Aborted);
        }
        let deadline = Instant::now() + timeout;

        if url.starts_with("http://") || url.starts_with("https://") {
            debug!(url, "fetching over http");
            fetch_http(url, cancel, deadline, timeout)
        } else {
            let path = url.strip_prefix("file://").unwrap_or(url);
            debug!(path, "fetching from filesystem");
            let file = std::fs::File::open(path)
                .map_err(|e| PlayerError::fetch(format!("failed to open '{path}': {e}")))?;
            read_all(file, cancel, deadline, timeout)
        }
    }
}

/// Runs the request on a worker thread so a stalled connect or header wait
/// still observes `cancel` and `deadline`. An abandoned worker ends on the
/// agent's own global timeout.
fn fetch_http(
    url: &str,
    cancel: &CancelToken,
    deadline: Instant,
    timeout: Duration,
) -> PlayerResult<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    let worker_url = url.to_owned();
    let worker_cancel = cancel.clone();
    thread::Builder::new()
        .name("reelplay-fetch".into())
        .spawn(move || {
            let config = ureq::Agent::config_builder()
                .timeout_global(Some(timeout))
                .build();
            let agent = ureq::Agent::new_with_config(config);
            let result = agent
                .get(&worker_url)
                .call()
                .map_err(|e| match e {
                    ureq::Error::Timeout(_) => PlayerError::Timeout(timeout),
                    ureq::Error::StatusCode(code) => {
                        PlayerError::fetch(format!("GET {worker_url} returned HTTP {code}"))
                    }
                    other => PlayerError::fetch(format!("GET {worker_url} failed: {other}")),
                })
                .and_then(|resp| {
                    read_all(resp.into_body().into_reader(), &worker_cancel, deadline, timeout)
                });
            // The receiver is gone when the caller already gave up.
            let _ = tx.send(result);
        })
        .map_err(|e| PlayerError::fetch(format!("failed to spawn fetch worker: {e}")))?;

    loop {
        if cancel.is_cancelled() {
            debug!(url, "http fetch aborted");
            return Err(PlayerError::Aborted);
        }
        if Instant::now() >= deadline {
            return Err(PlayerError::Timeout(timeout));
        }
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(Err(_)) if Instant::now() >= deadline => {
                return Err(PlayerError::Timeout(timeout));
            }
            Ok(result) => return result,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                return Err(PlayerError::fetch(format!(
                    "GET {url} worker exited without a result"
                )));
            }
        }
    }
}

fn read_all(
    mut reader: impl Read,
    cancel: &CancelToken,
    deadline: Instant,
    timeout: Duration,
) -> PlayerResult<Vec<u8>> {
    let mut out = Vec::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        if cancel.is_cancelled() {
            return Err(PlayerError::Aborted);
        }
        if Instant::now() >= deadline {
            return Err(PlayerError::Timeout(timeout));
        }
        let n = reader.read(&mut buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                PlayerError::Timeout(timeout)
            } else {
                PlayerError::fetch(format!("read failed: {e}"))
            }
        })?;
        if n == 0 {
            return Ok(out);
        }
        out.extend_from_slice(&buf[..n]);
    }
}

/// Serves registered in-memory buffers by URL; unknown URLs are `Fetch` errors.
#[derive(Clone, Debug, Default)]
pub struct MemoryFetcher {
    entries: Arc<Mutex<HashMap<String, Arc<[u8]>>>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: impl Into<String>, bytes: impl Into<Arc<[u8]>>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.into(), bytes.into());
    }

    pub fn remove(&self, url: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(url)
            .is_some()
    }
}

impl MediaFetcher for MemoryFetcher {
    fn fetch(&self, url: &str, cancel: &CancelToken, _timeout: Duration) -> PlayerResult<Vec<u8>> {
        if cancel.is_cancelled() {
            return Err(PlayerError::Aborted);
        }
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .map(|b| b.to_vec())
            .ok_or_else(|| PlayerError::fetch(format!("no in-memory resource for '{url}'")))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/decode/fetch.rs"]
mod tests;
