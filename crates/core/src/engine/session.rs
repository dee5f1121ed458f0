//! Engine connection acquisition and session bookkeeping
//!
//! An [`EngineManager`] owns an ordered chain of [`EngineSource`]s. The
//! first source that completes the UCI handshake in time becomes the
//! cached connection; later callers reuse it until it closes.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, Notify};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::link::{EngineEndpoint, EngineLink};
use crate::error::{Error, Result};

/// Delivered by a bootstrap loader when no candidate could be started
pub const BOOTSTRAP_FAILED: &str = "stockfish-bootstrap:failed";
/// Prefix of the line a bootstrap loader sends once it found an engine
pub const BOOTSTRAP_LOADED: &str = "stockfish-bootstrap:loaded:";

const BINARY_HANDSHAKE: Duration = Duration::from_secs(3);
const LOADER_HANDSHAKE: Duration = Duration::from_secs(4);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

pub type LinkFactory = Arc<dyn Fn() -> Result<EngineLink> + Send + Sync>;

/// One way of obtaining an engine
#[derive(Clone)]
pub enum EngineSource {
    /// Local engine binary, resolved through `PATH` if not absolute
    Binary { path: PathBuf },
    /// Loader that tries local candidates, then mirrors, and reports the
    /// outcome on the link itself
    Bootstrap {
        candidates: Vec<PathBuf>,
        mirrors: Vec<String>,
    },
    /// Engine binary downloaded from a URL
    Remote { url: String },
    /// In-process engine
    Channel { label: String, factory: LinkFactory },
}

impl fmt::Debug for EngineSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EngineSource({})", self.label())
    }
}

impl EngineSource {
    pub fn binary(path: impl Into<PathBuf>) -> Self {
        EngineSource::Binary { path: path.into() }
    }

    pub fn channel<F>(label: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<EngineLink> + Send + Sync + 'static,
    {
        EngineSource::Channel {
            label: label.into(),
            factory: Arc::new(factory),
        }
    }

    pub fn label(&self) -> String {
        match self {
            EngineSource::Binary { path } => format!("binary:{}", path.display()),
            EngineSource::Bootstrap { .. } => "bootstrap".to_string(),
            EngineSource::Remote { url } => format!("remote:{}", url),
            EngineSource::Channel { label, .. } => format!("channel:{}", label),
        }
    }

    /// How long the source gets to answer `uci` with `uciok`
    pub fn handshake_timeout(&self) -> Duration {
        match self {
            EngineSource::Binary { .. } => BINARY_HANDSHAKE,
            _ => LOADER_HANDSHAKE,
        }
    }

    /// Opens a raw link, without any handshake
    pub async fn open(&self) -> Result<EngineLink> {
        match self {
            EngineSource::Binary { path } => EngineLink::spawn_process(path),
            EngineSource::Bootstrap { candidates, mirrors } => {
                Ok(bootstrap_link(candidates.clone(), mirrors.clone()))
            }
            EngineSource::Remote { url } => {
                let path = download_engine(url).await?;
                EngineLink::spawn_process(&path)
            }
            EngineSource::Channel { factory, .. } => factory(),
        }
    }
}

/// Starts a loader task and hands back its link immediately.
///
/// Commands sent while the loader is still searching queue up and are
/// forwarded once an engine is running.
fn bootstrap_link(candidates: Vec<PathBuf>, mirrors: Vec<String>) -> EngineLink {
    let (link, endpoint) = EngineLink::pair();

    tokio::spawn(async move {
        for path in &candidates {
            if !is_file(path).await {
                debug!(candidate = %path.display(), "bootstrap candidate missing");
                continue;
            }
            match EngineLink::spawn_process(path) {
                Ok(engine) => {
                    endpoint.deliver(format!("{}{}", BOOTSTRAP_LOADED, path.display()));
                    bridge(endpoint, engine).await;
                    return;
                }
                Err(e) => warn!(candidate = %path.display(), "bootstrap candidate failed: {}", e),
            }
        }

        for url in &mirrors {
            let started = match download_engine(url).await {
                Ok(path) => EngineLink::spawn_process(&path),
                Err(e) => Err(e),
            };
            match started {
                Ok(engine) => {
                    endpoint.deliver(format!("{}{}", BOOTSTRAP_LOADED, url));
                    bridge(endpoint, engine).await;
                    return;
                }
                Err(e) => warn!(mirror = url.as_str(), "bootstrap mirror failed: {}", e),
            }
        }

        endpoint.deliver(BOOTSTRAP_FAILED);
    });

    link
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

/// Relays traffic between the loader's endpoint and the engine it started
async fn bridge(mut outer: EngineEndpoint, mut engine: EngineLink) {
    loop {
        tokio::select! {
            cmd = outer.commands.recv() => match cmd {
                Some(cmd) => {
                    if engine.send(&cmd).is_err() {
                        break;
                    }
                }
                None => break,
            },
            line = engine.next_line() => match line {
                Some(line) => {
                    if !outer.deliver(line) {
                        break;
                    }
                }
                None => break,
            },
        }
    }
}

async fn download_engine(url: &str) -> Result<PathBuf> {
    let client = reqwest::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .build()?;
    let bytes = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;

    let mut hasher = DefaultHasher::new();
    url.hash(&mut hasher);
    let path = std::env::temp_dir().join(format!("position-trainer-engine-{:016x}", hasher.finish()));

    tokio::fs::write(&path, &bytes).await?;
    make_executable(&path).await?;
    info!(url, path = %path.display(), bytes = bytes.len(), "downloaded engine");
    Ok(path)
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Sends `uci` and waits for `uciok`.
///
/// A bootstrap failure line ends the wait immediately.
pub async fn handshake(link: &mut EngineLink, limit: Duration) -> Result<()> {
    link.send("uci")?;

    let wait = async {
        while let Some(line) = link.next_line().await {
            if line == "uciok" {
                return Ok(());
            }
            if line.starts_with(BOOTSTRAP_FAILED) {
                return Err(Error::BootstrapFailed);
            }
            if let Some(source) = line.strip_prefix(BOOTSTRAP_LOADED) {
                info!(source, "engine bootstrap loaded");
            }
        }
        Err(Error::Disconnected)
    };

    timeout(limit, wait).await.unwrap_or(Err(Error::HandshakeTimeout))
}

/// A live engine, shared by everything that analyses
pub struct EngineConnection {
    label: String,
    link: Mutex<EngineLink>,
    busy: AtomicBool,
    closed: AtomicBool,
    /// A `go` was sent whose `bestmove` has not been read yet
    search_pending: AtomicBool,
    stop: std::sync::Mutex<Option<Arc<Notify>>>,
}

impl EngineConnection {
    /// Opens `source` and performs the handshake within its time limit
    pub async fn open(source: &EngineSource) -> Result<Self> {
        let mut link = source.open().await?;
        handshake(&mut link, source.handshake_timeout()).await?;
        Ok(Self::new(source.label(), link))
    }

    /// Wraps an already established link
    pub fn new(label: impl Into<String>, link: EngineLink) -> Self {
        Self {
            label: label.into(),
            link: Mutex::new(link),
            busy: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            search_pending: AtomicBool::new(false),
            stop: std::sync::Mutex::new(None),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// True while an analysis session is in flight
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return true;
        }
        self.link
            .try_lock()
            .map(|link| link.is_closed())
            .unwrap_or(false)
    }

    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub(crate) fn search_pending(&self) -> bool {
        self.search_pending.load(Ordering::Acquire)
    }

    pub(crate) fn set_search_pending(&self, pending: bool) {
        self.search_pending.store(pending, Ordering::Release);
    }

    /// Claims the connection for one analysis session
    pub(crate) fn begin_session(&self) -> Result<SessionGuard<'_>> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::EngineBusy);
        }

        let stop = Arc::new(Notify::new());
        *self.stop_slot() = Some(stop.clone());
        Ok(SessionGuard {
            connection: self,
            stop,
        })
    }

    /// Asks the running session, if any, to stop searching.
    ///
    /// Returns false when nothing was running.
    pub fn stop(&self) -> bool {
        match self.stop_slot().as_ref() {
            Some(stop) => {
                stop.notify_one();
                true
            }
            None => false,
        }
    }

    pub(crate) async fn link(&self) -> MutexGuard<'_, EngineLink> {
        self.link.lock().await
    }

    fn stop_slot(&self) -> std::sync::MutexGuard<'_, Option<Arc<Notify>>> {
        self.stop.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Held for the duration of a session; releases the busy flag on drop
pub(crate) struct SessionGuard<'a> {
    connection: &'a EngineConnection,
    pub(crate) stop: Arc<Notify>,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.connection.stop_slot().take();
        self.connection.busy.store(false, Ordering::Release);
    }
}

/// Acquires and caches the engine connection
pub struct EngineManager {
    sources: Vec<EngineSource>,
    current: Mutex<Option<Arc<EngineConnection>>>,
}

impl EngineManager {
    pub fn new(sources: Vec<EngineSource>) -> Self {
        Self {
            sources,
            current: Mutex::new(None),
        }
    }

    /// Returns the cached connection, or walks the source chain for a new one
    pub async fn connection(&self) -> Result<Arc<EngineConnection>> {
        let mut current = self.current.lock().await;

        if let Some(connection) = current.as_ref() {
            if !connection.is_closed() {
                return Ok(connection.clone());
            }
            info!(engine = connection.label(), "cached engine connection closed, reconnecting");
        }
        *current = None;

        for source in &self.sources {
            match EngineConnection::open(source).await {
                Ok(connection) => {
                    info!(engine = connection.label(), "engine connected");
                    let connection = Arc::new(connection);
                    *current = Some(connection.clone());
                    return Ok(connection);
                }
                Err(e) => warn!(source = %source.label(), "engine source failed: {}", e),
            }
        }

        Err(Error::ConnectionUnavailable)
    }

    /// The cached connection, without trying to acquire one
    pub async fn current(&self) -> Option<Arc<EngineConnection>> {
        self.current.lock().await.clone()
    }

    /// Stops the running analysis, if any
    pub async fn stop(&self) -> bool {
        match self.current().await {
            Some(connection) => connection.stop(),
            None => false,
        }
    }
}
