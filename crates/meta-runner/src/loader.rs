//! Program acquisition.
//!
//! Loading happens in two stages. Acquiring the bytes (reading a file,
//! fetching a URL) runs on a worker thread and ends with the result being
//! delivered back to the event loop. Loading the bytes into a fresh engine
//! then happens on the event loop, in the scheduler.
//!
//! Every request carries a ticket. Starting a new request cancels the
//! previous one, and a result whose ticket is no longer current is dropped
//! when it arrives, so a slow download can never replace a newer program.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;

use meta_core::EngineError;
use thiserror::Error;

/// Where a program image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramSource {
    Path(PathBuf),
    Url(String),
    /// Bytes already in memory (file dialog, dropped file).
    Bytes { name: String, data: Vec<u8> },
}

impl ProgramSource {
    /// Interpret a configured source string: `http://` and `https://` are
    /// URLs, anything else is a path.
    #[must_use]
    pub fn parse(source: &str) -> Self {
        let lower = source.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Self::Url(source.to_owned())
        } else {
            Self::Path(PathBuf::from(source))
        }
    }
}

impl fmt::Display for ProgramSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Url(url) => f.write_str(url),
            Self::Bytes { name, .. } => f.write_str(name),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot fetch {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("program image is empty")]
    Empty,

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Acquire the bytes of `source`, blocking.
pub fn acquire(source: &ProgramSource) -> Result<Vec<u8>, LoadError> {
    let data = match source {
        ProgramSource::Path(path) => read_file(path)?,
        ProgramSource::Url(url) => fetch(url)?,
        ProgramSource::Bytes { data, .. } => data.clone(),
    };
    if data.is_empty() {
        return Err(LoadError::Empty);
    }
    Ok(data)
}

fn read_file(path: &Path) -> Result<Vec<u8>, LoadError> {
    std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_owned(),
        source,
    })
}

fn fetch(url: &str) -> Result<Vec<u8>, LoadError> {
    let http = |source| LoadError::Http {
        url: url.to_owned(),
        source,
    };
    let response = reqwest::blocking::get(url).map_err(http)?;
    let status = response.status();
    if !status.is_success() {
        return Err(LoadError::Status {
            url: url.to_owned(),
            status: status.as_u16(),
        });
    }
    Ok(response.bytes().map_err(http)?.to_vec())
}

/// Identifies one load request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

/// Outcome of stage one, on its way back to the event loop.
#[derive(Debug)]
pub struct AcquiredProgram {
    pub ticket: Ticket,
    /// Human-readable origin, for logging.
    pub origin: String,
    pub result: Result<Vec<u8>, LoadError>,
}

/// Channel back to the thread that owns the scheduler.
pub trait Deliver: Clone + Send + 'static {
    fn deliver(&self, program: AcquiredProgram);
}

impl Deliver for mpsc::Sender<AcquiredProgram> {
    fn deliver(&self, program: AcquiredProgram) {
        if self.send(program).is_err() {
            log::debug!("Load result dropped: receiver gone");
        }
    }
}

/// Issues tickets and runs acquisitions.
pub struct ProgramLoader<D> {
    deliver: D,
    next_ticket: u64,
    current: Option<(Ticket, Arc<AtomicBool>)>,
}

impl<D: Deliver> ProgramLoader<D> {
    pub fn new(deliver: D) -> Self {
        Self {
            deliver,
            next_ticket: 0,
            current: None,
        }
    }

    /// Start acquiring `source`, superseding any request in flight.
    ///
    /// In-memory bytes are delivered immediately from the calling thread.
    pub fn request(&mut self, source: ProgramSource) -> Ticket {
        self.cancel();
        self.next_ticket += 1;
        let ticket = Ticket(self.next_ticket);
        let cancelled = Arc::new(AtomicBool::new(false));
        self.current = Some((ticket, Arc::clone(&cancelled)));

        let origin = source.to_string();
        log::info!("Loading {origin}");

        if let ProgramSource::Bytes { .. } = source {
            let result = acquire(&source);
            self.deliver.deliver(AcquiredProgram {
                ticket,
                origin,
                result,
            });
            return ticket;
        }

        let deliver = self.deliver.clone();
        let spawned = thread::Builder::new()
            .name("program-loader".into())
            .spawn(move || {
                let result = acquire(&source);
                if cancelled.load(Ordering::Acquire) {
                    log::debug!("Discarding superseded load of {origin}");
                    return;
                }
                deliver.deliver(AcquiredProgram {
                    ticket,
                    origin,
                    result,
                });
            });
        if let Err(e) = spawned {
            log::error!("Cannot start loader thread: {e}");
            self.current = None;
        }
        ticket
    }

    /// Cancel the request in flight, if any.
    pub fn cancel(&mut self) {
        if let Some((_, cancelled)) = self.current.take() {
            cancelled.store(true, Ordering::Release);
        }
    }

    /// The request whose result would currently be accepted.
    #[must_use]
    pub fn current(&self) -> Option<Ticket> {
        self.current.as_ref().map(|(ticket, _)| *ticket)
    }

    /// Claim a delivered result. Returns `None` for a superseded or
    /// cancelled ticket, whose bytes must not be loaded.
    pub fn accept(&mut self, program: AcquiredProgram) -> Option<Result<Vec<u8>, LoadError>> {
        if self.current() != Some(program.ticket) {
            log::debug!("Ignoring stale load of {}", program.origin);
            return None;
        }
        self.current = None;
        Some(program.result)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn loader() -> (
        ProgramLoader<mpsc::Sender<AcquiredProgram>>,
        mpsc::Receiver<AcquiredProgram>,
    ) {
        let (tx, rx) = mpsc::channel();
        (ProgramLoader::new(tx), rx)
    }

    fn recv(rx: &mpsc::Receiver<AcquiredProgram>) -> AcquiredProgram {
        rx.recv_timeout(Duration::from_secs(10)).unwrap()
    }

    #[test]
    fn parses_urls_and_paths() {
        assert_eq!(
            ProgramSource::parse("https://example.com/a.bin"),
            ProgramSource::Url("https://example.com/a.bin".into())
        );
        assert_eq!(
            ProgramSource::parse("HTTP://example.com/a.bin"),
            ProgramSource::Url("HTTP://example.com/a.bin".into())
        );
        assert_eq!(
            ProgramSource::parse("games/a.bin"),
            ProgramSource::Path("games/a.bin".into())
        );
    }

    #[test]
    fn reads_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.bin");
        std::fs::write(&path, [1, 2, 3]).unwrap();
        assert_eq!(acquire(&ProgramSource::Path(path)).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = acquire(&ProgramSource::Path(dir.path().join("nope.bin"))).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn empty_image_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.bin");
        std::fs::write(&path, []).unwrap();
        assert!(matches!(
            acquire(&ProgramSource::Path(path)),
            Err(LoadError::Empty)
        ));
        assert!(matches!(
            acquire(&ProgramSource::Bytes {
                name: "x".into(),
                data: Vec::new()
            }),
            Err(LoadError::Empty)
        ));
    }

    #[test]
    fn unreachable_url_fails() {
        let err = acquire(&ProgramSource::Url("http://127.0.0.1:1/game.bin".into())).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Http { .. } | LoadError::Status { .. }
        ));
    }

    #[test]
    fn bytes_are_delivered_immediately() {
        let (mut loader, rx) = loader();
        let ticket = loader.request(ProgramSource::Bytes {
            name: "dropped.bin".into(),
            data: vec![9; 4],
        });
        let program = rx.try_recv().unwrap();
        assert_eq!(program.ticket, ticket);
        assert_eq!(loader.accept(program).unwrap().unwrap(), vec![9; 4]);
        assert_eq!(loader.current(), None);
    }

    #[test]
    fn file_is_read_on_a_worker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.bin");
        std::fs::write(&path, [7; 10]).unwrap();

        let (mut loader, rx) = loader();
        loader.request(ProgramSource::Path(path));
        let program = recv(&rx);
        assert_eq!(program.origin, dir.path().join("game.bin").display().to_string());
        assert_eq!(loader.accept(program).unwrap().unwrap(), vec![7; 10]);
    }

    #[test]
    fn newer_request_supersedes_older() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old.bin");
        let new = dir.path().join("new.bin");
        std::fs::write(&old, [1]).unwrap();
        std::fs::write(&new, [2]).unwrap();

        let (mut loader, rx) = loader();
        let first = loader.request(ProgramSource::Path(old));
        let second = loader.request(ProgramSource::Path(new));
        assert_ne!(first, second);

        // The first result may or may not have been sent before the cancel;
        // either way only the second is accepted.
        let mut accepted = Vec::new();
        while loader.current().is_some() {
            if let Some(result) = loader.accept(recv(&rx)) {
                accepted.push(result.unwrap());
            }
        }
        assert_eq!(accepted, vec![vec![2]]);
    }

    #[test]
    fn cancelled_result_is_not_accepted() {
        let (mut loader, rx) = loader();
        loader.request(ProgramSource::Bytes {
            name: "a".into(),
            data: vec![1],
        });
        loader.cancel();
        assert!(loader.accept(rx.try_recv().unwrap()).is_none());
    }
}
