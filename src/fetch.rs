use std::fs;
use std::io;
use std::path::Path;
use std::time::Instant;

use camino::Utf8Path;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::SourceLocator;
use crate::error::GaldynError;
use crate::transport::{AttemptOutcome, TransferRequest, TransportProvider};

/// Retries after the first attempt; three attempts in total.
pub const MAX_RETRIES: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Only check that the remote resource exists; nothing is written.
    pub probe: bool,
    /// Pass the transport's quiet flag.
    pub quiet: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            probe: false,
            quiet: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    /// The destination already existed; no transfer happened.
    Cached,
    Downloaded,
    /// A probe found the resource.
    Exists,
}

/// Single-file downloader. On success the destination holds the complete
/// remote content; on error the destination is never left behind.
pub struct Fetcher<P: TransportProvider> {
    transports: P,
}

impl<P: TransportProvider> Fetcher<P> {
    pub fn new(transports: P) -> Self {
        Self { transports }
    }

    pub fn transports(&self) -> &P {
        &self.transports
    }

    pub fn fetch(
        &self,
        locator: &SourceLocator,
        destination: &Utf8Path,
        options: FetchOptions,
        sink: &dyn ProgressSink,
    ) -> Result<FetchStatus, GaldynError> {
        if !options.probe && destination.as_std_path().exists() {
            info!(path = %destination, "using cached file");
            return Ok(FetchStatus::Cached);
        }

        let name = display_name(destination);
        sink.event(ProgressEvent {
            message: format!("Downloading file {name} ..."),
        });
        let start = Instant::now();
        let result = self.download(locator, destination, &name, options);
        sink.clear();

        if let Ok(status) = result {
            info!(
                url = locator.url(),
                path = %destination,
                ?status,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "transfer finished"
            );
        }
        result
    }

    fn download(
        &self,
        locator: &SourceLocator,
        destination: &Utf8Path,
        name: &str,
        options: FetchOptions,
    ) -> Result<FetchStatus, GaldynError> {
        let transport = self.transports.transport(locator.transport())?;

        let parent = destination
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or(Utf8Path::new("."));
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| GaldynError::Filesystem(format!("create {parent}: {err}")))?;

        // Same directory as the destination so the final move is a rename.
        let temp = tempfile::Builder::new()
            .prefix(".galdyn-download")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| GaldynError::Filesystem(err.to_string()))?
            .into_temp_path();

        let mut interrupted = false;
        let mut attempt = 1u32;
        loop {
            let request = TransferRequest {
                url: locator.url(),
                output: &temp,
                probe: options.probe,
                quiet: options.quiet,
            };
            debug!(url = locator.url(), attempt, "transfer attempt");

            let (failure, not_found) = match transport.attempt(&request)? {
                AttemptOutcome::Success => {
                    // Once a non-not-found failure was seen, a later success
                    // still reports the interruption.
                    if interrupted {
                        warn!(url = locator.url(), "transfer succeeded after an interruption");
                        return Err(GaldynError::InterruptedTransfer(name.to_string()));
                    }
                    if options.probe {
                        return Ok(FetchStatus::Exists);
                    }
                    temp.persist(destination.as_std_path()).map_err(|err| {
                        GaldynError::Filesystem(format!("move to {destination}: {}", err.error))
                    })?;
                    return Ok(FetchStatus::Downloaded);
                }
                AttemptOutcome::Transient(failure) => (failure, false),
                AttemptOutcome::Permanent(failure) => (failure, true),
            };

            warn!(url = locator.url(), attempt, %failure, not_found, "transfer attempt failed");
            remove_partial(&temp)?;

            if attempt > MAX_RETRIES {
                return Err(if not_found {
                    GaldynError::ResourceNotFound(name.to_string())
                } else {
                    GaldynError::Transport {
                        name: name.to_string(),
                        message: failure.to_string(),
                    }
                });
            }
            if !not_found {
                interrupted = true;
            }
            attempt += 1;
        }
    }
}

fn remove_partial(path: &Path) -> Result<(), GaldynError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(GaldynError::Filesystem(err.to_string())),
    }
}

fn display_name(destination: &Utf8Path) -> String {
    destination
        .file_name()
        .unwrap_or(destination.as_str())
        .to_string()
}
