use std::collections::VecDeque;
use std::fs;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};

use galdyn_data::app::{ProgressEvent, ProgressSink};
use galdyn_data::domain::{SourceLocator, TransportKind};
use galdyn_data::error::GaldynError;
use galdyn_data::fetch::{FetchOptions, FetchStatus, Fetcher};
use galdyn_data::transport::{
    AttemptOutcome, SingleTransport, TransferRequest, Transport, TransportFailure,
};

const PAYLOAD: &[u8] = b"NGC 104   47 Tuc\n";

#[derive(Debug, Clone, Copy)]
enum Step {
    Success,
    Transient,
    Permanent,
    SpawnError,
}

/// Plays back a fixed sequence of outcomes; the last one repeats.
struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    calls: Mutex<usize>,
}

impl ScriptedTransport {
    fn new(steps: &[Step]) -> Self {
        Self {
            steps: Mutex::new(steps.iter().copied().collect()),
            calls: Mutex::new(0),
        }
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

fn failure(status: i32) -> TransportFailure {
    TransportFailure {
        status: Some(status),
        message: "scripted".to_string(),
    }
}

impl Transport for ScriptedTransport {
    fn attempt(&self, request: &TransferRequest<'_>) -> Result<AttemptOutcome, GaldynError> {
        *self.calls.lock().unwrap() += 1;
        let step = {
            let mut steps = self.steps.lock().unwrap();
            if steps.len() > 1 {
                steps.pop_front().unwrap()
            } else {
                *steps.front().unwrap()
            }
        };
        match step {
            Step::Success => {
                if !request.probe {
                    fs::write(request.output, PAYLOAD).unwrap();
                }
                Ok(AttemptOutcome::Success)
            }
            Step::Transient => {
                if !request.probe {
                    fs::write(request.output, &PAYLOAD[..4]).unwrap();
                }
                Ok(AttemptOutcome::Transient(failure(8)))
            }
            Step::Permanent => Ok(AttemptOutcome::Permanent(failure(4))),
            Step::SpawnError => Err(GaldynError::MissingTool("wget".to_string())),
        }
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<String>>,
    cleared: Mutex<usize>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event.message);
    }

    fn clear(&self) {
        *self.cleared.lock().unwrap() += 1;
    }
}

fn locator() -> SourceLocator {
    SourceLocator::new("http://example.org/mwgc.dat", TransportKind::Wget)
}

fn destination(dir: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().join("harris").join("mwgc.dat")).unwrap()
}

fn leftovers(dir: &Utf8Path) -> Vec<String> {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .filter(|name| name.starts_with(".galdyn-download"))
            .collect(),
        Err(_) => Vec::new(),
    }
}

fn run(
    steps: &[Step],
    options: FetchOptions,
) -> (
    tempfile::TempDir,
    Utf8PathBuf,
    Fetcher<SingleTransport<ScriptedTransport>>,
    Result<FetchStatus, GaldynError>,
) {
    let dir = tempfile::tempdir().unwrap();
    let dest = destination(&dir);
    let fetcher = Fetcher::new(SingleTransport(ScriptedTransport::new(steps)));
    let result = fetcher.fetch(&locator(), &dest, options, &RecordingSink::default());
    (dir, dest, fetcher, result)
}

#[test]
fn first_attempt_success_places_file() {
    let (_dir, dest, fetcher, result) = run(&[Step::Success], FetchOptions::default());
    assert_matches!(result, Ok(FetchStatus::Downloaded));
    assert_eq!(fs::read(&dest).unwrap(), PAYLOAD);
    assert_eq!(fetcher.transports().0.calls(), 1);
    assert!(leftovers(dest.parent().unwrap()).is_empty());
}

#[test]
fn existing_destination_is_not_touched() {
    let dir = tempfile::tempdir().unwrap();
    let dest = destination(&dir);
    fs::create_dir_all(dest.parent().unwrap()).unwrap();
    fs::write(&dest, b"already here").unwrap();

    let fetcher = Fetcher::new(SingleTransport(ScriptedTransport::new(&[Step::Success])));
    let sink = RecordingSink::default();
    let status = fetcher
        .fetch(&locator(), &dest, FetchOptions::default(), &sink)
        .unwrap();

    assert_eq!(status, FetchStatus::Cached);
    assert_eq!(fs::read(&dest).unwrap(), b"already here");
    assert_eq!(fetcher.transports().0.calls(), 0);
    assert!(sink.events.lock().unwrap().is_empty());
}

#[test]
fn progress_line_is_cleared_after_transfer() {
    let dir = tempfile::tempdir().unwrap();
    let dest = destination(&dir);
    let fetcher = Fetcher::new(SingleTransport(ScriptedTransport::new(&[Step::Success])));
    let sink = RecordingSink::default();
    fetcher
        .fetch(&locator(), &dest, FetchOptions::default(), &sink)
        .unwrap();

    assert_eq!(
        *sink.events.lock().unwrap(),
        vec!["Downloading file mwgc.dat ...".to_string()]
    );
    assert_eq!(*sink.cleared.lock().unwrap(), 1);
}

#[test]
fn not_found_then_success_downloads() {
    let (_dir, dest, fetcher, result) =
        run(&[Step::Permanent, Step::Success], FetchOptions::default());
    assert_matches!(result, Ok(FetchStatus::Downloaded));
    assert_eq!(fs::read(&dest).unwrap(), PAYLOAD);
    assert_eq!(fetcher.transports().0.calls(), 2);
}

#[test]
fn persistent_not_found_stops_after_three_attempts() {
    let (_dir, dest, fetcher, result) = run(&[Step::Permanent], FetchOptions::default());
    assert_matches!(result, Err(GaldynError::ResourceNotFound(name)) if name == "mwgc.dat");
    assert_eq!(fetcher.transports().0.calls(), 3);
    assert!(!dest.exists());
    assert!(leftovers(dest.parent().unwrap()).is_empty());
}

#[test]
fn persistent_transient_failure_is_a_transport_error() {
    let (_dir, dest, fetcher, result) = run(&[Step::Transient], FetchOptions::default());
    assert_matches!(result, Err(GaldynError::Transport { name, .. }) if name == "mwgc.dat");
    assert_eq!(fetcher.transports().0.calls(), 3);
    assert!(!dest.exists());
    assert!(leftovers(dest.parent().unwrap()).is_empty());
}

#[test]
fn last_failure_decides_the_error_kind() {
    let (_dir, _dest, _fetcher, result) = run(
        &[Step::Transient, Step::Transient, Step::Permanent],
        FetchOptions::default(),
    );
    assert_matches!(result, Err(GaldynError::ResourceNotFound(_)));
}

#[test]
fn success_after_interruption_is_reported_as_interrupted() {
    let (_dir, dest, fetcher, result) =
        run(&[Step::Transient, Step::Success], FetchOptions::default());
    assert_matches!(result, Err(GaldynError::InterruptedTransfer(name)) if name == "mwgc.dat");
    assert_eq!(fetcher.transports().0.calls(), 2);
    assert!(!dest.exists());
    assert!(leftovers(dest.parent().unwrap()).is_empty());
}

#[test]
fn interruption_sticks_across_not_found() {
    let (_dir, dest, _fetcher, result) = run(
        &[Step::Transient, Step::Permanent, Step::Success],
        FetchOptions::default(),
    );
    assert_matches!(result, Err(GaldynError::InterruptedTransfer(_)));
    assert!(!dest.exists());
}

#[test]
fn probe_never_writes_destination() {
    let options = FetchOptions {
        probe: true,
        quiet: true,
    };
    let (_dir, dest, fetcher, result) = run(&[Step::Success], options);
    assert_matches!(result, Ok(FetchStatus::Exists));
    assert!(!dest.exists());
    assert_eq!(fetcher.transports().0.calls(), 1);
    assert!(leftovers(dest.parent().unwrap()).is_empty());
}

#[test]
fn probe_ignores_cached_file() {
    let dir = tempfile::tempdir().unwrap();
    let dest = destination(&dir);
    fs::create_dir_all(dest.parent().unwrap()).unwrap();
    fs::write(&dest, b"old").unwrap();

    let fetcher = Fetcher::new(SingleTransport(ScriptedTransport::new(&[Step::Permanent])));
    let options = FetchOptions {
        probe: true,
        quiet: true,
    };
    let result = fetcher.fetch(&locator(), &dest, options, &RecordingSink::default());

    assert_matches!(result, Err(GaldynError::ResourceNotFound(_)));
    assert_eq!(fs::read(&dest).unwrap(), b"old");
    assert_eq!(fetcher.transports().0.calls(), 3);
}

#[test]
fn spawn_failure_aborts_immediately() {
    let (_dir, dest, fetcher, result) = run(&[Step::SpawnError], FetchOptions::default());
    assert_matches!(result, Err(GaldynError::MissingTool(_)));
    assert_eq!(fetcher.transports().0.calls(), 1);
    assert!(!dest.exists());
}
