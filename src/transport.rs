use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::debug;

use crate::config::ResolvedConfig;
use crate::domain::TransportKind;
use crate::error::GaldynError;

/// wget reports a missing remote file with this exit status.
pub const WGET_NOT_FOUND_EXIT: i32 = 4;
/// curl exit status for an HTTP error response when run with `--fail`.
pub const CURL_HTTP_ERROR_EXIT: i32 = 22;
/// HTTP statuses that mean the resource is not on the server.
pub const NOT_FOUND_STATUSES: [u16; 2] = [404, 410];

/// One transfer attempt: fetch `url` into `output`, or only check that it
/// exists when `probe` is set.
#[derive(Debug, Clone, Copy)]
pub struct TransferRequest<'a> {
    pub url: &'a str,
    pub output: &'a Path,
    pub probe: bool,
    pub quiet: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    pub status: Option<i32>,
    pub message: String,
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "exit status {status}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Result of a single attempt. `Permanent` is the not-found signal; anything
/// else that went wrong is `Transient`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Transient(TransportFailure),
    Permanent(TransportFailure),
}

pub trait Transport: Send + Sync {
    /// Runs one attempt. `Err` means the transport could not be started at
    /// all, which is never retried.
    fn attempt(&self, request: &TransferRequest<'_>) -> Result<AttemptOutcome, GaldynError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn attempt(&self, request: &TransferRequest<'_>) -> Result<AttemptOutcome, GaldynError> {
        (**self).attempt(request)
    }
}

/// Hands out the transport matching a locator's hint.
pub trait TransportProvider: Send + Sync {
    fn transport(&self, kind: TransportKind) -> Result<&dyn Transport, GaldynError>;
}

/// Uses the same transport whatever the hint says.
pub struct SingleTransport<T: Transport>(pub T);

impl<T: Transport> TransportProvider for SingleTransport<T> {
    fn transport(&self, _kind: TransportKind) -> Result<&dyn Transport, GaldynError> {
        Ok(&self.0)
    }
}

pub struct SystemTransports {
    wget: CommandTransport,
    curl: CommandTransport,
    http: HttpTransport,
    preferred: Option<TransportKind>,
}

impl SystemTransports {
    pub fn new(config: &ResolvedConfig) -> Result<Self, GaldynError> {
        Ok(Self {
            wget: CommandTransport::wget(config.timeout, config.transport_retries),
            curl: CommandTransport::curl(config.timeout, config.transport_retries),
            http: HttpTransport::new(config.timeout, config.transport_retries)?,
            preferred: config.transport,
        })
    }

    pub fn http(&self) -> &HttpTransport {
        &self.http
    }
}

impl TransportProvider for SystemTransports {
    fn transport(&self, kind: TransportKind) -> Result<&dyn Transport, GaldynError> {
        Ok(match self.preferred.unwrap_or(kind) {
            TransportKind::Wget => &self.wget,
            TransportKind::Curl => &self.curl,
            TransportKind::Http => &self.http,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandTool {
    Wget,
    Curl,
}

impl CommandTool {
    fn program_name(self) -> &'static str {
        match self {
            CommandTool::Wget => "wget",
            CommandTool::Curl => "curl",
        }
    }
}

/// Shells out to wget or curl, one process per attempt.
#[derive(Debug, Clone)]
pub struct CommandTransport {
    tool: CommandTool,
    program: Option<PathBuf>,
    timeout: Duration,
    retries: u32,
}

impl CommandTransport {
    pub fn wget(timeout: Duration, retries: u32) -> Self {
        Self::with_tool(CommandTool::Wget, timeout, retries)
    }

    pub fn curl(timeout: Duration, retries: u32) -> Self {
        Self::with_tool(CommandTool::Curl, timeout, retries)
    }

    fn with_tool(tool: CommandTool, timeout: Duration, retries: u32) -> Self {
        Self {
            tool,
            program: find_in_path(tool.program_name()),
            timeout,
            retries,
        }
    }

    fn require_program(&self) -> Result<&PathBuf, GaldynError> {
        self.program
            .as_ref()
            .ok_or_else(|| GaldynError::MissingTool(self.tool.program_name().to_string()))
    }

    fn args(&self, request: &TransferRequest<'_>) -> Vec<String> {
        let timeout = self.timeout.as_secs().max(1).to_string();
        let output = request.output.to_string_lossy().to_string();
        match self.tool {
            CommandTool::Wget => {
                let mut args = vec![
                    request.url.to_string(),
                    "-O".to_string(),
                    output,
                    format!("--read-timeout={timeout}"),
                    format!("--tries={}", self.retries),
                ];
                if request.quiet {
                    args.push("-q".to_string());
                }
                if request.probe {
                    args.push("--spider".to_string());
                }
                args
            }
            CommandTool::Curl => {
                let mut args = vec![
                    request.url.to_string(),
                    "-o".to_string(),
                    output,
                    "--connect-timeout".to_string(),
                    timeout,
                    "--retry".to_string(),
                    self.retries.to_string(),
                    "--fail".to_string(),
                    "--write-out".to_string(),
                    "%{http_code}".to_string(),
                ];
                if request.quiet {
                    args.push("--silent".to_string());
                    args.push("--show-error".to_string());
                }
                if request.probe {
                    args.push("--head".to_string());
                }
                args
            }
        }
    }

    /// `stdout` only matters for curl, where `--write-out` leaves the HTTP
    /// status there; exit 22 alone covers every status from 400 up.
    fn classify(&self, status: Option<i32>, stdout: &str, stderr: &str) -> AttemptOutcome {
        let message = if stderr.is_empty() {
            format!("{} failed", self.tool.program_name())
        } else {
            stderr.to_string()
        };
        let not_found = match self.tool {
            CommandTool::Wget => status == Some(WGET_NOT_FOUND_EXIT),
            CommandTool::Curl => {
                status == Some(CURL_HTTP_ERROR_EXIT)
                    && stdout
                        .trim()
                        .parse::<u16>()
                        .is_ok_and(|code| NOT_FOUND_STATUSES.contains(&code))
            }
        };
        let failure = TransportFailure { status, message };
        if not_found {
            AttemptOutcome::Permanent(failure)
        } else {
            AttemptOutcome::Transient(failure)
        }
    }
}

impl Transport for CommandTransport {
    fn attempt(&self, request: &TransferRequest<'_>) -> Result<AttemptOutcome, GaldynError> {
        let program = self.require_program()?;
        let args = self.args(request);
        debug!(program = %program.display(), ?args, "running transport");

        // The tool's own progress output stays on the terminal unless quiet.
        let stderr = if request.quiet {
            Stdio::piped()
        } else {
            Stdio::inherit()
        };
        let output = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(stderr)
            .output()
            .map_err(|err| GaldynError::MissingTool(format!("{}: {err}", program.display())))?;

        if output.status.success() {
            return Ok(AttemptOutcome::Success);
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        Ok(self.classify(output.status.code(), &stdout, stderr.trim()))
    }
}

/// In-process HTTP transfers; the request-level retries play the role of
/// the external tools' own retry count.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    retries: u32,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration, retries: u32) -> Result<Self, GaldynError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("galdyn-data/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| GaldynError::Filesystem(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|err| GaldynError::Transport {
                name: "http client".to_string(),
                message: err.to_string(),
            })?;
        Ok(Self {
            client,
            retries,
            timeout,
        })
    }

    /// Bounds connecting and every read of a response body.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, reqwest::Error>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const BASE_DELAY_MS: u64 = 200;
        let max_retries = self.retries.saturating_sub(1);
        let mut attempt = 0u32;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    if attempt < max_retries && is_retryable_status(resp.status()) {
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < max_retries && is_retryable_error(&err) {
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }
}

impl Transport for HttpTransport {
    fn attempt(&self, request: &TransferRequest<'_>) -> Result<AttemptOutcome, GaldynError> {
        debug!(url = request.url, probe = request.probe, "sending http request");
        let response = match self.send_with_retries(|| {
            if request.probe {
                self.client.head(request.url)
            } else {
                self.client.get(request.url)
            }
        }) {
            Ok(response) => response,
            Err(err) => {
                return Ok(AttemptOutcome::Transient(TransportFailure {
                    status: None,
                    message: err.to_string(),
                }));
            }
        };

        let status = response.status();
        if NOT_FOUND_STATUSES.contains(&status.as_u16()) {
            return Ok(AttemptOutcome::Permanent(TransportFailure {
                status: Some(i32::from(status.as_u16())),
                message: format!("server returned {status}"),
            }));
        }
        if !status.is_success() {
            return Ok(AttemptOutcome::Transient(TransportFailure {
                status: Some(i32::from(status.as_u16())),
                message: format!("server returned {status}"),
            }));
        }
        if request.probe {
            return Ok(AttemptOutcome::Success);
        }

        let mut response = response;
        let mut file = File::create(request.output)
            .map_err(|err| GaldynError::Filesystem(err.to_string()))?;
        if let Err(err) = std::io::copy(&mut response, &mut file) {
            return Ok(AttemptOutcome::Transient(TransportFailure {
                status: None,
                message: err.to_string(),
            }));
        }
        Ok(AttemptOutcome::Success)
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

pub(crate) fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn request<'a>(output: &'a Path, probe: bool, quiet: bool) -> TransferRequest<'a> {
        TransferRequest {
            url: "http://example.org/mwgc.dat",
            output,
            probe,
            quiet,
        }
    }

    #[test]
    fn wget_arguments() {
        let transport = CommandTransport::wget(Duration::from_secs(10), 3);
        let output = Path::new("/tmp/out");
        let args = transport.args(&request(output, true, true));
        assert_eq!(
            args,
            vec![
                "http://example.org/mwgc.dat",
                "-O",
                "/tmp/out",
                "--read-timeout=10",
                "--tries=3",
                "-q",
                "--spider",
            ]
        );
    }

    #[test]
    fn curl_arguments() {
        let transport = CommandTransport::curl(Duration::from_secs(10), 3);
        let output = Path::new("/tmp/out");
        let args = transport.args(&request(output, false, false));
        assert_eq!(
            args,
            vec![
                "http://example.org/mwgc.dat",
                "-o",
                "/tmp/out",
                "--connect-timeout",
                "10",
                "--retry",
                "3",
                "--fail",
                "--write-out",
                "%{http_code}",
            ]
        );

        let quiet = transport.args(&request(output, true, true));
        assert!(quiet.ends_with(&[
            "--silent".to_string(),
            "--show-error".to_string(),
            "--head".to_string(),
        ]));
    }

    #[test]
    fn exit_status_classification() {
        let wget = CommandTransport::wget(Duration::from_secs(10), 3);
        assert_matches!(wget.classify(Some(4), "", ""), AttemptOutcome::Permanent(_));
        assert_matches!(wget.classify(Some(8), "", ""), AttemptOutcome::Transient(_));
        assert_matches!(wget.classify(None, "", "killed"), AttemptOutcome::Transient(_));

        let curl = CommandTransport::curl(Duration::from_secs(10), 3);
        assert_matches!(curl.classify(Some(22), "404", ""), AttemptOutcome::Permanent(_));
        assert_matches!(curl.classify(Some(22), "410", ""), AttemptOutcome::Permanent(_));
        assert_matches!(curl.classify(Some(6), "000", ""), AttemptOutcome::Transient(_));
    }

    #[test]
    fn curl_server_errors_are_transient() {
        let curl = CommandTransport::curl(Duration::from_secs(10), 3);
        for code in ["429", "500", "503"] {
            assert_matches!(
                curl.classify(Some(22), code, "curl: (22) The requested URL returned error"),
                AttemptOutcome::Transient(failure) if failure.message.contains("(22)")
            );
        }
        assert_matches!(curl.classify(Some(22), "", ""), AttemptOutcome::Transient(_));
    }

    #[test]
    fn missing_program_is_reported() {
        let transport = CommandTransport {
            tool: CommandTool::Wget,
            program: None,
            timeout: Duration::from_secs(10),
            retries: 3,
        };
        let output = Path::new("/tmp/out");
        let err = transport.attempt(&request(output, false, true)).unwrap_err();
        assert_matches!(err, GaldynError::MissingTool(name) if name == "wget");
    }
}
