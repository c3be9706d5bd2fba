//! Test-only doubles for the farm server and helpers for sploit scripts.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::core::flags::FlagFormat;
use crate::core::types::{FlagRecord, Roster};
use crate::io::collector::{Collector, DeliveryError};
use crate::io::config::{ConfigError, ConfigProvider, RoundConfig};
use crate::sync::lock;

/// Build a round config with the given flag pattern and teams.
pub fn round_config(pattern: &str, teams: &[(&str, &str)]) -> RoundConfig {
    RoundConfig {
        flag_format: FlagFormat::new(pattern).expect("flag pattern"),
        flag_lifetime: Duration::from_secs(300),
        submit_period: Duration::from_secs(2),
        teams: teams
            .iter()
            .map(|(name, address)| (name.to_string(), address.to_string()))
            .collect::<Roster>(),
    }
}

/// Config provider that replays a fixed script of responses.
///
/// `None` entries (and every call past the end of the script) fail.
#[derive(Debug)]
pub struct ScriptedConfigProvider {
    responses: Mutex<VecDeque<Option<RoundConfig>>>,
    calls: AtomicUsize,
}

impl ScriptedConfigProvider {
    pub fn new(responses: Vec<Option<RoundConfig>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ConfigProvider for ScriptedConfigProvider {
    fn get_config(&self) -> Result<RoundConfig, ConfigError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.responses)
            .pop_front()
            .flatten()
            .ok_or_else(|| ConfigError::Status {
                status: 503,
                body: "scripted failure".to_string(),
            })
    }
}

/// Collector that records accepted batches.
///
/// Each call consumes the next scripted outcome (`true` accepts); once the
/// script runs out every call is accepted.
#[derive(Debug, Default)]
pub struct RecordingCollector {
    outcomes: Mutex<VecDeque<bool>>,
    delivered: Mutex<Vec<FlagRecord>>,
    attempts: AtomicUsize,
}

impl RecordingCollector {
    pub fn new(outcomes: Vec<bool>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Every record accepted so far, in delivery order.
    pub fn delivered(&self) -> Vec<FlagRecord> {
        lock(&self.delivered).clone()
    }
}

impl Collector for RecordingCollector {
    fn deliver(&self, batch: &[FlagRecord]) -> Result<(), DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let accept = lock(&self.outcomes).pop_front().unwrap_or(true);
        if !accept {
            return Err(DeliveryError::Status {
                status: 500,
                body: "scripted failure".to_string(),
            });
        }
        lock(&self.delivered).extend_from_slice(batch);
        Ok(())
    }
}

/// Write an executable `/bin/sh` script named `name` into `dir`.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).expect("write script");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("chmod script");
    }
    path
}

/// One-shot HTTP server on localhost.
///
/// Answers the first request with a canned response and hands the raw
/// request text back through [`StubServer::finish`].
pub struct StubServer {
    url: String,
    handle: JoinHandle<String>,
}

impl StubServer {
    pub fn respond(status: u16, body: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub server");
        let url = format!("http://{}", listener.local_addr().expect("local addr"));
        let body = body.to_string();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));

            let mut request = String::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).expect("read header");
                if let Some((name, value)) = line.split_once(':')
                    && name.eq_ignore_ascii_case("content-length")
                {
                    content_length = value.trim().parse().expect("content length");
                }
                let end_of_headers = line == "\r\n" || line.is_empty();
                request.push_str(&line);
                if end_of_headers {
                    break;
                }
            }
            let mut payload = vec![0u8; content_length];
            reader.read_exact(&mut payload).expect("read body");
            request.push_str(&String::from_utf8_lossy(&payload));

            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 {status} Stub\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
            .expect("write response");
            stream.flush().expect("flush response");
            request
        });
        Self { url, handle }
    }

    pub fn url(&self) -> String {
        self.url.clone()
    }

    /// Wait for the request to be served and return it.
    pub fn finish(self) -> String {
        self.handle.join().expect("stub server thread")
    }
}

/// Temporary directory holding sploit scripts for one test.
pub struct SploitDir {
    dir: tempfile::TempDir,
}

impl SploitDir {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write an executable shell script; see [`write_script`].
    pub fn script(&self, name: &str, body: &str) -> PathBuf {
        write_script(self.dir.path(), name, body)
    }
}

impl Default for SploitDir {
    fn default() -> Self {
        Self::new()
    }
}
