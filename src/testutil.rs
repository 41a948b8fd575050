//! Test doubles shared by unit tests

use crate::error::{Error, Result};
use crate::sickbay::probe::Prober;
use crate::sickbay::recovery::{RemoteCommand, Remediator};
use crate::vox::AlertDispatcher;
use crate::warden::BoxFuture;
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::Duration;

/// Prober that replays a script of outcomes, then repeats a fallback
pub struct ScriptedProber {
    script: Mutex<VecDeque<bool>>,
    fallback: Mutex<bool>,
    calls: Mutex<Vec<tokio::time::Instant>>,
}

impl ScriptedProber {
    pub fn new(script: Vec<bool>) -> Self {
        let fallback = script.last().copied().unwrap_or(false);
        Self {
            script: Mutex::new(script.into()),
            fallback: Mutex::new(fallback),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn always(ok: bool) -> Self {
        let prober = Self::new(Vec::new());
        prober.set_fallback(ok);
        prober
    }

    pub fn set_fallback(&self, ok: bool) {
        *self.fallback.lock().unwrap() = ok;
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn call_times(&self) -> Vec<tokio::time::Instant> {
        self.calls.lock().unwrap().clone()
    }
}

impl Prober for ScriptedProber {
    fn check<'a>(&'a self, _url: &'a str) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(tokio::time::Instant::now());
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| *self.fallback.lock().unwrap())
        })
    }
}

/// Alert dispatcher that records every message
#[derive(Default)]
pub struct RecordingDispatcher {
    messages: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingDispatcher {
    pub fn failing() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl AlertDispatcher for RecordingDispatcher {
    fn send_message<'a>(&'a self, message: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.messages.lock().unwrap().push(message.to_string());
            if self.fail {
                return Err(Error::Alert("webhook unreachable".into()));
            }
            Ok(())
        })
    }
}

/// Remediator that records every command it is asked to run
#[derive(Default)]
pub struct RecordingRemediator {
    runs: Mutex<Vec<RemoteCommand>>,
    fail: bool,
}

impl RecordingRemediator {
    pub fn failing() -> Self {
        Self {
            runs: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn runs(&self) -> Vec<RemoteCommand> {
        self.runs.lock().unwrap().clone()
    }
}

impl Remediator for RecordingRemediator {
    fn remediate<'a>(&'a self, command: &'a RemoteCommand) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.runs.lock().unwrap().push(command.clone());
            if self.fail {
                return Err(Error::remediation(
                    &command.host,
                    crate::error::RemediationStage::Dial,
                    "connection refused",
                ));
            }
            Ok(())
        })
    }
}

/// Minimal HTTP/1.1 server answering a fixed number of requests
pub struct StubServer {
    port: u16,
    handle: JoinHandle<Vec<String>>,
}

impl StubServer {
    /// Answer `requests` connections with `status` (e.g. `"200 OK"`)
    pub fn start(status: &'static str, requests: usize) -> Self {
        Self::start_with_body(status, "", requests)
    }

    /// Like `start`, with a JSON response body
    pub fn start_with_body(status: &'static str, body: &'static str, requests: usize) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = std::thread::spawn(move || {
            let mut seen = Vec::new();
            for _ in 0..requests {
                let (mut stream, _) = match listener.accept() {
                    Ok(conn) => conn,
                    Err(_) => break,
                };
                stream
                    .set_read_timeout(Some(Duration::from_secs(2)))
                    .unwrap();
                seen.push(read_request(&mut stream));
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes());
                let _ = stream.flush();
            }
            seen
        });

        Self { port, handle }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    /// Wait for the server thread and return the raw requests it saw
    pub fn finish(self) -> Vec<String> {
        self.handle.join().unwrap()
    }
}

/// Read request head plus a `Content-Length` body, if any
fn read_request(stream: &mut impl Read) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => return String::from_utf8_lossy(&buf).into_owned(),
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_lowercase();
    let content_length = head
        .lines()
        .find_map(|l| l.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < head_end + content_length {
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }

    String::from_utf8_lossy(&buf).into_owned()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
