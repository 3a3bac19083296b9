//! Bridge to a legacy solver running as a subprocess, speaking a
//! length-prefixed JSON protocol over stdio.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::backtracking::Solver;
use crate::errors::SolverError;
use crate::selections_xml;
use hatch_feed_model::{Requirements, Selections, Version};
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread;

/// Protocol version this side speaks. The handshake agrees on the child's
/// version iff ours is not newer.
pub const API_VERSION: &str = "2.7";

/// Callbacks the child may invoke while solving. The answers `true`/`false`
/// map to the wire strings `"ok"`/`"cancel"`.
pub trait ExternalSolverHandler: Send + Sync {
    fn confirm(&self, message: &str) -> bool;
    fn confirm_keys(&self, feed_uri: &str, keys: &Value) -> bool;
    fn update_key_info(&self, args: &Value);
}

/// Handler for unattended operation: refuses every confirmation.
pub struct Unattended;

impl ExternalSolverHandler for Unattended {
    fn confirm(&self, message: &str) -> bool {
        info!("External solver asked: {} (answering cancel)", message);
        false
    }

    fn confirm_keys(&self, feed_uri: &str, _keys: &Value) -> bool {
        info!(
            "External solver asked to trust keys for {} (answering cancel)",
            feed_uri
        );
        false
    }

    fn update_key_info(&self, _args: &Value) {}
}

/// Drives a legacy solver binary as a child process.
pub struct ExternalSolver {
    binary: PathBuf,
    arguments: Vec<String>,
    handler: Arc<dyn ExternalSolverHandler>,
}

impl ExternalSolver {
    pub fn new(
        binary: PathBuf,
        arguments: Vec<String>,
        handler: Arc<dyn ExternalSolverHandler>,
    ) -> ExternalSolver {
        ExternalSolver {
            binary,
            arguments,
            handler,
        }
    }
}

impl Solver for ExternalSolver {
    fn solve(&self, requirements: &Requirements, refresh: bool) -> Result<Selections, SolverError> {
        let mut child = Command::new(&self.binary)
            .args(&self.arguments)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        drain_stderr(&mut child);

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SolverError::Protocol("child stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SolverError::Protocol("child stdout unavailable".to_string()))?;

        let mut session = ProtocolSession::new(BufReader::new(stdout), stdin, self.handler.clone());
        let result = session.select(requirements, refresh);

        // Closing both pipes tells the child to exit; also how cancellation
        // is delivered.
        drop(session);
        match child.wait() {
            Ok(status) if !status.success() => {
                debug!("External solver exited with {}", status);
            }
            Err(e) => debug!("Failed to reap external solver: {}", e),
            _ => {}
        }

        let (stale, xml) = result?;
        let mut selections = selections_xml::parse(&xml)?;
        selections.stale = stale;
        Ok(selections)
    }
}

/// Re-log the child's stderr lines at the level their prefix names.
fn drain_stderr(child: &mut Child) {
    let Some(stderr) = child.stderr.take() else {
        return;
    };
    thread::spawn(move || {
        for line in BufReader::new(stderr).lines() {
            let Ok(line) = line else { break };
            if let Some(rest) = line.strip_prefix("error:") {
                error!("external solver: {}", rest.trim());
            } else if let Some(rest) = line.strip_prefix("warning:") {
                warn!("external solver: {}", rest.trim());
            } else if let Some(rest) = line.strip_prefix("info:") {
                info!("external solver: {}", rest.trim());
            } else if let Some(rest) = line.strip_prefix("debug:") {
                debug!("external solver: {}", rest.trim());
            } else {
                info!("external solver: {}", line);
            }
        }
    });
}

/// One conversation with a child process. Generic over the byte streams so
/// tests can drive it with canned buffers.
pub(crate) struct ProtocolSession<R, W> {
    reader: R,
    writer: W,
    handler: Arc<dyn ExternalSolverHandler>,
}

impl<R: BufRead, W: Write> ProtocolSession<R, W> {
    pub(crate) fn new(reader: R, writer: W, handler: Arc<dyn ExternalSolverHandler>) -> Self {
        ProtocolSession {
            reader,
            writer,
            handler,
        }
    }

    /// Issues a `select` call and pumps messages until its return arrives.
    /// One outstanding request per ticket; we only ever use ticket `"1"`.
    pub(crate) fn select(
        &mut self,
        requirements: &Requirements,
        refresh: bool,
    ) -> Result<(bool, String), SolverError> {
        let requirements_json = serde_json::to_value(requirements)
            .map_err(|e| SolverError::Protocol(e.to_string()))?;
        self.send(&json!(["invoke", "1", "select", [requirements_json, refresh]]))?;

        loop {
            let message = self.read_message()?;
            let kind = message
                .get(0)
                .and_then(Value::as_str)
                .ok_or_else(|| SolverError::Protocol("message without type".to_string()))?;
            match kind {
                "invoke" => self.dispatch_invoke(&message)?,
                "return" => {
                    let ticket = message.get(1).and_then(Value::as_str).unwrap_or_default();
                    if ticket != "1" {
                        return Err(SolverError::Protocol(format!(
                            "return for unknown ticket {:?}",
                            ticket
                        )));
                    }
                    return self.handle_select_return(&message);
                }
                other => {
                    return Err(SolverError::Protocol(format!(
                        "unknown message type {:?}",
                        other
                    )))
                }
            }
        }
    }

    fn handle_select_return(&mut self, message: &Value) -> Result<(bool, String), SolverError> {
        let status = message.get(2).and_then(Value::as_str).unwrap_or_default();
        match status {
            // The XML payload travels as an extra binary chunk after the
            // JSON envelope.
            "ok+xml" => {
                let stale = message
                    .get(3)
                    .and_then(|args| args.get(0))
                    .and_then(|info| info.get("stale"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let xml = read_chunk(&mut self.reader)?;
                let xml = String::from_utf8(xml)
                    .map_err(|e| SolverError::Protocol(e.to_string()))?;
                Ok((stale, xml))
            }
            "fail" => {
                let reason = message
                    .get(3)
                    .and_then(|args| args.get(0))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown failure");
                Err(SolverError::External(reason.to_string()))
            }
            other => Err(SolverError::Protocol(format!(
                "unexpected return status {:?}",
                other
            ))),
        }
    }

    fn dispatch_invoke(&mut self, message: &Value) -> Result<(), SolverError> {
        let ticket = message.get(1).cloned().unwrap_or(Value::Null);
        let operation = message.get(2).and_then(Value::as_str).unwrap_or_default();
        let args = message.get(3).cloned().unwrap_or(Value::Null);

        let reply = match operation {
            "set-api-version" => {
                let child_version = args
                    .get(0)
                    .and_then(Value::as_str)
                    .unwrap_or(API_VERSION)
                    .to_string();
                if !version_compatible(API_VERSION, &child_version) {
                    return Err(SolverError::NotSupported(format!(
                        "external solver speaks API {}, we need at least {}",
                        child_version, API_VERSION
                    )));
                }
                Value::Null
            }
            "confirm" => {
                let message = args.get(0).and_then(Value::as_str).unwrap_or_default();
                answer(self.handler.confirm(message))
            }
            "confirm-keys" => {
                let feed_uri = args.get(0).and_then(Value::as_str).unwrap_or_default();
                let keys = args.get(1).cloned().unwrap_or(Value::Null);
                answer(self.handler.confirm_keys(feed_uri, &keys))
            }
            "update-key-info" => {
                self.handler.update_key_info(&args);
                Value::Null
            }
            other => {
                return Err(SolverError::Protocol(format!(
                    "unknown operation {:?}",
                    other
                )))
            }
        };

        // Fire-and-forget invokes carry a null ticket and get no reply.
        if !ticket.is_null() {
            self.send(&json!(["return", ticket, "ok", reply]))?;
        }
        Ok(())
    }

    fn send(&mut self, message: &Value) -> Result<(), SolverError> {
        let payload =
            serde_json::to_vec(message).map_err(|e| SolverError::Protocol(e.to_string()))?;
        self.writer.write_all(&encode_chunk(&payload))?;
        self.writer.flush()?;
        Ok(())
    }

    fn read_message(&mut self) -> Result<Value, SolverError> {
        let chunk = read_chunk(&mut self.reader)?;
        serde_json::from_slice(&chunk).map_err(|e| SolverError::Protocol(e.to_string()))
    }
}

fn answer(ok: bool) -> Value {
    Value::String(if ok { "ok" } else { "cancel" }.to_string())
}

/// `true` iff our version is not newer than the child's.
fn version_compatible(ours: &str, childs: &str) -> bool {
    match (ours.parse::<Version>(), childs.parse::<Version>()) {
        (Ok(ours), Ok(childs)) => !matches!(ours.try_cmp(&childs), Ok(std::cmp::Ordering::Greater)),
        _ => false,
    }
}

/// Frame: `0xHHHHHHHH\n` (8 hex digits), then that many payload bytes.
pub(crate) fn encode_chunk(payload: &[u8]) -> Vec<u8> {
    let mut out = format!("0x{:08x}\n", payload.len()).into_bytes();
    out.extend_from_slice(payload);
    out
}

pub(crate) fn read_chunk(reader: &mut impl Read) -> Result<Vec<u8>, SolverError> {
    let mut preamble = [0u8; 11];
    reader.read_exact(&mut preamble)?;
    let text = std::str::from_utf8(&preamble)
        .map_err(|e| SolverError::Protocol(e.to_string()))?;
    if !text.starts_with("0x") || !text.ends_with('\n') {
        return Err(SolverError::Protocol(format!(
            "bad length preamble {:?}",
            text
        )));
    }
    let length = usize::from_str_radix(&text[2..10], 16)
        .map_err(|e| SolverError::Protocol(format!("bad length: {}", e)))?;
    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}
