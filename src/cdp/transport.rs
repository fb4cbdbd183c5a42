//! CDP Transport Layer
//!
//! Speaks the DevTools protocol to Chrome over a minimal WebSocket client.
//! Requests are matched to responses by id; events are only traced.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::process::Child;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use tokio::sync::{oneshot, Mutex};

use crate::error::{Error, Result};

/// A request waiting for its response, with the method name for error context
struct Pending {
    method: String,
    reply: oneshot::Sender<Result<Value>>,
}

type PendingMap = Arc<Mutex<HashMap<u64, Pending>>>;

/// WebSocket opcodes
mod ws {
    pub const CONTINUATION: u8 = 0x0;
    pub const TEXT: u8 = 0x1;
    pub const CLOSE: u8 = 0x8;
    pub const PING: u8 = 0x9;
    pub const PONG: u8 = 0xA;
}

/// Write one masked client frame
fn write_frame(stream: &mut TcpStream, opcode: u8, data: &[u8]) -> std::io::Result<()> {
    let len = data.len();
    let mut frame = Vec::with_capacity(14 + len);

    frame.push(0x80 | opcode);

    // Client frames are always masked
    if len < 126 {
        frame.push(0x80 | len as u8);
    } else if len < 65536 {
        frame.push(0x80 | 126);
        frame.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        frame.push(0x80 | 127);
        frame.extend_from_slice(&(len as u64).to_be_bytes());
    }

    let mask: [u8; 4] = rand::random();
    frame.extend_from_slice(&mask);
    frame.extend(data.iter().enumerate().map(|(i, b)| b ^ mask[i % 4]));

    stream.write_all(&frame)?;
    stream.flush()
}

/// Read one frame, returns (fin, opcode, payload)
fn read_frame(stream: &mut TcpStream) -> std::io::Result<(bool, u8, Vec<u8>)> {
    let mut header = [0u8; 2];
    stream.read_exact(&mut header)?;

    let fin = header[0] & 0x80 != 0;
    let opcode = header[0] & 0x0F;
    let masked = header[1] & 0x80 != 0;
    let len = match header[1] & 0x7F {
        126 => {
            let mut ext = [0u8; 2];
            stream.read_exact(&mut ext)?;
            u16::from_be_bytes(ext) as usize
        }
        127 => {
            let mut ext = [0u8; 8];
            stream.read_exact(&mut ext)?;
            u64::from_be_bytes(ext) as usize
        }
        n => n as usize,
    };

    let mask = if masked {
        let mut m = [0u8; 4];
        stream.read_exact(&mut m)?;
        Some(m)
    } else {
        None
    };

    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload)?;
    if let Some(mask) = mask {
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= mask[i % 4];
        }
    }

    Ok((fin, opcode, payload))
}

/// Split `ws://host:port/path` into (`host:port`, `/path`)
fn split_ws_url(ws_url: &str) -> Result<(&str, String)> {
    let rest = ws_url
        .strip_prefix("ws://")
        .ok_or_else(|| Error::transport(format!("Unsupported DevTools URL: {}", ws_url)))?;
    Ok(match rest.split_once('/') {
        Some((host, path)) => (host, format!("/{}", path)),
        None => (rest, "/".to_string()),
    })
}

/// CDP Transport - sends commands and routes responses back to callers
pub struct Transport {
    /// The Chrome child process
    child: Mutex<Child>,
    /// WebSocket stream for writing, shared with the reader for PONG replies
    writer: Arc<Mutex<TcpStream>>,
    next_id: AtomicU64,
    pending: PendingMap,
}

impl Transport {
    /// Connect to Chrome's DevTools WebSocket and start the reader thread
    pub fn connect(child: Child, ws_url: &str) -> Result<Self> {
        let (host_port, path) = split_ws_url(ws_url)?;

        let mut stream = TcpStream::connect(host_port)
            .map_err(|e| Error::transport_io("Failed to connect to Chrome", e))?;

        let key = base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            rand::random::<[u8; 16]>(),
        );
        let handshake = format!(
            "GET {} HTTP/1.1\r\n\
             Host: {}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {}\r\n\
             Sec-WebSocket-Version: 13\r\n\
             \r\n",
            path, host_port, key
        );
        stream
            .write_all(handshake.as_bytes())
            .map_err(|e| Error::transport_io("Handshake write failed", e))?;

        // Read the upgrade response up to the blank line, byte by byte so no
        // frame data is consumed.
        let mut response = Vec::with_capacity(256);
        let mut byte = [0u8; 1];
        while !response.ends_with(b"\r\n\r\n") {
            stream
                .read_exact(&mut byte)
                .map_err(|e| Error::transport_io("Handshake read failed", e))?;
            response.push(byte[0]);
        }
        let status_line = String::from_utf8_lossy(&response);
        if !status_line.starts_with("HTTP/1.1 101") {
            return Err(Error::transport(format!(
                "WebSocket handshake failed: {}",
                status_line.lines().next().unwrap_or_default()
            )));
        }

        tracing::debug!("WebSocket connected to {}", ws_url);

        let reader_stream = stream
            .try_clone()
            .map_err(|e| Error::transport_io("Failed to clone stream", e))?;
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let writer = Arc::new(Mutex::new(stream));

        let reader_writer = Arc::clone(&writer);
        let reader_pending = Arc::clone(&pending);
        std::thread::spawn(move || {
            Self::reader_loop(reader_stream, reader_writer, reader_pending)
        });

        Ok(Self {
            child: Mutex::new(child),
            writer,
            next_id: AtomicU64::new(1),
            pending,
        })
    }

    /// Reader loop - runs on its own thread, reassembles fragmented messages.
    /// Replies go through `writer` so they never interleave with a `send`.
    fn reader_loop(mut stream: TcpStream, writer: Arc<Mutex<TcpStream>>, pending: PendingMap) {
        let mut message = Vec::new();

        loop {
            let (fin, opcode, payload) = match read_frame(&mut stream) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::debug!("WebSocket read error: {}", e);
                    break;
                }
            };

            match opcode {
                ws::TEXT | ws::CONTINUATION => {
                    message.extend_from_slice(&payload);
                    if fin {
                        Self::dispatch(&std::mem::take(&mut message), &pending);
                    }
                }
                ws::PING => {
                    let mut writer = writer.blocking_lock();
                    if let Err(e) = write_frame(&mut writer, ws::PONG, &payload) {
                        tracing::debug!("PONG write failed: {}", e);
                    }
                }
                ws::CLOSE => {
                    tracing::debug!("WebSocket closed by server");
                    break;
                }
                _ => {}
            }
        }

        // Fail everything still waiting so callers don't hang
        let mut pending = pending.blocking_lock();
        for (_, request) in pending.drain() {
            let _ = request
                .reply
                .send(Err(Error::transport(format!("Connection closed during {}", request.method))));
        }
        tracing::debug!("CDP reader loop ended");
    }

    fn dispatch(raw: &[u8], pending: &PendingMap) {
        let msg: Value = match serde_json::from_slice(raw) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Failed to parse CDP message: {}", e);
                return;
            }
        };

        let Some(id) = msg.get("id").and_then(Value::as_u64) else {
            if let Some(method) = msg.get("method").and_then(Value::as_str) {
                tracing::trace!("CDP event: {}", method);
            }
            return;
        };

        let Some(request) = pending.blocking_lock().remove(&id) else {
            tracing::trace!("Response for unknown id: {}", id);
            return;
        };

        let result = match msg.get("error") {
            Some(error) => Err(Error::cdp(
                request.method.as_str(),
                error.get("code").and_then(Value::as_i64).unwrap_or(-1),
                error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown"),
            )),
            None => Ok(msg.get("result").cloned().unwrap_or(json!({}))),
        };
        let _ = request.reply.send(result);
    }

    /// Send a command, to the browser (`session_id = None`) or to an attached
    /// target, and wait for its result
    pub async fn send<C, R>(&self, session_id: Option<&str>, method: &str, params: &C) -> Result<R>
    where
        C: Serialize,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(
            id,
            Pending {
                method: method.to_string(),
                reply: tx,
            },
        );

        let mut msg = json!({
            "id": id,
            "method": method,
            "params": serde_json::to_value(params)?,
        });
        if let Some(session_id) = session_id {
            msg["sessionId"] = Value::String(session_id.to_string());
        }
        let data = serde_json::to_vec(&msg)?;

        {
            let mut writer = self.writer.lock().await;
            if let Err(e) = write_frame(&mut writer, ws::TEXT, &data) {
                self.pending.lock().await.remove(&id);
                return Err(Error::transport_io("WebSocket write failed", e));
            }
        }

        tracing::trace!("Sent CDP command: {} (id={})", method, id);

        let result = rx
            .await
            .map_err(|_| Error::transport("Response channel closed"))??;

        Ok(serde_json::from_value(result)?)
    }

    /// Close the socket and kill Chrome
    pub async fn close(&self) -> Result<()> {
        {
            let mut writer = self.writer.lock().await;
            let _ = write_frame(&mut writer, ws::CLOSE, &[]);
        }

        let mut child = self.child.lock().await;
        let _ = child.kill();
        let _ = child.wait();
        Ok(())
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        if let Ok(mut child) = self.child.try_lock() {
            let _ = child.kill();
        }
    }
}
