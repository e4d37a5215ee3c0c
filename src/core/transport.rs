//! Framed Transport (C4, §4.4, §6).
//!
//! Every message is a 4-byte little-endian length prefix followed by exactly
//! that many bytes of UTF-8 JSON. Grounded on the original native host
//! bridge's `_send_message`/`_recv_message`/`_recv_exact` trio: a single
//! `sendall`-equivalent write, and a read loop that distinguishes a clean
//! short read (connection closed) from a real I/O error.

use crate::core::error::CoreError;
use serde_json::Value;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::time::Duration;

/// Maximum body size in bytes; a length prefix beyond this is a framing error.
pub const MAX_BODY_BYTES: u32 = 10 * 1024 * 1024;

/// Default port the submit path dials.
pub const DEFAULT_PORT: u16 = 5678;

/// Port range scanned by host discovery, inclusive of the first, exclusive
/// of the last (`5678..5697`, §4.4, §6).
pub const PING_PORT_RANGE: std::ops::Range<u16> = 5678..5697;

/// Default port the response receiver listens on for download mode (§6).
pub const RESPONSE_PORT: u16 = 5679;

/// Write a single framed message: header then body in one logical write.
pub fn send(conn: &mut TcpStream, msg: &Value) -> Result<(), CoreError> {
    let body = serde_json::to_vec(msg).map_err(|e| CoreError::FramingError(e.to_string()))?;
    if body.len() as u64 > MAX_BODY_BYTES as u64 {
        return Err(CoreError::FramingError(format!(
            "body of {} bytes exceeds {} byte limit",
            body.len(),
            MAX_BODY_BYTES
        )));
    }
    let header = (body.len() as u32).to_le_bytes();
    let mut framed = Vec::with_capacity(4 + body.len());
    framed.extend_from_slice(&header);
    framed.extend_from_slice(&body);
    conn.write_all(&framed)
        .map_err(|e| CoreError::io("<socket>", e))?;
    Ok(())
}

/// Read exactly `buf.len()` bytes, distinguishing a clean EOF (connection
/// closed before any byte of this read) from a mid-read I/O error.
fn recv_exact(conn: &mut TcpStream, buf: &mut [u8]) -> Result<(), CoreError> {
    match conn.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(CoreError::ConnectionClosed),
        Err(e) => Err(CoreError::io("<socket>", e)),
    }
}

/// Read one framed message: 4-byte length prefix, then exactly that many
/// bytes, then JSON-decode.
pub fn recv(conn: &mut TcpStream, timeout: Duration) -> Result<Value, CoreError> {
    conn.set_read_timeout(Some(timeout))
        .map_err(|e| CoreError::io("<socket>", e))?;

    let mut header = [0u8; 4];
    recv_exact(conn, &mut header)?;
    let len = u32::from_le_bytes(header);
    if len > MAX_BODY_BYTES {
        return Err(CoreError::FramingError(format!(
            "declared length {} exceeds {} byte limit",
            len, MAX_BODY_BYTES
        )));
    }

    let mut body = vec![0u8; len as usize];
    recv_exact(conn, &mut body)?;
    serde_json::from_slice(&body).map_err(|e| CoreError::FramingError(e.to_string()))
}

/// Open a TCP connection to the native host with a connect timeout.
pub fn dial(host: &str, port: u16, timeout: Duration) -> Result<TcpStream, CoreError> {
    use std::net::ToSocketAddrs;
    let addr = format!("{}:{}", host, port);
    let socket_addr = addr
        .to_socket_addrs()
        .ok()
        .and_then(|mut it| it.next())
        .ok_or_else(|| CoreError::ConnectionRefused(addr.clone()))?;
    TcpStream::connect_timeout(&socket_addr, timeout)
        .map_err(|_| CoreError::ConnectionRefused(addr))
}

/// Bind and accept exactly one connection, for download mode (§4.4, §9 Open
/// Question 4: multi-response handling is out of scope).
pub fn listen(host: &str, port: u16, accept_timeout: Duration) -> Result<TcpStream, CoreError> {
    let listener = TcpListener::bind((host, port)).map_err(|e| CoreError::io("<listener>", e))?;
    listener
        .set_nonblocking(false)
        .map_err(|e| CoreError::io("<listener>", e))?;
    let deadline = std::time::Instant::now() + accept_timeout;
    listener
        .set_nonblocking(true)
        .map_err(|e| CoreError::io("<listener>", e))?;
    loop {
        match listener.accept() {
            Ok((stream, _addr)) => {
                stream
                    .set_nonblocking(false)
                    .map_err(|e| CoreError::io("<socket>", e))?;
                return Ok(stream);
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                if std::time::Instant::now() >= deadline {
                    return Err(CoreError::Timeout("listen accept".to_string()));
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(e) => return Err(CoreError::io("<listener>", e)),
        }
    }
}

/// Result of a successful ping.
pub struct PingResult {
    pub port: u16,
    pub response_time_ms: u128,
    pub response: Value,
}

/// Sequentially scan `PING_PORT_RANGE`, dialing and sending a ping, and
/// return the first port whose response is a pong (§4.4, S2).
pub fn ping_native_host(host: &str, connect_timeout: Duration) -> Result<PingResult, CoreError> {
    for port in PING_PORT_RANGE {
        let started = std::time::Instant::now();
        let mut conn = match dial(host, port, connect_timeout) {
            Ok(c) => c,
            Err(_) => continue,
        };
        let request = serde_json::json!({
            "command": "ping",
            "source": "brain_cli",
            "timestamp": crate::core::time::now_iso(),
        });
        if send(&mut conn, &request).is_err() {
            continue;
        }
        let response = match recv(&mut conn, Duration::from_millis(500)) {
            Ok(r) => r,
            Err(_) => continue,
        };
        let is_pong = response.get("status").and_then(Value::as_str) == Some("pong")
            || response.get("command").and_then(Value::as_str) == Some("pong");
        if is_pong {
            return Ok(PingResult {
                port,
                response_time_ms: started.elapsed().as_millis(),
                response,
            });
        }
    }
    Err(CoreError::ConnectionRefused(format!(
        "no native host responded on ports {}..{}",
        PING_PORT_RANGE.start, PING_PORT_RANGE.end
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_send_recv_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let msg = recv(&mut stream, Duration::from_secs(2)).unwrap();
            send(&mut stream, &msg).unwrap();
        });
        let mut client = TcpStream::connect(addr).unwrap();
        let payload = serde_json::json!({"command": "ping"});
        send(&mut client, &payload).unwrap();
        let echoed = recv(&mut client, Duration::from_secs(2)).unwrap();
        assert_eq!(echoed, payload);
        handle.join().unwrap();
    }

    #[test]
    fn test_oversized_length_prefix_is_framing_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let bogus = (MAX_BODY_BYTES + 1).to_le_bytes();
            stream.write_all(&bogus).unwrap();
        });
        let mut client = TcpStream::connect(addr).unwrap();
        let err = recv(&mut client, Duration::from_secs(2)).unwrap_err();
        assert!(matches!(err, CoreError::FramingError(_)));
        handle.join().unwrap();
    }

    #[test]
    fn test_closed_connection_on_short_header() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            drop(stream);
        });
        let mut client = TcpStream::connect(addr).unwrap();
        let err = recv(&mut client, Duration::from_secs(2)).unwrap_err();
        assert!(matches!(err, CoreError::ConnectionClosed));
        handle.join().unwrap();
    }
}
