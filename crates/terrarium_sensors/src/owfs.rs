//! Minimal owserver client for the legacy 1-Wire controller.
//!
//! Only the two messages the sensor layer needs are implemented: `DIRALL`
//! to list devices and their properties, and `READ` to fetch a value. Every
//! request uses its own TCP connection, which is what owserver expects from
//! clients that do not ask for persistence.

use crate::error::AcquireError;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

const MSG_READ: i32 = 2;
const MSG_DIRALL: i32 = 7;

/// Ask for owserver's own formatting of values and paths.
const FLAG_OWNET: i32 = 0x100;
const MAX_PAYLOAD: i32 = 65536;
const HEADER_LEN: usize = 24;

/// `family.serial`, e.g. `10.67C6697351FF`.
static DEVICE_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9A-Fa-f]{2}\.[0-9A-Fa-f]{12}$").expect("device id pattern is valid")
});

/// Client for one owserver instance.
#[derive(Debug, Clone)]
pub struct OwClient {
    addr: String,
    timeout: Duration,
}

#[derive(Debug, Clone, Copy)]
struct ResponseHeader {
    payload: i32,
    ret: i32,
}

impl ResponseHeader {
    fn decode(raw: &[u8; HEADER_LEN]) -> Self {
        let field = |i: usize| i32::from_be_bytes([raw[i], raw[i + 1], raw[i + 2], raw[i + 3]]);
        Self {
            payload: field(4),
            ret: field(8),
        }
    }
}

impl OwClient {
    /// `addr` is `host:port`.
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Lists the devices on all buses as bare ids (`10.67C6697351FF`).
    pub fn devices(&self) -> io::Result<Vec<String>> {
        Ok(self
            .dir("/")?
            .into_iter()
            .filter(|name| DEVICE_ID.is_match(name))
            .collect())
    }

    /// Lists the property names of one device (`temperature`, `type`, ...).
    pub fn entries(&self, device: &str) -> io::Result<Vec<String>> {
        self.dir(&format!("/{}", device))
    }

    /// Reads one property of a device as a float.
    pub fn read_value(&self, device: &str, property: &str) -> Result<f64, AcquireError> {
        let raw = self.read(&format!("/{}/{}", device, property))?;
        raw.trim()
            .parse::<f64>()
            .map_err(|_| AcquireError::Parse(raw.trim().to_string()))
    }

    /// Lists a directory, returning the last path component of each entry.
    pub fn dir(&self, path: &str) -> io::Result<Vec<String>> {
        let payload = self.request(MSG_DIRALL, path)?;
        let listing = String::from_utf8_lossy(&payload);
        Ok(listing
            .trim_end_matches('\0')
            .split(',')
            .map(|entry| entry.trim().trim_end_matches('/'))
            .filter_map(|entry| entry.rsplit('/').next())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Reads a property as text.
    pub fn read(&self, path: &str) -> io::Result<String> {
        let payload = self.request(MSG_READ, path)?;
        Ok(String::from_utf8_lossy(&payload)
            .trim_end_matches('\0')
            .to_string())
    }

    fn connect(&self) -> io::Result<TcpStream> {
        let addr = self.addr.to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("cannot resolve {}", self.addr))
        })?;
        let stream = TcpStream::connect_timeout(&addr, self.timeout)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        Ok(stream)
    }

    fn request(&self, msg: i32, path: &str) -> io::Result<Vec<u8>> {
        debug!("owserver {} request {} {}", self.addr, msg, path);
        let mut stream = self.connect()?;

        let mut payload = path.as_bytes().to_vec();
        payload.push(0);
        let payload_len = i32::try_from(payload.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path too long"))?;

        let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
        for field in [0, payload_len, msg, FLAG_OWNET, MAX_PAYLOAD, 0] {
            frame.extend_from_slice(&i32::to_be_bytes(field));
        }
        frame.extend_from_slice(&payload);
        stream.write_all(&frame)?;

        // Keep-alive frames do not extend the deadline.
        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("owserver did not answer {} in {:?}", path, self.timeout),
                ));
            }
            stream.set_read_timeout(Some(remaining))?;

            let mut raw = [0u8; HEADER_LEN];
            stream.read_exact(&mut raw)?;
            let header = ResponseHeader::decode(&raw);

            // keep-alive while the server is still working
            if header.payload < 0 {
                continue;
            }
            if header.ret < 0 {
                return Err(io::Error::other(format!(
                    "owserver returned error {} for {}",
                    header.ret, path
                )));
            }

            if header.payload > MAX_PAYLOAD {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("owserver payload of {} bytes for {}", header.payload, path),
                ));
            }

            let len = usize::try_from(header.payload).unwrap_or(0);
            let mut body = vec![0u8; len];
            stream.read_exact(&mut body)?;
            return Ok(body);
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! A scripted owserver for tests.

    use super::*;
    use std::collections::HashMap;
    use std::net::TcpListener;
    use std::thread;

    /// Serves `DIRALL` from `dirs` and `READ` from `values`, both keyed by
    /// path. Unknown paths answer with `ret = -1`. Every response is preceded
    /// by one keep-alive frame.
    pub(crate) fn serve(
        dirs: HashMap<String, String>,
        values: HashMap<String, String>,
    ) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let mut raw = [0u8; HEADER_LEN];
                if stream.read_exact(&mut raw).is_err() {
                    continue;
                }
                let field =
                    |i: usize| i32::from_be_bytes([raw[i], raw[i + 1], raw[i + 2], raw[i + 3]]);
                let mut payload = vec![0u8; field(4) as usize];
                if stream.read_exact(&mut payload).is_err() {
                    continue;
                }
                let path = String::from_utf8_lossy(&payload)
                    .trim_end_matches('\0')
                    .to_string();
                let answer = match field(8) {
                    MSG_DIRALL => dirs.get(&path),
                    MSG_READ => values.get(&path),
                    _ => None,
                };

                let mut frame = Vec::new();
                for f in [0, -1, 0, FLAG_OWNET, 0, 0] {
                    frame.extend_from_slice(&i32::to_be_bytes(f));
                }
                match answer {
                    Some(body) => {
                        for f in [0, body.len() as i32, body.len() as i32, FLAG_OWNET, 0, 0] {
                            frame.extend_from_slice(&i32::to_be_bytes(f));
                        }
                        frame.extend_from_slice(body.as_bytes());
                    }
                    None => {
                        for f in [0, 0, -1, FLAG_OWNET, 0, 0] {
                            frame.extend_from_slice(&i32::to_be_bytes(f));
                        }
                    }
                }
                let _ = stream.write_all(&frame);
            }
        });
        addr
    }
}
