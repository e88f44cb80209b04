//! Line framing over a duplex byte stream.
//!
//! Inbound: [`LineReader`] buffers bytes until a `\n` arrives and yields one
//! [`Frame`] per line. Lines above the size limit are skipped up to their
//! terminator and reported as [`Frame::Oversized`]. Lines that are not valid
//! UTF-8 are reported as [`Frame::InvalidUtf8`]. A trailing partial line at
//! end of stream is dropped.
//!
//! Outbound: [`Outbound`] serializes one message per line. It is cloneable
//! and serializes writers through a mutex so progress notifications emitted
//! during a request never interleave with other lines.

use bytes::{Buf, BytesMut};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::Result;
use crate::messages::Notification;

/// Default upper bound on a single inbound line.
pub const DEFAULT_MAX_LINE_BYTES: usize = 512 * 1024 * 1024;

const READ_CHUNK: usize = 8 * 1024;

/// One unit read from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete line, terminator stripped.
    Line(String),
    /// A line that exceeded the limit and was discarded.
    Oversized { discarded: usize },
    /// A line that was not valid UTF-8.
    InvalidUtf8 { len: usize },
}

/// Splits an async byte stream into lines.
pub struct LineReader<R> {
    inner: R,
    buf: BytesMut,
    /// Prefix of `buf` already searched for a terminator.
    scanned: usize,
    max_line_bytes: usize,
    discarding: Option<usize>,
    eof: bool,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(inner: R, max_line_bytes: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(READ_CHUNK),
            scanned: 0,
            max_line_bytes,
            discarding: None,
            eof: false,
        }
    }

    /// Read the next non-empty line. Returns `None` at end of stream.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = self.take_buffered() {
                match frame {
                    Frame::Line(ref line) if line.trim().is_empty() => continue,
                    frame => return Ok(Some(frame)),
                }
            }

            if self.eof {
                if !self.buf.is_empty() || self.discarding.is_some() {
                    debug!(bytes = self.buf.len(), "dropping partial line at end of stream");
                    self.buf.clear();
                    self.scanned = 0;
                    self.discarding = None;
                }
                return Ok(None);
            }

            self.buf.reserve(READ_CHUNK);
            if self.inner.read_buf(&mut self.buf).await? == 0 {
                self.eof = true;
            }
        }
    }

    fn take_buffered(&mut self) -> Option<Frame> {
        let newline = self.buf[self.scanned..]
            .iter()
            .position(|b| *b == b'\n')
            .map(|offset| self.scanned + offset);
        self.scanned = match newline {
            Some(_) => 0,
            None => self.buf.len(),
        };

        if let Some(skipped) = self.discarding {
            return match newline {
                Some(pos) => {
                    self.buf.advance(pos + 1);
                    self.discarding = None;
                    let discarded = skipped + pos;
                    warn!(discarded, "discarded oversized line");
                    Some(Frame::Oversized { discarded })
                }
                None => {
                    self.discarding = Some(skipped + self.buf.len());
                    self.buf.clear();
                    self.scanned = 0;
                    None
                }
            };
        }

        match newline {
            Some(pos) if pos > self.max_line_bytes => {
                self.buf.advance(pos + 1);
                warn!(discarded = pos, "discarded oversized line");
                Some(Frame::Oversized { discarded: pos })
            }
            Some(pos) => {
                let raw = self.buf.split_to(pos + 1);
                let mut line = &raw[..pos];
                if let Some(stripped) = line.strip_suffix(b"\r") {
                    line = stripped;
                }
                match std::str::from_utf8(line) {
                    Ok(text) => Some(Frame::Line(text.to_owned())),
                    Err(e) => {
                        warn!(len = line.len(), error = %e, "line is not valid UTF-8");
                        Some(Frame::InvalidUtf8 { len: line.len() })
                    }
                }
            }
            None if self.buf.len() > self.max_line_bytes => {
                self.discarding = Some(self.buf.len());
                self.buf.clear();
                self.scanned = 0;
                None
            }
            None => None,
        }
    }
}

/// Shared line writer.
#[derive(Clone)]
pub struct Outbound {
    writer: Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>,
}

impl Outbound {
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Write one message as a single line and flush.
    pub async fn send<T: Serialize + ?Sized>(&self, message: &T) -> Result<()> {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Emit a notification line.
    pub async fn notify(&self, method: &str, params: Value) -> Result<()> {
        self.send(&Notification::new(method, params)).await
    }
}
