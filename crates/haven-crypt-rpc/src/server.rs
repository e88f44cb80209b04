//! Sequential request loop.
//!
//! The server reads one line, dispatches it to completion, writes the
//! response, and only then reads the next line. Responses therefore leave in
//! the order requests arrived. A handler may emit notifications through its
//! [`CallContext`] while it runs; nothing else is read in the meantime.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::error::{Result, RpcError};
use crate::messages::{Incoming, RequestId, Response};
use crate::transport::{Frame, LineReader, Outbound, DEFAULT_MAX_LINE_BYTES};

/// Method router invoked once per inbound request or notification.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handle one call. For notifications the result is discarded.
    async fn handle(&self, method: &str, params: Value, ctx: &CallContext) -> std::result::Result<Value, RpcError>;

    /// Parameters of the `ready` notification sent at startup, if any.
    fn ready(&self) -> Option<Value> {
        None
    }
}

/// Per-call view of the connection.
pub struct CallContext {
    id: Option<RequestId>,
    outbound: Outbound,
    shutdown: Arc<AtomicBool>,
}

impl CallContext {
    /// The request id; `None` for notifications.
    pub fn id(&self) -> Option<&RequestId> {
        self.id.as_ref()
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Emit a notification line while the call is in flight.
    pub async fn notify(&self, method: &str, params: Value) -> Result<()> {
        self.outbound.notify(method, params).await
    }

    pub fn outbound(&self) -> &Outbound {
        &self.outbound
    }

    /// Stop the loop after the current line has been answered.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub max_line_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

/// What happened during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerReport {
    pub requests: u64,
    pub notifications: u64,
    /// Error responses written, including parse and framing errors.
    pub errors: u64,
    /// True if the loop ended because shutdown was requested.
    pub shutdown: bool,
}

/// Line-delimited JSON-RPC server.
pub struct Server<H> {
    handler: H,
    config: ServerConfig,
}

impl<H: Handler> Server<H> {
    pub fn new(handler: H, config: ServerConfig) -> Self {
        Self { handler, config }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Serve until end of input or shutdown.
    pub async fn run<R, W>(&self, reader: R, writer: W) -> Result<ServerReport>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let outbound = Outbound::new(writer);
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut lines = LineReader::new(reader, self.config.max_line_bytes);
        let mut report = ServerReport::default();

        if let Some(params) = self.handler.ready() {
            outbound.notify("ready", params).await?;
        }
        info!("control loop started");

        while !shutdown.load(Ordering::SeqCst) {
            let Some(frame) = lines.next_frame().await? else {
                debug!("input closed");
                break;
            };

            match frame {
                Frame::Oversized { discarded } => {
                    report.errors += 1;
                    let error = RpcError::ParseError(format!("line exceeds limit ({discarded} bytes discarded)"));
                    outbound.send(&Response::error(None, error.to_error_object())).await?;
                }
                Frame::InvalidUtf8 { len } => {
                    report.errors += 1;
                    let error = RpcError::ParseError(format!("line is not valid UTF-8 ({len} bytes)"));
                    outbound.send(&Response::error(None, error.to_error_object())).await?;
                }
                Frame::Line(line) => {
                    self.dispatch(&line, &outbound, &shutdown, &mut report).await?;
                }
            }
        }

        report.shutdown = shutdown.load(Ordering::SeqCst);
        info!(
            requests = report.requests,
            notifications = report.notifications,
            errors = report.errors,
            shutdown = report.shutdown,
            "control loop stopped"
        );
        Ok(report)
    }

    async fn dispatch(
        &self,
        line: &str,
        outbound: &Outbound,
        shutdown: &Arc<AtomicBool>,
        report: &mut ServerReport,
    ) -> Result<()> {
        let incoming = match Incoming::parse(line) {
            Ok(incoming) => incoming,
            Err(rejected) => {
                report.errors += 1;
                warn!(error = %rejected.error, "rejected inbound line");
                let response = Response::error(rejected.id, rejected.error.to_error_object());
                return outbound.send(&response).await;
            }
        };

        match incoming {
            Incoming::Response => {
                debug!("ignoring inbound response");
                Ok(())
            }
            Incoming::Notification(notification) => {
                report.notifications += 1;
                let ctx = CallContext {
                    id: None,
                    outbound: outbound.clone(),
                    shutdown: Arc::clone(shutdown),
                };
                if let Err(e) = self
                    .handler
                    .handle(&notification.method, notification.params, &ctx)
                    .await
                {
                    warn!(method = %notification.method, error = %e, "notification failed");
                }
                Ok(())
            }
            Incoming::Request(request) => {
                report.requests += 1;
                debug!(method = %request.method, "request");
                let ctx = CallContext {
                    id: Some(request.id.clone()),
                    outbound: outbound.clone(),
                    shutdown: Arc::clone(shutdown),
                };

                let response = match self.handler.handle(&request.method, request.params, &ctx).await {
                    Ok(result) => Response::success(request.id, result),
                    Err(e) => {
                        report.errors += 1;
                        debug!(method = %request.method, code = e.code(), error = %e, "request failed");
                        Response::error(Some(request.id), e.to_error_object())
                    }
                };
                outbound.send(&response).await
            }
        }
    }
}
