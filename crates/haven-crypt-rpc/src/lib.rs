//! # Haven Crypt RPC
//!
//! Line-delimited JSON-RPC 2.0 over a duplex byte stream.
//!
//! ## Overview
//!
//! Each line is one JSON object terminated by `\n`. The host writes
//! requests and notifications; the server writes responses, a `ready`
//! notification at startup, and progress notifications while a request is
//! in flight.
//!
//! Requests are processed strictly one at a time. A second request is not
//! read until the first has been answered, so responses always leave in
//! submission order.
//!
//! ## Message Flow
//!
//! ```text
//! Host                                Server
//!   |<------- ready -------------------|
//!   |-------- {id:1, encrypt} -------->|
//!   |<------- encryptProgress ---------|
//!   |<------- encryptProgress ---------|
//!   |<------- {id:1, result} ----------|
//!   |-------- {id:2, ping} ----------->|
//!   |<------- {id:2, "pong"} ----------|
//! ```

pub mod error;
pub mod messages;
pub mod server;
pub mod transport;

pub use error::{Result, RpcError};
pub use messages::{
    codes, ErrorObject, Incoming, Notification, Rejected, Request, RequestId, Response,
    JSONRPC_VERSION,
};
pub use server::{CallContext, Handler, Server, ServerConfig, ServerReport};
pub use transport::{Frame, LineReader, Outbound, DEFAULT_MAX_LINE_BYTES};
