//! An asynchronous ICAP (RFC 3507) protocol engine.
//!
//! The crate covers the wire protocol and leaves adaptation decisions to a [`Handler`]:
//!
//! - [`protocol`]: methods, statuses, the `Encapsulated` layout and the request and
//!   response types
//! - [`codec`]: streaming decoders and encoders for heads and chunked bodies, including
//!   the `ieof` extension
//! - [`preview`]: preview truncation, accounting and advertisement
//! - [`connection`]: the server side connection loop and an outbound client
//!
//! # Example
//!
//! ```no_run
//! use std::convert::Infallible;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use tracing::{error, info, warn};
//! use micro_icap::connection::IcapConnection;
//! use micro_icap::handler::{make_handler, Outcome};
//! use micro_icap::protocol::{IcapRequest, IcapResponse, IcapStatus};
//!
//! #[tokio::main]
//! async fn main() {
//!     let tcp_listener = match TcpListener::bind("127.0.0.1:1344").await {
//!         Ok(tcp_listener) => tcp_listener,
//!         Err(e) => {
//!             error!(cause = %e, "bind server error");
//!             return;
//!         }
//!     };
//!
//!     // answer every request with "no modification"
//!     let handler = Arc::new(make_handler(|_: &IcapRequest| async {
//!         Ok::<_, Infallible>(Outcome::Respond(IcapResponse::status_only(IcapStatus::NO_CONTENT)))
//!     }));
//!
//!     loop {
//!         let (tcp_stream, _remote_addr) = match tcp_listener.accept().await {
//!             Ok(stream_and_addr) => stream_and_addr,
//!             Err(e) => {
//!                 warn!(cause = %e, "failed to accept");
//!                 continue;
//!             }
//!         };
//!
//!         let handler = handler.clone();
//!         tokio::spawn(async move {
//!             let (reader, writer) = tcp_stream.into_split();
//!             match IcapConnection::new(reader, writer).process(handler).await {
//!                 Ok(()) => info!("finished process, connection shutdown"),
//!                 Err(e) => error!("service has error, cause {}, connection shutdown", e),
//!             }
//!         });
//!     }
//! }
//! ```
//!
//! [`Handler`]: handler::Handler

pub mod codec;
pub mod connection;
pub mod handler;
pub mod preview;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;
