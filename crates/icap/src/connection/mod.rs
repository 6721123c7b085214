//! ICAP connections.
//!
//! - [`IcapConnection`]: the server side loop that reads requests, runs the preview
//!   exchange and writes responses, one request at a time
//! - [`IcapClient`]: outbound requests to a remote ICAP service, with OPTIONS discovery
//!   and transparent preview/continue

mod icap_client;
mod icap_connection;

pub use crate::protocol::ClientError;
pub use icap_client::DEFAULT_PORT;
pub use icap_client::IcapClient;
pub use icap_connection::IcapConnection;
