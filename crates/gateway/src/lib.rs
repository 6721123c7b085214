//! An ICAP gateway built on `micro-icap`.
//!
//! Each configured service is mounted at `icap://<host>/<name>` and answers OPTIONS,
//! REQMOD and RESPMOD. Bodies are classified by file extension, checked against the
//! size limit and handed to a [`Scanner`](scanner::Scanner) or a remote ICAP service;
//! the verdict becomes a `204`, a modified message or a block page.
//!
//! ```no_run
//! use micro_icap_gateway::config::AppConfig;
//! use micro_icap_gateway::{Server, ServiceRegistry};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::from_json(r#"{ "services": [{ "name": "echo", "resp_mode": true }] }"#).unwrap();
//!     let registry = ServiceRegistry::from_config(&config).unwrap();
//!
//!     let server = Server::builder().address(config.address.as_str()).registry(registry).build().unwrap();
//!     server.start().await.unwrap();
//! }
//! ```

mod block_page;
mod dispatch;
mod encoding;
mod pipeline;
mod policy;
mod registry;
mod server;

pub mod config;
pub mod scanner;

pub use config::ConfigError;
pub use pipeline::Gateway;
pub use policy::FileAction;
pub use registry::Backend;
pub use registry::Service;
pub use registry::ServiceRegistry;
pub use scanner::ScanError;
pub use server::Server;
pub use server::ServerBuildError;
pub use server::ServerBuilder;
pub use server::ServerError;
