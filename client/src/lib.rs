//! # Tally Client
//!
//! Device-side half of Tally sync. Wraps a [`tally_engine::LocalStore`] with
//! a scheduler that pushes pending operations to the server, pulls what
//! other terminals did, and persists everything between restarts.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tally_client::{ClientConfig, FileStateStore, HttpTransport, SyncClient};
//! use tally_engine::Identity;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::from_env()?;
//! let transport = Arc::new(HttpTransport::from_config(&config)?);
//! let state = Arc::new(FileStateStore::new(config.state_path.clone()));
//! let (_online, online_rx) = tokio::sync::watch::channel(true);
//!
//! let client = SyncClient::open(config, transport, state, online_rx).await?;
//! client.set_identity(Some(Identity::user("cashier-1")));
//! client.start().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod state;
pub mod transport;

pub use config::{ClientConfig, ConfigError};
pub use engine::{now_millis, PassSummary, SyncClient, SyncEvent, SyncOutcome};
pub use error::{SyncError, SyncResult};
pub use http::HttpTransport;
pub use state::{FileStateStore, MemoryStateStore, StateStore};
pub use transport::{MockReply, MockTransport, SyncTransport};
