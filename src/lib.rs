//! # Tally - Shared Counter Synchronization
//!
//! Keeps a server-hosted map of named counters in sync across many
//! clients. Each client mutates through request/response calls and sees
//! every change through two channels merged into one snapshot stream:
//!
//! - **Push channel**: the service's broadcast stream (WebSocket, with a
//!   polling fallback)
//! - **Local echo**: after each of this client's own mutations, the full
//!   state is re-read and published in-process, so a client sees its own
//!   edits without waiting for the broadcast round trip
//!
//! Snapshots are always complete maps; consumers replace what they show
//! with whichever snapshot arrived last.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tally_sync::{CounterName, CounterSync, MutationKind, SyncConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let sync = CounterSync::new(SyncConfig::new("http://127.0.0.1:3000")?)?;
//!
//!     let subscription = sync.subscribe(|snapshot| {
//!         for (name, count) in snapshot.iter() {
//!             println!("{name}: {count}");
//!         }
//!     });
//!
//!     let apple = CounterName::new("apple")?;
//!     sync.mutate(MutationKind::AddCounter, &apple).await?;
//!     sync.mutate(MutationKind::Increment, &apple).await?;
//!
//!     subscription.unsubscribe().await;
//!     Ok(())
//! }
//! ```

pub mod board;
pub mod config;
pub mod counters;
pub mod error;
pub mod server;
pub mod sync;

// Re-export main types for library consumers
pub use board::CounterBoard;
pub use config::{SyncConfig, Transport};
pub use counters::{CounterMap, CounterName, MutationKind, Snapshot};
pub use error::{ErrorCategory, Result, SyncError};
pub use sync::{CounterSync, EchoBus, PushChannel, RemoteGateway, Subscription};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
