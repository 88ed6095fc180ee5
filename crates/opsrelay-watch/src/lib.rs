//! # OpsRelay Watch
//!
//! The Drive-PDF watch-and-route pipeline: a scheduled poller that detects
//! newly-appeared PDFs in a cloud folder, dedups them against a persisted
//! history, routes them through a user-configured conditional flow (or a
//! static fallback), and forwards matched files as chunked text messages.
//!
//! ## Architecture
//! ```text
//! WatchManager (tokio interval)
//!   └── run_cycle
//!       ├── FileSource.list_pdfs        (newest first, PDFs only)
//!       ├── WatchDb.existing_ids        (dedup against history)
//!       ├── WatchDb.put_many            (atomic, duplicate-tolerant)
//!       ├── flow::evaluate | fallback   (conditional routing → chunked sends)
//!       └── WatchDb.merge_status        (single merged record per watcher)
//! ```
//!
//! Every external call is caught at the cycle boundary: a cycle ends by
//! writing either an ok status or an error status, never by unwinding
//! into the scheduler loop.

pub mod chunk;
pub mod cycle;
pub mod flow;
pub mod manager;
pub mod store;

pub use chunk::{MAX_MESSAGE_LEN, chunk_messages, format_entry};
pub use cycle::{CycleOutcome, CycleSettings, run_cycle};
pub use flow::{EdgeLabel, Flow, FlowEdge, FlowNode, FlowReport, NodeKind, evaluate};
pub use manager::{WatchContext, WatchManager, replay_recent};
pub use store::WatchDb;
