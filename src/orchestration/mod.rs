//! Orchestration: the flows that tie chain sources, engines and storage
//! together under the right locks.

pub mod rebuild;
pub mod refresh;

pub use rebuild::{LedgerRebuilder, RebuildResult};
pub use refresh::{RefreshCoordinator, RefreshResult};
