//! Pure computation engines: no I/O, no locking, deterministic output.

pub mod apr;
pub mod ledger;
pub mod status;

pub use apr::{build_apr_periods, summarize, AprPeriod, AprSummary};
pub use ledger::{LedgerReplay, ReplayError, ReplayOutput};
pub use status::{derive_status, PositionStatus, StatusError};
