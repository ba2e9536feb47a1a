//! Live ERC-20 transfer feed.
//!
//! A session loads recent history and follows new transfers at the same
//! time, reconciles both into one newest-first collection and publishes
//! filtered, sorted snapshots to its readers.

pub mod age;
pub mod backfill;
pub mod error;
pub mod live;
pub mod reconciler;
pub mod resolver;
pub mod retry;
pub mod session;
pub mod view;

pub use age::{format_age, Clock, SystemClock};
pub use error::{FeedError, FilterError};
pub use session::{Connectivity, FeedHandle, FeedSnapshot, HistoryState};
pub use view::{SortKey, SortState, TransferRow, ViewState};
