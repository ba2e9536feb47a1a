pub mod transfer;
pub use transfer::{PendingTransfer, Transfer};

pub mod raw_event;
pub use raw_event::RawEvent;

pub mod filter;
pub use filter::{BlockRange, EventFilter};

pub mod network;
pub use network::Network;

pub mod format;
pub use format::group_digits;
