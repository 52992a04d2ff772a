//! Frame sources: a directory catalog (producer side) or a live feed.
//!
//! | Module    | Purpose                                           |
//! |-----------|---------------------------------------------------|
//! | `catalog` | `FileRecord`, ordering, `DirectorySource`         |
//! | `loader`  | Lazy per-record decode                            |
//! | `live`    | Bounded channel of `RawLine`s from acquisition    |

pub mod catalog;
pub mod live;
pub mod loader;

pub use catalog::{DirectorySource, FileRecord, TransmitStatus, catalog_order, scan_directory};
pub use live::{DEFAULT_FEED_CAPACITY, LiveFeed, LiveFeedSender};
pub use loader::{load_decoded, load_path};
