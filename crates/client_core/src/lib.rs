//! Client side of the course outline: per-scope reorder controllers, the
//! item store they persist through, and the change feed that keeps them in
//! step with the server.

pub mod config;
pub mod controller;
pub mod feed;
pub mod ordering;
pub mod outline;
pub mod store;

pub use config::{load_client_settings, ClientSettings};
pub use controller::{
    RefreshOutcome, ReorderController, ReorderNotice, ReorderStatus, ReorderTimings, ReorderView,
};
pub use feed::{spawn_change_feed, FeedEvent};
pub use ordering::{OrderedItem, ReorderOperation};
pub use outline::CourseOutline;
pub use store::{HttpItemStore, ItemStore};
