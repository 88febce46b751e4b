//! Client-side engine: a local replica of the event list kept in sync with an [`EventStore`],
//! plus the presentation helpers viewers run on top of it.
//!
//! [`EventStore`]: crate::dao::event_store::EventStore

pub mod animator;
pub mod feed;
pub mod reorder;
pub mod replica;
pub mod store;
#[cfg(test)]
pub(crate) mod testing;
pub mod ticker;

pub use animator::{RevealTimings, ScoreRevealAnimator, ScoreboardView};
pub use feed::{ChangeFeed, FeedStatus};
pub use reorder::ReorderCoordinator;
pub use store::{LiveConfig, LiveEvents, Listing, Subscription};
pub use ticker::MatchClockTicker;
