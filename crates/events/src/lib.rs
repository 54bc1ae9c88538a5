//! Push-notification fan-out for job progress.
//!
//! [`NotificationHub`] maintains the set of subscribers per job and
//! delivers tagged full-state snapshots to every attached channel after
//! each job update.

mod hub;

pub use hub::{EventKind, NotificationHub, PushEvent, SubscriberId};
