//! Record persistence with validated, atomic state transitions.

pub mod events;
pub mod record_store;

pub use events::{RecordEvent, RecordEventBroadcaster};
pub use record_store::RecordStore;
pub(crate) use record_store::timestamp_now;
