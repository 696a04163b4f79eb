//! Domain types shared by every layer.

pub mod id;
pub mod record;
pub mod status;
pub mod traits;

pub use record::{Assessment, ClassificationRecord, ImageRef};
pub use status::{FailureKind, RecordStatus};
pub use traits::{TraitMeasurement, TraitUnit, Traits};
