//! Domain models for the generative client.

pub mod media;
pub mod operation;
pub mod usage;

pub use media::{
    GeneratedImage, GeoPoint, GroundedAnswer, GroundingSource, ImageQuality, InlineImage, Voice,
};
pub use operation::RemoteOperation;
pub use usage::{EntitlementStatus, Language, ProfileUpdate, TierMetadata, UsageRecord};
