//! Output and upload storage
//!
//! - [`SegmentStore`]: the directory the transcoder writes the manifest and
//!   segments into, with the readiness check over its contents
//! - [`UploadStore`]: holds the most recent client upload

pub mod segment_store;
pub mod upload;

pub use segment_store::{
    assess_readiness, Readiness, SegmentStore, StoreFile, INIT_SEGMENT_TEMPLATE, MANIFEST_NAME,
    MEDIA_SEGMENT_TEMPLATE, MIN_READY_SEGMENTS,
};
pub use upload::UploadStore;
