//! Inbound media: MIME to extension mapping, storage under the served media
//! directory, and deferred cleanup.

pub mod cleanup;
pub mod mime;
pub mod store;

pub use {
    cleanup::schedule_cleanup,
    store::{MediaError, MediaStore, StoredMedia},
};
