//! Derived views over synchronized records

mod blob;
mod gallery;

pub use blob::{blob_url, extract_blob_cid, DEFAULT_BLOB_SERVICE};
pub use gallery::{GalleryGrouper, GalleryImage, ProcessedGallery};
