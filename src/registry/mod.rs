//! Typed record registry
//!
//! Maps a record shape id to the capability that knows how to pull a
//! title, content, link and the rest out of records of that shape.
//! Resolution is by exact shape id; anything unmatched falls back to
//! [`GenericCapability`].

mod builtin;
mod capability;
mod registry;
mod text;

pub use builtin::{
    BlogEntryCapability, DiscoveredCapability, FollowCapability, GalleryCapability,
    GenericCapability, LikeCapability, PostCapability, ProfileCapability, RepostCapability,
    StatusCapability,
};
pub use capability::{AuthorInfo, PresentationMode, RenderedSummary, ShapeCapability};
pub use registry::TypeRegistry;
pub use text::{short_did, truncate_text};
