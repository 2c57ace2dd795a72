//! Read-only view of a BIDS dataset: file index, sidecar inheritance and
//! fieldmap lookup.

pub mod entities;
pub mod fieldmap;
pub mod layout;
pub mod metadata;

pub use entities::BidsName;
pub use fieldmap::Fieldmap;
pub use layout::{BidsFile, BidsLayout, Query, IMAGE_EXTENSIONS};
pub use metadata::Metadata;
