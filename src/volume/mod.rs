//! Volume description: brick ids, addressing, metadata and its text descriptor

pub mod brick_id;
pub mod address;
pub mod metadata;
pub mod descriptor;

pub use brick_id::BrickId;
pub use address::BrickAddress;
pub use metadata::{ColorDepth, Metadata};
