//! Data carried between the route layer and the storage/caption services.
//!
//! Images and caption records live in the bucket as plain objects; these
//! types describe their names, their JSON payloads, and the metadata the
//! local backend keeps for them.

pub mod caption;
pub mod object;
