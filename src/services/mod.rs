pub mod blob_store;
pub mod captioner;
pub mod gcs_store;
pub mod local_store;
pub mod memory_store;
pub mod scratch;
