pub mod clock;
pub mod in_memory;
pub mod messenger;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod transcode;
