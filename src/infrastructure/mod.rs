pub mod in_memory;
pub mod mpesa;
pub mod notifier;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
