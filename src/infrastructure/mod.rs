//! Adapters behind the ports: storage backends and notification
//! dispatchers.

pub mod dispatch;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
