//! Durable infinite keyed FIFO with a bounded in-memory prefetch window.

pub mod codec;
pub mod key;
pub mod sqlite;

pub use sqlite::SqlitePersistentQueue;
