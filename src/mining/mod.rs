//! Transaction pooling and double-spend detection

pub mod mempool;

pub use mempool::{Mempool, MempoolError, DEFAULT_MEMPOOL_SIZE};
