//! Key storage.
//!
//! - `persistence` → whole-document load/save (JSON file, in-memory)
//! - `key_store`   → key lifecycle and the check state machine

pub mod key_store;
pub mod persistence;

pub use key_store::{CheckOutcome, HistoryView, KeyStore, RejectReason, StoreSettings};
pub use persistence::{JsonFilePersistence, MemoryPersistence, Persistence};
