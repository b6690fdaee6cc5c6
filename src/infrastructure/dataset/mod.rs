//! Dataset source adapters.

pub mod jsonl;

pub use jsonl::JsonlDataset;
