//! File formats used by the extraction cache and the dataset sink.
//!
//! - [`jsonl`]: lossless raw-table artifacts (one record per line)
//! - [`csv`]: flat cleaned datasets for model training
//! - [`atomic`]: write-then-rename helper so readers never observe partial files

pub mod atomic;
pub mod csv;
pub mod jsonl;
