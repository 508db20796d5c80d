//! Durability layer for the gazetteer store
//!
//! This crate handles everything that touches disk:
//!
//! - WAL: single-file write-ahead log with one record per committed transaction
//! - Durability modes: Always, Standard (default)
//! - Record framing: length prefix + CRC32 for torn-write and corruption detection

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod encoding;
pub mod wal;

pub use encoding::{decode_record, encode_record, Decoded};
pub use wal::{DurabilityMode, Wal};
