//! Storage layer for the gazetteer
//!
//! This crate implements the transactional row store the engine runs on:
//! - rows: `versions`, `patch_requests` and `comments` table rows
//! - Transaction: snapshot reads plus a buffered write set
//! - TableStore: optimistic commit (first committer wins) with optional WAL
//!
//! The engine never mutates tables directly; every change goes through a
//! [`Transaction`] committed by a [`Storage`] implementation.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod rows;
pub mod store;
pub mod transaction;

pub use rows::{CommentRow, PatchRequestRow, RequestState, VersionRow};
pub use store::{CommitRecord, Storage, TableStore};
pub use transaction::{Tables, Transaction, WriteSet};
