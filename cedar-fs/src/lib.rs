//! Filesystem enumeration, content digests, bin-packing and dependency
//! ordering shared by the cedar-backup engine.
//!
//! This crate has no knowledge of collect/stage/store/purge configuration
//! or of optical media; it only knows how to walk directory trees, hash
//! files, pack them into capacity-bounded spans, and order a set of named
//! vertices subject to before/after constraints.

pub mod digest;
pub mod error;
pub mod graph;
pub mod knapsack;
pub mod list;
pub mod path;

pub use digest::digest_file;
pub use error::{FsError, Result};
pub use graph::DirectedGraph;
pub use knapsack::Algorithm;
pub use list::{BackupFileList, ExcludePolicy, FilesystemList, PurgeItemList, SpanItem, TarMode};
