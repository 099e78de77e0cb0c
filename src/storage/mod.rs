//! Heap persistence.
//!
//! - [`record_file`]: the on-disk record file the VM heap is mirrored to

pub mod record_file;
