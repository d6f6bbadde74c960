//! # Memory Layout
//!
//! Index structures shared by every component storage.
//!
//! ## Design Philosophy
//!
//! Sparse lookups must not cost memory proportional to the largest id ever
//! seen. Pages are allocated lazily and handed back as soon as they empty.

mod pages;

pub use pages::{SparsePages, PAGE_BITS, PAGE_SIZE};
