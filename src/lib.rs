#![no_std]

//! A smart pointer that lets any number of independent owners share one heap
//! allocation and frees it exactly once, when the last owner lets go.
//!
//! The shared count is updated atomically, so aliasing [`Shared`] handles may
//! be used from different threads; the pointee itself is not synchronized.

extern crate maybe_std as base;

mod shared;
pub use shared::*;
