//! # void_core - Void Engine Core
//!
//! Zero-dependency primitives shared by the reconciler crates:
//! - **Handles**: generational indices into arena storage, so cyclic graphs
//!   (parent/child/sibling/alternate links) are plain copyable values
//! - **Errors**: the small core error vocabulary
//! - **Guards**: panic isolation for user-supplied callbacks

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std as alloc;

pub mod handle;
pub mod error;

#[cfg(feature = "std")]
pub mod guard;

pub use handle::*;
pub use error::*;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::handle::{Handle, HandleMap};
    pub use crate::error::{CallbackError, Error, HandleError, Result};

    #[cfg(feature = "std")]
    pub use crate::guard::catch_panic;
}
