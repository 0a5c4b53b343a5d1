// Copyright (c) 2022 MASSA LABS <info@massa.net>
//! Hashing primitives: a 32 bytes blake3 `Hash` for identifiers and state roots, and
//! the extended `HashXof` used to maintain the order independent state digest.

#![warn(missing_docs)]
#![warn(unused_crate_dependencies)]
pub use error::NoahHashError;
pub use hash::Hash;
pub use hash_xof::HashXof;
pub use settings::{HASH_SIZE_BYTES, HASH_XOF_SIZE_BYTES};

mod error;
mod hash;
mod hash_xof;
mod settings;
