// Copyright (c) 2022 MASSA LABS <info@massa.net>
//! Interface of the versioned tree store: the controller trait, the batch types,
//! the configuration, the errors and the storage layout constants.

mod constants;
mod controller;
mod db_batch;
mod error;
mod settings;

pub use constants::*;
pub use controller::*;
pub use db_batch::*;
pub use error::*;
pub use settings::*;
