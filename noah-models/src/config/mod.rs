// Copyright (c) 2022 MASSA LABS <info@massa.net>
//! Protocol constants
//!
//! Every value in `constants` is part of consensus: changing one of them on a single node
//! makes it produce different state roots than the rest of the network. Module configs
//! such as `StateConfig` take their defaults from here.

pub mod constants;

pub use constants::*;
