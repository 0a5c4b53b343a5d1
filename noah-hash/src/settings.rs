// Copyright (c) 2022 MASSA LABS <info@massa.net>

/// Hash size
pub const HASH_SIZE_BYTES: usize = 32;

/// Extended hash size, used for the XOR state digest
pub const HASH_XOF_SIZE_BYTES: usize = 512;
