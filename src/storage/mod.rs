// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Key-value store backends (Redis, in-memory) behind [`SortedSetStore`].

pub mod memory;
pub mod redis;
pub mod traits;

pub use self::memory::InMemoryStore;
pub use self::redis::RedisStore;
pub use self::traits::{MemoryInfo, Pipeline, SortedSetStore, StoreError, StoreOp};
