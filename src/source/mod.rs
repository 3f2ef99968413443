// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Authoritative record sources behind [`RecordSource`].

pub mod memory;
pub mod sql;
pub mod traits;

pub use self::memory::{recency_order, InMemorySource};
pub use self::sql::{connect_pool, SqlRecord, SqlSource, SqlValue};
pub use self::traits::{RecordSource, SourceError};
