// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! List query normalisation.
//!
//! The cache path and the source fallback both read the same [`ListQuery`],
//! so page arithmetic cannot drift between them.

use serde::Deserialize;

use crate::config::FeedCacheConfig;

/// Raw query-string parameters, as received.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub all: Option<String>,
}

impl ListParams {
    #[must_use]
    pub fn page(page: u64, limit: u64) -> Self {
        Self {
            page: Some(page.to_string()),
            limit: Some(limit.to_string()),
            all: None,
        }
    }

    #[must_use]
    pub fn all() -> Self {
        Self {
            all: Some("true".into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_limit: u64,
    pub max_limit: u64,
    pub max_all: u64,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self::from_config(&FeedCacheConfig::default())
    }
}

impl PageLimits {
    #[must_use]
    pub fn from_config(config: &FeedCacheConfig) -> Self {
        let max_limit = config.max_limit.max(1);
        Self {
            default_limit: config.default_limit.clamp(1, max_limit),
            max_limit,
            max_all: config.max_all,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListQuery {
    Page { page: u64, limit: u64 },
    All { max_items: u64 },
}

fn parse_int(value: Option<&str>, default: i64, min: i64, max: i64) -> i64 {
    value
        .and_then(|v| v.trim().parse::<i64>().ok())
        .map_or(default, |n| n.clamp(min, max))
}

impl ListQuery {
    /// Unparsable numbers fall back to defaults; page is at least 1 and limit
    /// is clamped to `[1, max_limit]`. `all=true` (any case) wins over paging.
    #[must_use]
    pub fn from_params(params: &ListParams, limits: &PageLimits) -> Self {
        let all = params.all.as_deref().is_some_and(|v| v.eq_ignore_ascii_case("true"));
        if all {
            return Self::All { max_items: limits.max_all };
        }

        let max_limit = i64::try_from(limits.max_limit).unwrap_or(i64::MAX);
        let default_limit = i64::try_from(limits.default_limit).unwrap_or(max_limit);

        let page = parse_int(params.page.as_deref(), 1, 1, i64::MAX);
        let limit = parse_int(params.limit.as_deref(), default_limit, 1, max_limit);

        Self::Page {
            page: page as u64,
            limit: limit as u64,
        }
    }
}
