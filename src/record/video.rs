// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{check_finite, check_not_blank, FeedRecord, Snapshot};

/// A video item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub id: i64,
    pub title: Option<String>,
    pub videourl: Option<String>,
    pub source: Option<String>,
    pub publisher_id: Option<i64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub score: Option<f64>,
    pub thumbnailurl: Option<String>,
}

/// Create payload for [`VideoRecord`]. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VideoDraft {
    pub title: Option<String>,
    pub videourl: Option<String>,
    pub source: Option<String>,
    pub publisher_id: Option<i64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub score: Option<f64>,
    pub thumbnailurl: Option<String>,
}

impl FeedRecord for VideoRecord {
    type Draft = VideoDraft;

    fn id(&self) -> i64 {
        self.id
    }

    fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    fn validate(draft: &VideoDraft) -> Result<(), String> {
        if let Some(ref url) = draft.videourl {
            check_not_blank("videourl", url)?;
        }
        check_finite("score", draft.score)
    }

    fn from_draft(id: i64, draft: VideoDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: draft.title,
            videourl: draft.videourl,
            source: draft.source,
            publisher_id: draft.publisher_id,
            timestamp: Some(draft.timestamp.unwrap_or(now)),
            score: draft.score,
            thumbnailurl: draft.thumbnailurl,
        }
    }

    fn with_id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }
}

/// Snapshot function for the video collection.
pub fn video_snapshot(video: &VideoRecord) -> Snapshot {
    Snapshot::new(video.id)
        .with("title", video.title.clone())
        .with("videourl", video.videourl.clone())
        .with("source", video.source.clone())
        .with("publisher_id", video.publisher_id)
        .with("timestamp", video.timestamp.map(|t| t.to_rfc3339()))
        .with("score", video.score.map_or(Value::Null, Value::from))
        .with("thumbnailurl", video.thumbnailurl.clone())
}
