// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{check_finite, check_not_blank, FeedRecord, Snapshot};

/// Maximum length of the unique `source` URL column.
const SOURCE_MAX_LEN: usize = 255;

/// A news item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsRecord {
    pub id: i64,
    pub title: String,
    pub summary: String,
    /// Source URL (unique per item)
    pub source: String,
    pub imageurl: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub score: Option<f64>,
    pub topic_id: Option<i64>,
    pub category_id: Option<i64>,
}

/// Create payload for [`NewsRecord`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewsDraft {
    pub title: String,
    pub summary: String,
    pub source: String,
    #[serde(default)]
    pub imageurl: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub topic_id: Option<i64>,
    #[serde(default)]
    pub category_id: Option<i64>,
}

impl FeedRecord for NewsRecord {
    type Draft = NewsDraft;

    fn id(&self) -> i64 {
        self.id
    }

    fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    fn validate(draft: &NewsDraft) -> Result<(), String> {
        check_not_blank("title", &draft.title)?;
        check_not_blank("summary", &draft.summary)?;
        check_not_blank("source", &draft.source)?;
        if draft.source.len() > SOURCE_MAX_LEN {
            return Err(format!("'source' exceeds {} characters", SOURCE_MAX_LEN));
        }
        check_finite("score", draft.score)
    }

    fn from_draft(id: i64, draft: NewsDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: draft.title,
            summary: draft.summary,
            source: draft.source,
            imageurl: draft.imageurl,
            timestamp: Some(draft.timestamp.unwrap_or(now)),
            score: draft.score,
            topic_id: draft.topic_id,
            category_id: draft.category_id,
        }
    }

    fn with_id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }
}

/// Snapshot function for the news collection.
pub fn news_snapshot(news: &NewsRecord) -> Snapshot {
    Snapshot::new(news.id)
        .with("title", news.title.clone())
        .with("summary", news.summary.clone())
        .with("source", news.source.clone())
        .with("imageurl", news.imageurl.clone())
        .with("timestamp", news.timestamp.map(|t| t.to_rfc3339()))
        .with("score", news.score.map_or(Value::Null, Value::from))
        .with("topic_id", news.topic_id)
        .with("category_id", news.category_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn draft() -> NewsDraft {
        serde_json::from_value(json!({
            "title": "Rates unchanged",
            "summary": "The bank held rates.",
            "source": "https://example.com/rates",
        }))
        .unwrap()
    }

    #[test]
    fn test_from_draft_defaults_timestamp() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let news = NewsRecord::from_draft(5, draft(), now);
        assert_eq!(news.id, 5);
        assert_eq!(news.timestamp, Some(now));
    }

    #[test]
    fn test_validate_rejects_blank_title() {
        let mut d = draft();
        d.title = "  ".into();
        assert!(NewsRecord::validate(&d).unwrap_err().contains("title"));
    }

    #[test]
    fn test_validate_rejects_long_source() {
        let mut d = draft();
        d.source = "x".repeat(300);
        assert!(NewsRecord::validate(&d).is_err());
    }

    #[test]
    fn test_missing_required_field_fails_deserialize() {
        let result: Result<NewsDraft, _> = serde_json::from_value(json!({"title": "only"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_snapshot_fields() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let news = NewsRecord::from_draft(9, draft(), ts);
        let snapshot = news_snapshot(&news);

        assert_eq!(snapshot.id, 9);
        assert_eq!(snapshot.get("title"), Some(&json!("Rates unchanged")));
        assert_eq!(snapshot.get("timestamp"), Some(&json!("2026-01-02T03:04:05+00:00")));
        assert_eq!(snapshot.get("score"), Some(&Value::Null));
        assert_eq!(snapshot.get("imageurl"), Some(&Value::Null));
        assert_eq!(snapshot.fields.len(), 8);
    }
}
