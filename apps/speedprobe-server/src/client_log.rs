use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

pub const MAX_ENTRIES: usize = 500;
pub const MAX_AGE: Duration = Duration::days(30);

/// One client-side telemetry report as received.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientReport {
    pub received_at: DateTime<Utc>,
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
    pub payload: Value,
}

/// In-memory log of client reports, bounded by count and by age.
#[derive(Clone, Default)]
pub struct ClientLog {
    entries: Arc<Mutex<VecDeque<ClientReport>>>,
}

impl ClientLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `report`, dropping entries older than [`MAX_AGE`] relative to its
    /// receipt time and then the oldest beyond [`MAX_ENTRIES`]. Returns the
    /// number of entries kept.
    pub fn record(&self, report: ClientReport) -> usize {
        let now = report.received_at;
        let mut entries = self.entries.lock();
        entries.retain(|entry| now - entry.received_at <= MAX_AGE);
        entries.push_back(report);
        while entries.len() > MAX_ENTRIES {
            entries.pop_front();
        }
        entries.len()
    }

    /// Oldest first.
    pub fn entries(&self) -> Vec<ClientReport> {
        self.entries.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report(received_at: DateTime<Utc>, seq: usize) -> ClientReport {
        ClientReport {
            received_at,
            remote_addr: None,
            user_agent: None,
            payload: json!({ "seq": seq }),
        }
    }

    #[test_timeout::timeout]
    fn keeps_only_the_newest_entries() {
        let log = ClientLog::new();
        let now = Utc::now();
        for seq in 0..MAX_ENTRIES + 20 {
            let kept = log.record(report(now, seq));
            assert_eq!(kept, (seq + 1).min(MAX_ENTRIES));
        }
        let entries = log.entries();
        assert_eq!(entries.len(), MAX_ENTRIES);
        assert_eq!(entries[0].payload, json!({ "seq": 20 }));
        assert_eq!(entries[MAX_ENTRIES - 1].payload, json!({ "seq": MAX_ENTRIES + 19 }));
    }

    #[test_timeout::timeout]
    fn expires_entries_older_than_thirty_days() {
        let log = ClientLog::new();
        let now = Utc::now();
        log.record(report(now - Duration::days(31), 0));
        log.record(report(now - MAX_AGE, 1));
        log.record(report(now - Duration::days(2), 2));
        assert_eq!(log.entries().len(), 3);

        assert_eq!(log.record(report(now, 3)), 3);
        let kept: Vec<Value> = log.entries().into_iter().map(|e| e.payload).collect();
        assert_eq!(
            kept,
            vec![json!({ "seq": 1 }), json!({ "seq": 2 }), json!({ "seq": 3 })]
        );
    }

    #[test_timeout::timeout]
    fn report_serializes_camel_case() {
        let at = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let entry = ClientReport {
            received_at: at,
            remote_addr: Some("198.51.100.4".into()),
            user_agent: None,
            payload: json!([1, 2]),
        };
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({
                "receivedAt": "2024-05-01T12:00:00Z",
                "remoteAddr": "198.51.100.4",
                "userAgent": null,
                "payload": [1, 2],
            })
        );
    }
}
