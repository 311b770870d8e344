//! Reminder events on Google Calendar.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use reqwest::Url;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::CalendarError;
use crate::google::{TokenSource, failure_reason};

const CALENDAR_BASE_URL: &str = "https://www.googleapis.com";
const TIME_ZONE: &str = "Asia/Seoul";

/// Popup reminders, in minutes before the event.
const REMINDER_MINUTES: [u32; 2] = [10, 60];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    pub date_time: String,
    pub time_zone: String,
}

impl EventTime {
    fn at(t: DateTime<FixedOffset>) -> Self {
        Self {
            date_time: t.format("%Y-%m-%dT%H:%M:%S%:z").to_string(),
            time_zone: TIME_ZONE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReminderOverride {
    pub method: String,
    pub minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminders {
    pub use_default: bool,
    pub overrides: Vec<ReminderOverride>,
}

/// Event body in the shape the Calendar v3 API takes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarEvent {
    pub summary: String,
    pub description: String,
    pub start: EventTime,
    pub end: EventTime,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recurrence: Vec<String>,
    pub reminders: Reminders,
}

impl CalendarEvent {
    /// One-hour event starting at `start` with popup reminders.
    pub fn reminder(
        summary: impl Into<String>,
        description: impl Into<String>,
        start: DateTime<FixedOffset>,
        recurrence: Option<&str>,
    ) -> Self {
        Self {
            summary: summary.into(),
            description: description.into(),
            start: EventTime::at(start),
            end: EventTime::at(start + chrono::Duration::hours(1)),
            recurrence: recurrence
                .map(str::trim)
                .filter(|r| r.starts_with("RRULE:"))
                .map(|r| vec![r.to_string()])
                .unwrap_or_default(),
            reminders: Reminders {
                use_default: false,
                overrides: REMINDER_MINUTES
                    .iter()
                    .map(|&minutes| ReminderOverride {
                        method: "popup".into(),
                        minutes,
                    })
                    .collect(),
            },
        }
    }
}

#[async_trait]
pub trait Calendar: Send + Sync {
    /// Create the event and return its link.
    async fn insert(&self, event: &CalendarEvent) -> Result<String, CalendarError>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertedEvent {
    #[serde(default)]
    html_link: String,
}

/// Google Calendar v3, writing into one fixed calendar.
pub struct GoogleCalendar {
    calendar_id: String,
    tokens: Arc<dyn TokenSource>,
    client: reqwest::Client,
    base_url: String,
}

impl GoogleCalendar {
    pub fn new(
        calendar_id: impl Into<String>,
        tokens: Arc<dyn TokenSource>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            calendar_id: calendar_id.into(),
            tokens,
            client,
            base_url: CALENDAR_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn failed(&self, reason: impl Into<String>) -> CalendarError {
        CalendarError::InsertFailed {
            calendar_id: self.calendar_id.clone(),
            reason: reason.into(),
        }
    }

    fn events_url(&self) -> Result<Url, CalendarError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|e| self.failed(format!("bad base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| self.failed("base url cannot have path segments"))?
            .extend(["calendar", "v3", "calendars", self.calendar_id.as_str(), "events"]);
        Ok(url)
    }
}

#[async_trait]
impl Calendar for GoogleCalendar {
    async fn insert(&self, event: &CalendarEvent) -> Result<String, CalendarError> {
        let token = self.tokens.access_token().await?;
        let resp = self
            .client
            .post(self.events_url()?)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", token.expose_secret()),
            )
            .json(event)
            .send()
            .await
            .map_err(|e| self.failed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(self.failed(failure_reason(resp).await));
        }
        let inserted: InsertedEvent = resp
            .json()
            .await
            .map_err(|e| self.failed(format!("bad insert response: {e}")))?;

        info!(
            summary = %event.summary,
            start = %event.start.date_time,
            recurring = !event.recurrence.is_empty(),
            "Calendar reminder created"
        );
        Ok(inserted.html_link)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use axum::extract::{Path, State};
    use axum::routing::post;
    use axum::{Json, Router};
    use chrono::TimeZone;
    use secrecy::SecretString;

    use super::*;
    use crate::clock;
    use crate::google::StaticToken;

    fn start() -> DateTime<FixedOffset> {
        clock::kst().with_ymd_and_hms(2026, 1, 5, 9, 30, 0).unwrap()
    }

    #[test]
    fn reminder_event_shape() {
        let event = CalendarEvent::reminder(
            "[📦 피킹지시] 피킹 리스트 확인",
            "피킹 리스트 확인",
            start(),
            Some("RRULE:FREQ=WEEKLY;BYDAY=MO"),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["start"]["dateTime"], "2026-01-05T09:30:00+09:00");
        assert_eq!(json["end"]["dateTime"], "2026-01-05T10:30:00+09:00");
        assert_eq!(json["start"]["timeZone"], "Asia/Seoul");
        assert_eq!(json["reminders"]["useDefault"], false);
        assert_eq!(json["reminders"]["overrides"][0]["method"], "popup");
        assert_eq!(json["reminders"]["overrides"][0]["minutes"], 10);
        assert_eq!(json["reminders"]["overrides"][1]["minutes"], 60);
        assert_eq!(json["recurrence"][0], "RRULE:FREQ=WEEKLY;BYDAY=MO");
    }

    #[test]
    fn one_off_event_has_no_recurrence() {
        let json = serde_json::to_value(CalendarEvent::reminder("s", "d", start(), None)).unwrap();
        assert!(json.get("recurrence").is_none());

        let json =
            serde_json::to_value(CalendarEvent::reminder("s", "d", start(), Some("매주"))).unwrap();
        assert!(json.get("recurrence").is_none());
    }

    type Seen = Arc<Mutex<Vec<(String, serde_json::Value)>>>;

    async fn insert_event(
        State(seen): State<Seen>,
        Path(id): Path<String>,
        Json(body): Json<serde_json::Value>,
    ) -> Json<serde_json::Value> {
        seen.lock().unwrap().push((id, body));
        Json(serde_json::json!({ "id": "evt1", "htmlLink": "https://calendar.google.com/event?eid=evt1" }))
    }

    #[tokio::test]
    async fn insert_posts_to_fixed_calendar() {
        let seen: Seen = Arc::default();
        let app = Router::new()
            .route("/calendar/v3/calendars/{id}/events", post(insert_event))
            .with_state(Arc::clone(&seen));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        let tokens: Arc<dyn TokenSource> = Arc::new(StaticToken::new(SecretString::from("t")));
        let cal = GoogleCalendar::new("team@group.calendar.google.com", tokens, reqwest::Client::new())
            .with_base_url(format!("http://127.0.0.1:{port}"));

        let link = cal
            .insert(&CalendarEvent::reminder("s", "d", start(), None))
            .await
            .unwrap();
        assert_eq!(link, "https://calendar.google.com/event?eid=evt1");

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].0, "team@group.calendar.google.com");
        assert_eq!(seen[0].1["summary"], "s");
    }
}
