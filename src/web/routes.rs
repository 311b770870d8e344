//! REST endpoints for tasks, notes, reminders, chats and reports.

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{delete, get, post, put},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::extract::{Path, Query};
use super::{ApiError, AppState};
use crate::alerts::{self, PendingAlert};
use crate::clock::{self, DATE_FORMAT};
use crate::notes::model::truncate_chars;
use crate::notes::query::{self, DEFAULT_RECENT, PREVIEW_CHARS};
use crate::notes::{ChatLog, Note, NoteFilter, NoteType, NoteWsMessage, Period, TaskConfig};
use crate::recorder::{ImageUpload, SubmitMode, SubmitOutcome, Submission};
use crate::summary;

/// Upper bound for multipart note submissions.
const UPLOAD_LIMIT_BYTES: usize = 20 * 1024 * 1024;

/// Chat topics derived from content are cut to this many characters.
const TOPIC_CHARS: usize = 50;

const DASHBOARD_HTML: &str = include_str!("index.html");

pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(dashboard))
        .route("/health", get(health))
        .route("/api/status", get(status))
        .route("/api/tasks", get(list_tasks).post(add_task).put(replace_tasks))
        .route("/api/tasks/{name}", delete(remove_task))
        .route("/api/tasks/{name}/description", put(describe_task))
        .route("/api/notes", get(list_notes).post(create_note))
        .route("/api/notes/recent", get(recent_notes))
        .route(
            "/api/notes/upload",
            post(upload_note).layer(DefaultBodyLimit::max(UPLOAD_LIMIT_BYTES)),
        )
        .route("/api/notes/{index}", put(edit_note).delete(delete_note))
        .route("/api/notes/{index}/complete", post(complete_note))
        .route("/api/alerts", get(list_alerts))
        .route("/api/chats", get(list_chats).post(add_chat))
        .route("/api/chats/summarize", post(summarize_chat))
        .route("/api/chats/{index}", delete(delete_chat))
        .route("/api/reports/daily", get(plain_daily_report))
        .route("/api/reports/daily/ai", post(ai_daily_report))
        .route("/api/reports/portfolio", post(portfolio))
        .with_state(state)
}

// ── Page & health ───────────────────────────────────────────────────────

async fn dashboard() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "worklog"
    }))
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.status.clone())
}

// ── Tasks ───────────────────────────────────────────────────────────────

/// A task plus its sheet and trigger lists split out for display.
#[derive(Serialize)]
struct TaskView {
    #[serde(flatten)]
    task: TaskConfig,
    sheet_items: Vec<String>,
    trigger_items: Vec<String>,
}

impl From<TaskConfig> for TaskView {
    fn from(task: TaskConfig) -> Self {
        Self {
            sheet_items: task.sheet_items(),
            trigger_items: task.trigger_items(),
            task,
        }
    }
}

async fn list_tasks(State(state): State<AppState>) -> Result<Json<Vec<TaskView>>, ApiError> {
    let tasks = state.workbook.list_tasks().await?;
    Ok(Json(tasks.into_iter().map(TaskView::from).collect()))
}

async fn add_task(
    State(state): State<AppState>,
    Json(task): Json<TaskConfig>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state.workbook.add_task(task).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn replace_tasks(
    State(state): State<AppState>,
    Json(tasks): Json<Vec<TaskConfig>>,
) -> Result<impl IntoResponse, ApiError> {
    let count = state.workbook.replace_tasks(tasks).await?;
    Ok(Json(serde_json::json!({ "count": count })))
}

async fn remove_task(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.workbook.remove_task(&name).await?;
    Ok(Json(serde_json::json!({ "removed": name })))
}

#[derive(Deserialize)]
struct DescriptionRequest {
    description: String,
}

async fn describe_task(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<DescriptionRequest>,
) -> Result<Json<TaskConfig>, ApiError> {
    Ok(Json(
        state
            .workbook
            .set_task_description(&name, &req.description)
            .await?,
    ))
}

// ── Notes ───────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct NotesQuery {
    task: Option<String>,
    /// Any label form: `todo`, `할 일`, `✅ 할 일`...
    #[serde(rename = "type")]
    note_type: Option<String>,
    #[serde(default)]
    period: Period,
    completed: Option<bool>,
    #[serde(default)]
    preview: bool,
}

fn parse_type(raw: Option<&str>) -> Result<Option<NoteType>, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(label) => NoteType::parse_label(label)
            .map(Some)
            .ok_or_else(|| ApiError::bad_request(format!("unknown note type: {label}"))),
        None => Ok(None),
    }
}

async fn list_notes(
    State(state): State<AppState>,
    Query(q): Query<NotesQuery>,
) -> Result<Json<Vec<Note>>, ApiError> {
    let filter = NoteFilter {
        task: q.task,
        note_type: parse_type(q.note_type.as_deref())?,
        period: q.period,
        completed: q.completed,
    };
    let notes = state.workbook.list_notes().await?;
    let mut out = filter.apply(&notes, clock::now_kst().date_naive());
    if q.preview {
        for note in &mut out {
            note.content = note.preview(PREVIEW_CHARS);
        }
    }
    debug!(total = notes.len(), matched = out.len(), "Notes listed");
    Ok(Json(out))
}

#[derive(Deserialize)]
struct RecentQuery {
    limit: Option<usize>,
}

async fn recent_notes(
    State(state): State<AppState>,
    Query(q): Query<RecentQuery>,
) -> Result<Json<Vec<Note>>, ApiError> {
    let notes = state.workbook.list_notes().await?;
    Ok(Json(query::recent(&notes, q.limit.unwrap_or(DEFAULT_RECENT))))
}

#[derive(Debug, Deserialize)]
struct SubmitRequest {
    content: String,
    #[serde(default)]
    mode: SubmitMode,
    #[serde(default)]
    task: Option<String>,
    #[serde(default, rename = "type")]
    note_type: Option<String>,
    #[serde(default)]
    alarm_date: Option<String>,
    #[serde(default)]
    alarm_time: Option<String>,
    #[serde(default)]
    recurrence: Option<String>,
}

fn submitted(outcome: SubmitOutcome) -> impl IntoResponse {
    let message = outcome.message();
    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "note": outcome.note,
            "classification": outcome.classification,
            "calendar_link": outcome.calendar_link,
            "warnings": outcome.warnings,
            "message": message,
        })),
    )
}

async fn create_note(
    State(state): State<AppState>,
    Json(req): Json<SubmitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let submission = Submission {
        content: req.content,
        mode: req.mode,
        task: req.task,
        note_type: parse_type(req.note_type.as_deref())?,
        alarm_date: req.alarm_date,
        alarm_time: req.alarm_time,
        recurrence: req.recurrence,
        image: None,
    };
    let outcome = state.recorder.submit(submission, clock::now_kst()).await?;
    Ok(submitted(outcome))
}

fn parse_mode(raw: &str) -> Result<SubmitMode, ApiError> {
    match raw.trim().to_lowercase().as_str() {
        "" | "auto" | "ai" => Ok(SubmitMode::Auto),
        "manual" => Ok(SubmitMode::Manual),
        other => Err(ApiError::bad_request(format!("unknown mode: {other}"))),
    }
}

fn text_or_none(raw: String) -> Option<String> {
    (!raw.trim().is_empty()).then_some(raw)
}

/// Same fields as the JSON form, plus an optional `image` file part.
async fn upload_note(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let bad_part = |e: axum::extract::multipart::MultipartError| {
        ApiError::bad_request(format!("bad multipart body: {e}"))
    };

    let mut sub = Submission::default();
    while let Some(field) = multipart.next_field().await.map_err(bad_part)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "image" {
            let mime = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field.bytes().await.map_err(bad_part)?;
            if !bytes.is_empty() {
                sub.image = Some(ImageUpload {
                    bytes: bytes.to_vec(),
                    mime,
                });
            }
            continue;
        }

        let value = field.text().await.map_err(bad_part)?;
        match name.as_str() {
            "content" => sub.content = value,
            "mode" => sub.mode = parse_mode(&value)?,
            "task" => sub.task = text_or_none(value),
            "type" => sub.note_type = parse_type(Some(&value))?,
            "alarm_date" => sub.alarm_date = text_or_none(value),
            "alarm_time" => sub.alarm_time = text_or_none(value),
            "recurrence" => sub.recurrence = text_or_none(value),
            other => debug!(field = other, "Ignoring unknown form field"),
        }
    }

    let outcome = state.recorder.submit(sub, clock::now_kst()).await?;
    Ok(submitted(outcome))
}

#[derive(Deserialize)]
struct EditRequest {
    content: String,
}

async fn edit_note(
    State(state): State<AppState>,
    Path(index): Path<usize>,
    Json(req): Json<EditRequest>,
) -> Result<Json<Note>, ApiError> {
    if req.content.trim().is_empty() {
        return Err(ApiError::bad_request("content is empty"));
    }
    let note = state.workbook.update_note_content(index, &req.content).await?;
    info!(index, "Note edited");
    let _ = state.tx.send(NoteWsMessage::NoteUpdated { note: note.clone() });
    Ok(Json(note))
}

#[derive(Deserialize)]
struct CompleteQuery {
    completed: Option<bool>,
}

async fn complete_note(
    State(state): State<AppState>,
    Path(index): Path<usize>,
    Query(q): Query<CompleteQuery>,
) -> Result<Json<Note>, ApiError> {
    let completed = q.completed.unwrap_or(true);
    let note = state.workbook.set_note_completed(index, completed).await?;
    info!(index, completed, "Note completion changed");
    let _ = state.tx.send(NoteWsMessage::NoteUpdated { note: note.clone() });
    Ok(Json(note))
}

async fn delete_note(
    State(state): State<AppState>,
    Path(index): Path<usize>,
) -> Result<Json<Note>, ApiError> {
    let removed = state.workbook.delete_note(index).await?;
    let _ = state.tx.send(NoteWsMessage::NoteDeleted { index });
    Ok(Json(removed))
}

async fn list_alerts(State(state): State<AppState>) -> Result<Json<Vec<PendingAlert>>, ApiError> {
    let notes = state.workbook.list_notes().await?;
    Ok(Json(alerts::pending_alerts(
        &notes,
        clock::now_kst(),
        state.alert_window,
    )))
}

// ── Chats ───────────────────────────────────────────────────────────────

async fn list_chats(State(state): State<AppState>) -> Result<Json<Vec<ChatLog>>, ApiError> {
    let mut chats = state.workbook.list_chats().await?;
    chats.reverse();
    Ok(Json(chats))
}

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    topic: String,
    content: String,
}

/// An untitled chat is named after its first line.
fn topic_for(req: &ChatRequest) -> String {
    let topic = req.topic.trim();
    if !topic.is_empty() {
        return topic.to_string();
    }
    let first_line = req.content.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    truncate_chars(first_line, TOPIC_CHARS)
}

async fn add_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let topic = topic_for(&req);
    let chat = state
        .workbook
        .append_chat(&topic, &req.content, clock::now_kst())
        .await?;
    info!(index = chat.index, topic = %chat.topic, "Chat saved");
    Ok((StatusCode::CREATED, Json(chat)))
}

async fn delete_chat(
    State(state): State<AppState>,
    Path(index): Path<usize>,
) -> Result<Json<ChatLog>, ApiError> {
    Ok(Json(state.workbook.delete_chat(index).await?))
}

#[derive(Deserialize)]
struct SummarizeRequest {
    content: String,
}

async fn summarize_chat(
    State(state): State<AppState>,
    Json(req): Json<SummarizeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let llm = state.require_llm()?;
    if req.content.trim().is_empty() {
        return Err(ApiError::bad_request("content is empty"));
    }
    let summary = summary::summarize_chat(llm, &req.content).await?;
    Ok(Json(serde_json::json!({ "summary": summary })))
}

// ── Reports ─────────────────────────────────────────────────────────────

fn report_date(raw: Option<&str>) -> Result<String, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(date) => NaiveDate::parse_from_str(date, DATE_FORMAT)
            .map(|d| d.format(DATE_FORMAT).to_string())
            .map_err(|_| ApiError::bad_request(format!("date must be YYYY-MM-DD, got {date:?}"))),
        None => Ok(clock::date_str(&clock::now_kst())),
    }
}

#[derive(Default, Deserialize)]
struct DailyRequest {
    #[serde(default)]
    date: Option<String>,
}

async fn plain_daily_report(
    State(state): State<AppState>,
    Query(q): Query<DailyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let date = report_date(q.date.as_deref())?;
    let notes = state.workbook.list_notes().await?;
    let report = summary::plain_daily_report(&notes, &date);
    Ok(Json(serde_json::json!({ "date": date, "report": report })))
}

async fn ai_daily_report(
    State(state): State<AppState>,
    Json(req): Json<DailyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let llm = state.require_llm()?;
    let date = report_date(req.date.as_deref())?;
    let notes = state.workbook.list_notes().await?;
    let report = summary::daily_report(llm, &query::on_date(&notes, &date), &date).await?;
    Ok(Json(serde_json::json!({ "date": date, "report": report })))
}

#[derive(Deserialize)]
struct PortfolioRequest {
    #[serde(default)]
    period: Period,
    #[serde(default)]
    task: Option<String>,
}

async fn portfolio(
    State(state): State<AppState>,
    Json(req): Json<PortfolioRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let llm = state.require_llm()?;
    let task = req.task.filter(|t| !t.trim().is_empty());
    let filter = NoteFilter {
        task: task.clone(),
        period: req.period,
        ..NoteFilter::default()
    };
    let notes = filter.apply(
        &state.workbook.list_notes().await?,
        clock::now_kst().date_naive(),
    );
    let tasks: Vec<TaskConfig> = state
        .workbook
        .list_tasks()
        .await?
        .into_iter()
        .filter(|t| task.as_deref().is_none_or(|name| t.name == name.trim()))
        .collect();
    let label = req.period.label();
    let summary = summary::portfolio_summary(llm, &notes, &tasks, label).await?;
    Ok(Json(serde_json::json!({ "period": label, "summary": summary })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_labels_from_forms() {
        assert_eq!(parse_type(Some("todo")).unwrap(), Some(NoteType::Todo));
        assert_eq!(parse_type(Some("🔥 문제점")).unwrap(), Some(NoteType::Issue));
        assert_eq!(parse_type(Some("  ")).unwrap(), None);
        assert_eq!(parse_type(None).unwrap(), None);
        assert_eq!(
            parse_type(Some("meeting")).unwrap_err().status,
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn modes_from_forms() {
        assert_eq!(parse_mode("").unwrap(), SubmitMode::Auto);
        assert_eq!(parse_mode("Manual").unwrap(), SubmitMode::Manual);
        assert!(parse_mode("batch").is_err());
    }

    #[test]
    fn untitled_chat_uses_first_line() {
        let req = ChatRequest {
            topic: " ".into(),
            content: "\n  fix: 피킹 리스트 정렬 수정\n둘째 줄".into(),
        };
        assert_eq!(topic_for(&req), "fix: 피킹 리스트 정렬 수정");

        let titled = ChatRequest {
            topic: "재고 조회 리팩터링".into(),
            content: "x".into(),
        };
        assert_eq!(topic_for(&titled), "재고 조회 리팩터링");
    }

    #[test]
    fn task_view_splits_lists() {
        let mut task = TaskConfig::new("📦 피킹지시");
        task.sheets = "검증결과, Log,".into();
        task.triggers = "함수: runSmartUpdate()".into();
        let json = serde_json::to_value(TaskView::from(task)).unwrap();
        assert_eq!(json["name"], "📦 피킹지시");
        assert_eq!(json["sheets"], "검증결과, Log,");
        assert_eq!(json["sheet_items"], serde_json::json!(["검증결과", "Log"]));
        assert_eq!(json["trigger_items"], serde_json::json!(["함수: runSmartUpdate()"]));
    }

    #[test]
    fn report_dates_are_validated() {
        assert_eq!(report_date(Some("2026-01-04")).unwrap(), "2026-01-04");
        assert!(report_date(Some("01/04/2026")).is_err());
        assert_eq!(report_date(None).unwrap().len(), 10);
    }
}
