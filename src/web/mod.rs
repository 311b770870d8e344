//! HTTP surface: REST endpoints, the notes WebSocket and the dashboard page.

pub mod extract;
pub mod routes;
pub mod ws;

use std::sync::Arc;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::alerts::AlertWindow;
use crate::calendar::Calendar;
use crate::drive::FileStore;
use crate::error::{DatabaseError, LlmError, RecordError, WorkbookError};
use crate::llm::LlmProvider;
use crate::notes::{NoteWsMessage, Workbook};
use crate::recorder::Recorder;

/// Optional outside services. Anything left `None` is reported as disabled.
#[derive(Clone, Default)]
pub struct Integrations {
    pub llm: Option<Arc<dyn LlmProvider>>,
    pub files: Option<Arc<dyn FileStore>>,
    pub calendar: Option<Arc<dyn Calendar>>,
}

/// What `/api/status` reports.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub backend: String,
    pub ai: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub drive: bool,
    pub calendar: bool,
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub workbook: Arc<Workbook>,
    pub recorder: Arc<Recorder>,
    /// `None` disables AI mode and the summary endpoints.
    pub llm: Option<Arc<dyn LlmProvider>>,
    /// Broadcast channel for pushing note events to all connected clients.
    pub tx: broadcast::Sender<NoteWsMessage>,
    pub alert_window: AlertWindow,
    pub status: ServiceStatus,
}

impl AppState {
    pub fn new(workbook: Arc<Workbook>, integrations: Integrations, alert_window: AlertWindow) -> Self {
        let (tx, _) = broadcast::channel(256);
        let status = ServiceStatus {
            backend: workbook.backend_name().to_string(),
            ai: integrations.llm.is_some(),
            model: integrations.llm.as_ref().map(|l| l.model_name().to_string()),
            drive: integrations.files.is_some(),
            calendar: integrations.calendar.is_some(),
        };
        let recorder = Recorder::new(Arc::clone(&workbook), tx.clone())
            .with_llm(integrations.llm.clone())
            .with_files(integrations.files)
            .with_calendar(integrations.calendar);
        Self {
            workbook,
            recorder: Arc::new(recorder),
            llm: integrations.llm,
            tx,
            alert_window,
            status,
        }
    }

    pub(crate) fn require_llm(&self) -> Result<&dyn LlmProvider, ApiError> {
        self.llm.as_deref().ok_or_else(|| ApiError::from(LlmError::NotConfigured))
    }
}

/// Build the full application router.
pub fn app_routes(state: AppState) -> Router {
    routes::api_routes(state.clone())
        .merge(ws::note_routes(state))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// Failure rendered as `{"error": "..."}` with a matching status.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(status = %self.status, error = %self.message, "Request failed");
        }
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

fn database_status(e: &DatabaseError) -> StatusCode {
    match e {
        DatabaseError::Remote { .. } | DatabaseError::Auth(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<WorkbookError> for ApiError {
    fn from(e: WorkbookError) -> Self {
        let status = match &e {
            WorkbookError::NotFound { .. } => StatusCode::NOT_FOUND,
            WorkbookError::Duplicate { .. } | WorkbookError::Invalid(_) => StatusCode::BAD_REQUEST,
            WorkbookError::Database(db) => database_status(db),
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl From<RecordError> for ApiError {
    fn from(e: RecordError) -> Self {
        match e {
            RecordError::Workbook(inner) => inner.into(),
            RecordError::AiUnavailable => Self {
                status: StatusCode::SERVICE_UNAVAILABLE,
                message: e.to_string(),
            },
            RecordError::EmptyContent | RecordError::NoTasks | RecordError::Invalid(_) => {
                Self::bad_request(e.to_string())
            }
        }
    }
}

impl From<LlmError> for ApiError {
    fn from(e: LlmError) -> Self {
        let status = match e {
            LlmError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            LlmError::RequestFailed { .. } | LlmError::InvalidResponse { .. } => {
                StatusCode::BAD_GATEWAY
            }
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_statuses() {
        let not_found: ApiError = WorkbookError::NotFound {
            entity: "note",
            key: "9".into(),
        }
        .into();
        assert_eq!(not_found.status, StatusCode::NOT_FOUND);

        let dup: ApiError = WorkbookError::Duplicate {
            entity: "task",
            key: "A".into(),
        }
        .into();
        assert_eq!(dup.status, StatusCode::BAD_REQUEST);

        let remote: ApiError = WorkbookError::Database(DatabaseError::Remote {
            sheet: "notes".into(),
            reason: "500".into(),
        })
        .into();
        assert_eq!(remote.status, StatusCode::BAD_GATEWAY);

        let ai: ApiError = RecordError::AiUnavailable.into();
        assert_eq!(ai.status, StatusCode::SERVICE_UNAVAILABLE);

        let empty: ApiError = RecordError::EmptyContent.into();
        assert_eq!(empty.status, StatusCode::BAD_REQUEST);

        let nested: ApiError = RecordError::Workbook(WorkbookError::NotFound {
            entity: "note",
            key: "1".into(),
        })
        .into();
        assert_eq!(nested.status, StatusCode::NOT_FOUND);

        let upstream: ApiError = LlmError::RequestFailed {
            provider: "gemini".into(),
            reason: "timeout".into(),
        }
        .into();
        assert_eq!(upstream.status, StatusCode::BAD_GATEWAY);
    }
}
