//! Free-text note classifier.
//!
//! Asks the LLM for a four-line answer (task number, type, reminder time,
//! recurrence) and scrapes it line by line. Anything it cannot find falls
//! back to the first configured task and the update type.

use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::clock;
use crate::error::RecordError;
use crate::llm::{self, LlmProvider};
use crate::notes::{NoteType, TaskConfig};

const CLASSIFY_TEMPERATURE: f32 = 0.1;
const CLASSIFY_MAX_TOKENS: u32 = 256;

static NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));
static TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4}-\d{2}-\d{2})\s+(\d{2}:\d{2})").expect("valid regex")
});
static RRULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"RRULE:[A-Z0-9=;,+\-]+").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub task: String,
    pub note_type: NoteType,
    /// `YYYY-MM-DD HH:MM`, KST.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alarm: Option<String>,
    /// `RRULE:...` for recurring reminders.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<String>,
    /// Raw model output, shown to the user as the "AI analysis".
    pub raw: String,
    /// Set when the model call itself failed and fallbacks were used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Classification {
    fn fallback(tasks: &[TaskConfig]) -> Self {
        Self {
            task: tasks.first().map(|t| t.name.clone()).unwrap_or_default(),
            note_type: NoteType::default(),
            alarm: None,
            recurrence: None,
            raw: String::new(),
            error: None,
        }
    }
}

pub fn build_prompt(content: &str, tasks: &[TaskConfig], now: &DateTime<FixedOffset>) -> String {
    let task_list: String = tasks
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let desc = t.description.trim();
            if desc.is_empty() {
                format!("{}. {}\n", i + 1, t.name)
            } else {
                format!("{}. {}: {}\n", i + 1, t.name, desc)
            }
        })
        .collect();

    format!(
        "다음 메모를 분석해서 업무와 유형을 판단해줘.\n\
         \n\
         현재 시각: {now}\n\
         \n\
         등록된 업무:\n\
         {task_list}\n\
         유형 설명:\n\
         - 아이디어: 새로운 제안, 개선안, 창의적 생각\n\
         - 할일: 앞으로 해야 할 작업, 처리 필요한 업무\n\
         - 업데이트: 진행 상황, 완료 보고, 현황\n\
         - 문제점: 발생한 이슈, 해결 필요한 문제\n\
         \n\
         메모 내용:\n\
         {content}\n\
         \n\
         아래 형식으로 정확히 네 줄만 답변해줘:\n\
         업무번호: [1~{count} 중 하나]\n\
         유형: [아이디어/할일/업데이트/문제점 중 하나]\n\
         시간: [할일이고 시간 언급되면 YYYY-MM-DD HH:MM (\"내일\", \"다음 주 월요일\" 같은 표현은 현재 시각 기준으로 계산), 없으면 없음]\n\
         반복: [반복 일정이면 RRULE:FREQ=WEEKLY;BYDAY=MO 같은 RFC 5545 규칙, 없으면 없음]",
        now = clock::prompt_now(now),
        count = tasks.len(),
    )
}

/// Text after the first `:`.
fn after_colon(line: &str) -> &str {
    line.split_once(':').map(|(_, rest)| rest.trim()).unwrap_or("")
}

/// Scrape a model response. Missing fields fall back to the first task and
/// the update type.
pub fn parse_response(text: &str, tasks: &[TaskConfig]) -> Classification {
    let mut result = Classification::fallback(tasks);
    result.raw = text.trim().to_string();

    for line in text.lines().map(str::trim) {
        if line.contains("업무") && line.contains(':') {
            let index = NUMBER
                .find(after_colon(line))
                .and_then(|m| m.as_str().parse::<usize>().ok());
            if let Some(task) = index.and_then(|i| i.checked_sub(1)).and_then(|i| tasks.get(i)) {
                result.task = task.name.clone();
            }
        } else if line.contains("유형") && line.contains(':') {
            let value = after_colon(line);
            let parsed = if value.contains("아이디어") {
                Some(NoteType::Idea)
            } else if value.contains('할') && value.contains('일') {
                Some(NoteType::Todo)
            } else if value.contains("업데이트") {
                Some(NoteType::Update)
            } else if value.contains("문제") {
                Some(NoteType::Issue)
            } else {
                None
            };
            if let Some(t) = parsed {
                result.note_type = t;
            }
        } else if line.contains("시간") && line.contains(':') {
            let value = after_colon(line);
            if !value.contains("없음") {
                if let Some(caps) = TIMESTAMP.captures(value) {
                    result.alarm = Some(format!("{} {}", &caps[1], &caps[2]));
                }
            }
        } else if line.contains("반복") || line.contains("RRULE") {
            if let Some(m) = RRULE.find(line) {
                result.recurrence = Some(m.as_str().to_string());
            }
        }
    }

    // A timestamp the calendar would reject is worse than none.
    if result
        .alarm
        .as_deref()
        .is_some_and(|a| clock::parse_alarm(a).is_none())
    {
        result.alarm = None;
    }
    result
}

/// Classify a note. Model failures are reported in `error` with fallbacks
/// filled in; only an empty task list is an error.
pub async fn classify(
    llm: &dyn LlmProvider,
    content: &str,
    tasks: &[TaskConfig],
    now: &DateTime<FixedOffset>,
) -> Result<Classification, RecordError> {
    if tasks.is_empty() {
        return Err(RecordError::NoTasks);
    }

    let prompt = build_prompt(content, tasks, now);
    match llm::ask(
        llm,
        "You classify short Korean work notes. Answer in the exact format requested.",
        prompt,
        CLASSIFY_TEMPERATURE,
        CLASSIFY_MAX_TOKENS,
    )
    .await
    {
        Ok(text) => {
            let result = parse_response(&text, tasks);
            debug!(
                task = %result.task,
                note_type = %result.note_type,
                alarm = ?result.alarm,
                "Note classified"
            );
            Ok(result)
        }
        Err(e) => {
            warn!(error = %e, "Classifier call failed, using fallback");
            let mut result = Classification::fallback(tasks);
            result.error = Some(e.to_string());
            Ok(result)
        }
    }
}
