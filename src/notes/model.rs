//! Note, chat-log and task-config data model, plus their sheet column layout.

use serde::{Deserialize, Serialize};

use crate::store::Table;

/// Worksheet names.
pub mod sheets {
    pub const CONFIG: &str = "config";
    pub const NOTES: &str = "notes";
    pub const CHATS: &str = "chats";
}

/// Column headers as they appear in the existing sheets.
pub mod columns {
    pub const TASK_NAME: &str = "메뉴명";
    pub const TASK_SHEETS: &str = "시트정보";
    pub const TASK_TRIGGERS: &str = "트리거정보";
    pub const TASK_DESCRIPTION: &str = "업무설명";
    pub const TASK_MAIL: &str = "메일발송설정";

    pub const DATE: &str = "날짜";
    pub const TIME: &str = "시간";
    pub const NOTE_TASK: &str = "메뉴";
    pub const NOTE_TYPE: &str = "유형";
    pub const NOTE_CONTENT: &str = "내용";
    pub const NOTE_IMAGE: &str = "이미지";
    pub const NOTE_ALARM: &str = "알림시간";
    pub const NOTE_DONE: &str = "완료";

    pub const CHAT_TOPIC: &str = "주제";
    pub const CHAT_CONTENT: &str = "전체내용";
    pub const CHAT_LEGACY_QUESTION: &str = "질문";
    pub const CHAT_LEGACY_ANSWER: &str = "답변";

    pub const CONFIG_HEADER: [&str; 5] =
        [TASK_NAME, TASK_SHEETS, TASK_TRIGGERS, TASK_DESCRIPTION, TASK_MAIL];
    pub const NOTES_HEADER: [&str; 8] = [
        DATE,
        TIME,
        NOTE_TASK,
        NOTE_TYPE,
        NOTE_CONTENT,
        NOTE_IMAGE,
        NOTE_ALARM,
        NOTE_DONE,
    ];
    pub const CHATS_HEADER: [&str; 4] = [DATE, TIME, CHAT_TOPIC, CHAT_CONTENT];
}

/// Placeholder written into task rows that predate the description column.
pub const DEFAULT_TASK_DESCRIPTION: &str = "설명을 입력해주세요.";

/// Value written to `완료` when a note is completed.
pub const DONE_MARK: &str = "완료";

/// Note category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteType {
    Idea,
    #[serde(alias = "to-do", alias = "to_do")]
    Todo,
    Update,
    Issue,
}

impl NoteType {
    pub const ALL: [NoteType; 4] = [
        NoteType::Idea,
        NoteType::Todo,
        NoteType::Update,
        NoteType::Issue,
    ];

    /// Canonical label stored in the `유형` column.
    pub fn label(self) -> &'static str {
        match self {
            NoteType::Idea => "💡 아이디어",
            NoteType::Todo => "✅ 할 일",
            NoteType::Update => "📝 업데이트",
            NoteType::Issue => "🔥 문제점",
        }
    }

    /// Korean word without emoji, as used in prompts.
    pub fn word(self) -> &'static str {
        match self {
            NoteType::Idea => "아이디어",
            NoteType::Todo => "할일",
            NoteType::Update => "업데이트",
            NoteType::Issue => "문제점",
        }
    }

    /// Recognize a label from any sheet generation: emoji-prefixed, bare
    /// Korean, or English. Earlier sheets used `✅ 업데이트`, so the word
    /// decides, never the emoji.
    pub fn parse_label(raw: &str) -> Option<Self> {
        let s = raw.trim().to_lowercase();
        if s.is_empty() {
            return None;
        }
        if s.contains("아이디어") || s.contains("idea") {
            Some(NoteType::Idea)
        } else if s.contains("할 일")
            || s.contains("할일")
            || s.contains("to-do")
            || s.contains("todo")
        {
            Some(NoteType::Todo)
        } else if s.contains("업데이트") || s.contains("update") {
            Some(NoteType::Update)
        } else if s.contains("문제") || s.contains("issue") {
            Some(NoteType::Issue)
        } else {
            None
        }
    }
}

impl Default for NoteType {
    fn default() -> Self {
        NoteType::Update
    }
}

impl std::fmt::Display for NoteType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// True for any completion marker earlier sheets used.
pub fn is_done_mark(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "o" | "완료" | "done" | "x"
    )
}

fn is_truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "true" | "1" | "o" | "y" | "yes"
    )
}

fn non_empty(raw: &str) -> Option<String> {
    let t = raw.trim();
    (!t.is_empty()).then(|| t.to_string())
}

/// A single logged entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Row index within the notes sheet (0-based, header excluded).
    pub index: usize,
    pub date: String,
    pub time: String,
    pub task: String,
    pub note_type: NoteType,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// `YYYY-MM-DD HH:MM` KST.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alarm: Option<String>,
    #[serde(default)]
    pub completed: bool,
}

impl Note {
    pub fn from_row(table: &Table, index: usize) -> Self {
        use columns::*;
        Self {
            index,
            date: table.cell(index, DATE).trim().to_string(),
            time: table.cell(index, TIME).trim().to_string(),
            task: table.cell(index, NOTE_TASK).to_string(),
            note_type: NoteType::parse_label(table.cell(index, NOTE_TYPE)).unwrap_or_default(),
            content: table.cell(index, NOTE_CONTENT).to_string(),
            image_url: non_empty(table.cell(index, NOTE_IMAGE)),
            alarm: non_empty(table.cell(index, NOTE_ALARM)),
            completed: is_done_mark(table.cell(index, NOTE_DONE)),
        }
    }

    pub fn to_record(&self) -> Vec<(&'static str, String)> {
        use columns::*;
        vec![
            (DATE, self.date.clone()),
            (TIME, self.time.clone()),
            (NOTE_TASK, self.task.clone()),
            (NOTE_TYPE, self.note_type.label().to_string()),
            (NOTE_CONTENT, self.content.clone()),
            (NOTE_IMAGE, self.image_url.clone().unwrap_or_default()),
            (NOTE_ALARM, self.alarm.clone().unwrap_or_default()),
            (
                NOTE_DONE,
                if self.completed { DONE_MARK.to_string() } else { String::new() },
            ),
        ]
    }

    /// First `max` characters followed by `...` when longer.
    pub fn preview(&self, max: usize) -> String {
        truncate_chars(&self.content, max)
    }
}

/// Character-safe truncation with a trailing `...`.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str("...");
    out
}

/// A saved conversation or code-change log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatLog {
    pub index: usize,
    pub date: String,
    pub time: String,
    pub topic: String,
    pub content: String,
}

impl ChatLog {
    pub fn from_row(table: &Table, index: usize) -> Self {
        use columns::*;
        Self {
            index,
            date: table.cell(index, DATE).trim().to_string(),
            time: table.cell(index, TIME).trim().to_string(),
            topic: table.cell(index, CHAT_TOPIC).to_string(),
            content: table.cell(index, CHAT_CONTENT).to_string(),
        }
    }

    pub fn to_record(&self) -> Vec<(&'static str, String)> {
        use columns::*;
        vec![
            (DATE, self.date.clone()),
            (TIME, self.time.clone()),
            (CHAT_TOPIC, self.topic.clone()),
            (CHAT_CONTENT, self.content.clone()),
        ]
    }
}

/// One configured task ("menu") that notes are logged against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub name: String,
    /// Comma-separated spreadsheet references.
    #[serde(default)]
    pub sheets: String,
    /// Comma-separated trigger descriptions.
    #[serde(default)]
    pub triggers: String,
    #[serde(default)]
    pub description: String,
    /// Whether the task includes a mail-sending step.
    #[serde(default)]
    pub mail: bool,
}

impl TaskConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sheets: String::new(),
            triggers: String::new(),
            description: String::new(),
            mail: false,
        }
    }

    pub fn from_row(table: &Table, index: usize) -> Self {
        use columns::*;
        Self {
            name: table.cell(index, TASK_NAME).trim().to_string(),
            sheets: table.cell(index, TASK_SHEETS).to_string(),
            triggers: table.cell(index, TASK_TRIGGERS).to_string(),
            description: table.cell(index, TASK_DESCRIPTION).to_string(),
            mail: is_truthy(table.cell(index, TASK_MAIL)),
        }
    }

    pub fn to_record(&self) -> Vec<(&'static str, String)> {
        use columns::*;
        vec![
            (TASK_NAME, self.name.trim().to_string()),
            (TASK_SHEETS, self.sheets.clone()),
            (TASK_TRIGGERS, self.triggers.clone()),
            (TASK_DESCRIPTION, self.description.clone()),
            (TASK_MAIL, if self.mail { "TRUE" } else { "FALSE" }.to_string()),
        ]
    }

    pub fn sheet_items(&self) -> Vec<String> {
        split_items(&self.sheets)
    }

    pub fn trigger_items(&self) -> Vec<String> {
        split_items(&self.triggers)
    }
}

fn split_items(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Tasks written into a config sheet that has never been initialized.
pub fn default_tasks() -> Vec<TaskConfig> {
    vec![
        TaskConfig {
            name: "📦 피킹지시".into(),
            sheets: "검증결과, Log, 12월사본, 자재 정보, 소요 정보, DB, 볼트 상세, 단가".into(),
            triggers: "함수: runSmartUpdate(), 매일 06시~07시 자동실행".into(),
            description: "피킹 리스트를 생성하고 현장에 전달하는 업무. 오전 9시 전까지 완료 필수."
                .into(),
            mail: true,
        },
        TaskConfig {
            name: "🔍 재고조회".into(),
            sheets: "전사재고, 실시간재고, 불량현황, 3공장 재고".into(),
            triggers: "함수: checkStock(), 수정 시 실행(OnEdit)".into(),
            description: "ERP와 실물 재고를 비교하여 차이점을 파악하는 업무.".into(),
            mail: false,
        },
        TaskConfig {
            name: "🚛 입고처리".into(),
            sheets: "입고검수, 반품이력, 협력사정보, 품질리포트".into(),
            triggers: "함수: registerItem(), 폼 제출 시 실행".into(),
            description: "협력사로부터 입고된 자재를 검수하고 시스템에 등록함.".into(),
            mail: false,
        },
        TaskConfig {
            name: "🏷️ 바코드 관리".into(),
            sheets: "라벨이력, ZPL템플릿, 프린터설정".into(),
            triggers: "함수: printLabel(), 버튼 클릭 시 실행".into(),
            description: "부품 식별표(바코드)를 출력하여 적재된 자재에 부착.".into(),
            mail: true,
        },
    ]
}

/// Messages sent over the WebSocket (server → client).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NoteWsMessage {
    /// All notes, newest first (sent on connect and after lag).
    NotesSync { notes: Vec<Note> },
    NoteCreated { note: Note },
    NoteUpdated { note: Note },
    /// Row indices after `index` shift down by one.
    NoteDeleted { index: usize },
    /// A reminder time has just passed.
    AlertDue { note: Note },
}
