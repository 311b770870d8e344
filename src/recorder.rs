//! Note submission: classify, upload, save, schedule, announce.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::calendar::{Calendar, CalendarEvent};
use crate::classify::{self, Classification};
use crate::clock;
use crate::drive::{self, FileStore};
use crate::error::RecordError;
use crate::llm::LlmProvider;
use crate::notes::model::truncate_chars;
use crate::notes::{Note, NoteType, NoteWsMessage, Workbook};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitMode {
    /// Task, type and reminder come from the classifier.
    #[default]
    Auto,
    Manual,
}

#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub mime: String,
}

/// One form submission.
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub content: String,
    pub mode: SubmitMode,
    pub task: Option<String>,
    pub note_type: Option<NoteType>,
    /// `YYYY-MM-DD`, manual to-dos only.
    pub alarm_date: Option<String>,
    /// `HH:MM`, manual to-dos only.
    pub alarm_time: Option<String>,
    pub recurrence: Option<String>,
    pub image: Option<ImageUpload>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitOutcome {
    pub note: Note,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calendar_link: Option<String>,
    pub warnings: Vec<String>,
}

impl SubmitOutcome {
    /// Human-readable summary for the page.
    pub fn message(&self) -> String {
        let mut msg = match self.classification {
            Some(_) => "🤖 AI 분류 완료\n".to_string(),
            None => "✋ 수동 저장\n".to_string(),
        };
        msg.push_str(&format!(
            "- 업무: {}\n- 유형: {}\n",
            self.note.task,
            self.note.note_type.label()
        ));
        if let Some(alarm) = &self.note.alarm {
            msg.push_str(&format!("- 알림: {alarm}\n"));
        }
        if self.note.image_url.is_some() {
            msg.push_str("📸 이미지 업로드 완료\n");
        }
        if self.calendar_link.is_some() {
            msg.push_str("📅 캘린더 알림 등록 완료\n");
        }
        for w in &self.warnings {
            msg.push_str(&format!("⚠️ {w}\n"));
        }
        msg.push_str(&format!("✅ 저장 완료: {}", truncate_chars(&self.note.content, 100)));
        msg
    }
}

fn non_empty(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}

pub struct Recorder {
    workbook: Arc<Workbook>,
    llm: Option<Arc<dyn LlmProvider>>,
    files: Option<Arc<dyn FileStore>>,
    calendar: Option<Arc<dyn Calendar>>,
    tx: broadcast::Sender<NoteWsMessage>,
}

impl Recorder {
    pub fn new(workbook: Arc<Workbook>, tx: broadcast::Sender<NoteWsMessage>) -> Self {
        Self {
            workbook,
            llm: None,
            files: None,
            calendar: None,
            tx,
        }
    }

    pub fn with_llm(mut self, llm: Option<Arc<dyn LlmProvider>>) -> Self {
        self.llm = llm;
        self
    }

    pub fn with_files(mut self, files: Option<Arc<dyn FileStore>>) -> Self {
        self.files = files;
        self
    }

    pub fn with_calendar(mut self, calendar: Option<Arc<dyn Calendar>>) -> Self {
        self.calendar = calendar;
        self
    }

    pub async fn submit(
        &self,
        sub: Submission,
        now: DateTime<FixedOffset>,
    ) -> Result<SubmitOutcome, RecordError> {
        if sub.content.trim().is_empty() {
            return Err(RecordError::EmptyContent);
        }
        let tasks = self.workbook.list_tasks().await?;
        if tasks.is_empty() {
            return Err(RecordError::NoTasks);
        }

        let mut warnings = Vec::new();
        let mut classification = None;

        let (task, note_type, alarm, recurrence) = match sub.mode {
            SubmitMode::Auto => {
                let llm = self.llm.as_ref().ok_or(RecordError::AiUnavailable)?;
                let c = classify::classify(llm.as_ref(), &sub.content, &tasks, &now).await?;
                if let Some(e) = &c.error {
                    warnings.push(format!("AI 분류 실패, 기본값 사용: {e}"));
                }
                let fields = (c.task.clone(), c.note_type, c.alarm.clone(), c.recurrence.clone());
                classification = Some(c);
                fields
            }
            SubmitMode::Manual => {
                let task = non_empty(sub.task.as_deref())
                    .ok_or_else(|| RecordError::Invalid("task is required in manual mode".into()))?
                    .to_string();
                let note_type = sub.note_type.unwrap_or_default();
                let alarm = match (
                    note_type,
                    non_empty(sub.alarm_date.as_deref()),
                    non_empty(sub.alarm_time.as_deref()),
                ) {
                    (NoteType::Todo, Some(date), Some(time)) => {
                        let raw = format!("{date} {time}");
                        let at = clock::parse_alarm(&raw).ok_or_else(|| {
                            RecordError::Invalid(format!("alarm must be YYYY-MM-DD HH:MM, got {raw:?}"))
                        })?;
                        Some(clock::alarm_str(&at))
                    }
                    _ => None,
                };
                let recurrence = non_empty(sub.recurrence.as_deref())
                    .filter(|_| alarm.is_some())
                    .map(str::to_string);
                (task, note_type, alarm, recurrence)
            }
        };

        let image_url = match sub.image {
            Some(image) => self.upload_image(image, &now, &mut warnings).await,
            None => None,
        };

        let note = Note {
            index: 0,
            date: clock::date_str(&now),
            time: clock::time_str(&now),
            task,
            note_type,
            content: sub.content,
            image_url,
            alarm,
            completed: false,
        };
        let note = self.workbook.append_note(&note).await?;

        // Only a saved note gets a reminder.
        let calendar_link = match &note.alarm {
            Some(alarm) => {
                self.schedule(&note.task, &note.content, alarm, recurrence.as_deref(), &mut warnings)
                    .await
            }
            None => None,
        };
        info!(
            index = note.index,
            task = %note.task,
            note_type = %note.note_type,
            warnings = warnings.len(),
            "Note recorded"
        );
        // No receivers is fine.
        let _ = self.tx.send(NoteWsMessage::NoteCreated { note: note.clone() });

        Ok(SubmitOutcome {
            note,
            classification,
            calendar_link,
            warnings,
        })
    }

    async fn upload_image(
        &self,
        image: ImageUpload,
        now: &DateTime<FixedOffset>,
        warnings: &mut Vec<String>,
    ) -> Option<String> {
        let Some(files) = &self.files else {
            warnings.push("이미지 저장소가 설정되지 않아 이미지를 건너뜀".into());
            return None;
        };
        let ext = match drive::extension_for(&image.mime) {
            Ok(ext) => ext,
            Err(e) => {
                warnings.push(format!("이미지 업로드 실패: {e}"));
                return None;
            }
        };
        let filename = drive::upload_filename(now, ext);
        match files.upload(image.bytes, &image.mime, &filename).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(error = %e, filename, "Image upload failed, saving note without it");
                warnings.push(format!("이미지 업로드 실패: {e}"));
                None
            }
        }
    }

    async fn schedule(
        &self,
        task: &str,
        content: &str,
        alarm: &str,
        recurrence: Option<&str>,
        warnings: &mut Vec<String>,
    ) -> Option<String> {
        let Some(calendar) = &self.calendar else {
            warnings.push("캘린더가 설정되지 않아 알림은 시트에만 저장됨".into());
            return None;
        };
        let start = clock::parse_alarm(alarm)?;
        let summary = format!("[{task}] {}", truncate_chars(content.trim(), 30));
        let event = CalendarEvent::reminder(summary, content, start, recurrence);
        match calendar.insert(&event).await {
            Ok(link) => Some(link),
            Err(e) => {
                warn!(error = %e, "Calendar insert failed, saving note anyway");
                warnings.push(format!("캘린더 등록 실패: {e}"));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::TimeZone;

    use super::*;
    use crate::error::{CalendarError, LlmError, UploadError};
    use crate::error::DatabaseError;
    use crate::llm::{CompletionRequest, CompletionResponse, FinishReason};
    use crate::notes::model::sheets;
    use crate::store::{LibSqlBackend, SheetBackend, Table};

    struct FixedLlm(&'static str);

    #[async_trait]
    impl LlmProvider for FixedLlm {
        fn model_name(&self) -> &str {
            "fixed"
        }
        async fn complete(&self, _r: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            Ok(CompletionResponse {
                content: self.0.to_string(),
                input_tokens: 0,
                output_tokens: 0,
                finish_reason: FinishReason::Stop,
            })
        }
    }

    #[derive(Default)]
    struct MemFiles {
        names: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl FileStore for MemFiles {
        async fn upload(&self, _b: Vec<u8>, _m: &str, filename: &str) -> Result<String, UploadError> {
            if self.fail {
                return Err(UploadError::Failed {
                    filename: filename.into(),
                    reason: "503".into(),
                });
            }
            self.names.lock().unwrap().push(filename.to_string());
            Ok(drive::viewer_url("img1"))
        }
    }

    #[derive(Default)]
    struct MemCalendar {
        events: Mutex<Vec<CalendarEvent>>,
        fail: bool,
    }

    #[async_trait]
    impl Calendar for MemCalendar {
        async fn insert(&self, event: &CalendarEvent) -> Result<String, CalendarError> {
            if self.fail {
                return Err(CalendarError::InsertFailed {
                    calendar_id: "primary".into(),
                    reason: "forbidden".into(),
                });
            }
            self.events.lock().unwrap().push(event.clone());
            Ok("https://calendar/evt".into())
        }
    }

    fn now() -> DateTime<FixedOffset> {
        clock::kst().with_ymd_and_hms(2026, 1, 4, 15, 0, 0).unwrap()
    }

    async fn recorder() -> (Recorder, Arc<Workbook>, broadcast::Receiver<NoteWsMessage>) {
        let backend = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let workbook = Arc::new(Workbook::new(backend));
        let (tx, rx) = broadcast::channel(16);
        (Recorder::new(Arc::clone(&workbook), tx), workbook, rx)
    }

    fn manual(content: &str) -> Submission {
        Submission {
            content: content.into(),
            mode: SubmitMode::Manual,
            task: Some("🔍 재고조회".into()),
            note_type: Some(NoteType::Update),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn empty_content_is_rejected() {
        let (rec, wb, _) = recorder().await;
        let err = rec.submit(manual("  \n "), now()).await.unwrap_err();
        assert!(matches!(err, RecordError::EmptyContent));
        assert!(wb.list_notes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn no_tasks_is_rejected() {
        let (rec, wb, _) = recorder().await;
        wb.replace_tasks(Vec::new()).await.unwrap();
        let err = rec.submit(manual("x"), now()).await.unwrap_err();
        assert!(matches!(err, RecordError::NoTasks));
    }

    #[tokio::test]
    async fn auto_without_llm_is_unavailable() {
        let (rec, _, _) = recorder().await;
        let sub = Submission {
            content: "x".into(),
            ..Default::default()
        };
        assert!(matches!(
            rec.submit(sub, now()).await.unwrap_err(),
            RecordError::AiUnavailable
        ));
    }

    #[tokio::test]
    async fn manual_save_appends_and_broadcasts() {
        let (rec, wb, mut rx) = recorder().await;
        let out = rec.submit(manual("재고 확인 완료"), now()).await.unwrap();

        assert_eq!(out.note.date, "2026-01-04");
        assert_eq!(out.note.time, "15:00:00");
        assert_eq!(out.note.task, "🔍 재고조회");
        assert!(out.warnings.is_empty());
        assert!(out.message().contains("✋ 수동 저장"));

        assert_eq!(wb.list_notes().await.unwrap().len(), 1);
        match rx.try_recv().unwrap() {
            NoteWsMessage::NoteCreated { note } => assert_eq!(note.content, "재고 확인 완료"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn manual_requires_task() {
        let (rec, _, _) = recorder().await;
        let mut sub = manual("x");
        sub.task = Some(" ".into());
        assert!(matches!(
            rec.submit(sub, now()).await.unwrap_err(),
            RecordError::Invalid(_)
        ));
    }

    #[tokio::test]
    async fn manual_alarm_only_for_todos() {
        let (rec, _, _) = recorder().await;
        let mut sub = manual("x");
        sub.alarm_date = Some("2026-01-05".into());
        sub.alarm_time = Some("09:00".into());
        let out = rec.submit(sub.clone(), now()).await.unwrap();
        assert!(out.note.alarm.is_none());

        sub.note_type = Some(NoteType::Todo);
        let out = rec.submit(sub.clone(), now()).await.unwrap();
        assert_eq!(out.note.alarm.as_deref(), Some("2026-01-05 09:00"));
        // Calendar missing is only a warning.
        assert_eq!(out.warnings.len(), 1);

        sub.alarm_time = Some("아홉시".into());
        assert!(matches!(
            rec.submit(sub, now()).await.unwrap_err(),
            RecordError::Invalid(_)
        ));
    }

    #[tokio::test]
    async fn auto_mode_uses_classifier_and_calendar() {
        let (rec, _, _) = recorder().await;
        let calendar = Arc::new(MemCalendar::default());
        let rec = rec
            .with_llm(Some(Arc::new(FixedLlm(
                "업무번호: 1\n유형: 할일\n시간: 2026-01-05 09:00\n반복: RRULE:FREQ=DAILY",
            ))))
            .with_calendar(Some(calendar.clone()));

        let sub = Submission {
            content: "내일 9시 피킹 리스트 점검".into(),
            ..Default::default()
        };
        let out = rec.submit(sub, now()).await.unwrap();
        assert_eq!(out.note.task, "📦 피킹지시");
        assert_eq!(out.note.note_type, NoteType::Todo);
        assert_eq!(out.note.alarm.as_deref(), Some("2026-01-05 09:00"));
        assert_eq!(out.calendar_link.as_deref(), Some("https://calendar/evt"));
        assert!(out.warnings.is_empty());
        assert!(out.message().contains("🤖 AI 분류 완료"));

        let events = calendar.events.lock().unwrap();
        assert_eq!(events[0].summary, "[📦 피킹지시] 내일 9시 피킹 리스트 점검");
        assert_eq!(events[0].recurrence, vec!["RRULE:FREQ=DAILY"]);
    }

    #[tokio::test]
    async fn image_upload_names_file_by_time() {
        let (rec, _, _) = recorder().await;
        let files = Arc::new(MemFiles::default());
        let rec = rec.with_files(Some(files.clone()));
        let mut sub = manual("사진 첨부");
        sub.image = Some(ImageUpload {
            bytes: vec![1, 2, 3],
            mime: "image/png".into(),
        });
        let out = rec.submit(sub, now()).await.unwrap();
        assert_eq!(
            out.note.image_url.as_deref(),
            Some("https://drive.google.com/uc?export=view&id=img1")
        );
        let names = files.names.lock().unwrap();
        assert!(names[0].starts_with("20260104_150000_"));
        assert!(names[0].ends_with(".png"));
    }

    #[tokio::test]
    async fn failing_side_effects_become_warnings() {
        let (rec, wb, _) = recorder().await;
        let rec = rec
            .with_files(Some(Arc::new(MemFiles {
                fail: true,
                ..Default::default()
            })))
            .with_calendar(Some(Arc::new(MemCalendar {
                fail: true,
                ..Default::default()
            })));
        let mut sub = manual("둘 다 실패");
        sub.note_type = Some(NoteType::Todo);
        sub.alarm_date = Some("2026-01-05".into());
        sub.alarm_time = Some("10:00".into());
        sub.image = Some(ImageUpload {
            bytes: vec![0],
            mime: "image/jpeg".into(),
        });

        let out = rec.submit(sub, now()).await.unwrap();
        assert_eq!(out.warnings.len(), 2);
        assert!(out.note.image_url.is_none());
        assert!(out.calendar_link.is_none());
        assert_eq!(wb.list_notes().await.unwrap()[0].content, "둘 다 실패");
    }

    #[tokio::test]
    async fn image_without_store_is_a_warning() {
        let (rec, _, _) = recorder().await;
        let mut sub = manual("x");
        sub.image = Some(ImageUpload {
            bytes: vec![0],
            mime: "image/png".into(),
        });
        let out = rec.submit(sub, now()).await.unwrap();
        assert_eq!(out.warnings.len(), 1);
        assert!(out.note.image_url.is_none());
    }

    /// Refuses writes to the notes sheet; everything else passes through.
    struct NotesReadOnly(LibSqlBackend);

    #[async_trait]
    impl SheetBackend for NotesReadOnly {
        fn name(&self) -> &str {
            "notes-read-only"
        }
        async fn read_table(&self, sheet: &str) -> Result<Table, DatabaseError> {
            self.0.read_table(sheet).await
        }
        async fn write_table(&self, sheet: &str, table: &Table) -> Result<(), DatabaseError> {
            if sheet == sheets::NOTES {
                return Err(DatabaseError::Remote {
                    sheet: sheet.into(),
                    reason: "quota exceeded".into(),
                });
            }
            self.0.write_table(sheet, table).await
        }
    }

    #[tokio::test]
    async fn failed_save_schedules_nothing() {
        let backend = NotesReadOnly(LibSqlBackend::new_memory().await.unwrap());
        let workbook = Arc::new(Workbook::new(Arc::new(backend)));
        let (tx, mut rx) = broadcast::channel(16);
        let calendar = Arc::new(MemCalendar::default());
        let rec = Recorder::new(workbook, tx).with_calendar(Some(calendar.clone()));

        let mut sub = manual("저장 실패");
        sub.note_type = Some(NoteType::Todo);
        sub.alarm_date = Some("2026-01-05".into());
        sub.alarm_time = Some("10:00".into());

        let err = rec.submit(sub, now()).await.unwrap_err();
        assert!(matches!(err, RecordError::Workbook(_)));
        assert!(calendar.events.lock().unwrap().is_empty());
        assert!(rx.try_recv().is_err());
    }
}
