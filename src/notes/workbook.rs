//! Typed access to the config, notes and chats tables.
//!
//! Every mutation reads the whole table, changes it and writes it back while
//! holding one in-process lock.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::clock;
use crate::error::WorkbookError;
use crate::notes::model::{
    ChatLog, DEFAULT_TASK_DESCRIPTION, DONE_MARK, Note, TaskConfig, columns, default_tasks,
    sheets,
};
use crate::store::{SheetBackend, Table};

#[derive(Clone, Copy)]
enum Source {
    Cached,
    Latest,
}

pub struct Workbook {
    backend: Arc<dyn SheetBackend>,
    write_lock: Mutex<()>,
}

impl Workbook {
    pub fn new(backend: Arc<dyn SheetBackend>) -> Self {
        Self {
            backend,
            write_lock: Mutex::new(()),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    // ── Loading with back-fill ──────────────────────────────────────

    /// Config table for readers. Takes the write lock only to seed.
    async fn config_table(&self) -> Result<Table, WorkbookError> {
        let mut table = self.backend.read_table(sheets::CONFIG).await?;
        if table.is_uninitialized() {
            let _guard = self.write_lock.lock().await;
            return self.seeded_config_table().await;
        }
        table.ensure_column(columns::TASK_DESCRIPTION, DEFAULT_TASK_DESCRIPTION);
        Ok(table)
    }

    /// Config table, seeding defaults into a never-written sheet.
    /// Caller must hold the write lock.
    async fn seeded_config_table(&self) -> Result<Table, WorkbookError> {
        let mut table = self.backend.read_table_fresh(sheets::CONFIG).await?;
        if table.is_uninitialized() {
            table = Table::new(columns::CONFIG_HEADER);
            for task in default_tasks() {
                table.push_record(&task.to_record());
            }
            self.backend.write_table(sheets::CONFIG, &table).await?;
            info!(tasks = table.len(), "Seeded default task config");
        }
        table.ensure_column(columns::TASK_DESCRIPTION, DEFAULT_TASK_DESCRIPTION);
        Ok(table)
    }

    /// Raw read of a sheet. `Latest` goes past the cache and is what every
    /// mutation uses under the write lock.
    async fn read(&self, sheet: &str, source: Source) -> Result<Table, WorkbookError> {
        Ok(match source {
            Source::Cached => self.backend.read_table(sheet).await?,
            Source::Latest => self.backend.read_table_fresh(sheet).await?,
        })
    }

    async fn notes_table(&self, source: Source) -> Result<Table, WorkbookError> {
        let mut table = self.read(sheets::NOTES, source).await?;
        if table.is_uninitialized() {
            table = Table::new(columns::NOTES_HEADER);
        }
        for col in [columns::NOTE_IMAGE, columns::NOTE_ALARM, columns::NOTE_DONE] {
            table.ensure_column(col, "");
        }
        Ok(table)
    }

    async fn chats_table(&self, source: Source) -> Result<Table, WorkbookError> {
        let mut table = self.read(sheets::CHATS, source).await?;
        if table.is_uninitialized() {
            return Ok(Table::new(columns::CHATS_HEADER));
        }
        if !table.has_column(columns::CHAT_CONTENT)
            && table.has_column(columns::CHAT_LEGACY_QUESTION)
            && table.has_column(columns::CHAT_LEGACY_ANSWER)
        {
            let merged: Vec<String> = (0..table.len())
                .map(|i| {
                    format!(
                        "Q: {}\n\nA: {}",
                        table.cell(i, columns::CHAT_LEGACY_QUESTION),
                        table.cell(i, columns::CHAT_LEGACY_ANSWER)
                    )
                })
                .collect();
            table.ensure_column(columns::CHAT_CONTENT, "");
            for (i, text) in merged.into_iter().enumerate() {
                table.set_cell(i, columns::CHAT_CONTENT, text);
            }
            debug!(rows = table.len(), "Back-filled chat content from Q/A columns");
        }
        table.ensure_column(columns::CHAT_TOPIC, "");
        Ok(table)
    }

    // ── Tasks ───────────────────────────────────────────────────────

    /// Configured tasks in sheet order. Rows without a name are skipped.
    pub async fn list_tasks(&self) -> Result<Vec<TaskConfig>, WorkbookError> {
        let table = self.config_table().await?;
        Ok((0..table.len())
            .map(|i| TaskConfig::from_row(&table, i))
            .filter(|t| !t.name.is_empty())
            .collect())
    }

    fn task_row(table: &Table, name: &str) -> Option<usize> {
        let name = name.trim();
        (0..table.len()).find(|&i| table.cell(i, columns::TASK_NAME).trim() == name)
    }

    pub async fn add_task(&self, mut task: TaskConfig) -> Result<TaskConfig, WorkbookError> {
        task.name = task.name.trim().to_string();
        if task.name.is_empty() {
            return Err(WorkbookError::Invalid("task name is empty".into()));
        }
        if task.description.trim().is_empty() {
            task.description = DEFAULT_TASK_DESCRIPTION.to_string();
        }

        let _guard = self.write_lock.lock().await;
        let mut table = self.seeded_config_table().await?;
        if Self::task_row(&table, &task.name).is_some() {
            return Err(WorkbookError::Duplicate {
                entity: "task",
                key: task.name,
            });
        }
        table.push_record(&task.to_record());
        self.backend.write_table(sheets::CONFIG, &table).await?;
        info!(task = %task.name, "Task added");
        Ok(task)
    }

    pub async fn remove_task(&self, name: &str) -> Result<(), WorkbookError> {
        let _guard = self.write_lock.lock().await;
        let mut table = self.seeded_config_table().await?;
        let row = Self::task_row(&table, name).ok_or_else(|| WorkbookError::NotFound {
            entity: "task",
            key: name.to_string(),
        })?;
        table.remove_row(row);
        self.backend.write_table(sheets::CONFIG, &table).await?;
        info!(task = %name, "Task removed");
        Ok(())
    }

    pub async fn set_task_description(
        &self,
        name: &str,
        description: &str,
    ) -> Result<TaskConfig, WorkbookError> {
        let _guard = self.write_lock.lock().await;
        let mut table = self.seeded_config_table().await?;
        let row = Self::task_row(&table, name).ok_or_else(|| WorkbookError::NotFound {
            entity: "task",
            key: name.to_string(),
        })?;
        table.set_cell(row, columns::TASK_DESCRIPTION, description);
        self.backend.write_table(sheets::CONFIG, &table).await?;
        Ok(TaskConfig::from_row(&table, row))
    }

    /// Replace the whole task grid. Names must be unique and non-empty.
    pub async fn replace_tasks(&self, tasks: Vec<TaskConfig>) -> Result<usize, WorkbookError> {
        let mut table = Table::new(columns::CONFIG_HEADER);
        for task in &tasks {
            let name = task.name.trim();
            if name.is_empty() {
                return Err(WorkbookError::Invalid("task name is empty".into()));
            }
            if Self::task_row(&table, name).is_some() {
                return Err(WorkbookError::Duplicate {
                    entity: "task",
                    key: name.to_string(),
                });
            }
            table.push_record(&task.to_record());
        }

        let _guard = self.write_lock.lock().await;
        self.backend.write_table(sheets::CONFIG, &table).await?;
        info!(tasks = table.len(), "Task grid replaced");
        Ok(table.len())
    }

    // ── Notes ───────────────────────────────────────────────────────

    pub async fn list_notes(&self) -> Result<Vec<Note>, WorkbookError> {
        let table = self.notes_table(Source::Cached).await?;
        Ok((0..table.len()).map(|i| Note::from_row(&table, i)).collect())
    }

    /// Append a note. The returned note carries its row index.
    pub async fn append_note(&self, note: &Note) -> Result<Note, WorkbookError> {
        if let Some(alarm) = &note.alarm {
            if clock::parse_alarm(alarm).is_none() {
                return Err(WorkbookError::Invalid(format!(
                    "alarm must be YYYY-MM-DD HH:MM, got {alarm:?}"
                )));
            }
        }

        let _guard = self.write_lock.lock().await;
        let mut table = self.notes_table(Source::Latest).await?;
        table.push_record(&note.to_record());
        self.backend.write_table(sheets::NOTES, &table).await?;

        let index = table.len() - 1;
        debug!(index, task = %note.task, "Note appended");
        Ok(Note::from_row(&table, index))
    }

    fn note_not_found(index: usize) -> WorkbookError {
        WorkbookError::NotFound {
            entity: "note",
            key: index.to_string(),
        }
    }

    pub async fn update_note_content(
        &self,
        index: usize,
        content: &str,
    ) -> Result<Note, WorkbookError> {
        let _guard = self.write_lock.lock().await;
        let mut table = self.notes_table(Source::Latest).await?;
        if index >= table.len() {
            return Err(Self::note_not_found(index));
        }
        table.set_cell(index, columns::NOTE_CONTENT, content);
        self.backend.write_table(sheets::NOTES, &table).await?;
        Ok(Note::from_row(&table, index))
    }

    pub async fn set_note_completed(
        &self,
        index: usize,
        completed: bool,
    ) -> Result<Note, WorkbookError> {
        let _guard = self.write_lock.lock().await;
        let mut table = self.notes_table(Source::Latest).await?;
        if index >= table.len() {
            return Err(Self::note_not_found(index));
        }
        table.set_cell(
            index,
            columns::NOTE_DONE,
            if completed { DONE_MARK } else { "" },
        );
        self.backend.write_table(sheets::NOTES, &table).await?;
        Ok(Note::from_row(&table, index))
    }

    /// Remove a note row. Later rows shift down by one.
    pub async fn delete_note(&self, index: usize) -> Result<Note, WorkbookError> {
        let _guard = self.write_lock.lock().await;
        let mut table = self.notes_table(Source::Latest).await?;
        if index >= table.len() {
            return Err(Self::note_not_found(index));
        }
        let removed = Note::from_row(&table, index);
        table.remove_row(index);
        self.backend.write_table(sheets::NOTES, &table).await?;
        info!(index, task = %removed.task, "Note deleted");
        Ok(removed)
    }

    // ── Chats ───────────────────────────────────────────────────────

    pub async fn list_chats(&self) -> Result<Vec<ChatLog>, WorkbookError> {
        let table = self.chats_table(Source::Cached).await?;
        Ok((0..table.len()).map(|i| ChatLog::from_row(&table, i)).collect())
    }

    pub async fn append_chat(
        &self,
        topic: &str,
        content: &str,
        now: DateTime<FixedOffset>,
    ) -> Result<ChatLog, WorkbookError> {
        if content.trim().is_empty() {
            return Err(WorkbookError::Invalid("chat content is empty".into()));
        }
        let chat = ChatLog {
            index: 0,
            date: clock::date_str(&now),
            time: clock::time_str(&now),
            topic: topic.trim().to_string(),
            content: content.to_string(),
        };

        let _guard = self.write_lock.lock().await;
        let mut table = self.chats_table(Source::Latest).await?;
        table.push_record(&chat.to_record());
        self.backend.write_table(sheets::CHATS, &table).await?;
        Ok(ChatLog::from_row(&table, table.len() - 1))
    }

    pub async fn delete_chat(&self, index: usize) -> Result<ChatLog, WorkbookError> {
        let _guard = self.write_lock.lock().await;
        let mut table = self.chats_table(Source::Latest).await?;
        if index >= table.len() {
            return Err(WorkbookError::NotFound {
                entity: "chat",
                key: index.to_string(),
            });
        }
        let removed = ChatLog::from_row(&table, index);
        table.remove_row(index);
        self.backend.write_table(sheets::CHATS, &table).await?;
        Ok(removed)
    }
}
