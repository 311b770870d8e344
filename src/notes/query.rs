//! Filtered and recent views over notes.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::clock::DATE_FORMAT;
use crate::notes::model::{Note, NoteType};

/// Length of list-view content previews, in characters.
pub const PREVIEW_CHARS: usize = 50;

/// Default size of the recent-notes strip.
pub const DEFAULT_RECENT: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    #[default]
    #[serde(alias = "전체")]
    All,
    #[serde(alias = "오늘")]
    Today,
    /// The last seven days, today included.
    #[serde(alias = "이번 주")]
    Week,
    /// Same calendar month as today.
    #[serde(alias = "이번 달")]
    Month,
}

impl Period {
    pub fn label(self) -> &'static str {
        match self {
            Self::All => "전체",
            Self::Today => "오늘",
            Self::Week => "이번 주",
            Self::Month => "이번 달",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NoteFilter {
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default, rename = "type")]
    pub note_type: Option<NoteType>,
    #[serde(default)]
    pub period: Period,
    #[serde(default)]
    pub completed: Option<bool>,
}

impl NoteFilter {
    pub fn matches(&self, note: &Note, today: NaiveDate) -> bool {
        if let Some(task) = self.task.as_deref().filter(|t| !t.trim().is_empty()) {
            if note.task.trim() != task.trim() {
                return false;
            }
        }
        if self.note_type.is_some_and(|t| t != note.note_type) {
            return false;
        }
        if self.completed.is_some_and(|c| c != note.completed) {
            return false;
        }
        match self.period {
            Period::All => true,
            Period::Today => note.date == today.format(DATE_FORMAT).to_string(),
            // ISO dates compare correctly as strings.
            Period::Week => {
                let from = (today - Duration::days(7)).format(DATE_FORMAT).to_string();
                !note.date.is_empty() && note.date >= from
            }
            Period::Month => {
                let prefix = format!("{:04}-{:02}", today.year(), today.month());
                note.date.starts_with(&prefix)
            }
        }
    }

    /// Matching notes, newest first.
    pub fn apply(&self, notes: &[Note], today: NaiveDate) -> Vec<Note> {
        let mut out: Vec<Note> = notes
            .iter()
            .filter(|n| self.matches(n, today))
            .cloned()
            .collect();
        sort_newest_first(&mut out);
        out
    }
}

/// Newest first by date and time; later rows win ties.
pub fn sort_newest_first(notes: &mut [Note]) {
    notes.sort_by(|a, b| {
        (b.date.as_str(), b.time.as_str(), b.index).cmp(&(a.date.as_str(), a.time.as_str(), a.index))
    });
}

/// The `n` most recent notes, newest first.
pub fn recent(notes: &[Note], n: usize) -> Vec<Note> {
    let mut all = notes.to_vec();
    sort_newest_first(&mut all);
    all.truncate(n);
    all
}

/// Notes logged on one day, in row order.
pub fn on_date(notes: &[Note], date: &str) -> Vec<Note> {
    notes.iter().filter(|n| n.date == date).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(index: usize, date: &str, time: &str, task: &str, t: NoteType) -> Note {
        Note {
            index,
            date: date.into(),
            time: time.into(),
            task: task.into(),
            note_type: t,
            content: format!("note {index}"),
            image_url: None,
            alarm: None,
            completed: false,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 20).unwrap()
    }

    fn sample() -> Vec<Note> {
        vec![
            note(0, "2025-12-31", "09:00:00", "A", NoteType::Idea),
            note(1, "2026-01-05", "09:00:00", "A", NoteType::Todo),
            note(2, "2026-01-13", "09:00:00", "B", NoteType::Issue),
            note(3, "2026-01-20", "08:00:00", "A", NoteType::Update),
            note(4, "2026-01-20", "11:00:00", "B", NoteType::Todo),
        ]
    }

    fn indices(notes: &[Note]) -> Vec<usize> {
        notes.iter().map(|n| n.index).collect()
    }

    #[test]
    fn all_is_newest_first() {
        let out = NoteFilter::default().apply(&sample(), today());
        assert_eq!(indices(&out), vec![4, 3, 2, 1, 0]);
    }

    #[test]
    fn period_filters() {
        let notes = sample();
        let f = |period| NoteFilter {
            period,
            ..Default::default()
        };
        assert_eq!(indices(&f(Period::Today).apply(&notes, today())), vec![4, 3]);
        // 2026-01-13 is exactly seven days back and is included.
        assert_eq!(indices(&f(Period::Week).apply(&notes, today())), vec![4, 3, 2]);
        assert_eq!(indices(&f(Period::Month).apply(&notes, today())), vec![4, 3, 2, 1]);
    }

    #[test]
    fn task_type_and_completion_filters() {
        let mut notes = sample();
        notes[4].completed = true;

        let by_task = NoteFilter {
            task: Some("A".into()),
            ..Default::default()
        };
        assert_eq!(indices(&by_task.apply(&notes, today())), vec![3, 1, 0]);

        let open_todos = NoteFilter {
            note_type: Some(NoteType::Todo),
            completed: Some(false),
            ..Default::default()
        };
        assert_eq!(indices(&open_todos.apply(&notes, today())), vec![1]);
    }

    #[test]
    fn blank_task_filter_matches_everything() {
        let f = NoteFilter {
            task: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(f.apply(&sample(), today()).len(), 5);
    }

    #[test]
    fn recent_takes_latest() {
        assert_eq!(indices(&recent(&sample(), 2)), vec![4, 3]);
        assert_eq!(recent(&sample(), DEFAULT_RECENT).len(), 5);
        assert!(recent(&[], 5).is_empty());
    }

    #[test]
    fn period_accepts_korean_labels() {
        let p: Period = serde_json::from_str("\"이번 주\"").unwrap();
        assert_eq!(p, Period::Week);
        let p: Period = serde_json::from_str("\"month\"").unwrap();
        assert_eq!(p, Period::Month);
    }
}
