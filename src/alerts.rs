//! Reminder views and the background sweep that announces due reminders.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::clock;
use crate::error::WorkbookError;
use crate::notes::{Note, NoteWsMessage, Workbook};

/// How far around "now" a reminder counts as pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertWindow {
    /// Overdue reminders stay visible this long.
    pub grace: chrono::Duration,
    pub lookahead: chrono::Duration,
}

impl Default for AlertWindow {
    fn default() -> Self {
        Self {
            grace: chrono::Duration::minutes(60),
            lookahead: chrono::Duration::hours(24),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingAlert {
    #[serde(flatten)]
    pub note: Note,
    /// Negative when overdue.
    pub minutes_until: i64,
}

fn alarm_of(note: &Note) -> Option<DateTime<FixedOffset>> {
    if note.completed {
        return None;
    }
    note.alarm.as_deref().and_then(clock::parse_alarm)
}

/// Open reminders with `now - grace <= alarm <= now + lookahead`, soonest first.
pub fn pending_alerts(
    notes: &[Note],
    now: DateTime<FixedOffset>,
    window: AlertWindow,
) -> Vec<PendingAlert> {
    let from = now - window.grace;
    let to = now + window.lookahead;
    let mut out: Vec<(DateTime<FixedOffset>, PendingAlert)> = notes
        .iter()
        .filter_map(|n| {
            let at = alarm_of(n)?;
            (from <= at && at <= to).then(|| {
                (
                    at,
                    PendingAlert {
                        note: n.clone(),
                        minutes_until: (at - now).num_minutes(),
                    },
                )
            })
        })
        .collect();
    out.sort_by_key(|(at, _)| *at);
    out.into_iter().map(|(_, a)| a).collect()
}

/// Open reminders whose time lies in `(after, until]`.
pub fn due_between(
    notes: &[Note],
    after: DateTime<FixedOffset>,
    until: DateTime<FixedOffset>,
) -> Vec<Note> {
    notes
        .iter()
        .filter(|n| alarm_of(n).is_some_and(|at| after < at && at <= until))
        .cloned()
        .collect()
}

/// Broadcast every open reminder due in `(after, until]`. Returns how many.
pub async fn sweep(
    workbook: &Workbook,
    tx: &broadcast::Sender<NoteWsMessage>,
    after: DateTime<FixedOffset>,
    until: DateTime<FixedOffset>,
) -> Result<usize, WorkbookError> {
    let notes = workbook.list_notes().await?;
    let due = due_between(&notes, after, until);
    for note in &due {
        info!(
            index = note.index,
            task = %note.task,
            alarm = note.alarm.as_deref().unwrap_or(""),
            "Reminder due"
        );
        // No receivers is fine.
        let _ = tx.send(NoteWsMessage::AlertDue { note: note.clone() });
    }
    debug!(checked = notes.len(), due = due.len(), "Alert sweep done");
    Ok(due.len())
}

/// Run `sweep` every `period`, each tick covering the span since the last
/// successful one.
pub fn spawn_alert_task(
    workbook: Arc<Workbook>,
    tx: broadcast::Sender<NoteWsMessage>,
    period: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        let mut last = clock::now_kst();
        loop {
            interval.tick().await;
            let now = clock::now_kst();
            match sweep(&workbook, &tx, last, now).await {
                Ok(_) => last = now,
                Err(e) => warn!(error = %e, "Alert sweep could not load notes"),
            }
        }
    })
}
