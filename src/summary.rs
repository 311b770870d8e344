//! Daily and portfolio reports, with and without the LLM.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use tracing::info;

use crate::error::LlmError;
use crate::llm::{self, LlmProvider};
use crate::notes::{Note, NoteType, TaskConfig};

const SUMMARY_INPUT_CHARS: usize = 10_000;
const REPORT_SYSTEM: &str = "너는 자재관리 담당자의 업무 보고를 돕는 비서야.";

/// Task names in first-seen order with their notes.
fn group_by_task(notes: &[Note]) -> Vec<(&str, Vec<&Note>)> {
    let mut groups: Vec<(&str, Vec<&Note>)> = Vec::new();
    for note in notes {
        match groups.iter_mut().find(|(task, _)| *task == note.task) {
            Some((_, members)) => members.push(note),
            None => groups.push((note.task.as_str(), vec![note])),
        }
    }
    groups
}

fn log_lines(notes: &[Note]) -> String {
    notes
        .iter()
        .map(|n| {
            let content = if n.content.trim().is_empty() {
                "(내용 없음)"
            } else {
                n.content.as_str()
            };
            format!("- [{}] ({}): {}\n", n.task, n.note_type.label(), content)
        })
        .collect()
}

fn no_records(date: &str) -> String {
    format!("📅 {date}에 작성된 업무 기록이 없습니다")
}

/// Suggest a short topic for a pasted conversation, focused on code changes.
pub async fn summarize_chat(llm: &dyn LlmProvider, text: &str) -> Result<String, LlmError> {
    let head: String = text.chars().take(SUMMARY_INPUT_CHARS).collect();
    llm::ask(
        llm,
        REPORT_SYSTEM,
        format!("다음 내용을 50자 이내로 핵심만 요약해줘 (코드 수정 사항 위주로): \n\n{head}"),
        0.3,
        128,
    )
    .await
}

/// Report-style daily report written by the LLM. `notes` should already be
/// limited to `date`.
pub async fn daily_report(
    llm: &dyn LlmProvider,
    notes: &[Note],
    date: &str,
) -> Result<String, LlmError> {
    if notes.is_empty() {
        return Ok(no_records(date));
    }
    let prompt = format!(
        "다음은 {date} 나의 자재관리 업무 로그야. 이 내용을 바탕으로 팀장님께 보고할 '일일 업무 보고서'를 작성해줘.\n\
         \n\
         [조건]\n\
         1. 말투는 '~~함', '~~임' 같은 간결한 보고체(개조식)로 써줘.\n\
         2. 업무별로 카테고리를 나눠서 정리해줘.\n\
         3. '{issue}'으로 기록된 건은 '금일 특이사항'에 강조해서 넣어줘.\n\
         4. 한국어로 작성해줘.\n\
         \n\
         [업무 로그]\n\
         {log}",
        issue = NoteType::Issue.label(),
        log = log_lines(notes),
    );
    let report = llm::ask(llm, REPORT_SYSTEM, prompt, 0.4, 2048).await?;
    info!(date, notes = notes.len(), "AI daily report generated");
    Ok(report)
}

/// Per-task digest fed to the portfolio prompt.
fn task_digest(notes: &[Note], tasks: &[TaskConfig]) -> String {
    let mut by_task: BTreeMap<&str, Vec<&Note>> = BTreeMap::new();
    for note in notes {
        by_task.entry(note.task.as_str()).or_default().push(note);
    }

    let mut names: Vec<&str> = tasks.iter().map(|t| t.name.as_str()).collect();
    for name in by_task.keys() {
        if !names.contains(name) {
            names.push(*name);
        }
    }

    let mut out = String::new();
    for name in names {
        let members = by_task.get(name).map(Vec::as_slice).unwrap_or(&[]);
        let description = tasks
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.description.trim())
            .unwrap_or("");
        let _ = writeln!(out, "## {name}");
        if !description.is_empty() {
            let _ = writeln!(out, "설명: {description}");
        }
        let count = |t: NoteType| members.iter().filter(|n| n.note_type == t).count();
        let _ = writeln!(
            out,
            "기록 {}건 (아이디어 {}, 할일 {}, 업데이트 {}, 문제점 {})",
            members.len(),
            count(NoteType::Idea),
            count(NoteType::Todo),
            count(NoteType::Update),
            count(NoteType::Issue),
        );
        for n in members {
            let open = if n.note_type == NoteType::Todo && !n.completed {
                " [미완료]"
            } else {
                ""
            };
            let _ = writeln!(
                out,
                "- {} {} ({}){}: {}",
                n.date,
                n.time,
                n.note_type.word(),
                open,
                n.content.trim()
            );
        }
        out.push('\n');
    }
    out
}

/// Progress overview across tasks for the given period.
pub async fn portfolio_summary(
    llm: &dyn LlmProvider,
    notes: &[Note],
    tasks: &[TaskConfig],
    period_label: &str,
) -> Result<String, LlmError> {
    if notes.is_empty() {
        return Ok(format!("{period_label} 기간에 작성된 업무 기록이 없습니다"));
    }
    let prompt = format!(
        "다음은 {period_label} 기간의 업무별 기록이야. 업무 포트폴리오 요약을 작성해줘.\n\
         \n\
         [조건]\n\
         1. 업무별로 진행 상황을 2~3줄로 요약해줘.\n\
         2. [미완료] 표시된 할일은 '남은 할 일'로 모아서 보여줘.\n\
         3. 문제점은 '리스크'로 따로 정리하고 해결 여부를 적어줘.\n\
         4. 개조식 한국어로 작성해줘.\n\
         \n\
         {digest}",
        digest = task_digest(notes, tasks),
    );
    let summary = llm::ask(llm, REPORT_SYSTEM, prompt, 0.4, 2048).await?;
    info!(period = period_label, notes = notes.len(), "Portfolio summary generated");
    Ok(summary)
}

/// Markdown daily report grouped by task, no LLM involved.
pub fn plain_daily_report(notes: &[Note], date: &str) -> String {
    let today: Vec<Note> = notes.iter().filter(|n| n.date == date).cloned().collect();
    if today.is_empty() {
        return no_records(date);
    }

    let mut report = format!("# 📊 {date} 일일 리포트\n\n");
    for (task, members) in group_by_task(&today) {
        let _ = write!(report, "## 📌 {task}\n\n");
        for n in members {
            let _ = write!(report, "**{}** {}\n\n", n.note_type.label(), n.time);
            let _ = write!(report, "{}\n\n", n.content);
            if let Some(url) = n.image_url.as_deref() {
                let _ = write!(report, "[🖼️ 이미지]({url})\n\n");
            }
            report.push_str("---\n\n");
        }
    }
    report
}
