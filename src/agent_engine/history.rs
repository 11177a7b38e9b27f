use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::agent_engine::state::Action;
use crate::errors::DeskPilotResult;
use crate::llm::types::ContentBlock;

/// One append-only entry of the turn log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub turn: u32,
    pub ts: i64,
    #[serde(flatten)]
    pub kind: TurnKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnKind {
    /// The service's answer for a turn: the assistant blocks as sent back on
    /// the next request, plus the parsed action.
    Decision {
        tool_use_id: String,
        content: Vec<ContentBlock>,
        action: Action,
        reasoning: Option<String>,
    },
    /// What happened when the decided action was executed.
    Outcome {
        tool_use_id: String,
        success: bool,
        summary: String,
    },
}

impl TurnRecord {
    pub fn decision(
        turn: u32,
        tool_use_id: String,
        content: Vec<ContentBlock>,
        action: Action,
        reasoning: Option<String>,
    ) -> Self {
        Self {
            turn,
            ts: chrono::Utc::now().timestamp_millis(),
            kind: TurnKind::Decision { tool_use_id, content, action, reasoning },
        }
    }

    pub fn outcome(turn: u32, tool_use_id: String, success: bool, summary: String) -> Self {
        Self {
            turn,
            ts: chrono::Utc::now().timestamp_millis(),
            kind: TurnKind::Outcome { tool_use_id, success, summary },
        }
    }
}

/// Turn log of the controller. Only `clear` removes entries.
pub struct RunHistory {
    pub session_id: String,
    entries: Vec<TurnRecord>,
    file_path: Option<std::path::PathBuf>,
}

impl RunHistory {
    pub fn new() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            entries: Vec::new(),
            file_path: None,
        }
    }

    /// History that also appends every record to `session_<id>.jsonl` in the data dir.
    pub fn persistent() -> Self {
        let mut history = Self::new();
        let path = data_dir_or_cwd().join(format!("session_{}.jsonl", history.session_id));
        history.file_path = Some(path);
        history
    }

    pub fn with_file(path: std::path::PathBuf) -> Self {
        let mut history = Self::new();
        history.file_path = Some(path);
        history
    }

    pub fn push(&mut self, entry: TurnRecord) {
        self.entries.push(entry);
        if let Err(e) = self.flush() {
            tracing::warn!(error = %e, "failed to persist history entry");
        }
    }

    pub fn entries(&self) -> &[TurnRecord] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        tracing::info!(session = %self.session_id, dropped = self.entries.len(), "history cleared");
        self.entries.clear();
    }

    /// Append the latest entry to the JSONL file, if persistence is on.
    fn flush(&self) -> DeskPilotResult<()> {
        let (Some(path), Some(last)) = (&self.file_path, self.entries.last()) else {
            return Ok(());
        };
        let line = serde_json::to_string(last)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(file, "{}", line)?;
        tracing::debug!(path = %path.display(), "history entry flushed");
        Ok(())
    }
}

impl Default for RunHistory {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns `%LOCALAPPDATA%\DeskPilot\sessions` on Windows,
/// `~/.local/share/DeskPilot/sessions` on Linux and the platform equivalent
/// elsewhere, falling back to the current working directory.
fn data_dir_or_cwd() -> std::path::PathBuf {
    if let Some(data_dir) = dirs::data_local_dir() {
        let d = data_dir.join("DeskPilot").join("sessions");
        if std::fs::create_dir_all(&d).is_ok() {
            return d;
        }
    }
    std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_kept_in_order_until_cleared() {
        let mut history = RunHistory::new();
        history.push(TurnRecord::decision(1, "t1".into(), vec![], Action::LeftClick, None));
        history.push(TurnRecord::outcome(1, "t1".into(), true, "clicked".into()));
        history.push(TurnRecord::decision(2, "t2".into(), vec![], Action::Screenshot, None));

        let turns: Vec<u32> = history.entries().iter().map(|r| r.turn).collect();
        assert_eq!(turns, vec![1, 1, 2]);

        history.clear();
        assert!(history.is_empty());
    }

    #[test]
    fn persistent_history_appends_jsonl_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.jsonl");
        let mut history = RunHistory::with_file(path.clone());
        history.push(TurnRecord::decision(
            1,
            "t1".into(),
            vec![ContentBlock::text("moving")],
            Action::MouseMove { x: 10, y: 20 },
            Some("moving".into()),
        ));
        history.push(TurnRecord::outcome(1, "t1".into(), false, "permission denied".into()));

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: TurnRecord = serde_json::from_str(lines[0]).unwrap();
        assert!(matches!(first.kind, TurnKind::Decision { action: Action::MouseMove { x: 10, y: 20 }, .. }));
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["kind"], "outcome");
        assert_eq!(second["success"], false);
    }
}
