//! Issue-body writer
//!
//! Applies one minimal edit at a time to a parsed document and re-derives the
//! spans. Untouched lines are emitted byte-identical to the bytes they were
//! parsed from; the only line that changes on a todo toggle is the marker
//! character itself.

use super::parser::ParsedBody;
use super::MAX_BODY_LEN;
use crate::{Result, TrellisError};
use chrono::{SecondsFormat, Utc};

/// Reject bodies over the service's documented ceiling. Counted in Unicode
/// scalar values, matching the service-side check.
pub fn validate_body_size(body: &str) -> Result<()> {
    let len = body.chars().count();
    if len > MAX_BODY_LEN {
        return Err(TrellisError::BodyTooLarge(len));
    }
    Ok(())
}

fn content(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}

impl ParsedBody {
    fn reparse(&mut self) {
        *self = ParsedBody::parse(&self.to_body());
    }

    fn is_blank_document(&self) -> bool {
        self.lines.iter().all(|l| content(l).trim().is_empty())
    }

    /// Serialize and enforce the size ceiling.
    pub fn to_body_checked(&self) -> Result<String> {
        let body = self.to_body();
        validate_body_size(&body)?;
        Ok(body)
    }

    /// Flip the check marker of one todo in place. Returns the new state.
    pub fn toggle_todo(&mut self, section: usize, todo: usize) -> Result<bool> {
        let todo = self.sections[section]
            .todos
            .get(todo)
            .ok_or_else(|| TrellisError::Internal("todo index out of range".to_string()))?
            .clone();

        let line = &mut self.lines[todo.line];
        let marker = line
            .find("- [")
            .map(|pos| pos + 3)
            .filter(|pos| line.as_bytes().get(*pos).is_some())
            .ok_or_else(|| {
                TrellisError::Internal(format!("todo marker not found on line {}", todo.line))
            })?;

        let new_state = !todo.checked;
        line.replace_range(marker..marker + 1, if new_state { "x" } else { " " });
        self.reparse();
        Ok(new_state)
    }

    /// Insert a new unchecked todo at the end of a section, after its last
    /// non-blank line. Condition blocks have their own grammar, so when the
    /// section carries any, the todo lands above the first one.
    pub fn insert_todo(&mut self, section: usize, text: &str) {
        let body = self.sections[section].body.clone();
        let heading = self.sections[section].heading_line;

        let search_end = self
            .conditions
            .iter()
            .filter(|c| body.contains(&c.line))
            .map(|c| c.line)
            .min()
            .unwrap_or(body.end);

        let at = self.lines[body.start..search_end]
            .iter()
            .rposition(|l| !content(l).trim().is_empty())
            .map(|offset| body.start + offset + 1)
            .unwrap_or(heading + 1);

        self.lines.insert(at, format!("- [ ] {}", text.trim()));
        self.reparse();
    }

    /// Append a new section at the end of the section list (before the log
    /// block when present). Returns the new section's index.
    pub fn append_section(&mut self, title: &str) -> usize {
        let title = title.trim();

        if self.is_blank_document() && self.sections.is_empty() && self.log.is_none() {
            self.lines = vec![format!("## {title}")];
        } else {
            let mut at = match &self.log {
                Some(log) => log.heading_line,
                None => self.tail_insert_point(),
            };
            if at > 0 && !content(&self.lines[at - 1]).trim().is_empty() {
                self.lines.insert(at, String::new());
                at += 1;
            }
            self.lines.insert(at, format!("## {title}"));
            if self.log.is_some() {
                self.lines.insert(at + 1, String::new());
            }
        }

        self.reparse();
        self.find_section(title)
            .expect("appended section is present")
    }

    /// Replace the content of a section, leaving its heading and every other
    /// region untouched.
    pub fn set_section_content(&mut self, section: usize, content_text: &str) {
        let body = self.sections[section].body.clone();
        let replacement: Vec<String> = content_text.split('\n').map(str::to_string).collect();
        self.lines.splice(body, replacement);
        self.reparse();
    }

    /// Ensure the prelude opens with a parent reference line.
    pub fn ensure_parent_reference(&mut self, parent: u64) {
        if self.references.parent == Some(parent) {
            return;
        }
        let reference = format!("**Parent:** #{parent}");
        if self.is_blank_document() && self.sections.is_empty() && self.log.is_none() {
            self.lines = vec![reference];
        } else {
            self.lines.insert(0, reference);
            self.lines.insert(1, String::new());
        }
        self.reparse();
    }

    /// Append an audit entry to the log block, creating the sentinel heading
    /// when absent. Entries are append-only; existing records never move.
    pub fn append_log_entry(
        &mut self,
        from_state: &str,
        to_state: &str,
        actor: &str,
        message: Option<&str>,
    ) {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut entry = vec![
            format!("### {timestamp}"),
            format!("State changed from `{from_state}` to `{to_state}` by @{actor}"),
        ];
        if let Some(message) = message {
            let mut reason = message.trim_end().lines();
            if let Some(first) = reason.next() {
                entry.push(format!("Reason: {first}"));
                entry.extend(reason.map(str::to_string));
            }
        }

        let mut tail = Vec::new();
        if self.log.is_none() {
            tail.push("## Log".to_string());
            tail.push(String::new());
        }
        tail.extend(entry);

        self.append_at_tail(tail);
        self.reparse();
    }

    /// Insert point at the document tail, keeping a single trailing blank
    /// line (the trailing-newline artifact) at the very end.
    fn tail_insert_point(&self) -> usize {
        let len = self.lines.len();
        if len > 1 && content(&self.lines[len - 1]).is_empty() {
            len - 1
        } else {
            len
        }
    }

    fn append_at_tail(&mut self, new_lines: Vec<String>) {
        if self.is_blank_document() {
            self.lines = new_lines;
            return;
        }
        let mut at = self.tail_insert_point();
        if at > 0 && !content(&self.lines[at - 1]).trim().is_empty() {
            self.lines.insert(at, String::new());
            at += 1;
        }
        for (offset, line) in new_lines.into_iter().enumerate() {
            self.lines.insert(at + offset, line);
        }
    }

    /// Count of persisted log entries.
    pub fn log_entry_count(&self) -> usize {
        self.log.as_ref().map(|l| l.entries.len()).unwrap_or(0)
    }
}
