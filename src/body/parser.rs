//! Markdown issue-body parser
//!
//! Single forward pass over lines with a small state machine (prelude,
//! in-section, log block). Source lines are retained verbatim so the writer
//! can re-emit untouched regions byte-identically. Never fails on arbitrary
//! input; malformed constructs degrade to plain section content.

use crate::model::Condition;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::ops::Range;
use std::sync::OnceLock;

fn todo_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^- \[([ xX])\] (.*)$").expect("static pattern"))
}

fn condition_heading_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)^###\s+condition:\s*(.+)$").expect("static pattern"))
}

fn condition_verified_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)^-\s*\[([ xX])\]\s*verified\s*$").expect("static pattern"))
}

fn condition_field_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^-\s*\*\*(signed-off by|requirements|evidence):\*\*\s*(.*)$")
            .expect("static pattern")
    })
}

fn parent_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // Flexible bold markers and an optional Epic/Task qualifier, e.g.
    // `**Parent:** #12` or `**Parent Epic:** #12`
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^\*\*parent(?:\s+(?:epic|task))?:?\*\*\s*#(\d+)").expect("static pattern")
    })
}

fn task_reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^- \[.\]\s*#(\d+)").expect("static pattern"))
}

fn log_state_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^State changed from `([^`]*)` to `([^`]*)` by @(\S+)\s*$")
            .expect("static pattern")
    })
}

/// A single checkbox line inside a section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Todo {
    pub text: String,
    pub checked: bool,
    /// Index into the document's line buffer.
    pub line: usize,
}

/// A level-2 heading and the lines up to the next level-2 heading.
#[derive(Debug, Clone)]
pub struct Section {
    /// Original title text, case preserved.
    pub title: String,
    /// Line index of the `## ` heading.
    pub heading_line: usize,
    /// Body lines, exclusive of the heading.
    pub body: Range<usize>,
    pub todos: Vec<Todo>,
}

impl Section {
    /// Case-folded title used for uniqueness and lookup.
    pub fn key(&self) -> String {
        self.title.to_lowercase()
    }
}

/// Hierarchy references extracted from the prelude.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct References {
    /// `**Parent:** #N`; only the first reference counts.
    pub parent: Option<u64>,
    /// `- [.] #N` lines (epic prelude task list).
    pub referenced_tasks: Vec<u64>,
}

/// One audit-log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: Option<DateTime<Utc>>,
    pub from_state: String,
    pub to_state: String,
    pub actor: String,
    pub message: Option<String>,
}

/// The trailing `## Log` region.
#[derive(Debug, Clone)]
pub struct LogBlock {
    /// Line index of the sentinel heading.
    pub heading_line: usize,
    pub entries: Vec<LogEntry>,
}

/// Parsed issue body with retained source lines.
#[derive(Debug, Clone)]
pub struct ParsedBody {
    /// Source split on `\n`; carriage returns are kept as line content so
    /// mixed line endings survive the round trip.
    pub(crate) lines: Vec<String>,
    /// Lines before the first level-2 heading.
    pub prelude: Range<usize>,
    pub sections: Vec<Section>,
    pub references: References,
    /// Sign-off gates found anywhere outside the log block.
    pub conditions: Vec<Condition>,
    pub log: Option<LogBlock>,
}

/// Strip a trailing carriage return for matching; the stored line keeps it.
fn content(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}

fn is_fence(line: &str) -> bool {
    let trimmed = content(line).trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

/// `## Title` with exactly two leading hashes; deeper headings are content.
fn section_title(line: &str) -> Option<&str> {
    let text = content(line);
    let rest = text.strip_prefix("## ")?;
    Some(rest.trim())
}

/// Underscore-wrapped placeholders (`_Not yet provided_`) read as unset.
fn metadata_value(raw: &str) -> Option<String> {
    let value = raw.trim();
    if value.is_empty() || (value.starts_with('_') && value.ends_with('_')) {
        return None;
    }
    Some(value.to_string())
}

impl ParsedBody {
    /// Parse an issue body. Accepts anything, including an empty string and
    /// bodies with no section headings at all.
    pub fn parse(body: &str) -> Self {
        let lines: Vec<String> = body.split('\n').map(str::to_string).collect();

        let mut sections: Vec<Section> = Vec::new();
        let mut prelude_end = lines.len();
        let mut log_heading: Option<usize> = None;
        let mut in_fence = false;
        let mut in_condition = false;
        let mut current: Option<Section> = None;

        for (idx, line) in lines.iter().enumerate() {
            if is_fence(line) {
                in_fence = !in_fence;
                continue;
            }
            if in_fence {
                continue;
            }

            if let Some(title) = section_title(line) {
                in_condition = false;
                if let Some(mut section) = current.take() {
                    section.body.end = idx;
                    sections.push(section);
                } else {
                    prelude_end = prelude_end.min(idx);
                }

                if title.eq_ignore_ascii_case(super::LOG_SECTION_TITLE) {
                    // The log block is the final region; nothing after it is
                    // section content.
                    log_heading = Some(idx);
                    break;
                }

                current = Some(Section {
                    title: title.to_string(),
                    heading_line: idx,
                    body: idx + 1..lines.len(),
                    todos: Vec::new(),
                });
                continue;
            }

            let trimmed = content(line).trim_start();

            // Condition blocks have their own grammar; their detail lines,
            // including the `- [ ] VERIFIED` marker, are not plain todos.
            if condition_heading_pattern().is_match(trimmed) {
                in_condition = true;
                continue;
            }
            if trimmed.starts_with("###") {
                in_condition = false;
            }
            if in_condition {
                continue;
            }

            if let Some(section) = current.as_mut() {
                if let Some(caps) = todo_pattern().captures(trimmed) {
                    section.todos.push(Todo {
                        text: caps[2].trim().to_string(),
                        checked: caps[1].eq_ignore_ascii_case("x"),
                        line: idx,
                    });
                }
            }
        }

        if let Some(mut section) = current.take() {
            section.body.end = log_heading.unwrap_or(lines.len());
            sections.push(section);
        }
        if sections.is_empty() && log_heading.is_none() {
            prelude_end = lines.len();
        } else if let Some(heading) = log_heading {
            prelude_end = prelude_end.min(heading);
        }

        let references = Self::parse_references(&lines[..prelude_end]);
        let conditions = Self::parse_conditions(&lines[..log_heading.unwrap_or(lines.len())]);
        let log = log_heading.map(|heading_line| LogBlock {
            heading_line,
            entries: Self::parse_log_entries(&lines[heading_line + 1..]),
        });

        Self {
            lines,
            prelude: 0..prelude_end,
            sections,
            references,
            conditions,
            log,
        }
    }

    /// Collect sign-off gates from anywhere outside the log block. Each
    /// opens with a `### CONDITION:` heading and carries a VERIFIED marker
    /// plus bolded metadata lines; underscore-wrapped placeholder values
    /// read as unset.
    fn parse_conditions(lines: &[String]) -> Vec<Condition> {
        let mut conditions = Vec::new();
        let mut in_fence = false;
        let mut current: Option<Condition> = None;

        for (idx, line) in lines.iter().enumerate() {
            if is_fence(line) {
                in_fence = !in_fence;
                continue;
            }
            if in_fence {
                continue;
            }

            let text = content(line).trim_start();

            if let Some(caps) = condition_heading_pattern().captures(text) {
                if let Some(done) = current.take() {
                    conditions.push(done);
                }
                current = Some(Condition {
                    text: caps[1].trim().to_string(),
                    verified: false,
                    signed_off_by: None,
                    requirements: None,
                    evidence: None,
                    line: idx,
                });
                continue;
            }

            // Any other heading closes the open block
            let hashes = text.len() - text.trim_start_matches('#').len();
            if hashes > 0 && text[hashes..].starts_with(' ') {
                if let Some(done) = current.take() {
                    conditions.push(done);
                }
                continue;
            }

            let Some(condition) = current.as_mut() else {
                continue;
            };

            if let Some(caps) = condition_verified_pattern().captures(text) {
                condition.verified = caps[1].eq_ignore_ascii_case("x");
            } else if let Some(caps) = condition_field_pattern().captures(text) {
                let value = metadata_value(&caps[2]);
                match caps[1].to_lowercase().as_str() {
                    "signed-off by" => condition.signed_off_by = value,
                    "requirements" => condition.requirements = value,
                    "evidence" => condition.evidence = value,
                    _ => {}
                }
            }
        }

        if let Some(done) = current.take() {
            conditions.push(done);
        }
        conditions
    }

    fn parse_references(prelude: &[String]) -> References {
        let mut references = References::default();
        for line in prelude {
            let text = content(line).trim_start();
            if references.parent.is_none() {
                if let Some(caps) = parent_pattern().captures(text) {
                    references.parent = caps[1].parse().ok();
                    continue;
                }
            }
            if let Some(caps) = task_reference_pattern().captures(text) {
                if let Ok(number) = caps[1].parse() {
                    references.referenced_tasks.push(number);
                }
            }
        }
        references
    }

    /// Parse entries from the log region. Malformed records are skipped,
    /// never fatal; their bytes stay in the line buffer untouched.
    fn parse_log_entries(lines: &[String]) -> Vec<LogEntry> {
        let mut entries = Vec::new();
        let mut idx = 0;

        while idx < lines.len() {
            let line = content(&lines[idx]);
            let Some(heading) = line.strip_prefix("### ") else {
                idx += 1;
                continue;
            };
            let timestamp = DateTime::parse_from_rfc3339(heading.trim())
                .ok()
                .map(|dt| dt.with_timezone(&Utc));

            // Locate the state line, skipping blanks under the heading.
            let mut cursor = idx + 1;
            while cursor < lines.len() && content(&lines[cursor]).trim().is_empty() {
                cursor += 1;
            }
            let state_caps = if cursor < lines.len() {
                log_state_pattern().captures(content(&lines[cursor]))
            } else {
                None
            };

            let Some(caps) = state_caps else {
                idx += 1;
                continue;
            };

            // Reason runs until the next entry heading or end of body.
            let mut message_lines: Vec<&str> = Vec::new();
            let mut next = cursor + 1;
            while next < lines.len() && !content(&lines[next]).starts_with("### ") {
                message_lines.push(content(&lines[next]));
                next += 1;
            }
            // Reason runs to the next entry heading; interior blank lines
            // are part of the message, trailing ones are not.
            let message = message_lines
                .iter()
                .position(|l| l.trim().starts_with("Reason:"))
                .map(|start| {
                    let first = message_lines[start]
                        .trim()
                        .strip_prefix("Reason:")
                        .unwrap_or("")
                        .trim();
                    let mut text = first.to_string();
                    for extra in &message_lines[start + 1..] {
                        text.push('\n');
                        text.push_str(extra);
                    }
                    text.trim_end().to_string()
                });

            entries.push(LogEntry {
                timestamp,
                from_state: caps[1].to_string(),
                to_state: caps[2].to_string(),
                actor: caps[3].to_string(),
                message,
            });
            idx = next;
        }

        entries
    }

    /// Serialize back to Markdown. Identity on unedited documents.
    pub fn to_body(&self) -> String {
        self.lines.join("\n")
    }

    /// Prelude text (joined source lines, trailing blanks trimmed).
    pub fn prelude_text(&self) -> String {
        let text: Vec<&str> = self.lines[self.prelude.clone()]
            .iter()
            .map(|l| content(l))
            .collect();
        text.join("\n").trim_end().to_string()
    }

    /// Body text of one section.
    pub fn section_text(&self, index: usize) -> String {
        let section = &self.sections[index];
        let text: Vec<&str> = self.lines[section.body.clone()]
            .iter()
            .map(|l| content(l))
            .collect();
        text.join("\n").trim().to_string()
    }

    /// Find a section by case-insensitive title match.
    pub fn find_section(&self, title: &str) -> Option<usize> {
        let key = title.trim().to_lowercase();
        self.sections.iter().position(|s| s.key() == key)
    }

    pub fn section_titles(&self) -> Vec<String> {
        self.sections.iter().map(|s| s.title.clone()).collect()
    }

    /// Every todo across every section, paired with its section title.
    pub fn all_todos(&self) -> impl Iterator<Item = (&Section, &Todo)> {
        self.sections
            .iter()
            .flat_map(|s| s.todos.iter().map(move |t| (s, t)))
    }

    /// Required-section check: every requested title present, case-insensitive.
    pub fn missing_sections(&self, required: &[String]) -> Vec<String> {
        required
            .iter()
            .filter(|title| self.find_section(title).is_none())
            .cloned()
            .collect()
    }
}
