//! Output rendering
//!
//! Human-readable rendering for each command report plus the JSON envelope
//! used by `--json`. Errors render as a short title, a reason, and an
//! optional list of valid options; the envelope mirrors that structure.

use crate::commands::{
    CheckTodoReport, CreateReport, CreateTodoReport, GetReport, InitReport, SetBodyReport,
};
use crate::commands::init::InitOutcome;
use crate::workflow::TransitionReport;
use crate::TrellisError;
use serde::Serialize;

/// `{"ok": true, "data": …}` on success.
pub fn emit_json<T: Serialize>(data: &T) {
    let envelope = serde_json::json!({ "ok": true, "data": data });
    println!("{}", serde_json::to_string_pretty(&envelope).unwrap_or_default());
}

/// `{"ok": false, "error": {kind, message, valid_options?}}` on failure.
pub fn emit_json_error(error: &TrellisError) {
    let mut body = serde_json::json!({
        "kind": error.kind(),
        "message": error.to_string(),
    });
    if let Some(options) = error.valid_options() {
        body["valid_options"] = serde_json::json!(options);
    }
    let envelope = serde_json::json!({ "ok": false, "error": body });
    println!("{}", serde_json::to_string_pretty(&envelope).unwrap_or_default());
}

pub fn print_error(error: &TrellisError) {
    eprintln!("Error: {error}");
    if let Some(options) = error.valid_options() {
        eprintln!();
        for option in options {
            eprintln!("  - {option}");
        }
    }
}

pub fn print_create(report: &CreateReport) {
    println!(
        "Created {} #{}: {}",
        report.kind, report.number, report.title
    );
    if let Some(parent) = report.parent {
        match report.fallback {
            Some(note) => println!("  Parent:    #{parent} (via {note})"),
            None => println!("  Parent:    #{parent}"),
        }
    }
    println!("  Labels:    {}", report.labels.join(", "));
    if !report.assignees.is_empty() {
        println!("  Assignees: {}", report.assignees.join(", "));
    }
    if let Some(milestone) = &report.milestone {
        println!("  Milestone: {milestone}");
    }
    println!("  {}", report.url);
}

pub fn print_get(report: &GetReport) {
    println!("#{} [{}] {}", report.number, report.kind, report.title);
    println!("State:  {}", report.state);
    if !report.labels.is_empty() {
        println!("Labels: {}", report.labels.join(", "));
    }
    if !report.assignees.is_empty() {
        println!("Assignees: {}", report.assignees.join(", "));
    }
    if let Some(milestone) = &report.milestone {
        println!("Milestone: {milestone}");
    }
    if let Some(parent) = &report.parent {
        println!("Parent: #{}", parent.number);
    }

    if !report.prelude.is_empty() {
        println!();
        println!("{}", report.prelude);
    }

    for section in &report.sections {
        println!();
        if section.total_todos > 0 {
            println!(
                "## {} [{}/{}]",
                section.title, section.completed_todos, section.total_todos
            );
        } else {
            println!("## {}", section.title);
        }
        for todo in &section.todos {
            println!("  [{}] {}", if todo.checked { "x" } else { " " }, todo.text);
        }
    }

    if !report.conditions.is_empty() {
        println!();
        println!("Conditions:");
        for condition in &report.conditions {
            println!(
                "  [{}] {}",
                if condition.verified { "x" } else { " " },
                condition.text
            );
            if let Some(signed_off_by) = &condition.signed_off_by {
                println!("      signed off by @{signed_off_by}");
            }
        }
    }

    if let Some(summary) = &report.children_summary {
        println!();
        println!(
            "Children: {} total, {} open, {} closed",
            summary.total, summary.open, summary.closed
        );
        for child in &report.children {
            println!("  #{} [{}] {}", child.number, child.state, child.title);
        }
    }

    if !report.available_milestones.is_empty() {
        println!();
        println!("Available milestones: {}", report.available_milestones.join(", "));
    }

    if !report.log.is_empty() {
        println!();
        println!("Log:");
        for entry in &report.log {
            let timestamp = entry.timestamp.as_deref().unwrap_or("-");
            print!(
                "  {} {} -> {} by @{}",
                timestamp, entry.from_state, entry.to_state, entry.actor
            );
            match &entry.message {
                Some(message) => println!(": {message}"),
                None => println!(),
            }
        }
    }

    println!();
    println!("{}", report.url);
}

pub fn print_set_body(report: &SetBodyReport) {
    println!(
        "Updated body of #{} ({} characters)",
        report.number, report.body_length
    );
    println!("  {}", report.url);
}

pub fn print_create_todo(report: &CreateTodoReport) {
    if report.section_created {
        println!("Created section \"{}\"", report.section);
    }
    println!(
        "Added todo to \"{}\" in #{}: {}",
        report.section, report.number, report.todo
    );
    println!("  {} todo(s) in section", report.todos_in_section);
    println!("  {}", report.url);
}

pub fn print_check_todo(report: &CheckTodoReport) {
    println!(
        "{} \"{}\" in \"{}\" of #{}",
        if report.checked { "Checked" } else { "Unchecked" },
        report.todo,
        report.section,
        report.number
    );
    println!("  {}", report.url);
}

pub fn print_transition(report: &TransitionReport) {
    println!(
        "#{} {}: {} -> {}",
        report.number,
        report.transition,
        report.from.name(),
        report.to.name()
    );
    if let Some(message) = &report.message {
        println!("  Reason: {message}");
    }
    if let Some(warning) = &report.warning {
        println!("  Warning: {warning}");
    }
    println!("  Log entries: {}", report.log_entries);
    println!("  {}", report.url);
}

pub fn print_init(report: &InitReport) {
    for item in &report.items {
        let tag = match item.outcome {
            InitOutcome::Created => "created",
            InitOutcome::Existing => "existing",
            InitOutcome::Fallback => "fallback",
            InitOutcome::Failed => "FAILED",
        };
        match &item.detail {
            Some(detail) => println!("  [{tag}] {}: {detail}", item.name),
            None => println!("  [{tag}] {}", item.name),
        }
    }
    for note in &report.fallbacks {
        println!("  note: {note}");
    }
    let failed = report.failed();
    if failed > 0 {
        println!("{failed} item(s) failed");
    } else {
        println!("Initialization complete");
    }
}
