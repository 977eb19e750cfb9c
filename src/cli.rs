//! CLI command definitions
//!
//! All clap structs and subcommand enums are defined here. Free-text
//! options come in a mutually-exclusive trio: inline value, file path, or
//! stdin via a file path of `-`.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// trellis - typed issue hierarchy and workflow enforcement for GitHub
#[derive(Parser, Debug)]
#[command(name = "trellis")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Emit all output, including errors, as a JSON envelope
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Epic,
    Task,
    SubTask,
    Issue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Rich,
    Json,
}

/// Issue body input: inline, from a file, or stdin (`--body-file -`)
#[derive(Debug, Args, Clone, Default)]
pub struct BodyInput {
    /// Body text
    #[arg(long)]
    pub body: Option<String>,

    /// Read body from a file; use '-' for stdin
    #[arg(long, conflicts_with = "body")]
    pub body_file: Option<PathBuf>,
}

/// Workflow message input: inline, from a file, or stdin
#[derive(Debug, Args, Clone, Default)]
pub struct MessageInput {
    /// Reason recorded in the audit log
    #[arg(long)]
    pub message: Option<String>,

    /// Read message from a file; use '-' for stdin
    #[arg(long, conflicts_with = "message")]
    pub message_file: Option<PathBuf>,
}

/// Options shared by the three creation commands
#[derive(Debug, Args, Clone, Default)]
pub struct CreateOptions {
    /// Target repository (owner/repo); defaults to the configured project
    #[arg(long)]
    pub repo: Option<String>,

    /// Issue title
    #[arg(long)]
    pub title: String,

    #[command(flatten)]
    pub body: BodyInput,

    /// Additional labels, comma-separated
    #[arg(long, value_delimiter = ',')]
    pub labels: Vec<String>,

    /// Assignee logins, comma-separated
    #[arg(long, value_delimiter = ',')]
    pub assignees: Vec<String>,

    /// Milestone title to assign
    #[arg(long)]
    pub milestone: Option<String>,
}

/// Arguments shared by the six workflow verbs
#[derive(Debug, Args, Clone)]
pub struct WorkflowArgs {
    /// Target repository (owner/repo); defaults to the configured project
    #[arg(long)]
    pub repo: Option<String>,

    /// Issue number
    pub number: u64,

    #[command(flatten)]
    pub message: MessageInput,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Set up issue types, status labels, and the board Status field
    Init,

    /// Fetch an issue with its parsed body and hierarchy
    Get {
        /// Expected issue kind
        kind: KindArg,

        /// Issue number
        #[arg(long)]
        id: u64,

        /// Target repository (owner/repo); defaults to the configured project
        #[arg(long)]
        repo: Option<String>,

        /// Output format
        #[arg(long, value_enum, default_value_t = FormatArg::Rich)]
        format: FormatArg,
    },

    /// Create an Epic issue
    CreateEpic {
        #[command(flatten)]
        options: CreateOptions,
    },

    /// Create a Task issue under a parent Epic
    CreateTask {
        /// Issue number of the parent epic
        #[arg(long)]
        parent_epic: u64,

        #[command(flatten)]
        options: CreateOptions,
    },

    /// Create a Sub-task issue under a parent Task
    CreateSubTask {
        /// Issue number of the parent task
        #[arg(long)]
        parent_task: u64,

        #[command(flatten)]
        options: CreateOptions,
    },

    /// Replace an issue body
    SetBody {
        /// Target repository (owner/repo); defaults to the configured project
        #[arg(long)]
        repo: Option<String>,

        /// Issue number
        number: u64,

        #[command(flatten)]
        body: BodyInput,
    },

    /// Add a todo to a section
    CreateTodo {
        /// Target repository (owner/repo); defaults to the configured project
        #[arg(long)]
        repo: Option<String>,

        /// Issue number
        number: u64,

        /// Section title (case-insensitive)
        section: String,

        /// Todo text
        #[arg(long)]
        text: Option<String>,

        /// Read todo text from a file; use '-' for stdin
        #[arg(long, conflicts_with = "text")]
        text_file: Option<PathBuf>,

        /// Create the section when it does not exist
        #[arg(long)]
        create_section: bool,
    },

    /// Toggle a todo matched by substring
    CheckTodo {
        /// Target repository (owner/repo); defaults to the configured project
        #[arg(long)]
        repo: Option<String>,

        /// Issue number
        number: u64,

        /// Section title (case-insensitive)
        section: String,

        /// Substring identifying exactly one todo
        #[arg(long = "match")]
        pattern: String,
    },

    /// Move an issue from backlog into planning
    StartPlan(WorkflowArgs),

    /// Submit the plan for approval (requires the kind's sections)
    SubmitPlan(WorkflowArgs),

    /// Approve a submitted plan
    ApprovePlan(WorkflowArgs),

    /// Start work on an approved plan
    StartWork(WorkflowArgs),

    /// Submit finished work for completion approval
    SubmitWork(WorkflowArgs),

    /// Approve completed work and close the issue
    ApproveWork(WorkflowArgs),
}

impl KindArg {
    pub fn to_kind(self) -> crate::model::IssueKind {
        match self {
            Self::Epic => crate::model::IssueKind::Epic,
            Self::Task => crate::model::IssueKind::Task,
            Self::SubTask => crate::model::IssueKind::SubTask,
            Self::Issue => crate::model::IssueKind::Issue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_create_task() {
        let cli = Cli::try_parse_from([
            "trellis",
            "create-task",
            "--parent-epic",
            "10",
            "--title",
            "Endpoint",
            "--labels",
            "a,b",
        ])
        .unwrap();
        match cli.command {
            Commands::CreateTask {
                parent_epic,
                options,
            } => {
                assert_eq!(parent_epic, 10);
                assert_eq!(options.title, "Endpoint");
                assert_eq!(options.labels, vec!["a", "b"]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_body_and_body_file_conflict() {
        let result = Cli::try_parse_from([
            "trellis",
            "create-epic",
            "--title",
            "t",
            "--body",
            "x",
            "--body-file",
            "f.md",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_workflow_verb_takes_positional_number_and_message() {
        let cli = Cli::try_parse_from([
            "trellis",
            "submit-plan",
            "7",
            "--message",
            "ready",
        ])
        .unwrap();
        match cli.command {
            Commands::SubmitPlan(args) => {
                assert_eq!(args.number, 7);
                assert_eq!(args.message.message.as_deref(), Some("ready"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_get_kind_accepts_sub_task() {
        let cli =
            Cli::try_parse_from(["trellis", "get", "sub-task", "--id", "3"]).unwrap();
        match cli.command {
            Commands::Get { kind, id, .. } => {
                assert_eq!(kind, KindArg::SubTask);
                assert_eq!(id, 3);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_global_json_flag() {
        let cli = Cli::try_parse_from(["trellis", "--json", "init"]).unwrap();
        assert!(cli.json);
        let cli = Cli::try_parse_from(["trellis", "init"]).unwrap();
        assert!(!cli.json);
    }
}
