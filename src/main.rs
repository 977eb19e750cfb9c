//! trellis CLI entry point
//!
//! Parses the command line, loads configuration, builds the hybrid client,
//! and dispatches to the command layer. Single-threaded: every command is a
//! bounded sequence of remote calls with no background work.

use clap::Parser;
use std::process;
use trellis::cli::{Cli, Commands, CreateOptions, FormatArg, WorkflowArgs};
use trellis::commands::support::{resolve_repo, resolve_text_input};
use trellis::commands::{
    create::CreateArgs, CheckTodoCommand, CreateCommand, CreateTodoCommand, GetCommand,
    InitCommand, SetBodyCommand, WorkflowCommand, WorkflowVerb,
};
use trellis::config::Config;
use trellis::model::IssueKind;
use trellis::remote::{token_from_env, HybridClient};
use trellis::{output, Result, TrellisError};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(e) = trellis::logging::init() {
        eprintln!("Failed to initialize logging: {e}");
    }

    let cli = Cli::parse();
    let json = cli.json;

    if let Err(e) = run(cli).await {
        if json {
            output::emit_json_error(&e);
        } else {
            output::print_error(&e);
        }
        process::exit(e.exit_code());
    }
}

/// The explicit --repo argument of a command, when it has one.
fn repo_arg(command: &Commands) -> Option<&str> {
    match command {
        Commands::Init => None,
        Commands::Get { repo, .. }
        | Commands::SetBody { repo, .. }
        | Commands::CreateTodo { repo, .. }
        | Commands::CheckTodo { repo, .. } => repo.as_deref(),
        Commands::CreateEpic { options } => options.repo.as_deref(),
        Commands::CreateTask { options, .. } => options.repo.as_deref(),
        Commands::CreateSubTask { options, .. } => options.repo.as_deref(),
        Commands::StartPlan(args)
        | Commands::SubmitPlan(args)
        | Commands::ApprovePlan(args)
        | Commands::StartWork(args)
        | Commands::SubmitWork(args)
        | Commands::ApproveWork(args) => args.repo.as_deref(),
    }
}

/// Load trellis.yaml; an explicit --repo keeps commands usable without one.
fn load_config(command: &Commands) -> Result<Config> {
    match Config::load_default() {
        Ok(config) => Ok(config),
        Err(TrellisError::ConfigMissing(path)) => match repo_arg(command) {
            Some(repo) => Config::new(&format!("https://github.com/{repo}"), None),
            None => Err(TrellisError::ConfigMissing(path)),
        },
        Err(e) => Err(e),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let json = cli.json;
    let config = load_config(&cli.command)?;
    let client = HybridClient::new(&token_from_env()?)?;

    match cli.command {
        Commands::Init => {
            let report = InitCommand::new(&client, &config).execute().await?;
            if json {
                output::emit_json(&report);
            } else {
                output::print_init(&report);
            }
        }

        Commands::Get {
            kind,
            id,
            repo,
            format,
        } => {
            let repo = resolve_repo(repo.as_deref(), &config)?;
            let report = GetCommand::new(&client)
                .execute(&repo, id, kind.to_kind())
                .await?;
            if json || format == FormatArg::Json {
                output::emit_json(&report);
            } else {
                output::print_get(&report);
            }
        }

        Commands::CreateEpic { options } => {
            create(&client, &config, IssueKind::Epic, None, options, json).await?;
        }
        Commands::CreateTask {
            parent_epic,
            options,
        } => {
            create(
                &client,
                &config,
                IssueKind::Task,
                Some(parent_epic),
                options,
                json,
            )
            .await?;
        }
        Commands::CreateSubTask {
            parent_task,
            options,
        } => {
            create(
                &client,
                &config,
                IssueKind::SubTask,
                Some(parent_task),
                options,
                json,
            )
            .await?;
        }

        Commands::SetBody { repo, number, body } => {
            let repo = resolve_repo(repo.as_deref(), &config)?;
            let body = resolve_text_input(body.body, body.body_file.as_deref())?
                .ok_or(TrellisError::MissingInput("--body, --body-file, or stdin"))?;
            let report = SetBodyCommand::new(&client)
                .execute(&repo, number, &body)
                .await?;
            if json {
                output::emit_json(&report);
            } else {
                output::print_set_body(&report);
            }
        }

        Commands::CreateTodo {
            repo,
            number,
            section,
            text,
            text_file,
            create_section,
        } => {
            let repo = resolve_repo(repo.as_deref(), &config)?;
            let text = resolve_text_input(text, text_file.as_deref())?
                .ok_or(TrellisError::MissingInput("--text, --text-file, or stdin"))?;
            let report = CreateTodoCommand::new(&client)
                .execute(&repo, number, &section, &text, create_section)
                .await?;
            if json {
                output::emit_json(&report);
            } else {
                output::print_create_todo(&report);
            }
        }

        Commands::CheckTodo {
            repo,
            number,
            section,
            pattern,
        } => {
            let repo = resolve_repo(repo.as_deref(), &config)?;
            let report = CheckTodoCommand::new(&client)
                .execute(&repo, number, &section, &pattern)
                .await?;
            if json {
                output::emit_json(&report);
            } else {
                output::print_check_todo(&report);
            }
        }

        Commands::StartPlan(args) => {
            transition(&client, &config, WorkflowVerb::StartPlan, args, json).await?;
        }
        Commands::SubmitPlan(args) => {
            transition(&client, &config, WorkflowVerb::SubmitPlan, args, json).await?;
        }
        Commands::ApprovePlan(args) => {
            transition(&client, &config, WorkflowVerb::ApprovePlan, args, json).await?;
        }
        Commands::StartWork(args) => {
            transition(&client, &config, WorkflowVerb::StartWork, args, json).await?;
        }
        Commands::SubmitWork(args) => {
            transition(&client, &config, WorkflowVerb::SubmitWork, args, json).await?;
        }
        Commands::ApproveWork(args) => {
            transition(&client, &config, WorkflowVerb::ApproveWork, args, json).await?;
        }
    }

    Ok(())
}

async fn create(
    client: &HybridClient,
    config: &Config,
    kind: IssueKind,
    parent: Option<u64>,
    options: CreateOptions,
    json: bool,
) -> Result<()> {
    let repo = resolve_repo(options.repo.as_deref(), config)?;
    let body = resolve_text_input(options.body.body, options.body.body_file.as_deref())?;

    let report = CreateCommand::new(client, config, kind)
        .execute(
            &repo,
            CreateArgs {
                title: options.title,
                body,
                labels: options.labels,
                assignees: options.assignees,
                milestone: options.milestone,
                parent,
            },
        )
        .await?;

    if json {
        output::emit_json(&report);
    } else {
        output::print_create(&report);
    }
    Ok(())
}

async fn transition(
    client: &HybridClient,
    config: &Config,
    verb: WorkflowVerb,
    args: WorkflowArgs,
    json: bool,
) -> Result<()> {
    let repo = resolve_repo(args.repo.as_deref(), config)?;
    let message = resolve_text_input(args.message.message, args.message.message_file.as_deref())?;

    let report = WorkflowCommand::new(client, config)
        .execute(&repo, args.number, verb, message)
        .await?;

    if json {
        output::emit_json(&report);
    } else {
        output::print_transition(&report);
    }
    Ok(())
}
