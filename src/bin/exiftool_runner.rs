use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use exiftool_runner::app::App;
use exiftool_runner::args::{ListItem, MetadataInput};
use exiftool_runner::config::ConfigLoader;
use exiftool_runner::error::ExifError;
use exiftool_runner::hooks::Hooks;
use exiftool_runner::output::JsonOutput;

#[derive(Parser)]
#[command(name = "exiftool-runner")]
#[command(about = "Install and drive ExifTool to read and write file metadata")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Install exiftool into the working directory if missing")]
    Install,
    #[command(about = "Write metadata fields to a file")]
    Set(SetArgs),
    #[command(about = "Read all metadata of a file as JSON")]
    Get(GetArgs),
    #[command(about = "Manage the cached tag directory")]
    Tags(TagsArgs),
}

#[derive(Args)]
struct SetArgs {
    file: PathBuf,

    /// Field assignment in the form NAME=VALUE; repeatable.
    #[arg(long = "tag", value_name = "NAME=VALUE")]
    tags: Vec<String>,

    /// Extra exiftool argument passed through verbatim; repeatable.
    #[arg(long = "raw", value_name = "TOKEN", allow_hyphen_values = true)]
    raw: Vec<String>,

    #[arg(long)]
    overwrite: bool,

    #[arg(long)]
    verify: bool,
}

#[derive(Args)]
struct GetArgs {
    file: PathBuf,
}

#[derive(Args)]
struct TagsArgs {
    #[command(subcommand)]
    command: TagsCommand,
}

#[derive(Subcommand)]
enum TagsCommand {
    #[command(about = "Rebuild tagData.json from exiftool.org")]
    Refresh,
}

#[derive(Serialize)]
struct TagsRefreshResult {
    records: usize,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<ExifError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &ExifError) -> u8 {
    match error {
        ExifError::FileNotFound(_) | ExifError::ConfigRead(_) | ExifError::ConfigParse(_) => 2,
        ExifError::ToolNotInstalled
        | ExifError::InstallationFailed(_)
        | ExifError::UnsupportedPlatform(_)
        | ExifError::Http(_)
        | ExifError::HttpStatus { .. } => 3,
        ExifError::NothingToDo => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let app = App::from_config(&config, Hooks::new())?;
    // A failed install is reported by `install`; other commands run degraded
    // and fail with ToolNotInstalled if they need the tool.
    let installed = app.wait_for_install();

    match cli.command {
        Commands::Install => JsonOutput::print(&installed?).into_diagnostic(),
        Commands::Set(args) => {
            let input = parse_set_input(&args.tags, &args.raw)?;
            let outcome = app.set_metadata(&args.file, args.overwrite, args.verify, input)?;
            JsonOutput::print(&outcome).into_diagnostic()
        }
        Commands::Get(args) => {
            let payload = app.get_metadata(&args.file)?;
            JsonOutput::print(&payload).into_diagnostic()
        }
        Commands::Tags(TagsArgs {
            command: TagsCommand::Refresh,
        }) => {
            let catalog = app.refresh_tags()?;
            JsonOutput::print(&TagsRefreshResult {
                records: catalog.len(),
            })
            .into_diagnostic()
        }
    }
}

fn parse_set_input(tags: &[String], raw: &[String]) -> miette::Result<MetadataInput> {
    let mut pairs = Vec::with_capacity(tags.len());
    for tag in tags {
        let (name, value) = tag
            .split_once('=')
            .ok_or_else(|| miette::miette!("expected NAME=VALUE, got `{tag}`"))?;
        pairs.push((name.trim().to_string(), value.to_string()));
    }
    if raw.is_empty() {
        return Ok(MetadataInput::Map(pairs));
    }
    let mut items: Vec<ListItem> = raw.iter().cloned().map(ListItem::Literal).collect();
    items.push(ListItem::Map(pairs));
    Ok(MetadataInput::List(items))
}
