use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use wsprobe::{
    Config, Deadline, Harness, Scenario, Schedule, SessionEvent, Target, Transcript, WsConnector,
};

#[derive(Parser)]
#[command(name = "wsprobe")]
#[command(about = "Run scripted probe sessions against a WebSocket notification endpoint")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one probe session
    Run(RunArgs),

    /// List canned scenarios
    Scenarios,
}

#[derive(clap::Args)]
struct RunArgs {
    /// Endpoint URL; `{subject}` is replaced by the subject id
    #[arg(long, env = "WSPROBE_URL")]
    url: String,

    /// Subject (user) id to probe as
    #[arg(long, env = "WSPROBE_SUBJECT")]
    subject: String,

    /// Canned scenario to run
    #[arg(long, default_value = "connectivity", conflicts_with = "schedule")]
    scenario: Scenario,

    /// JSON schedule file: [{"delay_ms": 0, "payload": {"type": "..."}}]
    #[arg(long)]
    schedule: Option<PathBuf>,

    /// Session deadline in milliseconds (defaults to the scenario's)
    #[arg(long)]
    deadline_ms: Option<u64>,

    /// Extra handshake header, e.g. "Authorization: Bearer <token>"
    #[arg(long = "header", value_name = "NAME: VALUE")]
    headers: Vec<String>,

    /// Print each event as a JSON line on stdout
    #[arg(long)]
    json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose { "wsprobe=debug" } else { "wsprobe=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Scenarios => {
            for scenario in Scenario::ALL {
                println!("{:<14} {}", scenario.name(), scenario.description());
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run(args: RunArgs) -> Result<ExitCode> {
    let schedule = match &args.schedule {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading schedule {}", path.display()))?;
            Schedule::from_json(&json)
                .with_context(|| format!("invalid schedule {}", path.display()))?
        }
        None => args.scenario.schedule(&args.subject)?,
    };

    let deadline = match args.deadline_ms {
        Some(ms) => Deadline::from_millis(ms)?,
        None if args.schedule.is_some() => Deadline::default(),
        None => args.scenario.deadline(),
    };

    let mut config = Config::new();
    for header in &args.headers {
        let (name, value) = parse_header(header)?;
        config = config.with_header(name, value);
    }

    let target = Target::new(args.url, args.subject);
    info!(
        url = %target.url(),
        probes = schedule.len(),
        deadline_ms = deadline.duration().as_millis() as u64,
        "starting probe session"
    );

    let harness = Harness::new(WsConnector::new(config));
    let mut events = harness.run(target, schedule, deadline);
    let mut transcript = Transcript::new();
    while let Some(event) = events.next_event().await {
        if args.json {
            println!("{}", serde_json::to_string(&event)?);
        }
        transcript.record(event);
    }

    info!(
        sent = transcript.sent().len(),
        received = transcript.received().len(),
        parse_errors = transcript.parse_errors().len(),
        "session summary"
    );

    if transcript
        .all()
        .iter()
        .any(|e| matches!(e.event, SessionEvent::Error { .. }))
    {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn parse_header(raw: &str) -> Result<(&str, &str)> {
    let Some((name, value)) = raw.split_once(':') else {
        bail!("header {raw:?} must look like \"Name: value\"");
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("header {raw:?} has an empty name");
    }
    Ok((name, value.trim()))
}
