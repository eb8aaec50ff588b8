use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use easel_contracts::chat::{parse_chat_input, ChatInput, CHAT_HELP_COMMANDS};
use easel_contracts::config::StudioConfig;
use easel_contracts::conversation::store::ConversationStore;
use easel_contracts::conversation::Conversation;
use easel_contracts::events::EventLog;
use easel_contracts::runs::receipts::{write_receipt, ArtifactRecord, RunReceipt};
use easel_engine::{Pipeline, PipelineOutcome};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "easel", version, about = "Prompt-to-image studio with one self-correction pass")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive session; plain lines generate, slash lines are commands.
    Chat(StudioArgs),
    /// One pipeline run.
    Run(RunArgs),
    /// Delete the persisted conversation.
    ClearMemory(ConfigArgs),
}

#[derive(Debug, Args)]
struct ConfigArgs {
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[derive(Debug, Args)]
struct StudioArgs {
    #[command(flatten)]
    config: ConfigArgs,
    #[arg(long, default_value = "runs")]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    /// Skip the visual critique regardless of the config file.
    #[arg(long)]
    no_feedback: bool,
    /// Use the offline adapters for every collaborator.
    #[arg(long)]
    dryrun: bool,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long)]
    prompt: String,
    #[command(flatten)]
    studio: StudioArgs,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("easel error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Chat(args) => {
            run_chat(args)?;
            Ok(0)
        }
        Command::Run(args) => run_once(args),
        Command::ClearMemory(args) => {
            let config = StudioConfig::load(&args.config)?;
            init_logging(&config.logging.level);
            ConversationStore::from_config(&config.memory).clear()?;
            println!("Memory cleared ({}).", config.memory.file_path.display());
            Ok(0)
        }
    }
}

fn init_logging(level: &str) {
    let fallback = match level.trim().to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

struct Studio {
    config: StudioConfig,
    pipeline: Pipeline,
    out_dir: PathBuf,
}

impl Studio {
    fn open(args: &StudioArgs) -> Result<Self> {
        let mut config = StudioConfig::load(&args.config.config)?;
        if args.dryrun {
            config = config.with_dryrun_models();
        }
        if args.no_feedback {
            config.visual_feedback.enabled = false;
        }
        init_logging(&config.logging.level);

        let events_path = args
            .events
            .clone()
            .unwrap_or_else(|| args.out.join("events.jsonl"));
        let session_id = format!("session-{}", Utc::now().format("%Y%m%dT%H%M%S"));
        let pipeline =
            Pipeline::from_config(&config).with_events(EventLog::new(events_path, session_id));
        info!(
            brain = %config.models.brain,
            painter = %config.models.painter,
            critic = %config.visual_feedback.vlm_model,
            feedback = config.visual_feedback.enabled,
            history_turns = pipeline.conversation().len(),
            "studio ready"
        );
        Ok(Self {
            config,
            pipeline,
            out_dir: args.out.clone(),
        })
    }

    fn models(&self) -> Map<String, Value> {
        let value = json!({
            "brain": self.config.models.brain,
            "painter": self.config.models.painter,
            "critic": self.config.visual_feedback.vlm_model,
        });
        value.as_object().cloned().unwrap_or_default()
    }
}

fn run_once(args: RunArgs) -> Result<i32> {
    let mut studio = Studio::open(&args.studio)?;
    match studio.pipeline.run(&args.prompt) {
        Ok(outcome) => {
            let path = deliver(&studio.out_dir, &args.prompt, &outcome, studio.models())?;
            print_outcome(&outcome, &path);
            Ok(0)
        }
        Err(err) => {
            eprintln!("easel error: {err}");
            Ok(1)
        }
    }
}

fn run_chat(args: StudioArgs) -> Result<()> {
    let mut studio = Studio::open(&args)?;
    let stdin = io::stdin();
    let mut line = String::new();

    println!("Easel chat started. Type /help for commands.");
    if !studio.pipeline.conversation().is_empty() {
        println!(
            "Loaded {} turns of history.",
            studio.pipeline.conversation().len()
        );
    }

    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        match parse_chat_input(&line) {
            ChatInput::Noop => continue,
            ChatInput::Help => {
                println!("Commands: {}", CHAT_HELP_COMMANDS.join(" "));
            }
            ChatInput::ClearMemory => match studio.pipeline.clear_memory() {
                Ok(()) => println!("Memory cleared."),
                Err(err) => println!("Clear failed: {err:#}"),
            },
            ChatInput::Feedback(value) => {
                let enabled = value.unwrap_or(!studio.pipeline.feedback_enabled());
                studio.pipeline.set_feedback_enabled(enabled);
                println!("Visual feedback {}", if enabled { "on" } else { "off" });
            }
            ChatInput::History => print_history(studio.pipeline.conversation()),
            ChatInput::Exit => break,
            ChatInput::Invalid { command, message } => {
                println!("/{command}: {message}");
            }
            ChatInput::Unknown { command, .. } => {
                println!("Unknown command /{command}. Type /help for commands.");
            }
            ChatInput::Generate(text) => match studio.pipeline.run(&text) {
                Ok(outcome) => {
                    let models = studio.models();
                    match deliver(&studio.out_dir, &text, &outcome, models) {
                        Ok(path) => print_outcome(&outcome, &path),
                        Err(err) => {
                            warn!(error = %format!("{err:#}"), "artifact write failed");
                            println!("Generated, but saving failed: {err:#}");
                        }
                    }
                }
                Err(err) => println!("Generation failed: {err}"),
            },
        }
    }
    Ok(())
}

/// Writes the artifact and its receipt; returns the artifact path.
fn deliver(
    out_dir: &Path,
    user_input: &str,
    outcome: &PipelineOutcome,
    models: Map<String, Value>,
) -> Result<PathBuf> {
    let stamp = Utc::now().timestamp_millis();
    let digest = outcome.artifact.digest();
    let short = digest.get(..8).unwrap_or(&digest);
    let artifact_path = out_dir.join(format!(
        "artifact-{stamp}-{short}.{}",
        outcome.artifact.extension()
    ));
    outcome.artifact.write_to(&artifact_path)?;

    let (width, height) = match outcome.artifact.dimensions() {
        Some((width, height)) => (Some(width), Some(height)),
        None => (None, None),
    };
    let receipt = RunReceipt {
        run_id: outcome.run_id.clone(),
        user_input: user_input.trim().to_string(),
        prompt: outcome.prompt.clone(),
        critique: outcome.critique.clone(),
        repair: outcome.repair.as_str().to_string(),
        warnings: outcome.warnings.iter().map(ToString::to_string).collect(),
        artifact: ArtifactRecord {
            path: artifact_path.to_string_lossy().to_string(),
            mime_type: outcome.artifact.mime_type().to_string(),
            sha256: digest.clone(),
            width,
            height,
        },
        models,
    };
    let receipt_path = out_dir.join(format!("receipt-{stamp}.json"));
    write_receipt(&receipt_path, &receipt)
        .with_context(|| format!("failed to write {}", receipt_path.display()))?;
    Ok(artifact_path)
}

fn print_outcome(outcome: &PipelineOutcome, artifact_path: &Path) {
    println!("Prompt: {}", outcome.prompt.positive);
    println!("Negative: {}", outcome.prompt.negative);
    if let Some(critique) = outcome.critique.as_ref() {
        let verdict = if critique.passed { "passed" } else { "failed" };
        println!("Critique {verdict}: {}", critique.reason);
    }
    match outcome.repair {
        easel_engine::RepairStatus::Applied => println!("Repair applied."),
        easel_engine::RepairStatus::Failed => println!("Repair failed; kept the first attempt."),
        easel_engine::RepairStatus::NotNeeded => {}
    }
    for warning in &outcome.warnings {
        println!("warning: {warning}");
    }
    println!("Saved {}", artifact_path.display());
}

fn print_history(conversation: &Conversation) {
    if conversation.is_empty() {
        println!("History is empty.");
        return;
    }
    for turn in conversation.turns() {
        println!("[{}] {}", turn.role().as_str(), turn.text());
    }
}
