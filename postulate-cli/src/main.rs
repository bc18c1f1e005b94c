//! postulate: command-line front-end for the Postulate backends
//!
//! Drives the sales-training role-play (sessions, checkpoints, replay,
//! alternate paths) and the research copilot (pitfall and significance
//! agents, citation search, library uploads) from a terminal.
//!
//! # Subcommands
//! - `profiles`, `start`, `say`, `checkpoints`, `replay`, `use-path`,
//!   `flow`, `scores` (training API)
//! - `sessions`, `new-session`, `pitfalls`, `significance`, `cite`,
//!   `upload`, `files`, `build-graph` (research API)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

use postulate_core::models::{
    ChatMessage, Checkpoint, ClientAgentInternalScore, NewSession, Role, SessionGuid,
};
use postulate_core::store::Action;
use postulate_core::{layout_flow, BackendApi, Controller, HttpBackend, PostulateConfig};

const DEFAULT_CONFIG: &str = "postulate.toml";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "postulate",
    version,
    about = "Postulate sales-training and research-copilot client"
)]
struct Cli {
    /// Config file (TOML). Missing file means built-in defaults.
    #[arg(long, env = "POSTULATE_CONFIG", default_value = DEFAULT_CONFIG)]
    config: String,

    /// Training API base URL (overrides the config file)
    #[arg(long, env = "POSTULATE_TRAINING_URL")]
    training_url: Option<String>,

    /// Research API base URL (overrides the config file)
    #[arg(long, env = "POSTULATE_RESEARCH_URL")]
    research_url: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List client profiles available for role-play
    Profiles,

    /// Start a role-play against a client profile
    Start {
        /// Client profile id
        profile_id: String,
    },

    /// Send a salesman turn in an existing session
    Say {
        session: String,
        message: String,
    },

    /// List the coaching checkpoints of a session
    Checkpoints {
        session: String,
    },

    /// Rewind to a checkpoint and send a new message in its place
    Replay {
        session: String,
        /// Checkpoint guid
        checkpoint: String,

        /// Text to send instead of the checkpoint's message
        #[arg(short, long)]
        message: Option<String>,

        /// Index of the checkpoint's alternative path to replay with
        #[arg(short, long)]
        path: Option<usize>,
    },

    /// Continue a session with one of a checkpoint's suggested paths
    UsePath {
        session: String,
        checkpoint: String,
        /// Index of the alternative path
        path: usize,
    },

    /// Lay out the conversation-flow graph of a session
    Flow {
        session: String,
    },

    /// Show the client agent's internal scoring per turn
    Scores {
        session: String,
    },

    /// List sessions (research sessions of a user, or all training sessions)
    Sessions {
        /// Research user guid
        #[arg(long, env = "POSTULATE_USER")]
        user: Option<Uuid>,
    },

    /// Create a research session
    NewSession {
        title: String,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(long, env = "POSTULATE_USER")]
        user: Option<Uuid>,
    },

    /// Run the pitfall agent on a draft, or list past analyses
    Pitfalls {
        session: String,

        /// Draft file to analyze
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Run the significance agent on a draft, or list past analyses
    Significance {
        session: String,

        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Search the knowledge graph for citations
    Cite {
        session: String,
        query: String,
    },

    /// Upload documents to the library
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// List library documents
    Files,

    /// Build the knowledge graph from library documents
    BuildGraph {
        #[arg(required = true)]
        file_guids: Vec<Uuid>,
    },
}

// ============================================================================
// Output helpers
// ============================================================================

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn speaker(role: Role) -> &'static str {
    match role {
        Role::Salesman => "you",
        Role::ClientAgent => "client",
    }
}

fn format_message(msg: &ChatMessage) -> String {
    format!("[{}] {}: {}", msg.time, speaker(msg.role), msg.content)
}

fn format_checkpoint(index: usize, cp: &Checkpoint) -> String {
    let mut line = format!("{:>2}. {}  ({})", index + 1, cp.title(index), cp.guid);
    let paths = cp.alternative_paths().len();
    if paths > 0 {
        line.push_str(&format!(", {} alternative path(s)", paths));
    }
    line
}

fn format_score(score: &ClientAgentInternalScore) -> String {
    let eval = &score.scores;
    format!(
        "turn {:>2}  avg {:.1}  (objections {:.0}, rapport {:.0}, clarity {:.0}, persuasion {:.0})  {}",
        score.msg_index,
        eval.average(),
        eval.objection_handling.score,
        eval.rapport_building.score,
        eval.clarity_and_conciseness.score,
        eval.persuasiveness.score,
        score.outcome,
    )
}

fn read_draft(file: &Option<PathBuf>) -> anyhow::Result<Option<String>> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .map(Some)
            .with_context(|| format!("cannot read draft {}", path.display())),
        None => Ok(None),
    }
}

/// Print the turns added since `from`, plus the outcome when it changed.
fn print_exchange(controller: &Controller, from: usize) {
    let state = controller.state();
    for msg in state.chat_messages().iter().skip(from) {
        println!("{}", format_message(msg));
    }
    if let Some(score) = state.running_score() {
        println!("running score: {:.2}", score);
    }
    if state.outcome_modal_visible() {
        if let Some(outcome) = state.outcome() {
            println!("\n*** Session finished: {} ***", outcome);
        }
    }
}

fn find_checkpoint(controller: &Controller, guid: &str) -> anyhow::Result<Checkpoint> {
    controller
        .state()
        .checkpoints()
        .iter()
        .find(|cp| cp.guid == guid)
        .cloned()
        .ok_or_else(|| anyhow!("checkpoint {} not found", guid))
}

// ============================================================================
// Commands
// ============================================================================

async fn run(cli: Cli, config: PostulateConfig) -> anyhow::Result<()> {
    let api: Arc<dyn BackendApi> = Arc::new(HttpBackend::new(&config.api)?);
    let mut controller = Controller::new(api.clone(), &config);
    let json = cli.json;
    tracing::debug!(
        training = %config.api.training_url,
        research = %config.api.research_url,
        "Backends configured"
    );

    match cli.command {
        Commands::Profiles => {
            let profiles = api.list_client_profiles().await?;
            if json {
                return print_json(&profiles);
            }
            for p in &profiles {
                println!("{:<24} {}  {}", p.id, p.name, p.description);
            }
        }

        Commands::Start { profile_id } => {
            let session = controller.start_session(&profile_id).await?;
            if json {
                return print_json(&controller.state().shared_data());
            }
            println!("session: {}", session);
            print_exchange(&controller, 0);
        }

        Commands::Say { session, message } => {
            controller.hydrate_history(&SessionGuid::from(session)).await?;
            let before = controller.state().chat_messages().len();
            if !controller.send_message(&message).await? {
                return Err(anyhow!("message is empty"));
            }
            if json {
                return print_json(&controller.state().shared_data());
            }
            print_exchange(&controller, before);
        }

        Commands::Checkpoints { session } => {
            controller.hydrate_history(&SessionGuid::from(session)).await?;
            let checkpoints = controller.state().checkpoints();
            if json {
                return print_json(checkpoints);
            }
            if checkpoints.is_empty() {
                eprintln!("No checkpoints yet");
            }
            for (i, cp) in checkpoints.iter().enumerate() {
                println!("{}", format_checkpoint(i, cp));
                for (j, path) in cp.alternative_paths().iter().enumerate() {
                    println!(
                        "      [{}] {}: {}",
                        j,
                        path.strategy,
                        path.first_message().unwrap_or("-")
                    );
                }
            }
        }

        Commands::Replay {
            session,
            checkpoint,
            message,
            path,
        } => {
            controller.hydrate_history(&SessionGuid::from(session)).await?;
            let cp = find_checkpoint(&controller, &checkpoint)?;

            if let Some(index) = path {
                let selected = cp
                    .alternative_paths()
                    .get(index)
                    .cloned()
                    .ok_or_else(|| anyhow!("checkpoint has no alternative path {}", index))?;
                controller.choose_replay_path(selected)?;
            }
            if let Some(text) = message {
                controller.dispatch(Action::SetReplayMessage(text)).await?;
            }

            let outcome = controller.replay(&cp).await?;
            if json {
                return print_json(&controller.state().shared_data());
            }
            println!(
                "replayed with: {} ({:?})",
                outcome.resolved.path.strategy, outcome.resolved.source
            );
            print_exchange(&controller, outcome.kept);
        }

        Commands::UsePath {
            session,
            checkpoint,
            path,
        } => {
            controller.hydrate_history(&SessionGuid::from(session)).await?;
            let cp = find_checkpoint(&controller, &checkpoint)?;
            let selected = cp
                .alternative_paths()
                .get(path)
                .cloned()
                .ok_or_else(|| anyhow!("checkpoint has no alternative path {}", path))?;

            let before = controller.state().chat_messages().len();
            controller.use_alternate_path(&cp, &selected).await?;
            if json {
                return print_json(&controller.state().shared_data());
            }
            print_exchange(&controller, before);
        }

        Commands::Flow { session } => {
            let nodes = api.conversation_flow(&SessionGuid::from(session)).await?;
            let graph = layout_flow(&nodes, &config.layout);
            if json {
                return print_json(&graph);
            }
            for node in &graph.nodes {
                println!(
                    "({:>5}, {:>5}) #{} [{}] {}",
                    node.x, node.y, node.id, node.role, node.label
                );
            }
            for edge in &graph.edges {
                println!("{} -> {}", edge.source, edge.target);
            }
        }

        Commands::Scores { session } => {
            let scores = api.internal_scores(&SessionGuid::from(session)).await?;
            if json {
                return print_json(&scores);
            }
            for score in &scores {
                println!("{}", format_score(score));
                if !score.justification.is_empty() {
                    println!("          {}", score.justification);
                }
            }
        }

        Commands::Sessions { user } => {
            let sessions = match user {
                Some(user) => api.list_sessions(user).await?,
                None => api.list_training_sessions().await?,
            };
            if json {
                return print_json(&sessions);
            }
            for s in &sessions {
                let updated = s
                    .last_update
                    .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!("{}  {:<32} {}", s.guid, s.title, updated);
            }
        }

        Commands::NewSession {
            title,
            description,
            user,
        } => {
            let session = api
                .create_session(&NewSession {
                    title,
                    description,
                    user_guid: user,
                })
                .await?;
            if json {
                return print_json(&session);
            }
            println!("created session {}", session.guid);
        }

        Commands::Pitfalls { session, file } => {
            controller
                .switch_session(Some(SessionGuid::from(session)))
                .await?;
            if let Some(draft) = read_draft(&file)? {
                let response = controller.analyze_pitfalls(&draft).await?;
                if json {
                    return print_json(&response);
                }
                println!(
                    "novelty {:.2}: {}",
                    response.novelty_analysis.score, response.novelty_analysis.feedback
                );
                for alert in &response.contradiction_alerts {
                    println!(
                        "contradiction with {}: {}",
                        alert.corpus_paper_id.as_deref().unwrap_or("?"),
                        alert.feedback.as_deref().unwrap_or_default()
                    );
                }
            } else if json {
                return print_json(controller.state().pitfalls());
            }
            println!("{} stored analyses", controller.state().pitfalls().len());
        }

        Commands::Significance { session, file } => {
            controller
                .switch_session(Some(SessionGuid::from(session)))
                .await?;
            if let Some(draft) = read_draft(&file)? {
                let record = controller.analyze_significance(&draft).await?;
                if json {
                    return print_json(&record);
                }
                println!(
                    "{}: {}",
                    record.status.as_deref().unwrap_or("unknown"),
                    record.significance.as_deref().unwrap_or_default()
                );
                for point in record.feedback.iter().flatten() {
                    println!("  - {}", point);
                }
            } else if json {
                return print_json(controller.state().significance());
            }
            println!(
                "{} stored analyses",
                controller.state().significance().len()
            );
        }

        Commands::Cite { session, query } => {
            controller
                .switch_session(Some(SessionGuid::from(session)))
                .await?;
            let found = controller.search_citations(&query).await?;
            if json {
                return print_json(&found);
            }
            if found.is_empty() {
                eprintln!("No citations found for: {}", query);
            }
            for c in &found {
                println!(
                    "{:.0}%  {} ({}, {})",
                    c.relevance_score.unwrap_or_default() * 100.0,
                    c.paper_title.as_deref().unwrap_or("untitled"),
                    c.paper_authors.as_deref().unwrap_or("?"),
                    c.paper_year.as_deref().unwrap_or("?")
                );
            }
        }

        Commands::Upload { files } => {
            tracing::info!(count = files.len(), "Uploading files");
            let uploaded = api.upload_files(&files).await?;
            if json {
                return print_json(&uploaded);
            }
            for f in &uploaded {
                println!("{}  {}", f.guid, f.file_name);
            }
        }

        Commands::Files => {
            let files = api.list_files().await?;
            if json {
                return print_json(&files);
            }
            for f in &files {
                println!(
                    "{}  {:<40} {}",
                    f.guid,
                    f.file_name,
                    f.created_date.format("%Y-%m-%d")
                );
            }
        }

        Commands::BuildGraph { file_guids } => {
            let message = api.construct_knowledge_graph(&file_guids).await?;
            println!("{}", message);
        }
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = match PostulateConfig::load_or_default(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("postulate: invalid config {}: {}", cli.config, e);
            std::process::exit(1);
        }
    };
    if let Some(url) = &cli.training_url {
        config.api.training_url = url.clone();
    }
    if let Some(url) = &cli.research_url {
        config.api.research_url = url.clone();
    }

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli, config).await {
        tracing::error!(error = %e, "Command failed");
        eprintln!("postulate: {:#}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use postulate_core::models::AlternativePath;

    // ========================================================================
    // TEST 1: Transcript lines show time, speaker and text
    // ========================================================================
    #[test]
    fn test_format_message() {
        let msg = ChatMessage {
            id: 1,
            content: "Is this within budget?".to_string(),
            role: Role::ClientAgent,
            time: "09:41".to_string(),
        };
        assert_eq!(format_message(&msg), "[09:41] client: Is this within budget?");
    }

    // ========================================================================
    // TEST 2: Checkpoint line uses the truncated title and path count
    // ========================================================================
    #[test]
    fn test_format_checkpoint() {
        let cp = Checkpoint {
            guid: "cp-7".to_string(),
            user_msg: Some("We can definitely beat any competitor's price".to_string()),
            alternator: Some(postulate_core::models::checkpoint::AlternatorResponse {
                alternative_paths: vec![AlternativePath::default(), AlternativePath::default()],
                analysis: None,
            }),
            ..Default::default()
        };
        let line = format_checkpoint(0, &cp);
        assert!(line.starts_with(" 1. We can definitely beat any com…"));
        assert!(line.contains("(cp-7)"));
        assert!(line.ends_with("2 alternative path(s)"));
    }

    // ========================================================================
    // TEST 3: Score line averages the four sub-scores
    // ========================================================================
    #[test]
    fn test_format_score() {
        let score: ClientAgentInternalScore = serde_json::from_value(serde_json::json!({
            "scores": {
                "objection_handling": { "score": 4 },
                "rapport_building": { "score": 2 },
                "clarity_and_conciseness": { "score": 3 },
                "persuasiveness": { "score": 3 }
            },
            "outcome": "IN_PROGRESS",
            "msg_index": 3
        }))
        .unwrap();
        let line = format_score(&score);
        assert!(line.starts_with("turn  3  avg 3.0"));
        assert!(line.ends_with("IN_PROGRESS"));
    }

    // ========================================================================
    // TEST 4: Subcommands parse
    // ========================================================================
    #[test]
    fn test_cli_parses_replay() {
        let cli = Cli::try_parse_from([
            "postulate", "--json", "replay", "s-1", "cp-1", "--path", "1",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Replay {
                session,
                checkpoint,
                message,
                path,
            } => {
                assert_eq!(session, "s-1");
                assert_eq!(checkpoint, "cp-1");
                assert!(message.is_none());
                assert_eq!(path, Some(1));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_rejects_bad_file_guid() {
        assert!(Cli::try_parse_from(["postulate", "build-graph", "not-a-uuid"]).is_err());
    }

    #[test]
    fn test_read_draft_missing_file() {
        let err = read_draft(&Some(PathBuf::from("/nonexistent/draft.txt"))).unwrap_err();
        assert!(err.to_string().contains("cannot read draft"));
        assert!(read_draft(&None).unwrap().is_none());
    }
}
