//! MemVault - Encrypted Semantic Memory Store with Access-Gated Retrieval
//!
//! Command-line interface over a local vault: ingest memories, ask
//! questions as the owner or a proxy requester, manage access policies and
//! the proxy session, and inspect the audit trail.

use anyhow::{Context, Result};
use base64::Engine;
use clap::{Parser, Subcommand};
use memvault::{
    config::MemVaultConfig,
    crypto::{MasterKey, KEY_SIZE},
    gate::{AccessPolicy, Validity},
    index::HashingEmbedder,
    IngestRequest, MemVault, QueryRequest,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "memvault")]
#[command(version)]
#[command(about = "Encrypted semantic memory store with access-gated retrieval")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "MEMVAULT_CONFIG")]
    config: Option<PathBuf>,

    /// Base64-encoded 32-byte master key. Without it a fresh ephemeral key
    /// is generated and previously stored records will not decrypt.
    #[arg(long, env = "MEMVAULT_KEY", hide_env_values = true)]
    key: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a memory
    Ingest {
        /// The memory text
        text: String,

        /// Who said it
        #[arg(short, long, default_value = "owner")]
        speaker: String,

        /// Emotion label
        #[arg(short, long)]
        emotion: Option<String>,

        /// Topic tags (repeatable)
        #[arg(short, long)]
        tag: Vec<String>,
    },

    /// Ask a question against the vault
    Query {
        /// The question
        text: String,

        /// Identity asking; non-owners go through the access gate
        #[arg(short, long)]
        requester: Option<String>,

        /// Restrict candidates to these tags (repeatable)
        #[arg(long)]
        scope: Vec<String>,
    },

    /// Manage access policies
    Policy {
        #[command(subcommand)]
        command: PolicyCommands,
    },

    /// Manage the proxy session
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },

    /// Reverse a deletion that has not been purged yet
    Restore {
        /// Record id
        id: uuid::Uuid,
    },

    /// Find records similar to an existing record
    Similar {
        /// Record id
        id: uuid::Uuid,

        /// Maximum number of results
        #[arg(short, long, default_value = "5")]
        k: usize,
    },

    /// Find records by emotion label or creation time
    Find {
        /// Emotion label to match
        #[arg(short, long)]
        emotion: Option<String>,

        /// Earliest creation time (RFC 3339)
        #[arg(long)]
        since: Option<chrono::DateTime<chrono::Utc>>,

        /// Latest creation time (RFC 3339)
        #[arg(long)]
        until: Option<chrono::DateTime<chrono::Utc>>,
    },

    /// Show audit log entries
    Audit {
        /// Filter by actor
        #[arg(short, long)]
        actor: Option<String>,
    },

    /// Show store statistics
    Stats,

    /// Export all live records as decrypted JSON (owner operation)
    Export,

    /// Physically erase all tombstoned records
    Purge,

    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
}

#[derive(Subcommand)]
enum PolicyCommands {
    /// Grant a grantee access to tag scopes
    Grant {
        /// Grantee identity
        grantee: String,

        /// Tag scopes; a trailing `*` matches any suffix (repeatable)
        #[arg(short, long, required = true)]
        scope: Vec<String>,
    },

    /// Revoke a policy by id
    Revoke {
        /// Policy id
        id: uuid::Uuid,
    },

    /// List all policies, including revoked ones
    List,
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Activate the proxy session independent of schedule
    Activate {
        /// Why the session was activated
        #[arg(short, long, default_value = "manual activation")]
        reason: String,
    },

    /// Resume owner control; proxy queries are denied until re-activation
    Override {
        #[arg(short, long, default_value = "owner resumed control")]
        reason: String,
    },

    /// Deactivate the proxy session
    Deactivate,

    /// Show the current session state
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("memvault={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match &cli.config {
        Some(path) => MemVaultConfig::load(path)?,
        None => MemVaultConfig::default(),
    };

    if let Commands::Config { default } = &cli.command {
        let shown = if *default {
            MemVaultConfig::default()
        } else {
            config
        };
        println!("{}", toml::to_string_pretty(&shown)?);
        return Ok(());
    }

    let key = load_key(cli.key.as_deref())?;
    let embedder = Arc::new(HashingEmbedder::new(config.index.dimension));
    let owner_id = config.proxy.owner_id.clone();
    let vault = MemVault::open(config, embedder, key).await?;

    match cli.command {
        Commands::Ingest {
            text,
            speaker,
            emotion,
            tag,
        } => {
            let mut request = IngestRequest::new(text, speaker);
            request.emotion = emotion;
            request.tags = tag;
            let id = vault.ingest(request).await?;
            println!("Stored record {}", id);
        }

        Commands::Query {
            text,
            requester,
            scope,
        } => {
            let mut request = QueryRequest::new(text, requester.unwrap_or(owner_id));
            request.scope_filters = scope;
            let result = vault.query(request).await?;
            let response = result.response();
            println!("{}", response.answer_text);
            println!("(confidence: {})", response.confidence);
        }

        Commands::Policy { command } => match command {
            PolicyCommands::Grant { grantee, scope } => {
                let id = vault
                    .grant_policy(AccessPolicy::new(grantee, scope, Validity::Always))
                    .await?;
                println!("Granted policy {}", id);
            }
            PolicyCommands::Revoke { id } => {
                if vault.revoke_policy(id).await? {
                    println!("Revoked policy {}", id);
                } else {
                    println!("No policy {}", id);
                }
            }
            PolicyCommands::List => {
                for policy in vault.policies().await {
                    println!(
                        "{}  {}  scopes={}  revoked={}",
                        policy.id,
                        policy.grantee,
                        policy.scopes.join(","),
                        policy.revoked
                    );
                }
            }
        },

        Commands::Session { command } => match command {
            SessionCommands::Activate { reason } => {
                vault.activate_proxy(&reason).await?;
                println!("Proxy session activated");
            }
            SessionCommands::Override { reason } => {
                vault.override_proxy(&reason).await?;
                println!("Proxy session overridden");
            }
            SessionCommands::Deactivate => {
                vault.deactivate_proxy().await?;
                println!("Proxy session deactivated");
            }
            SessionCommands::Status => {
                let session = vault.session().await;
                println!(
                    "mode={}  reason={}  since={}",
                    session.mode, session.reason, session.last_transition
                );
            }
        },

        Commands::Restore { id } => {
            if vault.restore(id).await? {
                println!("Restored record {}", id);
            } else {
                println!("Nothing to restore for {}", id);
            }
        }

        Commands::Similar { id, k } => {
            for result in vault.similar(id, k).await? {
                println!(
                    "{}  score={:.3}  ({})  \"{}\"",
                    result.record_id, result.similarity, result.confidence, result.text
                );
            }
        }

        Commands::Find {
            emotion,
            since,
            until,
        } => {
            let records = match (emotion, since, until) {
                (Some(emotion), None, None) => vault.find_by_emotion(&emotion).await?,
                (None, since, until) => {
                    let from = since.unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC);
                    let to = until.unwrap_or_else(chrono::Utc::now);
                    vault.find_by_timeframe(from, to).await?
                }
                _ => anyhow::bail!("--emotion cannot be combined with --since/--until"),
            };
            println!("{}", serde_json::to_string_pretty(&records)?);
        }

        Commands::Audit { actor } => {
            for entry in vault.audit_entries(actor.as_deref(), None, None).await {
                println!(
                    "{}  {:?}  actor={}  outcome={}  records={}",
                    entry.timestamp,
                    entry.action,
                    entry.actor,
                    entry.outcome,
                    entry.record_ids.len()
                );
            }
        }

        Commands::Stats => {
            let stats = vault.stats().await;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }

        Commands::Export => {
            let records = vault.export().await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }

        Commands::Purge => {
            let purged = vault.purge_tombstoned().await?;
            println!("Purged {} record(s)", purged);
        }

        Commands::Config { .. } => unreachable!("handled before vault open"),
    }

    Ok(())
}

/// Decode the master key from its base64 form, or generate an ephemeral one
fn load_key(encoded: Option<&str>) -> Result<MasterKey> {
    match encoded {
        Some(encoded) => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .context("MEMVAULT_KEY is not valid base64")?;
            let bytes: [u8; KEY_SIZE] = bytes
                .try_into()
                .map_err(|_| anyhow::anyhow!("MEMVAULT_KEY must decode to {} bytes", KEY_SIZE))?;
            Ok(MasterKey::from_bytes("primary", bytes))
        }
        None => {
            tracing::warn!("No master key supplied, using an ephemeral key for this run");
            Ok(MasterKey::generate("ephemeral"))
        }
    }
}
