//! Agentmint command-line front end.
//!
//! Usage:
//!   agentmint init                               Create the home directory, config and database
//!   agentmint user add --email E --name N        Register a user
//!   agentmint agent create --user U ...          Create a DRAFT agent
//!   agentmint agent execute ID --user U --input  Run an agent
//!   agentmint license issue --user U --agent A   Mint a license key
//!   agentmint license execute KEY --input J      Run an agent through a license
//!
//! Results are printed to stdout as pretty JSON.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use agentmint::agents::{AgentPatch, NewAgent};
use agentmint::config::{self, PlatformConfig, CONFIG_FILE};
use agentmint::state::Database;
use agentmint::types::*;
use agentmint::{CoreError, Platform};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "agentmint")]
#[command(version = "0.1.0")]
#[command(about = "Tenant-owned AI agents with plan quotas and license keys")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to agentmint home directory.
    #[arg(long, default_value = "~/.agentmint")]
    home: String,

    /// Log level (debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the home directory, a default config and the database.
    Init,

    /// Users and subscription plans.
    #[command(subcommand)]
    User(UserCommand),

    /// Agent catalogue and execution.
    #[command(subcommand)]
    Agent(AgentCommand),

    /// License keys.
    #[command(subcommand)]
    License(LicenseCommand),
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    /// Register a user on the FREE plan.
    Add {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
    },
    /// Apply a subscription tier change.
    Plan { user_id: String, plan: Plan },
    /// Edit profile fields.
    Profile {
        user_id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        avatar: Option<String>,
    },
    /// Counts of agents, executions and licenses.
    Stats { user_id: String },
}

#[derive(Args, Debug)]
struct Owner {
    /// Acting user (the owner).
    #[arg(long = "user")]
    user_id: String,
}

#[derive(Args, Debug)]
struct AgentFields {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    specialty: Option<String>,
    #[arg(long)]
    complexity: Option<ComplexityTier>,
    #[arg(long)]
    system_prompt: Option<String>,
    /// JSON object.
    #[arg(long)]
    instructions: Option<String>,
}

#[derive(Subcommand, Debug)]
enum AgentCommand {
    /// Create a DRAFT agent.
    Create {
        #[command(flatten)]
        owner: Owner,
        #[arg(long)]
        name: String,
        #[arg(long)]
        system_prompt: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, default_value = "CUSTOM")]
        specialty: String,
        #[arg(long, default_value = "BASIC")]
        complexity: ComplexityTier,
        /// JSON object.
        #[arg(long)]
        instructions: Option<String>,
    },
    /// List the owner's agents.
    List {
        #[command(flatten)]
        owner: Owner,
        #[arg(long)]
        status: Option<AgentStatus>,
        #[arg(long)]
        specialty: Option<String>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u64,
        #[arg(long, default_value_t = 10)]
        limit: u64,
    },
    Show {
        agent_id: String,
        #[command(flatten)]
        owner: Owner,
    },
    /// Patch editable fields and optionally move the status forward.
    Update {
        agent_id: String,
        #[command(flatten)]
        owner: Owner,
        #[command(flatten)]
        fields: AgentFields,
        #[arg(long)]
        status: Option<AgentStatus>,
    },
    /// DRAFT -> ACTIVE.
    Publish {
        agent_id: String,
        #[command(flatten)]
        owner: Owner,
    },
    /// Archive (soft delete).
    Delete {
        agent_id: String,
        #[command(flatten)]
        owner: Owner,
    },
    Clone {
        agent_id: String,
        #[command(flatten)]
        owner: Owner,
    },
    /// Run the agent on a JSON input.
    Execute {
        agent_id: String,
        #[command(flatten)]
        owner: Owner,
        #[arg(long, default_value = "{}")]
        input: String,
    },
    /// Execution rollup for one agent.
    Analytics {
        agent_id: String,
        #[command(flatten)]
        owner: Owner,
    },
}

#[derive(Subcommand, Debug)]
enum LicenseCommand {
    /// Mint a license for an owned agent.
    Issue {
        #[command(flatten)]
        owner: Owner,
        #[arg(long = "agent")]
        agent_id: String,
        #[arg(long = "type", default_value = "TRIAL")]
        license_type: LicenseType,
    },
    List {
        #[command(flatten)]
        owner: Owner,
    },
    /// Check a key. May expire it as a side effect.
    Validate { key: String },
    Revoke {
        license_id: String,
        #[command(flatten)]
        owner: Owner,
    },
    /// Run the licensed agent on a JSON input.
    Execute {
        key: String,
        #[arg(long, default_value = "{}")]
        input: String,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    // Resolve home directory
    let home_dir = PathBuf::from(shellexpand::tilde(&cli.home).into_owned());

    let result = match cli.command {
        Commands::Init => cmd_init(&home_dir),
        Commands::User(cmd) => cmd_user(&home_dir, cmd).await,
        Commands::Agent(cmd) => cmd_agent(&home_dir, cmd).await,
        Commands::License(cmd) => cmd_license(&home_dir, cmd).await,
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        // 2 for requests the caller can correct, 1 for everything else
        let client_error = e
            .downcast_ref::<CoreError>()
            .is_some_and(CoreError::is_client_error);
        std::process::exit(if client_error { 2 } else { 1 });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

fn cmd_init(home_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(home_dir)
        .with_context(|| format!("Failed to create home directory: {}", home_dir.display()))?;

    let config_path = home_dir.join(CONFIG_FILE);
    let cfg = if config_path.exists() {
        config::load_config(&config_path)?
    } else {
        let cfg = PlatformConfig {
            db_path: home_dir.join("platform.db").display().to_string(),
            ..PlatformConfig::default()
        };
        config::save_config(&cfg, &config_path)?;
        cfg
    };

    let db_path = cfg.resolved_db_path();
    Database::open(Path::new(&db_path))
        .with_context(|| format!("Failed to open database at {}", db_path))?;

    eprintln!(
        "{} Initialized {} (database: {})",
        ">>>".green().bold(),
        config_path.display(),
        db_path
    );
    Ok(())
}

async fn cmd_user(home_dir: &Path, cmd: UserCommand) -> Result<()> {
    let platform = bootstrap(home_dir)?;
    let users = &platform.users;

    match cmd {
        UserCommand::Add { email, name } => print_json(&users.register_user(&email, &name).await?),
        UserCommand::Plan { user_id, plan } => {
            print_json(&users.apply_plan_change(&user_id, plan).await?)
        }
        UserCommand::Profile {
            user_id,
            name,
            avatar,
        } => print_json(
            &users
                .update_profile(&user_id, name.as_deref(), avatar.as_deref())
                .await?,
        ),
        UserCommand::Stats { user_id } => print_json(&users.stats(&user_id).await?),
    }
}

async fn cmd_agent(home_dir: &Path, cmd: AgentCommand) -> Result<()> {
    let platform = bootstrap(home_dir)?;
    let agents = &platform.agents;

    match cmd {
        AgentCommand::Create {
            owner,
            name,
            system_prompt,
            description,
            specialty,
            complexity,
            instructions,
        } => {
            let new = NewAgent {
                name,
                description,
                specialty,
                complexity,
                system_prompt,
                instructions: instructions.as_deref().map(parse_json).transpose()?,
            };
            let agent = agents.create(&owner.user_id, new).await?;
            info!("Agent {} created as DRAFT", agent.id);
            print_json(&agent)
        }
        AgentCommand::List {
            owner,
            status,
            specialty,
            search,
            page,
            limit,
        } => {
            let query = AgentQuery {
                status,
                specialty,
                search,
                page,
                limit,
            };
            print_json(&agents.list(&owner.user_id, &query).await?)
        }
        AgentCommand::Show { agent_id, owner } => {
            print_json(&agents.get(&agent_id, &owner.user_id).await?)
        }
        AgentCommand::Update {
            agent_id,
            owner,
            fields,
            status,
        } => {
            let patch = AgentPatch {
                name: fields.name,
                description: fields.description,
                specialty: fields.specialty,
                complexity: fields.complexity,
                system_prompt: fields.system_prompt,
                instructions: fields.instructions.as_deref().map(parse_json).transpose()?,
                status,
            };
            print_json(&agents.update(&agent_id, &owner.user_id, patch).await?)
        }
        AgentCommand::Publish { agent_id, owner } => {
            print_json(&agents.publish(&agent_id, &owner.user_id).await?)
        }
        AgentCommand::Delete { agent_id, owner } => {
            print_json(&agents.delete(&agent_id, &owner.user_id).await?)
        }
        AgentCommand::Clone { agent_id, owner } => {
            print_json(&agents.clone_agent(&agent_id, &owner.user_id).await?)
        }
        AgentCommand::Execute {
            agent_id,
            owner,
            input,
        } => {
            let outcome = agents
                .execute(&agent_id, &owner.user_id, parse_json(&input)?)
                .await?;
            report_outcome(&outcome)
        }
        AgentCommand::Analytics { agent_id, owner } => {
            print_json(&platform.analytics.summary(&agent_id, &owner.user_id).await?)
        }
    }
}

async fn cmd_license(home_dir: &Path, cmd: LicenseCommand) -> Result<()> {
    let platform = bootstrap(home_dir)?;
    let licenses = &platform.licenses;

    match cmd {
        LicenseCommand::Issue {
            owner,
            agent_id,
            license_type,
        } => print_json(&licenses.issue(&owner.user_id, &agent_id, license_type).await?),
        LicenseCommand::List { owner } => print_json(&licenses.list(&owner.user_id).await?),
        LicenseCommand::Validate { key } => {
            let validation = licenses.validate(&key).await?;
            if !validation.valid {
                eprintln!("{} {}", "invalid:".yellow().bold(), key);
            }
            print_json(&validation)
        }
        LicenseCommand::Revoke { license_id, owner } => {
            print_json(&licenses.revoke(&license_id, &owner.user_id).await?)
        }
        LicenseCommand::Execute { key, input } => {
            let outcome = platform
                .agents
                .execute_with_license(&key, parse_json(&input)?)
                .await?;
            report_outcome(&outcome)
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Load config and open the platform over its database.
fn bootstrap(home_dir: &Path) -> Result<Platform> {
    let config_path = home_dir.join(CONFIG_FILE);

    if !config_path.exists() {
        eprintln!(
            "{} No config found at {:?}. Run `agentmint init` first.",
            "Error:".red().bold(),
            config_path
        );
        std::process::exit(1);
    }

    let cfg = config::load_config(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    Platform::from_config(&cfg)
        .with_context(|| format!("Failed to open database at {}", cfg.resolved_db_path()))
}

fn parse_json(raw: &str) -> Result<serde_json::Value> {
    serde_json::from_str(raw).with_context(|| format!("Invalid JSON: {raw}"))
}

fn report_outcome(outcome: &ExecutionOutcome) -> Result<()> {
    if outcome.success {
        eprintln!(
            "{} {} tokens in {}ms",
            ">>>".green().bold(),
            outcome.tokens,
            outcome.duration_ms
        );
    } else {
        eprintln!(
            "{} execution recorded as failed",
            "<<<".red().bold()
        );
    }
    print_json(outcome)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}
