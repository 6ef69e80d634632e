//! grc-access command line
//!
//! ## Usage
//!
//! ```bash
//! # Show which ACL revisions are applied
//! grc-access migrate status
//!
//! # Apply every pending revision, or up to one
//! grc-access migrate upgrade
//! grc-access migrate upgrade --to 33d043d8ba29
//!
//! # Revert the last revision, or everything
//! grc-access migrate downgrade
//! grc-access migrate downgrade --to base
//!
//! # Inspect the rule tables
//! grc-access rules show Assessment --table validation
//! grc-access rules check Assessment Document
//! grc-access rules symmetry
//!
//! # Grant a role; derived entries follow the object's relationships
//! grc-access acl grant 2 Assignees Assessment 4
//!
//! # Apply an action batch to an assessment
//! grc-access actions apply --parent-type Assessment --parent-id 4 --actor 2 actions.json
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use grc_access::rules::{asymmetric_pairs, RuleTable};
use grc_access::services::spawn_logging_listener;
use grc_access::{Config, EventBus, GrcDb, ObjectType, RelationshipValidator, Services};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "grc-access")]
#[command(about = "Relationship rules and ACL migrations for GRC objects")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, env = "GRC_ACCESS_DATABASE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// ACL revisions
    Migrate {
        #[command(subcommand)]
        action: MigrateCommand,
    },
    /// Relationship rule tables
    Rules {
        #[command(subcommand)]
        action: RulesCommand,
    },
    /// Access control roles
    Roles {
        #[command(subcommand)]
        action: RolesCommand,
    },
    /// ACL entries
    Acl {
        #[command(subcommand)]
        action: AclCommand,
    },
    /// Related-object action batches
    Actions {
        #[command(subcommand)]
        action: ActionsCommand,
    },
    /// Row counts of the store
    Stats,
}

#[derive(Subcommand, Debug)]
enum MigrateCommand {
    Status,
    Upgrade {
        /// Stop after this revision
        #[arg(long)]
        to: Option<String>,
    },
    Downgrade {
        /// Keep this revision applied; `base` reverts everything
        #[arg(long, conflicts_with = "steps")]
        to: Option<String>,
        #[arg(long, default_value_t = 1)]
        steps: usize,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Table {
    Mapping,
    Unmapping,
    Validation,
}

#[derive(Subcommand, Debug)]
enum RulesCommand {
    Show {
        object_type: String,
        #[arg(long, value_enum, default_value_t = Table::Validation)]
        table: Table,
    },
    Check {
        source: String,
        destination: String,
    },
    /// Report validation pairs allowed in one direction only
    Symmetry,
}

#[derive(Subcommand, Debug)]
enum RolesCommand {
    List { object_type: String },
}

#[derive(Subcommand, Debug)]
enum AclCommand {
    Grant {
        person_id: i64,
        role: String,
        object_type: String,
        object_id: i64,
    },
    Revoke {
        entry_id: i64,
    },
    /// Mandatory roles nobody holds on an object
    Missing {
        object_type: String,
        object_id: i64,
    },
}

#[derive(Subcommand, Debug)]
enum ActionsCommand {
    Apply {
        #[arg(long)]
        parent_type: String,
        #[arg(long)]
        parent_id: i64,
        /// Person performing the actions
        #[arg(long)]
        actor: Option<i64>,
        /// JSON file holding the action batch
        file: PathBuf,
    },
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_table_row(table: &RuleTable, object_type: ObjectType) {
    let allowed: Vec<&str> = table
        .get(&object_type)
        .map(|set| set.iter().map(ObjectType::as_str).collect())
        .unwrap_or_default();
    println!("{}: {}", object_type, allowed.join(", "));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load config
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::default(),
    };

    // Apply CLI overrides
    if let Some(database) = args.database {
        config.database_path = database;
    }

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(config.log_filter.parse()?))
        .init();

    let registry = Arc::new(config.registry()?);

    // Rule inspection needs no store
    if let Command::Rules { action } = &args.command {
        match action {
            RulesCommand::Show { object_type, table } => {
                let object_type = object_type.parse::<ObjectType>()?;
                let rules = match table {
                    Table::Mapping => registry.mapping_rules(),
                    Table::Unmapping => registry.unmapping_rules(),
                    Table::Validation => registry.mapping_validation_rules(),
                };
                print_table_row(rules, object_type);
            }
            RulesCommand::Check {
                source,
                destination,
            } => {
                let validator = RelationshipValidator::new(registry.clone());
                validator.validate_names(source, destination)?;
                println!("allowed: {} -> {}", source, destination);
            }
            RulesCommand::Symmetry => {
                let pairs = asymmetric_pairs(registry.mapping_validation_rules());
                for (source, destination) in &pairs {
                    println!("{} -> {} has no reverse rule", source, destination);
                }
                if !pairs.is_empty() {
                    bail!("{} asymmetric validation pairs", pairs.len());
                }
                println!("validation rules are symmetric");
            }
        }
        return Ok(());
    }

    info!(database = %config.database_path.display(), "Opening store");
    let db = Arc::new(
        GrcDb::open(&config.database_path)
            .with_context(|| format!("Failed to open {}", config.database_path.display()))?,
    );
    let events = Arc::new(EventBus::with_capacity(config.event_capacity));
    let listener = spawn_logging_listener(events.clone());
    let services = Services::new(db.clone(), registry, events);

    match args.command {
        Command::Migrate { action } => match action {
            MigrateCommand::Status => print_json(&services.migrations.status()?)?,
            MigrateCommand::Upgrade { to } => {
                let reports = match to {
                    Some(target) => services.migrations.upgrade_to(&target)?,
                    None => services.migrations.upgrade()?,
                };
                print_json(&reports)?;
            }
            MigrateCommand::Downgrade { to, steps } => {
                let reports = match to {
                    Some(target) => services.migrations.downgrade_to(&target)?,
                    None => services.migrations.downgrade(steps)?,
                };
                print_json(&reports)?;
            }
        },
        Command::Roles {
            action: RolesCommand::List { object_type },
        } => print_json(&services.acl.roles_for(object_type.parse()?)?)?,
        Command::Acl { action } => match action {
            AclCommand::Grant {
                person_id,
                role,
                object_type,
                object_id,
            } => print_json(&services.acl.grant(person_id, &role, object_type.parse()?, object_id)?)?,
            AclCommand::Revoke { entry_id } => print_json(&services.acl.revoke(entry_id)?)?,
            AclCommand::Missing {
                object_type,
                object_id,
            } => print_json(
                &services
                    .acl
                    .unassigned_mandatory_roles(object_type.parse()?, object_id)?,
            )?,
        },
        Command::Actions {
            action:
                ActionsCommand::Apply {
                    parent_type,
                    parent_id,
                    actor,
                    file,
                },
        } => {
            let payload: serde_json::Value = serde_json::from_str(
                &std::fs::read_to_string(&file)
                    .with_context(|| format!("Failed to read {}", file.display()))?,
            )?;
            let outcome = services
                .actions
                .process(parent_type.parse()?, parent_id, actor, &payload)?;
            print_json(&outcome)?;
        }
        Command::Stats => print_json(&db.stats()?)?,
        Command::Rules { .. } => {}
    }

    // Closing the bus lets the listener drain and exit
    drop(services);
    drop(db);
    listener.await?;
    Ok(())
}
