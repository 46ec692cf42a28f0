use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::Level;
use uuid::Uuid;

use quizo_backend::api::{class, users};
use quizo_backend::auth::Caller;
use quizo_backend::data::class::ClassCreateData;
use quizo_backend::resp::problem::Problem;
use quizo_backend::role::Role;
use quizo_backend::store::MongoStore;
use quizo_backend::Backend;

/// Maintenance tool for the quiz backend database.
#[derive(Debug, Parser)]
#[command(name = "quizo-admin", version)]
struct Cli {
    /// Log every store operation.
    #[arg(short, long, env = "QUIZO_VERBOSE")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Manage user accounts.
    #[command(subcommand)]
    Users(UserCommand),
    /// Manage classes.
    #[command(subcommand)]
    Classes(ClassCommand),
    /// Create the unique indexes the backend relies on.
    Indexes,
}

#[derive(Debug, Subcommand)]
enum UserCommand {
    List {
        /// Only list mentors.
        #[arg(long)]
        mentors: bool,
    },
    Role {
        id: Uuid,
        role: Role,
    },
    Block {
        id: Uuid,
    },
    Unblock {
        id: Uuid,
    },
    Verify {
        id: Uuid,
    },
    /// Delete a user and everything that belongs to them.
    Delete {
        id: Uuid,
    },
}

#[derive(Debug, Subcommand)]
enum ClassCommand {
    List,
    Create {
        topic: String,
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// Generated when omitted.
        #[arg(long)]
        join_code: Option<String>,
        /// Mentor id, may be repeated.
        #[arg(long = "mentor")]
        mentors: Vec<Uuid>,
    },
    Delete {
        id: Uuid,
    },
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_users(backend: &Backend<MongoStore>, command: UserCommand) -> Result<(), Problem> {
    let caller = Caller::console();
    let out = match command {
        UserCommand::List { mentors: false } => {
            serde_json::to_value(users::user_list(backend, caller).await?)?
        }
        UserCommand::List { mentors: true } => {
            serde_json::to_value(users::mentor_list(backend, caller).await?)?
        }
        UserCommand::Role { id, role } => {
            serde_json::to_value(users::user_set_role(backend, caller, id, role).await?)?
        }
        UserCommand::Block { id } => {
            serde_json::to_value(users::user_set_blocked(backend, caller, id, true).await?)?
        }
        UserCommand::Unblock { id } => {
            serde_json::to_value(users::user_set_blocked(backend, caller, id, false).await?)?
        }
        UserCommand::Verify { id } => {
            serde_json::to_value(users::user_set_verified(backend, caller, id).await?)?
        }
        UserCommand::Delete { id } => {
            serde_json::to_value(users::user_delete(backend, caller, id).await?)?
        }
    };
    println!("{:#}", out);
    Ok(())
}

async fn run_classes(backend: &Backend<MongoStore>, command: ClassCommand) -> Result<(), Problem> {
    let caller = Caller::console();
    let out = match command {
        ClassCommand::List => serde_json::to_value(class::class_list(backend, caller).await?)?,
        ClassCommand::Create {
            topic,
            name,
            description,
            join_code,
            mentors,
        } => {
            let data = ClassCreateData {
                topic,
                name,
                description,
                join_code,
                mentors,
                logo: None,
            };
            serde_json::to_value(class::class_create(backend, caller, data).await?)?
        }
        ClassCommand::Delete { id } => {
            serde_json::to_value(class::class_delete(backend, caller, id).await?)?
        }
    };
    println!("{:#}", out);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };

    let backend = quizo_backend::create(Some(level))
        .await
        .context("unable to start backend")?;

    let result = match cli.command {
        Command::Users(command) => run_users(&backend, command).await,
        Command::Classes(command) => run_classes(&backend, command).await,
        Command::Indexes => {
            backend.store.ensure_indexes().await?;
            return print(&"indexes created");
        }
    };

    if let Err(problem) = result {
        eprintln!("{:#}", problem.to_json());
        std::process::exit(1);
    }
    Ok(())
}
