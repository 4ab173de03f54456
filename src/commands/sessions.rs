use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::config::{self, ProfileConfig};
use crate::error::ChatError;
use crate::session::{DEFAULT_HISTORY_LIMIT, SessionStore};

#[derive(Debug, Args, Clone)]
pub struct SessionsArgs {
    /// JSON file holding all sessions.
    #[arg(long, value_name = "PATH", global = true)]
    session_file: Option<PathBuf>,
    /// Profile whose session_file to use.
    #[arg(long, global = true)]
    profile: Option<String>,
    #[command(subcommand)]
    command: SessionsSubcommand,
}

#[derive(Debug, Subcommand, Clone)]
enum SessionsSubcommand {
    /// List stored sessions with their message counts.
    List,
    /// Print the stored messages of one session.
    Show { id: String },
    /// Delete one session.
    Clear { id: String },
}

fn resolve_session_file(args: &SessionsArgs) -> Result<PathBuf, String> {
    if let Some(path) = &args.session_file {
        return Ok(path.clone());
    }
    if let Some(path) = config::parse_env::<PathBuf>("BC_SESSION_FILE")? {
        return Ok(path);
    }
    let profile = match &args.profile {
        Some(name) => config::load_profile(name)?,
        None => ProfileConfig::default(),
    };
    Ok(profile
        .session_file
        .unwrap_or_else(config::default_session_file))
}

fn execute(
    command: SessionsSubcommand,
    store: &mut SessionStore,
    out: &mut impl Write,
) -> Result<(), ChatError> {
    match command {
        SessionsSubcommand::List => {
            if store.sessions().is_empty() {
                writeln!(out, "no sessions in {}", store.path().display())?;
            }
            for (id, messages) in store.sessions() {
                writeln!(out, "{id}\t{} messages", messages.len())?;
            }
        }
        SessionsSubcommand::Show { id } => {
            let messages = store.transcript(&id);
            if messages.is_empty() {
                return Err(ChatError::Configuration(format!("Session '{id}' not found.")));
            }
            for message in messages {
                match (&message.tool_call, message.content_str()) {
                    (Some(call), _) => writeln!(
                        out,
                        "{}: [calls {}({})]",
                        message.role.as_str(),
                        call.name,
                        call.arguments_json()
                    )?,
                    (None, content) => writeln!(out, "{}: {content}", message.role.as_str())?,
                }
            }
        }
        SessionsSubcommand::Clear { id } => {
            if store.remove(&id)? {
                writeln!(out, "cleared session '{id}'")?;
            } else {
                writeln!(out, "no session '{id}'")?;
            }
        }
    }
    Ok(())
}

pub fn run(args: SessionsArgs) -> Result<(), ChatError> {
    let path = resolve_session_file(&args).map_err(ChatError::Configuration)?;
    let mut store = SessionStore::open(path, DEFAULT_HISTORY_LIMIT);
    execute(args.command, &mut store, &mut io::stdout())
}
