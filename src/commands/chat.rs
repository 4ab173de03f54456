use std::env;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

use clap::Args;
use owo_colors::OwoColorize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::config::{self, Credentials, ProfileConfig, check_temperature, parse_value};
use crate::conversation::{Orchestrator, Transcript};
use crate::dehashed::client::DEHASHED_BASE_URL;
use crate::dehashed::{DehashedClient, DehashedTool, SearchAuth};
use crate::error::ChatError;
use crate::logging::Verbosity;
use crate::rchain::openai::{ChatOptions, OPENAI_BASE_URL, OpenAiChat};
use crate::rchain::provider::Usage;
use crate::session::{DEFAULT_HISTORY_LIMIT, SessionStore};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_SESSION: &str = "default";
pub const DEFAULT_RESULT_LIMIT: usize = 10;
pub const EXIT_COMMAND: &str = "exit";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a security assistant that helps people find out \
whether their email addresses, usernames or passwords appear in known data breaches. When a lookup \
is needed, call the search_dehashed tool with a field-prefixed query such as email:alice@example.com, \
username:alice or password:hunter2. Summarise what the results mean and what the user should do \
next. Do not repeat full plaintext passwords or hashes from results unless the user explicitly asks \
about their own credentials. If the search fails, explain the error plainly.";

#[derive(Debug, Args, Clone, Default)]
pub struct ChatArgs {
    /// Session id to resume and persist.
    #[arg(long)]
    pub session: Option<String>,
    /// JSON file holding all sessions.
    #[arg(long, value_name = "PATH")]
    pub session_file: Option<PathBuf>,
    /// Profile from the config file.
    #[arg(long)]
    pub profile: Option<String>,
    #[arg(long)]
    pub model: Option<String>,
    /// Replace the built-in system prompt.
    #[arg(long)]
    pub system: Option<String>,
    #[arg(long)]
    pub temperature: Option<f32>,
    #[arg(long)]
    pub max_tokens: Option<u32>,
    /// Per-request timeout for model calls, in seconds.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
    /// Per-request timeout for breach searches, in seconds.
    #[arg(long, value_name = "SECS")]
    pub search_timeout: Option<u64>,
    /// Retries for failed model calls (searches are never retried).
    #[arg(long)]
    pub retries: Option<u32>,
    /// Base delay between model retries, in milliseconds.
    #[arg(long, value_name = "MS")]
    pub retry_delay: Option<u64>,
    /// Messages kept per session on disk.
    #[arg(long)]
    pub history_limit: Option<usize>,
    /// Search entries forwarded to the model.
    #[arg(long)]
    pub result_limit: Option<usize>,
    /// Print token usage after each turn.
    #[arg(long)]
    pub show_usage: bool,
    #[arg(long)]
    pub no_color: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatSettings {
    pub model: String,
    pub system: String,
    pub session: String,
    pub session_file: PathBuf,
    pub history_limit: usize,
    pub result_limit: usize,
    pub search_timeout: Option<u64>,
    pub options: ChatOptions,
    pub openai_base_url: String,
    pub dehashed_base_url: String,
    pub show_usage: bool,
}

/// CLI value, then environment, then profile.
fn pick<T: FromStr>(
    cli: Option<T>,
    env: &dyn Fn(&str) -> Option<String>,
    key: &str,
    profile: Option<T>,
) -> Result<Option<T>, String> {
    if cli.is_some() {
        return Ok(cli);
    }
    if let Some(value) = parse_value(key, env(key))? {
        return Ok(Some(value));
    }
    Ok(profile)
}

fn at_least_one(key: &str, value: Option<usize>, default: usize) -> Result<usize, String> {
    match value {
        Some(0) => Err(format!("Invalid {key} '0': must be at least 1.")),
        Some(value) => Ok(value),
        None => Ok(default),
    }
}

impl ChatSettings {
    pub fn resolve(args: &ChatArgs) -> Result<Self, String> {
        let profile = match &args.profile {
            Some(name) => config::load_profile(name)?,
            None => ProfileConfig::default(),
        };
        Self::resolve_with(args, profile, &config::non_empty_env)
    }

    fn resolve_with(
        args: &ChatArgs,
        profile: ProfileConfig,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, String> {
        let defaults = ChatOptions::default();
        let temperature = pick(args.temperature, env, "BC_TEMPERATURE", profile.temperature)?
            .map(check_temperature)
            .transpose()
            .map_err(|err| format!("Invalid temperature: {err}"))?;

        let options = ChatOptions {
            temperature,
            max_tokens: pick(args.max_tokens, env, "BC_MAX_TOKENS", profile.max_tokens)?,
            timeout_secs: pick(args.timeout, env, "BC_TIMEOUT", profile.timeout)?,
            retries: pick(args.retries, env, "BC_RETRIES", profile.retries)?
                .unwrap_or(defaults.retries),
            retry_delay_ms: pick(args.retry_delay, env, "BC_RETRY_DELAY", profile.retry_delay)?
                .unwrap_or(defaults.retry_delay_ms),
        };

        Ok(Self {
            model: pick(args.model.clone(), env, "BC_MODEL", profile.model)?
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            system: pick(args.system.clone(), env, "BC_SYSTEM", profile.system)?
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            session: pick(args.session.clone(), env, "BC_SESSION", profile.session)?
                .unwrap_or_else(|| DEFAULT_SESSION.to_string()),
            session_file: pick(
                args.session_file.clone(),
                env,
                "BC_SESSION_FILE",
                profile.session_file,
            )?
            .unwrap_or_else(config::default_session_file),
            history_limit: at_least_one(
                "history_limit",
                pick(args.history_limit, env, "BC_HISTORY_LIMIT", profile.history_limit)?,
                DEFAULT_HISTORY_LIMIT,
            )?,
            result_limit: at_least_one(
                "result_limit",
                pick(args.result_limit, env, "BC_RESULT_LIMIT", profile.result_limit)?,
                DEFAULT_RESULT_LIMIT,
            )?,
            search_timeout: pick(
                args.search_timeout,
                env,
                "BC_SEARCH_TIMEOUT",
                profile.search_timeout,
            )?,
            options,
            openai_base_url: pick(None, env, "BC_OPENAI_BASE_URL", profile.openai_base_url)?
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            dehashed_base_url: pick(
                None,
                env,
                "BC_DEHASHED_BASE_URL",
                profile.dehashed_base_url,
            )?
            .unwrap_or_else(|| DEHASHED_BASE_URL.to_string()),
            show_usage: args.show_usage || profile.show_usage.unwrap_or(false),
        })
    }
}

/// Labels for console output, colored only on a terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct Palette {
    color: bool,
}

impl Palette {
    pub fn detect(no_color: bool) -> Self {
        Self {
            color: !no_color && env::var_os("NO_COLOR").is_none() && io::stdout().is_terminal(),
        }
    }

    pub fn prompt(self) -> String {
        if self.color {
            format!("{} ", "you>".bold().green())
        } else {
            "you> ".to_string()
        }
    }

    pub fn assistant(self) -> String {
        if self.color {
            "assistant>".bold().cyan().to_string()
        } else {
            "assistant>".to_string()
        }
    }

    pub fn error(self) -> String {
        if self.color {
            "error>".bold().red().to_string()
        } else {
            "error>".to_string()
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Console {
    pub palette: Palette,
    pub show_usage: bool,
}

fn usage_line(usage: Option<Usage>, latency_ms: u128) -> String {
    match usage {
        Some(usage) => format!(
            "usage: prompt={} completion={} total={} latency_ms={latency_ms}",
            usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
        ),
        None => format!("usage: unavailable latency_ms={latency_ms}"),
    }
}

/// Reads user lines until `exit` or end of input, answering each through
/// `orchestrator` and saving the transcript after every turn. Turn failures
/// are printed and the loop continues. Returns the number of turns taken.
pub async fn run_turns<R, W>(
    orchestrator: &Orchestrator<'_>,
    store: &mut SessionStore,
    session: &str,
    transcript: &mut Transcript,
    input: R,
    out: &mut W,
    console: Console,
) -> io::Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut input = input;
    let mut buf = Vec::new();
    let mut turns = 0;
    let mut reported_save_failure = false;

    loop {
        write!(out, "{}", console.palette.prompt())?;
        out.flush()?;

        buf.clear();
        if input.read_until(b'\n', &mut buf).await? == 0 {
            writeln!(out)?;
            break;
        }
        // Undecodable bytes are replaced rather than ending the session.
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        if line.trim().is_empty() {
            continue;
        }
        if line.trim().eq_ignore_ascii_case(EXIT_COMMAND) {
            break;
        }

        let started = Instant::now();
        match orchestrator.advance(transcript, line).await {
            Ok(reply) => {
                writeln!(out, "{} {}", console.palette.assistant(), reply.text)?;
                if console.show_usage {
                    eprintln!("{}", usage_line(reply.usage, started.elapsed().as_millis()));
                }
            }
            Err(err) => writeln!(out, "{} {err}", console.palette.error())?,
        }
        turns += 1;

        if let Err(err) = store.save(session, transcript.messages()) {
            warn!(error = %err, session, "session not saved");
            if !reported_save_failure {
                writeln!(out, "{} {err}", console.palette.error())?;
                reported_save_failure = true;
            }
        }
    }

    Ok(turns)
}

pub async fn run(args: ChatArgs, verbosity: Verbosity) -> Result<(), ChatError> {
    let settings = ChatSettings::resolve(&args).map_err(ChatError::Configuration)?;
    let credentials = Credentials::from_env().map_err(ChatError::Configuration)?;
    info!(
        model = %settings.model,
        session = %settings.session,
        session_file = %settings.session_file.display(),
        openai_api_key_present = true,
        dehashed_basic_auth = credentials.dehashed_email.is_some(),
        "starting chat"
    );

    let model = OpenAiChat::new(
        credentials.openai_api_key.as_str(),
        &settings.openai_base_url,
        settings.model.as_str(),
        settings.options,
    );
    let auth = SearchAuth::from_credentials(
        &credentials.dehashed_api_key,
        credentials.dehashed_email.as_deref(),
    );
    let tools = DehashedTool::new(
        DehashedClient::new(&settings.dehashed_base_url, auth, settings.result_limit)
            .with_timeout(settings.search_timeout),
    );

    let mut store = SessionStore::open(&settings.session_file, settings.history_limit);
    let mut transcript =
        Transcript::resume(settings.system.as_str(), store.transcript(&settings.session));

    if !verbosity.is_quiet() {
        eprintln!(
            "breachchat: session '{}' ({} earlier messages), model {}. Type '{EXIT_COMMAND}' to quit.",
            settings.session,
            transcript.len() - 1,
            model.model()
        );
    }

    let console = Console {
        palette: Palette::detect(args.no_color),
        show_usage: settings.show_usage && !verbosity.is_quiet(),
    };
    let orchestrator = Orchestrator::new(&model, &tools);
    let turns = run_turns(
        &orchestrator,
        &mut store,
        &settings.session,
        &mut transcript,
        BufReader::new(tokio::io::stdin()),
        &mut io::stdout(),
        console,
    )
    .await?;

    info!(turns, "chat finished");
    Ok(())
}
