use std::io;
use std::process;

use breachchat::commands::chat::{self, ChatArgs};
use breachchat::commands::config::{self, ConfigArgs};
use breachchat::commands::sessions::{self, SessionsArgs};
use breachchat::logging::{self, Verbosity};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, shells};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (commit: ",
    env!("BC_GIT_SHA"),
    ", built: ",
    env!("BC_BUILD_TS"),
    ")"
);

const ROOT_HELP_EXAMPLES: &str = "Examples:\n  breachchat chat --session alice\n  breachchat chat --profile work --show-usage\n  breachchat sessions list\n  breachchat config check\n  breachchat completion bash > ~/.local/share/bash-completion/completions/breachchat";

const CHAT_HELP_EXAMPLES: &str = "Examples:\n  breachchat chat\n  breachchat chat --session alice --model gpt-4o\n  echo \"is hunter2 leaked?\" | breachchat --quiet chat\n\nRequires OPENAI_API_KEY and DEHASHED_API_KEY (DEHASHED_EMAIL optional). Type 'exit' to quit.";

#[derive(Debug, Parser)]
#[command(
    name = "breachchat",
    version = VERSION,
    about = "Chat with an LLM that can look up credentials in the DeHashed breach database",
    after_help = ROOT_HELP_EXAMPLES
)]
struct Cli {
    /// Debug logging for this crate.
    #[arg(long, short, global = true)]
    verbose: bool,
    /// Errors only; no banner or usage lines.
    #[arg(long, short, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Start or resume an interactive chat session", after_help = CHAT_HELP_EXAMPLES)]
    Chat(ChatArgs),
    #[command(about = "Inspect or clear stored sessions")]
    Sessions(SessionsArgs),
    #[command(about = "Manage local config")]
    Config(ConfigArgs),
    #[command(about = "Generate shell completion script")]
    Completion {
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

fn print_completion(shell: CompletionShell) {
    let mut cmd = Cli::command();
    match shell {
        CompletionShell::Bash => generate(shells::Bash, &mut cmd, "breachchat", &mut io::stdout()),
        CompletionShell::Zsh => generate(shells::Zsh, &mut cmd, "breachchat", &mut io::stdout()),
        CompletionShell::Fish => generate(shells::Fish, &mut cmd, "breachchat", &mut io::stdout()),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    let verbosity = Verbosity::from_flags(cli.verbose, cli.quiet);
    logging::init(verbosity);

    let result = match cli.command {
        Commands::Chat(args) => chat::run(args, verbosity).await,
        Commands::Sessions(args) => sessions::run(args),
        Commands::Config(args) => config::run(args),
        Commands::Completion { shell } => {
            print_completion(shell);
            Ok(())
        }
    };

    if let Err(err) = result {
        eprintln!("{err}");
        process::exit(1);
    }
}
