use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(
    name = "lexbert",
    about = "Hybrid structural and semantic retrieval over legal documents"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Override the embedding model ID or local model path
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load chunk records (JSON Lines) produced by the ingestion pipeline
    Import(ImportArgs),
    /// Retrieve the chunks relevant to a question
    Query(QueryArgs),
    /// Retrieve and assemble the context handed to generation
    Context(ContextArgs),
    /// Show system status and statistics
    Status(StatusArgs),
    /// Manage persisted settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Import --

#[derive(Debug, Parser)]
pub struct ImportArgs {
    /// JSON Lines file with one chunk record per line
    pub file: PathBuf,
}

// -- Query --

#[derive(Debug, Parser)]
pub struct QueryArgs {
    /// The question
    pub query: String,

    /// Number of chunks to return (default: the top_k setting)
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Context --

#[derive(Debug, Parser)]
pub struct ContextArgs {
    /// The question
    pub query: String,

    /// Number of chunks to retrieve (default: the top_k setting)
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// Character budget (default: the max_context_chars setting)
    #[arg(long)]
    pub max_chars: Option<usize>,

    /// Print the grounded prompt for the generation model
    #[arg(long, conflicts_with = "json")]
    pub prompt: bool,

    /// Output the context and its citations as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Config --

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Show every setting with its effective value
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Persist a setting
    Set {
        /// Setting name (see `config show`)
        key: String,
        /// New value
        value: String,
    },
    /// Clear a stored setting (revert to default)
    Unset {
        /// Setting name
        key: String,
    },
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "lexbert",
            &mut std::io::stdout(),
        );
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn parse_query_defaults() {
        let cli =
            Cli::parse_from(["lexbert", "query", "¿qué dice el artículo 52?"]);
        match cli.command {
            Command::Query(args) => {
                assert_eq!(args.query, "¿qué dice el artículo 52?");
                assert_eq!(args.count, None);
                assert!(!args.json);
            }
            _ => panic!("expected query command"),
        }
    }

    #[test]
    fn parse_context_flags() {
        let cli = Cli::parse_from([
            "lexbert",
            "--data-dir",
            "/tmp/lex",
            "context",
            "faltas",
            "-n",
            "3",
            "--max-chars",
            "800",
            "--prompt",
        ]);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/lex")));
        match cli.command {
            Command::Context(args) => {
                assert_eq!(args.count, Some(3));
                assert_eq!(args.max_chars, Some(800));
                assert!(args.prompt);
            }
            _ => panic!("expected context command"),
        }
    }

    #[test]
    fn prompt_and_json_conflict() {
        let res = Cli::try_parse_from([
            "lexbert", "context", "q", "--prompt", "--json",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
