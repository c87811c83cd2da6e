//! This module defines the command-line interface for the application using `clap`.
//!
//! It provides a [`Cli`] struct holding the global options and a [`Commands`] enum with the
//! available subcommands.
//!
//! # Examples
//!
//! ```no_run
//! use clap::Parser;
//! use awful_rag::commands::{Cli, Commands};
//!
//! let cli = Cli::parse();
//! match cli.command {
//!     Commands::Ask { question } => println!("asking {question}"),
//!     _ => {}
//! }
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Represents the parsed command-line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, propagate_version = true, color = clap::ColorChoice::Always)]
pub struct Cli {
    /// Path to the config file. Defaults to `config.yaml` in the config directory.
    #[arg(long, short = 'c', global = true, env = "ARAG_CONFIG")]
    pub config: Option<PathBuf>,

    /// API key for the embedding service. `JINA_API_KEY` is also honored.
    #[arg(long, global = true, env = "ARAG_EMBEDDING_API_KEY", hide_env_values = true)]
    pub embedding_api_key: Option<String>,

    /// API key for the chat completion endpoint.
    #[arg(long, global = true, env = "ARAG_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// The parsed subcommand and its options.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
#[command(about, long_about = None, color = clap::ColorChoice::Always)]
pub enum Commands {
    /// Write a default config file and prompt template.
    Init,

    /// Index a document, replacing the active one.
    #[clap(name = "ingest", alias = "upload")]
    Ingest {
        /// PDF or text file to index.
        path: PathBuf,
    },

    /// Ask one question about the active document.
    #[clap(name = "ask", alias = "a")]
    Ask { question: String },

    /// Chat about the active document until `exit`.
    #[clap(name = "interactive", alias = "i")]
    Interactive,

    /// Print the conversation about the active document.
    History,

    /// Print the effective configuration without secrets.
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_subcommands_and_aliases() {
        let cli = Cli::try_parse_from(["arag", "upload", "paper.pdf"]).unwrap();
        assert_eq!(
            cli.command,
            Commands::Ingest {
                path: PathBuf::from("paper.pdf")
            }
        );

        let cli = Cli::try_parse_from(["arag", "ask", "What is RAG?"]).unwrap();
        assert_eq!(
            cli.command,
            Commands::Ask {
                question: "What is RAG?".into()
            }
        );

        let cli = Cli::try_parse_from(["arag", "i"]).unwrap();
        assert_eq!(cli.command, Commands::Interactive);
    }

    #[test]
    fn global_config_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["arag", "history", "--config", "/tmp/c.yaml"]).unwrap();
        assert_eq!(cli.command, Commands::History);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.yaml")));
    }

    #[test]
    fn ask_requires_a_question() {
        assert!(Cli::try_parse_from(["arag", "ask"]).is_err());
        assert!(Cli::try_parse_from(["arag"]).is_err());
    }
}
