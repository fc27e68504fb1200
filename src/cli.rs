//! Command-line argument parsing
//!
//! Supports:
//! - Dumping the tokens of a file line by line
//! - Printing a file with theme colours
//! - Formatting a file, or checking that formatting is stable
//! - Listing available themes

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::formatter::FormatConfig;

/// TextMate highlighting and formatting for the terminal
#[derive(Parser, Debug)]
#[command(name = "tmbridge", version, about = "TextMate highlighting bridge")]
pub struct CliArgs {
    /// Config file (defaults to ~/.config/tmbridge/config.yaml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Theme name, overriding the configured one
    #[arg(long, global = true, value_name = "NAME")]
    pub theme: Option<String>,

    /// Language id, overriding detection by file extension
    #[arg(long, global = true, value_name = "ID")]
    pub language: Option<String>,

    /// Grammar file to use instead of the language's own grammar
    #[arg(long, global = true, value_name = "FILE")]
    pub grammar: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print every token: column, display scope and full scope stack
    Tokens {
        file: PathBuf,
    },

    /// Print the file with 24-bit terminal colours
    Highlight {
        file: PathBuf,
    },

    /// Format the file and print the result
    Format {
        file: PathBuf,

        #[arg(long, value_name = "N")]
        max_width: Option<usize>,

        #[arg(long, value_name = "N")]
        tab_spaces: Option<usize>,

        /// Only check that a second formatting pass changes nothing
        #[arg(long)]
        check: bool,
    },

    /// List available themes
    Themes,
}

impl Command {
    /// Apply command-line overrides to the configured format options
    pub fn format_config(&self, base: FormatConfig) -> FormatConfig {
        match self {
            Command::Format {
                max_width,
                tab_spaces,
                ..
            } => {
                let mut config = base;
                if let Some(width) = max_width {
                    config = config.with_max_width(*width);
                }
                if let Some(spaces) = tab_spaces {
                    config = config.with_tab_spaces(*spaces);
                }
                config
            }
            _ => base,
        }
    }

    /// Input file, if the command has one
    pub fn file(&self) -> Option<&PathBuf> {
        match self {
            Command::Tokens { file } | Command::Highlight { file } | Command::Format { file, .. } => {
                Some(file)
            }
            Command::Themes => None,
        }
    }
}
