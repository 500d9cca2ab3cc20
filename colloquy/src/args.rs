use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Colloquy console chat
#[derive(Debug, Parser)]
#[command(name = "colloquy", about = "Chat with OpenAI or Azure OpenAI from the terminal")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "colloquy.toml", env = "COLLOQUY_CONFIG")]
    pub config: PathBuf,

    /// Print answers as they are generated
    #[arg(short, long, env = "COLLOQUY_STREAM")]
    pub stream: bool,

    /// System message for the conversation
    #[arg(long, env = "COLLOQUY_SYSTEM")]
    pub system: Option<String>,

    /// Model or deployment, overrides `default_model`
    #[arg(short, long, env = "COLLOQUY_MODEL")]
    pub model: Option<String>,

    /// Log filter directives
    #[arg(long, default_value = "info", env = "COLLOQUY_LOG")]
    pub log_filter: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}
