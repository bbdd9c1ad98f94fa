//! CLI command definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// LLMSwap - swap local models in and out of constrained providers
#[derive(Parser)]
#[command(name = "llmswap")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Configuration file path (yaml, toml or json)
    #[arg(short = 'c', long, global = true, env = "LLMSWAP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Plugin directory, overrides the configured one
    #[arg(short = 'p', long, global = true)]
    pub plugins_dir: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Show detected RAM/VRAM capacity
    Resources,

    /// List plugins discovered in the plugin directory
    Plugins,

    /// Load every discovered plugin and list the models they serve
    Models {
        /// Only this plugin
        #[arg(short, long)]
        plugin: Option<String>,
    },

    /// Make a model resident on a plugin
    Load {
        /// Plugin id
        plugin: String,

        /// Model id
        model: String,
    },

    /// Generate text with a model, swapping it in first if needed
    Generate {
        /// Plugin id
        plugin: String,

        /// Model id
        model: String,

        /// Prompt text
        prompt: String,

        /// System prompt
        #[arg(short, long)]
        system: Option<String>,

        /// Maximum tokens to generate
        #[arg(long)]
        max_tokens: Option<u32>,

        /// Sampling temperature
        #[arg(short, long)]
        temperature: Option<f32>,
    },
}
