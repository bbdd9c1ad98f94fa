//! LLMSwap CLI - inspect plugins, load models and run generations

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_command_async(cli))
}

async fn run_command_async(cli: Cli) -> anyhow::Result<()> {
    let config = commands::load_config(cli.config.as_deref(), cli.plugins_dir.as_deref())?;
    let manager = commands::build_manager(&config).await;

    let result = match cli.command {
        Commands::Resources => commands::resources(&manager, cli.json),
        Commands::Plugins => commands::plugins(&manager, cli.json),
        Commands::Models { plugin } => {
            commands::models(&manager, &config, plugin.as_deref(), cli.json).await
        }
        Commands::Load { plugin, model } => {
            commands::load(&manager, &config, &plugin, &model).await
        }
        Commands::Generate {
            plugin,
            model,
            prompt,
            system,
            max_tokens,
            temperature,
        } => {
            let mut options = llmswap_kernel::GenerateOptions::new();
            options.system = system;
            options.max_tokens = max_tokens;
            options.temperature = temperature;
            commands::generate(&manager, &config, &plugin, &model, &prompt, &options, cli.json)
                .await
        }
    };

    manager.shutdown().await;
    result
}
