use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgAction, Parser, Subcommand};
use mediascout_core::config_file;
use mediascout_core::{
    Config, HttpTranslator, Number, PluginRegistry, PluginRunner, Processor, Searcher,
    TranslateProcessor, build_http_client, run_processors,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod output;

use output::ColorMode;

/// Media metadata lookup - resolve a media code or file name into structured metadata
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Look up metadata for a media code or file name
    Search {
        /// Media code (e.g. ABC-123) or a path to a video file
        input: String,

        /// Plugin to try, in order (repeatable; overrides the config file)
        #[arg(long = "plugin")]
        plugins: Vec<String>,

        /// Comma-separated list of plugins to disable
        #[arg(long, value_delimiter = ',')]
        disable: Vec<String>,

        /// Request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Print the record as JSON
        #[arg(long)]
        json: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,

        /// Translate the title of the found record
        #[arg(long)]
        translate_title: bool,

        /// Translate the plot of the found record
        #[arg(long)]
        translate_plot: bool,

        /// Download the cover image of the found record to this path
        #[arg(long)]
        save_cover: Option<PathBuf>,
    },

    /// List available plugins
    Plugins,

    /// Write the effective configuration to the platform config file
    InitConfig,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Plugins => list_plugins(),
        Command::InitConfig => init_config(),
        Command::Search {
            input,
            plugins,
            disable,
            timeout,
            json,
            no_color,
            translate_title,
            translate_plot,
            save_cover,
        } => {
            // Resolve configuration: CLI flags > env vars > config file > defaults
            let mut config = Config::default();
            config_file::load_config().apply_to(&mut config);
            if let Some(secs) = std::env::var("MEDIASCOUT_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
            {
                config.timeout_secs = secs;
            }
            if !plugins.is_empty() {
                config.plugins = plugins;
            }
            config.disabled_plugins.extend(disable);
            if let Some(secs) = timeout {
                config.timeout_secs = secs;
            }
            config.translate.enable_title_translate |= translate_title;
            config.translate.enable_plot_translate |= translate_plot;

            let opts = SearchOptions {
                json,
                color: ColorMode(!no_color && !json),
                save_cover,
            };
            search(&input, &config, &opts).await
        }
    }
}

fn list_plugins() -> anyhow::Result<()> {
    let registry = PluginRegistry::with_builtin();
    let mut stdout = std::io::stdout();
    for name in registry.names() {
        writeln!(stdout, "{name}")?;
    }
    Ok(())
}

fn init_config() -> anyhow::Result<()> {
    let mut config = Config::default();
    config_file::load_config().apply_to(&mut config);
    let path = config_file::save_config(&config_file::ConfigFile::from(&config))?;
    println!("Wrote {}", path.display());
    Ok(())
}

struct SearchOptions {
    json: bool,
    color: ColorMode,
    save_cover: Option<PathBuf>,
}

async fn search(input: &str, config: &Config, opts: &SearchOptions) -> anyhow::Result<()> {
    let color = opts.color;
    let number = Number::parse(input)?;
    tracing::info!(input, number = %number, "resolved identifier");

    let client = build_http_client(config)?;
    let runner = PluginRunner::from_client(client.clone(), config.timeout());
    let registry = PluginRegistry::with_builtin();
    let searcher = Searcher::from_config(&registry, config, runner)?;
    if searcher.plugin_names().is_empty() {
        anyhow::bail!("No plugins enabled. Check --plugin/--disable and the config file.");
    }

    let cancel = CancellationToken::new();

    // Set up Ctrl+C handler
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_clone.cancel();
        }
    });

    let report = searcher.search(&number, &cancel).await;

    let mut stderr = std::io::stderr();
    output::print_attempts(&mut stderr, &report.attempts, color)?;

    let (Some(mut meta), Some(source)) = (report.meta, report.source) else {
        if cancel.is_cancelled() {
            anyhow::bail!("Search for {number} cancelled");
        }
        anyhow::bail!("No metadata found for {number}");
    };

    meta.ext_info.translate_info.option = config.translate;
    if config.translate.any_enabled() {
        match &config.translate_endpoint {
            Some(endpoint) => {
                let mut translator = HttpTranslator::new(client, endpoint.clone())
                    .with_timeout(config.timeout());
                if let Some(key) = &config.translate_api_key {
                    translator = translator.with_api_key(key.clone());
                }
                let processors: Vec<Arc<dyn Processor>> = vec![Arc::new(
                    TranslateProcessor::new(Arc::new(translator)).with_languages(
                        config.translate_source_lang.clone(),
                        config.translate_target_lang.clone(),
                    ),
                )];
                run_processors(&processors, &mut meta).await;
            }
            None => {
                tracing::warn!("translation enabled but no [translate] endpoint configured");
            }
        }
    }

    if let Some(path) = &opts.save_cover {
        match &meta.cover {
            Some(cover) => {
                let bytes = searcher.fetch_media(&source, &cover.name, &cancel).await?;
                std::fs::write(path, &bytes)?;
                tracing::info!(path = %path.display(), bytes = bytes.len(), "saved cover");
            }
            None => tracing::warn!(number = %number, "record has no cover to save"),
        }
    }

    let mut stdout = std::io::stdout();
    if opts.json {
        writeln!(stdout, "{}", serde_json::to_string_pretty(&meta)?)?;
    } else {
        output::print_record(&mut stdout, &meta, color)?;
    }
    Ok(())
}
