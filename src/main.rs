use anyhow::{Context, Result};
use arxiv_collector::config::{find_config_file, load_settings, OutputMode};
use arxiv_collector::utils::{generate_key_pair, DEFAULT_KEY_BITS, MIN_KEY_BITS};
use arxiv_collector::Collector;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// arXiv Collector - Fetch recent computer-science papers and deliver them
#[derive(Parser, Debug)]
#[command(name = "arxiv-collector")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Fetch recent computer-science papers from arXiv and deliver them", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (can be used multiple times for more verbosity: -v, -vv)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Log output format
    #[arg(long, value_enum, global = true, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Show all environment variables
    #[arg(long)]
    env: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per event
    Json,
}

/// Output mode override
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Local,
    Api,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Collect papers for the configured window (default)
    Run(RunArgs),

    /// Generate an RSA key pair for request signing
    Keygen {
        /// Directory to write private_key.pem and public_key.pem into (prints to stdout if omitted)
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Key size in bits
        #[arg(long, default_value_t = DEFAULT_KEY_BITS, value_parser = parse_key_bits)]
        bits: usize,
    },
}

/// Overrides applied on top of file and environment settings
#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Output mode
    #[arg(long, value_enum)]
    mode: Option<Mode>,

    /// Directory for JSONL output in local mode
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Collect papers submitted in the last N hours
    #[arg(long)]
    fetch_hours: Option<u32>,
}

fn parse_key_bits(value: &str) -> Result<usize, String> {
    let bits: usize = value
        .parse()
        .map_err(|_| format!("`{value}` is not a number"))?;
    if bits < MIN_KEY_BITS {
        return Err(format!("key size must be at least {MIN_KEY_BITS} bits"));
    }
    Ok(bits)
}

fn print_env_vars() {
    println!("arXiv Collector - Environment Variables");
    println!();
    println!("Output:");
    println!("  ARXIV_OUTPUT_MODE           'local' or 'api' (default: local)");
    println!("  ARXIV_OUTPUT_DIR            Directory for JSONL files in local mode (default: ./output)");
    println!();
    println!("Remote API:");
    println!("  ARXIV_API_SERVICE_URL       Ingestion endpoint (required when mode is 'api')");
    println!("  ARXIV_ENABLE_AUTH           Send X-API-Key header ('true' or 'false')");
    println!("  ARXIV_API_KEY               API key (required when auth is enabled)");
    println!("  ARXIV_ENABLE_SIGNING        Send X-Signature header ('true' or 'false')");
    println!("  ARXIV_PRIVATE_KEY           PEM-encoded RSA private key");
    println!("  ARXIV_PRIVATE_KEY_PATH      Path to a PEM-encoded RSA private key");
    println!();
    println!("Collection:");
    println!("  ARXIV_FETCH_HOURS           Collect papers from the last N hours (default: 96)");
    println!("  ARXIV_REQUEST_DELAY_SECS    Pause between page requests (default: 3)");
    println!("  ARXIV_REQUEST_TIMEOUT_SECS  HTTP request timeout (default: 90)");
    println!("  ARXIV_SEARCH_URL            Search endpoint (default: http://export.arxiv.org/api/query)");
    println!();
    println!("Logging:");
    println!("  RUST_LOG                    Log filter, overrides -v/-q (e.g. arxiv_collector=debug)");
}

fn init_tracing(cli: &Cli) {
    // Initialize tracing based on verbosity
    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let env_filter = if cli.quiet { "error" } else { log_level };

    let registry = tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("arxiv_collector={}", env_filter)),
    ));

    match cli.log_format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

async fn run(config_path: Option<PathBuf>, args: RunArgs) -> Result<()> {
    let config_path = config_path.or_else(find_config_file);
    if let Some(path) = &config_path {
        info!("Using config file: {}", path.display());
    }

    let mut settings =
        load_settings(config_path.as_deref()).context("Failed to load configuration")?;

    if let Some(mode) = args.mode {
        settings.output_mode = match mode {
            Mode::Local => "local".to_string(),
            Mode::Api => "api".to_string(),
        };
    }
    if let Some(dir) = args.output_dir {
        settings.output_dir = dir;
    }
    if let Some(hours) = args.fetch_hours {
        settings.fetch_hours = hours;
    }

    let remote_settings_ignored = settings.enable_signing || settings.enable_auth;
    let config = settings.validate().context("Invalid configuration")?;
    if remote_settings_ignored && config.output.mode() == OutputMode::Local {
        warn!("Authentication and signing settings are ignored in local mode");
    }

    let mut collector = Collector::from_config(&config)?;
    info!(
        sink = collector.sink().name(),
        fetch_hours = config.fetch_hours,
        "Starting collection"
    );

    let summary = collector.collect().await?;
    info!(
        pages = summary.pages_fetched,
        delivered = summary.papers_delivered,
        "Done"
    );
    Ok(())
}

fn keygen(out_dir: Option<&Path>, bits: usize) -> Result<()> {
    let pair = generate_key_pair(bits)?;

    let Some(dir) = out_dir else {
        print!("{}", pair.private_pem);
        print!("{}", pair.public_pem);
        return Ok(());
    };

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let private_path = dir.join("private_key.pem");
    let public_path = dir.join("public_key.pem");

    write_private_key(&private_path, &pair.private_pem)
        .with_context(|| format!("Failed to write {}", private_path.display()))?;
    std::fs::write(&public_path, &pair.public_pem)
        .with_context(|| format!("Failed to write {}", public_path.display()))?;

    info!(
        private_key = %private_path.display(),
        public_key = %public_path.display(),
        "Generated signing key pair"
    );
    Ok(())
}

/// Create `path` readable by the owner only; an existing file is never replaced
fn write_private_key(path: &Path, pem: &str) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(pem.as_bytes())?;
    file.flush()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Show environment variables and exit if requested
    if cli.env {
        print_env_vars();
        return ExitCode::SUCCESS;
    }

    init_tracing(&cli);

    let result = match cli.command {
        Some(Commands::Keygen { out_dir, bits }) => keygen(out_dir.as_deref(), bits),
        Some(Commands::Run(args)) => run(cli.config, args).await,
        None => run(cli.config, RunArgs::default()).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Application error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
