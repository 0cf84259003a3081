mod cli;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use confstore_core::EngineConfig;
use log::{debug, error};

/// confstore: inspect and maintain configuration storages
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// Engine configuration file (.json, .toml or .yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the absolute path of an application file spec
    Expand {
        /// File spec, e.g. `options/editor.xml` or `$APP_CONFIG$/editor.xml`
        spec: String,
    },
    /// Print the normalized file spec of an absolute path
    Collapse {
        path: String,
    },
    /// List the components stored in a storage file, or print one state
    Show {
        file: PathBuf,
        /// Print the state of this component
        #[arg(long)]
        component: Option<String>,
    },
    /// Print a binary cache file as XML
    CacheDump {
        file: PathBuf,
    },
    /// Encode an XML document into a binary cache file
    CacheEncode {
        xml: PathBuf,
        output: PathBuf,
    },
    /// List the schemes found in a scheme directory
    Schemes {
        dir: PathBuf,
        /// Preferred scheme file extension
        #[arg(long)]
        extension: Option<String>,
    },
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    let env = env_logger::Env::default().default_filter_or(default_filter);
    if let Err(e) = env_logger::Builder::from_env(env).try_init() {
        eprintln!("Failed to initialize logging: {}", e);
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();
    init_logging(args.verbose);

    let config = match &args.config {
        Some(path) => match EngineConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!("Cannot load configuration {}: {}", path.display(), e);
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => EngineConfig::default(),
    };
    debug!("Using config directory {}", config.config_dir.display());

    let outcome = match args.command {
        Commands::Expand { spec } => cli::expand(&config, &spec),
        Commands::Collapse { path } => cli::collapse(&config, &path),
        Commands::Show { file, component } => cli::show(&file, component.as_deref()).await,
        Commands::CacheDump { file } => cli::cache_dump(&file).await,
        Commands::CacheEncode { xml, output } => cli::cache_encode(&xml, &output).await,
        Commands::Schemes { dir, extension } => {
            let extension = extension.unwrap_or_else(|| config.scheme_extension.clone());
            cli::schemes(&dir, &extension)
        }
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
