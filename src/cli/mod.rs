//! Command-line interface for docsnap
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and validation
//! - Subcommands (version, completion, config)

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{Config, LogLevel};
use crate::connection::sanitize;
use crate::error::Result;
use crate::export::OutputOptions;

pub mod completion;

/// Extract database name from MongoDB connection URI
///
/// Format: mongodb://[username:password@]host[:port][/database][?options]
fn extract_database_from_uri(uri: &str) -> Option<String> {
    let after_scheme = uri.split("://").nth(1)?;
    let path_part = after_scheme.split('/').nth(1)?;
    let db_name = path_part.split('?').next().unwrap_or("");
    if db_name.is_empty() {
        None
    } else {
        Some(db_name.to_string())
    }
}

/// Snapshot a hierarchical document store as one JSON document
#[derive(Parser, Debug)]
#[command(
    name = "docsnap",
    version,
    about = "Export a hierarchical document store to JSON",
    long_about = "Walks every collection, document and nested sub-collection of a store
in parallel, under a global concurrency limit, and writes the whole tree as one JSON
document."
)]
pub struct CliArgs {
    /// MongoDB connection URI
    ///
    /// Format: mongodb://[username:password@]host[:port][/database][?options]
    #[arg(value_name = "URI")]
    pub uri: Option<String>,

    /// Database holding the collection tree
    #[arg(long, value_name = "NAME")]
    pub database: Option<String>,

    /// Maximum number of export tasks working against the store at once
    #[arg(short = 'j', long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Write the snapshot to FILE instead of stdout
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: Option<String>,

    /// Write single-line JSON
    #[arg(long)]
    pub compact: bool,

    /// Spaces per indentation level
    #[arg(long, value_name = "N")]
    pub indent: Option<usize>,

    /// Show a progress spinner on stderr
    #[arg(long)]
    pub progress: bool,

    /// Export an in-memory store described by a JSON file instead of MongoDB
    #[arg(long = "from-json", value_name = "FILE")]
    pub from_json: Option<PathBuf>,

    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Connection timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Quiet mode (errors only)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose mode (detailed logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Very verbose mode (trace logging)
    #[arg(long = "vv")]
    pub very_verbose: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Subcommands for docsnap
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show version information
    Version,

    /// Generate shell completion script
    Completion {
        /// Shell type (bash, zsh, fish)
        #[arg(value_name = "SHELL")]
        shell: String,
    },

    /// Show configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Validate configuration file
        #[arg(long)]
        validate: bool,
    },
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Loaded configuration
    config: Config,
}

impl CliInterface {
    /// Parse the process arguments and load the configuration
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse())
    }

    /// Build the interface from already parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let config = Self::load_config(&args)?;
        Ok(Self { args, config })
    }

    /// Load configuration from file and environment, then apply arguments
    fn load_config(args: &CliArgs) -> Result<Config> {
        Self::load_config_with(args, |name| std::env::var(name).ok())
    }

    /// [`CliInterface::load_config`] with environment variables read through
    /// `lookup`. A file that fails validation is replaced by the defaults,
    /// environment overrides still apply on top.
    fn load_config_with<F>(args: &CliArgs, lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::load_with(args.config_file.as_deref(), &lookup)?;

        if let Err(e) = config.validate() {
            eprintln!("Warning: Configuration validation failed: {}", e);
            eprintln!("Using default configuration instead.");
            config = Config::default();
            config.apply_env_from(&lookup)?;
        }

        Self::apply_args_to_config(&mut config, args);
        Ok(config)
    }

    /// Apply CLI arguments to configuration
    fn apply_args_to_config(config: &mut Config, args: &CliArgs) {
        Self::apply_store_args(config, args);
        Self::apply_export_args(config, args);
        Self::apply_logging_args(config, args);
    }

    /// Apply store-related CLI arguments to configuration
    ///
    /// Database priority: `--database`, then the database named in the URI
    /// argument, then the configured one.
    fn apply_store_args(config: &mut Config, args: &CliArgs) {
        if let Some(uri) = &args.uri {
            config.store.uri = uri.clone();
            if let Some(db) = extract_database_from_uri(uri) {
                config.store.database = db;
            }
        }
        if let Some(db) = &args.database {
            config.store.database = db.clone();
        }
        if let Some(timeout) = args.timeout {
            config.store.timeout = timeout;
        }
    }

    /// Apply export-related CLI arguments to configuration
    fn apply_export_args(config: &mut Config, args: &CliArgs) {
        if let Some(concurrency) = args.concurrency {
            config.export.max_concurrency = concurrency;
        }
        if let Some(indent) = args.indent {
            config.export.indent = indent;
        }
        if args.compact {
            config.export.pretty = false;
        }
        if args.progress {
            config.export.progress = true;
        }
    }

    /// Apply logging-related CLI arguments to configuration
    fn apply_logging_args(config: &mut Config, args: &CliArgs) {
        config.logging.level = if args.very_verbose {
            LogLevel::Trace
        } else if args.verbose {
            LogLevel::Debug
        } else if args.quiet {
            LogLevel::Error
        } else {
            config.logging.level
        };
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the CLI arguments
    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    /// How the snapshot should be rendered
    pub fn output_options(&self) -> OutputOptions {
        OutputOptions {
            pretty: self.config.export.pretty,
            indent: self.config.export.indent,
        }
    }

    /// Connection URI with the password hidden, for logs
    pub fn sanitized_uri(&self) -> String {
        sanitize(&self.config.store.uri)
    }

    /// Handle subcommands
    ///
    /// Returns `true` if a subcommand was handled and the process should
    /// exit, `false` to continue with the export.
    pub async fn handle_subcommand(&self) -> Result<bool> {
        match &self.args.command {
            Some(Commands::Version) => {
                self.show_version();
                Ok(true)
            }
            Some(Commands::Completion { shell }) => {
                completion::generate_completion(shell)?;
                Ok(true)
            }
            Some(Commands::Config { show, validate }) => {
                self.handle_config_command(*show, *validate)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Show version information
    fn show_version(&self) {
        println!("docsnap version {}", env!("CARGO_PKG_VERSION"));
        println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
    }

    /// Handle config subcommand
    fn handle_config_command(&self, show: bool, validate: bool) -> Result<()> {
        if validate {
            self.validate_config_file();
        }

        if show {
            self.show_config()?;
        }

        Ok(())
    }

    /// Validate configuration file
    fn validate_config_file(&self) {
        let path = self.get_config_path();
        println!("Validating configuration file: {}", path.display());

        if !path.exists() {
            println!("❌ Configuration file does not exist");
            return;
        }

        match Config::from_file(&path) {
            Ok(config) => match config.validate() {
                Ok(_) => println!("✅ Configuration is valid"),
                Err(e) => println!("❌ Configuration validation failed: {}", e),
            },
            Err(e) => println!("❌ Failed to load configuration: {}", e),
        }
    }

    /// Show effective configuration
    fn show_config(&self) -> Result<()> {
        let path = self.get_config_path();
        println!("# Configuration file: {}", path.display());
        println!();

        let mut shown = self.config.clone();
        shown.store.uri = self.sanitized_uri();
        println!("{}", shown.to_toml()?);
        Ok(())
    }

    /// Get configuration file path (from args or default)
    fn get_config_path(&self) -> PathBuf {
        self.args
            .config_file
            .clone()
            .unwrap_or_else(Config::default_path)
    }
}
