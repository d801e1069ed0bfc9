use clap::{Parser, Subcommand, ValueEnum};

fn get_version() -> &'static str {
    const BASE_VERSION: &str = env!("CARGO_PKG_VERSION");

    if let Some(tag) = option_env!("COMMITIFY_INSTALLER_GIT_TAG") {
        return tag;
    }

    let commit = option_env!("COMMITIFY_INSTALLER_GIT_COMMIT").unwrap_or("unknown");
    let branch = option_env!("COMMITIFY_INSTALLER_GIT_BRANCH").unwrap_or("unknown");

    // Built once at startup, so leaking it is fine
    let version = format!("v{}-{} ({})", BASE_VERSION, commit, branch);
    Box::leak(version.into_boxed_str())
}

#[derive(Parser)]
#[command(name = "commitify-installer")]
#[command(about = "Install or update the Commitify CLI from GitHub Releases")]
#[command(version = get_version(), propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (use multiple times for more detail)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Reduce output to errors only
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Default tracing filter for the `-q`/`-v` flags; `RUST_LOG` overrides it.
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// List available Commitify releases
    List,

    /// Install Commitify, or update an existing install
    #[command(after_help = "Examples:\n  commitify-installer install\n  commitify-installer install v1.2.0")]
    Install {
        /// Release tag to install (defaults to the most recent release)
        tag: Option<String>,
    },

    /// Show the assets of a release and which one matches this platform
    Assets {
        /// Release tag (e.g., 'v1.2.0')
        tag: String,
    },

    /// Show whether Commitify is installed
    Status,

    /// Inspect the installer configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show the current version
    Version,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show {
        /// Output format
        #[arg(long, value_enum, default_value_t = ConfigFormat::Json)]
        format: ConfigFormat,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ConfigFormat {
    Json,
    Yaml,
}
