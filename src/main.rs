mod cli;
mod config;
mod download;
mod install;
mod path_update;
mod platform;
mod types;


use anyhow::{anyhow, Context, Result};
use clap::Parser;
use cli::{Cli, Commands, ConfigAction, ConfigFormat};
use config::{get_home_dir, load_settings};
use console::style;
use indicatif::ProgressBar;
use install::github::{spawn_release_listing, GitHubReleases};
use install::Installer;
use path_update::{PathEntryStatus, PathTarget};
use platform::{select_platform_asset, Platform};
use std::time::Duration;
use types::{InstallOutcome, ReleaseList};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli)?;

    match cli.command {
        Commands::Version => {
            println!("commitify-installer v{}", env!("CARGO_PKG_VERSION"));
        }

        Commands::Config { action } => match action {
            ConfigAction::Show { format } => {
                let settings = load_settings()?;
                let rendered = match format {
                    ConfigFormat::Json => serde_json::to_string_pretty(&settings)?,
                    ConfigFormat::Yaml => serde_yaml::to_string(&settings)?,
                };
                println!("{}", rendered.trim_end());
            }
        },

        Commands::Status => {
            let installer = build_installer()?;
            let path = installer.binary_path();
            if installer.is_installed() {
                println!("Commitify is installed at {}", path.display());
            } else {
                println!("Commitify is not installed (expected at {})", path.display());
            }
        }

        Commands::List => {
            let releases = fetch_release_list(GitHubReleases::new(&load_settings()?)?).await?;
            if releases.tags.is_empty() {
                println!("No releases published yet.");
            }
            for tag in &releases.tags {
                if releases.latest.as_ref() == Some(tag) {
                    println!("  {} {}", tag, style("(latest)").green());
                } else {
                    println!("  {}", tag);
                }
            }
        }

        Commands::Assets { tag } => {
            let client = GitHubReleases::new(&load_settings()?)?;
            let platform = current_platform()?;
            let assets = client.get_release(&tag).await?;
            let selected = select_platform_asset(&assets, platform);
            let keywords = platform.policy().keywords().join(", ");

            println!("--- Assets in {} ---", tag);
            for asset in &assets {
                let marker = if selected == Some(asset) { "*" } else { " " };
                println!("{} {}", marker, asset.name);
            }
            match selected {
                Some(asset) => println!("Selected for {}: {}", platform, asset.name),
                None => println!("No compatible binary for {} (looked for: {})", platform, keywords),
            }
        }

        Commands::Install { tag } => {
            let installer = build_installer()?;
            let tag = match tag {
                Some(tag) => tag,
                None => fetch_release_list(GitHubReleases::new(&load_settings()?)?)
                    .await?
                    .latest
                    .ok_or_else(|| anyhow!("No releases available to install"))?,
            };

            match installer.install_or_update(&tag).await {
                Ok(outcome) => report_outcome(&outcome),
                Err(e) => {
                    tracing::debug!("Install error: {:?}", e);
                    eprintln!("{} {}", style("Installation failed:").red().bold(), e);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

fn setup_logging(cli: &Cli) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level()));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("Could not initialise logging: {}", e))
}

fn current_platform() -> Result<Platform> {
    Platform::current()
        .ok_or_else(|| anyhow!("Unsupported operating system: {}", std::env::consts::OS))
}

fn build_installer() -> Result<Installer<GitHubReleases>> {
    let settings = load_settings()?;
    let client = GitHubReleases::new(&settings).context("Could not create HTTP client")?;
    let platform = current_platform()?;
    Ok(Installer::new(client, platform.policy(), get_home_dir()?))
}

async fn fetch_release_list(client: GitHubReleases) -> Result<ReleaseList> {
    let repo = client.repo().to_string();
    let pending = spawn_release_listing(client);

    let spinner = ProgressBar::new_spinner();
    spinner.set_message(format!("Fetching releases of {}", repo));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = pending.await;
    spinner.finish_and_clear();

    result
        .context("Release listing task ended without a result")?
        .with_context(|| format!("Failed to fetch releases of {}", repo))
}

fn report_outcome(outcome: &InstallOutcome) {
    println!(
        "{} Commitify {} {} from {} ({} bytes)",
        style("✓").green(),
        outcome.tag,
        outcome.action,
        outcome.asset.name,
        outcome.bytes_written
    );
    println!("    Path: {}", outcome.binary_path.display());

    for update in &outcome.path_update.updates {
        if let (PathTarget::ShellProfile(path), PathEntryStatus::Appended) =
            (&update.target, &update.status)
        {
            println!("    Added PATH entry to {}", path.display());
        }
    }

    match outcome.path_update.clone().into_result() {
        Err(e) => {
            eprintln!("{} {}", style("Warning:").yellow().bold(), e);
            eprintln!(
                "Commitify is installed, but you may need to add {} to your PATH manually.",
                parent_display(outcome)
            );
        }
        Ok(report) if !report.is_effective() => {
            eprintln!(
                "{} No shell profile was found; add {} to your PATH manually.",
                style("Warning:").yellow().bold(),
                parent_display(outcome)
            );
        }
        Ok(_) => {
            println!("You may need to restart your terminal to use commitify.");
        }
    }
}

fn parent_display(outcome: &InstallOutcome) -> String {
    outcome
        .binary_path
        .parent()
        .map(|p| p.display().to_string())
        .unwrap_or_default()
}
