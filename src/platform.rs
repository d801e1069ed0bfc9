use crate::path_update::{
    update_shell_profiles, update_user_path, EnvironmentStore, PathUpdateReport,
    RegistryEnvironment, PATH_EXPORT_LINE, SHELL_PROFILES,
};
use crate::types::Asset;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

pub const BINARY_NAME: &str = "commitify";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Darwin,
    Linux,
    Windows,
}

impl Platform {
    pub fn current() -> Option<Self> {
        Self::from_os(std::env::consts::OS)
    }

    pub fn from_os(os: &str) -> Option<Self> {
        match os {
            "macos" | "darwin" => Some(Platform::Darwin),
            "linux" => Some(Platform::Linux),
            "windows" => Some(Platform::Windows),
            _ => None,
        }
    }

    /// Asset name keywords, tried in this order.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Platform::Darwin => &["darwin", "macos"],
            Platform::Linux => &["linux", "ubuntu", "debian"],
            Platform::Windows => &["windows", "win", ".exe"],
        }
    }

    pub fn policy(&self) -> Box<dyn PlatformPolicy> {
        match self {
            Platform::Darwin => Box::new(DarwinPolicy),
            Platform::Linux => Box::new(LinuxPolicy),
            Platform::Windows => Box::new(WindowsPolicy::new(RegistryEnvironment)),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Darwin => write!(f, "darwin"),
            Platform::Linux => write!(f, "linux"),
            Platform::Windows => write!(f, "windows"),
        }
    }
}

/// First asset, in release order, whose lowercased name contains any of the
/// platform keywords.
pub fn select_platform_asset(assets: &[Asset], platform: Platform) -> Option<&Asset> {
    let keywords = platform.keywords();
    tracing::trace!("Looking for assets matching {}: {:?}", platform, keywords);

    let found = assets.iter().find(|asset| {
        let name_lower = asset.name.to_lowercase();
        keywords.iter().any(|keyword| name_lower.contains(keyword))
    });

    match found {
        Some(asset) => tracing::info!("Found asset for {}: '{}'", platform, asset.name),
        None => tracing::debug!("No asset among {} matches {}", assets.len(), platform),
    }
    found
}

/// Everything that differs between the supported operating systems.
pub trait PlatformPolicy: Send + Sync {
    fn platform(&self) -> Platform;

    fn keywords(&self) -> &'static [&'static str] {
        self.platform().keywords()
    }

    fn install_dir(&self, home: &Path) -> PathBuf;

    fn binary_name(&self) -> &'static str;

    fn install_path(&self, home: &Path) -> PathBuf {
        self.install_dir(home).join(self.binary_name())
    }

    fn apply_executable_bit(&self, path: &Path) -> io::Result<()>;

    fn is_executable(&self, path: &Path) -> bool;

    fn ensure_path_entry(&self, home: &Path, dir: &Path) -> PathUpdateReport;
}

fn posix_install_dir(home: &Path) -> PathBuf {
    home.join("bin")
}

#[cfg(unix)]
fn posix_set_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn posix_set_executable(path: &Path) -> io::Result<()> {
    // No mode bits to set; the file only has to exist
    std::fs::metadata(path).map(|_| ())
}

#[cfg(unix)]
fn posix_is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn posix_is_executable(path: &Path) -> bool {
    path.is_file()
}

fn posix_ensure_path_entry(home: &Path, dir: &Path) -> PathUpdateReport {
    tracing::debug!("Ensuring {} is on PATH via shell profiles", dir.display());
    update_shell_profiles(home, &SHELL_PROFILES, PATH_EXPORT_LINE)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DarwinPolicy;

impl PlatformPolicy for DarwinPolicy {
    fn platform(&self) -> Platform {
        Platform::Darwin
    }

    fn install_dir(&self, home: &Path) -> PathBuf {
        posix_install_dir(home)
    }

    fn binary_name(&self) -> &'static str {
        BINARY_NAME
    }

    fn apply_executable_bit(&self, path: &Path) -> io::Result<()> {
        posix_set_executable(path)
    }

    fn is_executable(&self, path: &Path) -> bool {
        posix_is_executable(path)
    }

    fn ensure_path_entry(&self, home: &Path, dir: &Path) -> PathUpdateReport {
        posix_ensure_path_entry(home, dir)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxPolicy;

impl PlatformPolicy for LinuxPolicy {
    fn platform(&self) -> Platform {
        Platform::Linux
    }

    fn install_dir(&self, home: &Path) -> PathBuf {
        posix_install_dir(home)
    }

    fn binary_name(&self) -> &'static str {
        BINARY_NAME
    }

    fn apply_executable_bit(&self, path: &Path) -> io::Result<()> {
        posix_set_executable(path)
    }

    fn is_executable(&self, path: &Path) -> bool {
        posix_is_executable(path)
    }

    fn ensure_path_entry(&self, home: &Path, dir: &Path) -> PathUpdateReport {
        posix_ensure_path_entry(home, dir)
    }
}

pub struct WindowsPolicy<E> {
    environment: E,
}

impl<E: EnvironmentStore> WindowsPolicy<E> {
    pub fn new(environment: E) -> Self {
        Self { environment }
    }
}

impl<E: EnvironmentStore> PlatformPolicy for WindowsPolicy<E> {
    fn platform(&self) -> Platform {
        Platform::Windows
    }

    fn install_dir(&self, home: &Path) -> PathBuf {
        home.join("CommitifyBin")
    }

    fn binary_name(&self) -> &'static str {
        "commitify.exe"
    }

    fn apply_executable_bit(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }

    fn is_executable(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn ensure_path_entry(&self, _home: &Path, dir: &Path) -> PathUpdateReport {
        update_user_path(&self.environment, dir)
    }
}
