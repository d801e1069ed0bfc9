//! Idempotent PATH updates.
//!
//! POSIX hosts get an export line appended to each existing shell profile.
//! Windows hosts get the install directory appended to the per-user `Path`
//! registry value. Every target reports its own status so that a failure on
//! one shell does not hide what happened on the others.

use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SHELL_PROFILES: [&str; 3] = [".zshrc", ".bashrc", ".bash_profile"];
pub const PATH_EXPORT_LINE: &str = r#"export PATH="$HOME/bin:$PATH""#;
pub const WINDOWS_PATH_SEPARATOR: char = ';';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathTarget {
    ShellProfile(PathBuf),
    Registry,
}

impl fmt::Display for PathTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathTarget::ShellProfile(path) => write!(f, "{}", path.display()),
            PathTarget::Registry => write!(f, r"HKEY_CURRENT_USER\Environment\Path"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathEntryStatus {
    Appended,
    AlreadyPresent,
    /// Profile file does not exist; it is never created.
    Missing,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathUpdate {
    pub target: PathTarget,
    pub status: PathEntryStatus,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("PATH update failed for {}", .failures.join(", "))]
pub struct PathUpdateFailed {
    pub failures: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathUpdateReport {
    pub updates: Vec<PathUpdate>,
}

impl PathUpdateReport {
    pub fn push(&mut self, target: PathTarget, status: PathEntryStatus) {
        self.updates.push(PathUpdate { target, status });
    }

    /// True when at least one target now carries the entry.
    pub fn is_effective(&self) -> bool {
        self.updates.iter().any(|u| {
            matches!(
                u.status,
                PathEntryStatus::Appended | PathEntryStatus::AlreadyPresent
            )
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = (&PathTarget, &str)> {
        self.updates.iter().filter_map(|u| match &u.status {
            PathEntryStatus::Failed(reason) => Some((&u.target, reason.as_str())),
            _ => None,
        })
    }

    pub fn into_result(self) -> Result<Self, PathUpdateFailed> {
        let failures: Vec<String> = self
            .failures()
            .map(|(target, reason)| format!("{} ({})", target, reason))
            .collect();
        if failures.is_empty() {
            Ok(self)
        } else {
            Err(PathUpdateFailed { failures })
        }
    }
}

/// Appends `line` to every existing profile under `home` that does not
/// already contain it.
pub fn update_shell_profiles(home: &Path, profiles: &[&str], line: &str) -> PathUpdateReport {
    let mut report = PathUpdateReport::default();

    for profile in profiles {
        let path = home.join(profile);
        let status = match append_line_once(&path, line) {
            Ok(true) => {
                tracing::info!("Added PATH entry to {}", path.display());
                PathEntryStatus::Appended
            }
            Ok(false) => {
                tracing::debug!("{} already exports the install directory", path.display());
                PathEntryStatus::AlreadyPresent
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("Skipping missing profile {}", path.display());
                PathEntryStatus::Missing
            }
            Err(e) => {
                tracing::warn!("Could not update {}: {}", path.display(), e);
                PathEntryStatus::Failed(e.to_string())
            }
        };
        report.push(PathTarget::ShellProfile(path), status);
    }

    report
}

fn append_line_once(path: &Path, line: &str) -> io::Result<bool> {
    let mut file = OpenOptions::new().read(true).append(true).open(path)?;

    let mut content = String::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_string(&mut content)?;

    if content.contains(line) {
        return Ok(false);
    }

    file.write_all(format!("\n{}\n", line).as_bytes())?;
    Ok(true)
}

/// Returns the new PATH value, or `None` when `dir` is already present.
///
/// The presence check is a case-insensitive substring match.
pub fn merge_windows_path(current: &str, dir: &str) -> Option<String> {
    if current.to_lowercase().contains(&dir.to_lowercase()) {
        return None;
    }

    let trimmed = current.trim_end_matches(WINDOWS_PATH_SEPARATOR);
    if trimmed.trim().is_empty() {
        Some(dir.to_string())
    } else {
        Some(format!("{}{}{}", trimmed, WINDOWS_PATH_SEPARATOR, dir))
    }
}

/// Storage for the per-user PATH value.
pub trait EnvironmentStore: Send + Sync {
    /// `Ok(None)` when the value does not exist yet.
    fn read_path(&self) -> io::Result<Option<String>>;
    fn write_path(&self, value: &str) -> io::Result<()>;
}

pub fn update_user_path<E: EnvironmentStore + ?Sized>(store: &E, dir: &Path) -> PathUpdateReport {
    let mut report = PathUpdateReport::default();
    let dir = dir.to_string_lossy();

    let status = match store.read_path() {
        Ok(current) => match merge_windows_path(current.as_deref().unwrap_or(""), &dir) {
            None => PathEntryStatus::AlreadyPresent,
            Some(updated) => match store.write_path(&updated) {
                Ok(()) => {
                    tracing::info!("Added {} to the user PATH", dir);
                    PathEntryStatus::Appended
                }
                Err(e) => PathEntryStatus::Failed(format!("write: {}", e)),
            },
        },
        Err(e) => PathEntryStatus::Failed(format!("read: {}", e)),
    };

    if let PathEntryStatus::Failed(reason) = &status {
        tracing::warn!("Could not update the user PATH: {}", reason);
    }
    report.push(PathTarget::Registry, status);
    report
}

/// `HKEY_CURRENT_USER\Environment\Path`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegistryEnvironment;

#[cfg(windows)]
impl RegistryEnvironment {
    const VALUE_NAME: &'static str = "Path";

    fn open(access: u32) -> io::Result<winreg::RegKey> {
        winreg::RegKey::predef(winreg::enums::HKEY_CURRENT_USER)
            .open_subkey_with_flags("Environment", access)
    }

    fn encode(value: &str) -> Vec<u8> {
        value
            .encode_utf16()
            .chain(std::iter::once(0))
            .flat_map(|unit| unit.to_le_bytes())
            .collect()
    }
}

#[cfg(windows)]
impl EnvironmentStore for RegistryEnvironment {
    fn read_path(&self) -> io::Result<Option<String>> {
        use winreg::types::FromRegValue;

        let key = Self::open(winreg::enums::KEY_READ)?;
        match key.get_raw_value(Self::VALUE_NAME) {
            Ok(raw) => Ok(Some(String::from_reg_value(&raw)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write_path(&self, value: &str) -> io::Result<()> {
        use winreg::enums::{RegType, KEY_READ, KEY_WRITE};

        let key = Self::open(KEY_READ | KEY_WRITE)?;
        // Keep REG_SZ if that is what the user already has, otherwise expandable
        let vtype = match key.get_raw_value(Self::VALUE_NAME) {
            Ok(raw) if matches!(raw.vtype, RegType::REG_SZ) => RegType::REG_SZ,
            _ => RegType::REG_EXPAND_SZ,
        };
        let raw = winreg::RegValue {
            bytes: Self::encode(value),
            vtype,
        };
        key.set_raw_value(Self::VALUE_NAME, &raw)
    }
}

#[cfg(not(windows))]
impl EnvironmentStore for RegistryEnvironment {
    fn read_path(&self) -> io::Result<Option<String>> {
        Err(io::Error::new(
            ErrorKind::Unsupported,
            "the Windows registry is not available on this host",
        ))
    }

    fn write_path(&self, _value: &str) -> io::Result<()> {
        Err(io::Error::new(
            ErrorKind::Unsupported,
            "the Windows registry is not available on this host",
        ))
    }
}
