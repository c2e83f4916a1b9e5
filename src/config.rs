//! Per-user configuration.
//!
//! The configuration directory (`~/.config/dupsort` on Linux) holds:
//!
//! - `excludes.conf` - the exclusion list, one substring per line. Required.
//! - `settings.toml` - optional defaults for the tunables in [`Settings`].
//!
//! Settings are layered with figment: built-in defaults, then
//! `settings.toml`, then `DUPSORT_*` environment variables. CLI flags are
//! applied on top by the caller.
//!
//! On first run the directory does not exist yet. [`ConfigPaths::bootstrap`]
//! creates it and installs the exclusion list template, after which the
//! program stops so the user can review the list before scanning.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::duplicates::screen::DEFAULT_IO_THREADS;
use crate::scanner::{ExcludeError, ExclusionList};
use crate::staging::sort::DEFAULT_SORT_BUFFER;

/// Name of the exclusion list file.
pub const EXCLUDES_FILE: &str = "excludes.conf";

/// Name of the optional settings file.
pub const SETTINGS_FILE: &str = "settings.toml";

/// Prefix of environment variables overriding settings.
pub const ENV_PREFIX: &str = "DUPSORT_";

/// System-wide locations searched for the exclusion list template.
pub const SHARE_DIRS: &[&str] = &["/usr/local/share/dupsort", "/usr/share/dupsort"];

const SETTINGS_KEYS: &[&str] = &[
    "io_threads",
    "sort_buffer_bytes",
    "work_dir",
    "keep_workfiles",
];

/// Template installed when no system copy is found.
const DEFAULT_EXCLUDES: &str = include_str!("../share/excludes.conf");

/// Errors raised while locating or loading configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// No home directory to put the configuration in.
    #[error("Cannot determine the configuration directory; use --config-dir")]
    NoConfigDir,

    /// The configuration directory or template could not be written.
    #[error("Cannot install configuration in {path}: {source}")]
    Install {
        /// Path being written
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The exclusion list is missing after bootstrap.
    #[error("Exclusion list {0} is missing; remove the directory to reinstall the default")]
    MissingExclusions(PathBuf),

    /// The exclusion list could not be read.
    #[error("Cannot read exclusion list {path}: {source}")]
    ReadExclusions {
        /// Path of the exclusion list
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The exclusion list could not be compiled.
    #[error(transparent)]
    Exclusions(#[from] ExcludeError),

    /// `settings.toml` or the environment held an invalid value.
    #[error("Invalid settings: {0}")]
    Settings(#[from] Box<figment::Error>),
}

/// Tunables that can come from `settings.toml` or the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Worker threads for comparing and hashing.
    pub io_threads: usize,
    /// Memory bound for each external sort, in bytes.
    pub sort_buffer_bytes: usize,
    /// Base directory for work files.
    pub work_dir: Option<PathBuf>,
    /// Keep work files after the run.
    pub keep_workfiles: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            io_threads: DEFAULT_IO_THREADS,
            sort_buffer_bytes: DEFAULT_SORT_BUFFER,
            work_dir: None,
            keep_workfiles: false,
        }
    }
}

impl Settings {
    /// Layered provider: defaults < `settings.toml` < `DUPSORT_*`.
    #[must_use]
    pub fn figment(config_dir: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(config_dir.join(SETTINGS_FILE)))
            .merge(Env::prefixed(ENV_PREFIX).only(SETTINGS_KEYS))
    }

    /// Load settings for a configuration directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Settings`] if a layer holds an invalid value.
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let settings: Self = Self::figment(config_dir).extract().map_err(Box::new)?;
        log::debug!("Settings: {:?}", settings);
        Ok(settings)
    }
}

/// Result of [`ConfigPaths::bootstrap`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bootstrap {
    /// The directory already existed; scanning can proceed.
    Ready,
    /// The directory was created and the template installed at this path.
    Installed(PathBuf),
}

/// Location of the per-user configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    config_dir: PathBuf,
}

impl ConfigPaths {
    /// Use `dir` if given, else the platform configuration directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoConfigDir`] if there is no home directory.
    pub fn resolve(dir: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config_dir = match dir {
            Some(dir) => dir,
            None => ProjectDirs::from("", "", "dupsort")
                .ok_or(ConfigError::NoConfigDir)?
                .config_dir()
                .to_path_buf(),
        };
        Ok(Self { config_dir })
    }

    /// The configuration directory.
    #[must_use]
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Path of the exclusion list.
    #[must_use]
    pub fn excludes_path(&self) -> PathBuf {
        self.config_dir.join(EXCLUDES_FILE)
    }

    /// Install the exclusion list template if the directory is absent.
    ///
    /// Searches `$DUPSORT_SHARE_DIR` and then [`SHARE_DIRS`] for the
    /// template, falling back to the copy built into the binary.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Install`] if the directory or file cannot be
    /// created.
    pub fn bootstrap(&self) -> Result<Bootstrap, ConfigError> {
        self.bootstrap_from(&default_share_dirs())
    }

    /// [`bootstrap`](Self::bootstrap) with an explicit template search path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Install`] if the directory or file cannot be
    /// created.
    pub fn bootstrap_from(&self, share_dirs: &[PathBuf]) -> Result<Bootstrap, ConfigError> {
        if self.config_dir.exists() {
            return Ok(Bootstrap::Ready);
        }

        fs::create_dir_all(&self.config_dir).map_err(|source| ConfigError::Install {
            path: self.config_dir.clone(),
            source,
        })?;

        let target = self.excludes_path();
        let install_err = |source| ConfigError::Install {
            path: target.clone(),
            source,
        };
        match share_dirs
            .iter()
            .map(|dir| dir.join(EXCLUDES_FILE))
            .find(|candidate| candidate.is_file())
        {
            Some(template) => {
                log::debug!("Installing {} from {}", EXCLUDES_FILE, template.display());
                fs::copy(&template, &target).map_err(install_err)?;
            }
            None => {
                log::debug!(
                    "No system template found, installing built-in {}",
                    EXCLUDES_FILE
                );
                fs::write(&target, DEFAULT_EXCLUDES).map_err(install_err)?;
            }
        }

        Ok(Bootstrap::Installed(target))
    }

    /// Read and compile the exclusion list.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingExclusions`] if the file is gone,
    /// [`ConfigError::ReadExclusions`] if it cannot be read, or
    /// [`ConfigError::Exclusions`] if it cannot be compiled.
    pub fn load_exclusions(&self) -> Result<ExclusionList, ConfigError> {
        let path = self.excludes_path();
        let contents = fs::read_to_string(&path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => ConfigError::MissingExclusions(path.clone()),
            _ => ConfigError::ReadExclusions {
                path: path.clone(),
                source,
            },
        })?;
        let list = ExclusionList::parse(&contents)?;
        log::info!("Loaded {} exclusion(s) from {}", list.len(), path.display());
        Ok(list)
    }

    /// Load [`Settings`] from this directory.
    ///
    /// # Errors
    ///
    /// See [`Settings::load`].
    pub fn load_settings(&self) -> Result<Settings, ConfigError> {
        Settings::load(&self.config_dir)
    }
}

/// `$DUPSORT_SHARE_DIR` (if set) followed by [`SHARE_DIRS`].
#[must_use]
pub fn default_share_dirs() -> Vec<PathBuf> {
    std::env::var_os("DUPSORT_SHARE_DIR")
        .map(PathBuf::from)
        .into_iter()
        .chain(SHARE_DIRS.iter().map(PathBuf::from))
        .collect()
}
