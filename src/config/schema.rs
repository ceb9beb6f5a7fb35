//! Configuration schema for stemmer
//!
//! Configuration is stored at `~/.config/stemmer/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Where definitions and build output live
    pub paths: PathsConfig,

    /// Host files used to run foreign binaries in a chroot
    pub emulation: EmulationConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Directory layout
///
/// Every directory defaults to a child of `root`; set one explicitly to
/// move it elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Base directory for the defaults below
    pub root: PathBuf,

    /// Project definitions (`<projects>/<name>/project.json`)
    pub projects: Option<PathBuf>,

    /// Platform definitions (`<platforms>/<name>/platform.json`)
    pub platforms: Option<PathBuf>,

    /// Recipe definitions and their caches (`<recipes>/<name>/recipe.json`)
    pub recipes: Option<PathBuf>,

    /// Published rootfs trees (`<build>/<name>/rootfs`)
    pub build: Option<PathBuf>,

    /// Ephemeral job working directories
    pub jobs: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            projects: None,
            platforms: None,
            recipes: None,
            build: None,
            jobs: None,
        }
    }
}

impl PathsConfig {
    /// Layout rooted at `root` with every directory at its default
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn projects_dir(&self) -> PathBuf {
        self.resolve(&self.projects, "projects")
    }

    pub fn platforms_dir(&self) -> PathBuf {
        self.resolve(&self.platforms, "platforms")
    }

    pub fn recipes_dir(&self) -> PathBuf {
        self.resolve(&self.recipes, "recipes")
    }

    pub fn build_dir(&self) -> PathBuf {
        self.resolve(&self.build, "build")
    }

    pub fn jobs_dir(&self) -> PathBuf {
        self.resolve(&self.jobs, "jobs")
    }

    fn resolve(&self, explicit: &Option<PathBuf>, name: &str) -> PathBuf {
        explicit.clone().unwrap_or_else(|| self.root.join(name))
    }
}

/// Emulation environment settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulationConfig {
    /// Host resolver configuration copied into the rootfs
    pub resolv_conf: PathBuf,

    /// Directory holding the static qemu user-mode emulators
    pub emulator_dir: PathBuf,

    /// Binary the service-management stubs point to
    pub noop_binary: PathBuf,

    /// Stub directory name, relative to the rootfs
    pub stub_dir: String,
}

impl Default for EmulationConfig {
    fn default() -> Self {
        Self {
            resolv_conf: PathBuf::from("/etc/resolv.conf"),
            emulator_dir: PathBuf::from("/usr/bin"),
            noop_binary: PathBuf::from("/bin/true"),
            stub_dir: ".stemmer".to_string(),
        }
    }
}
