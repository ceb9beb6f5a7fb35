//! Platform and architecture resolution
//!
//! A platform either ships a prebuilt base rootfs (a root platform, which
//! must name its architecture) or derives from a parent platform and
//! inherits the parent's architecture.

use crate::config::definitions::{DefinitionStore, PlatformSettings, ProjectSettings};
use crate::error::{StemmerError, StemmerResult};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Where a platform's rootfs comes from
#[derive(Debug, Clone)]
pub enum PlatformBase {
    /// Prebuilt base image directory, never mutated
    Image(PathBuf),
    /// Built from the parent platform's rootfs
    Derived {
        parent: Box<ArchitectureRef>,
        settings: ProjectSettings,
    },
}

/// A resolved platform
#[derive(Debug, Clone)]
pub struct ArchitectureRef {
    pub name: String,
    pub arch: String,
    pub base: PlatformBase,
}

impl ArchitectureRef {
    /// Resolve `name`, following parent references to a root platform
    pub async fn resolve(store: &DefinitionStore, name: &str) -> StemmerResult<Self> {
        let mut chain: Vec<(String, PlatformSettings)> = Vec::new();
        let mut next = name.to_string();

        loop {
            if chain.iter().any(|(seen, _)| *seen == next) {
                let mut names: Vec<&str> = chain.iter().map(|(n, _)| n.as_str()).collect();
                names.push(&next);
                return Err(StemmerError::PlatformCycle(names.join(" -> ")));
            }

            let settings = store.load_platform(&next).await?;
            let parent = settings.target.platform.clone();
            chain.push((next, settings));

            match parent {
                Some(parent) => next = parent,
                None => break,
            }
        }

        let mut chain = chain.into_iter().rev();
        let Some((root_name, root)) = chain.next() else {
            return Err(StemmerError::Internal("empty platform chain".to_string()));
        };

        let arch = root.arch.ok_or_else(|| StemmerError::MissingField {
            target: format!("platform {}", root_name),
            field: "arch".to_string(),
        })?;
        let image = root
            .rootfs
            .unwrap_or_else(|| store.platforms_dir().join(&root_name).join("rootfs"));

        let mut resolved = ArchitectureRef {
            name: root_name,
            arch,
            base: PlatformBase::Image(image),
        };

        for (child_name, child) in chain {
            if let Some(declared) = child.arch.as_deref() {
                if declared != resolved.arch {
                    warn!(
                        "Platform {} declares arch {} but inherits {} from {}",
                        child_name, declared, resolved.arch, resolved.name
                    );
                }
            }

            resolved = ArchitectureRef {
                name: child_name,
                arch: resolved.arch.clone(),
                base: PlatformBase::Derived {
                    parent: Box::new(resolved),
                    settings: child.target,
                },
            };
        }

        debug!("Resolved platform {} ({})", resolved.name, resolved.arch);
        Ok(resolved)
    }

    pub fn parent(&self) -> Option<&ArchitectureRef> {
        match &self.base {
            PlatformBase::Image(_) => None,
            PlatformBase::Derived { parent, .. } => Some(parent),
        }
    }

    /// Base image directory of a root platform
    pub fn base_image(&self) -> Option<&Path> {
        match &self.base {
            PlatformBase::Image(path) => Some(path),
            PlatformBase::Derived { .. } => None,
        }
    }
}

/// Debian name of the architecture this binary runs on
pub fn host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "x86" => "i386",
        "aarch64" => "arm64",
        "arm" => "armhf",
        "powerpc64" => "ppc64el",
        "s390x" => "s390x",
        "riscv64" => "riscv64",
        "mips64" => "mips64el",
        other => other,
    }
}

/// How binaries of an architecture run on a host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emulation {
    /// The host executes them directly
    Native,
    /// They need the named static qemu user-mode emulator
    Qemu(&'static str),
}

impl Emulation {
    /// Decide how `arch` runs on `host`
    pub fn for_arch(arch: &str, host: &str) -> StemmerResult<Self> {
        if arch == host || (arch == "i386" && host == "amd64") {
            return Ok(Self::Native);
        }

        let emulator = match arch {
            "armhf" | "armel" => "qemu-arm-static",
            "arm64" => "qemu-aarch64-static",
            "i386" => "qemu-i386-static",
            "amd64" => "qemu-x86_64-static",
            "ppc64el" => "qemu-ppc64le-static",
            "s390x" => "qemu-s390x-static",
            "riscv64" => "qemu-riscv64-static",
            "mips64el" => "qemu-mips64el-static",
            _ => {
                return Err(StemmerError::UnsupportedArch {
                    arch: arch.to_string(),
                    reason: format!("no known emulator for it on a {} host", host),
                })
            }
        };

        Ok(Self::Qemu(emulator))
    }

    pub fn is_foreign(&self) -> bool {
        matches!(self, Self::Qemu(_))
    }
}
