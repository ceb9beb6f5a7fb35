//! Emulation environment for foreign-architecture rootfs trees
//!
//! While active, a foreign rootfs carries three host-provided pieces:
//! the host resolver configuration, a static qemu user-mode emulator in
//! `/usr/bin`, and a stub directory whose service-management commands all
//! link to a no-op binary so package maintainer scripts cannot start
//! daemons inside the build chroot. Clearing removes all three.

use crate::arch::Emulation;
use crate::config::schema::EmulationConfig;
use crate::error::{StemmerError, StemmerResult};
use crate::process;
use crate::rootfs::RootfsImage;
use futures_util::future::try_join_all;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, warn};

/// Commands replaced by no-op stubs while the environment is active
pub const SERVICE_STUBS: [&str; 7] = [
    "initctl",
    "invoke-rc.d",
    "restart",
    "start",
    "stop",
    "start-stop-daemon",
    "service",
];

const RESOLV_CONF: &str = "etc/resolv.conf";
const RESOLV_CONF_BACKUP: &str = "etc/resolv.conf.stemmer-orig";
const EMULATOR_DIR: &str = "usr/bin";
const DEFAULT_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

impl RootfsImage {
    /// Whether the emulation environment is currently installed
    pub fn environment_active(&self) -> bool {
        self.active_emulation.is_some()
    }

    /// Install the emulation environment; native rootfs trees need none
    pub async fn prepare_environment(&mut self, config: &EmulationConfig) -> StemmerResult<()> {
        if self.environment_active() {
            return Ok(());
        }

        let emulation = Emulation::for_arch(&self.arch, &self.host)?;
        let Emulation::Qemu(emulator) = emulation else {
            debug!("{} runs natively on {}, no emulation needed", self.arch, self.host);
            return Ok(());
        };

        let root = self.location()?.to_path_buf();
        info!("Preparing {} emulation in {}", self.arch, root.display());

        if let Err(e) = install(&root, emulator, config).await {
            // leave nothing half-installed behind
            if let Err(cleanup) = uninstall(&root, emulator, config).await {
                warn!("Cleanup after failed prepare also failed: {}", cleanup);
            }
            return Err(e);
        }

        self.active_emulation = Some(emulation);
        Ok(())
    }

    /// Remove the emulation environment if it is installed
    pub async fn clear_environment(&mut self, config: &EmulationConfig) -> StemmerResult<()> {
        let Some(Emulation::Qemu(emulator)) = self.active_emulation else {
            return Ok(());
        };

        let root = self.location()?.to_path_buf();
        info!("Clearing {} emulation from {}", self.arch, root.display());

        let result = uninstall(&root, emulator, config).await;
        self.active_emulation = None;
        result
    }

    /// Environment variables for commands run inside this rootfs
    pub fn chroot_env(&self, config: &EmulationConfig) -> Vec<(String, String)> {
        let path = if self.environment_active() {
            format!("/{}:{}", config.stub_dir, DEFAULT_PATH)
        } else {
            DEFAULT_PATH.to_string()
        };

        vec![
            ("PATH".to_string(), path),
            ("DEBIAN_FRONTEND".to_string(), "noninteractive".to_string()),
            ("LC_ALL".to_string(), "C".to_string()),
        ]
    }
}

async fn install(root: &Path, emulator: &str, config: &EmulationConfig) -> StemmerResult<()> {
    // resolver configuration, keeping whatever the rootfs shipped
    let etc = root.join("etc");
    create_dir(&etc).await?;
    let resolv = root.join(RESOLV_CONF);
    if fs::symlink_metadata(&resolv).await.is_ok() {
        rename(&resolv, &root.join(RESOLV_CONF_BACKUP)).await?;
    }
    process::copy_archive(&[config.resolv_conf.clone()], &etc).await?;

    // emulator
    let host_emulator = config.emulator_dir.join(emulator);
    if !host_emulator.is_file() {
        return Err(StemmerError::UnsupportedArch {
            arch: emulator.to_string(),
            reason: format!("emulator not found at {}", host_emulator.display()),
        });
    }
    let bin = root.join(EMULATOR_DIR);
    create_dir(&bin).await?;
    process::copy_archive(&[host_emulator], &bin).await?;

    // service stubs
    let stub_dir = root.join(&config.stub_dir);
    create_dir(&stub_dir).await?;
    try_join_all(SERVICE_STUBS.iter().map(|name| {
        let link = stub_dir.join(name);
        async move {
            fs::symlink(&config.noop_binary, &link)
                .await
                .map_err(|e| StemmerError::io(format!("linking {}", link.display()), e))
        }
    }))
    .await?;

    debug!("Installed {} stubs in {}", SERVICE_STUBS.len(), stub_dir.display());
    Ok(())
}

/// Undo `install`, attempting every step and reporting the first failure
async fn uninstall(root: &Path, emulator: &str, config: &EmulationConfig) -> StemmerResult<()> {
    let mut first_error = None;

    let stubs = process::remove_tree(&root.join(&config.stub_dir)).await;
    let binary = remove_file(&root.join(EMULATOR_DIR).join(emulator)).await;
    let resolv = restore_resolv_conf(root).await;

    for result in [stubs, binary, resolv] {
        if let Err(e) = result {
            warn!("Emulation cleanup step failed: {}", e);
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn restore_resolv_conf(root: &Path) -> StemmerResult<()> {
    let resolv = root.join(RESOLV_CONF);
    let backup = root.join(RESOLV_CONF_BACKUP);

    remove_file(&resolv).await?;
    if fs::symlink_metadata(&backup).await.is_ok() {
        rename(&backup, &resolv).await?;
    }
    Ok(())
}

async fn create_dir(path: &Path) -> StemmerResult<()> {
    fs::create_dir_all(path)
        .await
        .map_err(|e| StemmerError::DirCreate {
            path: path.to_path_buf(),
            source: e,
        })
}

async fn rename(from: &Path, to: &Path) -> StemmerResult<()> {
    fs::rename(from, to).await.map_err(|e| {
        StemmerError::io(format!("renaming {} to {}", from.display(), to.display()), e)
    })
}

async fn remove_file(path: &Path) -> StemmerResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StemmerError::io(format!("removing {}", path.display()), e)),
    }
}
