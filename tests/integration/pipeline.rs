//! End-to-end build pipeline tests against a recording chroot runner

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use stemmer::build::{BuildRecord, Builder, Stage};
use stemmer::chroot::{ChrootOutput, ChrootRunner};
use stemmer::config::schema::{EmulationConfig, PathsConfig};
use stemmer::config::Config;
use stemmer::error::{ErrorKind, StemmerError, StemmerResult};
use stemmer::rootfs::{PACKAGE_STAGING_DIR, SERVICE_STUBS};
use tempfile::TempDir;
use tokio::fs;

/// One command seen by the fake runner
#[derive(Debug, Clone)]
struct Invocation {
    root: PathBuf,
    command: String,
    path_env: String,
    /// Staging directory listing when the command started
    staged: Vec<String>,
    /// Whether the emulator binary was present in the rootfs
    emulated: bool,
}

/// Pretends to be apt and dpkg inside the chroot
///
/// `apt-get install` drops a `<pkg>_<version>_all.deb` archive per package
/// into the staging directory, the way apt leaves downloaded archives
/// behind. Unpinned packages get version `1.0`.
#[derive(Default)]
struct FakeChroot {
    seen: Mutex<Vec<Invocation>>,
    fail_on: Option<&'static str>,
}

impl FakeChroot {
    fn failing_on(pattern: &'static str) -> Self {
        Self {
            fail_on: Some(pattern),
            ..Self::default()
        }
    }

    fn invocations(&self) -> Vec<Invocation> {
        self.seen.lock().unwrap().clone()
    }

    fn commands(&self) -> Vec<String> {
        self.invocations().into_iter().map(|i| i.command).collect()
    }
}

#[async_trait]
impl ChrootRunner for FakeChroot {
    async fn run(
        &self,
        root: &Path,
        command: &str,
        env: &[(String, String)],
    ) -> StemmerResult<ChrootOutput> {
        let staging = root.join(PACKAGE_STAGING_DIR);
        let mut staged = Vec::new();
        if let Ok(mut entries) = fs::read_dir(&staging).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                staged.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        staged.sort();

        self.seen.lock().unwrap().push(Invocation {
            root: root.to_path_buf(),
            command: command.to_string(),
            path_env: env
                .iter()
                .find(|(k, _)| k == "PATH")
                .map(|(_, v)| v.clone())
                .unwrap_or_default(),
            staged,
            emulated: root.join("usr/bin/qemu-arm-static").exists(),
        });

        if self.fail_on.is_some_and(|f| command.contains(f)) {
            return Ok(ChrootOutput {
                code: 100,
                lines: vec!["E: Unable to locate package".to_string()],
            });
        }

        if command.starts_with("apt-get install") {
            let packages = command
                .split_whitespace()
                .skip_while(|word| !word.starts_with("Dir::Cache::Archives="))
                .skip(1);
            for spec in packages {
                let (name, version) = spec.split_once('=').unwrap_or((spec, "1.0"));
                fs::write(staging.join(format!("{}_{}_all.deb", name, version)), name)
                    .await
                    .unwrap();
            }
        }

        Ok(ChrootOutput {
            code: 0,
            lines: vec![],
        })
    }

    fn runner_name(&self) -> &'static str {
        "fake"
    }
}

/// Workspace with definition directories, a fake host and a base image
struct Workspace {
    temp: TempDir,
    config: Config,
}

impl Workspace {
    async fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let host = temp.path().join("host");

        fs::create_dir_all(host.join("etc")).await.unwrap();
        fs::write(host.join("etc/resolv.conf"), "nameserver 10.0.0.1\n")
            .await
            .unwrap();
        fs::create_dir_all(host.join("usr/bin")).await.unwrap();
        fs::write(host.join("usr/bin/qemu-arm-static"), "qemu")
            .await
            .unwrap();

        let config = Config {
            paths: PathsConfig::rooted(temp.path()),
            emulation: EmulationConfig {
                resolv_conf: host.join("etc/resolv.conf"),
                emulator_dir: host.join("usr/bin"),
                ..EmulationConfig::default()
            },
            ..Config::default()
        };

        Self { temp, config }
    }

    fn root(&self) -> &Path {
        self.temp.path()
    }

    /// Root platform with a small base image
    async fn base_platform(&self, name: &str, arch: &str) {
        let dir = self.root().join("platforms").join(name);
        fs::create_dir_all(dir.join("rootfs/etc")).await.unwrap();
        fs::create_dir_all(dir.join("rootfs/var/cache/apt"))
            .await
            .unwrap();
        fs::write(dir.join("rootfs/etc/os-release"), "ID=debian\n")
            .await
            .unwrap();
        fs::write(dir.join("rootfs/etc/resolv.conf"), "nameserver 127.0.0.53\n")
            .await
            .unwrap();
        fs::write(
            dir.join("platform.json"),
            format!(r#"{{ "arch": "{}" }}"#, arch),
        )
        .await
        .unwrap();
    }

    async fn definition(&self, kind: &str, name: &str, file: &str, json: &str) {
        let dir = self.root().join(kind).join(name);
        fs::create_dir_all(&dir).await.unwrap();
        fs::write(dir.join(file), json).await.unwrap();
    }

    async fn project(&self, name: &str, json: &str) {
        self.definition("projects", name, "project.json", json).await;
    }

    fn published(&self, name: &str) -> PathBuf {
        self.root().join("build").join(name).join("rootfs")
    }

    async fn job_dirs(&self) -> usize {
        let Ok(mut entries) = fs::read_dir(self.root().join("jobs")).await else {
            return 0;
        };
        let mut count = 0;
        while let Ok(Some(_)) = entries.next_entry().await {
            count += 1;
        }
        count
    }
}

#[tokio::test]
async fn project_without_platform_is_a_config_error() {
    let ws = Workspace::new().await;
    ws.project("bare", r#"{ "packages": {} }"#).await;
    let runner = FakeChroot::default();

    let err = Builder::new(&ws.config, &runner)
        .build_project("bare")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Config);
    assert!(!ws.published("bare").exists());
    assert!(runner.commands().is_empty());
    assert_eq!(ws.job_dirs().await, 0);
}

#[tokio::test]
async fn missing_base_image_is_not_found() {
    let ws = Workspace::new().await;
    ws.definition("platforms", "ghost", "platform.json", r#"{ "arch": "amd64" }"#)
        .await;
    ws.project("site", r#"{ "platform": "ghost" }"#).await;
    let runner = FakeChroot::default();

    let err = Builder::new(&ws.config, &runner)
        .with_host_arch("amd64")
        .build_project("site")
        .await
        .unwrap_err();

    assert!(matches!(err, StemmerError::RootfsNotFound(_)));
    assert_eq!(ws.job_dirs().await, 0);
}

#[tokio::test]
async fn native_build_runs_apt_sequence() {
    let ws = Workspace::new().await;
    ws.base_platform("debian", "amd64").await;
    ws.project(
        "site",
        r#"{ "platform": "debian", "hostname": "site01", "packages": { "curl": "*" } }"#,
    )
    .await;
    let runner = FakeChroot::default();

    let report = Builder::new(&ws.config, &runner)
        .with_host_arch("amd64")
        .build_project("site")
        .await
        .unwrap();

    let commands = runner.commands();
    assert_eq!(commands.len(), 4);
    assert_eq!(commands[0], "apt-get update");
    assert!(commands[1].starts_with("apt-get install"));
    assert!(commands[1].ends_with(" curl"));
    assert_eq!(commands[2], "rm -fr /var/lib/apt/lists/*");
    assert_eq!(commands[3], "apt-get clean");

    // native builds never see the stub directory on PATH
    for invocation in runner.invocations() {
        assert!(!invocation.path_env.contains(".stemmer"));
        assert!(!invocation.emulated);
    }

    let published = ws.published("site");
    assert_eq!(report.rootfs, published);
    assert_eq!(
        fs::read_to_string(published.join("etc/hostname")).await.unwrap(),
        "site01\n"
    );
    assert!(published.join("etc/os-release").is_file());
    assert!(!published.join("var/cache/stemmer").exists());
    assert!(published.join("var/cache/apt").is_dir());

    // the base image is cloned, never consumed
    assert!(ws.root().join("platforms/debian/rootfs/etc/os-release").is_file());
    assert!(!ws.root().join("platforms/debian/rootfs/etc/hostname").exists());

    let record = BuildRecord::load(&ws.root().join("build/site"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.arch, "amd64");
    assert_eq!(record.installed, vec!["curl"]);
    assert_eq!(ws.job_dirs().await, 0);
}

#[tokio::test]
async fn nothing_to_install_runs_no_commands() {
    let ws = Workspace::new().await;
    ws.base_platform("debian", "amd64").await;
    ws.project("plain", r#"{ "platform": "debian" }"#).await;
    let runner = FakeChroot::default();

    Builder::new(&ws.config, &runner)
        .with_host_arch("amd64")
        .build_project("plain")
        .await
        .unwrap();

    assert!(runner.commands().is_empty());
    assert!(ws.published("plain").join("etc/os-release").is_file());
}

#[tokio::test]
async fn foreign_build_leaves_no_emulation_behind() {
    let ws = Workspace::new().await;
    ws.base_platform("raspbian", "armhf").await;
    ws.project(
        "kiosk",
        r#"{ "platform": "raspbian", "packages": { "chromium": "*" } }"#,
    )
    .await;
    let runner = FakeChroot::default();

    Builder::new(&ws.config, &runner)
        .with_host_arch("amd64")
        .build_project("kiosk")
        .await
        .unwrap();

    // emulation was in place while apt ran
    let invocations = runner.invocations();
    assert_eq!(invocations.len(), 4);
    for invocation in &invocations {
        assert!(invocation.emulated, "{}", invocation.command);
        assert!(invocation.path_env.starts_with("/.stemmer:"));
    }

    let published = ws.published("kiosk");
    assert!(!published.join("usr/bin/qemu-arm-static").exists());
    assert!(!published.join(".stemmer").exists());
    for stub in SERVICE_STUBS {
        assert!(!published.join(".stemmer").join(stub).exists());
    }
    assert_eq!(
        fs::read_to_string(published.join("etc/resolv.conf")).await.unwrap(),
        "nameserver 127.0.0.53\n"
    );
    assert!(!published.join("etc/resolv.conf.stemmer-orig").exists());
}

#[tokio::test]
async fn failed_foreign_build_clears_emulation_before_release() {
    let ws = Workspace::new().await;
    ws.base_platform("raspbian", "armhf").await;
    ws.project(
        "kiosk",
        r#"{ "platform": "raspbian", "packages": { "brokenpkg": "*" } }"#,
    )
    .await;
    let runner = FakeChroot::failing_on("brokenpkg");

    // rootfs state seen once cleanup ran, before the job is removed
    let at_release = Mutex::new(Vec::new());
    let observer = |_: &str, stage: Stage| {
        if stage != Stage::Release {
            return;
        }
        if let Some(last) = runner.invocations().last() {
            let root = &last.root;
            at_release.lock().unwrap().push((
                root.join("etc/os-release").is_file(),
                root.join("usr/bin/qemu-arm-static").exists(),
                root.join(".stemmer").exists(),
                std::fs::read_to_string(root.join("etc/resolv.conf")).unwrap_or_default(),
            ));
        }
    };

    let err = Builder::new(&ws.config, &runner)
        .with_host_arch("amd64")
        .with_observer(&observer)
        .build_project("kiosk")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Execution);

    // emulation was active when the install failed
    let failed = runner.invocations().pop().unwrap();
    assert!(failed.command.contains("brokenpkg"));
    assert!(failed.emulated);

    let at_release = at_release.into_inner().unwrap();
    assert_eq!(
        at_release,
        vec![(true, false, false, "nameserver 127.0.0.53\n".to_string())]
    );
    assert!(!ws.root().join("build/kiosk").exists());
    assert_eq!(ws.job_dirs().await, 0);
}

#[tokio::test]
async fn observer_sees_every_stage() {
    let ws = Workspace::new().await;
    ws.base_platform("debian", "amd64").await;
    ws.project("site", r#"{ "platform": "debian" }"#).await;
    let runner = FakeChroot::default();

    let seen = Mutex::new(Vec::new());
    let observer = |name: &str, stage: Stage| seen.lock().unwrap().push((name.to_string(), stage));
    Builder::new(&ws.config, &runner)
        .with_host_arch("amd64")
        .with_observer(&observer)
        .build_project("site")
        .await
        .unwrap();

    let mut expected: Vec<(String, Stage)> = Stage::PIPELINE
        .iter()
        .map(|stage| ("site".to_string(), *stage))
        .collect();
    expected.push(("site".to_string(), Stage::Release));
    assert_eq!(seen.into_inner().unwrap(), expected);
}

#[tokio::test]
async fn foreign_arch_without_emulator_fails_cleanly() {
    let ws = Workspace::new().await;
    ws.base_platform("ubuntu-arm64", "arm64").await;
    ws.project("edge", r#"{ "platform": "ubuntu-arm64" }"#).await;
    let runner = FakeChroot::default();

    let err = Builder::new(&ws.config, &runner)
        .with_host_arch("amd64")
        .build_project("edge")
        .await
        .unwrap_err();

    assert!(matches!(err, StemmerError::UnsupportedArch { .. }));
    assert!(!ws.published("edge").exists());
    assert_eq!(ws.job_dirs().await, 0);
}

#[tokio::test]
async fn derived_platform_is_built_first() {
    let ws = Workspace::new().await;
    ws.base_platform("debian", "amd64").await;
    ws.definition(
        "platforms",
        "web",
        "platform.json",
        r#"{ "platform": "debian", "packages": { "nginx": "*" } }"#,
    )
    .await;
    ws.project(
        "shop",
        r#"{ "platform": "web", "packages": { "curl": "*" } }"#,
    )
    .await;
    let runner = FakeChroot::default();
    let builder = Builder::new(&ws.config, &runner).with_host_arch("amd64");

    builder.build_project("shop").await.unwrap();

    let installs: Vec<String> = runner
        .commands()
        .into_iter()
        .filter(|c| c.starts_with("apt-get install"))
        .collect();
    assert_eq!(installs.len(), 2);
    assert!(installs[0].ends_with(" nginx"));
    assert!(installs[1].ends_with(" curl"));

    assert!(ws.published("web").join("etc/os-release").is_file());
    assert!(ws.published("shop").join("etc/os-release").is_file());

    // the published platform is reused by later builds
    builder.build_project("shop").await.unwrap();
    let nginx_installs = runner
        .commands()
        .iter()
        .filter(|c| c.ends_with(" nginx"))
        .count();
    assert_eq!(nginx_installs, 1);
}

#[tokio::test]
async fn failed_install_keeps_previous_publish() {
    let ws = Workspace::new().await;
    ws.base_platform("debian", "amd64").await;
    ws.project("site", r#"{ "platform": "debian", "packages": { "curl": "*" } }"#)
        .await;

    let runner = FakeChroot::default();
    Builder::new(&ws.config, &runner)
        .with_host_arch("amd64")
        .build_project("site")
        .await
        .unwrap();
    let marker = ws.published("site").join("etc/marker");
    fs::write(&marker, "first build").await.unwrap();

    ws.project("site", r#"{ "platform": "debian", "packages": { "brokenpkg": "*" } }"#)
        .await;
    let failing = FakeChroot::failing_on("brokenpkg");
    let err = Builder::new(&ws.config, &failing)
        .with_host_arch("amd64")
        .build_project("site")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Execution);
    assert!(err.to_string().contains("brokenpkg"));
    assert_eq!(fs::read_to_string(&marker).await.unwrap(), "first build");
    assert_eq!(ws.job_dirs().await, 0);

    // the failure stopped the sequence at the install command
    let commands = failing.commands();
    assert_eq!(commands.len(), 2);
    assert!(commands[1].starts_with("apt-get install"));
}

#[tokio::test]
async fn invalid_package_name_is_rejected_before_apt() {
    let ws = Workspace::new().await;
    ws.base_platform("debian", "amd64").await;
    ws.project(
        "site",
        r#"{ "platform": "debian", "packages": { "curl; reboot": "*" } }"#,
    )
    .await;
    let runner = FakeChroot::default();

    let err = Builder::new(&ws.config, &runner)
        .with_host_arch("amd64")
        .build_project("site")
        .await
        .unwrap_err();

    assert!(matches!(err, StemmerError::InvalidPackage { .. }));
    assert!(runner.commands().is_empty());
    assert!(!ws.published("site").exists());
}

#[tokio::test]
async fn recipe_cache_is_reused_on_rebuild() {
    let ws = Workspace::new().await;
    ws.base_platform("debian", "amd64").await;
    ws.definition(
        "recipes",
        "web",
        "recipe.json",
        r#"{ "packages": { "nginx": "*" } }"#,
    )
    .await;
    ws.project(
        "site",
        r#"{ "platform": "debian", "recipes": { "web": {} } }"#,
    )
    .await;

    let first = FakeChroot::default();
    Builder::new(&ws.config, &first)
        .with_host_arch("amd64")
        .build_project("site")
        .await
        .unwrap();
    assert!(first.commands()[1].ends_with(" nginx"));
    assert!(ws
        .root()
        .join("recipes/web/cache/amd64/nginx_1.0_all.deb")
        .is_file());

    let second = FakeChroot::default();
    let report = Builder::new(&ws.config, &second)
        .with_host_arch("amd64")
        .build_project("site")
        .await
        .unwrap();

    // staged archives are applied, then apt resolves their dependencies
    // without fetching the cached package again
    let invocations = second.invocations();
    assert_eq!(invocations.len(), 5);
    assert!(invocations[0].command.starts_with("dpkg -i"));
    assert_eq!(invocations[0].staged, vec!["nginx_1.0_all.deb"]);
    assert_eq!(invocations[1].command, "apt-get update");
    assert!(invocations[2].command.starts_with("apt-get install -f"));
    assert!(invocations[2]
        .command
        .ends_with("Dir::Cache::Archives=/var/cache/stemmer/packages/"));
    assert!(!invocations[2].command.contains("nginx"));
    assert_eq!(invocations[3].command, "rm -fr /var/lib/apt/lists/*");
    assert_eq!(invocations[4].command, "apt-get clean");

    assert_eq!(report.record.from_cache, vec!["nginx"]);
    assert!(report.record.installed.is_empty());
    assert!(!ws.published("site").join(PACKAGE_STAGING_DIR).exists());
}

#[tokio::test]
async fn pinned_version_bypasses_stale_cache() {
    let ws = Workspace::new().await;
    ws.base_platform("debian", "amd64").await;
    ws.definition(
        "recipes",
        "web",
        "recipe.json",
        r#"{ "packages": { "nginx": "*" } }"#,
    )
    .await;
    ws.project(
        "site",
        r#"{ "platform": "debian", "recipes": { "web": {} } }"#,
    )
    .await;

    let first = FakeChroot::default();
    let builder = Builder::new(&ws.config, &first).with_host_arch("amd64");
    builder.build_project("site").await.unwrap();

    // the project now pins a version the cache does not hold
    ws.project(
        "site",
        r#"{ "platform": "debian", "recipes": { "web": {} }, "packages": { "nginx": "2.0" } }"#,
    )
    .await;
    let second = FakeChroot::default();
    let report = Builder::new(&ws.config, &second)
        .with_host_arch("amd64")
        .build_project("site")
        .await
        .unwrap();

    let commands = second.commands();
    assert!(!commands.iter().any(|c| c.starts_with("dpkg -i")));
    assert!(commands[1].ends_with(" nginx=2.0"));
    for invocation in second.invocations() {
        assert!(invocation.staged.iter().all(|f| f != "nginx_1.0_all.deb"));
    }
    assert!(report.record.from_cache.is_empty());
    assert_eq!(report.record.installed, vec!["nginx"]);

    // pinning the cached version is served from disk again
    ws.project(
        "site",
        r#"{ "platform": "debian", "recipes": { "web": {} }, "packages": { "nginx": "1.0" } }"#,
    )
    .await;
    let third = FakeChroot::default();
    let report = Builder::new(&ws.config, &third)
        .with_host_arch("amd64")
        .build_project("site")
        .await
        .unwrap();
    assert!(third.commands()[0].starts_with("dpkg -i"));
    assert_eq!(report.record.from_cache, vec!["nginx"]);
}

#[tokio::test]
async fn unknown_recipe_is_dropped() {
    let ws = Workspace::new().await;
    ws.base_platform("debian", "amd64").await;
    ws.project(
        "site",
        r#"{ "platform": "debian", "recipes": { "ghost": {} }, "packages": { "curl": "*" } }"#,
    )
    .await;
    let runner = FakeChroot::default();

    let report = Builder::new(&ws.config, &runner)
        .with_host_arch("amd64")
        .build_project("site")
        .await
        .unwrap();

    assert_eq!(report.record.dropped_recipes, vec!["ghost"]);
    assert!(report.record.recipes.is_empty());
    assert!(!ws.root().join("recipes/ghost").exists());
}

#[tokio::test]
async fn jobs_run_in_distinct_directories() {
    let ws = Workspace::new().await;
    ws.base_platform("debian", "amd64").await;
    ws.project("one", r#"{ "platform": "debian", "packages": { "curl": "*" } }"#)
        .await;
    ws.project("two", r#"{ "platform": "debian", "packages": { "wget": "*" } }"#)
        .await;
    let runner = FakeChroot::default();
    let builder = Builder::new(&ws.config, &runner).with_host_arch("amd64");

    let (one, two) = tokio::join!(builder.build_project("one"), builder.build_project("two"));
    assert_ne!(one.unwrap().record.job, two.unwrap().record.job);

    let roots: std::collections::BTreeSet<PathBuf> =
        runner.invocations().into_iter().map(|i| i.root).collect();
    assert_eq!(roots.len(), 2);
    assert_eq!(ws.job_dirs().await, 0);
}
