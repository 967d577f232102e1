//! Default build executor
//!
//! Runs the package's build script with `sh` in the package directory,
//! either on the host or inside a container. The builder root is recreated
//! for every job; artifacts go to `<root>/.out`, output to
//! `<root>/.build.log`.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::core::builder::{BuildExecutor, BuildRequest, ExecOutcome};
use crate::core::config::{ContainerSettings, Settings};
use crate::error::BuildError;
use crate::infra::filesystem;
use crate::infra::sandbox::{ContainerRuntime, MountConfig, Sandbox};

const CONTAINER_SRC: &str = "/src";
const CONTAINER_ROOT: &str = "/build";

#[derive(Debug, Clone)]
struct Container {
    runtime: ContainerRuntime,
    settings: ContainerSettings,
}

/// Runs build scripts as child processes
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    jobs: usize,
    container: Option<Container>,
}

impl CommandExecutor {
    /// Host executor passing `jobs` to build scripts
    pub fn new(jobs: usize) -> Self {
        Self {
            jobs: jobs.max(1),
            container: None,
        }
    }

    /// Executor for the effective settings
    ///
    /// Fails when a container runtime is configured but not installed.
    pub fn from_settings(settings: &Settings) -> Result<Self, BuildError> {
        let mut executor = Self::new(settings.jobs);
        if let Some(container) = &settings.container {
            let runtime = ContainerRuntime::resolve(&container.runtime)?;
            tracing::info!("Running builds in {} ({})", container.image, runtime.command());
            executor.container = Some(Container {
                runtime,
                settings: container.clone(),
            });
        }
        Ok(executor)
    }

    fn environment(&self, request: &BuildRequest, root: &Path) -> Vec<(String, String)> {
        let deps = request
            .dependency_files()
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(":");
        vec![
            ("PKGFORGE_PACKAGE".to_string(), request.package.clone()),
            ("PKGFORGE_ARCH".to_string(), request.arch.clone()),
            ("PKGFORGE_ROOT".to_string(), root.display().to_string()),
            (
                "DESTDIR".to_string(),
                root.join(crate::config::defaults::RESULT_SUBDIR)
                    .display()
                    .to_string(),
            ),
            ("PKGFORGE_DEPS".to_string(), deps),
            ("JOBS".to_string(), self.jobs.to_string()),
        ]
    }

    fn command(&self, request: &BuildRequest) -> tokio::process::Command {
        match &self.container {
            None => {
                let mut cmd = tokio::process::Command::new("sh");
                cmd.arg(&request.script)
                    .current_dir(&request.dir)
                    .envs(self.environment(request, &request.root));
                cmd
            }
            Some(container) => {
                let root = PathBuf::from(CONTAINER_ROOT);
                let mut sandbox = Sandbox::new(container.runtime, container.settings.image.clone())
                    .with_network(container.settings.network)
                    .with_mount(MountConfig::read_only(
                        request.dir.clone(),
                        PathBuf::from(CONTAINER_SRC),
                    ))
                    .with_mount(MountConfig::read_write(request.root.clone(), root.clone()))
                    .with_workdir(Path::new(CONTAINER_SRC));
                // Dependency artifacts keep their host paths inside the container.
                let mut dep_dirs: Vec<PathBuf> = request
                    .dependency_files()
                    .iter()
                    .filter_map(|f| f.parent().map(Path::to_path_buf))
                    .collect();
                dep_dirs.sort();
                dep_dirs.dedup();
                for dir in dep_dirs {
                    sandbox = sandbox.with_mount(MountConfig::read_only(dir.clone(), dir));
                }
                for (key, value) in self.environment(request, &root) {
                    sandbox = sandbox.with_env(key, value);
                }

                let mut cmd = tokio::process::Command::new(sandbox.program());
                cmd.args(sandbox.run_args(&["sh".to_string(), request.script.clone()]));
                cmd
            }
        }
    }

    async fn run(self, request: BuildRequest) -> Result<ExecOutcome, BuildError> {
        let spawn_err = |e: std::io::Error| BuildError::SpawnFailed {
            package: request.package.clone(),
            error: e.to_string(),
        };

        if request.root.exists() {
            filesystem::remove_dir_all(&request.root)?;
        }
        let result_dir = request.result_dir();
        filesystem::create_dir_all(&result_dir)?;

        let log_path = request.log_path();
        let log = std::fs::File::create(&log_path).map_err(spawn_err)?;
        let log_err = log.try_clone().map_err(spawn_err)?;

        let mut cmd = self.command(&request);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .kill_on_drop(true);

        tracing::debug!("Running {:?}", cmd);
        let mut child = cmd.spawn().map_err(spawn_err)?;
        let status = child.wait().await.map_err(spawn_err)?;

        Ok(ExecOutcome {
            exit_code: status.code(),
            result_dir,
            log: Some(log_path),
        })
    }
}

impl BuildExecutor for CommandExecutor {
    fn execute(&self, request: BuildRequest) -> BoxFuture<'static, Result<ExecOutcome, BuildError>> {
        self.clone().run(request).boxed()
    }
}
