//! Build isolation using Docker/Podman containers
//!
//! Wraps a build command in a `run --rm` invocation of the container
//! runtime, mounting the package sources read-only and the builder root
//! read-write.

use std::path::{Path, PathBuf};

use crate::error::BuildError;

/// Container runtime type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerRuntime {
    /// Docker container runtime
    Docker,
    /// Podman container runtime
    Podman,
}

impl ContainerRuntime {
    /// Get the command name for this runtime
    pub fn command(&self) -> &'static str {
        match self {
            ContainerRuntime::Docker => "docker",
            ContainerRuntime::Podman => "podman",
        }
    }

    /// Whether the runtime binary is on `PATH`
    pub fn is_available(self) -> bool {
        which::which(self.command()).is_ok()
    }

    /// Detect an available runtime, preferring Docker
    pub fn detect() -> Option<Self> {
        [Self::Docker, Self::Podman]
            .into_iter()
            .find(|r| r.is_available())
    }

    /// Resolve a configured runtime name (`auto`, `docker`, `podman`)
    pub fn resolve(name: &str) -> Result<Self, BuildError> {
        let runtime = match name {
            "docker" => Some(Self::Docker),
            "podman" => Some(Self::Podman),
            _ => Self::detect(),
        };
        runtime
            .filter(|r| r.is_available())
            .ok_or_else(|| BuildError::RuntimeNotAvailable {
                runtime: name.to_string(),
            })
    }
}

/// Mount configuration for container volumes
#[derive(Debug, Clone, PartialEq)]
pub struct MountConfig {
    /// Host path to mount
    pub host_path: PathBuf,
    /// Container path to mount to
    pub container_path: PathBuf,
    /// Whether the mount is read-only
    pub read_only: bool,
}

impl MountConfig {
    /// Create a new read-only mount
    pub fn read_only(host_path: PathBuf, container_path: PathBuf) -> Self {
        Self {
            host_path,
            container_path,
            read_only: true,
        }
    }

    /// Create a new read-write mount
    pub fn read_write(host_path: PathBuf, container_path: PathBuf) -> Self {
        Self {
            host_path,
            container_path,
            read_only: false,
        }
    }

    fn to_arg(&self) -> String {
        let suffix = if self.read_only { ":ro" } else { "" };
        format!(
            "-v={}:{}{}",
            self.host_path.display(),
            self.container_path.display(),
            suffix
        )
    }
}

/// One containerized build invocation
#[derive(Debug, Clone)]
pub struct Sandbox {
    runtime: ContainerRuntime,
    image: String,
    network_enabled: bool,
    mounts: Vec<MountConfig>,
    workdir: PathBuf,
    env: Vec<(String, String)>,
}

impl Sandbox {
    /// Create a sandbox for `image`
    pub fn new(runtime: ContainerRuntime, image: impl Into<String>) -> Self {
        Self {
            runtime,
            image: image.into(),
            network_enabled: false,
            mounts: Vec::new(),
            workdir: PathBuf::from("/src"),
            env: Vec::new(),
        }
    }

    /// Allow or deny network access
    #[must_use]
    pub fn with_network(mut self, enabled: bool) -> Self {
        self.network_enabled = enabled;
        self
    }

    /// Add a mount configuration
    #[must_use]
    pub fn with_mount(mut self, mount: MountConfig) -> Self {
        self.mounts.push(mount);
        self
    }

    /// Set the working directory
    #[must_use]
    pub fn with_workdir(mut self, workdir: &Path) -> Self {
        self.workdir = workdir.to_path_buf();
        self
    }

    /// Add an environment variable
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Runtime program to execute
    pub fn program(&self) -> &'static str {
        self.runtime.command()
    }

    /// Build the container run command arguments
    pub fn run_args(&self, command: &[String]) -> Vec<String> {
        let mut args = vec!["run".to_string(), "--rm".to_string()];

        if !self.network_enabled {
            args.push("--network=none".to_string());
        }
        args.extend(self.mounts.iter().map(MountConfig::to_arg));
        args.push(format!("-w={}", self.workdir.display()));
        for (key, value) in &self.env {
            args.push(format!("-e={key}={value}"));
        }
        args.push(self.image.clone());
        args.extend(command.iter().cloned());

        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_runtime_command() {
        assert_eq!(ContainerRuntime::Docker.command(), "docker");
        assert_eq!(ContainerRuntime::Podman.command(), "podman");
    }

    #[test]
    fn test_mount_args() {
        let ro = MountConfig::read_only(PathBuf::from("/host/src"), PathBuf::from("/src"));
        assert_eq!(ro.to_arg(), "-v=/host/src:/src:ro");
        let rw = MountConfig::read_write(PathBuf::from("/host/root"), PathBuf::from("/build"));
        assert_eq!(rw.to_arg(), "-v=/host/root:/build");
    }

    #[test]
    fn test_run_args_order() {
        let sandbox = Sandbox::new(ContainerRuntime::Podman, "alpine:latest")
            .with_mount(MountConfig::read_only(
                PathBuf::from("/p/zlib"),
                PathBuf::from("/src"),
            ))
            .with_env("PKGFORGE_PACKAGE", "zlib");

        let args = sandbox.run_args(&["sh".to_string(), "build.sh".to_string()]);

        assert_eq!(sandbox.program(), "podman");
        assert_eq!(
            args,
            vec![
                "run",
                "--rm",
                "--network=none",
                "-v=/p/zlib:/src:ro",
                "-w=/src",
                "-e=PKGFORGE_PACKAGE=zlib",
                "alpine:latest",
                "sh",
                "build.sh",
            ]
        );
    }

    #[test]
    fn test_network_flag() {
        let args = Sandbox::new(ContainerRuntime::Docker, "img")
            .with_network(true)
            .run_args(&[]);
        assert!(!args.iter().any(|a| a == "--network=none"));
    }
}
