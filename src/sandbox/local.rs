//! Local docker-image sandbox.
//!
//! The image is a cached, shared artifact. Acquiring this backend means
//! proving the image exists and actually runs, rebuilding it when it does
//! not. Each command then executes in a fresh `--rm` container with the job
//! workspace bind-mounted, so nothing leaks between attempts or jobs.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{SandboxBackend, Settings};
use crate::exec::{run_command, CommandOutput, ExecRequest};
use crate::sandbox::{
    ReleaseOutcome, ResetOutcome, Sandbox, SandboxCommand, SandboxError, SandboxProfile,
};
use crate::shared::StatePaths;

pub const CONTAINER_WORKSPACE_DIR: &str = "/workspace";
pub const CONTAINER_TOOLS_DIR: &str = "/tools";

const RUNTIME_PROBE_TIMEOUT: Duration = Duration::from_secs(30);
const IMAGE_PROBE_TIMEOUT: Duration = Duration::from_secs(120);
const IMAGE_BUILD_TIMEOUT: Duration = Duration::from_secs(1800);

/// Seed definition for the sandbox image: the agent runtime plus the
/// interpreters harvested tools are written in.
pub const DEFAULT_DOCKERFILE: &str = "\
FROM node:20-bookworm-slim

RUN apt-get update \\
    && apt-get install -y --no-install-recommends \\
        python3 ruby perl bash coreutils git ca-certificates curl \\
    && rm -rf /var/lib/apt/lists/*

RUN npm install -g @anthropic-ai/claude-code

WORKDIR /workspace
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageState {
    Absent,
    Broken { detail: String },
    Usable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageReadiness {
    AlreadyUsable,
    Built,
    Rebuilt,
}

/// Checks that the container runtime answers at all. Failing this is an
/// environment error: the job should be rejected before any record exists.
pub fn runtime_available(docker_binary: &str) -> Result<(), SandboxError> {
    let request = ExecRequest::new(
        docker_binary,
        vec!["version".to_string()],
        RUNTIME_PROBE_TIMEOUT,
    );
    let output = run_command(&request)?;
    if output.success() {
        return Ok(());
    }
    Err(SandboxError::RuntimeUnavailable {
        binary: docker_binary.to_string(),
        detail: output.failure_summary(),
    })
}

/// Inspect-then-smoke-test. An image that exists but cannot run a trivial
/// command counts as broken, not usable.
pub fn probe_image(docker_binary: &str, image_tag: &str) -> Result<ImageState, SandboxError> {
    let inspect = run_command(&ExecRequest::new(
        docker_binary,
        vec![
            "image".to_string(),
            "inspect".to_string(),
            image_tag.to_string(),
        ],
        IMAGE_PROBE_TIMEOUT,
    ))?;
    if !inspect.success() {
        return Ok(ImageState::Absent);
    }

    let trial = run_command(&ExecRequest::new(
        docker_binary,
        vec![
            "run".to_string(),
            "--rm".to_string(),
            image_tag.to_string(),
            "true".to_string(),
        ],
        IMAGE_PROBE_TIMEOUT,
    ))?;
    if trial.success() {
        Ok(ImageState::Usable)
    } else {
        Ok(ImageState::Broken {
            detail: trial.failure_summary(),
        })
    }
}

pub fn build_image(
    docker_binary: &str,
    image_tag: &str,
    build_context: &Path,
) -> Result<(), SandboxError> {
    if !build_context.join("Dockerfile").is_file() {
        return Err(SandboxError::ImageBuild {
            tag: image_tag.to_string(),
            detail: format!(
                "build context {} has no Dockerfile (run `sandpiper init` to seed one)",
                build_context.display()
            ),
        });
    }
    let output = run_command(&ExecRequest::new(
        docker_binary,
        vec![
            "build".to_string(),
            "-t".to_string(),
            image_tag.to_string(),
            build_context.display().to_string(),
        ],
        IMAGE_BUILD_TIMEOUT,
    ))?;
    if output.success() {
        return Ok(());
    }
    Err(SandboxError::ImageBuild {
        tag: image_tag.to_string(),
        detail: output.failure_summary(),
    })
}

/// Drives the image to a usable state: absent or broken images are rebuilt
/// from the build context and re-verified.
pub fn ensure_image_usable(
    docker_binary: &str,
    image_tag: &str,
    build_context: &Path,
) -> Result<ImageReadiness, SandboxError> {
    let readiness = match probe_image(docker_binary, image_tag)? {
        ImageState::Usable => return Ok(ImageReadiness::AlreadyUsable),
        ImageState::Absent => ImageReadiness::Built,
        ImageState::Broken { .. } => ImageReadiness::Rebuilt,
    };
    build_image(docker_binary, image_tag, build_context)?;
    match probe_image(docker_binary, image_tag)? {
        ImageState::Usable => Ok(readiness),
        ImageState::Absent => Err(SandboxError::ImageBuild {
            tag: image_tag.to_string(),
            detail: "image is still missing after a successful build".to_string(),
        }),
        ImageState::Broken { detail } => Err(SandboxError::ImageBuild {
            tag: image_tag.to_string(),
            detail: format!("image is still unusable after rebuild: {detail}"),
        }),
    }
}

pub struct LocalImageSandbox {
    docker_binary: String,
    image_tag: String,
    host_workspace: PathBuf,
    host_tools: Option<PathBuf>,
    agent_binary: String,
}

impl LocalImageSandbox {
    pub fn acquire(
        settings: &Settings,
        paths: &StatePaths,
        workspace: &Path,
        tool_store: Option<&Path>,
    ) -> Result<Self, SandboxError> {
        let local = &settings.sandbox.local;
        runtime_available(&local.docker_binary)?;
        let build_context = settings.resolve_build_context(paths);
        ensure_image_usable(&local.docker_binary, &local.image_tag, &build_context)?;
        fs::create_dir_all(workspace).map_err(|err| SandboxError::Io {
            path: workspace.display().to_string(),
            source: err,
        })?;
        Ok(Self {
            docker_binary: local.docker_binary.clone(),
            image_tag: local.image_tag.clone(),
            host_workspace: workspace.to_path_buf(),
            host_tools: tool_store.map(Path::to_path_buf),
            agent_binary: settings.agent.binary.clone(),
        })
    }

    /// Maps a container workspace path onto the bind-mounted host
    /// directory. Paths outside the mount have no host counterpart.
    fn host_path_for(&self, remote: &str) -> Result<PathBuf, SandboxError> {
        let rest = remote
            .strip_prefix(CONTAINER_WORKSPACE_DIR)
            .filter(|rest| rest.is_empty() || rest.starts_with('/'))
            .ok_or_else(|| SandboxError::Config {
                detail: format!("path {remote} is outside the {CONTAINER_WORKSPACE_DIR} mount"),
            })?;
        let rest = rest.trim_start_matches('/');
        if rest.split('/').any(|part| part == "..") {
            return Err(SandboxError::Config {
                detail: format!("path {remote} escapes the workspace"),
            });
        }
        if rest.is_empty() {
            return Ok(self.host_workspace.clone());
        }
        Ok(self.host_workspace.join(rest))
    }
}

impl Sandbox for LocalImageSandbox {
    fn kind(&self) -> SandboxBackend {
        SandboxBackend::LocalImage
    }

    fn describe(&self) -> String {
        format!("image {}", self.image_tag)
    }

    fn profile(&self) -> SandboxProfile {
        SandboxProfile {
            workspace_dir: CONTAINER_WORKSPACE_DIR.to_string(),
            tools_dir: self
                .host_tools
                .as_ref()
                .map(|_| CONTAINER_TOOLS_DIR.to_string()),
            shared_filesystem: true,
        }
    }

    fn exec(&self, command: &SandboxCommand) -> Result<CommandOutput, SandboxError> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "-v".to_string(),
            format!("{}:{}", self.host_workspace.display(), CONTAINER_WORKSPACE_DIR),
        ];
        if let Some(tools) = &self.host_tools {
            args.push("-v".to_string());
            args.push(format!("{}:{}:ro", tools.display(), CONTAINER_TOOLS_DIR));
        }
        args.push("--workdir".to_string());
        args.push(CONTAINER_WORKSPACE_DIR.to_string());
        args.push(self.image_tag.clone());
        args.push(command.program.clone());
        args.extend(command.args.iter().cloned());

        let request = ExecRequest::new(&self.docker_binary, args, command.timeout);
        Ok(run_command(&request)?)
    }

    fn push_file(&self, local: &Path, remote: &str) -> Result<(), SandboxError> {
        let target = self.host_path_for(remote)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|err| SandboxError::Io {
                path: parent.display().to_string(),
                source: err,
            })?;
        }
        fs::copy(local, &target).map_err(|err| SandboxError::Copy {
            from: local.display().to_string(),
            to: remote.to_string(),
            source: err,
        })?;
        Ok(())
    }

    fn pull_file(&self, remote: &str, local: &Path) -> Result<(), SandboxError> {
        let source = self.host_path_for(remote)?;
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent).map_err(|err| SandboxError::Io {
                path: parent.display().to_string(),
                source: err,
            })?;
        }
        fs::copy(&source, local).map_err(|err| SandboxError::Copy {
            from: remote.to_string(),
            to: local.display().to_string(),
            source: err,
        })?;
        Ok(())
    }

    fn workspace_listing(&self) -> Result<Vec<String>, SandboxError> {
        let entries = fs::read_dir(&self.host_workspace).map_err(|err| SandboxError::Listing {
            detail: format!("{}: {err}", self.host_workspace.display()),
        })?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| SandboxError::Listing {
                detail: format!("{}: {err}", self.host_workspace.display()),
            })?;
            let is_file = entry
                .file_type()
                .map(|kind| kind.is_file())
                .unwrap_or(false);
            if !is_file {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn reset_agent_state(&self) -> ResetOutcome {
        // Agent home state dies with each --rm container; only droppings
        // written into the bind-mounted workspace can survive into a retry.
        let name = match self.agent_binary.rsplit('/').next() {
            Some(name) if !name.is_empty() => name,
            _ => {
                return ResetOutcome::Failed {
                    detail: format!("agent binary `{}` has no usable name", self.agent_binary),
                }
            }
        };
        let target = self.host_workspace.join(format!(".{name}"));
        let meta = match target.symlink_metadata() {
            Ok(meta) => meta,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return ResetOutcome::Clean,
            Err(err) => {
                return ResetOutcome::Failed {
                    detail: format!("{}: {err}", target.display()),
                }
            }
        };
        let removal = if meta.is_dir() {
            fs::remove_dir_all(&target)
        } else {
            fs::remove_file(&target)
        };
        match removal {
            Ok(()) => ResetOutcome::Cleared,
            Err(err) => ResetOutcome::Failed {
                detail: format!("{}: {err}", target.display()),
            },
        }
    }

    fn release(self: Box<Self>, _keep: bool) -> ReleaseOutcome {
        // The image is a cached artifact shared across jobs, never a
        // per-job resource.
        ReleaseOutcome::Retained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox_at(workspace: &Path) -> LocalImageSandbox {
        LocalImageSandbox {
            docker_binary: "docker".to_string(),
            image_tag: "sandpiper-sandbox".to_string(),
            host_workspace: workspace.to_path_buf(),
            host_tools: None,
            agent_binary: "claude".to_string(),
        }
    }

    #[test]
    fn container_paths_map_onto_the_host_workspace() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sandbox = sandbox_at(dir.path());

        assert_eq!(
            sandbox.host_path_for("/workspace/out.txt").expect("map"),
            dir.path().join("out.txt")
        );
        assert_eq!(
            sandbox.host_path_for("/workspace/a/b.txt").expect("map"),
            dir.path().join("a/b.txt")
        );
        assert_eq!(sandbox.host_path_for("/workspace").expect("map"), dir.path());
    }

    #[test]
    fn paths_outside_the_mount_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sandbox = sandbox_at(dir.path());

        for bad in ["/tools/x.py", "/etc/passwd", "/workspacefoo/x", "relative.txt"] {
            let err = sandbox.host_path_for(bad).expect_err("must reject");
            assert!(matches!(err, SandboxError::Config { .. }), "{bad}");
        }
        let err = sandbox
            .host_path_for("/workspace/../secrets")
            .expect_err("escape");
        assert!(matches!(err, SandboxError::Config { .. }));
    }

    #[test]
    fn push_and_pull_copy_through_the_shared_mount() {
        let dir = tempfile::tempdir().expect("tempdir");
        let workspace = dir.path().join("ws");
        fs::create_dir_all(&workspace).expect("workspace");
        let sandbox = sandbox_at(&workspace);

        let source = dir.path().join("input.txt");
        fs::write(&source, b"payload").expect("write source");
        sandbox
            .push_file(&source, "/workspace/context/input.txt")
            .expect("push");
        assert_eq!(
            fs::read(workspace.join("context/input.txt")).expect("pushed"),
            b"payload"
        );

        let pulled = dir.path().join("pulled.txt");
        sandbox
            .pull_file("/workspace/context/input.txt", &pulled)
            .expect("pull");
        assert_eq!(fs::read(&pulled).expect("pulled"), b"payload");
    }

    #[test]
    fn reset_removes_workspace_droppings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let workspace = dir.path().join("ws");
        fs::create_dir_all(workspace.join(".claude")).expect("droppings");
        fs::write(workspace.join(".claude/session.json"), b"{}").expect("session");
        fs::write(workspace.join("out.py"), b"x").expect("output");
        let sandbox = sandbox_at(&workspace);

        assert_eq!(sandbox.reset_agent_state(), ResetOutcome::Cleared);
        assert!(!workspace.join(".claude").exists());
        assert!(workspace.join("out.py").exists());

        // Nothing left on a second pass.
        assert_eq!(sandbox.reset_agent_state(), ResetOutcome::Clean);
    }

    #[test]
    fn workspace_listing_reports_files_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let workspace = dir.path().join("ws");
        fs::create_dir_all(workspace.join("subdir")).expect("subdir");
        fs::write(workspace.join("b.py"), b"x").expect("file");
        fs::write(workspace.join("a.sh"), b"x").expect("file");
        let sandbox = sandbox_at(&workspace);

        assert_eq!(sandbox.workspace_listing().expect("list"), vec!["a.sh", "b.py"]);
    }

    #[test]
    fn default_dockerfile_provides_agent_and_interpreters() {
        assert!(DEFAULT_DOCKERFILE.contains("@anthropic-ai/claude-code"));
        assert!(DEFAULT_DOCKERFILE.contains("python3"));
        assert!(DEFAULT_DOCKERFILE.contains("WORKDIR /workspace"));
    }
}
