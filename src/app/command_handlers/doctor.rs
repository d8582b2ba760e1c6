use crate::app::command_support::{load_settings, map_config_err};
use crate::config::{default_global_config_path, SandboxBackend, Settings};
use crate::sandbox::{probe_image, runtime_available, ImageState};
use crate::shared::default_state_root_path;
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
struct DoctorFinding {
    id: String,
    ok: bool,
    detail: String,
    remediation: String,
}

fn doctor_finding(
    id: impl Into<String>,
    ok: bool,
    detail: impl Into<String>,
    remediation: impl Into<String>,
) -> DoctorFinding {
    DoctorFinding {
        id: id.into(),
        ok,
        detail: detail.into(),
        remediation: remediation.into(),
    }
}

fn is_binary_available(binary: &str) -> bool {
    if binary.trim().is_empty() {
        return false;
    }
    let explicit = Path::new(binary);
    if explicit.components().count() > 1 || explicit.is_absolute() {
        return is_executable_file(explicit);
    }

    let Some(path) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path).any(|dir| {
        let candidate = dir.join(binary);
        if is_executable_file(&candidate) {
            return true;
        }
        #[cfg(windows)]
        {
            if is_executable_file(&dir.join(format!("{binary}.exe"))) {
                return true;
            }
        }
        false
    })
}

fn is_executable_file(path: &Path) -> bool {
    let Ok(metadata) = fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

fn now_nanos() -> i128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i128)
        .unwrap_or(0)
}

fn can_write_directory(path: &Path) -> Result<(), String> {
    fs::create_dir_all(path).map_err(|e| format!("failed to create {}: {e}", path.display()))?;
    let probe = path.join(format!(".sandpiper-doctor-{}", now_nanos()));
    fs::write(&probe, b"ok").map_err(|e| format!("failed to write {}: {e}", probe.display()))?;
    fs::remove_file(&probe).map_err(|e| format!("failed to remove {}: {e}", probe.display()))
}

fn sandbox_findings(settings: &Settings, findings: &mut Vec<DoctorFinding>) {
    match settings.sandbox.backend {
        SandboxBackend::LocalImage => {
            let docker = &settings.sandbox.local.docker_binary;
            let tag = &settings.sandbox.local.image_tag;
            match runtime_available(docker) {
                Ok(()) => {
                    findings.push(doctor_finding(
                        "sandbox.runtime",
                        true,
                        format!("binary={docker}"),
                        "none",
                    ));
                    findings.push(match probe_image(docker, tag) {
                        Ok(ImageState::Usable) => doctor_finding(
                            "sandbox.image",
                            true,
                            format!("image={tag} state=usable"),
                            "none",
                        ),
                        Ok(ImageState::Absent) => doctor_finding(
                            "sandbox.image",
                            false,
                            format!("image={tag} state=absent"),
                            "run `sandpiper image build`",
                        ),
                        Ok(ImageState::Broken { detail }) => doctor_finding(
                            "sandbox.image",
                            false,
                            format!("image={tag} state=broken: {detail}"),
                            "run `sandpiper image rebuild`",
                        ),
                        Err(err) => doctor_finding(
                            "sandbox.image",
                            false,
                            err.to_string(),
                            "run `sandpiper image build`",
                        ),
                    });
                }
                Err(err) => findings.push(doctor_finding(
                    "sandbox.runtime",
                    false,
                    err.to_string(),
                    "install Docker or point sandbox.local.docker_binary at a compatible runtime",
                )),
            }
        }
        SandboxBackend::Remote => {
            findings.push(doctor_finding(
                "sandbox.api",
                true,
                format!("api_base={}", settings.sandbox.remote.api_base),
                "none",
            ));
            let token_env = settings.sandbox.remote.api_token_env.trim();
            if token_env.is_empty() {
                findings.push(doctor_finding(
                    "sandbox.token",
                    true,
                    "auth=disabled (sandbox.remote.api_token_env is unset)",
                    "none",
                ));
            } else {
                let present = std::env::var(token_env)
                    .map(|value| !value.trim().is_empty())
                    .unwrap_or(false);
                findings.push(doctor_finding(
                    "sandbox.token",
                    present,
                    format!("env={token_env}"),
                    format!("export {token_env} with the provider token"),
                ));
            }
        }
    }
}

pub fn cmd_doctor() -> Result<String, String> {
    let mut findings = Vec::new();

    let config_path = default_global_config_path().map_err(map_config_err)?;
    findings.push(doctor_finding(
        "config.path",
        config_path.exists(),
        format!("config={}", config_path.display()),
        "run `sandpiper init` to create a default config",
    ));

    let settings = match load_settings() {
        Ok(settings) => {
            findings.push(doctor_finding(
                "config.parse",
                true,
                "settings parsed and validated",
                "none",
            ));
            Some(settings)
        }
        Err(err) => {
            findings.push(doctor_finding(
                "config.parse",
                false,
                format!("settings load failed: {err}"),
                "fix ~/.sandpiper/config.yaml and retry `sandpiper doctor`",
            ));
            None
        }
    };

    match default_state_root_path() {
        Ok(root) => findings.push(match can_write_directory(&root) {
            Ok(()) => doctor_finding(
                "state.root",
                true,
                format!("writable={}", root.display()),
                "none",
            ),
            Err(err) => doctor_finding(
                "state.root",
                false,
                err,
                "grant write permission to the state root",
            ),
        }),
        Err(err) => findings.push(doctor_finding(
            "state.root",
            false,
            err.to_string(),
            "set HOME so the state root can be resolved",
        )),
    }

    if let Some(settings) = settings.as_ref() {
        sandbox_findings(settings, &mut findings);

        let agent = &settings.agent.binary;
        findings.push(doctor_finding(
            "agent.binary",
            is_binary_available(agent),
            format!("binary={agent}"),
            "install the agent CLI or point agent.binary at an executable",
        ));

        if settings.tools.remote.is_some() {
            let git = &settings.tools.git_binary;
            findings.push(doctor_finding(
                "tools.git",
                is_binary_available(git),
                format!("binary={git}"),
                "install git or set tools.git_binary",
            ));
        }
    }

    let failed = findings.iter().filter(|f| !f.ok).count();
    let summary = if failed == 0 { "healthy" } else { "unhealthy" };
    let mut lines = vec![
        format!("summary={summary}"),
        format!("checks_total={}", findings.len()),
        format!("checks_failed={failed}"),
    ];
    for finding in findings {
        lines.push(format!(
            "check:{}={}",
            finding.id,
            if finding.ok { "ok" } else { "fail" }
        ));
        lines.push(format!("check:{}.detail={}", finding.id, finding.detail));
        if !finding.ok {
            lines.push(format!(
                "check:{}.remediation={}",
                finding.id, finding.remediation
            ));
        }
    }
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn executable_bit_decides_availability() {
        let dir = tempdir().expect("tempdir");
        let tool = dir.path().join("tool");
        fs::write(&tool, "#!/bin/sh\n").expect("write");

        #[cfg(unix)]
        {
            let mut perms = fs::metadata(&tool).expect("metadata").permissions();
            perms.set_mode(0o644);
            fs::set_permissions(&tool, perms).expect("chmod");
            assert!(!is_executable_file(&tool));

            let mut perms = fs::metadata(&tool).expect("metadata").permissions();
            perms.set_mode(0o755);
            fs::set_permissions(&tool, perms).expect("chmod");
            assert!(is_executable_file(&tool));
        }

        assert!(!is_executable_file(&dir.path().join("absent")));
        assert!(!is_executable_file(dir.path()));
    }

    #[test]
    fn explicit_paths_bypass_the_path_walk() {
        let dir = tempdir().expect("tempdir");
        let tool = dir.path().join("runner.sh");
        fs::write(&tool, "#!/bin/sh\n").expect("write");
        #[cfg(unix)]
        {
            let mut perms = fs::metadata(&tool).expect("metadata").permissions();
            perms.set_mode(0o755);
            fs::set_permissions(&tool, perms).expect("chmod");
            assert!(is_binary_available(tool.to_str().expect("utf8 path")));
        }
        assert!(!is_binary_available(""));
        assert!(!is_binary_available(
            dir.path().join("missing").to_str().expect("utf8 path")
        ));
    }

    #[test]
    fn writable_directory_probe_cleans_up_after_itself() {
        let dir = tempdir().expect("tempdir");
        let target = dir.path().join("state");
        can_write_directory(&target).expect("writable");
        assert!(target.is_dir());
        assert_eq!(fs::read_dir(&target).expect("read_dir").count(), 0);
    }
}
