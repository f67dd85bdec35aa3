//! Phase Factory
//!
//! Grounded on `internal/build/{phase_config_provider,phases}.go`
//! and the design note: the Go side threads a chain of
//! `PhaseOperation` closures through a mutable `*DefaultPhaseConfigProvider`;
//! here each "option" is a free function `fn(PhaseConfig) -> Result<PhaseConfig>`
//! applied left to right with `?`, since `with_registry_access` can fail
//! while building the `CNB_REGISTRY_AUTH` env var.

use crate::docker::Bind;
use crate::errors::Result;
use std::collections::HashMap;

/// Everything needed to run one lifecycle phase container. Produced by
/// composing the `with_*` functions below over a `PhaseConfig::new` seed.
#[derive(Debug, Clone)]
pub struct PhaseConfig {
    pub image: String,
    pub phase: String,
    pub user: Option<String>,
    pub env: HashMap<String, String>,
    pub args: Vec<String>,
    pub binds: Vec<Bind>,
    pub network: Option<String>,
}

/// Proxy environment variables propagated into every phase container when
/// set in the caller's environment, both upper- and lower-case forms.
const PROXY_VARS: &[&str] = &["HTTP_PROXY", "HTTPS_PROXY", "NO_PROXY"];

impl PhaseConfig {
    /// The base configuration every phase starts from: builder image as the
    /// container image, `/cnb/lifecycle/{phase}` as the entrypoint command,
    /// `{layers_volume}:/layers` and `{app_volume}:/workspace` always bound,
    /// and ambient proxy env forwarded. Mirrors `ConcretePhaseManager.New`.
    pub fn new(builder_image: &str, phase: &str, layers_volume: &str, app_volume: &str) -> Self {
        let mut env = HashMap::new();
        for var in PROXY_VARS {
            if let Ok(value) = std::env::var(var) {
                env.insert(var.to_string(), value.clone());
                env.insert(var.to_lowercase(), value);
            }
        }
        PhaseConfig {
            image: builder_image.to_string(),
            phase: phase.to_string(),
            user: None,
            env,
            args: Vec::new(),
            binds: vec![
                Bind::rw(layers_volume, "/layers"),
                Bind::rw(app_volume, "/workspace"),
            ],
            network: None,
        }
    }

    /// Prepend `-log-level debug` when the lifecycle is newer than 0.4.0
    /// and the logger is verbose, matching `withLogLevel`'s strict
    /// greater-than semver gate.
    pub fn with_log_level(mut self, lifecycle_version_newer_than_0_4: bool, verbose: bool) -> Self {
        if lifecycle_version_newer_than_0_4 && verbose {
            let mut args = vec!["-log-level".to_string(), "debug".to_string()];
            args.append(&mut self.args);
            self.args = args;
        }
        self
    }
}

/// Append to the phase's command arguments.
pub fn with_args(mut config: PhaseConfig, args: &[&str]) -> Result<PhaseConfig> {
    config.args.extend(args.iter().map(|a| a.to_string()));
    Ok(config)
}

/// Prepend a single argument ahead of whatever is already queued, mirroring
/// `prependArg` (used by Analyze's `-skip-layers` and Export's `-daemon`).
pub fn prepend_arg(mut config: PhaseConfig, arg: &str) -> Result<PhaseConfig> {
    config.args.insert(0, arg.to_string());
    Ok(config)
}

/// Set the container network mode (`""`, `default`, `none`, `host`).
pub fn with_network(mut config: PhaseConfig, mode: &str) -> Result<PhaseConfig> {
    config.network = if mode.is_empty() {
        None
    } else {
        Some(mode.to_string())
    };
    Ok(config)
}

/// Grant the phase root access to the daemon socket: `user=root` plus a
/// bind-mount of `/var/run/docker.sock`. Used by Restore, Analyze
/// (non-publish), and Export (non-publish).
pub fn with_daemon_access(mut config: PhaseConfig) -> Result<PhaseConfig> {
    config.user = Some("root".to_string());
    config
        .binds
        .push(Bind::rw("/var/run/docker.sock", "/var/run/docker.sock"));
    Ok(config)
}

/// Run the phase as root without granting daemon access (publish-mode
/// Analyze/Export still needs root to write the exported image's owner
/// metadata, even though it talks to a registry instead of the daemon).
pub fn with_root(mut config: PhaseConfig) -> Result<PhaseConfig> {
    config.user = Some("root".to_string());
    Ok(config)
}

/// Append additional bind mounts (user-supplied `--volume`, cache/launch
/// cache volumes).
pub fn with_binds(mut config: PhaseConfig, binds: &[Bind]) -> Result<PhaseConfig> {
    config.binds.extend(binds.iter().cloned());
    Ok(config)
}

/// Grant registry access: sets `CNB_REGISTRY_AUTH` from the credentials the
/// caller resolved for `repos`, and switches the network to `host` so the
/// phase can reach the registry directly rather than through the daemon.
/// Mirrors `WithRegistryAccess`; auth resolution itself (`auth.BuildEnvVar`)
/// is represented here as a caller-supplied already-built JSON string,
/// since credential-store integration is left to a future collaborator.
pub fn with_registry_access(
    mut config: PhaseConfig,
    repos: &[&str],
    registry_auth_json: &str,
) -> Result<PhaseConfig> {
    let _ = repos;
    crate::redaction::add_global_secret(registry_auth_json);
    config
        .env
        .insert("CNB_REGISTRY_AUTH".to_string(), registry_auth_json.to_string());
    config.network = Some("host".to_string());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> PhaseConfig {
        PhaseConfig::new("pack-test/builder", "detector", "layers-vol", "app-vol")
    }

    #[test]
    fn base_config_binds_layers_and_app_volumes() {
        let config = base();
        assert!(config
            .binds
            .iter()
            .any(|b| b.source == "layers-vol" && b.target == "/layers"));
        assert!(config
            .binds
            .iter()
            .any(|b| b.source == "app-vol" && b.target == "/workspace"));
    }

    #[test]
    fn with_daemon_access_sets_root_and_socket_bind() {
        let config = with_daemon_access(base()).unwrap();
        assert_eq!(config.user.as_deref(), Some("root"));
        assert!(config
            .binds
            .iter()
            .any(|b| b.target == "/var/run/docker.sock"));
    }

    #[test]
    fn with_registry_access_sets_auth_env_and_host_network() {
        let config = with_registry_access(base(), &["acme/app"], "{\"acme/app\":\"token\"}").unwrap();
        assert_eq!(
            config.env.get("CNB_REGISTRY_AUTH").map(String::as_str),
            Some("{\"acme/app\":\"token\"}")
        );
        assert_eq!(config.network.as_deref(), Some("host"));
    }

    #[test]
    fn prepend_arg_puts_arg_first() {
        let config = with_args(base(), &["-cache-dir", "/cache"]).unwrap();
        let config = prepend_arg(config, "-skip-layers").unwrap();
        assert_eq!(config.args[0], "-skip-layers");
    }

    #[test]
    fn log_level_gate_requires_newer_than_0_4_and_verbose() {
        let config = with_args(base(), &["-app", "/workspace"]).unwrap();
        let not_gated = config.clone().with_log_level(false, true);
        assert_eq!(not_gated.args[0], "-app");

        let gated = config.with_log_level(true, true);
        assert_eq!(gated.args[0], "-log-level");
        assert_eq!(gated.args[1], "debug");
    }

    #[test]
    fn proxy_env_is_forwarded_when_set() {
        std::env::set_var("HTTP_PROXY", "http://proxy.local:8080");
        let config = base();
        assert_eq!(
            config.env.get("HTTP_PROXY").map(String::as_str),
            Some("http://proxy.local:8080")
        );
        assert_eq!(
            config.env.get("http_proxy").map(String::as_str),
            Some("http://proxy.local:8080")
        );
        std::env::remove_var("HTTP_PROXY");
    }
}
