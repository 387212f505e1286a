//! Label keys attached to containers.
//!
//! Labels are the only structured metadata channel between the run orchestrator, the
//! creation collaborator and the runtime. The orchestrator reads [`LOG_URI`] and writes
//! [`ERROR`]; every other key is passed through untouched.

use crate::ModelError;

/// Common prefix of skiff-managed labels.
pub const PREFIX: &str = "nerdctl/";

/// Namespace the container was created in (e.g. `"default"`, `"k8s.io"`).
pub const NAMESPACE: &str = "nerdctl/namespace";

/// Human-friendly name.
///
/// Several containers may carry the same name label.
pub const NAME: &str = "nerdctl/name";

pub const COMPOSE_PROJECT: &str = "com.docker.compose.project";
pub const COMPOSE_SERVICE: &str = "com.docker.compose.service";
pub const COMPOSE_NETWORK: &str = "com.docker.compose.network";
pub const COMPOSE_VOLUME: &str = "com.docker.compose.volume";

pub const HOSTNAME: &str = "nerdctl/hostname";
pub const DOMAINNAME: &str = "nerdctl/domainname";

/// Host entries appended to `/etc/hosts`.
pub const EXTRA_HOSTS: &str = "nerdctl/extraHosts";

/// Per-container state directory.
pub const STATE_DIR: &str = "nerdctl/state-dir";

/// JSON-encoded list of network names, e.g. `["bridge"]`. See [`decode_networks`].
pub const NETWORKS: &str = "nerdctl/networks";

/// JSON-encoded port mappings. Deprecated, kept for containers created by older releases.
pub const PORTS: &str = "nerdctl/ports";

/// Static IPv4 address assigned by the user.
pub const IP_ADDRESS: &str = "nerdctl/ip";
/// Static IPv6 address assigned by the user.
pub const IP6_ADDRESS: &str = "nerdctl/ip6";

/// Where the container's output is shipped.
pub const LOG_URI: &str = "nerdctl/log-uri";

pub const PID_FILE: &str = "nerdctl/pid-file";

/// JSON-encoded list of anonymous volume names.
pub const ANONYMOUS_VOLUMES: &str = "nerdctl/anonymous-volumes";

/// Normalized platform string like `"linux/ppc64le"`.
pub const PLATFORM: &str = "nerdctl/platform";
pub const MOUNTS: &str = "nerdctl/mounts";

/// Seconds to wait when stopping the container.
pub const STOP_TIMEOUT: &str = "nerdctl/stop-timeout";
pub const MAC_ADDRESS: &str = "nerdctl/mac-address";
pub const PID_CONTAINER: &str = "nerdctl/pid-container";
pub const IPC: &str = "nerdctl/ipc";

/// Human-readable description of why the last run failed.
pub const ERROR: &str = "nerdctl/error";

/// Whether a network is the default one owned by the tool (`"true"` / `"false"`).
pub const DEFAULT_NETWORK: &str = "nerdctl/default-network";

/// Set when the container was created with `--rm`.
pub const CONTAINER_AUTO_REMOVE: &str = "nerdctl/auto-remove";

pub const LOG_CONFIG: &str = "nerdctl/log-config";
pub const HOST_CONFIG: &str = "nerdctl/host-config";
pub const DNS_SETTING: &str = "nerdctl/dns";
pub const USER: &str = "nerdctl/user";

/// Health check configuration.
pub const HEALTH_CHECK: &str = "nerdctl/healthcheck";
/// Current health state (status and failing streak).
pub const HEALTH_STATE: &str = "nerdctl/healthstate";

/// Decode the [`NETWORKS`] label value.
pub fn decode_networks(value: &str) -> Result<Vec<String>, ModelError> {
    serde_json::from_str(value).map_err(|e| ModelError::InvalidLabel {
        key: NETWORKS,
        reason: e.to_string(),
    })
}

/// Returns `true` if the key belongs to the skiff namespace.
#[inline]
pub fn is_managed(key: &str) -> bool {
    key.starts_with(PREFIX)
}
