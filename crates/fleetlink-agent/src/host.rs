//! Host metadata for the registration hello.

use async_trait::async_trait;
use fleetlink_proto::HostInfo;

/// Source of the metadata an agent reports when it registers.
///
/// The protocol only requires that every field is present; how much of it
/// a deployment actually collects is up to the probe implementation.
#[async_trait]
pub trait HostProbe: Send + Sync {
    async fn probe(&self) -> HostInfo;
}

/// Probe backed by the standard library and the `hostname` crate.
///
/// Network-derived fields (public IP, MAC address) and the OS version are
/// reported as `"unknown"`; a richer probe can sit behind the same trait.
pub struct BasicHostProbe;

#[async_trait]
impl HostProbe for BasicHostProbe {
    async fn probe(&self) -> HostInfo {
        let unknown = || HostInfo::UNKNOWN.to_string();

        HostInfo {
            hostname: hostname::get()
                .map(|h| h.to_string_lossy().into_owned())
                .unwrap_or_else(|_| unknown()),
            cwd: std::env::current_dir()
                .map(|d| d.display().to_string())
                .unwrap_or_else(|_| unknown()),
            os_name: std::env::consts::OS.to_string(),
            os_version: unknown(),
            os_architecture: std::env::consts::ARCH.to_string(),
            local_ip: unknown(),
            public_ip: unknown(),
            mac_address: unknown(),
            is_admin: is_admin(),
            username: username().unwrap_or_else(unknown),
        }
    }
}

#[cfg(unix)]
fn is_admin() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
fn is_admin() -> bool {
    false
}

fn username() -> Option<String> {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|u| !u.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn probe_fills_every_field() {
        let info = BasicHostProbe.probe().await;
        assert!(!info.hostname.is_empty());
        assert!(!info.cwd.is_empty());
        assert_eq!(info.os_name, std::env::consts::OS);
        assert_eq!(info.os_architecture, std::env::consts::ARCH);
        assert!(!info.username.is_empty());
    }
}
