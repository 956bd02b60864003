//! Privilege checks gating the raw-socket SYN worker.

use cortex_core::{Error, Result};

/// Returns whether the current process can open raw packet captures
/// (effectively root on Linux).
pub fn has_raw_socket_capability() -> Result<bool> {
    #[cfg(target_os = "linux")]
    {
        use nix::unistd::Uid;
        Ok(Uid::effective().is_root())
    }

    #[cfg(not(target_os = "linux"))]
    {
        Err(Error::Network(
            "raw-socket privilege checking is only implemented on Linux".to_string(),
        ))
    }
}

/// Fails fast with a descriptive error if the process lacks the
/// capability to open raw packet captures.
pub fn check_privileges() -> Result<()> {
    if !has_raw_socket_capability()? {
        return Err(Error::Network(
            "insufficient privileges for raw socket access; run as root or grant \
             CAP_NET_RAW (sudo setcap cap_net_raw+eip /path/to/binary)"
                .to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_raw_socket_capability_does_not_panic() {
        let result = has_raw_socket_capability();
        assert!(result.is_ok());
    }

    #[test]
    fn check_privileges_matches_capability() {
        let has_cap = has_raw_socket_capability().unwrap_or(false);
        let checked = check_privileges();
        assert_eq!(checked.is_ok(), has_cap);
    }
}
