//! Reachability preflight for paths that may live on a network share.

use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const SMB_PORT: u16 = 445;

/// Default probe timeout. Kept short so a dead share fails fast instead of
/// hanging the single UI thread.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Check whether a path is reachable before opening it.
///
/// UNC paths (`\\server\share\...`) get a bounded TCP probe against the
/// server's SMB port; local paths are a plain existence check.
pub fn is_path_available(path: &Path, timeout: Duration) -> bool {
    let raw = path.to_string_lossy();
    let Some(server) = unc_server(&raw) else {
        let exists = path.exists();
        debug!(path = %raw, exists, "local path check");
        return exists;
    };

    let addrs = match (server.as_str(), SMB_PORT).to_socket_addrs() {
        Ok(a) => a,
        Err(e) => {
            debug!(server = %server, error = %e, "could not resolve share host");
            return false;
        }
    };
    for addr in addrs {
        if TcpStream::connect_timeout(&addr, timeout).is_ok() {
            debug!(server = %server, "share host reachable");
            return true;
        }
    }
    debug!(server = %server, "share host unreachable");
    false
}

/// Extract the host from a UNC path, or None for local paths.
fn unc_server(raw: &str) -> Option<String> {
    let rest = raw.strip_prefix("\\\\").or_else(|| raw.strip_prefix("//"))?;
    let server = rest.split(['\\', '/']).next()?;
    if server.is_empty() {
        None
    } else {
        Some(server.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_path_uses_existence_check() {
        assert!(is_path_available(Path::new("."), DEFAULT_PROBE_TIMEOUT));
        assert!(!is_path_available(
            Path::new("/definitely/not/a/real/path"),
            DEFAULT_PROBE_TIMEOUT
        ));
    }

    #[test]
    fn unc_server_extraction() {
        assert_eq!(
            unc_server(r"\\fileserver\scans\a.pdf"),
            Some("fileserver".to_string())
        );
        assert_eq!(unc_server("//fileserver/scans"), Some("fileserver".to_string()));
        assert_eq!(unc_server("/tmp/a.pdf"), None);
        assert_eq!(unc_server(r"C:\tmp\a.pdf"), None);
    }
}
