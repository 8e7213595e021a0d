//! Locating the event log on disk.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Environment variable consulted for the log location by default.
pub const EVE_PATH_ENV: &str = "SURICATA_EVE_PATH";

/// Location used when nothing else names the log.
pub const DEFAULT_EVE_PATH: &str = "/var/log/suricata/eve.json";

/// Well-known Windows install locations, probed in order.
pub const WINDOWS_CANDIDATES: &[&str] = &[
    r"C:\Program Files\Suricata\log\eve.json",
    r"C:\ProgramData\Suricata\log\eve.json",
    r"C:\Suricata\log\eve.json",
];

const FILE_URL_SCHEME: &str = "file://";

/// Resolve the log path from, in order of precedence, an explicit path, a
/// `file://` URL, an environment-provided value and the built-in default.
///
/// Never fails: a path that does not exist yet is returned as-is and waited
/// for by the follower. On Windows a missing path is replaced by the first
/// existing entry of [`WINDOWS_CANDIDATES`].
pub fn resolve_path(
    explicit: Option<&Path>,
    file_url: Option<&str>,
    env_value: Option<&OsStr>,
) -> PathBuf {
    let resolved = explicit
        .filter(|path| !path.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .or_else(|| file_url.and_then(path_from_file_url))
        .or_else(|| {
            env_value
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        })
        .unwrap_or_else(|| PathBuf::from(DEFAULT_EVE_PATH));

    if cfg!(windows) && !resolved.exists() {
        return first_existing(WINDOWS_CANDIDATES).unwrap_or(resolved);
    }

    resolved
}

/// Strip the `file://` scheme from `url`, e.g. `file://C:/logs/eve.json`.
pub fn path_from_file_url(url: &str) -> Option<PathBuf> {
    url.strip_prefix(FILE_URL_SCHEME)
        .filter(|rest| !rest.is_empty())
        .map(PathBuf::from)
}

/// The first candidate path that exists on disk.
pub fn first_existing<I, P>(candidates: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    candidates
        .into_iter()
        .map(|candidate| candidate.as_ref().to_path_buf())
        .find(|candidate| candidate.exists())
}

/// Current non-empty value of the environment override `var`.
pub fn env_override(var: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}
