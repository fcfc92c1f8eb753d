//! POSIX path helpers for remote (SFTP) destinations.
//!
//! Remote paths are always `/`-delimited regardless of the local platform.

/// Normalizes the optional default remote path into a prefix that is either
/// empty or both starts and ends with `/`.
pub fn normalize_prefix(prefix: Option<&str>) -> String {
    let prefix = prefix.unwrap_or_default();
    if prefix.is_empty() {
        return String::new();
    }
    let mut normalized = String::with_capacity(prefix.len() + 2);
    if !prefix.starts_with('/') {
        normalized.push('/');
    }
    normalized.push_str(prefix);
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    normalized
}

/// Everything before the final `/`, with trailing slashes removed unless the
/// result is the root itself.
pub fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        None => "",
        Some(idx) => {
            let head = &path[..=idx];
            let trimmed = head.trim_end_matches('/');
            if trimmed.is_empty() { &head[..1] } else { trimmed }
        }
    }
}

/// Everything after the final `/`.
pub fn basename(path: &str) -> &str {
    match path.rfind('/') {
        None => path,
        Some(idx) => &path[idx + 1..],
    }
}

/// Collapses redundant separators and `.`/`..` components lexically.
pub fn normalize(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Destination of `object_key` on the remote endpoint under `prefix`
/// (already normalized with [`normalize_prefix`]).
pub fn remote_destination(prefix: &str, object_key: &str) -> String {
    let dir = dirname(object_key);
    let name = basename(object_key);
    if dir.is_empty() {
        normalize(&format!("{prefix}{name}"))
    } else {
        normalize(&format!("{prefix}{dir}/{name}"))
    }
}
