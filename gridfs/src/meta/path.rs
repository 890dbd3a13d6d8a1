//! Full-path helpers. Keys in both regions are absolute, `/`-separated paths
//! without a trailing separator (except the root itself).

pub const ROOT: &str = "/";

/// Join a directory path and a child name into the child's full path.
///
/// An empty `parent` denotes the root record itself, whose full path is its name.
pub fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        return name.to_string();
    }
    if parent.ends_with('/') {
        format!("{parent}{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Split a full path into `(parent, name)`. Returns `None` for the root.
pub fn split(path: &str) -> Option<(String, String)> {
    let path = normalize(path);
    if path == ROOT {
        return None;
    }
    let n = path.rfind('/')?;
    let name = path[n + 1..].to_string();
    if n == 0 {
        Some((ROOT.to_string(), name))
    } else {
        Some((path[..n].to_string(), name))
    }
}

/// Collapse repeated separators and strip trailing ones; `""` maps to `/`.
pub fn normalize(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let mut out = String::from(ROOT);
    out.push_str(&parts.join("/"));
    out
}

/// Whether `name` can be used as a single directory entry name.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\0'])
}
