//! Pure string path helpers.
//!
//! Index paths are plain strings with `/` separators. They may start with
//! the `${workspace_loc}` token, which providers expand against their
//! workspace root. Nothing here touches the file system.

pub const WORKSPACE_LOC: &str = "${workspace_loc}";

/// Shape of an include or root path, which decides how it is searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathShape {
    /// `/abs/x.sv`, `C:/x.sv` or `${workspace_loc}/x.sv`
    Absolute,
    /// Contains a `..` segment
    UpDir,
    /// `./x.sv`
    DotRelative,
    /// `x.sv`, `dir/x.sv`
    Bare,
}

pub fn is_absolute(path: &str) -> bool {
    let bytes = path.as_bytes();
    path.starts_with('/')
        || path.starts_with('\\')
        || path.starts_with(WORKSPACE_LOC)
        || (bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':')
}

pub fn classify(path: &str) -> PathShape {
    if is_absolute(path) {
        PathShape::Absolute
    } else if path.split(['/', '\\']).any(|seg| seg == "..") {
        PathShape::UpDir
    } else if path.starts_with("./") || path.starts_with(".\\") {
        PathShape::DotRelative
    } else {
        PathShape::Bare
    }
}

/// Collapse separators, `.` and `..` segments.
///
/// `..` above a relative start is kept; `..` above the root is dropped.
pub fn normalize(path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }
    let rooted = path.starts_with('/') || path.starts_with('\\');
    let mut segments: Vec<&str> = Vec::new();

    for seg in path.split(['/', '\\']) {
        match seg {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." && last != WORKSPACE_LOC && !is_drive(last) => {
                    segments.pop();
                }
                Some(_) => {
                    if !segments.last().is_some_and(|s| *s == WORKSPACE_LOC || is_drive(s)) {
                        segments.push("..");
                    }
                }
                None if rooted => {}
                None => segments.push(".."),
            },
            other => segments.push(other),
        }
    }

    let body = segments.join("/");
    match (rooted, body.is_empty()) {
        (true, _) => format!("/{body}"),
        (false, true) => ".".to_string(),
        (false, false) => body,
    }
}

fn is_drive(seg: &str) -> bool {
    let bytes = seg.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Join and normalize. An absolute `rel` replaces `dir`.
pub fn join(dir: &str, rel: &str) -> String {
    if is_absolute(rel) || dir.is_empty() {
        normalize(rel)
    } else {
        normalize(&format!("{dir}/{rel}"))
    }
}

/// Directory portion of a path, or `None` for a bare file name.
pub fn parent_dir(path: &str) -> Option<String> {
    let trimmed = path.trim_end_matches(['/', '\\']);
    let idx = trimmed.rfind(['/', '\\'])?;
    if idx == 0 {
        Some("/".to_string())
    } else {
        Some(trimmed[..idx].to_string())
    }
}

pub fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Replace a leading `${workspace_loc}` with the workspace root.
pub fn expand_workspace_loc(path: &str, workspace_root: Option<&str>) -> String {
    match (path.strip_prefix(WORKSPACE_LOC), workspace_root) {
        (Some(rest), Some(root)) => normalize(&format!("{root}/{rest}")),
        _ => path.to_string(),
    }
}

/// Expand `${NAME}` references from the process environment.
///
/// `${workspace_loc}` and unset variables are left untouched.
pub fn expand_env(path: &str) -> String {
    expand_vars(path, |name| std::env::var(name).ok())
}

/// Expand `${NAME}` references with a lookup function.
pub fn expand_vars(path: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(path.len());
    let mut rest = path;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = &after[..end];
        match lookup(name).filter(|_| name != "workspace_loc") {
            Some(value) => out.push_str(&value),
            None => out.push_str(&rest[start..start + 3 + end]),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

/// Rewrite an absolute path under `workspace_root` into `${workspace_loc}` form.
pub fn to_workspace_relative(path: &str, workspace_root: &str) -> Option<String> {
    let root = normalize(workspace_root);
    let rest = path.strip_prefix(&root)?;
    let rest = rest.strip_prefix('/')?;
    Some(format!("{WORKSPACE_LOC}/{rest}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("a/b/../c"), "a/c");
        assert_eq!(normalize("/a//b/./c/"), "/a/b/c");
        assert_eq!(normalize("../x"), "../x");
        assert_eq!(normalize("a/../../x"), "../x");
        assert_eq!(normalize("/../x"), "/x");
        assert_eq!(normalize("a\\b\\..\\c"), "a/c");
        assert_eq!(normalize("./"), ".");
        assert_eq!(normalize("${workspace_loc}/p/../q"), "${workspace_loc}/q");
        assert_eq!(normalize("${workspace_loc}/../q"), "${workspace_loc}/q");
        assert_eq!(normalize("C:/a/../b"), "C:/b");
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("/abs/top.sv"), PathShape::Absolute);
        assert_eq!(classify("${workspace_loc}/p/top.sv"), PathShape::Absolute);
        assert_eq!(classify("C:/x.sv"), PathShape::Absolute);
        assert_eq!(classify("../inc/defs.svh"), PathShape::UpDir);
        assert_eq!(classify("inc/../defs.svh"), PathShape::UpDir);
        assert_eq!(classify("./defs.svh"), PathShape::DotRelative);
        assert_eq!(classify("defs.svh"), PathShape::Bare);
        assert_eq!(classify("uvm/macros.svh"), PathShape::Bare);
    }

    #[test]
    fn test_join_and_parent() {
        assert_eq!(join("/p/rtl", "../inc/a.svh"), "/p/inc/a.svh");
        assert_eq!(join("/p/rtl", "/abs.svh"), "/abs.svh");
        assert_eq!(parent_dir("/p/rtl/top.sv").as_deref(), Some("/p/rtl"));
        assert_eq!(parent_dir("/top.sv").as_deref(), Some("/"));
        assert_eq!(parent_dir("top.sv"), None);
        assert_eq!(file_name("/p/rtl/top.sv"), "top.sv");
    }

    #[test]
    fn test_workspace_token() {
        assert_eq!(
            expand_workspace_loc("${workspace_loc}/proj/top.sv", Some("/ws")),
            "/ws/proj/top.sv"
        );
        assert_eq!(expand_workspace_loc("${workspace_loc}/x", None), "${workspace_loc}/x");
        assert_eq!(
            to_workspace_relative("/ws/proj/top.sv", "/ws/").as_deref(),
            Some("${workspace_loc}/proj/top.sv")
        );
        assert_eq!(to_workspace_relative("/other/top.sv", "/ws"), None);
        assert_eq!(to_workspace_relative("/wsx/top.sv", "/ws"), None);
    }

    #[test]
    fn test_expand_vars() {
        let lookup = |name: &str| (name == "UVM_HOME").then(|| "/tools/uvm".to_string());
        assert_eq!(expand_vars("${UVM_HOME}/src", lookup), "/tools/uvm/src");
        assert_eq!(expand_vars("${NOPE}/src", lookup), "${NOPE}/src");
        assert_eq!(expand_vars("${workspace_loc}/a", |_| Some("x".into())), "${workspace_loc}/a");
        assert_eq!(expand_vars("${UNCLOSED", lookup), "${UNCLOSED");
    }
}
