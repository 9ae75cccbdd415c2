//! Path naming for serverset directories and member nodes.

/// Fixed top-level namespace every serverset lives under.
pub const BASE_NAMESPACE: &str = "/aurora";

/// Prefix of every member node name; the store appends the sequence.
pub const MEMBER_PREFIX: &str = "member_";

/// Directory holding the members of `(environment, role, service)`.
pub fn base_znode_path(environment: &str, role: &str, service: &str) -> String {
    format!("{BASE_NAMESPACE}/{environment}/{role}/{service}")
}

/// Every non-root prefix of `path`, shallowest first, ending with `path`
/// itself.  Trailing and doubled separators produce no empty segments.
///
/// `"/discovery/test/gotest"` → `["/discovery", "/discovery/test", "/discovery/test/gotest"]`
pub fn split_paths(path: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::with_capacity(path.len());
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        current.push('/');
        current.push_str(segment);
        parts.push(current.clone());
    }
    parts
}

/// Path handed to a sequential create for a new member of `directory`.
pub fn member_path(directory: &str) -> String {
    format!("{directory}/{MEMBER_PREFIX}")
}

/// Sequence number assigned by the store, read from a member node name.
pub fn parse_sequence(child: &str) -> Option<u64> {
    let name = child.rsplit('/').next().unwrap_or(child);
    let digits = name.len() - name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    name[name.len() - digits..].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_znode_path_composes_segments() {
        assert_eq!(
            base_znode_path("test", "test", "gotest"),
            "/aurora/test/test/gotest"
        );
    }

    #[test]
    fn split_paths_full() {
        assert_eq!(
            split_paths("/discovery/test/gotest"),
            vec!["/discovery", "/discovery/test", "/discovery/test/gotest"]
        );
    }

    #[test]
    fn split_paths_trailing_separator() {
        assert_eq!(
            split_paths("/discovery/test/"),
            vec!["/discovery", "/discovery/test"]
        );
    }

    #[test]
    fn split_paths_root() {
        assert!(split_paths("/").is_empty());
    }

    #[test]
    fn split_paths_doubled_separator() {
        assert_eq!(split_paths("/a//b"), vec!["/a", "/a/b"]);
    }

    #[test]
    fn member_path_appends_prefix() {
        assert_eq!(member_path("/aurora/a/b/c"), "/aurora/a/b/c/member_");
    }

    #[test]
    fn parse_sequence_reads_suffix() {
        assert_eq!(parse_sequence("member_0000000007"), Some(7));
        assert_eq!(parse_sequence("/aurora/a/b/c/member_0000000123"), Some(123));
        assert_eq!(parse_sequence("member_"), None);
        assert_eq!(parse_sequence("lock"), None);
    }
}
