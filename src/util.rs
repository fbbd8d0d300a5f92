//! Small string helpers shared by the controller and the binary

/// Whether `s` is one of the entries of `slice`
pub fn contains_string(slice: &[&str], s: &str) -> bool {
    slice.iter().any(|item| *item == s)
}

/// Appends `a` to the comma-separated list `s` unless it is already an entry.
pub fn append_if_not_substring(a: &str, s: &str) -> String {
    if s.is_empty() {
        return a.to_string();
    }
    let mut entries: Vec<&str> = s.split(',').collect();
    if !contains_string(&entries, a) {
        entries.push(a);
    }
    entries.join(",")
}

/// Parse a `WATCH_NAMESPACE` value.
///
/// An empty (or all-blank) value yields an empty list, meaning every namespace.
pub fn get_watch_namespaces(value: &str) -> Vec<String> {
    if value.trim().is_empty() {
        return Vec::new();
    }
    value
        .split(',')
        .map(|ns| ns.trim().to_string())
        .filter(|ns| !ns.is_empty())
        .collect()
}

/// Whether an API error message reports that `kind` in `version` is not
/// served by the cluster (the CRD is not installed).
pub fn error_is_no_matches_for_kind(message: &str, kind: &str, version: &str) -> bool {
    message.starts_with(&format!(
        "no matches for kind \"{kind}\" in version \"{version}\""
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_if_not_substring() {
        assert_eq!(append_if_not_substring("a", ""), "a");
        assert_eq!(append_if_not_substring("c", "a,b"), "a,b,c");
        assert_eq!(append_if_not_substring("b", "a,b"), "a,b");
        // whole entries only, not substrings of entries
        assert_eq!(append_if_not_substring("a", "ab"), "ab,a");
    }

    #[test]
    fn test_contains_string() {
        assert!(contains_string(&["x", "y"], "y"));
        assert!(!contains_string(&[], "y"));
    }

    #[test]
    fn test_get_watch_namespaces() {
        assert!(get_watch_namespaces("").is_empty());
        assert!(get_watch_namespaces("  ").is_empty());
        assert_eq!(get_watch_namespaces("ns1"), vec!["ns1"]);
        assert_eq!(get_watch_namespaces(" ns1 , ns2,"), vec!["ns1", "ns2"]);
    }

    #[test]
    fn test_error_is_no_matches_for_kind() {
        let msg = "no matches for kind \"Route\" in version \"route.openshift.io/v1\"";
        assert!(error_is_no_matches_for_kind(msg, "Route", "route.openshift.io/v1"));
        assert!(!error_is_no_matches_for_kind(msg, "ServiceMonitor", "monitoring.coreos.com/v1"));
    }
}
