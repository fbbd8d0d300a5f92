use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::crd::BaseApplication;

/// Union of `maps`; for a key present in several, the last map wins.
pub fn merge_maps(maps: &[&BTreeMap<String, String>]) -> BTreeMap<String, String> {
    let mut dest = BTreeMap::new();
    for map in maps {
        dest.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    dest
}

/// `merge_maps` over an optional metadata map and the desired entries.
pub fn merge_optional_maps(
    existing: Option<&BTreeMap<String, String>>,
    desired: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    match existing {
        Some(existing) => merge_maps(&[existing, desired]),
        None => desired.clone(),
    }
}

/// Replace labels with the application's and merge its annotations over
/// whatever the cluster already put on the object.
pub(crate) fn apply_app_meta(meta: &mut ObjectMeta, app: &impl BaseApplication) {
    meta.labels = Some(app.desired_labels());
    meta.annotations = Some(merge_optional_maps(
        meta.annotations.as_ref(),
        &app.desired_annotations(),
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_later_map_wins() {
        let a = map(&[("x", "1"), ("y", "2")]);
        let b = map(&[("y", "3")]);
        assert_eq!(merge_maps(&[&a, &b]), map(&[("x", "1"), ("y", "3")]));
        assert_eq!(merge_maps(&[&b, &a]), map(&[("x", "1"), ("y", "2")]));
    }

    #[test]
    fn test_empty_inputs() {
        assert!(merge_maps(&[]).is_empty());
        let empty = BTreeMap::new();
        assert!(merge_maps(&[&empty, &empty]).is_empty());
    }

    #[test]
    fn test_merge_optional_keeps_cluster_entries() {
        let existing = map(&[("deployment.kubernetes.io/revision", "3")]);
        let desired = map(&[("note", "x")]);
        let merged = merge_optional_maps(Some(&existing), &desired);
        assert_eq!(merged.len(), 2);
        assert_eq!(merge_optional_maps(None, &desired), desired);
    }
}
