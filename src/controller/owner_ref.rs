//! Owner reference bookkeeping for child resources

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};

fn same_owner(a: &OwnerReference, b: &OwnerReference) -> bool {
    a.api_version == b.api_version && a.kind == b.kind && a.name == b.name
}

/// Make `desired` the single owner reference for its (apiVersion, kind, name).
///
/// Returns `true` when `meta` was changed. An identical entry is left alone;
/// a differing one (e.g. a stale uid after the owner was recreated) is
/// replaced and moved to the front, other owners keep their order.
pub fn ensure_owner_ref(meta: &mut ObjectMeta, desired: OwnerReference) -> bool {
    let refs = meta.owner_references.get_or_insert_with(Vec::new);

    match refs.iter().position(|existing| same_owner(existing, &desired)) {
        Some(i) if refs[i] == desired => false,
        Some(_) => {
            let mut rebuilt = Vec::with_capacity(refs.len());
            rebuilt.push(desired.clone());
            rebuilt.extend(refs.drain(..).filter(|r| !same_owner(r, &desired)));
            *refs = rebuilt;
            true
        }
        None => {
            refs.push(desired);
            true
        }
    }
}

/// Controller owner reference pointing at `owner`
pub fn owner_reference<K>(owner: &K) -> OwnerReference
where
    K: Resource<DynamicType = ()>,
{
    OwnerReference {
        api_version: K::api_version(&()).into_owned(),
        kind: K::kind(&()).into_owned(),
        name: owner.name_any(),
        uid: owner.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Non-controller owner reference, for objects several owners may share.
///
/// An object can carry only one controller reference, so a Secret copied
/// for every consumer in a namespace is owned this way.
pub fn shared_owner_reference<K>(owner: &K) -> OwnerReference
where
    K: Resource<DynamicType = ()>,
{
    OwnerReference {
        controller: Some(false),
        ..owner_reference(owner)
    }
}
