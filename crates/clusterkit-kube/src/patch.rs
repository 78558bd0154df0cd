//! Patch computation.
//!
//! Given the desired object and the object currently on the cluster, decide
//! whether a write is needed and build the patch body. The desired document
//! is recorded in the [`LAST_APPLIED_ANNOTATION`] annotation on every write;
//! the previous value of that annotation is the "original" side of a
//! three-way diff, so fields only the API server set are left alone while
//! fields removed from the desired document are deleted.

use clusterkit_common::kube_utils::display_gvk;
use clusterkit_common::{Error, LAST_APPLIED_ANNOTATION};
use kube::core::GroupVersionKind;
use serde_json::{Map, Value};
use tracing::debug;

use crate::handle::ClusterObject;
use crate::scheme::{ConversionError, ListStrategy, RegisteredKind};

/// Metadata fields owned by the API server
const SERVER_METADATA_FIELDS: &[&str] = &[
    "uid",
    "resourceVersion",
    "generation",
    "creationTimestamp",
    "managedFields",
    "selfLink",
];

/// Patch body encoding
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchStrategy {
    /// Kubernetes strategic merge patch
    StrategicMerge,
    /// RFC 7386 JSON merge patch
    JsonMerge,
}

/// A computed patch
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectPatch {
    /// Patch document
    pub body: Value,
    /// How the server should interpret `body`
    pub strategy: PatchStrategy,
}

/// Canonical serialization used for equality and the last-applied annotation.
///
/// Object keys are emitted in sorted order at every level.
pub fn canonical_json(value: &Value) -> String {
    sorted(value).to_string()
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            Value::Object(
                keys.into_iter()
                    .map(|k| (k.clone(), sorted(&map[k])))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

/// Remove server-managed fields so the document compares against a desired one.
pub fn strip_server_fields(value: &mut Value) {
    if let Some(obj) = value.as_object_mut() {
        obj.remove("status");
        if let Some(meta) = obj.get_mut("metadata").and_then(Value::as_object_mut) {
            for field in SERVER_METADATA_FIELDS {
                meta.remove(*field);
            }
        }
    }
}

/// The desired document with the last-applied annotation set to its own
/// canonical form. This is what gets created or patched.
pub fn with_last_applied(desired: &Value) -> Value {
    let mut clean = desired.clone();
    strip_server_fields(&mut clean);
    let recorded = canonical_json(&clean);

    let mut out = clean;
    if let Some(obj) = out.as_object_mut() {
        let meta = obj
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Some(meta) = meta.as_object_mut() {
            let annotations = meta
                .entry("annotations")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Some(annotations) = annotations.as_object_mut() {
                annotations.insert(LAST_APPLIED_ANNOTATION.to_string(), Value::String(recorded));
            }
        }
    }
    out
}

fn last_applied_of(current: &Value) -> Option<Value> {
    current
        .pointer("/metadata/annotations")
        .and_then(|a| a.get(LAST_APPLIED_ANNOTATION))
        .and_then(Value::as_str)
        .and_then(|s| serde_json::from_str(s).ok())
}

/// The document to write for `object`, with the kind whose merge rules apply.
///
/// Registered kinds at their registered version are normalized through the
/// typed struct; everything else is written as declared and has no rules.
pub fn desired_document(
    object: &ClusterObject,
    gvk: &GroupVersionKind,
) -> Result<(Value, Option<&'static RegisteredKind>), Error> {
    match object {
        ClusterObject::Typed { kind, data } => match kind.convert(gvk, data) {
            Ok(normalized) => Ok((normalized, Some(*kind))),
            Err(ConversionError::NotRegistered(reason)) => {
                debug!(gvk = %display_gvk(gvk), %reason, "falling back to JSON merge patch");
                Ok((data.clone(), None))
            }
            Err(ConversionError::Invalid(message)) => Err(Error::Conversion {
                gvk: display_gvk(gvk),
                message,
            }),
        },
        ClusterObject::Unstructured(data) => Ok((data.clone(), None)),
    }
}

/// Compute the patch that converges `current` to `desired`.
///
/// Returns `Ok(None)` when no write is needed. Registered kinds that convert
/// cleanly get a strategic merge patch; unregistered kinds, and registered
/// kinds declared at a version this build does not know, get a JSON merge
/// patch. A document that fails its registered schema is an error.
pub fn compute_patch(
    desired: &ClusterObject,
    gvk: &GroupVersionKind,
    current: &Value,
) -> Result<Option<ObjectPatch>, Error> {
    let (document, rules) = desired_document(desired, gvk)?;
    let modified = with_last_applied(&document);
    let mut live = current.clone();
    strip_server_fields(&mut live);

    if canonical_json(&modified) == canonical_json(&live) {
        return Ok(None);
    }

    let strategy = if rules.is_some() {
        PatchStrategy::StrategicMerge
    } else {
        PatchStrategy::JsonMerge
    };

    let original = last_applied_of(current);
    let (Some(modified), Some(live)) = (modified.as_object(), live.as_object()) else {
        return Err(Error::serialization_for_kind(
            gvk.kind.clone(),
            "desired and live objects must be JSON objects",
        ));
    };

    let differ = Differ { rules };
    let mut path = Vec::new();
    let body = differ.diff_object(
        original.as_ref().and_then(Value::as_object),
        modified,
        live,
        &mut path,
    );

    if body.is_empty() {
        return Ok(None);
    }
    Ok(Some(ObjectPatch {
        body: Value::Object(body),
        strategy,
    }))
}

struct Differ {
    rules: Option<&'static RegisteredKind>,
}

impl Differ {
    fn list_strategy(&self, path: &[String]) -> ListStrategy {
        self.rules
            .map_or(ListStrategy::Replace, |kind| kind.list_strategy(path))
    }

    fn diff_object(
        &self,
        original: Option<&Map<String, Value>>,
        desired: &Map<String, Value>,
        current: &Map<String, Value>,
        path: &mut Vec<String>,
    ) -> Map<String, Value> {
        let mut patch = Map::new();

        for (key, want) in desired {
            let have = current.get(key);
            let was = original.and_then(|o| o.get(key));
            path.push(key.clone());

            match (want, have) {
                (Value::Null, None) => {}
                (_, None) => {
                    patch.insert(key.clone(), want.clone());
                }
                (Value::Object(w), Some(Value::Object(h))) => {
                    let sub = self.diff_object(was.and_then(Value::as_object), w, h, path);
                    if !sub.is_empty() {
                        patch.insert(key.clone(), Value::Object(sub));
                    }
                }
                (Value::Array(w), Some(Value::Array(h))) => {
                    self.diff_list(key, was.and_then(Value::as_array), w, h, path, &mut patch);
                }
                (_, Some(h)) => {
                    if want != h {
                        patch.insert(key.clone(), want.clone());
                    }
                }
            }

            path.pop();
        }

        if let Some(original) = original {
            for key in original.keys() {
                if !desired.contains_key(key) && current.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }
        }

        patch
    }

    fn diff_list(
        &self,
        key: &str,
        original: Option<&Vec<Value>>,
        desired: &[Value],
        current: &[Value],
        path: &mut Vec<String>,
        patch: &mut Map<String, Value>,
    ) {
        match self.list_strategy(path) {
            ListStrategy::MergeByKey(merge_key)
                if keyed(desired, merge_key) && keyed(current, merge_key) =>
            {
                let entries = self.diff_keyed_list(merge_key, original, desired, current, path);
                if !entries.is_empty() {
                    patch.insert(key.to_string(), Value::Array(entries));
                }
            }
            ListStrategy::MergePrimitives => {
                let added: Vec<Value> = desired
                    .iter()
                    .filter(|v| !current.contains(v))
                    .cloned()
                    .collect();
                let removed: Vec<Value> = original
                    .into_iter()
                    .flatten()
                    .filter(|v| !desired.contains(v) && current.contains(v))
                    .cloned()
                    .collect();
                if !added.is_empty() {
                    patch.insert(key.to_string(), Value::Array(added));
                }
                if !removed.is_empty() {
                    patch.insert(
                        format!("$deleteFromPrimitiveList/{}", key),
                        Value::Array(removed),
                    );
                }
            }
            _ => {
                let drifted = desired.len() != current.len()
                    || desired.iter().zip(current).any(|(w, h)| !is_subset(w, h));
                let edited = original.is_some_and(|o| o.as_slice() != desired);
                if drifted || (edited && desired != current) {
                    patch.insert(key.to_string(), Value::Array(desired.to_vec()));
                }
            }
        }
    }

    fn diff_keyed_list(
        &self,
        merge_key: &str,
        original: Option<&Vec<Value>>,
        desired: &[Value],
        current: &[Value],
        path: &mut Vec<String>,
    ) -> Vec<Value> {
        let mut entries = Vec::new();

        for want in desired {
            let id = &want[merge_key];
            let Some(want_obj) = want.as_object() else {
                continue;
            };
            let have = current.iter().find(|c| &c[merge_key] == id);
            let was = original
                .into_iter()
                .flatten()
                .find(|o| &o[merge_key] == id)
                .and_then(Value::as_object);

            match have.and_then(Value::as_object) {
                None => entries.push(want.clone()),
                Some(have_obj) => {
                    let mut sub = self.diff_object(was, want_obj, have_obj, path);
                    if !sub.is_empty() {
                        sub.insert(merge_key.to_string(), id.clone());
                        entries.push(Value::Object(sub));
                    }
                }
            }
        }

        for was in original.into_iter().flatten() {
            let id = &was[merge_key];
            let still_wanted = desired.iter().any(|d| &d[merge_key] == id);
            let still_live = current.iter().any(|c| &c[merge_key] == id);
            if !still_wanted && still_live {
                let mut directive = Map::new();
                directive.insert(merge_key.to_string(), id.clone());
                directive.insert("$patch".to_string(), Value::String("delete".to_string()));
                entries.push(Value::Object(directive));
            }
        }

        entries
    }
}

fn keyed(items: &[Value], merge_key: &str) -> bool {
    items
        .iter()
        .all(|item| item.get(merge_key).is_some_and(|k| !k.is_null()))
}

/// Whether every field of `want` is present with the same value in `have`.
///
/// Lists must have the same length and match element-wise, so a desired
/// list is satisfied by a live list that differs only by server defaults.
fn is_subset(want: &Value, have: &Value) -> bool {
    match (want, have) {
        (Value::Object(w), Value::Object(h)) => w.iter().all(|(k, v)| match h.get(k) {
            Some(hv) => is_subset(v, hv),
            None => v.is_null(),
        }),
        (Value::Array(w), Value::Array(h)) => {
            w.len() == h.len() && w.iter().zip(h).all(|(wv, hv)| is_subset(wv, hv))
        }
        _ => want == have,
    }
}
