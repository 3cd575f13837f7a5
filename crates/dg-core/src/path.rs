//! Property path access.
//!
//! Two flavours live here:
//!
//! - [`PropertyObject`]: typed property structs with a finite table of
//!   known paths. Paths are validated when parsed (`"fill.color".parse()`),
//!   so a typed `get`/`set` can never address something that does not exist.
//!   Merging, diffing and stripping are written once against the table.
//! - [`get_json`] / [`set_json`]: dotted access into free-form JSON records
//!   (element custom data, query inputs).
//!
//! `set_json` through a non-object intermediate overwrites that intermediate
//! with a fresh object (last write wins). Callers that care must check the
//! shape first.

use crate::error::PathError;
use crate::props::PropValue;
use serde_json::{Map, Value};
use std::fmt;

// ─── Typed property objects ──────────────────────────────────────────────

/// A sparse property struct addressed through a finite path table.
pub trait PropertyObject: Clone + Default + PartialEq {
    /// The known leaf paths of this object.
    type Path: Copy + Eq + std::hash::Hash + fmt::Debug + fmt::Display + 'static;

    /// Every leaf path, in declaration order.
    fn paths() -> &'static [Self::Path];

    /// Read a leaf. `None` means "not set here".
    fn get(&self, path: Self::Path) -> Option<PropValue>;

    /// Write (or clear, with `None`) a leaf.
    fn set(&mut self, path: Self::Path, value: Option<PropValue>) -> Result<(), PathError>;

    /// Overlay every leaf that `src` sets onto `self`.
    fn merge_from(&mut self, src: &Self) {
        for &path in Self::paths() {
            if let Some(value) = src.get(path) {
                // Values read from the same path always type-check.
                let _ = self.set(path, Some(value));
            }
        }
    }

    /// Return `base` overlaid with `self`: only leaves absent here are taken from `base`.
    fn over(&self, base: &Self) -> Self {
        let mut merged = base.clone();
        merged.merge_from(self);
        merged
    }

    /// True when no leaf is set.
    fn is_empty(&self) -> bool {
        Self::paths().iter().all(|&p| self.get(p).is_none())
    }

    /// Leaves that are set here, in table order.
    fn set_paths(&self) -> Vec<Self::Path> {
        Self::paths()
            .iter()
            .copied()
            .filter(|&p| self.get(p).is_some())
            .collect()
    }

    /// Leaves set here whose value differs from `reference`.
    fn diff_paths(&self, reference: &Self) -> Vec<Self::Path> {
        Self::paths()
            .iter()
            .copied()
            .filter(|&p| match self.get(p) {
                Some(v) => reference.get(p).as_ref() != Some(&v),
                None => false,
            })
            .collect()
    }

    /// Copy of `self` with every leaf equal to `reference` cleared.
    fn without_matching(&self, reference: &Self) -> Self {
        let mut out = self.clone();
        for &path in Self::paths() {
            if let Some(v) = self.get(path)
                && reference.get(path).as_ref() == Some(&v)
            {
                let _ = out.set(path, None);
            }
        }
        out
    }
}

// ─── JSON records ────────────────────────────────────────────────────────

/// Read a dotted path (`data.customer.tier`) from a JSON value.
///
/// Numeric segments index into arrays.
pub fn get_json<'a>(obj: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(obj);
    }
    path.split('.').try_fold(obj, |cur, seg| match cur {
        Value::Object(map) => map.get(seg),
        Value::Array(items) => seg.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Write a dotted path into a JSON value, creating intermediate objects.
///
/// Any non-object intermediate (including the root) is replaced by an empty
/// object before descending.
pub fn set_json(obj: &mut Value, path: &str, value: Value) {
    let mut segments = path.split('.').peekable();
    let mut cur = obj;
    while let Some(seg) = segments.next() {
        if !cur.is_object() {
            *cur = Value::Object(Map::new());
        }
        let Some(map) = cur.as_object_mut() else {
            return;
        };
        if segments.peek().is_none() {
            map.insert(seg.to_string(), value);
            return;
        }
        cur = map
            .entry(seg.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}
