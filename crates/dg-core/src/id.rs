use lasso::{Spur, ThreadedRodeo};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::LazyLock;

/// Global string interner shared by every identifier kind.
static INTERNER: LazyLock<ThreadedRodeo> = LazyLock::new(ThreadedRodeo::default);

/// Declares a lightweight interned identifier.
/// Internally a `Spur` index: 4 bytes and `Copy`.
macro_rules! interned_id {
    ($(#[$meta:meta])* $name:ident, $sigil:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(Spur);

        impl $name {
            /// Intern a string, or return the existing id if already interned.
            pub fn intern(s: &str) -> Self {
                $name(INTERNER.get_or_intern(s))
            }

            /// Resolve back to a string slice.
            pub fn as_str(&self) -> &'static str {
                INTERNER.resolve(&self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $sigil, self.as_str())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                self.as_str().cmp(other.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Ok($name::intern(&s))
            }
        }
    };
}

interned_id!(
    /// Identifier of a node or edge in the diagram tree.
    ElementId,
    "#"
);

interned_id!(
    /// Identifier of a stylesheet (`default`, `default-edge`, ...).
    StylesheetId,
    "$"
);

interned_id!(
    /// Identifier of an adjustment rule.
    RuleId,
    "!"
);

interned_id!(
    /// Identifier of a layer.
    LayerId,
    "%"
);

impl ElementId {
    /// Generate a unique id with a type prefix (e.g. `rect_1`, `edge_2`).
    pub fn with_prefix(prefix: &str) -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        Self::intern(&format!("{prefix}_{n}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_roundtrip() {
        let a = ElementId::intern("login_form");
        let b = ElementId::intern("login_form");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "login_form");
    }

    #[test]
    fn prefixed_ids_are_unique() {
        let a = ElementId::with_prefix("rect");
        let b = ElementId::with_prefix("rect");
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("rect_"));
    }

    #[test]
    fn kinds_share_text_but_not_type() {
        let sheet = StylesheetId::intern("default");
        let rule = RuleId::intern("default");
        assert_eq!(sheet.as_str(), rule.as_str());
        assert_eq!(format!("{sheet:?}"), "$default");
        assert_eq!(format!("{rule:?}"), "!default");
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = LayerId::intern("background");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"background\"");
        let back: LayerId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
