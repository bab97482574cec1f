//! Environment context for a run
//!
//! The context is built once at run start from static configuration plus
//! declared write-once slots (for values computed during the run, such as
//! the checked-out revision id). Base keys are immutable once populated.
//! Secret-bearing steps receive scoped overlays that shadow the base for
//! the duration of one step and are unreachable afterwards.

use crate::graph::errors::EngineError;
use ahash::{AHashMap, AHashSet};
use parking_lot::RwLock;
use regex::Regex;
use std::sync::Arc;

/// Key/value store visible to all stages of a run.
///
/// Cloning is cheap; clones share the same base map. Overlays are local
/// to the clone that carries them and never write back into the base.
#[derive(Debug, Clone)]
pub struct EnvContext {
    shared: Arc<Shared>,
    overlay: Option<Arc<AHashMap<String, String>>>,
}

#[derive(Debug)]
struct Shared {
    base: RwLock<AHashMap<String, String>>,
    slots: AHashSet<String>,
}

impl EnvContext {
    /// Creates a context from static configuration.
    ///
    /// `slots` declares the keys that a designated step may populate
    /// exactly once during the run; every other key is immutable.
    #[must_use]
    pub fn new(
        base: impl IntoIterator<Item = (String, String)>,
        slots: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                base: RwLock::new(base.into_iter().collect()),
                slots: slots.into_iter().collect(),
            }),
            overlay: None,
        }
    }

    /// Returns true if `key` is a declared write-once slot
    #[must_use]
    pub fn is_slot(&self, key: &str) -> bool {
        self.shared.slots.contains(key)
    }

    /// Populates a write-once slot.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ReadOnlyKey`] if the key is already
    /// populated or was never declared as a slot.
    pub fn set(&self, key: &str, value: impl Into<String>) -> Result<(), EngineError> {
        let mut base = self.shared.base.write();
        if base.contains_key(key) || !self.shared.slots.contains(key) {
            return Err(EngineError::ReadOnlyKey {
                key: key.to_string(),
            });
        }
        base.insert(key.to_string(), value.into());
        Ok(())
    }

    /// Looks up a key, overlay entries shadowing the base.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MissingKey`] if the key is absent.
    pub fn get(&self, key: &str) -> Result<String, EngineError> {
        if let Some(overlay) = &self.overlay {
            if let Some(value) = overlay.get(key) {
                return Ok(value.clone());
            }
        }
        self.shared
            .base
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| EngineError::MissingKey {
                key: key.to_string(),
            })
    }

    /// Looks up a key, falling back to a default
    #[must_use]
    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|_| default.to_string())
    }

    /// Returns a derived context with `entries` merged on top.
    ///
    /// The receiver is untouched; dropping the derived context discards
    /// the overlay on every exit path.
    #[must_use]
    pub fn overlaid(&self, entries: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut merged: AHashMap<String, String> = match &self.overlay {
            Some(existing) => existing.as_ref().clone(),
            None => AHashMap::new(),
        };
        merged.extend(entries);
        Self {
            shared: Arc::clone(&self.shared),
            overlay: Some(Arc::new(merged)),
        }
    }

    /// Runs `body` with overlay entries visible, then discards them.
    ///
    /// Overlay values shadow base values and are unreachable after `body`
    /// returns, whether it returns normally, fails, or panics.
    pub fn with_overlay<R>(
        &self,
        entries: impl IntoIterator<Item = (String, String)>,
        body: impl FnOnce(&EnvContext) -> R,
    ) -> R {
        let scoped = self.overlaid(entries);
        body(&scoped)
    }

    /// Materializes the visible key/value pairs for process spawning
    #[must_use]
    pub fn snapshot(&self) -> AHashMap<String, String> {
        let mut map = self.shared.base.read().clone();
        if let Some(overlay) = &self.overlay {
            for (k, v) in overlay.iter() {
                map.insert(k.clone(), v.clone());
            }
        }
        map
    }

    /// Expands `${VAR}` references against this context.
    ///
    /// Unknown variables are left unchanged in the output.
    #[must_use]
    pub fn expand(&self, input: &str) -> String {
        static VAR_PATTERN: once_cell::sync::Lazy<Regex> =
            once_cell::sync::Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

        VAR_PATTERN
            .replace_all(input, |caps: &regex::Captures| {
                let name = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                self.get(name).unwrap_or_else(|_| {
                    caps.get(0)
                        .map(|m| m.as_str().to_string())
                        .unwrap_or_default()
                })
            })
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ctx() -> EnvContext {
        EnvContext::new(
            [
                ("REGISTRY".to_string(), "registry.local".to_string()),
                ("APP".to_string(), "billing".to_string()),
            ],
            ["GIT_COMMIT".to_string()],
        )
    }

    #[test]
    fn test_get_present_key() {
        assert_eq!(ctx().get("APP").unwrap(), "billing");
    }

    #[test]
    fn test_get_missing_key() {
        let err = ctx().get("NOPE").unwrap_err();
        assert!(matches!(err, EngineError::MissingKey { key } if key == "NOPE"));
    }

    #[test]
    fn test_get_or_default() {
        assert_eq!(ctx().get_or("NOPE", "fallback"), "fallback");
        assert_eq!(ctx().get_or("APP", "fallback"), "billing");
    }

    #[test]
    fn test_slot_written_once() {
        let ctx = ctx();
        ctx.set("GIT_COMMIT", "abc1234").unwrap();
        assert_eq!(ctx.get("GIT_COMMIT").unwrap(), "abc1234");

        let err = ctx.set("GIT_COMMIT", "def5678").unwrap_err();
        assert!(matches!(err, EngineError::ReadOnlyKey { .. }));
    }

    #[test]
    fn test_set_rejects_immutable_base_key() {
        let err = ctx().set("APP", "other").unwrap_err();
        assert!(matches!(err, EngineError::ReadOnlyKey { key } if key == "APP"));
    }

    #[test]
    fn test_set_rejects_undeclared_key() {
        let err = ctx().set("NEW_KEY", "v").unwrap_err();
        assert!(matches!(err, EngineError::ReadOnlyKey { .. }));
    }

    #[test]
    fn test_slot_visible_to_clones() {
        let ctx = ctx();
        let clone = ctx.clone();
        ctx.set("GIT_COMMIT", "abc1234").unwrap();
        assert_eq!(clone.get("GIT_COMMIT").unwrap(), "abc1234");
    }

    #[test]
    fn test_overlay_shadows_and_is_discarded() {
        let ctx = ctx();
        let seen = ctx.with_overlay(
            [("TOKEN".to_string(), "x".to_string())],
            |scoped| scoped.get("TOKEN").unwrap(),
        );
        assert_eq!(seen, "x");
        assert!(matches!(
            ctx.get("TOKEN"),
            Err(EngineError::MissingKey { .. })
        ));
    }

    #[test]
    fn test_overlay_shadows_base_without_mutating_it() {
        let ctx = ctx();
        ctx.with_overlay([("APP".to_string(), "shadowed".to_string())], |scoped| {
            assert_eq!(scoped.get("APP").unwrap(), "shadowed");
        });
        assert_eq!(ctx.get("APP").unwrap(), "billing");
    }

    #[test]
    fn test_overlay_discarded_when_body_panics() {
        let ctx = ctx();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            ctx.with_overlay([("TOKEN".to_string(), "x".to_string())], |_| {
                panic!("step blew up")
            })
        }));
        assert!(result.is_err());
        assert!(matches!(
            ctx.get("TOKEN"),
            Err(EngineError::MissingKey { .. })
        ));
    }

    #[test]
    fn test_nested_overlays_merge() {
        let ctx = ctx();
        ctx.with_overlay([("A".to_string(), "1".to_string())], |outer| {
            outer.with_overlay([("B".to_string(), "2".to_string())], |inner| {
                assert_eq!(inner.get("A").unwrap(), "1");
                assert_eq!(inner.get("B").unwrap(), "2");
            });
            assert!(outer.get("B").is_err());
        });
    }

    #[test]
    fn test_expand_known_and_unknown() {
        let ctx = ctx();
        assert_eq!(
            ctx.expand("push ${REGISTRY}/${APP}:${TAG}"),
            "push registry.local/billing:${TAG}"
        );
    }

    #[test]
    fn test_snapshot_includes_overlay() {
        let ctx = ctx();
        let scoped = ctx.overlaid([("TOKEN".to_string(), "x".to_string())]);
        let snap = scoped.snapshot();
        assert_eq!(snap.get("TOKEN").map(String::as_str), Some("x"));
        assert_eq!(snap.get("APP").map(String::as_str), Some("billing"));
        assert!(!ctx.snapshot().contains_key("TOKEN"));
    }

    proptest! {
        #[test]
        fn prop_overlay_never_leaks(key in "[A-Z][A-Z0-9_]{0,12}", value in ".{0,16}") {
            let ctx = EnvContext::new(
                [("FIXED".to_string(), "base".to_string())],
                std::iter::empty(),
            );
            let inside = ctx.with_overlay(
                [(key.clone(), value.clone())],
                |scoped| scoped.get(&key).unwrap(),
            );
            prop_assert_eq!(inside, value);
            // After the scope ends the key resolves only if the base had it.
            if key == "FIXED" {
                prop_assert_eq!(ctx.get(&key).unwrap(), "base");
            } else {
                prop_assert!(ctx.get(&key).is_err());
            }
        }
    }
}
