use std::collections::HashMap;

use serde::Deserialize;
use tracing::warn;

use crate::{
    gate::types::{CapabilityKind, CapabilityLimit},
    utils::error::GateError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    Flag,
    Metered,
}

impl KeyKind {
    fn matches(&self, kind: &CapabilityKind) -> bool {
        match self {
            KeyKind::Flag => !kind.is_metered(),
            KeyKind::Metered => kind.is_metered(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryIssue {
    UnknownKey { key: String },
    KindMismatch { key: String, expected: KeyKind },
}

impl std::fmt::Display for RegistryIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryIssue::UnknownKey { key } => write!(f, "unknown capability key {:?}", key),
            RegistryIssue::KindMismatch { key, expected } => {
                write!(f, "capability {:?} should be declared as {:?}", key, expected)
            }
        }
    }
}

/// Known capability keys and whether each is a flag or metered. Plans are
/// checked against it when they enter the catalog cache.
#[derive(Debug, Clone)]
pub struct CapabilityRegistry {
    keys: HashMap<String, KeyKind>,
    strict: bool,
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        let keys = [
            ("api_access", KeyKind::Flag),
            ("white_label", KeyKind::Flag),
            ("analytics_dashboard", KeyKind::Flag),
            ("priority_support", KeyKind::Flag),
            ("rfq_limit_monthly", KeyKind::Metered),
            ("product_listings", KeyKind::Metered),
            ("team_members", KeyKind::Metered),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            keys,
            strict: false,
        }
    }
}

impl CapabilityRegistry {
    pub fn new(keys: HashMap<String, KeyKind>) -> Self {
        Self {
            keys,
            strict: false,
        }
    }

    /// In strict mode an inconsistent plan is refused instead of logged.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn kind_of(&self, key: &str) -> Option<KeyKind> {
        self.keys.get(key).copied()
    }

    pub fn issues(&self, capabilities: &[CapabilityLimit]) -> Vec<RegistryIssue> {
        capabilities
            .iter()
            .filter_map(|cap| match self.keys.get(&cap.key) {
                None => Some(RegistryIssue::UnknownKey {
                    key: cap.key.clone(),
                }),
                Some(expected) if !expected.matches(&cap.kind) => {
                    Some(RegistryIssue::KindMismatch {
                        key: cap.key.clone(),
                        expected: *expected,
                    })
                }
                Some(_) => None,
            })
            .collect()
    }

    pub fn check(&self, plan_id: &str, capabilities: &[CapabilityLimit]) -> Result<(), GateError> {
        let issues = self.issues(capabilities);
        if issues.is_empty() {
            return Ok(());
        }

        if self.strict {
            let detail = issues
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(GateError::Catalog(format!("plan {}: {}", plan_id, detail)));
        }

        for issue in &issues {
            warn!(plan = %plan_id, %issue, "Plan capability does not match registry");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_keys_pass() {
        let registry = CapabilityRegistry::default();
        let caps = vec![
            CapabilityLimit::flag("api_access", true),
            CapabilityLimit::bounded("rfq_limit_monthly", 10),
            CapabilityLimit::unlimited("team_members"),
        ];
        assert!(registry.issues(&caps).is_empty());
        assert!(registry.check("pro", &caps).is_ok());
    }

    #[test]
    fn unknown_and_mismatched_keys_are_reported() {
        let registry = CapabilityRegistry::default();
        let caps = vec![
            CapabilityLimit::flag("api_acess", true),
            CapabilityLimit::bounded("white_label", 3),
        ];

        assert_eq!(
            registry.issues(&caps),
            vec![
                RegistryIssue::UnknownKey {
                    key: "api_acess".into()
                },
                RegistryIssue::KindMismatch {
                    key: "white_label".into(),
                    expected: KeyKind::Flag
                },
            ]
        );
    }

    #[test]
    fn permissive_mode_accepts_unknown_keys() {
        let registry = CapabilityRegistry::default();
        let caps = vec![CapabilityLimit::flag("brand_new_feature", true)];
        assert!(registry.check("pro", &caps).is_ok());
    }

    #[test]
    fn strict_mode_refuses_unknown_keys() {
        let registry = CapabilityRegistry::default().strict(true);
        let caps = vec![CapabilityLimit::flag("brand_new_feature", true)];
        let err = registry.check("pro", &caps).unwrap_err();
        assert!(matches!(err, GateError::Catalog(msg) if msg.contains("brand_new_feature")));
    }
}
