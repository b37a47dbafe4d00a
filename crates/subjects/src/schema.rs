use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque identifier assigned by the identity store.
pub type SubjectId = String;

/// Alternate name bound to a [`Subject`], e.g. a nickname or a relational
/// reference the user has confirmed ("Annie", "min chef").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alias {
    pub value: String,
    pub added_at: DateTime<Utc>,
}

impl Alias {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            added_at: Utc::now(),
        }
    }
}

/// Canonical identity record for a person the user talks about.
///
/// Owned by the identity store.  The resolver only ever reads snapshots of
/// these records; nothing in this crate mutates a `Subject` it did not create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    /// Primary display name (original casing).
    pub name: String,
    /// Aliases in the order they were added.
    #[serde(default)]
    pub aliases: Vec<Alias>,
    #[serde(default)]
    pub pronouns: Option<String>,
    /// How much the user trusts this person, 0.0 – 1.0.
    #[serde(default = "default_trust")]
    pub trust: f32,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

fn default_trust() -> f32 {
    0.5
}

impl Subject {
    pub fn new(id: impl Into<SubjectId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            aliases: Vec::new(),
            pronouns: None,
            trust: default_trust(),
            last_seen: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(Alias::new(alias));
        self
    }

    pub fn with_trust(mut self, trust: f32) -> Self {
        self.trust = trust.clamp(0.0, 1.0);
        self
    }

    pub fn with_pronouns(mut self, pronouns: impl Into<String>) -> Self {
        self.pronouns = Some(pronouns.into());
        self
    }

    /// Iterate alias values in insertion order.
    pub fn alias_values(&self) -> impl Iterator<Item = &str> {
        self.aliases.iter().map(|alias| alias.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_clamps_trust_and_keeps_alias_order() {
        let subject = Subject::new("s-1", "Anna Svensson")
            .with_alias("Annie")
            .with_alias("Anki")
            .with_trust(1.7);
        assert_eq!(subject.trust, 1.0);
        assert_eq!(subject.alias_values().collect::<Vec<_>>(), vec!["Annie", "Anki"]);
    }

    #[test]
    fn deserialize_fills_optional_fields() {
        let subject: Subject =
            serde_json::from_str(r#"{"id":"s-2","name":"Björn"}"#).unwrap();
        assert!(subject.aliases.is_empty());
        assert!(subject.pronouns.is_none());
        assert!((subject.trust - 0.5).abs() < f32::EPSILON);
    }
}
