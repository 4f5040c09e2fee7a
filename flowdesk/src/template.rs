//! Named workflow templates served by the backend

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// A named, ordered triple of action identifiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub label: String,
    #[serde(default)]
    pub description: Option<String>,
    pub steps: Vec<String>,
}

/// Templates keyed by backend key, in the order the backend sent them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateSet {
    entries: Vec<(String, Template)>,
}

impl TemplateSet {
    pub fn new(entries: Vec<(String, Template)>) -> Self {
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&Template> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, t)| t)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Template)> {
        self.entries.iter().map(|(k, t)| (k.as_str(), t))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'de> Deserialize<'de> for TemplateSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TemplateSetVisitor;

        impl<'de> Visitor<'de> for TemplateSetVisitor {
            type Value = TemplateSet;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of template key to template")
            }

            fn visit_map<M: MapAccess<'de>>(self, mut map: M) -> Result<TemplateSet, M::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, template)) = map.next_entry::<String, Template>()? {
                    entries.push((key, template));
                }
                Ok(TemplateSet { entries })
            }
        }

        deserializer.deserialize_map(TemplateSetVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BACKEND_TEMPLATES: &str = r#"{
        "quick": {
            "label": "Quick Understanding",
            "description": "Clean text, summarize it, and extract key points.",
            "steps": ["clean", "summarize", "keypoints"]
        },
        "simplify": {
            "label": "Simplify",
            "steps": ["clean", "simplify", "analogy"]
        },
        "office": {
            "label": "Office Assistant",
            "description": "Clean text, classify it, and analyze the tone.",
            "steps": ["clean", "classify", "tone"]
        }
    }"#;

    #[test]
    fn test_keeps_backend_order() {
        let set: TemplateSet = serde_json::from_str(BACKEND_TEMPLATES).unwrap();
        let keys: Vec<&str> = set.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["quick", "simplify", "office"]);
    }

    #[test]
    fn test_lookup() {
        let set: TemplateSet = serde_json::from_str(BACKEND_TEMPLATES).unwrap();
        let office = set.get("office").unwrap();
        assert_eq!(office.label, "Office Assistant");
        assert_eq!(office.steps, ["clean", "classify", "tone"]);
        assert!(set.get("simplify").unwrap().description.is_none());
        assert!(set.get("missing").is_none());
    }

    #[test]
    fn test_rejects_non_map() {
        assert!(serde_json::from_str::<TemplateSet>("[]").is_err());
    }
}
