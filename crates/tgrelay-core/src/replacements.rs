//! User-maintained substitution dictionary.
//!
//! Rules are keyed by their lowercased pattern and kept in insertion order,
//! since they are applied one after another and a later rule may match text
//! produced by an earlier one. On disk the dictionary is a flat JSON object
//! (`{"pattern": "replacement", ...}`) written in rule order.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use serde::{
    de::{MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};

use crate::{
    errors::Error,
    utils::{atomic_write, read_optional},
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplacementRule {
    pub pattern: String,
    pub replacement: String,
}

/// Ordered, case-folded pattern -> replacement map.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplacementDictionary {
    rules: Vec<ReplacementRule>,
}

impl ReplacementDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite. An overwritten rule keeps its position.
    pub fn insert(&mut self, pattern: &str, replacement: &str) -> Result<()> {
        let key = fold_key(pattern)?;
        match self.rules.iter_mut().find(|r| r.pattern == key) {
            Some(rule) => rule.replacement = replacement.to_string(),
            None => self.rules.push(ReplacementRule {
                pattern: key,
                replacement: replacement.to_string(),
            }),
        }
        Ok(())
    }

    /// Remove by case-folded pattern; `None` when no such rule exists.
    pub fn remove(&mut self, pattern: &str) -> Option<ReplacementRule> {
        let key = pattern.to_lowercase();
        let idx = self.rules.iter().position(|r| r.pattern == key)?;
        Some(self.rules.remove(idx))
    }

    #[cfg(test)]
    pub(crate) fn get(&self, pattern: &str) -> Option<&str> {
        let key = pattern.to_lowercase();
        self.rules
            .iter()
            .find(|r| r.pattern == key)
            .map(|r| r.replacement.as_str())
    }

    pub fn rules(&self) -> &[ReplacementRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn fold_key(pattern: &str) -> Result<String> {
    if pattern.trim().is_empty() {
        return Err(Error::Config(
            "replacement pattern must not be empty".to_string(),
        ));
    }
    Ok(pattern.to_lowercase())
}

impl Serialize for ReplacementDictionary {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.rules.len()))?;
        for rule in &self.rules {
            map.serialize_entry(&rule.pattern, &rule.replacement)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ReplacementDictionary {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct DictVisitor;

        impl<'de> Visitor<'de> for DictVisitor {
            type Value = ReplacementDictionary;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object mapping patterns to replacements")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut dict = ReplacementDictionary::new();
                while let Some((pattern, replacement)) =
                    access.next_entry::<String, String>()?
                {
                    dict.insert(&pattern, &replacement)
                        .map_err(serde::de::Error::custom)?;
                }
                Ok(dict)
            }
        }

        deserializer.deserialize_map(DictVisitor)
    }
}

/// File-backed owner of the replacement dictionary.
///
/// Every mutation persists the whole dictionary before returning.
#[derive(Debug)]
pub struct ReplacementStore {
    path: PathBuf,
    dict: ReplacementDictionary,
}

impl ReplacementStore {
    /// Open the store, loading the persisted dictionary (empty if the file
    /// does not exist yet).
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let dict = load_dictionary(&path)?;
        Ok(Self { path, dict })
    }

    pub fn add(&mut self, pattern: &str, replacement: &str) -> Result<()> {
        let mut next = self.dict.clone();
        next.insert(pattern, replacement)?;
        self.replace(next)?;
        tracing::info!(pattern = %pattern.to_lowercase(), "replacement saved");
        Ok(())
    }

    /// Remove a rule; `Ok(None)` means there was nothing to remove.
    pub fn remove(&mut self, pattern: &str) -> Result<Option<ReplacementRule>> {
        let mut next = self.dict.clone();
        let Some(removed) = next.remove(pattern) else {
            return Ok(None);
        };
        self.replace(next)?;
        tracing::info!(pattern = %removed.pattern, "replacement removed");
        Ok(Some(removed))
    }

    pub fn list(&self) -> &[ReplacementRule] {
        self.dict.rules()
    }

    /// A copy of the current dictionary, for handing to a forwarding run.
    pub fn snapshot(&self) -> ReplacementDictionary {
        self.dict.clone()
    }

    /// Persist `dict` and make it current. Memory is only updated once the
    /// write succeeded.
    pub fn replace(&mut self, dict: ReplacementDictionary) -> Result<()> {
        save_dictionary(&self.path, &dict)?;
        self.dict = dict;
        Ok(())
    }

    /// Re-read the file, discarding the in-memory copy.
    pub fn reload(&mut self) -> Result<()> {
        self.dict = load_dictionary(&self.path)?;
        Ok(())
    }
}

pub fn load_dictionary(path: &Path) -> Result<ReplacementDictionary> {
    let Some(txt) = read_optional(path)? else {
        return Ok(ReplacementDictionary::new());
    };
    serde_json::from_str(&txt).map_err(|e| Error::CorruptState {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

pub fn save_dictionary(path: &Path, dict: &ReplacementDictionary) -> Result<()> {
    let txt = serde_json::to_string_pretty(dict)?;
    atomic_write(path, txt.as_bytes())
}
