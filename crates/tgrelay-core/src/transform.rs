//! Keyword filter + replacement pipeline applied to every relayed message.

use regex::{NoExpand, Regex, RegexBuilder};

use crate::{
    errors::Error,
    replacements::{ReplacementDictionary, ReplacementRule},
    Result,
};

/// Why a fetched message produced nothing to send.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SuppressReason {
    NoText,
    FilteredOut,
    EmptiedByReplacement,
}

impl SuppressReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SuppressReason::NoText => "no_text",
            SuppressReason::FilteredOut => "filtered_out",
            SuppressReason::EmptiedByReplacement => "emptied_by_replacement",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transformed {
    Forward(String),
    Suppressed(SuppressReason),
}

/// Keywords and compiled rules for one forwarding run.
#[derive(Clone, Debug)]
pub struct TextTransform {
    keywords: Vec<String>,
    rules: Vec<CompiledRule>,
}

#[derive(Clone, Debug)]
struct CompiledRule {
    matcher: Regex,
    replacement: String,
}

impl TextTransform {
    /// Compile `rules` once. Keywords are trimmed and lowercased; blank
    /// entries are dropped so they never act as a match-all.
    pub fn new(keywords: &[String], rules: &ReplacementDictionary) -> Result<Self> {
        let keywords = keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        let rules = rules
            .rules()
            .iter()
            .map(compile_rule)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { keywords, rules })
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn apply(&self, text: Option<&str>) -> Transformed {
        // Whitespace-only text cannot be sent, so it counts as no text.
        let Some(text) = text.filter(|t| !t.trim().is_empty()) else {
            return Transformed::Suppressed(SuppressReason::NoText);
        };

        if !self.passes_filter(text) {
            return Transformed::Suppressed(SuppressReason::FilteredOut);
        }

        let mut out = text.to_string();
        for rule in &self.rules {
            out = rule
                .matcher
                .replace_all(&out, NoExpand(&rule.replacement))
                .into_owned();
        }

        if out.trim().is_empty() {
            Transformed::Suppressed(SuppressReason::EmptiedByReplacement)
        } else {
            Transformed::Forward(out)
        }
    }

    fn passes_filter(&self, text: &str) -> bool {
        if self.keywords.is_empty() {
            return true;
        }
        let lower = text.to_lowercase();
        self.keywords.iter().any(|k| lower.contains(k.as_str()))
    }
}

/// One-shot convenience over [`TextTransform`].
pub fn apply(
    text: Option<&str>,
    keywords: &[String],
    rules: &ReplacementDictionary,
) -> Result<Transformed> {
    Ok(TextTransform::new(keywords, rules)?.apply(text))
}

fn compile_rule(rule: &ReplacementRule) -> Result<CompiledRule> {
    let matcher = RegexBuilder::new(&regex::escape(&rule.pattern))
        .case_insensitive(true)
        .build()
        .map_err(|e| Error::Config(format!("invalid replacement {:?}: {e}", rule.pattern)))?;
    Ok(CompiledRule {
        matcher,
        replacement: rule.replacement.clone(),
    })
}
