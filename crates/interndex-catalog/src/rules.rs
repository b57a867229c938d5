//! Ordered keyword rules that sort position tags into sub-categories.

use std::path::Path;

use anyhow::{Context, Result};
use interndex_core::PositionClass;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
struct PositionRulesFile {
    #[allow(dead_code)]
    version: u32,
    #[serde(default)]
    rules: Vec<PositionRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PositionRule {
    pub class: PositionClass,
    pub contains_any: Vec<String>,
}

impl PositionRule {
    fn new(class: PositionClass, keywords: &[&str]) -> Self {
        Self {
            class,
            contains_any: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// Alphanumeric keywords match the start of a word ("dev" hits "developer",
    /// "art" misses "smart"); anything else is a substring test.
    fn matches(&self, lower_label: &str, words: &[&str]) -> bool {
        self.contains_any.iter().any(|keyword| {
            let keyword = keyword.trim().to_lowercase();
            if keyword.is_empty() {
                false
            } else if keyword.chars().all(char::is_alphanumeric) {
                words.iter().any(|w| w.starts_with(&keyword))
            } else {
                lower_label.contains(&keyword)
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionRules {
    rules: Vec<PositionRule>,
}

impl Default for PositionRules {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PositionRules {
    pub fn new(rules: Vec<PositionRule>) -> Self {
        Self { rules }
    }

    pub fn builtin() -> Self {
        Self::new(vec![
            PositionRule::new(
                PositionClass::Programmer,
                &[
                    "programmer", "programming", "developer", "dev", "gamedev", "engineer",
                    "coder", "software", "backend", "frontend", "full stack", "gameplay",
                    "unity", "unreal", "qa", "tester", "data",
                ],
            ),
            PositionRule::new(
                PositionClass::Artist,
                &[
                    "artist", "art", "animator", "animation", "illustrator", "illustration",
                    "modeler", "modeller", "vfx", "2d", "3d",
                ],
            ),
            PositionRule::new(
                PositionClass::Designer,
                &["designer", "design", "ux", "ui", "writer", "narrative"],
            ),
        ])
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let file: PositionRulesFile = serde_yaml::from_str(text).context("parsing position rules")?;
        Ok(Self::new(file.rules))
    }

    /// Reads a YAML rule file, or falls back to the built-in table when the file is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no position rules file; using built-in rules");
            return Ok(Self::builtin());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("loading {}", path.display()))
    }

    pub fn rules(&self) -> &[PositionRule] {
        &self.rules
    }

    /// First matching rule wins; labels no rule claims land in [`PositionClass::Other`].
    pub fn classify(&self, label: &str) -> PositionClass {
        let lower = label.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        self.rules
            .iter()
            .find(|rule| rule.matches(&lower, &words))
            .map(|rule| rule.class)
            .unwrap_or(PositionClass::Other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_rules_classify_common_titles() {
        let rules = PositionRules::builtin();
        assert_eq!(rules.classify("Game Programmer"), PositionClass::Programmer);
        assert_eq!(rules.classify("Unity Developer"), PositionClass::Programmer);
        assert_eq!(rules.classify("QA Tester"), PositionClass::Programmer);
        assert_eq!(rules.classify("Technical Artist"), PositionClass::Artist);
        assert_eq!(rules.classify("2D Artist"), PositionClass::Artist);
        assert_eq!(rules.classify("Concept Art"), PositionClass::Artist);
        assert_eq!(rules.classify("Level Design"), PositionClass::Designer);
        assert_eq!(rules.classify("Sound Designer"), PositionClass::Designer);
        assert_eq!(rules.classify("Community Manager"), PositionClass::Other);
    }

    #[test]
    fn word_prefix_does_not_match_inside_words() {
        let rules = PositionRules::builtin();
        // "art" must not fire inside "smart" and "ui" not inside "guild".
        assert_eq!(rules.classify("Smart Contracts"), PositionClass::Other);
        assert_eq!(rules.classify("Guild Host"), PositionClass::Other);
    }

    #[test]
    fn compound_gamedev_titles_are_programmers() {
        let rules = PositionRules::builtin();
        assert_eq!(rules.classify("Gamedev Intern"), PositionClass::Programmer);
        assert_eq!(rules.classify("GameDev"), PositionClass::Programmer);
    }

    #[test]
    fn first_matching_rule_wins() {
        let rules = PositionRules::new(vec![
            PositionRule::new(PositionClass::Designer, &["designer"]),
            PositionRule::new(PositionClass::Artist, &["designer", "artist"]),
        ]);
        assert_eq!(rules.classify("UI Designer"), PositionClass::Designer);
        assert_eq!(rules.classify("Pixel Artist"), PositionClass::Artist);
    }

    #[test]
    fn multi_word_keywords_match_as_substrings() {
        let rules = PositionRules::new(vec![PositionRule::new(
            PositionClass::Programmer,
            &["full stack", "c++"],
        )]);
        assert_eq!(rules.classify("Full Stack Intern"), PositionClass::Programmer);
        assert_eq!(rules.classify("C++ Tools"), PositionClass::Programmer);
        assert_eq!(rules.classify("Stack Ranker"), PositionClass::Other);
    }

    #[test]
    fn yaml_rules_parse_in_file_order() {
        let rules = PositionRules::from_yaml_str(
            "version: 1\nrules:\n  - class: artist\n    contains_any: [rigger]\n  - class: programmer\n    contains_any: [tools]\n",
        )
        .unwrap();
        assert_eq!(rules.rules().len(), 2);
        assert_eq!(rules.classify("Character Rigger"), PositionClass::Artist);
        assert_eq!(rules.classify("Tools Intern"), PositionClass::Programmer);
        assert!(PositionRules::from_yaml_str("rules: [{class: wizard, contains_any: []}]").is_err());
    }

    #[test]
    fn repository_rules_file_matches_builtin_table() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
        let from_file = PositionRules::load(&root.join("rules/positions.yaml")).unwrap();
        assert_eq!(from_file, PositionRules::builtin());
        let missing = PositionRules::load(&root.join("rules/does-not-exist.yaml")).unwrap();
        assert_eq!(missing, PositionRules::builtin());
    }
}
