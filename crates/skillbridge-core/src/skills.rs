//! Skill text normalization and a small vocabulary matcher for resume text.

use std::collections::HashSet;

/// Lowercases skill text and keeps characters meaningful in skill names
/// (`c++`, `c#`, `.net`, `node.js`); `/` and `,` become `;` separators.
pub fn normalize_skill_text(input: &str) -> String {
    let mapped: String = input
        .to_lowercase()
        .chars()
        .map(|c| match c {
            '/' | ',' => ';',
            c if c.is_ascii_lowercase() || c.is_ascii_digit() => c,
            ';' | '+' | '-' | '.' | '#' => c,
            c if c.is_whitespace() => ' ',
            _ => ' ',
        })
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Splits a skill field into clean, unique skills, keeping first-seen order.
pub fn parse_skills(field: &str) -> Vec<String> {
    let normalized = normalize_skill_text(field);
    let mut seen = HashSet::new();
    normalized
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.to_string()))
        .map(ToString::to_string)
        .collect()
}

/// Same as [`parse_skills`] for sources that already hold a list.
pub fn parse_skill_list<S: AsRef<str>>(items: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .iter()
        .flat_map(|item| parse_skills(item.as_ref()))
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

/// Known skills, used to pick skills out of free text such as a resume.
#[derive(Debug, Clone, Default)]
pub struct SkillVocabulary {
    skills: Vec<String>,
}

impl SkillVocabulary {
    pub fn from_fields<'a>(fields: impl IntoIterator<Item = &'a str>) -> Self {
        let mut seen = HashSet::new();
        let skills = fields
            .into_iter()
            .flat_map(parse_skills)
            .filter(|s| s.chars().any(|c| c.is_ascii_alphanumeric() || c == '#' || c == '+'))
            .filter(|s| seen.insert(s.clone()))
            .collect();
        Self { skills }
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    /// Vocabulary skills that occur as whole tokens in `text`, in vocabulary order.
    pub fn extract(&self, text: &str) -> Vec<String> {
        let haystack = format!(" {} ", normalize_skill_text(text).replace(';', " "));
        self.skills
            .iter()
            .filter(|skill| {
                let needle = format!(" {skill} ");
                haystack.contains(&needle) || haystack.contains(&format!(" {skill}. "))
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_preserves_programming_symbols() {
        assert_eq!(normalize_skill_text("Java/C++, C#  & .NET!"), "java;c++; c# .net");
        assert_eq!(normalize_skill_text("Node.js (Express)"), "node.js express");
    }

    #[test]
    fn parse_dedupes_in_order() {
        assert_eq!(
            parse_skills("Python, SQL; python / Docker;;"),
            vec!["python", "sql", "docker"]
        );
        assert!(parse_skills("   ").is_empty());
    }

    #[test]
    fn list_fields_are_flattened() {
        assert_eq!(
            parse_skill_list(&["AWS", "Go, aws", "Kubernetes"]),
            vec!["aws", "go", "kubernetes"]
        );
    }

    #[test]
    fn vocabulary_extracts_whole_tokens_only() {
        let vocab = SkillVocabulary::from_fields(["Python; SQL", "C++, Go", "machine learning"]);
        assert_eq!(vocab.len(), 5);
        let found = vocab
            .extract("Experienced in Python and C++. Loves Google products and machine learning.");
        assert_eq!(found, vec!["python", "c++", "machine learning"]);
    }
}
