// Enforcement of the output contract on loosely-shaped collaborator records

use crate::models::{Competency, CompetencyRow, Idea, TechnologyLevel};
use serde_json::Value;

/// Free-text labels mapped onto the closed taxonomy
const LEVEL_SYNONYMS: &[(&str, TechnologyLevel)] = &[
    ("r&d", TechnologyLevel::Advanced),
    ("research", TechnologyLevel::Advanced),
    ("research & development", TechnologyLevel::Advanced),
    ("research and development", TechnologyLevel::Advanced),
    ("product", TechnologyLevel::Intermediate),
    ("service", TechnologyLevel::Intermediate),
    ("applied", TechnologyLevel::Intermediate),
    ("development", TechnologyLevel::Intermediate),
    ("core", TechnologyLevel::Intermediate),
    ("unknown", TechnologyLevel::Basic),
];

/// Map any technology-level label onto {Basic, Intermediate, Advanced, Cutting-edge}.
///
/// Exact (case-insensitive) taxonomy match first, then the synonym table,
/// empty input is Basic and anything else Intermediate. Never fails.
pub fn normalize_level(label: &str) -> TechnologyLevel {
    let wanted = label.trim().to_lowercase();
    if wanted.is_empty() {
        return TechnologyLevel::Basic;
    }

    if let Some(level) = TechnologyLevel::all()
        .iter()
        .find(|level| level.as_str().to_lowercase() == wanted)
    {
        return *level;
    }

    LEVEL_SYNONYMS
        .iter()
        .find(|(synonym, _)| *synonym == wanted)
        .map(|(_, level)| *level)
        .unwrap_or(TechnologyLevel::Intermediate)
}

/// First non-empty string among `keys`
pub fn string_field(record: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| record.get(*key))
        .filter_map(|value| match value {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .find(|s| !s.is_empty())
}

/// A list of strings from an array, or from a comma-separated string
pub fn string_list(record: &Value, keys: &[&str]) -> Vec<String> {
    for key in keys {
        match record.get(*key) {
            Some(Value::Array(items)) => {
                return items
                    .iter()
                    .filter_map(|item| match item {
                        Value::String(s) => Some(s.trim().to_string()),
                        Value::Object(_) => string_field(item, &["name", "title"]),
                        _ => None,
                    })
                    .filter(|s| !s.is_empty())
                    .collect();
            }
            Some(Value::String(s)) if !s.trim().is_empty() => {
                return s
                    .split(',')
                    .map(|part| part.trim().to_string())
                    .filter(|part| !part.is_empty())
                    .collect();
            }
            _ => {}
        }
    }
    Vec::new()
}

/// Build a competency from a collaborator record, accepting snake_case and
/// title-case keys. Records without a competency name are dropped.
pub fn competency_from_value(session_id: &str, record: &Value) -> Option<Competency> {
    let name = string_field(record, &["competency", "Competency", "name"])?;
    let level = string_field(record, &["technology_level", "Technology Level", "level"])
        .unwrap_or_default();

    let competency = Competency::new(
        session_id,
        string_field(record, &["category", "Category"]).unwrap_or_else(|| "General".to_string()),
        name,
        string_field(record, &["description", "Description"]).unwrap_or_default(),
        normalize_level(&level),
    );
    Some(competency.with_source_url(
        string_field(record, &["source_url", "Source URL", "url"]).unwrap_or_default(),
    ))
}

/// Build a competency from a human-reviewed row. Rows without a name are dropped.
pub fn competency_from_row(session_id: &str, row: &CompetencyRow) -> Option<Competency> {
    let name = row.competency.trim();
    if name.is_empty() {
        return None;
    }
    let category = match row.category.trim() {
        "" => "General",
        category => category,
    };
    let competency = Competency::new(
        session_id,
        category,
        name,
        row.description.trim(),
        normalize_level(&row.technology_level),
    );
    Some(competency.with_source_url(row.source_url.trim()))
}

/// Competencies from a parsed array; non-object items are ignored
pub fn competencies_from_values(session_id: &str, value: &Value) -> Vec<Competency> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| competency_from_value(session_id, item))
                .collect()
        })
        .unwrap_or_default()
}

/// Build an idea from a collaborator record. Records without a title are dropped.
pub fn idea_from_value(session_id: &str, record: &Value) -> Option<Idea> {
    let title = string_field(record, &["title", "Title", "name"])?;
    let mut idea = Idea::new(session_id, title);
    idea.components = string_list(record, &["components", "Components"]);
    idea.application_area =
        string_field(record, &["application_area", "Application Area"]).unwrap_or_default();
    idea.strategic_rationale =
        string_field(record, &["strategic_rationale", "Strategic Rationale", "rationale"])
            .unwrap_or_default();
    idea.example_analogs = string_list(record, &["example_analogs", "Example Analogs", "analogs"]);
    Some(idea)
}
