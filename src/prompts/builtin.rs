// Built-in prompt templates

use std::collections::HashMap;

/// Built-in template names
pub const SEARCH_FALLBACK: &str = "search_fallback";
pub const COMPETENCY_EXTRACTION: &str = "competency_extraction";
pub const COMPETENCY_REFINEMENT: &str = "competency_refinement";
pub const GAP_ANALYSIS: &str = "gap_analysis";
pub const IDEA_GENERATION: &str = "idea_generation";
pub const ANALOG_FINDER: &str = "analog_finder";
pub const ACTION_PLAN: &str = "action_plan";
pub const JSON_REPAIR: &str = "json_repair";

/// Get all built-in templates
pub fn get_builtin_templates() -> HashMap<String, String> {
    list_builtin_templates()
        .into_iter()
        .filter_map(|name| get_builtin_template(name).map(|t| (name.to_string(), t.to_string())))
        .collect()
}

/// Get a specific built-in template
pub fn get_builtin_template(name: &str) -> Option<&'static str> {
    match name {
        SEARCH_FALLBACK => Some(SEARCH_FALLBACK_TEMPLATE),
        COMPETENCY_EXTRACTION => Some(COMPETENCY_EXTRACTION_TEMPLATE),
        COMPETENCY_REFINEMENT => Some(COMPETENCY_REFINEMENT_TEMPLATE),
        GAP_ANALYSIS => Some(GAP_ANALYSIS_TEMPLATE),
        IDEA_GENERATION => Some(IDEA_GENERATION_TEMPLATE),
        ANALOG_FINDER => Some(ANALOG_FINDER_TEMPLATE),
        ACTION_PLAN => Some(ACTION_PLAN_TEMPLATE),
        JSON_REPAIR => Some(JSON_REPAIR_TEMPLATE),
        _ => None,
    }
}

/// List all built-in template names
pub fn list_builtin_templates() -> Vec<&'static str> {
    vec![
        SEARCH_FALLBACK,
        COMPETENCY_EXTRACTION,
        COMPETENCY_REFINEMENT,
        GAP_ANALYSIS,
        IDEA_GENERATION,
        ANALOG_FINDER,
        ACTION_PLAN,
        JSON_REPAIR,
    ]
}

// Template content

const SEARCH_FALLBACK_TEMPLATE: &str = r#"You are a conservative researcher. Simulate {{ count }} concise, fact-oriented web snippets about the public capabilities of the company '{{ company }}'. For any claim that is not certain, include the word 'may' or 'possibly' in the snippet.

Return a JSON array of objects with fields: url, snippet. If you don't have a real URL, set url to an empty string. Return only valid JSON."#;

const COMPETENCY_EXTRACTION_TEMPLATE: &str = r#"You are a structured extractor. Given these website snippets, return ONLY a JSON array of competencies.

Each item MUST follow this schema strictly:
{
  "category": "...",
  "competency": "...",
  "description": "...",
  "technology_level": "...",
  "source_url": "..."
}

IMPORTANT:
- technology_level MUST be one of EXACTLY these values: Basic, Intermediate, Advanced, Cutting-edge
- NEVER use any other labels such as Product, Service, R&D, Applied.
- If unsure, pick the closest valid level.

SNIPPETS:
{% for s in snippets %}
URL: {{ s.url }}
SNIPPET: {{ s.text }}
{% endfor %}
Return ONLY the JSON array."#;

const COMPETENCY_REFINEMENT_TEMPLATE: &str = r#"You are a structured extractor. Use the website snippets AND the human clarifications to produce a refined, validated JSON array of competencies.

Each competency MUST include: category, competency, description, technology_level, source_url

IMPORTANT:
technology_level MUST be ONE OF: Basic, Intermediate, Advanced, Cutting-edge
NEVER output anything else. If the original text uses labels like R&D, Product, Applied, map them to the closest valid level.

SNIPPETS:
{% for s in snippets %}
URL: {{ s.url }}
SNIPPET: {{ s.text }}
{% endfor %}
CLARIFICATIONS:
{% for c in clarifications %}Q: {{ c.question }} A: {% if c.answer %}{{ c.answer }}{% else %}(skipped){% endif %}
{% endfor %}
Return ONLY the JSON array."#;

const GAP_ANALYSIS_TEMPLATE: &str = r#"You are an analyst whose job is to identify missing information about a company's competencies. Given the discovered competencies below, produce a concise JSON object with two fields:

  {
    "questions": ["question1", "question2"],
    "complete": true
  }

The 'questions' array should contain short, actionable clarifying questions a human can answer to validate or complete the competency list. Set 'complete' to true only if there are no additional clarifying questions, i.e. the competency list looks complete.
{% if answered %}
These questions were already answered and must not be asked again:
{% for q in answered %}- {{ q }}
{% endfor %}{% endif %}
Discovered Competencies:
{% for c in competencies %}- {{ c.category }} | {{ c.competency }}: {{ c.description }}
{% endfor %}
Return only JSON."#;

const IDEA_GENERATION_TEMPLATE: &str = r#"You are a creative strategist. Given the following validated competencies, generate up to {{ max_ideas }} innovative ideas for {{ company }}. Each idea must be an object with: title, components (list), application_area, strategic_rationale, example_analogs (list).

COMPETENCIES:
{% for c in competencies %}{{ c.competency }} ({{ c.category }}, {{ c.technology_level }}): {{ c.description }}
{% endfor %}
Return only a JSON array."#;

const ANALOG_FINDER_TEMPLATE: &str = r#"Given this idea description, produce 3 real-world analogous products or references (short list). Return as JSON array of strings.

IDEA:
Title: {{ title }}
Rationale: {{ rationale }}

Return only JSON array."#;

const ACTION_PLAN_TEMPLATE: &str = r#"You are a senior corporate strategist. Produce a detailed action plan for the following idea of {{ company }}. Include: Executive Summary, Market Analysis, Required Competencies & Gaps, Partnering Strategy, Resources & Timeline, Risk Assessment. Return the output in markdown.

Idea: {{ title }}
Components: {{ components | join(sep=", ") }}
Rationale: {% if rationale %}{{ rationale }}{% else %}No rationale provided.{% endif %}
{% if related %}Related competencies: {{ related | join(sep=", ") }}
{% endif %}"#;

const JSON_REPAIR_TEMPLATE: &str = r#"The text below may contain commentary and JSON. Extract and return ONLY the JSON array or object present. If there is no JSON, return an empty array []

ORIGINAL TEXT:
----START----
{{ raw }}
----END----

Return only JSON."#;
