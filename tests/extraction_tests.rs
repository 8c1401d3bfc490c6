// Integration tests for structured extraction, level normalization and ranking
// These exercise the public API with scripted collaborators only

#[cfg(test)]
mod extraction_integration_tests {
    use innovation_flow_lib::collaborators::ScriptedGenerator;
    use innovation_flow_lib::extraction::{normalize_level, ParseStrategy, StructuredExtractor};
    use innovation_flow_lib::prompts::PromptLibrary;
    use innovation_flow_lib::ranking::select_top;
    use innovation_flow_lib::{GenerationError, TechnologyLevel, WorkflowError};
    use serde_json::json;
    use std::sync::Arc;

    fn extractor(replies: Vec<Result<String, GenerationError>>) -> (StructuredExtractor, Arc<ScriptedGenerator>) {
        let generator = Arc::new(ScriptedGenerator::new(replies));
        let prompts = Arc::new(PromptLibrary::builtin().unwrap());
        (StructuredExtractor::new(generator.clone(), prompts), generator)
    }

    #[tokio::test]
    async fn test_well_formed_array_round_trips() {
        let text = r#"[{"competency": "Battery packs", "technology_level": "Advanced"}, {"competency": "Telematics"}]"#;
        let (extractor, generator) = extractor(vec![Ok(text.to_string())]);

        let result = extractor.extract_structured("list competencies").await.unwrap();
        assert_eq!(result.value, Some(serde_json::from_str::<serde_json::Value>(text).unwrap()));
        assert_eq!(result.strategy, Some(ParseStrategy::Direct));
        assert!(!result.repaired);
        assert_eq!(generator.call_count(), 1);
    }

    #[tokio::test]
    async fn test_commentary_wrapped_array_recovered_without_repair() {
        let text = "Sure! Here is what I found:\n[{\"competency\": \"Robotics\"}]\nLet me know if you need more.";
        let (extractor, generator) = extractor(vec![Ok(text.to_string())]);

        let result = extractor.extract_structured("list competencies").await.unwrap();
        assert_eq!(result.value, Some(json!([{"competency": "Robotics"}])));
        assert_eq!(result.raw_text, text);
        assert!(!result.repaired);
        assert_eq!(generator.call_count(), 1);
    }

    #[tokio::test]
    async fn test_fenced_object_recovered() {
        let text = "```json\n{\"questions\": [\"Q1?\"], \"complete\": false}\n```";
        let (extractor, _) = extractor(vec![Ok(text.to_string())]);

        let result = extractor.extract_structured("gaps").await.unwrap();
        assert_eq!(result.as_object().unwrap()["questions"], json!(["Q1?"]));
    }

    #[tokio::test]
    async fn test_repair_round_runs_once() {
        let (extractor, generator) = extractor(vec![
            Ok("Competencies: robotics, services (sorry, no JSON)".into()),
            Ok(r#"[{"competency": "Robotics"}]"#.into()),
        ]);

        let result = extractor.extract_structured("list competencies").await.unwrap();
        assert!(result.repaired);
        assert_eq!(result.value, Some(json!([{"competency": "Robotics"}])));
        assert_eq!(generator.call_count(), 2);
        assert!(generator.prompts()[1].contains("Competencies: robotics, services"));
    }

    #[tokio::test]
    async fn test_garbage_yields_none_without_error() {
        let garbage = "<<< nothing structured here >>>";
        let (extractor, generator) = extractor(vec![Ok(garbage.into()), Ok("still nothing".into())]);

        let result = extractor.extract_structured("list competencies").await.unwrap();
        assert!(result.value.is_none());
        assert_eq!(result.raw_text, garbage);
        assert_eq!(generator.call_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_repair_call_degrades_to_none() {
        let (extractor, _) = extractor(vec![
            Ok("no json".into()),
            Err(GenerationError::Transport("connection reset".into())),
        ]);

        let result = extractor.extract_structured("list competencies").await.unwrap();
        assert!(result.value.is_none());
    }

    #[tokio::test]
    async fn test_failed_primary_call_is_an_error() {
        let (extractor, _) = extractor(vec![Err(GenerationError::Http {
            status: 503,
            body: "unavailable".into(),
        })]);

        let err = extractor.extract_structured("list competencies").await.unwrap_err();
        assert!(matches!(err, WorkflowError::Generation(GenerationError::Http { status: 503, .. })));
    }

    #[test]
    fn test_normalize_level_is_total_and_closed() {
        assert_eq!(normalize_level("R&D"), TechnologyLevel::Advanced);
        assert_eq!(normalize_level(""), TechnologyLevel::Basic);
        assert_eq!(normalize_level("Basic"), TechnologyLevel::Basic);
        assert_eq!(normalize_level("cutting-edge"), TechnologyLevel::CuttingEdge);
        assert_eq!(normalize_level("product"), TechnologyLevel::Intermediate);
        assert_eq!(normalize_level("unknown"), TechnologyLevel::Basic);

        for label in ["", " ", "???", "World-class", "ADVANCED", "Applied research", "🚀"] {
            assert!(TechnologyLevel::all().contains(&normalize_level(label)));
        }
    }

    #[test]
    fn test_select_top_three() {
        let scored = vec![
            ("idea-1", 10.0),
            ("idea-2", 30.0),
            ("idea-3", 20.0),
            ("idea-4", 5.0),
            ("idea-5", 25.0),
        ];
        let scores: Vec<f64> = select_top(scored, 3).into_iter().map(|(_, s)| s).collect();
        assert_eq!(scores, vec![30.0, 25.0, 20.0]);
    }
}
