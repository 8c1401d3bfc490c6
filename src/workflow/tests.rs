//! Lifecycle tests for the workflow engine and session driver

use super::*;
use crate::collaborators::{ResilientSearch, ScriptedGenerator, SearchProvider, StaticSearch};
use crate::error::{GenerationError, SearchError, WorkflowError};
use crate::models::{Clarification, Competency, CompetencyRow, Idea, Snippet, TechnologyLevel};
use crate::ranking::EvaluationSheet;
use crate::records::{load_session_records, Collection};
use crate::stages::test_support::context;
use crate::stages::StageContext;
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn acme_snippets() -> Vec<Snippet> {
    vec![Snippet::new(
        "https://acme.example/about",
        "Acme designs industrial robots and sells maintenance services.",
    )]
}

fn engine_with(ctx: StageContext) -> WorkflowEngine {
    WorkflowEngine::new(Arc::new(InMemorySessionStore::new()), ctx)
}

fn offline_engine(dir: &Path) -> (WorkflowEngine, Arc<ScriptedGenerator>, Arc<StaticSearch>) {
    let generator = Arc::new(ScriptedGenerator::offline());
    let search = Arc::new(StaticSearch::new(acme_snippets()));
    let ctx = context(generator.clone(), search.clone(), dir);
    (engine_with(ctx), generator, search)
}

/// Search provider that takes a while and counts its calls
struct SlowSearch {
    calls: AtomicUsize,
}

#[async_trait]
impl SearchProvider for SlowSearch {
    async fn search(&self, _query: &str, _max_results: usize) -> Result<Vec<Snippet>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(acme_snippets())
    }
}

#[tokio::test]
async fn test_pause_before_generate_ideas_stops_after_resolve_gaps() {
    let temp_dir = TempDir::new().unwrap();
    let (engine, _, _) = offline_engine(temp_dir.path());
    let session = engine.create_session("Acme").await.unwrap();

    let report = engine
        .run(&session.session_id, &[StageName::GenerateIdeas])
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Paused { before: StageName::GenerateIdeas });
    assert_eq!(
        report.executed,
        vec![StageName::Search, StageName::Extract, StageName::ResolveGaps]
    );
    let state = report.state;
    assert!(state.gap_questions.as_ref().is_some_and(|q| !q.is_empty()));
    assert!(state.ideas.is_none());
    assert!(state.evaluation_path.is_none());
    assert!(state.selected_ideas.is_none());
    assert!(state.action_plan_path.is_none());
    assert_eq!(state.cursor, Some(StageCursor::AwaitingClarification));
    assert_eq!(state.runs_of(StageName::GenerateIdeas), 0);

    // The stored state matches what the run returned
    assert_eq!(engine.get(&session.session_id).await.unwrap(), state);
}

#[tokio::test]
async fn test_resume_skips_completed_stages() {
    let temp_dir = TempDir::new().unwrap();
    let (engine, generator, search) = offline_engine(temp_dir.path());
    let id = engine.create_session("Acme").await.unwrap().session_id;

    engine.run(&id, &[StageName::GenerateIdeas]).await.unwrap();
    let calls = generator.call_count();

    let report = engine.run(&id, &[StageName::GenerateIdeas]).await.unwrap();
    assert!(report.executed.is_empty());
    assert_eq!(
        report.skipped,
        vec![StageName::Search, StageName::Extract, StageName::ResolveGaps]
    );
    assert_eq!(generator.call_count(), calls);
    assert_eq!(search.call_count(), 1);
}

#[tokio::test]
async fn test_clarification_loop_terminates() {
    let temp_dir = TempDir::new().unwrap();
    let (engine, _, _) = offline_engine(temp_dir.path());
    let manager = SessionManager::new(Arc::new(engine));

    let round = manager.start("Acme").await.unwrap();
    assert_eq!(round.status, LoopStatus::Continue);
    assert_eq!(round.questions.len(), 1);

    // The collaborator keeps asking the same question; once answered it is dropped
    let answers = round
        .questions
        .iter()
        .map(|q| Clarification::new(q.clone(), "Yes, three plants in Ohio"))
        .collect();
    let round = manager
        .answer_clarifications(&round.session_id, answers)
        .await
        .unwrap();
    assert_eq!(round.status, LoopStatus::Complete);
    assert!(round.questions.is_empty());
    assert_eq!(round.competencies[0].competency, "Core Engineering");

    let state = manager.snapshot(&round.session_id).await.unwrap();
    assert_eq!(state.runs_of(StageName::ResolveGaps), 2);
    assert_eq!(state.runs_of(StageName::Extract), 1);
    assert_eq!(state.clarifications_applied, 1);
}

#[tokio::test]
async fn test_repeated_question_set_is_not_returned_twice() {
    let temp_dir = TempDir::new().unwrap();
    let generator = Arc::new(
        ScriptedGenerator::default()
            .with_rule("human clarifications", "[]")
            .with_rule("website snippets", r#"[{"competency": "Robotics", "technology_level": "Advanced"}]"#)
            .with_rule("identify missing information", r#"["What is your annual R&D budget?"]"#),
    );
    let ctx = context(generator, Arc::new(StaticSearch::new(acme_snippets())), temp_dir.path());
    let manager = SessionManager::new(Arc::new(engine_with(ctx)));

    let round = manager.start("Acme").await.unwrap();
    assert_eq!(round.questions, vec!["What is your annual R&D budget?"]);

    // Skipped answer: the question is not answered, but the same set must not come back
    let round = manager
        .answer_clarifications(
            &round.session_id,
            vec![Clarification::new("Which markets do you serve?", "")],
        )
        .await
        .unwrap();
    assert_eq!(round.status, LoopStatus::Complete);
    assert!(round.questions.is_empty());
}

#[tokio::test]
async fn test_zero_snippets_still_yields_a_competency() {
    let temp_dir = TempDir::new().unwrap();
    let generator = Arc::new(
        ScriptedGenerator::new(vec![
            Ok("I have no information about this company.".into()),
            Ok("There is no JSON here.".into()),
        ])
        .with_fallback("[]"),
    );
    let mut ctx = context(generator, Arc::new(StaticSearch::empty()), temp_dir.path());
    ctx.search = Arc::new(ResilientSearch::new(
        Some(Arc::new(StaticSearch::empty())),
        None,
        ctx.prompts.clone(),
    ));
    let records = ctx.records.clone();
    let engine = engine_with(ctx);
    let id = engine.create_session("Acme").await.unwrap().session_id;

    let state = engine.run(&id, &[StageName::GenerateIdeas]).await.unwrap().state;

    let snippets = state.snippets.as_ref().unwrap();
    assert_eq!(snippets.len(), 1);
    assert!(snippets[0].text.starts_with("Acme"));

    let competencies = state.competencies.as_ref().unwrap();
    assert_eq!(competencies.len(), 1);
    assert_eq!(competencies[0].competency, "Core Products");
    assert_eq!(competencies[0].description, "Key products of Acme");

    let stored: Vec<Competency> = load_session_records(records.as_ref(), Collection::Competencies, &id).unwrap();
    assert_eq!(&stored, competencies);

    // Heuristic questions since the gap analysis returned nothing
    assert_eq!(state.gap_questions.as_ref().map(Vec::len), Some(2));
}

#[tokio::test]
async fn test_failing_stage_leaves_state_at_last_merge() {
    let temp_dir = TempDir::new().unwrap();
    let generator = Arc::new(ScriptedGenerator::new(vec![Err(GenerationError::Http {
        status: 500,
        body: "internal".into(),
    })]));
    let ctx = context(generator, Arc::new(StaticSearch::new(acme_snippets())), temp_dir.path());
    let engine = engine_with(ctx);
    let id = engine.create_session("Acme").await.unwrap().session_id;

    let err = engine.run(&id, &[StageName::GenerateIdeas]).await.unwrap_err();
    assert!(err.is_collaborator());

    let state = engine.get(&id).await.unwrap();
    assert_eq!(state.snippets.as_ref().map(Vec::len), Some(1));
    assert!(state.competencies.is_none());
    assert_eq!(state.cursor, Some(StageCursor::Search));
    assert_eq!(state.runs_of(StageName::Extract), 0);
}

#[tokio::test]
async fn test_concurrent_runs_on_one_session_serialize() {
    let temp_dir = TempDir::new().unwrap();
    let search = Arc::new(SlowSearch {
        calls: AtomicUsize::new(0),
    });
    let mut ctx = context(
        Arc::new(ScriptedGenerator::offline()),
        Arc::new(StaticSearch::empty()),
        temp_dir.path(),
    );
    ctx.search = search.clone();
    let engine = engine_with(ctx);
    let id = engine.create_session("Acme").await.unwrap().session_id;

    let (a, b) = tokio::join!(
        engine.run(&id, &[StageName::GenerateIdeas]),
        engine.run(&id, &[StageName::GenerateIdeas])
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(search.calls.load(Ordering::SeqCst), 1);
    assert_eq!(a.executed.len() + b.executed.len(), 3);
    assert_eq!(a.state, b.state);
}

#[tokio::test]
async fn test_invalid_pause_point_and_unknown_session() {
    let temp_dir = TempDir::new().unwrap();
    let (engine, _, search) = offline_engine(temp_dir.path());
    let id = engine.create_session("Acme").await.unwrap().session_id;

    let err = engine.run(&id, &[StageName::Extract]).await.unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidPausePoint(StageName::Extract)));
    assert_eq!(search.call_count(), 0);

    let err = engine.run("missing", &[]).await.unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound(_)));

    assert!(engine.delete(&id).await.unwrap());
    assert!(matches!(engine.get(&id).await, Err(WorkflowError::NotFound(_))));
}

#[tokio::test]
async fn test_generate_ideas_before_loop_closed_is_precondition_error() {
    let temp_dir = TempDir::new().unwrap();
    let (engine, _, _) = offline_engine(temp_dir.path());
    let manager = SessionManager::new(Arc::new(engine));
    let round = manager.start("Acme").await.unwrap();

    let err = manager.generate_ideas(&round.session_id).await.unwrap_err();
    assert!(err.is_precondition());

    let state = manager.snapshot(&round.session_id).await.unwrap();
    assert!(state.ideas.is_none());
    assert_eq!(state.cursor, Some(StageCursor::AwaitingClarification));
}

#[tokio::test]
async fn test_full_lifecycle() {
    let temp_dir = TempDir::new().unwrap();
    let (engine, _, _) = offline_engine(temp_dir.path());
    let manager = SessionManager::new(Arc::new(engine));

    let round = manager.start("Acme").await.unwrap();
    let id = round.session_id.clone();
    let round = manager.complete_clarifications(&id).await.unwrap();
    assert_eq!(round.status, LoopStatus::Complete);

    let ready = manager.generate_ideas(&id).await.unwrap();
    assert_eq!(ready.ideas.len(), 2);
    assert!(ready.evaluation_path.exists());

    let state = manager.snapshot(&id).await.unwrap();
    assert_eq!(state.cursor, Some(StageCursor::TemplateGenerated));
    assert!(state.selected_ideas.is_none());

    // Finishing before scores are in fails without touching the session
    let err = manager.finish(&id).await.unwrap_err();
    assert!(err.is_precondition());

    let mut sheet = EvaluationSheet::load(&ready.evaluation_path).unwrap();
    for (row, fit) in sheet.ideas.iter_mut().zip([2u8, 5]) {
        row.strategic_fit = Some(fit);
        row.market_attractiveness = Some(3);
        row.technical_feasibility = Some(3);
        row.priority = Some("M".into());
    }
    manager.submit_evaluations(&id, &sheet.ideas).await.unwrap();

    let completion = manager.finish(&id).await.unwrap();
    assert_eq!(completion.selected.len(), 2);
    assert_eq!(completion.selected[0].idea.title, "Partner Ecosystem");
    let plans = std::fs::read_to_string(&completion.action_plan_path).unwrap();
    assert!(plans.contains("## 1. Partner Ecosystem"));
    assert!(plans.contains("## 2. Modular Service Platform"));

    let state = manager.snapshot(&id).await.unwrap();
    assert!(state.cursor.is_some_and(|c| c.is_terminal()));

    // New scores replace the selection on the next finish
    sheet.ideas[0].strategic_fit = Some(5);
    sheet.ideas[0].priority = Some("High".into());
    manager.submit_evaluations(&id, &sheet.ideas).await.unwrap();
    let completion = manager.finish(&id).await.unwrap();
    assert_eq!(completion.selected[0].idea.title, "Modular Service Platform");
}

#[tokio::test]
async fn test_rerun_replaces_competencies_and_stops_at_next_pause() {
    let temp_dir = TempDir::new().unwrap();
    let (engine, _, search) = offline_engine(temp_dir.path());
    let manager = SessionManager::new(Arc::new(engine));

    let round = manager.start("Acme").await.unwrap();
    let id = round.session_id.clone();
    let before: Vec<String> = round.competencies.iter().map(|c| c.id.clone()).collect();

    let report = manager.rerun(&id, StageName::Extract).await.unwrap();
    assert_eq!(report.executed, vec![StageName::Extract, StageName::ResolveGaps]);
    assert_eq!(report.skipped, vec![StageName::Search]);
    assert_eq!(report.outcome, RunOutcome::Paused { before: StageName::GenerateIdeas });
    assert_eq!(search.call_count(), 1);

    let after: Vec<String> = report
        .state
        .competencies
        .as_ref()
        .unwrap()
        .iter()
        .map(|c| c.id.clone())
        .collect();
    assert_eq!(after.len(), before.len());
    assert_ne!(after, before);
    assert_eq!(report.state.runs_of(StageName::Extract), 2);
    assert_eq!(report.state.cursor, Some(StageCursor::AwaitingClarification));
}

#[tokio::test]
async fn test_validated_competencies_replace_extraction() {
    let temp_dir = TempDir::new().unwrap();
    let (engine, generator, _) = offline_engine(temp_dir.path());
    let records = engine.context().records.clone();
    let manager = SessionManager::new(Arc::new(engine));

    let round = manager.start("Acme").await.unwrap();
    let id = round.session_id.clone();
    assert_eq!(round.status, LoopStatus::Continue);

    let rows = vec![
        CompetencyRow::new("Energy", "Solid-state batteries", "R&D"),
        CompetencyRow::new("", "Fleet software", "product"),
        CompetencyRow::new("Energy", "   ", "Advanced"),
    ];
    let accepted = manager.submit_competencies(&id, &rows).await.unwrap();
    assert_eq!(accepted.len(), 2);
    assert_eq!(accepted[0].technology_level, TechnologyLevel::Advanced);
    assert_eq!(accepted[1].technology_level, TechnologyLevel::Intermediate);
    assert_eq!(accepted[1].category, "General");

    let stored: Vec<Competency> =
        load_session_records(records.as_ref(), Collection::Competencies, &id).unwrap();
    assert_eq!(stored, accepted);
    let state = manager.snapshot(&id).await.unwrap();
    assert!(state.clarification_gate_open());

    let ready = manager.generate_ideas(&id).await.unwrap();
    assert!(!ready.ideas.is_empty());
    let idea_prompt = generator
        .prompts()
        .into_iter()
        .find(|p| p.contains("creative strategist"))
        .unwrap();
    assert!(idea_prompt.contains("Solid-state batteries"));
    assert!(!idea_prompt.contains(&round.competencies[0].competency));

    // A second submission discards the ideas built on the previous list
    manager
        .submit_competencies(&id, &[CompetencyRow::new("Energy", "Grid storage", "cutting-edge")])
        .await
        .unwrap();
    let state = manager.snapshot(&id).await.unwrap();
    assert!(state.ideas.is_none());
    assert!(state.evaluation_path.is_none());
    assert_eq!(state.cursor, Some(StageCursor::AwaitingClarification));
    let ideas: Vec<Idea> = load_session_records(records.as_ref(), Collection::Ideas, &id).unwrap();
    assert!(ideas.is_empty());
}

#[tokio::test]
async fn test_validated_competencies_need_a_name() {
    let temp_dir = TempDir::new().unwrap();
    let (engine, _, _) = offline_engine(temp_dir.path());
    let manager = SessionManager::new(Arc::new(engine));
    let id = manager.start("Acme").await.unwrap().session_id;

    let err = manager
        .submit_competencies(&id, &[CompetencyRow::new("Energy", "", "Basic")])
        .await
        .unwrap_err();
    assert!(err.is_precondition());
    let state = manager.snapshot(&id).await.unwrap();
    assert!(!state.clarification_gate_open());
}
