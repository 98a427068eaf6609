use anyhow::Result;
use pixelbeam::engine::{self, RunState, Stage};
use pixelbeam::error::{FeaturePolicyError, StageError};
use pixelbeam::normalize::NestedColumn;
use pixelbeam::pipelines;
use pixelbeam::policy::{EventPipeline, FnPolicy};
use pixelbeam::report::{ChartKind, ChartSpec};
use pixelbeam::runner::Runner;
use pixelbeam::sink::{SCHEMA_VERSION, check_compatible};
use pixelbeam::table::Table;
use pixelbeam::testing::*;
use pixelbeam::value::Value;
use pixelbeam::{CancelToken, record};

/// Fails on the row whose `n` is 50.
fn strict_pipeline() -> EventPipeline {
    EventPipeline::new("strict", "STRICT_EVENT")
        .policy(FnPolicy::new(|table: Table| {
            for (i, row) in table.rows().enumerate() {
                if row.get_or_null("n") == &Value::Int(50) {
                    return Err(FeaturePolicyError::Rule(format!("row {i}: n must not be 50")));
                }
            }
            Ok(table)
        }))
        .chart(ChartSpec::new("n", "N", ChartKind::Histogram, ChartSpec::histogram("n", 10)))
}

fn strict_records(n: usize) -> Vec<pixelbeam::EventRecord> {
    (0..n).map(|i| record! { "n" => i, "server_id" => "eu1" }).collect()
}

#[test]
fn every_builtin_keeps_its_rows() -> Result<()> {
    let ws = TestWorkspace::new()?;
    let ctx = ws.context(builtin_source(12));
    for p in pipelines::builtin() {
        let outcome = engine::run(&ctx, &p);
        assert_state(&outcome, RunState::Reported);
        assert_eq!(outcome.rows(), Some(12), "{}", p.name());
        assert_eq!(ctx.metrics.counter(&format!("rows_extracted.{}", p.name())), 12);

        let persisted = outcome.persisted.as_ref().unwrap();
        assert!(!persisted.table.has_column("server_id"), "{}", p.name());
        assert_one_hot(&persisted.table, "server_id");
        assert!(!persisted.table.has_column(engine::ROW_ID_COLUMN));
        assert_eq!(outcome.fragments.len(), p.charts.len());
    }
    Ok(())
}

#[test]
fn policy_failure_is_contained() -> Result<()> {
    let ws = TestWorkspace::new()?;
    let source = builtin_source(20).with_records("STRICT_EVENT", strict_records(1000));
    let ctx = ws.context(source);
    let mut selected = pipelines::builtin();
    selected.insert(3, strict_pipeline());

    let summary = Runner::default().execute(ws.config(), &ctx, &selected)?;
    assert_eq!(summary.exit_code(), 1);
    let strict = summary.outcome("strict").unwrap();
    assert_state(strict, RunState::Failed(Stage::FeatureEngineering));
    assert!(matches!(
        strict.error,
        Some(StageError::FeaturePolicy(FeaturePolicyError::Rule(ref m))) if m.starts_with("row 50")
    ));
    assert!(strict.persisted.is_none());
    assert!(!ctx.sink.data_path(&strict.event_type).exists());

    for o in summary.outcomes.iter().filter(|o| o.event_type.name != "strict") {
        assert_state(o, RunState::Reported);
    }

    let html = std::fs::read_to_string(&ws.config().paths.report_path)?;
    assert!(html.contains("FAILED(feature_engineering)"));
    for p in pipelines::builtin() {
        assert!(html.contains(&format!("<section id=\"{}\">", p.name())), "{}", p.name());
    }
    Ok(())
}

#[test]
fn extraction_failure_stops_at_extract() -> Result<()> {
    let ws = TestWorkspace::new()?;
    let ctx = ws.context(MockSource::new().with_failure("BATTLE_END", "503 after 3 attempts"));
    let outcome = engine::run(&ctx, &pipelines::battles::pipeline());
    assert_state(&outcome, RunState::Failed(Stage::Extract));
    assert!(matches!(outcome.error, Some(StageError::Extraction(_))));
    assert!(outcome.fragments.is_empty());
    Ok(())
}

#[test]
fn filter_must_be_declared() -> Result<()> {
    let ws = TestWorkspace::new()?;
    let ctx = ws.context(MockSource::new().with_records("STRICT_EVENT", strict_records(10)));
    let dropper = |table: Table| -> Result<Table, FeaturePolicyError> {
        let mut table = table;
        table.retain_rows(|r| r.get_or_null("n") != &Value::Int(3));
        Ok(table)
    };

    let undeclared = EventPipeline::new("strict", "STRICT_EVENT").policy(FnPolicy::new(dropper));
    let outcome = engine::run(&ctx, &undeclared);
    assert_state(&outcome, RunState::Failed(Stage::FeatureEngineering));
    assert!(matches!(
        outcome.error,
        Some(StageError::FeaturePolicy(FeaturePolicyError::RowCountChanged { before: 10, after: 9 }))
    ));

    let declared = EventPipeline::new("strict", "STRICT_EVENT").policy(FnPolicy::new(dropper).with_filter("drop_three"));
    let outcome = engine::run(&ctx, &declared);
    assert_state(&outcome, RunState::Reported);
    assert_eq!(outcome.rows(), Some(9));
    Ok(())
}

#[test]
fn panicking_policy_fails_only_its_event_type() -> Result<()> {
    let ws = TestWorkspace::new()?;
    let ctx = ws.context(MockSource::new().with_records("STRICT_EVENT", strict_records(3)));
    let p = EventPipeline::new("strict", "STRICT_EVENT")
        .policy(FnPolicy::new(|_t: Table| -> Result<Table, FeaturePolicyError> { panic!("index out of range") }));
    let outcome = engine::run(&ctx, &p);
    assert_state(&outcome, RunState::Failed(Stage::FeatureEngineering));
    assert!(matches!(
        outcome.error,
        Some(StageError::FeaturePolicy(FeaturePolicyError::Panicked(_)))
    ));
    Ok(())
}

#[test]
fn cancellation_keeps_persisted_output() -> Result<()> {
    let ws = TestWorkspace::new()?;
    let cancel = CancelToken::new();
    let trip = cancel.clone();
    let cancelling = EventPipeline::new("strict", "STRICT_EVENT").policy(FnPolicy::new(move |t: Table| {
        trip.cancel();
        Ok(t)
    }));
    let source = builtin_source(5).with_records("STRICT_EVENT", strict_records(5));
    let ctx = ws.context(source).with_cancel(cancel);
    let selected = vec![
        pipelines::battles::pipeline(),
        cancelling,
        pipelines::deaths::pipeline(),
    ];

    let outcomes = Runner::default().run_all(&ctx, &selected)?;
    assert_state(&outcomes[0], RunState::Reported);
    assert_state(&outcomes[1], RunState::Failed(Stage::Encode));
    assert_state(&outcomes[2], RunState::Failed(Stage::Extract));
    assert!(matches!(outcomes[1].error, Some(StageError::Cancelled)));

    assert!(ctx.sink.data_path(&outcomes[0].event_type).is_file());
    assert!(!ctx.sink.data_path(&outcomes[1].event_type).exists());
    assert!(!ctx.sink.data_path(&outcomes[2].event_type).exists());
    Ok(())
}

#[test]
fn persisted_metadata_is_compatible() -> Result<()> {
    let ws = TestWorkspace::new()?;
    let ctx = ws.context(builtin_source(8));
    let outcome = engine::run(&ctx, &pipelines::deaths::pipeline());
    assert_state(&outcome, RunState::Reported);

    let meta = check_compatible(ctx.sink.metadata_path(&outcome.event_type))?;
    assert_eq!(meta.schema_version, SCHEMA_VERSION);
    assert_eq!(meta.row_count, 8);
    assert_eq!(meta.action, "PLAYER_DEATH");
    assert!(meta.columns.iter().any(|c| c.name == "death_category_Gravity"));

    // same input, same schema
    let ws2 = TestWorkspace::new()?;
    let ctx2 = ws2.context(builtin_source(8));
    engine::run(&ctx2, &pipelines::deaths::pipeline());
    let meta2 = check_compatible(ctx2.sink.metadata_path(&outcome.event_type))?;
    assert_eq!(meta.schema_fingerprint, meta2.schema_fingerprint);
    Ok(())
}

#[test]
fn nested_columns_only_touch_configured_columns() -> Result<()> {
    let ws = TestWorkspace::new()?;
    let records = vec![record! { "a" => "{\"x\": 1}", "b" => "{\"y\": 2}", "server_id" => "eu1" }];
    let ctx = ws.context(MockSource::new().with_records("AB", records));
    let p = EventPipeline::new("ab", "AB").nested(NestedColumn::keep("a"));
    let outcome = engine::run(&ctx, &p);
    assert_state(&outcome, RunState::Reported);
    let table = &outcome.persisted.as_ref().unwrap().table;
    assert!(matches!(table.get(0, "a"), Some(Value::Map(_))));
    assert_eq!(table.get(0, "b"), Some(&Value::from("{\"y\": 2}")));
    Ok(())
}
