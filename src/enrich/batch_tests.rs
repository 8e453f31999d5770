use super::*;
use crate::config::{default_config, DEFAULT_PROMPT};
use crate::enrich::call_log::CallLogEntry;
use crate::enrich::checkpoint::Checkpoint;
use crate::enrich::test_support::{
    fast_retry, unauthorized, EchoProvider, ScriptedProvider, ECHO_TEMPLATE,
};
use crate::table::read_table;
use std::path::PathBuf;
use tempfile::TempDir;

struct Harness {
    dir: TempDir,
    config: EnrichConfig,
    store: CheckpointStore,
    output: PathBuf,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = default_config();
        config.retry = fast_retry();
        let store = CheckpointStore::new(dir.path().join("checkpoint.json"));
        let output = dir.path().join("enriched.csv");
        Self {
            dir,
            config,
            store,
            output,
        }
    }

    fn run(
        &self,
        provider: &dyn AnnotationProvider,
        provider_id: &str,
        input: &Table,
        fallbacks: &[String],
        call_log: Option<&CallLog>,
    ) -> Result<RunSummary> {
        let provider_config = self.config.provider(provider_id).unwrap();
        let target = RunTarget::resolve(provider_id, provider_config, DEFAULT_PROMPT);
        let run = EnrichRun {
            target: &target,
            model: "m".to_string(),
            fallbacks,
            template: ECHO_TEMPLATE,
            output_path: &self.output,
        };
        run_enrichment(&self.config, provider, &self.store, input, &run, call_log)
    }

    fn output_rows(&self) -> Vec<Row> {
        read_table(&self.output).unwrap().rows
    }
}

fn input(codes: &[&str]) -> Table {
    Table {
        headers: vec!["code".to_string(), "name".to_string()],
        rows: codes
            .iter()
            .map(|code| {
                Row::from([
                    ("code".to_string(), code.to_string()),
                    ("name".to_string(), format!("{} airport", code.trim())),
                ])
            })
            .collect(),
    }
}

#[test]
fn pending_codes_are_distinct_in_first_seen_order() {
    let table = input(&["bye", " BYE ", "", "ant", "XYZ", "Ant"]);
    let mut results = BTreeMap::new();
    results.insert("XYZ".to_string(), StoredResult::empty());
    assert_eq!(pending_codes(&table.rows, &results), vec!["BYE", "ANT"]);
}

#[test]
fn batches_follow_input_order() {
    let harness = Harness::new();
    let codes: Vec<String> = (0..65).map(|i| format!("C{i:02}")).collect();
    let refs: Vec<&str> = codes.iter().map(String::as_str).collect();
    let provider = EchoProvider::new();

    let summary = harness
        .run(&provider, "openai", &input(&refs), &[], None)
        .unwrap();

    let batches = provider.batches();
    let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![30, 30, 5]);
    assert_eq!(batches[0][0], "C00");
    assert_eq!(batches[2], vec!["C60", "C61", "C62", "C63", "C64"]);
    assert_eq!(provider.queried_codes(), codes);
    assert_eq!(summary.batches, 3);
    assert_eq!(summary.queried, 65);
    assert_eq!(summary.rows, 65);

    let checkpoint = harness.store.load("openai").unwrap();
    assert_eq!(checkpoint.results.len(), 65);
    assert_eq!(checkpoint.model.as_deref(), Some("m"));
}

#[test]
fn resume_skips_checkpointed_codes() {
    let harness = Harness::new();
    let mut checkpoint = Checkpoint::default();
    checkpoint
        .results
        .insert("BYE".to_string(), StoredResult::Text("bye".into()));
    harness.store.save("openai", &checkpoint).unwrap();

    let provider = EchoProvider::new();
    let summary = harness
        .run(&provider, "openai", &input(&["BYE", "ant"]), &[], None)
        .unwrap();

    assert_eq!(provider.queried_codes(), vec!["ANT"]);
    assert_eq!(summary.queried, 1);
    let rows = harness.output_rows();
    assert_eq!(rows[0]["meanings_openai"], "bye");
    assert_eq!(rows[1]["meanings_openai"], "ant; ANT meaning");
    assert_eq!(rows[1]["code"], "ant");
}

#[test]
fn rerun_with_nothing_pending_is_byte_identical() {
    let harness = Harness::new();
    let table = input(&["BYE", "ANT", "BYE"]);
    harness
        .run(&EchoProvider::new(), "openai", &table, &[], None)
        .unwrap();
    let first = std::fs::read(&harness.output).unwrap();

    let provider = EchoProvider::new();
    let summary = harness.run(&provider, "openai", &table, &[], None).unwrap();
    assert!(provider.batches().is_empty());
    assert_eq!(summary.batches, 0);
    assert_eq!(std::fs::read(&harness.output).unwrap(), first);
}

#[test]
fn output_is_written_even_when_nothing_is_pending() {
    let harness = Harness::new();
    let mut checkpoint = Checkpoint::default();
    checkpoint
        .results
        .insert("BYE".to_string(), StoredResult::Text("bye".into()));
    harness.store.save("openai", &checkpoint).unwrap();

    harness
        .run(&EchoProvider::new(), "openai", &input(&["BYE"]), &[], None)
        .unwrap();
    assert_eq!(harness.output_rows()[0]["meanings_openai"], "bye");
}

#[test]
fn second_provider_keeps_first_provider_column() {
    let harness = Harness::new();
    let table = input(&["BYE"]);
    harness
        .run(&EchoProvider::new(), "openai", &table, &[], None)
        .unwrap();

    let gemini = ScriptedProvider::new().reply("m", r#"{"BYE": "gemini bye"}"#);
    harness.run(&gemini, "gemini", &table, &[], None).unwrap();

    let rows = harness.output_rows();
    assert_eq!(rows[0]["meanings_openai"], "bye; BYE meaning");
    assert_eq!(rows[0]["meanings_gemini"], "gemini bye");
    assert_eq!(harness.store.load("openai").unwrap().results.len(), 1);
    assert_eq!(harness.store.load("gemini").unwrap().results.len(), 1);
}

#[test]
fn fallback_model_is_sticky_and_checkpointed() {
    let mut harness = Harness::new();
    harness.config.batch_size = 1;
    let provider = ScriptedProvider::new()
        .reply("a", r#"{"BYE": "bye"}"#)
        .reply("a", r#"{"ANT": "ant"}"#);

    let summary = harness
        .run(
            &provider,
            "openai",
            &input(&["BYE", "ANT"]),
            &["a".to_string()],
            None,
        )
        .unwrap();

    assert_eq!(provider.calls(), vec!["m", "a", "a"]);
    assert_eq!(summary.model, "a");
    let checkpoint = harness.store.load("openai").unwrap();
    assert_eq!(checkpoint.model.as_deref(), Some("a"));
}

#[test]
fn codes_missing_from_reply_are_recorded_empty() {
    let harness = Harness::new();
    let table = input(&["BYE", "ANT"]);
    let provider = ScriptedProvider::new().reply("m", r#"{"bye": "bye"}"#);
    harness.run(&provider, "openai", &table, &[], None).unwrap();

    let checkpoint = harness.store.load("openai").unwrap();
    assert_eq!(checkpoint.results["BYE"], StoredResult::Text("bye".into()));
    assert_eq!(checkpoint.results["ANT"], StoredResult::empty());

    let rerun = ScriptedProvider::new();
    harness.run(&rerun, "openai", &table, &[], None).unwrap();
    assert!(rerun.calls().is_empty());
}

#[test]
fn failed_batch_keeps_earlier_progress() {
    let mut harness = Harness::new();
    harness.config.batch_size = 1;
    let log_path = harness.dir.path().join("calls.jsonl");
    let log = CallLog::new(log_path.clone());
    let provider = ScriptedProvider::new()
        .reply("m", r#"{"BYE": "bye"}"#)
        .fail("m", unauthorized());

    let err = harness
        .run(&provider, "openai", &input(&["BYE", "ANT"]), &[], Some(&log))
        .unwrap_err();
    assert!(format!("{err:#}").contains("batch 2/2 failed"), "{err:#}");

    let checkpoint = harness.store.load("openai").unwrap();
    assert_eq!(checkpoint.results.len(), 1);
    let rows = harness.output_rows();
    assert_eq!(rows[0]["meanings_openai"], "bye");
    assert_eq!(rows[1]["meanings_openai"], "");

    let entries: Vec<CallLogEntry> = std::fs::read_to_string(&log_path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].outcome, CallOutcome::Success);
    assert_eq!(entries[0].model_used.as_deref(), Some("m"));
    assert_eq!(entries[1].outcome, CallOutcome::Failed);
    assert!(entries[1]
        .error
        .as_deref()
        .is_some_and(|error| error.contains("Incorrect API key")));
}

#[test]
fn unwritable_call_log_does_not_lose_the_batch() {
    let harness = Harness::new();
    let log = CallLog::new(harness.dir.path().to_path_buf());
    let provider = ScriptedProvider::new().reply("m", r#"{"BYE": "bye"}"#);

    let summary = harness
        .run(&provider, "openai", &input(&["BYE"]), &[], Some(&log))
        .unwrap();

    assert_eq!(summary.queried, 1);
    assert_eq!(provider.calls(), vec!["m"]);
    let checkpoint = harness.store.load("openai").unwrap();
    assert_eq!(checkpoint.results.len(), 1);
    assert_eq!(harness.output_rows()[0]["meanings_openai"], "bye");
}
