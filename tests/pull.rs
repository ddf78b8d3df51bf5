use anyhow::Result;
use issuepipe::testing::{ScriptedFetcher, issue_page};
use issuepipe::{PageStore, PullOptions, Settings, StageError, run_pull};
use serde_json::json;
use std::fs;
use std::time::Duration;

fn settings(root: &std::path::Path) -> Settings {
    Settings {
        request_interval: Duration::ZERO,
        ..Settings::default()
    }
    .with_data_dir(root)
}

fn range(start: u32, end: u32) -> PullOptions {
    PullOptions {
        start_page: start,
        end_page: Some(end),
        force: false,
    }
}

#[test]
fn first_run_writes_one_file_per_page() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let settings = settings(tmp.path());
    let fetcher = ScriptedFetcher::new(10);

    let report = run_pull(&fetcher, &settings, &range(2, 6))?;
    assert_eq!(report.fetched, vec![2, 3, 4, 5]);
    assert!(report.skipped.is_empty());
    assert!(report.is_complete());

    let store = PageStore::new(&settings.layout.raw_dir);
    let indices: Vec<u32> = store.list()?.iter().map(|p| p.index).collect();
    assert_eq!(indices, vec![2, 3, 4, 5]);
    Ok(())
}

#[test]
fn second_run_without_force_fetches_nothing() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let settings = settings(tmp.path());

    run_pull(&ScriptedFetcher::new(10), &settings, &range(0, 3))?;
    let before = fs::read(settings.layout.raw_dir.join("page_1.json"))?;

    let again = ScriptedFetcher::new(10).with_page(1, issue_page(&["changed"]));
    let report = run_pull(&again, &settings, &range(0, 3))?;
    assert!(report.fetched.is_empty());
    assert_eq!(report.skipped, vec![0, 1, 2]);
    assert!(again.requested_pages().is_empty());
    assert_eq!(fs::read(settings.layout.raw_dir.join("page_1.json"))?, before);
    Ok(())
}

#[test]
fn force_refetches_and_overwrites_every_page() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let settings = settings(tmp.path());
    run_pull(&ScriptedFetcher::new(10), &settings, &range(0, 2))?;

    let fetcher = ScriptedFetcher::new(10)
        .with_page(0, issue_page(&["a"]))
        .with_page(1, issue_page(&["b"]));
    let opts = PullOptions {
        force: true,
        ..range(0, 2)
    };
    let report = run_pull(&fetcher, &settings, &opts)?;
    assert_eq!(report.fetched, vec![0, 1]);
    assert_eq!(fetcher.requested_pages(), vec![0, 1]);

    let stored: serde_json::Value =
        serde_json::from_slice(&fs::read(settings.layout.raw_dir.join("page_1.json"))?)?;
    assert_eq!(stored, issue_page(&["b"]));
    Ok(())
}

#[test]
fn inverted_range_is_a_config_error_and_does_nothing() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let settings = settings(tmp.path());
    let fetcher = ScriptedFetcher::new(10);

    for (start, end) in [(3, 3), (5, 2)] {
        let err = run_pull(&fetcher, &settings, &range(start, end)).unwrap_err();
        assert!(matches!(err, StageError::Config(_)), "{err}");
    }
    assert!(fetcher.requested_pages().is_empty());
    assert_eq!(fetcher.total_pages_calls(), 0);
    assert!(!settings.layout.raw_dir.exists());
    Ok(())
}

#[test]
fn dev_mode_without_end_page_pulls_a_single_page() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let settings = settings(tmp.path());
    assert!(settings.dev_mode);
    let fetcher = ScriptedFetcher::new(10);

    let opts = PullOptions {
        start_page: 4,
        ..PullOptions::default()
    };
    let report = run_pull(&fetcher, &settings, &opts)?;
    assert_eq!(report.range, 4..5);
    assert_eq!(fetcher.requested_pages(), vec![4]);
    assert_eq!(fetcher.total_pages_calls(), 0);
    Ok(())
}

#[test]
fn full_run_without_end_page_uses_reported_total() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let settings = Settings {
        dev_mode: false,
        ..settings(tmp.path())
    };
    let fetcher = ScriptedFetcher::new(3);

    let report = run_pull(&fetcher, &settings, &PullOptions::default())?;
    assert_eq!(report.range, 0..3);
    assert_eq!(fetcher.total_pages_calls(), 1);
    assert_eq!(fetcher.requested_pages(), vec![0, 1, 2]);

    // Past the end of the source there is nothing to pull.
    let past = PullOptions {
        start_page: 3,
        ..PullOptions::default()
    };
    let err = run_pull(&fetcher, &settings, &past).unwrap_err();
    assert!(err.is_config());
    Ok(())
}

#[test]
fn failed_page_is_logged_skipped_and_retried_next_run() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let settings = settings(tmp.path());

    let flaky = ScriptedFetcher::new(10).failing(1);
    let report = run_pull(&flaky, &settings, &range(0, 3))?;
    assert_eq!(report.fetched, vec![0, 2]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].item, "page 1");
    assert_eq!(flaky.requested_pages(), vec![0, 1, 2]);

    let healthy = ScriptedFetcher::new(10);
    let report = run_pull(&healthy, &settings, &range(0, 3))?;
    assert_eq!(report.fetched, vec![1]);
    assert_eq!(report.skipped, vec![0, 2]);
    Ok(())
}

#[test]
fn payload_is_stored_verbatim() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let settings = settings(tmp.path());
    let payload = json!({
        "self": "https://example.org/node.json?page=0",
        "list": [{"nid": "1", "field_issue_status": 8, "body": {"value": "x"}}]
    });
    let fetcher = ScriptedFetcher::new(1).with_page(0, payload.clone());

    run_pull(&fetcher, &settings, &range(0, 1))?;
    let stored = fs::read(settings.layout.raw_dir.join("page_0.json"))?;
    assert_eq!(stored, serde_json::to_vec(&payload)?);
    Ok(())
}

#[test]
fn each_request_carries_base_parameters_and_its_own_page() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let settings = settings(tmp.path());
    let fetcher = ScriptedFetcher::new(5);

    run_pull(&fetcher, &settings, &range(1, 3))?;
    let requests = fetcher.requests();
    assert_eq!(requests.len(), 2);
    for (query, page) in requests.iter().zip([1u32, 2]) {
        assert_eq!(query.resource(), "node.json");
        let pairs = query.pairs();
        assert!(pairs.contains(&("type", "project_issue".to_string())));
        assert!(pairs.contains(&("sort", "created".to_string())));
        assert!(pairs.contains(&("direction", "ASC".to_string())));
        assert_eq!(pairs.iter().filter(|(k, _)| *k == "page").count(), 1);
        assert!(pairs.contains(&("page", page.to_string())));
    }
    assert_eq!(settings.base_query.page(), None);
    Ok(())
}
