use anyhow::Result;
use issuepipe::testing::{ScriptedFetcher, read_text_parquet};
use issuepipe::{
    ConvertOptions, MergeOptions, PullOptions, Settings, run_convert, run_merge, run_pull,
};
use serde_json::json;
use std::time::Duration;

#[test]
fn pull_merge_convert_end_to_end() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let settings = Settings {
        dev_mode: false,
        request_interval: Duration::ZERO,
        ..Settings::default()
    }
    .with_data_dir(tmp.path());

    let fetcher = ScriptedFetcher::new(3)
        .with_page(
            0,
            json!({
                "list": [
                    {"nid": "100", "title": "Crash on save", "field_issue_status": 1},
                    {"nid": "101", "title": "Typo", "field_issue_status": null}
                ],
                "last": "https://example.org/node.json?page=2"
            }),
        )
        .with_page(1, json!({"list": [{"nid": 102, "comment_count": 4}]}))
        .with_page(2, json!({"list": [{"nid": "103", "title": "Docs", "closed": true}]}))
        .failing(1);

    let pulled = run_pull(&fetcher, &settings, &PullOptions::default())?;
    assert_eq!(pulled.fetched, vec![0, 2]);
    assert_eq!(pulled.failures.len(), 1);

    // A second run only retries the page that failed.
    let retry = ScriptedFetcher::new(3).with_page(1, json!({"list": [{"nid": 102, "comment_count": 4}]}));
    let pulled = run_pull(&retry, &settings, &PullOptions::default())?;
    assert_eq!(pulled.fetched, vec![1]);
    assert_eq!(retry.requested_pages(), vec![1]);

    let merged = run_merge(&settings, &MergeOptions { chunk_size: 2 })?;
    assert_eq!(merged.files_merged, 3);
    assert_eq!(merged.rows_written, 4);
    assert_eq!(
        merged.columns,
        vec!["nid", "title", "field_issue_status", "comment_count", "closed"]
    );

    let converted = run_convert(&settings, &ConvertOptions::default())?;
    assert_eq!(converted.rows, 4);

    let out = read_text_parquet(settings.layout.columnar_output())?;
    assert_eq!(out.column("nid"), Some(vec!["100", "101", "102", "103"]));
    assert_eq!(
        out.column("title"),
        Some(vec!["Crash on save", "Typo", "", "Docs"])
    );
    assert_eq!(out.column("field_issue_status"), Some(vec!["1", "", "", ""]));
    assert_eq!(out.column("comment_count"), Some(vec!["", "", "4", ""]));
    assert_eq!(out.column("closed"), Some(vec!["", "", "", "true"]));
    Ok(())
}
