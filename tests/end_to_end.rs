use std::fs;
use std::path::Path;

use newsdedup::aggregate::{GlobalAggregator, MetaRow};
use newsdedup::config::{DedupConfig, KeywordSpec};
use newsdedup::pipeline::KeywordPipeline;
use newsdedup::source::{JsonFileProvider, StoredContent};
use newsdedup::store::{read_rows, write_rows_atomic, GlobalStore, KeywordStore};
use newsdedup::validate::runner::{EXIT_FAIL, EXIT_OK};
use newsdedup::validate::{default_checks, Validator};

fn body(words: &str) -> String {
    format!("{} ", words).repeat(40)
}

fn item(id: u32, title: &str, press: &str, hour: u32, text: &str) -> serde_json::Value {
    serde_json::json!({
        "title": title,
        "description": "본회의와 상임위원회 일정에 관한 소식을 전한다",
        "link": format!("https://n.news.naver.com/mnews/article/{:03}/{}", id, id),
        "originallink": format!("https://{}/view/{}", press, id),
        "pubDate": format!("Wed, 28 Jan 2026 {:02}:00:00 +0900", hour),
        "content": body(text),
    })
}

fn write_capture(dir: &Path, keyword: &str, items: Vec<serde_json::Value>) {
    let capture = serde_json::json!({ "items": items });
    fs::write(dir.join(format!("{}.json", keyword)), capture.to_string()).unwrap();
}

/// Two keywords whose captures share one story and syndicate another.
fn captures(dir: &Path) {
    write_capture(
        dir,
        "국회",
        vec![
            item(1, "국회 예산안 본회의 통과", "www.hani.co.kr", 9, "lawmakers approved spending plan"),
            item(2, "<b>국회</b> 태풍 피해 대책 논의", "www.khan.co.kr", 10, "heavy rain forced evacuations"),
        ],
    );
    write_capture(
        dir,
        "예산",
        vec![
            item(1, "국회 예산안 본회의 통과", "www.hani.co.kr", 9, "lawmakers approved spending plan"),
            item(3, "[속보] 국회 예산안 본회의 통과", "www.yna.co.kr", 11, "assembly session ended late tonight"),
            item(4, "정부 내년 경제 전망 발표", "www.mk.co.kr", 8, "ministry forecasts modest growth"),
        ],
    );
}

fn config(root: &Path) -> DedupConfig {
    DedupConfig {
        output_root: root.to_path_buf(),
        request_delay_ms: 0,
        ..DedupConfig::default()
    }
}

fn ingest_and_aggregate(config: &DedupConfig, input: &Path) -> GlobalStore {
    let provider = JsonFileProvider::directory(input);
    let pipeline = KeywordPipeline::new(config, &provider, &StoredContent);
    let stats = pipeline.run_keywords(&[KeywordSpec::parse("국회"), KeywordSpec::parse("예산")]);
    assert!(stats.iter().all(|s| s.is_success()), "{:?}", stats);

    let store = GlobalStore::for_config(config);
    let keywords = store.discover_keywords().unwrap();
    let archives = store.load_keyword_archives(&keywords).unwrap();
    let aggregation = GlobalAggregator::from_config(config)
        .aggregate(archives, "2026-01-28 13:00:00")
        .unwrap();
    store.commit(&aggregation).unwrap();
    store
}

#[test]
fn test_full_cycle_validates() {
    let input = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    captures(input.path());
    let config = config(root.path());

    let store = ingest_and_aggregate(&config, input.path());

    let canonical = store.load_canonical().unwrap();
    let mut ids: Vec<String> = canonical.iter().map(|a| a.news_id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), canonical.len());
    assert_eq!(canonical.len(), 3);
    // The wire copy replaces the paper's earlier report of the same vote
    let wire = KeywordStore::for_config(&config, "예산")
        .load_selected()
        .unwrap()
        .into_iter()
        .find(|a| a.originallink.contains("yna.co.kr"))
        .unwrap();
    assert!(canonical.iter().any(|a| a.news_id == wire.news_id));

    let report = Validator::new(default_checks(&config)).run_on_store(&store);
    assert_eq!(report.exit_code(), EXIT_OK, "{:?}", report.results);
}

#[test]
fn test_rerun_adds_nothing_and_still_validates() {
    let input = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    captures(input.path());
    let config = config(root.path());

    ingest_and_aggregate(&config, input.path());
    let before = fs::read(root.path().join("국회").join("selected_archive.csv")).unwrap();
    let store = ingest_and_aggregate(&config, input.path());

    assert_eq!(
        fs::read(root.path().join("국회").join("selected_archive.csv")).unwrap(),
        before
    );
    let report = Validator::new(default_checks(&config)).run_on_store(&store);
    assert_eq!(report.exit_code(), EXIT_OK);
}

#[test]
fn test_dangling_replacement_is_a_hard_failure() {
    let input = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    captures(input.path());
    let config = config(root.path());
    let store = ingest_and_aggregate(&config, input.path());

    let mut meta: Vec<MetaRow> = read_rows(&store.meta_path()).unwrap();
    let victim = meta.iter_mut().find(|r| !r.is_global_canonical).unwrap();
    victim.global_replaced_by = Some("0000000000000000".to_string());
    write_rows_atomic(&store.meta_path(), &meta).unwrap();

    let report = Validator::new(default_checks(&config)).run_on_store(&store);
    assert_eq!(report.exit_code(), EXIT_FAIL);
    assert_eq!(report.results.last().unwrap().0, "replaced_by integrity");
}

#[test]
fn test_missing_outputs_fail_validation() {
    let root = tempfile::tempdir().unwrap();
    let config = config(root.path());
    let report = Validator::new(default_checks(&config)).run_on_store(&GlobalStore::for_config(&config));
    assert_eq!(report.exit_code(), EXIT_FAIL);
}
