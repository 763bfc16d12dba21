//! Integration tests for the harvester
//!
//! These tests run whole jobs against wiremock servers and check what ends up
//! in the repository.

use harvester::config::{parse_config, Config, PolitenessConfig, RobotsFailurePolicy};
use harvester::crawler::{
    run_job, targets_from_config, FetchOutcome, Fetcher, JobDriver, Pipeline, Target,
    TargetState, TransportError,
};
use harvester::storage::{JobStatus, Repository, SqliteRepository};
use harvester::url::host_key_lossy;
use harvester::{ExtractorKind, PolitenessGuard};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const NEWS_HTML: &str = r#"<html><head><title>News</title></head><body><table>
  <tr class="athing"><td><span class="titleline"><a href="https://example.org/rust">Rust 2.0</a></span></td></tr>
  <tr class="athing"><td><span class="titleline"><a href="item?id=7">Ask: anything</a></span></td></tr>
</table></body></html>"#;

const LISTING_HTML: &str = r#"<html><head><title>Listing</title></head><body><dl>
  <dt><a href="/abs/2401.00001">arXiv:2401.00001</a></dt>
  <dd><div class="list-title">Polite Crawling at Scale</div></dd>
</dl></body></html>"#;

const ARTICLE_HTML: &str = r#"<html><head><title>Web crawler - Encyclopedia</title></head>
<body><p>A web crawler is a bot.</p></body></html>"#;

fn config_toml(server: &MockServer, extra: &str, targets: &[(&str, &str, &str)]) -> String {
    let mut toml = format!(
        r#"
[harvester]
job-name = "sampler"
{extra}

[user-agent]
crawler-name = "harvester"
crawler-version = "0.1"
contact-url = "https://example.com/bot"

[politeness]
min-delay-ms = 0

[output]
database-path = "unused.db"
"#
    );
    for (source, route, extractor) in targets {
        toml.push_str(&format!(
            "\n[[target]]\nsource = \"{}\"\nurl = \"{}{}\"\nextractor = \"{}\"\n",
            source,
            server.uri(),
            route,
            extractor
        ));
    }
    toml
}

async fn mount_page(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn mount_robots(server: &MockServer, body: &str) {
    mount_page(server, "/robots.txt", body).await;
}

fn memory_repo() -> Arc<Mutex<SqliteRepository>> {
    Arc::new(Mutex::new(SqliteRepository::new_in_memory().unwrap()))
}

/// Serves fixed HTML; `/fail` gets a transport error and `/panic` panics
struct ScriptedFetcher {
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchOutcome, TransportError> {
        self.calls.lock().unwrap().push(url.path().to_string());
        if url.path() == "/panic" {
            panic!("fetcher blew up on {}", url);
        }
        if url.path() == "/fail" {
            return Err(TransportError::Connect {
                url: url.to_string(),
                message: "connection refused".to_string(),
            });
        }
        Ok(FetchOutcome {
            url: url.to_string(),
            final_url: url.to_string(),
            host: host_key_lossy(url.as_str()),
            status_code: 200,
            duration: Duration::from_millis(5),
            robots_allowed: true,
            body: Some(NEWS_HTML.to_string()),
        })
    }
}

fn scripted_driver(
    repo: Arc<Mutex<SqliteRepository>>,
    min_delay_ms: u64,
) -> JobDriver<ScriptedFetcher, SqliteRepository> {
    let politeness = PolitenessConfig {
        min_delay_ms,
        robots_ttl_secs: 3600,
        robots_failure: RobotsFailurePolicy::Allow,
        request_timeout_secs: 5,
    };
    let guard = Arc::new(PolitenessGuard::new(reqwest::Client::new(), "harvester", &politeness));
    JobDriver::new(Pipeline::new(guard, ScriptedFetcher::new(), repo), "sampler")
}

fn target(server: &MockServer, source: &str, route: &str) -> Target {
    let url = Url::parse(&format!("{}{}", server.uri(), route)).unwrap();
    Target::new(source, url, ExtractorKind::Aggregator, None)
}

#[tokio::test]
async fn test_full_run_over_http() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_page(&server, "/news", NEWS_HTML).await;
    mount_page(&server, "/list", LISTING_HTML).await;
    mount_page(&server, "/wiki", ARTICLE_HTML).await;

    let config = parse_config(&config_toml(
        &server,
        "",
        &[
            ("hn", "/news", "aggregator"),
            ("arxiv", "/list", "listing"),
            ("wiki", "/wiki", "document"),
        ],
    ))
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let repo = Arc::new(Mutex::new(
        SqliteRepository::new(&dir.path().join("harvest.db")).unwrap(),
    ));

    let summary = run_job(&config, repo.clone()).await.unwrap();

    assert_eq!(summary.results.len(), 3);
    assert!(summary.results.iter().all(|r| r.ok), "{:?}", summary.results);
    assert_eq!(summary.results[0].saved, 2);
    assert_eq!(summary.results[1].saved, 1);
    assert_eq!(summary.results[2].saved, 1);

    let repo = repo.lock().unwrap();
    assert_eq!(repo.count_records().unwrap(), 4);

    let titles: Vec<String> = repo
        .list_records(10)
        .unwrap()
        .into_iter()
        .map(|r| r.title)
        .collect();
    assert!(titles.contains(&"Polite Crawling at Scale".to_string()));
    assert!(titles.contains(&"Web crawler - Encyclopedia".to_string()));

    let audit = repo.list_audit_entries(&summary.run_id).unwrap();
    assert_eq!(audit.len(), 3);
    assert!(audit.iter().all(|a| a.entry.status_code == 200));
}

#[tokio::test]
async fn test_failure_isolation_across_targets() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;

    let repo = memory_repo();
    let driver = scripted_driver(repo.clone(), 0);
    let targets = vec![
        target(&server, "first", "/one"),
        target(&server, "second", "/fail"),
        target(&server, "third", "/three"),
    ];

    let summary = driver.run_job(&targets).await;

    let outcomes: Vec<(bool, Option<&str>)> =
        summary.results.iter().map(|r| (r.ok, r.error)).collect();
    assert_eq!(
        outcomes,
        vec![(true, None), (false, Some("exception")), (true, None)]
    );

    let repo = repo.lock().unwrap();
    let runs = repo.list_job_runs(100).unwrap();
    assert_eq!(runs.len(), 3);
    assert!(runs.iter().all(|r| r.status.is_terminal()));
    assert!(runs.iter().all(|r| r.run_id == summary.run_id));

    let failed = repo
        .get_job_run("sampler:second", &summary.run_id)
        .unwrap()
        .unwrap();
    assert_eq!(failed.status, JobStatus::Failed);

    let audit = repo.list_audit_entries(&summary.run_id).unwrap();
    assert_eq!(audit.len(), 3);
    assert_eq!(
        audit[1].entry.error_kind.as_deref(),
        Some("transport_connect")
    );
}

#[tokio::test]
async fn test_failure_isolation_with_worker_pool() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;

    let repo = memory_repo();
    let driver = scripted_driver(repo.clone(), 0).with_concurrency(3);
    let targets = vec![
        target(&server, "first", "/one"),
        target(&server, "second", "/fail"),
        target(&server, "third", "/three"),
    ];

    let summary = driver.run_job(&targets).await;

    let sources: Vec<&str> = summary.results.iter().map(|r| r.source.as_str()).collect();
    assert_eq!(sources, vec!["first", "second", "third"]);
    assert!(summary.results[0].ok);
    assert_eq!(summary.results[1].error, Some("exception"));
    assert!(summary.results[2].ok);

    let runs = repo.lock().unwrap().list_job_runs(100).unwrap();
    assert_eq!(runs.len(), 3);
    assert!(runs.iter().all(|r| r.status.is_terminal()));
}

#[tokio::test]
async fn test_targets_sharing_a_source_each_get_a_job_run() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_page(&server, "/a", NEWS_HTML).await;
    mount_page(&server, "/b", ARTICLE_HTML).await;

    let config = parse_config(&config_toml(
        &server,
        "",
        &[("docs", "/a", "aggregator"), ("docs", "/b", "document")],
    ))
    .unwrap();
    let repo = memory_repo();

    let summary = run_job(&config, repo.clone()).await.unwrap();

    let outcomes: Vec<(bool, Option<&str>)> =
        summary.results.iter().map(|r| (r.ok, r.error)).collect();
    assert_eq!(outcomes, vec![(true, None), (true, None)]);

    let repo = repo.lock().unwrap();
    assert_eq!(repo.list_job_runs(100).unwrap().len(), 2);
    assert_eq!(repo.list_audit_entries(&summary.run_id).unwrap().len(), 2);
    for job_id in ["sampler:docs", "sampler:docs#2"] {
        let job = repo.get_job_run(job_id, &summary.run_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Success);
    }
}

#[tokio::test]
async fn test_panicking_target_is_closed_and_isolated() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;

    for concurrency in [1, 3] {
        let repo = memory_repo();
        let driver = scripted_driver(repo.clone(), 0).with_concurrency(concurrency);
        let targets = vec![
            target(&server, "first", "/one"),
            target(&server, "boom", "/panic"),
            target(&server, "third", "/three"),
        ];

        let summary = driver.run_job(&targets).await;

        let outcomes: Vec<(bool, Option<&str>)> =
            summary.results.iter().map(|r| (r.ok, r.error)).collect();
        assert_eq!(
            outcomes,
            vec![(true, None), (false, Some("exception")), (true, None)]
        );

        let repo = repo.lock().unwrap();
        let runs = repo.list_job_runs(100).unwrap();
        assert_eq!(runs.len(), 3);
        assert!(runs.iter().all(|r| r.status.is_terminal()));

        let boom = repo
            .get_job_run("sampler:boom", &summary.run_id)
            .unwrap()
            .unwrap();
        assert_eq!(boom.status, JobStatus::Failed);
        assert_eq!(boom.message, "target task panicked");
    }
}

#[tokio::test]
async fn test_robots_denial_never_reaches_fetcher() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nDisallow: /private").await;

    let repo = memory_repo();
    let driver = scripted_driver(repo.clone(), 0);
    let targets = vec![
        target(&server, "open", "/public"),
        target(&server, "closed", "/private/feed"),
    ];

    let summary = driver.run_job(&targets).await;

    assert!(summary.results[0].ok);
    assert_eq!(summary.results[1].error, Some("robots_blocked"));
    assert_eq!(summary.results[1].state, TargetState::Blocked);

    let calls = driver.pipeline().fetcher().calls.lock().unwrap().clone();
    assert_eq!(calls, vec!["/public".to_string()]);

    let repo = repo.lock().unwrap();
    let audit = repo.list_audit_entries(&summary.run_id).unwrap();
    let blocked = &audit[1].entry;
    assert!(!blocked.robots_allowed);
    assert_eq!(blocked.status_code, 0);
    assert_eq!(blocked.error_kind.as_deref(), Some("robots_blocked"));
}

#[tokio::test]
async fn test_robots_failure_policy_deny() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_page(&server, "/news", NEWS_HTML).await;

    let mut toml = config_toml(&server, "", &[("hn", "/news", "aggregator")]);
    toml = toml.replace("min-delay-ms = 0", "min-delay-ms = 0\nrobots-failure = \"deny\"");
    let config = parse_config(&toml).unwrap();

    let summary = run_job(&config, memory_repo()).await.unwrap();
    assert_eq!(summary.results[0].error, Some("robots_blocked"));

    // Default policy lets the same server through
    let lenient = parse_config(&config_toml(&server, "", &[("hn", "/news", "aggregator")])).unwrap();
    let summary = run_job(&lenient, memory_repo()).await.unwrap();
    assert!(summary.results[0].ok);
}

#[tokio::test]
async fn test_repeated_runs_do_not_duplicate_records() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_page(&server, "/news", NEWS_HTML).await;

    let config = parse_config(&config_toml(&server, "", &[("hn", "/news", "aggregator")])).unwrap();
    let repo = memory_repo();

    let first = run_job(&config, repo.clone()).await.unwrap();
    let ids_before: Vec<i64> = repo
        .lock()
        .unwrap()
        .list_records(10)
        .unwrap()
        .iter()
        .map(|r| r.id)
        .collect();

    let second = run_job(&config, repo.clone()).await.unwrap();
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(second.results[0].saved, 2);

    let repo = repo.lock().unwrap();
    assert_eq!(repo.count_records().unwrap(), 2);
    let mut ids_after: Vec<i64> = repo.list_records(10).unwrap().iter().map(|r| r.id).collect();
    let mut ids_before = ids_before;
    ids_before.sort();
    ids_after.sort();
    assert_eq!(ids_before, ids_after);

    assert_eq!(repo.list_job_runs(100).unwrap().len(), 2);
}

#[tokio::test]
async fn test_unmatched_markup_falls_back_to_page_title() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_page(
        &server,
        "/odd",
        "<html><head><title>  Plain   Page </title></head><body><div><p>unclosed",
    )
    .await;

    let config = parse_config(&config_toml(&server, "", &[("odd", "/odd", "listing")])).unwrap();
    let repo = memory_repo();

    let summary = run_job(&config, repo.clone()).await.unwrap();
    assert_eq!((summary.results[0].saved, summary.results[0].seen), (1, 1));

    let records = repo.lock().unwrap().list_records(10).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].title, "Plain Page");
    assert_eq!(records[0].url, format!("{}/odd", server.uri()));
    assert_eq!(records[0].tags, "listing");
}

#[tokio::test]
async fn test_run_timeout_cancels_only_slow_target() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_page(&server, "/fast", NEWS_HTML).await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(NEWS_HTML)
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let config = parse_config(&config_toml(
        &server,
        "concurrency = 2\nrun-timeout-secs = 1",
        &[("slow", "/slow", "aggregator"), ("fast", "/fast", "aggregator")],
    ))
    .unwrap();
    let repo = memory_repo();

    let started = Instant::now();
    let summary = run_job(&config, repo.clone()).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(4));

    assert_eq!(summary.results[0].error, Some("cancelled"));
    assert!(summary.results[1].ok);

    let repo = repo.lock().unwrap();
    let slow = repo
        .get_job_run("sampler:slow", &summary.run_id)
        .unwrap()
        .unwrap();
    assert_eq!(slow.status, JobStatus::Failed);
    assert!(slow.message.contains("Cancelled"));
}

#[tokio::test]
async fn test_same_host_fetches_are_spaced() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;

    let driver = scripted_driver(memory_repo(), 400).with_concurrency(2);
    let targets = vec![target(&server, "a", "/a"), target(&server, "b", "/b")];

    let started = Instant::now();
    let summary = driver.run_job(&targets).await;

    assert!(summary.results.iter().all(|r| r.ok));
    assert!(started.elapsed() >= Duration::from_millis(400));
}

#[test]
fn test_invalid_configured_tag_is_rejected() {
    let toml = r#"
[harvester]

[user-agent]
crawler-name = "harvester"
crawler-version = "0.1"
contact-url = "https://example.com/bot"

[output]
database-path = "h.db"

[[target]]
source = "hn"
url = "https://news.example/"
extractor = "aggregator"
tags = ["Bad_Tag"]
"#;
    assert!(parse_config(toml).is_err());
}

#[test]
fn test_non_http_target_is_rejected() {
    let toml = r#"
[harvester]

[user-agent]
crawler-name = "harvester"
crawler-version = "0.1"
contact-url = "https://example.com/bot"

[output]
database-path = "h.db"

[[target]]
source = "ftp"
url = "ftp://example.com/"
extractor = "document"
"#;
    assert!(parse_config(toml).is_err());
}

#[test]
fn test_targets_follow_config_order() {
    let toml = r#"
[harvester]

[user-agent]
crawler-name = "harvester"
crawler-version = "0.1"
contact-url = "https://example.com/bot"

[output]
database-path = "h.db"

[[target]]
source = "b"
url = "https://b.example/"
extractor = "document"

[[target]]
source = "a"
url = "https://a.example/"
extractor = "listing"
"#;
    let config: Config = parse_config(toml).unwrap();
    let targets = targets_from_config(&config).unwrap();
    let sources: Vec<&str> = targets.iter().map(|t| t.source.as_str()).collect();
    assert_eq!(sources, vec!["b", "a"]);
}
