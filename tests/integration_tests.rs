use async_trait::async_trait;
use parking_lot::Mutex;
use rust_crawler::config::Config;
use rust_crawler::metrics::MetricsSnapshot;
use rust_crawler::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

const HOME: &str = "https://www.ics.uci.edu/";

enum Resource {
    Page {
        final_url: String,
        content_type: String,
        body: Vec<u8>,
    },
    Unreachable,
}

/// In-process site. Unknown URLs are 404s.
struct MockSite {
    resources: HashMap<String, Resource>,
    fetches: Mutex<HashMap<String, usize>>,
}

impl MockSite {
    fn new() -> Self {
        Self {
            resources: HashMap::new(),
            fetches: Mutex::new(HashMap::new()),
        }
    }

    fn page(self, url: &str, body: String) -> Self {
        self.raw(url, "text/html; charset=utf-8", body.into_bytes())
    }

    fn raw(mut self, url: &str, content_type: &str, body: Vec<u8>) -> Self {
        self.resources.insert(
            url.to_string(),
            Resource::Page {
                final_url: url.to_string(),
                content_type: content_type.to_string(),
                body,
            },
        );
        self
    }

    fn redirect(mut self, url: &str, target: &str, body: String) -> Self {
        self.resources.insert(
            url.to_string(),
            Resource::Page {
                final_url: target.to_string(),
                content_type: "text/html".to_string(),
                body: body.into_bytes(),
            },
        );
        self
    }

    fn unreachable(mut self, url: &str) -> Self {
        self.resources.insert(url.to_string(), Resource::Unreachable);
        self
    }

    fn fetch_count(&self, url: &str) -> usize {
        self.fetches.lock().get(url).copied().unwrap_or(0)
    }

    fn total_fetches(&self) -> usize {
        self.fetches.lock().values().sum()
    }
}

#[async_trait]
impl Fetcher for MockSite {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError> {
        *self.fetches.lock().entry(url.to_string()).or_insert(0) += 1;
        match self.resources.get(url) {
            Some(Resource::Page {
                final_url,
                content_type,
                body,
            }) => Ok(FetchResponse {
                status: 200,
                final_url: final_url.clone(),
                headers: HashMap::from([("content-type".to_string(), content_type.clone())]),
                body: body.clone(),
            }),
            Some(Resource::Unreachable) => Err(FetchError::ConnectionRefused),
            None => Ok(FetchResponse {
                status: 404,
                final_url: url.to_string(),
                ..FetchResponse::default()
            }),
        }
    }
}

/// A page with enough distinct words to pass the content floor.
fn html(topic: &str, links: &[&str]) -> String {
    let words: Vec<String> = (0..80)
        .map(|i| format!("{}term{}", topic, i % 40 + 10))
        .collect();
    let anchors: String = links
        .iter()
        .map(|href| format!("<li><a href=\"{}\">more</a></li>", href))
        .collect();
    format!(
        "<html><head><title>{}</title><script>var ignored = 1;</script></head>\
         <body><p>{}</p><ul>{}</ul></body></html>",
        topic,
        words.join(" "),
        anchors
    )
}

fn config(dir: &TempDir) -> CrawlerConfig {
    CrawlerConfig {
        seed_urls: vec![HOME.to_string()],
        allowed_domains: vec!["ics.uci.edu".to_string()],
        data_dir: dir.path().to_path_buf(),
        workers: 2,
        politeness_delay_ms: 0,
        idle_timeout_secs: 0,
        restart: true,
        report_interval_secs: 0,
        ..CrawlerConfig::default()
    }
}

async fn crawl(config: CrawlerConfig, site: Arc<MockSite>) -> CrawlSummary {
    let crawler = Crawler::new(config, site).unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(30), crawler.run())
        .await
        .expect("crawl did not finish")
        .unwrap()
}

#[tokio::test]
async fn test_full_crawl_stays_in_scope() {
    let dir = TempDir::new().unwrap();
    let site = Arc::new(
        MockSite::new()
            .page(
                HOME,
                html(
                    "home",
                    &[
                        "/research",
                        "https://vision.ics.uci.edu/",
                        "https://www.google.com/",
                        "https://evilics.uci.edu/",
                        "/slides.pdf",
                        "/wiki/page?do=edit",
                        "mailto:someone@ics.uci.edu",
                    ],
                ),
            )
            .page(
                "https://www.ics.uci.edu/research",
                html("research", &["/", "/research#labs", "/people?b=2&a=1"]),
            )
            .page("https://vision.ics.uci.edu/", html("vision", &["/people"]))
            .page(
                "https://www.ics.uci.edu/people?a=1&b=2",
                html("people", &["/research"]),
            ),
    );

    let summary = crawl(config(&dir), site.clone()).await;

    // Home, research, vision, people, and the 404 vision.ics.uci.edu/people.
    assert_eq!(summary.frontier.total_records, 5);
    assert_eq!(summary.frontier.completed, 5);
    assert_eq!(summary.frontier.queued, 0);
    assert_eq!(summary.unique_pages, 4);
    assert_eq!(summary.metrics.bad_status, 1);
    assert_eq!(summary.start_mode, StartMode::Fresh);

    assert_eq!(site.total_fetches(), 5);
    assert_eq!(site.fetch_count("https://www.ics.uci.edu/people?a=1&b=2"), 1);
    assert_eq!(site.fetch_count("https://www.google.com/"), 0);
    assert_eq!(site.fetch_count("https://evilics.uci.edu/"), 0);
    assert_eq!(site.fetch_count("https://www.ics.uci.edu/slides.pdf"), 0);

    let report = std::fs::read_to_string(dir.path().join(Config::REPORT_FILE)).unwrap();
    assert!(report.contains("Unique pages: 4"));
    assert!(report.contains("vision.ics.uci.edu, 1"));
    assert!(report.contains("www.ics.uci.edu, 3"));
    assert!(!report.contains("ignored"));
}

#[tokio::test]
async fn test_resume_fetches_only_pending_urls() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);

    // A previous run that discovered four URLs and finished two of them.
    {
        let store: Arc<dyn KvStore> = Arc::new(RedbStore::open(cfg.frontier_path()).unwrap());
        let filter = UrlFilter::new(&cfg.allowed_domains, &cfg.filter);
        let (frontier, mode) =
            Frontier::open(store, &filter, &cfg.seed_urls, true, QueueOrder::Lifo).unwrap();
        assert_eq!(mode, StartMode::Fresh);
        for path in ["/a", "/b", "/c"] {
            assert!(frontier
                .add_url(&format!("https://www.ics.uci.edu{}", path))
                .unwrap());
        }
        frontier.mark_complete(HOME).unwrap();
        frontier.mark_complete("https://www.ics.uci.edu/a").unwrap();
    }

    let site = Arc::new(
        MockSite::new()
            .page(HOME, html("home", &["/a", "/b"]))
            .page("https://www.ics.uci.edu/a", html("alpha", &["/b"]))
            .page("https://www.ics.uci.edu/b", html("beta", &["/", "/a", "/c"]))
            .page("https://www.ics.uci.edu/c", html("gamma", &["/a"])),
    );

    let resumed = CrawlerConfig {
        restart: false,
        ..cfg
    };
    let summary = crawl(resumed, site.clone()).await;

    assert_eq!(summary.start_mode, StartMode::Resumed { pending: 2, total: 4 });
    assert_eq!(site.fetch_count(HOME), 0);
    assert_eq!(site.fetch_count("https://www.ics.uci.edu/a"), 0);
    assert_eq!(site.fetch_count("https://www.ics.uci.edu/b"), 1);
    assert_eq!(site.fetch_count("https://www.ics.uci.edu/c"), 1);
    assert_eq!(summary.frontier.total_records, 4);
    assert_eq!(summary.frontier.completed, 4);
}

#[tokio::test]
async fn test_statistics_carry_over_between_runs() {
    let dir = TempDir::new().unwrap();
    let site = Arc::new(
        MockSite::new()
            .page(HOME, html("home", &["/a"]))
            .page("https://www.ics.uci.edu/a", html("alpha", &[])),
    );

    let first = crawl(config(&dir), site.clone()).await;
    assert_eq!(first.unique_pages, 2);

    let second = crawl(
        CrawlerConfig {
            restart: false,
            ..config(&dir)
        },
        site.clone(),
    )
    .await;

    assert_eq!(second.start_mode, StartMode::Resumed { pending: 0, total: 2 });
    assert_eq!(second.unique_pages, 2);
    assert_eq!(second.metrics, MetricsSnapshot::default());
    assert_eq!(site.total_fetches(), 2);
}

#[tokio::test]
async fn test_restart_discards_previous_state() {
    let dir = TempDir::new().unwrap();
    let site = Arc::new(MockSite::new().page(HOME, html("home", &[])));

    crawl(config(&dir), site.clone()).await;
    let summary = crawl(config(&dir), site.clone()).await;

    assert_eq!(summary.start_mode, StartMode::Fresh);
    assert_eq!(summary.unique_pages, 1);
    assert_eq!(site.fetch_count(HOME), 2);
}

#[tokio::test]
async fn test_repeated_url_pattern_stops_expansion() {
    let dir = TempDir::new().unwrap();
    let mut site = MockSite::new().page(HOME, html("home", &["/archive/1"]));
    for n in 1..=10 {
        let next = format!("/archive/{}", n + 1);
        site = site.page(
            &format!("https://www.ics.uci.edu/archive/{}", n),
            html(&format!("post{}x", n), &[next.as_str()]),
        );
    }
    let site = Arc::new(site);

    let mut cfg = config(&dir);
    cfg.workers = 1;
    cfg.traps.max_pattern_repeat = 3;
    let summary = crawl(cfg, site.clone()).await;

    // archive/1..3 are clean, archive/4 trips the detector and its link is dropped.
    assert_eq!(summary.metrics.traps, 1);
    assert_eq!(site.fetch_count("https://www.ics.uci.edu/archive/4"), 1);
    assert_eq!(site.fetch_count("https://www.ics.uci.edu/archive/5"), 0);
    assert_eq!(summary.frontier.total_records, 5);
    assert_eq!(summary.unique_pages, 4);
}

#[tokio::test]
async fn test_redirect_out_of_scope_is_not_expanded() {
    let dir = TempDir::new().unwrap();
    let site = Arc::new(
        MockSite::new()
            .page(HOME, html("home", &["/moved"]))
            .redirect(
                "https://www.ics.uci.edu/moved",
                "https://www.example.com/landing",
                html("landing", &["/elsewhere"]),
            ),
    );

    let summary = crawl(config(&dir), site.clone()).await;

    assert_eq!(summary.metrics.redirected_away, 1);
    assert_eq!(summary.frontier.total_records, 2);
    assert_eq!(summary.unique_pages, 1);
}

#[tokio::test]
async fn test_unreachable_page_is_completed_and_crawl_continues() {
    let dir = TempDir::new().unwrap();
    let site = Arc::new(
        MockSite::new()
            .page(HOME, html("home", &["/down", "/up"]))
            .unreachable("https://www.ics.uci.edu/down")
            .page("https://www.ics.uci.edu/up", html("up", &[])),
    );

    let crawler = Crawler::new(config(&dir), site.clone()).unwrap();
    let summary = crawler.run().await.unwrap();

    assert_eq!(summary.metrics.fetch_failures, 1);
    assert_eq!(summary.metrics.pages_crawled, 2);
    assert_eq!(summary.frontier.completed, 3);
    assert!(crawler
        .frontier()
        .is_completed("https://www.ics.uci.edu/down")
        .unwrap());
    assert_eq!(site.fetch_count("https://www.ics.uci.edu/down"), 1);
}

#[tokio::test]
async fn test_unparseable_page_is_completed_and_crawl_continues() {
    let dir = TempDir::new().unwrap();
    let site = Arc::new(
        MockSite::new()
            .page(HOME, html("home", &["/feed", "/latin"]))
            .raw(
                "https://www.ics.uci.edu/feed",
                "application/octet-stream",
                vec![0x00, 0xff, 0x10, 0x80],
            )
            .raw(
                "https://www.ics.uci.edu/latin",
                "text/html; charset=iso-8859-1",
                {
                    let mut body = html("latin", &["/next"]).into_bytes();
                    body.extend_from_slice(b"<p>r\xE9sum\xE9</p>");
                    body
                },
            )
            .page("https://www.ics.uci.edu/next", html("next", &[])),
    );

    let crawler = Crawler::new(config(&dir), site.clone()).unwrap();
    let summary = crawler.run().await.unwrap();

    assert_eq!(summary.metrics.parse_failures, 1);
    assert!(crawler
        .frontier()
        .is_completed("https://www.ics.uci.edu/feed")
        .unwrap());
    // The legacy-encoded page still contributes its links.
    assert_eq!(site.fetch_count("https://www.ics.uci.edu/next"), 1);
    assert_eq!(summary.frontier.completed, 4);
    assert_eq!(summary.unique_pages, 3);
}

#[test]
fn test_concurrent_discovery_yields_one_record_per_url() {
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn KvStore> =
        Arc::new(RedbStore::open(dir.path().join(Config::FRONTIER_FILE)).unwrap());
    let frontier = Arc::new(Frontier::new(store, QueueOrder::Fifo));
    let added = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|thread_id| {
            let frontier = Arc::clone(&frontier);
            let added = Arc::clone(&added);
            std::thread::spawn(move || {
                for n in 0..25 {
                    // Same URL in two spellings that normalize identically.
                    let url = if (n + thread_id) % 2 == 0 {
                        format!("https://WWW.ICS.UCI.EDU/page{}?b=2&a=1#top", n)
                    } else {
                        format!("https://www.ics.uci.edu/page{}?a=1&b=2", n)
                    };
                    if frontier.add_url(&url).unwrap() {
                        added.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(added.load(Ordering::SeqCst), 25);
    assert_eq!(frontier.len(), 25);
    assert_eq!(frontier.stats().unwrap().total_records, 25);

    let mut handed_out = Vec::new();
    while let Some(url) = frontier.get_next().unwrap() {
        handed_out.push(url);
    }
    handed_out.sort();
    handed_out.dedup();
    assert_eq!(handed_out.len(), 25);
}

/// In-memory store that starts failing writes once its budget is spent.
struct FailingStore {
    records: Mutex<HashMap<String, UrlRecord>>,
    writes_left: AtomicUsize,
}

impl FailingStore {
    fn with_budget(writes: usize) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            writes_left: AtomicUsize::new(writes),
        }
    }

    fn spend(&self) -> Result<(), StoreError> {
        self.writes_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .map(|_| ())
            .map_err(|_| StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full")))
    }
}

impl KvStore for FailingStore {
    fn get(&self, key: &str) -> Result<Option<UrlRecord>, StoreError> {
        Ok(self.records.lock().get(key).cloned())
    }

    fn put(&self, key: &str, record: &UrlRecord) -> Result<(), StoreError> {
        self.spend()?;
        self.records.lock().insert(key.to_string(), record.clone());
        Ok(())
    }

    fn put_if_absent(&self, key: &str, record: &UrlRecord) -> Result<bool, StoreError> {
        let mut records = self.records.lock();
        if records.contains_key(key) {
            return Ok(false);
        }
        self.spend()?;
        records.insert(key.to_string(), record.clone());
        Ok(true)
    }

    fn iterate(
        &self,
        f: &mut dyn FnMut(&str, UrlRecord) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        for (key, record) in self.records.lock().iter() {
            f(key, record.clone())?;
        }
        Ok(())
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.records.lock().len())
    }

    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.records.lock().clear();
        Ok(())
    }
}

#[tokio::test]
async fn test_storage_failure_halts_crawl() {
    let dir = TempDir::new().unwrap();
    let site = Arc::new(
        MockSite::new()
            .page(HOME, html("home", &["/a", "/b"]))
            .page("https://www.ics.uci.edu/a", html("alpha", &[]))
            .page("https://www.ics.uci.edu/b", html("beta", &[])),
    );

    // Enough for the seed, nothing for the first discovered link.
    let store: Arc<dyn KvStore> = Arc::new(FailingStore::with_budget(1));
    let crawler = Crawler::with_store(config(&dir), store, site.clone()).unwrap();

    let result = tokio::time::timeout(std::time::Duration::from_secs(30), crawler.run())
        .await
        .expect("crawl did not halt");

    assert!(matches!(
        result,
        Err(CrawlError::Frontier(FrontierError::Durability(_)))
    ));
    assert!(!crawler.is_running());
    assert_eq!(site.fetch_count("https://www.ics.uci.edu/a"), 0);
    // Statistics are still flushed on the way out.
    assert!(dir.path().join(Config::STATS_FILE).exists());
}
