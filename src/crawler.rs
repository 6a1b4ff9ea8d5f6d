//! Depth-limited breadth-first web crawler.
//!
//! The crawl starts from a set of seed URLs at depth 0 and follows
//! `<a href>` links one level per unit of depth, never leaving the host
//! of the page that linked them. URLs are normalized (fragment
//! stripped, resolved against the page URL) before the visited-set
//! check, so cycles and `#section` anchors cannot cause refetches.
//! Fetch failures skip the page rather than aborting the crawl.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use scraper::{Html, Selector};
use url::Url;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::extract::{ContentExtractor, ExtractedBlock};
use crate::retry::{retryable_status, CancelToken, RetryError, RetryPolicy};

const USER_AGENT: &str = concat!(
    "quarry/",
    env!("CARGO_PKG_VERSION"),
    " (+https://github.com/quarry-rag/quarry)"
);

/// One fetched and extracted page.
#[derive(Debug)]
pub struct CrawledPage {
    pub url: String,
    pub depth: u32,
    pub blocks: Vec<ExtractedBlock>,
}

/// Outcome of a crawl: pages in visit order plus the URLs that failed.
#[derive(Debug, Default)]
pub struct CrawlOutcome {
    pub pages: Vec<CrawledPage>,
    pub failures: Vec<(String, String)>,
}

struct CrawlTask {
    url: Url,
    depth: u32,
}

pub struct Crawler {
    http: reqwest::Client,
    retry: RetryPolicy,
    max_depth: u32,
    pause: Duration,
}

impl Crawler {
    pub fn new(config: &Config, max_depth: u32) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            retry: RetryPolicy::new(config.max_retries),
            max_depth,
            pause: config.crawl_pause,
        })
    }

    /// Crawl breadth-first from `seeds`, reducing each page to text
    /// blocks with `extractor`. Depth 0 fetches the seeds only.
    ///
    /// `visited` is owned by the caller so it can span several `crawl`
    /// calls in one run: a URL reachable from two source entries is
    /// still fetched at most once.
    pub async fn crawl(
        &self,
        seeds: &[String],
        extractor: &dyn ContentExtractor,
        visited: &mut HashSet<String>,
        cancel: &CancelToken,
    ) -> Result<CrawlOutcome> {
        let mut outcome = CrawlOutcome::default();
        let mut queue: VecDeque<CrawlTask> = VecDeque::new();

        for seed in seeds {
            match Url::parse(seed) {
                Ok(mut url) => {
                    url.set_fragment(None);
                    if visited.insert(url.to_string()) {
                        queue.push_back(CrawlTask { url, depth: 0 });
                    }
                }
                Err(e) => outcome
                    .failures
                    .push((seed.clone(), format!("invalid URL: {}", e))),
            }
        }

        while let Some(task) = queue.pop_front() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let body = match self.fetch(&task.url, cancel).await {
                Ok(body) => body,
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    tracing::warn!(url = %task.url, error = %e, "skipping unreachable page");
                    outcome.failures.push((task.url.to_string(), e.to_string()));
                    continue;
                }
            };

            if task.depth < self.max_depth {
                for link in discover_links(&body, &task.url) {
                    if visited.insert(link.to_string()) {
                        queue.push_back(CrawlTask {
                            url: link,
                            depth: task.depth + 1,
                        });
                    }
                }
            }

            let blocks = extractor.extract(&body);
            tracing::debug!(url = %task.url, depth = task.depth, blocks = blocks.len(), "crawled page");
            outcome.pages.push(CrawledPage {
                url: task.url.to_string(),
                depth: task.depth,
                blocks,
            });

            if !self.pause.is_zero() && !queue.is_empty() {
                tokio::select! {
                    _ = tokio::time::sleep(self.pause) => {}
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                }
            }
        }

        Ok(outcome)
    }

    async fn fetch(&self, url: &Url, cancel: &CancelToken) -> Result<String> {
        self.retry
            .run(cancel, || {
                let request = self.http.get(url.clone());
                let url = url.to_string();
                async move {
                    let response = request.send().await.map_err(|e| {
                        RetryError::Transient(Error::Fetch {
                            url: url.clone(),
                            reason: e.to_string(),
                        })
                    })?;

                    let status = response.status();
                    if retryable_status(status) {
                        return Err(RetryError::Transient(Error::Fetch {
                            url: url.clone(),
                            reason: format!("status {}", status),
                        }));
                    }
                    if !status.is_success() {
                        return Err(RetryError::Fatal(Error::Fetch {
                            url: url.clone(),
                            reason: format!("status {}", status),
                        }));
                    }

                    response.text().await.map_err(|e| {
                        RetryError::Fatal(Error::Fetch {
                            url,
                            reason: format!("failed to read body: {}", e),
                        })
                    })
                }
            })
            .await
    }
}

/// Pull same-host links out of a page, normalized for dedupe: resolved
/// against the page URL, fragment stripped. Cross-host and unparseable
/// hrefs are dropped.
fn discover_links(html: &str, page_url: &Url) -> Vec<Url> {
    let document = Html::parse_document(html);
    let Ok(anchor) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut links = Vec::new();
    for element in document.select(&anchor) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Ok(mut link) = page_url.join(href) else {
            continue;
        };
        link.set_fragment(None);
        if link.scheme() != "http" && link.scheme() != "https" {
            continue;
        }
        if link.host_str() != page_url.host_str() {
            continue;
        }
        links.push(link);
    }
    links
}
