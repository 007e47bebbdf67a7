//! Wikipedia 工具：按查询词取条目摘要
//!
//! 先用 MediaWiki 搜索 API 取前 N 个标题，再取首个标题的 REST 摘要：
//! - 无搜索结果或摘要 404 → ToolError::NotFound
//! - 摘要类型为 disambiguation → ToolError::Ambiguous（候选取自消歧义页的条目链接，取不到时退回其余搜索标题）
//! - 结果超过 max_result_chars 时截断并追加 ...[truncated]

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;

use crate::tools::{Tool, ToolError};

const USER_AGENT: &str = concat!(
    "react-agent/",
    env!("CARGO_PKG_VERSION"),
    " (terminal ReAct agent)"
);

/// 消歧义候选的最大数量
const MAX_OPTIONS: usize = 10;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    query: Option<SearchQuery>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
}

#[derive(Debug, Deserialize)]
struct LinksResponse {
    query: Option<LinksQuery>,
}

#[derive(Debug, Deserialize)]
struct LinksQuery {
    #[serde(default)]
    pages: Vec<LinksPage>,
}

#[derive(Debug, Deserialize)]
struct LinksPage {
    #[serde(default)]
    links: Vec<PageLink>,
}

#[derive(Debug, Deserialize)]
struct PageLink {
    title: String,
}

#[derive(Debug, Deserialize)]
struct PageSummary {
    #[serde(rename = "type", default)]
    kind: String,
    title: String,
    #[serde(default)]
    extract: String,
}

/// Wikipedia 工具：base_url 形如 https://en.wikipedia.org
pub struct WikipediaTool {
    client: Client,
    base_url: Url,
    max_result_chars: usize,
    search_results: usize,
}

impl WikipediaTool {
    /// base_url 无法解析或 HTTP 客户端无法创建时返回错误
    pub fn new(
        base_url: &str,
        timeout_secs: u64,
        max_result_chars: usize,
        search_results: usize,
    ) -> Result<Self, ToolError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ToolError::Failed(format!("Invalid Wikipedia base url: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ToolError::Failed(format!(
                "Invalid Wikipedia base url: {base_url}"
            )));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ToolError::Failed(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url,
            max_result_chars,
            search_results: search_results.max(1),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ToolError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ToolError::Failed("Wikipedia base url cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn search(&self, query: &str) -> Result<Vec<String>, ToolError> {
        let url = self.endpoint(&["w", "api.php"])?;
        let limit = self.search_results.to_string();
        let resp = self
            .client
            .get(url)
            .query(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("srlimit", limit.as_str()),
                ("format", "json"),
            ])
            .send()
            .await
            .map_err(|e| ToolError::Failed(format!("Request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(ToolError::Failed(format!("HTTP {}", resp.status())));
        }
        let body: SearchResponse = resp
            .json()
            .await
            .map_err(|e| ToolError::Failed(format!("Read body: {e}")))?;
        Ok(body
            .query
            .map(|q| q.search.into_iter().map(|h| h.title).collect())
            .unwrap_or_default())
    }

    /// 消歧义页上指向条目（主命名空间）的链接标题
    async fn page_links(&self, title: &str) -> Result<Vec<String>, ToolError> {
        let url = self.endpoint(&["w", "api.php"])?;
        let limit = MAX_OPTIONS.to_string();
        let resp = self
            .client
            .get(url)
            .query(&[
                ("action", "query"),
                ("prop", "links"),
                ("titles", title),
                ("plnamespace", "0"),
                ("pllimit", limit.as_str()),
                ("format", "json"),
                ("formatversion", "2"),
            ])
            .send()
            .await
            .map_err(|e| ToolError::Failed(format!("Request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(ToolError::Failed(format!("HTTP {}", resp.status())));
        }
        let body: LinksResponse = resp
            .json()
            .await
            .map_err(|e| ToolError::Failed(format!("Read body: {e}")))?;
        Ok(body
            .query
            .map(|q| {
                q.pages
                    .into_iter()
                    .flat_map(|p| p.links)
                    .map(|l| l.title)
                    .collect()
            })
            .unwrap_or_default())
    }

    /// 消歧义候选：优先页面链接，其次其余搜索标题，最后页面自身标题
    async fn disambiguation_options(&self, page: &PageSummary, titles: &[String]) -> Vec<String> {
        let mut options = match self.page_links(&page.title).await {
            Ok(links) => links,
            Err(e) => {
                tracing::warn!(title = %page.title, error = %e, "failed to fetch disambiguation links");
                Vec::new()
            }
        };
        if options.is_empty() {
            options = titles.iter().skip(1).cloned().collect();
        }
        if options.is_empty() {
            options.push(page.title.clone());
        }
        options.truncate(MAX_OPTIONS);
        options
    }

    /// 取摘要；404 返回 None
    async fn summary(&self, title: &str) -> Result<Option<PageSummary>, ToolError> {
        let slug = title.replace(' ', "_");
        let url = self.endpoint(&["api", "rest_v1", "page", "summary", slug.as_str()])?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ToolError::Failed(format!("Request failed: {e}")))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(ToolError::Failed(format!("HTTP {}", resp.status())));
        }
        let page = resp
            .json()
            .await
            .map_err(|e| ToolError::Failed(format!("Read body: {e}")))?;
        Ok(Some(page))
    }

    pub async fn lookup(&self, input: &str) -> Result<String, ToolError> {
        let query = input.trim().trim_matches('"').trim();
        if query.is_empty() {
            return Err(ToolError::InvalidInput(
                "Wikipedia needs a search query".to_string(),
            ));
        }
        tracing::info!(query = %query, "wikipedia lookup");

        let titles = self.search(query).await?;
        let Some(top) = titles.first() else {
            return Err(ToolError::NotFound(query.to_string()));
        };

        match self.summary(top).await? {
            None => Err(ToolError::NotFound(query.to_string())),
            Some(page) if page.kind == "disambiguation" => Err(ToolError::Ambiguous {
                query: query.to_string(),
                options: self.disambiguation_options(&page, &titles).await,
            }),
            Some(page) if page.extract.trim().is_empty() => {
                Err(ToolError::NotFound(query.to_string()))
            }
            Some(page) => Ok(self.truncate(format!(
                "Page: {}\nSummary: {}",
                page.title,
                page.extract.trim()
            ))),
        }
    }

    fn truncate(&self, text: String) -> String {
        if text.chars().count() > self.max_result_chars {
            text.chars().take(self.max_result_chars).collect::<String>() + "\n...[truncated]"
        } else {
            text
        }
    }
}

#[async_trait]
impl Tool for WikipediaTool {
    fn name(&self) -> &str {
        "Wikipedia"
    }

    fn description(&self) -> &str {
        "Useful for getting Wikipedia summaries. Input should be a search query, e.g. a person, place or topic."
    }

    async fn invoke(&self, input: &str) -> Result<String, ToolError> {
        self.lookup(input).await
    }
}
