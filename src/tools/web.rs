//! Web access tools: search and fetch URLs.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};

use super::Tool;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; SkillAgent/1.0)";
const MAX_FETCH_CHARS: usize = 20_000;
const MAX_FETCH_BYTES: usize = 1024 * 1024;
const DDG_HTML_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
const MAX_SEARCH_RESULTS: u64 = 10;

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_default()
}

/// Read at most `limit` bytes of the body. The flag reports whether the body was cut.
async fn read_capped(mut response: reqwest::Response, limit: usize) -> anyhow::Result<(String, bool)> {
    let mut buf: Vec<u8> = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let room = limit - buf.len();
        if chunk.len() >= room {
            buf.extend_from_slice(&chunk[..room]);
            return Ok((String::from_utf8_lossy(&buf).into_owned(), true));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok((String::from_utf8_lossy(&buf).into_owned(), false))
}

/// Fetch content from a URL.
pub struct FetchUrl {
    client: reqwest::Client,
    max_bytes: usize,
}

impl FetchUrl {
    pub fn new() -> Self {
        Self {
            client: http_client(),
            max_bytes: MAX_FETCH_BYTES,
        }
    }

    /// Stop reading response bodies after `max_bytes`.
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

impl Default for FetchUrl {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for FetchUrl {
    fn name(&self) -> &str {
        "fetch_url"
    }

    fn description(&self) -> &str {
        "Fetch and read the text content of a URL. HTML pages are reduced to readable text."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The http(s) URL to fetch"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<String> {
        let raw = args["url"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'url' argument"))?;
        let url = url::Url::parse(raw).map_err(|e| anyhow::anyhow!("Invalid URL '{}': {}", raw, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("Unsupported URL scheme: {}", url.scheme());
        }

        tracing::info!("Fetching URL: {}", url);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("HTTP error: {}", status);
        }

        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("text/html"))
            .unwrap_or(false);

        let (body, cut) = read_capped(response, self.max_bytes).await?;
        if cut {
            tracing::debug!("Response body cut at {} bytes", self.max_bytes);
        }
        let mut text = if is_html { extract_text_from_html(&body) } else { body };
        if cut {
            text.push_str(&format!("\n... [body cut at {} bytes]", self.max_bytes));
        }

        Ok(truncate_chars(&text, MAX_FETCH_CHARS))
    }
}

/// Search the web using DuckDuckGo's HTML endpoint (no API key needed).
pub struct WebSearch {
    client: reqwest::Client,
    endpoint: String,
}

impl WebSearch {
    pub fn new() -> Self {
        Self {
            client: http_client(),
            endpoint: DDG_HTML_ENDPOINT.to_string(),
        }
    }

    /// Query a DuckDuckGo-compatible HTML endpoint other than the public one.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

impl Default for WebSearch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebSearch {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for information. Returns result titles, snippets and URLs."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "num_results": {
                    "type": "integer",
                    "description": "Maximum number of results to return (default: 5, max: 10)"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<String> {
        let query = args["query"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'query' argument"))?;
        let limit = args["num_results"].as_u64().unwrap_or(5).clamp(1, MAX_SEARCH_RESULTS) as usize;

        let url = format!("{}?q={}", self.endpoint, urlencoding::encode(query));
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Search failed with HTTP status {}", status);
        }
        let (html, _) = read_capped(response, MAX_FETCH_BYTES).await?;

        let results = extract_ddg_results(&html, limit);
        if results.is_empty() {
            Ok(format!("No results found for: {}", query))
        } else {
            Ok(results.join("\n\n"))
        }
    }
}

/// Pull title, snippet and URL out of DuckDuckGo result blocks.
fn extract_ddg_results(html: &str, limit: usize) -> Vec<String> {
    html.split("class=\"result__body\"")
        .skip(1)
        .filter_map(|block| {
            let title = inner_text_after(block, "class=\"result__a\"")?;
            let snippet = inner_text_after(block, "class=\"result__snippet\"").unwrap_or_default();
            let url = inner_text_after(block, "class=\"result__url\"").unwrap_or_default();
            Some(format!("**{}**\n{}\nURL: {}", title, snippet, url))
        })
        .take(limit)
        .collect()
}

fn inner_text_after(block: &str, marker: &str) -> Option<String> {
    let rest = block.split(marker).nth(1)?;
    let open_end = rest.find('>')?;
    let inner = &rest[open_end + 1..];
    let close = inner.find("</")?;
    let text = html_decode(&strip_tags(&inner[..close]));
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn strip_tags(html: &str) -> String {
    static TAG: OnceLock<Regex> = OnceLock::new();
    let tag = TAG.get_or_init(|| Regex::new(r"<[^>]*>").expect("static regex"));
    tag.replace_all(html, " ").into_owned()
}

/// Reduce an HTML document to whitespace-normalized text.
fn extract_text_from_html(html: &str) -> String {
    static BLOCKS: OnceLock<Regex> = OnceLock::new();
    let blocks = BLOCKS.get_or_init(|| {
        Regex::new(r"(?is)<(script|style|noscript)\b.*?</(script|style|noscript)>").expect("static regex")
    });
    let without_blocks = blocks.replace_all(html, " ");
    let text = strip_tags(&without_blocks);
    html_decode(&text.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn html_decode(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!(
            "{}... [content truncated, showing first {} chars]",
            &s[..idx],
            max_chars
        ),
        None => s.to_string(),
    }
}
