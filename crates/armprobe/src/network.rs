//! Network Request Interception
//!
//! Route table for mocking API responses. The Chromium driver consults it for
//! every paused request; the mock driver consults it when the page "submits".
//!
//! Glob semantics follow the browser-automation convention: `**` spans path
//! separators, `*` does not, `{a,b}` is an alternation.

use crate::result::{ProbeError, ProbeResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// HTTP methods for request matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpMethod {
    /// GET request
    Get,
    /// POST request
    Post,
    /// PUT request
    Put,
    /// DELETE request
    Delete,
    /// PATCH request
    Patch,
    /// HEAD request
    Head,
    /// OPTIONS request
    Options,
    /// Any method
    Any,
}

impl HttpMethod {
    /// Parse from a CDP method string
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            "PATCH" => Self::Patch,
            "HEAD" => Self::Head,
            "OPTIONS" => Self::Options,
            _ => Self::Any,
        }
    }

    /// Convert to string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Any => "*",
        }
    }

    /// Check if this method matches another
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        *self == Self::Any || *other == Self::Any || *self == *other
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mocked HTTP response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockResponse {
    /// HTTP status code
    pub status: u16,
    /// Extra response headers
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    /// Response body
    pub body: String,
    /// Content type; `None` sends no `Content-Type` header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Artificial delay in milliseconds before the response is delivered
    #[serde(default)]
    pub delay_ms: u64,
}

impl Default for MockResponse {
    fn default() -> Self {
        Self {
            status: 200,
            headers: HashMap::new(),
            body: String::new(),
            content_type: None,
            delay_ms: 0,
        }
    }
}

impl MockResponse {
    /// Create an empty 200 response
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a JSON response from a literal body
    #[must_use]
    pub fn json(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            content_type: Some("application/json".to_string()),
            ..Self::default()
        }
    }

    /// Create a response with a body and no content type
    #[must_use]
    pub fn raw(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    /// Set status code
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_string(), value.to_string());
        self
    }

    /// Set delay
    #[must_use]
    pub const fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// All headers to send, `Content-Type` first when present
    #[must_use]
    pub fn header_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::with_capacity(self.headers.len() + 1);
        if let Some(ref ct) = self.content_type {
            pairs.push(("Content-Type".to_string(), ct.clone()));
        }
        let mut extra: Vec<_> = self
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        extra.sort();
        pairs.extend(extra);
        pairs
    }

    /// Parse the body as JSON
    pub fn body_json(&self) -> ProbeResult<serde_json::Value> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Pattern for matching request URLs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UrlPattern {
    /// Exact URL match
    Exact(String),
    /// Contains substring
    Contains(String),
    /// Glob pattern (e.g., "**/api/me")
    Glob(String),
    /// Match any URL
    Any,
}

impl UrlPattern {
    /// Create a glob pattern
    #[must_use]
    pub fn glob(pattern: impl Into<String>) -> Self {
        Self::Glob(pattern.into())
    }

    /// Check if a URL matches this pattern
    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        match self {
            Self::Exact(pattern) => url == pattern,
            Self::Contains(pattern) => url.contains(pattern.as_str()),
            Self::Glob(pattern) => glob_to_regex(pattern)
                .map(|re| re.is_match(url))
                .unwrap_or(false),
            Self::Any => true,
        }
    }

    /// Pattern as written
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Exact(p) | Self::Contains(p) | Self::Glob(p) => p,
            Self::Any => "*",
        }
    }
}

impl std::fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compile a URL glob into an anchored regex.
///
/// `**` bounded by `/` (or the pattern edge) matches any number of path
/// segments, including none; any other run of `*` stays within a segment.
pub fn glob_to_regex(glob: &str) -> ProbeResult<Regex> {
    let chars: Vec<char> = glob.chars().collect();
    let mut out = String::from("^");
    let mut in_group = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '*' => {
                let before = if i == 0 { None } else { Some(chars[i - 1]) };
                let mut stars = 1;
                while chars.get(i + 1) == Some(&'*') {
                    stars += 1;
                    i += 1;
                }
                let after = chars.get(i + 1).copied();
                let deep = stars > 1
                    && matches!(before, None | Some('/'))
                    && matches!(after, None | Some('/'));
                if deep {
                    out.push_str("((?:[^/]*(?:/|$))*)");
                    // the separator is part of the segment group
                    i += 1;
                } else {
                    out.push_str("([^/]*)");
                }
            }
            '{' if !in_group => {
                in_group = true;
                out.push('(');
            }
            '}' if in_group => {
                in_group = false;
                out.push(')');
            }
            ',' if in_group => out.push('|'),
            _ => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }
    out.push('$');

    Regex::new(&out).map_err(|e| ProbeError::Config {
        message: format!("invalid URL glob '{glob}': {e}"),
    })
}

/// A request served by a mocked route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedRequest {
    /// Request URL
    pub url: String,
    /// HTTP method
    pub method: HttpMethod,
    /// Pattern of the route that served it
    pub route: String,
    /// Milliseconds since the table was created
    pub timestamp_ms: u64,
}

/// A route definition for interception
#[derive(Debug, Clone)]
pub struct Route {
    /// URL pattern to match
    pub pattern: UrlPattern,
    /// HTTP method to match
    pub method: HttpMethod,
    /// Response to return
    pub response: MockResponse,
    /// Line printed each time the route serves a request
    pub notice: Option<String>,
    /// Number of times this route has been matched
    pub match_count: usize,
}

impl Route {
    /// Create a route matching any method
    #[must_use]
    pub fn new(pattern: UrlPattern, response: MockResponse) -> Self {
        Self {
            pattern,
            method: HttpMethod::Any,
            response,
            notice: None,
            match_count: 0,
        }
    }

    /// Restrict to one method
    #[must_use]
    pub const fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    /// Print a line every time the route is hit
    #[must_use]
    pub fn with_notice(mut self, notice: impl Into<String>) -> Self {
        self.notice = Some(notice.into());
        self
    }

    /// Check if this route matches a request
    #[must_use]
    pub fn matches(&self, url: &str, method: &HttpMethod) -> bool {
        self.pattern.matches(url) && self.method.matches(method)
    }
}

/// What the table decided for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteHit {
    /// Response to fulfil the request with
    pub response: MockResponse,
    /// Notice to print, if the route has one
    pub notice: Option<String>,
    /// Pattern of the matching route
    pub pattern: String,
}

/// Registered routes plus the requests they served
#[derive(Debug)]
pub struct RouteTable {
    routes: Vec<Route>,
    captured: Vec<CapturedRequest>,
    start_time: Instant,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            captured: Vec::new(),
            start_time: Instant::now(),
        }
    }

    /// Create a table from routes
    #[must_use]
    pub fn with_routes(routes: impl IntoIterator<Item = Route>) -> Self {
        let mut table = Self::new();
        for route in routes {
            table.route(route);
        }
        table
    }

    /// Wrap for sharing with background interception tasks
    #[must_use]
    pub fn shared(self) -> SharedRouteTable {
        Arc::new(Mutex::new(self))
    }

    /// Add a route. The first matching route wins.
    pub fn route(&mut self, route: Route) {
        self.routes.push(route);
    }

    /// Resolve a request. `None` means let it through to the network.
    pub fn handle_request(&mut self, url: &str, method: HttpMethod) -> Option<RouteHit> {
        let timestamp_ms = self.start_time.elapsed().as_millis() as u64;
        let route = self.routes.iter_mut().find(|r| r.matches(url, &method))?;
        route.match_count += 1;

        self.captured.push(CapturedRequest {
            url: url.to_string(),
            method,
            route: route.pattern.as_str().to_string(),
            timestamp_ms,
        });

        Some(RouteHit {
            response: route.response.clone(),
            notice: route.notice.clone(),
            pattern: route.pattern.as_str().to_string(),
        })
    }

    /// Registered routes
    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Route registered under `pattern`
    pub fn route_mut(&mut self, pattern: &str) -> Option<&mut Route> {
        self.routes.iter_mut().find(|r| r.pattern.as_str() == pattern)
    }

    /// Get route count
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// All requests served so far
    #[must_use]
    pub fn captured_requests(&self) -> &[CapturedRequest] {
        &self.captured
    }

    /// Requests served by the route with this pattern
    #[must_use]
    pub fn requests_for(&self, pattern: &str) -> Vec<&CapturedRequest> {
        self.captured.iter().filter(|r| r.route == pattern).collect()
    }

    /// Assert a route served exactly `times` requests
    pub fn assert_served_times(&self, pattern: &str, times: usize) -> ProbeResult<()> {
        let served = self.requests_for(pattern).len();
        if served != times {
            return Err(ProbeError::Interception {
                message: format!(
                    "expected {} requests served by {}, but found {}",
                    times, pattern, served
                ),
            });
        }
        Ok(())
    }

    /// Clear captured requests
    pub fn clear_captured(&mut self) {
        self.captured.clear();
    }
}

/// Route table shared between the driver and its interception task
pub type SharedRouteTable = Arc<Mutex<RouteTable>>;
