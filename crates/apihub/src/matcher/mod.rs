//! Rule compilation and request matching.
//!
//! Rules are compiled once when a config is loaded and are read-only after
//! that. Matching walks the rules in declaration order, checks method, then
//! path, then headers, and stops at the first rule that satisfies all three.
//! Captured path parameters are returned in the [`RuleMatch`] value and never
//! written back into the shared rule.

pub mod path;

use crate::config::rules::{render_value, MockResponse, ProxyTarget, RuleConfig};
use bytes::Bytes;
use hyper::header::{HeaderName, HeaderValue};
use hyper::{HeaderMap, Method, StatusCode};
use std::fmt;
use std::time::Duration;

pub use path::{PathParams, PathTemplate, Segment};

/// Canned response served without any upstream I/O.
#[derive(Debug, Clone)]
pub struct MockBehavior {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Upstream forwarding target.
#[derive(Debug, Clone)]
pub struct ProxyBehavior {
    pub target: String,
    /// True when the target has no `:name` segment and is used unchanged.
    pub is_static: bool,
    pub headers: HeaderMap,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub enum RuleBehavior {
    Mock(MockBehavior),
    Proxy(ProxyBehavior),
}

#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub method: Method,
    pub path: PathTemplate,
    pub required_headers: Vec<(HeaderName, HeaderValue)>,
    pub behavior: RuleBehavior,
}

impl CompiledRule {
    pub fn compile(rule: &RuleConfig) -> Result<Self, String> {
        let request = rule
            .request
            .as_ref()
            .ok_or_else(|| "missing 'request' section".to_string())?;

        let method: Method = request
            .method
            .parse()
            .map_err(|_| format!("invalid method '{}'", request.method))?;
        let path = PathTemplate::parse(&request.path)?;

        let required_headers = request
            .headers
            .iter()
            .map(|(name, value)| parse_header(name, &render_value(value)))
            .collect::<Result<Vec<_>, _>>()?;

        let behavior = match (&rule.response, &rule.proxy) {
            (Some(response), None) => RuleBehavior::Mock(compile_mock(response)?),
            (None, Some(proxy)) => RuleBehavior::Proxy(compile_proxy(proxy)?),
            (Some(_), Some(_)) => {
                return Err("rule has both 'response' and 'proxy'; exactly one is allowed".into())
            }
            (None, None) => return Err("rule has neither 'response' nor 'proxy'".into()),
        };

        Ok(Self {
            method,
            path,
            required_headers,
            behavior,
        })
    }

    /// Check this rule against a request, short-circuiting on the first
    /// failing constraint.
    pub fn check(&self, method: &Method, path: &str, headers: &HeaderMap) -> Result<(), MismatchReason> {
        if self.method != *method {
            return Err(MismatchReason::Method);
        }
        if !self.path.matches(path) {
            return Err(MismatchReason::Path);
        }
        let headers_match = self.required_headers.iter().all(|(name, expected)| {
            headers
                .get(name)
                .is_some_and(|actual| actual.as_bytes() == expected.as_bytes())
        });
        if !headers_match {
            return Err(MismatchReason::Header);
        }
        Ok(())
    }

    /// One-line description used in startup logs and `validate` output.
    pub fn describe(&self) -> String {
        match &self.behavior {
            RuleBehavior::Mock(mock) => {
                format!("{} {} -> mock {}", self.method, self.path, mock.status.as_u16())
            }
            RuleBehavior::Proxy(proxy) => {
                format!("{} {} -> proxy {}", self.method, self.path, proxy.target)
            }
        }
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), String> {
    let header_name =
        HeaderName::from_bytes(name.as_bytes()).map_err(|_| format!("invalid header name '{name}'"))?;
    let header_value = HeaderValue::from_str(value)
        .map_err(|_| format!("invalid value for header '{name}'"))?;
    Ok((header_name, header_value))
}

fn compile_mock(response: &MockResponse) -> Result<MockBehavior, String> {
    let status = StatusCode::from_u16(response.status)
        .map_err(|_| format!("invalid response status {}", response.status))?;

    let mut headers = HeaderMap::new();
    for (name, value) in &response.headers {
        let (name, value) = parse_header(name, &render_value(value))?;
        headers.insert(name, value);
    }

    Ok(MockBehavior {
        status,
        headers,
        body: Bytes::from(response.body.clone()),
    })
}

fn compile_proxy(proxy: &ProxyTarget) -> Result<ProxyBehavior, String> {
    if proxy.url.trim().is_empty() {
        return Err("proxy 'url' is empty".to_string());
    }

    let mut headers = HeaderMap::new();
    for (name, value) in &proxy.headers {
        let (name, value) = parse_header(name, value)?;
        headers.insert(name, value);
    }

    Ok(ProxyBehavior {
        target: proxy.url.clone(),
        is_static: is_static_target(&proxy.url),
        headers,
        timeout: (proxy.timeout > 0).then(|| Duration::from_millis(proxy.timeout)),
    })
}

/// A target is static when none of its `/`-separated parts starts with `:`.
pub fn is_static_target(target: &str) -> bool {
    !target.split('/').any(|part| part.starts_with(':'))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchReason {
    Method,
    Path,
    Header,
}

impl fmt::Display for MismatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MismatchReason::Method => f.write_str("method not matched"),
            MismatchReason::Path => f.write_str("path not matched"),
            MismatchReason::Header => f.write_str("header not matched"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMismatch {
    pub rule_path: String,
    pub reason: MismatchReason,
}

/// Why no rule matched a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoMatch {
    NoRulesConfigured,
    /// One entry per rule tried, in declaration order.
    Mismatched(Vec<RuleMismatch>),
}

impl fmt::Display for NoMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoMatch::NoRulesConfigured => f.write_str("no rules configured"),
            NoMatch::Mismatched(mismatches) => {
                writeln!(f, "No matching rule found:")?;
                for m in mismatches {
                    writeln!(f, "- rule {:?}: {}", m.rule_path, m.reason)?;
                }
                Ok(())
            }
        }
    }
}

/// A matched rule together with the parameters captured for this request.
#[derive(Debug)]
pub struct RuleMatch<'a> {
    pub rule: &'a CompiledRule,
    pub params: PathParams,
}

#[derive(Debug)]
pub enum MatchResult<'a> {
    Matched(RuleMatch<'a>),
    NoMatch(NoMatch),
}

impl<'a> MatchResult<'a> {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchResult::Matched(_))
    }
}

/// Find the first rule, in declaration order, that accepts the request.
pub fn find_matching_rule<'a>(
    rules: &'a [CompiledRule],
    method: &Method,
    path: &str,
    headers: &HeaderMap,
) -> MatchResult<'a> {
    if rules.is_empty() {
        return MatchResult::NoMatch(NoMatch::NoRulesConfigured);
    }

    let mut mismatches = Vec::new();
    for rule in rules {
        match rule.check(method, path, headers) {
            Ok(()) => {
                let params = rule.path.extract(path).unwrap_or_default();
                return MatchResult::Matched(RuleMatch { rule, params });
            }
            Err(reason) => mismatches.push(RuleMismatch {
                rule_path: rule.path.as_str().to_string(),
                reason,
            }),
        }
    }

    MatchResult::NoMatch(NoMatch::Mismatched(mismatches))
}
