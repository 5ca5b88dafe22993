//! Path templates with `:name` parameter segments.
//!
//! A template is compared against a request path segment by segment after a
//! single trailing slash has been trimmed from both. Both must have the same
//! number of segments. A `:name` segment matches any non-empty request segment
//! and binds it under `name`.

use std::collections::HashMap;
use std::fmt;

/// Parameters captured from one request path. Owned by the request, never by
/// the rule it matched.
pub type PathParams = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Param(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    pub fn parse(raw: &str) -> Result<Self, String> {
        if !raw.starts_with('/') {
            return Err(format!("path '{raw}' must start with '/'"));
        }

        let segments = split_path(raw)
            .map(|segment| match segment.strip_prefix(':') {
                Some("") => Err(format!("path '{raw}' has a parameter marker without a name")),
                Some(name) => Ok(Segment::Param(name.to_string())),
                None => Ok(Segment::Literal(segment.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn has_params(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| matches!(segment, Segment::Param(_)))
    }

    /// Structural match only; no parameters are captured.
    pub fn matches(&self, path: &str) -> bool {
        let mut request = split_path(path);
        for segment in &self.segments {
            let Some(actual) = request.next() else {
                return false;
            };
            let ok = match segment {
                Segment::Literal(expected) => expected == actual,
                Segment::Param(_) => !actual.is_empty(),
            };
            if !ok {
                return false;
            }
        }
        request.next().is_none()
    }

    /// Match `path` and return a fresh map of captured parameters, or `None`
    /// when the path does not fit the template.
    pub fn extract(&self, path: &str) -> Option<PathParams> {
        if !self.matches(path) {
            return None;
        }

        let params = self
            .segments
            .iter()
            .zip(split_path(path))
            .filter_map(|(segment, actual)| match segment {
                Segment::Param(name) => Some((name.clone(), actual.to_string())),
                Segment::Literal(_) => None,
            })
            .collect();
        Some(params)
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn split_path(path: &str) -> std::str::Split<'_, char> {
    path.strip_suffix('/').unwrap_or(path).split('/')
}
