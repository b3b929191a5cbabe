//! Path patterns and the Path predicate.
//!
//! # Pattern Syntax
//! Patterns are split on a separator (`/` for paths, `.` for hosts):
//! - `literal` segments, optionally with `*` / `?` wildcards inside
//! - `{name}` captures one non-empty segment
//! - `{name:regex}` captures one segment matching `regex`
//! - `*` matches one segment
//! - `**` matches zero or more segments
//! - `{*name}` captures the remaining segments; must be last
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - Segments are matched in their encoded form; captured values are
//!   percent-decoded before they reach the request
//! - Variables from every matched pattern are merged into the request, never replaced

use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

use crate::error::PredicateError;
use crate::http::exchange::Exchange;
use crate::predicate::registry::{bind, PredicateConfig, PredicateKind, ShortcutType};
use crate::predicate::{Predicate, PredicateFactory, RoutePredicate};

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Glob(String),
    Variable(String),
    Constrained(String, Regex),
    AnySegment,
    AnySegments,
    Capture(String),
}

impl Segment {
    fn parse(raw: &str) -> Result<Self, String> {
        match raw {
            "*" => return Ok(Segment::AnySegment),
            "**" => return Ok(Segment::AnySegments),
            _ => {}
        }

        if let Some(inner) = raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            if let Some(name) = inner.strip_prefix('*') {
                return Ok(Segment::Capture(valid_name(name)?));
            }
            return match inner.split_once(':') {
                Some((name, re)) => {
                    let re = Regex::new(&format!("^(?:{})$", re))
                        .map_err(|e| format!("bad constraint for {{{}}}: {}", name, e))?;
                    Ok(Segment::Constrained(valid_name(name)?, re))
                }
                None => Ok(Segment::Variable(valid_name(inner)?)),
            };
        }

        if raw.contains(['{', '}']) {
            return Err(format!("unsupported segment '{}'", raw));
        }
        if raw.contains(['*', '?']) {
            Ok(Segment::Glob(raw.to_string()))
        } else {
            Ok(Segment::Literal(raw.to_string()))
        }
    }

    /// Match a single segment, recording any captured variable.
    fn matches(&self, segment: &str, vars: &mut HashMap<String, String>) -> bool {
        match self {
            Segment::Literal(lit) => lit == segment,
            Segment::Glob(glob) => glob_match(glob.as_bytes(), segment.as_bytes()),
            Segment::AnySegment => !segment.is_empty(),
            Segment::Variable(name) => {
                if segment.is_empty() {
                    return false;
                }
                vars.insert(name.clone(), segment.to_string());
                true
            }
            Segment::Constrained(name, re) => {
                if !re.is_match(segment) {
                    return false;
                }
                vars.insert(name.clone(), segment.to_string());
                true
            }
            Segment::AnySegments | Segment::Capture(_) => false,
        }
    }
}

fn valid_name(name: &str) -> Result<String, String> {
    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
        return Err(format!("invalid variable name '{}'", name));
    }
    Ok(name.to_string())
}

/// `*` matches any run of characters, `?` exactly one.
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == b'?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == b'*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == b'*')
}

/// A compiled separator-delimited pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    separator: char,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Compile a `/`-separated path pattern.
    pub fn parse(raw: &str) -> Result<Self, String> {
        Self::with_separator(raw, '/')
    }

    pub fn with_separator(raw: &str, separator: char) -> Result<Self, String> {
        let segments = raw
            .split(separator)
            .map(Segment::parse)
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(pos) = segments
            .iter()
            .position(|s| matches!(s, Segment::Capture(_)))
        {
            if pos != segments.len() - 1 {
                return Err(format!("capture-all must be the last segment in '{}'", raw));
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            separator,
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Match `input`, returning the extracted variables.
    ///
    /// With `match_trailing_slash`, one trailing separator on the input is
    /// ignored unless the pattern itself ends with one.
    pub fn matches(&self, input: &str, match_trailing_slash: bool) -> Option<HashMap<String, String>> {
        let mut parts: Vec<&str> = input.split(self.separator).collect();
        let pattern_has_trailing = self.raw.ends_with(self.separator);
        if match_trailing_slash
            && !pattern_has_trailing
            && parts.len() > 1
            && parts.last() == Some(&"")
            && input.len() > 1
        {
            parts.pop();
        }

        let mut vars = HashMap::new();
        if self.match_from(&self.segments, &parts, &mut vars) {
            Some(vars)
        } else {
            None
        }
    }

    fn match_from(
        &self,
        segments: &[Segment],
        parts: &[&str],
        vars: &mut HashMap<String, String>,
    ) -> bool {
        let Some((segment, rest)) = segments.split_first() else {
            return parts.is_empty();
        };

        match segment {
            Segment::AnySegments => (0..=parts.len()).any(|skip| {
                let mut attempt = vars.clone();
                if self.match_from(rest, &parts[skip..], &mut attempt) {
                    *vars = attempt;
                    true
                } else {
                    false
                }
            }),
            Segment::Capture(name) => {
                let value = if parts.is_empty() {
                    String::new()
                } else {
                    let sep = self.separator.to_string();
                    format!("{}{}", sep, parts.join(&sep))
                };
                vars.insert(name.clone(), value);
                true
            }
            _ => match parts.split_first() {
                Some((part, remaining)) => {
                    segment.matches(part, vars) && self.match_from(rest, remaining, vars)
                }
                None => false,
            },
        }
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn default_match_trailing_slash() -> bool {
    true
}

/// Arguments of the Path predicate.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathConfig {
    pub patterns: Vec<String>,
    #[serde(default = "default_match_trailing_slash")]
    pub match_trailing_slash: bool,
}

impl PredicateConfig for PathConfig {
    fn validate(&self) -> Result<(), String> {
        if self.patterns.is_empty() {
            return Err("patterns must not be empty".into());
        }
        Ok(())
    }
}

/// Matches the request path against any of several patterns.
#[derive(Debug)]
pub struct PathPredicate {
    patterns: Vec<PathPattern>,
    match_trailing_slash: bool,
}

impl PathPredicate {
    pub fn new(config: &PathConfig) -> Result<Self, String> {
        let patterns = config
            .patterns
            .iter()
            .map(|p| PathPattern::parse(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            patterns,
            match_trailing_slash: config.match_trailing_slash,
        })
    }
}

#[async_trait]
impl RoutePredicate for PathPredicate {
    async fn test(&self, exchange: &mut Exchange) -> Result<bool, PredicateError> {
        let path = exchange.request().uri().path().to_string();

        let matched = self.patterns.iter().find_map(|pattern| {
            let found = pattern.matches(&path, self.match_trailing_slash);
            tracing::trace!(pattern = %pattern, path = %path, matched = found.is_some(), "Path pattern");
            found.map(|vars| (pattern, vars))
        });

        match matched {
            Some((pattern, vars)) => {
                let vars = vars
                    .into_iter()
                    .map(|(name, value)| (name, percent_decode_str(&value).decode_utf8_lossy().into_owned()))
                    .collect();
                exchange.put_uri_template_variables(vars);
                exchange.set_matched_path(pattern.as_str());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn config(&self) -> Value {
        serde_json::json!({
            "patterns": self.patterns.iter().map(PathPattern::as_str).collect::<Vec<_>>(),
            "matchTrailingSlash": self.match_trailing_slash,
        })
    }
}

impl fmt::Display for PathPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let patterns: Vec<_> = self.patterns.iter().map(PathPattern::as_str).collect();
        write!(
            f,
            "Paths: {:?}, match trailing slash: {}",
            patterns, self.match_trailing_slash
        )
    }
}

pub struct PathFactory;

impl PredicateFactory for PathFactory {
    fn kind(&self) -> PredicateKind {
        PredicateKind::Path
    }

    fn shortcut_type(&self) -> ShortcutType {
        ShortcutType::GatherListTailFlag
    }

    fn shortcut_fields(&self) -> &'static [&'static str] {
        &["patterns", "matchTrailingSlash"]
    }

    fn apply(&self, args: &Value) -> Result<Predicate, PredicateError> {
        let config: PathConfig = bind(self.kind(), args)?;
        let predicate =
            PathPredicate::new(&config).map_err(|e| PredicateError::invalid(self.kind().name(), e))?;
        Ok(Predicate::leaf(predicate))
    }
}
