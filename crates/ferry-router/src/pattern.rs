//! Route pattern grammar
//!
//! - `/` alone is the root pattern
//! - empty segments are ignored, so `/users/` is the same pattern as `/users`
//! - `:name` captures exactly one segment
//! - `*` or `*name` captures every remaining segment; final position only

use crate::Method;
use thiserror::Error;

/// Why a pattern was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternFault {
    #[error("pattern is empty")]
    Empty,
    #[error("pattern must start with '/'")]
    MissingLeadingSlash,
    #[error("pattern contains a control character")]
    ControlCharacter,
    #[error("wildcard must be the final segment")]
    WildcardNotLast,
    #[error("parameter name is empty")]
    EmptyParamName,
    #[error("parameter name {0:?} is used twice")]
    DuplicateParamName(String),
}

/// Route registration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("invalid route pattern {pattern:?}: {fault}")]
    InvalidPattern { pattern: String, fault: PatternFault },

    #[error("duplicate route: {method} {pattern}")]
    DuplicateRoute { method: Method, pattern: String },
}

/// One parsed pattern segment
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Must equal the path segment exactly
    Literal(String),
    /// `:name`
    Param(String),
    /// `*` (named `*`) or `*name`
    Wildcard(String),
}

impl Segment {
    fn name(&self) -> Option<&str> {
        match self {
            Segment::Literal(_) => None,
            Segment::Param(name) | Segment::Wildcard(name) => Some(name),
        }
    }
}

/// A validated route pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern {
    segments: Vec<Segment>,
}

impl Pattern {
    /// Parse and validate a pattern
    ///
    /// ```
    /// use ferry_router::{Pattern, Segment};
    ///
    /// let p = Pattern::parse("/files/:bucket/*").unwrap();
    /// assert_eq!(p.segments()[1], Segment::Param("bucket".to_string()));
    /// assert_eq!(p.to_string(), "/files/:bucket/*");
    /// ```
    pub fn parse(raw: &str) -> Result<Self, RouteError> {
        let invalid = |fault| RouteError::InvalidPattern {
            pattern: raw.to_string(),
            fault,
        };

        if raw.is_empty() {
            return Err(invalid(PatternFault::Empty));
        }
        if raw.chars().any(char::is_control) {
            return Err(invalid(PatternFault::ControlCharacter));
        }
        if !raw.starts_with('/') {
            return Err(invalid(PatternFault::MissingLeadingSlash));
        }

        let raw_segments: Vec<&str> = raw.split('/').filter(|s| !s.is_empty()).collect();
        let mut segments = Vec::with_capacity(raw_segments.len());

        for (index, segment) in raw_segments.iter().enumerate() {
            let parsed = if let Some(name) = segment.strip_prefix(':') {
                if name.is_empty() {
                    return Err(invalid(PatternFault::EmptyParamName));
                }
                Segment::Param(name.to_string())
            } else if let Some(name) = segment.strip_prefix('*') {
                if index + 1 != raw_segments.len() {
                    return Err(invalid(PatternFault::WildcardNotLast));
                }
                let name = if name.is_empty() { "*" } else { name };
                Segment::Wildcard(name.to_string())
            } else {
                Segment::Literal(segment.to_string())
            };

            if let Some(name) = parsed.name() {
                if segments.iter().any(|s: &Segment| s.name() == Some(name)) {
                    return Err(invalid(PatternFault::DuplicateParamName(name.to_string())));
                }
            }
            segments.push(parsed);
        }

        Ok(Self { segments })
    }

    /// Parsed segments, left to right
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// True for the root pattern `/`
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => write!(f, "/{s}")?,
                Segment::Param(name) => write!(f, "/:{name}")?,
                Segment::Wildcard(name) if name == "*" => f.write_str("/*")?,
                Segment::Wildcard(name) => write!(f, "/*{name}")?,
            }
        }
        Ok(())
    }
}
