//! Declarative path patterns.
//!
//! # Syntax
//! - Segments are separated by `/`
//! - `:name` declares a named parameter segment
//! - A final `*` segment accepts any remaining path
//! - Everything else is a literal segment, compared case-sensitively
//!
//! # Design Decisions
//! - Rendering is the exact inverse of parsing, so a parsed pattern can be
//!   used as a metric label without keeping the source string around
//! - Matching is a single left-to-right scan, no regex
//! - A parameter must capture a non-empty segment

use std::fmt::{self, Write as _};
use std::str::FromStr;

use thiserror::Error;

/// Error raised while parsing a pattern declaration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    /// A `:` segment with no parameter name.
    #[error("pattern '{pattern}' has an unnamed parameter at segment {position}")]
    EmptyParam { pattern: String, position: usize },

    /// A `*` segment that is not the last segment.
    #[error("pattern '{pattern}' has a wildcard at segment {position}; '*' is only allowed last")]
    MisplacedWildcard { pattern: String, position: usize },
}

/// One segment of a [`PathPattern`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Must equal the request segment exactly.
    Literal(String),
    /// Captures the request segment under the given name.
    Param(String),
}

/// A parsed path pattern such as `/users/:id/files/*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    segments: Vec<Segment>,
    trailing: bool,
}

impl PathPattern {
    /// Parse a pattern declaration.
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        let raw: Vec<&str> = pattern.split('/').collect();
        let last = raw.len() - 1;

        let mut segments = Vec::with_capacity(raw.len());
        let mut trailing = false;

        for (position, segment) in raw.into_iter().enumerate() {
            if segment == "*" {
                if position != last {
                    return Err(PatternError::MisplacedWildcard {
                        pattern: pattern.to_string(),
                        position,
                    });
                }
                trailing = true;
            } else if let Some(name) = segment.strip_prefix(':') {
                if name.is_empty() {
                    return Err(PatternError::EmptyParam {
                        pattern: pattern.to_string(),
                        position,
                    });
                }
                segments.push(Segment::Param(name.to_string()));
            } else {
                segments.push(Segment::Literal(segment.to_string()));
            }
        }

        Ok(Self { segments, trailing })
    }

    /// Parse every pattern in declaration order, stopping at the first error.
    pub fn parse_all<I, S>(patterns: I) -> Result<Vec<Self>, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        patterns
            .into_iter()
            .map(|p| Self::parse(p.as_ref()))
            .collect()
    }

    /// The pattern's segments, without the trailing wildcard.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Whether the pattern accepts an arbitrary remaining path.
    pub fn is_trailing(&self) -> bool {
        self.trailing
    }

    /// Match a request path against this pattern.
    ///
    /// Returns the captured parameters on success.
    pub fn match_path<'p, 's>(&'p self, path: &'s str) -> Option<PathMatch<'p, 's>> {
        let mut rest = Some(path);
        let mut params = Vec::new();

        for segment in &self.segments {
            let current = rest?;
            let (head, tail) = match current.split_once('/') {
                Some((head, tail)) => (head, Some(tail)),
                None => (current, None),
            };

            match segment {
                Segment::Literal(literal) => {
                    if head != literal {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    if head.is_empty() {
                        return None;
                    }
                    params.push((name.as_str(), head));
                }
            }

            rest = tail;
        }

        if self.trailing {
            return Some(PathMatch {
                params,
                trailing: Some(rest.unwrap_or("")),
            });
        }

        match rest {
            None => Some(PathMatch {
                params,
                trailing: None,
            }),
            Some(_) => None,
        }
    }

    /// Returns true if `path` matches this pattern.
    pub fn matches(&self, path: &str) -> bool {
        self.match_path(path).is_some()
    }
}

impl FromStr for PathPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Renders the canonical declaration, identical to the parsed input.
impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_char('/')?;
            }
            match segment {
                Segment::Literal(literal) => f.write_str(literal)?,
                Segment::Param(name) => write!(f, ":{}", name)?,
            }
        }

        if self.trailing {
            if !self.segments.is_empty() {
                f.write_char('/')?;
            }
            f.write_char('*')?;
        }

        Ok(())
    }
}

/// Result of a successful [`PathPattern::match_path`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMatch<'p, 's> {
    params: Vec<(&'p str, &'s str)>,
    trailing: Option<&'s str>,
}

impl<'p, 's> PathMatch<'p, 's> {
    /// Value captured for the named parameter.
    pub fn param(&self, name: &str) -> Option<&'s str> {
        self.params
            .iter()
            .find(|(param, _)| *param == name)
            .map(|(_, value)| *value)
    }

    /// All captured parameters in declaration order.
    pub fn params(&self) -> &[(&'p str, &'s str)] {
        &self.params
    }

    /// Remaining path accepted by a trailing wildcard.
    pub fn trailing(&self) -> Option<&'s str> {
        self.trailing
    }
}

/// Find the first pattern, in declaration order, that matches `path`.
pub fn first_match<'p>(patterns: &'p [PathPattern], path: &str) -> Option<&'p PathPattern> {
    patterns.iter().find(|pattern| pattern.matches(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_round_trips_declarations() {
        let declarations = [
            "/fixed/path",
            "/path/prefix/*",
            "/path/with/:param",
            "/path/:param/and/prefix/*",
            "*",
            "/",
        ];

        for declaration in declarations {
            let pattern = PathPattern::parse(declaration).unwrap();
            assert_eq!(pattern.to_string(), declaration);
        }
    }

    #[test]
    fn parse_splits_segments() {
        let pattern: PathPattern = "/users/:id/*".parse().unwrap();
        assert_eq!(
            pattern.segments(),
            &[
                Segment::Literal(String::new()),
                Segment::Literal("users".into()),
                Segment::Param("id".into()),
            ]
        );
        assert!(pattern.is_trailing());
    }

    #[test]
    fn parse_rejects_malformed_patterns() {
        assert_eq!(
            PathPattern::parse("/users/:/posts"),
            Err(PatternError::EmptyParam {
                pattern: "/users/:/posts".into(),
                position: 2,
            })
        );
        assert!(matches!(
            PathPattern::parse("/files/*/meta"),
            Err(PatternError::MisplacedWildcard { position: 2, .. })
        ));
    }

    #[test]
    fn literal_patterns_match_exactly() {
        let pattern = PathPattern::parse("/fixed/path").unwrap();
        assert!(pattern.matches("/fixed/path"));
        assert!(!pattern.matches("/fixed/path/"));
        assert!(!pattern.matches("/fixed"));
        assert!(!pattern.matches("/Fixed/path"));
    }

    #[test]
    fn params_capture_segments() {
        let pattern = PathPattern::parse("/users/:id/posts/:post").unwrap();
        let matched = pattern.match_path("/users/42/posts/7").unwrap();
        assert_eq!(matched.param("id"), Some("42"));
        assert_eq!(matched.param("post"), Some("7"));
        assert_eq!(matched.trailing(), None);

        assert!(!pattern.matches("/users//posts/7"));
    }

    #[test]
    fn trailing_wildcard_accepts_rest() {
        let pattern = PathPattern::parse("/static/*").unwrap();
        let matched = pattern.match_path("/static/css/site.css").unwrap();
        assert_eq!(matched.trailing(), Some("css/site.css"));

        assert!(pattern.matches("/static"));
        assert!(!pattern.matches("/statics/x"));

        let any = PathPattern::parse("*").unwrap();
        assert!(any.matches("/whatever/at/all"));
        assert!(any.matches(""));
    }

    #[test]
    fn root_pattern() {
        let root = PathPattern::parse("/").unwrap();
        assert!(root.matches("/"));
        assert!(!root.matches("/a"));
    }

    #[test]
    fn first_match_respects_declaration_order() {
        let patterns = PathPattern::parse_all(["/a/:id", "/a/*"]).unwrap();
        assert_eq!(first_match(&patterns, "/a/5").unwrap().to_string(), "/a/:id");
        assert_eq!(first_match(&patterns, "/a/5/b").unwrap().to_string(), "/a/*");
        assert!(first_match(&patterns, "/b").is_none());

        let reversed = PathPattern::parse_all(["/a/*", "/a/:id"]).unwrap();
        assert_eq!(first_match(&reversed, "/a/5").unwrap().to_string(), "/a/*");
    }
}
