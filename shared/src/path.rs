use std::{fmt, str::FromStr};

use thiserror::Error;

/// Errors produced while parsing a [`Path`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// Two separators with nothing between them, or a trailing separator
    #[error("Path '{path}' contains an empty segment")]
    EmptySegment { path: String },
}

/// A route from a node to one of its (possibly nested) slots.
///
/// Segments are resolved against the kind of node they land on: a struct
/// field name, a mapping key, or a decimal sequence index. The empty path
/// addresses the starting node itself.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a dot separated path such as `players.abc123.score`
    pub fn parse(path: &str) -> Result<Self, PathError> {
        if path.is_empty() {
            return Ok(Self::new());
        }
        let mut segments = Vec::new();
        for segment in path.split('.') {
            if segment.is_empty() {
                return Err(PathError::EmptySegment {
                    path: path.to_string(),
                });
            }
            segments.push(segment.to_string());
        }
        Ok(Self { segments })
    }

    pub fn then(mut self, segment: impl ToString) -> Self {
        self.segments.push(segment.to_string());
        self
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Splits off the last segment, returning the parent path and the segment
    pub fn split_last(&self) -> Option<(Path, &str)> {
        let (last, parent) = self.segments.split_last()?;
        Some((
            Path {
                segments: parent.to_vec(),
            },
            last.as_str(),
        ))
    }
}

impl FromStr for Path {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Path::parse(s)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}
