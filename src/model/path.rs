//! Path — hierarchical addressing over the item namespace.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Where a path starts resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathAnchor {
    /// `//…` — the outermost namespace (the repository's root registry).
    Absolute,
    /// `/…` — the namespace root of the item resolving the path.
    RootRelative,
    /// No marker — the item resolving the path.
    Relative,
}

/// A path: an anchor plus an ordered sequence of name segments.
///
/// `.` and `..` are ordinary segments meaning self and parent.
/// Resolution (in [`crate::Repository::find`]) walks segment by segment
/// via child lookup; an unresolvable segment yields `None`, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemPath {
    anchor: PathAnchor,
    segments: SmallVec<[String; 4]>,
}

impl ItemPath {
    pub fn new(anchor: PathAnchor) -> Self {
        Self { anchor, segments: SmallVec::new() }
    }

    /// Parse a path string. Empty segments are skipped, so `a//b` and
    /// trailing slashes are tolerated after the anchor is consumed.
    pub fn parse(s: &str) -> Self {
        let (anchor, rest) = if let Some(rest) = s.strip_prefix("//") {
            (PathAnchor::Absolute, rest)
        } else if let Some(rest) = s.strip_prefix('/') {
            (PathAnchor::RootRelative, rest)
        } else {
            (PathAnchor::Relative, s)
        };

        let segments = rest
            .split('/')
            .filter(|seg| !seg.is_empty())
            .map(str::to_owned)
            .collect();

        Self { anchor, segments }
    }

    pub fn anchor(&self) -> PathAnchor {
        self.anchor
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn push(&mut self, segment: impl Into<String>) {
        self.segments.push(segment.into());
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl std::str::FromStr for ItemPath {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl std::fmt::Display for ItemPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.anchor {
            PathAnchor::Absolute => write!(f, "//")?,
            PathAnchor::RootRelative => write!(f, "/")?,
            PathAnchor::Relative => {}
        }
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}
