//! Virtual path handling
//!
//! Every provider addresses nodes with an absolute, slash-separated virtual
//! path such as `/Documents/About.txt`. The root is `/`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An absolute virtual path inside a provider
///
/// Always starts with `/`, never ends with `/` (except the root itself) and
/// never contains empty, `.` or `..` segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CloudPath(String);

impl CloudPath {
    /// The provider root `/`
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Parse and normalize a path
    ///
    /// A missing leading slash is added, repeated slashes and `.` segments are
    /// dropped. `..` is rejected since virtual paths never escape the root.
    pub fn new(raw: &str) -> Result<Self> {
        let mut segments = Vec::new();
        for segment in raw.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    return Err(Error::InvalidPath(format!(
                        "'{raw}' must not contain '..' segments"
                    )));
                }
                s => segments.push(s),
            }
        }
        Self::from_segments(segments)
    }

    /// Build a path from already split segments
    pub fn from_segments<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut path = String::new();
        for segment in segments {
            let segment = segment.as_ref();
            if segment.is_empty() || segment == "." || segment == ".." || segment.contains('/') {
                return Err(Error::InvalidPath(format!(
                    "invalid path segment '{segment}'"
                )));
            }
            path.push('/');
            path.push_str(segment);
        }
        if path.is_empty() {
            path.push('/');
        }
        Ok(Self(path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Path segments from the root down, empty for the root
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Last segment, `None` for the root
    pub fn file_name(&self) -> Option<&str> {
        self.segments().last()
    }

    /// Append a single child name
    pub fn join(&self, name: &str) -> Result<CloudPath> {
        Self::from_segments(self.segments().chain(std::iter::once(name)))
    }
}

impl Default for CloudPath {
    fn default() -> Self {
        Self::root()
    }
}

impl fmt::Display for CloudPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CloudPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for CloudPath {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(&value)
    }
}

impl From<CloudPath> for String {
    fn from(path: CloudPath) -> Self {
        path.0
    }
}

impl AsRef<str> for CloudPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
