use std::fmt;
use std::str::FromStr;

use anyhow::{Context, anyhow};

/// Protocol version from the request line, e.g. `HTTP/1.1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl Version {
    pub const HTTP_1_0: Version = Version { major: 1, minor: 0 };
    pub const HTTP_1_1: Version = Version { major: 1, minor: 1 };

    /// Whether connections persist unless told otherwise.
    pub fn keep_alive_default(&self) -> bool {
        *self >= Version::HTTP_1_1
    }
}

impl FromStr for Version {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let numbers = s
            .strip_prefix("HTTP/")
            .ok_or(anyhow!("Not an HTTP version: {}", s))?;
        let (major, minor) = numbers
            .split_once('.')
            .ok_or(anyhow!("Version without minor number: {}", s))?;

        Ok(Version {
            major: major.parse().context("Invalid major version")?,
            minor: minor.parse().context("Invalid minor version")?,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP/{}.{}", self.major, self.minor)
    }
}
