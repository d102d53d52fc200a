use std::fmt;
use std::num::ParseIntError;

use lazy_regex::regex;

#[derive(Debug, PartialEq, Eq)]
pub enum ParseVersionError {
    PartParseIntError(ParseIntError),
    RegexMatchFailed,
}

impl From<ParseIntError> for ParseVersionError {
    fn from(err: ParseIntError) -> Self {
        Self::PartParseIntError(err)
    }
}

impl fmt::Display for ParseVersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseVersionError::PartParseIntError(e) => write!(f, "invalid version number: {}", e),
            ParseVersionError::RegexMatchFailed => write!(f, "not a valid package version"),
        }
    }
}

impl std::error::Error for ParseVersionError {}

/// A package version with up to four numeric parts. Build metadata is not kept,
/// since it never participates in identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub revision: u64,
    pub prerelease: Option<String>,
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.revision != 0 {
            write!(f, ".{}", self.revision)?;
        }
        if let Some(pre) = &self.prerelease {
            write!(f, "-{}", pre)?;
        }
        Ok(())
    }
}

pub fn parse_version(v_str: &str) -> Result<PackageVersion, ParseVersionError> {
    let re = regex!(r"^(\d+)(?:\.(\d+))?(?:\.(\d+))?(?:\.(\d+))?(?:-([0-9A-Za-z-]+(?:\.[0-9A-Za-z-]+)*))?(?:\+([0-9A-Za-z-]+(?:\.[0-9A-Za-z-]+)*))?$");

    let m = re
        .captures(v_str.trim())
        .ok_or(ParseVersionError::RegexMatchFailed)?;

    let part = |i: usize| -> Result<u64, ParseIntError> {
        m.get(i).map(|x| x.as_str().parse()).unwrap_or(Ok(0))
    };

    Ok(PackageVersion {
        major: part(1)?,
        minor: part(2)?,
        patch: part(3)?,
        revision: part(4)?,
        prerelease: m.get(5).map(|x| x.as_str().to_owned()),
    })
}

/// Normalizes a version string to its canonical form: `major.minor.patch`, a fourth
/// part only when non-zero, no leading zeros, prerelease kept, metadata dropped.
pub fn normalize_version(v_str: &str) -> Result<String, ParseVersionError> {
    parse_version(v_str).map(|v| v.to_string())
}
