use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("invalid version '{input}': {reason}")]
    InvalidFormat { input: String, reason: &'static str },
}

impl VersionError {
    fn invalid(input: &str, reason: &'static str) -> Self {
        Self::InvalidFormat {
            input: input.to_string(),
            reason,
        }
    }
}

/// A release identifier of the form `MAJOR.MINOR.PATCH[-LABEL]`.
///
/// Pre-release labels are opaque: two labelled versions with the same
/// numeric triple compare byte-wise, not by dotted-identifier precedence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    major: u64,
    minor: u64,
    patch: u64,
    pre: Option<String>,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: None,
        }
    }

    /// Parses the strict grammar `["v"] digits "." digits "." digits ["-" token]`.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let body = input.strip_prefix('v').unwrap_or(input);
        let (core, pre) = split_pre_release(input, body)?;

        let mut parts = core.split('.');
        let (Some(major), Some(minor), Some(patch), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(VersionError::invalid(
                input,
                "expected exactly three dot-separated components",
            ));
        };

        Ok(Self {
            major: parse_component(input, major)?,
            minor: parse_component(input, minor)?,
            patch: parse_component(input, patch)?,
            pre,
        })
    }

    /// Accepts `1`, `v1.2` and the like by normalizing before parsing.
    pub fn parse_loose(input: &str) -> Result<Self, VersionError> {
        Self::parse(&normalize(input)?)
    }

    pub fn major(&self) -> u64 {
        self.major
    }

    pub fn minor(&self) -> u64 {
        self.minor
    }

    pub fn patch(&self) -> u64 {
        self.patch
    }

    pub fn pre_release(&self) -> Option<&str> {
        self.pre.as_deref()
    }

    pub fn is_newer_than(&self, other: &Self) -> bool {
        compare(self, other) == Ordering::Greater
    }

    pub fn is_older_than(&self, other: &Self) -> bool {
        compare(self, other) == Ordering::Less
    }

    /// Release tag used to address remote artifacts, e.g. `v1.2.0`.
    pub fn tag(&self) -> String {
        format!("v{self}")
    }
}

/// Total order over versions: numeric triple first, then a release beats
/// any pre-release, then labels compare as raw bytes.
pub fn compare(a: &Version, b: &Version) -> Ordering {
    a.major
        .cmp(&b.major)
        .then(a.minor.cmp(&b.minor))
        .then(a.patch.cmp(&b.patch))
        .then_with(|| match (&a.pre, &b.pre) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(left), Some(right)) => left.as_bytes().cmp(right.as_bytes()),
        })
}

/// Strips a leading `v` and pads missing minor/patch components with zero.
///
/// `normalize("1") == "1.0.0"`, `normalize("v1.2") == "1.2.0"`. The result
/// always satisfies [`Version::parse`], and normalizing twice is a no-op.
pub fn normalize(input: &str) -> Result<String, VersionError> {
    let trimmed = input.trim();
    let body = trimmed.strip_prefix('v').unwrap_or(trimmed);
    let (core, pre) = split_pre_release(input, body)?;

    let components = core.split('.').collect::<Vec<_>>();
    if components.len() > 3 {
        return Err(VersionError::invalid(
            input,
            "more than three dot-separated components",
        ));
    }

    let mut numbers = [0_u64; 3];
    for (slot, component) in numbers.iter_mut().zip(&components) {
        *slot = parse_component(input, component)?;
    }

    let mut normalized = format!("{}.{}.{}", numbers[0], numbers[1], numbers[2]);
    if let Some(label) = pre {
        normalized.push('-');
        normalized.push_str(&label);
    }
    Ok(normalized)
}

fn split_pre_release<'a>(
    input: &str,
    body: &'a str,
) -> Result<(&'a str, Option<String>), VersionError> {
    let Some((core, label)) = body.split_once('-') else {
        return Ok((body, None));
    };
    if label.is_empty() {
        return Err(VersionError::invalid(
            input,
            "empty pre-release label after '-'",
        ));
    }
    if !label
        .bytes()
        .all(|byte| byte.is_ascii_alphanumeric() || byte == b'.')
    {
        return Err(VersionError::invalid(
            input,
            "pre-release label may only contain [A-Za-z0-9.]",
        ));
    }
    Ok((core, Some(label.to_string())))
}

fn parse_component(input: &str, component: &str) -> Result<u64, VersionError> {
    if component.is_empty() || !component.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(VersionError::invalid(input, "non-numeric version component"));
    }
    component
        .parse::<u64>()
        .map_err(|_| VersionError::invalid(input, "version component out of range"))
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(self, other)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre {
            write!(f, "-{pre}")?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.to_string()
    }
}
