use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A `major.minor` item version. Items either carry both halves or none.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

impl Version {
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Build a version from the two halves as found in a bundle manifest.
    ///
    /// Both absent yields `None`. When only one half is present the other reads as `0`.
    pub fn from_parts(major: Option<&str>, minor: Option<&str>) -> Result<Option<Self>, Error> {
        if major.is_none() && minor.is_none() {
            return Ok(None);
        }
        let major = parse_component(major.unwrap_or("0"))?;
        let minor = parse_component(minor.unwrap_or("0"))?;
        Ok(Some(Version { major, minor }))
    }
}

fn parse_component(value: &str) -> Result<u32, Error> {
    value
        .trim()
        .parse::<u32>()
        .map_err(|_| Error::InvalidArgument(format!("Version component '{}' is not a number", value)))
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = s.trim().split_once('.').ok_or_else(|| {
            Error::InvalidArgument(format!("Version '{}' is not in #.# format", s))
        })?;
        Ok(Version {
            major: parse_component(major)?,
            minor: parse_component(minor)?,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Human readable version label used by listings.
pub fn format_version(version: Option<Version>) -> String {
    match version {
        Some(v) => format!("v{}", v),
        None => "No Version".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_major_minor() {
        let v: Version = "1.2".parse().unwrap();
        assert_eq!(v, Version::new(1, 2));
        assert_eq!(v.to_string(), "1.2");
    }

    #[test]
    fn test_parse_without_dot_is_invalid() {
        let err = "5".parse::<Version>().unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for input in ["1.2.3", "a.b", "1.", ".1", "", "-1.0"] {
            assert!(
                matches!(input.parse::<Version>(), Err(Error::InvalidArgument(_))),
                "expected '{}' to be rejected",
                input
            );
        }
    }

    #[test]
    fn test_from_parts() {
        assert_eq!(Version::from_parts(None, None).unwrap(), None);
        assert_eq!(
            Version::from_parts(Some("3"), Some("4")).unwrap(),
            Some(Version::new(3, 4))
        );
        assert_eq!(
            Version::from_parts(Some("3"), None).unwrap(),
            Some(Version::new(3, 0))
        );
        assert!(Version::from_parts(Some("x"), Some("1")).is_err());
    }

    #[test]
    fn test_format_version() {
        assert_eq!(format_version(None), "No Version");
        assert_eq!(format_version(Some(Version::new(0, 9))), "v0.9");
    }
}
