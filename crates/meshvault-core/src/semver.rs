//! Semantic version parsing and ordering

use crate::{MeshvaultError, MeshvaultResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A `major.minor.patch` version.
///
/// Field order matters: the derived `Ord` compares major, then minor, then patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SemVer {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl SemVer {
    /// Create a new version
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a strict `major.minor.patch` string
    pub fn parse(text: &str) -> MeshvaultResult<Self> {
        let mut parts = text.split('.');
        let mut next = |name: &str| -> MeshvaultResult<u64> {
            let part = parts.next().ok_or_else(|| {
                MeshvaultError::Format(format!("'{}' is missing the {} component", text, name))
            })?;
            parse_component(text, part)
        };

        let major = next("major")?;
        let minor = next("minor")?;
        let patch = next("patch")?;

        if parts.next().is_some() {
            return Err(MeshvaultError::Format(format!(
                "'{}' has more than three components",
                text
            )));
        }

        Ok(Self::new(major, minor, patch))
    }

    /// Increment the patch component
    pub fn bump_patch(self) -> MeshvaultResult<Self> {
        let patch = increment(self, self.patch)?;
        Ok(Self::new(self.major, self.minor, patch))
    }

    /// Increment the minor component and reset patch
    pub fn bump_minor(self) -> MeshvaultResult<Self> {
        let minor = increment(self, self.minor)?;
        Ok(Self::new(self.major, minor, 0))
    }

    /// Increment the major component and reset minor and patch
    pub fn bump_major(self) -> MeshvaultResult<Self> {
        let major = increment(self, self.major)?;
        Ok(Self::new(major, 0, 0))
    }
}

fn increment(version: SemVer, component: u64) -> MeshvaultResult<u64> {
    component.checked_add(1).ok_or_else(|| {
        MeshvaultError::InvalidOperation(format!("{} cannot be bumped any further", version))
    })
}

fn parse_component(text: &str, part: &str) -> MeshvaultResult<u64> {
    // u64::from_str accepts a leading '+', which is not part of the grammar
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MeshvaultError::Format(format!(
            "'{}' is not a major.minor.patch version",
            text
        )));
    }
    part.parse::<u64>()
        .map_err(|e| MeshvaultError::Format(format!("'{}': {}", text, e)))
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SemVer {
    type Err = MeshvaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for SemVer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SemVer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        SemVer::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// Compare two version strings that may not be valid SemVer.
///
/// Parseable versions order by SemVer and sort before unparseable ones;
/// unparseable versions compare lexicographically among themselves.
pub fn compare_version_strings(a: &str, b: &str) -> Ordering {
    match (SemVer::parse(a), SemVer::parse(b)) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        (Ok(_), Err(_)) => Ordering::Greater,
        (Err(_), Ok(_)) => Ordering::Less,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Sort version strings newest first, unparseable entries last
pub fn sort_versions_descending(versions: &mut [String]) {
    versions.sort_by(|a, b| match (SemVer::parse(a), SemVer::parse(b)) {
        (Ok(a), Ok(b)) => b.cmp(&a),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    });
}

/// Strictly newer, or `false` when either side is unparseable
pub fn is_newer(candidate: &str, current: &str) -> bool {
    match (SemVer::parse(candidate), SemVer::parse(current)) {
        (Ok(candidate), Ok(current)) => candidate > current,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        assert_eq!(SemVer::parse("1.2.3").unwrap(), SemVer::new(1, 2, 3));
        assert_eq!(SemVer::parse("0.0.0").unwrap(), SemVer::new(0, 0, 0));
        assert_eq!(SemVer::parse("10.20.300").unwrap(), SemVer::new(10, 20, 300));
    }

    #[test]
    fn test_parse_rejects_bad_shapes() {
        for bad in [
            "", "1", "1.2", "1.2.3.4", "1.2.x", "-1.2.3", "1.-2.3", "+1.2.3", "1..3", " 1.2.3",
            "1.2.3 ", "v1.2.3", "1.2.3-beta", "(unknown)",
        ] {
            let err = SemVer::parse(bad).unwrap_err();
            assert!(matches!(err, MeshvaultError::Format(_)), "{bad:?} parsed");
        }
    }

    #[test]
    fn test_round_trip() {
        for major in [0, 1, 7, 42] {
            for minor in [0, 3, 19] {
                for patch in [0, 1, 250] {
                    let v = SemVer::new(major, minor, patch);
                    assert_eq!(SemVer::parse(&v.to_string()).unwrap(), v);
                }
            }
        }
    }

    #[test]
    fn test_total_order() {
        let ordered: Vec<SemVer> = ["1.0.0", "1.0.1", "1.1.0", "2.0.0"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();

        for (i, a) in ordered.iter().enumerate() {
            for (j, b) in ordered.iter().enumerate() {
                assert_eq!(a.cmp(b), i.cmp(&j));
            }
        }
        // minor beats patch, major beats minor
        assert!(SemVer::new(1, 1, 0) > SemVer::new(1, 0, 99));
        assert!(SemVer::new(2, 0, 0) > SemVer::new(1, 99, 99));
    }

    #[test]
    fn test_bumps() {
        let v = SemVer::new(1, 4, 2);
        assert_eq!(v.bump_patch().unwrap().to_string(), "1.4.3");
        assert_eq!(v.bump_minor().unwrap().to_string(), "1.5.0");
        assert_eq!(v.bump_major().unwrap().to_string(), "2.0.0");
    }

    #[test]
    fn test_bump_at_component_limit() {
        let v = SemVer::parse("1.0.18446744073709551615").unwrap();
        assert!(matches!(v.bump_patch(), Err(MeshvaultError::InvalidOperation(_))));
        assert_eq!(v.bump_minor().unwrap(), SemVer::new(1, 1, 0));

        let v = SemVer::new(u64::MAX, u64::MAX, 0);
        assert!(v.bump_minor().is_err());
        assert!(v.bump_major().is_err());
    }

    #[test]
    fn test_sort_versions_descending() {
        let mut versions: Vec<String> = ["1.0.0", "legacy-b", "2.0.0", "legacy-a", "1.10.0"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        sort_versions_descending(&mut versions);
        assert_eq!(
            versions,
            vec!["2.0.0", "1.10.0", "1.0.0", "legacy-a", "legacy-b"]
        );
    }

    #[test]
    fn test_is_newer_undecidable() {
        assert!(is_newer("1.2.0", "1.1.9"));
        assert!(!is_newer("1.2.0", "1.2.0"));
        assert!(!is_newer("1.2.0", "(unknown)"));
        assert!(!is_newer("latest", "1.0.0"));
    }

    #[test]
    fn test_serde_as_string() {
        let v = SemVer::new(3, 1, 4);
        assert_eq!(serde_json::to_string(&v).unwrap(), "\"3.1.4\"");
        let back: SemVer = serde_json::from_str("\"3.1.4\"").unwrap();
        assert_eq!(back, v);
        assert!(serde_json::from_str::<SemVer>("\"3.1\"").is_err());
    }
}
