//! Version ordering
//!
//! Versions are opaque strings ordered by:
//! 1. An optional `epoch:` integer prefix (default 0), compared numerically
//! 2. A left-to-right walk where runs of ASCII digits compare by numeric value
//!    (arbitrary precision, ties go to the longer run sorting first) and every
//!    other character compares by code point
//! 3. A string that is a prefix of the other sorts first

use std::cmp::Ordering;
use std::fmt;

/// Compare two version strings.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let (epoch_a, body_a) = split_epoch(a);
    let (epoch_b, body_b) = split_epoch(b);

    compare_numeric(epoch_a, epoch_b).then_with(|| compare_body(body_a, body_b))
}

/// Pick the greatest version from an iterator, keeping the first of equal
/// versions.
pub fn latest_version<'a, I>(versions: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    versions.into_iter().fold(None, |best, candidate| match best {
        Some(current) if compare_versions(candidate, current) != Ordering::Greater => {
            Some(current)
        }
        _ => Some(candidate),
    })
}

fn split_epoch(version: &str) -> (&str, &str) {
    match version.split_once(':') {
        Some((epoch, body)) if !epoch.is_empty() && epoch.bytes().all(|b| b.is_ascii_digit()) => {
            (epoch, body)
        }
        _ => ("0", version),
    }
}

/// Compare two digit strings by numeric value without parsing into a
/// fixed-width integer.
fn compare_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn take_digits(s: &str) -> (&str, &str) {
    let end = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    s.split_at(end)
}

fn compare_body(a: &str, b: &str) -> Ordering {
    let mut left = a;
    let mut right = b;

    loop {
        match (left.chars().next(), right.chars().next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let (run_l, rest_l) = take_digits(left);
                let (run_r, rest_r) = take_digits(right);
                let ord = compare_numeric(run_l, run_r)
                    .then_with(|| run_r.len().cmp(&run_l.len()));
                if ord != Ordering::Equal {
                    return ord;
                }
                left = rest_l;
                right = rest_r;
            }
            (Some(l), Some(r)) => {
                if l != r {
                    return l.cmp(&r);
                }
                left = &left[l.len_utf8()..];
                right = &right[r.len_utf8()..];
            }
        }
    }
}

/// A version string carrying the version order.
///
/// Equality follows the order, so `0:1.0` equals `1.0`.
#[derive(Debug, Clone)]
pub struct Version(String);

impl Version {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_versions(&self.0, &other.0)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Version {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lt(a: &str, b: &str) {
        assert_eq!(compare_versions(a, b), Ordering::Less, "{} < {}", a, b);
        assert_eq!(compare_versions(b, a), Ordering::Greater, "{} > {}", b, a);
    }

    #[test]
    fn test_numeric_segments() {
        lt("1.0", "10.0");
        lt("1.1", "1.10");
        lt("1.9", "1.10");
        lt("2.0.0", "10.0.0");
        lt("25.0.0.Final", "25.0.1.Final");
    }

    #[test]
    fn test_qualifiers_compare_by_code_point() {
        lt("1.0.0.Final", "1.0.0.RC1");
        lt("1.0.0.Beta1", "1.0.0.Final");
        lt("1.0.0.CR1", "1.0.0.CR2");
    }

    #[test]
    fn test_prefix_sorts_first() {
        lt("1.0", "1.0.1");
        lt("1.0", "1.0.Final");
        lt("", "0");
    }

    #[test]
    fn test_epoch() {
        lt("9.9", "1:1.0");
        lt("1:2.0", "2:1.0");
        assert_eq!(compare_versions("0:1.0", "1.0"), Ordering::Equal);
        // a non-numeric prefix is not an epoch
        lt("a:2", "b:1");
    }

    #[test]
    fn test_digit_run_length_tie_break() {
        lt("01", "1");
        lt("1.01", "1.1");
        assert_eq!(compare_versions("1.01", "1.01"), Ordering::Equal);
    }

    #[test]
    fn test_big_numbers() {
        lt("1.99999999999999999999999", "1.100000000000000000000000");
        lt("18446744073709551615", "18446744073709551616");
    }

    #[test]
    fn test_totality_over_sample() {
        let sample = [
            "1", "1.0", "1.0.0", "01.0", "1.0.Final", "1.0.RC1", "1:0", "0:1", "10", "1.10",
            "1.9", "1-SNAPSHOT", "1.0-alpha", "", "a", "1a", "1.0.0.Final-redhat-00001",
        ];
        for a in sample {
            assert_eq!(compare_versions(a, a), Ordering::Equal);
            for b in sample {
                let ab = compare_versions(a, b);
                let ba = compare_versions(b, a);
                assert_eq!(ab, ba.reverse(), "antisymmetry {} {}", a, b);
                for c in sample {
                    if ab == Ordering::Less && compare_versions(b, c) == Ordering::Less {
                        assert_eq!(compare_versions(a, c), Ordering::Less, "{} {} {}", a, b, c);
                    }
                }
            }
        }
    }

    #[test]
    fn test_latest_version() {
        let versions = ["1.2.0", "1.10.0", "1.9.5"];
        assert_eq!(latest_version(versions), Some("1.10.0"));
        assert_eq!(latest_version(Vec::<&str>::new()), None);
        // equal versions keep the first
        assert_eq!(latest_version(["0:1.0", "1.0"]), Some("0:1.0"));
    }

    #[test]
    fn test_version_newtype_ordering() {
        let mut versions: Vec<Version> = ["1.10", "1.2", "1.1"].into_iter().map(Version::from).collect();
        versions.sort();
        let sorted: Vec<&str> = versions.iter().map(Version::as_str).collect();
        assert_eq!(sorted, vec!["1.1", "1.2", "1.10"]);
    }
}
