use std::sync::OnceLock;

use regex::Regex;
use semver::Version;

/// Normalize a raw tag or reported version string to canonical semver form.
///
/// Lenient: strips leading whitespace, `v`/`V` and `=`, and pads partial
/// versions like "13" or "13.2" with zeros. Returns None when nothing
/// parseable remains.
///
/// Examples:
/// - "v13.2.0" -> "13.2.0"
/// - "12.119" -> "12.119.0"
/// - "hotfix" -> None
pub fn clean(version: &str) -> Option<String> {
    let trimmed = version.trim().trim_start_matches(['v', 'V', '=']);
    parse_lenient(trimmed).map(|v| v.to_string())
}

/// Coerce an arbitrary string to the nearest valid version by extracting
/// the first numeric-version substring, dropping any pre-release or build
/// suffix. Used for the fuzzy prefix pass when `clean` output misses.
///
/// Examples:
/// - "12.0.0-beta+build7" -> 12.0.0
/// - "misskey 13.2" -> 13.2.0
pub fn coerce(version: &str) -> Option<Version> {
    static COERCE_RE: OnceLock<Regex> = OnceLock::new();
    let re = COERCE_RE.get_or_init(|| {
        Regex::new(r"(\d{1,16})(?:\.(\d{1,16}))?(?:\.(\d{1,16}))?").expect("valid coerce regex")
    });

    let caps = re.captures(version)?;
    let major = caps.get(1)?.as_str().parse().ok()?;
    let minor = caps
        .get(2)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);
    let patch = caps
        .get(3)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);

    Some(Version::new(major, minor, patch))
}

/// Whether a normalized version string carries a pre-release tag.
pub fn is_prerelease(version: &str) -> bool {
    Version::parse(version).is_ok_and(|v| !v.pre.is_empty())
}

fn parse_lenient(version: &str) -> Option<Version> {
    if let Ok(parsed) = Version::parse(version) {
        return Some(parsed);
    }

    let parts: Vec<&str> = version.split('.').collect();
    let padded = match parts.len() {
        1 => format!("{}.0.0", parts[0]),
        2 => format!("{}.{}.0", parts[0], parts[1]),
        _ => return None,
    };
    Version::parse(&padded).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("13.2.0", Some("13.2.0"))]
    #[case("v13.2.0", Some("13.2.0"))]
    #[case(" v12.119.1 ", Some("12.119.1"))]
    #[case("13.0.0-beta.1", Some("13.0.0-beta.1"))]
    #[case("10.102.606-m544", Some("10.102.606-m544"))]
    #[case("12.119", Some("12.119.0"))]
    #[case("13", Some("13.0.0"))]
    #[case("hotfix", None)]
    #[case("", None)]
    fn clean_normalizes_tags(#[case] input: &str, #[case] expected: Option<&str>) {
        assert_eq!(clean(input), expected.map(|s| s.to_string()));
    }

    #[rstest]
    #[case("12.0.0-beta+build7", Some(Version::new(12, 0, 0)))]
    #[case("misskey 13.2", Some(Version::new(13, 2, 0)))]
    #[case("11.37.1-20221202185541", Some(Version::new(11, 37, 1)))]
    #[case("no digits here", None)]
    fn coerce_extracts_first_numeric_version(
        #[case] input: &str,
        #[case] expected: Option<Version>,
    ) {
        assert_eq!(coerce(input), expected);
    }

    #[rstest]
    #[case("13.0.0-beta.1", true)]
    #[case("13.0.0", false)]
    #[case("not-a-version", false)]
    fn is_prerelease_detects_prerelease_tags(#[case] input: &str, #[case] expected: bool) {
        assert_eq!(is_prerelease(input), expected);
    }
}
