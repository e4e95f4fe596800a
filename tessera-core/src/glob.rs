//! Wildcard matching for provider, type and name predicates.
//!
//! Patterns use `%` as a wildcard for any run of characters, mirroring SQL
//! `LIKE`. Comparison ignores case so that predicates agree with the
//! `COLLATE NOCASE` columns the stores persist names in.

/// Wildcard character understood by [`wildcard_matches`].
pub const WILDCARD: char = '%';

/// Return whether `value` matches `pattern`.
///
/// # Examples
///
/// ```
/// use tessera_core::wildcard_matches;
///
/// assert!(wildcard_matches("road%", "Roads"));
/// assert!(wildcard_matches("%ing%", "buildings"));
/// assert!(!wildcard_matches("road", "roads"));
/// ```
#[must_use]
pub fn wildcard_matches(pattern: &str, value: &str) -> bool {
    let wanted: Vec<char> = pattern.chars().flat_map(char::to_lowercase).collect();
    let actual: Vec<char> = value.chars().flat_map(char::to_lowercase).collect();

    let mut p = 0;
    let mut v = 0;
    // Position of the last wildcard and the value index it was tried against.
    let mut backtrack: Option<(usize, usize)> = None;

    while v < actual.len() {
        match (wanted.get(p), actual.get(v)) {
            (Some(&WILDCARD), _) => {
                backtrack = Some((p, v));
                p += 1;
            }
            (Some(left), Some(right)) if left == right => {
                p += 1;
                v += 1;
            }
            _ => match backtrack {
                Some((star, resume)) => {
                    p = star + 1;
                    v = resume + 1;
                    backtrack = Some((star, resume + 1));
                }
                None => return false,
            },
        }
    }

    wanted.iter().skip(p).all(|c| *c == WILDCARD)
}

/// Return whether `value` matches any of `patterns`.
///
/// An empty pattern collection matches nothing; callers treat "no
/// predicate" separately.
pub fn matches_any<'a, I>(patterns: I, value: &str) -> bool
where
    I: IntoIterator<Item = &'a String>,
{
    patterns
        .into_iter()
        .any(|pattern| wildcard_matches(pattern, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case("roads", "roads", true)]
    #[case("ROADS", "roads", true)]
    #[case("road%", "roads", true)]
    #[case("%s", "roads", true)]
    #[case("r%d%s", "roads", true)]
    #[case("%", "", true)]
    #[case("", "", true)]
    #[case("road", "roads", false)]
    #[case("%x%", "roads", false)]
    #[case("a%a", "a", false)]
    fn wildcard_cases(#[case] pattern: &str, #[case] value: &str, #[case] expected: bool) {
        assert_eq!(wildcard_matches(pattern, value), expected);
    }

    #[rstest]
    fn matches_any_requires_one_hit() {
        let patterns = vec![String::from("bus%"), String::from("%ings")];
        assert!(matches_any(&patterns, "buildings"));
        assert!(!matches_any(&patterns, "roads"));
        assert!(!matches_any(&Vec::<String>::new(), "roads"));
    }

    proptest! {
        #[test]
        fn literal_patterns_match_themselves(value in "[a-zA-Z0-9 _.-]{0,24}") {
            prop_assert!(wildcard_matches(&value, &value));
        }

        #[test]
        fn prefix_patterns_match_extensions(prefix in "[a-z]{0,8}", suffix in "[a-z]{0,8}") {
            let pattern = format!("{prefix}%");
            let value = format!("{prefix}{suffix}");
            prop_assert!(wildcard_matches(&pattern, &value));
        }
    }
}
