//! Secondary filter over a matched artifact's contained-class list.
//!
//! This is substring containment, not wildcard matching: every `*` in the
//! pattern is stripped before comparing, never interpreted. The pattern
//! `*bar*` therefore selects `com.foo.Bar` because the stripped form `bar`
//! is a case-insensitive substring of the entry, and the pattern `*` selects
//! every entry because stripping leaves the empty string, which every entry
//! contains. Wildcard interpretation happens earlier, in the query layer.

/// Filters a newline-delimited class-path blob down to the entries matching
/// `pattern`, preserving publication order.
///
/// Entries are emitted in dotted form: slashes become dots and one leading
/// dot (the remnant of a leading slash) is stripped. Returns an empty vector
/// when either argument is absent or empty.
pub fn filter_class_names(blob: Option<&str>, pattern: Option<&str>) -> Vec<String> {
    let (Some(blob), Some(pattern)) = (blob, pattern) else {
        return Vec::new();
    };
    if blob.is_empty() || pattern.is_empty() {
        return Vec::new();
    }

    let needle = pattern.replace('*', "").to_lowercase();
    let mut matched = Vec::new();
    for entry in blob.replace('/', ".").split('\n') {
        if entry.is_empty() || !entry.to_lowercase().contains(&needle) {
            continue;
        }
        match entry.strip_prefix('.') {
            Some(stripped) => matched.push(stripped.to_string()),
            None => matched.push(entry.to_string()),
        }
    }
    matched
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_are_case_insensitive_substrings() {
        let blob = "/com/foo/Bar\n/com/foo/Baz\n/org/other/Qux";
        assert_eq!(
            filter_class_names(Some(blob), Some("bar")),
            vec!["com.foo.Bar"]
        );
        assert_eq!(
            filter_class_names(Some(blob), Some("BA")),
            vec!["com.foo.Bar", "com.foo.Baz"]
        );
    }

    #[test]
    fn wildcards_are_stripped_not_interpreted() {
        let blob = "/com/foo/Bar\n/com/foo/Other";
        assert_eq!(
            filter_class_names(Some(blob), Some("*bar*")),
            vec!["com.foo.Bar"]
        );
        // "b*ar" collapses to "bar": the `*` does not have to match anything.
        assert_eq!(
            filter_class_names(Some(blob), Some("b*ar")),
            vec!["com.foo.Bar"]
        );
    }

    #[test]
    fn a_lone_wildcard_selects_every_entry() {
        let blob = "/com/foo/Bar\n/com/foo/Baz";
        assert_eq!(
            filter_class_names(Some(blob), Some("*")),
            vec!["com.foo.Bar", "com.foo.Baz"]
        );
    }

    #[test]
    fn blank_lines_are_never_emitted() {
        let blob = "/com/foo/Bar\n\n/com/foo/Baz\n";
        assert_eq!(
            filter_class_names(Some(blob), Some("*")),
            vec!["com.foo.Bar", "com.foo.Baz"]
        );
    }

    #[test]
    fn entries_are_emitted_in_dotted_form_without_the_leading_dot() {
        assert_eq!(
            filter_class_names(Some("/com/foo/Bar"), Some("bar")),
            vec!["com.foo.Bar"]
        );
        // Entries published without a leading slash keep their shape.
        assert_eq!(
            filter_class_names(Some("com/foo/Bar"), Some("bar")),
            vec!["com.foo.Bar"]
        );
    }

    #[test]
    fn only_one_leading_dot_is_stripped() {
        assert_eq!(
            filter_class_names(Some("//com/foo/Bar"), Some("bar")),
            vec![".com.foo.Bar"]
        );
    }

    #[test]
    fn publication_order_is_preserved() {
        let blob = "/z/Last\n/a/First\n/m/Middle";
        assert_eq!(
            filter_class_names(Some(blob), Some("*")),
            vec!["z.Last", "a.First", "m.Middle"]
        );
    }

    #[test]
    fn absent_or_empty_inputs_yield_nothing() {
        assert!(filter_class_names(None, Some("bar")).is_empty());
        assert!(filter_class_names(Some("/com/foo/Bar"), None).is_empty());
        assert!(filter_class_names(Some(""), Some("bar")).is_empty());
        assert!(filter_class_names(Some("/com/foo/Bar"), Some("")).is_empty());
    }

    #[test]
    fn pattern_matches_against_the_dotted_package_path_too() {
        let blob = "/com/foo/Bar\n/net/foo/Bar";
        assert_eq!(
            filter_class_names(Some(blob), Some("com.foo")),
            vec!["com.foo.Bar"]
        );
    }
}
