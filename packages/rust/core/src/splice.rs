//! Locating and replacing element regions inside a sample document.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::{LazyLock, Mutex, PoisonError};

use regex::{Regex, RegexBuilder};

/// Compiled region patterns keyed by upper-cased tag name.
static TAG_PATTERNS: LazyLock<Mutex<HashMap<String, Regex>>> = LazyLock::new(Default::default);

/// Byte offsets of one `<TAG ...>...</TAG>` occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    /// From `<` of the opening tag to just past `>` of the closing tag.
    pub outer: Range<usize>,
    /// Content between the opening and closing tags.
    pub inner: Range<usize>,
}

/// Finds element regions in XML text.
pub trait RegionSplice {
    /// First region for `tag`, if any.
    fn find(&self, document: &str, tag: &str) -> Option<Region>;

    /// Replace the whole first `tag` region. `None` when the region is absent.
    fn replace_outer(&self, document: &str, tag: &str, replacement: &str) -> Option<String> {
        let region = self.find(document, tag)?;
        Some(splice(document, region.outer, replacement))
    }

    /// Replace only the content of the first `tag` region, keeping both tags.
    fn replace_inner(&self, document: &str, tag: &str, content: &str) -> Option<String> {
        let region = self.find(document, tag)?;
        Some(splice(document, region.inner, content))
    }

    /// Text of the first `tag` region, tags included.
    fn extract<'d>(&self, document: &'d str, tag: &str) -> Option<&'d str> {
        self.find(document, tag).map(|region| &document[region.outer])
    }
}

fn splice(document: &str, range: Range<usize>, replacement: &str) -> String {
    let mut out = String::with_capacity(document.len() + replacement.len());
    out.push_str(&document[..range.start]);
    out.push_str(replacement);
    out.push_str(&document[range.end..]);
    out
}

/// Regex-based splicing: case-insensitive, non-greedy, first occurrence.
///
/// Elements are not nesting-aware; the first closing tag ends the region.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternSplice;

impl RegionSplice for PatternSplice {
    fn find(&self, document: &str, tag: &str) -> Option<Region> {
        let re = tag_pattern(tag)?;
        let caps = re.captures(document)?;
        let outer = caps.get(0)?;
        let inner = caps.get(2)?;
        Some(Region {
            outer: outer.range(),
            inner: inner.range(),
        })
    }
}

/// Region pattern for `tag`, compiled once per tag name.
fn tag_pattern(tag: &str) -> Option<Regex> {
    let key = tag.to_ascii_uppercase();
    let mut cache = TAG_PATTERNS.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(re) = cache.get(&key) {
        return Some(re.clone());
    }
    let escaped = regex::escape(&key);
    let re = RegexBuilder::new(&format!(r"(<{escaped}\b[^>]*>)(.*?)</{escaped}\s*>"))
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .ok()?;
    cache.insert(key, re.clone());
    Some(re)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<BMECAT><header>old</header>
<T_NEW_CATALOG prev_version="0"><ARTICLE mode="new"><A/></ARTICLE><ARTICLE_TO_GROUP_MAP/><ARTICLE>2</ARTICLE></T_NEW_CATALOG></BMECAT>"#;

    #[test]
    fn finds_case_insensitively() {
        let region = PatternSplice.find(DOC, "HEADER").expect("header region");
        assert_eq!(&DOC[region.outer], "<header>old</header>");
        assert_eq!(&DOC[region.inner], "old");
    }

    #[test]
    fn extract_first_article_only() {
        let article = PatternSplice.extract(DOC, "ARTICLE").expect("article");
        assert_eq!(article, r#"<ARTICLE mode="new"><A/></ARTICLE>"#);
    }

    #[test]
    fn replace_inner_keeps_opening_tag() {
        let out = PatternSplice
            .replace_inner(DOC, "T_NEW_CATALOG", "NEW")
            .expect("region present");
        assert!(out.contains(r#"<T_NEW_CATALOG prev_version="0">NEW</T_NEW_CATALOG>"#));
    }

    #[test]
    fn replace_outer_swaps_region() {
        let out = PatternSplice
            .replace_outer(DOC, "HEADER", "<HEADER>new</HEADER>")
            .expect("region present");
        assert!(out.starts_with("<BMECAT><HEADER>new</HEADER>\n"));
    }

    #[test]
    fn missing_region_is_none() {
        assert!(PatternSplice.find("<BMECAT/>", "T_NEW_CATALOG").is_none());
        assert!(PatternSplice.replace_outer("<BMECAT/>", "HEADER", "x").is_none());
    }

    #[test]
    fn patterns_are_compiled_once_per_tag() {
        let first = tag_pattern("Feature_Group").expect("pattern");
        let second = tag_pattern("FEATURE_GROUP").expect("pattern");
        assert_eq!(first.as_str(), second.as_str());

        let cache = TAG_PATTERNS.lock().expect("cache lock");
        assert!(cache.contains_key("FEATURE_GROUP"));
        assert!(!cache.contains_key("Feature_Group"));
    }

    #[test]
    fn cached_pattern_still_matches_lowercase_tags() {
        assert!(PatternSplice.find(DOC, "HEADER").is_some());
        let region = PatternSplice.find(DOC, "header").expect("cached header pattern");
        assert_eq!(&DOC[region.inner], "old");
    }
}
