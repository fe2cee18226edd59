use crate::TextItem;

#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub page_number: usize,
    pub text: String,
}

impl PageText {
    pub fn from_items(page_number: usize, items: &[TextItem]) -> Self {
        let text = items
            .iter()
            .map(|item| item.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Self { page_number, text }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchMatch {
    pub page_number: usize,
    pub snippet: String,
    /// Character offset of the match within the page text.
    pub match_offset: usize,
}

/// Extracted text for every page of the current render pass, in page order.
#[derive(Debug, Default)]
pub struct TextIndex {
    pages: Vec<PageText>,
}

impl TextIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.pages.clear();
    }

    pub fn replace(&mut self, mut pages: Vec<PageText>) {
        pages.sort_by_key(|page| page.page_number);
        pages.dedup_by_key(|page| page.page_number);
        self.pages = pages;
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn pages(&self) -> &[PageText] {
        &self.pages
    }

    /// First case-insensitive occurrence per page.
    pub fn search(&self, query: &str, radius: usize) -> Vec<SearchMatch> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }

        self.pages
            .iter()
            .filter_map(|page| {
                let (start, end) = find_ignore_case(&page.text, query)?;
                Some(build_match(page, start, end, radius))
            })
            .collect()
    }
}

fn build_match(page: &PageText, start: usize, end: usize, radius: usize) -> SearchMatch {
    let match_offset = page.text[..start].chars().count();
    let match_len = page.text[start..end].chars().count();
    let window_start = match_offset.saturating_sub(radius);
    let window_len = (match_offset - window_start) + match_len + radius;
    let snippet: String = page
        .text
        .chars()
        .skip(window_start)
        .take(window_len)
        .collect();

    SearchMatch {
        page_number: page.page_number,
        snippet: snippet.trim().to_owned(),
        match_offset,
    }
}

/// Byte range of the first case-insensitive occurrence of `needle`.
pub fn find_ignore_case(haystack: &str, needle: &str) -> Option<(usize, usize)> {
    let needle: Vec<char> = needle.chars().flat_map(char::to_lowercase).collect();
    if needle.is_empty() {
        return None;
    }

    haystack
        .char_indices()
        .find_map(|(start, _)| match_at(haystack, start, &needle).map(|end| (start, end)))
}

pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    find_ignore_case(haystack, needle).is_some()
}

fn match_at(haystack: &str, start: usize, needle: &[char]) -> Option<usize> {
    let mut expected = needle.iter();
    let mut pending = expected.next();

    for (offset, ch) in haystack[start..].char_indices() {
        for lower in ch.to_lowercase() {
            match pending {
                Some(&want) if want == lower => pending = expected.next(),
                Some(_) => return None,
                None => break,
            }
        }
        if pending.is_none() {
            return Some(start + offset + ch.len_utf8());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(pages: &[&str]) -> TextIndex {
        let mut index = TextIndex::new();
        index.replace(
            pages
                .iter()
                .enumerate()
                .map(|(idx, text)| PageText {
                    page_number: idx + 1,
                    text: text.to_string(),
                })
                .collect(),
        );
        index
    }

    #[test]
    fn finds_first_occurrence_per_page_case_insensitively() {
        let index = index(&[
            "intro",
            "nothing here",
            "PHASE ONE: OBJECTIVE ALPHA secured; objective bravo pending",
            "",
            "the Objective remains",
        ]);

        let matches = index.search("objective", 50);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].page_number, 3);
        assert_eq!(matches[0].match_offset, 11);
        assert!(matches[0].snippet.contains("OBJECTIVE ALPHA"));
        assert_eq!(matches[1].page_number, 5);
    }

    #[test]
    fn blank_query_returns_nothing() {
        let index = index(&["alpha"]);
        assert!(index.search("", 50).is_empty());
        assert!(index.search("   \t", 50).is_empty());
    }

    #[test]
    fn snippet_is_clipped_to_radius() {
        let text = format!("{}needle{}", "a".repeat(200), "b".repeat(200));
        let index = index(&[&text]);
        let found = &index.search("NEEDLE", 50)[0];
        assert_eq!(found.match_offset, 200);
        assert_eq!(found.snippet.chars().count(), 50 + 6 + 50);
        assert!(found.snippet.starts_with('a'));
        assert!(found.snippet.ends_with('b'));
    }

    #[test]
    fn snippet_near_page_start_is_clipped_to_text() {
        let index = index(&["Alpha bravo"]);
        let found = &index.search("alpha", 50)[0];
        assert_eq!(found.match_offset, 0);
        assert_eq!(found.snippet, "Alpha bravo");
    }

    #[test]
    fn matching_handles_multibyte_text() {
        assert_eq!(find_ignore_case("Größe ÜBER alles", "über"), Some((8, 13)));
        assert!(contains_ignore_case("ΣΟΦΙΑ", "σοφ"));
        assert!(!contains_ignore_case("abc", "abcd"));
        assert!(!contains_ignore_case("abc", ""));
    }

    #[test]
    fn replace_keeps_pages_ordered_and_unique() {
        let mut index = TextIndex::new();
        index.replace(vec![
            PageText {
                page_number: 2,
                text: "b".into(),
            },
            PageText {
                page_number: 1,
                text: "a".into(),
            },
            PageText {
                page_number: 2,
                text: "dup".into(),
            },
        ]);
        let pages: Vec<(usize, &str)> = index
            .pages()
            .iter()
            .map(|page| (page.page_number, page.text.as_str()))
            .collect();
        assert_eq!(pages, vec![(1, "a"), (2, "b")]);
    }
}
