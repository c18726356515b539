//! Hyperlink extraction from model answers.

use once_cell::sync::Lazy;
use regex_lite::Regex;

static MARKDOWN_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[([^\]]+)\]\((https?://[^)\s]+)\)").unwrap()
});

static BARE_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://[^\s\)\]>]+").unwrap());

/// A markdown link found in text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownLink<'a> {
    /// Byte range of the whole `[text](url)` construct.
    pub span: std::ops::Range<usize>,
    pub text: &'a str,
    pub url: &'a str,
}

fn trim_url(url: &str) -> &str {
    url.trim_end_matches(['.', ',', ';', ':', '!', '?', '"', '\''])
}

/// Markdown links in order of appearance.
pub fn markdown_links(text: &str) -> Vec<MarkdownLink<'_>> {
    MARKDOWN_LINK
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(MarkdownLink {
                span: whole.range(),
                text: caps.get(1)?.as_str(),
                url: caps.get(2)?.as_str(),
            })
        })
        .collect()
}

/// Every distinct http(s) URL in `text`, markdown or bare, first occurrence
/// first. Trailing sentence punctuation is not part of a bare URL.
pub fn extract_links(text: &str) -> Vec<String> {
    let mut seen = Vec::<String>::new();
    let mut push = |url: &str| {
        if !url.is_empty() && !seen.iter().any(|u| u == url) {
            seen.push(url.to_string());
        }
    };

    let markdown = markdown_links(text);
    let mut bare_from = 0;
    for link in &markdown {
        for m in BARE_URL.find_iter(&text[bare_from..link.span.start]) {
            push(trim_url(m.as_str()));
        }
        push(link.url);
        bare_from = link.span.end;
    }
    for m in BARE_URL.find_iter(&text[bare_from..]) {
        push(trim_url(m.as_str()));
    }

    seen
}

/// Rewrite `text` keeping only links for which `keep` returns true. A
/// dropped markdown link leaves its text behind; a dropped bare URL is
/// removed outright.
pub fn retain_links(text: &str, keep: impl Fn(&str) -> bool) -> String {
    let mut out = String::with_capacity(text.len());

    let push_plain = |out: &mut String, segment: &str| {
        let mut last = 0;
        for m in BARE_URL.find_iter(segment) {
            let url = trim_url(m.as_str());
            out.push_str(&segment[last..m.start()]);
            if keep(url) {
                out.push_str(url);
            } else if out.ends_with(' ') {
                out.pop();
            }
            last = m.start() + url.len();
        }
        out.push_str(&segment[last..]);
    };

    let mut from = 0;
    for link in markdown_links(text) {
        push_plain(&mut out, &text[from..link.span.start]);
        if keep(link.url) {
            out.push_str(&text[link.span.clone()]);
        } else {
            out.push_str(link.text);
        }
        from = link.span.end;
    }
    push_plain(&mut out, &text[from..]);

    out
}

/// Number of markdown links in `text`.
pub fn count_markdown_links(text: &str) -> usize {
    MARKDOWN_LINK.find_iter(text).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_and_bare_links() {
        let text = "See [H.R.1](https://www.congress.gov/bill/118th-congress/house-bill/1) \
                    and https://clerk.house.gov/Votes/2023123. Also [again](https://www.congress.gov/bill/118th-congress/house-bill/1).";
        assert_eq!(
            extract_links(text),
            vec![
                "https://www.congress.gov/bill/118th-congress/house-bill/1".to_string(),
                "https://clerk.house.gov/Votes/2023123".to_string(),
            ]
        );
    }

    #[test]
    fn test_no_links() {
        assert!(extract_links("No sources were available for this question.").is_empty());
        assert_eq!(count_markdown_links("plain"), 0);
    }

    #[test]
    fn test_non_http_links_ignored() {
        assert!(extract_links("[mail](mailto:a@b.c) and ftp://x.org").is_empty());
    }

    #[test]
    fn test_retain_links() {
        let text = "Sponsored by [Rep. Smith](https://ok.example/smith) and \
                    [the committee](https://dead.example/c). Details at https://dead.example/x. \
                    Votes: https://ok.example/votes.";
        let kept = retain_links(text, |url| url.starts_with("https://ok.example"));
        assert_eq!(
            kept,
            "Sponsored by [Rep. Smith](https://ok.example/smith) and the committee. \
             Details at. Votes: https://ok.example/votes."
        );
    }

    #[test]
    fn test_markdown_link_spans() {
        let text = "a [b](http://c.d) e";
        let links = markdown_links(text);
        assert_eq!(links.len(), 1);
        assert_eq!(&text[links[0].span.clone()], "[b](http://c.d)");
        assert_eq!(links[0].text, "b");
    }
}
