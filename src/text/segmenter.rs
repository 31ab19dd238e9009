//! Heading detection and chapter segmentation for plain text.
//!
//! This is a line classifier, not a parser: a missed heading folds its
//! chapter into the previous one, and a prose line that happens to look like
//! a heading starts a short spurious chapter. Both are accepted.

use std::sync::LazyLock;

use regex::Regex;

/// Numbered CJK chapter marker: `第十二章 ...`
static NUMBERED_CHAPTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*第[零一二三四五六七八九十百千万\d\s]+章.*$")
        .expect("Failed to compile numbered chapter regex")
});

/// Structural CJK keyword followed by a short title fragment.
/// The rejected follow-up characters are checked separately in
/// `keyword_is_structural` since the regex engine has no lookahead.
static CJK_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[ 　\t]{0,4}(序章|楔子|正文|终章|后记|尾声|番外|第\s{0,4}[\d〇零一二两三四五六七八九十百千万壹贰叁肆伍陆柒捌玖拾佰仟]+?\s{0,4}(?:章|节|卷|集|部|篇))(.{0,30})$",
    )
    .expect("Failed to compile CJK keyword regex")
});

/// English structural keyword, optionally numbered, with a short tail.
static LATIN_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s{0,4}(?:prologue|epilogue|preface|foreword|afterword|interlude|(?:chapter|volume|part|book)\s+(?:\d+|[ivxlcdm]+|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve))\b(.{0,30})$",
    )
    .expect("Failed to compile latin keyword regex")
});

/// Headings longer than this (after trimming) are treated as prose.
const MAX_KEYWORD_HEADING_CHARS: usize = 40;

fn keyword_is_structural(keyword: &str, tail: &str) -> bool {
    let next = tail.chars().next();
    let rejected: &[char] = match keyword.chars().last() {
        Some('文') => &['完', '结'],
        Some('节') => &['课'],
        Some('集') => &['合', '和'],
        Some('部') => &['分', '赛', '游'],
        Some('篇') => &['张'],
        _ => &[],
    };
    !next.is_some_and(|c| rejected.contains(&c))
}

/// Classify a single line as a chapter heading.
pub fn is_heading(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }

    if NUMBERED_CHAPTER.is_match(line) {
        return true;
    }

    if let Some(caps) = CJK_KEYWORD.captures(line) {
        let keyword = caps.get(1).map_or("", |m| m.as_str());
        let tail = caps.get(2).map_or("", |m| m.as_str());
        if keyword_is_structural(keyword, tail) {
            return true;
        }
    }

    trimmed.chars().count() <= MAX_KEYWORD_HEADING_CHARS && LATIN_KEYWORD.is_match(line)
}

/// A contiguous run of lines that forms one chapter
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    /// `None` for front matter and for whole-text fallback
    pub heading: Option<String>,
    pub start_line: usize,
    pub end_line: usize,
    /// Title, a blank line and the following span, trimmed
    pub body: String,
}

/// Split `lines` into chapter segments.
///
/// Returns an empty list when no heading is found; the caller decides what
/// a heading-less text looks like. Blank front matter is dropped.
pub fn segment(lines: &[&str]) -> Vec<Segment> {
    let headings: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| is_heading(line))
        .map(|(idx, _)| idx)
        .collect();

    let Some(&first) = headings.first() else {
        return Vec::new();
    };

    let mut segments = Vec::with_capacity(headings.len() + 1);
    if first > 0 {
        let intro = lines[..first].join("\n");
        let intro = intro.trim();
        if !intro.is_empty() {
            segments.push(Segment {
                heading: None,
                start_line: 0,
                end_line: first,
                body: intro.to_string(),
            });
        }
    }

    for (pos, &start) in headings.iter().enumerate() {
        let end = headings.get(pos + 1).copied().unwrap_or(lines.len());
        let title = lines[start].trim().to_string();
        let content = lines[start + 1..end].join("\n");
        let body = format!("{title}\n\n{content}").trim().to_string();
        segments.push(Segment {
            heading: Some(title),
            start_line: start,
            end_line: end,
            body,
        });
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_numbered_chapters() {
        assert!(is_heading("第一章 开端"));
        assert!(is_heading("  第12章 风起"));
        assert!(is_heading("第 三 章"));
    }

    #[test]
    fn recognizes_structural_keywords() {
        assert!(is_heading("序章"));
        assert!(is_heading("楔子 雪夜"));
        assert!(is_heading("第三卷 江湖"));
        assert!(is_heading("番外 春日"));
        assert!(is_heading("第二节"));
    }

    #[test]
    fn rejects_keyword_lookalikes() {
        assert!(!is_heading("正文完"));
        assert!(!is_heading("第三部分的内容"));
        assert!(!is_heading("第五节课"));
        assert!(!is_heading("第一集合"));
        assert!(!is_heading("第一篇张"));
    }

    #[test]
    fn rejects_long_lines_with_keyword() {
        let long = format!("第三卷{}", "很".repeat(40));
        assert!(!is_heading(&long));
    }

    #[test]
    fn recognizes_latin_headings() {
        assert!(is_heading("Chapter 1"));
        assert!(is_heading("CHAPTER XII: The Storm"));
        assert!(is_heading("Prologue"));
        assert!(is_heading("Part Two"));
        assert!(!is_heading("Chapterhouse"));
        assert!(!is_heading("Chapter 1 was the one where everything started to go wrong"));
    }

    #[test]
    fn blank_lines_are_not_headings() {
        assert!(!is_heading(""));
        assert!(!is_heading("   "));
    }

    #[test]
    fn no_headings_returns_empty() {
        assert!(segment(&["just", "some", "text"]).is_empty());
    }

    #[test]
    fn front_matter_and_chapters() {
        let lines = vec!["intro text", "第一章 开端", "body1", "第二章 发展", "body2"];
        let segments = segment(&lines);
        assert_eq!(segments.len(), 3);

        assert_eq!(segments[0].heading, None);
        assert_eq!(segments[0].body, "intro text");
        assert_eq!((segments[0].start_line, segments[0].end_line), (0, 1));

        assert_eq!(segments[1].heading.as_deref(), Some("第一章 开端"));
        assert_eq!(segments[1].body, "第一章 开端\n\nbody1");
        assert_eq!((segments[1].start_line, segments[1].end_line), (1, 3));

        assert_eq!(segments[2].heading.as_deref(), Some("第二章 发展"));
        assert_eq!(segments[2].body, "第二章 发展\n\nbody2");
        assert_eq!((segments[2].start_line, segments[2].end_line), (3, 5));
    }

    #[test]
    fn blank_front_matter_is_dropped() {
        let segments = segment(&["", "  ", "Chapter 1", "text"]);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start_line, 2);
    }

    #[test]
    fn heading_on_first_line_has_no_front_matter() {
        let segments = segment(&["Prologue", "a", "Chapter 1", "b"]);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].heading.as_deref(), Some("Prologue"));
    }
}
