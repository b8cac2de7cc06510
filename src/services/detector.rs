//! Chapter boundary detection.
//!
//! Detection runs an ordered cascade of strategies over the full text and
//! keeps the first non-empty result:
//!
//! 1. exact heading patterns, `第N章 ...`, with a secondary keyword/list scan
//! 2. line-by-line classification
//!
//! When the caller supplied templates, their matches are merged into
//! whatever the cascade produced; they never replace it.
//!
//! Every strategy reports byte offsets; the code-point thresholds below are
//! applied on `chars()` so they mean the same thing for CJK and ASCII text.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};

use super::classifier::classify_type;
use super::numerals::{self, LIST_NUMERAL_GLYPHS, NUMERAL_GLYPHS};
use crate::models::{ChapterCandidate, ChapterTemplate};

const MIN_TITLE_CHARS: usize = 2;
const MAX_TITLE_CHARS: usize = 100;

const PLAUSIBILITY_SAMPLE_CHARS: usize = 100;
const PLAUSIBILITY_MIN_RATIO: f64 = 0.3;

const MAX_HEADING_LINE_CHARS: usize = 100;
const SHORT_LINE_CHARS: usize = 50;

/// Candidates closer than this (in code points) are the same boundary.
const DEDUP_DISTANCE_CHARS: usize = 10;

/// A short line containing any of these is treated as a heading.
const LINE_KEYWORDS: [&str; 7] = ["章", "番外", "前言", "简介", "序", "楔子", "引子"];

/// Glyphs accepted after `番外` when classifying lines.
const EXTRA_NUMERAL_GLYPHS: &str = "一二三四五六七八九十百千万零〇";

static CHAPTER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[format!(r"(?m)^(第[{}\d]+章[^\n]*)", NUMERAL_GLYPHS)])
});

/// Front/back matter and bonus headings scanned alongside `第N章` matches.
static KEYWORD_HEADING_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        // Keyword alone on its line, or followed by a separator. `后记得...`
        // is prose, not a heading.
        r"(?m)^((?:前言|简介|序言|楔子|引子|后记|尾声)(?:[ \t\x{3000}:：·—\-][^\n]*)?)\r?(?:\n|\z)"
            .to_string(),
        r"(?m)^(番外[^\n]*)".to_string(),
    ])
});

static SECONDARY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[format!(
        r"(?m)^((?:前言|简介|序言|楔子|引子|后记|尾声|番外[^\n]*|[{}\d]+、[^\n]*))",
        LIST_NUMERAL_GLYPHS
    )])
});

static LINE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        format!(r"^第[{}\d]+[章节]", NUMERAL_GLYPHS),
        format!(r"^番外[{}\d]", EXTRA_NUMERAL_GLYPHS),
        r"^(?:前言|简介|序言|楔子|引子|后记|尾声)".to_string(),
        format!(r"^[{}]+、", LIST_NUMERAL_GLYPHS),
        r"^\d+、".to_string(),
    ])
});

/// Common heading shapes merged with user templates.
static FALLBACK_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        format!(r"(?m)^(第[{}\d]+[章节回卷集部篇][^\n]*)", NUMERAL_GLYPHS),
        format!(r"(?m)^([{}\d]+、[^\n]*)", LIST_NUMERAL_GLYPHS),
        r"(?m)^((?i:chapter)[ \t]+\d+[^\n]*)".to_string(),
        r"(?m)^((?i:section)[ \t]+\d+[^\n]*)".to_string(),
    ])
});

fn compile(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| match Regex::new(pattern) {
            Ok(regex) => Some(regex),
            Err(err) => {
                warn!("skipping invalid heading pattern {:?}: {}", pattern, err);
                None
            }
        })
        .collect()
}

/// One way of finding chapter starts in a whole document.
pub trait BoundaryStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns accepted candidates in discovery order. Deduplication and
    /// ordering are applied by [`BoundaryDetector`].
    fn detect(&self, text: &str) -> Vec<ChapterCandidate>;
}

/// Line-anchored `第N章` headings, each checked with the plausibility filter.
/// Keyword headings found next to them are kept too. When no `第N章` heading
/// survives, the secondary keyword / enumerated-list set is scanned instead.
pub struct ExactPatternStrategy;

impl BoundaryStrategy for ExactPatternStrategy {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn detect(&self, text: &str) -> Vec<ChapterCandidate> {
        let mut found = scan(text, &CHAPTER_PATTERNS, true);
        if !found.is_empty() {
            found.extend(scan(text, &KEYWORD_HEADING_PATTERNS, true));
            return found;
        }

        debug!("no standard chapter headings, trying secondary patterns");
        scan(text, &SECONDARY_PATTERNS, true)
    }
}

pub struct LineClassifierStrategy;

impl BoundaryStrategy for LineClassifierStrategy {
    fn name(&self) -> &'static str {
        "line"
    }

    fn detect(&self, text: &str) -> Vec<ChapterCandidate> {
        let mut candidates = Vec::new();
        let mut offset = 0;

        for raw_line in text.split_inclusive('\n') {
            let line_start = offset;
            offset += raw_line.len();

            let line = raw_line.trim();
            if line.is_empty() || !is_heading_line(line) {
                continue;
            }
            if let Some(candidate) = candidate_at(text, line_start, raw_line, false) {
                candidates.push(candidate);
            }
        }

        candidates
    }
}

/// User-supplied prefix/suffix literals around a numeral, merged with
/// [`FALLBACK_PATTERNS`]. Only the user patterns skip the plausibility
/// filter.
pub struct TemplateStrategy {
    patterns: Vec<Regex>,
}

impl TemplateStrategy {
    pub fn new(templates: &[ChapterTemplate]) -> Self {
        let mut sources = Vec::new();
        for template in templates.iter().filter(|t| !t.is_empty()) {
            let prefix = regex::escape(template.prefix.trim());
            let suffix = regex::escape(template.suffix.trim());
            for numeral in [format!("[{}]+", NUMERAL_GLYPHS), r"\d+".to_string()] {
                sources.push(format!(
                    r"(?m)^({}[ \t]*{}[ \t]*{}[^\n]*)",
                    prefix, numeral, suffix
                ));
            }
        }

        Self {
            patterns: compile(&sources),
        }
    }
}

impl BoundaryStrategy for TemplateStrategy {
    fn name(&self) -> &'static str {
        "template"
    }

    fn detect(&self, text: &str) -> Vec<ChapterCandidate> {
        let mut found = scan(text, &self.patterns, false);
        found.extend(scan(text, &FALLBACK_PATTERNS, true));
        found
    }
}

/// Result of running the cascade.
#[derive(Debug, Clone, Default)]
pub struct Detection {
    /// Name of the strategy that produced the candidates, `"none"` if no
    /// strategy found anything.
    pub strategy: &'static str,
    pub candidates: Vec<ChapterCandidate>,
}

pub struct BoundaryDetector {
    /// Tried in order; the first non-empty result wins.
    cascade: Vec<Box<dyn BoundaryStrategy>>,
    /// Always run, their candidates appended after the cascade's.
    merged: Vec<Box<dyn BoundaryStrategy>>,
}

impl BoundaryDetector {
    pub fn new(templates: &[ChapterTemplate]) -> Self {
        let cascade: Vec<Box<dyn BoundaryStrategy>> =
            vec![Box::new(ExactPatternStrategy), Box::new(LineClassifierStrategy)];
        let mut merged: Vec<Box<dyn BoundaryStrategy>> = Vec::new();
        if templates.iter().any(|t| !t.is_empty()) {
            merged.push(Box::new(TemplateStrategy::new(templates)));
        }
        Self { cascade, merged }
    }

    pub fn detect(&self, text: &str) -> Detection {
        if text.trim().is_empty() {
            return Detection {
                strategy: "none",
                candidates: Vec::new(),
            };
        }

        let mut strategy = "none";
        let mut found = Vec::new();
        for candidate_strategy in &self.cascade {
            found = candidate_strategy.detect(text);
            if !found.is_empty() {
                strategy = candidate_strategy.name();
                break;
            }
            debug!(
                strategy = candidate_strategy.name(),
                "strategy found no chapter boundaries"
            );
        }

        for extra in &self.merged {
            let matches = extra.detect(text);
            debug!(strategy = extra.name(), count = matches.len(), "merging candidates");
            if found.is_empty() && !matches.is_empty() {
                strategy = extra.name();
            }
            found.extend(matches);
        }

        // Earlier entries win dedup, so cascade results outrank merged ones.
        let candidates = dedup_and_sort(text, found);
        if candidates.is_empty() {
            info!("no chapter boundaries found, using the whole text");
            return Detection {
                strategy: "none",
                candidates,
            };
        }

        info!(strategy, count = candidates.len(), "chapter boundaries detected");
        for candidate in candidates.iter().take(5) {
            debug!(
                position = candidate.position,
                number = ?candidate.number,
                kind = candidate.kind.as_str(),
                "boundary {:?}",
                candidate.matched_text
            );
        }
        Detection {
            strategy,
            candidates,
        }
    }
}

impl Default for BoundaryDetector {
    fn default() -> Self {
        Self::new(&[])
    }
}

fn scan(text: &str, patterns: &[Regex], check_plausibility: bool) -> Vec<ChapterCandidate> {
    let mut candidates = Vec::new();
    for pattern in patterns {
        for caps in pattern.captures_iter(text) {
            let Some(m) = caps.get(1).or_else(|| caps.get(0)) else {
                continue;
            };
            if let Some(candidate) = candidate_at(text, m.start(), m.as_str(), check_plausibility) {
                candidates.push(candidate);
            }
        }
    }
    candidates
}

/// Build a candidate from a raw match starting at byte `start`, applying the
/// title length limits and, optionally, the plausibility filter.
fn candidate_at(
    text: &str,
    start: usize,
    raw: &str,
    check_plausibility: bool,
) -> Option<ChapterCandidate> {
    let title = raw.trim();
    let position = start + (raw.len() - raw.trim_start().len());

    let title_chars = title.chars().count();
    if !(MIN_TITLE_CHARS..=MAX_TITLE_CHARS).contains(&title_chars) {
        return None;
    }
    if check_plausibility && !is_plausible(text, position + title.len()) {
        return None;
    }

    Some(ChapterCandidate {
        position,
        matched_text: title.to_string(),
        length: title.len(),
        kind: classify_type(title),
        number: chapter_number(title),
    })
}

/// A real heading is followed by prose: at least 30% of the next 100 code
/// points must be common ideographs.
pub fn is_plausible(text: &str, heading_end: usize) -> bool {
    let Some(after) = text.get(heading_end..) else {
        return false;
    };

    let mut sampled = 0usize;
    let mut ideographs = 0usize;
    for c in after.chars().take(PLAUSIBILITY_SAMPLE_CHARS) {
        sampled += 1;
        if is_common_ideograph(c) {
            ideographs += 1;
        }
    }

    ideographs as f64 / sampled.max(1) as f64 >= PLAUSIBILITY_MIN_RATIO
}

pub fn is_common_ideograph(c: char) -> bool {
    ('\u{4E00}'..='\u{9FFF}').contains(&c)
}

fn is_heading_line(line: &str) -> bool {
    let chars = line.chars().count();
    if chars > MAX_HEADING_LINE_CHARS {
        return false;
    }
    if LINE_PATTERNS.iter().any(|p| p.is_match(line)) {
        return true;
    }
    chars < SHORT_LINE_CHARS && LINE_KEYWORDS.iter().any(|k| line.contains(k))
}

fn chapter_number(title: &str) -> Option<u32> {
    let start = title.find(numerals::is_numeral_char)?;
    let token: String = title[start..]
        .chars()
        .take_while(|c| numerals::is_numeral_char(*c))
        .collect();
    numerals::parse_numeral(&token)
}

/// Collapse candidates closer than [`DEDUP_DISTANCE_CHARS`] (first found
/// wins), then order by position. The sort is stable.
pub fn dedup_and_sort(text: &str, candidates: Vec<ChapterCandidate>) -> Vec<ChapterCandidate> {
    let mut kept: Vec<ChapterCandidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let duplicate = kept
            .iter()
            .any(|k| char_distance(text, k.position, candidate.position) < DEDUP_DISTANCE_CHARS);
        if !duplicate {
            kept.push(candidate);
        }
    }
    kept.sort_by_key(|c| c.position);
    kept
}

fn char_distance(text: &str, a: usize, b: usize) -> usize {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    // A char is at most 4 bytes, so a wide byte gap can skip the count.
    if hi - lo >= DEDUP_DISTANCE_CHARS * 4 {
        return hi - lo;
    }
    text.get(lo..hi).map_or(hi - lo, |span| span.chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChapterKind;
    use proptest::prelude::*;

    fn titles(detection: &Detection) -> Vec<&str> {
        detection
            .candidates
            .iter()
            .map(|c| c.matched_text.as_str())
            .collect()
    }

    fn candidate(text: &str, needle: &str) -> ChapterCandidate {
        let position = text.find(needle).unwrap();
        ChapterCandidate {
            position,
            matched_text: needle.to_string(),
            length: needle.len(),
            kind: ChapterKind::Main,
            number: None,
        }
    }

    #[test]
    fn test_exact_pattern_headings() {
        let text = "第一章 开始\n故事开始了，主角登场。\n\n第二章 继续\n故事继续发展下去。";
        let detection = BoundaryDetector::default().detect(text);

        assert_eq!(detection.strategy, "exact");
        assert_eq!(titles(&detection), vec!["第一章 开始", "第二章 继续"]);
        assert_eq!(detection.candidates[0].position, 0);
        assert_eq!(detection.candidates[1].position, text.find("第二章").unwrap());
        assert_eq!(detection.candidates[1].length, "第二章 继续".len());
    }

    #[test]
    fn test_arabic_and_formal_numerals() {
        let text = "第12章 风起\n山雨欲来风满楼。\n第贰拾章 云涌\n大江东去浪淘尽。";
        let detection = BoundaryDetector::default().detect(text);

        assert_eq!(titles(&detection), vec!["第12章 风起", "第贰拾章 云涌"]);
        assert_eq!(detection.candidates[0].number, Some(12));
        assert_eq!(detection.candidates[1].number, Some(20));
    }

    #[test]
    fn test_heading_inside_prose_is_ignored() {
        let text = "他说第一章写得不好，需要重新修改一下才能发表。";
        let detection = ExactPatternStrategy.detect(text);
        assert!(detection.is_empty());
    }

    #[test]
    fn test_plausibility_filter_rejects_non_ideograph_context() {
        let text = "第1章 test\nThis is english content only, no ideographs.";
        assert!(ExactPatternStrategy.detect(text).is_empty());

        // The line classifier still accepts it.
        let detection = BoundaryDetector::default().detect(text);
        assert_eq!(detection.strategy, "line");
        assert_eq!(titles(&detection), vec!["第1章 test"]);
    }

    #[test]
    fn test_is_plausible_thresholds() {
        assert!(is_plausible("标题正文内容", 6));
        assert!(!is_plausible("标题abcdefghij", 6));
        assert!(!is_plausible("标题", 6));
        // 3 of 10 sampled chars are ideographs: exactly 30%
        assert!(is_plausible("标题一二三abcdefg", 6));
    }

    #[test]
    fn test_front_matter_keyword_heading() {
        let text = "前言\n这是前言。\n\n第一章 开始\n故事开始了。";
        let detection = BoundaryDetector::default().detect(text);

        assert_eq!(titles(&detection), vec!["前言", "第一章 开始"]);
        assert_eq!(detection.candidates[0].kind, ChapterKind::Intro);
        assert_eq!(detection.candidates[1].kind, ChapterKind::Main);
    }

    #[test]
    fn test_keyword_running_into_prose_is_not_a_heading() {
        let text = "第一章 开始\n故事开始了。\n后记得那天的雨下得很大，我们都没有带伞。";
        let detection = BoundaryDetector::default().detect(text);
        assert_eq!(titles(&detection), vec!["第一章 开始"]);
    }

    #[test]
    fn test_secondary_enumerated_headings() {
        let text = "一、开端\n很多很多的中文内容在这里。\n二、发展\n故事逐渐展开了它的面貌。";
        let detection = BoundaryDetector::default().detect(text);

        assert_eq!(detection.strategy, "exact");
        assert_eq!(titles(&detection), vec!["一、开端", "二、发展"]);
        assert_eq!(detection.candidates[1].number, Some(2));
    }

    #[test]
    fn test_keyword_heading_does_not_hide_list_headings() {
        let text = "前言\n这是一本书的前言内容，写给读者。\n一、开端\n很多很多的中文内容在这里。\n二、发展\n故事逐渐展开了它的面貌。";
        let detection = BoundaryDetector::default().detect(text);

        assert_eq!(detection.strategy, "exact");
        assert_eq!(titles(&detection), vec!["前言", "一、开端", "二、发展"]);
        assert_eq!(detection.candidates[0].kind, ChapterKind::Intro);
    }

    #[test]
    fn test_extra_heading_kept_next_to_numbered_chapters() {
        let text = "第一章 开始\n故事开始了，主角登场。\n番外 春日\n春天里发生的一件小事。";
        let detection = BoundaryDetector::default().detect(text);

        assert_eq!(titles(&detection), vec!["第一章 开始", "番外 春日"]);
        assert_eq!(detection.candidates[1].kind, ChapterKind::Extra);
    }

    #[test]
    fn test_line_classification_kinds() {
        let text = "楔子\nHello there.\n第一章\nSome text.\n番外一 春日\nMore text.";
        let detection = BoundaryDetector::default().detect(text);

        assert_eq!(detection.strategy, "line");
        let kinds: Vec<ChapterKind> = detection.candidates.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![ChapterKind::Intro, ChapterKind::Main, ChapterKind::Extra]
        );
    }

    #[test]
    fn test_line_longer_than_limit_is_not_a_heading() {
        let text = format!("第一章{}\nabc", "很".repeat(120));
        let detection = BoundaryDetector::default().detect(&text);
        assert!(detection.candidates.is_empty());
        assert_eq!(detection.strategy, "none");
    }

    #[test]
    fn test_single_char_title_rejected() {
        let text = "章\nplain text without headings";
        assert!(LineClassifierStrategy.detect(text).is_empty());
    }

    #[test]
    fn test_templates_match_english_headings() {
        let text = "Chapter 1\nIt was a dark and stormy night.\nChapter 2\nThe rain kept falling.";
        assert!(BoundaryDetector::default().detect(text).candidates.is_empty());

        let detector = BoundaryDetector::new(&[ChapterTemplate::new("Chapter", "")]);
        let detection = detector.detect(text);
        assert_eq!(detection.strategy, "template");
        assert_eq!(titles(&detection), vec!["Chapter 1", "Chapter 2"]);
        assert_eq!(detection.candidates[1].number, Some(2));
    }

    #[test]
    fn test_template_with_chinese_prefix_and_suffix() {
        let text = "卷一：初入江湖\n少年背着剑走出了山门。\n卷二：风云再起\n江湖从来不太平。";
        let detector = BoundaryDetector::new(&[ChapterTemplate::new("卷", "：")]);
        let detection = detector.detect(text);

        assert_eq!(detection.strategy, "template");
        assert_eq!(titles(&detection), vec!["卷一：初入江湖", "卷二：风云再起"]);
    }

    #[test]
    fn test_template_matches_merge_into_exact_result() {
        let text = "第一章 开始\n故事开始了，主角登场。\n卷二：风云\n江湖从来不太平，风波又起。";
        let detector = BoundaryDetector::new(&[ChapterTemplate::new("卷", "：")]);
        let detection = detector.detect(text);

        assert_eq!(detection.strategy, "exact");
        assert_eq!(titles(&detection), vec!["第一章 开始", "卷二：风云"]);
    }

    #[test]
    fn test_templates_keep_plausibility_for_standard_headings() {
        let text = "Chapter 1\nHe opened the old notebook.\n第三回 was all that the first page said.\nChapter 2\nThe rain kept falling.";
        let detector = BoundaryDetector::new(&[ChapterTemplate::new("Chapter", "")]);
        let detection = detector.detect(text);

        assert_eq!(titles(&detection), vec!["Chapter 1", "Chapter 2"]);
    }

    #[test]
    fn test_template_literals_are_escaped() {
        let strategy = TemplateStrategy::new(&[ChapterTemplate::new("(", ")")]);
        let text = "(1) start\nbody\n(2) next\nbody";
        assert_eq!(strategy.detect(text).len(), 2);
    }

    #[test]
    fn test_dedup_keeps_first_discovered() {
        let text = "第一章 开始了一段很长很长的故事";
        let first = candidate(text, "第一章 开始");
        let mut near = candidate(text, "开始了");
        near.matched_text = "near".into();

        let kept = dedup_and_sort(text, vec![first.clone(), near]);
        assert_eq!(kept, vec![first]);
    }

    #[test]
    fn test_dedup_distance_boundary() {
        let text = format!("{}X", "一".repeat(10));
        let a = ChapterCandidate {
            position: 0,
            matched_text: "a".into(),
            length: 1,
            kind: ChapterKind::Main,
            number: None,
        };
        let b = ChapterCandidate {
            position: text.find('X').unwrap(),
            ..a.clone()
        };
        // Exactly 10 chars apart: distinct boundaries.
        assert_eq!(dedup_and_sort(&text, vec![b, a]).len(), 2);
    }

    #[test]
    fn test_candidates_sorted_by_position() {
        let text = "abc第一章 xyz隔开两个标题的一段文字第二章";
        let second = candidate(text, "第二章");
        let first = candidate(text, "第一章");
        let sorted = dedup_and_sort(text, vec![second, first]);
        assert!(sorted[0].position < sorted[1].position);
    }

    #[test]
    fn test_blank_text_has_no_candidates() {
        let detection = BoundaryDetector::default().detect("  \n\t ");
        assert!(detection.candidates.is_empty());
        assert_eq!(detection.strategy, "none");
    }

    proptest! {
        #[test]
        fn prop_dedup_separates_and_orders(
            text in "[一-龥a-z\n]{1,120}",
            picks in prop::collection::vec(any::<prop::sample::Index>(), 0..20),
        ) {
            let starts: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
            let candidates: Vec<ChapterCandidate> = picks
                .iter()
                .enumerate()
                .map(|(n, pick)| ChapterCandidate {
                    position: starts[pick.index(starts.len())],
                    matched_text: format!("c{}", n),
                    length: 0,
                    kind: ChapterKind::Main,
                    number: None,
                })
                .collect();

            let kept = dedup_and_sort(&text, candidates.clone());

            prop_assert!(kept.windows(2).all(|w| w[0].position < w[1].position));
            for (i, a) in kept.iter().enumerate() {
                for b in &kept[i + 1..] {
                    prop_assert!(text[a.position..b.position].chars().count() >= DEDUP_DISTANCE_CHARS);
                }
            }
            if let Some(first) = candidates.first() {
                prop_assert!(kept.contains(first));
            }
            for candidate in candidates.iter().filter(|c| !kept.contains(c)) {
                prop_assert!(kept
                    .iter()
                    .any(|k| char_distance(&text, k.position, candidate.position) < DEDUP_DISTANCE_CHARS));
            }
        }
    }
}
