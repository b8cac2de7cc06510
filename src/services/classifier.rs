use crate::models::ChapterKind;

/// Keywords marking front or back matter. Checked before [`EXTRA_KEYWORDS`].
pub const INTRO_KEYWORDS: [&str; 7] = ["前言", "简介", "序言", "楔子", "引子", "后记", "尾声"];

pub const EXTRA_KEYWORDS: [&str; 1] = ["番外"];

/// Lines that are accepted verbatim as the title of synthesized front matter.
const FRONT_TITLE_WORDS: [&str; 7] = ["简介", "前言", "序言", "楔子", "引子", "作品简介", "内容简介"];

pub const DEFAULT_FRONT_TITLE: &str = "Introduction";

const FRONT_TITLE_MAX_CHARS: usize = 100;
const FRONT_TITLE_TRUNCATE_CHARS: usize = 50;

pub fn classify_type(title: &str) -> ChapterKind {
    if INTRO_KEYWORDS.iter().any(|k| title.contains(k)) {
        ChapterKind::Intro
    } else if EXTRA_KEYWORDS.iter().any(|k| title.contains(k)) {
        ChapterKind::Extra
    } else {
        ChapterKind::Main
    }
}

/// Pick a title for content that precedes the first detected heading.
pub fn synthesize_front_title(intro_text: &str) -> String {
    let Some(line) = intro_text.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return DEFAULT_FRONT_TITLE.to_string();
    };

    let char_count = line.chars().count();
    if char_count < FRONT_TITLE_MAX_CHARS && FRONT_TITLE_WORDS.iter().any(|w| line.contains(w)) {
        return line.to_string();
    }

    if char_count > FRONT_TITLE_TRUNCATE_CHARS {
        let head: String = line.chars().take(FRONT_TITLE_TRUNCATE_CHARS).collect();
        format!("{}...", head)
    } else {
        line.to_string()
    }
}
