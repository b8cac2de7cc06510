//! Chinese numeral lexicon used to read chapter numbers out of headings.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Every glyph that may appear in a chapter number. The detector builds its
/// regex character classes from this string.
pub const NUMERAL_GLYPHS: &str = "零〇一二三四五六七八九十百千万壹贰叁肆伍陆柒捌玖拾佰仟廿卅卌";

/// Glyphs accepted in enumerated list headings such as `十二、`.
pub const LIST_NUMERAL_GLYPHS: &str = "一二三四五六七八九十百千万";

static LEXICON: LazyLock<HashMap<&'static str, u32>> = LazyLock::new(|| {
    let mut table: HashMap<&'static str, u32> = HashMap::new();

    let singles = [
        ("〇", 0),
        ("零", 0),
        ("一", 1),
        ("二", 2),
        ("三", 3),
        ("四", 4),
        ("五", 5),
        ("六", 6),
        ("七", 7),
        ("八", 8),
        ("九", 9),
        ("十", 10),
        ("廿", 20),
        ("卅", 30),
        ("卌", 40),
        ("百", 100),
        ("千", 1000),
        ("万", 10000),
        ("壹", 1),
        ("贰", 2),
        ("叁", 3),
        ("肆", 4),
        ("伍", 5),
        ("陆", 6),
        ("柒", 7),
        ("捌", 8),
        ("玖", 9),
        ("拾", 10),
        ("佰", 100),
        ("仟", 1000),
    ];
    table.extend(singles);

    let composites = [
        ("十一", 11),
        ("十二", 12),
        ("十三", 13),
        ("十四", 14),
        ("十五", 15),
        ("十六", 16),
        ("十七", 17),
        ("十八", 18),
        ("十九", 19),
        ("二十", 20),
        ("二十一", 21),
        ("二十二", 22),
        ("二十三", 23),
        ("二十四", 24),
        ("二十五", 25),
        ("二十六", 26),
        ("二十七", 27),
        ("二十八", 28),
        ("二十九", 29),
        ("三十", 30),
        ("三十一", 31),
        ("三十二", 32),
        ("三十三", 33),
        ("三十四", 34),
        ("三十五", 35),
        ("三十六", 36),
        ("三十七", 37),
        ("三十八", 38),
        ("三十九", 39),
        ("四十", 40),
        ("五十", 50),
        ("六十", 60),
        ("七十", 70),
        ("八十", 80),
        ("九十", 90),
    ];
    table.extend(composites);

    table
});

/// Exact table lookup.
pub fn lookup(token: &str) -> Option<u32> {
    LEXICON.get(token).copied()
}

pub fn is_numeral_char(c: char) -> bool {
    c.is_ascii_digit() || NUMERAL_GLYPHS.contains(c)
}

fn digit_value(c: char) -> Option<u32> {
    match c {
        '〇' | '零' => Some(0),
        '一' | '壹' => Some(1),
        '二' | '贰' => Some(2),
        '三' | '叁' => Some(3),
        '四' | '肆' => Some(4),
        '五' | '伍' => Some(5),
        '六' | '陆' => Some(6),
        '七' | '柒' => Some(7),
        '八' | '捌' => Some(8),
        '九' | '玖' => Some(9),
        _ => c.to_digit(10),
    }
}

fn unit_value(c: char) -> Option<u32> {
    match c {
        '十' | '拾' => Some(10),
        '百' | '佰' => Some(100),
        '千' | '仟' => Some(1000),
        '万' => Some(10000),
        _ => None,
    }
}

fn tens_value(c: char) -> Option<u32> {
    match c {
        '廿' => Some(20),
        '卅' => Some(30),
        '卌' => Some(40),
        _ => None,
    }
}

/// Evaluate a numeral token such as `一百零五`, `廿三`, `贰拾` or `42`.
///
/// Returns `None` for anything containing a non-numeral glyph or a value
/// that does not fit in `u32`.
pub fn parse_numeral(token: &str) -> Option<u32> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    if token.chars().all(|c| c.is_ascii_digit()) {
        return token.parse().ok();
    }
    if let Some(value) = lookup(token) {
        return Some(value);
    }

    let mut total: u32 = 0;
    let mut section: u32 = 0;
    let mut digit: Option<u32> = None;

    for c in token.chars() {
        if let Some(unit) = unit_value(c) {
            if unit == 10000 {
                section = section.checked_add(digit.take().unwrap_or(0))?;
                total = total.checked_add(section.max(1).checked_mul(unit)?)?;
                section = 0;
            } else {
                let multiplier = digit.take().unwrap_or(1);
                section = section.checked_add(multiplier.checked_mul(unit)?)?;
            }
        } else if let Some(tens) = tens_value(c) {
            section = section.checked_add(tens)?;
        } else if let Some(d) = digit_value(c) {
            // Runs of bare digits read positionally: 二〇二三 -> 2023
            digit = Some(match digit {
                Some(prev) => prev.checked_mul(10)?.checked_add(d)?,
                None => d,
            });
        } else {
            return None;
        }
    }

    section = section.checked_add(digit.unwrap_or(0))?;
    total.checked_add(section)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_table_entries() {
        assert_eq!(lookup("〇"), Some(0));
        assert_eq!(lookup("十九"), Some(19));
        assert_eq!(lookup("廿"), Some(20));
        assert_eq!(lookup("卌"), Some(40));
        assert_eq!(lookup("仟"), Some(1000));
        assert_eq!(lookup("章"), None);
    }

    #[test]
    fn test_parse_positional_numerals() {
        assert_eq!(parse_numeral("一百二十三"), Some(123));
        assert_eq!(parse_numeral("一百零五"), Some(105));
        assert_eq!(parse_numeral("两"), None);
        assert_eq!(parse_numeral("三千"), Some(3000));
        assert_eq!(parse_numeral("一万二千"), Some(12000));
        assert_eq!(parse_numeral("十万"), Some(100000));
    }

    #[test]
    fn test_parse_formal_and_shorthand_variants() {
        assert_eq!(parse_numeral("贰拾叁"), Some(23));
        assert_eq!(parse_numeral("壹佰"), Some(100));
        assert_eq!(parse_numeral("廿三"), Some(23));
        assert_eq!(parse_numeral("卅"), Some(30));
    }

    #[test]
    fn test_parse_arabic_and_digit_runs() {
        assert_eq!(parse_numeral("42"), Some(42));
        assert_eq!(parse_numeral(" 7 "), Some(7));
        assert_eq!(parse_numeral("二〇二三"), Some(2023));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_numeral(""), None);
        assert_eq!(parse_numeral("第一"), None);
        assert_eq!(parse_numeral("99999999999"), None);
    }

    #[test]
    fn test_is_numeral_char() {
        assert!(is_numeral_char('七'));
        assert!(is_numeral_char('玖'));
        assert!(is_numeral_char('5'));
        assert!(!is_numeral_char('章'));
    }
}
