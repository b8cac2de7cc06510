//! Byte-to-text decoding with encoding fallback.

use encoding_rs::{BIG5, Encoding, GB18030, SHIFT_JIS, UTF_8};
use tracing::debug;

use crate::error::ConvertError;

const GARBLED_SAMPLE_CHARS: usize = 1000;
const GARBLED_REPLACEMENT_RUN: usize = 3;
const GARBLED_MAX_FOREIGN_RATIO: f64 = 0.1;

#[derive(Debug, Clone)]
pub struct Decoded {
    pub text: String,
    pub encoding: &'static str,
    /// `Some(ConvertError::Decode)` when every candidate looked garbled and
    /// `text` is a lossy UTF-8 fallback.
    pub error: Option<ConvertError>,
}

/// Decode `bytes`, trying a BOM-detected encoding, then `hint`, then the
/// fallback list. The first decoding without malformed sequences that does
/// not look garbled wins.
pub fn decode(bytes: &[u8], hint: Option<&str>) -> Decoded {
    if let Some((encoding, bom_length)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_length..]);
        debug!(encoding = encoding.name(), "decoded using byte order mark");
        return Decoded {
            text: text.into_owned(),
            encoding: encoding.name(),
            error: None,
        };
    }

    // Tried in order after a BOM or caller hint.
    let fallbacks: [&'static Encoding; 4] = [UTF_8, GB18030, BIG5, SHIFT_JIS];

    let mut order: Vec<&'static Encoding> = Vec::with_capacity(fallbacks.len() + 1);
    if let Some(label) = hint.map(str::trim).filter(|l| !l.is_empty()) {
        match Encoding::for_label(label.as_bytes()) {
            Some(encoding) => order.push(encoding),
            None => debug!("ignoring unknown encoding hint {:?}", label),
        }
    }
    for encoding in fallbacks {
        if !order.contains(&encoding) {
            order.push(encoding);
        }
    }

    for encoding in order {
        let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
        if !had_errors && !is_garbled(&text) {
            debug!(encoding = encoding.name(), "decoded source text");
            return Decoded {
                text: text.into_owned(),
                encoding: encoding.name(),
                error: None,
            };
        }
        debug!(
            encoding = encoding.name(),
            had_errors, "encoding rejected, trying next"
        );
    }

    Decoded {
        text: String::from_utf8_lossy(bytes).into_owned(),
        encoding: UTF_8.name(),
        error: Some(ConvertError::Decode(
            "no candidate encoding produced readable text".into(),
        )),
    }
}

/// Wrong-encoding check over the first 1000 chars: a run of three
/// replacement characters, or more than 10% of chars outside the allow-list.
pub fn is_garbled(text: &str) -> bool {
    let mut sampled = 0usize;
    let mut foreign = 0usize;
    let mut replacement_run = 0usize;

    for c in text.chars().take(GARBLED_SAMPLE_CHARS) {
        sampled += 1;
        if c == char::REPLACEMENT_CHARACTER {
            replacement_run += 1;
            if replacement_run >= GARBLED_REPLACEMENT_RUN {
                return true;
            }
        } else {
            replacement_run = 0;
        }
        if !is_allowed(c) {
            foreign += 1;
        }
    }

    sampled > 0 && foreign as f64 / sampled as f64 > GARBLED_MAX_FOREIGN_RATIO
}

fn is_allowed(c: char) -> bool {
    c.is_ascii()
        || c.is_whitespace()
        || ('\u{4E00}'..='\u{9FFF}').contains(&c)
        || ('\u{3000}'..='\u{303F}').contains(&c)
        || ('\u{FF00}'..='\u{FFEF}').contains(&c)
        || ('\u{2000}'..='\u{206F}').contains(&c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_utf8() {
        let decoded = decode("第一章 开始".as_bytes(), None);
        assert_eq!(decoded.text, "第一章 开始");
        assert_eq!(decoded.encoding, "UTF-8");
        assert!(decoded.error.is_none());
    }

    #[test]
    fn test_decode_strips_utf8_bom() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("正文".as_bytes());
        let decoded = decode(&bytes, None);
        assert_eq!(decoded.text, "正文");
    }

    #[test]
    fn test_decode_falls_back_to_gb18030() {
        let (bytes, _, _) = GB18030.encode("这是一个用国标编码保存的文件。");
        let decoded = decode(&bytes, None);
        assert_eq!(decoded.encoding, "gb18030");
        assert_eq!(decoded.text, "这是一个用国标编码保存的文件。");
    }

    #[test]
    fn test_decode_honours_hint() {
        let (bytes, _, _) = BIG5.encode("繁體中文的內容");
        let decoded = decode(&bytes, Some("big5"));
        assert_eq!(decoded.encoding, "Big5");
        assert_eq!(decoded.text, "繁體中文的內容");
    }

    #[test]
    fn test_unknown_hint_is_ignored() {
        let decoded = decode(b"plain", Some("no-such-encoding"));
        assert_eq!(decoded.text, "plain");
        assert_eq!(decoded.encoding, "UTF-8");
    }

    #[test]
    fn test_garbled_replacement_run() {
        assert!(is_garbled("正常文字\u{FFFD}\u{FFFD}\u{FFFD}正常文字"));
        assert!(!is_garbled("正常文字\u{FFFD}\u{FFFD}正常文字正常文字正常文字正常文字正常文字"));
    }

    #[test]
    fn test_garbled_foreign_ratio() {
        // Latin-1 supplement noise typical of mis-decoded GBK
        assert!(is_garbled("ÄãºÃÊÀ½ç"));
        assert!(!is_garbled("Hello, 世界！「引号」"));
        assert!(!is_garbled(""));
    }

    #[test]
    fn test_garbled_only_samples_prefix() {
        let text = format!("{}{}", "好".repeat(1000), "é".repeat(500));
        assert!(!is_garbled(&text));
    }
}
