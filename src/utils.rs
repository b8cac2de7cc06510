use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

const SIZE_UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

/// Human readable size, e.g. `1.5 KB`.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    let formatted = format!("{:.2}", size);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, SIZE_UNITS[unit])
}

/// File name for a downloaded book: `<title>_<author>.epub` with path and
/// control characters replaced.
pub fn epub_file_name(title: &str, author: &str) -> String {
    let stem = format!("{}_{}", title.trim(), author.trim());
    let cleaned: String = stem
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    format!("{}.epub", cleaned)
}

/// `Content-Disposition` value carrying both an ASCII fallback name and the
/// UTF-8 name from RFC 5987.
pub fn attachment_disposition(title: &str, author: &str) -> String {
    let file_name = epub_file_name(title, author);
    let ascii: String = file_name
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii,
        utf8_percent_encode(&file_name, NON_ALPHANUMERIC)
    )
}
