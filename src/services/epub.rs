//! EPUB packaging for a chaptered [`Document`].
//!
//! The book is a single content document with one section per chapter, an
//! EPUB 3 navigation document plus an NCX map for older readers (both
//! pointing at those sections), and an optional cover image. Everything is rendered before the first archive entry is written,
//! so a failure never leaves a half-built archive behind.

use std::borrow::Cow;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use super::archive::{ArchiveSink, Compression, ZipArchiveSink};
use crate::error::{ConvertError, Result};
use crate::models::{ChapterKind, CoverImage, Document, PackagedBook};

pub const MIMETYPE: &str = "application/epub+zip";

pub const DEFAULT_LANGUAGE: &str = "zh-CN";

/// Consecutive line breaks at or above this count start a new paragraph.
const PARAGRAPH_BREAK_RUN: usize = 3;

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

const STYLESHEET: &str = r#"    body {
      font-family: "SimSun", "宋体", "Songti SC", serif;
      margin: 5%;
      line-height: 1.8;
      text-align: justify;
    }
    h1 {
      text-align: center;
      margin: 2em 0 1em 0;
      font-size: 1.8em;
      border-bottom: 2px solid #333;
      padding-bottom: 0.5em;
    }
    h2 {
      text-align: center;
      margin: 2em 0 1em 0;
      font-size: 1.4em;
      color: #333;
      border-bottom: 1px solid #ddd;
      padding-bottom: 0.3em;
    }
    .content p {
      text-indent: 2em;
      margin: 0.8em 0;
    }
    .cover {
      text-align: center;
      margin: 3em 0;
    }
    .cover img {
      max-width: 60%;
      height: auto;
    }
    .chapter {
      page-break-before: always;
      margin-top: 2em;
    }
    .chapter.intro h2 {
      color: #666;
      font-style: italic;
    }
"#;

/// Decoded cover ready to be packaged.
#[derive(Debug, Clone)]
struct CoverAsset {
    data: Vec<u8>,
    media_type: &'static str,
    file_name: String,
}

impl CoverAsset {
    fn from_image(image: &CoverImage) -> Result<Self> {
        let (data, declared) = match image {
            CoverImage::Bytes(bytes) => (bytes.clone(), None),
            CoverImage::DataUrl(url) => decode_data_url(url)?,
        };
        if data.is_empty() {
            return Err(ConvertError::Encoding("cover image is empty".into()));
        }

        let (media_type, extension) = sniff_image(&data)
            .or_else(|| declared.as_deref().and_then(image_type_for_mime))
            .unwrap_or(("image/jpeg", "jpg"));

        Ok(Self {
            data,
            media_type,
            file_name: format!("cover.{}", extension),
        })
    }
}

/// Split a `data:<mime>;base64,<payload>` URL (or a bare base64 payload)
/// into raw bytes and the declared media type.
fn decode_data_url(url: &str) -> Result<(Vec<u8>, Option<String>)> {
    let url = url.trim();
    let (declared, payload) = match url.strip_prefix("data:") {
        Some(rest) => {
            let (header, payload) = rest.split_once(',').ok_or_else(|| {
                ConvertError::Encoding("cover data URL has no payload".into())
            })?;
            let Some(mime) = header.strip_suffix(";base64") else {
                return Err(ConvertError::Encoding(
                    "cover data URL is not base64-encoded".into(),
                ));
            };
            (Some(mime.to_string()), payload)
        }
        None => (None, url),
    };

    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let data = STANDARD.decode(compact.as_bytes())?;
    Ok((data, declared))
}

fn sniff_image(data: &[u8]) -> Option<(&'static str, &'static str)> {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(("image/jpeg", "jpg"))
    } else if data.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some(("image/png", "png"))
    } else if data.starts_with(b"GIF8") {
        Some(("image/gif", "gif"))
    } else if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        Some(("image/webp", "webp"))
    } else {
        None
    }
}

fn image_type_for_mime(mime: &str) -> Option<(&'static str, &'static str)> {
    match mime.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => Some(("image/jpeg", "jpg")),
        "image/png" => Some(("image/png", "png")),
        "image/gif" => Some(("image/gif", "gif")),
        "image/webp" => Some(("image/webp", "webp")),
        _ => None,
    }
}

/// Builds EPUB archives. Holds no per-book state, so one instance can be
/// shared across requests.
#[derive(Debug, Clone)]
pub struct EpubBuilder {
    language: String,
}

impl EpubBuilder {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
        }
    }

    pub fn build(&self, document: &Document) -> Result<PackagedBook> {
        self.build_with(document, ZipArchiveSink::new())
    }

    pub fn build_with<A: ArchiveSink>(&self, document: &Document, mut archive: A) -> Result<PackagedBook> {
        let identifier = format!("urn:uuid:{}", Uuid::new_v4());
        let modified = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let cover = document
            .cover
            .as_ref()
            .map(CoverAsset::from_image)
            .transpose()?;

        let opf = render_manifest(document, &identifier, &modified, &self.language, cover.as_ref());
        let ncx = render_navigation(document, &identifier);
        let nav = render_nav_document(document, &self.language);
        let xhtml = render_content(document, &self.language, cover.as_ref());

        // mimetype must be first and uncompressed
        archive.add_entry("mimetype", MIMETYPE.as_bytes(), Compression::Stored)?;
        archive.add_entry("META-INF/container.xml", CONTAINER_XML.as_bytes(), Compression::Deflated)?;
        archive.add_entry("content.opf", opf.as_bytes(), Compression::Deflated)?;
        archive.add_entry("toc.ncx", ncx.as_bytes(), Compression::Deflated)?;
        archive.add_entry("nav.xhtml", nav.as_bytes(), Compression::Deflated)?;
        archive.add_entry("content.xhtml", xhtml.as_bytes(), Compression::Deflated)?;
        if let Some(cover) = &cover {
            archive.add_entry(&cover.file_name, &cover.data, Compression::Deflated)?;
        }

        let data = archive.finish()?;
        debug!(
            identifier = %identifier,
            bytes = data.len(),
            has_cover = cover.is_some(),
            "EPUB archive assembled"
        );

        Ok(PackagedBook { identifier, data })
    }
}

impl Default for EpubBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_LANGUAGE)
    }
}

/// Escape `&`, `<`, `>`, `"` and `'` for XML text and attribute values.
pub fn escape_markup(text: &str) -> Cow<'_, str> {
    html_escape::encode_quoted_attribute(text)
}

fn render_manifest(
    document: &Document,
    identifier: &str,
    modified: &str,
    language: &str,
    cover: Option<&CoverAsset>,
) -> String {
    let mut opf = String::new();

    opf.push_str(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package version="3.0" xmlns="http://www.idpf.org/2007/opf" unique-identifier="book-id">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
"#,
    );
    opf.push_str(&format!(
        "    <dc:identifier id=\"book-id\">{}</dc:identifier>\n",
        escape_markup(identifier)
    ));
    opf.push_str(&format!(
        "    <dc:title>{}</dc:title>\n",
        escape_markup(&document.title)
    ));
    opf.push_str(&format!(
        "    <dc:creator>{}</dc:creator>\n",
        escape_markup(&document.author)
    ));
    opf.push_str(&format!(
        "    <dc:language>{}</dc:language>\n",
        escape_markup(language)
    ));
    opf.push_str(&format!(
        "    <meta property=\"dcterms:modified\">{}</meta>\n",
        modified
    ));
    if cover.is_some() {
        opf.push_str("    <meta name=\"cover\" content=\"cover-image\"/>\n");
    }

    opf.push_str("  </metadata>\n  <manifest>\n");
    opf.push_str(
        "    <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\"/>\n",
    );
    opf.push_str(
        "    <item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\"/>\n",
    );
    opf.push_str(
        "    <item id=\"content\" href=\"content.xhtml\" media-type=\"application/xhtml+xml\"/>\n",
    );
    if let Some(cover) = cover {
        opf.push_str(&format!(
            "    <item id=\"cover-image\" href=\"{}\" media-type=\"{}\" properties=\"cover-image\"/>\n",
            cover.file_name, cover.media_type
        ));
    }

    opf.push_str("  </manifest>\n  <spine toc=\"ncx\">\n    <itemref idref=\"content\"/>\n  </spine>\n</package>\n");
    opf
}

fn render_navigation(document: &Document, identifier: &str) -> String {
    let mut ncx = String::new();

    ncx.push_str(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
"#,
    );
    ncx.push_str(&format!(
        "    <meta name=\"dtb:uid\" content=\"{}\"/>\n",
        escape_markup(identifier)
    ));
    ncx.push_str(
        r#"    <meta name="dtb:depth" content="1"/>
    <meta name="dtb:totalPageCount" content="0"/>
    <meta name="dtb:maxPageNumber" content="0"/>
  </head>
"#,
    );
    ncx.push_str(&format!(
        "  <docTitle>\n    <text>{}</text>\n  </docTitle>\n",
        escape_markup(&document.title)
    ));
    ncx.push_str(&format!(
        "  <docAuthor>\n    <text>{}</text>\n  </docAuthor>\n",
        escape_markup(&document.author)
    ));

    ncx.push_str("  <navMap>\n");
    for chapter in &document.chapters {
        let n = chapter.order + 1;
        ncx.push_str(&format!(
            "    <navPoint id=\"navpoint-{}\" playOrder=\"{}\">\n",
            n, n
        ));
        ncx.push_str(&format!(
            "      <navLabel><text>{}</text></navLabel>\n",
            escape_markup(&chapter.title)
        ));
        ncx.push_str(&format!(
            "      <content src=\"content.xhtml#chapter-{}\"/>\n",
            n
        ));
        ncx.push_str("    </navPoint>\n");
    }
    ncx.push_str("  </navMap>\n</ncx>\n");
    ncx
}

/// EPUB 3 table of contents. Same targets and labels as the NCX map.
fn render_nav_document(document: &Document, language: &str) -> String {
    let mut nav = String::new();
    let language = escape_markup(language);
    let title = escape_markup(&document.title);

    nav.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!DOCTYPE html>\n");
    nav.push_str(&format!(
        "<html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\" lang=\"{}\" xml:lang=\"{}\">\n",
        language, language
    ));
    nav.push_str(&format!(
        "<head>\n  <meta charset=\"UTF-8\"/>\n  <title>{}</title>\n</head>\n<body>\n",
        title
    ));
    nav.push_str("  <nav epub:type=\"toc\" id=\"toc\">\n");
    nav.push_str(&format!("    <h1>{}</h1>\n    <ol>\n", title));
    for chapter in &document.chapters {
        nav.push_str(&format!(
            "      <li><a href=\"content.xhtml#chapter-{}\">{}</a></li>\n",
            chapter.order + 1,
            escape_markup(&chapter.title)
        ));
    }
    nav.push_str("    </ol>\n  </nav>\n</body>\n</html>\n");
    nav
}

fn render_content(document: &Document, language: &str, cover: Option<&CoverAsset>) -> String {
    let mut xhtml = String::new();
    let language = escape_markup(language);
    let title = escape_markup(&document.title);

    xhtml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!DOCTYPE html>\n");
    xhtml.push_str(&format!(
        "<html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\" lang=\"{}\" xml:lang=\"{}\">\n",
        language, language
    ));
    xhtml.push_str(&format!(
        "<head>\n  <meta charset=\"UTF-8\"/>\n  <title>{}</title>\n  <style type=\"text/css\">\n{}  </style>\n</head>\n<body>\n",
        title, STYLESHEET
    ));

    xhtml.push_str("  <div id=\"cover\" class=\"cover\">\n");
    xhtml.push_str(&format!("    <h1>{}</h1>\n", title));
    xhtml.push_str(&format!(
        "    <h2>{}</h2>\n",
        escape_markup(&document.author)
    ));
    if let Some(cover) = cover {
        xhtml.push_str(&format!(
            "    <img src=\"{}\" alt=\"{}\"/>\n",
            cover.file_name, title
        ));
    }
    xhtml.push_str("  </div>\n");

    for chapter in &document.chapters {
        let class = match chapter.kind {
            ChapterKind::Main => "chapter".to_string(),
            kind => format!("chapter {}", kind.as_str()),
        };
        xhtml.push_str(&format!(
            "  <div id=\"chapter-{}\" class=\"{}\">\n",
            chapter.order + 1,
            class
        ));
        xhtml.push_str(&format!(
            "    <h2>{}</h2>\n",
            escape_markup(&chapter.title)
        ));
        xhtml.push_str("    <div class=\"content\">\n      ");
        xhtml.push_str(&reflow_paragraphs(&chapter.body));
        xhtml.push_str("\n    </div>\n  </div>\n");
    }

    xhtml.push_str("</body>\n</html>\n");
    xhtml
}

/// Turn plain chapter text into paragraph markup.
///
/// The text is escaped first so nothing in the body can inject tags. Runs of
/// three or more line breaks start a new paragraph; shorter runs become
/// `<br/>`, except right after a paragraph opens.
pub fn reflow_paragraphs(body: &str) -> String {
    let escaped = html_escape::encode_text(body);
    let normalized = escaped.replace("\r\n", "\n").replace('\r', "\n");

    let mut html = String::with_capacity(normalized.len() + 16);
    html.push_str("<p>");

    let mut chars = normalized.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\n' {
            html.push(c);
            continue;
        }

        let mut run = 1;
        while chars.next_if_eq(&'\n').is_some() {
            run += 1;
        }
        if html.ends_with("<p>") {
            continue;
        }
        if run >= PARAGRAPH_BREAK_RUN {
            html.push_str("</p><p>");
        } else {
            for _ in 0..run {
                html.push_str("<br/>");
            }
        }
    }

    if html.ends_with("</p><p>") {
        html.truncate(html.len() - "<p>".len());
    } else {
        html.push_str("</p>");
    }
    html
}
