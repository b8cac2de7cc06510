use tracing::{debug, info, warn};

use super::classifier::synthesize_front_title;
use super::decoder;
use super::detector::BoundaryDetector;
use super::epub::EpubBuilder;
use crate::error::{ConvertError, Result};
use crate::models::{
    Chapter, ChapterCandidate, ChapterKind, ChapterTemplate, ConversionRequest, Document,
    PackagedBook, ProcessResult,
};
use crate::utils::format_file_size;

/// Title of the single chapter produced when no boundaries are found.
pub const FULL_TEXT_TITLE: &str = "Full text";

/// Content before the first heading is kept only when longer than this.
const FRONT_MATTER_MIN_CHARS: usize = 50;

/// Outcome of a successful conversion.
#[derive(Debug)]
pub struct Conversion {
    pub book: PackagedBook,
    pub chapter_count: usize,
    pub encoding: &'static str,
    /// Set when decoding fell back to best-effort text.
    pub warning: Option<ConvertError>,
}

pub fn process_text(text: &str, templates: &[ChapterTemplate]) -> ProcessResult {
    // Step 1: find chapter boundaries
    let detection = BoundaryDetector::new(templates).detect(text);

    // Step 2: slice the text at those boundaries
    let chapters = segment(text, &detection.candidates);

    ProcessResult {
        chapters,
        strategy: detection.strategy,
    }
}

/// Slice `text` into chapters at the given boundaries.
///
/// `candidates` must be ordered by position. Never returns an empty list.
pub fn segment(text: &str, candidates: &[ChapterCandidate]) -> Vec<Chapter> {
    let Some(first) = candidates.first() else {
        return vec![full_text_chapter(text)];
    };

    let mut chapters = Vec::with_capacity(candidates.len() + 1);

    if first.position > 0 {
        let intro = text.get(..first.position).unwrap_or_default().trim();
        if intro.chars().count() > FRONT_MATTER_MIN_CHARS {
            let title = synthesize_front_title(intro);
            debug!("adding front matter chapter {:?}", title);
            chapters.push(Chapter {
                title,
                body: intro.to_string(),
                order: 0,
                kind: ChapterKind::Intro,
            });
        } else if !intro.is_empty() {
            debug!(
                chars = intro.chars().count(),
                "discarding short text before the first heading"
            );
        }
    }

    for (i, candidate) in candidates.iter().enumerate() {
        let end = candidates
            .get(i + 1)
            .map_or(text.len(), |next| next.position);
        let body = text
            .get(candidate.end()..end)
            .map(clean_chapter_body)
            .unwrap_or_default();

        if body.is_empty() {
            debug!("dropping empty chapter {:?}", candidate.matched_text);
            continue;
        }

        chapters.push(Chapter {
            title: candidate.matched_text.clone(),
            body: body.to_string(),
            order: chapters.len(),
            kind: candidate.kind,
        });
    }

    if chapters.is_empty() {
        return vec![full_text_chapter(text)];
    }
    chapters
}

fn full_text_chapter(text: &str) -> Chapter {
    Chapter {
        title: FULL_TEXT_TITLE.to_string(),
        body: text.trim().to_string(),
        order: 0,
        kind: ChapterKind::Main,
    }
}

/// Trim the span and drop blank lines left between heading and prose.
fn clean_chapter_body(span: &str) -> &str {
    span.trim_start_matches(['\r', '\n']).trim()
}

/// Run the whole pipeline: validate, decode, chapterize, package.
pub fn convert(request: &ConversionRequest, builder: &EpubBuilder) -> Result<Conversion> {
    request.validate()?;

    let decoded = decoder::decode(&request.source, request.encoding_hint.as_deref());
    if let Some(err) = &decoded.error {
        warn!("{}; continuing with best-effort text", err);
    }
    if decoded.text.trim().is_empty() {
        return Err(decoded
            .error
            .unwrap_or_else(|| ConvertError::Validation("source text is empty".into())));
    }
    info!(
        chars = decoded.text.chars().count(),
        encoding = decoded.encoding,
        "source text decoded"
    );

    let result = process_text(&decoded.text, &request.templates);
    info!(
        strategy = result.strategy,
        "found {} chapters",
        result.chapters.len()
    );

    let document = Document {
        title: request.title.trim().to_string(),
        author: request.author.trim().to_string(),
        cover: request.cover.clone(),
        chapters: result.chapters,
    };
    let book = builder.build(&document)?;
    info!(
        identifier = %book.identifier,
        "EPUB generated: {} chapters, {}",
        document.chapters.len(),
        format_file_size(book.data.len() as u64)
    );

    Ok(Conversion {
        book,
        chapter_count: document.chapters.len(),
        encoding: decoded.encoding,
        warning: decoded.error,
    })
}
