use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};

/// Coarse label attached to every detected heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChapterKind {
    /// Front or back matter: 前言, 简介, 楔子, 后记...
    Intro,
    /// Bonus chapters (番外).
    Extra,
    Main,
}

impl ChapterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChapterKind::Intro => "intro",
            ChapterKind::Extra => "extra",
            ChapterKind::Main => "main",
        }
    }
}

/// A detected, unverified chapter start.
///
/// `position` and `length` are byte offsets into the source text so the
/// segmenter can slice without re-scanning. All thresholds that talk about
/// "characters" are measured in code points by the code that produces these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterCandidate {
    pub position: usize,
    pub matched_text: String,
    pub length: usize,
    pub kind: ChapterKind,
    pub number: Option<u32>,
}

impl ChapterCandidate {
    pub fn end(&self) -> usize {
        self.position + self.length
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    pub body: String,
    pub order: usize,
    pub kind: ChapterKind,
}

/// A literal prefix/suffix pair wrapped around a chapter number, e.g.
/// prefix `"Chapter "` and suffix `""`, or prefix `"卷"` and suffix `"："`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterTemplate {
    pub prefix: String,
    pub suffix: String,
}

impl ChapterTemplate {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.prefix.trim().is_empty() && self.suffix.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverImage {
    /// Raw image bytes as uploaded.
    Bytes(Vec<u8>),
    /// A `data:image/...;base64,` URL or a bare base64 payload.
    DataUrl(String),
}

#[derive(Debug, Clone)]
pub struct Document {
    pub title: String,
    pub author: String,
    pub cover: Option<CoverImage>,
    pub chapters: Vec<Chapter>,
}

/// The finished archive. Only ever constructed from a completed buffer.
#[derive(Debug, Clone)]
pub struct PackagedBook {
    pub identifier: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessResult {
    pub chapters: Vec<Chapter>,
    pub strategy: &'static str,
}

/// Everything one conversion needs, as received from the caller.
#[derive(Debug, Clone, Default)]
pub struct ConversionRequest {
    pub title: String,
    pub author: String,
    pub source: Vec<u8>,
    pub encoding_hint: Option<String>,
    pub cover: Option<CoverImage>,
    pub templates: Vec<ChapterTemplate>,
}

impl ConversionRequest {
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(ConvertError::Validation("book title is required".into()));
        }
        if self.author.trim().is_empty() {
            return Err(ConvertError::Validation("author is required".into()));
        }
        if self.source.is_empty() {
            return Err(ConvertError::Validation("source text file is required".into()));
        }
        Ok(())
    }
}
