pub mod archive;
pub mod chapterizer;
pub mod classifier;
pub mod decoder;
pub mod detector;
pub mod epub;
pub mod numerals;
