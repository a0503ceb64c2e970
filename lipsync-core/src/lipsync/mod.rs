//! Mouth-shape (viseme) timing derived from synthesized speech

pub mod parser;
pub mod rhubarb;
pub mod types;

pub use rhubarb::{ExtractionInput, RhubarbExtractor, VisemeExtractor};
pub use types::{MouthShape, VisemeCue, VisemeTrack};
