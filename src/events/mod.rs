// Event module
// Frame/feature types and the extractor that produces ring events

pub mod extractor;
pub mod types;

pub use extractor::{ExtractorConfig, FeatureExtractor};
pub use types::{AudioFrame, FeatureEvent};
