pub mod algorithm;
pub mod nearest;
pub mod types;

pub use algorithm::MatchingAlgorithm;
pub use nearest::NearestDriver;
pub use types::MatchCandidate;
