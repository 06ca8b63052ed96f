// Analyzer module: aggregates submodules for different aspects of analysis.

pub mod price_analysis;
pub mod market_indicators;
pub mod range;
pub mod weekly;

// Re-export the main Analyzer implementation for ease of use.
pub use price_analysis::{Analyzer, AnalyzerImpl};
pub use range::{Clock, FixedClock, SystemClock};
