//! Strain extractor — loads a strain page in a headless browser, captures the
//! strain API response the page fetches, and normalizes it into a flat record.

pub mod capture;
pub mod cli;
pub mod config;
pub mod extractor;
pub mod normalize;
pub mod renderer;
pub mod session;
pub mod types;

pub use capture::{CaptureCell, CaptureStats, ResponseInterceptor};
pub use config::{ExtractorConfig, SettleStrategy};
pub use extractor::StrainExtractor;
pub use normalize::normalize;
pub use renderer::chromium::ChromiumLauncher;
pub use session::Session;
pub use types::*;
