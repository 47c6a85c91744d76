//! Significance / angle engine

pub mod engine;
pub mod significance;
pub mod templates;


pub use engine::{
    AngleConfig, AngleEngine, AnglePair, DiscoveryRun, SignificanceResult, TemplateEvaluation,
};
pub use significance::Strength;
pub use templates::{builtin_templates, AngleTemplate};
