//! Application flow around a meditation
//!
//! - **types**: status, form, areas, scenarios and the generated artifact
//! - **reducer**: the pure state machine and a shared dispatcher
//! - **generation**: the injected generative pipeline and its driver
//! - **rate_limit**: sliding-window request budgets

pub mod generation;
pub mod rate_limit;
pub mod reducer;
pub mod types;

pub use generation::{ArtifactGenerator, GenerationPipeline};
pub use rate_limit::{RateLimit, RateLimiter};
pub use reducer::{reduce, SharedAppState};
pub use types::{
    builtin_scenarios, scenarios_for, AppAction, AppState, AppStatus, FormStep, Gender,
    GeneratedArtifact, LastSelections, LoadingStep, ReprogramArea, Scenario, UserInput,
};
