//! Queue planners
//!
//! Three policies create rows in the post store:
//!
//! - [`generator`]: fresh posts for catalog products at free posting slots
//! - [`autopilot`]: tops the lookahead window up to its target size
//! - [`repost`]: resurfaces past posts that performed well

pub mod autopilot;
pub mod generator;
pub mod repost;
pub mod slots;

pub use autopilot::{run_autopilot, AutopilotOutcome};
pub use generator::{DirectGenerator, GenerateRequest, GenerationReport};
pub use repost::{generate_reposts, RepostReport, RepostRequest};
