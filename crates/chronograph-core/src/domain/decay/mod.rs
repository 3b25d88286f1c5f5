//! Confidence decay
//!
//! Relationship confidence is stored as recorded and decayed on read,
//! relative to a viewpoint time. [`DecayPolicy`] is the default
//! [`DecayModel`]; [`ReinforcementLedger`] tracks affirmations that slow
//! the decay of individual relationships.

mod policy;
mod reinforcement;

pub use policy::{DecayFunction, DecayModel, DecayOutcome, DecayPolicy, DecayStep};
pub use reinforcement::{ReinforcementConfig, ReinforcementLedger, ReinforcementStats};
