//! Single-text protocols

pub mod veto;

pub use veto::{
    FixedSequence, OutcomeGenerator, RandomOutcomes, VetoSTMechanism, VetoSingleText,
    DEFAULT_EPSILON,
};
