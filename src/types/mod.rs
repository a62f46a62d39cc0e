//! Core data types: identities, input payloads, and output records.

mod identity;
mod payload;
mod records;

pub use identity::SignalIdentity;
pub use payload::{
    ElectricalData, ElectricalMessage, Message, PhaseData, SignalMessage, StateMessage,
    VibrationMessage,
};
pub use records::{
    AnalyticsRecord, CloseReason, CycleResult, DecisionRecord, InrushResult, PhaseCycleResult,
    StateRecord, VibrationRecord,
};
