//! Confirmation Record Store (C4) and Parallel Confirmation Processor (C5):
//! spec §4.4, §4.5.

pub mod processor;
pub mod record;
pub mod store;

pub use processor::{ConfirmationOutcome, ConfirmationResult, ParallelConfirmationProcessor, Priority, ProcessorConfig};
pub use record::{
    ConfirmationInput, ConfirmationRecord, ConfirmationStatus, ConfirmationSummary, DualConfirmationStatus, DualStatus,
};
pub use store::{ConfirmationRecordStore, RegulatoryReport};
