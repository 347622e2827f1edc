//! Ledger Adapter Interface (C1) and Ledger Manager (C2): spec §4.1–§4.2.

pub mod adapter;
pub mod manager;
pub mod mock;
pub mod operation;
pub mod reservation;

pub use adapter::{AssetSpec, FinalityPolicy, LedgerAdapter, LedgerEvent, LedgerTransaction, TransactionStatus};
pub use manager::{LedgerManager, DEFAULT_EXPIRY_SWEEP_INTERVAL_SECS, DEFAULT_RESERVATION_TIMEOUT_SECS};
pub use mock::MockAdapter;
pub use operation::{CrossLedgerOperation, OperationStatus};
pub use reservation::{BalanceReservation, ReservationKey};
