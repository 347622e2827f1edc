use thiserror::Error;

/// Shared error taxonomy for the FinP2P router core (spec §7).
///
/// Every subsystem crate maps its own local failures into this enum at the
/// point where they cross a crate boundary, the same way `atlas-common`'s
/// `AtlasError` is the landing type for `atlas-ledger`/`atlas-node` errors.
#[derive(Debug, Error)]
pub enum FinP2PError {
    /// Startup-only; always fatal.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Adapter or peer not available; caller may retry after backoff.
    #[error("not connected: {0}")]
    NotConnected(String),

    /// Requested ledger absent from the registry.
    #[error("ledger not supported: {0}")]
    LedgerNotSupported(String),

    /// Available balance is less than the requested amount.
    #[error("insufficient balance: {0}")]
    InsufficientBalance(String),

    /// A reservation id does not exist (or was already released).
    #[error("reservation not found: {0}")]
    ReservationNotFound(String),

    /// A reservation was already promoted to an on-ledger lock.
    #[error("already locked: {0}")]
    AlreadyLocked(String),

    /// A state-machine or lifecycle transition is not permitted from the
    /// current state.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// Router is neither primary nor an eligible backup for the asset.
    #[error("authority denied: {0}")]
    AuthorityDenied(String),

    /// A suspension exceeded its configured bound.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Wraps a ledger-specific adapter failure.
    #[error("adapter error: {0}")]
    Adapter(String),

    /// Key-value store I/O failure; retryable.
    #[error("store error: {0}")]
    Store(String),

    /// A record's schema_version is newer than this build understands.
    #[error("unsupported schema version {found} (expected <= {max})")]
    UnsupportedSchemaVersion { found: u16, max: u16 },

    /// A record already exists where uniqueness was required.
    #[error("already registered: {0}")]
    AlreadyRegistered(String),

    /// Catch-all for conditions that don't warrant their own variant yet.
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, FinP2PError>;
