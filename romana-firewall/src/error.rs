use romana_net::ConfigError;

/// Firewall errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The address layout is invalid.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    /// An iptables command failed.
    #[error("kernel command failed: {0}")]
    Kernel(#[from] romana_exec::Error),
    /// The rule ledger failed.
    #[error("ledger error: {0}")]
    Ledger(#[from] romana_ledger::Error),
    /// A chain or rule the operation relies on does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

/// Result alias for firewall operations.
pub type Result<T> = std::result::Result<T, Error>;
