use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    /// A required operator library is not registered. Fatal at startup.
    #[error("Operator library unavailable: {0}")]
    Load(String),

    /// The supplied graph or descriptor violates the bridge contract. Fatal at startup.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// A single step's graph evaluation failed. The turn has already been released.
    #[error("Execution failed at step {step}: {message}")]
    Execution { step: u64, message: String },

    /// Graceful shutdown signal from the simulation side.
    #[error("Control channel closed")]
    ChannelClosed,

    #[error("Shared buffer error: {0}")]
    Buffer(String),

    #[error("Rendezvous error: {0}")]
    Rendezvous(String),

    #[error("IPC error: {0}")]
    Ipc(String),

    #[error("Graph error: {0}")]
    Graph(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BridgeError {
    /// Every condition except channel closure ends the compute process.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, BridgeError::ChannelClosed)
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
