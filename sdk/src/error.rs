use {crate::io::SourceState, std::io};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The engine's provider keeps its state out of reach, so no checkpoint can be taken.
    /// Uploads using it must succeed in a single pass.
    #[error("engine from provider `{provider}` cannot be cloned")]
    EngineNotCloneable { provider: String },
    /// A read failed and the continuation provider could not resume it.
    #[error(
        "read failed after {delivered} bytes and could not be continued \
        (continuation error: {continuation})"
    )]
    RecoverableReadFailure {
        delivered: u64,
        #[source]
        source: io::Error,
        continuation: io::Error,
    },
    #[error("cannot continue a source that is {state}")]
    IllegalContinuationState { state: SourceState },
    #[error("no downstream sink is attached")]
    SinkNotAttached,
    #[error("checkpoint cannot be used to rewind this pipeline: {reason}")]
    RewindWithoutCheckpoint { reason: String },
    #[error("unsupported cipher `{0}`")]
    UnsupportedCipher(String),
    #[error("invalid key length for {cipher}: got {actual}, expected {expected}")]
    InvalidKeyLength {
        cipher: String,
        actual: usize,
        expected: usize,
    },
    #[error("AES keys must be 16, 24 or 32 bytes long, got {actual}")]
    UnsupportedKeyLength { actual: usize },
    #[error("invalid IV length for {cipher}: got {actual}, expected {expected}")]
    InvalidIvLength {
        cipher: String,
        actual: usize,
        expected: usize,
    },
    #[error("engine has already produced its final block")]
    EngineFinished,
    #[error("cipher stream has already been finalized")]
    PipelineFinished,
    #[error("authentication tag mismatch")]
    AuthenticationFailed,
    #[error("invalid padding in final block")]
    InvalidPadding,
    #[error("ciphertext is truncated: got {actual} bytes, need at least {expected}")]
    TruncatedCiphertext { actual: u64, expected: u64 },
    #[error("ciphertext body of {actual} bytes is not a multiple of the {block_len}-byte block")]
    MisalignedCiphertext { actual: u64, block_len: usize },
    /// GCM with a 32-bit block counter cannot encrypt more than `limit` bytes under one IV.
    #[error("message exceeds the {limit}-byte limit of the cipher")]
    MessageTooLong { limit: u64 },
    #[error("source is closed")]
    SourceClosed,
    #[error("engine provider `{provider}` failed: {message}")]
    External { provider: String, message: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<Error> for io::Error {
    #[inline]
    fn from(err: Error) -> Self {
        match err {
            Error::Io(err) => err,
            other => io::Error::other(other),
        }
    }
}
