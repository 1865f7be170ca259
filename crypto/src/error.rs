use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid public key: not a valid curve point")]
    InvalidKey,

    #[error("key agreement produced a non-contributory shared secret")]
    WeakSharedSecret,

    #[error("random source unavailable: {0}")]
    Random(String),

    #[error("encryption failed")]
    Encryption,

    #[error("decryption failed: {0}")]
    Decryption(&'static str),

    #[error("frame sealed for the wrong direction")]
    WrongDirection,

    #[error("replayed frame: counter {counter} already seen")]
    Replay { counter: u64 },
}
