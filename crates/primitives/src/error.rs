use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid field element `{0}`: not a canonical BN254 scalar")]
    InvalidField(String),
    #[error("invalid integer `{0}`: expected a decimal or 0x-hex 256-bit value")]
    InvalidInteger(String),
    #[error("invalid hex `{input}`: expected {expected} bytes")]
    InvalidHex { input: String, expected: usize },
    #[error("amount {0} does not fit in the scalar field")]
    AmountExceedsField(String),
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("unsupported encoding version: {0}")]
    UnsupportedVersion(u8),
    #[error("trailing bytes in {0}")]
    TrailingBytes(&'static str),
}
