use thiserror::Error;

/// Errors raised while reading XML text or a binary-encoded tree.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum XmlError {
    #[error("document is not valid UTF-8: {0}")]
    Encoding(String),

    #[error("malformed XML at byte {position}: {message}")]
    Syntax { position: u64, message: String },

    #[error("document has no root element")]
    NoRootElement,

    #[error("unexpected content after the root element at byte {0}")]
    TrailingContent(u64),

    #[error("element <{0}> is not closed")]
    Unclosed(String),

    #[error("corrupt binary tree: {0}")]
    CorruptBinary(String),
}
