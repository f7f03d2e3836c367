use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyParseError {
    #[error("key `{key}` has {found} sections, expected {expected}")]
    SectionCount {
        key: String,
        found: usize,
        expected: usize,
    },
    #[error("section `{section}` of key `{key}`: {reason}")]
    Malformed {
        key: String,
        section: String,
        reason: String,
    },
}
