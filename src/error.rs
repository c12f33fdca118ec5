/// Error types for the bytegrep library
use std::fmt;

/// Result type alias for bytegrep operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pattern compilation and program I/O
///
/// Compile-time variants carry the originating pattern's user index,
/// expression, and encoding so callers can report which pattern of a large
/// list failed. The VM itself has no failure modes for well-formed
/// programs, so there are no runtime variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The pattern text could not be parsed
    Parse {
        /// Pattern user index
        user_index: u64,
        /// The offending expression
        expression: String,
        /// Byte offset of the parse failure within the expression
        position: usize,
        /// What went wrong
        message: String,
    },

    /// The pattern admits only (or preferentially) the empty match
    EmptyPattern {
        /// Pattern user index
        user_index: u64,
        /// The offending expression
        expression: String,
    },

    /// An encoding name is not in the encoder catalog
    UnknownEncoding {
        /// Pattern user index
        user_index: u64,
        /// The unrecognized encoding name
        encoding: String,
    },

    /// A literal codepoint has no representation under the requested encoder
    NonRepresentable {
        /// Pattern user index
        user_index: u64,
        /// The offending expression
        expression: String,
        /// Encoding that rejected the codepoint
        encoding: String,
        /// The unrepresentable codepoint
        codepoint: u32,
    },

    /// Generated bytecode exceeds the offset or operand encoding limits
    ProgramTooLarge(String),

    /// Bad magic, version, length, or structure while loading a program
    Deserialize(String),

    /// I/O errors, propagated opaquely from the caller's reader
    Io(String),
}

impl Error {
    /// The user index of the pattern that produced this error, if any
    pub fn user_index(&self) -> Option<u64> {
        match self {
            Error::Parse { user_index, .. }
            | Error::EmptyPattern { user_index, .. }
            | Error::UnknownEncoding { user_index, .. }
            | Error::NonRepresentable { user_index, .. } => Some(*user_index),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Parse {
                user_index,
                expression,
                position,
                message,
            } => write!(
                f,
                "pattern {}: parse error in '{}' at offset {}: {}",
                user_index, expression, position, message
            ),
            Error::EmptyPattern {
                user_index,
                expression,
            } => write!(
                f,
                "pattern {}: '{}' admits the empty match",
                user_index, expression
            ),
            Error::UnknownEncoding {
                user_index,
                encoding,
            } => write!(f, "pattern {}: unknown encoding '{}'", user_index, encoding),
            Error::NonRepresentable {
                user_index,
                expression,
                encoding,
                codepoint,
            } => write!(
                f,
                "pattern {}: '{}': U+{:04X} is not representable in {}",
                user_index, expression, codepoint, encoding
            ),
            Error::ProgramTooLarge(msg) => write!(f, "program too large: {}", msg),
            Error::Deserialize(msg) => write!(f, "program deserialization error: {}", msg),
            Error::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

/// Accumulated errors from a pattern list
///
/// `ProgramBuilder::add_pattern_list` keeps going after a bad pattern so a
/// single run reports every failure; the chain is returned as one value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorList {
    /// The accumulated errors, in pattern order
    pub errors: Vec<Error>,
}

impl ErrorList {
    /// An empty chain
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Append an error to the chain
    pub fn push(&mut self, err: Error) {
        self.errors.push(err);
    }

    /// True if no errors accumulated
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of accumulated errors
    pub fn len(&self) -> usize {
        self.errors.len()
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorList {}

impl From<Error> for ErrorList {
    fn from(err: Error) -> Self {
        Self { errors: vec![err] }
    }
}
