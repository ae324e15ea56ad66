use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum FfmError {
    /// Weight buffer could not be obtained (or its size overflows).
    AllocationFailure(String),
    /// Label, feature column, or model file content of the wrong type.
    MalformedInput(String),
    /// File could not be opened, created or written.
    IoFailure(String),
    /// Operation not allowed on the model or parameters as they are.
    InvalidState(String),
}

impl fmt::Display for FfmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FfmError::AllocationFailure(msg) => write!(f, "allocation failure: {}", msg),
            FfmError::MalformedInput(msg) => write!(f, "malformed input: {}", msg),
            FfmError::IoFailure(msg) => write!(f, "io failure: {}", msg),
            FfmError::InvalidState(msg) => write!(f, "invalid state: {}", msg),
        }
    }
}

impl Error for FfmError {}

/// Shorthand used at the places where errors originate, so they can be `?`-ed into `Box<dyn Error>`
pub fn malformed<T>(msg: String) -> Result<T, Box<dyn Error>> {
    Err(Box::new(FfmError::MalformedInput(msg)))
}

/// Returns the typed error behind a boxed one, if there is any
pub fn kind_of(e: &Box<dyn Error>) -> Option<&FfmError> {
    e.downcast_ref::<FfmError>()
}
