use std::fmt;
use std::io;

use framelink_peer::ConnectionError;
use framelink_schema::SchemaError;
use framelink_transport::TransportError;

// Process exit codes. 124 matches timeout(1).
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::InvalidInput => USAGE,
        io::ErrorKind::InvalidData => DATA_INVALID,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::InvalidOrigin { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        TransportError::Closed(_) => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn schema_error(context: &str, err: SchemaError) -> CliError {
    match err {
        SchemaError::ValidationFailed { .. } | SchemaError::InvalidJson(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        SchemaError::NoSchema(_) | SchemaError::LoadFailed(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        SchemaError::CompileFailed(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
    }
}

pub fn connection_error(context: &str, err: ConnectionError) -> CliError {
    match err {
        ConnectionError::Schema(err) => schema_error(context, err),
        ConnectionError::HandshakeTimeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        ConnectionError::Disconnected(_) | ConnectionError::Failed(_) => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        ConnectionError::InvalidState { .. } => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}
