//! The closed set of user-visible error kinds.
//!
//! Every failure that can be triggered from valid-but-wrong user input is
//! one of these kinds; anything else is an internal error. Errors carry a
//! source location where one is known and travel untouched to the top of
//! the driver, which maps them to an exit code.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result alias used throughout the configure pipeline.
pub type Result<T> = std::result::Result<T, ConfigureError>;

/// A `file:line:column` source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: PathBuf,
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(file: impl Into<PathBuf>, line: u32, column: u32) -> Self {
        Location {
            file: file.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file.display(), self.line, self.column)
    }
}

/// Which class of failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid token in a build definition file.
    Lex,
    /// Unexpected token or malformed argument list.
    Parse,
    /// Structurally valid but semantically wrong code.
    InvalidCode,
    /// Bad argument type, arity, or value for a call.
    InvalidArguments,
    /// Required external dependency missing or version mismatch.
    Dependency,
    /// Compiler not runnable, failed sanity check, or missing machine-file entry.
    Environment,
    /// Invariant violation; not reachable from valid input.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Lex => "lex error",
            ErrorKind::Parse => "parse error",
            ErrorKind::InvalidCode => "invalid code",
            ErrorKind::InvalidArguments => "invalid arguments",
            ErrorKind::Dependency => "dependency error",
            ErrorKind::Environment => "environment error",
            ErrorKind::Internal => "internal error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn render(kind: ErrorKind, message: &str, location: &Option<Location>) -> String {
    match location {
        Some(loc) => format!("{loc}: {kind}: {message}"),
        None => format!("{kind}: {message}"),
    }
}

/// A position-tagged configure failure.
#[derive(Debug, Error)]
pub enum ConfigureError {
    #[error("{}", render(ErrorKind::Lex, .message, .location))]
    Lex {
        message: String,
        location: Option<Location>,
    },
    #[error("{}", render(ErrorKind::Parse, .message, .location))]
    Parse {
        message: String,
        location: Option<Location>,
    },
    #[error("{}", render(ErrorKind::InvalidCode, .message, .location))]
    InvalidCode {
        message: String,
        location: Option<Location>,
    },
    #[error("{}", render(ErrorKind::InvalidArguments, .message, .location))]
    InvalidArguments {
        message: String,
        location: Option<Location>,
    },
    #[error("{}", render(ErrorKind::Dependency, .message, .location))]
    Dependency {
        message: String,
        location: Option<Location>,
    },
    #[error("{}", render(ErrorKind::Environment, .message, .location))]
    Environment {
        message: String,
        location: Option<Location>,
    },
    #[error("{}", render(ErrorKind::Internal, .message, .location))]
    Internal {
        message: String,
        location: Option<Location>,
    },
    #[error("environment error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<anyhow::Error> for ConfigureError {
    fn from(err: anyhow::Error) -> Self {
        ConfigureError::Environment {
            message: err.to_string(),
            location: None,
        }
    }
}

impl ConfigureError {
    pub fn lex(file: &Path, line: u32, column: u32, message: impl Into<String>) -> Self {
        ConfigureError::Lex {
            message: message.into(),
            location: Some(Location::new(file, line, column)),
        }
    }

    pub fn parse(file: &Path, line: u32, column: u32, message: impl Into<String>) -> Self {
        ConfigureError::Parse {
            message: message.into(),
            location: Some(Location::new(file, line, column)),
        }
    }

    pub fn invalid_code(message: impl Into<String>) -> Self {
        ConfigureError::InvalidCode {
            message: message.into(),
            location: None,
        }
    }

    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        ConfigureError::InvalidArguments {
            message: message.into(),
            location: None,
        }
    }

    pub fn dependency(message: impl Into<String>) -> Self {
        ConfigureError::Dependency {
            message: message.into(),
            location: None,
        }
    }

    pub fn environment(message: impl Into<String>) -> Self {
        ConfigureError::Environment {
            message: message.into(),
            location: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ConfigureError::Internal {
            message: format!(
                "{} This is a bug in drydock, please report it.",
                message.into()
            ),
            location: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfigureError::Lex { .. } => ErrorKind::Lex,
            ConfigureError::Parse { .. } => ErrorKind::Parse,
            ConfigureError::InvalidCode { .. } => ErrorKind::InvalidCode,
            ConfigureError::InvalidArguments { .. } => ErrorKind::InvalidArguments,
            ConfigureError::Dependency { .. } => ErrorKind::Dependency,
            ConfigureError::Environment { .. } | ConfigureError::Io(_) => ErrorKind::Environment,
            ConfigureError::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn location(&self) -> Option<&Location> {
        match self {
            ConfigureError::Lex { location, .. }
            | ConfigureError::Parse { location, .. }
            | ConfigureError::InvalidCode { location, .. }
            | ConfigureError::InvalidArguments { location, .. }
            | ConfigureError::Dependency { location, .. }
            | ConfigureError::Environment { location, .. }
            | ConfigureError::Internal { location, .. } => location.as_ref(),
            ConfigureError::Io(_) => None,
        }
    }

    /// Attach a source location, replacing any existing one.
    pub fn at(self, loc: Location) -> Self {
        match self {
            ConfigureError::Lex { message, .. } => ConfigureError::Lex {
                message,
                location: Some(loc),
            },
            ConfigureError::Parse { message, .. } => ConfigureError::Parse {
                message,
                location: Some(loc),
            },
            ConfigureError::InvalidCode { message, .. } => ConfigureError::InvalidCode {
                message,
                location: Some(loc),
            },
            ConfigureError::InvalidArguments { message, .. } => ConfigureError::InvalidArguments {
                message,
                location: Some(loc),
            },
            ConfigureError::Dependency { message, .. } => ConfigureError::Dependency {
                message,
                location: Some(loc),
            },
            ConfigureError::Environment { message, .. } => ConfigureError::Environment {
                message,
                location: Some(loc),
            },
            ConfigureError::Internal { message, .. } => ConfigureError::Internal {
                message,
                location: Some(loc),
            },
            ConfigureError::Io(e) => ConfigureError::Environment {
                message: e.to_string(),
                location: Some(loc),
            },
        }
    }

    /// Attach a source location only when none is recorded yet.
    pub fn or_at(self, loc: Location) -> Self {
        if self.location().is_some() {
            self
        } else {
            self.at(loc)
        }
    }

    /// Process exit code for this failure: 2 for internal errors, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Internal => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_location() {
        let err = ConfigureError::parse(Path::new("meson.build"), 3, 7, "expected ')'");
        assert_eq!(err.to_string(), "meson.build:3:7: parse error: expected ')'");
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_internal_exit_code() {
        let err = ConfigureError::internal("target graph lost a node.");
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("please report"));
    }

    #[test]
    fn test_io_errors_are_environment_kind() {
        let err = ConfigureError::from(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no such file",
        ));
        assert_eq!(err.kind(), ErrorKind::Environment);
        assert!(err.to_string().starts_with("environment error: "));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_or_at_keeps_existing_location() {
        let original = ConfigureError::parse(Path::new("a.build"), 1, 1, "bad");
        let unchanged = original.or_at(Location::new("b.build", 9, 9));
        assert_eq!(unchanged.location().unwrap().file, Path::new("a.build"));

        let tagged =
            ConfigureError::invalid_code("oops").or_at(Location::new("b.build", 9, 9));
        assert_eq!(tagged.location().unwrap().line, 9);
    }
}
