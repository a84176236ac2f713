use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Which half of the pipeline an error came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Fill,
    Convert,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Fill => f.write_str("filling"),
            Stage::Convert => f.write_str("converting"),
        }
    }
}

#[derive(Debug)]
pub enum Error {
    MalformedArchive(zip::result::ZipError),
    MissingContentMember(String),
    InvalidMarkup(roxmltree::Error),
    InvalidValue { key: String, reason: String },
    InvalidSyntax(String),
    UnfilledPlaceholders(Vec<String>),
    BookmarkNotFound(String),
    ConflictingBookmarkEdits(String),
    InvalidEncoding(String),
    Io {
        stage: Stage,
        source: std::io::Error,
    },
    ExternalToolNotFound(PathBuf),
    ConversionFailed {
        status: Option<i32>,
        diagnostics: String,
    },
    Timeout(Duration),
}

impl Error {
    /// I/O failure while running the converter.
    pub(crate) fn converting(e: std::io::Error) -> Self {
        Error::Io {
            stage: Stage::Convert,
            source: e,
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            Error::ExternalToolNotFound(_)
            | Error::ConversionFailed { .. }
            | Error::Timeout(_) => Stage::Convert,
            Error::Io { stage, .. } => *stage,
            _ => Stage::Fill,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MalformedArchive(e) => write!(f, "not a valid document package: {e}"),
            Error::MissingContentMember(name) => {
                write!(f, "document package has no '{name}' member")
            }
            Error::InvalidMarkup(e) => write!(f, "content markup is not well-formed: {e}"),
            Error::InvalidValue { key, reason } => {
                write!(f, "value for '{key}' cannot be placed in markup: {reason}")
            }
            Error::InvalidSyntax(reason) => write!(f, "invalid placeholder syntax: {reason}"),
            Error::UnfilledPlaceholders(names) => {
                write!(f, "no value supplied for placeholders: {}", names.join(", "))
            }
            Error::BookmarkNotFound(name) => write!(f, "bookmark '{name}' not found"),
            Error::ConflictingBookmarkEdits(name) => {
                write!(f, "bookmark edits overlap at '{name}'")
            }
            Error::InvalidEncoding(member) => write!(f, "'{member}' is not valid UTF-8"),
            Error::Io { source, .. } => write!(f, "IO error: {source}"),
            Error::ExternalToolNotFound(path) => {
                write!(f, "converter not found: {}", path.display())
            }
            Error::ConversionFailed { status, diagnostics } => {
                match status {
                    Some(code) => write!(f, "converter exited with status {code}")?,
                    None => write!(f, "converter produced no output")?,
                }
                let diagnostics = diagnostics.trim();
                if !diagnostics.is_empty() {
                    write!(f, ": {diagnostics}")?;
                }
                Ok(())
            }
            Error::Timeout(limit) => write!(f, "converter did not finish within {limit:?}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::MalformedArchive(e) => Some(e),
            Error::InvalidMarkup(e) => Some(e),
            Error::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(e: zip::result::ZipError) -> Self {
        match e {
            zip::result::ZipError::Io(io) => Error::from(io),
            other => Error::MalformedArchive(other),
        }
    }
}

impl From<roxmltree::Error> for Error {
    fn from(e: roxmltree::Error) -> Self {
        Error::InvalidMarkup(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io {
            stage: Stage::Fill,
            source: e,
        }
    }
}
