//! Error types for the openPMD core.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Sub-kind of [`Error::Read`], distinguishing how a read went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadErrorKind {
    /// The backend returned data that does not match what the frontend
    /// expected (e.g. wrong datatype, wrong rank).
    UnexpectedContent,
    /// The underlying file or stream could not be read at all.
    UnreadableFile,
    /// The hierarchy on disk violates the openPMD schema.
    SchemaInconsistency,
}

impl std::fmt::Display for ReadErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReadErrorKind::UnexpectedContent => "unexpected content",
            ReadErrorKind::UnreadableFile => "unreadable file",
            ReadErrorKind::SchemaInconsistency => "schema inconsistency",
        };
        f.write_str(s)
    }
}

/// What kind of object a [`Error::Read`] happened against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadTarget {
    Attribute,
    PathOrDataset,
}

impl std::fmt::Display for ReadTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReadTarget::Attribute => "attribute",
            ReadTarget::PathOrDataset => "path/dataset",
        };
        f.write_str(s)
    }
}

/// All error kinds the core can raise, per the error-handling design in
/// §7: every variant names the offending openPMD path so a caller can
/// locate the failure without further context.
#[derive(Error, Debug)]
pub enum Error {
    #[error("no such attribute '{attribute}' on '{path}'")]
    NoSuchAttribute { path: String, attribute: String },

    #[error("wrong API usage at '{path}': {what}")]
    WrongApiUsage { path: String, what: String },

    #[error("operation unsupported in backend '{backend}' at '{path}': {what}")]
    OperationUnsupportedInBackend {
        backend: String,
        path: String,
        what: String,
    },

    #[error("backend config schema error at {}: {what}", .location.join("."))]
    BackendConfigSchema { location: Vec<String>, what: String },

    #[error("read error ({kind}) on {target} at '{path}': {what}")]
    Read {
        kind: ReadErrorKind,
        target: ReadTarget,
        path: String,
        what: String,
    },

    #[error("internal error (please report): {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Stable, machine-readable identifier for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NoSuchAttribute { .. } => "NO_SUCH_ATTRIBUTE",
            Error::WrongApiUsage { .. } => "WRONG_API_USAGE",
            Error::OperationUnsupportedInBackend { .. } => "OPERATION_UNSUPPORTED_IN_BACKEND",
            Error::BackendConfigSchema { .. } => "BACKEND_CONFIG_SCHEMA",
            Error::Read { .. } => "READ_ERROR",
            Error::Internal(_) => "INTERNAL",
            Error::Io(_) => "IO",
            Error::Json(_) => "JSON",
            Error::Toml(_) => "TOML",
        }
    }

    pub fn wrong_api_usage(path: impl Into<String>, what: impl Into<String>) -> Self {
        Error::WrongApiUsage {
            path: path.into(),
            what: what.into(),
        }
    }

    pub fn no_such_attribute(path: impl Into<String>, attribute: impl Into<String>) -> Self {
        Error::NoSuchAttribute {
            path: path.into(),
            attribute: attribute.into(),
        }
    }

    pub fn internal(what: impl Into<String>) -> Self {
        Error::Internal(what.into())
    }

    pub fn read(
        kind: ReadErrorKind,
        target: ReadTarget,
        path: impl Into<String>,
        what: impl Into<String>,
    ) -> Self {
        Error::Read {
            kind,
            target,
            path: path.into(),
            what: what.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        let e = Error::wrong_api_usage("/data/0", "cannot reopen closed iteration");
        assert_eq!(e.code(), "WRONG_API_USAGE");
    }

    #[test]
    fn display_names_the_path() {
        let e = Error::no_such_attribute("/data/0/meshes/E", "unitSI");
        let msg = e.to_string();
        assert!(msg.contains("/data/0/meshes/E"));
        assert!(msg.contains("unitSI"));
    }

    #[test]
    fn config_schema_joins_location() {
        let e = Error::BackendConfigSchema {
            location: vec!["hdf5".into(), "dataset".into(), "chunks".into()],
            what: "expected array or \"auto\"".into(),
        };
        assert!(e.to_string().contains("hdf5.dataset.chunks"));
    }
}
