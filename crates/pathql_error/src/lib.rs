//! Error type shared by every pathql crate.
//!
//! A single [`QueryError`] covers the whole pipeline. The [`ErrorKind`]
//! distinguishes where an error came from; parse and bind errors additionally
//! carry [`ParseDetails`] pointing at the offending lexeme.

use std::borrow::Cow;
use std::error::Error;
use std::fmt;

pub type Result<T, E = QueryError> = std::result::Result<T, E>;

/// Return an "unsupported" error from the current function.
#[macro_export]
macro_rules! not_implemented {
    ($($arg:tt)*) => {
        return Err($crate::QueryError::unsupported(format!(
            "Not yet implemented: {}",
            format!($($arg)*)
        )))
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed query text.
    Parse,
    /// Query text parsed but could not be resolved against the catalog.
    Bind,
    /// Failure reported by the execution backend.
    Backend,
    /// Operation not meaningful for the current state of a node.
    Unsupported,
    /// Invalid configuration value.
    Config,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Parse => "parse",
            Self::Bind => "bind",
            Self::Backend => "backend",
            Self::Unsupported => "unsupported",
            Self::Config => "config",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Location information for errors raised while parsing or binding query
/// text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDetails {
    /// The lexeme the error was raised at. Empty at end of input.
    pub lexeme: String,
    /// Description of what was expected instead, if known.
    pub expected: Option<String>,
    /// Full query text.
    pub source_text: String,
    /// Byte offset of the lexeme.
    pub offset: usize,
    /// Line of the lexeme, starting at 1.
    pub line: usize,
    /// Column of the lexeme, starting at 1.
    pub col: usize,
}

#[derive(Debug)]
pub struct QueryError {
    inner: Box<QueryErrorInner>,
}

#[derive(Debug)]
struct QueryErrorInner {
    kind: ErrorKind,
    msg: String,
    details: Option<ParseDetails>,
    fields: Vec<(Cow<'static, str>, String)>,
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl QueryError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Internal, msg)
    }

    pub fn with_kind(kind: ErrorKind, msg: impl Into<String>) -> Self {
        QueryError {
            inner: Box::new(QueryErrorInner {
                kind,
                msg: msg.into(),
                details: None,
                fields: Vec::new(),
                source: None,
            }),
        }
    }

    pub fn with_source(
        msg: impl Into<String>,
        source: Box<dyn Error + Send + Sync + 'static>,
    ) -> Self {
        let mut err = Self::new(msg);
        err.inner.source = Some(source);
        err
    }

    pub fn parse(msg: impl Into<String>, details: ParseDetails) -> Self {
        Self::with_kind(ErrorKind::Parse, msg).with_details(details)
    }

    pub fn bind(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Bind, msg)
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Backend, msg)
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Unsupported, msg)
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Config, msg)
    }

    /// Attach a key/value pair to the error, displayed after the message.
    pub fn with_field(
        mut self,
        key: impl Into<Cow<'static, str>>,
        value: impl fmt::Display,
    ) -> Self {
        self.inner.fields.push((key.into(), value.to_string()));
        self
    }

    pub fn with_details(mut self, details: ParseDetails) -> Self {
        self.inner.details = Some(details);
        self
    }

    /// Replace the source of this error.
    pub fn set_source(mut self, source: Box<dyn Error + Send + Sync + 'static>) -> Self {
        self.inner.source = Some(source);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.inner.kind
    }

    pub fn message(&self) -> &str {
        &self.inner.msg
    }

    pub fn details(&self) -> Option<&ParseDetails> {
        self.inner.details.as_ref()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner
            .fields
            .iter()
            .map(|(k, v)| (k.as_ref(), v.as_str()))
    }

    pub fn get_field(&self, key: &str) -> Option<&str> {
        self.fields().find(|(k, _)| *k == key).map(|(_, v)| v)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.msg)?;

        if let Some(details) = &self.inner.details {
            if details.lexeme.is_empty() {
                write!(f, " at end of query")?;
            } else {
                write!(
                    f,
                    " at '{}' (line {}, column {})",
                    details.lexeme, details.line, details.col
                )?;
            }
            if let Some(expected) = &details.expected {
                write!(f, ", expected {expected}")?;
            }
        }

        if !self.inner.fields.is_empty() {
            write!(f, " [")?;
            for (idx, (k, v)) in self.inner.fields.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{k}: {v}")?;
            }
            write!(f, "]")?;
        }

        if let Some(source) = &self.inner.source {
            write!(f, ": {source}")?;
        }

        Ok(())
    }
}

impl Error for QueryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.inner
            .source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn Error + 'static))
    }
}

impl From<fmt::Error> for QueryError {
    fn from(value: fmt::Error) -> Self {
        QueryError::with_source("Format error", Box::new(value))
    }
}

impl From<std::io::Error> for QueryError {
    fn from(value: std::io::Error) -> Self {
        QueryError::with_source("IO error", Box::new(value))
    }
}

/// Wrap foreign errors with a message.
pub trait ResultExt<T, E> {
    fn context(self, msg: &str) -> Result<T>;
    fn context_fn<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E> ResultExt<T, E> for std::result::Result<T, E>
where
    E: Error + Send + Sync + 'static,
{
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| QueryError::with_source(msg, Box::new(e)))
    }

    fn context_fn<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| QueryError::with_source(f(), Box::new(e)))
    }
}

pub trait OptionExt<T> {
    /// Error if the value is None, naming the missing thing.
    fn required(self, what: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn required(self, what: &str) -> Result<T> {
        match self {
            Some(v) => Ok(v),
            None => Err(QueryError::new(format!("Missing required value: {what}"))),
        }
    }
}
