//! Error types for parsing and comparison.
//!
//! Parse errors and divergences are deliberately separate: a parse error is
//! fatal and aborts the affected file, while divergences between two
//! well-formed traces are the tool's ordinary output and are returned as
//! data from the comparator, never as an `Err`.

/// All errors that can abort the parse of one trace file.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The file could not be read at all. Reported before parsing begins.
    #[error("{file}: {source}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },

    /// A recognized header arrived somewhere the grammar does not allow it.
    #[error("{file}:{line}: {reason}: >>{text}<<")]
    Malformed {
        file: String,
        line: u32,
        text: String,
        reason: String,
    },

    /// A new sibling or group header arrived while the named node's
    /// declared child count was still unmet.
    #[error("{file}:{line}: {node} declared {declared} children but has {actual}")]
    StructuralGap {
        file: String,
        line: u32,
        node: String,
        declared: u32,
        actual: u32,
    },
}

/// Errors from setting up a comparison (not divergences).
#[derive(Debug, thiserror::Error)]
pub enum CompareError {
    /// The requested group label is absent from one side.
    #[error("group \"{label}\" not found in {file}")]
    GroupNotFound { label: String, file: String },
}
