//!
//!

use std::fmt;
use std::sync::Arc;

/// Where an unresolved node came from. Lines and columns are zero based;
/// rendering adds one.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SourcePos {
    pub file: Option<Arc<str>>,
    pub line: u32,
    pub column: u32,
}

impl SourcePos {
    pub fn new(line: u32, column: u32) -> Self {
        Self {
            file: None,
            line,
            column,
        }
    }

    pub fn in_file(file: impl Into<Arc<str>>, line: u32, column: u32) -> Self {
        Self {
            file: Some(file.into()),
            line,
            column,
        }
    }

    pub fn file_name(&self) -> &str {
        self.file.as_deref().unwrap_or("<input>")
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file_name(), self.line + 1, self.column + 1)
    }
}
