use std::fmt;

use crate::error::SourceSpan;

#[derive(Debug)]
pub struct FileLoadError {
    pub message: String,
    pub span: SourceSpan,
}

impl fmt::Display for FileLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.span)
    }
}

impl std::error::Error for FileLoadError {}
