use std::fmt;

/// Exit codes: every fatal condition terminates with the same failure status
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;

/// Location information for error reporting
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(file: String, line: usize, column: usize) -> Self {
        Self { file, line, column }
    }

    /// Calculate location from content and byte offset
    pub fn from_offset(content: &str, offset: usize, file: &str) -> Self {
        let mut offset = offset.min(content.len());
        while !content.is_char_boundary(offset) {
            offset -= 1;
        }
        let before = &content[..offset];
        let lines: Vec<&str> = before.split('\n').collect();
        let line = lines.len();
        let column = lines.last().map(|l| l.chars().count() + 1).unwrap_or(1);

        Location::new(file.to_string(), line, column)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Main error type for tplcmd
#[derive(Debug, thiserror::Error)]
pub enum TplError {
    // Startup configuration
    #[error("{var} must be set")]
    Config { var: String },

    // Template loading errors
    #[error("Invalid template glob '{pattern}': {source}")]
    TemplateGlob {
        pattern: String,
        source: glob::PatternError,
    },

    #[error("No templates matched glob '{pattern}'")]
    NoTemplates { pattern: String },

    #[error("Failed to read template file '{path}': {source}")]
    TemplateRead {
        path: String,
        source: std::io::Error,
    },

    #[error("Template parse error at {location}: {message}")]
    TemplateCompile { message: String, location: Location },

    // CLI usage error
    #[error("Usage error: {0}")]
    Usage(String),

    // Data errors
    #[error("Invalid JSON in {origin}: {source}")]
    InvalidJson {
        origin: String,
        source: serde_json::Error,
    },

    #[error("Stream input must be a JSON array: {0}")]
    StreamFormat(String),

    // Execution errors
    #[error("Failed to render template '{template}': {message}")]
    Render { template: String, message: String },

    // Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TplError {
    /// Get the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            TplError::Config { .. }
            | TplError::TemplateGlob { .. }
            | TplError::NoTemplates { .. }
            | TplError::TemplateRead { .. }
            | TplError::TemplateCompile { .. }
            | TplError::Usage(_)
            | TplError::InvalidJson { .. }
            | TplError::StreamFormat(_)
            | TplError::Render { .. }
            | TplError::Io(_) => EXIT_FAILURE,
        }
    }

    /// Format error for machine-readable output
    pub fn format_machine_readable(&self) -> String {
        match self {
            TplError::Config { var } => format!("ERROR code=CONFIG var=\"{}\"", var),
            TplError::TemplateGlob { pattern, .. } | TplError::NoTemplates { pattern } => {
                format!("ERROR code=TEMPLATE_GLOB pattern=\"{}\"", pattern)
            }
            TplError::TemplateCompile { location, .. } => {
                format!(
                    "ERROR code=TEMPLATE_COMPILE template=\"{}\" line={} col={}",
                    location.file, location.line, location.column
                )
            }
            TplError::InvalidJson { origin, .. } => {
                format!("ERROR code=INVALID_JSON origin=\"{}\"", origin)
            }
            TplError::StreamFormat(_) => "ERROR code=STREAM_FORMAT".to_string(),
            TplError::Render { template, .. } => {
                format!("ERROR code=RENDER template=\"{}\"", template)
            }
            _ => format!("ERROR: {}", self),
        }
    }
}
