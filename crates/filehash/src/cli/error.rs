//! Helpful error types for CLI commands
//!
//! Every error includes:
//! - What went wrong
//! - Context about the situation
//! - Suggestions for how to fix it

use std::fmt;
use std::path::Path;

/// An error with helpful context and suggestions
#[derive(Debug)]
pub struct HelpfulError {
    /// The main error message
    pub message: String,
    /// Additional context about what was happening
    pub context: Option<String>,
    /// Suggestions for how to fix the error
    pub suggestions: Vec<String>,
}

impl HelpfulError {
    /// Create a new helpful error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
        }
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Add a suggestion for fixing the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Add multiple suggestions
    pub fn with_suggestions(
        mut self,
        suggestions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.suggestions
            .extend(suggestions.into_iter().map(|s| s.into()));
        self
    }

    // === Common error constructors ===

    /// Scan root does not exist
    pub fn path_not_found(path: &Path) -> Self {
        Self::new(format!("Path not found: {}", path.display()))
            .with_context("The directory to scan does not exist on the filesystem")
            .with_suggestions([
                format!("TRY: Check that the path exists: ls -la {}", path.display()),
                "TRY: Check for typos in the path".to_string(),
            ])
    }

    /// Scan root is a file
    pub fn not_a_directory(path: &Path) -> Self {
        Self::new(format!("Not a directory: {}", path.display()))
            .with_context("filehash scans directories, not single files")
            .with_suggestion(format!(
                "TRY: Scan the parent directory: filehash {}",
                path.parent()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| ".".to_string())
            ))
    }

    /// No inventory at the given location yet
    pub fn database_not_found(path: &Path) -> Self {
        Self::new(format!("No inventory database at {}", path.display()))
            .with_context("Reports read an existing database; nothing has been scanned here yet")
            .with_suggestions([
                "TRY: Run a scan first: filehash <directory>".to_string(),
                "TRY: Point at another database: --database <path> or FILEHASH_DB".to_string(),
            ])
    }

    /// Another process holds the writer lock
    pub fn database_locked(path: &Path, detail: &str) -> Self {
        Self::new(format!("Database is busy: {}", path.display()))
            .with_context(detail.to_string())
            .with_suggestions([
                "TRY: Wait for the other scan or prune to finish".to_string(),
                "TRY: Use a separate database with --database <path>".to_string(),
            ])
    }

    /// Argument to --hash is not an MD5 digest
    pub fn invalid_hash(hash: &str) -> Self {
        Self::new(format!("Invalid hash: '{}'", hash))
            .with_context("Content hashes are 32 hexadecimal characters (MD5)")
            .with_suggestion("TRY: Copy a hash from the duplicates table: filehash --report")
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.message)?;

        if let Some(ctx) = &self.context {
            writeln!(f, "CONTEXT: {}", ctx)?;
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            for suggestion in &self.suggestions {
                writeln!(f, "  {}", suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for HelpfulError {}
