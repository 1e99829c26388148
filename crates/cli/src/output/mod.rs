//! Output formatting shared by all commands

mod formatter;

pub use formatter::Formatter;

/// Global output switches taken from the command line
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Strict JSON on stdout, no colors or progress bars
    pub json: bool,
    pub no_color: bool,
    /// Suppress everything but errors
    pub quiet: bool,
}
