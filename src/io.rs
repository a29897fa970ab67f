//! Status output and file input/output.

pub mod utils;

use indicatif::{ProgressBar, ProgressStyle};

/// How much status information to print while running.
#[derive(Clone, Debug)]
pub enum Verbosity {
    Quiet,
    Messages,
    Progress(ProgressStyle),
}

impl Verbosity {
    /// Whether non-critical status messages should be printed.
    pub fn print_messages(&self) -> bool {
        !matches!(self, Self::Quiet)
    }

    /// Creates a progress bar for the given number of work items, which is
    /// hidden unless progress reporting is enabled.
    pub fn create_progress_bar(&self, size: usize) -> ProgressBar {
        match self {
            Self::Progress(style) => ProgressBar::new(size as u64).with_style(style.clone()),
            _ => ProgressBar::hidden(),
        }
    }
}

/// How to handle existing files when writing output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverwriteMode {
    Ask,
    Always,
    Never,
}
