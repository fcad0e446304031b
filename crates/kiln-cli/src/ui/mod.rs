//! Terminal output: status lines, the build summary and a spinner.
//!
//! Everything goes to stderr so stdout stays free for machine-readable
//! output.
//!
//! ```no_run
//! use kiln_cli::ui;
//!
//! ui::init_colors(false);
//! let spinner = ui::Spinner::new("Building...");
//! spinner.finish("Built generation #1");
//! ui::success("Wrote frontend/dist");
//! ```

mod format;
mod messages;
mod spinner;

pub use format::{format_duration, format_size, print_build_summary, summary_rows};
pub use messages::{debug, error, info, success, warning};
pub use spinner::Spinner;

/// Common CI environment markers.
pub fn is_ci() -> bool {
    ["CI", "GITHUB_ACTIONS", "GITLAB_CI", "CIRCLECI", "TRAVIS"]
        .iter()
        .any(|var| std::env::var_os(var).is_some())
}

/// Apply `--no-color` and the environment to owo-colors' global override.
pub fn init_colors(no_color: bool) {
    let enabled = !no_color && crate::logger::should_use_colors();
    owo_colors::set_override(enabled);
}
