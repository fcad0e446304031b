//! Sizes, durations and the build summary table.

use std::time::Duration;

use console::Term;
use kiln_bundler::{BuildOutput, Placement};
use owo_colors::OwoColorize;

/// ```
/// use kiln_cli::ui::format_size;
///
/// assert_eq!(format_size(0), "0 B");
/// assert_eq!(format_size(1024), "1.00 KB");
/// ```
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit])
    }
}

/// ```
/// use std::time::Duration;
/// use kiln_cli::ui::format_duration;
///
/// assert_eq!(format_duration(Duration::from_millis(50)), "50ms");
/// assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let ms = duration.as_millis();
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

/// One row per artifact: (entry, artifact name, size, placement label).
pub fn summary_rows(output: &BuildOutput) -> Vec<(String, String, u64, String)> {
    output
        .manifest
        .artifacts()
        .map(|(entry, artifact)| {
            let placement = match &artifact.placement {
                Placement::Inline { within } => format!("inline in {}", within),
                Placement::EmittedFile { .. } => "file".to_string(),
            };
            (
                entry.to_string(),
                artifact.name.clone(),
                artifact.size,
                placement,
            )
        })
        .collect()
}

/// Print the artifacts of a committed build to stderr.
pub fn print_build_summary(output: &BuildOutput, elapsed: Duration) {
    let width = (Term::stderr().size().1 as usize).min(80);

    eprintln!(
        "\n{} {}",
        "Build Summary".bold().underline(),
        format!("(generation {}, {})", output.manifest.generation, output.manifest.mode).dimmed()
    );
    eprintln!("{}", "─".repeat(width));

    for (entry, name, size, placement) in summary_rows(output) {
        eprintln!(
            "  {} {} {} {} {}",
            "▸".blue(),
            entry.dimmed(),
            name.bright_white().bold(),
            format_size(size).dimmed(),
            format!("({})", placement).dimmed()
        );
    }

    eprintln!("{}", "─".repeat(width));
    eprintln!(
        "  {} {} in {} files, {}",
        "Total:".bold(),
        format_size(output.total_size()).green(),
        output.files.len(),
        format_duration(elapsed).green()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_bundler::{ArtifactKind, BuildManifest, Generation, OutputArtifact};

    #[test]
    fn sizes() {
        assert_eq!(format_size(1), "1 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(10_485_760), "10.00 MB");
        assert_eq!(format_size(2_147_483_648), "2.00 GB");
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(Duration::from_millis(0)), "0ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
    }

    #[test]
    fn rows_label_placement() {
        let mut output = BuildOutput::default();
        output.manifest = BuildManifest {
            generation: Generation(1),
            mode: "production".into(),
            entries: [(
                "index".to_string(),
                vec![
                    OutputArtifact {
                        name: "index.js".into(),
                        kind: ArtifactKind::Script,
                        placement: Placement::EmittedFile {
                            file: "index.js".into(),
                        },
                        size: 10,
                        digest: "d".into(),
                    },
                    OutputArtifact {
                        name: "src/dot.png".into(),
                        kind: ArtifactKind::Asset,
                        placement: Placement::Inline {
                            within: "index.js".into(),
                        },
                        size: 3,
                        digest: "e".into(),
                    },
                ],
            )]
            .into_iter()
            .collect(),
        };

        let rows = summary_rows(&output);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().any(|r| r.1 == "src/dot.png" && r.3 == "inline in index.js"));
        assert!(rows.iter().any(|r| r.1 == "index.js" && r.3 == "file"));
    }
}
