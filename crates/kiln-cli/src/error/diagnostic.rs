//! miette rendering for CLI errors.

use miette::{Report, miette};

use super::{BuildError, CliError, ConfigError};

pub fn cli_error_to_miette(err: CliError) -> Report {
    match err {
        CliError::Build(BuildError::Pipeline(e)) => Report::new(e),
        CliError::Config(e) => config_error_to_miette(e),
        other => miette!("{}", other),
    }
}

fn config_error_to_miette(err: ConfigError) -> Report {
    let help = match &err {
        ConfigError::NoEntries => Some(
            "Declare entries in kiln.toml under [build.entries] or pass --entry name=path",
        ),
        ConfigError::FileNotFound(_) => Some("Check the path given to --config"),
        ConfigError::EntryNotFound { .. } => Some("Entry paths are relative to the project root"),
        ConfigError::Load(_) => Some("Check kiln.toml syntax and KILN_* environment variables"),
        _ => None,
    };
    match help {
        Some(help) => miette!(help = help, "Configuration error: {}", err),
        None => miette!("Configuration error: {}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn pipeline_errors_keep_their_code() {
        let report = cli_error_to_miette(CliError::from(kiln_bundler::Error::UnmatchedEntry {
            entry: "index".into(),
            path: PathBuf::from("index.txt"),
        }));
        let code = report.code().map(|c| c.to_string());
        assert_eq!(code.as_deref(), Some("kiln::unmatched_entry"));
    }

    #[test]
    fn config_errors_carry_help() {
        let report = cli_error_to_miette(CliError::Config(ConfigError::NoEntries));
        assert!(report.help().is_some());
        assert!(report.to_string().contains("no entries specified"));
    }
}
