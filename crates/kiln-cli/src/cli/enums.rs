use clap::ValueEnum;
use kiln_bundler::Mode;

#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
pub enum ModeArg {
    /// Minified output, extracted stylesheets, optimised images
    #[value(name = "production")]
    Production,

    /// Readable output, stylesheets injected by the bundle
    #[value(name = "development")]
    Development,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Production => Mode::Production,
            ModeArg::Development => Mode::Development,
        }
    }
}
