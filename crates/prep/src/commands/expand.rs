//! The expand command: preprocess input files to stdout.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use prep_config::{CliSettings, Config};
use prep_core::{Preprocessor, PreprocessorConfig, ReportSink};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the expand command.
#[derive(Args)]
pub(crate) struct ExpandArgs {
    /// Input files to expand, in order.
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Add an include search root (repeatable, tried in order).
    #[arg(short = 'I', long = "root", value_name = "DIR")]
    pub roots: Vec<PathBuf>,

    /// Define a constant before expansion (repeatable).
    #[arg(short = 'D', long = "define", value_name = "NAME[=VALUE]")]
    pub defines: Vec<String>,

    /// Directive prefix character.
    #[arg(long, value_name = "CHAR")]
    pub prefix: Option<char>,

    /// Path to a prep.toml configuration file.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Cap on substitution rounds and identifier resolution depth.
    #[arg(long, value_name = "N")]
    pub max_substitution_depth: Option<usize>,

    /// Print info-level directive messages and engine logs.
    #[arg(short, long)]
    pub verbose: bool,
}

impl ExpandArgs {
    /// Execute the command: load configuration, build the preprocessor,
    /// and stream every input file's expansion to stdout.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let Self {
            files,
            roots,
            defines,
            prefix,
            config,
            max_substitution_depth,
            verbose,
        } = self;

        let settings = CliSettings {
            prefix,
            search_roots: roots,
            defines: defines
                .iter()
                .map(|d| parse_define(d))
                .collect::<Result<_, _>>()?,
            max_substitution_depth,
        };
        let config = Config::load(config.as_deref(), Some(&settings))?;

        let engine_config = PreprocessorConfig::default()
            .with_prefix(config.expand_resolved.prefix)
            .with_max_substitution_depth(config.expand_resolved.max_substitution_depth);

        let sink: Arc<dyn ReportSink> = Arc::new(Output::new(verbose));
        let mut pp = Preprocessor::new(engine_config).with_sink(sink);
        pp.files_mut().set_allow_override(true);
        for root in &config.expand_resolved.search_roots {
            pp.add_search_root(root);
        }
        for (name, value) in config.seed_defines() {
            pp.define(name, value.as_deref());
        }

        tracing::debug!(files = files.len(), "starting expansion");

        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        for file in &files {
            let name = file.display().to_string();
            pp.files_mut().register_path(&name, file)?;
            for line in pp.expand(&name)? {
                writeln!(out, "{}", line?)?;
            }
        }
        out.flush()?;

        Ok(())
    }
}

/// Parse a `-D NAME[=VALUE]` argument.
fn parse_define(arg: &str) -> Result<(String, Option<String>), CliError> {
    let (name, value) = match arg.split_once('=') {
        Some((name, value)) => (name, Some(value.to_owned())),
        None => (arg, None),
    };

    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(CliError::Validation(format!(
            "invalid define name: {name:?}"
        )));
    }

    Ok((name.to_owned(), value))
}
