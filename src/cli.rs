use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::{CompiledConfig, EmptyReferencePolicy, OutputFormat, SplitConfig};

#[derive(Parser, Debug)]
#[command(
    name = "shipsplit",
    version,
    about = "Split shipment tracking exports into per-reference files"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Split(SplitArgs),
    Inspect(InspectArgs),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormatArg {
    Csv,
    Xlsx,
}

impl OutputFormatArg {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
        }
    }
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(value: OutputFormatArg) -> Self {
        match value {
            OutputFormatArg::Csv => Self::Csv,
            OutputFormatArg::Xlsx => Self::Spreadsheet,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum EmptyReferenceArg {
    Isolate,
    Fail,
}

impl EmptyReferenceArg {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Isolate => "isolate",
            Self::Fail => "fail",
        }
    }
}

impl From<EmptyReferenceArg> for EmptyReferencePolicy {
    fn from(value: EmptyReferenceArg) -> Self {
        match value {
            EmptyReferenceArg::Isolate => Self::Isolate,
            EmptyReferenceArg::Fail => Self::Fail,
        }
    }
}

/// Run configuration flags; each one overrides the `--config` file.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub reference_column_pattern: Option<String>,

    #[arg(long, conflicts_with = "no_date_key")]
    pub date_column_pattern: Option<String>,

    #[arg(long, default_value_t = false)]
    pub no_date_key: bool,

    #[arg(long = "extract-pattern")]
    pub extract_patterns: Vec<String>,

    #[arg(long, default_value_t = false)]
    pub no_raw_fallback: bool,

    #[arg(long)]
    pub date_format: Option<String>,

    #[arg(long = "date-input-format")]
    pub date_input_formats: Vec<String>,

    #[arg(long, value_enum)]
    pub output_format: Option<OutputFormatArg>,

    #[arg(long, default_value_t = false)]
    pub archive_per_group: bool,

    #[arg(long)]
    pub archive_name: Option<String>,

    #[arg(long, value_enum)]
    pub empty_reference: Option<EmptyReferenceArg>,

    #[arg(long)]
    pub unparsed_group_name: Option<String>,
}

impl ConfigArgs {
    /// Loads the config file (or defaults), applies flag overrides and
    /// validates the result.
    pub fn resolve(&self) -> Result<(SplitConfig, CompiledConfig)> {
        let mut config = match &self.config {
            Some(path) => SplitConfig::load(path)?,
            None => SplitConfig::default(),
        };

        if let Some(pattern) = &self.reference_column_pattern {
            config.reference_column_pattern = pattern.clone();
        }
        if let Some(pattern) = &self.date_column_pattern {
            config.date_column_pattern = Some(pattern.clone());
        }
        if self.no_date_key {
            config.date_column_pattern = None;
        }
        if !self.extract_patterns.is_empty() {
            config.key_extraction_patterns = self.extract_patterns.clone();
        }
        if self.no_raw_fallback {
            config.raw_fallback = false;
        }
        if let Some(format) = &self.date_format {
            config.canonical_date_format = format.clone();
        }
        if !self.date_input_formats.is_empty() {
            config.date_input_formats = self.date_input_formats.clone();
        }
        if let Some(format) = self.output_format {
            config.output_format = format.into();
        }
        if self.archive_per_group {
            config.archive_per_group = true;
        }
        if let Some(name) = &self.archive_name {
            config.archive_name = name.clone();
        }
        if let Some(policy) = self.empty_reference {
            config.empty_reference_policy = policy.into();
        }
        if let Some(name) = &self.unparsed_group_name {
            config.unparsed_group_name = name.clone();
        }

        let compiled = config
            .compile()
            .context("invalid split configuration")?;
        Ok((config, compiled))
    }

    pub fn render_flags(&self, command: &mut Vec<String>) {
        if let Some(path) = &self.config {
            command.push("--config".to_string());
            command.push(path.display().to_string());
        }
        if let Some(pattern) = &self.reference_column_pattern {
            command.push("--reference-column-pattern".to_string());
            command.push(pattern.clone());
        }
        if let Some(pattern) = &self.date_column_pattern {
            command.push("--date-column-pattern".to_string());
            command.push(pattern.clone());
        }
        if self.no_date_key {
            command.push("--no-date-key".to_string());
        }
        for pattern in &self.extract_patterns {
            command.push("--extract-pattern".to_string());
            command.push(pattern.clone());
        }
        if self.no_raw_fallback {
            command.push("--no-raw-fallback".to_string());
        }
        if let Some(format) = &self.date_format {
            command.push("--date-format".to_string());
            command.push(format.clone());
        }
        for format in &self.date_input_formats {
            command.push("--date-input-format".to_string());
            command.push(format.clone());
        }
        if let Some(format) = self.output_format {
            command.push("--output-format".to_string());
            command.push(format.as_str().to_string());
        }
        if self.archive_per_group {
            command.push("--archive-per-group".to_string());
        }
        if let Some(name) = &self.archive_name {
            command.push("--archive-name".to_string());
            command.push(name.clone());
        }
        if let Some(policy) = self.empty_reference {
            command.push("--empty-reference".to_string());
            command.push(policy.as_str().to_string());
        }
        if let Some(name) = &self.unparsed_group_name {
            command.push("--unparsed-group-name".to_string());
            command.push(name.clone());
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct SplitArgs {
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long, default_value = "split_output")]
    pub output_dir: PathBuf,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    #[command(flatten)]
    pub config: ConfigArgs,

    #[arg(long, env = "APP_PASSWORD", hide_env_values = true)]
    pub app_password: Option<String>,

    #[arg(long, env = "SHIPSPLIT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    #[arg(long)]
    pub email_to: Option<String>,

    #[arg(long, env = "FROM_EMAIL")]
    pub email_from: Option<String>,

    #[arg(long)]
    pub outbox_dir: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub require_delivery: bool,
}

#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    #[arg(long)]
    pub input: PathBuf,

    #[command(flatten)]
    pub config: ConfigArgs,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use std::ffi::OsStr;

    use clap::CommandFactory;

    use super::*;

    fn split_arg_env(id: &str) -> Option<String> {
        let command = Cli::command();
        let split = command.find_subcommand("split").expect("split subcommand");
        split
            .get_arguments()
            .find(|arg| arg.get_id() == id)
            .and_then(|arg| arg.get_env())
            .and_then(OsStr::to_str)
            .map(ToOwned::to_owned)
    }

    #[test]
    fn secrets_can_come_from_the_environment() {
        assert_eq!(
            split_arg_env("password").as_deref(),
            Some("SHIPSPLIT_PASSWORD")
        );
        assert_eq!(split_arg_env("app_password").as_deref(), Some("APP_PASSWORD"));
        assert_eq!(split_arg_env("email_from").as_deref(), Some("FROM_EMAIL"));
    }

    #[test]
    fn password_flag_still_parses() {
        let cli = Cli::try_parse_from([
            "shipsplit",
            "split",
            "--input",
            "ups.csv",
            "--password",
            "hunter2",
            "--no-date-key",
        ])
        .expect("arguments should parse");

        let Commands::Split(args) = cli.command else {
            panic!("expected split");
        };
        assert_eq!(args.password.as_deref(), Some("hunter2"));
        assert!(args.config.no_date_key);
        assert_eq!(args.output_dir, PathBuf::from("split_output"));
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
