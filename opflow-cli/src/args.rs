use std::num::NonZeroUsize;

use clap::Args;
use opflow_core::Preset;

use crate::output::OutputFormat;

#[derive(Debug, Args, Clone)]
pub struct OutputArgs {
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub format: OutputFormat,
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    /// Overrides the manifest's `max_concurrent`.
    #[arg(long)]
    pub max_concurrent: Option<NonZeroUsize>,
    /// Default policy preset for operations that do not name their own
    /// (`foreground` or `background`). Overrides the manifest's `preset`.
    #[arg(long)]
    pub preset: Option<Preset>,
}
