use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Tony Kan, Ted Yu",
    version,
    about = "ttree - Compile hierarchical molecule templates into the numbered sections of a simulation input deck.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile a template file and write one output file per section.
    Build(BuildArgs),
    /// Compile a template file and report what would be written, without writing.
    Check(CheckArgs),
}

/// Options shared by every command that compiles a template.
#[derive(Args, Debug, Clone)]
pub struct CompileArgs {
    /// Path to the top-level template file (e.g., system.lt).
    #[arg(required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Path to a configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    // --- Search Path ---
    /// Add a directory searched by `import` and `include`. Can be used multiple times.
    #[arg(short = 'I', long = "import-path", value_name = "DIR")]
    pub import_paths: Vec<PathBuf>,

    // --- Compiler Overrides ---
    /// Override the atom style used to locate coordinates in `Data Atoms`.
    /// Either a style name (e.g., 'full'), 'hybrid <styles...>' or a column list.
    #[arg(short = 'a', long, value_name = "STYLE")]
    pub atom_style: Option<String>,

    /// Weight centroids by the masses written to `Data Masses`.
    #[arg(long)]
    pub mass_weighted: bool,

    /// Fail on categories that were never declared instead of creating them at the root.
    #[arg(long)]
    pub strict_categories: bool,

    /// Render canonical variable names instead of values and write `.template` files.
    #[arg(long)]
    pub names: bool,

    #[command(flatten)]
    pub type_comments: TypeComments,
}

/// Mutually exclusive flags choosing the comment appended to `Data Masses` lines.
#[derive(Args, Debug, Clone, Copy)]
#[group(required = false, multiple = false)]
pub struct TypeComments {
    /// Annotate each mass with the atom type's full path, e.g. `# Water/O`.
    #[arg(long)]
    pub full_comment_names: bool,
    /// Annotate each mass with the atom type's own name, e.g. `# O`.
    #[arg(long)]
    pub short_comment_names: bool,
    /// Leave `Data Masses` lines as written.
    #[arg(long)]
    pub no_comment_names: bool,
}

/// Arguments for the `build` subcommand.
#[derive(Args, Debug)]
pub struct BuildArgs {
    #[command(flatten)]
    pub compile: CompileArgs,

    /// Directory that receives the output files.
    #[arg(short, long, default_value = ".", value_name = "DIR")]
    pub output_dir: PathBuf,
}

/// Arguments for the `check` subcommand.
#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub compile: CompileArgs,
}
