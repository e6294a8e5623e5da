use clap::{Parser, Subcommand};
use mdprint::config::{self, ConverterConfig, Overrides};
use mdprint::convert::{self, Pipeline};
use mdprint::output;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mdprint")]
#[command(version)]
#[command(about = "Convert Markdown to printable, Japanese-optimized HTML")]
#[command(long_about = "\
Convert Markdown to printable, Japanese-optimized HTML

Every .md file under the input directory becomes a self-contained .html page
at the mirrored path under the output directory:

  markdown/                 html/
  ├── index.md        →     ├── index.html
  └── guide/                └── guide/
      └── setup.md    →         └── setup.html

Images are classified by URL (badge, avatar, banner, content-image) and a
size hint in the alt text sets their display size:

  ![Architecture {: .size-large }](images/arch.png)

Settings are read from mdprint.toml in the working directory (or --config).
Run 'mdprint gen-config' to print a documented config file.")]
struct Cli {
    /// Config file (default: ./mdprint.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct ConvertArgs {
    /// Input directory (default: ./markdown or ./md)
    input_dir: Option<PathBuf>,

    /// Output directory (default: ./html)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Maximum parallel conversions
    #[arg(long)]
    max_workers: Option<usize>,

    /// Stylesheet appended after the built-in CSS
    #[arg(long)]
    custom_css: Option<PathBuf>,

    /// Start pages in the dark theme
    #[arg(long, overrides_with = "no_dark_mode")]
    dark_mode: bool,

    /// Start pages in the light theme, even if the config enables dark mode
    #[arg(long, overrides_with = "dark_mode")]
    no_dark_mode: bool,

    /// Print the conversion status as JSON instead of the tree and summary
    #[arg(long)]
    json: bool,
}

impl ConvertArgs {
    /// `Some` only when a theme flag was given; the last one wins.
    fn dark_mode_override(&self) -> Option<bool> {
        match (self.dark_mode, self.no_dark_mode) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Convert every .md file under a directory
    Convert(ConvertArgs),
    /// Convert a single Markdown file
    File {
        /// Markdown file to convert
        path: PathBuf,
        /// Write the page here instead of next to the source
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Print a stock mdprint.toml with all options documented
    GenConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match cli.command {
        Command::Convert(args) => run_convert(cli.config.as_deref(), args),
        Command::File { path, output_dir } => {
            run_file(cli.config.as_deref(), &path, output_dir.as_deref())
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            ExitCode::SUCCESS
        }
    }
}

/// Log to stderr. `RUST_LOG` wins over `--debug`.
fn init_tracing(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
}

/// Load the config file and apply command-line overrides, then validate.
fn load_settings(
    explicit: Option<&Path>,
    overrides: Overrides,
) -> Result<(ConverterConfig, Option<PathBuf>), config::ConfigError> {
    let cwd = std::env::current_dir()?;
    let (mut settings, used) = config::load_config(explicit, &cwd)?;
    settings.apply(overrides);
    settings.validate()?;
    Ok((settings, used))
}

fn run_convert(config_path: Option<&Path>, args: ConvertArgs) -> ExitCode {
    let dark_mode = args.dark_mode_override();
    let overrides = Overrides {
        input_dir: args.input_dir,
        output_dir: args.output_dir,
        max_workers: args.max_workers,
        custom_css: args.custom_css,
        dark_mode,
    };
    let (settings, used) = match load_settings(config_path, overrides) {
        Ok(loaded) => loaded,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let Some(input_dir) = settings.resolve_input_dir(&cwd) else {
        error!("Input directory not found (tried ./markdown and ./md)");
        return ExitCode::FAILURE;
    };
    let output_dir = settings.output_dir.clone();

    info!(
        input = %input_dir.display(),
        output = %output_dir.display(),
        max_workers = settings.max_workers,
        dark_mode = settings.dark_mode,
        custom_css = %settings.custom_css.as_deref().map(|p| p.display().to_string()).unwrap_or_else(|| "none".into()),
        config = %used.as_deref().map(|p| p.display().to_string()).unwrap_or_else(|| "defaults".into()),
        "configuration"
    );

    let sources = match convert::discover(&input_dir) {
        Ok(sources) => sources,
        Err(e) => {
            error!(error = %e, "conversion aborted");
            return ExitCode::FAILURE;
        }
    };
    if sources.is_empty() {
        warn!(input = %input_dir.display(), "no markdown files found");
        return ExitCode::SUCCESS;
    }

    init_thread_pool(settings.max_workers);
    let pipeline = match Pipeline::from_config(&settings) {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    if !args.json {
        output::print_start(&input_dir, &output_dir, sources.len());
    }
    let report = match pipeline.convert_all(&input_dir, &output_dir, &sources) {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "conversion aborted");
            return ExitCode::FAILURE;
        }
    };

    if args.json {
        println!("{}", report.status.to_json());
    } else {
        output::print_report(&report);
    }

    let status = &report.status;
    info!(
        total = status.total,
        success = status.success,
        failed = status.failed(),
        "conversion complete"
    );
    if status.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn run_file(config_path: Option<&Path>, path: &Path, output_dir: Option<&Path>) -> ExitCode {
    let pipeline = load_settings(config_path, Overrides::default())
        .and_then(|(settings, _)| Pipeline::from_config(&settings));
    let pipeline = match pipeline {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    match pipeline.convert_file(path, output_dir) {
        Ok(out) => {
            println!("{}", out.display());
            ExitCode::SUCCESS
        }
        Err(_) => ExitCode::FAILURE,
    }
}

/// Size the global rayon pool: `max_workers`, capped at the core count.
fn init_thread_pool(max_workers: usize) {
    rayon::ThreadPoolBuilder::new()
        .num_threads(config::effective_workers(max_workers))
        .build_global()
        .ok();
}
