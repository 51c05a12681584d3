use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use weft::{gowrap, review, toolexec, GlobalOptions, LogFormat};

#[derive(Parser)]
#[command(name = "weft")]
#[command(version, about = "Compile-time aspect weaving for Go builds", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one toolchain command (used as `go build -toolexec "weft toolexec"`)
    Toolexec {
        /// Tool path followed by its arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Run the go command with weft installed as its -toolexec
    Go {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Print a Go file as it would be woven
    Weave {
        file: PathBuf,

        /// Import path of the file's package
        #[arg(short, long)]
        package: Option<String>,
    },

    /// Print a Go file with all woven regions removed
    Unweave { file: PathBuf },
}

// stdout belongs to the wrapped tool: `compile -V=full` output is parsed
fn init_logging(filter: &str, format: LogFormat) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Toolexec { command } => toolexec(&cli.global.context()?, command),
        Commands::Go { args } => gowrap::run(&cli.global, &args),
        Commands::Weave { file, package } => {
            let outcome = review::weave_file(&cli.global.context()?, &file, package.as_deref())?;
            print!("{}", outcome.source);
            Ok(0)
        }
        Commands::Unweave { file } => {
            print!("{}", review::unweave_file(&file)?);
            Ok(0)
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.global.log_level, cli.global.log_format);

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("weft: {:#}", e);
            std::process::exit(1);
        }
    }
}
