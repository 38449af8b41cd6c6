//! # dsreg
//!
//! Command-line front end of the dataset registry.
//!
//! ```text
//! main()
//!   │
//!   ├─> Parse CLI arguments (clap)
//!   ├─> Load configuration (--config, DSREG_CONFIG or the platform default)
//!   ├─> Initialise logging (stderr, optional rotated files)
//!   └─> Run the command, printing JSON results to stdout
//! ```
//!
//! ```bash
//! dsreg --root ./registry user add alice
//! dsreg --root ./registry -u alice dataset create sales --tag finance
//! dsreg --root ./registry -u alice version add sales 1.0 jan.jsonl
//! dsreg --root ./registry -u alice stats sales --summary
//! ```

#![warn(clippy::all, rust_2018_idioms)]
#![expect(clippy::print_stdout)] // Results go to stdout

mod cli;

use anyhow::Result;
use clap::Parser as _;
use dataset_registry::logging;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    let config = cli.load_config()?;
    logging::init(&config.logging)?;
    cli::run_command(cli, config)
}
