use std::env::consts::{
    ARCH, DLL_EXTENSION, DLL_PREFIX, DLL_SUFFIX, EXE_EXTENSION, EXE_SUFFIX, FAMILY, OS,
};
use std::process::ExitCode;

use anyhow::Error;
use clap::Parser;
use tracing::{error, trace};

use crate::grabber::engine::Interrupt;
use crate::grabber::io::cli::Args;
use crate::grabber::io::{load_config, Settings};
use crate::program::Program;

mod grabber;
mod logger;
mod program;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode, Error> {
    let args = Args::parse();

    // Config problems are reported before the configured subscriber exists.
    let settings = tracing::subscriber::with_default(logger::bootstrap_subscriber(), || {
        let config = load_config(&args.config)?;
        Settings::resolve(config, &args)
    })?;

    let _guard = logger::init_logger(&settings.logging, &settings.log_directory)?;
    log_system_information();

    let interrupt = Interrupt::new();
    interrupt.listen_for_ctrl_c();

    let report = Program::new(settings, interrupt).run().await?;

    if report.interrupted {
        // 128 + SIGINT
        Ok(ExitCode::from(130))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Logs important information about the system being used.
fn log_system_information() {
    trace!("Printing system information out into log for debug purposes...");
    trace!("ARCH:           \"{}\"", ARCH);
    trace!("DLL_EXTENSION:  \"{}\"", DLL_EXTENSION);
    trace!("DLL_PREFIX:     \"{}\"", DLL_PREFIX);
    trace!("DLL_SUFFIX:     \"{}\"", DLL_SUFFIX);
    trace!("EXE_EXTENSION:  \"{}\"", EXE_EXTENSION);
    trace!("EXE_SUFFIX:     \"{}\"", EXE_SUFFIX);
    trace!("FAMILY:         \"{}\"", FAMILY);
    trace!("OS:             \"{}\"", OS);
}
