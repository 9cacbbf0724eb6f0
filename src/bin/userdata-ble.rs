use std::env;
use std::process::ExitCode;
use log::{error, info};
use userdata_ble::{init_logging, run};

fn main() -> ExitCode {
    init_logging();
    info!(concat!("userdata-ble ", env!("CARGO_PKG_VERSION")));

    match run(env::args()) {
        Err(err) => {
            error!("Unexpected error: {}", err);
            eprintln!("Unexpected error: {}", err);
            ExitCode::FAILURE
        },
        Ok(_) => ExitCode::SUCCESS,
    }
}
