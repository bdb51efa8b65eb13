use std::process::ExitCode;

fn main() -> ExitCode {
    droidlens_lib::run()
}
