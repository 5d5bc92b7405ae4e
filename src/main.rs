use std::process::ExitCode;

fn main() -> ExitCode {
    camrecord_lib::run()
}
