use std::process::ExitCode;

mod app;

fn main() -> ExitCode {
    let wiring = match app::bootstrap::build_app() {
        Ok(wiring) => wiring,
        Err(err) => {
            eprintln!("startup failed: {err}");
            return ExitCode::FAILURE;
        }
    };
    app::loop_runner::run(wiring)
}
