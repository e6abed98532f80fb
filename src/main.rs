use std::process::ExitCode;

fn main() -> ExitCode {
    match brdf_basis_fit::app::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(err.exit_code())
        }
    }
}
