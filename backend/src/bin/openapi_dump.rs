//! Print the OpenAPI document as JSON.

use std::io::{self, Write};
use std::process::ExitCode;

use backend::doc::ApiDoc;
use utoipa::OpenApi;

fn main() -> ExitCode {
    let written = ApiDoc::openapi()
        .to_pretty_json()
        .map_err(|error| format!("failed to serialise OpenAPI document: {error}"))
        .and_then(|json| {
            writeln!(io::stdout().lock(), "{json}")
                .map_err(|error| format!("failed to write OpenAPI document: {error}"))
        });
    match written {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            let _ignored = writeln!(io::stderr().lock(), "{message}");
            ExitCode::FAILURE
        }
    }
}
