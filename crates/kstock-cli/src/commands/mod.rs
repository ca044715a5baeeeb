pub mod account;
pub mod analytics;
pub mod optimisation;

use serde::de::DeserializeOwned;

use crate::input;

/// Typed input from `--input <file>` (JSON or YAML), else from piped JSON
/// on stdin.
pub(crate) fn read_input<T: DeserializeOwned>(
    path: Option<&str>,
    what: &str,
) -> Result<T, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        input::file::read_document(path)
    } else if let Some(data) = input::stdin::read_stdin()? {
        Ok(data)
    } else {
        Err(format!("--input <file.json> or stdin required for {}", what).into())
    }
}
