pub mod file;
pub mod stdin;

use serde::de::DeserializeOwned;

/// Load a document from `--input`, or from piped stdin when no path is given.
pub fn load<T: DeserializeOwned>(
    path: Option<&str>,
    what: &str,
) -> Result<T, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        log::debug!("reading {what} from {path}");
        return file::read_document(path);
    }
    log::debug!("reading {what} from stdin");
    match stdin::read_stdin()? {
        Some(value) => Ok(serde_json::from_value(value)?),
        None => Err(format!("--input is required for {what} (or pipe JSON/YAML on stdin)").into()),
    }
}
