use crate::config::types::{Result, SieveError};
use crate::judge::adapter::RuntimeAdapter;
use crate::judge::languages::python::PythonAdapter;

pub fn adapter_for(language: &str) -> Result<Box<dyn RuntimeAdapter>> {
    match language {
        "python" | "py" | "python3" => Ok(Box::new(PythonAdapter)),
        _ => Err(SieveError::Config(format!(
            "unsupported language adapter: {language}"
        ))),
    }
}
