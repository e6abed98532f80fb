//! Loading fit settings from JSON.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::domain::FitSettings;
use crate::error::AppError;

/// Read and validate a [`FitSettings`] JSON file. Missing fields take their defaults.
pub fn read_settings_json(path: &Path) -> Result<FitSettings, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::new(2, format!("Failed to open settings '{}': {e}", path.display()))
    })?;
    let settings: FitSettings = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::new(2, format!("Invalid settings JSON '{}': {e}", path.display())))?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_settings_are_rejected_with_exit_code_2() {
        let path = std::env::temp_dir().join(format!("bfit-settings-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "resolution": 0 }"#).unwrap();
        let err = read_settings_json(&path).unwrap_err();
        let _ = std::fs::remove_file(&path);
        assert_eq!(err.exit_code(), 2);
    }
}
