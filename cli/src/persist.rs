use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

const HISTORY_FILENAME: &str = "history.txt";
const SETTINGS_FILENAME: &str = "settings.json";

/// Values remembered between CLI sessions
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub(crate) struct CliSettings {
    pub(crate) api_key: Option<String>,
    pub(crate) owner_address: Option<String>,
}

pub(crate) struct CliPersistence {
    pub(crate) data_dir: PathBuf,
}

impl CliPersistence {
    pub(crate) fn history_file(&self) -> String {
        let history_file = self.data_dir.join(HISTORY_FILENAME);
        history_file.to_string_lossy().to_string()
    }

    fn settings_file(&self) -> PathBuf {
        self.data_dir.join(SETTINGS_FILENAME)
    }

    /// Missing settings are not an error, a fresh data directory has none
    pub(crate) fn load_settings(&self) -> Result<CliSettings> {
        let path = self.settings_file();
        if !path.exists() {
            return Ok(CliSettings::default());
        }
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub(crate) fn save_settings(&self, settings: &CliSettings) -> Result<()> {
        fs::write(
            self.settings_file(),
            serde_json::to_string_pretty(settings)?,
        )?;
        Ok(())
    }
}
