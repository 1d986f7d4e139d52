use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Credentials file structure
///
/// Format:
/// ```toml
/// [remote.profile_name]
/// api_key = "your_backend_api_key_here"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Credentials {
    #[serde(default)]
    pub remote: HashMap<String, RemoteCredential>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteCredential {
    pub api_key: String,
}

/// Get the default credentials file path: ~/.config/guardian_sync/credentials.toml
pub fn get_credentials_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("guardian_sync")
            .join("credentials.toml"),
    )
}

/// Load credentials from `path`. Returns None if the file doesn't exist.
pub fn load_credentials_from(
    path: &Path,
) -> Result<Option<Credentials>, Box<dyn std::error::Error + Send + Sync>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)?;
    let credentials: Credentials = toml::from_str(&content)?;

    Ok(Some(credentials))
}

/// Load credentials from the default location
pub fn load_credentials() -> Result<Option<Credentials>, Box<dyn std::error::Error + Send + Sync>>
{
    match get_credentials_path() {
        Some(path) => load_credentials_from(&path),
        None => Ok(None),
    }
}

/// Get the API key for a remote profile
pub fn get_api_key(credentials: &Option<Credentials>, profile: &str) -> Result<String, String> {
    match credentials {
        Some(creds) => creds
            .remote
            .get(profile)
            .map(|p| p.api_key.clone())
            .ok_or_else(|| {
                format!(
                    "Credential profile '[remote.{}]' not found in credentials file",
                    profile
                )
            }),
        None => Err(format!(
            "Credentials file not found. Expected at: {}",
            get_credentials_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "~/.config/guardian_sync/credentials.toml".to_string())
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_profile() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("credentials.toml");
        std::fs::write(
            &path,
            "[remote.default]\napi_key = \"anon-key\"\n\n\
             [remote.staging]\napi_key = \"staging-key\"\n",
        )
        .unwrap();

        let creds = load_credentials_from(&path).unwrap();
        assert_eq!(get_api_key(&creds, "staging").unwrap(), "staging-key");
        assert!(get_api_key(&creds, "prod")
            .unwrap_err()
            .contains("[remote.prod]"));
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let creds = load_credentials_from(&temp_dir.path().join("nope.toml")).unwrap();
        assert!(creds.is_none());
        assert!(get_api_key(&creds, "default").is_err());
    }
}
