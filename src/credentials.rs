// Import necessary crates and modules
use crate::error::ApiError;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Password};
use keyring::Entry;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

const KEYRING_URL_KEY: &str = "URL_EDUHUB";
const KEYRING_TOKEN_KEY: &str = "TOKEN_EDUHUB";
const CREDENTIALS_FILE: &str = "credentials.json";

/// Structure to hold EduHub API credentials.
///
/// Fields:
/// - `url_api`: Base URL of the API, e.g. `https://school.example.com/api/v1`.
/// - `token`: Bearer token of the logged in teacher or student.
///
/// Example usage:
/// ```
/// use eduhub_connector::ApiCredentials;
/// let credentials = ApiCredentials {
///     url_api: "https://school.example.com/api/v1".to_string(),
///     token: "your_api_token".to_string(),
/// };
/// ```
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct ApiCredentials {
    pub url_api: String,
    pub token: String,
}

// Where a set of credentials came from.
enum CredentialSource {
    None,
    EnvVariables(ApiCredentials),
    ConfigFile(ApiCredentials),
    SystemKeyring(ApiCredentials),
}

impl ApiCredentials {
    pub fn new(url_api: impl Into<String>, token: impl Into<String>) -> Self {
        ApiCredentials {
            url_api: url_api.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Joins the base URL and an API path.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.url_api.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Checks the token against `GET /auth/me`.
    ///
    /// Returns the HTTP status code as error, 0 for network failures.
    fn test_credentials(credentials: &ApiCredentials) -> Result<u16, u16> {
        let client = reqwest::blocking::Client::new();
        let res = client
            .get(credentials.endpoint("auth/me"))
            .bearer_auth(&credentials.token)
            .send();

        match res {
            Ok(response) if response.status().is_success() => Ok(200),
            Ok(response) => Err(response.status().as_u16()),
            Err(_) => Err(0),
        }
    }

    /// Loads the credentials from `EDUHUB_URL` and `EDUHUB_TOKEN`.
    ///
    /// Only available with the `use_env_credentials` feature.
    pub fn load_credentials_from_env() -> Result<ApiCredentials, String> {
        #[cfg(not(feature = "use_env_credentials"))]
        {
            return Err("Feature not enabled".to_string());
        }

        #[cfg(feature = "use_env_credentials")]
        {
            match std::env::var("EDUHUB_URL") {
                Ok(url) => match std::env::var("EDUHUB_TOKEN") {
                    Ok(token) => {
                        info!("Credentials loaded from environment -> {}", url);
                        Ok(ApiCredentials::new(url, token))
                    }
                    Err(_) => Err("Error retrieving token from environment".to_string()),
                },
                Err(_) => Err("Error retrieving URL from environment".to_string()),
            }
        }
    }

    /// Path of the JSON credentials file inside the user config directory.
    pub fn credentials_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(env!("CARGO_PKG_NAME")).join(CREDENTIALS_FILE))
    }

    /// Loads the credentials from a JSON file.
    pub fn load_credentials_from_file(path: &PathBuf) -> Result<ApiCredentials, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Error reading {}: {}", path.display(), e))?;
        let credentials: ApiCredentials = serde_json::from_str(&content)
            .map_err(|e| format!("Error parsing {}: {}", path.display(), e))?;
        if credentials.url_api.is_empty() || credentials.token.is_empty() {
            return Err(format!("Incomplete credentials in {}", path.display()));
        }
        Ok(credentials)
    }

    /// Writes the credentials to a JSON file, creating the parent directory.
    pub fn save_credentials_to_file(&self, path: &PathBuf) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Error creating {}: {}", parent.display(), e))?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|e| e.to_string())?;
        fs::write(path, content).map_err(|e| format!("Error writing {}: {}", path.display(), e))
    }

    /// Loads the credentials from the system keyring.
    pub fn load_credentials_from_system() -> Result<ApiCredentials, String> {
        let app_name = env!("CARGO_PKG_NAME");
        let url = Entry::new(app_name, KEYRING_URL_KEY)
            .and_then(|entry| entry.get_password())
            .map_err(|_| "Error retrieving URL from system".to_string())?;
        let token = Entry::new(app_name, KEYRING_TOKEN_KEY)
            .and_then(|entry| entry.get_password())
            .map_err(|_| "Error retrieving token from system".to_string())?;
        Ok(ApiCredentials::new(url, token))
    }

    fn save_credentials_to_system(&self) -> Result<(), String> {
        let app_name = env!("CARGO_PKG_NAME");
        Entry::new(app_name, KEYRING_URL_KEY)
            .and_then(|entry| entry.set_password(&self.url_api))
            .map_err(|e| format!("Error saving URL: {}", e))?;
        Entry::new(app_name, KEYRING_TOKEN_KEY)
            .and_then(|entry| entry.set_password(&self.token))
            .map_err(|e| format!("Error saving token: {}", e))
    }

    // Env vars first, then the config file, then the keyring.
    fn load_credentials() -> CredentialSource {
        if let Ok(credentials) = Self::load_credentials_from_env() {
            return CredentialSource::EnvVariables(credentials);
        }
        if let Some(path) = Self::credentials_file_path() {
            match Self::load_credentials_from_file(&path) {
                Ok(credentials) => return CredentialSource::ConfigFile(credentials),
                Err(e) => debug!("{}", e),
            }
        }
        match Self::load_credentials_from_system() {
            Ok(credentials) => CredentialSource::SystemKeyring(credentials),
            Err(_) => CredentialSource::None,
        }
    }

    /// Interactively asks for credentials and stores them in the keyring.
    fn set_system_credentials() -> Result<ApiCredentials, ApiError> {
        let theme = ColorfulTheme::default();
        loop {
            let register = Confirm::with_theme(&theme)
                .with_prompt("Do you wish to register the credentials?")
                .default(true)
                .interact()
                .map_err(|e| ApiError::Credentials(e.to_string()))?;
            if !register {
                return Err(ApiError::Credentials("No credentials provided".to_string()));
            }
            let url: String = Input::with_theme(&theme)
                .with_prompt("EduHub API URL")
                .interact_text()
                .map_err(|e| ApiError::Credentials(e.to_string()))?;
            let token = Password::with_theme(&theme)
                .with_prompt("EduHub token")
                .interact()
                .map_err(|e| ApiError::Credentials(e.to_string()))?;
            let credentials = ApiCredentials::new(url.trim(), token.trim());

            match Self::test_credentials(&credentials) {
                Ok(_) => {
                    if let Err(e) = credentials.save_credentials_to_system() {
                        warn!("{}", e);
                    }
                    return Ok(credentials);
                }
                Err(401) | Err(403) => {
                    println!("Incorrect credentials");
                    continue;
                }
                Err(status_code) => {
                    return Err(ApiError::Credentials(format!(
                        "Error accessing EduHub API - Status Code {}",
                        status_code
                    )));
                }
            }
        }
    }

    /// Returns working credentials, prompting the user when none are stored.
    pub fn credentials() -> Result<ApiCredentials, ApiError> {
        match Self::load_credentials() {
            CredentialSource::None => Self::set_system_credentials(),
            CredentialSource::EnvVariables(credentials)
            | CredentialSource::ConfigFile(credentials)
            | CredentialSource::SystemKeyring(credentials) => {
                match Self::test_credentials(&credentials) {
                    Ok(_) => Ok(credentials),
                    Err(401) => Err(ApiError::Unauthorized),
                    Err(e) => Err(ApiError::Credentials(format!(
                        "Error accessing EduHub API - Status Code {}",
                        e
                    ))),
                }
            }
        }
    }
}
