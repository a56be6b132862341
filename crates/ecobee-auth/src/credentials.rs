//! Credential storage for ecobee tokens
//!
//! `Credentials` is the single in-memory record of everything needed to talk
//! to ecobee: the developer API key, the PIN-flow authorization code, the
//! access/refresh token pair and the optional web-login credentials.
//!
//! A `CredentialStore` persists the record as one flat JSON object with
//! upper-case keys. Every save writes the full snapshot; the file store does
//! so atomically (temp file + rename) so a crash never leaves a partial file.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::token::TokenResponse;

/// Everything the client knows about its authorization.
///
/// Missing or `null` string fields load as empty strings. `expires_at` is a
/// unix timestamp in seconds, computed when a token response arrives.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    #[serde(rename = "API_KEY", deserialize_with = "null_as_empty")]
    pub api_key: String,
    #[serde(rename = "AUTHORIZATION_CODE", deserialize_with = "null_as_empty")]
    pub authorization_code: String,
    #[serde(rename = "ACCESS_TOKEN", deserialize_with = "null_as_empty")]
    pub access_token: String,
    #[serde(rename = "REFRESH_TOKEN", deserialize_with = "null_as_empty")]
    pub refresh_token: String,
    /// PIN shown to the user while authorization is pending.
    #[serde(rename = "PIN", deserialize_with = "null_as_empty")]
    pub pin: String,
    /// Session cookie from the web login flow.
    #[serde(rename = "SECONDARY_TOKEN", skip_serializing_if = "Option::is_none")]
    pub secondary_token: Option<String>,
    #[serde(rename = "USERNAME", skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(rename = "PASSWORD", skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(rename = "ACCESS_TOKEN_EXPIRES_AT", skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl Credentials {
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Store a token response. A response without a refresh token keeps the
    /// current one.
    pub fn apply_tokens(&mut self, tokens: TokenResponse) {
        self.access_token = tokens.access_token;
        if let Some(refresh) = tokens.refresh_token.filter(|r| !r.is_empty()) {
            self.refresh_token = refresh;
        }
        self.expires_at = tokens.expires_in.map(|secs| unix_now() + secs);
    }

    /// Username and password are both configured.
    pub fn has_web_login(&self) -> bool {
        non_empty(&self.username) && non_empty(&self.password)
    }

    /// The web login flow applies instead of the PIN/refresh grants.
    pub fn has_secondary(&self) -> bool {
        self.has_web_login() || non_empty(&self.secondary_token)
    }

    pub fn is_authorized(&self) -> bool {
        !self.access_token.is_empty()
    }
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() { "<empty>" } else { "[REDACTED]" }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &redact(&self.api_key))
            .field("authorization_code", &redact(&self.authorization_code))
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("pin", &self.pin)
            .field("secondary_token", &self.secondary_token.as_deref().map(redact))
            .field("username", &self.username)
            .field("password", &self.password.as_deref().map(redact))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Persistence collaborator for `Credentials`.
///
/// `save` always writes the complete snapshot. When it fails the caller must
/// assume nothing was written.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn CredentialStore>`).
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Pin<Box<dyn Future<Output = Result<Credentials>> + Send + '_>>;

    fn save<'a>(
        &'a self,
        credentials: &'a Credentials,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// JSON file on disk, mode 0600.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for JsonFileStore {
    /// A missing file loads as empty credentials.
    fn load(&self) -> Pin<Box<dyn Future<Output = Result<Credentials>> + Send + '_>> {
        Box::pin(async move {
            if !self.path.exists() {
                info!(path = %self.path.display(), "credential file not found, starting unauthorized");
                return Ok(Credentials::default());
            }
            let contents = tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|e| Error::Io(format!("reading credential file: {e}")))?;
            if contents.trim().is_empty() {
                return Ok(Credentials::default());
            }
            let credentials: Credentials = serde_json::from_str(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing credential file: {e}")))?;
            info!(
                path = %self.path.display(),
                authorized = credentials.is_authorized(),
                "loaded credentials"
            );
            Ok(credentials)
        })
    }

    fn save<'a>(
        &'a self,
        credentials: &'a Credentials,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(write_atomic(&self.path, credentials))
    }
}

/// In-process store, for embedding callers that manage persistence themselves.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<Credentials>,
}

impl MemoryStore {
    pub fn new(initial: Credentials) -> Self {
        Self {
            state: Mutex::new(initial),
        }
    }

    /// Clone of the last saved snapshot.
    pub async fn snapshot(&self) -> Credentials {
        self.state.lock().await.clone()
    }
}

impl CredentialStore for MemoryStore {
    fn load(&self) -> Pin<Box<dyn Future<Output = Result<Credentials>> + Send + '_>> {
        Box::pin(async move { Ok(self.state.lock().await.clone()) })
    }

    fn save<'a>(
        &'a self,
        credentials: &'a Credentials,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            *self.state.lock().await = credentials.clone();
            debug!("saved credentials in memory");
            Ok(())
        })
    }
}

/// Write credentials to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Permissions are set to 0600 before the rename.
async fn write_atomic(path: &Path, credentials: &Credentials) -> Result<()> {
    let json = serde_json::to_string_pretty(credentials)
        .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;

    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    let tmp_path = dir.join(format!(".ecobee-credentials.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credentials");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_credentials() -> Credentials {
        Credentials {
            api_key: "K1".into(),
            authorization_code: "code-1".into(),
            access_token: "at-1".into(),
            refresh_token: "rt-1".into(),
            pin: "ABCD".into(),
            secondary_token: Some("sess-1".into()),
            username: Some("user@example.com".into()),
            password: Some("pw".into()),
            expires_at: Some(1_735_500_000),
        }
    }

    #[tokio::test]
    async fn roundtrip_reproduces_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("ecobee.conf"));

        store.save(&full_credentials()).await.unwrap();
        let loaded = JsonFileStore::new(store.path()).load().await.unwrap();

        assert_eq!(loaded, full_credentials());
    }

    #[tokio::test]
    async fn saving_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ecobee.conf");
        let store = JsonFileStore::new(&path);

        store.save(&full_credentials()).await.unwrap();
        let first = tokio::fs::read_to_string(&path).await.unwrap();
        let loaded = store.load().await.unwrap();
        store.save(&loaded).await.unwrap();
        let second = tokio::fs::read_to_string(&path).await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("absent.conf"));
        assert_eq!(store.load().await.unwrap(), Credentials::default());
    }

    #[tokio::test]
    async fn missing_and_null_keys_default_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ecobee.conf");
        tokio::fs::write(
            &path,
            r#"{"API_KEY":"K1","ACCESS_TOKEN":null,"REFRESH_TOKEN":"rt"}"#,
        )
        .await
        .unwrap();

        let loaded = JsonFileStore::new(&path).load().await.unwrap();
        assert_eq!(loaded.api_key, "K1");
        assert_eq!(loaded.access_token, "");
        assert_eq!(loaded.authorization_code, "");
        assert_eq!(loaded.refresh_token, "rt");
        assert!(loaded.username.is_none());
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ecobee.conf");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let err = JsonFileStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, Error::CredentialParse(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn save_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nope").join("ecobee.conf"));
        let err = store.save(&full_credentials()).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn persisted_keys_are_upper_case() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ecobee.conf");
        JsonFileStore::new(&path)
            .save(&Credentials::with_api_key("K1"))
            .await
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        assert_eq!(raw["API_KEY"], "K1");
        assert_eq!(raw["ACCESS_TOKEN"], "");
        assert!(raw.get("USERNAME").is_none(), "absent optionals are omitted");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ecobee.conf");
        JsonFileStore::new(&path)
            .save(&full_credentials())
            .await
            .unwrap();

        let mode = tokio::fs::metadata(&path).await.unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "credential file must be 0600, got {mode:o}");
    }

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryStore::default();
        store.save(&full_credentials()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), full_credentials());
        assert_eq!(store.snapshot().await, full_credentials());
    }

    #[test]
    fn apply_tokens_keeps_refresh_token_when_absent() {
        let mut credentials = full_credentials();
        credentials.apply_tokens(TokenResponse {
            access_token: "A2".into(),
            refresh_token: None,
            expires_in: None,
            token_type: None,
            scope: None,
        });
        assert_eq!(credentials.access_token, "A2");
        assert_eq!(credentials.refresh_token, "rt-1");
        assert!(credentials.expires_at.is_none());
    }

    #[test]
    fn apply_tokens_computes_absolute_expiry() {
        let mut credentials = Credentials::default();
        let before = unix_now();
        credentials.apply_tokens(TokenResponse {
            access_token: "A2".into(),
            refresh_token: Some("R2".into()),
            expires_in: Some(3600),
            token_type: Some("Bearer".into()),
            scope: None,
        });
        assert_eq!(credentials.refresh_token, "R2");
        let expires = credentials.expires_at.unwrap();
        assert!(expires >= before + 3600 && expires <= unix_now() + 3600);
    }

    #[test]
    fn secondary_detection() {
        let mut credentials = Credentials::with_api_key("K1");
        assert!(!credentials.has_secondary());

        credentials.username = Some("user".into());
        assert!(!credentials.has_secondary(), "username alone is not enough");

        credentials.password = Some("pw".into());
        assert!(credentials.has_web_login());
        assert!(credentials.has_secondary());

        let session_only = Credentials {
            secondary_token: Some("sess".into()),
            ..Credentials::default()
        };
        assert!(session_only.has_secondary());
        assert!(!session_only.has_web_login());
    }

    #[test]
    fn debug_redacts_secrets() {
        let debug = format!("{:?}", full_credentials());
        assert!(!debug.contains("at-1"));
        assert!(!debug.contains("rt-1"));
        assert!(!debug.contains("sess-1"));
        assert!(!debug.contains("\"pw\""));
        assert!(debug.contains("ABCD"), "PIN is meant to be displayed");
    }
}
