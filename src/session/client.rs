use crate::config::FeedConfig;
use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

const LOGIN_PATH: &str = "/api/auth/login";
const LOGOUT_PATH: &str = "/api/auth/logout";
const BUILD_INFO_PATH: &str = "/api/system/build-info";

/// Which login form a request came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStage {
    Credentials,
    TwoFactor,
}

/// Body of `POST /api/auth/login`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum LoginRequest {
    #[serde(rename = "credentials")]
    Credentials { username: String, password: String },
    #[serde(rename = "2fa", rename_all = "camelCase")]
    TwoFactor { two_factor_code: String },
}

impl LoginRequest {
    pub fn stage(&self) -> LoginStage {
        match self {
            LoginRequest::Credentials { .. } => LoginStage::Credentials,
            LoginRequest::TwoFactor { .. } => LoginStage::TwoFactor,
        }
    }

    /// JSON body with the secret replaced by `***`, for diagnostics
    pub fn masked(&self) -> String {
        let value = match self {
            LoginRequest::Credentials { username, .. } => json!({
                "type": "credentials",
                "username": username,
                "password": "***",
            }),
            LoginRequest::TwoFactor { .. } => json!({
                "type": "2fa",
                "twoFactorCode": "***",
            }),
        };
        value.to_string()
    }
}

/// Login result; failures arrive as `success: false` with a message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginResponse {
    pub success: bool,
    #[serde(rename = "requires2FA")]
    pub requires_two_factor: bool,
    pub two_factor_type: Option<String>,
    pub message: Option<String>,
}

/// Response of the build-info endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildInfo {
    pub version: Option<String>,
    pub build_time: Option<String>,
}

/// HTTP client for the server's auth and system endpoints
#[derive(Debug, Clone)]
pub struct AuthClient {
    http_client: Client,
    base_url: String,
}

impl AuthClient {
    /// Client for the HTTP side of the configured feed host
    pub fn new(feed: &FeedConfig) -> Result<Self> {
        Self::with_base_url(feed.http_base_url())
    }

    /// Client with an explicit base URL (used against a mock server in tests)
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let http_client = Client::builder()
            .user_agent(concat!("presence-monitor/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http_client,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submit credentials or a 2FA code. The body is parsed whatever the status.
    pub async fn login(&self, request: &LoginRequest) -> Result<LoginResponse> {
        let url = format!("{}{}", self.base_url, LOGIN_PATH);
        let response = self
            .http_client
            .post(&url)
            .json(request)
            .send()
            .await
            .context("Failed to send login request")?;

        response
            .json::<LoginResponse>()
            .await
            .context("Failed to parse login response")
    }

    /// Drop the server's upstream session
    pub async fn logout(&self) -> Result<()> {
        let url = format!("{}{}", self.base_url, LOGOUT_PATH);
        let response = self
            .http_client
            .post(&url)
            .send()
            .await
            .context("Failed to send logout request")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("Logout rejected: {}", status));
        }
        Ok(())
    }

    pub async fn build_info(&self) -> Result<BuildInfo> {
        let url = format!("{}{}", self.base_url, BUILD_INFO_PATH);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .context("Failed to send build-info request")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("Build-info request failed: {}", status));
        }
        response
            .json::<BuildInfo>()
            .await
            .context("Failed to parse build-info response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    #[test]
    fn test_login_request_wire_format() {
        let credentials = LoginRequest::Credentials {
            username: "alice".to_string(),
            password: "hunter2".to_string(),
        };
        let value = serde_json::to_value(&credentials).unwrap();
        assert_eq!(
            value,
            json!({"type": "credentials", "username": "alice", "password": "hunter2"})
        );

        let code = LoginRequest::TwoFactor {
            two_factor_code: "123456".to_string(),
        };
        let value = serde_json::to_value(&code).unwrap();
        assert_eq!(value, json!({"type": "2fa", "twoFactorCode": "123456"}));
    }

    #[test]
    fn test_masked_hides_secrets() {
        let credentials = LoginRequest::Credentials {
            username: "alice".to_string(),
            password: "hunter2".to_string(),
        };
        let masked = credentials.masked();
        assert!(masked.contains("alice"));
        assert!(masked.contains("***"));
        assert!(!masked.contains("hunter2"));

        let code = LoginRequest::TwoFactor {
            two_factor_code: "123456".to_string(),
        };
        assert!(!code.masked().contains("123456"));
    }

    #[tokio::test]
    async fn test_login_requires_two_factor() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/auth/login")
            .match_body(Matcher::Json(json!({
                "type": "credentials",
                "username": "alice",
                "password": "hunter2"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success": false, "requires2FA": true, "twoFactorType": "totp"}"#)
            .create_async()
            .await;

        let client = AuthClient::with_base_url(server.url()).unwrap();
        let response = client
            .login(&LoginRequest::Credentials {
                username: "alice".to_string(),
                password: "hunter2".to_string(),
            })
            .await
            .unwrap();

        assert!(!response.success);
        assert!(response.requires_two_factor);
        assert_eq!(response.two_factor_type.as_deref(), Some("totp"));
    }

    #[tokio::test]
    async fn test_login_failure_body_is_parsed_on_error_status() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/auth/login")
            .with_status(401)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success": false, "message": "Bad password"}"#)
            .create_async()
            .await;

        let client = AuthClient::with_base_url(server.url()).unwrap();
        let response = client
            .login(&LoginRequest::TwoFactor {
                two_factor_code: "000000".to_string(),
            })
            .await
            .unwrap();

        assert!(!response.success);
        assert_eq!(response.message.as_deref(), Some("Bad password"));
    }

    #[tokio::test]
    async fn test_login_unparsable_body_is_an_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/auth/login")
            .with_status(502)
            .with_body("<html>Bad Gateway</html>")
            .create_async()
            .await;

        let client = AuthClient::with_base_url(server.url()).unwrap();
        let err = client
            .login(&LoginRequest::TwoFactor {
                two_factor_code: "1".to_string(),
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to parse login response"));
    }

    #[tokio::test]
    async fn test_logout() {
        let mut server = Server::new_async().await;
        let ok = server
            .mock("POST", "/api/auth/logout")
            .with_status(200)
            .create_async()
            .await;

        let client = AuthClient::with_base_url(server.url()).unwrap();
        client.logout().await.unwrap();
        ok.assert_async().await;
    }

    #[tokio::test]
    async fn test_logout_error_status() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/auth/logout")
            .with_status(500)
            .create_async()
            .await;

        let client = AuthClient::with_base_url(server.url()).unwrap();
        let err = client.logout().await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_build_info() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/system/build-info")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"version": "1.4.0", "buildTime": "2025-03-01 10:00:00"}"#)
            .create_async()
            .await;

        let client = AuthClient::with_base_url(server.url()).unwrap();
        let info = client.build_info().await.unwrap();
        assert_eq!(info.version.as_deref(), Some("1.4.0"));
        assert_eq!(info.build_time.as_deref(), Some("2025-03-01 10:00:00"));
    }

    #[test]
    fn test_client_from_feed_config() {
        let feed = FeedConfig {
            host: "monitor.local:8443".to_string(),
            secure: true,
            ..FeedConfig::default()
        };
        let client = AuthClient::new(&feed).unwrap();
        assert_eq!(client.base_url(), "https://monitor.local:8443");
    }
}
