//! Server and networking configuration types.

use serde::Deserialize;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port for the EventsDb gRPC service.
    pub grpc_port: u16,
    /// Port for the HTTP/SSE surface.
    pub http_port: u16,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            grpc_port: 50051,
            http_port: 8080,
            log_format: LogFormat::Text,
        }
    }
}

/// Shared-secret bearer token authentication.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Expected token. Empty or absent disables authentication.
    pub token: Option<String>,
}

impl AuthConfig {
    /// The configured token, if authentication is enabled.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }
}

/// TLS material for the gRPC listener.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// PEM certificate chain.
    pub cert_file: Option<String>,
    /// PEM private key.
    pub key_file: Option<String>,
}

impl TlsConfig {
    /// Both files, when TLS is configured.
    pub fn files(&self) -> Option<(&str, &str)> {
        match (self.cert_file.as_deref(), self.key_file.as_deref()) {
            (Some(cert), Some(key)) if !cert.is_empty() && !key.is_empty() => Some((cert, key)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let server = ServerConfig::default();
        assert_eq!(server.grpc_port, 50051);
        assert_eq!(server.http_port, 8080);
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.log_format, LogFormat::Text);
    }

    #[test]
    fn test_empty_token_disables_auth() {
        let auth = AuthConfig {
            token: Some(String::new()),
        };
        assert!(auth.token().is_none());

        let auth = AuthConfig {
            token: Some("secret".to_string()),
        };
        assert_eq!(auth.token(), Some("secret"));
    }

    #[test]
    fn test_tls_requires_both_files() {
        let tls = TlsConfig {
            cert_file: Some("cert.pem".to_string()),
            key_file: None,
        };
        assert!(tls.files().is_none());

        let tls = TlsConfig {
            cert_file: Some("cert.pem".to_string()),
            key_file: Some("key.pem".to_string()),
        };
        assert_eq!(tls.files(), Some(("cert.pem", "key.pem")));
    }
}
