use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};

/// How a connection authenticates its requests.
#[derive(Debug, Default, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthMaterial {
  #[default]
  None,
  Bearer {
    #[serde(deserialize_with = "secret")]
    token: SecretString,
  },
  Basic {
    username: String,
    #[serde(deserialize_with = "secret")]
    password: SecretString,
  },
  /// A custom header such as `X-Api-Key`.
  Header {
    name: String,
    #[serde(deserialize_with = "secret")]
    value: SecretString,
  },
}

fn secret<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SecretString, D::Error> {
  String::deserialize(deserializer).map(|value| SecretString::new(value.into_boxed_str()))
}

/// A resolved connection.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
  #[serde(default)]
  pub id: String,
  #[serde(default)]
  pub base_url: Option<String>,
  #[serde(default)]
  pub auth: AuthMaterial,
  #[serde(default)]
  pub default_headers: BTreeMap<String, String>,
}

impl Connection {
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      ..Self::default()
    }
  }

  pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
    self.base_url = Some(base_url.into());
    self
  }

  pub fn with_auth(mut self, auth: AuthMaterial) -> Self {
    self.auth = auth;
    self
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.default_headers.insert(name.into(), value.into());
    self
  }

  pub fn bearer(token: impl Into<String>) -> AuthMaterial {
    AuthMaterial::Bearer {
      token: SecretString::new(token.into().into_boxed_str()),
    }
  }

  /// The header carrying this connection's credentials, if any.
  pub fn auth_header(&self) -> Option<(String, String)> {
    match &self.auth {
      AuthMaterial::None => None,
      AuthMaterial::Bearer { token } => Some((
        "Authorization".to_string(),
        format!("Bearer {}", token.expose_secret()),
      )),
      AuthMaterial::Basic { username, password } => {
        let encoded = STANDARD.encode(format!("{}:{}", username, password.expose_secret()));
        Some(("Authorization".to_string(), format!("Basic {}", encoded)))
      }
      AuthMaterial::Header { name, value } => {
        Some((name.clone(), value.expose_secret().to_string()))
      }
    }
  }

  /// Everything templates may see: no auth material.
  pub fn public_view(&self) -> serde_json::Value {
    serde_json::json!({
      "id": self.id,
      "baseUrl": self.base_url,
      "defaultHeaders": self.default_headers,
    })
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn test_bearer_header() {
    let connection = Connection::new("crm").with_auth(Connection::bearer("s3cret"));
    assert_eq!(
      connection.auth_header(),
      Some(("Authorization".to_string(), "Bearer s3cret".to_string()))
    );
  }

  #[test]
  fn test_basic_header() {
    let connection: Connection = serde_json::from_value(json!({
      "auth": { "type": "basic", "username": "user", "password": "pass" }
    }))
    .unwrap();

    assert_eq!(
      connection.auth_header(),
      Some(("Authorization".to_string(), "Basic dXNlcjpwYXNz".to_string()))
    );
  }

  #[test]
  fn test_custom_header() {
    let connection: Connection = serde_json::from_value(json!({
      "auth": { "type": "header", "name": "X-Api-Key", "value": "k" }
    }))
    .unwrap();

    assert_eq!(
      connection.auth_header(),
      Some(("X-Api-Key".to_string(), "k".to_string()))
    );
  }

  #[test]
  fn test_public_view_hides_secrets() {
    let connection = Connection::new("crm")
      .with_base_url("https://crm.example.com")
      .with_header("Accept", "application/json")
      .with_auth(Connection::bearer("s3cret"));

    let view = connection.public_view();
    assert_eq!(
      view,
      json!({
        "id": "crm",
        "baseUrl": "https://crm.example.com",
        "defaultHeaders": { "Accept": "application/json" }
      })
    );
    assert!(!view.to_string().contains("s3cret"));
    assert!(!format!("{:?}", connection).contains("s3cret"));
  }
}
