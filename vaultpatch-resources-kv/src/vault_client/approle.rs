use secrecy::{ExposeSecret, SecretString};

use crate::store::StoreError;

#[derive(serde::Serialize)]
struct LoginRequest<'a> {
    role_id: &'a str,
    secret_id: &'a str,
}

#[derive(serde::Deserialize)]
struct LoginResponse {
    auth: Option<LoginAuth>,
}

#[derive(serde::Deserialize)]
struct LoginAuth {
    #[serde(default)]
    client_token: String,
}

/// Exchange an AppRole role id and secret id for a client token.
pub async fn login(
    http: &reqwest::Client,
    address: &str,
    role_id: &SecretString,
    secret_id: &SecretString,
) -> Result<SecretString, StoreError> {
    let url = format!("{}/v1/auth/approle/login", address.trim_end_matches('/'));

    let response = http
        .post(url)
        .json(&LoginRequest {
            role_id: role_id.expose_secret(),
            secret_id: secret_id.expose_secret(),
        })
        .send()
        .await?;
    let status = response.status();
    let body = response.text().await?;
    if status != reqwest::StatusCode::OK {
        return Err(StoreError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let parsed: LoginResponse = serde_json::from_str(&body).map_err(StoreError::Decode)?;
    match parsed.auth {
        Some(LoginAuth { client_token }) if !client_token.is_empty() => {
            Ok(SecretString::from(client_token))
        }
        _ => Err(StoreError::EmptyToken),
    }
}
