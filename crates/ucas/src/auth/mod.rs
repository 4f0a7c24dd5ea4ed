//! Account sign-in against the UCAS identity provider.
//!
//! The provider fronts its login with a web CIAM SDK, so a sign-in is a
//! fixed four-step exchange sharing one cookie jar:
//!
//! 1. bootstrap an anonymous SDK session
//! 2. submit the credentials
//! 3. trade the session's login-token cookie for an identity token (JWT)
//! 4. replay the identity token to the account callback, which mints the
//!    `UcasIdentity` cookie
//!
//! The jar accumulated across all four responses is the persistable
//! session. Each attempt starts from a fresh jar; a failed stage aborts
//! the whole attempt.

pub mod jwt;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::session::AccountSession;
use jwt::{IdentityClaims, JwtError};

pub mod urls {
    /// SDK bootstrap endpoint; establishes the anonymous session cookies.
    pub const BOOTSTRAP: &str = "https://7054541.ucas.com/accounts.webSdkBootstrap";
    /// Credential login endpoint.
    pub const LOGIN: &str = "https://7054541.ucas.com/accounts.login";
    /// Identity token issuance endpoint.
    pub const GET_JWT: &str = "https://7054541.ucas.com/accounts.getJWT";
    /// Account callback that mints the identity cookie.
    pub const LOGIN_CALLBACK: &str = "https://accounts.ucas.com/account/logincallback";
}

const API_KEY: &str = "3_-T_rRw2AdTdZQrVXfo9l-h8Uqzn3hGrZCHHfvRg-ITrJ0cZMfHuAmo9YpLYQbTjo";
const PAGE_URL: &str = "https://accounts.ucas.com/account/login";
const SDK: &str = "js_latest";
const SDK_BUILD: &str = "18051";

/// Prefix of the session cookie carrying the short-lived login token.
const LOGIN_TOKEN_COOKIE_PREFIX: &str = "glt_";

/// Cookie that proves the identity callback succeeded.
pub const IDENTITY_COOKIE: &str = "UcasIdentity";

/// Field selection submitted to the identity token endpoint.
const JWT_FIELDS: &str = "firstName, lastName, email, data.bypassVarnishCache, data.hasFinalised, locale, photoURL, thumbnailURL, data.lastLoginDevice, lastLoginTimestamp, data.userTypes, data.userTypePreference, rbaPolicy.riskPolicy";

/// Fixed browser-fingerprint blob the login form expects.
const RISK_CONTEXT: &str = r#"{"b0":449227,"b1":[860,1684,1272,1838],"b2":10,"b3":[],"b4":5,"b5":2,"b6":"Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/134.0.0.0 Safari/537.36 Edg/134.0.0.0","b7":[{"name":"PDF Viewer","filename":"internal-pdf-viewer","length":2},{"name":"Chrome PDF Viewer","filename":"internal-pdf-viewer","length":2},{"name":"Chromium PDF Viewer","filename":"internal-pdf-viewer","length":2},{"name":"Microsoft Edge PDF Viewer","filename":"internal-pdf-viewer","length":2},{"name":"WebKit built-in PDF","filename":"internal-pdf-viewer","length":2}],"b8":"15:33:08","b9":-480,"b10":{"state":"prompt"},"b11":false,"b12":{"charging":null,"chargingTime":null,"dischargingTime":null,"level":null},"b13":[null,"2560|1440|24",false,true]}"#;

const NEW_RELIC_ID: &str = "eyJ2IjpbMCwxXSwiZCI6eyJ0eSI6IkJyb3dzZXIiLCJhYyI6Ijk4Nzg4NiIsImFwIjoiMTEyMDM0MzUzMyIsImlkIjoiMWU4ZmExZTliYWM5YTcyNCIsInRyIjoiYjg5ZGEwYmMwYWMzNDgwNmVmZmVjODdmNzRkYzRmZTQiLCJ0aSI6MTc2MTg5OTUxMTkzMiwidGsiOiIxMzc5MDc3In19";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("bootstrap endpoint returned {0}")]
    Bootstrap(StatusCode),
    #[error("credentials rejected: {0}")]
    CredentialsRejected(String),
    #[error("no login token cookie in the bootstrap session")]
    LoginTokenMissing,
    #[error("identity token retrieval failed: {0}")]
    IdentityToken(String),
    #[error("malformed identity token: {0}")]
    MalformedToken(#[from] JwtError),
    #[error("login callback returned {0}")]
    Callback(StatusCode),
    #[error("login callback set no identity cookie")]
    IdentityCookieMissing,
    #[error("parse error: {0}")]
    Parse(String),
}

/// Provider endpoints for the sign-in exchange. Fixed in production.
#[derive(Debug, Clone)]
pub struct AuthEndpoints {
    pub bootstrap: String,
    pub login: String,
    pub get_jwt: String,
    pub login_callback: String,
}

impl Default for AuthEndpoints {
    fn default() -> Self {
        Self {
            bootstrap: urls::BOOTSTRAP.to_owned(),
            login: urls::LOGIN.to_owned(),
            get_jwt: urls::GET_JWT.to_owned(),
            login_callback: urls::LOGIN_CALLBACK.to_owned(),
        }
    }
}

/// Run the full sign-in exchange and return the accumulated cookie string.
pub async fn login(client: &Client, username: &str, password: &str) -> Result<String, AuthError> {
    login_with(client, &AuthEndpoints::default(), username, password).await
}

pub async fn login_with(
    client: &Client,
    endpoints: &AuthEndpoints,
    username: &str,
    password: &str,
) -> Result<String, AuthError> {
    let mut session = AccountSession::new(client.clone(), PAGE_URL);

    bootstrap(&mut session, &endpoints.bootstrap).await?;
    let login_token =
        submit_credentials(&mut session, &endpoints.login, username, password).await?;
    let identity_token =
        fetch_identity_token(&mut session, &endpoints.get_jwt, &login_token).await?;
    complete_callback(&mut session, &endpoints.login_callback, &identity_token).await?;

    info!("sign-in complete; session cookies captured");
    Ok(session.into_cookie_string())
}

/// Establish the anonymous SDK session. The response seeds the jar with
/// the provider's session cookies, the login-token cookie among them.
async fn bootstrap(session: &mut AccountSession, url: &str) -> Result<(), AuthError> {
    let form = [
        ("apiKey", API_KEY),
        ("pageURL", PAGE_URL),
        ("sdk", SDK),
        ("sdkBuild", SDK_BUILD),
        ("format", "json"),
    ];

    let response = session.post(url).form(&form).send().await?;
    let status = response.status();
    if status != StatusCode::OK {
        return Err(AuthError::Bootstrap(status));
    }

    session.absorb_cookies(response.headers());
    debug!("bootstrap session established");
    Ok(())
}

/// Submit the credentials over the bootstrap session. The endpoint
/// answers HTTP 200 either way; `errorCode` in the JSON body decides.
async fn submit_credentials(
    session: &mut AccountSession,
    url: &str,
    username: &str,
    password: &str,
) -> Result<String, AuthError> {
    let form = [
        ("loginID", username),
        ("password", password),
        ("sessionExpiration", "0"),
        ("targetEnv", "jssdk"),
        ("include", "profile,data,emails,subscriptions,preferences,"),
        ("includeUserInfo", "true"),
        ("loginMode", "standard"),
        ("lang", "en"),
        ("riskContext", RISK_CONTEXT),
        ("APIKey", API_KEY),
        ("source", "showScreenSet"),
        ("sdk", SDK),
        ("authMode", "cookie"),
        ("pageURL", PAGE_URL),
        ("sdkBuild", SDK_BUILD),
        ("format", "json"),
    ];

    let response = session.post(url).form(&form).send().await?;
    let status = response.status();
    if status != StatusCode::OK {
        return Err(AuthError::CredentialsRejected(format!(
            "login endpoint returned {status}"
        )));
    }

    session.absorb_cookies(response.headers());

    let body: Value = response
        .json()
        .await
        .map_err(|e| AuthError::Parse(e.to_string()))?;
    let code = body.get("errorCode").and_then(Value::as_i64).unwrap_or(-1);
    if code != 0 {
        let message = body
            .get("errorMessage")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(AuthError::CredentialsRejected(format!(
            "error {code}: {message}"
        )));
    }

    // The login token lives in a cookie the bootstrap session was expected
    // to persist; its absence means stage 1 did not take.
    let token = session
        .cookie_with_prefix(LOGIN_TOKEN_COOKIE_PREFIX)
        .ok_or(AuthError::LoginTokenMissing)?
        .to_owned();

    debug!("credentials accepted; login token extracted");
    Ok(token)
}

#[derive(Debug, Deserialize)]
struct JwtResponse {
    #[serde(rename = "errorCode")]
    error_code: Option<i64>,
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
    id_token: Option<String>,
}

/// Trade the login token for the identity token.
async fn fetch_identity_token(
    session: &mut AccountSession,
    url: &str,
    login_token: &str,
) -> Result<String, AuthError> {
    let form = [
        ("fields", JWT_FIELDS),
        ("APIKey", API_KEY),
        ("sdk", SDK),
        ("login_token", login_token),
        ("authMode", "cookie"),
        ("pageURL", PAGE_URL),
        ("sdkBuild", SDK_BUILD),
        ("format", "json"),
    ];

    let response = session.post(url).form(&form).send().await?;
    let status = response.status();
    if status != StatusCode::OK {
        return Err(AuthError::IdentityToken(format!(
            "endpoint returned {status}"
        )));
    }

    session.absorb_cookies(response.headers());

    let body: JwtResponse = response
        .json()
        .await
        .map_err(|e| AuthError::Parse(e.to_string()))?;
    let code = body.error_code.unwrap_or(-1);
    if code != 0 {
        let message = body
            .error_message
            .unwrap_or_else(|| format!("error {code}"));
        return Err(AuthError::IdentityToken(message));
    }

    match body.id_token {
        Some(token) if !token.is_empty() => {
            debug!("identity token issued");
            Ok(token)
        }
        _ => Err(AuthError::IdentityToken(
            "response carried no id_token".to_owned(),
        )),
    }
}

/// Replay the identity token to the account callback. Success is proven
/// by the identity cookie landing in the jar.
async fn complete_callback(
    session: &mut AccountSession,
    url: &str,
    identity_token: &str,
) -> Result<(), AuthError> {
    let payload = jwt::decode_payload(identity_token)?;
    let claims = IdentityClaims::from_payload(&payload);

    let body = serde_json::json!({
        "token": identity_token,
        "level": 10,
        "presentLoginDevice": device_id(),
        "isSSO": false,
        "User": {
            "Email": claims.email,
            "UserTypes": claims.user_types,
            "UserTypePreference": claims.user_type_preference,
            "UcasAccountId": claims.account_id,
        },
    });

    let response = session
        .post(url)
        .header("X-NewRelic-ID", NEW_RELIC_ID)
        .json(&body)
        .send()
        .await?;
    let status = response.status();
    if status != StatusCode::OK {
        return Err(AuthError::Callback(status));
    }

    session.absorb_cookies(response.headers());
    if session.cookie(IDENTITY_COOKIE).is_none() {
        return Err(AuthError::IdentityCookieMissing);
    }

    debug!("identity cookie granted");
    Ok(())
}

/// Hyphen-less UUIDv4, matching the device identifiers the web SDK mints.
fn device_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_ids_are_hyphenless_and_unique() {
        let a = device_id();
        let b = device_id();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
