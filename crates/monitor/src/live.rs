//! Collaborators backed by the live UCAS endpoints.

use async_trait::async_trait;
use reqwest::Client;

use ucas_client::auth::{self, AuthError};
use ucas_client::track::{TrackClient, TrackError};

use crate::monitor::{Authenticator, OfferSource};

#[async_trait]
impl OfferSource for TrackClient {
    async fn offer_count(&self, cookie_header: &str) -> Result<u64, TrackError> {
        self.fetch_offer_count(cookie_header).await
    }
}

/// Credential sign-in against the live identity provider.
pub struct UcasAuthenticator {
    client: Client,
}

impl UcasAuthenticator {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Authenticator for UcasAuthenticator {
    async fn login(&self, username: &str, password: &str) -> Result<String, AuthError> {
        auth::login(&self.client, username, password).await
    }
}
