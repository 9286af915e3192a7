//! JSON convenience methods on top of [`AuthenticatedFetchClient::fetch`]

use super::{AuthenticatedFetchClient, error::ClientError, request::RequestInit};
use serde::{Serialize, de::DeserializeOwned};

impl AuthenticatedFetchClient {
    /// Fetch and decode a JSON response, mapping error statuses to errors
    ///
    /// A 401 that survives the silent sign-in comes back as
    /// [`ClientError::AuthenticationFailed`].
    ///
    /// # Errors
    ///
    /// Returns an error for transport failures, non-success statuses or
    /// [`ClientError::Serialization`] for an undecodable body
    pub async fn execute<T: DeserializeOwned>(
        &self,
        url: &str,
        init: RequestInit,
    ) -> Result<T, ClientError> {
        let response = self.fetch(url, init).await?;
        let status = response.status();

        if status.is_success() {
            let body = response.bytes().await?;
            Ok(serde_json::from_slice(&body)?)
        } else {
            let message = response.text().await.unwrap_or_else(|_| status.to_string());
            Err(ClientError::from_status(status, message))
        }
    }

    /// GET a JSON resource
    ///
    /// # Errors
    ///
    /// See [`AuthenticatedFetchClient::execute`]
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ClientError> {
        self.execute(url, RequestInit::get()).await
    }

    /// POST a JSON body and decode the JSON response
    ///
    /// # Errors
    ///
    /// See [`AuthenticatedFetchClient::execute`]
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let init = RequestInit::post().json(body)?;
        self.execute(url, init).await
    }
}
