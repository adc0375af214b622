use crate::{Error, Result, Session, utils};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hoopla_mpd::{PsshBox, SystemId};
use log::{debug, warn};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const AUTH_TOKEN_HEADER: &str = "x-dt-auth-token";
const CUSTOM_DATA_HEADER: &str = "dt-custom-data";

/// Authorization token issued for one circulation.
///
/// The token is an opaque capability and is never parsed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseToken {
    pub token: String,
    pub media_key: String,
    pub patron_id: String,
    pub circulation_id: String,
    pub retrieved_at: DateTime<Utc>,
}

/// Custom data record attached to license proxy requests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomData {
    pub user_id: String,
    pub session_id: String,
    pub merchant: String,
}

impl CustomData {
    pub fn new(token: &LicenseToken, merchant: &str) -> Self {
        Self {
            user_id: token.patron_id.clone(),
            session_id: token.circulation_id.clone(),
            merchant: merchant.to_owned(),
        }
    }

    /// Base64 encoded json, as sent in the `dt-custom-data` header.
    pub fn encode(&self) -> Result<String> {
        Ok(utils::encode_base64(serde_json::to_vec(self)?))
    }
}

/// Opaque Widevine license response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidevineLicense {
    #[serde(with = "base64_bytes")]
    pub license: Vec<u8>,
    pub endpoint: String,
    pub custom_data: CustomData,
    pub retrieved_at: DateTime<Utc>,
}

mod base64_bytes {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&crate::utils::encode_base64(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let value = String::deserialize(deserializer)?;
        crate::utils::decode_base64(value).map_err(D::Error::custom)
    }
}

/// License operations needed by a workflow.
#[async_trait]
pub trait LicenseService: Send + Sync {
    async fn issue_token(
        &self,
        media_key: &str,
        patron_id: &str,
        circulation_id: &str,
    ) -> Result<LicenseToken>;

    async fn request_widevine_license(
        &self,
        token: &LicenseToken,
        header: &str,
    ) -> Result<WidevineLicense>;
}

/// Talks to the license issuance endpoint and the license proxy.
pub struct LicenseAcquirer {
    client: Client,
    session: Arc<Session>,
    token_endpoint: String,
    proxy_endpoint: String,
    merchant: String,
}

impl LicenseAcquirer {
    pub fn new(
        client: Client,
        session: Arc<Session>,
        token_endpoint: impl Into<String>,
        proxy_endpoint: impl Into<String>,
        merchant: impl Into<String>,
    ) -> Self {
        Self {
            client,
            session,
            token_endpoint: token_endpoint.into(),
            proxy_endpoint: proxy_endpoint.into(),
            merchant: merchant.into(),
        }
    }
}

#[async_trait]
impl LicenseService for LicenseAcquirer {
    async fn issue_token(
        &self,
        media_key: &str,
        patron_id: &str,
        circulation_id: &str,
    ) -> Result<LicenseToken> {
        let url = utils::fill_template(
            &self.token_endpoint,
            &[
                ("media_key", media_key),
                ("patron_id", patron_id),
                ("circulation_id", circulation_id),
            ],
        )
        .map_err(Error::NetworkFailure)?;

        let response = self
            .session
            .authorize(self.client.get(url.clone()))
            .send()
            .await
            .and_then(|x| x.error_for_status())
            .map_err(Error::from_reqwest)?;

        // The body is the token itself, not a json wrapper.
        let token = response.text().await.map_err(Error::from_reqwest)?;
        let token = token.trim();

        if token.is_empty() {
            return Err(Error::EmptyResponse(url.to_string()));
        }

        Ok(LicenseToken {
            token: token.to_owned(),
            media_key: media_key.to_owned(),
            patron_id: patron_id.to_owned(),
            circulation_id: circulation_id.to_owned(),
            retrieved_at: Utc::now(),
        })
    }

    async fn request_widevine_license(
        &self,
        token: &LicenseToken,
        header: &str,
    ) -> Result<WidevineLicense> {
        let url = self.proxy_endpoint.parse::<Url>().map_err(|x| {
            Error::LicenseAcquisitionFailure(format!("invalid license proxy url ({})", x))
        })?;

        let challenge = utils::decode_base64(header.trim()).map_err(|x| {
            Error::LicenseAcquisitionFailure(format!("protection header is not base64 ({})", x))
        })?;

        match PsshBox::from_bytes(&challenge) {
            Ok(pssh) if pssh.system_id == SystemId::WideVine => (),
            Ok(pssh) => warn!("Protection header belongs to {} system.", pssh.system_id),
            Err(e) => warn!("Protection header is not a pssh box ({}).", e),
        }

        let custom_data = CustomData::new(token, &self.merchant);

        let response = self
            .client
            .post(url.clone())
            .header(AUTH_TOKEN_HEADER, &token.token)
            .header(CUSTOM_DATA_HEADER, custom_data.encode()?)
            .body(challenge)
            .send()
            .await
            .map_err(|x| Error::LicenseAcquisitionFailure(x.without_url().to_string()))?;

        let status = response.status();

        if !status.is_success() {
            // The body may echo request material back, keep it out of results.
            let body = response.text().await.unwrap_or_default();
            debug!("license proxy answered {}: {}", status, utils::truncate(&body, 120));
            return Err(Error::LicenseAcquisitionFailure(format!(
                "license proxy answered {}",
                status
            )));
        }

        let license = response
            .bytes()
            .await
            .map_err(|x| Error::LicenseAcquisitionFailure(x.without_url().to_string()))?;

        if license.is_empty() {
            return Err(Error::EmptyResponse(url.to_string()));
        }

        Ok(WidevineLicense {
            license: license.to_vec(),
            endpoint: url.to_string(),
            custom_data,
            retrieved_at: Utc::now(),
        })
    }
}
