use crate::{Error, Result, Session};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

const TITLE_QUERY: &str = "query GetFetchTitleDetailQuery($id: ID!, $includeDeleted: Boolean) {
  title(criteria: {id: $id, includeDeleted: $includeDeleted}) {
    id
    title
    mediaKey
    mediaType
    circulation {
      id
      dueDate
      patron {
        id
        __typename
      }
      __typename
    }
    __typename
  }
}";

/// Streaming metadata of a borrowed title.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleMetadata {
    pub id: String,
    pub title: Option<String>,
    pub media_key: String,
    pub circulation: Circulation,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Circulation {
    pub id: String,
    pub patron_id: String,
}

/// Source of [`TitleMetadata`].
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn title(&self, id: &str) -> Result<TitleMetadata>;
}

/// Catalog backed by the patron GraphQL gateway.
pub struct HooplaCatalog {
    client: Client,
    endpoint: String,
    session: Arc<Session>,
}

impl HooplaCatalog {
    pub fn new(client: Client, endpoint: impl Into<String>, session: Arc<Session>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            session,
        }
    }
}

#[async_trait]
impl Catalog for HooplaCatalog {
    async fn title(&self, id: &str) -> Result<TitleMetadata> {
        let payload = json!({
            "operationName": "GetFetchTitleDetailQuery",
            "variables": {
                "id": id,
                "includeDeleted": false,
            },
            "query": TITLE_QUERY,
        });

        let response = self
            .session
            .authorize(self.client.post(&self.endpoint))
            .header("apollographql-client-name", "hoopla-www")
            .json(&payload)
            .send()
            .await
            .and_then(|x| x.error_for_status())
            .map_err(Error::from_reqwest)?;

        let body = response.bytes().await.map_err(Error::from_reqwest)?;

        if body.is_empty() {
            return Err(Error::EmptyResponse(self.endpoint.clone()));
        }

        serde_json::from_slice::<TitleResponse>(&body)
            .map_err(|x| Error::MissingMediaInfo(format!("unexpected title record ({})", x)))?
            .into_metadata(id)
    }
}

#[derive(Deserialize)]
pub(crate) struct TitleResponse {
    data: Option<TitleData>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Deserialize)]
struct TitleData {
    title: Option<TitleRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TitleRecord {
    id: Option<Value>,
    title: Option<String>,
    media_key: Option<String>,
    circulation: Option<CirculationRecord>,
}

#[derive(Deserialize)]
struct CirculationRecord {
    id: Option<Value>,
    patron: Option<PatronRecord>,
}

#[derive(Deserialize)]
struct PatronRecord {
    id: Option<Value>,
}

impl TitleResponse {
    /// Check required fields up front so later stages never look up missing values.
    pub(crate) fn into_metadata(self, requested_id: &str) -> Result<TitleMetadata> {
        let Some(record) = self.data.and_then(|x| x.title) else {
            let reason = self
                .errors
                .into_iter()
                .map(|x| x.message)
                .collect::<Vec<_>>()
                .join("; ");

            return Err(Error::MissingMediaInfo(if reason.is_empty() {
                format!("title {} not found", requested_id)
            } else {
                reason
            }));
        };

        let media_key = required(record.media_key.map(Value::String), "mediaKey")?;
        let circulation = record
            .circulation
            .ok_or_else(|| Error::MissingMediaInfo("circulation (title is not borrowed)".to_owned()))?;
        let circulation_id = required(circulation.id, "circulation.id")?;
        let patron_id = required(circulation.patron.and_then(|x| x.id), "circulation.patron.id")?;

        Ok(TitleMetadata {
            id: record
                .id
                .and_then(|x| scalar(&x))
                .unwrap_or_else(|| requested_id.to_owned()),
            title: record.title,
            media_key,
            circulation: Circulation {
                id: circulation_id,
                patron_id,
            },
        })
    }
}

/// Ids come back either as strings or numbers.
fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(x) if !x.trim().is_empty() => Some(x.trim().to_owned()),
        Value::Number(x) => Some(x.to_string()),
        _ => None,
    }
}

fn required(value: Option<Value>, field: &str) -> Result<String> {
    value
        .as_ref()
        .and_then(scalar)
        .ok_or_else(|| Error::MissingMediaInfo(format!("{} is missing", field)))
}

/// Account level records archived as returned by the gateway.
pub struct Account<'a> {
    client: &'a Client,
    session: &'a Session,
}

impl<'a> Account<'a> {
    pub fn new(client: &'a Client, session: &'a Session) -> Self {
        Self { client, session }
    }

    pub async fn fetch(&self, endpoint: &str) -> Result<Value> {
        let response = self
            .session
            .authorize(self.client.get(endpoint))
            .send()
            .await
            .and_then(|x| x.error_for_status())
            .map_err(Error::from_reqwest)?;

        let body = response.bytes().await.map_err(Error::from_reqwest)?;

        if body.is_empty() {
            return Err(Error::EmptyResponse(endpoint.to_owned()));
        }

        Ok(serde_json::from_slice(&body)?)
    }
}

/// Title ids of the borrowed items listing.
///
/// Entries are matched on `titleId`, then `id`; anything else is skipped.
pub fn borrowed_title_ids(borrowed: &Value) -> Vec<String> {
    let items: &[Value] = match borrowed {
        Value::Array(x) => x.as_slice(),
        Value::Object(x) => match x.get("items").or_else(|| x.get("titles")) {
            Some(Value::Array(x)) => x.as_slice(),
            _ => &[],
        },
        _ => &[],
    };

    let mut ids = vec![];

    for item in items {
        if let Some(id) = item
            .get("titleId")
            .or_else(|| item.get("id"))
            .and_then(scalar)
            && !ids.contains(&id)
        {
            ids.push(id);
        }
    }

    ids
}
