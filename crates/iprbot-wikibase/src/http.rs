//! MediaWiki action API + SPARQL backed [`KnowledgeBase`]

use crate::client::{EditOutcome, ItemEdit, KnowledgeBase, ReferenceAddition};
use crate::entity::parse_entity_statements;
use crate::error::{Result, WikibaseError};
use crate::ids::{PropertyId, Qid};
use crate::model::{BaseFilter, Statement};
use crate::sparql::{self, SparqlResponse};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_API_URL: &str = "https://www.wikidata.org/w/api.php";
pub const DEFAULT_SPARQL_URL: &str = "https://query.wikidata.org/sparql";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_USER_AGENT: &str = concat!("iprbot/", env!("CARGO_PKG_VERSION"));

/// Connection settings for [`HttpKnowledgeBase`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub api_url: String,
    pub sparql_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            sparql_url: DEFAULT_SPARQL_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: String,
    info: String,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    login: LoginResult,
}

#[derive(Debug, Deserialize)]
struct LoginResult {
    result: String,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EditResponse {
    success: Option<u8>,
    entity: Option<EditedEntity>,
}

#[derive(Debug, Deserialize)]
struct EditedEntity {
    id: String,
    lastrevid: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SetReferenceResponse {
    success: Option<u8>,
    pageinfo: Option<PageInfo>,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    lastrevid: Option<u64>,
}

pub struct HttpKnowledgeBase {
    client: Client,
    config: ClientConfig,
    csrf_token: Mutex<Option<String>>,
}

impl HttpKnowledgeBase {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            config,
            csrf_token: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Bot-password login; stores the CSRF token needed by [`KnowledgeBase::edit`]
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        let login_token = self.fetch_token("login").await?;

        let response = self
            .post_form(&[
                ("action", "login"),
                ("format", "json"),
                ("lgname", username),
                ("lgpassword", password),
                ("lgtoken", login_token.as_str()),
            ])
            .await?;

        let login: LoginResponse = serde_json::from_value(response)?;
        if login.login.result != "Success" {
            return Err(WikibaseError::Login(
                login.login.reason.unwrap_or(login.login.result),
            ));
        }

        let csrf = self.fetch_token("csrf").await?;
        self.set_csrf_token(csrf);
        info!(user = %username, api = %self.config.api_url, "Logged in");
        Ok(())
    }

    fn set_csrf_token(&self, token: String) {
        let mut slot = match self.csrf_token.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(token);
    }

    fn csrf_token(&self) -> Option<String> {
        match self.csrf_token.lock() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    async fn fetch_token(&self, kind: &str) -> Result<String> {
        let response: Json = self
            .client
            .get(&self.config.api_url)
            .query(&[
                ("action", "query"),
                ("meta", "tokens"),
                ("type", kind),
                ("format", "json"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        check_api_error(&response)?;

        response["query"]["tokens"][format!("{}token", kind)]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| WikibaseError::unexpected(format!("no {} token in response", kind)))
    }

    async fn post_form(&self, form: &[(&str, &str)]) -> Result<Json> {
        let response: Json = self
            .client
            .post(&self.config.api_url)
            .form(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        check_api_error(&response)?;
        Ok(response)
    }

    /// `wbeditentity` with the claim changes of `edit`
    async fn edit_claims(&self, edit: &ItemEdit, token: &str) -> Result<EditedEntity> {
        let data = serde_json::to_string(&edit.to_json())?;
        let response = self
            .post_form(&[
                ("action", "wbeditentity"),
                ("format", "json"),
                ("id", edit.qid.as_str()),
                ("data", data.as_str()),
                ("summary", edit.summary.as_str()),
                ("bot", "1"),
                ("token", token),
            ])
            .await?;

        let parsed: EditResponse = serde_json::from_value(response)?;
        match (parsed.success, parsed.entity) {
            (Some(1), Some(entity)) => Ok(entity),
            _ => Err(WikibaseError::unexpected("wbeditentity did not report success")),
        }
    }

    /// `wbsetreference` for one reference on an existing statement
    async fn set_reference(
        &self,
        addition: &ReferenceAddition,
        summary: &str,
        token: &str,
    ) -> Result<Option<u64>> {
        let snaks = serde_json::to_string(&addition.reference.snaks_json())?;
        let order = serde_json::to_string(&addition.reference.snaks_order())?;
        let response = self
            .post_form(&[
                ("action", "wbsetreference"),
                ("format", "json"),
                ("statement", addition.statement_id.as_str()),
                ("snaks", snaks.as_str()),
                ("snaks-order", order.as_str()),
                ("summary", summary),
                ("bot", "1"),
                ("token", token),
            ])
            .await?;

        let parsed: SetReferenceResponse = serde_json::from_value(response)?;
        if parsed.success != Some(1) {
            return Err(WikibaseError::unexpected("wbsetreference did not report success"));
        }
        Ok(parsed.pageinfo.and_then(|p| p.lastrevid))
    }

    async fn sparql(&self, query: &str) -> Result<SparqlResponse> {
        debug!(query = %query, "SPARQL");
        let response = self
            .client
            .get(&self.config.sparql_url)
            .query(&[("query", query), ("format", "json")])
            .header(reqwest::header::ACCEPT, "application/sparql-results+json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WikibaseError::Sparql(format!("{}: {}", status, body)));
        }

        Ok(response.json().await?)
    }
}

fn check_api_error(response: &Json) -> Result<()> {
    if let Some(error) = response.get("error") {
        let body: ApiErrorBody = serde_json::from_value(error.clone())?;
        return Err(WikibaseError::api(body.code, body.info));
    }
    Ok(())
}

#[async_trait]
impl KnowledgeBase for HttpKnowledgeBase {
    async fn id_mapper(
        &self,
        property: &PropertyId,
        filter: &BaseFilter,
    ) -> Result<BTreeMap<String, Qid>> {
        let response = self.sparql(&sparql::id_mapper_query(property, filter)).await?;
        let mapping = sparql::parse_id_mapper(&response.results.bindings)?;
        info!(property = %property, filter = %filter, entries = mapping.len(), "Built identifier mapping");
        Ok(mapping)
    }

    async fn items_with_claim(&self, property: &PropertyId, value: &Qid) -> Result<BTreeSet<Qid>> {
        let response = self
            .sparql(&sparql::items_with_claim_query(property, value))
            .await?;
        sparql::parse_items(&response.results.bindings)
    }

    async fn items_matching(&self, filter: &BaseFilter) -> Result<BTreeSet<Qid>> {
        let response = self.sparql(&sparql::items_matching_query(filter)?).await?;
        sparql::parse_items(&response.results.bindings)
    }

    async fn statements(
        &self,
        filter: &BaseFilter,
        property: &PropertyId,
    ) -> Result<Vec<(Qid, Statement)>> {
        let response = self
            .sparql(&sparql::statements_query(filter, property))
            .await?;
        sparql::parse_statements(&response.results.bindings, property)
    }

    async fn item_statements(&self, qid: &Qid) -> Result<Vec<Statement>> {
        let response: Json = self
            .client
            .get(&self.config.api_url)
            .query(&[
                ("action", "wbgetentities"),
                ("ids", qid.as_str()),
                ("props", "claims"),
                ("format", "json"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        check_api_error(&response)?;

        let entity = response["entities"]
            .get(qid.as_str())
            .ok_or_else(|| WikibaseError::EntityNotFound(qid.to_string()))?;
        if entity.get("missing").is_some() {
            return Err(WikibaseError::EntityNotFound(qid.to_string()));
        }
        parse_entity_statements(entity)
    }

    async fn edit(&self, edit: &ItemEdit) -> Result<EditOutcome> {
        let token = self.csrf_token().ok_or(WikibaseError::NotLoggedIn)?;

        let mut outcome = EditOutcome {
            qid: edit.qid.clone(),
            revid: None,
            created: false,
        };
        if edit.changes_claims() {
            let entity = self.edit_claims(edit, &token).await?;
            outcome.qid = entity.id.parse()?;
            outcome.revid = entity.lastrevid;
        }
        for addition in &edit.references {
            if let Some(revid) = self.set_reference(addition, &edit.summary, &token).await? {
                outcome.revid = Some(revid);
            }
        }

        Ok(outcome)
    }
}
