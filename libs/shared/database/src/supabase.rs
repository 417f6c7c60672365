use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};

use shared_config::AppConfig;

use crate::error::DbError;

/// Postgres error code for `unique_violation`.
const UNIQUE_VIOLATION_CODE: &str = "23505";

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
    service_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
            service_key: config.supabase_service_role_key.clone(),
        }
    }

    /// Key the engine uses when it acts on its own behalf rather than a user's.
    pub fn service_key(&self) -> &str {
        &self.service_key
    }

    fn get_headers(&self, auth_token: Option<&str>) -> Result<HeaderMap, DbError> {
        let mut headers = HeaderMap::new();

        let api_key = if self.service_key.is_empty() { &self.anon_key } else { &self.service_key };
        headers.insert(
            "apikey",
            HeaderValue::from_str(api_key)
                .map_err(|e| DbError::Auth(format!("Invalid API key header: {}", e)))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = auth_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| DbError::Auth(format!("Invalid bearer token header: {}", e)))?,
            );
        }

        Ok(headers)
    }

    pub async fn request<T>(&self, method: Method, path: &str,
                            auth_token: Option<&str>, body: Option<Value>)
                            -> Result<T, DbError>
    where T: DeserializeOwned {
        self.request_with_headers(method, path, auth_token, body, None).await
    }

    pub async fn request_with_headers<T>(&self, method: Method, path: &str,
                                         auth_token: Option<&str>, body: Option<Value>,
                                         extra_headers: Option<HeaderMap>)
                                         -> Result<T, DbError>
    where T: DeserializeOwned {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers(auth_token)?;
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url)
            .headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API error ({}): {}", status, error_text);
            return Err(Self::map_error(status.as_u16(), error_text));
        }

        let data = response.json::<T>().await?;
        Ok(data)
    }

    /// Call a Postgres function exposed through `/rest/v1/rpc`.
    pub async fn rpc<T>(&self, function: &str, args: Value, auth_token: Option<&str>) -> Result<T, DbError>
    where T: DeserializeOwned {
        let path = format!("/rest/v1/rpc/{}", function);
        self.request(Method::POST, &path, auth_token, Some(args)).await
    }

    /// Headers asking PostgREST to echo back the affected rows.
    pub fn representation_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        headers
    }

    fn map_error(status: u16, error_text: String) -> DbError {
        let pg_code = serde_json::from_str::<Value>(&error_text)
            .ok()
            .and_then(|body| body.get("code").and_then(Value::as_str).map(str::to_string));

        if status == 409 || pg_code.as_deref() == Some(UNIQUE_VIOLATION_CODE) {
            return DbError::UniqueViolation(error_text);
        }

        match status {
            401 | 403 => DbError::Auth(error_text),
            404 => DbError::NotFound(error_text),
            _ => DbError::Api { status, message: error_text },
        }
    }
}
