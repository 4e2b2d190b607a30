//! Outbound request pipeline: bearer interceptor + 401 authenticator

use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, Request, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::auth::Authenticator;
use super::result::ApiResult;

/// Whether the interceptor may attach the bearer token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Auth {
    Bearer,
    None,
}

/// Build the shared reqwest client with fixed connect/total timeouts
pub fn build_http_client(connect_timeout: Duration, request_timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(request_timeout)
        .build()
}

/// HTTP client for the platform API
#[derive(Clone)]
pub struct HttpPipeline {
    client: Client,
    base_url: String,
    auth: Authenticator,
}

impl HttpPipeline {
    pub fn new(client: Client, base_url: &str, auth: Authenticator) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        }
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.auth
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Start a request for `path` (which begins with `/`)
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, format!("{}{}", self.base_url, path))
    }

    /// Start a request for the path built from `segments`, each percent-encoded
    /// so ids cannot add segments or a query
    pub fn request_path(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let url = Url::parse(&self.base_url).and_then(|mut url| {
            url.path_segments_mut()
                .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
                .pop_if_empty()
                .extend(segments);
            Ok(url)
        });
        match url {
            Ok(url) => self.client.request(method, url),
            // reqwest reports the bad base URL when the request is built
            Err(_) => self.request(method, &format!("/{}", segments.join("/"))),
        }
    }

    /// Send a request expecting a JSON body
    pub async fn call<T: DeserializeOwned>(&self, builder: RequestBuilder, auth: Auth) -> ApiResult<T> {
        match self.send(builder, auth).await {
            Ok(response) => ApiResult::from_response(response).await,
            Err(e) => ApiResult::from_transport(e),
        }
    }

    /// Send a request whose success body is ignored
    pub async fn call_empty(&self, builder: RequestBuilder, auth: Auth) -> ApiResult<()> {
        match self.send(builder, auth).await {
            Ok(response) => ApiResult::from_empty_response(response).await,
            Err(e) => ApiResult::from_transport(e),
        }
    }

    /// Attach credentials, send, and on 401 retry once after a refresh
    pub async fn send(&self, builder: RequestBuilder, auth: Auth) -> reqwest::Result<Response> {
        let mut request = builder.build()?;
        let replay = request.try_clone();

        let token = match auth {
            Auth::Bearer => self.auth.access_token(),
            Auth::None => None,
        };
        if let Some(token) = token.as_deref() {
            set_bearer(&mut request, token);
        }

        debug!("{} {}", request.method(), request.url().path());
        let response = self.client.execute(request).await?;

        if response.status() != StatusCode::UNAUTHORIZED || auth == Auth::None {
            return Ok(response);
        }

        let Some(new_token) = self.auth.authenticate(token.as_deref()).await else {
            return Ok(response);
        };
        let Some(mut retry) = replay else {
            warn!("Request body cannot be replayed, not retrying after refresh");
            return Ok(response);
        };

        set_bearer(&mut retry, &new_token);
        debug!("Retrying {} {} with refreshed token", retry.method(), retry.url().path());
        self.client.execute(retry).await
    }
}

fn set_bearer(request: &mut Request, token: &str) {
    match HeaderValue::from_str(&format!("Bearer {}", token)) {
        Ok(mut value) => {
            value.set_sensitive(true);
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        Err(e) => warn!("Access token is not a valid header value: {}", e),
    }
}
