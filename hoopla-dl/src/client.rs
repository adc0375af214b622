use reqwest::{
    Client, Proxy,
    header::{HeaderMap, HeaderName, HeaderValue},
};
use std::time::Duration;

/// Headers the web player sends with every gateway request.
const DEFAULT_HEADERS: &[(&str, &str)] = &[
    ("accept", "application/json, text/plain, */*"),
    ("accept-language", "en-US,en;q=0.9"),
    ("app", "WWW"),
    ("binge-pass-external-enabled", "true"),
    ("device-model", "139.0.0.0"),
    ("device-version", "Chrome"),
    ("hoopla-version", "4.124.2"),
    ("origin", "https://www.hoopladigital.com"),
    ("os", "Windows"),
    ("os-version", "10"),
    ("referer", "https://www.hoopladigital.com/"),
    ("ws-api", "2.1"),
];

/// Settings of the shared http client.
#[derive(Clone, Debug)]
pub struct ClientOptions {
    pub user_agent: String,
    pub proxy: Option<Proxy>,
    pub timeout: Duration,
    /// Extra headers, these override the defaults.
    pub headers: Vec<(HeaderName, HeaderValue)>,
    pub no_certificate_checks: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            user_agent: crate::options::DEFAULT_USER_AGENT.to_owned(),
            proxy: None,
            timeout: Duration::from_secs(60),
            headers: vec![],
            no_certificate_checks: false,
        }
    }
}

impl ClientOptions {
    pub fn build(&self) -> reqwest::Result<Client> {
        let mut headers = HeaderMap::new();

        for (name, value) in DEFAULT_HEADERS {
            headers.insert(*name, HeaderValue::from_static(*value));
        }

        for (name, value) in &self.headers {
            headers.insert(name.clone(), value.clone());
        }

        let mut client_builder = Client::builder()
            .cookie_store(true)
            .danger_accept_invalid_certs(self.no_certificate_checks)
            .default_headers(headers)
            .timeout(self.timeout)
            .user_agent(&self.user_agent);

        if let Some(proxy) = &self.proxy {
            client_builder = client_builder.proxy(proxy.clone());
        }

        client_builder.build()
    }
}
