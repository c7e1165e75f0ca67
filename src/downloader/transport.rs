// reqwest-backed transport

use async_trait::async_trait;
use reqwest::cookie::Jar;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::errors::DownloadError;
use super::models::ClientConfig;
use super::traits::{HtmlPage, Transport};

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, DownloadError> {
        // Pre-acknowledged consent cookie; the interstitial is still handled
        // when YouTube ignores it.
        let jar = Jar::default();
        if let Ok(origin) = config.base_url.parse::<reqwest::Url>() {
            jar.add_cookie_str("CONSENT=YES+cb; Domain=.youtube.com", &origin);
        }

        let mut builder = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .cookie_provider(Arc::new(jar))
            .timeout(Duration::from_secs(config.timeout_seconds));

        if let Some(proxy_url) = config.proxy.as_deref() {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| DownloadError::InvalidUrl(format!("proxy {}: {}", proxy_url, e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build()?;
        Ok(Self { client })
    }

    async fn into_page(response: reqwest::Response) -> Result<HtmlPage, DownloadError> {
        let response = response.error_for_status()?;
        let url = response.url().to_string();
        let body = response.text().await?;
        Ok(HtmlPage { url, body })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    fn name(&self) -> &'static str {
        "reqwest"
    }

    async fn get_page(&self, url: &str) -> Result<HtmlPage, DownloadError> {
        let response = self.client.get(url).send().await?;
        Self::into_page(response).await
    }

    async fn post_form(
        &self,
        url: &str,
        params: &[(String, String)],
    ) -> Result<HtmlPage, DownloadError> {
        let response = self.client.post(url).query(params).send().await?;
        Self::into_page(response).await
    }

    async fn post_json(
        &self,
        url: &str,
        query: &[(String, String)],
        body: &Value,
    ) -> Result<Value, DownloadError> {
        let response = self.client.post(url).query(query).json(body).send().await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(DownloadError::Http {
                status: status.as_u16(),
            });
        }

        Ok(response.json::<Value>().await?)
    }
}
