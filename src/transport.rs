use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::CONTENT_TYPE;
use reqwest::{redirect, StatusCode};
use std::sync::Arc;
use url::Url;

use crate::error::Error;

/// Status and body of a delivered response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: StatusCode,
    pub body: String,
}

/// HTTP plumbing beneath a [`crate::ConnectBox`], together with the cookie
/// store its responses feed.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url) -> Result<Reply, Error>;

    async fn post_form(&self, url: &Url, body: String) -> Result<Reply, Error>;

    /// Value of the cookie `name` that would be sent to `url`.
    fn cookie(&self, url: &Url, name: &str) -> Option<String>;

    fn set_cookie(&self, url: &Url, name: &str, value: &str);
}

pub struct HttpTransport {
    client: reqwest::Client,
    jar: Arc<Jar>,
}

impl HttpTransport {
    pub fn new() -> Result<HttpTransport, Error> {
        let jar = Arc::new(Jar::default());
        // Redirects are part of the device's own page flow; following them
        // loses the body the device meant for us.
        let client = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(HttpTransport { client, jar })
    }

    async fn read(response: reqwest::Response) -> Result<Reply, Error> {
        let status = response.status();
        let body = response.text().await?;

        Ok(Reply { status, body })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &Url) -> Result<Reply, Error> {
        let response = self.client.get(url.clone()).send().await?;

        Self::read(response).await
    }

    async fn post_form(&self, url: &Url, body: String) -> Result<Reply, Error> {
        let response = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;

        Self::read(response).await
    }

    fn cookie(&self, url: &Url, name: &str) -> Option<String> {
        let header = self.jar.cookies(url)?;
        let header = header.to_str().ok()?;

        find_cookie(header, name)
    }

    fn set_cookie(&self, url: &Url, name: &str, value: &str) {
        self.jar
            .add_cookie_str(&format!("{}={}; Path=/", name, value), url);
    }
}

/// Looks `name` up in a `Cookie` header value (`a=1; b=2`).
fn find_cookie(header: &str, name: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}
