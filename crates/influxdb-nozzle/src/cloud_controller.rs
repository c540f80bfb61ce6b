// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Cloud Controller (v2 API) implementation of [`TopologySource`].

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use crate::access_token::AccessToken;
use crate::errors::TopologyError;
use crate::topology::{Resource, ResourceKind, ResourcePage, TopologySource, PAGE_SIZE};

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    next_url: Option<String>,
    #[serde(default)]
    resources: Vec<ResourceEntry>,
}

#[derive(Debug, Deserialize)]
struct ResourceEntry {
    metadata: Metadata,
    entity: Entity,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    guid: String,
}

#[derive(Debug, Deserialize)]
struct Entity {
    name: String,
    #[serde(default)]
    space_guid: Option<String>,
    #[serde(default)]
    organization_guid: Option<String>,
}

pub struct CloudControllerClient {
    client: reqwest::Client,
    api_url: Url,
    access_token: AccessToken,
}

impl CloudControllerClient {
    /// `api_host` may be a full URL (`https://api.sys.example.com`) or a bare host name
    /// (`api.sys.example.com`), in which case https is assumed.
    pub fn new(
        api_host: &str,
        access_token: AccessToken,
        client: reqwest::Client,
    ) -> Result<Self, TopologyError> {
        let api_url = api_url(api_host)?;
        Ok(CloudControllerClient {
            client,
            api_url,
            access_token,
        })
    }

    fn endpoint(&self, kind: ResourceKind) -> Result<Url, TopologyError> {
        let path = match kind {
            ResourceKind::Applications => "v2/apps",
            ResourceKind::Spaces => "v2/spaces",
            ResourceKind::Organizations => "v2/organizations",
        };
        self.api_url
            .join(path)
            .map_err(|e| TopologyError::Endpoint(e.to_string()))
    }

    /// Reads the `page` query parameter of a `next_url`. A present but unparseable link still
    /// advances by one page.
    fn next_page(&self, next_url: Option<&str>, current: u32) -> Option<u32> {
        let next_url = next_url.map(str::trim).filter(|url| !url.is_empty())?;
        let page = self.api_url.join(next_url).ok().and_then(|url| {
            url.query_pairs()
                .find(|(key, _)| key.eq_ignore_ascii_case("page"))
                .and_then(|(_, value)| value.parse::<u32>().ok())
        });
        Some(page.unwrap_or(current + 1))
    }
}

fn api_url(api_host: &str) -> Result<Url, TopologyError> {
    let trimmed = api_host.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(TopologyError::Endpoint("empty API host".to_string()));
    }
    let with_scheme = if trimmed.contains("://") {
        format!("{trimmed}/")
    } else {
        format!("https://{trimmed}/")
    };
    Url::parse(&with_scheme).map_err(|e| TopologyError::Endpoint(format!("{api_host}: {e}")))
}

#[async_trait]
impl TopologySource for CloudControllerClient {
    async fn list(&self, kind: ResourceKind, page: u32) -> Result<ResourcePage, TopologyError> {
        let url = self.endpoint(kind)?;
        debug!("Listing {} page {} from {}", kind, page, url);

        let response = self
            .client
            .get(url)
            .query(&[
                ("page", page.to_string()),
                ("results-per-page", PAGE_SIZE.to_string()),
            ])
            .header(AUTHORIZATION, self.access_token.authorization_header())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TopologyError::Status { status, body });
        }

        let listing: ListResponse = response.json().await?;
        let next_page = self.next_page(listing.next_url.as_deref(), page);
        let resources = listing
            .resources
            .into_iter()
            .map(|entry| {
                let parent_id = match kind {
                    ResourceKind::Applications => entry.entity.space_guid,
                    ResourceKind::Spaces => entry.entity.organization_guid,
                    ResourceKind::Organizations => None,
                };
                Resource {
                    id: entry.metadata.guid,
                    name: entry.entity.name,
                    parent_id,
                }
            })
            .collect();

        Ok(ResourcePage {
            resources,
            next_page,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client(api_host: &str) -> CloudControllerClient {
        CloudControllerClient::new(
            api_host,
            AccessToken::new("token"),
            reqwest::Client::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_api_url_from_bare_host() {
        assert_eq!(
            api_url("api.sys.example.com").unwrap().as_str(),
            "https://api.sys.example.com/"
        );
    }

    #[test]
    fn test_api_url_from_full_url() {
        assert_eq!(
            api_url("http://127.0.0.1:8080/").unwrap().as_str(),
            "http://127.0.0.1:8080/"
        );
        assert!(api_url("  ").is_err());
    }

    #[test]
    fn test_endpoints() {
        let client = client("api.sys.example.com");
        assert_eq!(
            client.endpoint(ResourceKind::Applications).unwrap().as_str(),
            "https://api.sys.example.com/v2/apps"
        );
        assert_eq!(
            client.endpoint(ResourceKind::Organizations).unwrap().as_str(),
            "https://api.sys.example.com/v2/organizations"
        );
    }

    #[test]
    fn test_next_page() {
        let client = client("api.sys.example.com");
        assert_eq!(
            client.next_page(Some("/v2/apps?order-direction=asc&page=3&results-per-page=100"), 2),
            Some(3)
        );
        assert_eq!(client.next_page(Some("/v2/apps?results-per-page=100"), 2), Some(3));
        assert_eq!(client.next_page(Some(""), 2), None);
        assert_eq!(client.next_page(None, 2), None);
    }
}
