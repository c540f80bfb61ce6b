// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::error::Error;
use std::time::Duration;

/// Builds a reqwest client with optional proxy configuration and timeout.
///
/// `skip_ssl_validation` accepts self-signed certificates, which is common on lab foundations.
/// It applies to every request made through the client.
pub fn build_client(
    proxy_url: Option<&str>,
    timeout: Duration,
    skip_ssl_validation: bool,
) -> Result<reqwest::Client, Box<dyn Error>> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .danger_accept_invalid_certs(skip_ssl_validation);
    if let Some(proxy) = proxy_url {
        builder = builder.proxy(reqwest::Proxy::https(proxy)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_client_without_proxy() {
        assert!(build_client(None, Duration::from_secs(5), false).is_ok());
        assert!(build_client(None, Duration::from_secs(5), true).is_ok());
    }

    #[test]
    fn test_build_client_with_proxy() {
        assert!(build_client(Some("http://proxy.internal:3128"), Duration::from_secs(5), false).is_ok());
        assert!(build_client(Some("not a url"), Duration::from_secs(5), false).is_err());
    }
}
