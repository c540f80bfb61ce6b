// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt::Debug;

/// Bearer token presented to the Cloud Controller.
///
/// The nozzle does not talk to UAA: the operator supplies a token and is responsible for
/// rotating it.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: &str) -> Self {
        AccessToken(token.trim().to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Formats the token as an `Authorization` header value. Tokens that already carry a scheme
    /// (`bearer ...`) are passed through untouched.
    pub fn authorization_header(&self) -> String {
        if self.0.to_ascii_lowercase().starts_with("bearer ") {
            self.0.clone()
        } else {
            format!("Bearer {}", self.0)
        }
    }
}

impl Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccessToken(***)")
    }
}
