// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod access_token;
pub mod backoff;
pub mod batch_buffer;
pub mod batch_sender;
pub mod cloud_controller;
pub mod config;
pub mod envelope;
pub mod errors;
pub mod firehose;
pub mod http_utils;
pub mod line_protocol;
pub mod nozzle;
pub mod topology;
pub mod transport;
pub mod util;
