// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Application → space → organization identity cache.
//!
//! The cache keeps one snapshot per resource kind. A refresh rebuilds each snapshot off to the
//! side from a paginated listing and swaps it in whole, so readers see either the old or the new
//! map for a kind and are never blocked by a refresh in progress. A kind whose listing fails keeps
//! serving its previous snapshot until a later refresh succeeds.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use derive_more::Display;
use hashbrown::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::TopologyError;

/// Number of resources requested per listing page
pub const PAGE_SIZE: u32 = 100;

/// Default period between two topology refreshes
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(1800);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ResourceKind {
    #[display("applications")]
    Applications,
    #[display("spaces")]
    Spaces,
    #[display("organizations")]
    Organizations,
}

/// One listed resource. `parent_id` is the owning space for an application, the owning
/// organization for a space and unset for an organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
}

impl Resource {
    pub fn new(id: impl Into<String>, name: impl Into<String>, parent_id: Option<&str>) -> Self {
        Resource {
            id: id.into(),
            name: name.into(),
            parent_id: parent_id.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourcePage {
    pub resources: Vec<Resource>,
    /// Page number to request next, `None` once the listing is exhausted
    pub next_page: Option<u32>,
}

/// Paginated listing of the platform topology.
#[async_trait]
pub trait TopologySource: Send + Sync {
    /// Lists one page (1-indexed) of `kind`, at most [`PAGE_SIZE`] resources per page.
    async fn list(&self, kind: ResourceKind, page: u32) -> Result<ResourcePage, TopologyError>;
}

/// Organizational lineage of one application. Fields that could not be resolved are `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppIdentity {
    pub application_id: String,
    pub application_name: Option<String>,
    pub space_id: Option<String>,
    pub space_name: Option<String>,
    pub organization_id: Option<String>,
    pub organization_name: Option<String>,
}

impl AppIdentity {
    /// True when the application itself appears in the current snapshot.
    pub fn is_known(&self) -> bool {
        self.application_name.is_some() || self.space_id.is_some()
    }

    /// Present fields as `(tag, value)` pairs, in lineage order.
    pub fn tags(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("applicationId", Some(self.application_id.as_str())),
            ("applicationName", self.application_name.as_deref()),
            ("spaceId", self.space_id.as_deref()),
            ("spaceName", self.space_name.as_deref()),
            ("organizationId", self.organization_id.as_deref()),
            ("organizationName", self.organization_name.as_deref()),
        ]
        .into_iter()
        .filter_map(|(tag, value)| value.map(|value| (tag, value)))
    }
}

type Snapshot = HashMap<String, Resource>;

pub struct TopologyCache {
    source: Option<Arc<dyn TopologySource>>,
    applications: ArcSwap<Snapshot>,
    spaces: ArcSwap<Snapshot>,
    organizations: ArcSwap<Snapshot>,
}

impl TopologyCache {
    pub fn new(source: Arc<dyn TopologySource>) -> Self {
        Self::with_source(Some(source))
    }

    /// A cache without a topology source. Refreshing it is a no-op and every lookup resolves
    /// nothing beyond the application id.
    pub fn disabled() -> Self {
        Self::with_source(None)
    }

    fn with_source(source: Option<Arc<dyn TopologySource>>) -> Self {
        TopologyCache {
            source,
            applications: ArcSwap::from_pointee(Snapshot::new()),
            spaces: ArcSwap::from_pointee(Snapshot::new()),
            organizations: ArcSwap::from_pointee(Snapshot::new()),
        }
    }

    pub fn lookup(&self, application_id: &str) -> AppIdentity {
        let applications = self.applications.load();
        let spaces = self.spaces.load();
        let organizations = self.organizations.load();

        let application = applications.get(application_id);
        let space_id = application.and_then(|app| app.parent_id.clone());
        let space = space_id.as_deref().and_then(|id| spaces.get(id));
        let organization_id = space.and_then(|space| space.parent_id.clone());
        let organization = organization_id
            .as_deref()
            .and_then(|id| organizations.get(id));

        AppIdentity {
            application_id: application_id.to_string(),
            application_name: application.map(|app| app.name.clone()),
            space_id,
            space_name: space.map(|space| space.name.clone()),
            organization_id,
            organization_name: organization.map(|org| org.name.clone()),
        }
    }

    /// Re-reads all three listings. Each kind is refreshed independently: a failing listing is
    /// logged and leaves that kind's previous snapshot in place.
    pub async fn refresh(&self) {
        let Some(source) = self.source.as_deref() else {
            debug!("No topology source configured, skipping topology refresh");
            return;
        };

        info!("Refreshing application topology cache");
        tokio::join!(
            Self::refresh_kind(source, ResourceKind::Applications, &self.applications),
            Self::refresh_kind(source, ResourceKind::Spaces, &self.spaces),
            Self::refresh_kind(source, ResourceKind::Organizations, &self.organizations),
        );
    }

    async fn refresh_kind(
        source: &dyn TopologySource,
        kind: ResourceKind,
        snapshot: &ArcSwap<Snapshot>,
    ) {
        match fetch_all(source, kind).await {
            Ok(resources) => {
                debug!("Loaded {} {}", resources.len(), kind);
                snapshot.store(Arc::new(resources));
            }
            Err(e) => {
                warn!(
                    "Failed to refresh {}, keeping {} cached entries: {}",
                    kind,
                    snapshot.load().len(),
                    e
                );
            }
        }
    }

    /// Refreshes immediately, then once per `period` until `cancel_token` fires.
    pub async fn run_refresh_loop(
        self: Arc<Self>,
        period: Duration,
        cancel_token: CancellationToken,
    ) {
        let mut refresh_interval = tokio::time::interval(period.max(Duration::from_secs(1)));
        refresh_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = refresh_interval.tick() => self.refresh().await,
                _ = cancel_token.cancelled() => {
                    debug!("Topology refresh loop stopped");
                    break;
                }
            }
        }
    }
}

/// Walks every page of `kind` in order. A page is only requested once the previous one has been
/// merged.
async fn fetch_all(
    source: &dyn TopologySource,
    kind: ResourceKind,
) -> Result<Snapshot, TopologyError> {
    let mut resources = Snapshot::new();
    let mut page = 1;

    loop {
        let response = source.list(kind, page).await?;
        for resource in response.resources {
            resources.insert(resource.id.clone(), resource);
        }

        match response.next_page {
            Some(next) if next > page => page = next,
            Some(next) => {
                warn!("Listing of {kind} pointed back to page {next} from page {page}, stopping");
                break;
            }
            None => break,
        }
    }

    Ok(resources)
}
