//! kube-rs implementations of the cluster-facing traits

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, DynamicObject, Patch, PatchParams, PostParams};
use kube::discovery::{ApiResource, Discovery, Scope};
use kube::runtime::{watcher, WatchStreamExt};
use kube::Client;
use salvage_common::{GroupVersionResource, Unstructured};
use serde_json::Value;
use tracing::{debug, info};

use crate::client::{DynamicClient, DynamicFactory, NamespaceClient, WatchEvent};
use crate::discovery::{ApiGroupResources, ApiResourceInfo, StaticDiscovery};
use crate::error::RestoreError;

/// Builds [`KubeDynamicClient`]s from a shared kube client
#[derive(Clone)]
pub struct KubeDynamicFactory {
    client: Client,
}

impl KubeDynamicFactory {
    /// Factory using `client` for every request
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl DynamicFactory for KubeDynamicFactory {
    fn client_for(
        &self,
        gvr: &GroupVersionResource,
        kind: &str,
        namespace: &str,
    ) -> Result<Arc<dyn DynamicClient>, RestoreError> {
        if gvr.version.is_empty() || gvr.resource.is_empty() {
            return Err(RestoreError::Client(format!(
                "incomplete resource {:?} for kind {}",
                gvr, kind
            )));
        }

        let ar = ApiResource {
            group: gvr.group.clone(),
            version: gvr.version.clone(),
            api_version: gvr.api_version(),
            kind: kind.to_string(),
            plural: gvr.resource.clone(),
        };
        let api = if namespace.is_empty() {
            Api::all_with(self.client.clone(), &ar)
        } else {
            Api::namespaced_with(self.client.clone(), namespace, &ar)
        };

        Ok(Arc::new(KubeDynamicClient {
            api,
            resource: gvr.group_resource().to_string(),
        }))
    }
}

/// [`DynamicClient`] over `Api<DynamicObject>`
pub struct KubeDynamicClient {
    api: Api<DynamicObject>,
    resource: String,
}

#[async_trait]
impl DynamicClient for KubeDynamicClient {
    async fn create(&self, item: &Unstructured) -> Result<Unstructured, RestoreError> {
        let obj: DynamicObject = serde_json::from_value(item.to_value())?;
        match self.api.create(&PostParams::default(), &obj).await {
            Ok(created) => to_unstructured(&created),
            Err(kube::Error::Api(ae)) if ae.code == 409 => Err(RestoreError::AlreadyExists {
                resource: self.resource.clone(),
                name: item.name().to_string(),
            }),
            Err(e) => Err(RestoreError::Kube(e)),
        }
    }

    async fn get(&self, name: &str) -> Result<Unstructured, RestoreError> {
        let obj = self.api.get(name).await?;
        to_unstructured(&obj)
    }

    async fn patch(&self, name: &str, merge_patch: &Value) -> Result<Unstructured, RestoreError> {
        let obj = self
            .api
            .patch(name, &PatchParams::default(), &Patch::Merge(merge_patch))
            .await?;
        to_unstructured(&obj)
    }

    async fn watch(&self) -> Result<BoxStream<'static, WatchEvent>, RestoreError> {
        let resource = self.resource.clone();
        let stream = watcher::watcher(self.api.clone(), watcher::Config::default())
            .default_backoff()
            .filter_map(move |event| {
                let resource = resource.clone();
                async move {
                    match event {
                        Ok(watcher::Event::InitApply(obj)) => {
                            to_unstructured(&obj).ok().map(WatchEvent::Added)
                        }
                        Ok(watcher::Event::Apply(obj)) => {
                            to_unstructured(&obj).ok().map(WatchEvent::Modified)
                        }
                        Ok(watcher::Event::Delete(obj)) => {
                            to_unstructured(&obj).ok().map(WatchEvent::Deleted)
                        }
                        Ok(watcher::Event::Init) | Ok(watcher::Event::InitDone) => None,
                        Err(e) => {
                            debug!(resource = %resource, error = %e, "Watch error, retrying");
                            None
                        }
                    }
                }
            });
        Ok(stream.boxed())
    }
}

fn to_unstructured(obj: &DynamicObject) -> Result<Unstructured, RestoreError> {
    let value = serde_json::to_value(obj)?;
    Ok(Unstructured::from_value(value)?)
}

/// [`NamespaceClient`] using get-then-create
#[derive(Clone)]
pub struct KubeNamespaceClient {
    client: Client,
}

impl KubeNamespaceClient {
    /// Namespace client over `client`
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NamespaceClient for KubeNamespaceClient {
    async fn ensure_namespace_exists(&self, namespace: &Namespace) -> Result<bool, RestoreError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let name = namespace
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| RestoreError::Validation("namespace has no name".to_string()))?;

        if api.get_opt(name).await?.is_some() {
            return Ok(false);
        }

        match api.create(&PostParams::default(), namespace).await {
            Ok(_) => {
                info!(namespace = %name, "Created namespace");
                Ok(true)
            }
            Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(false),
            Err(e) => Err(RestoreError::Kube(e)),
        }
    }
}

/// Discovery snapshot taken from a live API server
pub struct KubeDiscovery;

impl KubeDiscovery {
    /// Enumerate the preferred version of every served resource type
    pub async fn run(client: Client) -> Result<StaticDiscovery, RestoreError> {
        let discovery = Discovery::new(client)
            .run()
            .await
            .map_err(|e| RestoreError::Discovery(format!("API discovery failed: {}", e)))?;

        let mut by_group_version: BTreeMap<String, Vec<ApiResourceInfo>> = BTreeMap::new();
        for group in discovery.groups() {
            for (ar, caps) in group.recommended_resources() {
                by_group_version
                    .entry(ar.api_version.clone())
                    .or_default()
                    .push(ApiResourceInfo::new(
                        &ar.plural,
                        &ar.kind,
                        caps.scope == Scope::Namespaced,
                    ));
            }
        }

        // Core group first, then named groups by apiVersion
        let mut groups: Vec<ApiGroupResources> = by_group_version
            .into_iter()
            .map(|(group_version, resources)| ApiGroupResources {
                group_version,
                resources,
            })
            .collect();
        groups.sort_by_key(|g| !g.group().is_empty());
        debug!(groups = groups.len(), "Discovered API groups");
        Ok(StaticDiscovery::new(groups))
    }
}
