//! IngressRoute listing against the Kubernetes API

use async_trait::async_trait;
use courier_api::IngressRoute;
use courier_core::{CoreError, ResourceSource};
use k8s_openapi::NamespaceResourceScope;
use kube::{api::ListParams, Api, Client, Resource};
use tracing::debug;

/// Build an API handle for `namespace`, or for the whole cluster when it is empty
pub fn scoped_api<K>(client: Client, namespace: &str) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    <K as Resource>::DynamicType: Default,
{
    if namespace.is_empty() {
        Api::all(client)
    } else {
        Api::namespaced(client, namespace)
    }
}

/// KubeSource reads the desired state straight from the API server
#[derive(Clone)]
pub struct KubeSource {
    client: Client,
}

impl KubeSource {
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceSource for KubeSource {
    async fn routing_resources(&self, namespace: &str) -> courier_core::Result<Vec<IngressRoute>> {
        let routes: Api<IngressRoute> = scoped_api(self.client.clone(), namespace);
        let list = routes
            .list(&ListParams::default())
            .await
            .map_err(CoreError::fetch)?;

        debug!(namespace, count = list.items.len(), "Listed IngressRoutes");
        Ok(list.items)
    }
}
