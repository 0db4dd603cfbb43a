//! Guku control-plane API
//!
//! [`GukuApi`] is the surface the resources and data sources talk to.
//! [`Client`] implements it over GraphQL; tests use [`memory::InMemoryApi`].

pub mod bindings;
pub mod client;
pub mod clusters;
pub mod error;
pub mod memory;
pub mod platforms;

pub use client::{Client, ClientConfig, RetryConfig};
pub use error::ApiError;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    #[serde(rename = "clusterID")]
    pub id: String,
    pub name: String,
    pub api_version: String,
    #[serde(default)]
    pub ca: Option<String>,
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
}

/// Input for creating a cluster
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCluster {
    pub name: String,
    pub server: Option<String>,
    pub ca: Option<String>,
    pub token: String,
    pub api_version: String,
    pub context: Option<String>,
}

/// Input for updating a cluster; None leaves a field unset
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterUpdate {
    pub name: Option<String>,
    pub server: Option<String>,
    pub ca: Option<String>,
    pub token: Option<String>,
    pub api_version: Option<String>,
    pub context: Option<String>,
}

/// Server-driven reconciliation status of a platform binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlatformBindingStatus {
    Pending,
    Succeeded,
    Failed,
    Error,
}

impl PlatformBindingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformBindingStatus::Pending => "Pending",
            PlatformBindingStatus::Succeeded => "Succeeded",
            PlatformBindingStatus::Failed => "Failed",
            PlatformBindingStatus::Error => "Error",
        }
    }

    pub fn is_pending(&self) -> bool {
        *self == PlatformBindingStatus::Pending
    }
}

impl fmt::Display for PlatformBindingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformBinding {
    #[serde(rename = "platformBindingID")]
    pub id: String,
    #[serde(rename = "clusterID")]
    pub cluster_id: String,
    #[serde(rename = "platformID")]
    pub platform_id: String,
    pub platform_version: String,
    #[serde(rename = "platformConfigID")]
    pub platform_config_id: String,
    pub status: PlatformBindingStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPlatformBinding {
    #[serde(rename = "clusterID")]
    pub cluster_id: String,
    #[serde(rename = "platformID")]
    pub platform_id: String,
    pub platform_version: String,
    #[serde(rename = "platformConfigID")]
    pub platform_config_id: String,
}

/// The remote only accepts a new config or version for an existing binding
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformBindingUpdate {
    #[serde(rename = "platformConfigID")]
    pub platform_config_id: Option<String>,
    pub platform_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Platform {
    #[serde(rename = "platformID")]
    pub platform_id: String,
    pub platform_version: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cataloged_date: Option<String>,
    #[serde(rename = "maxAPIVersion")]
    pub max_api_version: String,
    #[serde(rename = "minAPIVersion")]
    pub min_api_version: String,
    #[serde(default)]
    pub services: Vec<PlatformService>,
    #[serde(default)]
    pub configs: Vec<PlatformConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformService {
    #[serde(rename = "platformServiceID")]
    pub id: String,
    pub name: String,
    pub namespace: String,
    #[serde(rename = "serviceID")]
    pub service_id: String,
    pub service_version: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, rename = "delete_dependencies")]
    pub delete_dependencies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(rename = "platformConfigID")]
    pub id: String,
    pub name: String,
    /// JSON-encoded object of string values
    pub config: String,
}

#[async_trait]
pub trait GukuApi: Send + Sync {
    async fn create_cluster(&self, cluster: &NewCluster) -> Result<Cluster, ApiError>;

    async fn get_cluster(&self, cluster_id: &str) -> Result<Cluster, ApiError>;

    async fn update_cluster(&self, cluster_id: &str, update: &ClusterUpdate)
        -> Result<(), ApiError>;

    async fn delete_cluster(&self, cluster_id: &str) -> Result<(), ApiError>;

    async fn create_platform_binding(
        &self,
        binding: &NewPlatformBinding,
    ) -> Result<PlatformBinding, ApiError>;

    async fn get_platform_binding(
        &self,
        cluster_id: &str,
        binding_id: &str,
    ) -> Result<PlatformBinding, ApiError>;

    async fn update_platform_binding(
        &self,
        cluster_id: &str,
        binding_id: &str,
        update: &PlatformBindingUpdate,
    ) -> Result<PlatformBinding, ApiError>;

    async fn delete_platform_binding(
        &self,
        cluster_id: &str,
        binding_id: &str,
    ) -> Result<(), ApiError>;

    /// Ok(None) when the catalog has no such platform
    async fn get_platform(
        &self,
        platform_id: &str,
        platform_version: &str,
    ) -> Result<Option<Platform>, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_status_parses_from_wire() {
        let binding: PlatformBinding = serde_json::from_str(
            r#"{
                "platformBindingID": "PB-1",
                "clusterID": "C-1",
                "platformID": "P-1",
                "platformVersion": "1.0.0",
                "platformConfigID": "PC-1",
                "status": "Pending"
            }"#,
        )
        .unwrap();
        assert_eq!(binding.status, PlatformBindingStatus::Pending);
        assert_eq!(binding.status.to_string(), "Pending");
    }

    #[test]
    fn cluster_optional_fields_default_to_none() {
        let cluster: Cluster = serde_json::from_str(
            r#"{"clusterID": "C-1", "name": "k1", "apiVersion": "v1"}"#,
        )
        .unwrap();
        assert_eq!(cluster.ca, None);
        assert_eq!(cluster.server, None);
        assert_eq!(cluster.context, None);
    }
}
