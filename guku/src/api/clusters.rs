//! Cluster operations

use serde::de::IgnoredAny;
use serde::Deserialize;
use serde_json::json;

use super::{ApiError, Client, Cluster, ClusterUpdate, NewCluster};

const CLUSTER_FIELDS: &str = "clusterID name apiVersion ca server context";

#[derive(Deserialize)]
struct CreateClusterData {
    #[serde(rename = "createCluster")]
    cluster: Cluster,
}

#[derive(Deserialize)]
struct GetClusterData {
    #[serde(rename = "getCluster")]
    cluster: Option<Cluster>,
}

impl Client {
    pub async fn create_cluster(&self, cluster: &NewCluster) -> Result<Cluster, ApiError> {
        let query = format!(
            "mutation CreateCluster($input: CreateClusterInput!) {{ createCluster(input: $input) {{ {} }} }}",
            CLUSTER_FIELDS
        );
        let data: CreateClusterData = self
            .execute("CreateCluster", &query, json!({ "input": cluster }))
            .await?;
        Ok(data.cluster)
    }

    pub async fn get_cluster(&self, cluster_id: &str) -> Result<Cluster, ApiError> {
        let query = format!(
            "query GetCluster($clusterID: ID!) {{ getCluster(clusterID: $clusterID) {{ {} }} }}",
            CLUSTER_FIELDS
        );
        let data: GetClusterData = self
            .execute("GetCluster", &query, json!({ "clusterID": cluster_id }))
            .await?;
        data.cluster
            .ok_or_else(|| ApiError::NotFound(format!("cluster {}", cluster_id)))
    }

    pub async fn update_cluster(
        &self,
        cluster_id: &str,
        update: &ClusterUpdate,
    ) -> Result<(), ApiError> {
        let query = "mutation UpdateCluster($clusterID: ID!, $input: UpdateClusterInput!) { updateCluster(clusterID: $clusterID, input: $input) { clusterID } }";
        let _: IgnoredAny = self
            .execute(
                "UpdateCluster",
                query,
                json!({ "clusterID": cluster_id, "input": update }),
            )
            .await?;
        Ok(())
    }

    pub async fn delete_cluster(&self, cluster_id: &str) -> Result<(), ApiError> {
        let query = "mutation DeleteCluster($clusterID: ID!) { deleteCluster(clusterID: $clusterID) { clusterID } }";
        let _: IgnoredAny = self
            .execute("DeleteCluster", query, json!({ "clusterID": cluster_id }))
            .await?;
        Ok(())
    }
}
