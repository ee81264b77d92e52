//! Integration tests for the REST network store client using wiremock
//!
//! These tests verify the client against mocked store endpoints: URL layout,
//! request bodies, response envelopes and status code handling.

use gridcache::preload::PreloadingStrategy;
use gridcache::resource::{
    Attributes, InjectionAttributes, LimitsSelection, Resource, ResourceType, TerminalAttributes,
    VariantKey,
};
use gridcache::store::{NetworkStoreClient, RestNetworkStoreClient, StoreError};
use gridcache::NetworkStoreSession;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn load_json(id: &str, node: i32) -> serde_json::Value {
    json!({
        "id": id,
        "variantNum": 0,
        "attributes": {
            "type": "LOAD",
            "value": {
                "terminal": {"voltageLevelId": "vl1", "node": node}
            }
        }
    })
}

fn client(server: &MockServer) -> RestNetworkStoreClient {
    RestNetworkStoreClient::new(&server.uri()).expect("mock server URI should be valid")
}

/// Test module for read endpoints
mod read_tests {
    use super::*;

    /// Test collection GET unwraps the data envelope
    #[tokio::test]
    async fn test_get_resources_parses_envelope() {
        let server = MockServer::start().await;
        let network_id = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path(format!("/v1/networks/{}/0/loads", network_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [load_json("l1", 1), load_json("l2", 2)]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let loads = client(&server)
            .get_resources(network_id, 0, ResourceType::Load)
            .await
            .expect("Request should succeed");

        assert_eq!(loads.len(), 2);
        assert_eq!(loads[0].id, "l1");
        assert_eq!(loads[1].resource_type(), ResourceType::Load);
    }

    /// Test 404 on a single resource is an absence, not an error
    #[tokio::test]
    async fn test_get_resource_404_is_none() {
        let server = MockServer::start().await;
        let network_id = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path(format!("/v1/networks/{}/0/loads/ghost", network_id)))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let load = client(&server)
            .get_resource(network_id, 0, ResourceType::Load, "ghost")
            .await
            .expect("404 should not fail");
        assert!(load.is_none());
    }

    /// Test server errors surface as typed store errors
    #[tokio::test]
    async fn test_500_is_typed_http_error() {
        let server = MockServer::start().await;
        let network_id = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path(format!("/v1/networks/{}/0/switches", network_id)))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client(&server)
            .get_resources(network_id, 0, ResourceType::Switch)
            .await
            .unwrap_err();
        let store_error = err.downcast_ref::<StoreError>().expect("typed error");
        assert_eq!(store_error.status(), Some(500));
    }

    /// Test container reads go through the voltage level path
    #[tokio::test]
    async fn test_container_resources_path() {
        let server = MockServer::start().await;
        let network_id = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path(format!(
                "/v1/networks/{}/3/voltage-levels/vl1/loads",
                network_id
            )))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": [load_json("l1", 1)]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let loads = client(&server)
            .get_container_resources(network_id, 3, ResourceType::Load, "vl1")
            .await
            .unwrap();
        assert_eq!(loads.len(), 1);
    }

    /// Test limits groups are requested at the selection level
    #[tokio::test]
    async fn test_selected_limits_groups() {
        let server = MockServer::start().await;
        let network_id = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path(format!(
                "/v1/networks/{}/0/branch/types/LINE/operationalLimitsGroup/selected",
                network_id
            )))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "line1": [{
                        "id": "DEFAULT",
                        "side": "ONE",
                        "currentLimits": {"permanentLimit": 1000.0}
                    }]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let groups = client(&server)
            .get_operational_limits_groups(
                network_id,
                0,
                ResourceType::Line,
                LimitsSelection::Selected,
            )
            .await
            .unwrap();
        assert_eq!(groups["line1"][0].key(), "DEFAULT@1");
    }
}

/// Test module for write endpoints
mod write_tests {
    use super::*;

    /// Test batched create posts every resource in one request
    #[tokio::test]
    async fn test_create_posts_batch() {
        let server = MockServer::start().await;
        let network_id = Uuid::new_v4();

        Mock::given(method("POST"))
            .and(path(format!("/v1/networks/{}/loads", network_id)))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let loads = ["l1", "l2"].map(|id| {
            Resource::new(
                id,
                0,
                Attributes::Load(InjectionAttributes::new(TerminalAttributes::at_node("vl1", 1))),
            )
        });
        client(&server)
            .create_resources(network_id, ResourceType::Load, loads.to_vec())
            .await
            .expect("create should succeed");

        let requests = server.received_requests().await.expect("recording enabled");
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body[0]["id"], "l1");
        assert_eq!(body[1]["id"], "l2");
        assert_eq!(body[0]["attributes"]["type"], "LOAD");
        assert_eq!(body[0]["attributes"]["value"]["terminal"]["node"], 1);
    }

    /// Test batched removal sends ids in the DELETE body
    #[tokio::test]
    async fn test_remove_sends_ids() {
        let server = MockServer::start().await;
        let network_id = Uuid::new_v4();

        Mock::given(method("DELETE"))
            .and(path(format!("/v1/networks/{}/1/switches", network_id)))
            .and(body_json(json!(["s1", "s2"])))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .remove_resources(
                network_id,
                1,
                ResourceType::Switch,
                vec!["s1".to_string(), "s2".to_string()],
            )
            .await
            .unwrap();
    }

    /// Test variant clone carries the target variant id
    #[tokio::test]
    async fn test_clone_variant() {
        let server = MockServer::start().await;
        let network_id = Uuid::new_v4();

        Mock::given(method("PUT"))
            .and(path(format!("/v1/networks/{}/0/to/2", network_id)))
            .and(query_param("targetVariantId", "what if"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .clone_network_variant(network_id, 0, 2, "what if")
            .await
            .unwrap();
    }

    /// Test a rejected write keeps the status code
    #[tokio::test]
    async fn test_conflict_on_create() {
        let server = MockServer::start().await;
        let network_id = Uuid::new_v4();

        Mock::given(method("POST"))
            .and(path(format!("/v1/networks/{}/loads", network_id)))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;

        let err = client(&server)
            .create_resources(network_id, ResourceType::Load, Vec::new())
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<StoreError>().and_then(StoreError::status),
            Some(409)
        );
    }
}

/// Test module for a session driving the REST client
mod session_tests {
    use super::*;

    /// Test preloaded reads are served without further requests
    #[tokio::test]
    async fn test_preloaded_session_reads_once() {
        let server = MockServer::start().await;
        let network_id = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path(format!("/v1/networks/{}/0/loads", network_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [load_json("l1", 1)]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let strategy = PreloadingStrategy::builder()
            .with(ResourceType::Load)
            .build();
        let session = NetworkStoreSession::new(Arc::new(client(&server)), strategy);
        let key = VariantKey::initial(network_id);

        let l1 = session
            .get_resource(key, ResourceType::Load, "l1")
            .await
            .unwrap();
        let missing = session
            .get_resource(key, ResourceType::Load, "l9")
            .await
            .unwrap();
        let all = session.get_resources(key, ResourceType::Load).await.unwrap();

        assert!(l1.is_some());
        assert!(missing.is_none());
        assert_eq!(all.len(), 1);
    }
}
