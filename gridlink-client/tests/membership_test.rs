//! Membership view tracking and smart routing against a mock cluster.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{config, silent_responder, wait_until, MockCluster, PARTITION_COUNT};
use gridlink_client::{GridClient, Invocation, MemberEventType};
use gridlink_core::protocol::{ClusterView, MemberInfo};
use uuid::Uuid;

const OPERATION: i32 = 0x010100;

#[tokio::test]
async fn test_client_learns_members_and_partition_table() {
    common::init_tracing();
    let cluster = MockCluster::start(3).await;
    let client = GridClient::start(config(&cluster)).await.unwrap();

    assert!(wait_until(Duration::from_secs(5), || client.members().len() == 3).await);
    assert!(wait_until(Duration::from_secs(5), || client.connection_count() == 3).await);

    assert_eq!(client.partition_count(), PARTITION_COUNT);
    let view = client.membership_view();
    assert_eq!(view.version(), cluster.version());
    assert_eq!(view.partition_table().len(), PARTITION_COUNT as usize);

    let expected = cluster.view();
    for partition_id in [0, 1, 2, 100, PARTITION_COUNT - 1] {
        let owner = client.partition_owner(partition_id).unwrap();
        assert_eq!(
            Some(owner.uuid()),
            expected.partition_owners[partition_id as usize]
        );
    }

    for member in cluster.members() {
        assert_eq!(client.get_member(&member.uuid()).unwrap().address(), member.address());
    }

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_joining_member_is_announced_and_connected() {
    let cluster = MockCluster::start(2).await;
    let client = GridClient::start(config(&cluster)).await.unwrap();
    assert!(wait_until(Duration::from_secs(5), || client.connection_count() == 2).await);
    let mut member_events = client.subscribe_members();

    let joined = cluster.add_member().await;

    let event = tokio::time::timeout(Duration::from_secs(5), member_events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.event_type, MemberEventType::Added);
    assert_eq!(event.member.uuid(), joined.uuid());

    assert!(wait_until(Duration::from_secs(5), || client.connection_count() == 3).await);
    assert_eq!(joined.accepted(), 1);
    assert_eq!(client.membership_view().version(), cluster.version());

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stale_view_is_ignored() {
    let cluster = MockCluster::start(2).await;
    let client = GridClient::start(config(&cluster)).await.unwrap();
    assert!(wait_until(Duration::from_secs(5), || client.members().len() == 2).await);
    let version = client.membership_view().version();

    let ghost = MemberInfo::new(Uuid::new_v4(), "127.0.0.1:1".parse().unwrap());
    let stale = ClusterView {
        version: version - 1,
        members: vec![ghost.clone()],
        partition_owners: vec![Some(ghost.uuid); PARTITION_COUNT as usize],
    };
    cluster.push_view(&stale);

    let same = ClusterView {
        version,
        ..stale
    };
    cluster.push_view(&same);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(client.membership_view().version(), version);
    assert_eq!(client.members().len(), 2);
    assert!(client.get_member(&ghost.uuid).is_none());

    // A newer view still applies.
    cluster.publish_view();
    assert!(
        wait_until(Duration::from_secs(5), || client.membership_view().version() == version + 1)
            .await
    );

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_member_removal_fails_its_pending_invocations() {
    let cluster = MockCluster::start(2).await;
    let leaving = cluster.member(1);
    leaving.set_responder(silent_responder());

    let client = Arc::new(GridClient::start(config(&cluster)).await.unwrap());
    assert!(wait_until(Duration::from_secs(5), || client.connection_count() == 2).await);
    let mut member_events = client.subscribe_members();

    let pending: Vec<_> = (0..3)
        .map(|i| {
            let client = Arc::clone(&client);
            let target = leaving.uuid();
            tokio::spawn(async move {
                client
                    .invoke(Invocation::new(OPERATION, vec![i]).on_member(target))
                    .await
            })
        })
        .collect();
    assert!(wait_until(Duration::from_secs(5), || leaving.requests() == 3).await);

    cluster.remove_member(leaving.uuid());

    for handle in pending {
        let err = handle.await.unwrap().unwrap_err();
        assert!(err.is_retryable(), "got {:?}", err);
    }

    let event = tokio::time::timeout(Duration::from_secs(5), member_events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.event_type, MemberEventType::Removed);
    assert_eq!(event.member.uuid(), leaving.uuid());

    assert!(wait_until(Duration::from_secs(5), || client.connection_count() == 1).await);
    assert!(client.get_member(&leaving.uuid()).is_none());

    // Requests for the remaining member are unaffected.
    let remaining = cluster.member(0).uuid();
    let response = client
        .invoke(Invocation::new(OPERATION, b"still here".to_vec()).on_member(remaining))
        .await
        .unwrap();
    assert_eq!(&response.payload()[..], b"still here");

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unisocket_client_uses_a_single_connection() {
    let cluster = MockCluster::start(3).await;
    let config = common::config_builder(&cluster)
        .network(|n| n.smart_routing(false))
        .build()
        .unwrap();
    let client = GridClient::start(config).await.unwrap();
    assert!(wait_until(Duration::from_secs(5), || client.members().len() == 3).await);

    for key in ["a", "b", "c", "d"] {
        client
            .invoke(Invocation::new(OPERATION, Vec::new()).for_key(key))
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(client.connection_count(), 1);

    client.shutdown().await.unwrap();
}
