use nginx_bootstrap::{
    ContainerRuntime, DockerRuntime, Outcome, Reconciler, ReconcilerConfig,
};
use rstest::*;
use tokio_util::sync::CancellationToken;

/// Test fixture that provides a config with a unique container name
#[fixture]
fn config() -> ReconcilerConfig {
    ReconcilerConfig {
        container_name: format!("test-nginx-{}", uuid::Uuid::new_v4().simple()),
        ..Default::default()
    }
}

/// Cleanup helper that removes the test container if it exists
async fn cleanup_container(runtime: &DockerRuntime, container_id: &str) {
    if let Err(e) = runtime.remove_container(container_id).await {
        eprintln!("Warning: Failed to cleanup container {}: {}", container_id, e);
    }
}

#[rstest]
#[tokio::test]
#[ignore = "requires Docker and the nginx image"]
async fn test_reconcile_against_docker(config: ReconcilerConfig) {
    let runtime = DockerRuntime::connect()
        .await
        .expect("Failed to connect to Docker");
    let reconciler = Reconciler::new(runtime.clone(), config);
    let cancel = CancellationToken::new();

    let first = reconciler.reconcile(&cancel).await;
    let container_id = match &first {
        Ok(Outcome::Created { container_id }) => container_id.clone(),
        other => panic!("Expected a newly created container, got {:?}", other),
    };

    let second = reconciler.reconcile(&cancel).await;
    cleanup_container(&runtime, &container_id).await;

    match second {
        Ok(Outcome::AlreadyRunning {
            container_id: found,
            host_port,
        }) => {
            assert_eq!(found, container_id);
            let port: u16 = host_port
                .expect("Published port should be reported")
                .parse()
                .expect("Host port should be numeric");
            assert!(port > 0);
        }
        other => panic!("Expected the existing container, got {:?}", other),
    }
}
