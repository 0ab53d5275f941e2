use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use orchestrator_core::traits::SharedStore;
use orchestrator_core::OrchestratorError;
use orchestrator_coordination::ResourcePoolManager;
use orchestrator_infrastructure::MemoryStore;

fn manager() -> ResourcePoolManager {
    let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
    ResourcePoolManager::new(store)
}

#[tokio::test]
async fn create_and_duplicate_pool() {
    let manager = manager();
    let pool = manager.create_pool("gpu", 2).await.unwrap();
    assert_eq!(pool.capacity, 2);
    assert_eq!(pool.allocated, 0);

    let duplicate = manager.create_pool("gpu", 5).await;
    assert!(matches!(duplicate, Err(OrchestratorError::Validation(_))));
}

#[tokio::test]
async fn allocate_release_cycle() {
    let manager = manager();
    manager.create_pool("gpu", 2).await.unwrap();

    let lease = manager
        .allocate("gpu", "gpu-0", "worker-1", 60, HashMap::new())
        .await
        .unwrap();
    assert_eq!(lease.holder, "worker-1");
    assert!(!manager.is_available("gpu", "gpu-0").await.unwrap());
    assert_eq!(manager.pool_status("gpu").await.unwrap().allocated, 1);

    assert!(manager.release("gpu", "gpu-0").await.unwrap());
    assert!(manager.is_available("gpu", "gpu-0").await.unwrap());
    assert_eq!(manager.pool_status("gpu").await.unwrap().allocated, 0);

    // 重复释放不再回减计数
    assert!(!manager.release("gpu", "gpu-0").await.unwrap());
    assert_eq!(manager.pool_status("gpu").await.unwrap().allocated, 0);
}

#[tokio::test]
async fn held_resource_cannot_be_double_allocated() {
    let manager = manager();
    manager.create_pool("gpu", 4).await.unwrap();

    manager
        .allocate("gpu", "gpu-0", "worker-1", 60, HashMap::new())
        .await
        .unwrap();
    let second = manager
        .allocate("gpu", "gpu-0", "worker-2", 60, HashMap::new())
        .await;
    assert!(matches!(second, Err(OrchestratorError::Validation(_))));
}

#[tokio::test]
async fn full_pool_rejects_allocation() {
    let manager = manager();
    manager.create_pool("gpu", 1).await.unwrap();

    manager
        .allocate("gpu", "gpu-0", "worker-1", 60, HashMap::new())
        .await
        .unwrap();
    let overflow = manager
        .allocate("gpu", "gpu-1", "worker-2", 60, HashMap::new())
        .await;
    assert!(matches!(
        overflow,
        Err(OrchestratorError::ResourceExhausted(_))
    ));
}

#[tokio::test]
async fn unknown_pool_is_a_configuration_class_error() {
    let manager = manager();
    let result = manager
        .allocate("ghost", "r-0", "worker-1", 60, HashMap::new())
        .await;
    assert!(matches!(result, Err(OrchestratorError::PoolNotFound { .. })));
}

#[tokio::test]
async fn expired_lease_is_reclaimed_by_sweep() {
    let manager = manager();
    manager.create_pool("gpu", 2).await.unwrap();

    manager
        .allocate("gpu", "gpu-0", "worker-1", 1, HashMap::new())
        .await
        .unwrap();
    assert!(!manager.is_available("gpu", "gpu-0").await.unwrap());

    tokio::time::sleep(Duration::from_millis(1100)).await;
    let released = manager.cleanup_expired("gpu").await.unwrap();
    assert_eq!(released, 1);

    assert!(manager.is_available("gpu", "gpu-0").await.unwrap());
    assert_eq!(manager.pool_status("gpu").await.unwrap().allocated, 0);

    // 资源id可立即复用
    manager
        .allocate("gpu", "gpu-0", "worker-2", 60, HashMap::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn sweep_leaves_active_leases_alone() {
    let manager = manager();
    manager.create_pool("gpu", 2).await.unwrap();
    manager
        .allocate("gpu", "gpu-0", "worker-1", 3600, HashMap::new())
        .await
        .unwrap();

    assert_eq!(manager.cleanup_expired("gpu").await.unwrap(), 0);
    assert!(!manager.is_available("gpu", "gpu-0").await.unwrap());
    assert_eq!(manager.pool_status("gpu").await.unwrap().allocated, 1);
}

#[tokio::test]
async fn delete_pool_removes_allocations() {
    let manager = manager();
    manager.create_pool("gpu", 2).await.unwrap();
    manager
        .allocate("gpu", "gpu-0", "worker-1", 60, HashMap::new())
        .await
        .unwrap();

    assert!(manager.delete_pool("gpu").await.unwrap());
    assert!(matches!(
        manager.pool_status("gpu").await,
        Err(OrchestratorError::PoolNotFound { .. })
    ));
    // 池删除后资源id不再被占用
    assert!(manager.is_available("gpu", "gpu-0").await.unwrap());
}
