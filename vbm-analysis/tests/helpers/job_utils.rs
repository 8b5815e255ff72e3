//! Job store and controller fixtures

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

use vbm_analysis::config::AnalysisSettings;
use vbm_analysis::db::{init_database_pool, JobStore};
use vbm_analysis::models::JobStatus;
use vbm_analysis::workflow::{JobController, JobRunner};

/// Fresh database inside `dir`
pub async fn create_test_store(dir: &TempDir) -> JobStore {
    let pool = init_database_pool(&dir.path().join("vbm.db"))
        .await
        .expect("test database");
    JobStore::new(pool)
}

/// Controller rooted at `dir`; must run on a multi-thread runtime
pub async fn create_test_controller(dir: &TempDir, runner: Arc<dyn JobRunner>) -> Arc<JobController> {
    let store = create_test_store(dir).await;
    let controller = JobController::new(store, runner, AnalysisSettings::default(), dir.path())
        .expect("test controller");
    Arc::new(controller)
}

/// Poll until the job reaches `status`; panics after five seconds
pub async fn wait_for_status(controller: &JobController, id: Uuid, status: JobStatus) {
    for _ in 0..500 {
        if controller.get_job(id).await.expect("job exists").status == status {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let current = controller.get_job(id).await.expect("job exists").status;
    panic!("job {} stuck in {} waiting for {}", id, current, status);
}
