use serde_json::json;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tracing::{error, info};

use crate::assembly::{AssembledVideo, AssemblyPipeline, Selection};
use crate::error::AssemblyError;
use crate::jobs::{JobManager, JobStatus, JobType};

const QUEUE_DEPTH: usize = 64;

type Reply = oneshot::Sender<Result<AssembledVideo, AssemblyError>>;

struct AssemblyTask {
    job_id: i64,
    selection: Selection,
    reply: Option<Reply>,
}

/// Handle used by request handlers to hand assemblies to the worker.
#[derive(Clone)]
pub struct AssemblyQueue {
    sender: mpsc::Sender<AssemblyTask>,
    job_manager: Arc<JobManager>,
}

impl AssemblyQueue {
    async fn enqueue(&self, selection: Selection, reply: Option<Reply>) -> Result<i64, AssemblyError> {
        let job_id = self
            .job_manager
            .create_job(JobType::AssembleVideo, Some(selection.payload()))?;

        let task = AssemblyTask {
            job_id,
            selection,
            reply,
        };
        if self.sender.send(task).await.is_err() {
            let _ = self.job_manager.finish_job(
                job_id,
                JobStatus::Failed,
                &json!({ "error": AssemblyError::WorkerUnavailable.to_string() }),
            );
            return Err(AssemblyError::WorkerUnavailable);
        }
        Ok(job_id)
    }

    /// Queue an assembly and return its job id without waiting.
    pub async fn submit(&self, selection: Selection) -> Result<i64, AssemblyError> {
        self.enqueue(selection, None).await
    }

    /// Queue an assembly and wait for it to finish.
    pub async fn submit_and_wait(&self, selection: Selection) -> Result<(i64, AssembledVideo), AssemblyError> {
        let (tx, rx) = oneshot::channel();
        let job_id = self.enqueue(selection, Some(tx)).await?;
        let assembled = rx.await.map_err(|_| AssemblyError::WorkerUnavailable)??;
        Ok((job_id, assembled))
    }
}

pub struct JobProcessor {
    pipeline: Arc<AssemblyPipeline>,
    job_manager: Arc<JobManager>,
    receiver: mpsc::Receiver<AssemblyTask>,
    permits: Arc<Semaphore>,
}

impl JobProcessor {
    pub fn new(
        pipeline: Arc<AssemblyPipeline>,
        job_manager: Arc<JobManager>,
        max_concurrent_jobs: usize,
    ) -> (Self, AssemblyQueue) {
        let (sender, receiver) = mpsc::channel(QUEUE_DEPTH);
        let queue = AssemblyQueue {
            sender,
            job_manager: job_manager.clone(),
        };
        let processor = JobProcessor {
            pipeline,
            job_manager,
            receiver,
            permits: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
        };
        (processor, queue)
    }

    /// Process a single assembly job and record its outcome.
    async fn process_job(
        pipeline: &AssemblyPipeline,
        job_manager: &JobManager,
        task: AssemblyTask,
    ) {
        let AssemblyTask {
            job_id,
            selection,
            reply,
        } = task;

        if let Err(e) = job_manager.update_job_status(job_id, JobStatus::Running, Some(0.0)) {
            error!("Failed to mark job {} running: {:?}", job_id, e);
        }

        let outcome = pipeline.assemble(&selection).await;
        let recorded = match &outcome {
            Ok(assembled) => {
                info!(job_id, url = %assembled.video_url, "Assembly completed");
                job_manager.finish_job(job_id, JobStatus::Completed, &assembled.to_json())
            }
            Err(e) => {
                error!(job_id, "Assembly failed: {}", e);
                job_manager.finish_job(job_id, JobStatus::Failed, &json!({ "error": e.to_string() }))
            }
        };
        if let Err(e) = recorded {
            error!("Failed to record outcome of job {}: {:?}", job_id, e);
        }

        if let Some(reply) = reply {
            // The waiting request may have gone away.
            let _ = reply.send(outcome);
        }
    }

    /// Main processing loop. Ends when every queue handle has been dropped.
    pub async fn run(mut self) {
        while let Some(task) = self.receiver.recv().await {
            let permit = match self.permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let pipeline = self.pipeline.clone();
            let job_manager = self.job_manager.clone();
            tokio::spawn(async move {
                Self::process_job(&pipeline, &job_manager, task).await;
                drop(permit);
            });
        }
        info!("Assembly queue closed, job processor stopping");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, NewMedia};
    use crate::error::StorageError;
    use crate::media::Muxer;
    use crate::storage::ObjectStore;
    use async_trait::async_trait;
    use bytes::Bytes;
    use engine::media::MediaKind;
    use std::path::Path;

    struct LocalStore;

    #[async_trait]
    impl ObjectStore for LocalStore {
        fn bucket(&self) -> &str {
            "jobs-bucket"
        }

        fn public_url(&self, object_name: &str) -> String {
            format!("https://cdn.test/jobs-bucket/{}", object_name)
        }

        async fn check_bucket(&self) -> Result<(), StorageError> {
            Ok(())
        }

        async fn upload_file(&self, _local_path: &Path, _object_name: &str) -> Result<(), StorageError> {
            Ok(())
        }

        async fn upload_bytes(&self, _data: Bytes, _object_name: &str) -> Result<(), StorageError> {
            Ok(())
        }

        async fn download_to(&self, object_name: &str, dest: &Path) -> Result<u64, StorageError> {
            tokio::fs::write(dest, object_name).await?;
            Ok(object_name.len() as u64)
        }
    }

    struct CopyMuxer {
        fail: bool,
    }

    #[async_trait]
    impl Muxer for CopyMuxer {
        async fn mux(&self, video: &Path, _audio: Option<&Path>, output: &Path) -> Result<(), AssemblyError> {
            if self.fail {
                return Err(AssemblyError::Mux("exit status 1: broken input".to_string()));
            }
            tokio::fs::copy(video, output).await?;
            Ok(())
        }
    }

    fn setup(fail: bool) -> (Arc<Database>, Arc<JobManager>, AssemblyQueue, tempfile::TempDir) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.create_tagged_media(
            MediaKind::Video,
            &NewMedia {
                title: "Orbit".to_string(),
                file: "videos/orbit.mp4".to_string(),
                ..Default::default()
            },
            &["space"],
        )
        .unwrap();

        let scratch = tempfile::tempdir().unwrap();
        let pipeline = Arc::new(AssemblyPipeline::new(
            Arc::new(LocalStore),
            Arc::new(CopyMuxer { fail }),
            scratch.path().to_path_buf(),
        ));
        let job_manager = Arc::new(JobManager::new(db.clone()));
        let (processor, queue) = JobProcessor::new(pipeline, job_manager.clone(), 2);
        tokio::spawn(processor.run());
        (db, job_manager, queue, scratch)
    }

    fn space_selection(db: &Database) -> Selection {
        crate::assembly::select(db, &["space".to_string()]).unwrap().unwrap()
    }

    #[tokio::test]
    async fn waited_job_completes_with_result() {
        let (db, jobs, queue, _scratch) = setup(false);
        let (job_id, assembled) = queue.submit_and_wait(space_selection(&db)).await.unwrap();
        assert!(assembled.video_url.starts_with("https://cdn.test/jobs-bucket/generated/"));

        let job = jobs.get_job(job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result.unwrap()["video_url"], assembled.video_url.as_str());
    }

    #[tokio::test]
    async fn failed_job_records_error() {
        let (db, jobs, queue, _scratch) = setup(true);
        let err = queue.submit_and_wait(space_selection(&db)).await.unwrap_err();
        assert!(matches!(err, AssemblyError::Mux(_)));

        let job = jobs.get_job(1).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.result.unwrap()["error"]
            .as_str()
            .unwrap()
            .contains("broken input"));
    }

    #[tokio::test]
    async fn detached_job_can_be_polled() {
        let (db, jobs, queue, _scratch) = setup(false);
        let job_id = queue.submit(space_selection(&db)).await.unwrap();

        let mut status = JobStatus::Pending;
        for _ in 0..100 {
            status = jobs.get_job(job_id).unwrap().unwrap().status;
            if status == JobStatus::Completed {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(status, JobStatus::Completed);
    }
}
