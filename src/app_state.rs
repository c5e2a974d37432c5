use std::sync::Arc;

use crate::db::JobStore;
use crate::models::job::JobType;
use crate::render::Renderer;
use crate::services::{
    delivery::FileTransfer, jobs::JobService, queue::MessageQueue, storage::ArtifactStore,
};
use crate::worker::{DeliveryJobHandler, Dispatcher, RenderJobHandler, WorkerSettings};

/// Shared handles used by the worker and the producer-side service.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub queue: Arc<dyn MessageQueue>,
    pub renderer: Arc<dyn Renderer>,
    pub transfer: Arc<dyn FileTransfer>,
}

impl AppState {
    pub fn new(
        store: impl JobStore + 'static,
        artifacts: impl ArtifactStore + 'static,
        queue: impl MessageQueue + 'static,
        renderer: impl Renderer + 'static,
        transfer: impl FileTransfer + 'static,
    ) -> Self {
        Self {
            store: Arc::new(store),
            artifacts: Arc::new(artifacts),
            queue: Arc::new(queue),
            renderer: Arc::new(renderer),
            transfer: Arc::new(transfer),
        }
    }

    pub fn job_service(&self, presign_expiry_secs: u32) -> JobService {
        JobService::new(
            Arc::clone(&self.store),
            Arc::clone(&self.queue),
            Arc::clone(&self.artifacts),
            presign_expiry_secs,
        )
    }

    /// Dispatcher with the render and delivery handlers registered.
    pub fn dispatcher(&self, settings: WorkerSettings) -> Dispatcher {
        let render = RenderJobHandler::new(
            Arc::clone(&self.store),
            Arc::clone(&self.artifacts),
            Arc::clone(&self.renderer),
            settings.item_pause,
        );
        let delivery = DeliveryJobHandler::new(
            Arc::clone(&self.store),
            Arc::clone(&self.artifacts),
            Arc::clone(&self.transfer),
        );

        Dispatcher::new(Arc::clone(&self.queue), settings)
            .register(JobType::PromoImage, Arc::new(render))
            .register(JobType::PromoImageDelivery, Arc::new(delivery))
    }
}
