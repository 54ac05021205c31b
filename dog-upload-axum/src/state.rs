use std::sync::Arc;

use dog_upload::UploadOrchestrator;

#[derive(Clone)]
pub struct UploadAxumState {
    pub uploads: Arc<UploadOrchestrator>,
}

impl UploadAxumState {
    pub fn new(uploads: UploadOrchestrator) -> Self {
        Self {
            uploads: Arc::new(uploads),
        }
    }

    pub fn from_arc(uploads: Arc<UploadOrchestrator>) -> Self {
        Self { uploads }
    }
}
