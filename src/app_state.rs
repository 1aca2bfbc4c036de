use std::sync::Arc;
use std::time::Duration;

use crate::llm::resource::ModelResource;
use crate::llm::service::ParaphraseService;

pub struct AppState {
    pub service: ParaphraseService,
    pub model_name: String,
    pub request_timeout: Option<Duration>,
}

impl AppState {
    pub fn new(resource: Arc<ModelResource>, request_timeout: Option<Duration>) -> Self {
        Self {
            model_name: resource.model_name().to_string(),
            service: ParaphraseService::new(resource),
            request_timeout,
        }
    }

    pub fn resource(&self) -> &ModelResource {
        self.service.resource()
    }
}
