//! In-memory cloud for tests
//!
//! Records every call, applies mutations to its pod table, and can replay a
//! scripted status sequence per pod. The last scripted status sticks.

use async_trait::async_trait;
use podctl_core::{
    CloudClient, CloudError, DeploymentRequest, GpuOffering, PodStatus, RawGpu, RawInstance,
    Result as CloudResult,
};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// A call observed by the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List,
    Get(String),
    Create { name: String, gpu: String },
    Start(String),
    Stop(String),
    Delete(String),
    Catalogue,
}

impl Call {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Call::Create { .. } | Call::Start(_) | Call::Stop(_) | Call::Delete(_)
        )
    }
}

/// Scripted failure for a create (per GPU type) or start (per pod)
#[derive(Debug, Clone)]
pub enum CreateFailure {
    Api(u16, String),
    Transport(String),
}

impl CreateFailure {
    fn to_error(&self) -> CloudError {
        match self {
            CreateFailure::Api(status, message) => CloudError::api(*status, message.clone()),
            CreateFailure::Transport(message) => CloudError::transport(message.clone()),
        }
    }
}

#[derive(Default)]
struct FakeState {
    instances: Vec<RawInstance>,
    scripts: HashMap<String, VecDeque<PodStatus>>,
    gpus: Vec<RawGpu>,
    create_failures: HashMap<String, CreateFailure>,
    start_failures: HashMap<String, CreateFailure>,
    list_failure: Option<String>,
    calls: Vec<Call>,
    next_id: u32,
}

#[derive(Default)]
pub struct FakeCloud {
    state: Mutex<FakeState>,
}

fn raw_status(status: PodStatus) -> Option<String> {
    let raw = match status {
        PodStatus::Running => "RUNNING",
        PodStatus::Stopped => "EXITED",
        PodStatus::NotFound => "TERMINATED",
        PodStatus::Error => "FAILED",
        PodStatus::Unknown => "CREATED",
    };
    Some(raw.to_string())
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pod(self, id: &str, name: &str, status: PodStatus) -> Self {
        self.state.lock().unwrap().instances.push(RawInstance {
            id: id.to_string(),
            name: name.to_string(),
            desired_status: raw_status(status),
            ..Default::default()
        });
        self
    }

    /// Statuses returned by successive `get_instance` calls for `id`
    pub fn with_script(self, id: &str, statuses: &[PodStatus]) -> Self {
        self.state
            .lock()
            .unwrap()
            .scripts
            .insert(id.to_string(), statuses.iter().copied().collect());
        self
    }

    /// Catalogue entry with spot prices in hundredths of a dollar
    pub fn with_gpu(self, id: &str, community_cents: Option<i64>, secure_cents: Option<i64>) -> Self {
        self.state.lock().unwrap().gpus.push(RawGpu {
            id: id.to_string(),
            display_name: Some(id.to_string()),
            memory_in_gb: Some(24),
            community_spot_price: community_cents.map(|c| Decimal::new(c, 2)),
            secure_spot_price: secure_cents.map(|c| Decimal::new(c, 2)),
        });
        self
    }

    pub fn with_create_failure(self, gpu: &str, failure: CreateFailure) -> Self {
        self.state
            .lock()
            .unwrap()
            .create_failures
            .insert(gpu.to_string(), failure);
        self
    }

    /// Reject `start_instance` for `id`; the pod keeps its status
    pub fn with_start_failure(self, id: &str, failure: CreateFailure) -> Self {
        self.state
            .lock()
            .unwrap()
            .start_failures
            .insert(id.to_string(), failure);
        self
    }

    pub fn with_list_failure(self, message: &str) -> Self {
        self.state.lock().unwrap().list_failure = Some(message.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    pub fn instance_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .instances
            .iter()
            .map(|i| i.id.clone())
            .collect()
    }

    fn set_status(state: &mut FakeState, id: &str, status: PodStatus) -> CloudResult<()> {
        let instance = state
            .instances
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| CloudError::NotFound(id.to_string()))?;
        instance.desired_status = raw_status(status);
        Ok(())
    }
}

#[async_trait]
impl CloudClient for FakeCloud {
    async fn list_instances(&self) -> CloudResult<Vec<RawInstance>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::List);
        if let Some(message) = &state.list_failure {
            return Err(CloudError::transport(message.clone()));
        }
        Ok(state.instances.clone())
    }

    async fn get_instance(&self, id: &str) -> CloudResult<RawInstance> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Get(id.to_string()));

        let scripted = state.scripts.get_mut(id).and_then(|queue| {
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().copied()
            }
        });

        if let Some(status) = scripted {
            if status == PodStatus::NotFound {
                return Err(CloudError::NotFound(id.to_string()));
            }
            return Ok(RawInstance {
                id: id.to_string(),
                desired_status: raw_status(status),
                ..Default::default()
            });
        }

        state
            .instances
            .iter()
            .find(|i| i.id == id)
            .cloned()
            .ok_or_else(|| CloudError::NotFound(id.to_string()))
    }

    async fn create_instance(
        &self,
        request: &DeploymentRequest,
        gpu: &GpuOffering,
    ) -> CloudResult<String> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Create {
            name: request.name.clone(),
            gpu: gpu.id.clone(),
        });

        if let Some(failure) = state.create_failures.get(&gpu.id) {
            return Err(failure.to_error());
        }

        state.next_id += 1;
        let id = format!("pod{}", state.next_id);
        state.instances.push(RawInstance {
            id: id.clone(),
            name: request.name.clone(),
            desired_status: raw_status(PodStatus::Unknown),
            image_name: Some(request.image_name.clone()),
            ..Default::default()
        });
        Ok(id)
    }

    async fn start_instance(&self, id: &str) -> CloudResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Start(id.to_string()));
        if let Some(failure) = state.start_failures.get(id) {
            return Err(failure.to_error());
        }
        Self::set_status(&mut state, id, PodStatus::Running)
    }

    async fn stop_instance(&self, id: &str) -> CloudResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Stop(id.to_string()));
        Self::set_status(&mut state, id, PodStatus::Stopped)
    }

    async fn delete_instance(&self, id: &str) -> CloudResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Delete(id.to_string()));
        let before = state.instances.len();
        state.instances.retain(|i| i.id != id);
        if state.instances.len() == before {
            return Err(CloudError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list_gpu_offerings(&self) -> CloudResult<Vec<RawGpu>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Catalogue);
        Ok(state.gpus.clone())
    }
}
