//! In-memory collaborators for stage and executor tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use cf_core::{AssetDescriptor, AssetType, Error, Locator, ResolvedResource, Result, SourceKind};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};

use crate::invoke::{AssetAcquirer, StageInvoker};
use crate::record::AccumulatedRecord;
use crate::stage::StageName;

type Handler = Box<dyn Fn(&Value) -> Result<Map<String, Value>> + Send + Sync>;

/// Scripted stage invoker that records every call.
#[derive(Default)]
pub(crate) struct FakeInvoker {
    handlers: HashMap<StageName, Handler>,
    calls: Mutex<Vec<(StageName, Value)>>,
}

impl FakeInvoker {
    /// Every stage succeeds; transcode reports extracted audio.
    pub fn happy() -> Self {
        Self::default()
            .respond(
                StageName::TranscodeVideo,
                json!({"audio_status": "extracted", "output_path": "transcoded/clip1.mp4"}),
            )
            .respond(StageName::Transcribe, json!({"transcript": "hello there"}))
            .respond(
                StageName::SampleFrames,
                json!({"frame_paths": ["frames/clip1_0.jpg", "frames/clip1_1.jpg"]}),
            )
            .respond(StageName::Enrich, json!({"summary": "a harbour at dawn"}))
            .respond(StageName::Store, json!({"document_path": "media/clip1"}))
    }

    pub fn respond(self, stage: StageName, body: Value) -> Self {
        let body = body.as_object().cloned().unwrap_or_default();
        self.handle(stage, move |_| Ok(body.clone()))
    }

    pub fn fail(self, stage: StageName, status: u16) -> Self {
        self.handle(stage, move |_| {
            Err(Error::stage(stage, Some(status), "scripted failure"))
        })
    }

    pub fn handle(
        mut self,
        stage: StageName,
        handler: impl Fn(&Value) -> Result<Map<String, Value>> + Send + Sync + 'static,
    ) -> Self {
        self.handlers.insert(stage, Box::new(handler));
        self
    }

    /// Stages called so far, in call order.
    pub fn called(&self) -> Vec<StageName> {
        self.calls.lock().iter().map(|(stage, _)| *stage).collect()
    }

    /// Payloads sent to `stage`, in call order.
    pub fn payloads(&self, stage: StageName) -> Vec<Value> {
        self.calls
            .lock()
            .iter()
            .filter(|(s, _)| *s == stage)
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

#[async_trait]
impl StageInvoker for FakeInvoker {
    async fn invoke(&self, stage: StageName, payload: &Value) -> Result<Map<String, Value>> {
        self.calls.lock().push((stage, payload.clone()));
        match self.handlers.get(&stage) {
            Some(handler) => handler(payload),
            None => Ok(Map::new()),
        }
    }
}

/// Acquirer returning a fixed outcome and counting calls.
pub(crate) struct FakeAcquirer {
    outcome: Box<dyn Fn(&str) -> Result<ResolvedResource> + Send + Sync>,
    pub calls: AtomicUsize,
}

impl FakeAcquirer {
    pub fn resolving(resource: ResolvedResource) -> Self {
        Self {
            outcome: Box::new(move |_| Ok(resource.clone())),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn exhausted() -> Self {
        Self {
            outcome: Box::new(|id| {
                Err(Error::NoUsableResource(format!("{id}: no preview in mp4")))
            }),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetAcquirer for FakeAcquirer {
    async fn resolve(&self, catalog_id: &str) -> Result<ResolvedResource> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.outcome)(catalog_id)
    }
}

pub(crate) fn descriptor(locator: Locator) -> AssetDescriptor {
    let source = match &locator {
        Locator::Catalog { .. } => SourceKind::Catalog,
        Locator::ObjectStore { .. } => SourceKind::ObjectStore,
        Locator::Inline { .. } => SourceKind::InlinePayload,
        Locator::Url { .. } => SourceKind::ExternalUrl,
    };
    AssetDescriptor {
        asset_id: "clip1".into(),
        source,
        asset_type: AssetType::Video,
        locator,
        provenance: Map::new(),
    }
}

pub(crate) fn object_store_record() -> AccumulatedRecord {
    AccumulatedRecord::new(descriptor(Locator::ObjectStore {
        bucket: None,
        path: "raw/clip1.mp4".into(),
    }))
}
