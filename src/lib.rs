//! Form-filling pipeline for multi-segment PDF submission packets.
//!
//! Takes a flat form record plus a list of requested segments, maps the
//! record onto each segment's PDF field names, renders a forms document
//! (FDF, falling back to XFDF) and hands it to an external fill engine,
//! then dispatches the generated artifacts as a zip archive or as mail
//! attachments. Each request works in an isolated scratch directory that
//! is removed no matter how the run ends.
//!
//! [`FillService`] is the high-level entry point; the building blocks
//! (mapper, encoders, engine adapter, batch runner, dispatcher) are public
//! for callers that need finer control.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

pub mod batch;
pub mod config;
pub mod dispatch;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod mapper;
pub mod types;
pub mod workdir;

pub use config::{Config, DirsConfig, DispatchConfig, EngineConfig, MailConfig};
pub use dispatch::{Dispatcher, HttpMailTransport, MailTransport};
pub use encoder::{default_encoders, DocumentEncoder, FdfEncoder, XfdfEncoder};
pub use engine::{CliFillEngine, FormsEngine};
pub use error::{ApiError, DispatchError, Error, FillError, Result, ToHttpStatus};
pub use types::{
    BatchReport, BatchRequest, DocFormat, Event, FormRecord, GenerationResult, MailMessage,
};

use batch::{require_any_success, BatchRunner};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::instrument;
use workdir::RequestWorkDir;

/// Capacity of the event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// High-level facade over the whole pipeline: enrich, fill per segment,
/// gate on at least one success, dispatch, clean up.
pub struct FillService {
    config: Arc<Config>,
    runner: BatchRunner,
    dispatcher: Dispatcher,
    event_tx: broadcast::Sender<Event>,
}

impl FillService {
    /// Build a service from configuration, discovering the fill engine
    /// binary and wiring the HTTP mail transport.
    pub fn from_config(config: Config) -> Result<Self> {
        let engine = Arc::new(CliFillEngine::from_config(&config.engine)?);
        let transport = Arc::new(HttpMailTransport::from_config(&config.mail)?);
        Ok(Self::new(config, engine, transport))
    }

    /// Build a service over explicit engine and transport collaborators.
    pub fn new(
        config: Config,
        engine: Arc<dyn FormsEngine>,
        transport: Arc<dyn MailTransport>,
    ) -> Self {
        let config = Arc::new(config);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let runner = BatchRunner::new(
            config.clone(),
            engine,
            default_encoders(),
            event_tx.clone(),
        );
        let dispatcher = Dispatcher::new(config.clone(), transport, event_tx.clone());
        Self {
            config,
            runner,
            dispatcher,
            event_tx,
        }
    }

    /// Subscribe to pipeline progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Fill every requested segment and mail the artifacts. Fails with
    /// [`Error::BatchExhausted`] when no segment produced an artifact;
    /// per-segment failures otherwise travel in the report.
    #[instrument(skip(self, request), fields(segments = request.segments.len()))]
    pub async fn fill_and_mail(&self, request: &BatchRequest) -> Result<BatchReport> {
        let (record, results, work) = self.run_batch(request).await?;
        let message_id = self.dispatcher.mail(&record, &results).await?;

        let succeeded = results
            .iter()
            .filter(|r| r.is_filled())
            .map(|r| r.segment().to_string())
            .collect();
        let failed = results
            .iter()
            .filter_map(|r| match r {
                GenerationResult::Failed(f) => Some(f.clone()),
                GenerationResult::Filled { .. } => None,
            })
            .collect();
        let report = BatchReport {
            dispatched: true,
            succeeded,
            failed,
            message_id,
        };
        work.close()?;
        Ok(report)
    }

    /// Fill every requested segment and return the artifacts as a zip
    /// archive, along with the per-segment results.
    #[instrument(skip(self, request), fields(segments = request.segments.len()))]
    pub async fn fill_to_archive(
        &self,
        request: &BatchRequest,
    ) -> Result<(Vec<u8>, Vec<GenerationResult>)> {
        let (_, results, work) = self.run_batch(request).await?;
        let bytes = self.dispatcher.archive(&results).await?;
        work.close()?;
        Ok((bytes, results))
    }

    async fn run_batch(
        &self,
        request: &BatchRequest,
    ) -> Result<(FormRecord, Vec<GenerationResult>, RequestWorkDir)> {
        let record = request.form_record.with_derived(&self.config.derived_fields);
        let work = RequestWorkDir::create(&self.config.dirs.work_dir)?;
        let results = self.runner.run(&record, &request.segments, &work).await;
        require_any_success(&results)?;
        Ok((record, results, work))
    }
}
