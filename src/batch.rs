//! Segment batch runner
//!
//! Runs one fill per requested segment, sequentially and in caller order.
//! Per-segment failures are captured as results rather than aborting the
//! batch; a completed segment is never rolled back by a later failure.

use crate::config::Config;
use crate::encoder::DocumentEncoder;
use crate::engine::FormsEngine;
use crate::error::{Error, FillError, Result};
use crate::fallback::fill_with_fallback;
use crate::mapper::{self, SegmentMapping};
use crate::types::{
    Event, FailureKind, FormRecord, GenerationFailure, GenerationResult,
};
use crate::workdir::RequestWorkDir;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

/// Generates one filled artifact per requested segment.
pub struct BatchRunner {
    config: Arc<Config>,
    engine: Arc<dyn FormsEngine>,
    encoders: Vec<Box<dyn DocumentEncoder>>,
    event_tx: broadcast::Sender<Event>,
}

impl BatchRunner {
    /// Create a runner over the given engine and ordered encoder list.
    pub fn new(
        config: Arc<Config>,
        engine: Arc<dyn FormsEngine>,
        encoders: Vec<Box<dyn DocumentEncoder>>,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            config,
            engine,
            encoders,
            event_tx,
        }
    }

    /// Fill every segment in `segments`, in order, writing artifacts into
    /// `work`. Returns one result per requested segment, same order.
    #[instrument(skip(self, record, work), fields(segments = segments.len()))]
    pub async fn run(
        &self,
        record: &FormRecord,
        segments: &[String],
        work: &RequestWorkDir,
    ) -> Vec<GenerationResult> {
        let mut results = Vec::with_capacity(segments.len());
        for segment in segments {
            self.event_tx
                .send(Event::SegmentStarted {
                    segment: segment.clone(),
                })
                .ok();
            let result = self.fill_segment(record, segment, work).await;
            match &result {
                GenerationResult::Filled {
                    segment,
                    format_used,
                    ..
                } => {
                    self.event_tx
                        .send(Event::SegmentFilled {
                            segment: segment.clone(),
                            format_used: *format_used,
                        })
                        .ok();
                }
                GenerationResult::Failed(failure) => {
                    self.event_tx
                        .send(Event::SegmentFailed {
                            segment: failure.segment.clone(),
                            error_kind: failure.error_kind,
                        })
                        .ok();
                }
            }
            results.push(result);
        }

        let succeeded = results.iter().filter(|r| r.is_filled()).count();
        let failed = results.len() - succeeded;
        info!(succeeded, failed, "segment batch complete");
        self.event_tx
            .send(Event::BatchComplete { succeeded, failed })
            .ok();
        results
    }

    async fn fill_segment(
        &self,
        record: &FormRecord,
        segment: &str,
        work: &RequestWorkDir,
    ) -> GenerationResult {
        let template = self.config.template_path(segment);
        if !template.is_file() {
            warn!(segment = %segment, path = %template.display(), "template not found");
            return GenerationResult::Failed(GenerationFailure {
                segment: segment.to_string(),
                error_kind: FailureKind::TemplateNotFound,
                detail: format!("no template at {}", template.display()),
            });
        }

        let mapping = match SegmentMapping::load(&self.config.mapping_path(segment), segment).await
        {
            Ok(mapping) => mapping,
            Err(e) => {
                warn!(segment = %segment, error = %e, "mapping load failed");
                return GenerationResult::Failed(GenerationFailure {
                    segment: segment.to_string(),
                    error_kind: FailureKind::MappingLoad,
                    detail: e.to_string(),
                });
            }
        };

        let assignments = mapper::map_record(record, &mapping);
        let output = work.artifact_path(segment);

        match fill_with_fallback(
            self.engine.as_ref(),
            &self.encoders,
            segment,
            &template,
            &assignments,
            &output,
        )
        .await
        {
            Ok(format_used) => GenerationResult::Filled {
                segment: segment.to_string(),
                artifact_path: output,
                filename: self.config.display_name(segment),
                format_used,
            },
            Err(e) => {
                work.discard_partial(&output).await;
                GenerationResult::Failed(GenerationFailure {
                    segment: segment.to_string(),
                    error_kind: failure_kind(&e),
                    detail: e.to_string(),
                })
            }
        }
    }
}

/// Ensure at least one segment produced an artifact.
pub fn require_any_success(results: &[GenerationResult]) -> Result<()> {
    if results.iter().any(GenerationResult::is_filled) {
        Ok(())
    } else {
        Err(Error::BatchExhausted {
            attempted: results.len(),
        })
    }
}

fn failure_kind(error: &FillError) -> FailureKind {
    match error {
        FillError::SpawnFailed { .. } => FailureKind::EngineSpawn,
        FillError::ExitFailed { .. } => FailureKind::EngineExit,
        FillError::TimedOut { .. } => FailureKind::EngineTimeout,
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::default_encoders;
    use crate::types::DocFormat;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::Mutex;

    /// Engine whose outcome depends on the payload format it receives.
    struct FormatPickyEngine {
        /// formats the engine accepts; others fail with a non-zero exit
        accepts: HashSet<&'static [u8]>,
        fills: Mutex<usize>,
    }

    impl FormatPickyEngine {
        fn accepting_all() -> Self {
            Self {
                accepts: [b"%FDF".as_slice(), b"<?xm".as_slice()].into_iter().collect(),
                fills: Mutex::new(0),
            }
        }

        fn accepting_xfdf_only() -> Self {
            Self {
                accepts: [b"<?xm".as_slice()].into_iter().collect(),
                fills: Mutex::new(0),
            }
        }

        fn rejecting_all() -> Self {
            Self {
                accepts: HashSet::new(),
                fills: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl FormsEngine for FormatPickyEngine {
        async fn fill(
            &self,
            _template: &Path,
            payload: &[u8],
            output: &Path,
        ) -> std::result::Result<(), FillError> {
            *self.fills.lock().unwrap() += 1;
            if self.accepts.contains(&payload[..4]) {
                std::fs::write(output, b"%PDF-filled").unwrap();
                Ok(())
            } else {
                Err(FillError::ExitFailed {
                    code: Some(1),
                    stderr: "unsupported payload".into(),
                })
            }
        }

        fn name(&self) -> &'static str {
            "format-picky"
        }
    }

    struct Fixture {
        _root: tempfile::TempDir,
        config: Arc<Config>,
        work_parent: std::path::PathBuf,
    }

    fn fixture(segments_with_mappings: &[&str]) -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let template_dir = root.path().join("forms");
        let mapping_dir = root.path().join("mapping");
        let work_parent = root.path().join("work");
        std::fs::create_dir_all(&template_dir).unwrap();
        std::fs::create_dir_all(&mapping_dir).unwrap();

        for segment in segments_with_mappings {
            std::fs::write(template_dir.join(format!("{segment}.pdf")), b"%PDF-1.4").unwrap();
            std::fs::write(
                mapping_dir.join(format!("{segment}.json")),
                br#"{"applicant_name": "Text1"}"#,
            )
            .unwrap();
        }

        let config: Config = serde_json::from_value(serde_json::json!({
            "template_dir": template_dir,
            "mapping_dir": mapping_dir,
            "work_dir": work_parent,
        }))
        .unwrap();

        Fixture {
            _root: root,
            config: Arc::new(config),
            work_parent,
        }
    }

    fn runner(config: Arc<Config>, engine: Arc<dyn FormsEngine>) -> (BatchRunner, broadcast::Receiver<Event>) {
        let (event_tx, event_rx) = broadcast::channel(64);
        (
            BatchRunner::new(config, engine, default_encoders(), event_tx),
            event_rx,
        )
    }

    fn record() -> FormRecord {
        FormRecord::from([("applicant_name", "Joe's Bar")])
    }

    fn segs(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn partial_batch_failure_preserves_earlier_success() {
        // Scenario C: segment A fills, segment B has no mapping file
        let fx = fixture(&["acord125"]);
        // template exists for acord126 but its mapping does not
        std::fs::write(
            fx.config.template_path("acord126"),
            b"%PDF-1.4",
        )
        .unwrap();

        let engine = Arc::new(FormatPickyEngine::accepting_all());
        let (runner, _rx) = runner(fx.config.clone(), engine);
        let work = RequestWorkDir::create(&fx.work_parent).unwrap();

        let results = runner
            .run(&record(), &segs(&["acord125", "acord126"]), &work)
            .await;

        assert_eq!(results.len(), 2);
        assert!(results[0].is_filled());
        match &results[1] {
            GenerationResult::Failed(f) => {
                assert_eq!(f.segment, "acord126");
                assert_eq!(f.error_kind, FailureKind::MappingLoad);
            }
            other => panic!("expected failure for acord126, got: {other:?}"),
        }
        // earlier artifact untouched by the later failure
        match &results[0] {
            GenerationResult::Filled { artifact_path, .. } => assert!(artifact_path.is_file()),
            other => panic!("expected filled acord125, got: {other:?}"),
        }
        require_any_success(&results).unwrap();
    }

    #[tokio::test]
    async fn fallback_success_is_not_a_failure() {
        // Scenario D: primary format rejected, fallback accepted
        let fx = fixture(&["acord125"]);
        let engine = Arc::new(FormatPickyEngine::accepting_xfdf_only());
        let (runner, _rx) = runner(fx.config.clone(), engine.clone());
        let work = RequestWorkDir::create(&fx.work_parent).unwrap();

        let results = runner.run(&record(), &segs(&["acord125"]), &work).await;

        match &results[0] {
            GenerationResult::Filled { format_used, .. } => {
                assert_eq!(*format_used, DocFormat::Xfdf);
            }
            other => panic!("expected filled via fallback, got: {other:?}"),
        }
        assert_eq!(*engine.fills.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn total_failure_is_reported_as_exhausted() {
        // Scenario E: every segment fails on both formats
        let fx = fixture(&["acord125", "acord126"]);
        let engine = Arc::new(FormatPickyEngine::rejecting_all());
        let (runner, _rx) = runner(fx.config.clone(), engine);
        let work = RequestWorkDir::create(&fx.work_parent).unwrap();

        let results = runner
            .run(&record(), &segs(&["acord125", "acord126"]), &work)
            .await;

        assert!(results.iter().all(|r| !r.is_filled()));
        for r in &results {
            match r {
                GenerationResult::Failed(f) => {
                    assert_eq!(f.error_kind, FailureKind::EngineExit)
                }
                other => panic!("expected failure, got: {other:?}"),
            }
        }
        match require_any_success(&results) {
            Err(Error::BatchExhausted { attempted }) => assert_eq!(attempted, 2),
            other => panic!("expected BatchExhausted, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_template_fails_without_engine_attempt() {
        let fx = fixture(&[]);
        let engine = Arc::new(FormatPickyEngine::accepting_all());
        let (runner, _rx) = runner(fx.config.clone(), engine.clone());
        let work = RequestWorkDir::create(&fx.work_parent).unwrap();

        let results = runner.run(&record(), &segs(&["missing"]), &work).await;

        match &results[0] {
            GenerationResult::Failed(f) => {
                assert_eq!(f.error_kind, FailureKind::TemplateNotFound)
            }
            other => panic!("expected template failure, got: {other:?}"),
        }
        assert_eq!(*engine.fills.lock().unwrap(), 0, "no fill for a missing template");
    }

    #[tokio::test]
    async fn results_preserve_caller_order() {
        let fx = fixture(&["b_seg", "a_seg", "c_seg"]);
        let engine = Arc::new(FormatPickyEngine::accepting_all());
        let (runner, _rx) = runner(fx.config.clone(), engine);
        let work = RequestWorkDir::create(&fx.work_parent).unwrap();

        let order = segs(&["b_seg", "a_seg", "c_seg"]);
        let results = runner.run(&record(), &order, &work).await;

        let got: Vec<&str> = results.iter().map(|r| r.segment()).collect();
        assert_eq!(got, vec!["b_seg", "a_seg", "c_seg"]);
    }

    #[tokio::test]
    async fn events_cover_the_segment_lifecycle() {
        let fx = fixture(&["acord125"]);
        let engine = Arc::new(FormatPickyEngine::accepting_all());
        let (runner, mut rx) = runner(fx.config.clone(), engine);
        let work = RequestWorkDir::create(&fx.work_parent).unwrap();

        runner.run(&record(), &segs(&["acord125"]), &work).await;

        assert!(matches!(
            rx.try_recv().unwrap(),
            Event::SegmentStarted { .. }
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            Event::SegmentFilled {
                format_used: DocFormat::Fdf,
                ..
            }
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            Event::BatchComplete {
                succeeded: 1,
                failed: 0
            }
        ));
    }
}
