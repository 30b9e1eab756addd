//! Dispatch of generated artifacts: zip download or outbound mail
//!
//! Consumes the filled results of a batch run. Generation errors stay with
//! the batch runner; everything here fails with [`DispatchError`], which
//! records how many artifacts had already been generated when delivery
//! broke.

mod archive;
mod mail;

pub use archive::build_archive;
pub use mail::{HttpMailTransport, MailTransport};

use crate::config::Config;
use crate::error::{DispatchError, Error, Result};
use crate::types::{Attachment, Event, FormRecord, GenerationResult, MailMessage};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, instrument};

/// Suggested download filename for an archive built now.
pub fn archive_filename() -> String {
    format!("submission-{}.zip", Utc::now().format("%Y%m%d-%H%M%S"))
}

/// Delivers the artifacts of a completed batch.
pub struct Dispatcher {
    config: Arc<Config>,
    transport: Arc<dyn MailTransport>,
    event_tx: broadcast::Sender<Event>,
}

impl Dispatcher {
    /// Create a dispatcher over the given mail transport.
    pub fn new(
        config: Arc<Config>,
        transport: Arc<dyn MailTransport>,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            config,
            transport,
            event_tx,
        }
    }

    /// Pack all filled artifacts into a zip archive, entries in result
    /// order.
    #[instrument(skip(self, results))]
    pub async fn archive(&self, results: &[GenerationResult]) -> Result<Vec<u8>> {
        let attachments = self.collect_attachments(results).await?;
        let count = attachments.len();
        let bytes = build_archive(&attachments)?;
        info!(entries = count, size = bytes.len(), "built artifact archive");
        self.event_tx.send(Event::Dispatched { count }).ok();
        Ok(bytes)
    }

    /// Mail all filled artifacts as attachments. Recipients, body, and the
    /// subject fall back to configured defaults; the subject is rendered
    /// from the record's applicant field when present.
    #[instrument(skip(self, record, results))]
    pub async fn mail(
        &self,
        record: &FormRecord,
        results: &[GenerationResult],
    ) -> Result<Option<String>> {
        let attachments = self.collect_attachments(results).await?;
        let count = attachments.len();
        let message = MailMessage {
            to: self.config.mail.default_to.clone(),
            subject: self.subject_for(record),
            body_html: self.config.dispatch.body_html.clone(),
        };

        let message_id = self.transport.send(&message, &attachments).await?;
        info!(attachments = count, message_id = ?message_id, "dispatched by mail");
        self.event_tx.send(Event::Dispatched { count }).ok();
        Ok(message_id)
    }

    fn subject_for(&self, record: &FormRecord) -> String {
        let prefix = &self.config.dispatch.subject_prefix;
        match record.get(&self.config.dispatch.applicant_field) {
            Some(applicant) if !applicant.trim().is_empty() => {
                format!("{prefix}: {}", applicant.trim())
            }
            _ => prefix.clone(),
        }
    }

    async fn collect_attachments(
        &self,
        results: &[GenerationResult],
    ) -> Result<Vec<Attachment>> {
        let mut attachments = Vec::new();
        for result in results {
            if let GenerationResult::Filled {
                artifact_path,
                filename,
                ..
            } = result
            {
                let bytes = tokio::fs::read(artifact_path).await.map_err(|e| {
                    Error::Dispatch(DispatchError::MailFailed {
                        reason: format!(
                            "failed to read artifact {}: {e}",
                            artifact_path.display()
                        ),
                        generated: results.iter().filter(|r| r.is_filled()).count(),
                    })
                })?;
                attachments.push(Attachment {
                    filename: filename.clone(),
                    bytes,
                });
            }
        }
        Ok(attachments)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DocFormat, FailureKind, GenerationFailure};
    use async_trait::async_trait;
    use std::io::Cursor;
    use std::path::Path;
    use std::sync::Mutex;
    use zip::ZipArchive;

    struct RecordingTransport {
        sent: Mutex<Vec<(MailMessage, Vec<Attachment>)>>,
    }

    impl RecordingTransport {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MailTransport for RecordingTransport {
        async fn send(
            &self,
            message: &MailMessage,
            attachments: &[Attachment],
        ) -> std::result::Result<Option<String>, DispatchError> {
            self.sent
                .lock()
                .unwrap()
                .push((message.clone(), attachments.to_vec()));
            Ok(Some("msg-1".to_string()))
        }
    }

    fn config() -> Arc<Config> {
        let config: Config = serde_json::from_value(serde_json::json!({
            "default_to": ["submissions@example.com"],
            "display_names": {"acord125": "Commercial Insurance Application.pdf"},
        }))
        .unwrap();
        Arc::new(config)
    }

    fn dispatcher(transport: Arc<dyn MailTransport>) -> Dispatcher {
        let (event_tx, _) = broadcast::channel(16);
        Dispatcher::new(config(), transport, event_tx)
    }

    fn filled(dir: &Path, segment: &str, filename: &str, bytes: &[u8]) -> GenerationResult {
        let artifact_path = dir.join(format!("{segment}.pdf"));
        std::fs::write(&artifact_path, bytes).unwrap();
        GenerationResult::Filled {
            segment: segment.to_string(),
            artifact_path,
            filename: filename.to_string(),
            format_used: DocFormat::Fdf,
        }
    }

    fn failed(segment: &str) -> GenerationResult {
        GenerationResult::Failed(GenerationFailure {
            segment: segment.to_string(),
            error_kind: FailureKind::EngineExit,
            detail: "engine exited with status 1".to_string(),
        })
    }

    #[tokio::test]
    async fn archive_contains_only_filled_artifacts_under_display_names() {
        let dir = tempfile::tempdir().unwrap();
        let results = vec![
            filled(
                dir.path(),
                "acord125",
                "Commercial Insurance Application.pdf",
                b"%PDF-a",
            ),
            failed("acord126"),
        ];

        let transport = Arc::new(RecordingTransport::new());
        let bytes = dispatcher(transport).archive(&results).await.unwrap();

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 1);
        assert_eq!(
            archive.by_index(0).unwrap().name(),
            "Commercial Insurance Application.pdf"
        );
    }

    #[tokio::test]
    async fn mail_uses_applicant_subject_and_configured_recipients() {
        let dir = tempfile::tempdir().unwrap();
        let results = vec![filled(
            dir.path(),
            "acord125",
            "Commercial Insurance Application.pdf",
            b"%PDF-a",
        )];
        let record = FormRecord::from([("applicant_name", "Joe's Bar")]);

        let transport = Arc::new(RecordingTransport::new());
        let dispatcher = dispatcher(transport.clone());
        let message_id = dispatcher.mail(&record, &results).await.unwrap();

        assert_eq!(message_id.as_deref(), Some("msg-1"));
        let sent = transport.sent.lock().unwrap();
        let (message, attachments) = &sent[0];
        assert_eq!(message.subject, "New Submission: Joe's Bar");
        assert_eq!(message.to, vec!["submissions@example.com".to_string()]);
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].bytes, b"%PDF-a");
    }

    #[tokio::test]
    async fn subject_falls_back_to_prefix_without_applicant() {
        let dir = tempfile::tempdir().unwrap();
        let results = vec![filled(dir.path(), "acord125", "a.pdf", b"%PDF-a")];
        let record = FormRecord::from([("other_field", "value")]);

        let transport = Arc::new(RecordingTransport::new());
        let dispatcher = dispatcher(transport.clone());
        dispatcher.mail(&record, &results).await.unwrap();

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent[0].0.subject, "New Submission");
    }

    #[test]
    fn archive_filename_is_zip_with_timestamp() {
        let name = archive_filename();
        assert!(name.starts_with("submission-"));
        assert!(name.ends_with(".zip"));
    }

    #[tokio::test]
    async fn unreadable_artifact_is_a_dispatch_error() {
        let results = vec![GenerationResult::Filled {
            segment: "acord125".to_string(),
            artifact_path: Path::new("/nonexistent/acord125.pdf").to_path_buf(),
            filename: "a.pdf".to_string(),
            format_used: DocFormat::Fdf,
        }];

        let transport = Arc::new(RecordingTransport::new());
        let record = FormRecord::default();
        let err = dispatcher(transport).mail(&record, &results).await.unwrap_err();
        assert!(matches!(err, Error::Dispatch(_)));
    }
}
