//! Attachments and speech input
//!
//! [`UploadPipeline`] turns a local file into a backend file id while
//! reporting simulated progress: one percent per tick up to 99, and 100
//! only once the real upload has succeeded. [`Attachments`] tracks the
//! files of the message being composed and produces the references sent
//! with it. [`SpeechRecorder`] collects recorded audio and transcribes it.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use crate::api::{ConversationApi, FilePayload};
use crate::error::{DifyChatError, Result};
use crate::models::{FeatureToggle, FileUploadSettings, UploadedFile};
use crate::notify::Notifier;

/// Simulated progress never reaches this before the upload resolves
const SIMULATED_CEILING: u8 = 99;
const DONE: u8 = 100;

const IMAGE_EXTENSIONS: &[&str] = &["JPG", "JPEG", "PNG", "GIF", "WEBP", "SVG"];
const DOCUMENT_EXTENSIONS: &[&str] = &[
    "TXT", "MD", "MDX", "MARKDOWN", "PDF", "HTML", "XLSX", "XLS", "DOC", "DOCX", "CSV", "EML",
    "MSG", "PPTX", "PPT", "XML", "EPUB",
];
const AUDIO_EXTENSIONS: &[&str] = &["MP3", "M4A", "WAV", "WEBM", "AMR", "MPGA"];
const VIDEO_EXTENSIONS: &[&str] = &["MP4", "MOV", "MPEG"];

/// Backend file category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// Raster or vector image
    Image,
    /// Text-like document
    Document,
    /// Audio clip
    Audio,
    /// Video clip
    Video,
    /// Anything else
    Custom,
}

impl FileKind {
    /// Category implied by a file extension
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.to_ascii_uppercase();
        let ext = ext.as_str();
        if IMAGE_EXTENSIONS.contains(&ext) {
            FileKind::Image
        } else if DOCUMENT_EXTENSIONS.contains(&ext) {
            FileKind::Document
        } else if AUDIO_EXTENSIONS.contains(&ext) {
            FileKind::Audio
        } else if VIDEO_EXTENSIONS.contains(&ext) {
            FileKind::Video
        } else {
            FileKind::Custom
        }
    }

    /// Name used by the backend
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Image => "image",
            FileKind::Document => "document",
            FileKind::Audio => "audio",
            FileKind::Video => "video",
            FileKind::Custom => "custom",
        }
    }

    /// Category of `name`, falling back to `Custom` when the app does not
    /// accept the implied one
    pub fn for_file(name: &str, allowed_types: &[String]) -> Self {
        let kind = name
            .rsplit_once('.')
            .map(|(_, ext)| FileKind::from_extension(ext))
            .unwrap_or(FileKind::Custom);
        if allowed_types.iter().any(|t| t == kind.as_str()) {
            kind
        } else {
            FileKind::Custom
        }
    }
}

/// File attached to an outgoing message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReference {
    /// Backend file category
    #[serde(rename = "type")]
    pub kind: FileKind,
    /// Always `local_file` for uploaded attachments
    pub transfer_method: String,
    /// Id returned by the upload endpoint
    pub upload_file_id: String,
}

/// Reject files the active app does not accept
///
/// Extensions are compared in `.EXT` form; an empty allow-list accepts
/// everything and files without an extension always pass.
///
/// # Errors
///
/// Returns [`DifyChatError::Validation`] when uploads are disabled or the
/// extension is not allowed.
pub fn check_allowed(settings: &FileUploadSettings, file: &FilePayload) -> Result<()> {
    if !settings.enabled {
        return Err(
            DifyChatError::Validation("File upload is not enabled for this app".into()).into(),
        );
    }
    let Some(ext) = file.extension() else {
        return Ok(());
    };
    if settings.allowed_file_extensions.is_empty() {
        return Ok(());
    }
    let dotted = format!(".{}", ext.to_uppercase());
    if settings
        .allowed_file_extensions
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(&dotted))
    {
        Ok(())
    } else {
        Err(DifyChatError::Validation(format!("Unsupported type: {}", ext)).into())
    }
}

/// Uploads with simulated progress
pub struct UploadPipeline {
    api: Arc<dyn ConversationApi>,
    tick: Duration,
}

impl UploadPipeline {
    /// Create a pipeline advancing progress once per `tick`
    pub fn new(api: Arc<dyn ConversationApi>, tick: Duration) -> Self {
        Self { api, tick }
    }

    /// Validate and upload `file`, publishing progress on `progress`
    ///
    /// Progress climbs by one per tick and stops at 99; it is set to 100
    /// only after the upload succeeded. On failure it stays where it was.
    ///
    /// # Errors
    ///
    /// Returns the validation error (before any request) or the upload
    /// error.
    pub async fn upload(
        &self,
        settings: &FileUploadSettings,
        file: FilePayload,
        progress: &watch::Sender<u8>,
    ) -> Result<UploadedFile> {
        check_allowed(settings, &file)?;
        let name = file.name.clone();
        progress.send_replace(0);

        let upload = self.api.upload_file(file);
        tokio::pin!(upload);
        let mut ticker = tokio::time::interval(self.tick);
        ticker.tick().await;
        let mut percent = 0u8;

        let result = loop {
            tokio::select! {
                result = &mut upload => break result,
                _ = ticker.tick(), if percent < SIMULATED_CEILING => {
                    percent += 1;
                    progress.send_replace(percent);
                }
            }
        };

        match result {
            Ok(uploaded) => {
                progress.send_replace(DONE);
                tracing::debug!(file = %name, id = %uploaded.id, "Upload finished");
                Ok(uploaded)
            }
            Err(e) => {
                tracing::warn!(file = %name, "Upload failed: {:#}", e);
                Err(e)
            }
        }
    }
}

/// State of one attachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentStatus {
    /// Transfer in progress
    Uploading,
    /// Uploaded; carries the backend file id
    Done(String),
    /// Transfer failed
    Failed(String),
}

/// One file attached to the message being composed
#[derive(Debug)]
pub struct Attachment {
    /// Local identifier
    pub uid: Uuid,
    /// File name
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Current status
    pub status: AttachmentStatus,
    progress: watch::Receiver<u8>,
}

impl Attachment {
    /// Latest progress percentage
    pub fn progress(&self) -> u8 {
        *self.progress.borrow()
    }
}

/// Attachments of the message being composed
#[derive(Debug)]
pub struct Attachments {
    settings: FileUploadSettings,
    items: Vec<Attachment>,
}

impl Attachments {
    /// Start an empty set governed by the app's upload settings
    pub fn new(settings: FileUploadSettings) -> Self {
        Self {
            settings,
            items: Vec::new(),
        }
    }

    /// Upload settings in effect
    pub fn settings(&self) -> &FileUploadSettings {
        &self.settings
    }

    /// Register a file about to be uploaded
    ///
    /// Returns its local id and the sender to hand to
    /// [`UploadPipeline::upload`].
    ///
    /// # Errors
    ///
    /// Returns [`DifyChatError::Validation`] if the file is not accepted or
    /// the attachment limit is reached.
    pub fn begin(&mut self, file: &FilePayload) -> Result<(Uuid, watch::Sender<u8>)> {
        check_allowed(&self.settings, file)?;
        if let Some(limit) = self.settings.number_limits {
            if self.items.len() >= limit as usize {
                return Err(DifyChatError::Validation(format!(
                    "At most {} files can be attached",
                    limit
                ))
                .into());
            }
        }
        let (tx, rx) = watch::channel(0);
        let uid = Uuid::new_v4();
        self.items.push(Attachment {
            uid,
            name: file.name.clone(),
            size: file.bytes.len() as u64,
            status: AttachmentStatus::Uploading,
            progress: rx,
        });
        Ok((uid, tx))
    }

    /// Record the outcome of an upload
    pub fn finish(&mut self, uid: Uuid, result: &Result<UploadedFile>) {
        if let Some(item) = self.items.iter_mut().find(|a| a.uid == uid) {
            item.status = match result {
                Ok(uploaded) => AttachmentStatus::Done(uploaded.id.clone()),
                Err(e) => AttachmentStatus::Failed(e.to_string()),
            };
        }
    }

    /// Drop an attachment, returning whether it existed
    pub fn remove(&mut self, uid: Uuid) -> bool {
        let before = self.items.len();
        self.items.retain(|a| a.uid != uid);
        self.items.len() != before
    }

    /// Every attachment, in insertion order
    pub fn items(&self) -> &[Attachment] {
        &self.items
    }

    /// Whether every attachment has finished uploading
    pub fn is_complete(&self) -> bool {
        self.items
            .iter()
            .all(|a| a.status != AttachmentStatus::Uploading)
    }

    /// References to send with the message
    ///
    /// # Errors
    ///
    /// Returns [`DifyChatError::Validation`] while any upload is still
    /// running or when an attachment failed.
    pub fn references(&self) -> Result<Vec<FileReference>> {
        if !self.is_complete() {
            return Err(
                DifyChatError::Validation("Upload not complete, please wait".into()).into(),
            );
        }
        self.items
            .iter()
            .map(|a| match &a.status {
                AttachmentStatus::Done(id) => Ok(FileReference {
                    kind: FileKind::for_file(&a.name, &self.settings.allowed_file_types),
                    transfer_method: "local_file".to_string(),
                    upload_file_id: id.clone(),
                }),
                _ => Err(DifyChatError::Validation(format!(
                    "Attachment {} failed to upload",
                    a.name
                ))
                .into()),
            })
            .collect()
    }

    /// Forget every attachment after the message was sent
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// Recorder lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    /// Not recording
    Idle,
    /// Collecting audio
    Recording,
    /// Waiting for the transcript
    Transcribing,
}

struct RecorderInner {
    state: RecorderState,
    chunks: Vec<Vec<u8>>,
}

/// Speech-to-text input, one recording at a time
pub struct SpeechRecorder {
    api: Arc<dyn ConversationApi>,
    enabled: bool,
    notifier: Notifier,
    inner: Mutex<RecorderInner>,
}

impl SpeechRecorder {
    /// Create a recorder for an app's speech-to-text setting
    pub fn new(api: Arc<dyn ConversationApi>, speech_to_text: &FeatureToggle, notifier: Notifier) -> Self {
        Self {
            api,
            enabled: speech_to_text.enabled,
            notifier,
            inner: Mutex::new(RecorderInner {
                state: RecorderState::Idle,
                chunks: Vec::new(),
            }),
        }
    }

    /// Current state
    pub fn state(&self) -> RecorderState {
        self.lock().state
    }

    /// Start recording
    ///
    /// Returns `false` without doing anything when a recording or a
    /// transcription is already under way.
    ///
    /// # Errors
    ///
    /// Returns [`DifyChatError::Validation`] when the app has speech input
    /// disabled.
    pub fn start(&self) -> Result<bool> {
        if !self.enabled {
            return Err(DifyChatError::Validation(
                "Speech to text is not enabled for this app".into(),
            )
            .into());
        }
        let mut inner = self.lock();
        if inner.state != RecorderState::Idle {
            return Ok(false);
        }
        inner.state = RecorderState::Recording;
        Ok(true)
    }

    /// Append captured audio; ignored unless recording
    pub fn push_chunk(&self, chunk: &[u8]) {
        let mut inner = self.lock();
        if inner.state == RecorderState::Recording && !chunk.is_empty() {
            inner.chunks.push(chunk.to_vec());
        }
    }

    /// Stop recording and transcribe what was captured
    ///
    /// Returns `None` when not recording, when nothing was captured, or
    /// when transcription failed (the failure is notified). Chunks are kept
    /// after a failure so the recording can be retried.
    pub async fn stop(&self) -> Option<String> {
        let audio = {
            let mut inner = self.lock();
            if inner.state != RecorderState::Recording {
                return None;
            }
            if inner.chunks.is_empty() {
                inner.state = RecorderState::Idle;
                return None;
            }
            inner.state = RecorderState::Transcribing;
            inner.chunks.concat()
        };

        let result = self.api.audio_to_text(audio).await;
        let mut inner = self.lock();
        inner.state = RecorderState::Idle;
        match result {
            Ok(text) => {
                inner.chunks.clear();
                Some(text)
            }
            Err(e) => {
                drop(inner);
                self.notifier.error(format!("Error in speech-to-text: {}", e));
                None
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, RecorderInner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::{FakeBackend, FakeConversationApi};

    fn settings(exts: &[&str]) -> FileUploadSettings {
        FileUploadSettings {
            enabled: true,
            allowed_file_types: vec!["image".into(), "document".into()],
            allowed_file_extensions: exts.iter().map(|e| e.to_string()).collect(),
            number_limits: Some(2),
        }
    }

    fn file(name: &str) -> FilePayload {
        FilePayload {
            name: name.into(),
            mime_type: None,
            bytes: vec![1, 2, 3],
        }
    }

    fn uploaded(id: &str) -> UploadedFile {
        UploadedFile {
            id: id.into(),
            name: String::new(),
            size: 0,
            extension: String::new(),
            mime_type: String::new(),
        }
    }

    #[test]
    fn test_extension_allow_list() {
        let s = settings(&[".PDF", ".PNG"]);
        assert!(check_allowed(&s, &file("report.pdf")).is_ok());
        assert!(check_allowed(&s, &file("photo.PNG")).is_ok());
        assert!(check_allowed(&s, &file("Makefile")).is_ok());
        let err = check_allowed(&s, &file("run.exe")).unwrap_err();
        assert!(err.to_string().contains("Unsupported type: exe"));
    }

    #[test]
    fn test_empty_allow_list_means_unrestricted() {
        assert!(check_allowed(&settings(&[]), &file("anything.xyz")).is_ok());
    }

    #[test]
    fn test_disabled_uploads_are_rejected() {
        let s = FileUploadSettings::default();
        assert!(check_allowed(&s, &file("a.pdf")).is_err());
    }

    #[test]
    fn test_file_kind_respects_allowed_types() {
        let allowed = vec!["image".to_string(), "document".to_string()];
        assert_eq!(FileKind::for_file("a.jpeg", &allowed), FileKind::Image);
        assert_eq!(FileKind::for_file("a.pdf", &allowed), FileKind::Document);
        assert_eq!(FileKind::for_file("a.mp3", &allowed), FileKind::Custom);
        assert_eq!(FileKind::for_file("noext", &allowed), FileKind::Custom);
        assert_eq!(FileKind::from_extension("mov"), FileKind::Video);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_stops_at_99_until_upload_resolves() {
        let backend = FakeBackend::new();
        let gate = backend.gate("upload");
        let pipeline = Arc::new(UploadPipeline::new(
            Arc::new(FakeConversationApi::new(backend.clone())),
            Duration::from_millis(100),
        ));
        let (tx, rx) = watch::channel(0u8);

        let task = tokio::spawn({
            let pipeline = pipeline.clone();
            async move { pipeline.upload(&settings(&[]), file("a.pdf"), &tx).await }
        });

        tokio::time::sleep(Duration::from_millis(5_050)).await;
        assert_eq!(*rx.borrow(), 50);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(*rx.borrow(), 99);

        gate.notify_one();
        let uploaded = task.await.unwrap().unwrap();
        assert_eq!(uploaded.id, "file-a.pdf");
        assert_eq!(*rx.borrow(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_upload_never_reports_done() {
        let backend = FakeBackend::new();
        backend.fail("upload");
        let pipeline = UploadPipeline::new(
            Arc::new(FakeConversationApi::new(backend)),
            Duration::from_millis(100),
        );
        let (tx, rx) = watch::channel(0u8);

        assert!(pipeline.upload(&settings(&[]), file("a.pdf"), &tx).await.is_err());
        assert!(*rx.borrow() < 100);
    }

    #[tokio::test]
    async fn test_rejected_extension_skips_request() {
        let backend = FakeBackend::new();
        let pipeline = UploadPipeline::new(
            Arc::new(FakeConversationApi::new(backend.clone())),
            Duration::from_millis(100),
        );
        let (tx, _rx) = watch::channel(0u8);

        assert!(pipeline
            .upload(&settings(&[".PDF"]), file("a.exe"), &tx)
            .await
            .is_err());
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_attachments_block_submission_while_uploading() {
        let mut attachments = Attachments::new(settings(&[]));
        let (uid, tx) = attachments.begin(&file("a.pdf")).unwrap();
        tx.send_replace(40);
        assert_eq!(attachments.items()[0].progress(), 40);

        let err = attachments.references().unwrap_err();
        assert!(err.to_string().contains("Upload not complete"));

        attachments.finish(uid, &Ok(uploaded("f-1")));
        let refs = attachments.references().unwrap();
        assert_eq!(
            refs,
            vec![FileReference {
                kind: FileKind::Document,
                transfer_method: "local_file".into(),
                upload_file_id: "f-1".into(),
            }]
        );
        let json = serde_json::to_value(&refs[0]).unwrap();
        assert_eq!(json["type"], "document");
    }

    #[test]
    fn test_attachment_limit_and_removal() {
        let mut attachments = Attachments::new(settings(&[]));
        let (first, _) = attachments.begin(&file("a.pdf")).unwrap();
        attachments.begin(&file("b.pdf")).unwrap();
        assert!(attachments.begin(&file("c.pdf")).is_err());

        assert!(attachments.remove(first));
        assert!(!attachments.remove(first));
        assert!(attachments.begin(&file("c.pdf")).is_ok());
    }

    #[test]
    fn test_failed_attachment_blocks_references() {
        let mut attachments = Attachments::new(settings(&[]));
        let (uid, _) = attachments.begin(&file("a.pdf")).unwrap();
        attachments.finish(uid, &Err(DifyChatError::Network("boom".into()).into()));
        assert!(attachments.is_complete());
        assert!(attachments.references().is_err());
        attachments.clear();
        assert!(attachments.references().unwrap().is_empty());
    }

    fn recorder(backend: &Arc<FakeBackend>, enabled: bool) -> SpeechRecorder {
        SpeechRecorder::new(
            Arc::new(FakeConversationApi::new(backend.clone())),
            &FeatureToggle { enabled },
            Notifier::silent(),
        )
    }

    #[tokio::test]
    async fn test_recorder_transcribes_captured_audio() {
        let backend = FakeBackend::new();
        backend.set_transcript("hello there");
        let rec = recorder(&backend, true);

        assert!(rec.start().unwrap());
        assert!(!rec.start().unwrap());
        rec.push_chunk(b"abc");
        rec.push_chunk(b"def");

        assert_eq!(rec.stop().await.as_deref(), Some("hello there"));
        assert_eq!(rec.state(), RecorderState::Idle);
        assert_eq!(backend.calls(), vec!["audio:6".to_string()]);
    }

    #[tokio::test]
    async fn test_recorder_no_ops() {
        let backend = FakeBackend::new();
        let rec = recorder(&backend, true);

        assert_eq!(rec.stop().await, None);
        rec.start().unwrap();
        assert_eq!(rec.stop().await, None);
        assert_eq!(rec.state(), RecorderState::Idle);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_recorder_failure_returns_to_idle() {
        let backend = FakeBackend::new();
        backend.fail("audio");
        let rec = recorder(&backend, true);
        rec.start().unwrap();
        rec.push_chunk(b"abc");

        assert_eq!(rec.stop().await, None);
        assert_eq!(rec.state(), RecorderState::Idle);
    }

    #[test]
    fn test_recorder_requires_speech_to_text() {
        let rec = recorder(&FakeBackend::new(), false);
        assert!(rec.start().is_err());
    }
}
