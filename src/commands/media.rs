//! Upload and transcription commands

use std::path::Path;

use colored::Colorize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{print_notices, CommandContext};
use crate::api::FilePayload;
use crate::app_session::AppState;
use crate::error::{DifyChatError, Result};
use crate::workspace::Workspace;

/// Upload a file to an app, printing progress
pub async fn upload(ctx: &CommandContext, app_id: &str, path: &Path) -> Result<()> {
    let (workspace, mut notices) = ctx.workspace()?;
    let result = upload_file(&workspace, app_id, path).await;
    print_notices(&mut notices);
    result
}

async fn upload_file(workspace: &Workspace, app_id: &str, path: &Path) -> Result<()> {
    open_ready(workspace, app_id).await?;
    let file = read_payload(path)?;
    let mut attachments = workspace.attachments()?;

    let (progress, mut rx) = watch::channel(0u8);
    let reporter = tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let percent = *rx.borrow();
            tracing::debug!(percent, "Upload progress");
        }
    });

    let result = workspace.attach(&mut attachments, file, Some(progress)).await;
    settle_reporter(reporter).await;

    let uploaded = result?;
    println!(
        "{}",
        format!("Uploaded {} as {}", uploaded.name, uploaded.id).green()
    );
    for reference in attachments.references()? {
        println!("{}", serde_json::to_string(&reference)?);
    }
    Ok(())
}

/// Transcribe an audio file with the app's speech-to-text
pub async fn transcribe(ctx: &CommandContext, app_id: &str, path: &Path) -> Result<()> {
    let (workspace, mut notices) = ctx.workspace()?;
    let result = transcribe_file(&workspace, app_id, path).await;
    print_notices(&mut notices);
    result
}

async fn transcribe_file(workspace: &Workspace, app_id: &str, path: &Path) -> Result<()> {
    open_ready(workspace, app_id).await?;
    let audio = std::fs::read(path)?;
    let recorder = workspace.recorder()?;

    recorder.start()?;
    recorder.push_chunk(&audio);
    match recorder.stop().await {
        Some(text) => {
            println!("{}", text);
            Ok(())
        }
        None => Err(DifyChatError::Network("Transcription failed".into()).into()),
    }
}

async fn open_ready(workspace: &Workspace, app_id: &str) -> Result<()> {
    match workspace.open_app(Some(app_id), false).await? {
        AppState::Ready(_) => Ok(()),
        state => Err(DifyChatError::Validation(format!(
            "App {} is not ready: {:?}",
            app_id, state
        ))
        .into()),
    }
}

/// Wait for the progress reporter; `false` if it panicked or was cancelled
async fn settle_reporter(reporter: JoinHandle<()>) -> bool {
    match reporter.await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Upload progress reporter stopped abnormally: {}", e);
            false
        }
    }
}

fn read_payload(path: &Path) -> Result<FilePayload> {
    let bytes = std::fs::read(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| DifyChatError::Validation(format!("Not a file: {}", path.display())))?;
    Ok(FilePayload {
        name,
        mime_type: None,
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_read_payload_uses_file_name() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.pdf");
        std::fs::write(&path, b"%PDF").unwrap();

        let payload = read_payload(&path).unwrap();

        assert_eq!(payload.name, "report.pdf");
        assert_eq!(payload.extension(), Some("pdf"));
        assert_eq!(payload.bytes, b"%PDF".to_vec());
    }

    #[test]
    fn test_read_payload_missing_file() {
        assert!(read_payload(Path::new("/nonexistent/file.txt")).is_err());
    }

    #[tokio::test]
    async fn test_settle_reporter_notices_panics() {
        assert!(settle_reporter(tokio::spawn(async {})).await);

        let panicked = tokio::spawn(async { panic!("reporter failed") });
        assert!(!settle_reporter(panicked).await);
    }
}
