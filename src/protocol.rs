//! Wire requests and types used throughout openpipe.
//!
//! This module defines the vocabulary that all components share:
//! [`Request`] describes every message the pipe server understands,
//! and [`OpenTarget`] / [`OpenOptions`] carry a classified `"open"`
//! request to the window-opening collaborator.
//!
//! # Wire format
//!
//! Every request body is a single JSON object discriminated by a `type`
//! field:
//!
//! ```json
//! {"type":"open","fileURIs":["file:///a.txt"],"folderURIs":[]}
//! {"type":"status"}
//! {"type":"command","command":"workbench.reload","args":[]}
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

/// Arguments of an `"open"` request.
///
/// Every field is optional on the wire; a bare `{"type":"open"}` is a valid
/// (empty) request.  Field names are camelCase to match the companion shell
/// launcher.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpenArgs {
    #[serde(rename = "fileURIs")]
    pub file_uris: Vec<String>,
    #[serde(rename = "folderURIs")]
    pub folder_uris: Vec<String>,
    pub force_new_window: bool,
    pub diff_mode: bool,
    pub add_mode: bool,
    pub goto_line_mode: bool,
    pub force_reuse_window: bool,
    pub wait_marker_file_path: Option<String>,
}

/// Arguments of a `"command"` request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandArgs {
    pub command: String,
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
}

/// A parsed pipe request.
///
/// Parsing is done by hand from a [`serde_json::Value`] rather than with a
/// serde-tagged enum so that an unrecognized discriminator string survives
/// into [`MalformedRequest::UnknownType`] for the error response.
#[derive(Debug, Clone)]
pub enum Request {
    Open(OpenArgs),
    Status,
    Command(CommandArgs),
}

/// Errors produced while turning a request body into a [`Request`].
#[derive(Debug, thiserror::Error)]
pub enum MalformedRequest {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unknown message type: <missing>")]
    MissingType,
    #[error("Unknown message type: {0}")]
    UnknownType(String),
}

impl Request {
    /// Parse a UTF-8 JSON request body.
    pub fn parse(body: &str) -> Result<Self, MalformedRequest> {
        let value: serde_json::Value = serde_json::from_str(body)?;
        let ty = value
            .get("type")
            .and_then(|t| t.as_str())
            .map(str::to_owned)
            .ok_or(MalformedRequest::MissingType)?;
        match ty.as_str() {
            "open" => Ok(Request::Open(serde_json::from_value(value)?)),
            "status" => Ok(Request::Status),
            "command" => Ok(Request::Command(serde_json::from_value(value)?)),
            _ => Err(MalformedRequest::UnknownType(ty)),
        }
    }
}

//  Classification

/// One resource a classified `"open"` request asks the host to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenTarget {
    /// A directory to open as a project root.
    Folder(Url),
    /// A multi-folder workspace descriptor file.
    Workspace(Url),
    /// A plain file to edit.
    File(Url),
}

/// Aggregated window flags forwarded alongside the classified targets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenOptions {
    pub force_new_window: bool,
    pub diff_mode: bool,
    pub add_mode: bool,
    pub goto_line_mode: bool,
    pub force_reuse_window: bool,
    /// File the launcher polls for deletion when it was asked to wait.
    pub wait_marker_file: Option<PathBuf>,
}

/// Whether a URL path names a workspace descriptor file.
///
/// Extensions are compared case-insensitively and without their leading dot.
pub fn has_workspace_extension(url_path: &str, extensions: &[String]) -> bool {
    let ext = match Path::new(url_path).extension().and_then(|e| e.to_str()) {
        Some(e) => e,
        None => return false,
    };
    extensions.iter().any(|w| w.eq_ignore_ascii_case(ext))
}

impl OpenArgs {
    /// Classify the raw URI lists into concrete open targets.
    ///
    /// Malformed URIs are skipped; they never abort the rest of the batch.
    /// Opening a folder forces a new window unless `addMode` or
    /// `forceReuseWindow` was set, and opening a workspace descriptor forces
    /// a new window unless `forceReuseWindow` was set.
    pub fn classify(&self, workspace_extensions: &[String]) -> (Vec<OpenTarget>, OpenOptions) {
        let mut force_new_window = self.force_new_window;
        let mut targets = Vec::new();

        for raw in &self.folder_uris {
            if let Ok(uri) = Url::parse(raw) {
                targets.push(OpenTarget::Folder(uri));
                if !self.add_mode && !self.force_reuse_window {
                    force_new_window = true;
                }
            }
        }

        for raw in &self.file_uris {
            if let Ok(uri) = Url::parse(raw) {
                if has_workspace_extension(uri.path(), workspace_extensions) {
                    targets.push(OpenTarget::Workspace(uri));
                    if !self.force_reuse_window {
                        force_new_window = true;
                    }
                } else {
                    targets.push(OpenTarget::File(uri));
                }
            }
        }

        let options = OpenOptions {
            force_new_window,
            diff_mode: self.diff_mode,
            add_mode: self.add_mode,
            goto_line_mode: self.goto_line_mode,
            force_reuse_window: self.force_reuse_window,
            wait_marker_file: self.wait_marker_file_path.as_ref().map(PathBuf::from),
        };

        (targets, options)
    }
}
