//! Request DTOs for Web API.

use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::validation::{no_control_chars, no_control_chars_in_text};

/// File update request.
///
/// Absent fields are left unchanged. An empty `comment` clears it.
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateFileRequest {
    /// New base name. The extension is kept.
    #[serde(default)]
    #[validate(
        length(min = 1, max = 255, message = "Name must be 1-255 characters"),
        custom(function = "no_control_chars")
    )]
    pub name: Option<String>,
    /// Target directory, absolute or relative to the storage root.
    #[serde(default)]
    #[validate(
        length(max = 1024, message = "Path must be at most 1024 characters"),
        custom(function = "no_control_chars")
    )]
    pub path: Option<String>,
    /// New comment.
    #[serde(default)]
    #[validate(
        length(max = 2000, message = "Comment must be at most 2000 characters"),
        custom(function = "no_control_chars_in_text")
    )]
    pub comment: Option<String>,
}

/// Comment sent with an upload, from the form field or the query string.
#[derive(Debug, Default, Validate)]
pub struct UploadComment {
    #[validate(
        length(max = 2000, message = "Comment must be at most 2000 characters"),
        custom(function = "no_control_chars_in_text")
    )]
    pub comment: Option<String>,
}

/// Query parameters for listing files.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// Records to skip (default 0).
    pub offset: Option<i64>,
    /// Maximum records to return (default 100, capped at 1000).
    pub limit: Option<i64>,
}

/// Query parameters accepted alongside an upload.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UploadQuery {
    /// Comment, if not sent as a form field.
    pub comment: Option<String>,
}

/// Multipart upload body, for the API docs only.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    /// File content. The part's file name becomes the record name.
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
    /// Optional comment.
    pub comment: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::{MAX_COMMENT_LENGTH, MAX_NAME_LENGTH};

    #[test]
    fn test_update_request_deserialize_partial() {
        let req: UpdateFileRequest = serde_json::from_str(r#"{"name":"report"}"#).unwrap();
        assert_eq!(req.name.as_deref(), Some("report"));
        assert!(req.path.is_none());
        assert!(req.comment.is_none());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_update_request_rejects_long_name() {
        let req = UpdateFileRequest {
            name: Some("x".repeat(MAX_NAME_LENGTH + 1)),
            ..Default::default()
        };
        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("name"));
    }

    #[test]
    fn test_update_request_rejects_empty_name() {
        let req = UpdateFileRequest {
            name: Some(String::new()),
            ..Default::default()
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_update_request_rejects_control_chars_in_path() {
        let req = UpdateFileRequest {
            path: Some("docs\x00/x".to_string()),
            ..Default::default()
        };
        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("path"));
    }

    #[test]
    fn test_update_request_rejects_long_comment() {
        let req = UpdateFileRequest {
            comment: Some("c".repeat(MAX_COMMENT_LENGTH + 1)),
            ..Default::default()
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_update_request_rejects_control_chars_in_comment() {
        let req = UpdateFileRequest {
            comment: Some("beep\x07".to_string()),
            ..Default::default()
        };
        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("comment"));
    }

    #[test]
    fn test_upload_comment_limits() {
        let multiline = UploadComment {
            comment: Some("line one\nline two".to_string()),
        };
        assert!(multiline.validate().is_ok());

        let long = UploadComment {
            comment: Some("c".repeat(MAX_COMMENT_LENGTH + 1)),
        };
        assert!(long.validate().is_err());

        assert!(UploadComment::default().validate().is_ok());
    }
}
