//! Microsoft Graph response types
//!
//! Only the fields the camera-roll listing needs are modelled; everything
//! else in a drive item is ignored.

use serde::Deserialize;

/// One page of `GET /me/drive/root:{path}:/children`
///
/// See: https://learn.microsoft.com/graph/api/driveitem-list-children
#[derive(Debug, Deserialize)]
pub struct ChildrenPage {
    #[serde(default)]
    pub value: Vec<DriveItem>,

    /// Absolute URL of the next page
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

/// Graph `driveItem` resource
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveItem {
    pub id: String,
    pub name: String,
    pub size: Option<u64>,

    /// Present only for files
    pub file: Option<FileFacet>,

    /// Present only for folders
    pub folder: Option<serde_json::Value>,

    pub photo: Option<PhotoFacet>,
    pub file_system_info: Option<FileSystemInfo>,

    /// RFC 3339
    pub last_modified_date_time: Option<String>,
}

impl DriveItem {
    pub fn is_file(&self) -> bool {
        self.file.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFacet {
    pub mime_type: Option<String>,
    pub hashes: Option<Hashes>,
}

/// Content hashes. Personal accounts report `sha1Hash`; business accounts
/// may only have `quickXorHash`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hashes {
    pub sha1_hash: Option<String>,
    pub quick_xor_hash: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoFacet {
    pub taken_date_time: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSystemInfo {
    pub created_date_time: Option<String>,
    pub last_modified_date_time: Option<String>,
}

/// Graph error envelope: `{"error": {"code": ..., "message": ...}}`
#[derive(Debug, Deserialize)]
pub struct GraphErrorBody {
    pub error: GraphError,
}

#[derive(Debug, Deserialize)]
pub struct GraphError {
    pub code: Option<String>,
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_children_page() {
        let json = r#"{
            "@odata.context": "https://graph.microsoft.com/v1.0/$metadata#...",
            "value": [
                {
                    "id": "F00D!101",
                    "name": "20240301_101500.jpg",
                    "size": 2048,
                    "file": {
                        "mimeType": "image/jpeg",
                        "hashes": {"sha1Hash": "A94A8FE5CCB19BA61C4C0873D391E987982FBBD3"}
                    },
                    "photo": {"takenDateTime": "2024-03-01T10:15:00Z"},
                    "fileSystemInfo": {"lastModifiedDateTime": "2024-03-02T00:00:00Z"}
                },
                {"id": "F00D!102", "name": "Screenshots", "folder": {"childCount": 3}}
            ],
            "@odata.nextLink": "https://graph.microsoft.com/v1.0/next"
        }"#;

        let page: ChildrenPage = serde_json::from_str(json).unwrap();

        assert_eq!(page.value.len(), 2);
        assert!(page.value[0].is_file());
        assert!(!page.value[1].is_file());
        assert_eq!(
            page.value[0]
                .photo
                .as_ref()
                .and_then(|p| p.taken_date_time.as_deref()),
            Some("2024-03-01T10:15:00Z")
        );
        assert_eq!(
            page.next_link.as_deref(),
            Some("https://graph.microsoft.com/v1.0/next")
        );
    }

    #[test]
    fn test_parse_error_body() {
        let json = r#"{"error": {"code": "InvalidAuthenticationToken", "message": "Access token has expired."}}"#;
        let body: GraphErrorBody = serde_json::from_str(json).unwrap();

        assert_eq!(body.error.code.as_deref(), Some("InvalidAuthenticationToken"));
        assert_eq!(body.error.message.as_deref(), Some("Access token has expired."));
    }
}
