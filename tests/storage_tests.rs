mod common;

use common::{remote_dir, remote_doc, NOW};
use panpost::config::BaiduConfig;
use panpost::storage::baidu::{
    check_errno, parse_download_link, parse_listing, parse_token_response, resolve_folder,
    save_body, BaiduPanClient, APP_ROOT,
};
use panpost::storage::{folder_documents, StorageError};

#[test]
fn test_folder_documents_filters_by_type() {
    let files = vec![
        remote_dir("archive.docx", 10),
        remote_dir("archive", 10),
        remote_doc("report.pdf", 10),
        remote_doc("notes.docx", 10),
        remote_doc("sales.xlsx", 10),
        remote_doc("notes.docx.bak", 10),
    ];

    let kept: Vec<String> = folder_documents(files)
        .into_iter()
        .map(|f| f.name)
        .collect();
    assert_eq!(kept, vec!["notes.docx", "sales.xlsx"]);
}

#[test]
fn test_freshness_is_inclusive() {
    assert!(remote_doc("a.docx", 599).is_fresh(NOW, 600));
    assert!(remote_doc("a.docx", 600).is_fresh(NOW, 600));
    assert!(!remote_doc("a.docx", 601).is_fresh(NOW, 600));
    // Server clock ahead of ours.
    assert!(remote_doc("a.docx", -30).is_fresh(NOW, 600));
    assert_eq!(remote_doc("a.docx", 42).age(NOW), 42);
}

#[test]
fn test_title_strips_extension_only() {
    assert_eq!(remote_doc("q3.docx", 0).title(), "q3");
    assert_eq!(remote_doc("2024.sales.xlsx", 0).title(), "2024.sales");
    assert_eq!(remote_doc("季度报告.docx", 0).title(), "季度报告");
}

#[test]
fn test_parse_listing() {
    let json = serde_json::json!({
        "errno": 0,
        "has_more": 0,
        "cursor": 3,
        "list": [
            {
                "fs_id": 1001,
                "path": "/apps/bypy/inbox/q3.docx",
                "server_filename": "q3.docx",
                "isdir": 0,
                "server_ctime": 1760000000,
                "size": 2048
            },
            {
                "fs_id": 1002,
                "path": "/apps/bypy/inbox/old",
                "server_filename": "old",
                "isdir": 1,
                "server_ctime": 1700000000
            }
        ]
    });

    let (files, has_more, cursor) = parse_listing(&json).unwrap();
    assert!(!has_more);
    assert_eq!(cursor, 3);
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].fs_id, 1001);
    assert_eq!(files[0].name, "q3.docx");
    assert_eq!(files[0].path, "/apps/bypy/inbox/q3.docx");
    assert!(!files[0].is_directory);
    assert_eq!(files[0].creation_timestamp, 1_760_000_000);
    assert_eq!(files[0].size, 2048);
    assert!(files[1].is_directory);
    assert_eq!(files[1].size, 0);
}

#[test]
fn test_parse_listing_has_more() {
    let json = serde_json::json!({ "errno": 0, "has_more": 1, "cursor": 1000, "list": [] });
    let (files, has_more, cursor) = parse_listing(&json).unwrap();
    assert!(files.is_empty());
    assert!(has_more);
    assert_eq!(cursor, 1000);
}

#[test]
fn test_parse_listing_api_error() {
    let json = serde_json::json!({ "errno": -7, "request_id": 123 });
    let err = parse_listing(&json).unwrap_err();
    assert!(matches!(err, StorageError::Api { errno: -7, .. }));
}

#[test]
fn test_parse_listing_missing_list() {
    let json = serde_json::json!({ "errno": 0 });
    assert!(matches!(
        parse_listing(&json),
        Err(StorageError::Malformed { .. })
    ));
}

#[test]
fn test_check_errno() {
    assert!(check_errno(&serde_json::json!({ "errno": 0 }), "filemanager").is_ok());
    assert!(check_errno(&serde_json::json!({ "info": [] }), "filemanager").is_ok());
    let err = check_errno(&serde_json::json!({ "errno": 12 }), "filemanager").unwrap_err();
    assert_eq!(err.to_string(), "Baidu Pan API error on filemanager: errno 12");
}

#[test]
fn test_parse_download_link() {
    let json = serde_json::json!({
        "errno": 0,
        "list": [
            { "fs_id": 7, "dlink": "https://d.pcs.baidu.com/file/other?fid=7" },
            { "fs_id": 1001, "dlink": "https://d.pcs.baidu.com/file/abc?fid=1001" }
        ]
    });
    assert_eq!(
        parse_download_link(&json, 1001).unwrap(),
        "https://d.pcs.baidu.com/file/abc?fid=1001"
    );
    assert!(parse_download_link(&json, 42).is_err());
}

#[test]
fn test_parse_token_response() {
    let json = serde_json::json!({
        "access_token": "121.new-access",
        "refresh_token": "122.new-refresh",
        "expires_in": 2592000
    });
    let (access, refresh) = parse_token_response(&json).unwrap();
    assert_eq!(access, "121.new-access");
    assert_eq!(refresh, "122.new-refresh");

    let json = serde_json::json!({
        "error": "expired_token",
        "error_description": "refresh token has been used"
    });
    let err = parse_token_response(&json).unwrap_err();
    assert!(err.to_string().contains("expired_token"));
}

#[test]
fn test_resolve_folder() {
    assert_eq!(resolve_folder("inbox"), format!("{APP_ROOT}/inbox"));
    assert_eq!(resolve_folder("inbox/"), format!("{APP_ROOT}/inbox"));
    assert_eq!(resolve_folder(""), APP_ROOT);
    assert_eq!(resolve_folder("/docs/incoming/"), "/docs/incoming");
    assert_eq!(resolve_folder("/"), "/");
}

#[test]
fn test_client_keeps_credentials() {
    let client = BaiduPanClient::new(BaiduConfig {
        api_key: "key".to_string(),
        secret_key: "secret".to_string(),
        access_token: "access".to_string(),
        refresh_token: "refresh".to_string(),
    });
    assert_eq!(client.credentials().api_key, "key");
    assert_eq!(client.credentials().access_token, "access");
}

#[test]
fn test_expired_token_errnos() {
    let expired = |errno| StorageError::Api {
        endpoint: "listall".to_string(),
        errno,
    };
    assert!(expired(111).is_expired_token());
    assert!(expired(-6).is_expired_token());
    assert!(!expired(-7).is_expired_token());
    assert!(!expired(31066).is_expired_token());
    let malformed = StorageError::Malformed {
        endpoint: "listall".to_string(),
        detail: "errno 111".to_string(),
    };
    assert!(!malformed.is_expired_token());
}

#[test]
fn test_save_body_writes_whole_file() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("q3.docx");
    let body = vec![7u8; 20_000];

    let written = save_body(&mut body.as_slice(), &dest).unwrap();
    assert_eq!(written, 20_000);
    assert_eq!(std::fs::read(&dest).unwrap(), body);
}

#[cfg(target_os = "linux")]
#[test]
fn test_save_body_reports_failed_flush() {
    // Small enough to sit in the write buffer until the final flush.
    let body = vec![1u8; 3 * 1024];
    let result = save_body(&mut body.as_slice(), std::path::Path::new("/dev/full"));
    assert!(result.is_err());
}
