//! Tests for DriveClient with mocked HTTP responses.

use chrono::{Duration, Utc};
use gdrive_mcp::error::{DriveError, Operation};
use gdrive_mcp::{Credential, DriveClient};
use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;

fn client_for(server: &ServerGuard) -> DriveClient {
    let credential = Credential::new("test-access", Some(Utc::now() + Duration::hours(1)));
    DriveClient::new(credential).with_base_url(server.url())
}

mod search {
    use super::*;

    #[tokio::test]
    async fn returns_files_in_order_with_narrowed_fields() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/files")
            .match_header("authorization", "Bearer test-access")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded(
                    "q".into(),
                    "name contains 'budget' and trashed = false".into(),
                ),
                Matcher::UrlEncoded("pageSize".into(), "10".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "files": [
                        {
                            "id": "f2",
                            "name": "budget-2025.xlsx",
                            "mimeType": "application/vnd.ms-excel",
                            "webViewLink": "https://drive.google.com/file/d/f2/view",
                            "size": "2048",
                            "owners": [{"displayName": "Ana"}]
                        },
                        {
                            "id": "f1",
                            "name": "budget-2024.xlsx",
                            "mimeType": "application/vnd.ms-excel",
                            "webViewLink": "https://drive.google.com/file/d/f1/view",
                            "md5Checksum": "abc"
                        }
                    ]
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let result = client_for(&server).search("budget", 10, None).await.unwrap();

        assert_eq!(result.files.len(), 2);
        assert_eq!(result.files[0].id, "f2");
        assert_eq!(result.files[1].id, "f1");
        assert!(result.next_page_token.is_none());

        let out = serde_json::to_value(&result.files[0]).unwrap();
        let mut keys: Vec<&str> = out.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["id", "mimeType", "name", "webViewLink"]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn page_token_passed_through() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/files")
            .match_query(Matcher::UrlEncoded("pageToken".into(), "tok-2".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"files": [], "nextPageToken": "tok-3"}).to_string())
            .expect(1)
            .create_async()
            .await;

        let result = client_for(&server)
            .search("report", 5, Some("tok-2"))
            .await
            .unwrap();

        assert!(result.files.is_empty());
        assert_eq!(result.next_page_token.as_deref(), Some("tok-3"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn no_page_token_sent_when_absent() {
        let mut server = Server::new_async().await;
        let with_token = server
            .mock("GET", "/files")
            .match_query(Matcher::Regex("pageToken=".into()))
            .expect(0)
            .create_async()
            .await;
        let without_token = server
            .mock("GET", "/files")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"files": [{"id": "a", "name": "report.txt", "mimeType": "text/plain"}]}).to_string())
            .expect(1)
            .create_async()
            .await;

        let result = client_for(&server).search("report", 5, None).await.unwrap();

        assert_eq!(result.files.len(), 1);
        assert_eq!(result.files[0].web_view_link, None);
        with_token.assert_async().await;
        without_token.assert_async().await;
    }

    #[tokio::test]
    async fn page_size_clamped() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/files")
            .match_query(Matcher::UrlEncoded("pageSize".into(), "1000".into()))
            .with_status(200)
            .with_body(json!({"files": []}).to_string())
            .expect(1)
            .create_async()
            .await;

        client_for(&server).search("x", 5000, None).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn api_error_wrapped_with_query() {
        let mut server = Server::new_async().await;
        let _list = server
            .mock("GET", "/files")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"error": {"code": 403, "message": "Insufficient Permission"}}).to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let err = client_for(&server).search("budget", 10, None).await.unwrap_err();

        assert_eq!(err.operation, Operation::Search);
        assert!(err.params.contains("budget"));
        assert!(matches!(err.source, DriveError::ApiError { status: 403, .. }));
        assert!(err.to_string().contains("Insufficient Permission"));
    }
}

mod fetch_file {
    use super::*;

    async fn mock_metadata(server: &mut ServerGuard) -> mockito::Mock {
        server
            .mock("GET", "/files/abc123")
            .match_query(Matcher::UrlEncoded(
                "fields".into(),
                "id, name, mimeType, webViewLink".into(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "id": "abc123",
                    "name": "notes.txt",
                    "mimeType": "text/plain",
                    "webViewLink": "https://drive.google.com/file/d/abc123/view",
                    "size": "10"
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await
    }

    async fn mock_chunk(
        server: &mut ServerGuard,
        range: &str,
        content_range: &str,
        body: &'static [u8],
    ) -> mockito::Mock {
        server
            .mock("GET", "/files/abc123")
            .match_query(Matcher::UrlEncoded("alt".into(), "media".into()))
            .match_header("range", range)
            .with_status(206)
            .with_header("content-range", content_range)
            .with_body(body)
            .expect(1)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn chunks_concatenated_in_order() {
        let mut server = Server::new_async().await;
        let metadata = mock_metadata(&mut server).await;
        let c1 = mock_chunk(&mut server, "bytes=0-3", "bytes 0-3/10", b"abcd").await;
        let c2 = mock_chunk(&mut server, "bytes=4-7", "bytes 4-7/10", b"efgh").await;
        let c3 = mock_chunk(&mut server, "bytes=8-11", "bytes 8-9/10", b"ij").await;

        let file = client_for(&server)
            .with_chunk_size(4)
            .fetch_file("abc123")
            .await
            .unwrap();

        assert_eq!(file.content.len(), 4 + 4 + 2);
        assert!(file.content.starts_with(b"abcd"));
        assert!(file.content.ends_with(b"ij"));
        assert_eq!(file.content, b"abcdefghij");
        assert_eq!(file.metadata.name, "notes.txt");

        metadata.assert_async().await;
        c1.assert_async().await;
        c2.assert_async().await;
        c3.assert_async().await;
    }

    #[tokio::test]
    async fn whole_body_when_range_ignored() {
        let mut server = Server::new_async().await;
        let metadata = mock_metadata(&mut server).await;
        let media = server
            .mock("GET", "/files/abc123")
            .match_query(Matcher::UrlEncoded("alt".into(), "media".into()))
            .with_status(200)
            .with_body("abcdefghij")
            .expect(1)
            .create_async()
            .await;

        let file = client_for(&server)
            .with_chunk_size(4)
            .fetch_file("abc123")
            .await
            .unwrap();

        assert_eq!(file.content, b"abcdefghij");
        metadata.assert_async().await;
        media.assert_async().await;
    }

    #[tokio::test]
    async fn empty_file_completes() {
        let mut server = Server::new_async().await;
        let _metadata = mock_metadata(&mut server).await;
        let _media = server
            .mock("GET", "/files/abc123")
            .match_query(Matcher::UrlEncoded("alt".into(), "media".into()))
            .with_status(416)
            .with_header("content-range", "bytes */0")
            .expect(1)
            .create_async()
            .await;

        let file = client_for(&server).fetch_file("abc123").await.unwrap();
        assert!(file.content.is_empty());
    }

    #[tokio::test]
    async fn unknown_total_exact_multiple_completes_on_416() {
        let mut server = Server::new_async().await;
        let metadata = mock_metadata(&mut server).await;
        let first = mock_chunk(&mut server, "bytes=0-3", "bytes 0-3/*", b"abcd").await;
        let past_end = server
            .mock("GET", "/files/abc123")
            .match_query(Matcher::UrlEncoded("alt".into(), "media".into()))
            .match_header("range", "bytes=4-7")
            .with_status(416)
            .with_header("content-range", "bytes */4")
            .expect(1)
            .create_async()
            .await;

        let file = client_for(&server)
            .with_chunk_size(4)
            .fetch_file("abc123")
            .await
            .unwrap();

        assert_eq!(file.content, b"abcd");
        metadata.assert_async().await;
        first.assert_async().await;
        past_end.assert_async().await;
    }

    #[tokio::test]
    async fn range_past_known_length_is_an_error() {
        let mut server = Server::new_async().await;
        let _metadata = mock_metadata(&mut server).await;
        let _first = mock_chunk(&mut server, "bytes=0-3", "bytes 0-3/*", b"abcd").await;
        let _past_end = server
            .mock("GET", "/files/abc123")
            .match_query(Matcher::UrlEncoded("alt".into(), "media".into()))
            .match_header("range", "bytes=4-7")
            .with_status(416)
            .with_header("content-range", "bytes */10")
            .expect(1)
            .create_async()
            .await;

        let err = client_for(&server)
            .with_chunk_size(4)
            .fetch_file("abc123")
            .await
            .unwrap_err();

        assert!(matches!(err.source, DriveError::ApiError { status: 416, .. }));
    }

    #[tokio::test]
    async fn failed_chunk_discards_content() {
        let mut server = Server::new_async().await;
        let _metadata = mock_metadata(&mut server).await;
        let _first = mock_chunk(&mut server, "bytes=0-3", "bytes 0-3/10", b"abcd").await;
        let _second = server
            .mock("GET", "/files/abc123")
            .match_query(Matcher::UrlEncoded("alt".into(), "media".into()))
            .match_header("range", "bytes=4-7")
            .with_status(500)
            .with_body("backend error")
            .expect(1)
            .create_async()
            .await;

        let err = client_for(&server)
            .with_chunk_size(4)
            .fetch_file("abc123")
            .await
            .unwrap_err();

        assert_eq!(err.operation, Operation::Download);
        assert!(err.params.contains("abc123"));
        assert!(matches!(err.source, DriveError::ApiError { status: 500, .. }));
    }

    #[tokio::test]
    async fn short_chunk_is_protocol_error() {
        let mut server = Server::new_async().await;
        let _metadata = mock_metadata(&mut server).await;
        let _chunk = mock_chunk(&mut server, "bytes=0-3", "bytes 0-3/10", b"ab").await;

        let err = client_for(&server)
            .with_chunk_size(4)
            .fetch_file("abc123")
            .await
            .unwrap_err();

        assert!(matches!(err.source, DriveError::ProtocolError(_)));
    }

    #[tokio::test]
    async fn metadata_failure_skips_download() {
        let mut server = Server::new_async().await;
        let _metadata = server
            .mock("GET", "/files/missing")
            .match_query(Matcher::UrlEncoded(
                "fields".into(),
                "id, name, mimeType, webViewLink".into(),
            ))
            .with_status(404)
            .with_body(json!({"error": {"code": 404, "message": "File not found: missing."}}).to_string())
            .expect(1)
            .create_async()
            .await;
        let media = server
            .mock("GET", "/files/missing")
            .match_query(Matcher::UrlEncoded("alt".into(), "media".into()))
            .expect(0)
            .create_async()
            .await;

        let err = client_for(&server).fetch_file("missing").await.unwrap_err();

        assert_eq!(err.operation, Operation::GetMetadata);
        assert!(err.to_string().contains("File not found"));
        media.assert_async().await;
    }
}
