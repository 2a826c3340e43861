use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::batch::run_batch;
use crate::cli::ServeArgs;
use crate::constants::{BATCH_DOWNLOAD_NAME, XLSX_CONTENT_TYPE};
use crate::error::BatchError;
use crate::npi::lookup_npi;
use crate::registry::RegistryClient;
use crate::sheet::{Book, upload_extension};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RegistryClient>,
    pub batch_delay: Duration,
}

pub async fn run(opts: ServeArgs) -> anyhow::Result<()> {
    let state = AppState {
        registry: Arc::new(opts.registry.client()?),
        batch_delay: opts.registry.delay(),
    };
    tracing::info!(
        "Registry {} (version {}), batch delay {:?}",
        state.registry.base_url(),
        opts.registry.api_version,
        state.batch_delay
    );

    let app = router(state).layer(DefaultBodyLimit::max(
        opts.max_upload_mb.saturating_mul(1024 * 1024),
    ));

    let addr: SocketAddr = format!("{}:{}", opts.host, opts.port)
        .parse()
        .context("parse host:port")?;

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/lookup-single", post(lookup_single))
        .route("/lookup-batch", post(lookup_batch))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct SingleLookupRequest {
    #[serde(default)]
    npi: Option<String>,
}

async fn lookup_single(
    State(st): State<AppState>,
    Json(req): Json<SingleLookupRequest>,
) -> impl IntoResponse {
    let npi = req.npi.as_deref().map(str::trim).unwrap_or("");
    if npi.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "No NPI provided" })),
        )
            .into_response();
    }
    Json(lookup_npi(&st.registry, npi).await).into_response()
}

async fn lookup_batch(
    State(st): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, BatchError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| BatchError::Upload(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| BatchError::Upload(e.to_string()))?;
        upload = Some((file_name, bytes));
        break;
    }

    let Some((file_name, bytes)) = upload else {
        return Err(BatchError::MissingFile);
    };
    if upload_extension(&file_name).is_none() {
        tracing::warn!(file_name = file_name.as_str(), "rejected upload type");
        return Err(BatchError::BadFileType);
    }

    let book = Book::from_upload(&file_name, &bytes)?;
    tracing::info!(
        "Received {} ({} rows on sheet {:?})",
        file_name,
        book.target().row_count(),
        book.target_name()
    );
    let outcome = run_batch(&st.registry, book, st.batch_delay).await?;
    for entry in &outcome.log {
        tracing::info!(
            npi = entry.npi.as_str(),
            provider_name = entry.provider_name.as_str(),
            status = entry.status.as_str(),
            error = entry.error.as_str(),
            "batch row"
        );
    }

    let body = outcome.book.to_xlsx()?;
    Ok((
        [
            (CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{BATCH_DOWNLOAD_NAME}\""),
            ),
        ],
        [
            ("x-batch-rows", outcome.log.len().to_string()),
            ("x-batch-failed", outcome.failed_count().to_string()),
        ],
        body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeRegistry, acme_clinic};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    fn app(fake: &FakeRegistry) -> Router {
        router(AppState {
            registry: Arc::new(fake.client()),
            batch_delay: Duration::ZERO,
        })
    }

    fn single(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/lookup-single")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn upload(field: &str, file_name: &str, content: &[u8]) -> Request<Body> {
        let boundary = "npi-lookup-test-boundary";
        let mut body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/lookup-batch")
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(resp: Response) -> Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn single_lookup_returns_flat_record() {
        let fake = FakeRegistry::spawn(vec![("1487000001", acme_clinic())]).await;
        let resp = app(&fake)
            .oneshot(single(r#"{"npi": " 1487000001 "}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = json_body(resp).await;
        assert_eq!(body["provider_name"], "Acme Clinic");
        assert_eq!(body["npi_type"], "NPI-2 Organization");
        assert_eq!(body["error"], "");
    }

    #[tokio::test]
    async fn single_lookup_reports_not_found_as_data() {
        let fake = FakeRegistry::spawn(vec![]).await;
        let resp = app(&fake)
            .oneshot(single(r#"{"npi": "1999999999"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["error"], "Not found");
    }

    #[tokio::test]
    async fn single_lookup_requires_npi() {
        let fake = FakeRegistry::spawn(vec![]).await;
        for body in [r#"{}"#, r#"{"npi": "   "}"#, r#"{"npi": null}"#] {
            let resp = app(&fake).oneshot(single(body)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
            assert_eq!(json_body(resp).await["error"], "No NPI provided");
        }
        assert!(fake.requests().is_empty());
    }

    #[tokio::test]
    async fn batch_rejects_missing_file() {
        let fake = FakeRegistry::spawn(vec![]).await;
        let resp = app(&fake)
            .oneshot(upload("other", "list.csv", b"NPI\n1487000001\n"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["error"], "No file uploaded");
    }

    #[tokio::test]
    async fn batch_rejects_disallowed_extension() {
        let fake = FakeRegistry::spawn(vec![]).await;
        let resp = app(&fake)
            .oneshot(upload("file", "list.txt", b"NPI\n1487000001\n"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(resp).await["error"],
            "Please upload an .xlsx, .xls, or .csv file"
        );
        assert!(fake.requests().is_empty());
    }

    #[tokio::test]
    async fn batch_rejects_sheet_without_npis() {
        let fake = FakeRegistry::spawn(vec![]).await;
        let resp = app(&fake)
            .oneshot(upload("file", "list.csv", b"NPI\n\n"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(resp).await["error"],
            "No NPI numbers found in Column A starting from row 2"
        );
        assert!(fake.requests().is_empty());
    }

    #[tokio::test]
    async fn batch_rejects_unreadable_workbook() {
        let fake = FakeRegistry::spawn(vec![]).await;
        let resp = app(&fake)
            .oneshot(upload("file", "list.xlsx", b"definitely not a workbook"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let message = json_body(resp).await["error"].as_str().unwrap().to_string();
        assert!(message.starts_with("Could not read spreadsheet"));
    }

    #[tokio::test]
    async fn batch_returns_annotated_workbook() {
        let fake = FakeRegistry::spawn(vec![("1487000001", acme_clinic())]).await;
        let resp = app(&fake)
            .oneshot(upload("file", "list.csv", b"NPI\n1487000001\n1999999999\n"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[CONTENT_TYPE], XLSX_CONTENT_TYPE);
        assert_eq!(
            resp.headers()[CONTENT_DISPOSITION],
            "attachment; filename=\"NPI_List_Full_Data.xlsx\""
        );
        assert_eq!(resp.headers()["x-batch-rows"], "2");
        assert_eq!(resp.headers()["x-batch-failed"], "1");

        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let book = Book::from_upload("result.xlsx", &bytes).unwrap();
        assert_eq!(book.sheet_names(), vec!["Sheet1"]);
        let sheet = book.target();
        assert_eq!(sheet.row_count(), 3);
        assert_eq!(sheet.get(1, 2), "NPI (Registry Confirmed)");
        assert_eq!(sheet.get(2, 6), "Acme Clinic");
        assert_eq!(sheet.get(3, 1), "1999999999");
        assert_eq!(sheet.get(3, 6), "");
    }

    #[tokio::test]
    async fn health_is_ok() {
        let fake = FakeRegistry::spawn(vec![]).await;
        let resp = app(&fake)
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["status"], "ok");
    }
}
