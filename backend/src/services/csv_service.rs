use axum::{
    extract::{Multipart, Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use shared::validation::validate_object_name;
use tracing::{error, info};

use crate::error::AppError;
use crate::AppState;

const UPLOAD_FIELD: &str = "csvfile";
const STORAGE_MISCONFIGURED: &str = "Server misconfigured: missing Supabase environment variables";

#[derive(Serialize)]
pub struct UploadResponse {
    pub filename: String,
}

#[derive(Deserialize)]
pub struct WriteCsvRequest {
    pub filename: Option<String>,
    pub data: Option<Vec<Map<String, Value>>>,
    pub headers: Option<Vec<String>>,
}

/// Header row plus one line per row; every cell is JSON-encoded and missing cells become `""`.
pub fn build_csv(headers: &[String], rows: &[Map<String, Value>]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(headers.join(","));
    for row in rows {
        let cells: Vec<String> = headers
            .iter()
            .map(|h| match row.get(h) {
                None | Some(Value::Null) => "\"\"".to_string(),
                Some(value) => value.to_string(),
            })
            .collect();
        lines.push(cells.join(","));
    }
    lines.join("\n")
}

/// Parses a CSV document with a header row into one JSON object per record.
pub fn parse_csv(bytes: &[u8]) -> Result<Vec<Map<String, Value>>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);
    let headers = reader.headers()?.clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.to_string(), Value::String(v.to_string())))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

fn checked_name(name: &str) -> Result<(), AppError> {
    validate_object_name(name).map_err(|e| {
        AppError::BadRequest(e.message.map(|m| m.to_string()).unwrap_or_else(|| e.code.to_string()))
    })
}

pub async fn upload_csv(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Malformed upload: {}", e)))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().unwrap_or("text/csv").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Malformed upload: {}", e)))?;
        upload = Some((filename, content_type, bytes));
        break;
    }

    let (filename, content_type, bytes) = match upload {
        Some((Some(filename), content_type, bytes)) if !filename.is_empty() => (filename, content_type, bytes),
        _ => return Err(AppError::BadRequest("No file uploaded".to_string())),
    };
    checked_name(&filename)?;

    let storage = state.storage(STORAGE_MISCONFIGURED)?;
    storage
        .upload_object(&filename, bytes.to_vec(), &content_type)
        .await
        .map_err(|e| {
            error!("Upload of {} failed: {}", filename, e);
            AppError::Internal(format!("Upload failed: {}", e))
        })?;

    info!("📄 Uploaded {} ({} bytes)", filename, bytes.len());
    Ok(Json(UploadResponse { filename }))
}

pub async fn read_csv(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Json<Vec<Map<String, Value>>>, AppError> {
    checked_name(&filename)?;
    let storage = state.storage(STORAGE_MISCONFIGURED)?;

    let bytes = storage.download_object(&filename).await.map_err(|e| {
        info!("Read of {} failed: {}", filename, e);
        AppError::NotFound("CSV not found".to_string())
    })?;

    let rows = parse_csv(&bytes).map_err(|e| {
        error!("Failed to parse {}: {}", filename, e);
        AppError::Internal("Error reading CSV".to_string())
    })?;
    Ok(Json(rows))
}

pub async fn write_csv(
    State(state): State<AppState>,
    payload: Option<Json<WriteCsvRequest>>,
) -> Result<&'static str, AppError> {
    let missing = || AppError::BadRequest("Missing data".to_string());
    let Json(request) = payload.ok_or_else(missing)?;
    let filename = request.filename.filter(|f| !f.is_empty()).ok_or_else(missing)?;
    let data = request.data.ok_or_else(missing)?;
    let headers = request.headers.ok_or_else(missing)?;
    checked_name(&filename)?;

    let storage = state.storage(STORAGE_MISCONFIGURED)?;
    let document = build_csv(&headers, &data);
    storage
        .upload_object(&filename, document.into_bytes(), "text/csv")
        .await
        .map_err(|e| {
            error!("Writing {} failed: {}", filename, e);
            AppError::Internal(format!("Error writing CSV: {}", e))
        })?;

    info!("📝 Wrote {} rows to {}", data.len(), filename);
    Ok("CSV written successfully")
}

pub async fn download_csv(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    checked_name(&filename)?;
    let storage = state.storage(STORAGE_MISCONFIGURED)?;

    let bytes = storage.download_object(&filename).await.map_err(|e| {
        info!("Download of {} failed: {}", filename, e);
        AppError::NotFound("CSV not found".to_string())
    })?;

    let disposition = format!("attachment; filename=\"{}\"", filename.replace('"', ""));
    Ok((
        [
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_TYPE, "text/csv".to_string()),
        ],
        bytes,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{body_string, memory_app, unconfigured_app};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_build_csv_json_encodes_cells() {
        let headers = vec!["name".to_string(), "qty".to_string(), "note".to_string()];
        let rows = vec![
            object(json!({"name": "Asha", "qty": 2, "note": null})),
            object(json!({"name": "Ravi, Jr."})),
        ];
        assert_eq!(
            build_csv(&headers, &rows),
            "name,qty,note\n\"Asha\",2,\"\"\n\"Ravi, Jr.\",\"\",\"\""
        );
    }

    #[test]
    fn test_parse_csv_uses_header_row() {
        let rows = parse_csv(b"name,qty\n\"Ravi, Jr.\",3\nAsha,1\n").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], "Ravi, Jr.");
        assert_eq!(rows[0]["qty"], "3");
        assert_eq!(rows[1]["name"], "Asha");
    }

    #[test]
    fn test_written_csv_reads_back() {
        let headers = vec!["name".to_string(), "city".to_string()];
        let rows = vec![object(json!({"name": "Asha", "city": "Pune"}))];
        let parsed = parse_csv(build_csv(&headers, &rows).as_bytes()).unwrap();
        assert_eq!(parsed[0]["name"], "Asha");
        assert_eq!(parsed[0]["city"], "Pune");
    }

    fn multipart_request(uri: &str, field: &str, filename: &str, contents: &str) -> Request<Body> {
        let body = format!(
            "--BOUNDARY\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: text/csv\r\n\r\n{}\r\n--BOUNDARY--\r\n",
            field, filename, contents
        );
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "multipart/form-data; boundary=BOUNDARY")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_upload_then_read_and_download() {
        let app = memory_app(0);

        let response = app
            .clone()
            .oneshot(multipart_request("/upload-csv", "csvfile", "orders.csv", "name,qty\nAsha,1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, r#"{"filename":"orders.csv"}"#);

        let response = app
            .clone()
            .oneshot(Request::get("/api/read-csv/orders.csv").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, r#"[{"name":"Asha","qty":"1"}]"#);

        let response = app
            .oneshot(Request::get("/download-csv/orders.csv").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"orders.csv\""
        );
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv");
        assert_eq!(body_string(response).await, "name,qty\nAsha,1");
    }

    #[tokio::test]
    async fn test_upload_without_file_is_rejected() {
        let response = memory_app(0)
            .oneshot(multipart_request("/upload-csv", "other", "orders.csv", "a"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_string(response).await, "No file uploaded");
    }

    #[tokio::test]
    async fn test_missing_csv_is_not_found() {
        let response = memory_app(0)
            .oneshot(Request::get("/read-csv/missing.csv").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_string(response).await, "CSV not found");
    }

    #[tokio::test]
    async fn test_write_csv_round_trip() {
        let app = memory_app(0);
        let payload = json!({
            "filename": "leads.csv",
            "headers": ["name", "contact"],
            "data": [{"name": "Asha", "contact": "9876543210"}]
        });
        let response = app
            .clone()
            .oneshot(
                Request::post("/write-csv")
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "CSV written successfully");

        let response = app
            .oneshot(Request::get("/download-csv/leads.csv").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_string(response).await, "name,contact\n\"Asha\",\"9876543210\"");
    }

    #[tokio::test]
    async fn test_write_csv_requires_all_fields() {
        let response = memory_app(0)
            .oneshot(
                Request::post("/write-csv")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({"filename": "x.csv", "data": []}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_string(response).await, "Missing data");
    }

    #[tokio::test]
    async fn test_storage_routes_report_misconfiguration() {
        let response = unconfigured_app()
            .oneshot(Request::get("/read-csv/orders.csv").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_string(response).await, STORAGE_MISCONFIGURED);
    }
}
