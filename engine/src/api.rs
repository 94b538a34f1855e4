// --- Local JSON API ------------------------------------------------------
//
// Thin axum layer over `Panel`. Handlers decode the request, call exactly one
// panel operation and encode the answer. Local validation failures come back
// as 400, device failures as 502, both as `{"ok": false, "error": "..."}`.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::device::{DeviceApi, UploadFile};
use crate::error::PanelError;
use crate::frequency::FrequencyWidget;
use crate::panel::{Panel, PanelSnapshot};
use crate::registry::Channel;
use crate::reorder::{ItemBox, RowLayout};
use crate::upload::{UploadBatch, UploadMode};

/// Multipart bodies larger than this are refused before any upload starts.
pub const UPLOAD_BODY_LIMIT: usize = 32 * 1024 * 1024;

type ApiError = (StatusCode, Json<serde_json::Value>);
type ApiResult = Result<Json<serde_json::Value>, ApiError>;

fn bad_request(message: impl std::fmt::Display) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"ok": false, "error": message.to_string()})),
    )
}

fn api_error(e: PanelError) -> ApiError {
    let status = match e {
        PanelError::Rejected(_) => StatusCode::BAD_REQUEST,
        PanelError::Device(_) => StatusCode::BAD_GATEWAY,
        PanelError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({"ok": false, "error": e.to_string()})))
}

pub fn build_router<D: DeviceApi>(panel: Panel<D>) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/v1/panel", get(api_panel::<D>))
        .route("/api/v1/files/reload", post(api_files_reload::<D>))
        .route("/api/v1/files/select", post(api_files_select::<D>))
        .route("/api/v1/files/channel", post(api_files_channel::<D>))
        .route("/api/v1/files/delete", post(api_files_delete::<D>))
        .route("/api/v1/files/reorder", post(api_files_reorder::<D>))
        .route("/api/v1/drag/start", post(api_drag_start::<D>))
        .route("/api/v1/drag/over", post(api_drag_over::<D>))
        .route("/api/v1/drag/end", post(api_drag_end::<D>))
        .route(
            "/api/v1/upload",
            post(api_upload_start::<D>)
                .get(api_upload_status::<D>)
                .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route("/api/v1/process", post(api_process::<D>))
        .route("/api/v1/play", post(api_play::<D>))
        .route("/api/v1/frequency/toggle", post(api_frequency_toggle::<D>))
        .route("/api/v1/frequency/save", post(api_frequency_save::<D>))
        .layer(TraceLayer::new_for_http())
        .with_state(panel)
}

async fn api_panel<D: DeviceApi>(State(panel): State<Panel<D>>) -> Json<PanelSnapshot> {
    Json(panel.snapshot().await)
}

// --- files ---------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SelectReq {
    name: String,
    selected: bool,
}

#[derive(Debug, Deserialize)]
struct ChannelReq {
    name: String,
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct NameReq {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ReorderReq {
    order: Vec<String>,
}

async fn api_files_reload<D: DeviceApi>(State(panel): State<Panel<D>>) -> ApiResult {
    let count = panel.load().await.map_err(api_error)?;
    Ok(Json(json!({"ok": true, "count": count})))
}

async fn api_files_select<D: DeviceApi>(
    State(panel): State<Panel<D>>,
    Json(req): Json<SelectReq>,
) -> Json<serde_json::Value> {
    // Unknown names are a no-op, not an error.
    let changed = panel.set_selected(&req.name, req.selected).await;
    Json(json!({"ok": true, "changed": changed}))
}

async fn api_files_channel<D: DeviceApi>(
    State(panel): State<Panel<D>>,
    Json(req): Json<ChannelReq>,
) -> Json<serde_json::Value> {
    let changed = panel.set_channel(&req.name, req.channel).await;
    Json(json!({"ok": true, "changed": changed}))
}

async fn api_files_delete<D: DeviceApi>(
    State(panel): State<Panel<D>>,
    Json(req): Json<NameReq>,
) -> ApiResult {
    panel.remove(&req.name).await.map_err(api_error)?;
    Ok(Json(json!({"ok": true})))
}

async fn api_files_reorder<D: DeviceApi>(
    State(panel): State<Panel<D>>,
    Json(req): Json<ReorderReq>,
) -> Json<serde_json::Value> {
    let order = panel.reorder(&req.order).await;
    Json(json!({"ok": true, "order": order}))
}

// --- drag and drop -------------------------------------------------------

#[derive(Debug, Deserialize)]
struct DragStartReq {
    name: String,
    top: Option<f64>,
    row_height: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DragOverReq {
    pointer_y: f64,
    #[serde(default)]
    items: Option<Vec<ItemBox>>,
}

async fn api_drag_start<D: DeviceApi>(
    State(panel): State<Panel<D>>,
    Json(req): Json<DragStartReq>,
) -> ApiResult {
    let defaults = RowLayout::default();
    let layout = RowLayout {
        top: req.top.unwrap_or(defaults.top),
        row_height: req.row_height.filter(|h| *h > 0.0).unwrap_or(defaults.row_height),
    };
    let order = panel.begin_drag(&req.name, layout).await.map_err(api_error)?;
    Ok(Json(json!({"ok": true, "order": order})))
}

async fn api_drag_over<D: DeviceApi>(
    State(panel): State<Panel<D>>,
    Json(req): Json<DragOverReq>,
) -> ApiResult {
    let order = panel
        .drag_over(req.pointer_y, req.items.as_deref())
        .await
        .map_err(api_error)?;
    Ok(Json(json!({"ok": true, "order": order})))
}

async fn api_drag_end<D: DeviceApi>(State(panel): State<Panel<D>>) -> ApiResult {
    let order = panel.end_drag().await.map_err(api_error)?;
    Ok(Json(json!({"ok": true, "order": order})))
}

// --- uploads -------------------------------------------------------------

async fn api_upload_start<D: DeviceApi>(
    State(panel): State<Panel<D>>,
    mut multipart: Multipart,
) -> ApiResult {
    let mut mode = UploadMode::default();
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "mode" => {
                let text = field.text().await.map_err(bad_request)?;
                mode = text.parse().map_err(bad_request)?;
            }
            "file" => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .filter(|n| !n.trim().is_empty())
                    .ok_or_else(|| bad_request("file part without a file name"))?;
                let data = field.bytes().await.map_err(bad_request)?;
                files.push(UploadFile::new(file_name, data));
            }
            _ => {}
        }
    }

    if files.is_empty() {
        return Err(bad_request("No files chosen."));
    }

    let count = files.len();
    let batch = panel.start_upload(files, mode);
    Ok(Json(json!({"ok": true, "batch": batch, "mode": mode, "count": count})))
}

async fn api_upload_status<D: DeviceApi>(State(panel): State<Panel<D>>) -> Json<Option<UploadBatch>> {
    Json(panel.upload_status())
}

// --- processing and playback ---------------------------------------------

async fn api_process<D: DeviceApi>(State(panel): State<Panel<D>>) -> ApiResult {
    let results = panel.process().await.map_err(api_error)?;
    Ok(Json(json!({"ok": true, "results": results})))
}

async fn api_play<D: DeviceApi>(State(panel): State<Panel<D>>) -> ApiResult {
    let message = panel.play().await.map_err(api_error)?;
    Ok(Json(json!({"ok": true, "message": message})))
}

// --- frequency -----------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FrequencySaveReq {
    input: String,
}

async fn api_frequency_toggle<D: DeviceApi>(State(panel): State<Panel<D>>) -> Json<FrequencyWidget> {
    Json(panel.toggle_frequency().await)
}

async fn api_frequency_save<D: DeviceApi>(
    State(panel): State<Panel<D>>,
    Json(req): Json<FrequencySaveReq>,
) -> ApiResult {
    let hz = panel.save_frequency(&req.input).await.map_err(api_error)?;
    Ok(Json(json!({"ok": true, "frequency": hz})))
}
