use axum::{
    Json, Router,
    extract::{Multipart, Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};

use crate::analysis::{AnalysisError, AnalysisOptions, run_analysis};
use crate::config::Config;
use crate::login;
use crate::store::UserStore;

const PORT: u16 = 5000;
const DIST_DIR: &str = "dist";

/// Shared application state handed to every handler
pub struct AppState {
    /// User document store
    pub store: UserStore,

    /// Runtime configuration
    pub config: Config,
}

#[derive(Deserialize)]
struct EmailQuery {
    email: Option<String>,
}

/// Build the router and serve the dashboard until the process is stopped
pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    fs::create_dir_all(&config.uploads_dir)?;
    let store = UserStore::open(&config.database_path)?;
    let slot_count = config.slot_count;
    let state = Arc::new(AppState { store, config });

    // Build router
    let mut app = Router::new()
        .route("/login", post(login::handle_login))
        .route("/signup", post(login::handle_signup))
        .route("/upload-file", post(upload_file))
        .route("/upload-multiple", post(upload_multiple))
        .route("/profileImage", get(profile_image));

    // One route per configured result slot, same count the sync pass uses
    for slot in 1..=slot_count {
        app = app.route(
            &format!("/userResult{}", slot),
            get(move |query: Query<EmailQuery>, state: State<Arc<AppState>>| {
                user_result(slot, query, state)
            }),
        );
    }

    // Serve the built SPA; unknown paths fall back to index.html for client routing
    let spa =
        ServeDir::new(DIST_DIR).not_found_service(ServeFile::new(format!("{}/index.html", DIST_DIR)));
    let app = app
        .fallback_service(spa)
        .layer(CorsLayer::permissive())
        .with_state(state);

    // Start server
    let listener = TcpListener::bind(("0.0.0.0", PORT)).await?;
    println!("Server is running at http://localhost:{}", PORT);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Accept one capture file and run every analysis script against it
async fn upload_file(State(state): State<Arc<AppState>>, mut multipart: Multipart) -> Response {
    // Pull the uploaded file out of the form
    let mut original_name = String::new();
    let mut file_data = Vec::new();

    while let Some(field) = multipart.next_field().await.unwrap_or(None) {
        if field.file_name().is_some() {
            original_name = field.file_name().unwrap_or("capture.pcapng").to_string();
            file_data = field.bytes().await.unwrap_or_default().to_vec();
            break;
        }
    }

    if file_data.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "No file uploaded." })),
        )
            .into_response();
    }

    // Timestamp prefix keeps repeated uploads of the same capture apart
    let stored_name = format!("{}-{}", Utc::now().timestamp_millis(), original_name);
    let capture_path = state.config.uploads_dir.join(stored_name);
    if let Err(err) = fs::create_dir_all(&state.config.uploads_dir)
        .and_then(|_| fs::write(&capture_path, &file_data))
    {
        log::error!("Error storing upload {}: {}", capture_path.display(), err);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": "Error storing uploaded file." })),
        )
            .into_response();
    }
    log::info!("File stored at: {}", capture_path.display());

    let options = analysis_options(&state.config);
    match run_analysis(&capture_path, &options).await {
        Ok(report) => Json(json!({
            "message": "File uploaded and scripts executed.",
            "successes": report.successes,
            "failures": report.failures,
        }))
        .into_response(),
        Err(AnalysisError::NoScriptsAvailable(_)) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "No plotting scripts found." })),
        )
            .into_response(),
        Err(err) => {
            log::error!("Error running scripts: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "message": "Error executing plotting scripts." })),
            )
                .into_response()
        }
    }
}

/// Accept a batch of files, all or nothing
///
/// The whole batch is rejected when any name collides (case-insensitively)
/// with a file already uploaded; a mid-batch write error rolls back the
/// files written so far.
async fn upload_multiple(State(state): State<Arc<AppState>>, mut multipart: Multipart) -> Response {
    let mut incoming: Vec<(String, Vec<u8>)> = Vec::new();
    while let Some(field) = multipart.next_field().await.unwrap_or(None) {
        if let Some(name) = field.file_name() {
            let name = name.to_string();
            let data = field.bytes().await.unwrap_or_default().to_vec();
            incoming.push((name, data));
        }
    }

    if incoming.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "No files were uploaded" })),
        )
            .into_response();
    }

    let uploads = &state.config.uploads_dir;
    if let Err(err) = fs::create_dir_all(uploads) {
        log::error!("Error creating {}: {}", uploads.display(), err);
        return upload_error(&err.to_string());
    }

    // Existing names, compared case-insensitively
    let mut existing = HashSet::new();
    if let Ok(entries) = fs::read_dir(uploads) {
        for entry in entries.flatten() {
            if entry.path().is_file() {
                existing.insert(entry.file_name().to_string_lossy().to_lowercase());
            }
        }
    }

    let duplicates: Vec<&str> = incoming
        .iter()
        .filter(|(name, _)| existing.contains(&name.to_lowercase()))
        .map(|(name, _)| name.as_str())
        .collect();
    if !duplicates.is_empty() {
        return (
            StatusCode::CONFLICT,
            Json(json!({
                "message": format!(
                    "Duplicate files detected: {}. Upload rejected.",
                    duplicates.join(", ")
                ),
            })),
        )
            .into_response();
    }

    let mut saved = Vec::new();
    for (name, data) in &incoming {
        if let Err(err) = fs::write(uploads.join(name), data) {
            log::error!("Error saving {}: {}", name, err);
            // Roll back the partial batch
            for done in &saved {
                let _ = fs::remove_file(uploads.join(done));
            }
            return upload_error(&err.to_string());
        }
        saved.push(name.clone());
    }

    Json(json!({
        "message": format!("Successfully uploaded {} files", saved.len()),
        "filenames": saved,
    }))
    .into_response()
}

fn upload_error(detail: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "message": format!("An error occurred during upload: {}", detail),
        })),
    )
        .into_response()
}

/// Serve a user's stored profile picture
async fn profile_image(
    Query(query): Query<EmailQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(email) = query.email else {
        return (
            StatusCode::BAD_REQUEST,
            "Email query parameter is required.",
        )
            .into_response();
    };

    match state.store.find_by_email(&email) {
        Ok(Some(user)) => match user.profile_image {
            Some(image) => ([(header::CONTENT_TYPE, "image/jpeg")], image).into_response(),
            None => (StatusCode::NOT_FOUND, "Image not found").into_response(),
        },
        Ok(None) => (StatusCode::NOT_FOUND, "Image not found").into_response(),
        Err(err) => {
            log::error!("Error fetching profile image: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, "Server error").into_response()
        }
    }
}

/// Serve the stored HTML for one result slot
async fn user_result(
    slot: usize,
    Query(query): Query<EmailQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(email) = query.email else {
        return (
            StatusCode::BAD_REQUEST,
            "Email query parameter is required.",
        )
            .into_response();
    };

    match state.store.find_by_email(&email) {
        Ok(Some(user)) => match user.results.get(&slot) {
            Some(content) => Html(content.clone()).into_response(),
            None => (StatusCode::NOT_FOUND, format!("Result {} not found", slot)).into_response(),
        },
        Ok(None) => (StatusCode::NOT_FOUND, format!("Result {} not found", slot)).into_response(),
        Err(err) => {
            log::error!("Error fetching result {}: {}", slot, err);
            (StatusCode::INTERNAL_SERVER_ERROR, "Server error").into_response()
        }
    }
}

fn analysis_options(config: &Config) -> AnalysisOptions {
    AnalysisOptions {
        scripts_dir: config.scripts_dir.clone(),
        interpreter: config.interpreter.clone(),
        extension: config.script_extension.clone(),
        timeout: config.script_timeout,
        max_parallel: config.max_parallel,
    }
}
