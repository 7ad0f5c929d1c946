use crate::app::AppState;
use crate::store::{UserRecord, normalize_email};
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Credential data for login
///
/// Fields default to empty so a partial body still deserializes and gets the
/// soft "please provide" reply instead of a 422.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Email address used as the account identifier
    #[serde(default)]
    pub email: String,

    /// Password in plaintext (only transmitted, compared verbatim)
    #[serde(default)]
    pub password: String,
}

/// Registration form data
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    /// Display name for the new account
    #[serde(default)]
    pub name: String,

    /// Email address (unique after normalization)
    #[serde(default)]
    pub email: String,

    /// Password for the new account
    #[serde(default)]
    pub password: String,
}

/// The subset of a user record that goes back to the browser
#[derive(Debug, Serialize)]
pub struct PublicUser {
    /// Display name
    pub name: String,

    /// Normalized email
    pub email: String,
}

/// Reply body for both auth endpoints
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    /// Human-readable outcome shown by the UI
    pub message: String,

    /// Present only on a successful login
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<PublicUser>,
}

/// Handle a login request
///
/// Validation problems (missing fields, unknown user, wrong password) are
/// soft failures: HTTP 200 with a message the UI displays. On success the
/// current-user file is overwritten with this user's email so a later sync
/// pass attributes pending artifacts to them; a failure to write that file
/// is logged but does not fail the login.
///
/// # Arguments
/// * `state` - Shared application state
/// * `request` - Parsed login body
///
/// # Returns
/// * `Response` - JSON `{message, user?}`
pub async fn handle_login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Response {
    if request.email.trim().is_empty() || request.password.is_empty() {
        return message("Please provide email and password.");
    }

    let user = match state.store.find_by_email(&request.email) {
        Ok(user) => user,
        Err(err) => {
            log::error!("Login error: {}", err);
            return server_error("Error during login.");
        }
    };

    let Some(user) = user else {
        return message("User does not exist. Please sign up.");
    };

    if user.password != request.password {
        return message("Invalid email or password.");
    }

    let pointer = &state.config.current_user_file;
    match record_active_user(pointer, &user.email) {
        Ok(()) => log::info!("{} updated with email: {}", pointer.display(), user.email),
        Err(err) => log::error!("Error writing {}: {}", pointer.display(), err),
    }

    Json(AuthResponse {
        message: format!("Welcome back, {}!", user.name),
        user: Some(PublicUser {
            name: user.name,
            email: user.email,
        }),
    })
    .into_response()
}

/// Handle a signup request
///
/// Missing fields and duplicate emails are soft failures (HTTP 200 with a
/// message); only a store fault produces a 500.
///
/// # Arguments
/// * `state` - Shared application state
/// * `request` - Parsed signup body
///
/// # Returns
/// * `Response` - JSON `{message}`
pub async fn handle_signup(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SignupRequest>,
) -> Response {
    if request.name.trim().is_empty()
        || request.email.trim().is_empty()
        || request.password.is_empty()
    {
        return message("Please fill out all fields.");
    }

    let record = UserRecord {
        name: request.name,
        email: request.email,
        password: request.password,
        profile_image: None,
        results: BTreeMap::new(),
    };

    match state.store.insert(record) {
        Ok(true) => message("Signup successful! You can now log in."),
        Ok(false) => message("User already exists. Please log in."),
        Err(err) => {
            log::error!("Signup error: {}", err);
            server_error("Error during signup.")
        }
    }
}

/// Overwrite the current-user file with the given email
///
/// This file is the hand-off point to the out-of-band result sync: whoever
/// is recorded here when the sync runs receives all pending artifacts.
pub fn record_active_user(path: &Path, email: &str) -> std::io::Result<()> {
    fs::write(path, normalize_email(email))
}

fn message(text: &str) -> Response {
    Json(AuthResponse {
        message: text.to_string(),
        user: None,
    })
    .into_response()
}

fn server_error(text: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(AuthResponse {
            message: text.to_string(),
            user: None,
        }),
    )
        .into_response()
}
