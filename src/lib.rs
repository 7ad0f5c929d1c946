/*!
# Packet Capture Dashboard

A browser-based dashboard for visualizing network-packet-capture analysis
results, built in Rust.

## Overview

A user signs up, logs in, and uploads a capture file. The backend fans the
capture out to a set of external analysis scripts, which render interactive
HTML plots to disk; a separately scheduled sync pass moves those plots into
the logged-in user's record, where the dashboard fetches them per slot.

## Architecture

The application follows a client-server architecture:

### Frontend Layer
- Pre-built single-page app served from `dist/` (login, upload, plot viewer)
- Talks JSON to the backend; plots are fetched as ready-to-embed HTML

### Backend Layer
- **Technologies**: Rust, axum, tokio
- **Core Components**:
  - Analysis Runner - Runs every plotting script against an uploaded capture
    concurrently and aggregates per-script outcomes
  - Result Sync - Out-of-band pass that moves rendered plots into the
    current user's record and cleans the files up
  - User Store - JSON document store keyed by normalized email
  - Auth Endpoints - Login/signup with soft validation failures

### Data Persistence Layer
- One JSON file mapping normalized email to user record
- Result slots stored as a sparse map, slot count is configuration
- A plain-text current-user file hands the logged-in identity to the sync
  pass; the deployment runs one upload-analyze-sync cycle at a time

## Modules

- **config**: Environment-driven runtime configuration
- **store**: User records and the JSON-file document store
- **login**: Login/signup handlers and the current-user hand-off
- **analysis**: Concurrent fan-out to the external analysis scripts
- **sync**: One-pass artifact ingestion and cleanup
- **app**: Routing, uploads, result/profile-image endpoints

## REST API Endpoints

- `POST /login`, `POST /signup` - Authentication
- `POST /upload-file` - Upload one capture and run the analysis scripts
- `POST /upload-multiple` - Upload a batch of captures for later analysis
- `GET /profileImage?email=` - Stored profile picture
- `GET /userResult<slot>?email=` - Stored plot HTML for one slot
*/

// Re-export all modules so they appear in the documentation
pub mod analysis;
pub mod app;
pub mod config;
pub mod login;
pub mod store;
pub mod sync;

/// Re-export everything from these modules to make it easier to use
pub use analysis::*;
pub use config::*;
pub use login::*;
pub use store::*;
pub use sync::*;
