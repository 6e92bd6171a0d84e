//! Telephony control document: `POST /voice/incoming`.
//! The provider posts call metadata as URL-encoded form data; it carries
//! no information this bridge needs to act on, so it's logged and
//! otherwise ignored - no provider-specific signature verification is
//! implemented here (a documented gap, not a silent one; see DESIGN.md).

use std::collections::HashMap;

use axum::extract::Form;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use tracing::debug;

pub async fn handle_incoming_call(Form(params): Form<HashMap<String, String>>) -> impl IntoResponse {
    debug!(?params, "incoming call control request");
    let stream_url = crate::config::config().stream_ws_url();
    let body = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response><Connect><Stream url=\"{stream_url}\"/></Connect></Response>"
    );
    (StatusCode::OK, [(header::CONTENT_TYPE, "text/xml")], body)
}
