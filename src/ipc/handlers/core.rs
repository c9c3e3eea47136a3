use super::helpers::get_required_str;
use crate::api::{AuthTokens, LmsClient};
use crate::ipc::error::ok;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::sync::Arc;

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => {
            let result = json!({
                "version": env!("CARGO_PKG_VERSION"),
                "sessionConfigured": state.client.is_some(),
                "snapshotState": state.snapshot.label(),
            });
            Some(ok(&req.id, result))
        }
        "session.configure" => {
            let base_url = match get_required_str(&req.params, "baseUrl") {
                Ok(v) => v,
                Err(e) => return Some(e.response(&req.id)),
            };
            let access_token = match get_required_str(&req.params, "accessToken") {
                Ok(v) => v,
                Err(e) => return Some(e.response(&req.id)),
            };
            let refresh_token = req
                .params
                .get("refreshToken")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());

            tracing::info!(%base_url, "session configured");
            state.client = Some(Arc::new(LmsClient::new(
                base_url,
                AuthTokens {
                    access_token,
                    refresh_token,
                },
            )));
            Some(ok(&req.id, json!({ "configured": true })))
        }
        _ => None,
    }
}
