use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::admin::AdminState;
use crate::config::{validate_config as check_config, ConfigError, RouteConfig, SystemConfig, ValidationError};

/// Stand-in for the api key in responses.
pub const REDACTED: &str = "********";

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub routes: usize,
    pub units: Vec<&'static str>,
    pub config_path: String,
}

#[derive(Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<FieldError>,
}

#[derive(Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl From<&ValidationError> for FieldError {
    fn from(error: &ValidationError) -> Self {
        Self {
            field: error.field.clone(),
            message: error.message.clone(),
        }
    }
}

fn redacted(config: &SystemConfig) -> SystemConfig {
    let mut config = config.clone();
    config.admin.api_key = REDACTED.to_string();
    config
}

fn report(result: Result<(), Vec<ValidationError>>) -> ValidationReport {
    match result {
        Ok(()) => ValidationReport {
            valid: true,
            errors: Vec::new(),
        },
        Err(errors) => ValidationReport {
            valid: false,
            errors: errors.iter().map(FieldError::from).collect(),
        },
    }
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let snapshot = state.gateway.snapshot();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        routes: snapshot.router.len(),
        units: snapshot.pipeline.unit_names(),
        config_path: state.store.path().display().to_string(),
    })
}

pub async fn get_routes(State(state): State<AdminState>) -> Json<Vec<RouteConfig>> {
    Json(state.gateway.config().routes.clone())
}

pub async fn get_config(State(state): State<AdminState>) -> Json<SystemConfig> {
    Json(redacted(&state.gateway.config()))
}

/// Validate without saving.
pub async fn validate_config(Json(mut config): Json<SystemConfig>) -> Json<ValidationReport> {
    for route in &mut config.routes {
        route.normalize();
    }
    Json(report(check_config(&config)))
}

/// Validate, persist atomically, then swap the live snapshot.
pub async fn put_config(State(state): State<AdminState>, Json(mut config): Json<SystemConfig>) -> Response {
    if config.admin.api_key == REDACTED {
        config.admin.api_key = state.gateway.config().admin.api_key.clone();
    }

    let saved = match state.store.save(config).await {
        Ok(saved) => saved,
        Err(ConfigError::Validation(errors)) => {
            return (StatusCode::UNPROCESSABLE_ENTITY, Json(report(Err(errors)))).into_response();
        }
        Err(error) => {
            tracing::error!(error = %error, "Failed to save configuration");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Failed to save configuration" })),
            )
                .into_response();
        }
    };

    if let Err(error) = state.gateway.apply(saved.clone()).await {
        tracing::error!(error = %error, "Saved configuration could not be applied");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": "Configuration saved but not applied" })),
        )
            .into_response();
    }

    tracing::info!(routes = saved.routes.len(), "Configuration updated via admin API");
    Json(redacted(&saved)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::setup_admin_router;
    use crate::config::ConfigStore;
    use crate::gateway::Gateway;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    const KEY: &str = "test-key";

    fn state(dir: &tempfile::TempDir) -> AdminState {
        let mut config = SystemConfig::default();
        config.admin.api_key = KEY.to_string();
        AdminState {
            gateway: Arc::new(Gateway::new(config).unwrap()),
            store: Arc::new(ConfigStore::new(dir.path().join("gateway.toml"))),
        }
    }

    async fn json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_requires_bearer_token() {
        let dir = tempfile::tempdir().unwrap();
        let app = setup_admin_router(state(&dir));

        let response = app
            .clone()
            .oneshot(Request::get("/admin/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(
                Request::get("/admin/config")
                    .header("authorization", format!("Bearer {}", KEY))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["admin"]["api_key"], REDACTED);
    }

    #[tokio::test]
    async fn test_put_config_saves_and_applies() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir);
        let app = setup_admin_router(state.clone());

        let mut config = (*state.gateway.config()).clone();
        config.admin.api_key = REDACTED.to_string();
        config.routes.push(RouteConfig::new("api", "/api/", "http://127.0.0.1:9"));

        let response = app
            .oneshot(
                Request::put("/admin/config")
                    .header("authorization", format!("Bearer {}", KEY))
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&config).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let live = state.gateway.config();
        assert_eq!(live.routes[0].path_prefix, "/api");
        assert_eq!(live.admin.api_key, KEY);
        assert!(state.store.path().exists());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected_with_every_error() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir);
        let app = setup_admin_router(state.clone());

        let mut config = (*state.gateway.config()).clone();
        let mut bad = RouteConfig::new("bad", "no-slash", "ftp://x");
        bad.response_rules
            .mask_regex
            .push(crate::config::MaskRule::new("(unclosed", "x"));
        config.routes.push(bad);

        let response = app
            .oneshot(
                Request::put("/admin/config")
                    .header("authorization", format!("Bearer {}", KEY))
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&config).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json(response).await;
        assert_eq!(body["valid"], false);
        assert_eq!(body["errors"].as_array().unwrap().len(), 3);
        assert!(state.gateway.config().routes.is_empty());
        assert!(!state.store.path().exists());
    }
}
