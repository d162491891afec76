pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::AppConfig;
use crate::services::auth::{AuthService, CodeMailer};
use crate::services::browse::BrowseService;
use crate::services::browse_cache::BrowseCache;
use crate::services::catalog::CatalogService;
use crate::services::moderation::ModerationService;
use crate::services::storage::StorageService;
use crate::services::submission::SubmissionService;
use crate::utils::clock::Clock;
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::health::health_check,
        api::handlers::auth::request_code,
        api::handlers::auth::verify_code,
        api::handlers::auth::me,
        api::handlers::auth::logout,
        api::handlers::lookups::get_lookups,
        api::handlers::lookups::subject_options,
        api::handlers::lookups::submission_subjects,
        api::handlers::resources::browse_resources,
        api::handlers::resources::submit_resource,
        api::handlers::resources::open_resource_file,
        api::handlers::admin::list_pending,
        api::handlers::admin::list_approved,
        api::handlers::admin::decide,
        api::handlers::admin::delete_approved,
    ),
    components(
        schemas(
            api::handlers::health::HealthResponse,
            api::handlers::auth::CodeRequest,
            api::handlers::auth::VerifyRequest,
            api::handlers::auth::MessageResponse,
            api::handlers::resources::SubmissionUpload,
            api::handlers::resources::SignedUrlResponse,
            services::auth::SessionToken,
            services::auth::CurrentUser,
            services::catalog::LookupTables,
            services::catalog::DepartmentView,
            services::catalog::SemesterView,
            services::catalog::SubjectView,
            services::catalog::SubjectChoice,
            services::catalog::SubjectOptions,
            services::browse::BrowseResult,
            services::grouping::ResourceGroup,
            services::grouping::ModerationGroup,
            services::submission::SubmissionReceipt,
            services::moderation::DecisionRequest,
            services::moderation::DecisionOutcome,
            services::moderation::DeletedGroup,
            models::ResourceType,
            models::ModerationStatus,
            models::Decision,
            models::Role,
        )
    ),
    tags(
        (name = "system", description = "Service health"),
        (name = "auth", description = "Email code sign in and sessions"),
        (name = "catalog", description = "Departments, semesters and subjects"),
        (name = "resources", description = "Browse and submit academic resources"),
        (name = "admin", description = "Moderation of submitted resources")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub storage: Arc<dyn StorageService>,
    pub config: AppConfig,
    pub catalog: Arc<CatalogService>,
    pub browse: Arc<BrowseService>,
    pub submissions: Arc<SubmissionService>,
    pub moderation: Arc<ModerationService>,
    pub auth: Arc<AuthService>,
}

impl AppState {
    /// Wires every workflow over the same store, blob backend and clock.
    pub fn new(
        db: DatabaseConnection,
        storage: Arc<dyn StorageService>,
        config: AppConfig,
        clock: Arc<dyn Clock>,
        mailer: Arc<dyn CodeMailer>,
        cache: Arc<BrowseCache>,
    ) -> Self {
        let catalog = Arc::new(CatalogService::new(db.clone(), config.clone()));
        let browse = Arc::new(BrowseService::new(
            db.clone(),
            storage.clone(),
            cache,
            config.clone(),
        ));
        let submissions = Arc::new(SubmissionService::new(
            db.clone(),
            storage.clone(),
            clock.clone(),
            config.clone(),
        ));
        let moderation = Arc::new(ModerationService::new(
            db.clone(),
            storage.clone(),
            catalog.clone(),
            clock.clone(),
            config.clone(),
        ));
        let auth = Arc::new(AuthService::new(db.clone(), mailer, clock, config.clone()));

        Self {
            db,
            storage,
            config,
            catalog,
            browse,
            submissions,
            moderation,
            auth,
        }
    }
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

pub fn create_app(state: AppState) -> Router {
    let admin = Router::new()
        .route(
            "/admin/pending",
            get(api::handlers::admin::list_pending),
        )
        .route(
            "/admin/approved",
            get(api::handlers::admin::list_approved).delete(api::handlers::admin::delete_approved),
        )
        .route("/admin/decisions", post(api::handlers::admin::decide))
        .layer(from_fn_with_state(
            state.clone(),
            api::middleware::auth::auth_middleware,
        ));

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route("/auth/code", post(api::handlers::auth::request_code))
        .route("/auth/verify", post(api::handlers::auth::verify_code))
        .route(
            "/auth/me",
            get(api::handlers::auth::me).layer(from_fn_with_state(
                state.clone(),
                api::middleware::auth::auth_middleware,
            )),
        )
        .route(
            "/auth/logout",
            post(api::handlers::auth::logout).layer(from_fn_with_state(
                state.clone(),
                api::middleware::auth::auth_middleware,
            )),
        )
        .route("/lookups", get(api::handlers::lookups::get_lookups))
        .route(
            "/subjects/options",
            get(api::handlers::lookups::subject_options),
        )
        .route(
            "/subjects/submission",
            get(api::handlers::lookups::submission_subjects),
        )
        .route(
            "/resources",
            get(api::handlers::resources::browse_resources).merge(
                post(api::handlers::resources::submit_resource)
                    .layer(axum::extract::DefaultBodyLimit::max(
                        state.config.max_file_size + 10 * 1024 * 1024, // multipart overhead
                    ))
                    .layer(from_fn_with_state(
                        state.clone(),
                        api::middleware::auth::session_middleware,
                    )),
            ),
        )
        .route(
            "/resources/open",
            get(api::handlers::resources::open_resource_file).layer(from_fn_with_state(
                state.clone(),
                api::middleware::auth::session_middleware,
            )),
        )
        .merge(admin)
        .layer(cors_layer(&state.config))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .with_state(state)
}
