use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, Http, HttpAuthScheme, SecurityScheme},
};

use crate::{
    grading::GradingResult,
    routes::{
        auth::{GoogleAuthRequest, LoginRequest, RegisterRequest, UserResponse},
        bundles::BundleInfo,
        contact::{ContactRequest, ContactResponse},
        credits::CreditsResponse,
        grading::{CriterionInfo, GradeRequest, GradingRecord, RubricInfo},
        health::{DbHealthResponse, HealthResponse},
        purchase::{PaymentIntentRequest, PaymentIntentResponse, PurchaseRequest, PurchaseResponse},
        upload::UploadResponse,
    },
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);

        components.add_security_scheme(
            "session_cookie",
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new(
                crate::session::SESSION_COOKIE,
            ))),
        );
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "CorestoneGrader API",
        version = "1.0.0",
        description = "Essay grading against IB rubrics, paid with credits or a monthly subscription.\n\nProtected endpoints read the `corestone_session` cookie set by `/register`, `/login` and `/auth/google`. The same token is accepted as `Authorization: Bearer <token>`."
    ),
    servers((url = "/api", description = "API")),
    tags(
        (name = "health", description = "Health checks"),
        (name = "auth", description = "Accounts and sessions"),
        (name = "billing", description = "Credits, bundles and purchases"),
        (name = "grading", description = "Rubrics, grading and uploads"),
        (name = "export", description = "Grading exports"),
        (name = "contact", description = "Contact form"),
        (name = "admin", description = "Admin operations")
    ),
    paths(
        crate::routes::health::health,
        crate::routes::health::db_health,
        crate::routes::auth::register,
        crate::routes::auth::login,
        crate::routes::auth::logout,
        crate::routes::auth::current_user,
        crate::routes::auth::google_auth,
        crate::routes::credits::get_credits,
        crate::routes::bundles::list_bundles,
        crate::routes::bundles::get_bundle,
        crate::routes::purchase::create_payment_intent,
        crate::routes::purchase::purchase_bundle,
        crate::routes::purchase::list_purchases,
        crate::routes::grading::list_rubrics,
        crate::routes::grading::grade_essay,
        crate::routes::grading::list_gradings,
        crate::routes::upload::upload_essay,
        crate::routes::export::export_gradings,
        crate::routes::contact::submit_contact,
        crate::routes::admin::list_contact_messages,
    ),
    components(schemas(
        HealthResponse,
        DbHealthResponse,
        RegisterRequest,
        LoginRequest,
        GoogleAuthRequest,
        UserResponse,
        CreditsResponse,
        BundleInfo,
        PaymentIntentRequest,
        PaymentIntentResponse,
        PurchaseRequest,
        PurchaseResponse,
        RubricInfo,
        CriterionInfo,
        GradeRequest,
        GradingResult,
        GradingRecord,
        UploadResponse,
        ContactRequest,
        ContactResponse,
    ))
)]
pub struct ApiDoc;
