//! OpenAPI document for the REST API under `/api/v1`.
//!
//! Served as JSON at `/api/v1/openapi.json` with interactive docs at `/api/v1/docs`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::api;

/// Session token as a bearer header or as the `jwt` cookie.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "BearerAuth".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "Session token returned by signup or login:\n\n\
                            ```\nAuthorization: Bearer YOUR_TOKEN\n```",
                        ))
                        .build(),
                ),
            );
            components.security_schemes.insert(
                "CookieAuth".to_string(),
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                    "jwt",
                    "Session cookie set by signup or login",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(title = "Tourbook API", description = "Tours, reviews, bookings and accounts"),
    servers(
        (url = "/api/v1", description = "REST API")
    ),
    modifiers(&SecurityAddon),
    paths(
        api::handlers::auth::signup,
        api::handlers::auth::login,
        api::handlers::auth::logout,
        api::handlers::auth::forgot_password,
        api::handlers::auth::reset_password,
        api::handlers::auth::update_my_password,
        api::handlers::users::get_me,
        api::handlers::users::update_me,
        api::handlers::users::delete_me,
        api::handlers::users::create_user,
        api::handlers::users::list_users,
        api::handlers::users::get_user,
        api::handlers::users::update_user,
        api::handlers::users::delete_user,
        api::handlers::tours::list_tours,
        api::handlers::tours::top_cheap_tours,
        api::handlers::tours::get_tour,
        api::handlers::tours::create_tour,
        api::handlers::tours::update_tour,
        api::handlers::tours::delete_tour,
        api::handlers::tours::upload_tour_images,
        api::handlers::tours::tour_stats,
        api::handlers::tours::monthly_plan,
        api::handlers::tours::tours_within,
        api::handlers::tours::tour_distances,
        api::handlers::reviews::list_reviews,
        api::handlers::reviews::list_tour_reviews,
        api::handlers::reviews::get_review,
        api::handlers::reviews::create_review,
        api::handlers::reviews::create_tour_review,
        api::handlers::reviews::update_review,
        api::handlers::reviews::delete_review,
        api::handlers::bookings::create_checkout_session,
        api::handlers::bookings::list_bookings,
        api::handlers::bookings::get_booking,
        api::handlers::bookings::create_booking,
        api::handlers::bookings::update_booking,
        api::handlers::bookings::delete_booking,
    ),
    components(
        schemas(
            api::models::auth::AuthData,
            api::models::auth::AuthResponse,
            api::models::auth::MessageResponse,
            api::models::users::Role,
            api::models::users::SignupRequest,
            api::models::users::LoginRequest,
            api::models::users::ForgotPasswordRequest,
            api::models::users::ResetPasswordRequest,
            api::models::users::UpdatePasswordRequest,
            api::models::users::UpdateMeRequest,
            api::models::users::UserUpdate,
            api::models::users::UserResponse,
            api::models::tours::Difficulty,
            api::models::tours::GeoPoint,
            api::models::tours::TourLocation,
            api::models::tours::TourCreate,
            api::models::tours::TourUpdate,
            api::models::tours::GuideResponse,
            api::models::tours::TourResponse,
            api::models::tours::TourStats,
            api::models::tours::MonthlyPlan,
            api::models::tours::TourDistance,
            api::models::reviews::ReviewCreate,
            api::models::reviews::ReviewUpdate,
            api::models::reviews::ReviewAuthor,
            api::models::reviews::ReviewResponse,
            api::models::bookings::BookingCreate,
            api::models::bookings::BookingUpdate,
            api::models::bookings::BookingTour,
            api::models::bookings::BookingUser,
            api::models::bookings::BookingResponse,
            api::models::bookings::CheckoutSessionResponse,
        )
    ),
    tags(
        (name = "authentication", description = "Signup, login and password management"),
        (name = "users", description = "Profiles and user administration"),
        (name = "tours", description = "Tours, geo queries and analytics"),
        (name = "reviews", description = "Tour reviews and rating aggregation"),
        (name = "bookings", description = "Checkout and booking records"),
    ),
    security(
        ("BearerAuth" = []),
        ("CookieAuth" = [])
    )
)]
pub struct ApiDoc;
