//! Server-rendered pages.
//!
//! Every page gets the soft-chain `user` in its context. Failures render the error page instead of
//! the JSON envelope.

use axum::{
    Form,
    extract::{Path, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use minijinja::context;
use serde::Deserialize;

use crate::{
    AppState,
    api::models::{
        tours::TourResponse,
        reviews::ReviewResponse,
        users::{CurrentUser, normalize_email, validate_identity},
        validation::into_result,
    },
    auth::current_user::MaybeCurrentUser,
    db::{
        handlers::{Repository, Reviews, Tours, Users},
        models::users::UserUpdateDBRequest,
    },
    errors::Error,
    templates,
};

/// An error on a page route, rendered as the error page.
#[derive(Debug)]
pub struct ViewError {
    error: Error,
    user: Option<CurrentUser>,
}

impl From<Error> for ViewError {
    fn from(error: Error) -> Self {
        Self { error, user: None }
    }
}

impl IntoResponse for ViewError {
    fn into_response(self) -> Response {
        self.error.log();
        let status = self.error.status_code();
        let msg = if status.is_server_error() {
            "Please try again later.".to_string()
        } else {
            self.error.user_message()
        };

        match templates::render(
            "views/error.html",
            context! { title => "Something went wrong!", msg => msg, user => self.user },
        ) {
            Ok(html) => (status, Html(html)).into_response(),
            Err(e) => {
                tracing::error!("Failed to render error page: {e}");
                (status, msg).into_response()
            }
        }
    }
}

type ViewResult = Result<Html<String>, ViewError>;

trait WithUser<T> {
    /// Attach the signed-in user so the error page keeps the nav bar.
    fn for_user(self, user: &Option<CurrentUser>) -> Result<T, ViewError>;
}

impl<T> WithUser<T> for Result<T, Error> {
    fn for_user(self, user: &Option<CurrentUser>) -> Result<T, ViewError> {
        self.map_err(|error| ViewError { error, user: user.clone() })
    }
}

async fn acquire(state: &AppState) -> Result<sqlx::pool::PoolConnection<sqlx::Sqlite>, Error> {
    state.db.acquire().await.map_err(|e| Error::Database(e.into()))
}

/// All tours
#[tracing::instrument(skip_all)]
pub async fn overview(State(state): State<AppState>, MaybeCurrentUser(user): MaybeCurrentUser) -> ViewResult {
    let tours = async {
        let mut conn = acquire(&state).await?;
        Ok::<_, Error>(Tours::new(&mut conn).list_all().await?)
    }
    .await
    .for_user(&user)?;
    let tours: Vec<TourResponse> = tours.into_iter().map(TourResponse::from).collect();

    let html = templates::render("views/overview.html", context! { title => "All Tours", tours => tours, user => &user }).for_user(&user)?;
    Ok(Html(html))
}

/// One tour with its guides and reviews
#[tracing::instrument(skip_all)]
pub async fn tour(State(state): State<AppState>, MaybeCurrentUser(user): MaybeCurrentUser, Path(slug): Path<String>) -> ViewResult {
    let tour = async {
        let mut conn = acquire(&state).await?;
        let tour = Tours::new(&mut conn)
            .get_by_slug(&slug)
            .await?
            .ok_or_else(|| Error::not_found("slug", &slug))?;
        let reviews = Reviews::new(&mut conn).list_for_tour(tour.id).await?;
        Ok::<_, Error>(TourResponse::from(tour).with_reviews(reviews.into_iter().map(ReviewResponse::from).collect()))
    }
    .await
    .for_user(&user)?;

    let title = format!("{} Tour", tour.name);
    let html = templates::render("views/tour.html", context! { title => title, tour => tour, user => &user }).for_user(&user)?;
    Ok(Html(html))
}

#[tracing::instrument(skip_all)]
pub async fn login(MaybeCurrentUser(user): MaybeCurrentUser) -> ViewResult {
    let html = templates::render("views/login.html", context! { title => "Log into your account", user => &user }).for_user(&user)?;
    Ok(Html(html))
}

fn account_page(user: CurrentUser, message: Option<&str>) -> ViewResult {
    let user = Some(user);
    let html = templates::render("views/account.html", context! { title => "Your account", user => &user, message => message }).for_user(&user)?;
    Ok(Html(html))
}

/// The account page. Anonymous visitors are sent to the login page.
#[tracing::instrument(skip_all)]
pub async fn account(current_user: Result<CurrentUser, Error>) -> Response {
    match current_user {
        Ok(user) => account_page(user, None).into_response(),
        Err(_) => Redirect::to("/login").into_response(),
    }
}

/// Tours the signed-in user has booked
#[tracing::instrument(skip_all)]
pub async fn my_tours(State(state): State<AppState>, current_user: Result<CurrentUser, Error>) -> ViewResult {
    let current_user = current_user?;
    let user_id = current_user.id;
    let user = Some(current_user);
    let tours = async {
        let mut conn = acquire(&state).await?;
        Ok::<_, Error>(Tours::new(&mut conn).list_booked_by(user_id).await?)
    }
    .await
    .for_user(&user)?;
    let tours: Vec<TourResponse> = tours.into_iter().map(TourResponse::from).collect();

    let html = templates::render("views/overview.html", context! { title => "My Tours", tours => tours, user => &user }).for_user(&user)?;
    Ok(Html(html))
}

#[derive(Debug, Deserialize)]
pub struct UserDataForm {
    pub name: String,
    pub email: String,
}

/// Account form submission
#[tracing::instrument(skip_all)]
pub async fn submit_user_data(
    State(state): State<AppState>,
    current_user: Result<CurrentUser, Error>,
    Form(form): Form<UserDataForm>,
) -> ViewResult {
    let current_user = current_user?;
    let signed_in = Some(current_user.clone());

    let updated = async {
        into_result(validate_identity(Some(&form.name), Some(&form.email), true))?;
        let request = UserUpdateDBRequest {
            name: Some(form.name.trim().to_string()),
            email: normalize_email(&form.email),
            ..Default::default()
        };
        let mut conn = acquire(&state).await?;
        Ok::<_, Error>(Users::new(&mut conn).update(current_user.id, &request).await?)
    }
    .await
    .for_user(&signed_in)?;

    tracing::info!(user_id = %updated.id, "Account settings updated from the account page");
    account_page(CurrentUser::from(updated), Some("Your settings were updated."))
}

#[cfg(test)]
mod tests {
    use crate::{
        api::models::users::Role,
        db::handlers::{Bookings, Repository},
        db::models::bookings::BookingCreateDBRequest,
        test_utils::{auth_header, create_test_app, create_test_config, create_test_tour, create_test_user},
    };
    use axum::http::StatusCode;
    use sqlx::SqlitePool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_overview_and_tour_pages(pool: SqlitePool) {
        let tour = create_test_tour(&pool, "The Forest Hiker").await;
        let server = create_test_app(pool);

        let response = server.get("/").await;
        response.assert_status_ok();
        let html = response.text();
        assert!(html.contains("The Forest Hiker"));
        assert!(html.contains(&format!("/tour/{}", tour.slug)));
        assert!(html.contains("Log in"));

        let response = server.get(&format!("/tour/{}", tour.slug)).await;
        response.assert_status_ok();
        assert!(response.text().contains("The Forest Hiker Tour"));

        let response = server.get("/tour/no-such-tour").await;
        response.assert_status_not_found();
        assert!(response.text().contains("There is no tour with that name."));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_account_pages(pool: SqlitePool) {
        let user = create_test_user(&pool, Role::User).await;
        let tour = create_test_tour(&pool, "The Sea Explorer").await;
        {
            let mut conn = pool.acquire().await.unwrap();
            Bookings::new(&mut conn)
                .create(&BookingCreateDBRequest {
                    tour_id: tour.id,
                    user_id: user.id,
                    price: 497.0,
                    paid: true,
                    checkout_session_id: None,
                })
                .await
                .unwrap();
        }
        let server = create_test_app(pool);

        let response = server.get("/me").await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(response.header("location"), "/login");

        let response = server.get("/my-tours").await;
        response.assert_status_unauthorized();
        assert!(response.text().contains("You are not logged in!"));

        let (name, value) = auth_header(user.id, &create_test_config());
        let response = server.get("/me").add_header(name.clone(), value.clone()).await;
        response.assert_status_ok();
        assert!(response.text().contains(&user.email));

        let response = server.get("/my-tours").add_header(name.clone(), value.clone()).await;
        response.assert_status_ok();
        assert!(response.text().contains("The Sea Explorer"));

        let response = server
            .post("/submit-user-data")
            .add_header(name, value)
            .form(&[("name", "Renamed Traveller"), ("email", "renamed@example.com")])
            .await;
        response.assert_status_ok();
        let html = response.text();
        assert!(html.contains("Renamed Traveller"));
        assert!(html.contains("Your settings were updated."));
    }
}
