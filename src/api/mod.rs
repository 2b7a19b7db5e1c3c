use actix_web::{web, HttpResponse, Responder};
use chrono::Utc;
use std::sync::Arc;

use crate::auth::{AuthError, AuthService, AuthUser, RequireAuth};
use crate::models::*;
use crate::store::{Store, StoreError};

pub struct AppState {
    pub store: Arc<Store>,
    pub auth_service: Arc<AuthService>,
}

/// Map a store failure to a response. Only unexpected failures are logged.
fn store_error(context: &str, e: StoreError) -> HttpResponse {
    match e {
        StoreError::Conflict(msg) => HttpResponse::Conflict().json(ApiResponse::<()>::error(msg)),
        StoreError::Validation(msg) => HttpResponse::BadRequest().json(ApiResponse::<()>::error(msg)),
        e => {
            log::error!("{}: {}", context, e);
            HttpResponse::InternalServerError().json(ApiResponse::<()>::error(format!("{}: {}", context, e)))
        }
    }
}

fn not_found(what: &str) -> HttpResponse {
    HttpResponse::NotFound().json(ApiResponse::<()>::error(format!("{} not found", what)))
}

// ==================== Health Check ====================

pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

// ==================== Auth Endpoints ====================

pub async fn login(
    state: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> impl Responder {
    let user = match state.auth_service.authenticate(&body.username, &body.password) {
        Ok(u) => u,
        Err(AuthError::Store(e)) => return store_error("Failed to look up user", e),
        Err(_) => {
            return HttpResponse::Unauthorized().json(ApiResponse::<()>::error("Invalid credentials"));
        }
    };

    let token = match user.id.map(|id| state.auth_service.generate_token(id)) {
        Some(Ok(t)) => t,
        Some(Err(e)) => {
            log::error!("Failed to generate token for {}: {}", user.username, e);
            return HttpResponse::InternalServerError().json(ApiResponse::<()>::error("Failed to generate token"));
        }
        None => return HttpResponse::InternalServerError().json(ApiResponse::<()>::error("Failed to generate token")),
    };

    HttpResponse::Ok().json(ApiResponse::success(LoginResponse {
        token,
        user: user.to_json(),
    }))
}

pub async fn identify(auth_user: web::ReqData<AuthUser>) -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "message": format!("username: {}, id : {}", auth_user.username, auth_user.id)
    }))
}

// ==================== User Endpoints ====================

pub async fn create_user(
    state: web::Data<AppState>,
    body: web::Json<RegisterRequest>,
) -> impl Responder {
    match state.store.create_user(&body.username, &body.password) {
        Ok(user) => HttpResponse::Created().json(ApiResponse::success(user.to_json())),
        Err(e) => store_error("Failed to create user", e),
    }
}

pub async fn list_users(state: web::Data<AppState>) -> impl Responder {
    match state.store.get_all_users_json() {
        Ok(users) => HttpResponse::Ok().json(ApiResponse::success(users)),
        Err(e) => store_error("Failed to list users", e),
    }
}

pub async fn get_user(state: web::Data<AppState>, path: web::Path<i64>) -> impl Responder {
    match state.store.get_user(path.into_inner()) {
        Ok(Some(user)) => HttpResponse::Ok().json(ApiResponse::success(user.to_json())),
        Ok(None) => not_found("User"),
        Err(e) => store_error("Failed to get user", e),
    }
}

pub async fn get_user_by_username(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    match state.store.get_user_by_username(&path.into_inner()) {
        Ok(Some(user)) => HttpResponse::Ok().json(ApiResponse::success(user.to_json())),
        Ok(None) => not_found("User"),
        Err(e) => store_error("Failed to get user", e),
    }
}

/// 404 unless the user exists
fn require_user(state: &AppState, id: i64) -> Result<(), HttpResponse> {
    match state.store.get_user(id) {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(not_found("User")),
        Err(e) => Err(store_error("Failed to get user", e)),
    }
}

pub async fn list_user_images(state: web::Data<AppState>, path: web::Path<i64>) -> impl Responder {
    let id = path.into_inner();
    if let Err(resp) = require_user(&state, id) {
        return resp;
    }
    match state.store.get_images_by_userid_json(id) {
        Ok(images) => HttpResponse::Ok().json(ApiResponse::success(images)),
        Err(e) => store_error("Failed to list images", e),
    }
}

/// Ratings the user has received
pub async fn list_user_ratings(state: web::Data<AppState>, path: web::Path<i64>) -> impl Responder {
    let id = path.into_inner();
    if let Err(resp) = require_user(&state, id) {
        return resp;
    }
    match state.store.get_ratings_by_target(id) {
        Ok(ratings) => HttpResponse::Ok().json(ApiResponse::success(
            ratings.iter().map(Rating::to_json).collect::<Vec<_>>(),
        )),
        Err(e) => store_error("Failed to list ratings", e),
    }
}

/// Ratings the user has given
pub async fn list_user_given_ratings(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> impl Responder {
    let id = path.into_inner();
    if let Err(resp) = require_user(&state, id) {
        return resp;
    }
    match state.store.get_ratings_by_creator(id) {
        Ok(ratings) => HttpResponse::Ok().json(ApiResponse::success(
            ratings.iter().map(Rating::to_json).collect::<Vec<_>>(),
        )),
        Err(e) => store_error("Failed to list ratings", e),
    }
}

pub async fn list_user_rankings(state: web::Data<AppState>, path: web::Path<i64>) -> impl Responder {
    let id = path.into_inner();
    if let Err(resp) = require_user(&state, id) {
        return resp;
    }
    match state.store.get_rankings_by_creator(id) {
        Ok(rankings) => HttpResponse::Ok().json(ApiResponse::success(
            rankings.iter().map(Ranking::to_json).collect::<Vec<_>>(),
        )),
        Err(e) => store_error("Failed to list rankings", e),
    }
}

// ==================== Image Endpoints ====================

pub async fn list_images(state: web::Data<AppState>) -> impl Responder {
    match state.store.get_all_images_json() {
        Ok(images) => HttpResponse::Ok().json(ApiResponse::success(images)),
        Err(e) => store_error("Failed to list images", e),
    }
}

pub async fn get_image(state: web::Data<AppState>, path: web::Path<i64>) -> impl Responder {
    match state.store.get_image_json(path.into_inner()) {
        Ok(Some(image)) => HttpResponse::Ok().json(ApiResponse::success(image)),
        Ok(None) => not_found("Image"),
        Err(e) => store_error("Failed to get image", e),
    }
}

pub async fn list_image_rankings(state: web::Data<AppState>, path: web::Path<i64>) -> impl Responder {
    let id = path.into_inner();
    match state.store.get_image(id) {
        Ok(Some(_)) => {}
        Ok(None) => return not_found("Image"),
        Err(e) => return store_error("Failed to get image", e),
    }
    match state.store.get_rankings_by_image(id) {
        Ok(rankings) => HttpResponse::Ok().json(ApiResponse::success(
            rankings.iter().map(Ranking::to_json).collect::<Vec<_>>(),
        )),
        Err(e) => store_error("Failed to list rankings", e),
    }
}

pub async fn get_image_ranking(state: web::Data<AppState>, path: web::Path<i64>) -> impl Responder {
    let image_id = path.into_inner();
    match state.store.get_calculated_ranking(image_id) {
        Ok(Some(ranking)) => HttpResponse::Ok().json(ApiResponse::success(CalculatedRankingResponse {
            image_id,
            ranking,
        })),
        Ok(None) => not_found("Image"),
        Err(e) => store_error("Failed to calculate ranking", e),
    }
}

// ==================== Rating Endpoints ====================

pub async fn list_ratings(state: web::Data<AppState>) -> impl Responder {
    match state.store.get_all_ratings_json() {
        Ok(ratings) => HttpResponse::Ok().json(ApiResponse::success(ratings)),
        Err(e) => store_error("Failed to list ratings", e),
    }
}

pub async fn get_rating(state: web::Data<AppState>, path: web::Path<i64>) -> impl Responder {
    match state.store.get_rating(path.into_inner()) {
        Ok(Some(rating)) => HttpResponse::Ok().json(ApiResponse::success(rating.to_json())),
        Ok(None) => not_found("Rating"),
        Err(e) => store_error("Failed to get rating", e),
    }
}

// ==================== Ranking Endpoints ====================

pub async fn list_rankings(state: web::Data<AppState>) -> impl Responder {
    match state.store.get_all_rankings_json() {
        Ok(rankings) => HttpResponse::Ok().json(ApiResponse::success(rankings)),
        Err(e) => store_error("Failed to list rankings", e),
    }
}

pub async fn get_ranking(state: web::Data<AppState>, path: web::Path<i64>) -> impl Responder {
    match state.store.get_ranking(path.into_inner()) {
        Ok(Some(ranking)) => HttpResponse::Ok().json(ApiResponse::success(ranking.to_json())),
        Ok(None) => not_found("Ranking"),
        Err(e) => store_error("Failed to get ranking", e),
    }
}

// ==================== Authenticated (/api/me) Endpoints ====================

pub async fn get_me(
    state: web::Data<AppState>,
    auth_user: web::ReqData<AuthUser>,
) -> impl Responder {
    match state.store.get_user(auth_user.id) {
        Ok(Some(user)) => HttpResponse::Ok().json(ApiResponse::success(user.to_json())),
        Ok(None) => not_found("User"),
        Err(e) => store_error("Failed to get user", e),
    }
}

pub async fn update_me(
    state: web::Data<AppState>,
    auth_user: web::ReqData<AuthUser>,
    body: web::Json<UpdateUserRequest>,
) -> impl Responder {
    match state.store.update_user(auth_user.id, &body.username) {
        Ok(Some(user)) => HttpResponse::Ok().json(ApiResponse::success(user.to_json())),
        Ok(None) => not_found("User"),
        Err(e) => store_error("Failed to update user", e),
    }
}

pub async fn delete_me(
    state: web::Data<AppState>,
    auth_user: web::ReqData<AuthUser>,
) -> impl Responder {
    match state.store.delete_user(auth_user.id) {
        Ok(true) => HttpResponse::NoContent().finish(),
        Ok(false) => not_found("User"),
        Err(e) => store_error("Failed to delete user", e),
    }
}

pub async fn create_my_image(
    state: web::Data<AppState>,
    auth_user: web::ReqData<AuthUser>,
) -> impl Responder {
    match state.store.create_image(auth_user.id) {
        Ok(image) => HttpResponse::Created().json(ApiResponse::success(image.to_json())),
        Err(e) => store_error("Failed to create image", e),
    }
}

pub async fn delete_my_image(
    state: web::Data<AppState>,
    auth_user: web::ReqData<AuthUser>,
    path: web::Path<i64>,
) -> impl Responder {
    let id = path.into_inner();

    // Someone else's image looks the same as a missing one
    match state.store.get_image(id) {
        Ok(Some(image)) if image.user_id == auth_user.id => {}
        Ok(_) => return not_found("Image"),
        Err(e) => return store_error("Failed to get image", e),
    }

    match state.store.delete_image(id) {
        Ok(true) => HttpResponse::NoContent().finish(),
        Ok(false) => not_found("Image"),
        Err(e) => store_error("Failed to delete image", e),
    }
}

pub async fn create_my_rating(
    state: web::Data<AppState>,
    auth_user: web::ReqData<AuthUser>,
    body: web::Json<CreateRatingRequest>,
) -> impl Responder {
    match state.store.create_rating(auth_user.id, body.target_id, body.score) {
        Ok(rating) => HttpResponse::Created().json(ApiResponse::success(rating.to_json())),
        Err(e) => store_error("Failed to create rating", e),
    }
}

pub async fn update_my_rating(
    state: web::Data<AppState>,
    auth_user: web::ReqData<AuthUser>,
    path: web::Path<i64>,
    body: web::Json<UpdateScoreRequest>,
) -> impl Responder {
    let id = path.into_inner();
    match state.store.get_rating(id) {
        Ok(Some(rating)) if rating.creator_id == auth_user.id => {}
        Ok(_) => return not_found("Rating"),
        Err(e) => return store_error("Failed to get rating", e),
    }

    match state.store.update_rating(id, body.score) {
        Ok(Some(rating)) => HttpResponse::Ok().json(ApiResponse::success(rating.to_json())),
        Ok(None) => not_found("Rating"),
        Err(e) => store_error("Failed to update rating", e),
    }
}

pub async fn delete_my_rating(
    state: web::Data<AppState>,
    auth_user: web::ReqData<AuthUser>,
    path: web::Path<i64>,
) -> impl Responder {
    let id = path.into_inner();
    match state.store.get_rating(id) {
        Ok(Some(rating)) if rating.creator_id == auth_user.id => {}
        Ok(_) => return not_found("Rating"),
        Err(e) => return store_error("Failed to get rating", e),
    }

    match state.store.delete_rating(id) {
        Ok(true) => HttpResponse::NoContent().finish(),
        Ok(false) => not_found("Rating"),
        Err(e) => store_error("Failed to delete rating", e),
    }
}

pub async fn create_my_ranking(
    state: web::Data<AppState>,
    auth_user: web::ReqData<AuthUser>,
    body: web::Json<CreateRankingRequest>,
) -> impl Responder {
    match state.store.create_ranking(auth_user.id, body.image_id, body.score) {
        Ok(ranking) => HttpResponse::Created().json(ApiResponse::success(ranking.to_json())),
        Err(e) => store_error("Failed to create ranking", e),
    }
}

pub async fn update_my_ranking(
    state: web::Data<AppState>,
    auth_user: web::ReqData<AuthUser>,
    path: web::Path<i64>,
    body: web::Json<UpdateScoreRequest>,
) -> impl Responder {
    let id = path.into_inner();
    match state.store.get_ranking(id) {
        Ok(Some(ranking)) if ranking.creator_id == auth_user.id => {}
        Ok(_) => return not_found("Ranking"),
        Err(e) => return store_error("Failed to get ranking", e),
    }

    match state.store.update_ranking(id, body.score) {
        Ok(Some(ranking)) => HttpResponse::Ok().json(ApiResponse::success(ranking.to_json())),
        Ok(None) => not_found("Ranking"),
        Err(e) => store_error("Failed to update ranking", e),
    }
}

pub async fn delete_my_ranking(
    state: web::Data<AppState>,
    auth_user: web::ReqData<AuthUser>,
    path: web::Path<i64>,
) -> impl Responder {
    let id = path.into_inner();
    match state.store.get_ranking(id) {
        Ok(Some(ranking)) if ranking.creator_id == auth_user.id => {}
        Ok(_) => return not_found("Ranking"),
        Err(e) => return store_error("Failed to get ranking", e),
    }

    match state.store.delete_ranking(id) {
        Ok(true) => HttpResponse::NoContent().finish(),
        Ok(false) => not_found("Ranking"),
        Err(e) => store_error("Failed to delete ranking", e),
    }
}

// ==================== Route Configuration ====================

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Health check
        .route("/health", web::get().to(health))

        // Auth
        .route("/api/auth/login", web::post().to(login))
        .service(
            web::resource("/identify")
                .wrap(RequireAuth)
                .route(web::get().to(identify)),
        )

        // Users
        .route("/api/users", web::post().to(create_user))
        .route("/api/users", web::get().to(list_users))
        .route("/api/users/by-username/{username}", web::get().to(get_user_by_username))
        .route("/api/users/{id}", web::get().to(get_user))
        .route("/api/users/{id}/images", web::get().to(list_user_images))
        .route("/api/users/{id}/ratings", web::get().to(list_user_ratings))
        .route("/api/users/{id}/ratings/given", web::get().to(list_user_given_ratings))
        .route("/api/users/{id}/rankings", web::get().to(list_user_rankings))

        // Images
        .route("/api/images", web::get().to(list_images))
        .route("/api/images/{id}", web::get().to(get_image))
        .route("/api/images/{id}/rankings", web::get().to(list_image_rankings))
        .route("/api/images/{id}/ranking", web::get().to(get_image_ranking))

        // Ratings
        .route("/api/ratings", web::get().to(list_ratings))
        .route("/api/ratings/{id}", web::get().to(get_rating))

        // Rankings
        .route("/api/rankings", web::get().to(list_rankings))
        .route("/api/rankings/{id}", web::get().to(get_ranking))

        // Everything acting as the caller
        .service(
            web::scope("/api/me")
                .wrap(RequireAuth)
                .route("", web::get().to(get_me))
                .route("", web::put().to(update_me))
                .route("", web::delete().to(delete_me))
                .route("/images", web::post().to(create_my_image))
                .route("/images/{id}", web::delete().to(delete_my_image))
                .route("/ratings", web::post().to(create_my_rating))
                .route("/ratings/{id}", web::put().to(update_my_rating))
                .route("/ratings/{id}", web::delete().to(delete_my_rating))
                .route("/rankings", web::post().to(create_my_ranking))
                .route("/rankings/{id}", web::put().to(update_my_ranking))
                .route("/rankings/{id}", web::delete().to(delete_my_ranking)),
        );
}
