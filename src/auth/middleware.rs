use actix_web::body::EitherBody;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::AUTHORIZATION;
use actix_web::{web, Error, HttpMessage, HttpResponse};
use futures_util::future::{ok, Ready};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use super::{AuthError, AuthService, AuthUser};
use crate::models::ApiResponse;

/// Rejects requests without a valid bearer token. On success the caller's
/// [`AuthUser`] is available to handlers as `web::ReqData<AuthUser>`.
///
/// Needs `web::Data<Arc<AuthService>>` registered on the app.
#[derive(Clone, Copy, Default)]
pub struct RequireAuth;

impl<S, B> Transform<S, ServiceRequest> for RequireAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RequireAuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(RequireAuthMiddleware { service })
    }
}

pub struct RequireAuthMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for RequireAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        match authenticate_request(&req) {
            Ok(user) => {
                req.extensions_mut().insert(user);
                let fut = self.service.call(req);
                Box::pin(async move { Ok(fut.await?.map_into_left_body()) })
            }
            Err(response) => {
                let res = req.into_response(response).map_into_right_body();
                Box::pin(async move { Ok(res) })
            }
        }
    }
}

fn authenticate_request(req: &ServiceRequest) -> Result<AuthUser, HttpResponse> {
    let Some(auth_service) = req.app_data::<web::Data<Arc<AuthService>>>() else {
        log::error!("RequireAuth used without AuthService in app data");
        return Err(HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error("Authentication unavailable")));
    };

    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));
    let Some(token) = token else {
        return Err(HttpResponse::Unauthorized()
            .json(ApiResponse::<()>::error("Missing or malformed Authorization header")));
    };

    match auth_service.identify(token) {
        Ok(user) => Ok(user),
        Err(AuthError::Store(e)) => {
            log::error!("Failed to load user for token: {}", e);
            Err(HttpResponse::InternalServerError().json(ApiResponse::<()>::error("Database error")))
        }
        Err(_) => Err(HttpResponse::Unauthorized().json(ApiResponse::<()>::error("Invalid token"))),
    }
}
