use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::auth;

/// Lowest score a Rating or Ranking may carry
pub const MIN_SCORE: i64 = 1;
/// Highest score a Rating or Ranking may carry
pub const MAX_SCORE: i64 = 10;

/// User is an account holder. Owns images and the ratings it created.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Option<i64>,
    pub username: String,
    pub password_hash: String,
    pub images: Vec<i64>,
    pub ratings: Vec<i64>,
}

impl User {
    /// Build an unsaved user, hashing the password right away.
    pub fn new(username: &str, password: &str) -> Result<Self, bcrypt::BcryptError> {
        Ok(Self {
            id: None,
            username: username.to_string(),
            password_hash: auth::hash_password(password)?,
            images: Vec::new(),
            ratings: Vec::new(),
        })
    }

    /// Check a plaintext candidate against the stored hash.
    /// A hash bcrypt cannot parse never matches.
    pub fn check_password(&self, candidate: &str) -> bool {
        auth::verify_password(candidate, &self.password_hash).unwrap_or(false)
    }

    pub fn to_json(&self) -> UserJson {
        UserJson {
            id: self.id,
            username: self.username.clone(),
            images: self.images.clone(),
            ratings: self.ratings.clone(),
        }
    }
}

/// Image is an upload owned by a single user
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub id: Option<i64>,
    pub user_id: i64,
    pub rankings: Vec<i64>,
}

impl Image {
    pub fn new(user_id: i64) -> Self {
        Self {
            id: None,
            user_id,
            rankings: Vec::new(),
        }
    }

    pub fn to_json(&self) -> ImageJson {
        ImageJson {
            id: self.id,
            rankings: self.rankings.clone(),
            user_id: self.user_id,
        }
    }
}

/// Rating is one user's score for another user
#[derive(Debug, Clone, PartialEq)]
pub struct Rating {
    pub id: Option<i64>,
    pub creator_id: i64,
    pub target_id: i64,
    pub score: i64,
    pub time_stamp: NaiveDate,
}

impl Rating {
    pub fn new(creator_id: i64, target_id: i64, score: i64) -> Self {
        Self {
            id: None,
            creator_id,
            target_id,
            score,
            time_stamp: today(),
        }
    }

    pub fn to_json(&self) -> RatingJson {
        RatingJson {
            id: self.id,
            creator_id: self.creator_id,
            target_id: self.target_id,
            score: self.score,
            time_stamp: self.time_stamp,
        }
    }
}

/// Ranking is one user's score for an image
#[derive(Debug, Clone, PartialEq)]
pub struct Ranking {
    pub id: Option<i64>,
    pub creator_id: i64,
    pub image_id: i64,
    pub score: i64,
}

impl Ranking {
    pub fn new(creator_id: i64, image_id: i64, score: i64) -> Self {
        Self {
            id: None,
            creator_id,
            image_id,
            score,
        }
    }

    pub fn to_json(&self) -> RankingJson {
        RankingJson {
            id: self.id,
            creator_id: self.creator_id,
            image_id: self.image_id,
            score: self.score,
        }
    }
}

// Plain-data views. Field order here is the key order on the wire.

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserJson {
    pub id: Option<i64>,
    pub username: String,
    pub images: Vec<i64>,
    pub ratings: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageJson {
    pub id: Option<i64>,
    pub rankings: Vec<i64>,
    pub user_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingJson {
    pub id: Option<i64>,
    pub creator_id: i64,
    pub target_id: i64,
    pub score: i64,
    pub time_stamp: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingJson {
    pub id: Option<i64>,
    pub creator_id: i64,
    pub image_id: i64,
    pub score: i64,
}

/// Aggregate an image's rankings into one score.
///
/// The result is the arithmetic mean of the scores rounded to the nearest
/// integer, with halves rounding up. An image nobody ranked scores 0.
pub fn calculated_ranking(rankings: &[Ranking]) -> i64 {
    if rankings.is_empty() {
        return 0;
    }
    let total: i64 = rankings.iter().map(|r| r.score).sum();
    (total as f64 / rankings.len() as f64).round() as i64
}

pub fn score_in_range(score: i64) -> bool {
    (MIN_SCORE..=MAX_SCORE).contains(&score)
}

pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}

// Request/Response types for API
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserJson,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub username: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRatingRequest {
    pub target_id: i64,
    pub score: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRankingRequest {
    pub image_id: i64,
    pub score: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateScoreRequest {
    pub score: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedRankingResponse {
    pub image_id: i64,
    pub ranking: i64,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}
