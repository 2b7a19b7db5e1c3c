use rusqlite::{params, Connection, OptionalExtension};

use super::{
    conflict_or_database, parse_date, user_exists, validate_score, Store, StoreError, StoreResult,
};
use crate::models::{today, Rating, RatingJson};

const SELECT_RATINGS: &str = "SELECT id, creator_id, target_id, score, time_stamp FROM ratings";

impl Store {
    // ==================== Rating Operations ====================

    /// Rate another user. Each creator may rate a given target once;
    /// later changes go through `update_rating`.
    pub fn create_rating(&self, creator_id: i64, target_id: i64, score: i64) -> StoreResult<Rating> {
        validate_score(score)?;

        let conn = self.conn();
        for id in [creator_id, target_id] {
            if !user_exists(&conn, id)? {
                return Err(StoreError::Validation(format!("User {} does not exist", id)));
            }
        }
        if rating_id_by_actors(&conn, creator_id, target_id)?.is_some() {
            return Err(StoreError::Conflict(format!(
                "User {} has already rated user {}",
                creator_id, target_id
            )));
        }

        let mut rating = Rating::new(creator_id, target_id, score);
        conn.execute(
            "INSERT INTO ratings (creator_id, target_id, score, time_stamp) VALUES (?1, ?2, ?3, ?4)",
            params![
                rating.creator_id,
                rating.target_id,
                rating.score,
                rating.time_stamp.to_string(),
            ],
        )
        .map_err(|e| {
            conflict_or_database(
                e,
                format!("User {} has already rated user {}", creator_id, target_id),
            )
        })?;
        let id = conn.last_insert_rowid();
        rating.id = Some(id);

        log::info!("User {} rated user {} with {}", creator_id, target_id, score);
        Ok(rating)
    }

    pub fn get_rating(&self, id: i64) -> StoreResult<Option<Rating>> {
        let conn = self.conn();
        let rating = conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_RATINGS),
                params![id],
                row_to_rating,
            )
            .optional()?;
        Ok(rating)
    }

    /// All ratings in creation order
    pub fn get_all_ratings(&self) -> StoreResult<Vec<Rating>> {
        let conn = self.conn();
        list_ratings(&conn, &format!("{} ORDER BY id", SELECT_RATINGS), params![])
    }

    pub fn get_all_ratings_json(&self) -> StoreResult<Vec<RatingJson>> {
        Ok(self.get_all_ratings()?.iter().map(Rating::to_json).collect())
    }

    /// Ratings received by a user
    pub fn get_ratings_by_target(&self, target_id: i64) -> StoreResult<Vec<Rating>> {
        let conn = self.conn();
        list_ratings(
            &conn,
            &format!("{} WHERE target_id = ?1 ORDER BY id", SELECT_RATINGS),
            params![target_id],
        )
    }

    /// Ratings given by a user
    pub fn get_ratings_by_creator(&self, creator_id: i64) -> StoreResult<Vec<Rating>> {
        let conn = self.conn();
        list_ratings(
            &conn,
            &format!("{} WHERE creator_id = ?1 ORDER BY id", SELECT_RATINGS),
            params![creator_id],
        )
    }

    pub fn get_rating_by_actors(&self, creator_id: i64, target_id: i64) -> StoreResult<Option<Rating>> {
        let conn = self.conn();
        let rating = conn
            .query_row(
                &format!("{} WHERE creator_id = ?1 AND target_id = ?2", SELECT_RATINGS),
                params![creator_id, target_id],
                row_to_rating,
            )
            .optional()?;
        Ok(rating)
    }

    /// Replace a rating's score and restamp it with today's date.
    /// Returns `None` when the rating does not exist.
    pub fn update_rating(&self, id: i64, score: i64) -> StoreResult<Option<Rating>> {
        validate_score(score)?;

        let conn = self.conn();
        let rows = conn.execute(
            "UPDATE ratings SET score = ?1, time_stamp = ?2 WHERE id = ?3",
            params![score, today().to_string(), id],
        )?;
        if rows == 0 {
            return Ok(None);
        }

        log::info!("Updated rating {} to {}", id, score);
        drop(conn);
        self.get_rating(id)
    }

    /// Returns whether anything was deleted
    pub fn delete_rating(&self, id: i64) -> StoreResult<bool> {
        let conn = self.conn();
        let rows = conn.execute("DELETE FROM ratings WHERE id = ?1", params![id])?;
        if rows > 0 {
            log::info!("Deleted rating {}", id);
        }
        Ok(rows > 0)
    }
}

fn rating_id_by_actors(conn: &Connection, creator_id: i64, target_id: i64) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "SELECT id FROM ratings WHERE creator_id = ?1 AND target_id = ?2",
        params![creator_id, target_id],
        |row| row.get(0),
    )
    .optional()
}

fn list_ratings(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> StoreResult<Vec<Rating>> {
    let mut stmt = conn.prepare(sql)?;
    let ratings = stmt
        .query_map(params, row_to_rating)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ratings)
}

fn row_to_rating(row: &rusqlite::Row) -> rusqlite::Result<Rating> {
    Ok(Rating {
        id: Some(row.get("id")?),
        creator_id: row.get("creator_id")?,
        target_id: row.get("target_id")?,
        score: row.get("score")?,
        time_stamp: parse_date(row.get::<_, String>("time_stamp")?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_users() -> Store {
        let store = Store::in_memory().unwrap();
        store.create_user("bob", "bobpass").unwrap();
        store.create_user("rick", "rickpass").unwrap();
        store.create_user("phil", "philpass").unwrap();
        store
    }

    #[test]
    fn test_create_and_get_rating() {
        let store = store_with_users();
        let rating = store.create_rating(1, 2, 3).unwrap();
        assert_eq!(rating.id, Some(1));

        let retrieved = store.get_rating(1).unwrap().unwrap();
        assert_eq!(retrieved, rating);
        assert_eq!(retrieved.time_stamp, today());
    }

    #[test]
    fn test_duplicate_pair_conflicts() {
        let store = store_with_users();
        store.create_rating(1, 2, 3).unwrap();
        let err = store.create_rating(1, 2, 5).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        // The reverse direction is a different pair
        store.create_rating(2, 1, 5).unwrap();
        assert_eq!(store.get_all_ratings().unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_ratings_rejected() {
        let store = store_with_users();
        assert!(matches!(
            store.create_rating(1, 2, 0).unwrap_err(),
            StoreError::Validation(_)
        ));
        assert!(matches!(
            store.create_rating(1, 2, 11).unwrap_err(),
            StoreError::Validation(_)
        ));
        assert!(matches!(
            store.create_rating(1, 99, 3).unwrap_err(),
            StoreError::Validation(_)
        ));
        assert!(store.get_all_ratings().unwrap().is_empty());
    }

    #[test]
    fn test_query_helpers() {
        let store = store_with_users();
        store.create_rating(1, 2, 3).unwrap();
        store.create_rating(3, 2, 4).unwrap();
        store.create_rating(2, 1, 5).unwrap();

        let received: Vec<_> = store
            .get_ratings_by_target(2)
            .unwrap()
            .iter()
            .map(|r| r.creator_id)
            .collect();
        assert_eq!(received, vec![1, 3]);

        let given = store.get_ratings_by_creator(2).unwrap();
        assert_eq!(given.len(), 1);
        assert_eq!(given[0].target_id, 1);

        let pair = store.get_rating_by_actors(3, 2).unwrap().unwrap();
        assert_eq!(pair.score, 4);
        assert!(store.get_rating_by_actors(2, 3).unwrap().is_none());
    }

    #[test]
    fn test_all_ratings_json_in_order() {
        let store = store_with_users();
        store.create_rating(3, 1, 2).unwrap();
        store.create_rating(1, 3, 9).unwrap();

        let ratings = store.get_all_ratings().unwrap();
        let expected: Vec<_> = ratings.iter().map(Rating::to_json).collect();
        let json = store.get_all_ratings_json().unwrap();
        assert_eq!(json, expected);
        assert_eq!(json[0].creator_id, 3);
        assert_eq!(json[1].creator_id, 1);
    }

    #[test]
    fn test_update_rating() {
        let store = store_with_users();
        store.create_rating(1, 2, 3).unwrap();

        let updated = store.update_rating(1, 7).unwrap().unwrap();
        assert_eq!(updated.score, 7);
        assert_eq!(updated.id, Some(1));
        assert_eq!(store.get_rating_by_actors(1, 2).unwrap().unwrap().score, 7);

        assert!(store.update_rating(99, 7).unwrap().is_none());
        assert!(matches!(
            store.update_rating(1, 42).unwrap_err(),
            StoreError::Validation(_)
        ));
    }

    #[test]
    fn test_delete_rating() {
        let store = store_with_users();
        store.create_rating(1, 2, 3).unwrap();
        assert!(store.delete_rating(1).unwrap());
        assert!(store.get_rating(1).unwrap().is_none());
        assert!(!store.delete_rating(1).unwrap());

        // The pair is free again
        store.create_rating(1, 2, 6).unwrap();
    }
}
