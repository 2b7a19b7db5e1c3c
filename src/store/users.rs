use rusqlite::{params, Connection, OptionalExtension};

use super::{conflict_or_database, query_ids, Store, StoreError, StoreResult};
use crate::auth::MAX_PASSWORD_BYTES;
use crate::models::{User, UserJson};

impl Store {
    // ==================== User Operations ====================

    /// Register a new user. Usernames are trimmed and must be unique.
    pub fn create_user(&self, username: &str, password: &str) -> StoreResult<User> {
        let username = validate_username(username)?;
        if password.is_empty() {
            return Err(StoreError::Validation("password must not be empty".to_string()));
        }
        // bcrypt ignores everything past this
        if password.len() > MAX_PASSWORD_BYTES {
            return Err(StoreError::Validation(format!(
                "password must be at most {} bytes",
                MAX_PASSWORD_BYTES
            )));
        }

        // Hash before taking the lock, bcrypt is slow on purpose
        let mut user = User::new(username, password)?;

        let conn = self.conn();
        if username_owner(&conn, username)?.is_some() {
            return Err(StoreError::Conflict(format!("Username {} is already taken", username)));
        }
        conn.execute(
            "INSERT INTO users (username, password_hash) VALUES (?1, ?2)",
            params![&user.username, &user.password_hash],
        )
        .map_err(|e| conflict_or_database(e, format!("Username {} is already taken", username)))?;
        let id = conn.last_insert_rowid();
        user.id = Some(id);

        log::info!("Created user {} (id {})", user.username, id);
        Ok(user)
    }

    pub fn get_user(&self, id: i64) -> StoreResult<Option<User>> {
        let conn = self.conn();
        let user = conn
            .query_row(
                "SELECT id, username, password_hash FROM users WHERE id = ?1",
                params![id],
                row_to_user,
            )
            .optional()?;
        Ok(user.map(|u| with_relations(&conn, u)).transpose()?)
    }

    /// Look a user up by name, normalized the same way it was stored
    pub fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let username = normalize_username(username);
        if username.is_empty() {
            return Ok(None);
        }
        let conn = self.conn();
        let user = conn
            .query_row(
                "SELECT id, username, password_hash FROM users WHERE username = ?1",
                params![username],
                row_to_user,
            )
            .optional()?;
        Ok(user.map(|u| with_relations(&conn, u)).transpose()?)
    }

    /// All users in creation order
    pub fn get_all_users(&self) -> StoreResult<Vec<User>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT id, username, password_hash FROM users ORDER BY id")?;
        let users = stmt
            .query_map([], row_to_user)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let users = users
            .into_iter()
            .map(|u| with_relations(&conn, u))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    pub fn get_all_users_json(&self) -> StoreResult<Vec<UserJson>> {
        Ok(self.get_all_users()?.iter().map(User::to_json).collect())
    }

    /// Rename a user. Returns `None` when the user does not exist.
    pub fn update_user(&self, id: i64, username: &str) -> StoreResult<Option<User>> {
        let username = validate_username(username)?;

        let conn = self.conn();
        if let Some(owner) = username_owner(&conn, username)? {
            if owner != id {
                return Err(StoreError::Conflict(format!("Username {} is already taken", username)));
            }
        }
        let rows = conn
            .execute(
                "UPDATE users SET username = ?1 WHERE id = ?2",
                params![username, id],
            )
            .map_err(|e| conflict_or_database(e, format!("Username {} is already taken", username)))?;
        if rows == 0 {
            return Ok(None);
        }

        log::info!("Renamed user {} to {}", id, username);
        drop(conn);
        self.get_user(id)
    }

    /// Delete a user along with their images, ratings and rankings.
    /// Returns whether anything was deleted.
    pub fn delete_user(&self, id: i64) -> StoreResult<bool> {
        let conn = self.conn();
        let rows = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
        if rows > 0 {
            log::info!("Deleted user {}", id);
        }
        Ok(rows > 0)
    }

    pub fn count_users(&self) -> StoreResult<i64> {
        let conn = self.conn();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn normalize_username(username: &str) -> &str {
    username.trim()
}

fn validate_username(username: &str) -> StoreResult<&str> {
    let username = normalize_username(username);
    if username.is_empty() {
        return Err(StoreError::Validation("username must not be empty".to_string()));
    }
    Ok(username)
}

fn username_owner(conn: &Connection, username: &str) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "SELECT id FROM users WHERE username = ?1",
        params![username],
        |row| row.get(0),
    )
    .optional()
}

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: Some(row.get("id")?),
        username: row.get("username")?,
        password_hash: row.get("password_hash")?,
        images: Vec::new(),
        ratings: Vec::new(),
    })
}

fn with_relations(conn: &Connection, mut user: User) -> rusqlite::Result<User> {
    if let Some(id) = user.id {
        user.images = query_ids(conn, "SELECT id FROM images WHERE user_id = ?1 ORDER BY id", id)?;
        user.ratings = query_ids(
            conn,
            "SELECT id FROM ratings WHERE creator_id = ?1 ORDER BY id",
            id,
        )?;
    }
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_get_user() {
        let store = Store::in_memory().unwrap();
        let user = store.create_user("bob", "bobpass").unwrap();
        assert_eq!(user.id, Some(1));
        assert_ne!(user.password_hash, "bobpass");

        let retrieved = store.get_user(1).unwrap().unwrap();
        assert_eq!(retrieved.username, "bob");
        assert!(retrieved.check_password("bobpass"));
        assert!(retrieved.images.is_empty());
        assert!(retrieved.ratings.is_empty());
    }

    #[test]
    fn test_get_missing_user_is_none() {
        let store = Store::in_memory().unwrap();
        assert!(store.get_user(42).unwrap().is_none());
        assert!(store.get_user_by_username("nobody").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_username_conflicts() {
        let store = Store::in_memory().unwrap();
        store.create_user("bob", "bobpass").unwrap();
        let err = store.create_user("bob", "otherpass").unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        // Trimmed names collide too
        let err = store.create_user("  bob ", "otherpass").unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.count_users().unwrap(), 1);
    }

    #[test]
    fn test_empty_fields_rejected() {
        let store = Store::in_memory().unwrap();
        assert!(matches!(
            store.create_user("   ", "pass").unwrap_err(),
            StoreError::Validation(_)
        ));
        assert!(matches!(
            store.create_user("bob", "").unwrap_err(),
            StoreError::Validation(_)
        ));
    }

    #[test]
    fn test_padded_username_found_as_registered() {
        let store = Store::in_memory().unwrap();
        store.create_user(" bob ", "bobpass").unwrap();

        assert_eq!(store.get_user(1).unwrap().unwrap().username, "bob");
        assert_eq!(store.get_user_by_username(" bob ").unwrap().unwrap().id, Some(1));
        assert_eq!(store.get_user_by_username("bob").unwrap().unwrap().id, Some(1));
        assert!(store.get_user_by_username("   ").unwrap().is_none());
    }

    #[test]
    fn test_overlong_password_rejected() {
        let store = Store::in_memory().unwrap();
        let long = "a".repeat(MAX_PASSWORD_BYTES + 1);
        assert!(matches!(
            store.create_user("bob", &long).unwrap_err(),
            StoreError::Validation(_)
        ));
        assert_eq!(store.count_users().unwrap(), 0);

        let longest = "a".repeat(MAX_PASSWORD_BYTES);
        let user = store.create_user("bob", &longest).unwrap();
        assert!(user.check_password(&longest));
    }

    #[test]
    fn test_list_users_in_creation_order() {
        let store = Store::in_memory().unwrap();
        store.create_user("bob", "bobpass").unwrap();
        store.create_user("rick", "bobpass").unwrap();

        let users = store.get_all_users().unwrap();
        let names: Vec<_> = users.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["bob", "rick"]);

        let json = store.get_all_users_json().unwrap();
        let expected: Vec<_> = users.iter().map(User::to_json).collect();
        assert_eq!(json, expected);
        assert_eq!(
            serde_json::to_value(&json).unwrap(),
            serde_json::json!([
                {"id": 1, "username": "bob", "images": [], "ratings": []},
                {"id": 2, "username": "rick", "images": [], "ratings": []}
            ])
        );
    }

    #[test]
    fn test_update_user() {
        let store = Store::in_memory().unwrap();
        store.create_user("bob", "bobpass").unwrap();
        store.create_user("rick", "rickpass").unwrap();

        let updated = store.update_user(1, "ronnie").unwrap().unwrap();
        assert_eq!(updated.id, Some(1));
        assert_eq!(store.get_user(1).unwrap().unwrap().username, "ronnie");

        // Keeping one's own name is fine, taking someone else's is not
        assert!(store.update_user(1, "ronnie").unwrap().is_some());
        assert!(matches!(
            store.update_user(1, "rick").unwrap_err(),
            StoreError::Conflict(_)
        ));
        assert!(store.update_user(99, "ghost").unwrap().is_none());
    }

    #[test]
    fn test_delete_user() {
        let store = Store::in_memory().unwrap();
        store.create_user("phil", "philpass").unwrap();
        assert!(store.delete_user(1).unwrap());
        assert!(store.get_user(1).unwrap().is_none());
        assert!(!store.delete_user(1).unwrap());
    }

    #[test]
    fn test_user_relations_are_ids() {
        let store = Store::in_memory().unwrap();
        store.create_user("bob", "bobpass").unwrap();
        store.create_user("rick", "rickpass").unwrap();
        let image = store.create_image(1).unwrap();
        let rating = store.create_rating(1, 2, 5).unwrap();

        let bob = store.get_user(1).unwrap().unwrap();
        assert_eq!(bob.images, vec![image.id.unwrap()]);
        assert_eq!(bob.ratings, vec![rating.id.unwrap()]);

        // Ratings list only those the user created
        let rick = store.get_user(2).unwrap().unwrap();
        assert!(rick.ratings.is_empty());
    }

    #[test]
    fn test_delete_user_cascades() {
        let store = Store::in_memory().unwrap();
        store.create_user("bob", "bobpass").unwrap();
        store.create_user("rick", "rickpass").unwrap();
        let image = store.create_image(1).unwrap().id.unwrap();
        store.create_ranking(2, image, 4).unwrap();
        store.create_rating(1, 2, 3).unwrap();
        store.create_rating(2, 1, 3).unwrap();
        let rick_image = store.create_image(2).unwrap().id.unwrap();
        store.create_ranking(1, rick_image, 7).unwrap();

        assert!(store.delete_user(1).unwrap());

        assert!(store.get_image(image).unwrap().is_none());
        assert!(store.get_all_ratings().unwrap().is_empty());
        assert!(store.get_all_rankings().unwrap().is_empty());
        // Rick's own image survives
        assert!(store.get_image(rick_image).unwrap().is_some());
    }
}
