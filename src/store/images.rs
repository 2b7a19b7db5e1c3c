use rusqlite::{params, Connection, OptionalExtension};

use super::{query_ids, user_exists, Store, StoreError, StoreResult};
use crate::models::{Image, ImageJson};

impl Store {
    // ==================== Image Operations ====================

    /// Record an upload for an existing user
    pub fn create_image(&self, user_id: i64) -> StoreResult<Image> {
        let conn = self.conn();
        if !user_exists(&conn, user_id)? {
            return Err(StoreError::Validation(format!("User {} does not exist", user_id)));
        }

        let mut image = Image::new(user_id);
        conn.execute("INSERT INTO images (user_id) VALUES (?1)", params![user_id])?;
        let id = conn.last_insert_rowid();
        image.id = Some(id);

        log::info!("Created image {} for user {}", id, user_id);
        Ok(image)
    }

    pub fn get_image(&self, id: i64) -> StoreResult<Option<Image>> {
        let conn = self.conn();
        let image = conn
            .query_row(
                "SELECT id, user_id FROM images WHERE id = ?1",
                params![id],
                row_to_image,
            )
            .optional()?;
        Ok(image.map(|i| with_rankings(&conn, i)).transpose()?)
    }

    pub fn get_image_json(&self, id: i64) -> StoreResult<Option<ImageJson>> {
        Ok(self.get_image(id)?.as_ref().map(Image::to_json))
    }

    /// All images in upload order
    pub fn get_all_images(&self) -> StoreResult<Vec<Image>> {
        let conn = self.conn();
        list_images(&conn, "SELECT id, user_id FROM images ORDER BY id", params![])
    }

    pub fn get_all_images_json(&self) -> StoreResult<Vec<ImageJson>> {
        Ok(self.get_all_images()?.iter().map(Image::to_json).collect())
    }

    pub fn get_images_by_userid(&self, user_id: i64) -> StoreResult<Vec<Image>> {
        let conn = self.conn();
        list_images(
            &conn,
            "SELECT id, user_id FROM images WHERE user_id = ?1 ORDER BY id",
            params![user_id],
        )
    }

    pub fn get_images_by_userid_json(&self, user_id: i64) -> StoreResult<Vec<ImageJson>> {
        Ok(self
            .get_images_by_userid(user_id)?
            .iter()
            .map(Image::to_json)
            .collect())
    }

    /// Delete an image and its rankings. Returns whether anything was deleted.
    pub fn delete_image(&self, id: i64) -> StoreResult<bool> {
        let conn = self.conn();
        let rows = conn.execute("DELETE FROM images WHERE id = ?1", params![id])?;
        if rows > 0 {
            log::info!("Deleted image {}", id);
        }
        Ok(rows > 0)
    }
}

fn list_images(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> StoreResult<Vec<Image>> {
    let mut stmt = conn.prepare(sql)?;
    let images = stmt
        .query_map(params, row_to_image)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    let images = images
        .into_iter()
        .map(|i| with_rankings(conn, i))
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(images)
}

fn row_to_image(row: &rusqlite::Row) -> rusqlite::Result<Image> {
    Ok(Image {
        id: Some(row.get("id")?),
        user_id: row.get("user_id")?,
        rankings: Vec::new(),
    })
}

fn with_rankings(conn: &Connection, mut image: Image) -> rusqlite::Result<Image> {
    if let Some(id) = image.id {
        image.rankings = query_ids(
            conn,
            "SELECT id FROM rankings WHERE image_id = ?1 ORDER BY id",
            id,
        )?;
    }
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_users() -> Store {
        let store = Store::in_memory().unwrap();
        store.create_user("bob", "bobpass").unwrap();
        store.create_user("rick", "rickpass").unwrap();
        store
    }

    #[test]
    fn test_create_and_get_image() {
        let store = store_with_users();
        let image = store.create_image(1).unwrap();
        assert_eq!(image.id, Some(1));
        assert_eq!(image.user_id, 1);

        let json = store.get_image_json(1).unwrap().unwrap();
        assert_eq!(
            serde_json::to_value(json).unwrap(),
            serde_json::json!({"id": 1, "rankings": [], "userId": 1})
        );
    }

    #[test]
    fn test_image_for_unknown_user_rejected() {
        let store = store_with_users();
        let err = store.create_image(99).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(store.get_all_images().unwrap().is_empty());
    }

    #[test]
    fn test_images_by_user() {
        let store = store_with_users();
        store.create_image(1).unwrap();
        store.create_image(2).unwrap();
        store.create_image(1).unwrap();

        let bobs: Vec<_> = store
            .get_images_by_userid(1)
            .unwrap()
            .iter()
            .filter_map(|i| i.id)
            .collect();
        assert_eq!(bobs, vec![1, 3]);
        assert_eq!(store.get_images_by_userid_json(2).unwrap().len(), 1);
        assert!(store.get_images_by_userid(42).unwrap().is_empty());
    }

    #[test]
    fn test_all_images_json_matches_all_images() {
        let store = store_with_users();
        store.create_image(2).unwrap();
        store.create_image(1).unwrap();

        let images = store.get_all_images().unwrap();
        assert_eq!(images[0].user_id, 2);
        assert_eq!(images[1].user_id, 1);
        let expected: Vec<_> = images.iter().map(Image::to_json).collect();
        assert_eq!(store.get_all_images_json().unwrap(), expected);
    }

    #[test]
    fn test_image_lists_ranking_ids() {
        let store = store_with_users();
        store.create_image(1).unwrap();
        let ranking = store.create_ranking(2, 1, 8).unwrap();

        let image = store.get_image(1).unwrap().unwrap();
        assert_eq!(image.rankings, vec![ranking.id.unwrap()]);
    }

    #[test]
    fn test_delete_image_removes_rankings() {
        let store = store_with_users();
        store.create_image(1).unwrap();
        store.create_ranking(2, 1, 8).unwrap();

        assert!(store.delete_image(1).unwrap());
        assert!(store.get_image(1).unwrap().is_none());
        assert!(store.get_all_rankings().unwrap().is_empty());
        assert!(!store.delete_image(1).unwrap());
    }
}
