use rusqlite::{params, Connection, OptionalExtension};

use super::{
    conflict_or_database, image_exists, user_exists, validate_score, Store, StoreError, StoreResult,
};
use crate::models::{calculated_ranking, Ranking, RankingJson};

const SELECT_RANKINGS: &str = "SELECT id, creator_id, image_id, score FROM rankings";

impl Store {
    // ==================== Ranking Operations ====================

    /// Rank an image. Each creator may rank a given image once.
    pub fn create_ranking(&self, creator_id: i64, image_id: i64, score: i64) -> StoreResult<Ranking> {
        validate_score(score)?;

        let conn = self.conn();
        if !user_exists(&conn, creator_id)? {
            return Err(StoreError::Validation(format!("User {} does not exist", creator_id)));
        }
        if !image_exists(&conn, image_id)? {
            return Err(StoreError::Validation(format!("Image {} does not exist", image_id)));
        }
        if ranking_id_by_actors(&conn, creator_id, image_id)?.is_some() {
            return Err(StoreError::Conflict(format!(
                "User {} has already ranked image {}",
                creator_id, image_id
            )));
        }

        let mut ranking = Ranking::new(creator_id, image_id, score);
        conn.execute(
            "INSERT INTO rankings (creator_id, image_id, score) VALUES (?1, ?2, ?3)",
            params![ranking.creator_id, ranking.image_id, ranking.score],
        )
        .map_err(|e| {
            conflict_or_database(
                e,
                format!("User {} has already ranked image {}", creator_id, image_id),
            )
        })?;
        let id = conn.last_insert_rowid();
        ranking.id = Some(id);

        log::info!("User {} ranked image {} with {}", creator_id, image_id, score);
        Ok(ranking)
    }

    pub fn get_ranking(&self, id: i64) -> StoreResult<Option<Ranking>> {
        let conn = self.conn();
        let ranking = conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_RANKINGS),
                params![id],
                row_to_ranking,
            )
            .optional()?;
        Ok(ranking)
    }

    /// All rankings in creation order
    pub fn get_all_rankings(&self) -> StoreResult<Vec<Ranking>> {
        let conn = self.conn();
        list_rankings(&conn, &format!("{} ORDER BY id", SELECT_RANKINGS), params![])
    }

    pub fn get_all_rankings_json(&self) -> StoreResult<Vec<RankingJson>> {
        Ok(self.get_all_rankings()?.iter().map(Ranking::to_json).collect())
    }

    pub fn get_rankings_by_image(&self, image_id: i64) -> StoreResult<Vec<Ranking>> {
        let conn = self.conn();
        list_rankings(
            &conn,
            &format!("{} WHERE image_id = ?1 ORDER BY id", SELECT_RANKINGS),
            params![image_id],
        )
    }

    pub fn get_rankings_by_creator(&self, creator_id: i64) -> StoreResult<Vec<Ranking>> {
        let conn = self.conn();
        list_rankings(
            &conn,
            &format!("{} WHERE creator_id = ?1 ORDER BY id", SELECT_RANKINGS),
            params![creator_id],
        )
    }

    pub fn get_ranking_by_actors(&self, creator_id: i64, image_id: i64) -> StoreResult<Option<Ranking>> {
        let conn = self.conn();
        let ranking = conn
            .query_row(
                &format!("{} WHERE creator_id = ?1 AND image_id = ?2", SELECT_RANKINGS),
                params![creator_id, image_id],
                row_to_ranking,
            )
            .optional()?;
        Ok(ranking)
    }

    /// The aggregate score of an image, see [`calculated_ranking`].
    /// Returns `None` when the image does not exist.
    pub fn get_calculated_ranking(&self, image_id: i64) -> StoreResult<Option<i64>> {
        let conn = self.conn();
        if !image_exists(&conn, image_id)? {
            return Ok(None);
        }
        let rankings = list_rankings(
            &conn,
            &format!("{} WHERE image_id = ?1 ORDER BY id", SELECT_RANKINGS),
            params![image_id],
        )?;
        Ok(Some(calculated_ranking(&rankings)))
    }

    /// Replace a ranking's score. Returns `None` when the ranking does not exist.
    pub fn update_ranking(&self, id: i64, score: i64) -> StoreResult<Option<Ranking>> {
        validate_score(score)?;

        let conn = self.conn();
        let rows = conn.execute(
            "UPDATE rankings SET score = ?1 WHERE id = ?2",
            params![score, id],
        )?;
        if rows == 0 {
            return Ok(None);
        }

        log::info!("Updated ranking {} to {}", id, score);
        drop(conn);
        self.get_ranking(id)
    }

    /// Returns whether anything was deleted
    pub fn delete_ranking(&self, id: i64) -> StoreResult<bool> {
        let conn = self.conn();
        let rows = conn.execute("DELETE FROM rankings WHERE id = ?1", params![id])?;
        if rows > 0 {
            log::info!("Deleted ranking {}", id);
        }
        Ok(rows > 0)
    }
}

fn ranking_id_by_actors(conn: &Connection, creator_id: i64, image_id: i64) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "SELECT id FROM rankings WHERE creator_id = ?1 AND image_id = ?2",
        params![creator_id, image_id],
        |row| row.get(0),
    )
    .optional()
}

fn list_rankings(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> StoreResult<Vec<Ranking>> {
    let mut stmt = conn.prepare(sql)?;
    let rankings = stmt
        .query_map(params, row_to_ranking)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rankings)
}

fn row_to_ranking(row: &rusqlite::Row) -> rusqlite::Result<Ranking> {
    Ok(Ranking {
        id: Some(row.get("id")?),
        creator_id: row.get("creator_id")?,
        image_id: row.get("image_id")?,
        score: row.get("score")?,
    })
}
