use crate::error::{Result, StoreError, Violations};
use crate::models::{Banner, BannerInput};
use rusqlite::{Connection, OptionalExtension};

const BANNER_COLUMNS: &str =
    "id, title, subtitle, image, link, sort_order, is_active, is_deleted, created_at";

fn map_banner(row: &rusqlite::Row<'_>) -> rusqlite::Result<Banner> {
    Ok(Banner {
        id: row.get(0)?,
        title: row.get(1)?,
        subtitle: row.get(2)?,
        image: row.get(3)?,
        link: row.get(4)?,
        sort_order: row.get(5)?,
        is_active: row.get(6)?,
        is_deleted: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn validate(input: &BannerInput) -> Result<()> {
    let mut v = Violations::new();
    v.check(!input.title.trim().is_empty(), "Banner title is required");
    v.check(!input.image.trim().is_empty(), "Banner image is required");
    v.finish()
}

pub fn get_banner(conn: &Connection, id: i64) -> Result<Banner> {
    conn.query_row(
        &format!("SELECT {BANNER_COLUMNS} FROM banners WHERE id = ?1"),
        [id],
        map_banner,
    )
    .optional()?
    .ok_or(StoreError::NotFound("Banner"))
}

/// All banners for the admin table.
pub fn list_banners(conn: &Connection, include_deleted: bool) -> Result<Vec<Banner>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BANNER_COLUMNS} FROM banners
         WHERE ?1 OR is_deleted = 0
         ORDER BY sort_order, id"
    ))?;

    let banners = stmt
        .query_map([include_deleted], map_banner)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(banners)
}

/// Banners shown on the storefront home page.
pub fn list_active_banners(conn: &Connection) -> Result<Vec<Banner>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BANNER_COLUMNS} FROM banners
         WHERE is_active = 1 AND is_deleted = 0
         ORDER BY sort_order, id"
    ))?;

    let banners = stmt
        .query_map([], map_banner)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(banners)
}

pub fn create_banner(conn: &Connection, input: BannerInput) -> Result<Banner> {
    validate(&input)?;

    conn.execute(
        "INSERT INTO banners (title, subtitle, image, link, sort_order, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            input.title.trim(),
            input.subtitle,
            input.image.trim(),
            input.link,
            input.sort_order.unwrap_or(0),
            input.is_active.unwrap_or(true),
        ],
    )?;

    let id = conn.last_insert_rowid();
    tracing::info!(id, "banner created");
    get_banner(conn, id)
}

pub fn update_banner(conn: &Connection, id: i64, input: BannerInput) -> Result<Banner> {
    validate(&input)?;
    let existing = get_banner(conn, id)?;

    conn.execute(
        "UPDATE banners
         SET title = ?1, subtitle = ?2, image = ?3, link = ?4, sort_order = ?5, is_active = ?6
         WHERE id = ?7",
        rusqlite::params![
            input.title.trim(),
            input.subtitle,
            input.image.trim(),
            input.link,
            input.sort_order.unwrap_or(existing.sort_order),
            input.is_active.unwrap_or(existing.is_active),
            id,
        ],
    )?;

    get_banner(conn, id)
}

pub fn soft_delete_banner(conn: &Connection, id: i64) -> Result<()> {
    let changed = conn.execute(
        "UPDATE banners SET is_deleted = 1, is_active = 0 WHERE id = ?1",
        [id],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound("Banner"));
    }
    Ok(())
}

pub fn delete_banner(conn: &Connection, id: i64) -> Result<()> {
    let changed = conn.execute("DELETE FROM banners WHERE id = ?1", [id])?;
    if changed == 0 {
        return Err(StoreError::NotFound("Banner"));
    }
    tracing::info!(id, "banner deleted");
    Ok(())
}
