use crate::db::json_column;
use crate::error::{Result, StoreError, Violations};
use crate::models::{AncestorRef, Category, CategoryInput};
use crate::slug::{unique_slug, SlugTable};
use rusqlite::{Connection, OptionalExtension};

const CATEGORY_COLUMNS: &str =
    "id, name, slug, image, description, parent_id, ancestors, is_active, is_deleted, created_at";

fn map_category(row: &rusqlite::Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        image: row.get(3)?,
        description: row.get(4)?,
        parent_id: row.get(5)?,
        ancestors: json_column(row, 6)?,
        is_active: row.get(7)?,
        is_deleted: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn validate(input: &CategoryInput) -> Result<()> {
    let mut v = Violations::new();
    v.check(!input.name.trim().is_empty(), "Category name is required");
    v.finish()
}

pub fn get_category(conn: &Connection, id: i64) -> Result<Category> {
    conn.query_row(
        &format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = ?1"),
        [id],
        map_category,
    )
    .optional()?
    .ok_or(StoreError::NotFound("Category"))
}

pub fn get_category_by_slug(conn: &Connection, slug: &str) -> Result<Category> {
    conn.query_row(
        &format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE slug = ?1 AND is_deleted = 0"),
        [slug],
        map_category,
    )
    .optional()?
    .ok_or(StoreError::NotFound("Category"))
}

pub fn list_categories(conn: &Connection, include_deleted: bool) -> Result<Vec<Category>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CATEGORY_COLUMNS} FROM categories
         WHERE ?1 OR is_deleted = 0
         ORDER BY name"
    ))?;

    let categories = stmt
        .query_map([include_deleted], map_category)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(categories)
}

/// Materialized path for a prospective parent. A missing or unresolvable
/// parent yields a root category.
fn resolve_ancestors(conn: &Connection, parent_id: Option<i64>) -> Result<(Option<i64>, Vec<AncestorRef>)> {
    let Some(parent_id) = parent_id else {
        return Ok((None, Vec::new()));
    };

    match get_category(conn, parent_id) {
        Ok(parent) => {
            let mut ancestors = parent.ancestors;
            ancestors.push(AncestorRef {
                id: parent.id,
                name: parent.name,
                slug: parent.slug,
            });
            Ok((Some(parent_id), ancestors))
        }
        Err(StoreError::NotFound(_)) => {
            tracing::warn!(parent_id, "parent category not found, saving as root");
            Ok((None, Vec::new()))
        }
        Err(e) => Err(e),
    }
}

/// Whether `target` is `start` or one of its ancestors, following the stored
/// `parent_id` links rather than the cached chains.
fn is_in_parent_chain(conn: &Connection, start: i64, target: i64) -> Result<bool> {
    let found: i64 = conn.query_row(
        "WITH RECURSIVE chain(id, parent_id) AS (
            SELECT id, parent_id FROM categories WHERE id = ?1
            UNION
            SELECT c.id, c.parent_id FROM categories c JOIN chain ON c.id = chain.parent_id
         )
         SELECT EXISTS (SELECT 1 FROM chain WHERE id = ?2)",
        [start, target],
        |row| row.get(0),
    )?;
    Ok(found != 0)
}

pub fn create_category(conn: &Connection, input: CategoryInput) -> Result<Category> {
    validate(&input)?;

    let name = input.name.trim();
    let slug = unique_slug(conn, SlugTable::Categories, name, None)?;
    let (parent_id, ancestors) = resolve_ancestors(conn, input.parent_id)?;

    conn.execute(
        "INSERT INTO categories (name, slug, image, description, parent_id, ancestors, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            name,
            slug,
            input.image,
            input.description,
            parent_id,
            serde_json::to_string(&ancestors)?,
            input.is_active.unwrap_or(true),
        ],
    )?;

    let id = conn.last_insert_rowid();
    tracing::info!(id, %slug, depth = ancestors.len(), "category created");
    get_category(conn, id)
}

pub fn update_category(conn: &Connection, id: i64, input: CategoryInput) -> Result<Category> {
    validate(&input)?;
    let existing = get_category(conn, id)?;

    if let Some(parent_id) = input.parent_id {
        if parent_id == id {
            return Err(StoreError::Validation(
                "A category cannot be its own parent".to_string(),
            ));
        }
        if is_in_parent_chain(conn, parent_id, id)? {
            return Err(StoreError::Validation(
                "A category cannot be moved under one of its descendants".to_string(),
            ));
        }
    }

    let name = input.name.trim();
    let slug = if name != existing.name {
        unique_slug(conn, SlugTable::Categories, name, Some(id))?
    } else {
        existing.slug.clone()
    };

    // Only a parent change rebuilds the chain; renames do not cascade.
    let (parent_id, ancestors) = if input.parent_id != existing.parent_id {
        let resolved = resolve_ancestors(conn, input.parent_id)?;
        tracing::debug!(id, depth = resolved.1.len(), "category ancestors recomputed");
        resolved
    } else {
        (existing.parent_id, existing.ancestors)
    };

    conn.execute(
        "UPDATE categories
         SET name = ?1, slug = ?2, image = ?3, description = ?4, parent_id = ?5, ancestors = ?6, is_active = ?7
         WHERE id = ?8",
        rusqlite::params![
            name,
            slug,
            input.image,
            input.description,
            parent_id,
            serde_json::to_string(&ancestors)?,
            input.is_active.unwrap_or(existing.is_active),
            id,
        ],
    )?;

    get_category(conn, id)
}

pub fn soft_delete_category(conn: &Connection, id: i64) -> Result<()> {
    let changed = conn.execute(
        "UPDATE categories SET is_deleted = 1, is_active = 0 WHERE id = ?1",
        [id],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound("Category"));
    }
    tracing::info!(id, "category soft deleted");
    Ok(())
}

pub fn delete_category(conn: &Connection, id: i64) -> Result<()> {
    // Products in this category become uncategorized
    conn.execute(
        "UPDATE products SET category_id = NULL WHERE category_id = ?1",
        [id],
    )?;

    // Direct children become roots
    conn.execute(
        "UPDATE categories SET parent_id = NULL, ancestors = '[]' WHERE parent_id = ?1",
        [id],
    )?;

    let changed = conn.execute("DELETE FROM categories WHERE id = ?1", [id])?;
    if changed == 0 {
        return Err(StoreError::NotFound("Category"));
    }
    tracing::info!(id, "category deleted");
    Ok(())
}

/// Ids of the category and everything below it, through the cached chains.
pub fn subtree_ids(conn: &Connection, id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT c.id FROM categories c
         WHERE c.id = ?1
            OR EXISTS (
                SELECT 1 FROM json_each(c.ancestors) a
                WHERE json_extract(a.value, '$.id') = ?1
            )
         ORDER BY c.id",
    )?;

    let ids = stmt
        .query_map([id], |row| row.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(ids)
}

/// Breadcrumb trail from the root down to the category itself.
pub fn category_breadcrumbs(category: &Category) -> Vec<AncestorRef> {
    let mut trail = category.ancestors.clone();
    trail.push(AncestorRef {
        id: category.id,
        name: category.name.clone(),
        slug: category.slug.clone(),
    });
    trail
}
