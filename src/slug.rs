use crate::error::{Result, StoreError};
use rusqlite::{Connection, OptionalExtension};

/// Tables whose rows carry a unique slug.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlugTable {
    Products,
    Categories,
}

impl SlugTable {
    fn table(self) -> &'static str {
        match self {
            SlugTable::Products => "products",
            SlugTable::Categories => "categories",
        }
    }
}

/// Lowercases, turns whitespace runs into hyphens and drops anything that is
/// not a word character or a hyphen.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut in_space = false;

    for ch in name.trim().chars() {
        if ch.is_whitespace() {
            if !in_space {
                slug.push('-');
            }
            in_space = true;
            continue;
        }
        in_space = false;

        if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
            slug.push(ch.to_ascii_lowercase());
        }
    }

    slug
}

/// Tries `base`, `base-1`, `base-2`, ... until no other row of `table` uses
/// the slug. Two concurrent saves of the same name can still collide; the
/// UNIQUE index reports that at insert time.
pub fn unique_slug(
    conn: &Connection,
    table: SlugTable,
    name: &str,
    exclude_id: Option<i64>,
) -> Result<String> {
    let base = slugify(name);
    if base.is_empty() {
        return Err(StoreError::Validation(
            "Name must contain at least one letter or digit".to_string(),
        ));
    }

    let sql = format!(
        "SELECT id FROM {} WHERE slug = ?1 AND id != ?2 LIMIT 1",
        table.table()
    );
    let mut stmt = conn.prepare(&sql)?;
    let exclude = exclude_id.unwrap_or(-1);

    let mut candidate = base.clone();
    let mut suffix = 0u32;
    while stmt
        .query_row(rusqlite::params![candidate, exclude], |row| row.get::<_, i64>(0))
        .optional()?
        .is_some()
    {
        suffix += 1;
        candidate = format!("{base}-{suffix}");
    }

    Ok(candidate)
}
