use crate::db::json_column;
use crate::error::{Result, StoreError, Violations};
use crate::models::{Role, RoleInput};
use rusqlite::{Connection, OptionalExtension};

/// Every permission a role may grant.
pub const PERMISSIONS: &[&str] = &[
    "dashboard:view",
    "products:read",
    "products:write",
    "categories:read",
    "categories:write",
    "coupons:read",
    "coupons:write",
    "banners:read",
    "banners:write",
    "orders:read",
    "orders:write",
    "users:read",
    "users:write",
    "roles:read",
    "roles:write",
    "settings:write",
];

const ROLE_COLUMNS: &str = "id, name, description, permissions, is_deleted, created_at";

fn map_role(row: &rusqlite::Row<'_>) -> rusqlite::Result<Role> {
    Ok(Role {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        permissions: json_column(row, 3)?,
        is_deleted: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn validate(input: &RoleInput) -> Result<()> {
    let mut v = Violations::new();
    v.check(!input.name.trim().is_empty(), "Role name is required");
    for p in &input.permissions {
        v.check(PERMISSIONS.contains(&p.as_str()), format!("Unknown permission {p}"));
    }
    v.finish()
}

fn normalized_permissions(permissions: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(permissions.len());
    for p in permissions {
        if !out.contains(p) {
            out.push(p.clone());
        }
    }
    out
}

pub fn role_has_permission(role: &Role, permission: &str) -> bool {
    !role.is_deleted && role.permissions.iter().any(|p| p == permission)
}

pub fn get_role(conn: &Connection, id: i64) -> Result<Role> {
    conn.query_row(
        &format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = ?1"),
        [id],
        map_role,
    )
    .optional()?
    .ok_or(StoreError::NotFound("Role"))
}

pub fn list_roles(conn: &Connection, include_deleted: bool) -> Result<Vec<Role>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ROLE_COLUMNS} FROM roles WHERE ?1 OR is_deleted = 0 ORDER BY name"
    ))?;

    let roles = stmt
        .query_map([include_deleted], map_role)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(roles)
}

pub fn create_role(conn: &Connection, input: RoleInput) -> Result<Role> {
    validate(&input)?;
    let name = input.name.trim();

    conn.execute(
        "INSERT INTO roles (name, description, permissions) VALUES (?1, ?2, ?3)",
        rusqlite::params![
            name,
            input.description,
            serde_json::to_string(&normalized_permissions(&input.permissions))?,
        ],
    )
    .map_err(|e| StoreError::on_constraint(e, format!("Role {name} already exists")))?;

    let id = conn.last_insert_rowid();
    tracing::info!(id, name, permissions = input.permissions.len(), "role created");
    get_role(conn, id)
}

pub fn update_role(conn: &Connection, id: i64, input: RoleInput) -> Result<Role> {
    validate(&input)?;
    get_role(conn, id)?;
    let name = input.name.trim();

    conn.execute(
        "UPDATE roles SET name = ?1, description = ?2, permissions = ?3 WHERE id = ?4",
        rusqlite::params![
            name,
            input.description,
            serde_json::to_string(&normalized_permissions(&input.permissions))?,
            id,
        ],
    )
    .map_err(|e| StoreError::on_constraint(e, format!("Role {name} already exists")))?;

    tracing::info!(id, name, "role updated");
    get_role(conn, id)
}

pub fn soft_delete_role(conn: &Connection, id: i64) -> Result<()> {
    let changed = conn.execute("UPDATE roles SET is_deleted = 1 WHERE id = ?1", [id])?;
    if changed == 0 {
        return Err(StoreError::NotFound("Role"));
    }
    tracing::info!(id, "role soft deleted");
    Ok(())
}

pub fn delete_role(conn: &Connection, id: i64) -> Result<()> {
    // Users holding the role fall back to no role
    conn.execute("UPDATE users SET role_id = NULL WHERE role_id = ?1", [id])?;

    let changed = conn.execute("DELETE FROM roles WHERE id = ?1", [id])?;
    if changed == 0 {
        return Err(StoreError::NotFound("Role"));
    }
    tracing::info!(id, "role deleted");
    Ok(())
}

/// Whether the user's role grants `permission`. Users without a role, or
/// whose role was soft deleted, have none.
pub fn user_has_permission(conn: &Connection, user_id: i64, permission: &str) -> Result<bool> {
    let role_id: Option<i64> = conn
        .query_row(
            "SELECT role_id FROM users WHERE id = ?1 AND is_deleted = 0",
            [user_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or(StoreError::NotFound("User"))?;

    match role_id {
        Some(role_id) => Ok(role_has_permission(&get_role(conn, role_id)?, permission)),
        None => Ok(false),
    }
}
