use crate::commands::roles;
use crate::error::{Result, StoreError, Violations};
use crate::models::{Address, AddressInput, RegisterUser, Session, UpdateUser, User};
use crate::session;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Duration;
use rand_core::OsRng;
use rusqlite::{Connection, OptionalExtension};

const MIN_PASSWORD_LEN: usize = 8;

const USER_SELECT: &str =
    "SELECT u.id, u.name, u.email, u.phone, u.role_id, r.name, u.is_active, u.is_deleted, u.created_at
     FROM users u
     LEFT JOIN roles r ON u.role_id = r.id";

fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        role_id: row.get(4)?,
        role_name: row.get(5)?,
        is_active: row.get(6)?,
        is_deleted: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn check_email(v: &mut Violations, email: &str) {
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    };
    v.check(valid, "Email address is invalid");
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| StoreError::Auth(format!("cannot hash password: {e}")))
}

fn password_matches(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

pub fn get_user(conn: &Connection, id: i64) -> Result<User> {
    conn.query_row(&format!("{USER_SELECT} WHERE u.id = ?1"), [id], map_user)
        .optional()?
        .ok_or(StoreError::NotFound("User"))
}

pub fn list_users(conn: &Connection, include_deleted: bool) -> Result<Vec<User>> {
    let mut stmt = conn.prepare(&format!(
        "{USER_SELECT} WHERE ?1 OR u.is_deleted = 0 ORDER BY u.name"
    ))?;

    let users = stmt
        .query_map([include_deleted], map_user)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}

pub fn register_user(conn: &Connection, input: RegisterUser) -> Result<User> {
    let email = normalize_email(&input.email);

    let mut v = Violations::new();
    v.check(!input.name.trim().is_empty(), "Name is required");
    check_email(&mut v, &email);
    v.check(
        input.password.chars().count() >= MIN_PASSWORD_LEN,
        format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
    );
    v.finish()?;

    let hash = hash_password(&input.password)?;

    conn.execute(
        "INSERT INTO users (name, email, password_hash, phone) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![input.name.trim(), email, hash, input.phone],
    )
    .map_err(|e| StoreError::on_constraint(e, "An account with this email already exists"))?;

    let id = conn.last_insert_rowid();
    tracing::info!(id, "user registered");
    get_user(conn, id)
}

/// Checks credentials and returns the matching active user.
pub fn authenticate(conn: &Connection, email: &str, password: &str) -> Result<User> {
    let email = normalize_email(email);
    let found: Option<(i64, String)> = conn
        .query_row(
            "SELECT id, password_hash FROM users
             WHERE email = ?1 AND is_active = 1 AND is_deleted = 0",
            [&email],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match found {
        Some((id, hash)) if password_matches(password, &hash) => get_user(conn, id),
        _ => {
            tracing::info!("rejected login attempt");
            Err(StoreError::Auth("Invalid email or password".to_string()))
        }
    }
}

/// Authenticates and signs a session token for the cookie.
pub fn login(
    conn: &Connection,
    secret: &str,
    ttl: Duration,
    email: &str,
    password: &str,
) -> Result<Session> {
    let user = authenticate(conn, email, password)?;
    let token = session::issue_token(secret, user.id, ttl)?;
    tracing::info!(user_id = user.id, "session issued");
    Ok(Session { user, token })
}

/// Resolves a session token to a user that may still use the store.
pub fn current_user(conn: &Connection, secret: &str, token: &str) -> Result<User> {
    let user_id = session::verify_token(secret, token)?;
    let user = get_user(conn, user_id)?;
    if !user.is_active || user.is_deleted {
        return Err(StoreError::Auth("Account is disabled".to_string()));
    }
    Ok(user)
}

pub fn update_user(conn: &Connection, id: i64, input: UpdateUser) -> Result<User> {
    let existing = get_user(conn, id)?;
    let email = normalize_email(&input.email);

    let mut v = Violations::new();
    v.check(!input.name.trim().is_empty(), "Name is required");
    check_email(&mut v, &email);
    v.finish()?;

    conn.execute(
        "UPDATE users SET name = ?1, email = ?2, phone = ?3, is_active = ?4 WHERE id = ?5",
        rusqlite::params![
            input.name.trim(),
            email,
            input.phone,
            input.is_active.unwrap_or(existing.is_active),
            id,
        ],
    )
    .map_err(|e| StoreError::on_constraint(e, "An account with this email already exists"))?;

    get_user(conn, id)
}

pub fn change_password(conn: &Connection, id: i64, current: &str, new_password: &str) -> Result<()> {
    let stored: String = conn
        .query_row("SELECT password_hash FROM users WHERE id = ?1", [id], |row| row.get(0))
        .optional()?
        .ok_or(StoreError::NotFound("User"))?;

    if !password_matches(current, &stored) {
        return Err(StoreError::Auth("Current password is incorrect".to_string()));
    }

    let mut v = Violations::new();
    v.check(
        new_password.chars().count() >= MIN_PASSWORD_LEN,
        format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
    );
    v.finish()?;

    conn.execute(
        "UPDATE users SET password_hash = ?1 WHERE id = ?2",
        rusqlite::params![hash_password(new_password)?, id],
    )?;
    tracing::info!(id, "password changed");
    Ok(())
}

pub fn assign_role(conn: &Connection, user_id: i64, role_id: Option<i64>) -> Result<User> {
    if let Some(role_id) = role_id {
        let role = roles::get_role(conn, role_id)?;
        if role.is_deleted {
            return Err(StoreError::Validation("Role has been deleted".to_string()));
        }
    }

    let changed = conn.execute(
        "UPDATE users SET role_id = ?1 WHERE id = ?2",
        rusqlite::params![role_id, user_id],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound("User"));
    }

    tracing::info!(user_id, ?role_id, "role assigned");
    get_user(conn, user_id)
}

pub fn soft_delete_user(conn: &Connection, id: i64) -> Result<()> {
    let changed = conn.execute(
        "UPDATE users SET is_deleted = 1, is_active = 0 WHERE id = ?1",
        [id],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound("User"));
    }
    tracing::info!(id, "user soft deleted");
    Ok(())
}

pub fn delete_user(conn: &Connection, id: i64) -> Result<()> {
    // Check if the user has orders
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM orders WHERE user_id = ?1",
        [id],
        |row| row.get(0),
    )?;

    if count > 0 {
        return Err(StoreError::Conflict(
            "Cannot delete a user with existing orders".to_string(),
        ));
    }

    let changed = conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
    if changed == 0 {
        return Err(StoreError::NotFound("User"));
    }
    tracing::info!(id, "user deleted");
    Ok(())
}

// ===== Addresses =====

const ADDRESS_COLUMNS: &str =
    "id, user_id, full_name, line1, line2, city, state, postal_code, country, phone, is_default";

fn map_address(row: &rusqlite::Row<'_>) -> rusqlite::Result<Address> {
    Ok(Address {
        id: row.get(0)?,
        user_id: row.get(1)?,
        full_name: row.get(2)?,
        line1: row.get(3)?,
        line2: row.get(4)?,
        city: row.get(5)?,
        state: row.get(6)?,
        postal_code: row.get(7)?,
        country: row.get(8)?,
        phone: row.get(9)?,
        is_default: row.get(10)?,
    })
}

fn validate_address(input: &AddressInput) -> Result<()> {
    let mut v = Violations::new();
    v.check(!input.full_name.trim().is_empty(), "Full name is required");
    v.check(!input.line1.trim().is_empty(), "Address line is required");
    v.check(!input.city.trim().is_empty(), "City is required");
    v.check(!input.state.trim().is_empty(), "State is required");
    v.check(!input.postal_code.trim().is_empty(), "Postal code is required");
    v.check(!input.country.trim().is_empty(), "Country is required");
    v.finish()
}

pub fn get_address(conn: &Connection, id: i64) -> Result<Address> {
    conn.query_row(
        &format!("SELECT {ADDRESS_COLUMNS} FROM user_addresses WHERE id = ?1"),
        [id],
        map_address,
    )
    .optional()?
    .ok_or(StoreError::NotFound("Address"))
}

pub fn list_addresses(conn: &Connection, user_id: i64) -> Result<Vec<Address>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ADDRESS_COLUMNS} FROM user_addresses
         WHERE user_id = ?1
         ORDER BY is_default DESC, id"
    ))?;

    let addresses = stmt
        .query_map([user_id], map_address)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(addresses)
}

fn clear_default(conn: &Connection, user_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE user_addresses SET is_default = 0 WHERE user_id = ?1",
        [user_id],
    )?;
    Ok(())
}

pub fn add_address(conn: &Connection, user_id: i64, input: AddressInput) -> Result<Address> {
    validate_address(&input)?;
    get_user(conn, user_id)?;

    let tx = conn.unchecked_transaction()?;
    let existing: i64 = tx.query_row(
        "SELECT COUNT(*) FROM user_addresses WHERE user_id = ?1",
        [user_id],
        |row| row.get(0),
    )?;

    // The first address is always the default one
    let is_default = input.is_default || existing == 0;
    if is_default {
        clear_default(&tx, user_id)?;
    }

    tx.execute(
        "INSERT INTO user_addresses
         (user_id, full_name, line1, line2, city, state, postal_code, country, phone, is_default)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        rusqlite::params![
            user_id,
            input.full_name.trim(),
            input.line1.trim(),
            input.line2,
            input.city.trim(),
            input.state.trim(),
            input.postal_code.trim(),
            input.country.trim(),
            input.phone,
            is_default,
        ],
    )?;
    let id = tx.last_insert_rowid();
    tx.commit()?;

    get_address(conn, id)
}

pub fn update_address(conn: &Connection, id: i64, input: AddressInput) -> Result<Address> {
    validate_address(&input)?;
    let existing = get_address(conn, id)?;

    let tx = conn.unchecked_transaction()?;
    if input.is_default && !existing.is_default {
        clear_default(&tx, existing.user_id)?;
    }

    tx.execute(
        "UPDATE user_addresses
         SET full_name = ?1, line1 = ?2, line2 = ?3, city = ?4, state = ?5, postal_code = ?6,
             country = ?7, phone = ?8, is_default = ?9
         WHERE id = ?10",
        rusqlite::params![
            input.full_name.trim(),
            input.line1.trim(),
            input.line2,
            input.city.trim(),
            input.state.trim(),
            input.postal_code.trim(),
            input.country.trim(),
            input.phone,
            // Unflagging the default is done by picking another one
            input.is_default || existing.is_default,
            id,
        ],
    )?;
    tx.commit()?;

    get_address(conn, id)
}

/// Marks one address as the default and unsets every other one.
pub fn set_default_address(conn: &Connection, user_id: i64, address_id: i64) -> Result<Vec<Address>> {
    let address = get_address(conn, address_id)?;
    if address.user_id != user_id {
        return Err(StoreError::NotFound("Address"));
    }

    let tx = conn.unchecked_transaction()?;
    clear_default(&tx, user_id)?;
    tx.execute(
        "UPDATE user_addresses SET is_default = 1 WHERE id = ?1",
        [address_id],
    )?;
    tx.commit()?;

    list_addresses(conn, user_id)
}

pub fn delete_address(conn: &Connection, user_id: i64, address_id: i64) -> Result<()> {
    let address = get_address(conn, address_id)?;
    if address.user_id != user_id {
        return Err(StoreError::NotFound("Address"));
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM user_addresses WHERE id = ?1", [address_id])?;

    // Promote the oldest remaining address
    if address.is_default {
        tx.execute(
            "UPDATE user_addresses SET is_default = 1
             WHERE id = (SELECT MIN(id) FROM user_addresses WHERE user_id = ?1)",
            [user_id],
        )?;
    }
    tx.commit()?;
    Ok(())
}
