use crate::error::{Result, Violations};
use crate::models::{Setting, Socials, Theme};
use rusqlite::{Connection, OptionalExtension};

impl Default for Setting {
    fn default() -> Self {
        Setting {
            store_name: "My Store".to_string(),
            contact_email: None,
            contact_phone: None,
            address: None,
            socials: Socials {
                facebook: None,
                instagram: None,
                twitter: None,
                youtube: None,
            },
            theme: Theme {
                primary_color: "#111827".to_string(),
                secondary_color: "#f3f4f6".to_string(),
                accent_color: "#2563eb".to_string(),
                background_color: "#ffffff".to_string(),
                foreground_color: "#0a0a0a".to_string(),
                font_family: "Inter, sans-serif".to_string(),
                radius: "0.5rem".to_string(),
            },
            logo_url: None,
            currency_symbol: "₹".to_string(),
        }
    }
}

fn is_hex_color(value: &str) -> bool {
    let Some(hex) = value.strip_prefix('#') else {
        return false;
    };
    matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit())
}

fn is_font_family(value: &str) -> bool {
    !value.trim().is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | ',' | '-' | '\'' | '"'))
}

/// `0` or a non-negative number with a px, rem, em or % unit.
fn is_css_length(value: &str) -> bool {
    if value == "0" {
        return true;
    }
    let Some(number) = ["px", "rem", "em", "%"]
        .iter()
        .find_map(|unit| value.strip_suffix(unit))
    else {
        return false;
    };
    let mut parts = number.splitn(2, '.');
    let whole = parts.next().unwrap_or_default();
    let fraction = parts.next();
    let digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    digits(whole) && fraction.map_or(true, digits)
}

fn validate(setting: &Setting) -> Result<()> {
    let mut v = Violations::new();
    v.check(!setting.store_name.trim().is_empty(), "Store name is required");
    v.check(!setting.currency_symbol.trim().is_empty(), "Currency symbol is required");

    let theme = &setting.theme;
    for (label, color) in [
        ("Primary", &theme.primary_color),
        ("Secondary", &theme.secondary_color),
        ("Accent", &theme.accent_color),
        ("Background", &theme.background_color),
        ("Foreground", &theme.foreground_color),
    ] {
        v.check(is_hex_color(color), format!("{label} color must be a hex color"));
    }
    v.check(
        is_font_family(&theme.font_family),
        "Font family may only contain letters, digits, spaces, commas, quotes and hyphens",
    );
    v.check(
        is_css_length(&theme.radius),
        "Radius must be a CSS length such as 0.5rem or 4px",
    );

    if let Some(email) = &setting.contact_email {
        v.check(email.contains('@'), "Contact email is invalid");
    }
    v.finish()
}

fn read_settings(conn: &Connection) -> rusqlite::Result<Option<Setting>> {
    conn.query_row(
        "SELECT store_name, contact_email, contact_phone, address,
                facebook, instagram, twitter, youtube,
                primary_color, secondary_color, accent_color, background_color, foreground_color,
                font_family, radius, logo_url, currency_symbol
         FROM settings WHERE id = 1",
        [],
        |row| {
            Ok(Setting {
                store_name: row.get(0)?,
                contact_email: row.get(1)?,
                contact_phone: row.get(2)?,
                address: row.get(3)?,
                socials: Socials {
                    facebook: row.get(4)?,
                    instagram: row.get(5)?,
                    twitter: row.get(6)?,
                    youtube: row.get(7)?,
                },
                theme: Theme {
                    primary_color: row.get(8)?,
                    secondary_color: row.get(9)?,
                    accent_color: row.get(10)?,
                    background_color: row.get(11)?,
                    foreground_color: row.get(12)?,
                    font_family: row.get(13)?,
                    radius: row.get(14)?,
                },
                logo_url: row.get(15)?,
                currency_symbol: row.get(16)?,
            })
        },
    )
    .optional()
}

fn write_settings(conn: &Connection, s: &Setting) -> Result<()> {
    conn.execute(
        "INSERT INTO settings (id, store_name, contact_email, contact_phone, address,
                facebook, instagram, twitter, youtube,
                primary_color, secondary_color, accent_color, background_color, foreground_color,
                font_family, radius, logo_url, currency_symbol)
         VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
         ON CONFLICT(id) DO UPDATE SET
                store_name = excluded.store_name,
                contact_email = excluded.contact_email,
                contact_phone = excluded.contact_phone,
                address = excluded.address,
                facebook = excluded.facebook,
                instagram = excluded.instagram,
                twitter = excluded.twitter,
                youtube = excluded.youtube,
                primary_color = excluded.primary_color,
                secondary_color = excluded.secondary_color,
                accent_color = excluded.accent_color,
                background_color = excluded.background_color,
                foreground_color = excluded.foreground_color,
                font_family = excluded.font_family,
                radius = excluded.radius,
                logo_url = excluded.logo_url,
                currency_symbol = excluded.currency_symbol,
                updated_at = CURRENT_TIMESTAMP",
        rusqlite::params![
            s.store_name.trim(),
            s.contact_email,
            s.contact_phone,
            s.address,
            s.socials.facebook,
            s.socials.instagram,
            s.socials.twitter,
            s.socials.youtube,
            s.theme.primary_color,
            s.theme.secondary_color,
            s.theme.accent_color,
            s.theme.background_color,
            s.theme.foreground_color,
            s.theme.font_family,
            s.theme.radius,
            s.logo_url,
            s.currency_symbol,
        ],
    )?;
    Ok(())
}

/// Returns the store configuration, seeding defaults on first read.
pub fn get_settings(conn: &Connection) -> Result<Setting> {
    if let Some(setting) = read_settings(conn)? {
        return Ok(setting);
    }

    let setting = Setting::default();
    write_settings(conn, &setting)?;
    Ok(setting)
}

pub fn update_settings(conn: &Connection, setting: Setting) -> Result<Setting> {
    validate(&setting)?;
    write_settings(conn, &setting)?;
    tracing::info!(store = %setting.store_name, "settings updated");
    get_settings(conn)
}

/// CSS custom properties for the storefront theme.
pub fn theme_css(setting: &Setting) -> String {
    let t = &setting.theme;
    format!(
        ":root {{\n  --primary: {};\n  --secondary: {};\n  --accent: {};\n  --background: {};\n  --foreground: {};\n  --font-family: {};\n  --radius: {};\n}}\n",
        t.primary_color,
        t.secondary_color,
        t.accent_color,
        t.background_color,
        t.foreground_color,
        t.font_family,
        t.radius,
    )
}
