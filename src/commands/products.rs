use crate::commands::categories;
use crate::db::json_column;
use crate::error::{Result, StoreError, Violations};
use crate::models::{
    Dimensions, Product, ProductFilter, ProductInput, ProductPage, Variant, VariantInput,
};
use crate::slug::{slugify, unique_slug, SlugTable};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension};

const DEFAULT_PER_PAGE: u32 = 24;
const MAX_PER_PAGE: u32 = 100;

const PRODUCT_SELECT: &str =
    "SELECT p.id, p.name, p.slug, p.description, p.price, p.sale_price, p.category_id, c.name, p.media, p.is_active, p.created_at
     FROM products p
     LEFT JOIN categories c ON p.category_id = c.id";

fn map_product(row: &rusqlite::Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        description: row.get(3)?,
        price: row.get(4)?,
        sale_price: row.get(5)?,
        category_id: row.get(6)?,
        category_name: row.get(7)?,
        media: json_column(row, 8)?,
        variants: Vec::new(),
        is_active: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn map_variant(row: &rusqlite::Row<'_>) -> rusqlite::Result<Variant> {
    let length: Option<f64> = row.get(6)?;
    let width: Option<f64> = row.get(7)?;
    let height: Option<f64> = row.get(8)?;

    Ok(Variant {
        id: row.get(0)?,
        sku: row.get(1)?,
        options: json_column(row, 2)?,
        price: row.get(3)?,
        stock: row.get(4)?,
        weight: row.get(5)?,
        dimensions: match (length, width, height) {
            (Some(length), Some(width), Some(height)) => Some(Dimensions {
                length,
                width,
                height,
            }),
            _ => None,
        },
    })
}

fn load_variants(conn: &Connection, product_id: i64) -> Result<Vec<Variant>> {
    let mut stmt = conn.prepare(
        "SELECT id, sku, options, price, stock, weight, length, width, height
         FROM product_variants
         WHERE product_id = ?1
         ORDER BY position",
    )?;

    let variants = stmt
        .query_map([product_id], map_variant)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(variants)
}

fn with_variants(conn: &Connection, mut product: Product) -> Result<Product> {
    product.variants = load_variants(conn, product.id)?;
    Ok(product)
}

fn validate(input: &ProductInput) -> Result<()> {
    let mut v = Violations::new();
    v.check(!input.name.trim().is_empty(), "Product name is required");
    v.check(input.price >= 0.0, "Price must not be negative");

    if let Some(sale) = input.sale_price {
        v.check(sale >= 0.0, "Sale price must not be negative");
        v.check(sale < input.price, "Sale price must be lower than the price");
    }

    v.check(
        input.media.iter().all(|m| !m.trim().is_empty()),
        "Media URLs must not be empty",
    );

    for (i, variant) in input.variants.iter().enumerate() {
        let n = i + 1;
        v.check(variant.price >= 0.0, format!("Variant {n}: price must not be negative"));
        v.check(variant.stock >= 0, format!("Variant {n}: stock must not be negative"));
        v.check(
            variant.options.iter().all(|o| !o.name.trim().is_empty() && !o.value.trim().is_empty()),
            format!("Variant {n}: option names and values are required"),
        );
        if let Some(w) = variant.weight {
            v.check(w >= 0.0, format!("Variant {n}: weight must not be negative"));
        }
    }

    v.finish()
}

/// SKU used when the admin leaves it blank: the product slug followed by the
/// option values, or by the variant's position when it has no options.
pub fn default_sku(product_slug: &str, variant: &VariantInput, position: usize) -> String {
    let mut parts = vec![product_slug.to_string()];
    if variant.options.is_empty() {
        parts.push(position.to_string());
    } else {
        parts.extend(variant.options.iter().map(|o| slugify(&o.value)));
    }
    parts.join("-").to_uppercase()
}

fn save_variants(conn: &Connection, product_id: i64, slug: &str, variants: &[VariantInput]) -> Result<()> {
    let keep: Vec<i64> = variants.iter().filter_map(|v| v.id).collect();
    let existing: Vec<i64> = conn
        .prepare("SELECT id FROM product_variants WHERE product_id = ?1")?
        .query_map([product_id], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;

    for id in existing.iter().filter(|id| !keep.contains(*id)) {
        conn.execute("DELETE FROM product_variants WHERE id = ?1", [id])?;
    }

    for (i, variant) in variants.iter().enumerate() {
        let position = i + 1;
        let sku = variant
            .sku
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_uppercase)
            .unwrap_or_else(|| default_sku(slug, variant, position));
        let options = serde_json::to_string(&variant.options)?;
        let dims = variant.dimensions;

        let result = match variant.id.filter(|id| existing.contains(id)) {
            Some(id) => conn.execute(
                "UPDATE product_variants
                 SET position = ?1, sku = ?2, options = ?3, price = ?4, stock = ?5, weight = ?6,
                     length = ?7, width = ?8, height = ?9
                 WHERE id = ?10",
                rusqlite::params![
                    position as i64,
                    sku,
                    options,
                    variant.price,
                    variant.stock,
                    variant.weight,
                    dims.map(|d| d.length),
                    dims.map(|d| d.width),
                    dims.map(|d| d.height),
                    id,
                ],
            ),
            None => conn.execute(
                "INSERT INTO product_variants
                 (product_id, position, sku, options, price, stock, weight, length, width, height)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    product_id,
                    position as i64,
                    sku,
                    options,
                    variant.price,
                    variant.stock,
                    variant.weight,
                    dims.map(|d| d.length),
                    dims.map(|d| d.width),
                    dims.map(|d| d.height),
                ],
            ),
        };
        result.map_err(|e| StoreError::on_constraint(e, format!("SKU {sku} is already in use")))?;
    }

    Ok(())
}

pub fn get_product(conn: &Connection, id: i64) -> Result<Product> {
    let product = conn
        .query_row(&format!("{PRODUCT_SELECT} WHERE p.id = ?1"), [id], map_product)
        .optional()?
        .ok_or(StoreError::NotFound("Product"))?;
    with_variants(conn, product)
}

/// Storefront detail lookup; inactive products are hidden.
pub fn get_product_by_slug(conn: &Connection, slug: &str) -> Result<Product> {
    let product = conn
        .query_row(
            &format!("{PRODUCT_SELECT} WHERE p.slug = ?1 AND p.is_active = 1"),
            [slug],
            map_product,
        )
        .optional()?
        .ok_or(StoreError::NotFound("Product"))?;
    with_variants(conn, product)
}

pub fn list_products(conn: &Connection, filter: &ProductFilter) -> Result<ProductPage> {
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<Value> = Vec::new();

    if !filter.include_inactive {
        clauses.push("p.is_active = 1".to_string());
    }

    if let Some(slug) = filter.category_slug.as_deref().filter(|s| !s.is_empty()) {
        let category = categories::get_category_by_slug(conn, slug)?;
        let ids = categories::subtree_ids(conn, category.id)?;
        let placeholders = vec!["?"; ids.len()].join(", ");
        clauses.push(format!("p.category_id IN ({placeholders})"));
        params.extend(ids.into_iter().map(Value::Integer));
    }

    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        clauses.push("p.name LIKE ? ESCAPE '\\'".to_string());
        let escaped = search
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        params.push(Value::Text(format!("%{escaped}%")));
    }

    if let Some(min) = filter.min_price {
        clauses.push("COALESCE(p.sale_price, p.price) >= ?".to_string());
        params.push(Value::Real(min));
    }
    if let Some(max) = filter.max_price {
        clauses.push("COALESCE(p.sale_price, p.price) <= ?".to_string());
        params.push(Value::Real(max));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM products p{where_sql}"),
        rusqlite::params_from_iter(params.iter()),
        |row| row.get(0),
    )?;

    let per_page = filter.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
    let page = filter.page.unwrap_or(1).max(1);
    let offset = i64::from(page - 1) * i64::from(per_page);

    let mut page_params = params;
    page_params.push(Value::Integer(i64::from(per_page)));
    page_params.push(Value::Integer(offset));

    let mut stmt = conn.prepare(&format!(
        "{PRODUCT_SELECT}{where_sql} ORDER BY p.created_at DESC, p.id DESC LIMIT ? OFFSET ?"
    ))?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(page_params.iter()), map_product)?
        .collect::<Result<Vec<_>, _>>()?;

    let products = rows
        .into_iter()
        .map(|p| with_variants(conn, p))
        .collect::<Result<Vec<_>>>()?;

    Ok(ProductPage {
        products,
        total,
        page,
        per_page,
    })
}

pub fn create_product(conn: &Connection, input: ProductInput) -> Result<Product> {
    validate(&input)?;

    let name = input.name.trim();
    let slug = unique_slug(conn, SlugTable::Products, name, None)?;

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO products (name, slug, description, price, sale_price, category_id, media, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            name,
            slug,
            input.description,
            input.price,
            input.sale_price,
            input.category_id,
            serde_json::to_string(&input.media)?,
            input.is_active.unwrap_or(true),
        ],
    )?;

    let id = tx.last_insert_rowid();
    save_variants(&tx, id, &slug, &input.variants)?;
    tx.commit()?;

    tracing::info!(id, %slug, variants = input.variants.len(), "product created");
    get_product(conn, id)
}

pub fn update_product(conn: &Connection, id: i64, input: ProductInput) -> Result<Product> {
    validate(&input)?;
    let existing = get_product(conn, id)?;

    let name = input.name.trim();
    let slug = if name != existing.name {
        unique_slug(conn, SlugTable::Products, name, Some(id))?
    } else {
        existing.slug
    };

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE products
         SET name = ?1, slug = ?2, description = ?3, price = ?4, sale_price = ?5, category_id = ?6, media = ?7, is_active = ?8
         WHERE id = ?9",
        rusqlite::params![
            name,
            slug,
            input.description,
            input.price,
            input.sale_price,
            input.category_id,
            serde_json::to_string(&input.media)?,
            input.is_active.unwrap_or(existing.is_active),
            id,
        ],
    )?;
    save_variants(&tx, id, &slug, &input.variants)?;
    tx.commit()?;

    tracing::info!(id, %slug, "product updated");
    get_product(conn, id)
}

/// Hides or re-lists a product without deleting it.
pub fn set_product_active(conn: &Connection, id: i64, active: bool) -> Result<Product> {
    let changed = conn.execute(
        "UPDATE products SET is_active = ?1 WHERE id = ?2",
        rusqlite::params![active, id],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound("Product"));
    }
    tracing::info!(id, active, "product visibility changed");
    get_product(conn, id)
}

pub fn delete_product(conn: &Connection, id: i64) -> Result<()> {
    let changed = conn.execute("DELETE FROM products WHERE id = ?1", [id])?;
    if changed == 0 {
        return Err(StoreError::NotFound("Product"));
    }
    tracing::info!(id, "product deleted");
    Ok(())
}

/// Products with at least one variant at or below `threshold` units.
pub fn get_low_stock(conn: &Connection, threshold: i32) -> Result<Vec<Product>> {
    let mut stmt = conn.prepare(&format!(
        "{PRODUCT_SELECT}
         WHERE EXISTS (
            SELECT 1 FROM product_variants v
            WHERE v.product_id = p.id AND v.stock <= ?1
         )
         ORDER BY p.name"
    ))?;

    let rows = stmt
        .query_map([threshold], map_product)?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter().map(|p| with_variants(conn, p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VariantOption;

    #[test]
    fn default_sku_uses_option_values() {
        let variant = VariantInput {
            options: vec![
                VariantOption {
                    name: "Color".into(),
                    value: "Navy Blue".into(),
                },
                VariantOption {
                    name: "Size".into(),
                    value: "XL".into(),
                },
            ],
            ..Default::default()
        };
        assert_eq!(default_sku("blue-shirt", &variant, 1), "BLUE-SHIRT-NAVY-BLUE-XL");
    }

    #[test]
    fn default_sku_without_options_uses_position() {
        assert_eq!(
            default_sku("mug", &VariantInput::default(), 2),
            "MUG-2"
        );
    }
}
