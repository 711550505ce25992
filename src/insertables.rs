use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use diesel::{AsChangeset, Insertable};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::{StoreError, StoreResult};
use crate::models::Equipments;
use crate::schema::{cart_items, carts, discount_promotions, products, users};
use crate::storage::split_extension;

#[derive(Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_vip: bool,
}

#[derive(Deserialize, Validate, Clone)]
pub struct NewUserForm {
    #[validate(length(min = 1, max = 150))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[serde(default)]
    pub is_vip: bool,
}

#[derive(Insertable)]
#[diesel(table_name = carts)]
pub struct NewCart {
    pub user_id: i32,
}

#[derive(Insertable)]
#[diesel(table_name = products)]
pub struct NewProduct {
    pub name: String,
    pub model: String,
    pub price: Decimal,
    pub description: String,
    pub stock: i32,
    pub image: String,
    pub images: Vec<String>,
    pub images_max_ord: i32,
    pub equipments: Equipments,
}

/// A file as it arrives over JSON, with base64 content.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct UploadedFile {
    pub filename: String,
    pub content: String,
}

impl UploadedFile {
    pub fn decode(&self) -> StoreResult<Upload> {
        let bytes = STANDARD
            .decode(self.content.as_bytes())
            .map_err(|err| StoreError::Upload {
                filename: self.filename.clone(),
                reason: err.to_string(),
            })?;
        Ok(Upload {
            filename: self.filename.clone(),
            bytes,
        })
    }
}

/// A decoded upload ready to be handed to storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Upload {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }

    /// Lower-cased extension of the client-side filename, dot included.
    pub fn extension(&self) -> String {
        split_extension(self.basename()).1.to_lowercase()
    }

    /// Client-side filename without any directory part.
    pub fn basename(&self) -> &str {
        self.filename.rsplit(|c| c == '/' || c == '\\').next().unwrap_or("")
    }
}

pub fn decode_all(files: &[UploadedFile]) -> StoreResult<Vec<Upload>> {
    files.iter().map(UploadedFile::decode).collect()
}

#[derive(Deserialize, Validate, Clone)]
pub struct NewProductForm {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1, max = 100))]
    pub model: String,
    pub price: Decimal,
    pub description: String,
    #[validate(range(min = 0))]
    pub stock: i32,
    pub image: UploadedFile,
    #[serde(default)]
    pub equipments: String,
}

#[derive(Deserialize, Validate, Clone, Default)]
pub struct ProductChanges {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub model: Option<String>,
    pub price: Option<Decimal>,
    pub description: Option<String>,
    #[validate(range(min = 0))]
    pub stock: Option<i32>,
    pub image: Option<UploadedFile>,
    /// Replaces the whole equipment list when present.
    pub equipments: Option<String>,
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = products)]
pub struct ProductChangeset {
    pub name: Option<String>,
    pub model: Option<String>,
    pub price: Option<Decimal>,
    pub description: Option<String>,
    pub stock: Option<i32>,
    pub image: Option<String>,
    pub equipments: Option<Equipments>,
}

impl ProductChangeset {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.model.is_none()
            && self.price.is_none()
            && self.description.is_none()
            && self.stock.is_none()
            && self.image.is_none()
            && self.equipments.is_none()
    }
}

#[derive(Deserialize, Clone)]
pub struct ImagesForm {
    pub files: Vec<UploadedFile>,
}

#[derive(Deserialize, Clone)]
pub struct RemoveImagesForm {
    pub paths: Vec<String>,
}

#[derive(Insertable)]
#[diesel(table_name = cart_items)]
pub struct NewCartItem {
    pub cart_id: i32,
    pub product_id: i32,
    pub quantity: i32,
}

#[derive(Deserialize, Clone)]
pub struct CartItemForm {
    pub product_id: i32,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Deserialize, Clone)]
pub struct QuantityForm {
    pub quantity: i32,
}

#[derive(Insertable)]
#[diesel(table_name = discount_promotions)]
pub struct NewDiscountPromotion {
    pub name: String,
    pub description: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub discount: i16,
}

#[derive(Deserialize, Validate, Clone)]
pub struct DiscountPromotionForm {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Defaults to the moment of creation.
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: DateTime<Utc>,
    #[validate(range(min = 0, max = 10))]
    pub discount: i16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uploaded_file_decodes_base64() {
        let file = UploadedFile {
            filename: "Front.PNG".to_string(),
            content: STANDARD.encode(b"\x89PNG"),
        };
        let upload = file.decode().unwrap();
        assert_eq!(upload.bytes, b"\x89PNG");
        assert_eq!(upload.extension(), ".png");
    }

    #[test]
    fn bad_base64_names_the_file() {
        let file = UploadedFile {
            filename: "side.jpg".to_string(),
            content: "not base64!".to_string(),
        };
        match file.decode() {
            Err(StoreError::Upload { filename, .. }) => assert_eq!(filename, "side.jpg"),
            other => panic!("unexpected {:?}", other.map(|u| u.filename)),
        }
    }

    #[test]
    fn extension_ignores_client_directories() {
        assert_eq!(Upload::new("C:\\photos.d\\back", b"".to_vec()).extension(), "");
        assert_eq!(Upload::new("dir.v1/top.JPG", b"".to_vec()).extension(), ".jpg");
        assert_eq!(Upload::new("dir.v1/top.JPG", b"".to_vec()).basename(), "top.JPG");
    }

    #[test]
    fn empty_changeset_is_detected() {
        assert!(ProductChangeset::default().is_empty());
        let changes = ProductChangeset {
            stock: Some(3),
            ..Default::default()
        };
        assert!(!changes.is_empty());
    }
}
