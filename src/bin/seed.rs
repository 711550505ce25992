use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::error::Error;
use std::fs;
use thinkpad_store_api::carts::create_user_with_cart;
use thinkpad_store_api::catalog::create_product;
use thinkpad_store_api::config::Settings;
use thinkpad_store_api::establish_connection;
use thinkpad_store_api::insertables::{DiscountPromotionForm, NewProductForm, NewUserForm, UploadedFile};
use thinkpad_store_api::logging::init_tracing;
use thinkpad_store_api::promotions::create_promotion;
use thinkpad_store_api::storage::{ensure_deleted_product_image, FileSystemStorage};

#[derive(Deserialize)]
struct SeedProduct {
    name: String,
    model: String,
    price: Decimal,
    description: String,
    stock: i32,
    #[serde(default)]
    equipments: String,
}

impl SeedProduct {
    fn into_form(self) -> NewProductForm {
        let svg = format!(
            r##"<svg xmlns="http://www.w3.org/2000/svg" width="400" height="300"><rect width="400" height="300" fill="#1a1a1a"/><text x="200" y="160" fill="#e2231a" font-family="sans-serif" font-size="28" text-anchor="middle">{}</text></svg>"##,
            self.model
        );
        NewProductForm {
            image: UploadedFile {
                filename: format!("{}.svg", self.model.to_lowercase()),
                content: STANDARD.encode(svg),
            },
            name: self.name,
            model: self.model,
            price: self.price,
            description: self.description,
            stock: self.stock,
            equipments: self.equipments,
        }
    }
}

fn read_seed<T: for<'de> Deserialize<'de>>(path: &str) -> Result<Vec<T>, Box<dyn Error>> {
    let json = fs::read_to_string(path).map_err(|err| format!("can't open {}: {}", path, err))?;
    Ok(serde_json::from_str(&json)?)
}

fn main() -> Result<(), Box<dyn Error>> {
    let settings = Settings::from_env()?;
    init_tracing(settings.log_format);
    let connection = &mut establish_connection(&settings.database_url)?;
    let storage = FileSystemStorage::new(settings.media_root.clone(), settings.media_url.clone());
    ensure_deleted_product_image(&storage)?;

    let users: Vec<NewUserForm> = read_seed("src/bin/users.json")?;
    let products: Vec<SeedProduct> = read_seed("src/bin/products.json")?;
    let promotions: Vec<DiscountPromotionForm> = read_seed("src/bin/promotions.json")?;

    for form in users {
        create_user_with_cart(connection, form)?;
    }
    for product in products {
        create_product(connection, &storage, product.into_form())?;
    }
    for form in promotions {
        create_promotion(connection, form)?;
    }
    Ok(())
}
