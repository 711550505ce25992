use rust_decimal_macros::dec;
use tempfile::TempDir;
use thinkpad_store_api::insertables::Upload;
use thinkpad_store_api::models::{Equipments, Product, DELETED_PRODUCT_IMAGE};
use thinkpad_store_api::storage::{ensure_deleted_product_image, FileSystemStorage, Storage};

fn laptop() -> Product {
    Product {
        id: 7,
        name: "ThinkPad T14".to_string(),
        model: "Gen4".to_string(),
        price: dec!(1249.00),
        description: String::new(),
        stock: 3,
        image: "product_images/t14.png".to_string(),
        images: Vec::new(),
        images_max_ord: 0,
        equipments: Equipments::default(),
    }
}

#[test]
fn additional_images_are_numbered_and_written() {
    let dir = TempDir::new().unwrap();
    let storage = FileSystemStorage::new(dir.path(), "/media/");
    let mut product = laptop();

    let stored = product
        .add_images(
            &storage,
            &[Upload::new("front.JPG", b"front".to_vec()), Upload::new("back.png", b"back".to_vec())],
        )
        .unwrap();

    assert_eq!(
        stored,
        vec![
            "product_images/thinkpad-t14-gen4_1.jpg".to_string(),
            "product_images/thinkpad-t14-gen4_2.png".to_string(),
        ]
    );
    assert_eq!(product.images, stored);
    assert_eq!(product.images_max_ord, 2);
    assert!(dir.path().join("product_images/thinkpad-t14-gen4_2.png").is_file());
    assert_eq!(
        storage.url(&stored[0]),
        "/media/product_images/thinkpad-t14-gen4_1.jpg"
    );
}

#[test]
fn removing_the_newest_image_frees_its_number() {
    let dir = TempDir::new().unwrap();
    let storage = FileSystemStorage::new(dir.path(), "/media/");
    let mut product = laptop();
    let stored = product
        .add_images(
            &storage,
            &[Upload::new("a.png", b"a".to_vec()), Upload::new("b.png", b"b".to_vec())],
        )
        .unwrap();

    let removed = product.remove_images(&storage, &[stored[1].clone()]);
    assert_eq!(removed, vec![stored[1].clone()]);
    assert!(!storage.exists(&stored[1]));
    assert_eq!(product.images_max_ord, 1);

    let again = product.add_images(&storage, &[Upload::new("c.png", b"c".to_vec())]).unwrap();
    assert_eq!(again, vec!["product_images/thinkpad-t14-gen4_2.png".to_string()]);
}

#[test]
fn unknown_paths_are_ignored_on_removal() {
    let dir = TempDir::new().unwrap();
    let storage = FileSystemStorage::new(dir.path(), "/media/");
    let mut product = laptop();
    product.add_images(&storage, &[Upload::new("a.png", b"a".to_vec())]).unwrap();

    let removed = product.remove_images(&storage, &["product_images/other.png".to_string()]);
    assert!(removed.is_empty());
    assert_eq!(product.images.len(), 1);
    assert_eq!(product.images_max_ord, 1);
}

#[test]
fn stored_files_never_include_the_placeholder_image() {
    let dir = TempDir::new().unwrap();
    let storage = FileSystemStorage::new(dir.path(), "/media/");
    ensure_deleted_product_image(&storage).unwrap();
    assert!(storage.exists(DELETED_PRODUCT_IMAGE));

    let mut product = laptop();
    product.image = DELETED_PRODUCT_IMAGE.to_string();
    product.add_images(&storage, &[Upload::new("a.png", b"a".to_vec())]).unwrap();
    assert_eq!(product.stored_files(), vec!["product_images/thinkpad-t14-gen4_1.png"]);
}
