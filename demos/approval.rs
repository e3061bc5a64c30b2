use draft_approval::config::{ApprovalOptions, Registry};
use draft_approval::diff::DiffOptions;
use draft_approval::record::AttrValue;
use draft_approval::schema::{AttrKind, ModelSchema, SchemaCatalog};
use draft_approval::service::ApprovalService;
use std::sync::Arc;

fn catalog() -> SchemaCatalog {
    SchemaCatalog::new()
        .declare(
            ModelSchema::new("Product", "products")
                .field("name", AttrKind::Text)
                .field("summary", AttrKind::Text)
                .field("sku", AttrKind::Text)
                .field("approved_version_id", AttrKind::Id)
                .has_many("variants", "Variant", "product_id")
                .has_one("datasheet", "Datasheet", "product_id"),
        )
        .declare(
            ModelSchema::new("Variant", "variants")
                .field("label", AttrKind::Text)
                .field("price_cents", AttrKind::Int)
                .field("product_id", AttrKind::Id)
                .field("approved_version_id", AttrKind::Id)
                .belongs_to("product", "Product", "product_id"),
        )
        .declare(
            ModelSchema::new("Datasheet", "datasheets")
                .field("title", AttrKind::Text)
                .field("product_id", AttrKind::Id)
                .field("approved_version_id", AttrKind::Id)
                .belongs_to("product", "Product", "product_id"),
        )
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("debug").init();

    let db = sled::open("approval-demo")?;
    if !db.is_empty() {
        db.clear()?;
    }

    let mut registry = Registry::new(catalog());
    registry.requires_approval(
        "Product",
        ApprovalOptions::new()
            .associations(["variants", "datasheet"])
            .nullify(["sku"]),
    )?;
    let service = ApprovalService::new(Arc::new(db), Arc::new(registry));

    // a live product with two variants and a datasheet
    let product = service.create_record(
        "Product",
        [
            ("name", AttrValue::from("Trailhead Pack")),
            ("summary", AttrValue::from("40 litre hiking pack")),
            ("sku", AttrValue::from("TP-40")),
        ],
    )?;
    for (label, price) in [("forest green", 14900_i64), ("slate grey", 15900)] {
        service.create_record(
            "Variant",
            [
                ("label", AttrValue::from(label)),
                ("price_cents", AttrValue::from(price)),
                ("product_id", AttrValue::from(product.id)),
            ],
        )?;
    }
    service.create_record(
        "Datasheet",
        [
            ("title", AttrValue::from("Materials and care")),
            ("product_id", AttrValue::from(product.id)),
        ],
    )?;

    // first access clones the whole tree
    let mut draft = service.get_or_create_draft(&product)?;
    println!("draft of product {} is {}", product.id, draft.id);

    // edit the draft side freely, the live product is untouched
    draft.set("summary", "40 litre pack, recycled ripstop");
    service.save(&mut draft)?;

    let mut draft_variants = service
        .store()
        .children_of("Variant", "product_id", draft.id)?;
    if let Some(variant) = draft_variants.first_mut() {
        variant.set("label", "moss green");
        service.save(variant)?;
    }
    service.create_record(
        "Variant",
        [
            ("label", AttrValue::from("ember orange")),
            ("price_cents", AttrValue::from(15900_i64)),
            ("product_id", AttrValue::from(draft.id)),
        ],
    )?;

    let diff = service.draft_diff(
        &product,
        DiffOptions::new().include_associations(true),
    )?;
    println!("pending changes: {:#?}", diff);

    let published = service.publish_draft(&product)?;
    println!("published: {:#?}", published);
    let live_variants = service
        .store()
        .children_of("Variant", "product_id", published.id)?;
    println!("live variants after publish: {}", live_variants.len());

    Ok(())
}
