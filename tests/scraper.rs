mod common;

use std::sync::Arc;
use std::time::Duration;

use amazon_scraper::{Country, ProductEnvelope, ScrapeError, Scraper, ScraperConfig};
use common::{ok, pipeline, status, RecordingSleeper, Scripted, ScriptedTransport};
use serde_json::{json, Value};

fn build(
    responses: Vec<Scripted>,
    config: ScraperConfig,
) -> (Scraper<ScriptedTransport>, ScriptedTransport, Arc<RecordingSleeper>) {
    let transport = ScriptedTransport::new(responses);
    let (pipeline, sleeper) = pipeline(transport.clone(), config);
    (Scraper::from_pipeline(pipeline), transport, sleeper)
}

fn full_payload() -> Value {
    json!({
        "results": [{
            "content": {
                "title": "Echo Dot (4th Gen)",
                "manufacturer": "Amazon",
                "price": "$1,234.50",
                "rating": "4.5 out of 5 stars",
                "reviews_count": "25,847 ratings",
                "description": "Smart speaker with Alexa",
                "features": "• Rich sound\n• Voice control",
                "images": ["https://m.media-amazon.com/1.jpg", "https://m.media-amazon.com/2.jpg"],
                "product_details": ["Weight: 340 g", { "Color": "Charcoal" }],
                "stock_status": "In Stock",
                "url": "https://www.amazon.com/dp/B08N5WRWNW?ref=upstream"
            }
        }]
    })
}

#[tokio::test]
async fn full_product_round() {
    let (scraper, transport, _) = build(vec![ok(full_payload())], ScraperConfig::default());

    let envelope = scraper.scrape_product("B08N5WRWNW", None).await;

    assert!(envelope.is_success());
    assert_eq!(envelope.metadata.error_message, None);
    assert_eq!(envelope.metadata.fields_extracted, 6);

    let product = &envelope.product;
    assert_eq!(product.name, "Echo Dot (4th Gen)");
    assert_eq!(product.brand, "Amazon");
    assert_eq!(product.price, "1234.50");
    assert_eq!(product.rating, "4.5");
    assert_eq!(product.reviews_count, "25847");
    assert_eq!(product.bullet_points, vec!["Rich sound", "Voice control"]);
    assert_eq!(product.images.len(), 2);
    assert_eq!(product.specifications["Weight"], json!("340 g"));
    assert_eq!(product.specifications["Color"], json!("Charcoal"));
    assert_eq!(product.availability, "In Stock");
    assert_eq!(product.url, "https://www.amazon.com/dp/B08N5WRWNW");
    assert!(!product.scraped_at.is_empty());

    let queries = transport.queries();
    assert_eq!(queries[0].url, "https://www.amazon.com/dp/B08N5WRWNW");
    assert_eq!(queries[0].geo_location, "10001");
}

#[tokio::test]
async fn bare_asin_uses_configured_marketplace() {
    let config = ScraperConfig::default().with_country(Country::from_code("uk"));
    let (scraper, transport, _) = build(vec![ok(full_payload())], config);

    let envelope = scraper.scrape_product("B08N5WRWNW", Some("SW1A")).await;

    assert!(envelope.is_success());
    let queries = transport.queries();
    assert_eq!(queries[0].url, "https://www.amazon.co.uk/dp/B08N5WRWNW");
    assert_eq!(queries[0].geo_location, "SW1A");
}

#[tokio::test]
async fn sparse_content_is_still_successful() {
    let payload = json!({ "results": [{ "content": { "title": "X" } }] });
    let (scraper, _, _) = build(vec![ok(payload)], ScraperConfig::default());

    let envelope = scraper.scrape_product("B08N5WRWNW", None).await;

    assert!(envelope.is_success());
    assert_eq!(envelope.product.name, "X");
    assert_eq!(envelope.product.brand, "Unknown");
    assert_eq!(envelope.product.price, "0.00");
    assert_eq!(envelope.product.rating, "0");
    assert_eq!(envelope.product.reviews_count, "0");
    assert_eq!(envelope.metadata.fields_extracted, 1);
}

#[tokio::test]
async fn extracted_zero_values_are_counted() {
    let payload = json!({
        "results": [{
            "content": {
                "title": "Freebie",
                "rating": 0,
                "price": "$0.00",
                "reviews_count": "0 ratings"
            }
        }]
    });
    let (scraper, _, _) = build(vec![ok(payload)], ScraperConfig::default());

    let envelope = scraper.scrape_product("B08N5WRWNW", None).await;

    assert!(envelope.is_success());
    assert_eq!(envelope.product.price, "0.00");
    assert_eq!(envelope.metadata.fields_extracted, 4);
}

#[tokio::test]
async fn structurally_invalid_payloads_fail_the_envelope() {
    for payload in [json!({}), json!({ "results": [] }), json!({ "results": [{}] })] {
        let (scraper, _, _) = build(vec![ok(payload.clone())], ScraperConfig::default());

        let envelope = scraper.scrape_product("B08N5WRWNW", None).await;

        assert!(!envelope.is_success(), "payload {}", payload);
        assert!(matches!(
            envelope.product.error(),
            Some(ScrapeError::StructuralValidation(_))
        ));
        let message = envelope.metadata.error_message.as_deref().unwrap();
        assert!(message.starts_with("validation error"));
        assert_eq!(envelope.metadata.fields_extracted, 0);
        assert_eq!(envelope.product.name, "Unknown");
    }
}

#[tokio::test]
async fn invalid_input_yields_failed_envelope_not_panic() {
    let (scraper, transport, _) = build(vec![], ScraperConfig::default());

    let envelope = scraper
        .scrape_product("https://www.amazon.com/dp/INVALID123", None)
        .await;

    assert!(!envelope.is_success());
    assert_eq!(envelope.product.error().map(|e| e.tag()), Some("invalid_asin"));
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn envelope_json_shape_is_stable_on_failure() {
    let (scraper, _, _) = build(
        vec![status(429), status(429), status(429)],
        ScraperConfig::default(),
    );

    let envelope = scraper.scrape_product("B08N5WRWNW", None).await;
    let value = serde_json::to_value(&envelope).unwrap();

    assert_eq!(value["metadata"]["extraction_successful"], json!(false));
    assert!(value["metadata"]["error_message"]
        .as_str()
        .unwrap()
        .contains("Rate limit exceeded"));
    assert_eq!(value["product"]["price"], json!("0.00"));
    assert_eq!(value["product"]["bullet_points"], json!([]));
    assert_eq!(value["product"]["specifications"], json!({}));
    assert!(value["product"].get("error").is_none());

    let back: ProductEnvelope = serde_json::from_value(value).unwrap();
    assert_eq!(back.metadata, envelope.metadata);
}

#[tokio::test]
async fn batch_is_paced_and_ordered() {
    let config = ScraperConfig::default().with_request_delay(Duration::from_millis(750));
    let (scraper, transport, sleeper) = build(
        vec![
            ok(json!({ "results": [{ "content": { "title": "first" } }] })),
            ok(json!({ "results": [{ "content": { "title": "second" } }] })),
        ],
        config,
    );

    let envelopes = scraper
        .scrape_products(&["B000000001", "B000000002"][..], None)
        .await;

    assert_eq!(envelopes.len(), 2);
    assert_eq!(envelopes[0].product.name, "first");
    assert_eq!(envelopes[1].product.name, "second");
    assert_eq!(transport.calls(), 2);
    assert_eq!(sleeper.sleeps(), vec![Duration::from_millis(750)]);
}

#[tokio::test]
async fn search_skips_failed_pages() {
    let page_two = json!({
        "results": [{
            "content": {
                "products": [
                    { "title": "Headphones", "price": 59.99, "url": "/dp/B000000001" },
                    { "title": "Earbuds", "rating": 4.1 }
                ]
            }
        }]
    });
    let (scraper, transport, sleeper) = build(
        vec![
            status(404),
            ok(page_two),
            ok(json!({ "error": "rate_limit", "message": "slow down" })),
        ],
        ScraperConfig::default(),
    );

    let items = scraper
        .scrape_search_results("wireless headphones", None, 3)
        .await;

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].title, "Headphones");
    assert_eq!(items[0].price, "59.99");
    assert_eq!(items[1].rating, "4.1");
    assert_eq!(transport.calls(), 3);
    assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(1); 2]);

    let urls: Vec<String> = transport.queries().into_iter().map(|q| q.url).collect();
    assert_eq!(
        urls[1],
        "https://www.amazon.com/s?k=wireless%20headphones&page=2"
    );
}
